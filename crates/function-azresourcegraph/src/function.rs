//! The composition function: one invocation per reconciliation of a
//! composite resource.
//!
//! Every invocation runs the same steps:
//!
//! 1. Carry the prior status forward onto the desired composite resource.
//! 2. Parse the input and the credentials.
//! 3. Resolve `queryRef` and `subscriptionsRef`.
//! 4. Validate the target.
//! 5. Evaluate the skip gates, see [`crate::throttle`].
//! 6. Run the query with the next credential set.
//! 7. Write the result to the target.
//!
//! Problems never surface as a transport error. They are reported as results
//! and conditions of an otherwise valid [`RunFunctionResponse`].

use std::{error::Error as StdError, future::Future, str::FromStr, sync::Arc};

use function_shared::fieldpath::{Paved, PavedError};
use jiff::Timestamp;
use snafu::{ResultExt, Snafu};

use crate::{
    composite::Composite,
    credentials::{CredentialSelector, Credentials, CredentialsError},
    input::{InputError, QueryInput},
    proto::{RunFunctionRequest, RunFunctionResponse},
    query::{QueryError, QueryRequest, ResourceGraphQuery},
    reference::{self, StatePath, StatePathError},
    response::{ConditionReason, ConditionType, DEFAULT_TTL},
    throttle::{self, Gates},
};

/// Name of the credentials the function reads by default.
pub const DEFAULT_CREDENTIALS_NAME: &str = "azure-creds";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("cannot get function input"))]
    ParseInput { source: InputError },

    #[snafu(transparent)]
    Credentials { source: CredentialsError },

    #[snafu(display("Unrecognized QueryRef field: {reference}"))]
    UnrecognizedQueryRef { reference: String },

    #[snafu(display("Unrecognized SubscriptionsRef field: {reference}"))]
    UnrecognizedSubscriptionsRef { reference: String },

    #[snafu(display("Unrecognized target field: {target}"))]
    UnrecognizedTarget { target: String },

    #[snafu(display("invalid target field {target}"))]
    InvalidTarget {
        source: StatePathError,
        target: String,
    },

    #[snafu(display("failed to finish the request"))]
    ExecuteQuery { source: QueryError },

    #[snafu(display("query was cancelled"))]
    Cancelled,

    #[snafu(display("cannot set status field {target}"))]
    SetStatusField { source: PavedError, target: String },

    #[snafu(display("failed to update context key {target}"))]
    SetContextField { source: PavedError, target: String },
}

/// Runs Azure Resource Graph queries on behalf of composite resources.
///
/// A single instance serves all invocations of the process, it owns the
/// credential rotation state.
pub struct Function {
    client: Arc<dyn ResourceGraphQuery>,
    selector: CredentialSelector,
    credentials_name: String,
}

impl Function {
    pub fn new(client: Arc<dyn ResourceGraphQuery>) -> Self {
        Self {
            client,
            selector: CredentialSelector::new(),
            credentials_name: DEFAULT_CREDENTIALS_NAME.to_owned(),
        }
    }

    /// Sets the name of the credentials holding the service principals.
    pub fn with_credentials_name(mut self, credentials_name: impl Into<String>) -> Self {
        self.credentials_name = credentials_name.into();
        self
    }

    /// Runs one invocation.
    ///
    /// If `cancel` completes while the query is in flight, the query is
    /// abandoned and the invocation fails.
    pub async fn run_function<C>(
        &self,
        request: RunFunctionRequest,
        cancel: C,
    ) -> RunFunctionResponse
    where
        C: Future<Output = ()> + Send,
    {
        tracing::info!(tag = %request.meta.tag, "running function");

        let mut response = RunFunctionResponse::to(&request, DEFAULT_TTL);

        let mut composite = Composite::reconcile(
            request
                .observed
                .composite
                .as_ref()
                .map(|composite| &composite.resource),
            request
                .desired
                .composite
                .as_ref()
                .map(|composite| &composite.resource),
        );
        composite.propagate_status();
        response.set_desired_composite_resource(composite.resource().clone());
        tracing::debug!("propagated desired composite resource");

        if let Err(error) = self
            .run(&request, &mut response, &mut composite, cancel)
            .await
        {
            let message = error_chain(&error);
            tracing::warn!(error = %message, "function failed");
            response.fatal(message);
        }

        response
    }

    async fn run<C>(
        &self,
        request: &RunFunctionRequest,
        response: &mut RunFunctionResponse,
        composite: &mut Composite,
        cancel: C,
    ) -> Result<(), Error>
    where
        C: Future<Output = ()> + Send,
    {
        let mut input = match QueryInput::from_object(request.input.as_ref()) {
            Ok(input) => input,
            Err(source) => {
                response
                    .condition_false(ConditionType::FunctionSuccess, ConditionReason::InternalError)
                    .with_message("Something went wrong.")
                    .target_composite_and_claim();
                response
                    .warning("something went wrong")
                    .target_composite_and_claim();
                return Err(Error::ParseInput { source });
            }
        };

        let credentials = Credentials::from_request(request, &self.credentials_name)?;
        match &credentials {
            Credentials::Single(_) => tracing::info!("single service principal mode detected"),
            Credentials::Pool(pool) => tracing::info!(
                service_principal_count = pool.len(),
                "multiple service principals mode detected"
            ),
        }

        let context = request.context.clone().unwrap_or_default();

        if let Some(query_ref) = &input.query_ref {
            let resolved = reference::resolve_query(query_ref, composite.status(), &context)
                .map_err(|_| Error::UnrecognizedQueryRef {
                    reference: query_ref.clone(),
                })?;

            match resolved {
                Some(query) => input.query = query,
                None => tracing::debug!(%query_ref, "query reference did not resolve"),
            }
        }

        if let Some(subscriptions_ref) = &input.subscriptions_ref {
            let resolved =
                reference::resolve_subscriptions(subscriptions_ref, composite.status(), &context)
                    .map_err(|_| Error::UnrecognizedSubscriptionsRef {
                        reference: subscriptions_ref.clone(),
                    })?;

            match resolved {
                Some(subscriptions) => input.subscriptions = subscriptions,
                None => {
                    tracing::debug!(%subscriptions_ref, "subscriptions reference did not resolve");
                }
            }
        }

        if input.query.is_empty() {
            tracing::warn!("query is empty");
            response.warning("Query is empty");
            return Ok(());
        }

        let target = parse_target(&input.target)?;

        let gates = Gates::from_input(&input);
        let skip = gates.evaluate(&target, composite.status(), &context, Timestamp::now());
        if let Some(reason) = skip {
            response
                .condition_true(ConditionType::FunctionSkip, reason.condition_reason())
                .with_message(reason.message())
                .target_composite_and_claim();
            response
                .condition_true(ConditionType::FunctionSuccess, ConditionReason::Success)
                .target_composite_and_claim();
            return Ok(());
        }

        let selection = self.selector.select(&credentials)?;
        let query_request = QueryRequest::new(
            input.query.clone(),
            input.subscriptions.clone(),
            selection.subscription_ids,
            input.management_groups.clone(),
            input.identity_type(),
        );

        let mut result = tokio::select! {
            // Prefer a finished query over a cancellation arriving at the same time
            biased;
            result = self.client.query(selection.credential_set, &query_request) => {
                result.context(ExecuteQuerySnafu)?
            }
            () = cancel => return CancelledSnafu.fail(),
        };

        tracing::info!(query = %input.query, "query succeeded");
        tracing::debug!(%result, "query result");
        // Quoted with quotes, backslashes and control characters escaped
        response.normal(format!("Query: {:?}", input.query));

        match &target {
            StatePath::Status(path) => {
                if let Some(minutes) = gates.stamp_interval(&target) {
                    tracing::debug!(path = %target, minutes, "adding lastQueryTime to result");
                    throttle::stamp_last_query_time(&mut result, Timestamp::now());
                }

                composite
                    .status_mut()
                    .set_path(path, result)
                    .with_context(|_| SetStatusFieldSnafu {
                        target: path.to_string(),
                    })?;
                composite.write_status();
                response.set_desired_composite_resource(composite.resource().clone());
            }
            StatePath::Context(path) => {
                let mut context = context;
                context
                    .set_path(path, result)
                    .with_context(|_| SetContextFieldSnafu {
                        target: path.to_string(),
                    })?;
                tracing::debug!(path = %target, "updated pipeline context");
                response.context = Some(context);
            }
        }

        response
            .condition_true(ConditionType::FunctionSuccess, ConditionReason::Success)
            .target_composite_and_claim();

        Ok(())
    }
}

fn parse_target(target: &str) -> Result<StatePath, Error> {
    StatePath::from_str(target).map_err(|source| match source {
        StatePathError::UnrecognizedRoot { .. } => Error::UnrecognizedTarget {
            target: target.to_owned(),
        },
        StatePathError::InvalidPath { .. } => Error::InvalidTarget {
            source,
            target: target.to_owned(),
        },
    })
}

/// Renders an error and all its sources, separated by `": "`.
pub fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(error) = source {
        message.push_str(": ");
        message.push_str(&error.to_string());
        source = error.source();
    }

    message
}
