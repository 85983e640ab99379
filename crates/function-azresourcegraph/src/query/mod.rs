//! Execution of Azure Resource Graph queries.
//!
//! The [`ResourceGraphQuery`] trait is the seam between the function logic
//! and the Azure API. [`AzureResourceGraph`] talks to the real API, tests
//! substitute their own implementation.

use async_trait::async_trait;
use serde_json::Value;
use snafu::Snafu;

use crate::{credentials::CredentialSet, input::IdentityType};

pub mod azure;

pub use azure::{AzureOptions, AzureResourceGraph};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueryError {
    #[snafu(display("failed to build HTTP client"))]
    BuildClient { source: reqwest::Error },

    #[snafu(display("failed to acquire access token"))]
    AcquireToken { source: reqwest::Error },

    #[snafu(display("token request rejected with status {status}: {body}"))]
    TokenRejected { status: u16, body: String },

    #[snafu(display("no federated token file configured for workload identity"))]
    MissingFederatedTokenFile,

    #[snafu(display("failed to read federated token file {path:?}"))]
    ReadFederatedToken {
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    #[snafu(display("failed to send query"))]
    SendQuery { source: reqwest::Error },

    #[snafu(display("query rejected with status {status}: {body}"))]
    QueryRejected { status: u16, body: String },

    #[snafu(display("failed to decode query response"))]
    DecodeResponse { source: reqwest::Error },
}

/// Where a query is run and what it asks for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryRequest {
    /// Query in the Kusto Query Language.
    pub query: String,

    /// Subscriptions to run against. Empty means every subscription the
    /// identity can see.
    pub subscriptions: Vec<String>,

    pub management_groups: Vec<String>,

    pub identity: IdentityType,
}

impl QueryRequest {
    /// Builds the request, applying the subscription precedence.
    ///
    /// Explicit subscriptions win over the subscription IDs of the
    /// credentials. Without either, the query runs tenant wide.
    pub fn new(
        query: impl Into<String>,
        explicit_subscriptions: Vec<String>,
        credential_subscriptions: Vec<String>,
        management_groups: Vec<String>,
        identity: IdentityType,
    ) -> Self {
        let subscriptions = if !explicit_subscriptions.is_empty() {
            tracing::debug!(
                subscription_count = explicit_subscriptions.len(),
                "using subscriptions from input"
            );
            explicit_subscriptions
        } else if !credential_subscriptions.is_empty() {
            tracing::debug!(
                subscription_count = credential_subscriptions.len(),
                "using subscriptions from credentials"
            );
            credential_subscriptions
        } else {
            tracing::debug!("no subscriptions specified, querying all subscriptions of the tenant");
            Vec::new()
        };

        Self {
            query: query.into(),
            subscriptions,
            management_groups,
            identity,
        }
    }
}

/// Runs a query and returns the `data` of the result.
///
/// Results are usually a list of records, count-like queries may return a
/// single map.
#[async_trait]
pub trait ResourceGraphQuery: Send + Sync {
    async fn query(
        &self,
        credentials: &CredentialSet,
        request: &QueryRequest,
    ) -> Result<Value, QueryError>;
}
