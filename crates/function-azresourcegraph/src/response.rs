//! Helpers to assemble a [`RunFunctionResponse`].

use std::time::Duration;

use crate::proto::{
    Condition, ConditionStatus, FunctionResult, Object, ResponseMeta, RunFunctionRequest,
    RunFunctionResponse, Severity, Target,
};

/// How long the pipeline runtime may cache a response by default.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Condition types set by this function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum ConditionType {
    FunctionSuccess,
    FunctionSkip,
}

/// Machine readable reasons attached to conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum ConditionReason {
    Success,
    InternalError,
    IntervalLimit,
    SkippedQuery,
}

impl RunFunctionResponse {
    /// Creates a response carrying over the desired state and the context of
    /// `request`, so that functions which do not touch them pass them through
    /// unchanged.
    pub fn to(request: &RunFunctionRequest, ttl: Duration) -> Self {
        Self {
            meta: ResponseMeta {
                tag: request.meta.tag.clone(),
                ttl: format!("{}s", ttl.as_secs()),
            },
            desired: request.desired.clone(),
            results: Vec::new(),
            context: request.context.clone(),
            conditions: Vec::new(),
        }
    }

    /// Replaces the resource of the desired composite, keeping its connection
    /// details and readiness.
    pub fn set_desired_composite_resource(&mut self, resource: Object) {
        self.desired.composite.get_or_insert_default().resource = resource;
    }

    /// Returns the desired composite resource, if any.
    pub fn desired_composite_resource(&self) -> Option<&Object> {
        self.desired
            .composite
            .as_ref()
            .map(|composite| &composite.resource)
    }

    /// Adds a fatal result. The pipeline runtime stops processing the
    /// pipeline when it sees one.
    pub fn fatal(&mut self, message: impl Into<String>) -> &mut FunctionResult {
        self.push_result(Severity::Fatal, message.into())
    }

    pub fn warning(&mut self, message: impl Into<String>) -> &mut FunctionResult {
        self.push_result(Severity::Warning, message.into())
    }

    pub fn normal(&mut self, message: impl Into<String>) -> &mut FunctionResult {
        self.push_result(Severity::Normal, message.into())
    }

    pub fn condition_true(
        &mut self,
        type_: ConditionType,
        reason: ConditionReason,
    ) -> &mut Condition {
        self.push_condition(type_, ConditionStatus::True, reason)
    }

    pub fn condition_false(
        &mut self,
        type_: ConditionType,
        reason: ConditionReason,
    ) -> &mut Condition {
        self.push_condition(type_, ConditionStatus::False, reason)
    }

    fn push_result(&mut self, severity: Severity, message: String) -> &mut FunctionResult {
        let index = self.results.len();
        self.results.push(FunctionResult {
            severity,
            message,
            target: Some(Target::Composite),
        });
        &mut self.results[index]
    }

    fn push_condition(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: ConditionReason,
    ) -> &mut Condition {
        let index = self.conditions.len();
        self.conditions.push(Condition {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: None,
            target: Some(Target::Composite),
        });
        &mut self.conditions[index]
    }
}

impl FunctionResult {
    pub fn target_composite_and_claim(&mut self) -> &mut Self {
        self.target = Some(Target::CompositeAndClaim);
        self
    }
}

impl Condition {
    pub fn with_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    pub fn target_composite_and_claim(&mut self) -> &mut Self {
        self.target = Some(Target::CompositeAndClaim);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::proto::{Resource, State};

    fn request() -> RunFunctionRequest {
        serde_json::from_value(json!({
            "meta": {"tag": "t-1"},
            "desired": {
                "composite": {
                    "resource": {"kind": "XR"},
                    "connectionDetails": {"password": "c2VjcmV0"}
                },
                "resources": {"db": {"resource": {"kind": "Database"}}}
            },
            "context": {"shared": {"key": "value"}}
        }))
        .expect("request deserializes")
    }

    #[test]
    fn to_copies_desired_state_and_context() {
        let request = request();
        let response = RunFunctionResponse::to(&request, DEFAULT_TTL);

        assert_eq!(response.meta, ResponseMeta {
            tag: "t-1".to_owned(),
            ttl: "60s".to_owned()
        });
        assert_eq!(response.desired, request.desired);
        assert_eq!(response.context, request.context);
        assert!(response.results.is_empty());
        assert!(response.conditions.is_empty());
    }

    #[test]
    fn set_desired_composite_keeps_connection_details() {
        let mut response = RunFunctionResponse::to(&request(), DEFAULT_TTL);
        let mut resource = Object::new();
        resource.insert("kind".to_owned(), json!("Other"));

        response.set_desired_composite_resource(resource.clone());

        let composite = response.desired.composite.expect("composite is set");
        assert_eq!(composite.resource, resource);
        assert_eq!(composite.connection_details["password"].0, b"secret");
    }

    #[test]
    fn set_desired_composite_creates_composite() {
        let mut response = RunFunctionResponse::to(&RunFunctionRequest::default(), DEFAULT_TTL);
        response.set_desired_composite_resource(Object::new());

        assert_eq!(response.desired, State {
            composite: Some(Resource::default()),
            ..Default::default()
        });
    }

    #[test]
    fn builders() {
        let mut response = RunFunctionResponse::default();
        response.warning("careful").target_composite_and_claim();
        response
            .condition_false(ConditionType::FunctionSuccess, ConditionReason::InternalError)
            .with_message("Something went wrong.")
            .target_composite_and_claim();

        assert_eq!(response.results, vec![FunctionResult {
            severity: Severity::Warning,
            message: "careful".to_owned(),
            target: Some(Target::CompositeAndClaim),
        }]);
        assert_eq!(response.conditions, vec![Condition {
            type_: "FunctionSuccess".to_owned(),
            status: ConditionStatus::False,
            reason: "InternalError".to_owned(),
            message: Some("Something went wrong.".to_owned()),
            target: Some(Target::CompositeAndClaim),
        }]);
    }
}
