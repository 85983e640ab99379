//! The function input, as written in the `input` field of a composition
//! pipeline step.
//!
//! ```yaml
//! input:
//!   apiVersion: azresourcegraph.fn.crossplane.io/v1beta1
//!   kind: Input
//!   query: "Resources | project name, location | limit 5"
//!   target: "status.azResourceGraphQueryResult"
//! ```

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::proto::Object;

pub const API_VERSION: &str = "azresourcegraph.fn.crossplane.io/v1beta1";
pub const KIND: &str = "Input";

#[derive(Debug, Snafu)]
pub enum InputError {
    #[snafu(display("failed to deserialize input"))]
    Deserialize { source: serde_json::Error },
}

/// Configures a single Azure Resource Graph query.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryInput {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    /// Query in the Kusto Query Language.
    #[serde(default)]
    pub query: String,

    /// Reference (`status.` or `context.` prefixed) to the query string.
    ///
    /// Overrides [`Self::query`] when it resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_ref: Option<String>,

    /// Management groups to run the query against.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub management_groups: Vec<String>,

    /// Subscriptions to run the query against.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscriptions: Vec<String>,

    /// Reference (`status.` or `context.` prefixed) to a list of
    /// subscriptions.
    ///
    /// Overrides [`Self::subscriptions`] when it resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriptions_ref: Option<String>,

    /// Where to store the query result, either below `status.` or below
    /// `context.`.
    #[serde(default)]
    pub target: String,

    /// Skip the query when the target already holds data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_query_when_target_has_data: Option<bool>,

    /// Minimum number of minutes between two queries writing the same status
    /// target. Zero or negative values disable the interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_interval_minutes: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
}

impl QueryInput {
    /// Deserializes the input of a request. A missing input is treated like
    /// an empty one.
    pub fn from_object(input: Option<&Object>) -> Result<Self, InputError> {
        match input {
            Some(input) => serde_json::from_value(serde_json::Value::Object(input.clone()))
                .context(DeserializeSnafu),
            None => Ok(Self::default()),
        }
    }

    pub fn skip_query_when_target_has_data(&self) -> bool {
        self.skip_query_when_target_has_data.unwrap_or(false)
    }

    /// Returns the query interval if one is enabled.
    pub fn query_interval_minutes(&self) -> Option<i64> {
        self.query_interval_minutes.filter(|minutes| *minutes > 0)
    }

    pub fn identity_type(&self) -> IdentityType {
        self.identity
            .as_ref()
            .map(|identity| identity.type_)
            .unwrap_or_default()
    }
}

/// Identity used to authenticate against Azure.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Identity {
    #[serde(rename = "type", default)]
    pub type_: IdentityType,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, strum::Display,
)]
pub enum IdentityType {
    /// Client id and client secret of a service principal.
    #[default]
    AzureServicePrincipalCredentials,

    /// Federated token of an Azure workload identity.
    AzureWorkloadIdentityCredentials,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;

    fn object(value: Value) -> Object {
        serde_json::from_value(value).expect("test value must be an object")
    }

    #[test]
    fn full_input() {
        let input = QueryInput::from_object(Some(&object(json!({
            "apiVersion": API_VERSION,
            "kind": KIND,
            "query": "Resources | count",
            "queryRef": "context.q",
            "managementGroups": ["mg1"],
            "subscriptions": ["sub1", "sub2"],
            "subscriptionsRef": "status.subs",
            "target": "status.result",
            "skipQueryWhenTargetHasData": true,
            "queryIntervalMinutes": 10,
            "identity": {"type": "AzureWorkloadIdentityCredentials"},
            "unknown": "ignored"
        }))))
        .expect("input deserializes");

        assert_eq!(input, QueryInput {
            api_version: API_VERSION.to_owned(),
            kind: KIND.to_owned(),
            query: "Resources | count".to_owned(),
            query_ref: Some("context.q".to_owned()),
            management_groups: vec!["mg1".to_owned()],
            subscriptions: vec!["sub1".to_owned(), "sub2".to_owned()],
            subscriptions_ref: Some("status.subs".to_owned()),
            target: "status.result".to_owned(),
            skip_query_when_target_has_data: Some(true),
            query_interval_minutes: Some(10),
            identity: Some(Identity {
                type_: IdentityType::AzureWorkloadIdentityCredentials
            }),
        });
        assert!(input.skip_query_when_target_has_data());
        assert_eq!(input.query_interval_minutes(), Some(10));
        assert_eq!(
            input.identity_type(),
            IdentityType::AzureWorkloadIdentityCredentials
        );
    }

    #[test]
    fn defaults() {
        let input = QueryInput::from_object(None).expect("missing input is empty");

        assert_eq!(input, QueryInput::default());
        assert!(input.target.is_empty());
        assert!(!input.skip_query_when_target_has_data());
        assert_eq!(input.query_interval_minutes(), None);
        assert_eq!(
            input.identity_type(),
            IdentityType::AzureServicePrincipalCredentials
        );
    }

    #[rstest]
    #[case::zero(0, None)]
    #[case::negative(-5, None)]
    #[case::positive(1, Some(1))]
    fn query_interval(#[case] minutes: i64, #[case] expected: Option<i64>) {
        let input = QueryInput {
            query_interval_minutes: Some(minutes),
            ..Default::default()
        };
        assert_eq!(input.query_interval_minutes(), expected);
    }

    #[rstest]
    #[case::query_not_a_string(json!({"query": 42}))]
    #[case::unknown_identity(json!({"identity": {"type": "Password"}}))]
    #[case::interval_not_a_number(json!({"queryIntervalMinutes": "ten"}))]
    fn invalid_input(#[case] input: Value) {
        assert!(QueryInput::from_object(Some(&object(input))).is_err());
    }
}
