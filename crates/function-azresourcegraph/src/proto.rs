//! Serde representation of the composition function request and response
//! envelope.
//!
//! The types follow the JSON mapping of the `apiextensions.fn.proto.v1`
//! messages: field names are camelCase, enums use their protobuf value
//! names and `bytes` fields are base64 encoded strings.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use serde_json::{Map, Value};

/// A JSON object, used for resources, the function input and the pipeline
/// context.
pub type Object = Map<String, Value>;

/// Sent by the pipeline runtime once per reconciliation of a composite
/// resource.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunFunctionRequest {
    #[serde(default)]
    pub meta: RequestMeta,

    /// The state of the composite and composed resources as observed in the
    /// cluster.
    #[serde(default)]
    pub observed: State,

    /// The state accumulated by previous functions in the pipeline.
    #[serde(default)]
    pub desired: State,

    /// The function input as written in the composition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Object>,

    /// The context shared between functions of the same pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Object>,

    /// Credentials made available to this function, keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, CredentialSource>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    #[serde(default)]
    pub tag: String,
}

/// Observed or desired state of the composite resource and the resources
/// composed from it.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct State {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<Resource>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, Resource>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// The resource as an unstructured Kubernetes object.
    #[serde(default)]
    pub resource: Object,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub connection_details: BTreeMap<String, Base64Bytes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<Ready>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ready {
    ReadyUnspecified,
    ReadyTrue,
    ReadyFalse,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_data: Option<CredentialData>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialData {
    #[serde(default)]
    pub data: BTreeMap<String, Base64Bytes>,
}

/// Raw bytes, transported as a base64 encoded string.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Base64Bytes(pub Vec<u8>);

impl std::fmt::Debug for Base64Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Payloads are usually secrets
        write!(f, "Base64Bytes(<{} bytes>)", self.0.len())
    }
}

impl From<&[u8]> for Base64Bytes {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl Serialize for Base64Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map(Self).map_err(D::Error::custom)
    }
}

/// Returned to the pipeline runtime, see [`RunFunctionResponse::to`][1].
///
/// [1]: crate::response
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunFunctionResponse {
    pub meta: ResponseMeta,

    #[serde(default)]
    pub desired: State,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<FunctionResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Object>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(default)]
    pub tag: String,

    /// How long the response may be cached, as a protobuf duration string
    /// such as `60s`.
    #[serde(default)]
    pub ttl: String,
}

/// A human readable message surfaced to the user.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResult {
    pub severity: Severity,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, strum::Display)]
pub enum Severity {
    #[serde(rename = "SEVERITY_FATAL")]
    Fatal,

    #[serde(rename = "SEVERITY_WARNING")]
    Warning,

    #[serde(rename = "SEVERITY_NORMAL")]
    Normal,
}

/// Which resources a result or condition is reported on.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Target {
    #[serde(rename = "TARGET_COMPOSITE")]
    Composite,

    #[serde(rename = "TARGET_COMPOSITE_AND_CLAIM")]
    CompositeAndClaim,
}

/// A status condition set on the composite resource (and optionally its
/// claim).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum ConditionStatus {
    #[serde(rename = "STATUS_CONDITION_UNKNOWN")]
    Unknown,

    #[serde(rename = "STATUS_CONDITION_TRUE")]
    True,

    #[serde(rename = "STATUS_CONDITION_FALSE")]
    False,
}
