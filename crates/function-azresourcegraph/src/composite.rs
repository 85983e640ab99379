//! Reconciles the observed and the desired composite resource into the
//! status this function reads from and writes to.
//!
//! Earlier functions in the pipeline may already have written to the status
//! of the desired composite resource. Those writes are only visible in the
//! request's desired state, while the observed state carries the status as it
//! was last persisted in the cluster. The desired status wins when it holds
//! anything, otherwise the observed status is used as the base.

use serde_json::{Map, Value};

use crate::proto::Object;

const API_VERSION: &str = "apiVersion";
const KIND: &str = "kind";
const METADATA: &str = "metadata";
const NAME: &str = "name";
const STATUS: &str = "status";

/// The desired composite resource together with the working status.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Composite {
    resource: Object,
    status: Object,
}

impl Composite {
    /// Builds the working state from the observed and desired composite
    /// resources.
    ///
    /// A desired composite without a kind has not been touched by any
    /// function yet. Its identity (`apiVersion`, `kind` and `metadata.name`)
    /// is copied from the observed composite.
    pub fn reconcile(observed: Option<&Object>, desired: Option<&Object>) -> Self {
        let empty = Object::new();
        let observed = observed.unwrap_or(&empty);
        let mut resource = desired.cloned().unwrap_or_default();

        if string_field(&resource, KIND).is_empty() {
            copy_identity(observed, &mut resource);
        }

        let status = match object_field(&resource, STATUS) {
            Some(status) if !status.is_empty() => status.clone(),
            _ => {
                tracing::debug!("desired composite has no status, falling back to observed status");
                object_field(observed, STATUS).cloned().unwrap_or_default()
            }
        };

        Self { resource, status }
    }

    /// Writes the working status onto the desired composite if it holds
    /// anything.
    ///
    /// This carries the status written by earlier pipeline steps (or the
    /// observed status) forward, whether or not this invocation writes a
    /// query result.
    pub fn propagate_status(&mut self) {
        if !self.status.is_empty() {
            self.write_status();
        }
    }

    /// Unconditionally replaces the status of the desired composite with the
    /// working status.
    pub fn write_status(&mut self) {
        self.resource
            .insert(STATUS.to_owned(), Value::Object(self.status.clone()));
    }

    pub fn status(&self) -> &Object {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut Object {
        &mut self.status
    }

    /// The desired composite resource, as it should be returned to the
    /// pipeline runtime.
    pub fn resource(&self) -> &Object {
        &self.resource
    }
}

fn copy_identity(observed: &Object, desired: &mut Object) {
    desired.insert(
        API_VERSION.to_owned(),
        Value::String(string_field(observed, API_VERSION).to_owned()),
    );
    desired.insert(
        KIND.to_owned(),
        Value::String(string_field(observed, KIND).to_owned()),
    );

    let name = object_field(observed, METADATA)
        .map(|metadata| string_field(metadata, NAME))
        .unwrap_or_default();

    if !name.is_empty() {
        let metadata = desired
            .entry(METADATA)
            .or_insert_with(|| Value::Object(Map::new()));

        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }

        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert(NAME.to_owned(), Value::String(name.to_owned()));
        }
    }
}

fn string_field<'a>(object: &'a Object, key: &str) -> &'a str {
    object.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn object_field<'a>(object: &'a Object, key: &str) -> Option<&'a Object> {
    object.get(key).and_then(Value::as_object)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Object {
        serde_json::from_value(value).expect("test value must be an object")
    }

    fn observed() -> Object {
        object(json!({
            "apiVersion": "example.org/v1",
            "kind": "XNetwork",
            "metadata": {"name": "net-1", "uid": "1234"},
            "spec": {"region": "westeurope"},
            "status": {"observed": "value"}
        }))
    }

    #[test]
    fn copies_identity_into_empty_desired() {
        let composite = Composite::reconcile(Some(&observed()), None);

        assert_eq!(
            Value::Object(composite.resource().clone()),
            json!({
                "apiVersion": "example.org/v1",
                "kind": "XNetwork",
                "metadata": {"name": "net-1"}
            })
        );
        assert_eq!(
            Value::Object(composite.status().clone()),
            json!({"observed": "value"})
        );
    }

    #[test]
    fn identity_without_observed() {
        let mut composite = Composite::reconcile(None, None);
        composite.propagate_status();

        assert_eq!(
            Value::Object(composite.resource().clone()),
            json!({"apiVersion": "", "kind": ""})
        );
        assert!(composite.status().is_empty());
    }

    #[test]
    fn keeps_identity_of_touched_desired() {
        let desired = object(json!({
            "apiVersion": "example.org/v2",
            "kind": "XNetwork",
            "spec": {"desired": true}
        }));
        let composite = Composite::reconcile(Some(&observed()), Some(&desired));

        assert_eq!(composite.resource(), &desired);
    }

    #[test]
    fn desired_status_wins() {
        let desired = object(json!({
            "kind": "XNetwork",
            "status": {"fromEarlierStep": [1, 2]}
        }));
        let composite = Composite::reconcile(Some(&observed()), Some(&desired));

        assert_eq!(
            Value::Object(composite.status().clone()),
            json!({"fromEarlierStep": [1, 2]})
        );
    }

    #[test]
    fn empty_desired_status_falls_back_to_observed() {
        let desired = object(json!({"kind": "XNetwork", "status": {}}));
        let composite = Composite::reconcile(Some(&observed()), Some(&desired));

        assert_eq!(
            Value::Object(composite.status().clone()),
            json!({"observed": "value"})
        );
    }

    #[test]
    fn propagate_writes_observed_status_to_desired() {
        let mut composite = Composite::reconcile(Some(&observed()), None);
        composite.propagate_status();

        assert_eq!(
            composite.resource().get("status"),
            Some(&json!({"observed": "value"}))
        );
    }

    #[test]
    fn write_status_keeps_siblings() {
        let desired = object(json!({
            "kind": "XNetwork",
            "status": {"a": 1}
        }));
        let mut composite = Composite::reconcile(Some(&observed()), Some(&desired));
        composite
            .status_mut()
            .insert("b".to_owned(), json!(2));
        composite.write_status();

        assert_eq!(
            composite.resource().get("status"),
            Some(&json!({"a": 1, "b": 2}))
        );
    }
}
