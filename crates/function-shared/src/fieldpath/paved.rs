use serde_json::{Map, Value};
use snafu::{OptionExt, Snafu};

use super::FieldPath;

/// The error type for reading and writing values at a [`FieldPath`].
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum PavedError {
    /// Indicates that a segment of the path is absent, or that the node the
    /// segment should be looked up in is not an object.
    #[snafu(display("no value found at {path}: segment {segment:?} does not exist"))]
    NotFound { path: String, segment: String },

    /// Indicates that an intermediate segment names an existing value which
    /// is not an object and therefore cannot be descended into.
    #[snafu(display("cannot set {path}: {segment:?} exists but is not an object"))]
    TypeConflict { path: String, segment: String },
}

/// Path addressed access into a JSON object tree.
///
/// This is implemented for [`serde_json::Map`], which is how both the
/// composite resource status and the pipeline context are represented.
pub trait Paved {
    /// Returns the value at `path`, whatever its type.
    ///
    /// Fails as soon as a segment is absent or the current node is not an
    /// object.
    fn get_path(&self, path: &FieldPath) -> Result<&Value, PavedError>;

    /// Writes `value` at `path`, replacing whatever was stored there before.
    ///
    /// Missing intermediate objects are created. Sibling keys at every level
    /// are left untouched. Fails if an intermediate segment names an
    /// existing non-object value.
    fn set_path(&mut self, path: &FieldPath, value: Value) -> Result<(), PavedError>;

    /// Returns whether `path` currently holds meaningful data, see
    /// [`has_data`].
    ///
    /// An absent path never holds data.
    fn has_data_at(&self, path: &FieldPath) -> bool {
        self.get_path(path).is_ok_and(has_data)
    }
}

impl Paved for Map<String, Value> {
    fn get_path(&self, path: &FieldPath) -> Result<&Value, PavedError> {
        let (parents, last) = path.split_last();
        let mut current = self;

        for segment in parents {
            current = current
                .get(segment)
                .and_then(Value::as_object)
                .with_context(|| NotFoundSnafu {
                    path: path.to_string(),
                    segment,
                })?;
        }

        current.get(last).context(NotFoundSnafu {
            path: path.to_string(),
            segment: last,
        })
    }

    fn set_path(&mut self, path: &FieldPath, value: Value) -> Result<(), PavedError> {
        let (parents, last) = path.split_last();
        let mut current = self;

        for segment in parents {
            current = current
                .entry(segment.as_str())
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .with_context(|| TypeConflictSnafu {
                    path: path.to_string(),
                    segment,
                })?;
        }

        current.insert(last.to_owned(), value);
        Ok(())
    }
}

/// Returns whether `value` is meaningful data.
///
/// `null`, empty objects, empty arrays and empty strings hold no data.
/// Numbers, booleans, non-empty strings and non-empty collections do, so
/// `0` and `false` count as data.
pub fn has_data(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(object) => !object.is_empty(),
        Value::Array(array) => !array.is_empty(),
        Value::String(string) => !string.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
