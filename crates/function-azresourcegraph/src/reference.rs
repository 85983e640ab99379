//! Paths into the composite status or the pipeline context, and resolution
//! of the `queryRef` and `subscriptionsRef` references.

use std::{fmt, str::FromStr};

use function_shared::fieldpath::{FieldPath, FieldPathError, Paved};
use serde_json::Value;
use snafu::{ResultExt, Snafu};

use crate::proto::Object;

const STATUS_PREFIX: &str = "status.";
const CONTEXT_PREFIX: &str = "context.";

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum StatePathError {
    #[snafu(display("{input:?} does not start with {STATUS_PREFIX:?} or {CONTEXT_PREFIX:?}"))]
    UnrecognizedRoot { input: String },

    #[snafu(display("invalid field path in {input:?}"))]
    InvalidPath {
        source: FieldPathError,
        input: String,
    },
}

/// A location either in the status of the composite resource or in the
/// pipeline context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatePath {
    Status(FieldPath),
    Context(FieldPath),
}

impl FromStr for StatePath {
    type Err = StatePathError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (variant, rest): (fn(FieldPath) -> Self, _) =
            if let Some(rest) = input.strip_prefix(STATUS_PREFIX) {
                (Self::Status, rest)
            } else if let Some(rest) = input.strip_prefix(CONTEXT_PREFIX) {
                (Self::Context, rest)
            } else {
                return UnrecognizedRootSnafu { input }.fail();
            };

        let path = FieldPath::from_str(rest).context(InvalidPathSnafu { input })?;
        Ok(variant(path))
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(path) => write!(f, "{STATUS_PREFIX}{path}"),
            Self::Context(path) => write!(f, "{CONTEXT_PREFIX}{path}"),
        }
    }
}

impl StatePath {
    pub fn field_path(&self) -> &FieldPath {
        match self {
            Self::Status(path) | Self::Context(path) => path,
        }
    }

    /// Picks the tree this path points into.
    pub fn tree<'a>(&self, status: &'a Object, context: &'a Object) -> &'a Object {
        match self {
            Self::Status(_) => status,
            Self::Context(_) => context,
        }
    }

    /// Returns the value this path points at, if any.
    pub fn lookup<'a>(&self, status: &'a Object, context: &'a Object) -> Option<&'a Value> {
        self.tree(status, context)
            .get_path(self.field_path())
            .ok()
    }
}

/// The reference names neither the status nor the context.
///
/// Any other resolution problem leaves the reference unresolved instead.
#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(display("unrecognized reference {reference:?}"))]
pub struct UnrecognizedReference {
    pub reference: String,
}

/// Resolves a reference to a query string.
///
/// Returns `None` if the path is absent or does not hold a string.
pub fn resolve_query(
    reference: &str,
    status: &Object,
    context: &Object,
) -> Result<Option<String>, UnrecognizedReference> {
    let resolved = resolve(reference, status, context)?
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);
    Ok(resolved)
}

/// Resolves a reference to a list of subscription IDs.
///
/// Returns `None` if the path is absent or does not hold a list of strings.
/// An empty list resolves.
pub fn resolve_subscriptions(
    reference: &str,
    status: &Object,
    context: &Object,
) -> Result<Option<Vec<String>>, UnrecognizedReference> {
    let resolved = resolve(reference, status, context)?
        .and_then(Value::as_array)
        .and_then(|items| {
            items
                .iter()
                .map(|item| item.as_str().map(ToOwned::to_owned))
                .collect::<Option<Vec<_>>>()
        });
    Ok(resolved)
}

fn resolve<'a>(
    reference: &str,
    status: &'a Object,
    context: &'a Object,
) -> Result<Option<&'a Value>, UnrecognizedReference> {
    match StatePath::from_str(reference) {
        Ok(path) => Ok(path.lookup(status, context)),
        Err(StatePathError::InvalidPath { .. }) => {
            tracing::debug!(reference, "reference contains no field path");
            Ok(None)
        }
        Err(StatePathError::UnrecognizedRoot { .. }) => {
            UnrecognizedReferenceSnafu { reference }.fail()
        }
    }
}
