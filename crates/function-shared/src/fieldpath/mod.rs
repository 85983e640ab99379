//! Field paths address nested locations inside a JSON document.
//!
//! Two surface syntaxes are accepted and produce the same [`FieldPath`]:
//!
//! - dot-separated segments: `status.nested.field`
//! - bracket-escaped segments for keys that contain dots themselves:
//!   `status.[complex.key].field`
//!
//! Bracketed segments are taken verbatim. There is no escaping of `]` inside
//! a bracketed segment, so keys containing `[` or `]` cannot be addressed.
//!
//! ```
//! use std::str::FromStr;
//! use function_shared::fieldpath::FieldPath;
//!
//! let path = FieldPath::from_str("nested.[app.kubernetes.io/name].value").unwrap();
//! assert_eq!(&*path, ["nested", "app.kubernetes.io/name", "value"]);
//! assert_eq!(path.to_string(), "nested.[app.kubernetes.io/name].value");
//! ```
use std::{fmt::Display, ops::Deref, str::FromStr, sync::LazyLock};

use regex::Regex;
use snafu::{Snafu, ensure};

mod paved;
pub use paved::*;

// Either a bracket group (capture 1) or a bare dot-delimited segment (capture 2)
static SEGMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\[\]]+)\]|([^.\[\]]+)").expect("failed to compile field path segment regex")
});

/// The error type for field path parsing.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum FieldPathError {
    /// Indicates that no segment could be extracted from the input, e.g. the
    /// input was empty or consisted only of separators.
    #[snafu(display("field path {input:?} does not contain any segments"))]
    Empty { input: String },
}

/// A parsed, non-empty sequence of path segments.
///
/// [`FieldPath`] implements [`Deref`] to a slice of segments, which enables
/// read-only access. The root of a document is never addressable by an empty
/// path, parsing such an input fails with [`FieldPathError::Empty`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FromStr for FieldPath {
    type Err = FieldPathError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let segments = SEGMENT_REGEX
            .captures_iter(input)
            .filter_map(|captures| captures.get(1).or_else(|| captures.get(2)))
            .map(|segment| segment.as_str().to_owned())
            .collect::<Vec<_>>();

        ensure!(!segments.is_empty(), EmptySnafu { input });

        Ok(Self(segments))
    }
}

impl Deref for FieldPath {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }

            if segment.contains('.') {
                write!(f, "[{segment}]")?;
            } else {
                f.write_str(segment)?;
            }
        }

        Ok(())
    }
}

impl FieldPath {
    /// Returns the parent segments and the last segment.
    pub fn split_last(&self) -> (&[String], &str) {
        match self.0.split_last() {
            Some((last, parents)) => (parents, last.as_str()),
            // A FieldPath always holds at least one segment
            None => (&[], ""),
        }
    }
}
