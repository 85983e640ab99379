//! Policies deciding whether a query can be skipped to avoid throttling by
//! the Azure Resource Graph API.
//!
//! Two gates are evaluated in order, the first one to trigger wins:
//!
//! 1. The interval gate skips the query if a status target was written less
//!    than `queryIntervalMinutes` ago. The write time is read from a
//!    `lastQueryTime` marker stored alongside the result.
//! 2. The has-data gate skips the query if `skipQueryWhenTargetHasData` is
//!    set and the target already holds data.
//!
//! Neither gate ever blocks because of missing or malformed data: a target
//! without a readable marker is queried.

use function_shared::fieldpath::has_data;
use jiff::{SignedDuration, Timestamp};
use serde_json::{Map, Value};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    input::QueryInput, proto::Object, reference::StatePath, response::ConditionReason,
};

/// Key of the marker recording when the result was written.
pub const LAST_QUERY_TIME: &str = "lastQueryTime";

#[derive(Debug, Snafu)]
pub enum LastQueryTimeError {
    #[snafu(display("no {LAST_QUERY_TIME} marker found"))]
    MissingMarker,

    #[snafu(display("{LAST_QUERY_TIME} marker is not a string"))]
    MarkerNotAString,

    #[snafu(display("failed to parse {LAST_QUERY_TIME} marker {value:?}"))]
    ParseMarker { source: jiff::Error, value: String },

    #[snafu(display("target data is neither a list nor a map"))]
    UnsupportedShape,
}

/// Why a query was skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    IntervalLimit { minutes: i64 },
    TargetHasData,
}

impl SkipReason {
    pub fn condition_reason(&self) -> ConditionReason {
        match self {
            Self::IntervalLimit { .. } => ConditionReason::IntervalLimit,
            Self::TargetHasData => ConditionReason::SkippedQuery,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::IntervalLimit { minutes } => {
                format!("Query skipped due to interval limit ({minutes} minutes)")
            }
            Self::TargetHasData => {
                "Target already has data, skipped query to avoid throttling".to_owned()
            }
        }
    }
}

/// The skip policies configured for one invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Gates {
    interval_minutes: Option<i64>,
    skip_when_target_has_data: bool,
}

impl Gates {
    pub fn new(interval_minutes: Option<i64>, skip_when_target_has_data: bool) -> Self {
        Self {
            interval_minutes: interval_minutes.filter(|minutes| *minutes > 0),
            skip_when_target_has_data,
        }
    }

    pub fn from_input(input: &QueryInput) -> Self {
        Self::new(
            input.query_interval_minutes(),
            input.skip_query_when_target_has_data(),
        )
    }

    /// The interval to stamp into results written to `target`.
    ///
    /// Context targets are never stamped.
    pub fn stamp_interval(&self, target: &StatePath) -> Option<i64> {
        match target {
            StatePath::Status(_) => self.interval_minutes,
            StatePath::Context(_) => None,
        }
    }

    /// Evaluates both gates against the current state of `target`.
    pub fn evaluate(
        &self,
        target: &StatePath,
        status: &Object,
        context: &Object,
        now: Timestamp,
    ) -> Option<SkipReason> {
        let current = target.lookup(status, context);

        if let (Some(minutes), Some(current)) = (self.stamp_interval(target), current) {
            if within_interval(current, minutes, now) {
                tracing::info!(path = %target, minutes, "skipping query due to interval limit");
                return Some(SkipReason::IntervalLimit { minutes });
            }
        }

        if self.skip_when_target_has_data && current.is_some_and(has_data) {
            tracing::info!(path = %target, "target already has data, skipping query");
            return Some(SkipReason::TargetHasData);
        }

        None
    }
}

/// Returns whether the result stored in `current` was written less than
/// `minutes` before `now`.
///
/// Any failure to read the marker lets the query proceed.
pub fn within_interval(current: &Value, minutes: i64, now: Timestamp) -> bool {
    match last_query_time(current) {
        Ok(last_query_time) => {
            let interval = SignedDuration::from_secs(minutes.saturating_mul(60));
            now.duration_since(last_query_time) < interval
        }
        Err(error) => {
            tracing::debug!(%error, "cannot determine last query time");
            false
        }
    }
}

/// Extracts the `lastQueryTime` marker from a stored result.
///
/// List results carry the marker in a trailing element, the last element
/// holding a string marker is used. Map results carry it as a key.
pub fn last_query_time(current: &Value) -> Result<Timestamp, LastQueryTimeError> {
    let marker = match current {
        Value::Array(items) => items
            .iter()
            .rev()
            .filter_map(Value::as_object)
            .filter_map(|item| item.get(LAST_QUERY_TIME))
            .find_map(Value::as_str)
            .context(MissingMarkerSnafu)?,
        Value::Object(object) => object
            .get(LAST_QUERY_TIME)
            .context(MissingMarkerSnafu)?
            .as_str()
            .context(MarkerNotAStringSnafu)?,
        _ => return UnsupportedShapeSnafu.fail(),
    };

    marker
        .parse::<Timestamp>()
        .context(ParseMarkerSnafu { value: marker })
}

/// Attaches a `lastQueryTime` marker for `now` to a query result.
///
/// List results get an additional `{"lastQueryTime": ...}` element, map
/// results an additional key. Other results are left untouched.
pub fn stamp_last_query_time(result: &mut Value, now: Timestamp) {
    let marker = Value::String(now.strftime("%Y-%m-%dT%H:%M:%SZ").to_string());

    match result {
        Value::Array(items) => {
            let mut element = Map::new();
            element.insert(LAST_QUERY_TIME.to_owned(), marker);
            items.push(Value::Object(element));
        }
        Value::Object(object) => {
            object.insert(LAST_QUERY_TIME.to_owned(), marker);
        }
        _ => tracing::debug!("result is neither a list nor a map, cannot add {LAST_QUERY_TIME}"),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;
    use serde_json::json;

    use super::*;

    const NOW: &str = "2025-06-01T12:00:00Z";

    fn now() -> Timestamp {
        NOW.parse().expect("valid timestamp")
    }

    fn minutes_ago(minutes: i64) -> String {
        (now() - SignedDuration::from_mins(minutes))
            .strftime("%Y-%m-%dT%H:%M:%SZ")
            .to_string()
    }

    fn object(value: Value) -> Object {
        serde_json::from_value(value).expect("test value must be an object")
    }

    fn target(input: &str) -> StatePath {
        StatePath::from_str(input).expect("valid target")
    }

    #[rstest]
    #[case::recent(Some(5), true)]
    #[case::expired(Some(15), false)]
    #[case::exactly_interval(Some(10), false)]
    #[case::no_marker(None, false)]
    fn interval_with_list_marker(#[case] last_query: Option<i64>, #[case] skip: bool) {
        let mut current = vec![json!({"name": "vm-1"})];
        if let Some(minutes) = last_query {
            current.push(json!({"lastQueryTime": minutes_ago(minutes)}));
        }

        assert_eq!(within_interval(&Value::Array(current), 10, now()), skip);
    }

    #[rstest]
    #[case::recent(json!({"count": 3, "lastQueryTime": minutes_ago(5)}), true)]
    #[case::expired(json!({"count": 3, "lastQueryTime": minutes_ago(15)}), false)]
    #[case::unparsable(json!({"lastQueryTime": "yesterday"}), false)]
    #[case::not_a_string(json!({"lastQueryTime": 1}), false)]
    #[case::no_offset(json!({"lastQueryTime": "2025-06-01T11:58:00"}), false)]
    #[case::scalar(json!("just a string"), false)]
    #[case::future(json!({"lastQueryTime": "2025-06-01T13:00:00Z"}), true)]
    fn interval_edge_cases(#[case] current: Value, #[case] skip: bool) {
        assert_eq!(within_interval(&current, 10, now()), skip);
    }

    #[test]
    fn last_marker_in_list_wins() {
        let current = json!([
            {"lastQueryTime": "2025-06-01T10:00:00Z"},
            {"name": "vm-1"},
            {"lastQueryTime": "2025-06-01T11:00:00Z"},
            {"lastQueryTime": false}
        ]);

        assert_eq!(
            last_query_time(&current).expect("marker is found"),
            "2025-06-01T11:00:00Z".parse::<Timestamp>().expect("valid")
        );
    }

    #[test]
    fn unparsable_last_marker_is_an_error() {
        let current = json!([{"lastQueryTime": "2025-06-01T10:00:00Z"}, {"lastQueryTime": "nope"}]);

        assert!(matches!(
            last_query_time(&current),
            Err(LastQueryTimeError::ParseMarker { .. })
        ));
    }

    #[rstest]
    #[case::list(json!([{"name": "vm-1"}]), json!([{"name": "vm-1"}, {"lastQueryTime": NOW}]))]
    #[case::empty_list(json!([]), json!([{"lastQueryTime": NOW}]))]
    #[case::map(json!({"count": 1}), json!({"count": 1, "lastQueryTime": NOW}))]
    #[case::scalar(json!(7), json!(7))]
    fn stamps_result(#[case] mut result: Value, #[case] expected: Value) {
        stamp_last_query_time(&mut result, now());
        assert_eq!(result, expected);
    }

    #[test]
    fn stamped_result_is_within_interval() {
        let mut result = json!([{"name": "vm-1"}]);
        stamp_last_query_time(&mut result, now());

        assert!(within_interval(&result, 1, now()));
    }

    #[test]
    fn interval_gate_only_applies_to_status_targets() {
        let data = json!([{"lastQueryTime": minutes_ago(1)}]);
        let status = object(json!({"result": data.clone()}));
        let context = object(json!({"result": data}));
        let gates = Gates::new(Some(10), false);

        assert_eq!(
            gates.evaluate(&target("status.result"), &status, &context, now()),
            Some(SkipReason::IntervalLimit { minutes: 10 })
        );
        assert_eq!(
            gates.evaluate(&target("context.result"), &status, &context, now()),
            None
        );
        assert_eq!(gates.stamp_interval(&target("context.result")), None);
    }

    #[rstest]
    #[case::status_with_data("status.result", true)]
    #[case::status_empty("status.empty", false)]
    #[case::status_missing("status.missing", false)]
    #[case::context_with_data("context.result", true)]
    #[case::context_empty("context.empty", false)]
    fn has_data_gate(#[case] input: &str, #[case] skip: bool) {
        let status = object(json!({"result": [{"name": "vm-1"}], "empty": []}));
        let context = object(json!({"result": {"count": 0}, "empty": ""}));
        let gates = Gates::new(None, true);

        assert_eq!(
            gates.evaluate(&target(input), &status, &context, now()),
            skip.then_some(SkipReason::TargetHasData)
        );
    }

    #[test]
    fn has_data_gate_disabled() {
        let status = object(json!({"result": [{"name": "vm-1"}]}));

        assert_eq!(
            Gates::new(None, false).evaluate(
                &target("status.result"),
                &status,
                &Object::new(),
                now()
            ),
            None
        );
    }

    #[test]
    fn interval_gate_is_evaluated_first() {
        let status = object(json!({"result": [{"lastQueryTime": minutes_ago(1)}]}));
        let gates = Gates::new(Some(10), true);

        assert_eq!(
            gates.evaluate(&target("status.result"), &status, &Object::new(), now()),
            Some(SkipReason::IntervalLimit { minutes: 10 })
        );
    }

    #[test]
    fn expired_interval_falls_through_to_has_data_gate() {
        let status = object(json!({"result": [{"lastQueryTime": minutes_ago(30)}]}));
        let gates = Gates::new(Some(10), true);

        assert_eq!(
            gates.evaluate(&target("status.result"), &status, &Object::new(), now()),
            Some(SkipReason::TargetHasData)
        );
    }

    #[rstest]
    #[case::zero(Some(0))]
    #[case::negative(Some(-1))]
    #[case::unset(None)]
    fn disabled_interval(#[case] minutes: Option<i64>) {
        let status = object(json!({"result": [{"lastQueryTime": minutes_ago(1)}]}));

        assert_eq!(
            Gates::new(minutes, false).evaluate(
                &target("status.result"),
                &status,
                &Object::new(),
                now()
            ),
            None
        );
    }

    #[test]
    fn skip_messages() {
        let interval = SkipReason::IntervalLimit { minutes: 10 };
        assert_eq!(interval.condition_reason(), ConditionReason::IntervalLimit);
        assert_eq!(
            interval.message(),
            "Query skipped due to interval limit (10 minutes)"
        );

        assert_eq!(
            SkipReason::TargetHasData.condition_reason(),
            ConditionReason::SkippedQuery
        );
        assert_eq!(
            SkipReason::TargetHasData.message(),
            "Target already has data, skipped query to avoid throttling"
        );
    }
}
