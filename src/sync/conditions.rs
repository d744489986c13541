//! Status conditions produced by a sync pass.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parent-level condition reporting in-flight changes.
pub const PROGRESSING_CONDITION: &str = "Progressing";

/// Parent-level condition reporting failed sync steps.
pub const DEGRADED_CONDITION: &str = "Degraded";

/// Reason of a condition for an in-flight change.
pub const PROGRESSING_REASON: &str = "Progressing";

/// Reason of a settled condition.
pub const AS_EXPECTED_REASON: &str = "AsExpected";

/// Reason of a condition raised by an error.
pub const ERROR_REASON: &str = "Error";

/// Reason of an aggregate built from several true conditions.
pub const MULTIPLE_REASONS: &str = "MultipleReasons";

/// Status of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// Not known.
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Status condition handed to the status writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. `ServiceAccountControllerProgressing`.
    #[serde(rename = "type")]
    pub type_: String,
    /// Status.
    pub status: ConditionStatus,
    /// Machine-readable reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
    /// Parent generation the condition was computed for.
    pub observed_generation: i64,
    /// Last time the status changed.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Creates a condition stamped with the current time.
    #[must_use]
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        observed_generation: i64,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }

    /// Returns true if the status is `True`.
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.type_, self.status, self.reason)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Mutating step recorded in a progressing condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    /// An apply that wrote to the store.
    Apply,
    /// A prune deletion.
    Delete,
}

impl fmt::Display for ProgressAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Appends a progressing condition for one mutating step.
pub fn add_progressing_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    kind: &str,
    key: &str,
    action: ProgressAction,
    observed_generation: i64,
) {
    conditions.push(Condition::new(
        condition_type,
        ConditionStatus::True,
        PROGRESSING_REASON,
        format!("Waiting for {kind} {key} to {action}"),
        observed_generation,
    ));
}

/// Folds conditions into one of type `aggregate_type`.
///
/// The result is `True` if any input is true, with their messages joined;
/// otherwise it is `False` with reason `AsExpected`.
#[must_use]
pub fn aggregate_conditions(
    conditions: &[Condition],
    aggregate_type: &str,
    observed_generation: i64,
) -> Condition {
    let active: Vec<&Condition> = conditions.iter().filter(|c| c.is_true()).collect();

    match active.as_slice() {
        [] => Condition::new(
            aggregate_type,
            ConditionStatus::False,
            AS_EXPECTED_REASON,
            "",
            observed_generation,
        ),
        [single] => Condition::new(
            aggregate_type,
            ConditionStatus::True,
            single.reason.clone(),
            single.message.clone(),
            observed_generation,
        ),
        many => Condition::new(
            aggregate_type,
            ConditionStatus::True,
            MULTIPLE_REASONS,
            many.iter()
                .map(|c| c.message.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            observed_generation,
        ),
    }
}

/// Inserts or replaces the condition of the same type.
///
/// The transition time of the previous condition is kept when the status
/// did not change.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

/// Finds a condition by type.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == condition_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_progressing_condition_message() {
        let mut conditions = Vec::new();
        add_progressing_condition(
            &mut conditions,
            "ServiceAccountControllerProgressing",
            "ServiceAccount",
            "default/old",
            ProgressAction::Delete,
            3,
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(
            conditions[0].to_string(),
            "ServiceAccountControllerProgressing=True (Progressing): \
             Waiting for ServiceAccount default/old to delete"
        );
        assert_eq!(conditions[0].observed_generation, 3);
    }

    #[test]
    fn test_aggregate_conditions() {
        let settled = aggregate_conditions(&[], PROGRESSING_CONDITION, 1);
        assert_eq!(settled.status, ConditionStatus::False);
        assert_eq!(settled.reason, AS_EXPECTED_REASON);

        let mut conditions = Vec::new();
        add_progressing_condition(&mut conditions, "A", "Secret", "ns/a", ProgressAction::Apply, 1);
        let single = aggregate_conditions(&conditions, PROGRESSING_CONDITION, 1);
        assert_eq!(single.reason, PROGRESSING_REASON);

        add_progressing_condition(&mut conditions, "B", "Secret", "ns/b", ProgressAction::Apply, 1);
        let many = aggregate_conditions(&conditions, PROGRESSING_CONDITION, 1);
        assert!(many.is_true());
        assert_eq!(many.reason, MULTIPLE_REASONS);
        assert_eq!(many.message.lines().count(), 2);
    }

    #[test]
    fn test_set_condition_keeps_transition_time() {
        let mut first =
            Condition::new("Degraded", ConditionStatus::False, AS_EXPECTED_REASON, "", 1);
        first.last_transition_time -= Duration::hours(1);
        let original = first.last_transition_time;
        let mut conditions = vec![first];

        set_condition(
            &mut conditions,
            Condition::new("Degraded", ConditionStatus::False, AS_EXPECTED_REASON, "", 2),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, original);
        assert_eq!(conditions[0].observed_generation, 2);

        set_condition(
            &mut conditions,
            Condition::new("Degraded", ConditionStatus::True, ERROR_REASON, "boom", 2),
        );
        assert_ne!(conditions[0].last_transition_time, original);
        assert!(find_condition(&conditions, "Degraded").is_some_and(Condition::is_true));
    }
}
