// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::conditions::READY;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    /// Build a `Ready` condition; the transition time is filled in by [`upsert_condition`].
    pub fn ready(ready: bool, reason: &str, message: impl Into<String>) -> Self {
        Condition {
            condition_type: READY.to_string(),
            status: if ready { "True" } else { "False" }.to_string(),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
            last_transition_time: None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Insert `condition`, replacing any condition of the same type.
///
/// The transition time only moves when the status flips, so repeated
/// reconciliations with the same outcome leave the timestamp untouched.
pub fn upsert_condition(conditions: &mut Vec<Condition>, mut condition: Condition, now: DateTime<Utc>) {
    let now = now.to_rfc3339_opts(SecondsFormat::Secs, true);

    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        Some(existing) => {
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time.clone().or(Some(now))
            } else {
                Some(now)
            };
            *existing = condition;
        }
        None => {
            condition.last_transition_time = Some(now);
            conditions.push(condition);
        }
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_upsert_appends_new_type() {
        let mut conditions = Vec::new();
        upsert_condition(&mut conditions, Condition::ready(true, "Synced", "ok"), at(0));

        assert_eq!(conditions.len(), 1);
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("1970-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_upsert_keeps_single_ready_condition() {
        let mut conditions = Vec::new();
        upsert_condition(&mut conditions, Condition::ready(true, "Synced", "ok"), at(0));
        upsert_condition(&mut conditions, Condition::ready(false, "Errored", "boom"), at(10));
        upsert_condition(&mut conditions, Condition::ready(false, "Errored", "boom again"), at(20));

        assert_eq!(conditions.len(), 1);
        let ready = find_condition(&conditions, READY).unwrap();
        assert_eq!(ready.status, "False");
        assert_eq!(ready.message.as_deref(), Some("boom again"));
        // status did not change between the last two updates
        assert_eq!(
            ready.last_transition_time.as_deref(),
            Some("1970-01-01T00:00:10Z")
        );
    }

    #[test]
    fn test_upsert_leaves_other_types_alone() {
        let mut conditions = vec![Condition {
            condition_type: "Deleted".to_string(),
            status: "True".to_string(),
            reason: None,
            message: None,
            last_transition_time: None,
        }];
        upsert_condition(&mut conditions, Condition::ready(true, "Synced", "ok"), at(0));

        assert_eq!(conditions.len(), 2);
        assert!(find_condition(&conditions, "Deleted").unwrap().is_true());
        assert!(find_condition(&conditions, READY).unwrap().is_true());
    }
}
