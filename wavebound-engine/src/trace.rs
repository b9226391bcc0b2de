//! Explainability telemetry for weighted reward selection.

use serde::{Deserialize, Serialize};

/// One weighted draw, populated by every reward selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTrace {
    /// Identifier for the selection pool (e.g., `rewards.great`).
    pub pool_id: String,
    /// Random draw used to select from the weighted pool.
    pub roll: RollValue,
    /// Candidate weights considered during selection.
    pub candidates: Vec<WeightedCandidate>,
    /// Identifier of the selected candidate.
    pub chosen_id: String,
}

/// Candidate weight telemetry captured during selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedCandidate {
    pub id: String,
    /// Weight before the `max_weight` clamp.
    pub base_weight: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_weight: Option<u32>,
    pub final_weight: u32,
}

/// Random roll value used by weighted selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RollValue {
    U32(u32),
    /// Every tier was exhausted; the default reward was granted without a draw.
    Fallback,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_trace_roundtrips() {
        let trace = DecisionTrace {
            pool_id: String::from("rewards.great"),
            roll: RollValue::U32(7),
            candidates: vec![WeightedCandidate {
                id: String::from("POTION"),
                base_weight: 12,
                max_weight: Some(9),
                final_weight: 9,
            }],
            chosen_id: String::from("POTION"),
        };
        let json = serde_json::to_string(&trace).expect("serialize");
        let restored: DecisionTrace = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, trace);
        assert!(json.contains(r#""roll":{"kind":"u32","value":7}"#));
    }
}
