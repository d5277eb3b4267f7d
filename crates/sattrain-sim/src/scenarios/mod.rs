//! Training Scenarios
//!
//! A scenario fixes the initial spacecraft state, an ordered list of steps
//! the operator must complete, the delta-V budget and the time estimate used
//! by scoring:
//! - **orbital**: burn planning (LEO orbit raise)
//! - **operations**: subsystem recovery and payload operations

pub mod operations;
pub mod orbital;

use crate::engine::command::CommandKind;
use crate::engine::state::SpacecraftState;
use crate::core::Difficulty;
use crate::scoring::ScoringWeights;
use serde::{Deserialize, Serialize};

pub use operations::{payload_campaign, power_recovery};
pub use orbital::leo_orbit_raise;

/// One ordered step of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub id: String,
    pub title: String,
    /// Completing the step requires this command to succeed.
    pub expected_command: CommandKind,
    /// Planned burn size; used for burn accuracy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_delta_v_ms: Option<f64>,
    /// Ideal sim time (s) to complete the step.
    pub optimal_time_s: f64,
    /// Tolerance window (s) used by the timing score.
    pub window_s: f64,
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDefinition {
    pub id: String,
    pub title: String,
    pub description: String,
    pub default_difficulty: Difficulty,
    pub initial_state: SpacecraftState,
    pub steps: Vec<StepDefinition>,
    pub delta_v_budget_ms: f64,
    pub estimated_duration_s: f64,
    /// Scenario-specific weights; `None` uses the defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<ScoringWeights>,
}

impl ScenarioDefinition {
    pub fn weights(&self) -> ScoringWeights {
        self.weights.unwrap_or_default()
    }

    pub fn step(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    pub fn step_order(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }
}

pub(crate) fn step(
    id: &str,
    title: &str,
    expected_command: CommandKind,
    optimal_time_s: f64,
    window_s: f64,
    hint: &str,
) -> StepDefinition {
    StepDefinition {
        id: id.to_string(),
        title: title.to_string(),
        expected_command,
        planned_delta_v_ms: None,
        optimal_time_s,
        window_s,
        hint: hint.to_string(),
    }
}

/// Create a scenario by name
pub fn create_scenario(name: &str) -> Option<ScenarioDefinition> {
    match name.to_lowercase().replace('_', "-").as_str() {
        "leo-orbit-raise" | "orbit-raise" | "hohmann" => Some(leo_orbit_raise()),
        "power-recovery" | "power" => Some(power_recovery()),
        "payload-campaign" | "payload" => Some(payload_campaign()),
        _ => None,
    }
}

/// List all available scenarios
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "leo-orbit-raise",
            "Two-burn Hohmann transfer from 400 km to 470 km",
        ),
        (
            "power-recovery",
            "Recover a low battery after a stowed-array separation event",
        ),
        (
            "payload-campaign",
            "Point nadir and run an imaging pass within the contact window",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_listed_scenario_exists() {
        for (name, _) in list_scenarios() {
            let scenario = create_scenario(name).unwrap();
            assert_eq!(scenario.id, name);
        }
        assert!(create_scenario("lunar-landing").is_none());
        assert!(create_scenario("LEO_ORBIT_RAISE").is_some());
    }

    #[test]
    fn test_scenarios_are_well_formed() {
        for (name, _) in list_scenarios() {
            let scenario = create_scenario(name).unwrap();
            assert!(!scenario.steps.is_empty(), "{name}");
            assert!(scenario.estimated_duration_s > 0.0, "{name}");
            scenario.weights().validate().unwrap();

            let ids: HashSet<_> = scenario.steps.iter().map(|s| &s.id).collect();
            assert_eq!(ids.len(), scenario.steps.len(), "{name}");

            let planned: f64 = scenario
                .steps
                .iter()
                .filter_map(|s| s.planned_delta_v_ms)
                .sum();
            assert!(planned <= scenario.delta_v_budget_ms, "{name}");

            let times: Vec<f64> = scenario.steps.iter().map(|s| s.optimal_time_s).collect();
            assert!(times.windows(2).all(|w| w[0] <= w[1]), "{name}");
        }
    }
}
