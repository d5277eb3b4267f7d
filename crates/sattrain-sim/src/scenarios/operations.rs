use super::{step, ScenarioDefinition};
use crate::core::Difficulty;
use crate::engine::command::CommandKind;
use crate::engine::state::{AttitudeMode, SpacecraftState};
use crate::scoring::ScoringWeights;

/// Low battery with stowed arrays after separation.
pub fn power_recovery() -> ScenarioDefinition {
    let mut initial_state = SpacecraftState::default();
    initial_state.power.battery_pct = 35.0;
    initial_state.power.arrays_deployed = false;
    initial_state.attitude.mode = AttitudeMode::Safe;
    initial_state.attitude.pointing_error_deg = 25.0;
    initial_state.attitude.wheel_speed_rpm = 4_200.0;

    ScenarioDefinition {
        id: "power-recovery".to_string(),
        title: "Power Recovery".to_string(),
        description: "Bring a power-negative spacecraft back to a positive energy balance"
            .to_string(),
        default_difficulty: Difficulty::Beginner,
        initial_state,
        steps: vec![
            step(
                "deploy-arrays",
                "Deploy solar arrays",
                CommandKind::DeploySolarArrays,
                30.0,
                30.0,
                "Stowed arrays produce a fraction of nominal power: send DEPLOY_SOLAR_ARRAYS",
            ),
            step(
                "shed-load",
                "Shed non-essential loads",
                CommandKind::ShedLoad,
                60.0,
                45.0,
                "Reduce bus load while the battery recovers: send SHED_LOAD",
            ),
            step(
                "dump-momentum",
                "Dump wheel momentum",
                CommandKind::ResetReactionWheels,
                90.0,
                45.0,
                "Wheels are near saturation; send RESET_REACTION_WHEELS before leaving safe mode",
            ),
            step(
                "sun-point",
                "Point arrays at the sun",
                CommandKind::SetAttitudeMode,
                120.0,
                60.0,
                "SET_ATTITUDE_MODE with mode SUN_POINTING maximizes array output",
            ),
        ],
        delta_v_budget_ms: 0.0,
        estimated_duration_s: 240.0,
        weights: Some(ScoringWeights {
            coverage: 0.45,
            efficiency: 0.1,
            safety: 0.3,
            timing: 0.15,
        }),
    }
}

/// Nadir-pointed imaging pass.
pub fn payload_campaign() -> ScenarioDefinition {
    ScenarioDefinition {
        id: "payload-campaign".to_string(),
        title: "Payload Campaign".to_string(),
        description: "Configure the spacecraft for an imaging pass and downlink the take"
            .to_string(),
        default_difficulty: Difficulty::Advanced,
        initial_state: SpacecraftState::default(),
        steps: vec![
            step(
                "nadir-point",
                "Point nadir",
                CommandKind::SetAttitudeMode,
                30.0,
                30.0,
                "Imaging requires SET_ATTITUDE_MODE with mode NADIR_POINTING",
            ),
            step(
                "payload-on",
                "Power the payload",
                CommandKind::PayloadOn,
                60.0,
                30.0,
                "Send PAYLOAD_ON once pointing has settled",
            ),
            step(
                "heaters",
                "Stabilize payload temperature",
                CommandKind::CycleHeaters,
                120.0,
                60.0,
                "Cycle the heaters to hold the detector in its operating range",
            ),
            step(
                "payload-off",
                "End the pass",
                CommandKind::PayloadOff,
                300.0,
                90.0,
                "The pass is over; send PAYLOAD_OFF to protect the detector",
            ),
        ],
        delta_v_budget_ms: 0.0,
        estimated_duration_s: 360.0,
        weights: None,
    }
}
