use super::{step, ScenarioDefinition};
use crate::core::Difficulty;
use crate::engine::command::CommandKind;
use crate::engine::state::SpacecraftState;

/// Raise a 400 km circular orbit to 470 km with a two-burn transfer.
///
/// Each burn is planned at 20 m/s; the first raises apoapsis, the second
/// (one half-orbit later in the compressed training timeline) circularizes.
pub fn leo_orbit_raise() -> ScenarioDefinition {
    let mut raise = step(
        "raise-apoapsis",
        "Raise apoapsis",
        CommandKind::ExecuteBurn,
        60.0,
        30.0,
        "Execute a 20 m/s prograde burn to raise apoapsis to 470 km",
    );
    raise.planned_delta_v_ms = Some(20.0);

    let mut circularize = step(
        "circularize",
        "Circularize at apoapsis",
        CommandKind::ExecuteBurn,
        180.0,
        45.0,
        "At apoapsis, execute a second 20 m/s prograde burn to raise periapsis",
    );
    circularize.planned_delta_v_ms = Some(20.0);

    ScenarioDefinition {
        id: "leo-orbit-raise".to_string(),
        title: "LEO Orbit Raise".to_string(),
        description: "Perform a Hohmann transfer from a 400 km parking orbit to a 470 km \
                      operational orbit while keeping the bus healthy"
            .to_string(),
        default_difficulty: Difficulty::Intermediate,
        initial_state: SpacecraftState::default(),
        steps: vec![
            step(
                "arm-propulsion",
                "Arm propulsion",
                CommandKind::ArmPropulsion,
                20.0,
                30.0,
                "Propulsion must be armed before any burn: send ARM_PROPULSION",
            ),
            step(
                "orient",
                "Orient for the burn",
                CommandKind::SetAttitudeMode,
                40.0,
                30.0,
                "Hold an inertial attitude for burns: SET_ATTITUDE_MODE with mode INERTIAL",
            ),
            raise,
            circularize,
            step(
                "disarm-propulsion",
                "Safe the propulsion system",
                CommandKind::DisarmPropulsion,
                210.0,
                60.0,
                "Transfer complete; send DISARM_PROPULSION",
            ),
        ],
        delta_v_budget_ms: 60.0,
        estimated_duration_s: 300.0,
        weights: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planned_burns_reach_target_orbit() {
        let scenario = leo_orbit_raise();
        let mut orbit = scenario.initial_state.orbit.clone();
        for dv in scenario.steps.iter().filter_map(|s| s.planned_delta_v_ms) {
            crate::engine::physics::apply_burn(
                &mut orbit,
                crate::engine::command::BurnDirection::Prograde,
                dv,
            );
        }
        assert_eq!(orbit.periapsis_km, 470.0);
        assert_eq!(orbit.apoapsis_km, 470.0);
    }
}
