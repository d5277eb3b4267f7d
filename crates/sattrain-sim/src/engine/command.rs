//! Operator command registry.
//!
//! Command names form a closed set (`CommandKind`); payloads are parsed into
//! a typed `Command` before any state is touched.

use crate::engine::state::{AttitudeMode, PowerBus};
use crate::error::SimError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Every command an operator can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    ArmPropulsion,
    DisarmPropulsion,
    ExecuteBurn,
    SetAttitudeMode,
    EnterSafeMode,
    ResetReactionWheels,
    DeploySolarArrays,
    SwitchPowerBus,
    ShedLoad,
    CycleHeaters,
    DeployRadiator,
    ResetTransponder,
    SwitchAntenna,
    IsolateThruster,
    PayloadOn,
    PayloadOff,
    RebootPayload,
    RequestHint,
}

impl CommandKind {
    pub const ALL: [CommandKind; 18] = [
        Self::ArmPropulsion,
        Self::DisarmPropulsion,
        Self::ExecuteBurn,
        Self::SetAttitudeMode,
        Self::EnterSafeMode,
        Self::ResetReactionWheels,
        Self::DeploySolarArrays,
        Self::SwitchPowerBus,
        Self::ShedLoad,
        Self::CycleHeaters,
        Self::DeployRadiator,
        Self::ResetTransponder,
        Self::SwitchAntenna,
        Self::IsolateThruster,
        Self::PayloadOn,
        Self::PayloadOff,
        Self::RebootPayload,
        Self::RequestHint,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ArmPropulsion => "ARM_PROPULSION",
            Self::DisarmPropulsion => "DISARM_PROPULSION",
            Self::ExecuteBurn => "EXECUTE_BURN",
            Self::SetAttitudeMode => "SET_ATTITUDE_MODE",
            Self::EnterSafeMode => "ENTER_SAFE_MODE",
            Self::ResetReactionWheels => "RESET_REACTION_WHEELS",
            Self::DeploySolarArrays => "DEPLOY_SOLAR_ARRAYS",
            Self::SwitchPowerBus => "SWITCH_POWER_BUS",
            Self::ShedLoad => "SHED_LOAD",
            Self::CycleHeaters => "CYCLE_HEATERS",
            Self::DeployRadiator => "DEPLOY_RADIATOR",
            Self::ResetTransponder => "RESET_TRANSPONDER",
            Self::SwitchAntenna => "SWITCH_ANTENNA",
            Self::IsolateThruster => "ISOLATE_THRUSTER",
            Self::PayloadOn => "PAYLOAD_ON",
            Self::PayloadOff => "PAYLOAD_OFF",
            Self::RebootPayload => "REBOOT_PAYLOAD",
            Self::RequestHint => "REQUEST_HINT",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| SimError::invalid_command(format!("unknown command '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BurnDirection {
    Prograde,
    Retrograde,
    Normal,
    AntiNormal,
    RadialOut,
    RadialIn,
}

/// A validated command with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ArmPropulsion,
    DisarmPropulsion,
    ExecuteBurn {
        delta_v_ms: f64,
        direction: BurnDirection,
    },
    SetAttitudeMode {
        mode: AttitudeMode,
    },
    EnterSafeMode,
    ResetReactionWheels,
    DeploySolarArrays,
    /// `None` toggles to the other bus.
    SwitchPowerBus {
        bus: Option<PowerBus>,
    },
    ShedLoad,
    CycleHeaters,
    DeployRadiator,
    ResetTransponder,
    SwitchAntenna,
    IsolateThruster,
    PayloadOn,
    PayloadOff,
    RebootPayload,
    RequestHint,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BurnPayload {
    #[serde(alias = "deltaV", alias = "delta_v")]
    delta_v_ms: f64,
    #[serde(default = "default_direction")]
    direction: BurnDirection,
}

fn default_direction() -> BurnDirection {
    BurnDirection::Prograde
}

#[derive(Deserialize)]
struct AttitudePayload {
    mode: AttitudeMode,
}

#[derive(Deserialize)]
struct BusPayload {
    #[serde(default)]
    bus: Option<PowerBus>,
}

fn parse_payload<T: for<'de> Deserialize<'de>>(kind: CommandKind, payload: &Value) -> Result<T, SimError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| SimError::invalid_command(format!("{} payload: {}", kind, e)))
}

impl Command {
    /// Parse and validate a payload for `kind`.
    pub fn parse(kind: CommandKind, payload: &Value) -> Result<Self, SimError> {
        let command = match kind {
            CommandKind::ArmPropulsion => Self::ArmPropulsion,
            CommandKind::DisarmPropulsion => Self::DisarmPropulsion,
            CommandKind::ExecuteBurn => {
                let burn: BurnPayload = parse_payload(kind, payload)?;
                if !burn.delta_v_ms.is_finite() || burn.delta_v_ms <= 0.0 {
                    return Err(SimError::invalid_command(
                        "burn delta-V must be a positive number",
                    ));
                }
                Self::ExecuteBurn {
                    delta_v_ms: burn.delta_v_ms,
                    direction: burn.direction,
                }
            }
            CommandKind::SetAttitudeMode => {
                let p: AttitudePayload = parse_payload(kind, payload)?;
                Self::SetAttitudeMode { mode: p.mode }
            }
            CommandKind::EnterSafeMode => Self::EnterSafeMode,
            CommandKind::ResetReactionWheels => Self::ResetReactionWheels,
            CommandKind::DeploySolarArrays => Self::DeploySolarArrays,
            CommandKind::SwitchPowerBus => {
                let bus = if payload.is_null() {
                    None
                } else {
                    parse_payload::<BusPayload>(kind, payload)?.bus
                };
                Self::SwitchPowerBus { bus }
            }
            CommandKind::ShedLoad => Self::ShedLoad,
            CommandKind::CycleHeaters => Self::CycleHeaters,
            CommandKind::DeployRadiator => Self::DeployRadiator,
            CommandKind::ResetTransponder => Self::ResetTransponder,
            CommandKind::SwitchAntenna => Self::SwitchAntenna,
            CommandKind::IsolateThruster => Self::IsolateThruster,
            CommandKind::PayloadOn => Self::PayloadOn,
            CommandKind::PayloadOff => Self::PayloadOff,
            CommandKind::RebootPayload => Self::RebootPayload,
            CommandKind::RequestHint => Self::RequestHint,
        };
        Ok(command)
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::ArmPropulsion => CommandKind::ArmPropulsion,
            Self::DisarmPropulsion => CommandKind::DisarmPropulsion,
            Self::ExecuteBurn { .. } => CommandKind::ExecuteBurn,
            Self::SetAttitudeMode { .. } => CommandKind::SetAttitudeMode,
            Self::EnterSafeMode => CommandKind::EnterSafeMode,
            Self::ResetReactionWheels => CommandKind::ResetReactionWheels,
            Self::DeploySolarArrays => CommandKind::DeploySolarArrays,
            Self::SwitchPowerBus { .. } => CommandKind::SwitchPowerBus,
            Self::ShedLoad => CommandKind::ShedLoad,
            Self::CycleHeaters => CommandKind::CycleHeaters,
            Self::DeployRadiator => CommandKind::DeployRadiator,
            Self::ResetTransponder => CommandKind::ResetTransponder,
            Self::SwitchAntenna => CommandKind::SwitchAntenna,
            Self::IsolateThruster => CommandKind::IsolateThruster,
            Self::PayloadOn => CommandKind::PayloadOn,
            Self::PayloadOff => CommandKind::PayloadOff,
            Self::RebootPayload => CommandKind::RebootPayload,
            Self::RequestHint => CommandKind::RequestHint,
        }
    }
}
