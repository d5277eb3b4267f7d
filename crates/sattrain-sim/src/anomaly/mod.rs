//! Anomaly Catalog
//!
//! Fault types form a closed registry: every `AnomalyKind` maps to exactly
//! one static `AnomalyDefinition` describing its effects, its corrective
//! command and its time-to-live.
//!
//! - **injector**: per-session probabilistic scheduling and lifecycle
//! - **policy**: difficulty-derived injection policy
//! - **timers**: cancellable check/expiry timers

pub mod injector;
pub mod policy;
pub mod timers;

pub use injector::{AnomalyInjector, AnomalyStats, AnomalyTarget};
pub use policy::InjectionPolicy;
pub use timers::{InjectionTimers, ManualTimers, TimerEvent, TokioTimers};

use crate::core::AnomalyId;
use crate::engine::command::CommandKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyCategory {
    Power,
    Attitude,
    Thermal,
    Communications,
    Propulsion,
    Payload,
}

impl AnomalyCategory {
    pub const ALL: [AnomalyCategory; 6] = [
        Self::Power,
        Self::Attitude,
        Self::Thermal,
        Self::Communications,
        Self::Propulsion,
        Self::Payload,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

/// Additive modifiers an anomaly applies to spacecraft state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnomalyEffects {
    pub solar_multiplier: f64,
    pub drain_multiplier: f64,
    pub attitude_drift_deg_s: f64,
    pub thermal_drift_c_s: f64,
    pub propellant_leak_kg_s: f64,
    pub signal_margin_db: f64,
    pub payload_faults: i32,
}

const NO_EFFECTS: AnomalyEffects = AnomalyEffects {
    solar_multiplier: 0.0,
    drain_multiplier: 0.0,
    attitude_drift_deg_s: 0.0,
    thermal_drift_c_s: 0.0,
    propellant_leak_kg_s: 0.0,
    signal_margin_db: 0.0,
    payload_faults: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    SolarArrayDegradation,
    BatteryCellFailure,
    ReactionWheelSaturation,
    StarTrackerDropout,
    HeaterCircuitTrip,
    ThermalRunaway,
    TransponderLockLoss,
    AntennaPointingFault,
    ThrusterValveLeak,
    PayloadProcessorHang,
    PayloadOvercurrent,
}

/// Static description of one fault type.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyDefinition {
    pub kind: AnomalyKind,
    pub name: &'static str,
    pub category: AnomalyCategory,
    pub severity: Severity,
    pub description: &'static str,
    pub recommended_action: &'static str,
    pub consequence: &'static str,
    pub corrective: CommandKind,
    pub ttl: Duration,
    pub recoverable: bool,
    pub effects: AnomalyEffects,
}

pub static CATALOG: [AnomalyDefinition; 11] = [
    AnomalyDefinition {
        kind: AnomalyKind::SolarArrayDegradation,
        name: "Solar array degradation",
        category: AnomalyCategory::Power,
        severity: Severity::Warning,
        description: "Array string currents dropped; solar input reduced by 40%",
        recommended_action: "Shed non-essential loads until the array string recovers",
        consequence: "Battery depth of discharge exceeded planning limits",
        corrective: CommandKind::ShedLoad,
        ttl: Duration::from_secs(120),
        recoverable: true,
        effects: AnomalyEffects {
            solar_multiplier: -0.4,
            ..NO_EFFECTS
        },
    },
    AnomalyDefinition {
        kind: AnomalyKind::BatteryCellFailure,
        name: "Battery cell failure",
        category: AnomalyCategory::Power,
        severity: Severity::Critical,
        description: "Shorted cell on the primary battery string; discharge rate elevated",
        recommended_action: "Switch to the backup power bus",
        consequence: "Primary battery string lost; spacecraft entered emergency power",
        corrective: CommandKind::SwitchPowerBus,
        ttl: Duration::from_secs(90),
        recoverable: true,
        effects: AnomalyEffects {
            drain_multiplier: 0.5,
            ..NO_EFFECTS
        },
    },
    AnomalyDefinition {
        kind: AnomalyKind::ReactionWheelSaturation,
        name: "Reaction wheel saturation",
        category: AnomalyCategory::Attitude,
        severity: Severity::Warning,
        description: "Wheel momentum near saturation; pointing error growing",
        recommended_action: "Reset reaction wheels to dump momentum",
        consequence: "Attitude control degraded; pointing budget exceeded",
        corrective: CommandKind::ResetReactionWheels,
        ttl: Duration::from_secs(120),
        recoverable: true,
        effects: AnomalyEffects {
            attitude_drift_deg_s: 0.05,
            ..NO_EFFECTS
        },
    },
    AnomalyDefinition {
        kind: AnomalyKind::StarTrackerDropout,
        name: "Star tracker dropout",
        category: AnomalyCategory::Attitude,
        severity: Severity::Critical,
        description: "Star tracker lost lock; attitude solution diverging",
        recommended_action: "Enter safe mode until the tracker reacquires",
        consequence: "Attitude knowledge lost; spacecraft tumbling",
        corrective: CommandKind::EnterSafeMode,
        ttl: Duration::from_secs(60),
        recoverable: true,
        effects: AnomalyEffects {
            attitude_drift_deg_s: 0.2,
            ..NO_EFFECTS
        },
    },
    AnomalyDefinition {
        kind: AnomalyKind::HeaterCircuitTrip,
        name: "Heater circuit trip",
        category: AnomalyCategory::Thermal,
        severity: Severity::Warning,
        description: "Survival heater breaker tripped; bus temperature falling",
        recommended_action: "Cycle the heater circuit",
        consequence: "Components dropped below survival temperature",
        corrective: CommandKind::CycleHeaters,
        ttl: Duration::from_secs(150),
        recoverable: true,
        effects: AnomalyEffects {
            thermal_drift_c_s: -0.04,
            ..NO_EFFECTS
        },
    },
    AnomalyDefinition {
        kind: AnomalyKind::ThermalRunaway,
        name: "Thermal runaway",
        category: AnomalyCategory::Thermal,
        severity: Severity::Critical,
        description: "Avionics temperature rising uncontrolled",
        recommended_action: "Deploy the auxiliary radiator",
        consequence: "Avionics exceeded qualification temperature",
        corrective: CommandKind::DeployRadiator,
        ttl: Duration::from_secs(75),
        recoverable: true,
        effects: AnomalyEffects {
            thermal_drift_c_s: 0.08,
            ..NO_EFFECTS
        },
    },
    AnomalyDefinition {
        kind: AnomalyKind::TransponderLockLoss,
        name: "Transponder lock loss",
        category: AnomalyCategory::Communications,
        severity: Severity::Warning,
        description: "Receiver lost carrier lock; link margin reduced",
        recommended_action: "Reset the transponder",
        consequence: "Ground contact lost for the remainder of the pass",
        corrective: CommandKind::ResetTransponder,
        ttl: Duration::from_secs(120),
        recoverable: true,
        effects: AnomalyEffects {
            signal_margin_db: -8.0,
            ..NO_EFFECTS
        },
    },
    AnomalyDefinition {
        kind: AnomalyKind::AntennaPointingFault,
        name: "Antenna pointing fault",
        category: AnomalyCategory::Communications,
        severity: Severity::Critical,
        description: "High-gain antenna gimbal stalled off-target",
        recommended_action: "Switch to the low-gain antenna",
        consequence: "Command link lost; autonomous safing triggered",
        corrective: CommandKind::SwitchAntenna,
        ttl: Duration::from_secs(60),
        recoverable: true,
        effects: AnomalyEffects {
            signal_margin_db: -15.0,
            ..NO_EFFECTS
        },
    },
    AnomalyDefinition {
        kind: AnomalyKind::ThrusterValveLeak,
        name: "Thruster valve leak",
        category: AnomalyCategory::Propulsion,
        severity: Severity::Critical,
        description: "Pressure decay on thruster branch A; propellant venting",
        recommended_action: "Isolate the leaking thruster branch",
        consequence: "Propellant reserve depleted below mission minimum",
        corrective: CommandKind::IsolateThruster,
        ttl: Duration::from_secs(90),
        recoverable: false,
        effects: AnomalyEffects {
            propellant_leak_kg_s: 0.02,
            ..NO_EFFECTS
        },
    },
    AnomalyDefinition {
        kind: AnomalyKind::PayloadProcessorHang,
        name: "Payload processor hang",
        category: AnomalyCategory::Payload,
        severity: Severity::Warning,
        description: "Payload processor watchdog expired; data collection halted",
        recommended_action: "Reboot the payload",
        consequence: "Collection window missed",
        corrective: CommandKind::RebootPayload,
        ttl: Duration::from_secs(150),
        recoverable: true,
        effects: AnomalyEffects {
            drain_multiplier: 0.1,
            payload_faults: 1,
            ..NO_EFFECTS
        },
    },
    AnomalyDefinition {
        kind: AnomalyKind::PayloadOvercurrent,
        name: "Payload overcurrent",
        category: AnomalyCategory::Payload,
        severity: Severity::Critical,
        description: "Payload power line drawing 3x nominal current",
        recommended_action: "Power off the payload",
        consequence: "Payload power converter damaged",
        corrective: CommandKind::PayloadOff,
        ttl: Duration::from_secs(60),
        recoverable: false,
        effects: AnomalyEffects {
            drain_multiplier: 0.3,
            payload_faults: 1,
            ..NO_EFFECTS
        },
    },
];

impl AnomalyKind {
    pub const ALL: [AnomalyKind; 11] = [
        Self::SolarArrayDegradation,
        Self::BatteryCellFailure,
        Self::ReactionWheelSaturation,
        Self::StarTrackerDropout,
        Self::HeaterCircuitTrip,
        Self::ThermalRunaway,
        Self::TransponderLockLoss,
        Self::AntennaPointingFault,
        Self::ThrusterValveLeak,
        Self::PayloadProcessorHang,
        Self::PayloadOvercurrent,
    ];

    pub fn definition(self) -> &'static AnomalyDefinition {
        // CATALOG is declared in the same order as the enum.
        &CATALOG[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SolarArrayDegradation => "solar_array_degradation",
            Self::BatteryCellFailure => "battery_cell_failure",
            Self::ReactionWheelSaturation => "reaction_wheel_saturation",
            Self::StarTrackerDropout => "star_tracker_dropout",
            Self::HeaterCircuitTrip => "heater_circuit_trip",
            Self::ThermalRunaway => "thermal_runaway",
            Self::TransponderLockLoss => "transponder_lock_loss",
            Self::AntennaPointingFault => "antenna_pointing_fault",
            Self::ThrusterValveLeak => "thruster_valve_leak",
            Self::PayloadProcessorHang => "payload_processor_hang",
            Self::PayloadOvercurrent => "payload_overcurrent",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an anomaly left the active set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum ResolutionCause {
    Command { command: CommandKind },
    Expired,
    SessionEnded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyResolution {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub cause: ResolutionCause,
}

/// One injected fault within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyState {
    pub id: AnomalyId,
    pub kind: AnomalyKind,
    pub category: AnomalyCategory,
    pub severity: Severity,
    pub injected_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub resolution: Option<AnomalyResolution>,
}

impl AnomalyState {
    pub fn definition(&self) -> &'static AnomalyDefinition {
        self.kind.definition()
    }
}

/// List all fault types with their descriptions.
pub fn list_anomalies() -> Vec<(&'static str, &'static str)> {
    CATALOG.iter().map(|d| (d.kind.as_str(), d.description)).collect()
}
