//! Spacecraft subsystem state.
//!
//! Each subsystem is a small record of numeric/enum fields. Anomaly
//! modifiers live next to the quantity they perturb so that effects can be
//! applied and removed additively.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for apsis radii.
pub const EARTH_RADIUS_KM: f64 = 6_371.0;

pub const BATTERY_MIN_PCT: f64 = 0.0;
pub const BATTERY_MAX_PCT: f64 = 100.0;
pub const BATTERY_LOW_PCT: f64 = 20.0;

/// Hard survival limits; reaching them is clamped and flagged.
pub const TEMP_MIN_C: f64 = -40.0;
pub const TEMP_MAX_C: f64 = 85.0;
/// Operating range; leaving it raises a limit alert.
pub const TEMP_OPERATING_MIN_C: f64 = -10.0;
pub const TEMP_OPERATING_MAX_C: f64 = 45.0;

pub const POINTING_ERROR_MAX_DEG: f64 = 180.0;
pub const WHEEL_SPEED_MAX_RPM: f64 = 6_000.0;
pub const SIGNAL_MARGIN_MIN_DB: f64 = -30.0;
pub const SIGNAL_MARGIN_MAX_DB: f64 = 30.0;

/// Subsystem tag used in tick reports and limit alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Orbit,
    Power,
    Attitude,
    Thermal,
    Propulsion,
    Payload,
    Communications,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrbitState {
    pub periapsis_km: f64,
    pub apoapsis_km: f64,
    pub inclination_deg: f64,
}

impl OrbitState {
    pub fn circular(altitude_km: f64, inclination_deg: f64) -> Self {
        Self {
            periapsis_km: altitude_km,
            apoapsis_km: altitude_km,
            inclination_deg,
        }
    }

    pub fn mean_altitude_km(&self) -> f64 {
        (self.periapsis_km + self.apoapsis_km) / 2.0
    }

    pub fn eccentricity(&self) -> f64 {
        let rp = EARTH_RADIUS_KM + self.periapsis_km;
        let ra = EARTH_RADIUS_KM + self.apoapsis_km;
        ((ra - rp) / (ra + rp)).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerBus {
    Primary,
    Backup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerState {
    pub battery_pct: f64,
    pub capacity_wh: f64,
    pub solar_nominal_w: f64,
    pub arrays_deployed: bool,
    pub bus: PowerBus,
    pub base_load_w: f64,
    pub load_shed: bool,
    /// 1.0 nominal; anomalies add negative deltas.
    pub solar_multiplier: f64,
    /// 1.0 nominal; anomalies add positive deltas.
    pub drain_multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttitudeMode {
    Safe,
    SunPointing,
    NadirPointing,
    Inertial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttitudeState {
    pub mode: AttitudeMode,
    pub pointing_error_deg: f64,
    pub wheel_speed_rpm: f64,
    pub drift_rate_deg_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermalState {
    pub temperature_c: f64,
    pub heaters_on: bool,
    pub radiator_deployed: bool,
    pub drift_c_per_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropulsionState {
    pub armed: bool,
    pub propellant_kg: f64,
    pub dry_mass_kg: f64,
    pub isp_s: f64,
    pub leak_kg_per_s: f64,
    pub thruster_isolated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadState {
    pub powered: bool,
    /// Active payload faults; additive so overlapping anomalies compose.
    pub fault_count: i32,
    pub data_collected_mb: f64,
}

impl PayloadState {
    pub fn is_operational(&self) -> bool {
        self.powered && self.fault_count <= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Antenna {
    HighGain,
    LowGain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommsState {
    pub antenna: Antenna,
    pub signal_margin_db: f64,
    /// Anomaly-induced margin offset (dB).
    pub margin_offset_db: f64,
}

/// Full spacecraft state for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpacecraftState {
    pub orbit: OrbitState,
    pub power: PowerState,
    pub attitude: AttitudeState,
    pub thermal: ThermalState,
    pub propulsion: PropulsionState,
    pub payload: PayloadState,
    pub comms: CommsState,
}

impl Default for SpacecraftState {
    fn default() -> Self {
        Self {
            orbit: OrbitState::circular(400.0, 51.6),
            power: PowerState {
                battery_pct: 85.0,
                capacity_wh: 1_200.0,
                solar_nominal_w: 600.0,
                arrays_deployed: true,
                bus: PowerBus::Primary,
                base_load_w: 320.0,
                load_shed: false,
                solar_multiplier: 1.0,
                drain_multiplier: 1.0,
            },
            attitude: AttitudeState {
                mode: AttitudeMode::SunPointing,
                pointing_error_deg: 0.5,
                wheel_speed_rpm: 1_500.0,
                drift_rate_deg_s: 0.0,
            },
            thermal: ThermalState {
                temperature_c: 20.0,
                heaters_on: false,
                radiator_deployed: false,
                drift_c_per_s: 0.0,
            },
            propulsion: PropulsionState {
                armed: false,
                propellant_kg: 40.0,
                dry_mass_kg: 460.0,
                isp_s: 220.0,
                leak_kg_per_s: 0.0,
                thruster_isolated: false,
            },
            payload: PayloadState {
                powered: false,
                fault_count: 0,
                data_collected_mb: 0.0,
            },
            comms: CommsState {
                antenna: Antenna::HighGain,
                signal_margin_db: 12.0,
                margin_offset_db: 0.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_orbit_has_zero_eccentricity() {
        let orbit = OrbitState::circular(500.0, 98.0);
        assert_eq!(orbit.eccentricity(), 0.0);
        assert_eq!(orbit.mean_altitude_km(), 500.0);
    }

    #[test]
    fn test_eccentricity_of_transfer_orbit() {
        let orbit = OrbitState {
            periapsis_km: 400.0,
            apoapsis_km: 470.0,
            inclination_deg: 51.6,
        };
        let e = orbit.eccentricity();
        assert!(e > 0.005 && e < 0.006, "eccentricity was {e}");
    }

    #[test]
    fn test_payload_operational_requires_power_and_no_faults() {
        let mut payload = SpacecraftState::default().payload;
        assert!(!payload.is_operational());
        payload.powered = true;
        assert!(payload.is_operational());
        payload.fault_count = 1;
        assert!(!payload.is_operational());
    }
}
