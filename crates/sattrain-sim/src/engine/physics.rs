//! Continuous-state integration and burn mechanics.
//!
//! The models are deliberately coarse: they only need to respond in the
//! right direction and at a plausible rate for operator training.

use crate::engine::command::BurnDirection;
use crate::engine::state::*;

pub const G0: f64 = 9.806_65;
/// Apsis change per m/s of delta-V in low Earth orbit.
pub const APSIS_KM_PER_MS: f64 = 3.5;
pub const ORBITAL_SPEED_MS: f64 = 7_660.0;
/// Below this the orbit is treated as circular.
pub const CIRCULAR_ECCENTRICITY: f64 = 0.001;

const HEATER_LOAD_W: f64 = 45.0;
const PAYLOAD_LOAD_W: f64 = 80.0;
const BACKUP_BUS_PENALTY_W: f64 = 15.0;
const LOAD_SHED_FACTOR: f64 = 0.7;
const STOWED_ARRAY_FACTOR: f64 = 0.2;

const HEATER_RATE_C_S: f64 = 0.03;
const PAYLOAD_RATE_C_S: f64 = 0.01;
const RADIATOR_RATE_C_S: f64 = 0.04;
const THERMAL_EQUILIBRIUM_C: f64 = 20.0;
const THERMAL_RELAXATION: f64 = 0.002;

const SAFE_MODE_DECAY: f64 = 0.01;
const ACTIVE_MODE_DECAY: f64 = 0.08;
const WHEEL_RPM_PER_DEG: f64 = 40.0;

const DATA_RATE_MB_S: f64 = 0.8;

/// Clamp in place; returns true when the value was out of range.
fn clamp_flag(value: &mut f64, lo: f64, hi: f64) -> bool {
    if value.is_nan() {
        *value = lo;
        return true;
    }
    let clamped = value.clamp(lo, hi);
    let changed = clamped != *value;
    *value = clamped;
    changed
}

/// Net electrical power in watts (positive charges the battery).
pub fn net_power_w(state: &SpacecraftState) -> f64 {
    let power = &state.power;
    let array_factor = if power.arrays_deployed {
        1.0
    } else {
        STOWED_ARRAY_FACTOR
    };
    let solar_w = power.solar_nominal_w * array_factor * power.solar_multiplier.max(0.0);

    let mut load_w = power.base_load_w;
    if state.thermal.heaters_on {
        load_w += HEATER_LOAD_W;
    }
    if state.payload.powered {
        load_w += PAYLOAD_LOAD_W;
    }
    if power.bus == PowerBus::Backup {
        load_w += BACKUP_BUS_PENALTY_W;
    }
    if power.load_shed {
        load_w *= LOAD_SHED_FACTOR;
    }
    load_w *= power.drain_multiplier.max(0.0);

    solar_w - load_w
}

/// Advance every continuous quantity by `dt_s` seconds.
///
/// Returns the subsystems whose values had to be clamped to their bounds.
pub fn integrate(state: &mut SpacecraftState, dt_s: f64) -> Vec<Subsystem> {
    let mut clamped = Vec::new();

    // Power
    let net_w = net_power_w(state);
    let power = &mut state.power;
    if power.capacity_wh > 0.0 {
        power.battery_pct += net_w * dt_s / 3_600.0 / power.capacity_wh * 100.0;
    }
    if clamp_flag(&mut power.battery_pct, BATTERY_MIN_PCT, BATTERY_MAX_PCT)
        && power.battery_pct <= BATTERY_MIN_PCT
    {
        clamped.push(Subsystem::Power);
    }

    // Thermal
    let thermal = &mut state.thermal;
    let mut rate = -(thermal.temperature_c - THERMAL_EQUILIBRIUM_C) * THERMAL_RELAXATION;
    if thermal.heaters_on {
        rate += HEATER_RATE_C_S;
    }
    if state.payload.powered {
        rate += PAYLOAD_RATE_C_S;
    }
    if thermal.radiator_deployed {
        rate -= RADIATOR_RATE_C_S;
    }
    rate += thermal.drift_c_per_s;
    thermal.temperature_c += rate * dt_s;
    if clamp_flag(&mut thermal.temperature_c, TEMP_MIN_C, TEMP_MAX_C) {
        clamped.push(Subsystem::Thermal);
    }

    // Attitude
    let attitude = &mut state.attitude;
    let decay = match attitude.mode {
        AttitudeMode::Safe => SAFE_MODE_DECAY,
        _ => ACTIVE_MODE_DECAY,
    };
    attitude.pointing_error_deg =
        attitude.pointing_error_deg * (-decay * dt_s).exp() + attitude.drift_rate_deg_s * dt_s;
    attitude.wheel_speed_rpm += attitude.drift_rate_deg_s.abs() * dt_s * WHEEL_RPM_PER_DEG;
    let pointing = clamp_flag(&mut attitude.pointing_error_deg, 0.0, POINTING_ERROR_MAX_DEG);
    let wheels = clamp_flag(&mut attitude.wheel_speed_rpm, 0.0, WHEEL_SPEED_MAX_RPM);
    if pointing || wheels {
        clamped.push(Subsystem::Attitude);
    }

    // Propulsion
    let propulsion = &mut state.propulsion;
    propulsion.propellant_kg -= propulsion.leak_kg_per_s.max(0.0) * dt_s;
    if clamp_flag(&mut propulsion.propellant_kg, 0.0, f64::MAX) {
        clamped.push(Subsystem::Propulsion);
    }

    // Communications
    let comms = &mut state.comms;
    let base_db = match comms.antenna {
        Antenna::HighGain => 12.0 - state.attitude.pointing_error_deg * 0.1,
        Antenna::LowGain => 4.0,
    };
    comms.signal_margin_db = base_db + comms.margin_offset_db;
    if clamp_flag(
        &mut comms.signal_margin_db,
        SIGNAL_MARGIN_MIN_DB,
        SIGNAL_MARGIN_MAX_DB,
    ) {
        clamped.push(Subsystem::Communications);
    }

    // Payload
    if state.payload.is_operational() && state.attitude.mode == AttitudeMode::NadirPointing {
        state.payload.data_collected_mb += DATA_RATE_MB_S * dt_s;
    }

    clamped
}

/// Propellant mass (kg) needed for `delta_v_ms` by the rocket equation.
pub fn propellant_for_burn(propulsion: &PropulsionState, delta_v_ms: f64) -> f64 {
    let wet_kg = propulsion.dry_mass_kg + propulsion.propellant_kg;
    wet_kg * (1.0 - (-delta_v_ms / (propulsion.isp_s * G0)).exp())
}

/// Apply an impulsive burn to the orbit.
///
/// Prograde burns on an eccentric orbit raise periapsis first (circularize);
/// on a circular orbit they raise apoapsis. Retrograde mirrors this.
pub fn apply_burn(orbit: &mut OrbitState, direction: BurnDirection, delta_v_ms: f64) {
    let dh = delta_v_ms * APSIS_KM_PER_MS;
    let eccentric = orbit.eccentricity() > CIRCULAR_ECCENTRICITY;

    match direction {
        BurnDirection::Prograde => {
            let gap = orbit.apoapsis_km - orbit.periapsis_km;
            if eccentric && dh <= gap {
                orbit.periapsis_km += dh;
            } else if eccentric {
                let excess = dh - gap;
                orbit.periapsis_km = orbit.apoapsis_km + excess / 2.0;
                orbit.apoapsis_km += excess / 2.0;
            } else {
                orbit.apoapsis_km += dh;
            }
        }
        BurnDirection::Retrograde => {
            let gap = orbit.apoapsis_km - orbit.periapsis_km;
            if eccentric && dh <= gap {
                orbit.apoapsis_km -= dh;
            } else if eccentric {
                let excess = dh - gap;
                orbit.apoapsis_km = orbit.periapsis_km - excess / 2.0;
                orbit.periapsis_km -= excess / 2.0;
            } else {
                orbit.periapsis_km -= dh;
            }
        }
        BurnDirection::Normal => {
            orbit.inclination_deg += (delta_v_ms / ORBITAL_SPEED_MS).to_degrees();
        }
        BurnDirection::AntiNormal => {
            orbit.inclination_deg -= (delta_v_ms / ORBITAL_SPEED_MS).to_degrees();
        }
        BurnDirection::RadialOut => {
            orbit.apoapsis_km += dh / 2.0;
            orbit.periapsis_km -= dh / 2.0;
        }
        BurnDirection::RadialIn => {
            let half = (dh / 2.0).min((orbit.apoapsis_km - orbit.periapsis_km) / 2.0);
            orbit.apoapsis_km -= half;
            orbit.periapsis_km += half;
        }
    }

    orbit.periapsis_km = orbit.periapsis_km.max(0.0);
    if orbit.periapsis_km > orbit.apoapsis_km {
        std::mem::swap(&mut orbit.periapsis_km, &mut orbit.apoapsis_km);
    }
}
