//! Static per-type behavior parameters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{Appliance, ApplianceKind};
use crate::config::ConfigError;

/// Probability ceiling applied inside peak hours.
const PEAK_PROBABILITY_CAP: f64 = 0.95;
/// Probability floor applied inside off hours.
const OFF_PROBABILITY_FLOOR: f64 = 0.05;

/// How an appliance's active power draw responds to its temperature.
///
/// The factor is a normalized deviation, clamped at zero, that scales the
/// drawn base power by `1 + factor * 0.4`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case", deny_unknown_fields)]
pub enum ThermalCoupling {
    /// Power is independent of temperature; a multiplicative jitter applies instead.
    #[default]
    None,
    /// Draws more the further the temperature is above `baseline`.
    Cooling { baseline: f64, span: f64 },
    /// Draws more the further the temperature is below `target`.
    Heating { target: f64, span: f64 },
}

impl ThermalCoupling {
    /// Returns the load factor at `temperature`, or `None` when uncoupled.
    pub fn factor(&self, temperature: f64) -> Option<f64> {
        match *self {
            Self::None => None,
            Self::Cooling { baseline, span } => Some(((temperature - baseline) / span).max(0.0)),
            Self::Heating { target, span } => Some(((target - temperature) / span).max(0.0)),
        }
    }
}

/// Behavioral parameters for one appliance type.
///
/// Ranges are `(low, high)` pairs. Hours are local clock hours `0..=23`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApplianceProfile {
    /// Temperature bounds (°C).
    pub temp_range: (f64, f64),
    /// Active power bounds (W).
    pub power_range: (f64, f64),
    /// Probability of being on outside peak and off hours.
    pub base_probability: f64,
    /// Hours where the on-probability is doubled.
    #[serde(default)]
    pub peak_hours: Vec<u32>,
    /// Hours where the on-probability is cut to a tenth.
    #[serde(default)]
    pub off_hours: Vec<u32>,
    /// Maximum temperature change per tick (°C).
    pub drift_rate: f64,
    /// Standby power bounds while off (W).
    pub standby_range: (f64, f64),
    #[serde(default)]
    pub thermal: ThermalCoupling,
}

impl ApplianceProfile {
    /// On-probability adjusted for the hour of day.
    pub fn on_probability(&self, hour: u32) -> f64 {
        if self.peak_hours.contains(&hour) {
            (self.base_probability * 2.0).min(PEAK_PROBABILITY_CAP)
        } else if self.off_hours.contains(&hour) {
            (self.base_probability * 0.1).max(OFF_PROBABILITY_FLOOR)
        } else {
            self.base_probability
        }
    }

    /// Checks range ordering, probability bounds, and hour values.
    ///
    /// `field` is the dotted prefix used in error paths.
    pub fn validate(&self, field: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for (name, (low, high)) in [
            ("temp_range", self.temp_range),
            ("power_range", self.power_range),
            ("standby_range", self.standby_range),
        ] {
            if !low.is_finite() || !high.is_finite() {
                errors.push(ConfigError::new(
                    format!("{field}.{name}"),
                    "bounds must be finite",
                ));
            }
        }

        if !(self.temp_range.0 < self.temp_range.1) {
            errors.push(ConfigError::new(
                format!("{field}.temp_range"),
                "low must be < high",
            ));
        }
        if !(self.power_range.0 < self.power_range.1) {
            errors.push(ConfigError::new(
                format!("{field}.power_range"),
                "low must be < high",
            ));
        }
        if !(self.standby_range.0 <= self.standby_range.1) || self.standby_range.0 < 0.0 {
            errors.push(ConfigError::new(
                format!("{field}.standby_range"),
                "must satisfy 0 <= low <= high",
            ));
        }
        if !(0.0..=1.0).contains(&self.base_probability) {
            errors.push(ConfigError::new(
                format!("{field}.base_probability"),
                "must be in [0.0, 1.0]",
            ));
        }
        if !(self.drift_rate >= 0.0 && self.drift_rate.is_finite()) {
            errors.push(ConfigError::new(
                format!("{field}.drift_rate"),
                "must be finite and >= 0",
            ));
        }
        for (name, hours) in [("peak_hours", &self.peak_hours), ("off_hours", &self.off_hours)] {
            if let Some(bad) = hours.iter().find(|h| **h > 23) {
                errors.push(ConfigError::new(
                    format!("{field}.{name}"),
                    format!("hour {bad} is outside 0..=23"),
                ));
            }
        }
        match self.thermal {
            ThermalCoupling::Cooling { baseline: pivot, span }
            | ThermalCoupling::Heating { target: pivot, span }
                if !(span > 0.0 && span.is_finite() && pivot.is_finite()) =>
            {
                errors.push(ConfigError::new(
                    format!("{field}.thermal"),
                    "span must be finite and > 0, pivot finite",
                ));
            }
            _ => {}
        }

        errors
    }
}

/// Total mapping from appliance kind to profile.
///
/// Kinds without an entry, including [`ApplianceKind::Other`], resolve to the
/// fallback profile, so lookup never fails.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTable {
    profiles: BTreeMap<ApplianceKind, ApplianceProfile>,
    fallback: ApplianceProfile,
}

impl ProfileTable {
    /// Returns the built-in household profile set.
    pub fn builtin() -> Self {
        let profiles = ApplianceKind::KNOWN
            .into_iter()
            .filter_map(|kind| builtin_profile(kind).map(|p| (kind, p)))
            .collect();
        Self {
            profiles,
            fallback: fallback_profile(),
        }
    }

    /// Profile for `kind`, or the fallback profile.
    pub fn get(&self, kind: ApplianceKind) -> &ApplianceProfile {
        self.profiles.get(&kind).unwrap_or(&self.fallback)
    }

    /// Profile for an appliance's declared type.
    pub fn for_appliance(&self, appliance: &Appliance) -> &ApplianceProfile {
        self.get(appliance.kind())
    }

    /// Profile used for unrecognized types.
    pub fn fallback(&self) -> &ApplianceProfile {
        &self.fallback
    }

    /// Replaces the profile for `kind`. Replacing `Other` replaces the fallback.
    pub fn set(&mut self, kind: ApplianceKind, profile: ApplianceProfile) {
        if kind == ApplianceKind::Other {
            self.fallback = profile;
        } else {
            self.profiles.insert(kind, profile);
        }
    }

    /// Validates every profile, including the fallback.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors: Vec<ConfigError> = self
            .profiles
            .iter()
            .flat_map(|(kind, p)| p.validate(&format!("profiles.{kind}")))
            .collect();
        errors.extend(self.fallback.validate("profiles.other"));
        errors
    }
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn profile(
    temp_range: (f64, f64),
    power_range: (f64, f64),
    base_probability: f64,
    peak_hours: &[u32],
    off_hours: &[u32],
    drift_rate: f64,
    standby_range: (f64, f64),
) -> ApplianceProfile {
    ApplianceProfile {
        temp_range,
        power_range,
        base_probability,
        peak_hours: peak_hours.to_vec(),
        off_hours: off_hours.to_vec(),
        drift_rate,
        standby_range,
        thermal: ThermalCoupling::None,
    }
}

fn builtin_profile(kind: ApplianceKind) -> Option<ApplianceProfile> {
    let p = match kind {
        ApplianceKind::AirConditioner => ApplianceProfile {
            thermal: ThermalCoupling::Cooling {
                baseline: 20.0,
                span: 10.0,
            },
            ..profile(
                (16.0, 30.0),
                (1500.0, 3000.0),
                0.4,
                &[14, 15, 16, 21, 22, 23],
                &[2, 3, 4, 5, 6],
                0.5,
                (5.0, 15.0),
            )
        },
        // Compressor cycles, so it is almost always drawing.
        ApplianceKind::Refrigerator => {
            profile((2.0, 8.0), (150.0, 300.0), 0.9, &[], &[], 0.2, (2.0, 8.0))
        }
        ApplianceKind::WashingMachine => profile(
            (20.0, 60.0),
            (500.0, 2000.0),
            0.05,
            &[9, 10, 11, 19, 20],
            &[0, 1, 2, 3, 4, 5, 6],
            1.0,
            (1.0, 3.0),
        ),
        ApplianceKind::WaterHeater => ApplianceProfile {
            thermal: ThermalCoupling::Heating {
                target: 60.0,
                span: 20.0,
            },
            ..profile(
                (40.0, 80.0),
                (3000.0, 4500.0),
                0.25,
                &[6, 7, 8, 18, 19, 20],
                &[1, 2, 3, 4],
                0.8,
                (3.0, 10.0),
            )
        },
        ApplianceKind::Television => television((1.0, 5.0)),
        ApplianceKind::Microwave => profile(
            (30.0, 80.0),
            (800.0, 1200.0),
            0.08,
            &[7, 8, 12, 13, 18, 19],
            &[0, 1, 2, 3, 4, 5, 6],
            2.0,
            (2.0, 8.0),
        ),
        ApplianceKind::Dishwasher => profile(
            (40.0, 70.0),
            (1200.0, 2400.0),
            0.1,
            &[20, 21, 22],
            &[0, 1, 2, 3, 4, 5, 6, 7],
            1.5,
            (1.0, 3.0),
        ),
        ApplianceKind::Other => return None,
    };
    Some(p)
}

fn television(standby_range: (f64, f64)) -> ApplianceProfile {
    profile(
        (25.0, 45.0),
        (100.0, 400.0),
        0.3,
        &[19, 20, 21, 22],
        &[1, 2, 3, 4, 5, 6, 7, 8],
        0.3,
        standby_range,
    )
}

/// Unknown types take a display device's ranges and drift, but a flat
/// even on-probability with no peak or off hours.
fn fallback_profile() -> ApplianceProfile {
    ApplianceProfile {
        base_probability: 0.5,
        peak_hours: Vec::new(),
        off_hours: Vec::new(),
        ..television((1.0, 5.0))
    }
}
