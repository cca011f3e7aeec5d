//! Roster and telemetry records shared by the store and the engine.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

/// Closed set of appliance types with a dedicated behavior profile.
///
/// Any declared type outside this set resolves to [`ApplianceKind::Other`],
/// which maps to the fallback profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplianceKind {
    AirConditioner,
    Refrigerator,
    WashingMachine,
    WaterHeater,
    Television,
    Microwave,
    Dishwasher,
    Other,
}

impl ApplianceKind {
    /// Every kind with its own profile, in table order.
    pub const KNOWN: [ApplianceKind; 7] = [
        ApplianceKind::AirConditioner,
        ApplianceKind::Refrigerator,
        ApplianceKind::WashingMachine,
        ApplianceKind::WaterHeater,
        ApplianceKind::Television,
        ApplianceKind::Microwave,
        ApplianceKind::Dishwasher,
    ];

    /// Resolves a declared type tag. Unknown tags yield `Other`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "air_conditioner" => Self::AirConditioner,
            "refrigerator" => Self::Refrigerator,
            "washing_machine" => Self::WashingMachine,
            "water_heater" => Self::WaterHeater,
            "television" => Self::Television,
            "microwave" => Self::Microwave,
            "dishwasher" => Self::Dishwasher,
            _ => Self::Other,
        }
    }

    /// Canonical type tag as stored in the `appliances.type` column.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::AirConditioner => "air_conditioner",
            Self::Refrigerator => "refrigerator",
            Self::WashingMachine => "washing_machine",
            Self::WaterHeater => "water_heater",
            Self::Television => "television",
            Self::Microwave => "microwave",
            Self::Dishwasher => "dishwasher",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ApplianceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A user-owned appliance from the active roster.
///
/// Rows are owned by the surrounding application; the engine only reads them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Appliance {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// Declared type exactly as stored, possibly unknown.
    pub type_tag: String,
    /// Rated power in watts, if the owner supplied one.
    pub power_rating: Option<f64>,
    /// Soft-delete flag. Inactive appliances never reach the simulation.
    pub active: bool,
}

impl Appliance {
    /// Kind used for profile lookup.
    pub fn kind(&self) -> ApplianceKind {
        ApplianceKind::from_tag(&self.type_tag)
    }
}

/// One timestamped observation for one appliance.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub appliance_id: i64,
    /// Owner, denormalized for query speed.
    pub user_id: i64,
    pub is_on: bool,
    /// Degrees Celsius. Rows written by other tools may leave it null.
    pub temperature: Option<f64>,
    /// Watts.
    pub power_consumption: f64,
    pub timestamp: NaiveDateTime,
}
