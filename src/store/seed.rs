//! Sample roster generation for demo and test databases.

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::info;

use crate::appliances::{ApplianceKind, ProfileTable};
use crate::error::Result;

use super::SqliteStore;

/// Appliances given to each seeded user, inclusive.
const PER_USER: (usize, usize) = (3, 7);

fn names_for(kind: ApplianceKind) -> &'static [&'static str] {
    match kind {
        ApplianceKind::AirConditioner => &["Living Room AC", "Bedroom AC", "Office AC"],
        ApplianceKind::Refrigerator => &["Kitchen Fridge", "Mini Fridge", "Garage Freezer"],
        ApplianceKind::WashingMachine => &["Front Load Washer", "Top Load Washer"],
        ApplianceKind::WaterHeater => &["Main Water Heater", "Instant Water Heater"],
        ApplianceKind::Television => &["Living Room TV", "Bedroom TV", "Kitchen TV"],
        ApplianceKind::Microwave => &["Kitchen Microwave", "Office Microwave"],
        ApplianceKind::Dishwasher => &["Kitchen Dishwasher"],
        ApplianceKind::Other => &["Appliance"],
    }
}

/// Summary of a seeding run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    /// User ids that received appliances.
    pub user_ids: Vec<i64>,
    /// Appliances inserted across all users.
    pub appliances: usize,
}

/// Gives `users` new users 3 to 7 distinct appliance types each.
///
/// User ids continue after the highest id already present in the roster.
/// Power ratings are whole watts drawn from each type's power range.
pub fn seed_roster<R: Rng>(
    store: &SqliteStore,
    profiles: &ProfileTable,
    users: u32,
    rng: &mut R,
) -> Result<SeedSummary> {
    let first = store.max_user_id()?.unwrap_or(0) + 1;
    let mut summary = SeedSummary {
        user_ids: Vec::with_capacity(users as usize),
        appliances: 0,
    };

    for user_id in (first..).take(users as usize) {
        let count = rng.random_range(PER_USER.0..=PER_USER.1);
        for &kind in ApplianceKind::KNOWN.choose_multiple(rng, count) {
            let name = names_for(kind).choose(rng).copied().unwrap_or("Appliance");
            let (lo, hi) = profiles.get(kind).power_range;
            let rating = rng.random_range(lo.round() as i64..=hi.round() as i64) as f64;
            store.insert_appliance(user_id, name, kind.tag(), Some(rating))?;
            summary.appliances += 1;
        }
        summary.user_ids.push(user_id);
    }

    info!(
        users = summary.user_ids.len(),
        appliances = summary.appliances,
        "seeded sample roster"
    );
    Ok(summary)
}
