//! Roster-wide counters for dashboards.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::appliances::Appliance;

/// Distinct users, active appliances, and per-type counts.
///
/// `by_type` is keyed by the declared type tag, including tags without a
/// dedicated profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub users: usize,
    pub appliances: usize,
    pub by_type: BTreeMap<String, usize>,
}

impl UserStats {
    /// Derives counters from a roster. Inactive entries are skipped.
    pub fn from_roster(roster: &[Appliance]) -> Self {
        let active = roster.iter().filter(|a| a.active);
        let mut users = HashSet::new();
        let mut by_type = BTreeMap::new();
        let mut appliances = 0;
        for a in active {
            users.insert(a.user_id);
            *by_type.entry(a.type_tag.clone()).or_insert(0) += 1;
            appliances += 1;
        }
        Self {
            users: users.len(),
            appliances,
            by_type,
        }
    }
}

impl fmt::Display for UserStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} users, {} appliances", self.users, self.appliances)?;
        if !self.by_type.is_empty() {
            let types: Vec<String> = self
                .by_type
                .iter()
                .map(|(t, n)| format!("{t}={n}"))
                .collect();
            write!(f, " ({})", types.join(", "))?;
        }
        Ok(())
    }
}
