//! Province Registry
//!
//! Derived occupancy view: which player holds which province. Built on
//! demand from the full population, never stored.

use std::collections::BTreeMap;

use tracing::warn;

use crate::game::state::{PlayerId, PlayerRecord, ProvinceId};

/// Province → owner map over a population snapshot.
#[derive(Debug, Default, Clone)]
pub struct ProvinceRegistry {
    owners: BTreeMap<ProvinceId, PlayerId>,
}

impl ProvinceRegistry {
    /// Build the registry from every record's `{capital} ∪ others`.
    ///
    /// Captures are not checked for global uniqueness, so a province may
    /// appear in two records. The first owner by id order wins here; the
    /// overlap is logged.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a PlayerRecord>) -> Self {
        let mut owners: BTreeMap<ProvinceId, PlayerId> = BTreeMap::new();
        for record in records {
            for province in record.provinces.occupied() {
                if let Some(existing) = owners.get(province) {
                    if *existing != record.id {
                        warn!(
                            province = %province,
                            first = %existing,
                            second = %record.id,
                            "province held by more than one player"
                        );
                    }
                    continue;
                }
                owners.insert(province.clone(), record.id.clone());
            }
        }
        Self { owners }
    }

    /// Current holder of a province.
    pub fn owner_of(&self, province: &ProvinceId) -> Option<&PlayerId> {
        self.owners.get(province)
    }

    /// Whether anyone holds the province.
    pub fn is_occupied(&self, province: &ProvinceId) -> bool {
        self.owners.contains_key(province)
    }

    /// The requested provinces that are already held, in request order,
    /// without duplicates.
    pub fn conflicts<'a>(&self, requested: impl IntoIterator<Item = &'a ProvinceId>) -> Vec<ProvinceId> {
        let mut found: Vec<ProvinceId> = Vec::new();
        for province in requested {
            if self.is_occupied(province) && !found.contains(province) {
                found.push(province.clone());
            }
        }
        found
    }

    /// Number of occupied provinces.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// True when nobody holds anything.
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
