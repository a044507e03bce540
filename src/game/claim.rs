//! Claim Resolver
//!
//! A new player's one-time choice of a capital and two starting provinces.
//! The existence check, the occupancy scan and the insert run under one
//! mutex, so two overlapping claims can never both land.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::core::error::ErrorClass;
use crate::game::registry::ProvinceRegistry;
use crate::game::state::{PlayerId, PlayerRecord, ProvinceId, Provinces};
use crate::store::{PlayerStore, StoreError};

/// Number of provinces chosen alongside the capital.
pub const STARTING_PROVINCES: usize = 2;

/// A new player's requested territory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    /// Claiming player.
    pub player_id: PlayerId,
    /// Requested capital.
    pub capital: ProvinceId,
    /// Requested starting provinces.
    pub others: Vec<ProvinceId>,
}

/// Claim errors.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    /// Player already has a record.
    #[error("player {0} already exists")]
    AlreadyExists(PlayerId),

    /// Malformed selection.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// Some requested provinces are already held.
    #[error("provinces already occupied: {}", join_ids(.0))]
    ProvinceConflict(Vec<ProvinceId>),

    /// Store failure.
    #[error(transparent)]
    Store(StoreError),
}

impl ClaimError {
    /// Error class for HTTP mapping and retry decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            ClaimError::AlreadyExists(_) | ClaimError::ProvinceConflict(_) => ErrorClass::Conflict,
            ClaimError::InvalidSelection(_) => ErrorClass::Validation,
            ClaimError::Store(e) => e.class(),
        }
    }
}

impl From<StoreError> for ClaimError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists(id) => ClaimError::AlreadyExists(id),
            other => ClaimError::Store(other),
        }
    }
}

fn join_ids(ids: &[ProvinceId]) -> String {
    ids.iter().map(ProvinceId::as_str).collect::<Vec<_>>().join(", ")
}

/// Creates player records from claims.
pub struct ClaimResolver {
    store: Arc<dyn PlayerStore>,
    /// Serializes whole claims against each other.
    claim_lock: Mutex<()>,
}

impl ClaimResolver {
    /// Create a resolver over a shared store.
    pub fn new(store: Arc<dyn PlayerStore>) -> Self {
        Self {
            store,
            claim_lock: Mutex::new(()),
        }
    }

    /// Create the player's record if the selection is valid and free.
    #[instrument(skip(self, request), fields(player = %request.player_id))]
    pub async fn claim(&self, request: ClaimRequest) -> Result<(), ClaimError> {
        let provinces = validate_selection(&request)?;

        let _guard = self.claim_lock.lock().await;

        if self.store.get_by_id(&request.player_id).await?.is_some() {
            debug!("claim refused, player already exists");
            return Err(ClaimError::AlreadyExists(request.player_id));
        }

        let population = self.store.get_all().await?;
        let registry = ProvinceRegistry::from_records(&population);
        let conflicts = registry.conflicts(provinces.occupied());
        if !conflicts.is_empty() {
            debug!(conflicts = %join_ids(&conflicts), "claim refused, provinces occupied");
            return Err(ClaimError::ProvinceConflict(conflicts));
        }

        let record = PlayerRecord::claimed(request.player_id, provinces);
        let capital = record.provinces.capital.clone();
        self.store.insert_if_absent(record).await?;

        info!(capital = %capital, "player claimed starting provinces");
        Ok(())
    }
}

/// Check the shape of a claim without touching the store.
fn validate_selection(request: &ClaimRequest) -> Result<Provinces, ClaimError> {
    if request.player_id.is_empty() {
        return Err(ClaimError::InvalidSelection("player id is empty".into()));
    }
    if request.capital.is_empty() {
        return Err(ClaimError::InvalidSelection("capital is missing".into()));
    }
    if request.others.len() != STARTING_PROVINCES {
        return Err(ClaimError::InvalidSelection(format!(
            "expected exactly {} starting provinces, got {}",
            STARTING_PROVINCES,
            request.others.len()
        )));
    }
    if request.others.iter().any(ProvinceId::is_empty) {
        return Err(ClaimError::InvalidSelection("starting province id is empty".into()));
    }

    let distinct: BTreeSet<&ProvinceId> = std::iter::once(&request.capital)
        .chain(request.others.iter())
        .collect();
    if distinct.len() != STARTING_PROVINCES + 1 {
        return Err(ClaimError::InvalidSelection(
            "capital and starting provinces must be distinct".into(),
        ));
    }

    Ok(Provinces::new(request.capital.clone(), request.others.iter().cloned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn request(player: &str, capital: &str, others: &[&str]) -> ClaimRequest {
        ClaimRequest {
            player_id: PlayerId::new(player),
            capital: ProvinceId::new(capital),
            others: others.iter().map(|o| ProvinceId::new(*o)).collect(),
        }
    }

    fn resolver() -> (Arc<MemoryStore>, ClaimResolver) {
        let store = Arc::new(MemoryStore::new());
        let resolver = ClaimResolver::new(store.clone());
        (store, resolver)
    }

    #[tokio::test]
    async fn test_claim_creates_record() {
        let (store, resolver) = resolver();
        resolver.claim(request("1", "P1", &["P2", "P3"])).await.unwrap();

        let record = store.get_by_id(&PlayerId::new("1")).await.unwrap().unwrap();
        assert_eq!(record.army_position(), &ProvinceId::new("P1"));
        assert_eq!(record.gold, 500);
        assert_eq!(record.last_move_date, None);
        assert!(record.provinces.contains(&ProvinceId::new("P3")));
    }

    #[tokio::test]
    async fn test_claim_conflict_lists_overlap() {
        let (_, resolver) = resolver();
        resolver.claim(request("1", "P1", &["P2", "P3"])).await.unwrap();

        let result = resolver.claim(request("2", "P2", &["P4", "P5"])).await;
        match result {
            Err(ClaimError::ProvinceConflict(ids)) => assert_eq!(ids, vec![ProvinceId::new("P2")]),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_claim_twice_already_exists() {
        let (_, resolver) = resolver();
        resolver.claim(request("1", "P1", &["P2", "P3"])).await.unwrap();

        let result = resolver.claim(request("1", "P7", &["P8", "P9"])).await;
        assert!(matches!(result, Err(ClaimError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_invalid_selections() {
        let (store, resolver) = resolver();
        let cases = [
            request("1", "", &["P2", "P3"]),
            request("1", "P1", &["P2"]),
            request("1", "P1", &["P2", "P3", "P4"]),
            request("1", "P1", &["P2", "P2"]),
            request("1", "P1", &["P1", "P2"]),
            request("1", "P1", &["", "P2"]),
            request("", "P1", &["P2", "P3"]),
        ];
        for case in cases {
            let result = resolver.claim(case.clone()).await;
            assert!(
                matches!(result, Err(ClaimError::InvalidSelection(_))),
                "{case:?} gave {result:?}"
            );
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_overlapping_claims() {
        let store = Arc::new(MemoryStore::new());
        let resolver = Arc::new(ClaimResolver::new(store.clone()));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let resolver = resolver.clone();
            tasks.spawn(async move {
                // Every claim wants "shared".
                let player = format!("p{i}");
                let capital = format!("cap{i}");
                let own = format!("own{i}");
                resolver
                    .claim(request(&player, &capital, &["shared", own.as_str()]))
                    .await
            });
        }

        let mut successes = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(()) => successes += 1,
                Err(ClaimError::ProvinceConflict(ids)) => {
                    assert_eq!(ids, vec![ProvinceId::new("shared")]);
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_player_claims() {
        let store = Arc::new(MemoryStore::new());
        let resolver = Arc::new(ClaimResolver::new(store.clone()));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let resolver = resolver.clone();
            tasks.spawn(async move {
                let capital = format!("c{i}");
                let a = format!("a{i}");
                let b = format!("b{i}");
                resolver
                    .claim(request("same", &capital, &[a.as_str(), b.as_str()]))
                    .await
            });
        }

        let mut successes = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(()) => successes += 1,
                Err(ClaimError::AlreadyExists(_)) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(successes, 1);
    }

    proptest! {
        #[test]
        fn prop_claims_never_share_provinces(
            claims in prop::collection::vec((0u8..6, 0u8..12, 0u8..12, 0u8..12), 1..24)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let store = Arc::new(MemoryStore::new());
            let resolver = ClaimResolver::new(store.clone());

            runtime.block_on(async {
                for (player, capital, a, b) in claims {
                    let provinces = [format!("P{capital}"), format!("P{a}"), format!("P{b}")];
                    let _ = resolver
                        .claim(request(
                            &player.to_string(),
                            &provinces[0],
                            &[provinces[1].as_str(), provinces[2].as_str()],
                        ))
                        .await;
                }
            });

            let records = runtime.block_on(store.get_all()).unwrap();
            let mut owners: BTreeMap<ProvinceId, PlayerId> = BTreeMap::new();
            for record in &records {
                for province in record.provinces.occupied() {
                    let previous = owners.insert(province.clone(), record.id.clone());
                    prop_assert!(previous.is_none(), "{} held twice", province);
                }
            }
        }
    }
}
