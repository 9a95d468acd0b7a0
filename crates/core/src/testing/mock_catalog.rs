//! Mock concert catalog for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::{CatalogError, ConcertCatalog, ConcertSnapshot};

/// Mock implementation of the ConcertCatalog trait.
///
/// Snapshots are returned as stored; layout validation is left to the caller,
/// so invalid share allocations can be served on purpose.
#[derive(Debug)]
pub struct MockConcertCatalog {
    concerts: Arc<RwLock<HashMap<i64, ConcertSnapshot>>>,
    /// When set, every lookup fails with a database error.
    unavailable: Arc<RwLock<bool>>,
    snapshot_calls: Arc<RwLock<usize>>,
}

impl Default for MockConcertCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConcertCatalog {
    pub fn new() -> Self {
        Self {
            concerts: Arc::new(RwLock::new(HashMap::new())),
            unavailable: Arc::new(RwLock::new(false)),
            snapshot_calls: Arc::new(RwLock::new(0)),
        }
    }

    /// Add or replace a concert.
    pub async fn add_concert(&self, snapshot: ConcertSnapshot) {
        self.concerts
            .write()
            .await
            .insert(snapshot.concert_id, snapshot);
    }

    pub async fn remove_concert(&self, concert_id: i64) {
        self.concerts.write().await.remove(&concert_id);
    }

    /// Simulate a catalog outage.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    pub async fn snapshot_calls(&self) -> usize {
        *self.snapshot_calls.read().await
    }
}

#[async_trait]
impl ConcertCatalog for MockConcertCatalog {
    async fn snapshot(&self, concert_id: i64) -> Result<ConcertSnapshot, CatalogError> {
        *self.snapshot_calls.write().await += 1;

        if *self.unavailable.read().await {
            return Err(CatalogError::Database("catalog unavailable".to_string()));
        }

        self.concerts
            .read()
            .await
            .get(&concert_id)
            .cloned()
            .ok_or(CatalogError::ConcertNotFound(concert_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_snapshot_lookup() {
        let catalog = MockConcertCatalog::new();
        catalog.add_concert(fixtures::concert_snapshot(42, 100)).await;

        let snapshot = catalog.snapshot(42).await.unwrap();
        assert_eq!(snapshot.ticket_amount, 100);

        let result = catalog.snapshot(7).await;
        assert!(matches!(result, Err(CatalogError::ConcertNotFound(7))));
        assert_eq!(catalog.snapshot_calls().await, 2);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let catalog = MockConcertCatalog::new();
        catalog.add_concert(fixtures::concert_snapshot(42, 100)).await;
        catalog.set_unavailable(true).await;

        let err = tokio_test::assert_err!(catalog.snapshot(42).await);
        assert!(matches!(err, CatalogError::Database(_)));

        catalog.set_unavailable(false).await;
        tokio_test::assert_ok!(catalog.snapshot(42).await);
    }
}
