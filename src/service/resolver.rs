use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use moka::future::Cache;
use tracing::debug;

use crate::model::enrollment::Enrollment;
use crate::model::school_year::SchoolYear;
use crate::store::{EnrollmentStore, StoreError};

/// Canonical UID form: trimmed, uppercase hex.
pub fn normalize_uid(uid: &str) -> String {
    uid.trim().to_ascii_uppercase()
}

/// Maps card UIDs (and ids) to the enrollment active in the current school year.
///
/// Positive lookups may be cached for a short TTL; misses are never cached so a
/// freshly assigned card works on its first tap.
pub struct EnrollmentResolver {
    store: Arc<dyn EnrollmentStore>,
    cache: Option<Cache<(String, String), Enrollment>>,
}

impl EnrollmentResolver {
    pub fn new(store: Arc<dyn EnrollmentStore>, cache_ttl: Duration) -> Self {
        let cache = (!cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(10_000)
                .time_to_live(cache_ttl)
                .build()
        });
        Self { store, cache }
    }

    pub fn uncached(store: Arc<dyn EnrollmentStore>) -> Self {
        Self::new(store, Duration::ZERO)
    }

    /// Enrollment bound to `uid` in the school year containing `today`.
    pub async fn resolve(
        &self,
        uid: &str,
        today: NaiveDate,
    ) -> Result<Option<Enrollment>, StoreError> {
        let uid = normalize_uid(uid);
        let school_year = SchoolYear::containing(today).to_string();
        let key = (uid, school_year);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                debug!(uid = %key.0, enrollment_id = hit.id, "Enrollment cache hit");
                return Ok(Some(hit));
            }
        }

        let found = self
            .store
            .find_by_uid_and_school_year(&key.0, &key.1)
            .await?;

        if let (Some(cache), Some(enrollment)) = (&self.cache, &found) {
            cache.insert(key, enrollment.clone()).await;
        }
        Ok(found)
    }

    pub async fn find_by_id(&self, enrollment_id: u64) -> Result<Option<Enrollment>, StoreError> {
        self.store.find_by_id(enrollment_id).await
    }
}
