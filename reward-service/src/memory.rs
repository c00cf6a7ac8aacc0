use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::NaiveDate;
use mongodb::bson::oid::ObjectId;
use schema::{AdUnit, CompletionRecord, EarningsSource, Theme, UserEarnings, UserProfile};
use tokio::sync::RwLock;

use crate::store::{
    AdUnitRepository, CompletionRepository, EarningsRepository, Keyed, Repository, Store,
    StoreError, ThemeRepository,
};

/// In-memory repository for tests and local development.
///
/// Keeps insertion order, which stands in for `_id` order.
pub struct MemoryRepository<T> {
    items: RwLock<Vec<T>>,
    fail_writes: AtomicBool,
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl<T: Keyed + Clone> MemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().collect()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// While set, every write fails with `StoreError::Unavailable`
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "{} is not accepting writes",
                T::COLLECTION
            )));
        }
        Ok(())
    }

    async fn modify<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut T) -> R + Send,
    ) -> Result<R, StoreError> {
        self.check_writable()?;
        let mut items = self.items.write().await;
        let item = items
            .iter_mut()
            .find(|item| item.key() == key)
            .ok_or_else(|| StoreError::NotFound(format!("{} {key} does not exist", T::COLLECTION)))?;
        Ok(f(item))
    }

    async fn filtered(&self, predicate: impl Fn(&T) -> bool + Send) -> Vec<T> {
        self.items
            .read()
            .await
            .iter()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl<T> Repository<T> for MemoryRepository<T>
where
    T: Keyed + Clone + Send + Sync,
{
    async fn list(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.items.read().await.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self
            .items
            .read()
            .await
            .iter()
            .find(|item| item.key() == id)
            .cloned())
    }

    async fn create(&self, item: &T) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut items = self.items.write().await;
        let key = item.key();
        if items.iter().any(|existing| existing.key() == key) {
            return Err(StoreError::Conflict(format!(
                "{} {key} already exists",
                T::COLLECTION
            )));
        }
        if let Some(unique) = item.unique_key() {
            if items
                .iter()
                .any(|existing| existing.unique_key().as_ref() == Some(&unique))
            {
                return Err(StoreError::Conflict(format!(
                    "{} with unique key {unique} already exists",
                    T::COLLECTION
                )));
            }
        }
        items.push(item.clone());
        Ok(())
    }

    async fn update(&self, item: &T) -> Result<(), StoreError> {
        let replacement = item.clone();
        self.modify(&item.key(), move |existing| *existing = replacement)
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.items.write().await.retain(|item| item.key() != id);
        Ok(())
    }
}

#[async_trait]
impl AdUnitRepository for MemoryRepository<AdUnit> {
    async fn increment_counters(
        &self,
        id: &ObjectId,
        views: u64,
        completions: u64,
    ) -> Result<(), StoreError> {
        self.modify(&id.to_hex(), |ad_unit| {
            ad_unit.total_views += views;
            ad_unit.total_completions += completions;
        })
        .await
    }
}

#[async_trait]
impl CompletionRepository for MemoryRepository<CompletionRecord> {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<CompletionRecord>, StoreError> {
        Ok(self.filtered(|record| record.user_id == user_id).await)
    }

    async fn list_for_user_on(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<CompletionRecord>, StoreError> {
        Ok(self
            .filtered(|record| record.user_id == user_id && record.day == day)
            .await)
    }
}

#[async_trait]
impl EarningsRepository for MemoryRepository<UserEarnings> {
    async fn credit(
        &self,
        user_id: &str,
        source: EarningsSource,
        amount: f64,
    ) -> Result<UserEarnings, StoreError> {
        self.check_writable()?;
        let mut items = self.items.write().await;
        let position = match items.iter().position(|e| e.user_id == user_id) {
            Some(position) => position,
            None => {
                items.push(UserEarnings::empty(user_id));
                items.len() - 1
            }
        };
        let earnings = &mut items[position];
        match source {
            EarningsSource::Ads => earnings.ads_earnings += amount,
            EarningsSource::Deposit => earnings.deposit_earnings += amount,
            EarningsSource::Referral => earnings.referral_earnings += amount,
        }
        earnings.total_earnings += amount;
        earnings.available_balance += amount;
        Ok(earnings.clone())
    }
}

#[async_trait]
impl ThemeRepository for MemoryRepository<Theme> {
    async fn activate(&self, id: &ObjectId) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut themes = self.items.write().await;
        if !themes.iter().any(|theme| theme.id == *id) {
            return Err(StoreError::NotFound(format!("Theme {id} does not exist")));
        }
        for theme in themes.iter_mut() {
            theme.is_active = theme.id == *id;
        }
        Ok(())
    }
}

/// In-memory repositories, with typed handles kept for test setup and fault injection
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub ad_units: Arc<MemoryRepository<AdUnit>>,
    pub completions: Arc<MemoryRepository<CompletionRecord>>,
    pub earnings: Arc<MemoryRepository<UserEarnings>>,
    pub profiles: Arc<MemoryRepository<UserProfile>>,
    pub themes: Arc<MemoryRepository<Theme>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> Store {
        Store {
            ad_units: self.ad_units.clone(),
            completions: self.completions.clone(),
            earnings: self.earnings.clone(),
            profiles: self.profiles.clone(),
            themes: self.themes.clone(),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.ad_units.fail_writes(fail);
        self.completions.fail_writes(fail);
        self.earnings.fail_writes(fail);
        self.profiles.fail_writes(fail);
        self.themes.fail_writes(fail);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn completion(ad_unit_id: ObjectId, is_one_time_per_user: bool) -> CompletionRecord {
        let completed_at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        CompletionRecord {
            id: ObjectId::new(),
            user_id: "user-1".into(),
            ad_unit_id,
            answers: vec![],
            reward: 1.0,
            completed_at,
            day: completed_at.date_naive(),
            is_one_time_per_user,
        }
    }

    #[tokio::test]
    async fn one_time_completions_are_unique_per_user_and_unit() {
        let repository = MemoryRepository::new();
        let unit = ObjectId::new();

        repository.create(&completion(unit, true)).await.unwrap();
        let duplicate = repository.create(&completion(unit, true)).await;
        assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

        repository.create(&completion(unit, false)).await.unwrap();
        repository.create(&completion(ObjectId::new(), true)).await.unwrap();
        assert_eq!(repository.list().await.unwrap().len(), 3);
    }
}
