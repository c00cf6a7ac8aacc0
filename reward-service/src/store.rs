use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use mongodb::bson::{Document, doc, oid::ObjectId};
use schema::{AdUnit, CompletionRecord, EarningsSource, Theme, UserEarnings, UserProfile};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("invalid id: {0}")]
    InvalidId(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database needs to be defined in the URI")]
    MissingDatabase,
    // Froms
    #[error("{0}")]
    MongoDB(#[from] mongodb::error::Error),
}

/// A document stored in its own collection, addressed by `_id`
pub trait Keyed {
    const COLLECTION: &'static str;

    /// String form of the document's `_id`
    fn key(&self) -> String;

    /// Filter matching the document whose `key()` is `key`
    fn id_filter(key: &str) -> Result<Document, StoreError>;

    /// Secondary key that must be unique within the collection, if any.
    /// Mirrors the unique indexes created by `db::ensure_indexes`.
    fn unique_key(&self) -> Option<String> {
        None
    }
}

pub fn parse_object_id(key: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(key).map_err(|_| StoreError::InvalidId(key.to_string()))
}

macro_rules! keyed_by_object_id {
    ($($t:ty => $collection:literal),* $(,)?) => {
        $(
            impl Keyed for $t {
                const COLLECTION: &'static str = $collection;

                fn key(&self) -> String {
                    self.id.to_hex()
                }

                fn id_filter(key: &str) -> Result<Document, StoreError> {
                    Ok(doc! { "_id": parse_object_id(key)? })
                }
            }
        )*
    };
}

macro_rules! keyed_by_user_id {
    ($($t:ty => $collection:literal),* $(,)?) => {
        $(
            impl Keyed for $t {
                const COLLECTION: &'static str = $collection;

                fn key(&self) -> String {
                    self.user_id.clone()
                }

                fn id_filter(key: &str) -> Result<Document, StoreError> {
                    Ok(doc! { "_id": key })
                }
            }
        )*
    };
}

keyed_by_object_id!(
    AdUnit => "AdUnit",
    Theme => "Theme",
);
keyed_by_user_id!(
    UserEarnings => "UserEarnings",
    UserProfile => "UserProfile",
);

impl Keyed for CompletionRecord {
    const COLLECTION: &'static str = "CompletionRecord";

    fn key(&self) -> String {
        self.id.to_hex()
    }

    fn id_filter(key: &str) -> Result<Document, StoreError> {
        Ok(doc! { "_id": parse_object_id(key)? })
    }

    /// One-time completions are unique per user and ad unit
    fn unique_key(&self) -> Option<String> {
        self.is_one_time_per_user
            .then(|| format!("{}:{}", self.user_id, self.ad_unit_id.to_hex()))
    }
}

/// Basic document access. `list` returns documents in `_id` order.
#[async_trait]
pub trait Repository<T>: Send + Sync {
    async fn list(&self) -> Result<Vec<T>, StoreError>;
    async fn get(&self, id: &str) -> Result<Option<T>, StoreError>;
    /// Fails with `StoreError::Conflict` if the `_id` or `unique_key` is taken
    async fn create(&self, item: &T) -> Result<(), StoreError>;
    async fn update(&self, item: &T) -> Result<(), StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AdUnitRepository: Repository<AdUnit> {
    async fn increment_counters(
        &self,
        id: &ObjectId,
        views: u64,
        completions: u64,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CompletionRepository: Repository<CompletionRecord> {
    /// All of a user's completions, oldest first
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<CompletionRecord>, StoreError>;
    /// A user's completions on one UTC day, oldest first
    async fn list_for_user_on(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<CompletionRecord>, StoreError>;
}

#[async_trait]
pub trait EarningsRepository: Repository<UserEarnings> {
    /// Adds `amount` to the source's total, `totalEarnings` and `availableBalance`,
    /// creating the ledger if needed. Returns the updated ledger.
    async fn credit(
        &self,
        user_id: &str,
        source: EarningsSource,
        amount: f64,
    ) -> Result<UserEarnings, StoreError>;
}

#[async_trait]
pub trait ThemeRepository: Repository<Theme> {
    /// Marks `id` as the only active theme
    async fn activate(&self, id: &ObjectId) -> Result<(), StoreError>;
}

/// Every collection the reward flow reads or writes
#[derive(Clone)]
pub struct Store {
    pub ad_units: Arc<dyn AdUnitRepository>,
    pub completions: Arc<dyn CompletionRepository>,
    pub earnings: Arc<dyn EarningsRepository>,
    pub profiles: Arc<dyn Repository<UserProfile>>,
    pub themes: Arc<dyn ThemeRepository>,
}
