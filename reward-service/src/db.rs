use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::TryStreamExt;
use mongodb::{
    Client, Collection, IndexModel,
    bson::{Document, doc, oid::ObjectId},
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions, ReturnDocument},
};
use schema::{AdUnit, CompletionRecord, EarningsSource, Theme, UserEarnings, UserProfile};
use serde::{Serialize, de::DeserializeOwned};
use tracing::instrument;

use crate::store::{
    AdUnitRepository, CompletionRepository, EarningsRepository, Keyed, Repository, Store,
    StoreError, ThemeRepository,
};

pub fn get_collection<T>(client: &Client, collection_name: &str) -> Result<Collection<T>, StoreError>
where
    T: Send + Sync,
{
    let db = client.default_database().ok_or(StoreError::MissingDatabase)?;

    Ok(db.collection::<T>(collection_name))
}

pub async fn client(uri: &str) -> Result<Client, StoreError> {
    let mut client_options = ClientOptions::parse(uri).await?;

    client_options.app_name = Some(env!("CARGO_CRATE_NAME").to_string());

    // Get a handle to the cluster
    let client = Client::with_options(client_options)?;

    // Ping the server to see if you can connect to the cluster
    client
        .default_database()
        .ok_or(StoreError::MissingDatabase)?
        .run_command(doc! {"ping": 1})
        .await?;

    Ok(client)
}

/// Indexes backing the per-user lookups
#[instrument(skip_all, err(Debug))]
pub async fn ensure_indexes(client: &Client) -> Result<(), StoreError> {
    let completions = get_collection::<CompletionRecord>(client, CompletionRecord::COLLECTION)?;
    completions
        .create_index(
            IndexModel::builder()
                .keys(doc! {"userId": 1, "day": 1})
                .build(),
        )
        .await?;
    // Backs `CompletionRecord::unique_key`
    completions
        .create_index(
            IndexModel::builder()
                .keys(doc! {"userId": 1, "adUnitId": 1})
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! {"isOneTimePerUser": true})
                        .build(),
                )
                .build(),
        )
        .await?;
    Ok(())
}

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        *error.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref e)) if e.code == DUPLICATE_KEY
    )
}

/// Builds a `Store` whose repositories all share `client`
pub fn store(client: &Client) -> Result<Store, StoreError> {
    Ok(Store {
        ad_units: Arc::new(MongoRepository::<AdUnit>::new(client)?),
        completions: Arc::new(MongoRepository::<CompletionRecord>::new(client)?),
        earnings: Arc::new(MongoRepository::<UserEarnings>::new(client)?),
        profiles: Arc::new(MongoRepository::<UserProfile>::new(client)?),
        themes: Arc::new(MongoRepository::<Theme>::new(client)?),
    })
}

pub struct MongoRepository<T: Send + Sync> {
    collection: Collection<T>,
}

impl<T: Keyed + Send + Sync> MongoRepository<T> {
    pub fn new(client: &Client) -> Result<Self, StoreError> {
        Ok(Self {
            collection: get_collection::<T>(client, T::COLLECTION)?,
        })
    }
}

impl<T> MongoRepository<T>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    async fn find_sorted(&self, filter: Document, sort: Document) -> Result<Vec<T>, StoreError> {
        let items = self
            .collection
            .find(filter)
            .sort(sort)
            .await?
            .try_collect()
            .await?;
        Ok(items)
    }
}

#[async_trait]
impl<T> Repository<T> for MongoRepository<T>
where
    T: Keyed + Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    #[instrument(skip_all, fields(collection = T::COLLECTION), err(Debug))]
    async fn list(&self) -> Result<Vec<T>, StoreError> {
        self.find_sorted(doc! {}, doc! {"_id": 1}).await
    }

    #[instrument(skip(self), fields(collection = T::COLLECTION), err(Debug))]
    async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        let item = self.collection.find_one(T::id_filter(id)?).await?;
        Ok(item)
    }

    #[instrument(skip_all, fields(collection = T::COLLECTION, id = %item.key()), err(Debug))]
    async fn create(&self, item: &T) -> Result<(), StoreError> {
        match self.collection.insert_one(item).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Conflict(format!(
                "{} {} already exists",
                T::COLLECTION,
                item.key()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip_all, fields(collection = T::COLLECTION, id = %item.key()), err(Debug))]
    async fn update(&self, item: &T) -> Result<(), StoreError> {
        let res = self
            .collection
            .replace_one(T::id_filter(&item.key())?, item)
            .await?;
        if res.matched_count == 0 {
            return Err(StoreError::NotFound(format!(
                "{} {} does not exist",
                T::COLLECTION,
                item.key()
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(collection = T::COLLECTION), err(Debug))]
    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.collection.delete_one(T::id_filter(id)?).await?;
        Ok(())
    }
}

#[async_trait]
impl AdUnitRepository for MongoRepository<AdUnit> {
    #[instrument(skip(self), err(Debug))]
    async fn increment_counters(
        &self,
        id: &ObjectId,
        views: u64,
        completions: u64,
    ) -> Result<(), StoreError> {
        let res = self
            .collection
            .update_one(
                doc! {"_id": id},
                doc! {
                    "$inc": {
                        "totalViews": views as i64,
                        "totalCompletions": completions as i64,
                    }
                },
            )
            .await?;
        if res.matched_count == 0 {
            return Err(StoreError::NotFound(format!("AdUnit {id} does not exist")));
        }
        Ok(())
    }
}

#[async_trait]
impl CompletionRepository for MongoRepository<CompletionRecord> {
    #[instrument(skip(self), err(Debug))]
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<CompletionRecord>, StoreError> {
        self.find_sorted(doc! {"userId": user_id}, doc! {"completedAt": 1})
            .await
    }

    #[instrument(skip(self), err(Debug))]
    async fn list_for_user_on(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<CompletionRecord>, StoreError> {
        self.find_sorted(
            doc! {"userId": user_id, "day": day.to_string()},
            doc! {"completedAt": 1},
        )
        .await
    }
}

#[async_trait]
impl EarningsRepository for MongoRepository<UserEarnings> {
    #[instrument(skip(self), err(Debug))]
    async fn credit(
        &self,
        user_id: &str,
        source: EarningsSource,
        amount: f64,
    ) -> Result<UserEarnings, StoreError> {
        let mut inc = Document::new();
        inc.insert(source.field(), amount);
        inc.insert("totalEarnings", amount);
        inc.insert("availableBalance", amount);

        self.collection
            .find_one_and_update(doc! {"_id": user_id}, doc! {"$inc": inc})
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("UserEarnings {user_id} not upserted")))
    }
}

#[async_trait]
impl ThemeRepository for MongoRepository<Theme> {
    #[instrument(skip(self), err(Debug))]
    async fn activate(&self, id: &ObjectId) -> Result<(), StoreError> {
        if self.collection.find_one(doc! {"_id": id}).await?.is_none() {
            return Err(StoreError::NotFound(format!("Theme {id} does not exist")));
        }
        self.collection
            .update_many(
                doc! {"isActive": true, "_id": {"$ne": id}},
                doc! {"$set": {"isActive": false}},
            )
            .await?;
        self.collection
            .update_one(doc! {"_id": id}, doc! {"$set": {"isActive": true}})
            .await?;
        Ok(())
    }
}
