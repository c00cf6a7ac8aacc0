use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use reward_utils::{
    catalog::validate_ad_unit,
    eligibility::{DailyLimits, Ineligible, check_eligibility, filter_eligible},
    error::Error as RulesError,
    reward::{RewardPolicy, calculate_reward, validate_answers},
    theme::{ThemeContext, validate_theme},
};
use schema::{
    AdUnit, AttemptAnswer, CompletionRecord, DailyActivity, EarningsSource, Theme, UserEarnings,
    UserProfile,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::{
    error::Error,
    store::{Store, StoreError},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitReceipt {
    #[serde(rename = "earnedAmount")]
    pub earned_amount: f64,
    #[serde(rename = "completionId")]
    pub completion_id: ObjectId,
}

/// Reward workflow over an injected repository set.
///
/// Everything a decision depends on is re-read from the store. The only
/// in-process state is the per-user commit lock, shared between clones.
#[derive(Clone)]
pub struct RewardService {
    store: Store,
    limits: DailyLimits,
    policy: RewardPolicy,
    commit_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl RewardService {
    pub fn new(store: Store, limits: DailyLimits, policy: RewardPolicy) -> Self {
        Self {
            store,
            limits,
            policy,
            commit_locks: Arc::default(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn policy(&self) -> RewardPolicy {
        self.policy
    }

    /// Active catalog entries the user may start on `today`, in catalog order
    #[instrument(skip(self), err(Debug))]
    pub async fn list_available_ad_units(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<AdUnit>, Error> {
        let catalog = self.store.ad_units.list().await?;
        let completed = self.completed_set(user_id).await?;
        let activity = self.get_user_daily_activity(user_id, today).await?;

        let available: Vec<AdUnit> = filter_eligible(&catalog, &completed, &activity, &self.limits)
            .into_iter()
            .cloned()
            .collect();
        info!(
            user = user_id,
            catalog = catalog.len(),
            available = available.len(),
            "listed ad units"
        );
        Ok(available)
    }

    /// Ids of every ad unit the user has completed, in order of first completion
    #[instrument(skip(self), err(Debug))]
    pub async fn get_completed_ad_unit_ids(&self, user_id: &str) -> Result<Vec<ObjectId>, Error> {
        let records = self.store.completions.list_for_user(user_id).await?;
        let mut seen = HashSet::new();
        let ids = records
            .into_iter()
            .map(|record| record.ad_unit_id)
            .filter(|id| seen.insert(*id))
            .collect();
        Ok(ids)
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn get_user_daily_activity(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<DailyActivity, Error> {
        let records = self.store.completions.list_for_user_on(user_id, date).await?;
        Ok(DailyActivity::from_records(&records))
    }

    /// Running totals, zeroed if the user has never been credited
    #[instrument(skip(self), err(Debug))]
    pub async fn get_user_earnings(&self, user_id: &str) -> Result<UserEarnings, Error> {
        let earnings = self.store.earnings.get(user_id).await?;
        Ok(earnings.unwrap_or_else(|| UserEarnings::empty(user_id)))
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, Error> {
        Ok(self.store.profiles.get(user_id).await?)
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn get_ad_unit(&self, ad_unit_id: &ObjectId) -> Result<AdUnit, Error> {
        self.store
            .ad_units
            .get(&ad_unit_id.to_hex())
            .await?
            .ok_or_else(|| Error::NotFound(format!("ad unit {ad_unit_id} does not exist")))
    }

    /// Re-derives the user's completions and `day` activity, then applies the eligibility rules
    #[instrument(skip_all, fields(user = user_id, ad_unit = %ad_unit.id), err(Debug))]
    pub async fn check_eligible(
        &self,
        user_id: &str,
        ad_unit: &AdUnit,
        day: NaiveDate,
    ) -> Result<(), Error> {
        let completed = self.completed_set(user_id).await?;
        let activity = self.get_user_daily_activity(user_id, day).await?;
        check_eligibility(ad_unit, &completed, &activity, &self.limits).map_err(RulesError::from)?;
        Ok(())
    }

    /// Commit Attempt:
    /// - commits for one user run one at a time
    /// - answers are validated against the ad unit
    /// - eligibility is re-checked against the store
    /// - the completion record is written before earnings are credited
    /// - a one-time unit rejected by the store's unique index is `AlreadyCompleted`
    /// - if crediting fails the record is removed again
    /// - counter updates are best effort
    #[instrument(skip(self, answers), err(Debug))]
    pub async fn commit_attempt(
        &self,
        user_id: &str,
        ad_unit_id: &ObjectId,
        answers: Vec<AttemptAnswer>,
        now: DateTime<Utc>,
    ) -> Result<CommitReceipt, Error> {
        let user_lock = self
            .commit_locks
            .lock()
            .await
            .entry(user_id.to_string())
            .or_default()
            .clone();

        let result = {
            let _guard = user_lock.lock().await;
            self.commit_locked(user_id, ad_unit_id, answers, now).await
        };

        drop(user_lock);
        let mut locks = self.commit_locks.lock().await;
        if locks
            .get(user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(user_id);
        }
        result
    }

    async fn commit_locked(
        &self,
        user_id: &str,
        ad_unit_id: &ObjectId,
        answers: Vec<AttemptAnswer>,
        now: DateTime<Utc>,
    ) -> Result<CommitReceipt, Error> {
        let ad_unit = self.get_ad_unit(ad_unit_id).await?;
        validate_answers(&ad_unit, &answers)?;

        let day = now.date_naive();
        self.check_eligible(user_id, &ad_unit, day).await?;

        let reward = calculate_reward(&ad_unit, &answers, self.policy);
        let record = CompletionRecord {
            id: ObjectId::new(),
            user_id: user_id.to_string(),
            ad_unit_id: ad_unit.id,
            answers,
            reward,
            completed_at: now,
            day,
            is_one_time_per_user: ad_unit.is_one_time_per_user,
        };
        match self.store.completions.create(&record).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) if ad_unit.is_one_time_per_user => {
                warn!(user = user_id, ad_unit = %ad_unit.id, "concurrent commit of one-time unit");
                return Err(RulesError::from(Ineligible::AlreadyCompleted(ad_unit.id)).into());
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self
            .store
            .earnings
            .credit(user_id, EarningsSource::Ads, reward)
            .await
        {
            if let Err(undo) = self.store.completions.delete(&record.id.to_hex()).await {
                // The record now blocks a retry of a one-time unit without paying for it.
                // It has to be deleted by hand.
                error!(
                    user = user_id,
                    ad_unit = %ad_unit.id,
                    completion = %record.id,
                    reward,
                    error = ?undo,
                    "unable to remove uncredited completion, delete it manually"
                );
            }
            return Err(e.into());
        }

        if let Err(e) = self
            .store
            .ad_units
            .increment_counters(&ad_unit.id, 1, 1)
            .await
        {
            error!(ad_unit = %ad_unit.id, error = ?e, "unable to update ad unit counters");
        }

        info!(user = user_id, ad_unit = %ad_unit.id, reward, "attempt committed");
        Ok(CommitReceipt {
            earned_amount: reward,
            completion_id: record.id,
        })
    }

    #[instrument(skip_all, fields(ad_unit = %ad_unit.id), err(Debug))]
    pub async fn create_ad_unit(&self, ad_unit: AdUnit) -> Result<AdUnit, Error> {
        validate_ad_unit(&ad_unit)?;
        self.store.ad_units.create(&ad_unit).await?;
        Ok(ad_unit)
    }

    /// Updates whichever of `is_active` and `is_paused` is given
    #[instrument(skip(self), err(Debug))]
    pub async fn set_ad_unit_status(
        &self,
        ad_unit_id: &ObjectId,
        is_active: Option<bool>,
        is_paused: Option<bool>,
    ) -> Result<AdUnit, Error> {
        let mut ad_unit = self.get_ad_unit(ad_unit_id).await?;
        if let Some(is_active) = is_active {
            ad_unit.is_active = is_active;
        }
        if let Some(is_paused) = is_paused {
            ad_unit.is_paused = is_paused;
        }
        self.store.ad_units.update(&ad_unit).await?;
        Ok(ad_unit)
    }

    /// Stores a new theme. Themes start inactive.
    #[instrument(skip_all, fields(theme = %theme.id), err(Debug))]
    pub async fn create_theme(&self, mut theme: Theme) -> Result<Theme, Error> {
        validate_theme(&theme)?;
        theme.is_active = false;
        self.store.themes.create(&theme).await?;
        Ok(theme)
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn activate_theme(&self, theme_id: &ObjectId) -> Result<(), Error> {
        self.store.themes.activate(theme_id).await?;
        Ok(())
    }

    /// The default context with the active theme applied, if there is one
    #[instrument(skip(self), err(Debug))]
    pub async fn active_theme_context(&self) -> Result<ThemeContext, Error> {
        let base = ThemeContext::default();
        let themes = self.store.themes.list().await?;
        let Some(theme) = themes.iter().find(|theme| theme.is_active) else {
            return Ok(base);
        };
        match base.apply(theme) {
            Ok(context) => Ok(context),
            Err(e) => {
                warn!(theme = %theme.id, error = %e, "stored theme is invalid, using default");
                Ok(base)
            }
        }
    }

    async fn completed_set(&self, user_id: &str) -> Result<HashSet<ObjectId>, Error> {
        let records = self.store.completions.list_for_user(user_id).await?;
        Ok(records.into_iter().map(|record| record.ad_unit_id).collect())
    }
}
