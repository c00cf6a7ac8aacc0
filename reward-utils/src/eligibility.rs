use std::collections::HashSet;

use bson::oid::ObjectId;
use schema::{AdUnit, DailyActivity};
use serde::{Deserialize, Serialize};

/// Limits applied across all ad units for a single viewer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyLimits {
    /// Maximum completions per user per UTC day, across every ad unit
    #[serde(rename = "maxAdsPerDay")]
    pub max_ads_per_day: Option<u32>,
}

/// Why a viewer may not start an ad unit
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    #[error("ad unit {0} is not active")]
    Inactive(ObjectId),
    #[error("ad unit {0} is paused")]
    Paused(ObjectId),
    #[error("ad unit {0} has already been completed")]
    AlreadyCompleted(ObjectId),
    #[error("ad unit {0} reached its daily view limit of {1}")]
    DailyUnitLimit(ObjectId, u32),
    #[error("daily limit of {0} ads reached")]
    DailyUserLimit(u32),
}

/// Returns the first rule excluding `ad_unit` for this viewer, if any.
///
/// Rules are checked in order: active, paused, one time per user, per unit daily views,
/// per user daily limit.
pub fn check_eligibility(
    ad_unit: &AdUnit,
    completed: &HashSet<ObjectId>,
    today: &DailyActivity,
    limits: &DailyLimits,
) -> Result<(), Ineligible> {
    if !ad_unit.is_active {
        return Err(Ineligible::Inactive(ad_unit.id));
    }
    if ad_unit.is_paused {
        return Err(Ineligible::Paused(ad_unit.id));
    }
    if ad_unit.is_one_time_per_user && completed.contains(&ad_unit.id) {
        return Err(Ineligible::AlreadyCompleted(ad_unit.id));
    }
    if let Some(max_daily_views) = ad_unit.max_daily_views {
        if today.views_of(&ad_unit.id) >= max_daily_views {
            return Err(Ineligible::DailyUnitLimit(ad_unit.id, max_daily_views));
        }
    }
    if let Some(max_ads_per_day) = limits.max_ads_per_day {
        if today.ads_watched >= max_ads_per_day {
            return Err(Ineligible::DailyUserLimit(max_ads_per_day));
        }
    }
    Ok(())
}

/// Filters the catalog down to the ad units the viewer may start, keeping catalog order.
pub fn filter_eligible<'a>(
    catalog: &'a [AdUnit],
    completed: &HashSet<ObjectId>,
    today: &DailyActivity,
    limits: &DailyLimits,
) -> Vec<&'a AdUnit> {
    catalog
        .iter()
        .filter(|ad_unit| match check_eligibility(ad_unit, completed, today, limits) {
            Ok(()) => true,
            Err(reason) => {
                tracing::trace!(%reason, "excluding ad unit");
                false
            }
        })
        .collect()
}
