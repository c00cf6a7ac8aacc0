//! Documents stored for the FOG Coin ad-reward flow.
//!
//! Field names follow the camelCase used by the stored documents.
use std::collections::BTreeMap;

use bson::oid::ObjectId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdUnit {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "videoUrl")]
    pub video_url: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(rename = "totalReward")]
    pub total_reward: f64,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(rename = "isPaused", default)]
    pub is_paused: bool,
    #[serde(rename = "totalViews", default)]
    pub total_views: u64,
    #[serde(rename = "totalCompletions", default)]
    pub total_completions: u64,
    #[serde(rename = "isOneTimePerUser", default)]
    pub is_one_time_per_user: bool,
    /// `None` means no per-day limit
    #[serde(rename = "maxDailyViews", default)]
    pub max_daily_views: Option<u32>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Default for AdUnit {
    fn default() -> Self {
        Self {
            id: ObjectId::new(),
            title: String::new(),
            description: String::new(),
            video_url: String::new(),
            questions: vec![],
            total_reward: 0.0,
            is_active: true,
            is_paused: false,
            total_views: 0,
            total_completions: 0,
            is_one_time_per_user: false,
            max_daily_views: None,
            created_at: DateTime::<Utc>::MIN_UTC,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionType {
    MultipleChoice,
    Feedback,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: ObjectId,
    #[serde(rename = "type")]
    pub _type: QuestionType,
    /// May contain `{token}` placeholders resolved from the viewer's profile
    pub text: String,
    /// Only populated for multiple choice questions
    #[serde(default)]
    pub options: Vec<String>,
    /// Used only by the partial-credit reward policy
    #[serde(rename = "correctOption", default)]
    pub correct_option: Option<usize>,
    #[serde(default)]
    pub reward: Option<f64>,
}

/// A single answer. Multiple choice questions carry the selected option index,
/// feedback questions carry free text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AnswerValue {
    #[serde(rename = "selectedOption")]
    Selected(usize),
    #[serde(rename = "text")]
    Text(String),
}

impl AnswerValue {
    /// Multiple choice answers are never empty. Feedback is empty if it is only whitespace.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Selected(_) => false,
            AnswerValue::Text(text) => text.trim().is_empty(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptAnswer {
    #[serde(rename = "questionId")]
    pub question_id: ObjectId,
    pub value: AnswerValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "adUnitId")]
    pub ad_unit_id: ObjectId,
    pub answers: Vec<AttemptAnswer>,
    pub reward: f64,
    /// Stored as a BSON datetime so completions sort chronologically
    #[serde(
        rename = "completedAt",
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    pub completed_at: DateTime<Utc>,
    /// UTC calendar day of `completed_at`, stored for daily lookups
    pub day: NaiveDate,
    /// Copied from the ad unit. One-time completions are unique per user and ad unit.
    #[serde(rename = "isOneTimePerUser", default)]
    pub is_one_time_per_user: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserEarnings {
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(rename = "totalEarnings", default)]
    pub total_earnings: f64,
    #[serde(rename = "availableBalance", default)]
    pub available_balance: f64,
    #[serde(rename = "adsEarnings", default)]
    pub ads_earnings: f64,
    #[serde(rename = "depositEarnings", default)]
    pub deposit_earnings: f64,
    #[serde(rename = "referralEarnings", default)]
    pub referral_earnings: f64,
}

impl UserEarnings {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }
}

/// Where credited coins came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EarningsSource {
    Ads,
    Deposit,
    Referral,
}

impl EarningsSource {
    /// Name of the per-source field in `UserEarnings`
    pub fn field(&self) -> &'static str {
        match self {
            EarningsSource::Ads => "adsEarnings",
            EarningsSource::Deposit => "depositEarnings",
            EarningsSource::Referral => "referralEarnings",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "firstName", default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Per-user activity for one UTC day. Derived from completion records, never stored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyActivity {
    #[serde(rename = "adsWatched")]
    pub ads_watched: u32,
    #[serde(rename = "earningsToday")]
    pub earnings_today: f64,
    /// Completions today, keyed by ad unit id hex
    #[serde(rename = "viewsByAdUnit")]
    pub views_by_ad_unit: BTreeMap<String, u32>,
}

impl DailyActivity {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a CompletionRecord>) -> Self {
        let mut activity = DailyActivity::default();
        for record in records {
            activity.ads_watched += 1;
            activity.earnings_today += record.reward;
            *activity
                .views_by_ad_unit
                .entry(record.ad_unit_id.to_hex())
                .or_insert(0) += 1;
        }
        activity
    }

    pub fn views_of(&self, ad_unit_id: &ObjectId) -> u32 {
        self.views_by_ad_unit
            .get(&ad_unit_id.to_hex())
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    /// Colour name to CSS colour value, e.g. `primary` -> `#0f62fe`
    pub colors: BTreeMap<String, String>,
    #[serde(rename = "isActive", default)]
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_value_holds_exactly_one_kind() {
        let answer = AttemptAnswer {
            question_id: ObjectId::new(),
            value: AnswerValue::Selected(2),
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["value"]["selectedOption"], 2);
        assert!(json["value"].get("text").is_none());

        let feedback: AnswerValue = serde_json::from_str(r#"{"text":"  "}"#).unwrap();
        assert!(feedback.is_empty());
    }

    #[test]
    fn daily_activity_counts_per_unit() {
        let unit = ObjectId::new();
        let other = ObjectId::new();
        let now = Utc::now();
        let record = |ad_unit_id, reward| CompletionRecord {
            id: ObjectId::new(),
            user_id: "u1".into(),
            ad_unit_id,
            answers: vec![],
            reward,
            completed_at: now,
            day: now.date_naive(),
            is_one_time_per_user: false,
        };
        let records = [record(unit, 5.0), record(unit, 5.0), record(other, 2.5)];

        let activity = DailyActivity::from_records(&records);
        assert_eq!(activity.ads_watched, 3);
        assert_eq!(activity.earnings_today, 12.5);
        assert_eq!(activity.views_of(&unit), 2);
        assert_eq!(activity.views_of(&ObjectId::new()), 0);
    }

    #[test]
    fn completion_time_is_stored_as_datetime() {
        let completed_at = DateTime::parse_from_rfc3339("2025-03-01T09:00:00.120Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = CompletionRecord {
            id: ObjectId::new(),
            user_id: "u1".into(),
            ad_unit_id: ObjectId::new(),
            answers: vec![],
            reward: 1.0,
            completed_at,
            day: completed_at.date_naive(),
            is_one_time_per_user: true,
        };

        let document = bson::to_document(&record).unwrap();
        let stored = document.get_datetime("completedAt").unwrap();
        assert_eq!(stored.timestamp_millis(), completed_at.timestamp_millis());
        assert_eq!(document.get_str("day").unwrap(), "2025-03-01");

        let back: CompletionRecord = bson::from_document(document).unwrap();
        assert_eq!(back, record);
    }
}
