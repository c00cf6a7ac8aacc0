#![allow(dead_code)]
use chrono::{DateTime, TimeZone, Utc};
use mongodb::bson::oid::ObjectId;
use reward_service::{memory::MemoryStore, rewards::RewardService, store::Repository};
use reward_utils::{eligibility::DailyLimits, reward::RewardPolicy};
use schema::{AdUnit, AnswerValue, AttemptAnswer, Question, QuestionType};

pub const USER: &str = "user-1";

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

pub fn multiple_choice(text: &str) -> Question {
    Question {
        id: ObjectId::new(),
        _type: QuestionType::MultipleChoice,
        text: text.into(),
        options: vec!["Yes".into(), "No".into()],
        correct_option: Some(0),
        reward: None,
    }
}

pub fn feedback(text: &str) -> Question {
    Question {
        id: ObjectId::new(),
        _type: QuestionType::Feedback,
        text: text.into(),
        options: vec![],
        correct_option: None,
        reward: None,
    }
}

pub fn ad_unit(title: &str, questions: Vec<Question>, total_reward: f64) -> AdUnit {
    AdUnit {
        title: title.into(),
        video_url: format!("https://videos.example.com/{title}.mp4"),
        questions,
        total_reward,
        created_at: at(2025, 1, 1, 0),
        ..Default::default()
    }
}

/// First option for every multiple choice question, "great" for feedback
pub fn answers_for(ad_unit: &AdUnit) -> Vec<AttemptAnswer> {
    ad_unit
        .questions
        .iter()
        .map(|question| AttemptAnswer {
            question_id: question.id,
            value: match question._type {
                QuestionType::MultipleChoice => AnswerValue::Selected(0),
                QuestionType::Feedback => AnswerValue::Text("great".into()),
            },
        })
        .collect()
}

pub async fn seed(memory: &MemoryStore, ad_units: &[&AdUnit]) {
    for ad_unit in ad_units {
        memory.ad_units.create(ad_unit).await.unwrap();
    }
}

pub fn service(memory: &MemoryStore) -> RewardService {
    RewardService::new(memory.store(), DailyLimits::default(), RewardPolicy::Flat)
}

pub fn service_with_limit(memory: &MemoryStore, max_ads_per_day: u32) -> RewardService {
    let limits = DailyLimits {
        max_ads_per_day: Some(max_ads_per_day),
    };
    RewardService::new(memory.store(), limits, RewardPolicy::Flat)
}
