use bson::oid::ObjectId;
use schema::{AdUnit, QuestionType};

use crate::error::Error;

/// Validate Ad Unit:
/// - `title` and `video_url` are not empty
/// - `total_reward` is finite and not negative
/// - `max_daily_views`, if set, is at least 1
/// - question ids are unique
/// - `questions.text` is not empty
/// - multiple choice questions have at least two options, none empty
/// - `correct_option`, if set, points at an existing option
/// - feedback questions have no options
/// - `questions.reward`, if set, is finite and not negative
/// - rewards set on graded questions add up to at most `total_reward`
pub fn validate_ad_unit(ad_unit: &AdUnit) -> Result<(), Error> {
    if ad_unit.title.trim().is_empty() {
        return Err(Error::InvalidAdUnit("Ad unit title is empty".into()));
    }
    if ad_unit.video_url.trim().is_empty() {
        return Err(Error::InvalidAdUnit(format!(
            "Ad unit {} has no video",
            ad_unit.id
        )));
    }
    if !ad_unit.total_reward.is_finite() || ad_unit.total_reward < 0.0 {
        return Err(Error::InvalidAdUnit(format!(
            "Ad unit {} total reward must be a non-negative number, found {}",
            ad_unit.id, ad_unit.total_reward
        )));
    }
    if ad_unit.max_daily_views == Some(0) {
        return Err(Error::InvalidAdUnit(format!(
            "Ad unit {} max daily views must be at least 1",
            ad_unit.id
        )));
    }

    let mut question_ids: Vec<ObjectId> = vec![];
    for question in &ad_unit.questions {
        if question_ids.contains(&question.id) {
            return Err(Error::InvalidAdUnit(format!(
                "question id {} is duplicated",
                question.id
            )));
        }
        question_ids.push(question.id);

        if question.text.trim().is_empty() {
            return Err(Error::InvalidAdUnit(format!(
                "Question {} has empty text",
                question.id
            )));
        }

        match question._type {
            QuestionType::MultipleChoice => {
                if question.options.len() < 2 {
                    return Err(Error::InvalidAdUnit(format!(
                        "Question {} needs at least 2 options, found {}",
                        question.id,
                        question.options.len()
                    )));
                }
                if let Some(i) = question.options.iter().position(|o| o.trim().is_empty()) {
                    return Err(Error::InvalidAdUnit(format!(
                        "Option {i} in question {} has empty text",
                        question.id
                    )));
                }
                if let Some(correct) = question.correct_option {
                    if correct >= question.options.len() {
                        return Err(Error::InvalidAdUnit(format!(
                            "Question {} marks option {correct} correct, but has {} options",
                            question.id,
                            question.options.len()
                        )));
                    }
                }
            }
            QuestionType::Feedback => {
                if !question.options.is_empty() || question.correct_option.is_some() {
                    return Err(Error::InvalidAdUnit(format!(
                        "Feedback question {} must not have options",
                        question.id
                    )));
                }
            }
        }

        if let Some(reward) = question.reward {
            if !reward.is_finite() || reward < 0.0 {
                return Err(Error::InvalidAdUnit(format!(
                    "Question {} reward must be a non-negative number, found {reward}",
                    question.id
                )));
            }
        }
    }

    let explicit: f64 = ad_unit
        .questions
        .iter()
        .filter(|q| q.correct_option.is_some())
        .filter_map(|q| q.reward)
        .sum();
    if explicit > ad_unit.total_reward + REWARD_TOLERANCE {
        return Err(Error::InvalidAdUnit(format!(
            "Question rewards add up to {explicit}, more than the total reward {}",
            ad_unit.total_reward
        )));
    }

    Ok(())
}

const REWARD_TOLERANCE: f64 = 1e-9;

#[cfg(test)]
mod tests {
    use schema::Question;

    use super::*;

    fn valid() -> AdUnit {
        AdUnit {
            title: "Coffee".into(),
            video_url: "https://cdn.example.com/coffee.mp4".into(),
            total_reward: 10.0,
            questions: vec![
                Question {
                    id: ObjectId::new(),
                    _type: QuestionType::MultipleChoice,
                    text: "Which drink was shown?".into(),
                    options: vec!["Tea".into(), "Coffee".into()],
                    correct_option: Some(1),
                    reward: None,
                },
                Question {
                    id: ObjectId::new(),
                    _type: QuestionType::Feedback,
                    text: "What did you think, {firstName}?".into(),
                    options: vec![],
                    correct_option: None,
                    reward: None,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn accepts_valid_ad_unit() {
        assert_eq!(validate_ad_unit(&valid()), Ok(()));
        let no_questions = AdUnit {
            questions: vec![],
            ..valid()
        };
        assert_eq!(validate_ad_unit(&no_questions), Ok(()));
    }

    #[test]
    fn rejects_bad_fields() {
        let cases = [
            AdUnit {
                title: " ".into(),
                ..valid()
            },
            AdUnit {
                total_reward: -1.0,
                ..valid()
            },
            AdUnit {
                total_reward: f64::NAN,
                ..valid()
            },
            AdUnit {
                max_daily_views: Some(0),
                ..valid()
            },
        ];
        for ad_unit in cases {
            assert!(validate_ad_unit(&ad_unit).is_err(), "{ad_unit:?}");
        }
    }

    #[test]
    fn rejects_bad_questions() {
        let mut duplicate = valid();
        duplicate.questions[1].id = duplicate.questions[0].id;
        assert!(validate_ad_unit(&duplicate).is_err());

        let mut one_option = valid();
        one_option.questions[0].options.pop();
        assert!(validate_ad_unit(&one_option).is_err());

        let mut bad_correct = valid();
        bad_correct.questions[0].correct_option = Some(2);
        assert!(validate_ad_unit(&bad_correct).is_err());

        let mut feedback_options = valid();
        feedback_options.questions[1].options.push("Good".into());
        assert!(validate_ad_unit(&feedback_options).is_err());
    }

    #[test]
    fn question_rewards_fit_in_total() {
        let mut exact = valid();
        exact.questions[0].reward = Some(10.0);
        assert_eq!(validate_ad_unit(&exact), Ok(()));

        let mut over = valid();
        over.questions[0].reward = Some(10.5);
        assert!(validate_ad_unit(&over).is_err());

        let mut split = valid();
        let mut second = split.questions[0].clone();
        second.id = ObjectId::new();
        split.questions[0].reward = Some(6.0);
        second.reward = Some(6.0);
        split.questions.push(second);
        assert!(validate_ad_unit(&split).is_err());
    }
}
