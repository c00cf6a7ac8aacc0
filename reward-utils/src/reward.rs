use std::str::FromStr;

use schema::{AdUnit, AnswerValue, AttemptAnswer, Question, QuestionType};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How coins are credited for a completed attempt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewardPolicy {
    /// The ad unit's total reward, on full submission
    #[default]
    Flat,
    /// Only correctly answered multiple choice questions earn coins
    PartialCredit,
}

impl FromStr for RewardPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flat" => Ok(RewardPolicy::Flat),
            "partial-credit" | "partial_credit" => Ok(RewardPolicy::PartialCredit),
            other => Err(format!("unknown reward policy '{other}'")),
        }
    }
}

/// Checks a single answer against its question:
/// - answer kind matches question type
/// - selected option exists
/// - feedback text is not blank
pub fn validate_answer(question: &Question, value: &AnswerValue) -> Result<(), Error> {
    match (&question._type, value) {
        (QuestionType::MultipleChoice, AnswerValue::Selected(option)) => {
            if *option >= question.options.len() {
                return Err(Error::InvalidAnswer(format!(
                    "option {option} does not exist for question {}",
                    question.id
                )));
            }
        }
        (QuestionType::Feedback, AnswerValue::Text(text)) => {
            if text.trim().is_empty() {
                return Err(Error::InvalidAnswer(format!(
                    "feedback for question {} is empty",
                    question.id
                )));
            }
        }
        (_type, _) => {
            return Err(Error::InvalidAnswer(format!(
                "answer kind does not match question {} of type {_type:?}",
                question.id
            )));
        }
    }
    Ok(())
}

/// Checks an attempt has exactly one valid answer per question, in question order.
pub fn validate_answers(ad_unit: &AdUnit, answers: &[AttemptAnswer]) -> Result<(), Error> {
    if answers.len() != ad_unit.questions.len() {
        return Err(Error::InvalidAnswer(format!(
            "ad unit {} has {} questions, {} answers submitted",
            ad_unit.id,
            ad_unit.questions.len(),
            answers.len()
        )));
    }

    for (question, answer) in ad_unit.questions.iter().zip(answers) {
        if question.id != answer.question_id {
            return Err(Error::InvalidAnswer(format!(
                "expected answer for question {}, found {}",
                question.id, answer.question_id
            )));
        }
        validate_answer(question, &answer.value)?;
    }

    Ok(())
}

/// Calculates the coins credited for a validated attempt.
///
/// Under partial credit, each correctly answered multiple choice question earns its own
/// `reward`. Graded questions without one split what is left of the total equally.
/// The result never exceeds `total_reward`.
pub fn calculate_reward(ad_unit: &AdUnit, answers: &[AttemptAnswer], policy: RewardPolicy) -> f64 {
    match policy {
        RewardPolicy::Flat => ad_unit.total_reward,
        RewardPolicy::PartialCredit => {
            let graded: Vec<&Question> = ad_unit
                .questions
                .iter()
                .filter(|q| q._type == QuestionType::MultipleChoice && q.correct_option.is_some())
                .collect();
            if graded.is_empty() {
                return ad_unit.total_reward;
            }
            let explicit: f64 = graded.iter().filter_map(|q| q.reward).sum();
            let unset = graded.iter().filter(|q| q.reward.is_none()).count();
            let share = if unset == 0 {
                0.0
            } else {
                (ad_unit.total_reward - explicit).max(0.0) / unset as f64
            };

            let earned: f64 = graded
                .into_iter()
                .filter_map(|question| {
                    let correct = question.correct_option?;
                    let answer = answers.iter().find(|a| a.question_id == question.id)?;
                    match answer.value {
                        AnswerValue::Selected(selected) if selected == correct => {
                            Some(question.reward.unwrap_or(share))
                        }
                        _ => None,
                    }
                })
                .sum();
            earned.min(ad_unit.total_reward)
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::oid::ObjectId;

    use super::*;

    fn question(correct_option: Option<usize>, reward: Option<f64>) -> Question {
        Question {
            id: ObjectId::new(),
            _type: QuestionType::MultipleChoice,
            text: "Which colour was the car?".into(),
            options: vec!["Red".into(), "Blue".into(), "Green".into()],
            correct_option,
            reward,
        }
    }

    fn answer(question: &Question, value: AnswerValue) -> AttemptAnswer {
        AttemptAnswer {
            question_id: question.id,
            value,
        }
    }

    fn ad_unit(questions: Vec<Question>) -> AdUnit {
        AdUnit {
            title: "Car ad".into(),
            total_reward: 10.0,
            questions,
            ..Default::default()
        }
    }

    #[test]
    fn flat_reward_ignores_correctness() {
        let q1 = question(Some(0), None);
        let q2 = question(Some(1), None);
        let unit = ad_unit(vec![q1.clone(), q2.clone()]);
        let answers = vec![
            answer(&q1, AnswerValue::Selected(2)),
            answer(&q2, AnswerValue::Selected(2)),
        ];
        assert_eq!(calculate_reward(&unit, &answers, RewardPolicy::Flat), 10.0);
    }

    #[test]
    fn partial_credit_counts_correct_answers() {
        let q1 = question(Some(0), None);
        let q2 = question(Some(1), None);
        let unit = ad_unit(vec![q1.clone(), q2.clone()]);
        let answers = vec![
            answer(&q1, AnswerValue::Selected(0)),
            answer(&q2, AnswerValue::Selected(2)),
        ];
        assert_eq!(
            calculate_reward(&unit, &answers, RewardPolicy::PartialCredit),
            5.0
        );

        let weighted = question(Some(2), Some(7.5));
        let unit = ad_unit(vec![weighted.clone(), q2.clone()]);
        let answers = vec![
            answer(&weighted, AnswerValue::Selected(2)),
            answer(&q2, AnswerValue::Selected(1)),
        ];
        assert_eq!(
            calculate_reward(&unit, &answers, RewardPolicy::PartialCredit),
            10.0
        );
    }

    #[test]
    fn partial_credit_shares_the_remainder() {
        let heavy = question(Some(0), Some(8.0));
        let plain = question(Some(1), None);
        let unit = ad_unit(vec![heavy.clone(), plain.clone()]);

        let both = vec![
            answer(&heavy, AnswerValue::Selected(0)),
            answer(&plain, AnswerValue::Selected(1)),
        ];
        assert_eq!(
            calculate_reward(&unit, &both, RewardPolicy::PartialCredit),
            10.0
        );

        let heavy_only = vec![
            answer(&heavy, AnswerValue::Selected(0)),
            answer(&plain, AnswerValue::Selected(0)),
        ];
        assert_eq!(
            calculate_reward(&unit, &heavy_only, RewardPolicy::PartialCredit),
            8.0
        );

        let plain_only = vec![
            answer(&heavy, AnswerValue::Selected(1)),
            answer(&plain, AnswerValue::Selected(1)),
        ];
        assert_eq!(
            calculate_reward(&unit, &plain_only, RewardPolicy::PartialCredit),
            2.0
        );
    }

    #[test]
    fn partial_credit_never_exceeds_total() {
        // Not accepted by `validate_ad_unit`, but stored units may predate the check
        let q1 = question(Some(0), Some(8.0));
        let q2 = question(Some(0), Some(6.0));
        let q3 = question(Some(0), None);
        let unit = ad_unit(vec![q1.clone(), q2.clone(), q3.clone()]);
        let answers = vec![
            answer(&q1, AnswerValue::Selected(0)),
            answer(&q2, AnswerValue::Selected(0)),
            answer(&q3, AnswerValue::Selected(0)),
        ];
        assert_eq!(
            calculate_reward(&unit, &answers, RewardPolicy::PartialCredit),
            10.0
        );
    }

    #[test]
    fn answers_must_follow_question_order() {
        let q1 = question(None, None);
        let q2 = question(None, None);
        let unit = ad_unit(vec![q1.clone(), q2.clone()]);

        let in_order = vec![
            answer(&q1, AnswerValue::Selected(0)),
            answer(&q2, AnswerValue::Selected(1)),
        ];
        assert_eq!(validate_answers(&unit, &in_order), Ok(()));

        let swapped = vec![in_order[1].clone(), in_order[0].clone()];
        assert!(validate_answers(&unit, &swapped).is_err());
        assert!(validate_answers(&unit, &in_order[..1]).is_err());
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("flat".parse::<RewardPolicy>(), Ok(RewardPolicy::Flat));
        assert_eq!("Partial-Credit".parse::<RewardPolicy>(), Ok(RewardPolicy::PartialCredit));
        assert!("bonus".parse::<RewardPolicy>().is_err());
    }
}
