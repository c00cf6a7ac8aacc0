use schema::{AnswerValue, AttemptAnswer, Question, QuestionType, UserProfile};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::Error, placeholder::render, reward::validate_answer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequencerState {
    Answering { index: usize },
    ReadyToCommit,
    /// Answers have been handed to the committer and no result is known yet
    Submitting,
    Committed,
}

/// A question with placeholders resolved, ready to be shown
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderedQuestion {
    pub index: usize,
    pub total: usize,
    pub question: Question,
}

/// Walks an ad unit's questions one at a time.
///
/// Answers are handed out for committing at most once per pass. A failed commit puts
/// them back so the viewer can retry without answering again.
#[derive(Clone, Debug)]
pub struct QuestionSequencer {
    questions: Vec<Question>,
    answers: Vec<Option<AnswerValue>>,
    state: SequencerState,
}

impl QuestionSequencer {
    pub fn new(questions: Vec<Question>) -> Self {
        let state = if questions.is_empty() {
            SequencerState::ReadyToCommit
        } else {
            SequencerState::Answering { index: 0 }
        };
        Self {
            answers: vec![None; questions.len()],
            questions,
            state,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// The question being answered, with placeholders resolved from `profile`
    pub fn current_question(&self, profile: Option<&UserProfile>) -> Option<RenderedQuestion> {
        let SequencerState::Answering { index } = self.state else {
            return None;
        };
        let question = &self.questions[index];
        let mut rendered = question.clone();
        rendered.text = render(&question.text, profile);
        rendered.options = question
            .options
            .iter()
            .map(|option| render(option, profile))
            .collect();

        Some(RenderedQuestion {
            index,
            total: self.questions.len(),
            question: rendered,
        })
    }

    pub fn current_answer(&self) -> Option<&AnswerValue> {
        match self.state {
            SequencerState::Answering { index } => self.answers[index].as_ref(),
            _ => None,
        }
    }

    /// Stores an answer for the current question. The last recorded value wins.
    pub fn record_answer(&mut self, value: AnswerValue) -> Result<(), Error> {
        let SequencerState::Answering { index } = self.state else {
            return Err(Error::InvalidTransition(format!(
                "cannot record an answer while {:?}",
                self.state
            )));
        };
        let question = &self.questions[index];
        match (&question._type, &value) {
            (QuestionType::MultipleChoice, AnswerValue::Selected(_))
            | (QuestionType::Feedback, AnswerValue::Text(_)) => {}
            _ => {
                return Err(Error::InvalidAnswer(format!(
                    "answer kind does not match question {} of type {:?}",
                    question.id, question._type
                )));
            }
        }
        self.answers[index] = Some(value);
        Ok(())
    }

    /// Moves to the next question if the current one has a non-empty answer.
    pub fn advance(&mut self) -> Result<SequencerState, Error> {
        let SequencerState::Answering { index } = self.state else {
            return Err(Error::InvalidTransition(format!(
                "cannot advance while {:?}",
                self.state
            )));
        };
        let question = &self.questions[index];
        let Some(value) = &self.answers[index] else {
            return Err(Error::InvalidAnswer(format!(
                "question {} has not been answered",
                question.id
            )));
        };
        validate_answer(question, value)?;

        self.state = if index + 1 == self.questions.len() {
            SequencerState::ReadyToCommit
        } else {
            SequencerState::Answering { index: index + 1 }
        };
        debug!(from = index, to = ?self.state, "question answered");
        Ok(self.state)
    }

    /// Records `value` for question `index` and advances.
    ///
    /// Fails if `index` is not the current question, so a repeated submit cannot skip ahead.
    pub fn submit_answer(&mut self, index: usize, value: AnswerValue) -> Result<SequencerState, Error> {
        match self.state {
            SequencerState::Answering { index: current } if current == index => {}
            state => {
                return Err(Error::InvalidTransition(format!(
                    "answer for question {index} submitted while {state:?}"
                )));
            }
        }
        self.record_answer(value)?;
        self.advance()
    }

    /// Hands out the ordered answers for committing. Returns `None` unless the
    /// sequencer is ready to commit, so only the first caller gets them.
    pub fn take_submission(&mut self) -> Option<Vec<AttemptAnswer>> {
        if self.state != SequencerState::ReadyToCommit {
            return None;
        }
        let answers = self
            .questions
            .iter()
            .zip(&self.answers)
            .map(|(question, value)| {
                value.clone().map(|value| AttemptAnswer {
                    question_id: question.id,
                    value,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        self.state = SequencerState::Submitting;
        Some(answers)
    }

    pub fn commit_failed(&mut self) {
        if self.state == SequencerState::Submitting {
            self.state = SequencerState::ReadyToCommit;
        }
    }

    pub fn commit_succeeded(&mut self) {
        if self.state == SequencerState::Submitting {
            self.state = SequencerState::Committed;
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::oid::ObjectId;

    use super::*;

    fn multiple_choice(text: &str) -> Question {
        Question {
            id: ObjectId::new(),
            _type: QuestionType::MultipleChoice,
            text: text.into(),
            options: vec!["Yes".into(), "No".into()],
            correct_option: Some(0),
            reward: None,
        }
    }

    fn feedback(text: &str) -> Question {
        Question {
            id: ObjectId::new(),
            _type: QuestionType::Feedback,
            text: text.into(),
            options: vec![],
            correct_option: None,
            reward: None,
        }
    }

    #[test]
    fn cannot_advance_without_an_answer() {
        let mut sequencer = QuestionSequencer::new(vec![multiple_choice("Q1"), feedback("Q2")]);
        assert!(matches!(sequencer.advance(), Err(Error::InvalidAnswer(_))));
        assert_eq!(sequencer.state(), SequencerState::Answering { index: 0 });

        sequencer.submit_answer(0, AnswerValue::Selected(1)).unwrap();
        assert_eq!(sequencer.state(), SequencerState::Answering { index: 1 });

        for blank in ["", "   ", "\n\t"] {
            assert!(
                sequencer
                    .submit_answer(1, AnswerValue::Text(blank.into()))
                    .is_err()
            );
            assert_eq!(sequencer.state(), SequencerState::Answering { index: 1 });
        }
    }

    #[test]
    fn rejects_out_of_range_option_and_wrong_kind() {
        let mut sequencer = QuestionSequencer::new(vec![multiple_choice("Q1")]);
        assert!(sequencer.submit_answer(0, AnswerValue::Selected(2)).is_err());
        assert!(sequencer.submit_answer(0, AnswerValue::Text("yes".into())).is_err());
        assert_eq!(sequencer.state(), SequencerState::Answering { index: 0 });
    }

    #[test]
    fn stale_submit_cannot_skip_a_question() {
        let mut sequencer =
            QuestionSequencer::new(vec![multiple_choice("Q1"), multiple_choice("Q2")]);
        sequencer.submit_answer(0, AnswerValue::Selected(0)).unwrap();
        // Second click on the first question's button
        assert!(sequencer.submit_answer(0, AnswerValue::Selected(0)).is_err());
        assert_eq!(sequencer.state(), SequencerState::Answering { index: 1 });
    }

    #[test]
    fn submission_is_handed_out_once() {
        let q1 = multiple_choice("Q1");
        let q2 = feedback("Q2");
        let mut sequencer = QuestionSequencer::new(vec![q1.clone(), q2.clone()]);
        assert!(sequencer.take_submission().is_none());

        sequencer.submit_answer(0, AnswerValue::Selected(0)).unwrap();
        assert_eq!(
            sequencer.submit_answer(1, AnswerValue::Text("great".into())),
            Ok(SequencerState::ReadyToCommit)
        );

        let answers = sequencer.take_submission().unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].question_id, q1.id);
        assert_eq!(answers[1].value, AnswerValue::Text("great".into()));
        assert!(sequencer.take_submission().is_none());

        sequencer.commit_failed();
        assert_eq!(sequencer.state(), SequencerState::ReadyToCommit);
        assert_eq!(sequencer.take_submission(), Some(answers));

        sequencer.commit_succeeded();
        assert_eq!(sequencer.state(), SequencerState::Committed);
        assert!(sequencer.take_submission().is_none());
    }

    #[test]
    fn empty_question_list_is_ready_immediately() {
        let mut sequencer = QuestionSequencer::new(vec![]);
        assert_eq!(sequencer.state(), SequencerState::ReadyToCommit);
        assert!(sequencer.current_question(None).is_none());
        assert_eq!(sequencer.take_submission(), Some(vec![]));
    }

    #[test]
    fn renders_placeholders_in_text_and_options() {
        let mut question = multiple_choice("Hi {userName}, did you like it?");
        question.options = vec!["Yes, {firstName}".into(), "No".into()];
        let sequencer = QuestionSequencer::new(vec![question]);
        let profile = UserProfile {
            user_id: "u1".into(),
            display_name: Some("Ava".into()),
            ..Default::default()
        };

        let rendered = sequencer.current_question(Some(&profile)).unwrap();
        assert_eq!(rendered.index, 0);
        assert_eq!(rendered.total, 1);
        assert_eq!(rendered.question.text, "Hi Ava, did you like it?");
        assert_eq!(rendered.question.options[0], "Yes, Ava");
    }
}
