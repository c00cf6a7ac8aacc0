use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use reward_utils::{
    eligibility::Ineligible,
    error::Error as RulesError,
    playback::{PlaybackEvent, PlaybackGate, PlaybackState},
    sequencer::{QuestionSequencer, RenderedQuestion, SequencerState},
};
use schema::{AdUnit, AnswerValue, UserProfile};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::Error,
    rewards::{CommitReceipt, RewardService},
};

/// The signed-in viewer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
}

#[derive(thiserror::Error, Debug)]
pub enum FlowError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("unable to load ad unit: {0}")]
    Load(Error),
    #[error("{0}")]
    NotAvailable(Ineligible),
    #[error("{0}")]
    Rules(#[from] RulesError),
    #[error("unable to commit attempt: {0}")]
    Commit(Error),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FlowStatus {
    Watching(PlaybackState),
    Answering(RenderedQuestion),
    /// All questions answered, commit pending or failed
    ReadyToCommit,
    Completed(CommitReceipt),
}

/// One viewer watching one ad unit: playback, then questions, then a single commit.
pub struct WatchAdFlow {
    service: RewardService,
    user_id: String,
    ad_unit: AdUnit,
    profile: Option<UserProfile>,
    gate: PlaybackGate,
    sequencer: QuestionSequencer,
    receipt: Option<CommitReceipt>,
}

impl WatchAdFlow {
    /// Loads the ad unit and the viewer's profile, refusing units the viewer may not start.
    #[instrument(skip(service, session), err(Debug))]
    pub async fn start(
        service: RewardService,
        session: Option<&Session>,
        ad_unit_id: &ObjectId,
        now: DateTime<Utc>,
    ) -> Result<Self, FlowError> {
        let Some(session) = session else {
            return Err(FlowError::NotAuthenticated);
        };
        let user_id = session.user_id.clone();

        let ad_unit = service
            .get_ad_unit(ad_unit_id)
            .await
            .map_err(FlowError::Load)?;
        match service.check_eligible(&user_id, &ad_unit, now.date_naive()).await {
            Ok(()) => {}
            Err(Error::Rules(RulesError::Ineligible(reason))) => {
                return Err(FlowError::NotAvailable(reason));
            }
            Err(e) => return Err(FlowError::Load(e)),
        }
        let profile = service.get_profile(&user_id).await.map_err(FlowError::Load)?;

        debug!(user = %user_id, ad_unit = %ad_unit.id, "flow started");
        Ok(Self {
            service,
            user_id,
            sequencer: QuestionSequencer::new(ad_unit.questions.clone()),
            ad_unit,
            profile,
            gate: PlaybackGate::new(),
            receipt: None,
        })
    }

    pub fn ad_unit(&self) -> &AdUnit {
        &self.ad_unit
    }

    pub fn playback(&self) -> &PlaybackGate {
        &self.gate
    }

    pub fn status(&self) -> FlowStatus {
        if let Some(receipt) = &self.receipt {
            return FlowStatus::Completed(receipt.clone());
        }
        if !self.gate.is_unlocked() {
            return FlowStatus::Watching(self.gate.state());
        }
        match self.current_question() {
            Some(question) => FlowStatus::Answering(question),
            None => FlowStatus::ReadyToCommit,
        }
    }

    /// Feeds a media event to the gate. Events after playback ended are ignored.
    ///
    /// An ad unit without questions is committed as soon as playback ends.
    pub async fn on_playback(
        &mut self,
        event: PlaybackEvent,
        now: DateTime<Utc>,
    ) -> Result<FlowStatus, FlowError> {
        if self.gate.is_unlocked() {
            debug!(?event, "playback already ended");
            return Ok(self.status());
        }
        self.gate.handle(event)?;
        if self.gate.is_unlocked() && self.sequencer.state() == SequencerState::ReadyToCommit {
            return self.commit(now).await;
        }
        Ok(self.status())
    }

    /// The current question, or `None` while playback is locked or no question is pending
    pub fn current_question(&self) -> Option<RenderedQuestion> {
        if !self.gate.is_unlocked() {
            return None;
        }
        self.sequencer.current_question(self.profile.as_ref())
    }

    pub fn record_answer(&mut self, value: AnswerValue) -> Result<(), FlowError> {
        self.ensure_unlocked()?;
        self.sequencer.record_answer(value)?;
        Ok(())
    }

    /// Moves past the current question, committing after the last one
    pub async fn advance(&mut self, now: DateTime<Utc>) -> Result<FlowStatus, FlowError> {
        self.ensure_unlocked()?;
        match self.sequencer.advance()? {
            SequencerState::ReadyToCommit => self.commit(now).await,
            _ => Ok(self.status()),
        }
    }

    /// Answers question `index` and advances, committing after the last one.
    ///
    /// A repeated submit for a question already answered fails and commits nothing.
    pub async fn submit_answer(
        &mut self,
        index: usize,
        value: AnswerValue,
        now: DateTime<Utc>,
    ) -> Result<FlowStatus, FlowError> {
        self.ensure_unlocked()?;
        match self.sequencer.submit_answer(index, value)? {
            SequencerState::ReadyToCommit => self.commit(now).await,
            _ => Ok(self.status()),
        }
    }

    /// Commits the preserved answers again after a failed commit
    pub async fn retry_commit(&mut self, now: DateTime<Utc>) -> Result<FlowStatus, FlowError> {
        if !self.gate.is_unlocked() || self.sequencer.state() != SequencerState::ReadyToCommit {
            return Err(RulesError::InvalidTransition(format!(
                "nothing to retry while {:?}",
                self.sequencer.state()
            ))
            .into());
        }
        info!(user = %self.user_id, ad_unit = %self.ad_unit.id, "retrying commit");
        self.commit(now).await
    }

    fn ensure_unlocked(&self) -> Result<(), FlowError> {
        if self.gate.is_unlocked() {
            return Ok(());
        }
        Err(RulesError::InvalidTransition(format!(
            "questions are locked while playback is {:?}",
            self.gate.state()
        ))
        .into())
    }

    async fn commit(&mut self, now: DateTime<Utc>) -> Result<FlowStatus, FlowError> {
        let Some(answers) = self.sequencer.take_submission() else {
            debug!(state = ?self.sequencer.state(), "commit already handed out");
            return Ok(self.status());
        };

        match self
            .service
            .commit_attempt(&self.user_id, &self.ad_unit.id, answers, now)
            .await
        {
            Ok(receipt) => {
                self.sequencer.commit_succeeded();
                self.receipt = Some(receipt);
                Ok(self.status())
            }
            Err(Error::Rules(RulesError::Ineligible(reason))) => {
                self.sequencer.commit_failed();
                Err(FlowError::NotAvailable(reason))
            }
            Err(e) => {
                warn!(
                    user = %self.user_id,
                    ad_unit = %self.ad_unit.id,
                    error = %e,
                    "commit failed, answers kept"
                );
                self.sequencer.commit_failed();
                Err(FlowError::Commit(e))
            }
        }
    }
}
