//! The verification wizard.
//!
//! A [`Session`] walks `ConnectWallet -> ChooseMethod -> SubmitRequest -> AwaitCompletion ->
//! Complete`. Progress inside the last two stages is tracked per [`Step`]. Transitions called
//! out of order fail with [`FlowError::InvalidTransition`] and leave the session untouched.
//! [`run_verification`] drives a prepared session against a contract and a proof source.

use crate::attestation::AttestationRequest;
use crate::chain::VerificationContract;
use crate::da_layer::{
    voting_round_at, VerifierClient, COSTON2_FIRST_VOTING_ROUND_START_TS,
    VOTING_EPOCH_DURATION_SECS,
};
use crate::error::FlowError;
use crate::poll::{await_proof, PollPolicy, ProofQuery, ProofSource};
use crate::registry::DEFAULT_VERIFICATION_FEE;
use crate::social::{
    bio_code, parse_wallet_address, tweet_intent_url, verification_tweet_text, HandleResolver,
    TweetId, TweetRef, TwitterHandle, TwitterUserId,
};
use alloy_primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ConnectWallet,
    ChooseMethod,
    SubmitRequest,
    AwaitCompletion,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Tweet,
    Bio,
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tweet" => Ok(Method::Tweet),
            "bio" => Ok(Method::Bio),
            other => Err(format!("unknown verification method: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Submit,
    Fdc,
    Proof,
    Complete,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Submit, Step::Fdc, Step::Proof, Step::Complete];

    fn index(self) -> usize {
        match self {
            Step::Submit => 0,
            Step::Fdc => 1,
            Step::Proof => 2,
            Step::Complete => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::Submit => "submit request",
            Step::Fdc => "FDC attestation",
            Step::Proof => "submit proof",
            Step::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Processing => "processing",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress([StepStatus; 4]);

impl Progress {
    pub fn get(&self, step: Step) -> StepStatus {
        self.0[step.index()]
    }

    fn set(&mut self, step: Step, status: StepStatus) {
        self.0[step.index()] = status;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Step, StepStatus)> + '_ {
        Step::ALL.iter().map(move |s| (*s, self.get(*s)))
    }
}

/// What the user submits: the tweet and the account expected to have authored it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub tweet: TweetRef,
    pub twitter_id: TwitterUserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub request_id: B256,
    pub tx_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub twitter_id: String,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Session {
    stage: Stage,
    wallet: Option<Address>,
    method: Option<Method>,
    prepared: Option<PreparedRequest>,
    submission: Option<Submission>,
    progress: Progress,
    completion: Option<Completion>,
    failure: Option<(Step, String)>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            stage: Stage::ConnectWallet,
            wallet: None,
            method: None,
            prepared: None,
            submission: None,
            progress: Progress::default(),
            completion: None,
            failure: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The connected wallet, kept across [`Session::restart`].
    pub fn wallet(&self) -> Option<Address> {
        self.wallet
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn prepared(&self) -> Option<&PreparedRequest> {
        self.prepared.as_ref()
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    pub fn failure(&self) -> Option<(Step, &str)> {
        self.failure.as_ref().map(|(s, r)| (*s, r.as_str()))
    }

    fn expect_stage(&self, stage: Stage, action: &'static str) -> Result<(), FlowError> {
        if self.stage != stage {
            return Err(FlowError::InvalidTransition {
                stage: self.stage,
                action,
            });
        }
        Ok(())
    }

    pub fn connect_wallet(&mut self, input: &str) -> Result<Address, FlowError> {
        self.expect_stage(Stage::ConnectWallet, "connect a wallet")?;
        let wallet = parse_wallet_address(input)?;
        self.wallet = Some(wallet);
        self.stage = Stage::ChooseMethod;
        Ok(wallet)
    }

    pub fn choose_method(&mut self, method: Method) -> Result<(), FlowError> {
        self.expect_stage(Stage::ChooseMethod, "choose a method")?;
        if method == Method::Bio {
            return Err(FlowError::UnsupportedMethod(method));
        }
        self.method = Some(method);
        self.stage = Stage::SubmitRequest;
        Ok(())
    }

    /// Text the user is asked to tweet. Available once a wallet is connected.
    pub fn tweet_text(&self) -> Option<String> {
        self.wallet.as_ref().map(verification_tweet_text)
    }

    pub fn tweet_intent(&self) -> Option<String> {
        self.tweet_text().map(|t| tweet_intent_url(&t))
    }

    pub fn bio_code(&self) -> Option<String> {
        self.wallet.as_ref().map(bio_code)
    }

    /// May be called repeatedly until the request is submitted.
    pub fn prepare(&mut self, tweet: TweetRef, twitter_id: TwitterUserId) -> Result<(), FlowError> {
        self.expect_stage(Stage::SubmitRequest, "prepare a request")?;
        self.prepared = Some(PreparedRequest { tweet, twitter_id });
        self.failure = None;
        self.progress = Progress::default();
        Ok(())
    }

    pub fn begin_submit(&mut self) -> Result<&PreparedRequest, FlowError> {
        self.expect_stage(Stage::SubmitRequest, "submit a request")?;
        let prepared = self.prepared.as_ref().ok_or(FlowError::InvalidTransition {
            stage: self.stage,
            action: "submit before preparing",
        })?;
        self.progress.set(Step::Submit, StepStatus::Processing);
        Ok(prepared)
    }

    pub fn record_submission(&mut self, request_id: B256, tx_hash: B256) -> Result<(), FlowError> {
        self.expect_stage(Stage::SubmitRequest, "record a submission")?;
        if self.prepared.is_none() {
            return Err(FlowError::InvalidTransition {
                stage: self.stage,
                action: "record a submission before preparing",
            });
        }
        self.submission = Some(Submission {
            request_id,
            tx_hash,
        });
        self.progress.set(Step::Submit, StepStatus::Completed);
        self.progress.set(Step::Fdc, StepStatus::Processing);
        self.stage = Stage::AwaitCompletion;
        Ok(())
    }

    pub fn proof_received(&mut self) -> Result<(), FlowError> {
        self.expect_stage(Stage::AwaitCompletion, "accept a proof")?;
        self.progress.set(Step::Fdc, StepStatus::Completed);
        self.progress.set(Step::Proof, StepStatus::Processing);
        Ok(())
    }

    pub fn complete(
        &mut self,
        twitter_id: String,
        verified_at: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        self.expect_stage(Stage::AwaitCompletion, "complete")?;
        for step in Step::ALL {
            self.progress.set(step, StepStatus::Completed);
        }
        self.completion = Some(Completion {
            twitter_id,
            verified_at,
        });
        self.stage = Stage::Complete;
        Ok(())
    }

    /// Marks `step` failed. The stage is kept so the user can retry or restart.
    pub fn fail(&mut self, step: Step, reason: impl Into<String>) -> Result<(), FlowError> {
        if !matches!(self.stage, Stage::SubmitRequest | Stage::AwaitCompletion) {
            return Err(FlowError::InvalidTransition {
                stage: self.stage,
                action: "fail a step",
            });
        }
        let reason = reason.into();
        warn!(step = step.label(), %reason, "verification step failed");
        self.progress.set(step, StepStatus::Failed);
        self.failure = Some((step, reason));
        Ok(())
    }

    /// Back to the first stage. The last connected wallet is remembered.
    pub fn restart(&mut self) {
        let wallet = self.wallet;
        *self = Self::new();
        self.wallet = wallet;
    }
}

/// Picks the account id: an explicit id wins, otherwise the handle is resolved.
pub async fn resolve_twitter_id(
    resolver: &dyn HandleResolver,
    explicit: Option<TwitterUserId>,
    handle: Option<&TwitterHandle>,
) -> Result<TwitterUserId, FlowError> {
    if let Some(id) = explicit {
        return Ok(id);
    }
    let handle = handle.ok_or(FlowError::MissingTwitterId)?;
    Ok(resolver.resolve(handle).await?)
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub fee: U256,
    pub poll: PollPolicy,
    pub first_round_start: u64,
    pub epoch_secs: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fee: U256::from(DEFAULT_VERIFICATION_FEE),
            poll: PollPolicy::default(),
            first_round_start: COSTON2_FIRST_VOTING_ROUND_START_TS,
            epoch_secs: VOTING_EPOCH_DURATION_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub request_id: B256,
    pub request_tx: B256,
    pub submit_tx: B256,
    pub voting_round: u64,
    pub twitter_id: String,
}

/// Encoded attestation request for a tweet, or empty bytes when no verifier is configured.
pub async fn attestation_request_bytes(
    verifier: Option<&VerifierClient>,
    tweet_id: &TweetId,
) -> Result<Bytes, FlowError> {
    match verifier {
        Some(v) => Ok(v
            .prepare_request(&AttestationRequest::for_tweet(tweet_id))
            .await?),
        None => Ok(Bytes::new()),
    }
}

/// Request, await the attestation, submit the proof, then read the binding back.
pub async fn run_verification(
    contract: &dyn VerificationContract,
    proofs: &dyn ProofSource,
    verifier: Option<&VerifierClient>,
    session: &mut Session,
    options: &RunOptions,
) -> Result<VerificationOutcome, FlowError> {
    let signer = contract.sender();
    if let Some(wallet) = session.wallet() {
        if wallet != signer {
            return Err(FlowError::WalletMismatch {
                session: wallet,
                signer,
            });
        }
    }
    let prepared = session.begin_submit()?.clone();
    let tweet_id = prepared.tweet.tweet_id.clone();

    let receipt = match contract
        .request_verification(&tweet_id, &prepared.twitter_id, options.fee)
        .await
    {
        Ok(r) => r,
        Err(e) => {
            session.fail(Step::Submit, e.to_string())?;
            return Err(e.into());
        }
    };
    session.record_submission(receipt.request_id, receipt.tx.tx_hash)?;
    info!(
        request_id = %receipt.request_id,
        tx_hash = %receipt.tx.tx_hash,
        tweet_id = %tweet_id,
        "verification requested"
    );

    let voting_round = voting_round_at(
        receipt.tx.block_timestamp,
        options.first_round_start,
        options.epoch_secs,
    );
    let request_bytes = match attestation_request_bytes(verifier, &tweet_id).await {
        Ok(b) => b,
        Err(e) => {
            session.fail(Step::Fdc, e.to_string())?;
            return Err(e);
        }
    };
    let query = ProofQuery {
        request_id: receipt.request_id,
        voting_round,
        request_bytes,
    };
    let proof = match await_proof(proofs, &query, options.poll).await {
        Ok(p) => p,
        Err(e) => {
            session.fail(Step::Fdc, e.to_string())?;
            return Err(e.into());
        }
    };
    session.proof_received()?;

    let submit = match contract.submit_verification(receipt.request_id, proof).await {
        Ok(tx) => tx,
        Err(e) => {
            session.fail(Step::Proof, e.to_string())?;
            return Err(e.into());
        }
    };
    let twitter_id = contract.get_user_twitter_id(signer).await?;
    session.complete(twitter_id.clone(), Utc::now())?;
    info!(wallet = %signer, %twitter_id, "wallet verified");

    Ok(VerificationOutcome {
        request_id: receipt.request_id,
        request_tx: receipt.tx.tx_hash,
        submit_tx: submit.tx_hash,
        voting_round,
        twitter_id,
    })
}
