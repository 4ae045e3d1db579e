//! Async driver for the step-up flow.
//!
//! Feeds [`machine::transition`] from the identity provider adapter and a
//! caller-supplied command channel, streaming every phase change back over an
//! updates channel. The push poll runs inline under `tokio::select!` against
//! the command channel, so selecting another factor or cancelling structurally
//! tears down the in-flight poll; two concurrent polls cannot exist.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::idp::models::ChallengeProof;
use crate::idp::{IdpClient, models::FactorResult};
use crate::mfa::machine::{self, AssertionChallenge, MfaEvent, MfaPhase};
use crate::session::SessionStore;

/// Cadence of the push status poll.
pub const PUSH_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Hard ceiling on how long a push challenge may stay unanswered.
pub const PUSH_POLL_CEILING: Duration = Duration::from_secs(60);

/// Commands the caller (UI layer) sends into a running workflow.
#[derive(Debug, Clone)]
pub enum MfaCommand {
    SelectFactor(String),
    SubmitCode(String),
    /// Ask the provider to send a fresh code for the factor being challenged.
    ResendCode,
    /// Result of the platform WebAuthn assertion ceremony.
    SubmitAssertion {
        client_data: String,
        authenticator_data: String,
        signature_data: String,
    },
    Cancel,
}

/// How a workflow run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MfaOutcome {
    /// Step-up completed; `redirect` is the parked destination, if any.
    Completed { redirect: Option<String> },
    /// The caller went away or cancelled out of factor selection.
    Abandoned,
    /// Terminal failure: no factors, the factor list could not load, or a
    /// push challenge was rejected or expired.
    Failed { message: String },
}

enum PushPoll {
    Event(MfaEvent),
    Switch(String),
}

pub struct MfaWorkflow {
    idp: IdpClient,
    user_id: String,
    poll_interval: Duration,
    poll_ceiling: Duration,
}

impl MfaWorkflow {
    #[must_use]
    pub fn new(idp: IdpClient, user_id: impl Into<String>) -> Self {
        Self {
            idp,
            user_id: user_id.into(),
            poll_interval: PUSH_POLL_INTERVAL,
            poll_ceiling: PUSH_POLL_CEILING,
        }
    }

    /// Override the push poll cadence and ceiling.
    #[must_use]
    pub fn with_push_timing(mut self, interval: Duration, ceiling: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_ceiling = ceiling;
        self
    }

    /// Drive one step-up attempt to a terminal outcome.
    ///
    /// On success the session records the step-up proof and the parked
    /// redirect is consumed.
    pub async fn run(
        &self,
        session: &mut SessionStore,
        mut commands: mpsc::Receiver<MfaCommand>,
        updates: mpsc::Sender<MfaPhase>,
    ) -> MfaOutcome {
        let mut phase = MfaPhase::Loading;
        let _ = updates.send(phase.clone()).await;

        let event = match self.idp.list_factors(&self.user_id).await {
            Ok(factors) => MfaEvent::FactorsLoaded(factors),
            Err(err) => {
                warn!(error = %err, "loading MFA factors failed");
                MfaEvent::LoadFailed(err.to_string())
            }
        };
        phase = machine::transition(phase, event);
        let _ = updates.send(phase.clone()).await;
        if let MfaPhase::Error { message } = phase {
            return MfaOutcome::Failed { message };
        }

        let mut replay: Option<MfaCommand> = None;
        loop {
            let command = match replay.take() {
                Some(command) => command,
                None => match commands.recv().await {
                    Some(command) => command,
                    None => return MfaOutcome::Abandoned,
                },
            };

            match command {
                MfaCommand::Cancel => {
                    if matches!(phase, MfaPhase::SelectFactor { .. }) {
                        return MfaOutcome::Abandoned;
                    }
                    phase = machine::transition(phase, MfaEvent::Cancelled);
                    let _ = updates.send(phase.clone()).await;
                }

                MfaCommand::SelectFactor(factor_id) => {
                    phase =
                        machine::transition(phase, MfaEvent::FactorSelected(factor_id.clone()));
                    let _ = updates.send(phase.clone()).await;

                    if matches!(phase, MfaPhase::PushWaiting { .. }) {
                        match self.drive_push(&factor_id, &mut commands).await {
                            PushPoll::Event(event) => {
                                phase = machine::transition(phase, event);
                                let _ = updates.send(phase.clone()).await;
                                if matches!(phase, MfaPhase::Success) {
                                    return self.finish(session);
                                }
                                if let MfaPhase::Error { message } = &phase {
                                    return MfaOutcome::Failed {
                                        message: message.clone(),
                                    };
                                }
                            }
                            PushPoll::Switch(next_id) => {
                                phase = machine::transition(phase, MfaEvent::Cancelled);
                                let _ = updates.send(phase.clone()).await;
                                replay = Some(MfaCommand::SelectFactor(next_id));
                            }
                        }
                    } else if matches!(phase, MfaPhase::Challenge { .. }) {
                        // An empty-body verify POST tells the provider to
                        // deliver the code over the factor's channel.
                        if let Some(event) = self.dispatch_code(&factor_id).await {
                            phase = machine::transition(phase, event);
                            let _ = updates.send(phase.clone()).await;
                        }
                    } else if matches!(phase, MfaPhase::Verifying { .. }) {
                        let event = self.begin_assertion(&phase, &factor_id).await;
                        phase = machine::transition(phase, event);
                        let _ = updates.send(phase.clone()).await;
                    }
                }

                MfaCommand::ResendCode => {
                    let factor_id = match &phase {
                        MfaPhase::Challenge { factor_id, .. } => factor_id.clone(),
                        _ => continue,
                    };
                    if let Some(event) = self.dispatch_code(&factor_id).await {
                        phase = machine::transition(phase, event);
                        let _ = updates.send(phase.clone()).await;
                    }
                }

                MfaCommand::SubmitCode(code) => {
                    let factor_id = match &phase {
                        MfaPhase::Challenge { factor_id, .. } => factor_id.clone(),
                        _ => continue,
                    };
                    let code = code.trim();
                    if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
                        phase = machine::transition(
                            phase,
                            MfaEvent::ChallengeFailed(
                                "enter the verification code".to_string(),
                            ),
                        );
                        let _ = updates.send(phase.clone()).await;
                        continue;
                    }

                    phase = machine::transition(phase, MfaEvent::CodeSubmitted);
                    let _ = updates.send(phase.clone()).await;

                    let proof = ChallengeProof::Otp {
                        pass_code: code.to_string(),
                    };
                    phase = machine::transition(
                        phase,
                        self.verify(&factor_id, &proof).await,
                    );
                    let _ = updates.send(phase.clone()).await;
                    if matches!(phase, MfaPhase::Success) {
                        return self.finish(session);
                    }
                }

                MfaCommand::SubmitAssertion {
                    client_data,
                    authenticator_data,
                    signature_data,
                } => {
                    let factor_id = match &phase {
                        MfaPhase::Verifying { factor_id, .. } => factor_id.clone(),
                        _ => continue,
                    };
                    let proof = ChallengeProof::WebAuthnAssertion {
                        client_data,
                        authenticator_data,
                        signature_data,
                    };
                    phase = machine::transition(
                        phase,
                        self.verify(&factor_id, &proof).await,
                    );
                    let _ = updates.send(phase.clone()).await;
                    if matches!(phase, MfaPhase::Success) {
                        return self.finish(session);
                    }
                }
            }
        }
    }

    /// Ask the provider to send a code for an OTP-style factor. Returns an
    /// event only on failure; a successful dispatch leaves the phase alone.
    async fn dispatch_code(&self, factor_id: &str) -> Option<MfaEvent> {
        match self.idp.issue_challenge(&self.user_id, factor_id).await {
            Ok(_) => {
                debug!(factor_id, "verification code dispatched");
                None
            }
            Err(err) => {
                warn!(error = %err, factor_id, "challenge dispatch failed");
                Some(MfaEvent::ChallengeFailed(err.to_string()))
            }
        }
    }

    /// Issue the assertion challenge for a WebAuthn factor, pairing the
    /// provider's nonce with the factor's registered credential id.
    async fn begin_assertion(&self, phase: &MfaPhase, factor_id: &str) -> MfaEvent {
        let credential_id = match phase {
            MfaPhase::Verifying { factors, .. } => factors
                .iter()
                .find(|factor| factor.id == factor_id)
                .and_then(|factor| factor.profile.credential_id.clone()),
            _ => None,
        };

        match self.idp.issue_challenge(&self.user_id, factor_id).await {
            Ok(challenge) => match challenge.nonce {
                Some(nonce) => MfaEvent::AssertionReady(AssertionChallenge {
                    nonce,
                    credential_id,
                }),
                None => {
                    warn!(factor_id, "assertion challenge came back without a nonce");
                    MfaEvent::ChallengeFailed(
                        "the provider did not issue an assertion challenge".to_string(),
                    )
                }
            },
            Err(err) => {
                warn!(error = %err, factor_id, "assertion challenge dispatch failed");
                MfaEvent::ChallengeFailed(err.to_string())
            }
        }
    }

    async fn verify(&self, factor_id: &str, proof: &ChallengeProof) -> MfaEvent {
        match self.idp.verify_challenge(&self.user_id, factor_id, proof).await {
            Ok(challenge) => MfaEvent::ChallengeResolved(challenge.result),
            Err(err) => {
                warn!(error = %err, factor_id, "challenge verification failed");
                MfaEvent::ChallengeFailed(err.to_string())
            }
        }
    }

    /// Poll the push factor until it resolves, the ceiling passes, the caller
    /// switches factors, or the caller cancels. The first tick fires
    /// immediately and doubles as the initial challenge dispatch.
    async fn drive_push(
        &self,
        factor_id: &str,
        commands: &mut mpsc::Receiver<MfaCommand>,
    ) -> PushPoll {
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let ceiling = tokio::time::sleep(self.poll_ceiling);
        tokio::pin!(ceiling);

        let mut commands_closed = false;
        loop {
            let next_command = async {
                if commands_closed {
                    std::future::pending::<Option<MfaCommand>>().await
                } else {
                    commands.recv().await
                }
            };

            tokio::select! {
                maybe_command = next_command => match maybe_command {
                    Some(MfaCommand::Cancel) => return PushPoll::Event(MfaEvent::Cancelled),
                    Some(MfaCommand::SelectFactor(next_id)) => {
                        return PushPoll::Switch(next_id);
                    }
                    // Codes and assertions are meaningless while a push is
                    // outstanding.
                    Some(_) => {}
                    None => commands_closed = true,
                },
                () = &mut ceiling => {
                    debug!(factor_id, "push challenge hit the poll ceiling");
                    return PushPoll::Event(MfaEvent::ChallengeResolved(FactorResult::Timeout));
                }
                _ = poll.tick() => {
                    match self.idp.issue_challenge(&self.user_id, factor_id).await {
                        Ok(challenge) => match challenge.result {
                            FactorResult::Waiting | FactorResult::Challenge => {}
                            result => {
                                return PushPoll::Event(MfaEvent::ChallengeResolved(result));
                            }
                        },
                        Err(err) => {
                            warn!(error = %err, factor_id, "push challenge dispatch failed");
                            return PushPoll::Event(MfaEvent::ChallengeFailed(err.to_string()));
                        }
                    }
                }
            }
        }
    }

    fn finish(&self, session: &mut SessionStore) -> MfaOutcome {
        session.note_step_up(Utc::now());
        let redirect = session.take_mfa_redirect();
        info!(user_id = %self.user_id, "step-up completed");
        MfaOutcome::Completed { redirect }
    }
}
