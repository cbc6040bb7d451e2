// src/game/orchestrator.rs — Drives a session: state machine + gateway + stats commit

use std::sync::Arc;

use super::evaluation::{self, EvaluationReport, RootCauseSubmission, DETAILED_EVALUATION_REQUEST};
use super::gateway::ConversationGateway;
use super::prompts::{PromptLibrary, PromptMode};
use super::session::{Briefing, Phase, Scenario, SessionLimits, SessionState};
use super::stats::{StatsStore, UserStats};
use super::parser;
use crate::infra::config::Config;
use crate::infra::errors::GoodQuestionError;
use crate::memory::{self, StoreRef};
use crate::provider::{ChatProvider, Role};

pub const RATE_LIMIT_NOTICE: &str = "上司が会議中（制限中）です。数分後に再度お声がけください。";
pub const FAILURE_NOTICE: &str = "エラーが発生しました。";
const BRIEFED_START_MESSAGE: &str = "トレーニングを開始してください。";
const HINT_REQUEST: &str = "ここまでの会話を踏まえて、次の一手のヒントをください。";

/// Result of a turn that talks to the collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Reply { content: String, reachability: u32 },
    /// Collaborator answered 429. Nothing was recorded.
    RateLimited { notice: String },
    /// Collaborator failed. The session did not advance.
    Failed { notice: String },
}

impl TurnOutcome {
    fn from_error(error: &GoodQuestionError) -> Self {
        match error {
            GoodQuestionError::RateLimited { .. } => Self::RateLimited {
                notice: RATE_LIMIT_NOTICE.into(),
            },
            _ => Self::Failed {
                notice: FAILURE_NOTICE.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Completed {
        report: Box<EvaluationReport>,
        stats: Box<UserStats>,
    },
    RateLimited { notice: String },
    Failed { notice: String },
}

/// Lifecycle events for live display.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    PhaseChanged { from: Phase, to: Phase },
    ReachabilityChanged { value: u32 },
    StatsCommitted { level: u32, total_xp: u64 },
}

/// One player, one session at a time. `&mut self` on every turn keeps a second
/// request from starting while one is in flight.
pub struct Orchestrator {
    gateway: ConversationGateway,
    prompts: PromptLibrary,
    stats: StatsStore,
    store: StoreRef,
    config: Config,
    session: Option<SessionState>,
    on_event: Option<Box<dyn Fn(GameEvent) + Send + Sync>>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        store: StoreRef,
        prompts: PromptLibrary,
        config: Config,
    ) -> Self {
        Self {
            gateway: ConversationGateway::new(provider, &config.model),
            stats: StatsStore::new(store.clone(), config.scoring.clone()),
            store,
            prompts,
            config,
            session: None,
            on_event: None,
        }
    }

    pub fn with_events(mut self, cb: impl Fn(GameEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Box::new(cb));
        self
    }

    fn emit(&self, event: GameEvent) {
        if let Some(ref cb) = self.on_event {
            cb(event);
        }
    }

    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    pub fn stats(&self) -> Result<UserStats, GoodQuestionError> {
        self.stats.load()
    }

    fn limits(&self) -> SessionLimits {
        SessionLimits::from(&self.config.session)
    }

    fn active_session(&mut self) -> Result<&mut SessionState, GoodQuestionError> {
        self.session.as_mut().ok_or(GoodQuestionError::NoActiveSession)
    }

    fn facilitator_prompt(&self, session: &SessionState) -> Result<String, GoodQuestionError> {
        let mut prompt = self.prompts.load(PromptMode::Facilitator)?;
        if let Some(ctx) = session.facilitator_context() {
            prompt.push_str(&ctx);
        }
        Ok(prompt)
    }

    // -- Start --

    /// Start a fresh session. The previous one is replaced only once the opening succeeds.
    pub async fn start(&mut self, scenario: Scenario) -> Result<TurnOutcome, GoodQuestionError> {
        let mut session = SessionState::new(scenario, self.limits());
        let system = self.facilitator_prompt(&session)?;
        let opening = session.opening_message();

        tracing::info!(session = %session.id, scenario = %session.title(), "Starting session");
        let reply = match self.gateway.send_turn(&[], &opening, &system).await {
            Ok(reply) => reply,
            Err(e) if e.is_collaborator_failure() => {
                tracing::warn!("Session start failed: {}", e);
                return Ok(TurnOutcome::from_error(&e));
            }
            Err(e) => return Err(e),
        };

        session.begin(opening, reply.clone())?;
        persist(&self.store, &session, 0)?;
        memory::lock(&self.store)?.abandon_active_sessions(&session.id)?;
        self.session = Some(session);
        self.emit(GameEvent::PhaseChanged {
            from: Phase::Welcome,
            to: Phase::Questioning,
        });
        Ok(TurnOutcome::Reply {
            content: reply,
            reachability: 0,
        })
    }

    /// Start from a mentor-generated scenario aimed at the player's weak points.
    pub async fn start_briefed(
        &mut self,
        scenario: Scenario,
    ) -> Result<TurnOutcome, GoodQuestionError> {
        let weak = self.stats.weak_points()?;
        let system = self.prompts.mentor(&weak)?;
        let mut session = SessionState::new(scenario, self.limits());

        tracing::info!(session = %session.id, weak_points = ?weak, "Starting briefed session");
        let reply = match self.gateway.send_turn(&[], BRIEFED_START_MESSAGE, &system).await {
            Ok(reply) => reply,
            Err(e) if e.is_collaborator_failure() => {
                tracing::warn!("Briefing failed: {}", e);
                return Ok(TurnOutcome::from_error(&e));
            }
            Err(e) => return Err(e),
        };

        let Some(briefing) = parse_briefing(&reply) else {
            tracing::warn!("Mentor reply carried no usable scenario JSON");
            return Ok(TurnOutcome::Failed {
                notice: FAILURE_NOTICE.into(),
            });
        };

        session.begin_briefed(briefing)?;
        let content = session.messages[0].content.clone();
        persist(&self.store, &session, 0)?;
        memory::lock(&self.store)?.abandon_active_sessions(&session.id)?;
        self.session = Some(session);
        self.emit(GameEvent::PhaseChanged {
            from: Phase::Welcome,
            to: Phase::Questioning,
        });
        Ok(TurnOutcome::Reply {
            content,
            reachability: 0,
        })
    }

    /// Pick up the newest unfinished session from the archive.
    pub fn resume(&mut self) -> Result<Option<&SessionState>, GoodQuestionError> {
        let found = memory::lock(&self.store)?.latest_active_session()?;
        if let Some(ref s) = found {
            tracing::info!(
                session = %s.id,
                phase = %s.phase,
                questions = s.question_count,
                "Resuming session"
            );
        }
        self.session = found;
        Ok(self.session.as_ref())
    }

    // -- Questioning --

    pub async fn send_question(
        &mut self,
        question: &str,
    ) -> Result<TurnOutcome, GoodQuestionError> {
        let question = question.trim().to_string();
        let session = self.session.as_ref().ok_or(GoodQuestionError::NoActiveSession)?;
        session.check_can_ask(&question)?;
        let system = self.facilitator_prompt(session)?;

        let result = self
            .gateway
            .send_turn(&session.messages, &question, &system)
            .await;

        let store = self.store.clone();
        let session = self.active_session()?;
        let first_new = session.messages.len();
        match result {
            Ok(reply) => {
                let before = session.reachability;
                session.record_exchange(question, reply.clone())?;
                let reachability = session.reachability;
                persist(&store, session, first_new)?;
                tracing::debug!(count = session.question_count, reachability, "Question answered");
                if reachability != before {
                    self.emit(GameEvent::ReachabilityChanged { value: reachability });
                }
                Ok(TurnOutcome::Reply {
                    content: reply,
                    reachability,
                })
            }
            Err(e) if e.is_collaborator_failure() => {
                tracing::warn!("Question failed: {}", e);
                let outcome = TurnOutcome::from_error(&e);
                if let TurnOutcome::Failed { ref notice } = outcome {
                    session.record_failure(notice.clone());
                    persist(&store, session, first_new)?;
                }
                Ok(outcome)
            }
            Err(e) => Err(e),
        }
    }

    /// Boss hint. Shown to the player, never added to the transcript.
    pub async fn request_hint(&mut self) -> Result<TurnOutcome, GoodQuestionError> {
        let session = self.session.as_ref().ok_or(GoodQuestionError::NoActiveSession)?;
        if session.phase != Phase::Questioning {
            return Err(GoodQuestionError::InvalidPhase {
                expected: Phase::Questioning.to_string(),
                actual: session.phase.to_string(),
            });
        }
        if session.question_count == 0 {
            return Err(GoodQuestionError::NotEnoughQuestions {
                required: 1,
                asked: 0,
            });
        }
        let system = self.prompts.load(PromptMode::Helper)?;

        let result = self
            .gateway
            .send_turn(&session.messages, HINT_REQUEST, &system)
            .await;

        let store = self.store.clone();
        let session = self.active_session()?;
        match result {
            Ok(hint) => {
                session.record_hint();
                persist(&store, session, session.messages.len())?;
                Ok(TurnOutcome::Reply {
                    content: hint,
                    reachability: session.reachability,
                })
            }
            Err(e) if e.is_collaborator_failure() => {
                tracing::warn!("Hint failed: {}", e);
                Ok(TurnOutcome::from_error(&e))
            }
            Err(e) => Err(e),
        }
    }

    // -- Evaluation --

    pub fn request_evaluation(&mut self) -> Result<(), GoodQuestionError> {
        let store = self.store.clone();
        let session = self.active_session()?;
        session.request_evaluation()?;
        persist(&store, session, session.messages.len())?;
        self.emit(GameEvent::PhaseChanged {
            from: Phase::Questioning,
            to: Phase::Evaluation,
        });
        Ok(())
    }

    /// General evaluation, then detailed evaluation, then one stats commit.
    pub async fn submit_root_cause(
        &mut self,
        submission: &RootCauseSubmission,
    ) -> Result<EvaluationOutcome, GoodQuestionError> {
        submission.validate()?;
        let session = self.session.as_ref().ok_or(GoodQuestionError::NoActiveSession)?;
        session.check_can_submit_root_cause()?;
        let facilitator = self.facilitator_prompt(session)?;
        let reviewer = self.prompts.load(PromptMode::Reviewer)?;

        // Step 1: general evaluation under the facilitator
        let general = self
            .gateway
            .send_turn(&session.messages, &submission.request_text(), &facilitator)
            .await;

        let store = self.store.clone();
        let session = self.active_session()?;
        let first_new = session.messages.len();
        let general_text = match general {
            Ok(text) => text,
            Err(e) if e.is_collaborator_failure() => {
                tracing::warn!("General evaluation failed: {}", e);
                if let GoodQuestionError::RateLimited { .. } = e {
                    return Ok(EvaluationOutcome::RateLimited {
                        notice: RATE_LIMIT_NOTICE.into(),
                    });
                }
                session.record_failure(FAILURE_NOTICE);
                persist(&store, session, first_new)?;
                return Ok(EvaluationOutcome::Failed {
                    notice: FAILURE_NOTICE.into(),
                });
            }
            Err(e) => return Err(e),
        };
        session.record_root_cause(submission.statement(), general_text.clone())?;
        persist(&store, session, first_new)?;

        // Step 2: detailed evaluation under the reviewer; any failure falls back to defaults
        let detailed_text = match self
            .gateway
            .send_turn(&self.session_ref()?.messages, DETAILED_EVALUATION_REQUEST, &reviewer)
            .await
        {
            Ok(text) => Some(text),
            Err(e) if e.is_collaborator_failure() => {
                tracing::warn!("Detailed evaluation failed, using default scores: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        let general = evaluation::parse_general(&general_text);
        let default_skill = self.config.session.default_skill_score;
        let detailed = evaluation::parse_detailed(detailed_text.as_deref(), default_skill);
        if detailed.used_defaults {
            tracing::info!("Detailed evaluation incomplete, defaults applied");
        }

        let default_total = self.config.session.default_total_score;
        let session = self.session.as_mut().ok_or(GoodQuestionError::NoActiveSession)?;
        let report = EvaluationReport {
            session_id: session.id.clone(),
            scenario_title: session.title(),
            total_score: general.total_score.unwrap_or(default_total),
            reachability: session.reachability,
            skills: detailed.skills,
            good_questions: detailed.good_questions,
            reflections: detailed.reflections,
            strengths: general.strengths,
            improvements: general.improvements,
            general_text: general.text,
            detailed_text: detailed.text,
            help_count: session.help_count,
            clip: detailed.clip,
        };

        session.finish()?;
        let stats = self.stats.commit(&report.to_outcome())?;
        {
            let db = memory::lock(&store)?;
            db.save_session_state(session)?;
            db.complete_session(&report)?;
        }

        self.emit(GameEvent::PhaseChanged {
            from: Phase::Evaluation,
            to: Phase::Result,
        });
        self.emit(GameEvent::StatsCommitted {
            level: stats.level,
            total_xp: stats.total_xp,
        });
        tracing::info!(score = report.total_score, level = stats.level, "Session completed");

        Ok(EvaluationOutcome::Completed {
            report: Box::new(report),
            stats: Box::new(stats),
        })
    }

    fn session_ref(&self) -> Result<&SessionState, GoodQuestionError> {
        self.session.as_ref().ok_or(GoodQuestionError::NoActiveSession)
    }
}

/// Write the session row and any messages from `first_new` on.
fn persist(
    store: &StoreRef,
    session: &SessionState,
    first_new: usize,
) -> Result<(), GoodQuestionError> {
    let db = memory::lock(store)?;
    db.save_session_state(session)?;
    for message in &session.messages[first_new.min(session.messages.len())..] {
        let reachability = match message.role {
            Role::Model => parser::extract_reachability(&message.content).map(|r| r.min(100)),
            _ => None,
        };
        db.append_chat_message(&session.id, message, reachability)?;
    }
    Ok(())
}

#[derive(serde::Deserialize)]
struct BriefingPayload {
    briefing: String,
    scenario: BriefingScenario,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct BriefingScenario {
    surface: String,
    hidden_root_cause: String,
    client_personality: String,
}

fn parse_briefing(reply: &str) -> Option<Briefing> {
    let payload: BriefingPayload = parser::extract_json_as(reply)?;
    if payload.scenario.surface.trim().is_empty() {
        return None;
    }
    Some(Briefing {
        briefing: payload.briefing,
        surface: payload.scenario.surface,
        hidden_root_cause: payload.scenario.hidden_root_cause,
        client_personality: payload.scenario.client_personality,
    })
}
