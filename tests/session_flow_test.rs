// tests/session_flow_test.rs — Integration test: full sessions against a scripted provider

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use goodquestion::game::evaluation::{
    RootCauseSubmission, DETAILED_EVALUATION_REQUEST, HIGHLIGHT_LABEL,
};
use goodquestion::game::orchestrator::{FAILURE_NOTICE, RATE_LIMIT_NOTICE};
use goodquestion::game::prompts::PromptLibrary;
use goodquestion::game::stats::{SkillScores, UserStats};
use goodquestion::game::{EvaluationOutcome, Orchestrator, Phase, Scenario, TurnOutcome};
use goodquestion::infra::config::Config;
use goodquestion::infra::errors::GoodQuestionError;
use goodquestion::memory::{self, StoreRef};
use goodquestion::provider::*;

/// Replays a fixed script of replies and records every request it sees.
struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, GoodQuestionError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<String, GoodQuestionError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, GoodQuestionError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(GoodQuestionError::Provider {
                provider: "scripted".into(),
                message: "script exhausted".into(),
                retriable: false,
            })
        });
        next.map(|content| ChatResponse {
            content,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 10,
            },
            stop_reason: StopReason::EndTurn,
        })
    }
}

fn ok(s: &str) -> Result<String, GoodQuestionError> {
    Ok(s.to_string())
}

fn rate_limited() -> Result<String, GoodQuestionError> {
    Err(GoodQuestionError::RateLimited {
        provider: "scripted".into(),
        retry_after_ms: 5000,
    })
}

fn server_error() -> Result<String, GoodQuestionError> {
    Err(GoodQuestionError::Provider {
        provider: "scripted".into(),
        message: "HTTP 500".into(),
        retriable: true,
    })
}

const GENERAL_REPLY: &str = "評価します。\n[TOTAL_SCORE: 85]\n[STRENGTHS]\n仮説が明確\n[IMPROVEMENTS]\n深掘り不足";
const DETAILED_REPLY: &str = "[STRUCTURE_SCORE: 85]\n[EMPATHY_SCORE: 60]\n[HYPOTHESIS_SCORE: 70]\n[GOOD_QUESTIONS]\n- 質問A\n[HABITS]\n癖の説明";

fn scenario() -> Scenario {
    Scenario {
        industry: "製造業".into(),
        theme: "在庫管理システム".into(),
        difficulty: "Medium".into(),
    }
}

fn submission() -> RootCauseSubmission {
    RootCauseSubmission {
        root_cause: "発注業務の属人化".into(),
        reason: "担当者不在時に欠品が出る".into(),
        approach: "発注基準の標準化".into(),
    }
}

fn orchestrator(
    provider: &Arc<ScriptedProvider>,
    store: &StoreRef,
    config: Config,
) -> Orchestrator {
    Orchestrator::new(provider.clone(), store.clone(), PromptLibrary::builtin_only(), config)
}

/// Script for a start plus `n` answered questions.
fn questioning_script(n: usize) -> Vec<Result<String, GoodQuestionError>> {
    let mut script = vec![ok("在庫が合わなくて困っています。\n真因到達度：0%")];
    for i in 1..=n {
        script.push(Ok(format!("回答{i}\n真因到達度：{}%", i * 8)));
    }
    script
}

async fn ask_n(orch: &mut Orchestrator, n: usize) {
    for i in 1..=n {
        let outcome = orch.send_question(&format!("質問{i}")).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Reply { .. }), "question {i} failed");
    }
}

// ─── Happy path ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_session_end_to_end() {
    let mut script = questioning_script(10);
    script.push(ok(GENERAL_REPLY));
    script.push(ok(DETAILED_REPLY));
    let provider = ScriptedProvider::new(script);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    let started = orch.start(scenario()).await.unwrap();
    assert!(matches!(started, TurnOutcome::Reply { reachability: 0, .. }));
    assert_eq!(orch.session().unwrap().phase, Phase::Questioning);

    ask_n(&mut orch, 9).await;
    let err = orch.request_evaluation().unwrap_err();
    assert!(matches!(err, GoodQuestionError::NotEnoughQuestions { required: 10, asked: 9 }));

    ask_n(&mut orch, 1).await;
    let calls_before = provider.calls();
    let refused = orch.send_question("11番目の質問").await.unwrap_err();
    assert!(matches!(refused, GoodQuestionError::QuestionLimitReached { limit: 10 }));
    assert_eq!(provider.calls(), calls_before);

    orch.request_evaluation().unwrap();
    let outcome = orch.submit_root_cause(&submission()).await.unwrap();
    let (report, stats) = match outcome {
        EvaluationOutcome::Completed { report, stats } => (report, stats),
        other => panic!("unexpected outcome: {other:?}"),
    };

    assert_eq!(report.total_score, 85);
    assert_eq!(report.reachability, 80);
    assert_eq!(report.skills, SkillScores { structure: 85, empathy: 60, hypothesis: 70 });
    assert_eq!(report.good_questions, vec!["質問A".to_string()]);
    assert_eq!(report.reflections, "癖の説明");
    assert_eq!(report.strengths.as_deref(), Some("仮説が明確"));

    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.total_xp, 85);
    assert_eq!(stats.level, 1);
    assert_eq!(stats.best_score, 85);
    assert_eq!(stats.current_streak, 1);
    assert_eq!(stats.knowledge_notes.len(), 1);
    assert_eq!(stats.knowledge_notes[0].original_question, HIGHLIGHT_LABEL);
    assert_eq!(stats.knowledge_notes[0].good_question, "質問A");

    let session = orch.session().unwrap();
    assert_eq!(session.phase, Phase::Result);
    assert_eq!(session.question_count, 10);

    // stats were persisted, session archived
    let db = memory::lock(&store).unwrap();
    assert_eq!(db.load_stats().unwrap(), *stats);
    let archived = db.final_evaluation(&session.id).unwrap().unwrap();
    assert_eq!(archived.total_score, 85);
    assert!(db.latest_active_session().unwrap().is_none());
    assert_eq!(db.chat_history(&session.id).unwrap().len(), 24);
}

#[tokio::test]
async fn test_evaluation_requests_wire_shape() {
    let mut script = questioning_script(10);
    script.push(ok(GENERAL_REPLY));
    script.push(ok(DETAILED_REPLY));
    let provider = ScriptedProvider::new(script);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    orch.start(scenario()).await.unwrap();
    ask_n(&mut orch, 10).await;
    orch.request_evaluation().unwrap();
    orch.submit_root_cause(&submission()).await.unwrap();

    let requests = provider.requests();
    assert_eq!(requests.len(), 13);

    // opening turn carries the scenario
    assert!(requests[0].messages[0].content.contains("業界：製造業"));
    assert!(requests[0].system.as_deref().unwrap().contains("真因到達度"));

    // first question travels after the opening exchange
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].messages[2], Message::user("質問1"));

    // guidance is sent but not kept in the transcript
    let general = &requests[11];
    let sent = &general.messages.last().unwrap().content;
    assert!(sent.contains("[TOTAL_SCORE: 0-100]"));
    assert!(sent.starts_with(&submission().statement()));
    let stored = &orch.session().unwrap().messages[22];
    assert_eq!(stored.role, Role::User);
    assert_eq!(stored.content, submission().statement());

    // detailed step runs under the reviewer instruction with the whole transcript
    let detailed = &requests[12];
    assert!(detailed.system.as_deref().unwrap().contains("超一流の戦略コンサルタント兼コーチ"));
    assert_eq!(detailed.messages.len(), 25);
    assert_eq!(detailed.messages.last().unwrap().content, DETAILED_EVALUATION_REQUEST);
}

// ─── Failure semantics ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_rate_limited_question_changes_nothing() {
    let mut script = questioning_script(1);
    script.push(rate_limited());
    let provider = ScriptedProvider::new(script);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    orch.start(scenario()).await.unwrap();
    ask_n(&mut orch, 1).await;
    let before = orch.session().unwrap().clone();

    let outcome = orch.send_question("質問2").await.unwrap();
    assert_eq!(
        outcome,
        TurnOutcome::RateLimited {
            notice: RATE_LIMIT_NOTICE.into()
        }
    );
    assert_eq!(orch.session().unwrap(), &before);
}

#[tokio::test]
async fn test_failed_question_adds_notice_only() {
    let mut script = questioning_script(1);
    script.push(server_error());
    script.push(ok("回答2\n真因到達度：30%"));
    let provider = ScriptedProvider::new(script);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    orch.start(scenario()).await.unwrap();
    ask_n(&mut orch, 1).await;
    let outcome = orch.send_question("質問2").await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Failed { .. }));

    let session = orch.session().unwrap();
    assert_eq!(session.question_count, 1);
    assert_eq!(session.reachability, 8);
    let last = session.messages.last().unwrap();
    assert_eq!(last, &Message::system(FAILURE_NOTICE));
    assert!(!session.messages.iter().any(|m| m.content == "質問2"));

    // the notice never reaches the collaborator
    orch.send_question("質問2").await.unwrap();
    let retry = provider.requests().pop().unwrap();
    assert!(retry.messages.iter().all(|m| m.role != Role::System));
    assert_eq!(orch.session().unwrap().question_count, 2);
    assert_eq!(orch.session().unwrap().reachability, 30);
}

#[tokio::test]
async fn test_general_evaluation_failure_stays_in_evaluation() {
    let mut script = questioning_script(10);
    script.push(server_error());
    let provider = ScriptedProvider::new(script);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    orch.start(scenario()).await.unwrap();
    ask_n(&mut orch, 10).await;
    orch.request_evaluation().unwrap();
    let outcome = orch.submit_root_cause(&submission()).await.unwrap();
    assert!(matches!(outcome, EvaluationOutcome::Failed { .. }));
    assert_eq!(orch.session().unwrap().phase, Phase::Evaluation);
    assert_eq!(orch.stats().unwrap(), UserStats::default());
}

#[tokio::test]
async fn test_detailed_failure_falls_back_to_defaults() {
    let mut script = questioning_script(10);
    script.push(ok(GENERAL_REPLY));
    script.push(server_error());
    let provider = ScriptedProvider::new(script);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    orch.start(scenario()).await.unwrap();
    ask_n(&mut orch, 10).await;
    orch.request_evaluation().unwrap();
    match orch.submit_root_cause(&submission()).await.unwrap() {
        EvaluationOutcome::Completed { report, stats } => {
            assert_eq!(report.skills, SkillScores::uniform(70));
            assert!(report.good_questions.is_empty());
            assert_eq!(report.total_score, 85);
            assert_eq!(stats.skills, SkillScores::uniform(70));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(orch.session().unwrap().phase, Phase::Result);
}

#[tokio::test]
async fn test_rate_limited_detailed_step_falls_back_to_defaults() {
    let mut script = questioning_script(10);
    script.push(ok(GENERAL_REPLY));
    script.push(rate_limited());
    let provider = ScriptedProvider::new(script);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    orch.start(scenario()).await.unwrap();
    ask_n(&mut orch, 10).await;
    orch.request_evaluation().unwrap();
    match orch.submit_root_cause(&submission()).await.unwrap() {
        EvaluationOutcome::Completed { report, stats } => {
            assert_eq!(report.skills, SkillScores::uniform(70));
            assert!(report.detailed_text.is_none());
            assert_eq!(report.total_score, 85);
            assert_eq!(stats.total_sessions, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(orch.session().unwrap().phase, Phase::Result);
}

#[tokio::test]
async fn test_rate_limited_root_cause_changes_nothing() {
    let mut script = questioning_script(10);
    script.push(rate_limited());
    let provider = ScriptedProvider::new(script);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    orch.start(scenario()).await.unwrap();
    ask_n(&mut orch, 10).await;
    orch.request_evaluation().unwrap();
    let before = orch.session().unwrap().clone();

    let outcome = orch.submit_root_cause(&submission()).await.unwrap();
    assert!(matches!(outcome, EvaluationOutcome::RateLimited { .. }));
    let session = orch.session().unwrap();
    assert_eq!(session, &before);
    assert_eq!(session.phase, Phase::Evaluation);
    assert!(!session.messages.iter().any(|m| m.role == Role::System));
    assert_eq!(orch.stats().unwrap(), UserStats::default());
    assert_eq!(provider.calls(), 12);
}

#[tokio::test]
async fn test_start_failure_leaves_no_session() {
    let provider = ScriptedProvider::new(vec![server_error()]);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    let outcome = orch.start(scenario()).await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Failed { .. }));
    assert!(orch.session().is_none());
    assert!(matches!(
        orch.send_question("質問").await,
        Err(GoodQuestionError::NoActiveSession)
    ));
    assert!(memory::lock(&store).unwrap().latest_active_session().unwrap().is_none());
}

#[tokio::test]
async fn test_failed_restart_keeps_live_session() {
    let mut script = questioning_script(1);
    script.push(rate_limited());
    script.push(server_error());
    script.push(rate_limited());
    script.push(ok("シナリオを作れませんでした。"));
    let provider = ScriptedProvider::new(script);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    orch.start(scenario()).await.unwrap();
    ask_n(&mut orch, 1).await;
    let before = orch.session().unwrap().clone();

    let limited = orch.start(scenario()).await.unwrap();
    assert!(matches!(limited, TurnOutcome::RateLimited { .. }));
    assert_eq!(orch.session().unwrap(), &before);

    let failed = orch.start(scenario()).await.unwrap();
    assert!(matches!(failed, TurnOutcome::Failed { .. }));
    assert_eq!(orch.session().unwrap(), &before);

    let briefed_limited = orch.start_briefed(scenario()).await.unwrap();
    assert!(matches!(briefed_limited, TurnOutcome::RateLimited { .. }));
    let briefed_failed = orch.start_briefed(scenario()).await.unwrap();
    assert!(matches!(briefed_failed, TurnOutcome::Failed { .. }));
    assert_eq!(orch.session().unwrap(), &before);

    // the archive still points at the live session
    let latest = memory::lock(&store).unwrap().latest_active_session().unwrap().unwrap();
    assert_eq!(latest.id, before.id);
    assert_eq!(latest.question_count, 1);
}

// ─── Variants ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_early_termination_threshold() {
    let mut script = questioning_script(1);
    script.push(ok("[TOTAL_SCORE: 40]"));
    script.push(ok(DETAILED_REPLY));
    let provider = ScriptedProvider::new(script);
    let store = memory::in_memory().unwrap();
    let mut config = Config::default();
    config.session.min_questions_for_evaluation = 1;
    let mut orch = orchestrator(&provider, &store, config);

    orch.start(scenario()).await.unwrap();
    assert!(orch.request_evaluation().is_err());
    ask_n(&mut orch, 1).await;
    orch.request_evaluation().unwrap();
    let outcome = orch.submit_root_cause(&submission()).await.unwrap();
    assert!(matches!(outcome, EvaluationOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_briefed_session_targets_weak_points() {
    let mentor_reply = "```json\n{\n  \"briefing\": \"今日は構造化にフォーカスしましょう。\",\n  \"scenario\": {\n    \"surface\": \"残業時間が減らない\",\n    \"hiddenRootCause\": \"評価制度への不信感\",\n    \"clientPersonality\": \"慎重派の課長\"\n  }\n}\n```";
    let provider =
        ScriptedProvider::new(vec![ok(mentor_reply), ok("そうですね。\n真因到達度：10%")]);
    let store = memory::in_memory().unwrap();
    memory::lock(&store)
        .unwrap()
        .save_stats(&UserStats {
            total_sessions: 1,
            skills: SkillScores {
                structure: 55,
                empathy: 80,
                hypothesis: 75,
            },
            ..Default::default()
        })
        .unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    let outcome = orch.start_briefed(scenario()).await.unwrap();
    match outcome {
        TurnOutcome::Reply { content, .. } => assert!(content.contains("残業時間が減らない")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let session = orch.session().unwrap();
    assert_eq!(session.messages[0].role, Role::Model);
    assert_eq!(session.scenario.theme, "残業時間が減らない");

    orch.send_question("いつ頃からですか？").await.unwrap();

    let requests = provider.requests();
    let mentor_system = requests[0].system.as_deref().unwrap();
    assert!(mentor_system.contains("構造化力"));
    assert!(!mentor_system.contains("${WEAK_POINTS}"));

    // leading model turn is not replayed; the client knows the hidden cause
    assert_eq!(requests[1].messages, vec![Message::user("いつ頃からですか？")]);
    assert!(requests[1].system.as_deref().unwrap().contains("評価制度への不信感"));
}

#[tokio::test]
async fn test_briefed_without_json_fails_softly() {
    let provider = ScriptedProvider::new(vec![ok("シナリオを作れませんでした。")]);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    let outcome = orch.start_briefed(scenario()).await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Failed { .. }));
    assert!(orch.session().is_none());
}

#[tokio::test]
async fn test_hint_is_counted_but_not_transcribed() {
    let mut script = questioning_script(1);
    script.push(ok("### 上司のアドバイス\n数字を聞いてみましょう。"));
    let provider = ScriptedProvider::new(script);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    orch.start(scenario()).await.unwrap();
    assert!(matches!(
        orch.request_hint().await,
        Err(GoodQuestionError::NotEnoughQuestions { .. })
    ));
    ask_n(&mut orch, 1).await;
    let before = orch.session().unwrap().messages.len();

    let hint = orch.request_hint().await.unwrap();
    assert!(matches!(
        hint,
        TurnOutcome::Reply { ref content, .. } if content.contains("上司のアドバイス")
    ));
    let session = orch.session().unwrap();
    assert_eq!(session.help_count, 1);
    assert_eq!(session.messages.len(), before);
    assert_eq!(session.question_count, 1);
}

#[tokio::test]
async fn test_resume_restores_unfinished_session() {
    let provider = ScriptedProvider::new(questioning_script(2));
    let store = memory::in_memory().unwrap();
    let session_id = {
        let mut orch = orchestrator(&provider, &store, Config::default());
        orch.start(scenario()).await.unwrap();
        ask_n(&mut orch, 2).await;
        orch.session().unwrap().id.clone()
    };

    let resumed_provider = ScriptedProvider::new(vec![ok("続きです。\n真因到達度：50%")]);
    let mut orch = orchestrator(&resumed_provider, &store, Config::default());
    let resumed = orch.resume().unwrap().unwrap();
    assert_eq!(resumed.id, session_id);
    assert_eq!(resumed.question_count, 2);
    assert_eq!(resumed.reachability, 16);

    orch.send_question("質問3").await.unwrap();
    assert_eq!(orch.session().unwrap().question_count, 3);
    assert_eq!(resumed_provider.requests()[0].messages.len(), 7);
}

#[tokio::test]
async fn test_new_start_abandons_previous_session() {
    let provider = ScriptedProvider::new(vec![ok("一件目"), ok("二件目")]);
    let store = memory::in_memory().unwrap();
    let mut orch = orchestrator(&provider, &store, Config::default());

    orch.start(scenario()).await.unwrap();
    let first = orch.session().unwrap().id.clone();
    orch.start(scenario()).await.unwrap();
    let second = orch.session().unwrap().id.clone();
    assert_ne!(first, second);

    let latest = memory::lock(&store).unwrap().latest_active_session().unwrap().unwrap();
    assert_eq!(latest.id, second);
}
