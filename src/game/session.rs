// src/game/session.rs — Session lifecycle: welcome → questioning → evaluation → result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::parser;
use crate::infra::config::SessionConfig;
use crate::infra::errors::GoodQuestionError;
use crate::provider::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Welcome,
    Questioning,
    Evaluation,
    Result,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Welcome => "welcome",
            Phase::Questioning => "questioning",
            Phase::Evaluation => "evaluation",
            Phase::Result => "result",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub industry: String,
    pub theme: String,
    pub difficulty: String,
}

impl Scenario {
    pub fn title(&self) -> String {
        format!("{} / {}", self.industry, self.theme)
    }
}

/// Mentor-generated scenario. `hidden_root_cause` is never shown to the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Briefing {
    pub briefing: String,
    pub surface: String,
    pub hidden_root_cause: String,
    pub client_personality: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLimits {
    pub max_questions: u32,
    pub min_questions_for_evaluation: u32,
}

impl From<&SessionConfig> for SessionLimits {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_questions: config.max_questions,
            min_questions_for_evaluation: config.min_questions_for_evaluation,
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// One play-through. Persisted as JSON so an interrupted session can resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub phase: Phase,
    pub question_count: u32,
    /// Latest reported root-cause reachability, 0..=100.
    pub reachability: u32,
    pub messages: Vec<Message>,
    pub scenario: Scenario,
    #[serde(default)]
    pub briefing: Option<Briefing>,
    #[serde(default)]
    pub help_count: u32,
    pub limits: SessionLimits,
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(scenario: Scenario, limits: SessionLimits) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            phase: Phase::Welcome,
            question_count: 0,
            reachability: 0,
            messages: Vec::new(),
            scenario,
            briefing: None,
            help_count: 0,
            limits,
            created_at: Utc::now(),
        }
    }

    /// Opening user turn describing the scenario. Not counted as a question.
    pub fn opening_message(&self) -> String {
        format!(
            "ゲームを開始してください。\n難易度：{}\n業界：{}\nテーマ：{}",
            self.scenario.difficulty, self.scenario.industry, self.scenario.theme
        )
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), GoodQuestionError> {
        if self.phase != expected {
            return Err(GoodQuestionError::InvalidPhase {
                expected: expected.to_string(),
                actual: self.phase.to_string(),
            });
        }
        Ok(())
    }

    /// Welcome → Questioning with the opening exchange as the whole transcript.
    pub fn begin(&mut self, opening: String, reply: String) -> Result<(), GoodQuestionError> {
        self.expect_phase(Phase::Welcome)?;
        self.messages = vec![Message::user(opening), Message::model(reply)];
        self.enter_questioning();
        Ok(())
    }

    /// Welcome → Questioning from a mentor briefing. The transcript opens with a model turn.
    pub fn begin_briefed(&mut self, briefing: Briefing) -> Result<(), GoodQuestionError> {
        self.expect_phase(Phase::Welcome)?;
        self.scenario.theme = briefing.surface.clone();
        self.messages = vec![Message::model(format!(
            "【上司のブリーフィング】\n{}\n\n【クライアント】\n「{}」",
            briefing.briefing, briefing.surface
        ))];
        self.briefing = Some(briefing);
        self.enter_questioning();
        Ok(())
    }

    fn enter_questioning(&mut self) {
        self.phase = Phase::Questioning;
        self.question_count = 0;
        self.reachability = 0;
        self.help_count = 0;
    }

    pub fn remaining_questions(&self) -> u32 {
        self.limits.max_questions.saturating_sub(self.question_count)
    }

    pub fn check_can_ask(&self, question: &str) -> Result<(), GoodQuestionError> {
        self.expect_phase(Phase::Questioning)?;
        if question.trim().is_empty() {
            return Err(GoodQuestionError::EmptyInput);
        }
        if self.question_count >= self.limits.max_questions {
            return Err(GoodQuestionError::QuestionLimitReached {
                limit: self.limits.max_questions,
            });
        }
        Ok(())
    }

    /// Append a successful question/answer pair. Returns the reachability the reply reported.
    pub fn record_exchange(
        &mut self,
        question: String,
        reply: String,
    ) -> Result<Option<u32>, GoodQuestionError> {
        self.check_can_ask(&question)?;
        let reported = parser::extract_reachability(&reply);
        if let Some(r) = reported {
            self.reachability = r.min(100);
        }
        self.messages.push(Message::user(question));
        self.messages.push(Message::model(reply));
        self.question_count += 1;
        Ok(reported)
    }

    /// Locally generated notice. Shown in the transcript, never sent to the collaborator.
    pub fn record_failure(&mut self, notice: impl Into<String>) {
        self.messages.push(Message::system(notice));
    }

    pub fn record_hint(&mut self) {
        self.help_count += 1;
    }

    pub fn can_request_evaluation(&self) -> bool {
        self.phase == Phase::Questioning
            && self.question_count >= self.limits.min_questions_for_evaluation
    }

    pub fn request_evaluation(&mut self) -> Result<(), GoodQuestionError> {
        self.expect_phase(Phase::Questioning)?;
        if !self.can_request_evaluation() {
            return Err(GoodQuestionError::NotEnoughQuestions {
                required: self.limits.min_questions_for_evaluation,
                asked: self.question_count,
            });
        }
        self.phase = Phase::Evaluation;
        Ok(())
    }

    pub fn check_can_submit_root_cause(&self) -> Result<(), GoodQuestionError> {
        self.expect_phase(Phase::Evaluation)
    }

    /// The sent and received general-evaluation turns. Phase stays Evaluation until `finish`.
    pub fn record_root_cause(
        &mut self,
        statement: String,
        reply: String,
    ) -> Result<(), GoodQuestionError> {
        self.check_can_submit_root_cause()?;
        self.messages.push(Message::user(statement));
        self.messages.push(Message::model(reply));
        Ok(())
    }

    pub fn finish(&mut self) -> Result<(), GoodQuestionError> {
        self.expect_phase(Phase::Evaluation)?;
        self.phase = Phase::Result;
        Ok(())
    }

    /// Extra facilitator context for briefed sessions, so the client stays in character.
    pub fn facilitator_context(&self) -> Option<String> {
        self.briefing.as_ref().map(|b| {
            format!(
                "\n\n## 今回のシナリオ設定（プレイヤーには非公開）\n- 表面的な相談：{}\n- 真因：{}\n- クライアントの人物像：{}",
                b.surface, b.hidden_root_cause, b.client_personality
            )
        })
    }

    pub fn title(&self) -> String {
        self.scenario.title()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Role;
    use pretty_assertions::assert_eq;

    fn scenario() -> Scenario {
        Scenario {
            industry: "製造業".into(),
            theme: "在庫管理システム".into(),
            difficulty: "Medium".into(),
        }
    }

    fn started(limits: SessionLimits) -> SessionState {
        let mut s = SessionState::new(scenario(), limits);
        let opening = s.opening_message();
        s.begin(opening, "ようこそ。真因到達度：0%".into()).unwrap();
        s
    }

    fn ask(s: &mut SessionState, n: u32) {
        for i in 0..n {
            s.record_exchange(format!("質問{i}"), format!("回答{i}")).unwrap();
        }
    }

    // ─── Start tests ─────────────────────────────────────────────

    #[test]
    fn test_new_session_in_welcome() {
        let s = SessionState::new(scenario(), SessionLimits::default());
        assert_eq!(s.phase, Phase::Welcome);
        assert_eq!(s.question_count, 0);
        assert!(s.messages.is_empty());
        assert_eq!(s.title(), "製造業 / 在庫管理システム");
    }

    #[test]
    fn test_opening_message_names_scenario() {
        let s = SessionState::new(scenario(), SessionLimits::default());
        let m = s.opening_message();
        assert!(m.contains("難易度：Medium"));
        assert!(m.contains("業界：製造業"));
        assert!(m.contains("テーマ：在庫管理システム"));
    }

    #[test]
    fn test_begin_seeds_transcript() {
        let s = started(SessionLimits::default());
        assert_eq!(s.phase, Phase::Questioning);
        assert_eq!(s.messages.len(), 2);
        assert_eq!(s.messages[0].role, Role::User);
        assert_eq!(s.messages[1].role, Role::Model);
        assert_eq!(s.question_count, 0);
        assert_eq!(s.reachability, 0);
    }

    #[test]
    fn test_begin_twice_rejected() {
        let mut s = started(SessionLimits::default());
        let err = s.begin("x".into(), "y".into()).unwrap_err();
        assert!(matches!(err, GoodQuestionError::InvalidPhase { .. }));
    }

    #[test]
    fn test_begin_briefed_opens_with_model_turn() {
        let mut s = SessionState::new(scenario(), SessionLimits::default());
        s.begin_briefed(Briefing {
            briefing: "ある商社の営業部長です".into(),
            surface: "受注が減っている".into(),
            hidden_root_cause: "評価制度".into(),
            client_personality: "せっかち".into(),
        })
        .unwrap();
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.messages[0].role, Role::Model);
        assert_eq!(
            s.messages[0].content,
            "【上司のブリーフィング】\nある商社の営業部長です\n\n【クライアント】\n「受注が減っている」"
        );
        assert_eq!(s.scenario.theme, "受注が減っている");
        assert!(s.facilitator_context().unwrap().contains("評価制度"));
    }

    // ─── Questioning tests ───────────────────────────────────────

    #[test]
    fn test_record_exchange_counts_and_tracks_reachability() {
        let mut s = started(SessionLimits::default());
        let reported = s
            .record_exchange(
                "在庫はどこで数えていますか？".into(),
                "倉庫です。\n真因到達度：40%".into(),
            )
            .unwrap();
        assert_eq!(reported, Some(40));
        assert_eq!(s.reachability, 40);
        assert_eq!(s.question_count, 1);
        assert_eq!(s.messages.len(), 4);

        s.record_exchange("他には？".into(), "特にありません".into()).unwrap();
        assert_eq!(s.reachability, 40);
        assert_eq!(s.question_count, 2);
    }

    #[test]
    fn test_reachability_clamped() {
        let mut s = started(SessionLimits::default());
        s.record_exchange("q".into(), "真因到達度：180%".into()).unwrap();
        assert_eq!(s.reachability, 100);
    }

    #[test]
    fn test_question_cap_enforced() {
        let mut s = started(SessionLimits::default());
        ask(&mut s, 10);
        assert_eq!(s.remaining_questions(), 0);
        let err = s.check_can_ask("11番目").unwrap_err();
        assert!(matches!(err, GoodQuestionError::QuestionLimitReached { limit: 10 }));
        assert!(s.record_exchange("11番目".into(), "r".into()).is_err());
        assert_eq!(s.question_count, 10);
    }

    #[test]
    fn test_empty_question_rejected() {
        let s = started(SessionLimits::default());
        assert!(matches!(s.check_can_ask("   "), Err(GoodQuestionError::EmptyInput)));
    }

    #[test]
    fn test_failure_notice_does_not_count() {
        let mut s = started(SessionLimits::default());
        s.record_failure("エラーが発生しました。");
        assert_eq!(s.question_count, 0);
        assert_eq!(s.messages.last().unwrap().role, Role::System);
    }

    #[test]
    fn test_cannot_ask_before_start() {
        let s = SessionState::new(scenario(), SessionLimits::default());
        assert!(matches!(s.check_can_ask("q"), Err(GoodQuestionError::InvalidPhase { .. })));
    }

    // ─── Evaluation tests ────────────────────────────────────────

    #[test]
    fn test_evaluation_refused_below_threshold() {
        let mut s = started(SessionLimits::default());
        ask(&mut s, 9);
        assert!(!s.can_request_evaluation());
        let err = s.request_evaluation().unwrap_err();
        assert!(matches!(err, GoodQuestionError::NotEnoughQuestions { required: 10, asked: 9 }));
        assert_eq!(s.phase, Phase::Questioning);
    }

    #[test]
    fn test_evaluation_allowed_at_threshold() {
        let mut s = started(SessionLimits::default());
        ask(&mut s, 10);
        s.request_evaluation().unwrap();
        assert_eq!(s.phase, Phase::Evaluation);
        assert!(s.check_can_ask("q").is_err());
    }

    #[test]
    fn test_early_termination_threshold() {
        let mut s = started(SessionLimits {
            max_questions: 10,
            min_questions_for_evaluation: 1,
        });
        assert!(!s.can_request_evaluation());
        ask(&mut s, 1);
        s.request_evaluation().unwrap();
    }

    #[test]
    fn test_root_cause_and_finish() {
        let mut s = started(SessionLimits::default());
        assert!(s.check_can_submit_root_cause().is_err());
        ask(&mut s, 10);
        s.request_evaluation().unwrap();
        s.record_root_cause("真因：属人化".into(), "総合スコア：80".into()).unwrap();
        assert_eq!(s.phase, Phase::Evaluation);
        s.finish().unwrap();
        assert_eq!(s.phase, Phase::Result);
        assert!(s.finish().is_err());
    }

    #[test]
    fn test_state_json_roundtrip() {
        let mut s = started(SessionLimits::default());
        ask(&mut s, 3);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"phase\":\"questioning\""));
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
