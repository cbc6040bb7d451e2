// src/game/stats.rs — Cumulative player statistics and their update rules

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::infra::config::ScoringConfig;
use crate::infra::errors::GoodQuestionError;
use crate::memory::StoreRef;

/// Most recent session records kept in `UserStats::history`.
pub const HISTORY_CAP: usize = 50;
/// Most recent knowledge notes kept in `UserStats::knowledge_notes`.
pub const NOTES_CAP: usize = 50;

pub const STRUCTURE_LABEL: &str = "構造化力";
pub const EMPATHY_LABEL: &str = "共感・傾聴力";
pub const HYPOTHESIS_LABEL: &str = "仮説検証力";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XpFormula {
    /// xp = score
    Direct,
    /// xp = floor(score * 1.5 + reachability * 0.5)
    Weighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelCurve {
    /// level = floor(xp / 500) + 1
    Linear,
    /// level = floor(sqrt(xp / 50)) + 1
    Sqrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SkillScores {
    pub structure: u32,
    pub empathy: u32,
    pub hypothesis: u32,
}

impl SkillScores {
    pub fn uniform(value: u32) -> Self {
        Self {
            structure: value,
            empathy: value,
            hypothesis: value,
        }
    }

    pub fn labeled(&self) -> [(&'static str, u32); 3] {
        [
            (STRUCTURE_LABEL, self.structure),
            (EMPATHY_LABEL, self.empathy),
            (HYPOTHESIS_LABEL, self.hypothesis),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub date: NaiveDate,
    pub scenario_title: String,
    pub total_score: u32,
    pub skills: SkillScores,
    pub good_questions: Vec<String>,
    pub reflections: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNote {
    pub id: String,
    pub original_question: String,
    pub good_question: String,
    pub thinking_habit: String,
    pub date: NaiveDate,
}

/// Persisted aggregate. Stored as a single JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserStats {
    pub total_sessions: u32,
    pub total_xp: u64,
    pub level: u32,
    pub best_score: u32,
    pub current_streak: u32,
    pub last_played_date: Option<NaiveDate>,
    pub skills: SkillScores,
    pub history: Vec<SessionRecord>,
    pub knowledge_notes: Vec<KnowledgeNote>,
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            total_sessions: 0,
            total_xp: 0,
            level: 1,
            best_score: 0,
            current_streak: 0,
            last_played_date: None,
            skills: SkillScores::default(),
            history: Vec::new(),
            knowledge_notes: Vec::new(),
        }
    }
}

/// Draft of a knowledge note before it is dated and numbered.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteDraft {
    pub original_question: String,
    pub good_question: String,
    pub thinking_habit: String,
}

/// Everything a finished session contributes to the aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub session_id: String,
    pub scenario_title: String,
    pub total_score: u32,
    pub reachability: u32,
    pub skills: SkillScores,
    pub good_questions: Vec<String>,
    pub reflections: String,
    pub knowledge_note: Option<NoteDraft>,
}

pub fn xp_for(score: u32, reachability: u32, formula: XpFormula) -> u64 {
    match formula {
        XpFormula::Direct => score as u64,
        XpFormula::Weighted => (score as f64 * 1.5 + reachability as f64 * 0.5).floor() as u64,
    }
}

pub fn level_for_xp(xp: u64, curve: LevelCurve) -> u32 {
    match curve {
        LevelCurve::Linear => (xp / 500) as u32 + 1,
        LevelCurve::Sqrt => (xp as f64 / 50.0).sqrt().floor() as u32 + 1,
    }
}

fn running_mean(old: u32, n: u32, new: u32) -> u32 {
    ((old as f64 * n as f64 + new as f64) / (n as f64 + 1.0)).round() as u32
}

fn next_streak(current: u32, last: Option<NaiveDate>, today: NaiveDate) -> u32 {
    match last {
        None => 1,
        Some(last) => match (today - last).num_days() {
            1 => current + 1,
            d if d > 1 => 1,
            // same day or a clock that went backwards
            _ => current,
        },
    }
}

/// Fold one finished session into the aggregate. Pure; `today` is the play date.
pub fn record_session(
    prev: &UserStats,
    outcome: &SessionOutcome,
    today: NaiveDate,
    scoring: &ScoringConfig,
) -> UserStats {
    let n = prev.total_sessions;
    let gained = xp_for(outcome.total_score, outcome.reachability, scoring.xp_formula);
    let total_xp = prev.total_xp + gained;

    let skills = SkillScores {
        structure: running_mean(prev.skills.structure, n, outcome.skills.structure),
        empathy: running_mean(prev.skills.empathy, n, outcome.skills.empathy),
        hypothesis: running_mean(prev.skills.hypothesis, n, outcome.skills.hypothesis),
    };

    let mut history = Vec::with_capacity(HISTORY_CAP);
    history.push(SessionRecord {
        id: outcome.session_id.clone(),
        date: today,
        scenario_title: outcome.scenario_title.clone(),
        total_score: outcome.total_score,
        skills: outcome.skills,
        good_questions: outcome.good_questions.clone(),
        reflections: outcome.reflections.clone(),
    });
    history.extend(prev.history.iter().take(HISTORY_CAP - 1).cloned());

    let mut knowledge_notes = prev.knowledge_notes.clone();
    if let Some(draft) = &outcome.knowledge_note {
        knowledge_notes.insert(
            0,
            KnowledgeNote {
                id: format!("{}_note", outcome.session_id),
                original_question: draft.original_question.clone(),
                good_question: draft.good_question.clone(),
                thinking_habit: draft.thinking_habit.clone(),
                date: today,
            },
        );
        knowledge_notes.truncate(NOTES_CAP);
    }

    UserStats {
        total_sessions: n + 1,
        total_xp,
        level: level_for_xp(total_xp, scoring.level_curve),
        best_score: prev.best_score.max(outcome.total_score),
        current_streak: next_streak(prev.current_streak, prev.last_played_date, today),
        last_played_date: Some(today),
        skills,
        history,
        knowledge_notes,
    }
}

/// Labels of skills whose average sits below `threshold`. Empty until a session is played.
pub fn weak_points(stats: &UserStats, threshold: u32) -> Vec<String> {
    if stats.total_sessions == 0 {
        return Vec::new();
    }
    stats
        .skills
        .labeled()
        .iter()
        .filter(|(_, v)| *v < threshold)
        .map(|(label, _)| label.to_string())
        .collect()
}

/// Serializes read-modify-write of `UserStats` through the shared store lock.
#[derive(Clone)]
pub struct StatsStore {
    store: StoreRef,
    scoring: ScoringConfig,
}

impl StatsStore {
    pub fn new(store: StoreRef, scoring: ScoringConfig) -> Self {
        Self { store, scoring }
    }

    pub fn load(&self) -> Result<UserStats, GoodQuestionError> {
        let store = crate::memory::lock(&self.store)?;
        store.load_stats()
    }

    pub fn weak_points(&self) -> Result<Vec<String>, GoodQuestionError> {
        Ok(weak_points(&self.load()?, self.scoring.weak_point_threshold))
    }

    pub fn commit(&self, outcome: &SessionOutcome) -> Result<UserStats, GoodQuestionError> {
        self.commit_on(outcome, Utc::now().date_naive())
    }

    /// Load, fold and save under one lock so concurrent commits never lose an update.
    pub fn commit_on(
        &self,
        outcome: &SessionOutcome,
        today: NaiveDate,
    ) -> Result<UserStats, GoodQuestionError> {
        let store = crate::memory::lock(&self.store)?;
        let prev = store.load_stats()?;
        let next = record_session(&prev, outcome, today, &self.scoring);
        store.save_stats(&next)?;
        tracing::info!(
            sessions = next.total_sessions,
            xp = next.total_xp,
            level = next.level,
            streak = next.current_streak,
            "Stats updated"
        );
        Ok(next)
    }

    pub fn reset(&self) -> Result<(), GoodQuestionError> {
        let store = crate::memory::lock(&self.store)?;
        store.save_stats(&UserStats::default())
    }
}
