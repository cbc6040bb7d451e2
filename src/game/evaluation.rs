// src/game/evaluation.rs — Root-cause submission and two-step evaluation parsing

use serde::{Deserialize, Serialize};

use super::parser::{self, ScoreMarker, HABITS_BOUNDARIES, SECTION_BOUNDARIES};
use super::stats::{NoteDraft, SessionOutcome, SkillScores};
use crate::infra::errors::GoodQuestionError;

/// Sent as the second evaluation turn, under the reviewer instruction.
pub const DETAILED_EVALUATION_REQUEST: &str =
    include_str!("../../templates/detailed_evaluation.md");

/// `original_question` of a note built from a good question alone.
pub const HIGHLIGHT_LABEL: &str = "セッションのハイライト";

/// Appended to the root-cause turn that is sent. Never stored in the transcript.
const EVALUATION_GUIDANCE: &str = "\n\n評価の際は、必ず以下の見出しを含めて詳細に回答してください：\n\
- [TOTAL_SCORE: 0-100]（到達度）\n\
- [STRENGTHS] あなたの強み\n\
- [IMPROVEMENTS] 改善ポイント\n\
- 真因の詳細解説\n\
- 適切なアプローチ\n\
- 模範解答例（真因到達の最短ルート）";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseSubmission {
    pub root_cause: String,
    pub reason: String,
    pub approach: String,
}

impl RootCauseSubmission {
    pub fn validate(&self) -> Result<(), GoodQuestionError> {
        if self.root_cause.trim().is_empty() {
            return Err(GoodQuestionError::EmptyInput);
        }
        Ok(())
    }

    /// What the player said, as kept in the transcript.
    pub fn statement(&self) -> String {
        format!(
            "【真因の特定】\n真因：{}\n根拠：{}\n解決アプローチ：{}",
            self.root_cause.trim(),
            self.reason.trim(),
            self.approach.trim()
        )
    }

    /// What is actually sent: the statement plus scoring guidance.
    pub fn request_text(&self) -> String {
        format!("{}{}", self.statement(), EVALUATION_GUIDANCE)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeneralEvaluation {
    pub text: String,
    pub total_score: Option<u32>,
    pub strengths: Option<String>,
    pub improvements: Option<String>,
}

pub fn parse_general(text: &str) -> GeneralEvaluation {
    GeneralEvaluation {
        text: text.to_string(),
        total_score: parser::extract_score(text, &ScoreMarker::TOTAL).map(|s| s.min(100)),
        strengths: section(text, parser::STRENGTHS_TAG),
        improvements: section(text, parser::IMPROVEMENTS_TAG),
    }
}

fn section(text: &str, tag: &str) -> Option<String> {
    parser::extract_delimited_section(text, tag, SECTION_BOUNDARIES)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailedEvaluation {
    pub text: Option<String>,
    pub skills: SkillScores,
    pub good_questions: Vec<String>,
    pub reflections: String,
    /// Reviewer's before/after rewrite of one question, when given.
    pub clip: Option<QuestionClip>,
    /// True when any skill fell back to the default score.
    pub used_defaults: bool,
}

/// Reviewer-mode JSON shape, used when the tagged markers are absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewerJson {
    #[serde(default)]
    scores: ReviewerScores,
    #[serde(default)]
    thinking_habits: Vec<String>,
    #[serde(default)]
    good_questions: Vec<String>,
    #[serde(default)]
    clips: Vec<QuestionClip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionClip {
    pub original: String,
    pub better: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewerScores {
    structure: Option<u32>,
    empathy: Option<u32>,
    hypothesis: Option<u32>,
}

/// Parse the detailed reply. `None` (the call failed) yields all defaults.
pub fn parse_detailed(text: Option<&str>, default_score: u32) -> DetailedEvaluation {
    let Some(text) = text else {
        return DetailedEvaluation {
            text: None,
            skills: SkillScores::uniform(default_score),
            good_questions: Vec::new(),
            reflections: String::new(),
            clip: None,
            used_defaults: true,
        };
    };

    let json: ReviewerJson = parser::extract_json_as(text).unwrap_or_default();
    let mut used_defaults = false;
    let mut score = |marker: &ScoreMarker, fallback: Option<u32>| {
        parser::extract_score(text, marker)
            .or(fallback)
            .map(|s| s.min(100))
            .unwrap_or_else(|| {
                used_defaults = true;
                default_score
            })
    };
    let skills = SkillScores {
        structure: score(&ScoreMarker::STRUCTURE, json.scores.structure),
        empathy: score(&ScoreMarker::EMPATHY, json.scores.empathy),
        hypothesis: score(&ScoreMarker::HYPOTHESIS, json.scores.hypothesis),
    };

    let good_section =
        parser::extract_delimited_section(text, parser::GOOD_QUESTIONS_TAG, SECTION_BOUNDARIES);
    let good_questions = match good_section {
        Some(section) => parser::extract_bullets(section),
        None => json.good_questions,
    };

    let habits_section =
        parser::extract_delimited_section(text, parser::HABITS_TAG, HABITS_BOUNDARIES);
    let reflections = match habits_section {
        Some(section) => section.to_string(),
        None => json.thinking_habits.join("\n"),
    };

    DetailedEvaluation {
        text: Some(text.to_string()),
        skills,
        good_questions,
        reflections,
        clip: json.clips.into_iter().next(),
        used_defaults,
    }
}

/// Combined result of both evaluation steps, archived with the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub session_id: String,
    pub scenario_title: String,
    pub total_score: u32,
    pub reachability: u32,
    pub skills: SkillScores,
    pub good_questions: Vec<String>,
    pub reflections: String,
    pub strengths: Option<String>,
    pub improvements: Option<String>,
    pub general_text: String,
    pub detailed_text: Option<String>,
    pub help_count: u32,
    pub clip: Option<QuestionClip>,
}

impl EvaluationReport {
    /// A reviewer clip wins; otherwise the first good question becomes the session highlight.
    pub fn knowledge_note(&self) -> Option<NoteDraft> {
        if let Some(clip) = &self.clip {
            let habit = if self.reflections.trim().is_empty() {
                clip.reason.clone()
            } else {
                self.reflections.clone()
            };
            return Some(NoteDraft {
                original_question: clip.original.clone(),
                good_question: clip.better.clone(),
                thinking_habit: habit,
            });
        }
        let good = self.good_questions.first()?;
        Some(NoteDraft {
            original_question: HIGHLIGHT_LABEL.into(),
            good_question: good.clone(),
            thinking_habit: self.reflections.clone(),
        })
    }

    pub fn to_outcome(&self) -> SessionOutcome {
        SessionOutcome {
            session_id: self.session_id.clone(),
            scenario_title: self.scenario_title.clone(),
            total_score: self.total_score,
            reachability: self.reachability,
            skills: self.skills,
            good_questions: self.good_questions.clone(),
            reflections: self.reflections.clone(),
            knowledge_note: self.knowledge_note(),
        }
    }
}
