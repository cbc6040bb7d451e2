// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::game::stats::{LevelCurve, XpFormula};
use crate::infra::errors::GoodQuestionError;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub scenario: ScenarioDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "google".into(),
            model: "gemini-2.0-flash".into(),
            api_key_env: "GOOGLE_AI_API_KEY".into(),
            temperature: None,
            max_output_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 2_000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hard cap on questions per session.
    pub max_questions: u32,
    /// Questions required before evaluation may be requested. 1 allows early termination.
    pub min_questions_for_evaluation: u32,
    /// Skill score used when the detailed evaluation carries no marker.
    pub default_skill_score: u32,
    /// Total score used when the general evaluation carries no marker.
    pub default_total_score: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_questions: 10,
            min_questions_for_evaluation: 10,
            default_skill_score: 70,
            default_total_score: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub xp_formula: XpFormula,
    pub level_curve: LevelCurve,
    /// Skill averages below this are reported as weak points.
    pub weak_point_threshold: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            xp_formula: XpFormula::Direct,
            level_curve: LevelCurve::Linear,
            weak_point_threshold: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioDefaults {
    pub difficulty: String,
    pub industry: String,
    pub theme: String,
}

impl Default for ScenarioDefaults {
    fn default() -> Self {
        Self {
            difficulty: "Medium".into(),
            industry: "製造業".into(),
            theme: "在庫管理システム".into(),
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self, GoodQuestionError> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, GoodQuestionError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, GoodQuestionError> {
        let config: Config =
            toml::from_str(content).map_err(|e| GoodQuestionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GoodQuestionError> {
        let s = &self.session;
        if s.max_questions == 0 {
            return Err(GoodQuestionError::Config(
                "session.max_questions must be at least 1".into(),
            ));
        }
        if s.min_questions_for_evaluation == 0 || s.min_questions_for_evaluation > s.max_questions
        {
            return Err(GoodQuestionError::Config(format!(
                "session.min_questions_for_evaluation must be in 1..={}",
                s.max_questions
            )));
        }
        if s.default_skill_score > 100 || s.default_total_score > 100 {
            return Err(GoodQuestionError::Config(
                "default scores must be in 0..=100".into(),
            ));
        }
        if self.model.provider != "google" {
            return Err(GoodQuestionError::Config(format!(
                "unsupported provider '{}'",
                self.model.provider
            )));
        }
        Ok(())
    }

    /// Resolve the API key: configured env var first, then the legacy variable name.
    pub fn api_key(&self) -> Result<String, GoodQuestionError> {
        [self.model.api_key_env.as_str(), "GOOGLE_GENERATIVE_AI_API_KEY"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|v| !v.trim().is_empty())
            .ok_or(GoodQuestionError::NoApiKey)
    }
}
