// src/game/prompts.rs — System instructions per collaborator mode

use std::path::{Path, PathBuf};

use crate::infra::errors::GoodQuestionError;
use crate::infra::paths;

const FACILITATOR: &str = include_str!("../../templates/facilitator.md");
const MENTOR: &str = include_str!("../../templates/mentor.md");
const HELPER: &str = include_str!("../../templates/helper.md");
const REVIEWER: &str = include_str!("../../templates/reviewer.md");

pub const WEAK_POINTS_PLACEHOLDER: &str = "${WEAK_POINTS}";
const NO_WEAK_POINTS: &str = "明確な弱点はまだ特定されていません。";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Client role-play and general evaluation
    Facilitator,
    /// Briefed scenario generation
    Mentor,
    /// Boss hints when the player is stuck
    Helper,
    /// Detailed skill evaluation
    Reviewer,
}

impl PromptMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Facilitator => "facilitator",
            Self::Mentor => "mentor",
            Self::Helper => "helper",
            Self::Reviewer => "reviewer",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            Self::Facilitator => FACILITATOR,
            Self::Mentor => MENTOR,
            Self::Helper => HELPER,
            Self::Reviewer => REVIEWER,
        }
    }
}

impl std::fmt::Display for PromptMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves templates: `<override_dir>/<mode>.md` when present, else the built-in copy.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new(paths::prompts_dir())
    }
}

impl PromptLibrary {
    pub fn new(override_dir: impl Into<PathBuf>) -> Self {
        Self {
            override_dir: Some(override_dir.into()),
        }
    }

    pub fn builtin_only() -> Self {
        Self { override_dir: None }
    }

    pub fn load(&self, mode: PromptMode) -> Result<String, GoodQuestionError> {
        if let Some(path) = self.override_path(mode) {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                return Err(GoodQuestionError::TemplateNotFound {
                    name: path.display().to_string(),
                });
            }
            tracing::debug!(mode = %mode, path = %path.display(), "Using prompt override");
            return Ok(content);
        }
        Ok(mode.builtin().to_string())
    }

    /// Mentor template with the player's weak points filled in.
    pub fn mentor(&self, weak_points: &[String]) -> Result<String, GoodQuestionError> {
        Ok(interpolate_weak_points(&self.load(PromptMode::Mentor)?, weak_points))
    }

    fn override_path(&self, mode: PromptMode) -> Option<PathBuf> {
        let dir: &Path = self.override_dir.as_deref()?;
        let path = dir.join(format!("{}.md", mode.name()));
        path.exists().then_some(path)
    }
}

pub fn interpolate_weak_points(template: &str, weak_points: &[String]) -> String {
    let value = if weak_points.is_empty() {
        NO_WEAK_POINTS.to_string()
    } else {
        weak_points.join(", ")
    };
    template.replace(WEAK_POINTS_PLACEHOLDER, &value)
}
