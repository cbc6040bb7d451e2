// src/game/mod.rs — Root-cause interview game core

pub mod evaluation;
pub mod gateway;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod session;
pub mod stats;

pub use orchestrator::{EvaluationOutcome, GameEvent, Orchestrator, TurnOutcome};
pub use session::{Phase, Scenario, SessionState};
pub use stats::{StatsStore, UserStats};
