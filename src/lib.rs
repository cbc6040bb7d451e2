// src/lib.rs — Library root for goodquestion

pub mod cli;
pub mod game;
pub mod infra;
pub mod memory;
pub mod provider;
