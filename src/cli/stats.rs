// src/cli/stats.rs — Stats, history, knowledge notes and reset commands

use crate::game::stats::{weak_points, UserStats};
use crate::infra::config::Config;
use crate::memory::{self, StoreRef};

pub fn show_stats(store: &StoreRef, config: &Config) -> anyhow::Result<()> {
    let stats = memory::lock(store)?.load_stats()?;
    print!("{}", format_stats(&stats, config.scoring.weak_point_threshold));
    Ok(())
}

fn format_stats(stats: &UserStats, threshold: u32) -> String {
    let mut out = String::new();
    out.push_str(&format!("goodquestion v{}\n\n", env!("CARGO_PKG_VERSION")));
    out.push_str(&format!("  Level:      {}\n", stats.level));
    out.push_str(&format!("  XP:         {}\n", stats.total_xp));
    out.push_str(&format!("  Sessions:   {}\n", stats.total_sessions));
    out.push_str(&format!("  Best score: {}\n", stats.best_score));
    out.push_str(&format!("  Streak:     {} day(s)\n", stats.current_streak));
    match stats.last_played_date {
        Some(d) => out.push_str(&format!("  Last played: {}\n", d)),
        None => out.push_str("  Last played: never\n"),
    }
    out.push('\n');
    for (label, value) in stats.skills.labeled() {
        out.push_str(&format!("  {:<12}  {:>3}  {}\n", label, value, bar(value)));
    }
    let weak = weak_points(stats, threshold);
    if !weak.is_empty() {
        out.push_str(&format!("\n  Weak points: {}\n", weak.join("、")));
    }
    out
}

fn bar(value: u32) -> String {
    let filled = (value.min(100) / 10) as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(10 - filled))
}

pub fn show_history(store: &StoreRef, limit: usize) -> anyhow::Result<()> {
    let db = memory::lock(store)?;
    let sessions = db.list_sessions(limit)?;
    if sessions.is_empty() {
        println!("No sessions yet. Start one with `goodquestion play`.");
        return Ok(());
    }
    for s in sessions {
        let score = s
            .total_score
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  {}  {:<10} {:>4}  {} / {} [{}]  hints:{}",
            &s.updated_at[..s.updated_at.len().min(10)],
            s.status.as_str(),
            score,
            s.industry,
            s.theme,
            s.difficulty,
            s.help_count
        );
    }
    Ok(())
}

pub fn show_notes(store: &StoreRef) -> anyhow::Result<()> {
    let stats = memory::lock(store)?.load_stats()?;
    if stats.knowledge_notes.is_empty() {
        println!("No knowledge notes yet.");
        return Ok(());
    }
    for note in &stats.knowledge_notes {
        println!("[{}]", note.date);
        if !note.original_question.is_empty() {
            println!("  Before: {}", note.original_question);
        }
        println!("  Better: {}", note.good_question);
        println!("  Habit:  {}\n", note.thinking_habit.replace('\n', "\n          "));
    }
    Ok(())
}

pub fn run_reset(store: &StoreRef, yes: bool) -> anyhow::Result<()> {
    if !yes {
        let confirmed = inquire::Confirm::new("Delete all stats and session history?")
            .with_default(false)
            .prompt()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }
    memory::lock(store)?.reset()?;
    tracing::info!("Stats and session archive reset");
    println!("All stats and sessions deleted.");
    Ok(())
}
