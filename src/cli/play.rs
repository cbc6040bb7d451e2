// src/cli/play.rs — Interactive play loop

use anyhow::Context;

use super::PlayArgs;
use crate::game::evaluation::{EvaluationReport, RootCauseSubmission};
use crate::game::prompts::PromptLibrary;
use crate::game::stats::UserStats;
use crate::game::{EvaluationOutcome, GameEvent, Orchestrator, Phase, Scenario, TurnOutcome};
use crate::infra::config::{Config, ScenarioDefaults};
use crate::infra::errors::GoodQuestionError;
use crate::memory::StoreRef;
use crate::provider::{self, Role};

const DIFFICULTIES: &[&str] = &["Easy", "Medium", "Hard"];
const INDUSTRIES: &[&str] = &[
    "製造業",
    "小売業",
    "IT・ソフトウェア",
    "金融",
    "物流・運輸",
    "医療・介護",
];

pub async fn run_play(args: PlayArgs, config: Config, store: StoreRef) -> anyhow::Result<()> {
    let provider = provider::build_provider(&config)?;
    let scenario_defaults = config.scenario.clone();
    let mut orch = Orchestrator::new(provider, store, PromptLibrary::default(), config)
        .with_events(print_event);

    if args.resume {
        match orch.resume()? {
            Some(session) => {
                println!("Resuming: {} ({})\n", session.title(), session.phase);
                for m in &session.messages {
                    print_message(m.role, &m.content);
                }
            }
            None => {
                println!("No unfinished session to resume.");
                return Ok(());
            }
        }
    } else {
        let scenario = resolve_scenario(&args, &scenario_defaults)?;
        println!("{} [{}]\n", scenario.title(), scenario.difficulty);
        let outcome = if args.briefed {
            orch.start_briefed(scenario).await?
        } else {
            orch.start(scenario).await?
        };
        let started = matches!(outcome, TurnOutcome::Reply { .. });
        render_turn(&outcome);
        if !started {
            println!("Could not start the session. Please try again.");
            return Ok(());
        }
    }

    print_help();
    game_loop(&mut orch).await
}

async fn game_loop(orch: &mut Orchestrator) -> anyhow::Result<()> {
    loop {
        let phase = match orch.session() {
            Some(s) => s.phase,
            None => return Ok(()),
        };

        match phase {
            Phase::Welcome | Phase::Result => return Ok(()),
            Phase::Evaluation => {
                let Some(submission) = prompt_root_cause()? else {
                    println!("Session saved. Resume with `goodquestion play --resume`.");
                    return Ok(());
                };
                match orch.submit_root_cause(&submission).await {
                    Ok(EvaluationOutcome::Completed { report, stats }) => {
                        render_report(&report, &stats);
                    }
                    Ok(EvaluationOutcome::RateLimited { notice })
                    | Ok(EvaluationOutcome::Failed { notice }) => {
                        println!("[!] {}", notice);
                    }
                    Err(GoodQuestionError::EmptyInput) => println!("真因を入力してください。"),
                    Err(e) => return Err(e.into()),
                }
            }
            Phase::Questioning => {
                let Some(line) = read_input() else {
                    println!("\nSession saved. Resume with `goodquestion play --resume`.");
                    return Ok(());
                };
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input.starts_with('/') {
                    if !handle_slash_command(input, orch).await? {
                        return Ok(());
                    }
                    continue;
                }
                match orch.send_question(input).await {
                    Ok(outcome) => {
                        render_turn(&outcome);
                        if let Some(s) = orch.session() {
                            if s.remaining_questions() == 0 {
                                println!("質問回数の上限に達しました。/eval で真因の特定に進んでください。");
                            } else if s.can_request_evaluation() {
                                println!("(/eval で真因の特定に進めます)");
                            }
                        }
                    }
                    Err(GoodQuestionError::QuestionLimitReached { limit }) => {
                        println!("質問は{}回までです。/eval で真因の特定に進んでください。", limit);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
}

/// Returns false when the player asked to quit.
async fn handle_slash_command(input: &str, orch: &mut Orchestrator) -> anyhow::Result<bool> {
    let cmd = input.split_whitespace().next().unwrap_or("");
    match cmd {
        "/quit" | "/exit" => {
            println!("Session saved. Resume with `goodquestion play --resume`.");
            return Ok(false);
        }
        "/eval" => match orch.request_evaluation() {
            Ok(()) => println!("\n=== 真因の特定 ===\n"),
            Err(GoodQuestionError::NotEnoughQuestions { required, asked }) => {
                println!("真因の特定には{}回以上の質問が必要です（現在{}回）。", required, asked);
            }
            Err(e) => return Err(e.into()),
        },
        "/hint" => match orch.request_hint().await {
            Ok(TurnOutcome::Reply { content, .. }) => println!("\n[上司] {}\n", content),
            Ok(other) => render_turn(&other),
            Err(GoodQuestionError::NotEnoughQuestions { .. }) => {
                println!("まずは一度、クライアントに質問してみましょう。");
            }
            Err(e) => return Err(e.into()),
        },
        "/status" => {
            if let Some(s) = orch.session() {
                println!(
                    "  Scenario:     {}\n  Questions:    {}/{}\n  Reachability: {}%\n  Hints used:   {}",
                    s.title(),
                    s.question_count,
                    s.limits.max_questions,
                    s.reachability,
                    s.help_count
                );
            }
        }
        "/help" => print_help(),
        other => println!("Unknown command: {} (try /help)", other),
    }
    Ok(true)
}

fn resolve_scenario(args: &PlayArgs, defaults: &ScenarioDefaults) -> anyhow::Result<Scenario> {
    if args.pick {
        let difficulty = inquire::Select::new("難易度", DIFFICULTIES.to_vec())
            .prompt()
            .context("difficulty selection cancelled")?;
        let industry = inquire::Select::new("業界", INDUSTRIES.to_vec())
            .prompt()
            .context("industry selection cancelled")?;
        let theme = inquire::Text::new("テーマ")
            .with_default(&defaults.theme)
            .prompt()
            .context("theme input cancelled")?;
        return Ok(Scenario {
            industry: industry.to_string(),
            theme,
            difficulty: difficulty.to_string(),
        });
    }

    Ok(Scenario {
        industry: args.industry.clone().unwrap_or_else(|| defaults.industry.clone()),
        theme: args.theme.clone().unwrap_or_else(|| defaults.theme.clone()),
        difficulty: args
            .difficulty
            .clone()
            .unwrap_or_else(|| defaults.difficulty.clone()),
    })
}

/// None when the player cancels the form.
fn prompt_root_cause() -> anyhow::Result<Option<RootCauseSubmission>> {
    let ask = |label: &str| match inquire::Text::new(label).prompt() {
        Ok(v) => Ok(Some(v)),
        Err(inquire::InquireError::OperationCanceled)
        | Err(inquire::InquireError::OperationInterrupted) => Ok(None),
        Err(e) => Err(anyhow::Error::from(e)),
    };
    let Some(root_cause) = ask("真因は何だと考えますか？")? else {
        return Ok(None);
    };
    let Some(reason) = ask("そう考えた根拠は？")? else {
        return Ok(None);
    };
    let Some(approach) = ask("解決アプローチは？")? else {
        return Ok(None);
    };
    Ok(Some(RootCauseSubmission {
        root_cause,
        reason,
        approach,
    }))
}

fn read_input() -> Option<String> {
    use std::io::{self, BufRead, Write};

    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    let mut line = String::new();
    match stdin.lock().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(_) => None,
    }
}

fn print_help() {
    println!("Ask the client questions. Commands: /eval /hint /status /help /quit\n");
}

fn print_message(role: Role, content: &str) {
    match role {
        Role::User => println!("> {}\n", content),
        Role::Model => println!("{}\n", content),
        Role::System => println!("[!] {}\n", content),
    }
}

fn print_event(event: GameEvent) {
    if let GameEvent::StatsCommitted { level, total_xp } = event {
        println!("  Level {} / {} XP", level, total_xp);
    }
}

fn render_turn(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Reply { content, .. } => println!("\n{}\n", content),
        TurnOutcome::RateLimited { notice } | TurnOutcome::Failed { notice } => {
            println!("[!] {}", notice)
        }
    }
}

fn render_report(report: &EvaluationReport, stats: &UserStats) {
    println!("\n{}\n", report.general_text);
    println!("=== RESULT: {} ===", if report.total_score >= 80 { "EXCELLENT" } else { "FINISHED" });
    println!("  Score:        {}", report.total_score);
    println!("  Reachability: {}%", report.reachability);
    for (label, value) in report.skills.labeled() {
        println!("  {:<12}  {}", label, value);
    }
    if !report.good_questions.is_empty() {
        println!("\n  Good questions:");
        for q in &report.good_questions {
            println!("    - {}", q);
        }
    }
    if !report.reflections.is_empty() {
        println!("\n  Thinking habits:\n    {}", report.reflections.replace('\n', "\n    "));
    }
    println!(
        "\n  Level {}  |  {} XP  |  streak {} day(s)  |  best {}",
        stats.level, stats.total_xp, stats.current_streak, stats.best_score
    );
}
