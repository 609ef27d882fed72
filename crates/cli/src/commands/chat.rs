//! `switchboard chat`: interactive or single-message mode.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use switchboard_agent::{LoopOptions, ReasoningLoop, TracingObserver};
use switchboard_config::AppConfig;
use switchboard_core::error::PlannerError;
use switchboard_core::{LoopEvent, LoopObserver};
use switchboard_memory::ConversationSession;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Prints invocation starts and ends as the loop runs.
struct ProgressPrinter;

impl LoopObserver for ProgressPrinter {
    fn on_event(&self, event: &LoopEvent) {
        match event {
            LoopEvent::Invoking { requests, .. } => {
                for request in requests {
                    let args = serde_json::Value::Object(request.arguments.clone());
                    eprintln!("  -> {}({args})", request.capability);
                }
            }
            LoopEvent::InvocationFinished { outcome, .. } => {
                eprintln!("  <- {} ({}ms)", outcome.summary(), outcome.elapsed_ms);
            }
            _ => {}
        }
    }
}

pub async fn run(explicit: Option<&Path>, message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(explicit)?;

    let planner = match switchboard_planner::from_config(&config.planner) {
        Ok(planner) => planner,
        Err(PlannerError::NotConfigured(reason)) => {
            eprintln!();
            eprintln!("  ERROR: {reason}");
            eprintln!();
            eprintln!("  Set one of these environment variables:");
            eprintln!("    SWITCHBOARD_API_KEY = 'sk-...'   (recommended)");
            eprintln!("    OPENAI_API_KEY      = 'sk-...'");
            eprintln!();
            eprintln!("  Or add api_key under [planner] in:");
            eprintln!("    {}", super::config_path(explicit).display());
            eprintln!();
            return Err("No API key found. See above for setup instructions.".into());
        }
        Err(e) => return Err(e.into()),
    };

    let router = super::connect_router(&config).await;
    let agent = ReasoningLoop::new(router.clone(), planner)
        .with_options(LoopOptions::from_config(&config))
        .with_observer(Arc::new(TracingObserver))
        .with_observer(Arc::new(ProgressPrinter));
    let mut session = ConversationSession::new();

    let result = match message {
        Some(msg) => single(&agent, &mut session, msg).await,
        None => interactive(&agent, &mut session, &config).await,
    };

    session.close();
    router.shutdown().await;
    result
}

async fn single(
    agent: &ReasoningLoop,
    session: &mut ConversationSession,
    message: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let answer = agent.run_turn(session, message).await?;
    println!("{}", answer.content);
    Ok(())
}

async fn interactive(
    agent: &ReasoningLoop,
    session: &mut ConversationSession,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let capabilities = agent.router().descriptors().await;

    println!();
    println!("  Switchboard: Interactive Mode");
    println!();
    println!("  Planner:       {} ({})", config.planner.provider, config.planner.model);
    println!("  Servers:       {}", config.servers.len());
    println!("  Capabilities:  {}", capabilities.len());
    println!("  Max cycles:    {}", agent.options().max_cycles);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        match agent.run_turn(session, input).await {
            Ok(answer) => {
                println!();
                for line in answer.content.lines() {
                    println!("  Assistant > {line}");
                }
                println!();
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
