//! Interactive chat command.
//!
//! Each line is sent through the same pipeline as `quarry ask`, so the
//! session is persisted as a conversation and can be resumed later with
//! `--conversation`.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::models::TurnRole;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};
use uuid::Uuid;

/// Run the interactive chat command.
pub async fn run_chat(conversation: Option<Uuid>, user_id: &str, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let chat = orchestrator.chat();

    let mut conversation_id = conversation;
    if let Some(id) = conversation_id {
        let existing = chat.get_conversation(user_id, id).await?;
        Output::info(&format!("Resuming \"{}\"", existing.title));
        for turn in existing.turns.iter().rev().take(4).rev() {
            let speaker = match turn.role {
                TurnRole::User => style("You:").green().bold(),
                TurnRole::Assistant => style("Quarry:").cyan().bold(),
            };
            println!("{} {}", speaker, style(&turn.content).dim());
        }
    }

    println!("\n{}", style("Quarry Chat").bold().cyan());
    println!(
        "{}\n",
        style("Ask about your library, 'new' to start a fresh conversation, 'exit' to quit.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("new") {
            conversation_id = None;
            Output::info("Starting a new conversation.");
            continue;
        }

        let spinner = Output::spinner("Thinking...");
        let result = chat.send(user_id, conversation_id, input).await;
        spinner.finish_and_clear();

        match result {
            Ok(reply) => {
                conversation_id = Some(reply.conversation_id);
                println!("\n{} {}\n", style("Quarry:").cyan().bold(), reply.answer);
                for (i, citation) in reply.citations.iter().enumerate() {
                    Output::citation(i + 1, citation);
                }
                if !reply.citations.is_empty() {
                    println!();
                }
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
            }
        }
    }

    if let Some(id) = conversation_id {
        Output::kv("Conversation", &id.to_string());
    }

    Ok(())
}
