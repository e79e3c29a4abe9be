//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::rag::ChatReply;
use anyhow::Result;
use uuid::Uuid;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    conversation: Option<Uuid>,
    user_id: &str,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let spinner = Output::spinner("Searching knowledge base...");

    match orchestrator.chat().send(user_id, conversation, question).await {
        Ok(reply) => {
            spinner.finish_and_clear();
            print_reply(&reply);
            Output::kv("Conversation", &reply.conversation_id.to_string());
        }
        Err(e) => {
            spinner.finish_and_clear();
            Output::error(&e.to_string());
            return Err(e.into());
        }
    }

    Ok(())
}

/// Print an answer followed by its citations.
fn print_reply(reply: &ChatReply) {
    println!("\n{}\n", reply.answer);

    if !reply.citations.is_empty() {
        Output::header("Sources");
        for (i, citation) in reply.citations.iter().enumerate() {
            Output::citation(i + 1, citation);
        }
        println!();
    }
}
