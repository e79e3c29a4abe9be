//! Conversation management commands.

use crate::cli::{ConversationsAction, Output};
use crate::config::Settings;
use crate::models::TurnRole;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use console::style;

/// Run a conversations sub-command for one user.
pub async fn run_conversations(
    action: &ConversationsAction,
    user_id: &str,
    settings: Settings,
) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let chat = orchestrator.chat();

    match action {
        ConversationsAction::List => {
            let conversations = chat.list_conversations(user_id).await?;
            if conversations.is_empty() {
                Output::info("No conversations yet. Use 'quarry ask' or 'quarry chat' to start one.");
                return Ok(());
            }

            Output::header(&format!("Conversations ({})", conversations.len()));
            println!();
            for summary in &conversations {
                println!(
                    "  {} {} ({} turns, {})\n    {}",
                    style("*").cyan(),
                    style(&summary.title).bold(),
                    summary.turn_count,
                    summary.last_activity_at.format("%Y-%m-%d %H:%M"),
                    style(summary.id).dim()
                );
            }
        }

        ConversationsAction::New { title, system_prompt } => {
            let conversation = chat
                .create_conversation(user_id, title.as_deref(), system_prompt.as_deref())
                .await?;
            Output::success(&format!("Created \"{}\"", conversation.title));
            Output::kv("Conversation", &conversation.id.to_string());
        }

        ConversationsAction::Show { id } => {
            let conversation = chat.get_conversation(user_id, *id).await?;
            Output::header(&conversation.title);
            if let Some(prompt) = &conversation.system_prompt {
                Output::kv("System prompt", prompt);
            }
            Output::kv("Turns", &conversation.turns.len().to_string());
            println!();

            for turn in &conversation.turns {
                let speaker = match turn.role {
                    TurnRole::User => style("You:").green().bold(),
                    TurnRole::Assistant => style("Quarry:").cyan().bold(),
                };
                println!("{} {}", speaker, turn.content);
                for (i, citation) in turn.citations.iter().enumerate() {
                    Output::citation(i + 1, citation);
                }
                println!();
            }
        }

        ConversationsAction::Rename { id, title } => {
            chat.rename_conversation(user_id, *id, title).await?;
            Output::success("Conversation renamed.");
        }

        ConversationsAction::Prompt { id, prompt } => {
            chat.set_conversation_prompt(user_id, *id, prompt.as_deref()).await?;
            match prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
                Some(_) => Output::success("Conversation prompt set."),
                None => Output::success("Conversation prompt cleared."),
            }
        }

        ConversationsAction::Delete { id } => {
            chat.delete_conversation(user_id, *id).await?;
            Output::success(&format!("Deleted conversation {}", id));
        }
    }

    Ok(())
}
