//! Preference commands.

use crate::cli::{Output, PrefsAction};
use crate::config::Settings;
use crate::models::{PreferencesPatch, UserPreferences};
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run a prefs sub-command for one user.
pub async fn run_prefs(action: &PrefsAction, user_id: &str, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let chat = orchestrator.chat();

    match action {
        PrefsAction::Show => {
            let preferences = chat.get_preferences(user_id).await?;
            print_preferences(&preferences);
        }

        PrefsAction::Set {
            model,
            temperature,
            max_tokens,
            system_prompt,
        } => {
            let patch = PreferencesPatch {
                model: model.clone(),
                temperature: *temperature,
                max_tokens: *max_tokens,
                default_system_prompt: system_prompt.clone(),
            };
            let preferences = chat.update_preferences(user_id, patch).await?;
            Output::success("Preferences saved.");
            print_preferences(&preferences);
        }
    }

    Ok(())
}

fn print_preferences(preferences: &UserPreferences) {
    Output::header(&format!("Preferences for {}", preferences.user_id));
    Output::kv("Model", &preferences.model);
    Output::kv("Temperature", &preferences.temperature.to_string());
    Output::kv("Max tokens", &preferences.max_tokens.to_string());
    Output::kv(
        "System prompt",
        preferences
            .default_system_prompt
            .as_deref()
            .unwrap_or("(library default)"),
    );
}
