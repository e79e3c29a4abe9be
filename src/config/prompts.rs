//! Prompt templates for Quarry.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    pub chat: ChatPrompts,
    pub title: TitlePrompts,
    /// Fixed replies used when retrieval finds nothing.
    pub canned: CannedReplies,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for knowledge-base chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatPrompts {
    /// Library default system prompt, used when neither the conversation nor
    /// the user supplies an override.
    pub system: String,
    /// Appended to the system prompt when retrieval ran. `{{context}}` is
    /// replaced by the formatted context block.
    pub context: String,
}

impl Default for ChatPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a knowledgeable assistant that answers questions using the user's knowledge base of videos, articles, documents and audio recordings.

Guidelines:
- Answer only from the context provided to you
- If the context does not contain enough information, say that you don't know
- Cite sources naturally, e.g. "In the video by ..." or "According to the document ..."
- Be concise and direct
- Never fabricate facts, quotes or sources"#
                .to_string(),

            context: r#"

Relevant context from the knowledge base:

{{context}}"#
                .to_string(),
        }
    }
}

/// Prompts for deriving a title from imported text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TitlePrompts {
    pub system: String,
    pub user: String,
}

impl Default for TitlePrompts {
    fn default() -> Self {
        Self {
            system: "You write short, descriptive titles. Reply with the title only, no quotes, at most 10 words."
                .to_string(),
            user: r#"Write a title for the following content:

{{preview}}"#
                .to_string(),
        }
    }
}

/// Replies returned without calling the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CannedReplies {
    /// The knowledge base holds no chunks at all.
    pub empty_library: String,
    /// Nothing cleared the similarity threshold.
    pub no_match: String,
}

impl Default for CannedReplies {
    fn default() -> Self {
        Self {
            empty_library: "There are no videos in the knowledge base yet. Import some content first, then ask again."
                .to_string(),
            no_match: "I couldn't find any relevant information in the knowledge base to answer that question."
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let chat_path = custom_path.join("chat.toml");
            if chat_path.exists() {
                let content = std::fs::read_to_string(&chat_path)?;
                prompts.chat = toml::from_str(&content)?;
            }

            let title_path = custom_path.join("title.toml");
            if title_path.exists() {
                let content = std::fs::read_to_string(&title_path)?;
                prompts.title = toml::from_str(&content)?;
            }

            let canned_path = custom_path.join("canned.toml");
            if canned_path.exists() {
                let content = std::fs::read_to_string(&canned_path)?;
                prompts.canned = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
