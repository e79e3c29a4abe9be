//! CLI command implementations.

mod ask;
mod chat;
mod config;
mod conversations;
mod import;
mod index;
mod prefs;
mod serve;
mod sources;

pub use ask::run_ask;
pub use chat::run_chat;
pub use config::run_config;
pub use conversations::run_conversations;
pub use import::run_import;
pub use index::run_index;
pub use prefs::run_prefs;
pub use serve::run_serve;
pub use sources::run_sources;
