//! Retrieval-augmented answering over the knowledge base.
//!
//! A chat message is classified, optionally matched against stored chunks,
//! and answered by the generation service with the retrieved context and the
//! conversation so far. When retrieval finds nothing the model is not called
//! and a canned reply is returned instead.

mod chat;
mod classifier;
mod context;
mod retriever;

pub use chat::{ChatReply, ChatService};
pub use classifier::{HeuristicClassifier, QueryClassifier};
pub use context::{build_citations, format_context_block, CONTEXT_SEPARATOR};
pub use retriever::{NoMatchReason, RetrievalOutcome, Retriever};
