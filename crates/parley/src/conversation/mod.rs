//! Conversations: messages, history, prompts, export, and the orchestrator.

pub mod export;
pub mod history;
pub mod message;
pub mod orchestrator;
pub mod prompts;

pub use export::{ConversationExport, ExportFormat, export_conversation};
pub use history::{ConversationHistory, ConversationSummary};
pub use message::{Message, MessageMetadata, Mode, Sender};
pub use orchestrator::Orchestrator;
