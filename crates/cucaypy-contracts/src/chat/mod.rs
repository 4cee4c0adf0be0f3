mod command_registry;
mod intent_parser;
mod message;

pub use command_registry::{quick_action, QuickAction, CHAT_HELP_COMMANDS, QUICK_ACTIONS};
pub use intent_parser::{parse_intent, Intent};
pub use message::{ChatMessage, ChatTranscript, Role};
