//! Data model and pure pipeline pieces for the Cucaypy workspace: project
//! files, prompts, response sanitizing, chat, models, session state types and
//! the event log.

pub mod chat;
pub mod events;
pub mod models;
pub mod project;
pub mod prompts;
pub mod sanitize;
pub mod session;
