//! Gardenbook chat - conversational gardening assistant
//!
//! Each chat request gets its own agent: a fresh tool-provider process,
//! an operating prompt built from the user's encyclopedia and local time,
//! and a tool-using reasoning loop that produces the reply.

pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod fallback;
pub mod server;
pub mod tools;

pub use error::{Error, Result};
