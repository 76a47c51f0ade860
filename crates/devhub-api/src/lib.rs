//! HTTP surface for DevHub: portfolio links, code snippets with uploaded
//! files, and learning notes.

pub mod config;
mod handlers;
pub mod server;
pub mod telemetry;
