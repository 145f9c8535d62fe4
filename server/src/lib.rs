//! Google Drive access for tool-calling assistants.
//!
//! The broker holds one Google credential per client id, walks each client
//! through OAuth consent, and only runs Drive tools for clients that have
//! completed it. `drive-chat` is the matching terminal client.

pub mod bridge;
pub mod client;
pub mod components;
pub mod cron;
pub mod docs;
pub mod errors;
pub mod mcp;
pub mod oauth;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod tools;
