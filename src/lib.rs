pub mod accounts;
pub mod auth;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod health;
pub mod mcp;
pub mod media_ingestion;
pub mod password;
pub mod processing;
pub mod questions;
pub mod quiz;
pub mod rag;
pub mod reminders;
pub mod request_counter;
pub mod response;
pub mod server;
pub mod telemetry;
