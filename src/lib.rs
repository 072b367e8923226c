//! # Syncflow
//!
//! Metadata discovery and job processing for Syncflow: provider strategies, the job claim
//! protocol, webhook-to-job mapping and the HTTP API around them.

pub mod auth;
pub mod config;
pub mod connection_resolver;
pub mod crypto;
pub mod db;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod listeners;
pub mod mapping;
pub mod models;
pub mod providers;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod telemetry;
pub mod token_refresh;
pub mod webhooks;
pub use migration;
