// SPDX-License-Identifier: MIT

//! Commit-Tracker: a GitHub commit dashboard backend.
//!
//! This crate receives GitHub push webhooks, keeps a deduplicated
//! per-user commit log with derived counters, and serves the query
//! endpoints the polling dashboard consumes.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::GithubClient;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub github: GithubClient,
}
