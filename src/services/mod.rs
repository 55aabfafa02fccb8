// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod github;
pub mod ingest;
pub mod intensity;
pub mod query;

pub use github::GithubClient;
