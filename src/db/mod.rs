// SPDX-License-Identifier: MIT

//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    /// User documents (log + aggregates), keyed by github_id
    pub const USERS: &str = "users";
}
