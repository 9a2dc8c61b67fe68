//! Persisted record types
//!
//! One module per collection family. Every record carries [`Timestamps`],
//! which only the store writes.

mod account;
mod document;

pub use account::{Confirmation, Session, User};
pub use document::{is_valid_id, Document, DocumentPatch, Flags};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creation and last-modification times, owned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Timestamps {
    /// Both stamps set to `now`
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            created: now,
            modified: now,
        }
    }
}
