//! Account entities: users, login sessions, pending registrations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Timestamps;
use crate::errors::Result;
use crate::store::{Patch, Record};

/// A confirmed account. The id is the lowercased email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Argon2id PHC string
    pub password_hash: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(flatten)]
    pub stamps: Timestamps,
}

impl User {
    pub fn new(email: &str, password_hash: String, admin: bool) -> Self {
        Self {
            id: email.trim().to_lowercase(),
            email: email.trim().to_string(),
            password_hash,
            admin,
            stamps: Timestamps::at(Utc::now()),
        }
    }
}

/// A login session keyed by the cookie token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stamps: Timestamps,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A registration awaiting its emailed confirmation link.
/// The id is the SHA-256 of the reference sent by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub expires_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stamps: Timestamps,
}

impl Confirmation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// Account records are always written whole; an upsert replaces every field
// except the store-owned stamps.
macro_rules! whole_record {
    ($ty:ty, $kind:literal) => {
        impl Patch for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        }

        impl Record for $ty {
            type Patch = $ty;

            const KIND: &'static str = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn stamps(&self) -> &Timestamps {
                &self.stamps
            }

            fn stamps_mut(&mut self) -> &mut Timestamps {
                &mut self.stamps
            }

            fn from_patch(mut patch: $ty, stamps: Timestamps) -> Result<Self> {
                patch.stamps = stamps;
                Ok(patch)
            }

            fn apply(&mut self, mut patch: $ty) -> Result<()> {
                patch.stamps = self.stamps;
                *self = patch;
                Ok(())
            }
        }
    };
}

whole_record!(User, "user");
whole_record!(Session, "session");
whole_record!(Confirmation, "confirmation");
