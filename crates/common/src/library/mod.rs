//! The set of collections the service owns
//!
//! Each collection sits behind its own `RwLock`. A mutation holds the write
//! lock from modification through persistence, so concurrent writes to
//! distinct ids never overwrite each other. Writes to the same id are
//! last-write-wins.

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::StorageConfig;
use crate::errors::Result;
use crate::models::{Confirmation, Session, User};
use crate::store::{Collection, DocumentStore, ReconcileReport};

pub struct Library {
    pub documents: RwLock<DocumentStore>,
    pub users: RwLock<Collection<User>>,
    pub sessions: RwLock<Collection<Session>>,
    pub confirmations: RwLock<Collection<Confirmation>>,
}

/// Record counts per collection
#[derive(Debug, Clone, serde::Serialize)]
pub struct LibraryStats {
    pub documents: usize,
    pub users: usize,
    pub sessions: usize,
    pub confirmations: usize,
}

impl Library {
    /// Open every collection under the configured directories
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let data_dir = &config.data_dir;

        let library = Self {
            documents: RwLock::new(DocumentStore::open(data_dir, &config.artifact_dir)?),
            users: RwLock::new(Collection::open(data_dir, "users")?),
            sessions: RwLock::new(Collection::open(data_dir, "sessions")?),
            confirmations: RwLock::new(Collection::open(data_dir, "confirmations")?),
        };

        info!(data_dir = %data_dir.display(), "Library opened");
        Ok(library)
    }

    /// Startup maintenance: reconcile documents with the artifact directory
    /// and drop expired sessions and registrations.
    pub async fn startup(&self) -> Result<ReconcileReport> {
        let report = self.documents.write().await.reconcile()?;
        let (sessions, confirmations) = self.purge_expired().await?;
        info!(sessions, confirmations, "Expired account records purged");
        Ok(report)
    }

    /// Remove expired sessions and confirmations; returns how many of each
    pub async fn purge_expired(&self) -> Result<(usize, usize)> {
        let now = Utc::now();
        let sessions = self
            .sessions
            .write()
            .await
            .retain(|s| !s.is_expired(now))?;
        let confirmations = self
            .confirmations
            .write()
            .await
            .retain(|c| !c.is_expired(now))?;
        Ok((sessions, confirmations))
    }

    pub async fn stats(&self) -> LibraryStats {
        LibraryStats {
            documents: self.documents.read().await.len(),
            users: self.users.read().await.len(),
            sessions: self.sessions.read().await.len(),
            confirmations: self.confirmations.read().await.len(),
        }
    }

    /// Flush every collection and release it
    pub fn close(self) -> Result<()> {
        self.documents.into_inner().close()?;
        self.users.into_inner().close()?;
        self.sessions.into_inner().close()?;
        self.confirmations.into_inner().close()?;
        info!("Library closed");
        Ok(())
    }
}
