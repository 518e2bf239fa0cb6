//! Session metadata record and credential artifact on disk
//!
//! The record is replaced through a temp file and a rename so a crash mid-write
//! leaves the previous copy intact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::constants::files::{CREDENTIALS_FILE, PROFILE_DIR, SESSION_META_FILE};
use crate::domain::errors::CycleError;
use crate::domain::session_meta::SessionMeta;

#[derive(Debug, Clone)]
pub struct SessionStore {
    meta_path: PathBuf,
    credentials_path: PathBuf,
    profile_dir: PathBuf,
}

impl SessionStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        let state_dir = state_dir.as_ref();
        Self {
            meta_path: state_dir.join(SESSION_META_FILE),
            credentials_path: state_dir.join(CREDENTIALS_FILE),
            profile_dir: state_dir.join(PROFILE_DIR),
        }
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    /// Create the state directory if needed
    pub async fn ensure_dir(&self) -> Result<(), CycleError> {
        if let Some(dir) = self.meta_path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| CycleError::Persistence(format!("create {}: {e}", dir.display())))?;
        }
        Ok(())
    }

    pub async fn save(&self, meta: &SessionMeta) -> Result<(), CycleError> {
        let json = serde_json::to_vec_pretty(meta)
            .map_err(|e| CycleError::Persistence(format!("encode session meta: {e}")))?;
        self.ensure_dir().await?;

        let tmp = self.meta_path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| CycleError::Persistence(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.meta_path).await.map_err(|e| {
            CycleError::Persistence(format!("replace {}: {e}", self.meta_path.display()))
        })?;
        debug!(path = %self.meta_path.display(), "Session meta saved");
        Ok(())
    }

    /// Stored record; absent or unreadable records count as none
    pub async fn load(&self) -> Option<SessionMeta> {
        let bytes = match fs::read(&self.meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.meta_path.display(), error = %e, "Could not read session meta");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(path = %self.meta_path.display(), error = %e, "Ignoring malformed session meta");
                None
            }
        }
    }

    /// Remove the record and the credential artifact together
    pub async fn clear(&self) -> Result<(), CycleError> {
        let (meta, creds) = tokio::join!(
            remove_file_if_exists(&self.meta_path),
            remove_file_if_exists(&self.credentials_path)
        );
        meta.and(creds)
    }

    pub async fn credentials_exist(&self) -> bool {
        fs::try_exists(&self.credentials_path).await.unwrap_or(false)
    }

    /// Remove the browser profile and the credential artifact
    pub async fn wipe_profile(&self) -> Result<(), CycleError> {
        match fs::remove_dir_all(&self.profile_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CycleError::Persistence(format!(
                    "remove {}: {e}",
                    self.profile_dir.display()
                )));
            }
        }
        remove_file_if_exists(&self.credentials_path).await
    }
}

async fn remove_file_if_exists(path: &Path) -> Result<(), CycleError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CycleError::Persistence(format!("remove {}: {e}", path.display()))),
    }
}
