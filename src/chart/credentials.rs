//! File-backed registry credential store
//!
//! Each chart gets its own file, named after the SHA-256 digest of its
//! normalized identity, so concurrent pulls of different charts never write
//! the same file. Writes go through a temporary file and a rename, so a
//! reader never observes a half-written file.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::chart::error::CredentialError;
use crate::chart::reference::normalize_identity;
use crate::chart::registry::{BasicAuth, CredentialStore};

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredentials {
    scope: String,
    username: String,
    password: String,
}

pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the credential file for a chart
    pub fn path_for(&self, scope: &str) -> PathBuf {
        let digest = Sha256::digest(normalize_identity(scope).as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CredentialError + '_ {
        move |source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn ensure_dir(&self) -> Result<(), CredentialError> {
        std::fs::create_dir_all(&self.dir).map_err(Self::io_error(&self.dir))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&self.dir, perms).map_err(Self::io_error(&self.dir))?;
        }

        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn write_credentials(&self, scope: &str, auth: &BasicAuth) -> Result<(), CredentialError> {
        self.ensure_dir()?;

        let scope = normalize_identity(scope);
        let path = self.path_for(scope);
        let content = serde_json::to_vec_pretty(&StoredCredentials {
            scope: scope.to_string(),
            username: auth.username.clone(),
            password: auth.password.clone(),
        })?;

        // Created with mode 0600 and removed on drop unless persisted
        let mut file = NamedTempFile::new_in(&self.dir).map_err(Self::io_error(&self.dir))?;
        file.write_all(&content).map_err(Self::io_error(file.path()))?;
        file.as_file().sync_all().map_err(Self::io_error(file.path()))?;
        file.persist(&path).map_err(|e| CredentialError::Io {
            path: path.clone(),
            source: e.error,
        })?;

        debug!("Stored registry credentials for {} at {:?}", scope, path);
        Ok(())
    }

    fn read_credentials(&self, scope: &str) -> Result<Option<BasicAuth>, CredentialError> {
        let path = self.path_for(scope);

        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CredentialError::Io { path, source }),
        };

        let stored: StoredCredentials = serde_json::from_slice(&content)?;
        Ok(Some(BasicAuth::new(stored.username, stored.password)))
    }
}
