//! Retrieval of documents from the network share.
//!
//! The share is expected to be mounted locally at `SHARE_MOUNT_ROOT`. Remote
//! references use Windows separators and are resolved against that mount.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info};

use crate::config::ShareSettings;
use crate::error::RetrievalError;

/// Copies a remote document into a local directory.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Copy `remote` into `dest_dir` and return the local file path. The
    /// caller owns (and removes) the returned file.
    async fn fetch(&self, remote: &str, dest_dir: &Path) -> Result<PathBuf, RetrievalError>;
}

// ============================================================================
// Session guard
// ============================================================================

/// One-time initialisation behind a double-checked lock. Concurrent callers
/// wait for the first registration; a failed attempt leaves the guard open
/// for the next caller.
#[derive(Default)]
pub struct SessionGuard {
    ready: AtomicBool,
    lock: Mutex<()>,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Run `register` unless a previous call already succeeded.
    pub async fn ensure<F, Fut, E>(&self, register: F) -> Result<(), E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), E>>,
    {
        if self.is_ready() {
            return Ok(());
        }

        let _held = self.lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }

        register().await?;
        self.ready.store(true, Ordering::Release);
        Ok(())
    }
}

// ============================================================================
// Share fetcher
// ============================================================================

/// Fetches from the mounted share, one transfer at a time.
#[derive(Clone)]
pub struct ShareFetcher {
    server: String,
    share: String,
    account: String,
    mount_root: PathBuf,
    base_folder: String,
    session: Arc<SessionGuard>,
    transfers: Arc<Semaphore>,
}

impl ShareFetcher {
    pub fn new(settings: &ShareSettings) -> Self {
        let account = if settings.domain.is_empty() {
            settings.username.clone()
        } else {
            format!(r"{}\{}", settings.domain, settings.username)
        };

        Self {
            server: settings.server.trim_matches('\\').to_string(),
            share: settings.share.trim_matches('\\').to_string(),
            account,
            mount_root: settings.mount_root.clone(),
            base_folder: settings.base_folder.trim_matches('\\').to_string(),
            session: Arc::new(SessionGuard::new()),
            transfers: Arc::new(Semaphore::new(1)),
        }
    }

    /// Share-relative path of `remote` in backslash form.
    ///
    /// UNC references keep their own path below `\\server\share`; relative
    /// references get the base folder prefixed when they lack it.
    pub fn share_relative(&self, remote: &str) -> String {
        let clean = remote.trim().replace('/', "\\");

        if let Some(unc) = clean.strip_prefix(r"\\") {
            // Drop the server and share components.
            return unc.splitn(3, '\\').nth(2).unwrap_or_default().to_string();
        }

        let clean = clean.trim_start_matches('\\');
        if self.base_folder.is_empty() {
            return clean.to_string();
        }
        let prefix = format!(r"{}\", self.base_folder.to_lowercase());
        if clean.to_lowercase().starts_with(&prefix) {
            clean.to_string()
        } else {
            format!(r"{}\{}", self.base_folder, clean)
        }
    }

    /// UNC form of `remote`, used in log lines.
    pub fn unc_path(&self, remote: &str) -> String {
        format!(r"\\{}\{}\{}", self.server, self.share, self.share_relative(remote))
    }

    /// Local path of `remote` under the mount point.
    pub fn local_source(&self, remote: &str) -> PathBuf {
        self.share_relative(remote)
            .split('\\')
            .filter(|part| !part.is_empty())
            .fold(self.mount_root.clone(), |path, part| path.join(part))
    }

    async fn register_session(&self) -> Result<(), RetrievalError> {
        let root = self.mount_root.clone();
        let mounted = tokio::fs::metadata(&root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !mounted {
            error!("Share \\\\{}\\{} is not mounted at {:?}", self.server, self.share, root);
            return Err(RetrievalError::Session(format!(
                "share mount {} is not available",
                root.display()
            )));
        }
        info!("Share session ready for {} as {:?}", self.server, self.account);
        Ok(())
    }
}

#[async_trait]
impl FileFetcher for ShareFetcher {
    async fn fetch(&self, remote: &str, dest_dir: &Path) -> Result<PathBuf, RetrievalError> {
        self.session.ensure(|| self.register_session()).await?;

        let unc = self.unc_path(remote);
        let source = self.local_source(remote);
        let file_name = source
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| RetrievalError::NotFound(unc.clone()))?;
        let target = dest_dir.join(file_name);

        let _permit = self
            .transfers
            .acquire()
            .await
            .map_err(|e| RetrievalError::Session(e.to_string()))?;

        info!("Starting download: {} -> {:?}", unc, target);
        match tokio::fs::copy(&source, &target).await {
            Ok(bytes) => {
                info!("Downloaded {} bytes from {}", bytes, unc);
                Ok(target)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("Remote file not found: {}", unc);
                Err(RetrievalError::NotFound(unc))
            }
            Err(e) => {
                error!("Error downloading file {}: {}", unc, e);
                Err(RetrievalError::Transfer { path: unc, source: e })
            }
        }
    }
}
