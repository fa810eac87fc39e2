//! File-backed session persistence.
//!
//! One JSON file per `(model, session id)` pair. A sibling `.lock` file is
//! held exclusively from load until the handle is dropped so two
//! invocations on the same key cannot interleave their read-modify-write.
//! The lock file is removed on release when no session was ever saved.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::Session;

/// Default session directory, relative to the working directory.
pub const DEFAULT_SESSION_DIR: &str = ".sessions";

/// Identifies a persisted session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionKey {
    pub model: String,
    pub id: String,
}

impl SessionKey {
    #[must_use]
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }

    fn file_stem(&self) -> String {
        format!("{}-{}", self.model, self.id)
    }

    /// Inverse of the file naming; splits at the first `-`.
    fn from_file_stem(stem: &str) -> Option<Self> {
        let (model, id) = stem.split_once('-')?;
        if model.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(model, id))
    }
}

/// Errors that can occur while persisting sessions.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// Failed to lock a session file.
    #[error("Failed to lock session {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error.
    #[error("Session I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Directory of session files.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_DIR)
    }
}

impl SessionStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.root.join(format!("{}.json", key.file_stem()))
    }

    fn lock_path_for(&self, key: &SessionKey) -> PathBuf {
        self.root.join(format!("{}.lock", key.file_stem()))
    }

    /// Lock and load the session for `model` and `session_id`.
    ///
    /// An empty `session_id` yields a detached handle that is never read
    /// or written. A missing file loads as an empty session; an unreadable
    /// or corrupt file is logged and also treated as empty.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Lock` if the lock file cannot be created or
    /// locked.
    pub fn open(&self, model: &str, session_id: &str) -> Result<SessionHandle, SessionError> {
        if session_id.is_empty() {
            return Ok(SessionHandle::detached());
        }

        let key = SessionKey::new(model, session_id);
        let path = self.path_for(&key);
        let lock = SessionLock::acquire(self.lock_path_for(&key), path.clone())?;
        let session = load_session(&path);

        tracing::debug!(
            path = %path.display(),
            turns = session.len(),
            "Loaded session"
        );

        Ok(SessionHandle {
            session,
            persisted: Some(Persisted {
                key,
                path,
                _lock: lock,
            }),
        })
    }

    /// [`open`](Self::open) on the blocking pool, since waiting for a
    /// contended lock blocks the calling thread.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub async fn open_async(
        &self,
        model: &str,
        session_id: &str,
    ) -> Result<SessionHandle, SessionError> {
        let store = self.clone();
        let model = model.to_string();
        let session_id = session_id.to_string();
        let lock_path = self.lock_path_for(&SessionKey::new(model.as_str(), session_id.as_str()));

        tokio::task::spawn_blocking(move || store.open(&model, &session_id))
            .await
            .map_err(|e| SessionError::Lock {
                path: lock_path,
                source: io::Error::other(e),
            })?
    }

    /// Sessions present on disk, sorted by model then id.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Io` if the directory exists but cannot be read.
    pub fn list(&self) -> Result<Vec<SessionKey>, SessionError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SessionError::Io {
                    path: self.root.clone(),
                    source: e,
                })
            }
        };

        let mut keys: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(SessionKey::from_file_stem)
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

fn load_session(path: &Path) -> Session {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Session::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read session, starting fresh");
            return Session::new();
        }
    };

    serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Corrupt session file, starting fresh");
        Session::new()
    })
}

/// Exclusive advisory lock released on drop.
#[derive(Debug)]
struct SessionLock {
    file: File,
    path: PathBuf,
    session_path: PathBuf,
}

impl SessionLock {
    fn acquire(path: PathBuf, session_path: PathBuf) -> Result<Self, SessionError> {
        let lock_err = |source| SessionError::Lock {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(lock_err)?;
        }

        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(lock_err)?;

            if file.try_lock_exclusive().is_err() {
                tracing::info!(path = %path.display(), "Session in use, waiting for lock");
                file.lock_exclusive().map_err(lock_err)?;
            }

            // The previous holder may have unlinked the file while we waited.
            if still_linked(&file, &path) {
                return Ok(Self {
                    file,
                    path: path.clone(),
                    session_path,
                });
            }
            tracing::debug!(path = %path.display(), "Lock file replaced, retrying");
        }
    }
}

#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, _path: &Path) -> bool {
    true
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        // Open files cannot be unlinked everywhere, so only unix cleans up.
        if cfg!(unix) && !self.session_path.exists() {
            let _ = fs::remove_file(&self.path);
        }
        let _ = self.file.unlock();
    }
}

#[derive(Debug)]
struct Persisted {
    key: SessionKey,
    path: PathBuf,
    _lock: SessionLock,
}

/// A loaded session plus, when keyed, the lock and path to save it back.
#[derive(Debug)]
pub struct SessionHandle {
    session: Session,
    persisted: Option<Persisted>,
}

impl SessionHandle {
    /// A session with no backing file; `save` does nothing.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            session: Session::new(),
            persisted: None,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    #[must_use]
    pub fn key(&self) -> Option<&SessionKey> {
        self.persisted.as_ref().map(|p| &p.key)
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persisted.is_some()
    }

    /// Write the session atomically (temp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn save(&self) -> Result<(), SessionError> {
        let Some(persisted) = &self.persisted else {
            return Ok(());
        };
        let path = &persisted.path;
        let io_err = |source| SessionError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = serde_json::to_vec(&self.session)?;
        let temp_path = path.with_extension("json.tmp");
        {
            let mut file = File::create(&temp_path).map_err(io_err)?;
            file.write_all(&content).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&temp_path, path).map_err(io_err)?;

        tracing::debug!(path = %path.display(), turns = self.session.len(), "Saved session");
        Ok(())
    }
}
