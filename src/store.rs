//! Persistence of swap attempts. A [`SwapState`] is recorded before `initiate` and `participate`
//! return and after every transition, and removed once the attempt is terminal.

use std::collections::HashMap;
use std::error;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::consensus::{self, deserialize, serialize};
use crate::swap::{SwapId, SwapState};

/// Errors when persisting swap states.
#[derive(Error, Debug)]
pub enum Error {
    /// No state is recorded for the swap.
    #[error("No state recorded for swap {0}")]
    NotFound(SwapId),
    /// The recorded state cannot be decoded.
    #[error("Corrupted state: {0}")]
    Corrupted(#[from] consensus::Error),
    /// An I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Any store error not part of this list.
    #[error("Store error: {0}")]
    Other(Box<dyn error::Error + Send + Sync>),
}

impl Error {
    /// Creates a new store error of type other with an arbitrary payload.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self::Other(error.into())
    }
}

/// Durable storage of swap states keyed by swap id.
pub trait SwapStore: Send + Sync {
    /// Record the state, replacing any previous record of the same swap. Must be durable when it
    /// returns.
    fn save(&self, state: &SwapState) -> Result<(), Error>;

    /// Load the state of a swap.
    fn load(&self, id: &SwapId) -> Result<SwapState, Error>;

    /// Remove the record of a swap, succeeds if none exists.
    fn remove(&self, id: &SwapId) -> Result<(), Error>;
}

impl<T> SwapStore for Arc<T>
where
    T: SwapStore + ?Sized,
{
    fn save(&self, state: &SwapState) -> Result<(), Error> {
        (**self).save(state)
    }

    fn load(&self, id: &SwapId) -> Result<SwapState, Error> {
        (**self).load(id)
    }

    fn remove(&self, id: &SwapId) -> Result<(), Error> {
        (**self).remove(id)
    }
}

/// In memory store, states do not survive the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: Mutex<HashMap<SwapId, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<SwapId, Vec<u8>>>, Error> {
        self.states
            .lock()
            .map_err(|_| Error::new("memory store lock poisoned"))
    }
}

impl SwapStore for MemoryStore {
    fn save(&self, state: &SwapState) -> Result<(), Error> {
        self.lock()?.insert(state.id, serialize(state));
        Ok(())
    }

    fn load(&self, id: &SwapId) -> Result<SwapState, Error> {
        let states = self.lock()?;
        let bytes = states.get(id).ok_or(Error::NotFound(*id))?;
        Ok(deserialize(bytes)?)
    }

    fn remove(&self, id: &SwapId) -> Result<(), Error> {
        self.lock()?.remove(id);
        Ok(())
    }
}

/// Store keeping one file per swap in a directory. Files are replaced atomically: the state is
/// written and synced to a temporary file, renamed over the previous record, then the directory
/// is synced so the new entry survives a crash.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store in `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, id: &SwapId) -> PathBuf {
        self.dir.join(format!("{}.swap", id))
    }

    fn sync_dir(&self) -> Result<(), Error> {
        // directories cannot be opened as files on windows
        if cfg!(unix) {
            File::open(&self.dir)?.sync_all()?;
        }
        Ok(())
    }

    /// List the swaps with a recorded state.
    pub fn list(&self) -> Result<Vec<SwapId>, Error> {
        let mut ids = vec![];
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("swap") {
                continue;
            }
            match path.file_stem().and_then(|stem| stem.to_str()).map(str::parse) {
                Some(Ok(id)) => ids.push(id),
                _ => log::warn!("Ignoring unexpected file {:?} in swap store", path),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl SwapStore for FileStore {
    fn save(&self, state: &SwapState) -> Result<(), Error> {
        let path = self.path(&state.id);
        let tmp_path = path.with_extension("swap.tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(&serialize(state))?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &path)?;
        self.sync_dir()?;
        log::trace!("{} | state saved in phase {}", state.id, state.phase);
        Ok(())
    }

    fn load(&self, id: &SwapId) -> Result<SwapState, Error> {
        let bytes = match fs::read(self.path(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::NotFound(*id)),
            Err(e) => return Err(e.into()),
        };
        Ok(deserialize(&bytes)?)
    }

    fn remove(&self, id: &SwapId) -> Result<(), Error> {
        match fs::remove_file(self.path(id)) {
            Ok(()) => self.sync_dir(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
