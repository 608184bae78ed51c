use std::path::Path;
use std::sync::Arc;

use metadata::Extractor;
use redb::{CommitError, DatabaseError, StorageError, TableError, TransactionError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod blob;
mod catalog;
pub mod config;
pub mod cover;
pub mod group;
pub mod reconcile;
pub mod scan;
pub mod store;
pub mod walk;

pub use blob::{BlobStore, FsBlobStore};
pub use catalog::SweepReport;
pub use config::{ClientSettings, ConfigError, LibraryConfig, LibrarySettings};
pub use cover::{resolve_cover, CoverImage, CoverSource, NoCoverFound, ResolvedCover};
pub use scan::{ScanError, ScanIssue, ScanReport, Scanner};
pub use store::{CatalogStore, CatalogTxn, RedbStore, Saved};

#[derive(Clone)]
pub struct Library {
    settings: LibrarySettings,
    store: Arc<RedbStore>,
    blobs: Arc<FsBlobStore>,
    extractor: Extractor,
}

impl Library {
    pub fn open(settings: LibrarySettings) -> Result<Self, LibraryError> {
        Self::open_with(settings, Extractor::default())
    }

    pub fn open_with(
        settings: LibrarySettings,
        extractor: Extractor,
    ) -> Result<Self, LibraryError> {
        let store = RedbStore::open(&settings.index_path)?;
        info!("Loaded index from {:?}", settings.index_path);
        let blobs = FsBlobStore::new(settings.covers_dir.clone());
        Ok(Self {
            settings,
            store: Arc::new(store),
            blobs: Arc::new(blobs),
            extractor,
        })
    }

    pub fn scanner(&self) -> Scanner {
        Scanner::new(
            self.store.clone(),
            self.blobs.clone(),
            self.extractor.clone(),
            self.settings.cover_source,
        )
    }

    pub fn scan_media_files(&self, root: &Path) -> Result<ScanReport, ScanError> {
        self.scanner().scan_media_files(root)
    }

    pub fn update_library(&self) -> ScanReport {
        let root = match &self.settings.music_root {
            Some(root) => root,
            None => {
                info!("Music directory not configured yet; nothing to scan");
                return ScanReport::default();
            }
        };
        match self.scan_media_files(root) {
            Ok(report) => report,
            Err(err) => {
                warn!("{}", err);
                ScanReport::default()
            }
        }
    }

    pub fn stats(&self) -> Result<LibraryStats, LibraryError> {
        Ok(LibraryStats {
            artists: self.store.count(store::ARTISTS_TABLE)?,
            albums: self.store.count(store::ALBUMS_TABLE)?,
            tracks: self.store.count(store::TRACKS_TABLE)?,
            covers: self.store.count(store::COVERS_TABLE)?,
        })
    }

    pub fn client_settings(&self) -> ClientSettings {
        self.settings.client_settings()
    }

    pub fn settings(&self) -> &LibrarySettings {
        &self.settings
    }

    pub fn store(&self) -> &RedbStore {
        &self.store
    }

    pub fn blobs(&self) -> &FsBlobStore {
        &self.blobs
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub artists: u64,
    pub albums: u64,
    pub tracks: u64,
    pub covers: u64,
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    Invalid(String),
    NotFound(&'static str, u64),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Redb(err) => write!(f, "db error: {}", err),
            LibraryError::Bincode(err) => write!(f, "bincode error: {}", err),
            LibraryError::Invalid(message) => write!(f, "{}", message),
            LibraryError::NotFound(kind, id) => write!(f, "{} {} not found", kind, id),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<redb::Error> for LibraryError {
    fn from(err: redb::Error) -> Self {
        LibraryError::Redb(err)
    }
}

impl From<DatabaseError> for LibraryError {
    fn from(err: DatabaseError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TableError> for LibraryError {
    fn from(err: TableError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TransactionError> for LibraryError {
    fn from(err: TransactionError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<StorageError> for LibraryError {
    fn from(err: StorageError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<CommitError> for LibraryError {
    fn from(err: CommitError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for LibraryError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LibraryError::Bincode(err)
    }
}
