use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::NEW_ID;
use metadata::{Extractor, MediaMetadata};
use tracing::{debug, info, warn};

use crate::blob::BlobStore;
use crate::cover::CoverSource;
use crate::group::{group_by_album, AlbumGroup};
use crate::reconcile::{ReconcileError, Reconciler};
use crate::store::CatalogStore;
use crate::walk::{walk_directories, DirectoryBatch};
use crate::LibraryError;

#[derive(Debug)]
pub enum ScanError {
    RootNotFound(PathBuf),
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::RootNotFound(path) => write!(f, "scan root not found: {:?}", path),
        }
    }
}

impl std::error::Error for ScanError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanIssue {
    Extraction { path: PathBuf, error: String },
    NoArtist { path: PathBuf },
    NoAlbum { path: PathBuf },
    NoTrack { path: PathBuf },
    Persistence { dir: PathBuf, error: String },
}

impl std::fmt::Display for ScanIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanIssue::Extraction { path, error } => {
                write!(f, "failed to read {:?}: {}", path, error)
            }
            ScanIssue::NoArtist { path } => write!(f, "no artist tag in {:?}", path),
            ScanIssue::NoAlbum { path } => write!(f, "no album tag in {:?}", path),
            ScanIssue::NoTrack { path } => write!(f, "no title for {:?}", path),
            ScanIssue::Persistence { dir, error } => {
                write!(f, "rolled back {:?}: {}", dir, error)
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub processed: usize,
    pub added: usize,
    pub issues: Vec<ScanIssue>,
}

#[derive(Clone)]
pub struct Scanner {
    store: Arc<dyn CatalogStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Extractor,
    cover_source: CoverSource,
}

struct DirectoryOutcome {
    added: usize,
    issues: Vec<ScanIssue>,
}

impl Scanner {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Extractor,
        cover_source: CoverSource,
    ) -> Self {
        Self {
            store,
            blobs,
            extractor,
            cover_source,
        }
    }

    pub fn scan_media_files(&self, root: &Path) -> Result<ScanReport, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::RootNotFound(root.to_path_buf()));
        }
        info!("Scanning {:?} (covers from {})", root, self.cover_source);

        let mut report = ScanReport::default();
        for batch in walk_directories(root) {
            if batch.is_empty() {
                continue;
            }
            self.scan_directory(batch, &mut report);
        }

        info!(
            "Scan finished: {} processed, {} added, {} issues",
            report.processed,
            report.added,
            report.issues.len()
        );
        Ok(report)
    }

    fn scan_directory(&self, batch: DirectoryBatch, report: &mut ScanReport) {
        debug!(
            "Directory {:?}: {} audio files, {} images",
            batch.dir,
            batch.audio_files.len(),
            batch.cover_candidates.len()
        );

        let mut tracks = Vec::with_capacity(batch.audio_files.len());
        for file in &batch.audio_files {
            report.processed += 1;
            match self.extractor.extract(file) {
                Ok(meta) => tracks.push(meta),
                Err(err) => {
                    warn!("Failed to read tags for {:?}: {}", file, err);
                    report.issues.push(ScanIssue::Extraction {
                        path: file.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        if tracks.is_empty() {
            return;
        }

        let groups = group_by_album(tracks);
        match self.reconcile_directory(groups) {
            Ok(outcome) => {
                report.added += outcome.added;
                report.issues.extend(outcome.issues);
            }
            Err(err) => {
                warn!("Rolled back {:?}: {}", batch.dir, err);
                report.issues.push(ScanIssue::Persistence {
                    dir: batch.dir,
                    error: err.to_string(),
                });
            }
        }
    }

    // All-or-nothing: any store error drops the transaction uncommitted.
    fn reconcile_directory(
        &self,
        groups: Vec<AlbumGroup>,
    ) -> Result<DirectoryOutcome, LibraryError> {
        let mut txn = self.store.begin()?;
        let mut outcome = DirectoryOutcome {
            added: 0,
            issues: Vec::new(),
        };
        {
            let mut reconciler = Reconciler::new(
                &mut *txn,
                self.blobs.as_ref(),
                &self.extractor,
                self.cover_source,
            );
            for group in groups {
                if group.compilation {
                    debug!("Album {:?} is a compilation", group.key);
                }
                for meta in &group.tracks {
                    reconcile_track(&mut reconciler, meta, &mut outcome)?;
                }
            }
        }
        txn.commit()?;
        Ok(outcome)
    }
}

fn reconcile_track(
    reconciler: &mut Reconciler<'_>,
    meta: &MediaMetadata,
    outcome: &mut DirectoryOutcome,
) -> Result<(), LibraryError> {
    let artist_id = recover(reconciler.artist(&meta.artist), meta, outcome)?.unwrap_or(NEW_ID);
    let owner_id = recover(reconciler.album_artist(meta, artist_id), meta, outcome)?
        .unwrap_or(NEW_ID);
    let album_id = recover(reconciler.album(meta, owner_id), meta, outcome)?.unwrap_or(NEW_ID);

    if let Some(track) = recover(reconciler.track(meta, artist_id, album_id), meta, outcome)? {
        if track.saved.inserted() {
            outcome.added += 1;
        }
    }
    Ok(())
}

fn recover<T>(
    result: Result<T, ReconcileError>,
    meta: &MediaMetadata,
    outcome: &mut DirectoryOutcome,
) -> Result<Option<T>, LibraryError> {
    let path = meta.path.clone();
    let issue = match result {
        Ok(value) => return Ok(Some(value)),
        Err(ReconcileError::Store(err)) => return Err(err),
        Err(ReconcileError::NoArtist) => ScanIssue::NoArtist { path },
        Err(ReconcileError::NoAlbum) => ScanIssue::NoAlbum { path },
        Err(ReconcileError::NoTrack) => ScanIssue::NoTrack { path },
    };
    debug!("{}", issue);
    outcome.issues.push(issue);
    Ok(None)
}
