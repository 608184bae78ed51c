use common::{Cover, NEW_ID};
use metadata::{Extractor, MediaMetadata};
use tracing::{debug, warn};

use crate::blob::BlobStore;
use crate::cover::{resolve_cover, CoverImage, CoverSource};
use crate::store::{CatalogTxn, Saved};
use crate::LibraryError;

#[derive(Debug)]
pub enum ReconcileError {
    NoArtist,
    NoAlbum,
    NoTrack,
    Store(LibraryError),
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::NoArtist => write!(f, "no artist to process"),
            ReconcileError::NoAlbum => write!(f, "no album to process"),
            ReconcileError::NoTrack => write!(f, "no track title provided"),
            ReconcileError::Store(err) => write!(f, "store error: {}", err),
        }
    }
}

impl std::error::Error for ReconcileError {}

impl From<LibraryError> for ReconcileError {
    fn from(err: LibraryError) -> Self {
        ReconcileError::Store(err)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reconciled {
    pub id: u64,
    pub saved: Saved,
}

pub struct Reconciler<'a> {
    txn: &'a mut dyn CatalogTxn,
    blobs: &'a dyn BlobStore,
    extractor: &'a Extractor,
    cover_source: CoverSource,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        txn: &'a mut dyn CatalogTxn,
        blobs: &'a dyn BlobStore,
        extractor: &'a Extractor,
        cover_source: CoverSource,
    ) -> Self {
        Self {
            txn,
            blobs,
            extractor,
            cover_source,
        }
    }

    pub fn artist(&mut self, name: &str) -> Result<u64, ReconcileError> {
        if name.is_empty() {
            return Err(ReconcileError::NoArtist);
        }
        let mut artist = self.txn.artist_by_name(name)?.unwrap_or_default();
        artist.name = name.to_string();
        self.txn.save_artist(&mut artist)?;
        Ok(artist.id)
    }

    pub fn album_artist(
        &mut self,
        meta: &MediaMetadata,
        artist_id: u64,
    ) -> Result<u64, ReconcileError> {
        if meta.album.is_empty()
            || meta.album_artist.is_empty()
            || meta.album_artist == meta.artist
        {
            return Ok(artist_id);
        }
        self.artist(&meta.album_artist)
    }

    pub fn album(&mut self, meta: &MediaMetadata, artist_id: u64) -> Result<u64, ReconcileError> {
        if meta.album.is_empty() {
            return Err(ReconcileError::NoAlbum);
        }
        let mut album = self
            .txn
            .album_by_key(&meta.album, artist_id)?
            .unwrap_or_default();
        album.title = meta.album.clone();
        album.artist_id = artist_id;
        album.year = meta.year.clone();
        self.txn.save_album(&mut album)?;
        Ok(album.id)
    }

    pub fn track(
        &mut self,
        meta: &MediaMetadata,
        artist_id: u64,
        album_id: u64,
    ) -> Result<Reconciled, ReconcileError> {
        if meta.title.is_empty() {
            return Err(ReconcileError::NoTrack);
        }
        let mut track = self
            .txn
            .track_by_key(&meta.title, artist_id, album_id)?
            .unwrap_or_default();
        track.title = meta.title.clone();
        track.artist_id = artist_id;
        track.album_id = album_id;
        track.number = meta.track;
        track.disc = meta.disc.clone();
        track.genre = meta.genre.clone();
        track.duration = meta.duration;
        track.path = meta.path.to_string_lossy().to_string();

        track.cover_id = match resolve_cover(self.extractor, &meta.path, self.cover_source) {
            Ok(resolved) => {
                debug!(
                    "Cover for {:?} from {} ({})",
                    meta.path, resolved.source, resolved.image.hash
                );
                self.cover(resolved.image)?
            }
            Err(err) => {
                debug!("{}", err);
                NEW_ID
            }
        };

        let saved = self.txn.save_track(&mut track)?;
        Ok(Reconciled {
            id: track.id,
            saved,
        })
    }

    // Cover keyed by content hash. Bytes are only written for new covers,
    // or when the blob of a known cover went missing. A failed blob write
    // leaves the track without a cover instead of failing the directory.
    pub fn cover(&mut self, image: CoverImage) -> Result<u64, ReconcileError> {
        if let Some(existing) = self.txn.cover_by_hash(&image.hash)? {
            if !self.blobs.exists(&existing.path) {
                warn!("Cover blob {} missing; rewriting", existing.path);
                if let Err(err) = self.blobs.write(&existing.path, &image.data) {
                    warn!("Failed to rewrite cover blob {}: {}", existing.path, err);
                }
            }
            return Ok(existing.id);
        }

        let mut cover = Cover::new(image.hash, image.ext);
        if let Err(err) = self.blobs.write(&cover.path, &image.data) {
            warn!("Failed to store cover {}: {}", cover.path, err);
            return Ok(NEW_ID);
        }
        self.txn.save_cover(&mut cover)?;
        Ok(cover.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::FsBlobStore;
    use crate::store::RedbStore;
    use common::Artist;
    use metadata::{DurationProbe, EmbeddedPicture, MetadataError, TagReader, Tags};
    use std::fs;
    use std::path::{Path, PathBuf};

    struct PictureTags(Option<Vec<u8>>);

    impl TagReader for PictureTags {
        fn read(&self, _path: &Path) -> Result<Tags, MetadataError> {
            Ok(Tags {
                picture: self.0.clone().map(|data| EmbeddedPicture {
                    data,
                    ext: "png".to_string(),
                }),
                ..Tags::default()
            })
        }
    }

    struct NoDuration;

    impl DurationProbe for NoDuration {
        fn examine(&self, _path: &Path) -> Result<f64, MetadataError> {
            Ok(0.0)
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        store: RedbStore,
        blobs: FsBlobStore,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("catalog.redb")).unwrap();
        let blobs = FsBlobStore::new(dir.path().join("covers"));
        Fixture { dir, store, blobs }
    }

    fn media(dir: &Path, file: &str, title: &str, album: &str, artist: &str) -> MediaMetadata {
        let path: PathBuf = dir.join(file);
        fs::write(&path, b"audio").unwrap();
        MediaMetadata {
            title: title.to_string(),
            album: album.to_string(),
            artist: artist.to_string(),
            year: "2001".to_string(),
            path,
            ..MediaMetadata::default()
        }
    }

    #[test]
    fn existing_artist_is_reused() {
        let fx = fixture();
        let extractor = Extractor::new(PictureTags(None), NoDuration);
        let mut txn = fx.store.write().unwrap();
        let mut tool = Artist {
            id: 0,
            name: "Tool".to_string(),
        };
        txn.save_artist(&mut tool).unwrap();

        let mut reconciler = Reconciler::new(&mut txn, &fx.blobs, &extractor, CoverSource::File);
        assert_eq!(reconciler.artist("Tool").unwrap(), tool.id);
        assert_eq!(reconciler.artist("Tool").unwrap(), tool.id);
        assert!(matches!(
            reconciler.artist(""),
            Err(ReconcileError::NoArtist)
        ));
        drop(reconciler);
        txn.commit().unwrap();
        assert_eq!(fx.store.all_artists().unwrap().len(), 1);
    }

    #[test]
    fn album_and_track_are_keyed_by_parents() {
        let fx = fixture();
        let extractor = Extractor::new(PictureTags(None), NoDuration);
        let meta = media(fx.dir.path(), "a.mp3", "Schism", "Lateralus", "Tool");
        let mut txn = fx.store.write().unwrap();
        let mut reconciler = Reconciler::new(&mut txn, &fx.blobs, &extractor, CoverSource::File);

        let artist_id = reconciler.artist(&meta.artist).unwrap();
        let album_id = reconciler.album(&meta, artist_id).unwrap();
        assert_eq!(reconciler.album(&meta, artist_id).unwrap(), album_id);
        assert_ne!(reconciler.album(&meta, 0).unwrap(), album_id);

        let first = reconciler.track(&meta, artist_id, album_id).unwrap();
        let second = reconciler.track(&meta, artist_id, album_id).unwrap();
        assert!(first.saved.inserted());
        assert!(!second.saved.inserted());
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn missing_album_title_is_reported() {
        let fx = fixture();
        let extractor = Extractor::new(PictureTags(None), NoDuration);
        let meta = media(fx.dir.path(), "a.mp3", "Schism", "", "Tool");
        let mut txn = fx.store.write().unwrap();
        let mut reconciler = Reconciler::new(&mut txn, &fx.blobs, &extractor, CoverSource::File);
        assert!(matches!(
            reconciler.album(&meta, 1),
            Err(ReconcileError::NoAlbum)
        ));

        let mut untitled = meta.clone();
        untitled.title.clear();
        assert!(matches!(
            reconciler.track(&untitled, 1, 0),
            Err(ReconcileError::NoTrack)
        ));
    }

    #[test]
    fn identical_pictures_share_one_cover() {
        let fx = fixture();
        let extractor = Extractor::new(PictureTags(Some(b"same bytes".to_vec())), NoDuration);
        let one = media(fx.dir.path(), "one.mp3", "One", "First", "A");
        let two = media(fx.dir.path(), "two.mp3", "Two", "Second", "A");
        let mut txn = fx.store.write().unwrap();
        let mut reconciler = Reconciler::new(&mut txn, &fx.blobs, &extractor, CoverSource::Tag);

        let first = reconciler.track(&one, 1, 1).unwrap();
        let second = reconciler.track(&two, 1, 2).unwrap();
        drop(reconciler);
        txn.commit().unwrap();

        let tracks = fx.store.all_tracks().unwrap();
        let covers = fx.store.all_covers().unwrap();
        assert_eq!(covers.len(), 1);
        assert!(tracks
            .iter()
            .all(|track| track.cover_id == covers[0].id));
        assert_ne!(first.id, second.id);

        let blobs: Vec<_> = fs::read_dir(fx.blobs.root()).unwrap().collect();
        assert_eq!(blobs.len(), 1);
        assert_eq!(covers[0].ext, ".png");
        assert!(fx.blobs.exists(&covers[0].path));
    }

    #[test]
    fn missing_blob_is_rewritten() {
        let fx = fixture();
        let extractor = Extractor::new(PictureTags(None), NoDuration);
        let mut txn = fx.store.write().unwrap();
        let mut reconciler = Reconciler::new(&mut txn, &fx.blobs, &extractor, CoverSource::File);

        let image = CoverImage::from_bytes(b"img".to_vec(), ".jpg".to_string());
        let id = reconciler.cover(image.clone()).unwrap();
        let key = format!("{}{}", image.hash, image.ext);
        fx.blobs.remove(&key).unwrap();

        assert_eq!(reconciler.cover(image).unwrap(), id);
        assert!(fx.blobs.exists(&key));
    }

    #[test]
    fn track_without_cover_links_nothing() {
        let fx = fixture();
        let extractor = Extractor::new(PictureTags(None), NoDuration);
        let meta = media(fx.dir.path(), "a.mp3", "Schism", "Lateralus", "Tool");
        let mut txn = fx.store.write().unwrap();
        let mut reconciler = Reconciler::new(&mut txn, &fx.blobs, &extractor, CoverSource::File);
        reconciler.track(&meta, 1, 1).unwrap();
        drop(reconciler);
        txn.commit().unwrap();
        assert_eq!(fx.store.all_tracks().unwrap()[0].cover_id, 0);
    }

    struct ReadOnlyBlobs;

    impl BlobStore for ReadOnlyBlobs {
        fn write(&self, _key: &str, _bytes: &[u8]) -> std::io::Result<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            ))
        }

        fn remove(&self, _key: &str) -> std::io::Result<()> {
            Ok(())
        }

        fn exists(&self, _key: &str) -> bool {
            false
        }
    }

    #[test]
    fn failed_blob_write_leaves_track_uncovered() {
        let fx = fixture();
        let extractor = Extractor::new(PictureTags(Some(b"art".to_vec())), NoDuration);
        let meta = media(fx.dir.path(), "a.mp3", "Schism", "Lateralus", "Tool");
        let mut txn = fx.store.write().unwrap();
        let mut reconciler = Reconciler::new(&mut txn, &ReadOnlyBlobs, &extractor, CoverSource::Tag);

        let track = reconciler.track(&meta, 1, 1).unwrap();
        assert!(track.saved.inserted());
        drop(reconciler);
        txn.commit().unwrap();

        assert_eq!(fx.store.all_tracks().unwrap()[0].cover_id, 0);
        assert!(fx.store.all_covers().unwrap().is_empty());
    }

    #[test]
    fn albumless_track_keeps_its_own_artist() {
        let fx = fixture();
        let extractor = Extractor::new(PictureTags(None), NoDuration);
        let mut meta = media(fx.dir.path(), "a.mp3", "Loose", "", "A");
        meta.album_artist = common::VARIOUS_ARTISTS.to_string();
        let mut txn = fx.store.write().unwrap();
        let mut reconciler = Reconciler::new(&mut txn, &fx.blobs, &extractor, CoverSource::File);

        let artist_id = reconciler.artist(&meta.artist).unwrap();
        assert_eq!(reconciler.album_artist(&meta, artist_id).unwrap(), artist_id);
        drop(reconciler);
        txn.commit().unwrap();

        let names: Vec<String> = fx
            .store
            .all_artists()
            .unwrap()
            .into_iter()
            .map(|artist| artist.name)
            .collect();
        assert_eq!(names, vec!["A".to_string()]);
    }
}
