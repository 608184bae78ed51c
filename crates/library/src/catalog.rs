use std::collections::HashSet;
use std::path::Path;

use common::{Album, Artist, Cover, Track, NEW_ID};
use tracing::{info, warn};

use crate::blob::BlobStore;
use crate::store::{CatalogTxn, RedbTxn, Saved};
use crate::{Library, LibraryError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tracks: usize,
    pub albums: usize,
    pub artists: usize,
    pub covers: usize,
}

impl Library {
    pub fn get_artist(&self, id: u64) -> Result<Option<Artist>, LibraryError> {
        self.store().get_artist(id)
    }

    pub fn get_album(&self, id: u64) -> Result<Option<Album>, LibraryError> {
        self.store().get_album(id)
    }

    pub fn get_track(&self, id: u64) -> Result<Option<Track>, LibraryError> {
        self.store().get_track(id)
    }

    pub fn get_cover(&self, id: u64) -> Result<Option<Cover>, LibraryError> {
        self.store().get_cover(id)
    }

    pub fn list_artists(&self) -> Result<Vec<Artist>, LibraryError> {
        self.store().all_artists()
    }

    pub fn list_albums(&self) -> Result<Vec<Album>, LibraryError> {
        self.store().all_albums()
    }

    pub fn list_tracks(&self) -> Result<Vec<Track>, LibraryError> {
        self.store().all_tracks()
    }

    pub fn artist_exists(&self, id: u64) -> bool {
        matches!(self.get_artist(id), Ok(Some(_)))
    }

    pub fn album_exists(&self, id: u64) -> bool {
        matches!(self.get_album(id), Ok(Some(_)))
    }

    pub fn track_exists(&self, id: u64) -> bool {
        matches!(self.get_track(id), Ok(Some(_)))
    }

    pub fn albums_for_artist(&self, artist_id: u64) -> Result<Vec<Album>, LibraryError> {
        if !self.artist_exists(artist_id) {
            return Err(LibraryError::NotFound("artist", artist_id));
        }
        let mut albums: Vec<Album> = self
            .list_albums()?
            .into_iter()
            .filter(|album| album.artist_id == artist_id)
            .collect();
        albums.sort_by(|a, b| a.year.cmp(&b.year).then_with(|| a.id.cmp(&b.id)));
        Ok(albums)
    }

    pub fn tracks_for_album(&self, album_id: u64) -> Result<Vec<Track>, LibraryError> {
        if !self.album_exists(album_id) {
            return Err(LibraryError::NotFound("album", album_id));
        }
        let mut tracks: Vec<Track> = self
            .list_tracks()?
            .into_iter()
            .filter(|track| track.album_id == album_id)
            .collect();
        tracks.sort_by(|a, b| {
            a.disc
                .cmp(&b.disc)
                .then_with(|| a.number.cmp(&b.number))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(tracks)
    }

    pub fn save_artist(&self, artist: &mut Artist) -> Result<Saved, LibraryError> {
        if artist.name.is_empty() {
            return Err(LibraryError::Invalid(
                "cannot save artist: empty name".to_string(),
            ));
        }
        let mut txn = self.store().write()?;
        let saved = txn.save_artist(artist)?;
        txn.commit()?;
        Ok(saved)
    }

    pub fn save_album(&self, album: &mut Album) -> Result<Saved, LibraryError> {
        if album.title.is_empty() {
            return Err(LibraryError::Invalid(
                "cannot save album: empty title".to_string(),
            ));
        }
        let mut txn = self.store().write()?;
        if album.artist_id != NEW_ID && txn.artist(album.artist_id)?.is_none() {
            return Err(LibraryError::Invalid(
                "cannot save album: invalid artist ID".to_string(),
            ));
        }
        let saved = txn.save_album(album)?;
        txn.commit()?;
        Ok(saved)
    }

    pub fn save_track(&self, track: &mut Track) -> Result<Saved, LibraryError> {
        if track.title.is_empty() {
            return Err(LibraryError::Invalid(
                "cannot save track: empty title".to_string(),
            ));
        }
        if track.path.is_empty() {
            return Err(LibraryError::Invalid(
                "cannot save track: empty path".to_string(),
            ));
        }
        let mut txn = self.store().write()?;
        if track.artist_id != NEW_ID && txn.artist(track.artist_id)?.is_none() {
            return Err(LibraryError::Invalid(
                "cannot save track: invalid artist ID".to_string(),
            ));
        }
        if track.album_id != NEW_ID && txn.album(track.album_id)?.is_none() {
            return Err(LibraryError::Invalid(
                "cannot save track: invalid album ID".to_string(),
            ));
        }
        let saved = txn.save_track(track)?;
        txn.commit()?;
        Ok(saved)
    }

    pub fn delete_artist(&self, id: u64) -> Result<(), LibraryError> {
        if id == NEW_ID {
            return Err(LibraryError::Invalid(
                "cannot delete artist: id not provided".to_string(),
            ));
        }
        let mut txn = self.store().write()?;
        let albums: Vec<u64> = txn
            .albums()?
            .into_iter()
            .filter(|album| album.artist_id == id)
            .map(|album| album.id)
            .collect();
        for album_id in albums {
            delete_album_cascade(&mut txn, album_id)?;
        }
        txn.delete_artist(id)?;
        txn.commit()
    }

    pub fn delete_album(&self, id: u64) -> Result<(), LibraryError> {
        if id == NEW_ID {
            return Err(LibraryError::Invalid(
                "cannot delete album: id not provided".to_string(),
            ));
        }
        let mut txn = self.store().write()?;
        delete_album_cascade(&mut txn, id)?;
        txn.commit()
    }

    pub fn delete_track(&self, id: u64) -> Result<(), LibraryError> {
        if id == NEW_ID {
            return Err(LibraryError::Invalid(
                "cannot delete track: id not provided".to_string(),
            ));
        }
        let mut txn = self.store().write()?;
        txn.delete_track(id)?;
        txn.commit()
    }

    pub fn clean_dead_files(&self) -> Result<SweepReport, LibraryError> {
        let mut report = SweepReport::default();
        let mut txn = self.store().write()?;

        let mut touched_albums = HashSet::new();
        let mut touched_artists = HashSet::new();
        for track in txn.tracks()? {
            if Path::new(&track.path).exists() {
                continue;
            }
            if txn.delete_track(track.id)? {
                report.tracks += 1;
                touched_albums.insert(track.album_id);
                touched_artists.insert(track.artist_id);
            }
        }

        let tracks = txn.tracks()?;
        for album_id in touched_albums {
            if album_id == NEW_ID || tracks.iter().any(|track| track.album_id == album_id) {
                continue;
            }
            if let Some(album) = txn.album(album_id)? {
                touched_artists.insert(album.artist_id);
            }
            if txn.delete_album(album_id)? {
                report.albums += 1;
            }
        }

        let albums = txn.albums()?;
        for artist_id in touched_artists {
            if artist_id == NEW_ID
                || albums.iter().any(|album| album.artist_id == artist_id)
                || tracks.iter().any(|track| track.artist_id == artist_id)
            {
                continue;
            }
            if txn.delete_artist(artist_id)? {
                report.artists += 1;
            }
        }

        let linked: HashSet<u64> = tracks.iter().map(|track| track.cover_id).collect();
        let mut dead_blobs = Vec::new();
        for cover in txn.covers()? {
            if linked.contains(&cover.id) {
                continue;
            }
            if txn.delete_cover(cover.id)? {
                report.covers += 1;
                dead_blobs.push(cover.path);
            }
        }

        txn.commit()?;

        for key in dead_blobs {
            if let Err(err) = self.blobs().remove(&key) {
                warn!("Failed to remove cover blob {}: {}", key, err);
            }
        }

        info!(
            "Swept {} tracks, {} albums, {} artists, {} covers",
            report.tracks, report.albums, report.artists, report.covers
        );
        Ok(report)
    }

    pub fn erase_library(&self) -> Result<(), LibraryError> {
        self.store().reset()?;
        self.blobs().clear()?;
        info!("Library erased");
        Ok(())
    }
}

fn delete_album_cascade(txn: &mut RedbTxn<'_>, album_id: u64) -> Result<(), LibraryError> {
    let tracks: Vec<u64> = txn
        .tracks()?
        .into_iter()
        .filter(|track| track.album_id == album_id)
        .map(|track| track.id)
        .collect();
    for track_id in tracks {
        txn.delete_track(track_id)?;
    }
    txn.delete_album(album_id)?;
    Ok(())
}
