use std::fs;
use std::path::Path;

use common::{Album, Artist, Cover, Track, NEW_ID};
use redb::{Database, ReadableTable, TableDefinition, TableError, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::LibraryError;

const SCHEMA_VERSION: u32 = 1;
const KEY_SEP: char = '\x1f';

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const SEQUENCES_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequences");
pub(crate) const ARTISTS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("artists");
const ARTISTS_BY_NAME_TABLE: TableDefinition<&str, u64> = TableDefinition::new("artists_by_name");
pub(crate) const ALBUMS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("albums");
const ALBUMS_BY_KEY_TABLE: TableDefinition<&str, u64> = TableDefinition::new("albums_by_key");
pub(crate) const TRACKS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("tracks");
const TRACKS_BY_KEY_TABLE: TableDefinition<&str, u64> = TableDefinition::new("tracks_by_key");
pub(crate) const COVERS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("covers");
const COVERS_BY_HASH_TABLE: TableDefinition<&str, u64> = TableDefinition::new("covers_by_hash");

const META_VERSION_KEY: &str = "version";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Saved {
    Inserted,
    Updated,
}

impl Saved {
    pub fn inserted(self) -> bool {
        self == Saved::Inserted
    }
}

pub trait CatalogStore: Send + Sync {
    fn begin(&self) -> Result<Box<dyn CatalogTxn + '_>, LibraryError>;
}

/// One open write transaction. Dropping it without [`CatalogTxn::commit`]
/// rolls back every change made through it.
pub trait CatalogTxn {
    fn artist_by_name(&self, name: &str) -> Result<Option<Artist>, LibraryError>;
    fn album_by_key(&self, title: &str, artist_id: u64) -> Result<Option<Album>, LibraryError>;
    fn track_by_key(
        &self,
        title: &str,
        artist_id: u64,
        album_id: u64,
    ) -> Result<Option<Track>, LibraryError>;
    fn cover_by_hash(&self, hash: &str) -> Result<Option<Cover>, LibraryError>;

    /// Inserts when `id == 0` (assigning a fresh id) and updates otherwise.
    fn save_artist(&mut self, artist: &mut Artist) -> Result<Saved, LibraryError>;
    fn save_album(&mut self, album: &mut Album) -> Result<Saved, LibraryError>;
    fn save_track(&mut self, track: &mut Track) -> Result<Saved, LibraryError>;
    fn save_cover(&mut self, cover: &mut Cover) -> Result<Saved, LibraryError>;

    fn commit(self: Box<Self>) -> Result<(), LibraryError>;
}

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        let store = Self { db };
        store.check_version()?;
        Ok(store)
    }

    pub fn write(&self) -> Result<RedbTxn<'_>, LibraryError> {
        Ok(RedbTxn {
            txn: self.db.begin_write()?,
        })
    }

    fn check_version(&self) -> Result<(), LibraryError> {
        match read_version(&self.db)? {
            Some(version) if version == SCHEMA_VERSION => Ok(()),
            Some(version) => {
                warn!("Catalog schema version mismatch ({}); resetting", version);
                self.reset()
            }
            None => self.reset(),
        }
    }

    pub fn reset(&self) -> Result<(), LibraryError> {
        let write_txn = self.db.begin_write()?;
        clear_table(&write_txn, META_TABLE)?;
        clear_table(&write_txn, SEQUENCES_TABLE)?;
        clear_table(&write_txn, ARTISTS_TABLE)?;
        clear_table(&write_txn, ARTISTS_BY_NAME_TABLE)?;
        clear_table(&write_txn, ALBUMS_TABLE)?;
        clear_table(&write_txn, ALBUMS_BY_KEY_TABLE)?;
        clear_table(&write_txn, TRACKS_TABLE)?;
        clear_table(&write_txn, TRACKS_BY_KEY_TABLE)?;
        clear_table(&write_txn, COVERS_TABLE)?;
        clear_table(&write_txn, COVERS_BY_HASH_TABLE)?;
        {
            // Create every table so readers never hit a missing one.
            write_txn.open_table(SEQUENCES_TABLE)?;
            write_txn.open_table(ARTISTS_TABLE)?;
            write_txn.open_table(ARTISTS_BY_NAME_TABLE)?;
            write_txn.open_table(ALBUMS_TABLE)?;
            write_txn.open_table(ALBUMS_BY_KEY_TABLE)?;
            write_txn.open_table(TRACKS_TABLE)?;
            write_txn.open_table(TRACKS_BY_KEY_TABLE)?;
            write_txn.open_table(COVERS_TABLE)?;
            write_txn.open_table(COVERS_BY_HASH_TABLE)?;
            let mut meta_table = write_txn.open_table(META_TABLE)?;
            let version_bytes = encode_value(&SCHEMA_VERSION)?;
            meta_table.insert(META_VERSION_KEY, version_bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_artist(&self, id: u64) -> Result<Option<Artist>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ARTISTS_TABLE)?;
        let artist = match table.get(id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(artist)
    }

    pub fn get_album(&self, id: u64) -> Result<Option<Album>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ALBUMS_TABLE)?;
        let album = match table.get(id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(album)
    }

    pub fn get_track(&self, id: u64) -> Result<Option<Track>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRACKS_TABLE)?;
        let track = match table.get(id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(track)
    }

    pub fn get_cover(&self, id: u64) -> Result<Option<Cover>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COVERS_TABLE)?;
        let cover = match table.get(id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(cover)
    }

    pub fn all_artists(&self) -> Result<Vec<Artist>, LibraryError> {
        self.all_rows(ARTISTS_TABLE)
    }

    pub fn all_albums(&self) -> Result<Vec<Album>, LibraryError> {
        self.all_rows(ALBUMS_TABLE)
    }

    pub fn all_tracks(&self) -> Result<Vec<Track>, LibraryError> {
        self.all_rows(TRACKS_TABLE)
    }

    pub fn all_covers(&self) -> Result<Vec<Cover>, LibraryError> {
        self.all_rows(COVERS_TABLE)
    }

    fn all_rows<T: for<'de> Deserialize<'de>>(
        &self,
        definition: TableDefinition<u64, &[u8]>,
    ) -> Result<Vec<T>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(definition)?;
        let mut rows = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            rows.push(decode_value(entry.1.value())?);
        }
        Ok(rows)
    }

    pub fn count(&self, definition: TableDefinition<u64, &[u8]>) -> Result<u64, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(definition)?;
        Ok(table.len()?)
    }
}

impl CatalogStore for RedbStore {
    fn begin(&self) -> Result<Box<dyn CatalogTxn + '_>, LibraryError> {
        Ok(Box::new(self.write()?))
    }
}

pub struct RedbTxn<'db> {
    txn: WriteTransaction<'db>,
}

impl RedbTxn<'_> {
    pub fn commit(self) -> Result<(), LibraryError> {
        self.txn.commit()?;
        Ok(())
    }

    pub fn artist(&self, id: u64) -> Result<Option<Artist>, LibraryError> {
        self.get_row(ARTISTS_TABLE, id)
    }

    pub fn album(&self, id: u64) -> Result<Option<Album>, LibraryError> {
        self.get_row(ALBUMS_TABLE, id)
    }

    pub fn track(&self, id: u64) -> Result<Option<Track>, LibraryError> {
        self.get_row(TRACKS_TABLE, id)
    }

    pub fn cover(&self, id: u64) -> Result<Option<Cover>, LibraryError> {
        self.get_row(COVERS_TABLE, id)
    }

    pub fn albums(&self) -> Result<Vec<Album>, LibraryError> {
        self.rows(ALBUMS_TABLE)
    }

    pub fn tracks(&self) -> Result<Vec<Track>, LibraryError> {
        self.rows(TRACKS_TABLE)
    }

    pub fn covers(&self) -> Result<Vec<Cover>, LibraryError> {
        self.rows(COVERS_TABLE)
    }

    // Row deletes below leave dependent rows alone; cascading is up to the
    // caller.
    pub fn delete_artist(&mut self, id: u64) -> Result<bool, LibraryError> {
        let artist: Artist = match self.get_row(ARTISTS_TABLE, id)? {
            Some(artist) => artist,
            None => return Ok(false),
        };
        self.remove_row(ARTISTS_TABLE, id)?;
        self.unindex(ARTISTS_BY_NAME_TABLE, &artist.name, id)?;
        Ok(true)
    }

    pub fn delete_album(&mut self, id: u64) -> Result<bool, LibraryError> {
        let album: Album = match self.get_row(ALBUMS_TABLE, id)? {
            Some(album) => album,
            None => return Ok(false),
        };
        self.remove_row(ALBUMS_TABLE, id)?;
        self.unindex(ALBUMS_BY_KEY_TABLE, &album_key(&album.title, album.artist_id), id)?;
        Ok(true)
    }

    pub fn delete_track(&mut self, id: u64) -> Result<bool, LibraryError> {
        let track: Track = match self.get_row(TRACKS_TABLE, id)? {
            Some(track) => track,
            None => return Ok(false),
        };
        self.remove_row(TRACKS_TABLE, id)?;
        let key = track_key(&track.title, track.artist_id, track.album_id);
        self.unindex(TRACKS_BY_KEY_TABLE, &key, id)?;
        Ok(true)
    }

    pub fn delete_cover(&mut self, id: u64) -> Result<bool, LibraryError> {
        let cover: Cover = match self.get_row(COVERS_TABLE, id)? {
            Some(cover) => cover,
            None => return Ok(false),
        };
        self.remove_row(COVERS_TABLE, id)?;
        self.unindex(COVERS_BY_HASH_TABLE, &cover.hash, id)?;
        Ok(true)
    }

    fn get_row<T: for<'de> Deserialize<'de>>(
        &self,
        definition: TableDefinition<u64, &[u8]>,
        id: u64,
    ) -> Result<Option<T>, LibraryError> {
        let table = self.txn.open_table(definition)?;
        let row = match table.get(id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(row)
    }

    fn rows<T: for<'de> Deserialize<'de>>(
        &self,
        definition: TableDefinition<u64, &[u8]>,
    ) -> Result<Vec<T>, LibraryError> {
        let table = self.txn.open_table(definition)?;
        let mut rows = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            rows.push(decode_value(entry.1.value())?);
        }
        Ok(rows)
    }

    fn put_row<T: Serialize>(
        &mut self,
        definition: TableDefinition<u64, &[u8]>,
        id: u64,
        row: &T,
    ) -> Result<(), LibraryError> {
        let mut table = self.txn.open_table(definition)?;
        let bytes = encode_value(row)?;
        table.insert(id, bytes.as_slice())?;
        Ok(())
    }

    fn remove_row(
        &mut self,
        definition: TableDefinition<u64, &[u8]>,
        id: u64,
    ) -> Result<(), LibraryError> {
        let mut table = self.txn.open_table(definition)?;
        table.remove(id)?;
        Ok(())
    }

    fn lookup(
        &self,
        definition: TableDefinition<&str, u64>,
        key: &str,
    ) -> Result<Option<u64>, LibraryError> {
        let table = self.txn.open_table(definition)?;
        let id = table.get(key)?.map(|value| value.value());
        Ok(id)
    }

    fn index(
        &mut self,
        definition: TableDefinition<&str, u64>,
        key: &str,
        id: u64,
    ) -> Result<(), LibraryError> {
        let mut table = self.txn.open_table(definition)?;
        table.insert(key, id)?;
        Ok(())
    }

    fn unindex(
        &mut self,
        definition: TableDefinition<&str, u64>,
        key: &str,
        id: u64,
    ) -> Result<(), LibraryError> {
        let mut table = self.txn.open_table(definition)?;
        let current = table.get(key)?.map(|value| value.value());
        if current == Some(id) {
            table.remove(key)?;
        }
        Ok(())
    }

    fn next_id(&mut self, sequence: &str) -> Result<u64, LibraryError> {
        let mut table = self.txn.open_table(SEQUENCES_TABLE)?;
        let current = table.get(sequence)?.map(|value| value.value()).unwrap_or(0);
        let next = current + 1;
        table.insert(sequence, next)?;
        Ok(next)
    }

    fn upsert<T: Serialize + for<'de> Deserialize<'de>>(
        &mut self,
        rows: TableDefinition<u64, &[u8]>,
        keys: TableDefinition<&str, u64>,
        sequence: &str,
        id: &mut u64,
        row_key: impl Fn(&T) -> String,
        row: impl Fn(u64) -> T,
    ) -> Result<Saved, LibraryError> {
        let saved = if *id == NEW_ID {
            *id = self.next_id(sequence)?;
            Saved::Inserted
        } else {
            if let Some(previous) = self.get_row::<T>(rows, *id)? {
                let previous_key = row_key(&previous);
                if previous_key != row_key(&row(*id)) {
                    self.unindex(keys, &previous_key, *id)?;
                }
            }
            Saved::Updated
        };

        let value = row(*id);
        self.put_row(rows, *id, &value)?;
        self.index(keys, &row_key(&value), *id)?;
        Ok(saved)
    }

    fn find<T: for<'de> Deserialize<'de>>(
        &self,
        rows: TableDefinition<u64, &[u8]>,
        keys: TableDefinition<&str, u64>,
        key: &str,
    ) -> Result<Option<T>, LibraryError> {
        match self.lookup(keys, key)? {
            Some(id) => self.get_row(rows, id),
            None => Ok(None),
        }
    }
}

impl CatalogTxn for RedbTxn<'_> {
    fn artist_by_name(&self, name: &str) -> Result<Option<Artist>, LibraryError> {
        self.find(ARTISTS_TABLE, ARTISTS_BY_NAME_TABLE, name)
    }

    fn album_by_key(&self, title: &str, artist_id: u64) -> Result<Option<Album>, LibraryError> {
        self.find(ALBUMS_TABLE, ALBUMS_BY_KEY_TABLE, &album_key(title, artist_id))
    }

    fn track_by_key(
        &self,
        title: &str,
        artist_id: u64,
        album_id: u64,
    ) -> Result<Option<Track>, LibraryError> {
        let key = track_key(title, artist_id, album_id);
        self.find(TRACKS_TABLE, TRACKS_BY_KEY_TABLE, &key)
    }

    fn cover_by_hash(&self, hash: &str) -> Result<Option<Cover>, LibraryError> {
        self.find(COVERS_TABLE, COVERS_BY_HASH_TABLE, hash)
    }

    fn save_artist(&mut self, artist: &mut Artist) -> Result<Saved, LibraryError> {
        let snapshot = artist.clone();
        self.upsert(
            ARTISTS_TABLE,
            ARTISTS_BY_NAME_TABLE,
            "artists",
            &mut artist.id,
            |row: &Artist| row.name.clone(),
            |id| Artist {
                id,
                ..snapshot.clone()
            },
        )
    }

    fn save_album(&mut self, album: &mut Album) -> Result<Saved, LibraryError> {
        let snapshot = album.clone();
        self.upsert(
            ALBUMS_TABLE,
            ALBUMS_BY_KEY_TABLE,
            "albums",
            &mut album.id,
            |row: &Album| album_key(&row.title, row.artist_id),
            |id| Album {
                id,
                ..snapshot.clone()
            },
        )
    }

    fn save_track(&mut self, track: &mut Track) -> Result<Saved, LibraryError> {
        let snapshot = track.clone();
        self.upsert(
            TRACKS_TABLE,
            TRACKS_BY_KEY_TABLE,
            "tracks",
            &mut track.id,
            |row: &Track| track_key(&row.title, row.artist_id, row.album_id),
            |id| Track {
                id,
                ..snapshot.clone()
            },
        )
    }

    fn save_cover(&mut self, cover: &mut Cover) -> Result<Saved, LibraryError> {
        let snapshot = cover.clone();
        self.upsert(
            COVERS_TABLE,
            COVERS_BY_HASH_TABLE,
            "covers",
            &mut cover.id,
            |row: &Cover| row.hash.clone(),
            |id| Cover {
                id,
                ..snapshot.clone()
            },
        )
    }

    fn commit(self: Box<Self>) -> Result<(), LibraryError> {
        RedbTxn::commit(*self)
    }
}

fn album_key(title: &str, artist_id: u64) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:020}", artist_id));
    out.push(KEY_SEP);
    out.push_str(title);
    out
}

fn track_key(title: &str, artist_id: u64, album_id: u64) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:020}", artist_id));
    out.push(KEY_SEP);
    out.push_str(&format!("{:020}", album_id));
    out.push(KEY_SEP);
    out.push_str(title);
    out
}

fn read_version(db: &Database) -> Result<Option<u32>, LibraryError> {
    let read_txn = db.begin_read()?;
    let table = match read_txn.open_table(META_TABLE) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let version = match table.get(META_VERSION_KEY)? {
        Some(value) => Some(decode_value(value.value())?),
        None => None,
    };
    Ok(version)
}

fn clear_table<K: redb::RedbKey + 'static, V: redb::RedbValue + 'static>(
    txn: &WriteTransaction,
    table: TableDefinition<K, V>,
) -> Result<(), LibraryError> {
    match txn.delete_table(table) {
        Ok(_) => Ok(()),
        Err(TableError::TableDoesNotExist(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, LibraryError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, LibraryError> {
    Ok(bincode::deserialize(bytes)?)
}
