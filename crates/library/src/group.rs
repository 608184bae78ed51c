use std::collections::BTreeMap;

use common::VARIOUS_ARTISTS;
use metadata::MediaMetadata;

// Bucket for files without an album tag. Tag values never contain NUL, so
// this cannot collide with a real album title.
pub const DEFAULT_ARTIST_BUCKET: &str = "\0default-artist";

#[derive(Clone, Debug)]
pub struct AlbumGroup {
    pub key: String,
    pub tracks: Vec<MediaMetadata>,
    pub compilation: bool,
}

pub fn group_by_album(tracks: Vec<MediaMetadata>) -> Vec<AlbumGroup> {
    let mut groups: BTreeMap<String, Vec<MediaMetadata>> = BTreeMap::new();
    for track in tracks {
        let key = if track.album.is_empty() {
            DEFAULT_ARTIST_BUCKET.to_string()
        } else {
            track.album.clone()
        };
        groups.entry(key).or_default().push(track);
    }

    groups
        .into_iter()
        .map(|(key, mut tracks)| {
            let compilation = is_compilation(&tracks);
            if compilation {
                mark_compilation(&mut tracks);
            }
            AlbumGroup {
                key,
                tracks,
                compilation,
            }
        })
        .collect()
}

pub fn is_compilation(tracks: &[MediaMetadata]) -> bool {
    let first = match tracks.first() {
        Some(track) => &track.artist,
        None => return false,
    };
    tracks.iter().any(|track| &track.artist != first)
}

pub fn mark_compilation(tracks: &mut [MediaMetadata]) {
    for track in tracks {
        track.album_artist = VARIOUS_ARTISTS.to_string();
    }
}
