use serde::{Deserialize, Serialize};

pub const VARIOUS_ARTISTS: &str = "Various Artists";

pub const NEW_ID: u64 = 0;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub year: String,
    pub artist_id: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: u64,
    pub title: String,
    pub album_id: u64,
    pub artist_id: u64,
    #[serde(default)]
    pub disc: String,
    pub number: u32,
    #[serde(default)]
    pub genre: String,
    pub duration: u32,
    pub path: String,
    pub cover_id: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cover {
    pub id: u64,
    pub hash: String,
    pub ext: String,
    pub path: String,
}

impl Cover {
    pub fn new(hash: String, ext: String) -> Self {
        let path = cover_key(&hash, &ext);
        Self {
            id: NEW_ID,
            hash,
            ext,
            path,
        }
    }
}

pub fn cover_key(hash: &str, ext: &str) -> String {
    let mut out = String::with_capacity(hash.len() + ext.len());
    out.push_str(hash);
    out.push_str(ext);
    out
}
