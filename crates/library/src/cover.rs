use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use md5::{Digest, Md5};
use metadata::Extractor;
use serde::{Deserialize, Serialize};

pub const COVER_NAMES: &[&str] = &["cover", "artwork", "album", "front"];
pub const COVER_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif"];

const DEFAULT_TAG_EXT: &str = ".jpg";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverSource {
    #[default]
    File,
    Tag,
}

impl CoverSource {
    pub fn other(self) -> Self {
        match self {
            CoverSource::File => CoverSource::Tag,
            CoverSource::Tag => CoverSource::File,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CoverSource::File => "file",
            CoverSource::Tag => "tag",
        }
    }
}

impl FromStr for CoverSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(CoverSource::File),
            "tag" => Ok(CoverSource::Tag),
            other => Err(format!("unknown cover source: {}", other)),
        }
    }
}

impl std::fmt::Display for CoverSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverImage {
    pub hash: String,
    pub ext: String,
    pub data: Vec<u8>,
}

impl CoverImage {
    pub fn from_bytes(data: Vec<u8>, ext: String) -> Self {
        Self {
            hash: md5_hex(&data),
            ext,
            data,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedCover {
    pub image: CoverImage,
    pub source: CoverSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoCoverFound {
    pub track_path: PathBuf,
}

impl std::fmt::Display for NoCoverFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no cover image found for {:?}", self.track_path)
    }
}

impl std::error::Error for NoCoverFound {}

pub fn resolve_cover(
    extractor: &Extractor,
    track_path: &Path,
    preferred: CoverSource,
) -> Result<ResolvedCover, NoCoverFound> {
    for source in [preferred, preferred.other()] {
        let image = match source {
            CoverSource::File => cover_from_folder(track_path),
            CoverSource::Tag => cover_from_tags(extractor, track_path),
        };
        if let Some(image) = image {
            return Ok(ResolvedCover { image, source });
        }
    }
    Err(NoCoverFound {
        track_path: track_path.to_path_buf(),
    })
}

pub fn cover_from_folder(track_path: &Path) -> Option<CoverImage> {
    let directory = track_path.parent()?;
    for name in COVER_NAMES {
        for ext in COVER_EXTENSIONS {
            let candidate = directory.join(format!("{}{}", name, ext));
            if !candidate.is_file() {
                continue;
            }
            if let Ok(data) = fs::read(&candidate) {
                return Some(CoverImage::from_bytes(data, ext.to_string()));
            }
        }
    }
    None
}

pub fn cover_from_tags(extractor: &Extractor, track_path: &Path) -> Option<CoverImage> {
    let picture = extractor.extract(track_path).ok()?.picture?;
    let ext = if picture.ext.is_empty() {
        DEFAULT_TAG_EXT.to_string()
    } else {
        format!(".{}", picture.ext)
    };
    Some(CoverImage::from_bytes(picture.data, ext))
}

pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}
