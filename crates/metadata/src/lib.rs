use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lofty::error::LoftyError;
use lofty::file::FileType;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct Tags {
    pub file_type: String,
    pub title: String,
    pub album: String,
    pub artist: String,
    pub album_artist: String,
    pub genre: String,
    pub year: u32,
    pub track: u32,
    pub disc: u32,
    pub disc_total: u32,
    pub picture: Option<EmbeddedPicture>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedPicture {
    pub data: Vec<u8>,
    pub ext: String,
}

#[derive(Debug, Default, Clone)]
pub struct MediaMetadata {
    pub format: String,
    pub title: String,
    pub album: String,
    pub artist: String,
    pub album_artist: String,
    pub genre: String,
    pub year: String,
    pub track: u32,
    pub disc: String,
    pub picture: Option<EmbeddedPicture>,
    pub duration: u32,
    pub path: PathBuf,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

pub trait TagReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Tags, MetadataError>;
}

pub trait DurationProbe: Send + Sync {
    fn examine(&self, path: &Path) -> Result<f64, MetadataError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagReader;

#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyDurationProbe;

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Result<Tags, MetadataError> {
        let tagged_file = lofty::read_from_path(path)?;

        let mut tags = Tags {
            file_type: file_type_name(tagged_file.file_type()),
            ..Tags::default()
        };

        let tag = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
            Some(tag) => tag,
            None => return Ok(tags),
        };

        let text = |key: &ItemKey| tag.get_string(key).unwrap_or_default().to_string();
        tags.title = text(&ItemKey::TrackTitle);
        tags.album = text(&ItemKey::AlbumTitle);
        tags.artist = text(&ItemKey::TrackArtist);
        tags.album_artist = text(&ItemKey::AlbumArtist);
        tags.genre = text(&ItemKey::Genre);
        tags.year = tag
            .get_string(&ItemKey::Year)
            .or_else(|| tag.get_string(&ItemKey::RecordingDate))
            .and_then(parse_year)
            .unwrap_or(0);
        tags.track = tag
            .get_string(&ItemKey::TrackNumber)
            .and_then(parse_number)
            .unwrap_or(0);

        if let Some(value) = tag.get_string(&ItemKey::DiscNumber) {
            let (number, total) = parse_pair(value);
            tags.disc = number.unwrap_or(0);
            tags.disc_total = total.unwrap_or(0);
        }
        if tags.disc_total == 0 {
            tags.disc_total = tag
                .get_string(&ItemKey::DiscTotal)
                .and_then(parse_number)
                .unwrap_or(0);
        }

        tags.picture = pick_picture(tag.pictures()).map(|picture| {
            let data = picture.data().to_vec();
            let ext = sniff_image_ext(&data).unwrap_or_default().to_string();
            EmbeddedPicture { data, ext }
        });

        Ok(tags)
    }
}

impl DurationProbe for LoftyDurationProbe {
    fn examine(&self, path: &Path) -> Result<f64, MetadataError> {
        let tagged_file = lofty::read_from_path(path)?;
        Ok(tagged_file.properties().duration().as_secs_f64())
    }
}

#[derive(Clone)]
pub struct Extractor {
    tags: Arc<dyn TagReader>,
    probe: Arc<dyn DurationProbe>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(LoftyTagReader, LoftyDurationProbe)
    }
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor").finish_non_exhaustive()
    }
}

impl Extractor {
    pub fn new(tags: impl TagReader + 'static, probe: impl DurationProbe + 'static) -> Self {
        Self {
            tags: Arc::new(tags),
            probe: Arc::new(probe),
        }
    }

    /// Only an unreadable file is an error. Broken or missing tags yield a
    /// record holding the path and a title derived from the file name.
    pub fn extract(&self, path: &Path) -> Result<MediaMetadata, MetadataError> {
        File::open(path)?;

        let mut info = MediaMetadata {
            path: path.to_path_buf(),
            ..MediaMetadata::default()
        };

        match self.tags.read(path) {
            Ok(tags) => apply_tags(&mut info, tags),
            Err(err) => debug!("No usable tags in {:?}: {}", path, err),
        }

        if info.title.is_empty() {
            info.title = file_stem(path);
        }

        if has_mp3_extension(path) {
            match self.probe.examine(path) {
                Ok(seconds) => info.duration = round_seconds(seconds),
                Err(err) => debug!("Failed to probe duration of {:?}: {}", path, err),
            }
        }

        Ok(info)
    }
}

fn apply_tags(info: &mut MediaMetadata, tags: Tags) {
    info.format = sanitize(&tags.file_type);
    info.title = sanitize(&tags.title);
    info.album = sanitize(&tags.album);
    info.artist = sanitize(&tags.artist);
    info.album_artist = sanitize(&tags.album_artist);
    info.genre = sanitize(&tags.genre);
    info.track = tags.track;
    info.picture = tags.picture;

    if tags.year != 0 {
        info.year = tags.year.to_string();
    }

    // Single disc releases keep an empty disc field.
    if tags.disc_total > 1 {
        info.disc = format!("{}/{}", tags.disc, tags.disc_total);
    }
}

pub fn sanitize(value: &str) -> String {
    value.replace('\0', "").trim().to_string()
}

pub fn has_mp3_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("mp3"))
        .unwrap_or(false)
}

fn round_seconds(seconds: f64) -> u32 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds + 0.5).floor().min(f64::from(u32::MAX)) as u32
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown Track".to_string())
}

fn file_type_name(file_type: FileType) -> String {
    match file_type {
        FileType::Mpeg => "MP3".to_string(),
        FileType::Flac => "FLAC".to_string(),
        FileType::Mp4 => "MP4".to_string(),
        FileType::Vorbis => "OGG".to_string(),
        FileType::Opus => "OPUS".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

fn parse_number(text: &str) -> Option<u32> {
    parse_pair(text).0
}

fn parse_pair(text: &str) -> (Option<u32>, Option<u32>) {
    let mut parts = text.splitn(2, '/');
    let head = parts.next().and_then(|v| sanitize(v).parse().ok());
    let tail = parts.next().and_then(|v| sanitize(v).parse().ok());
    (head, tail)
}

fn parse_year(text: &str) -> Option<u32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn pick_picture(pictures: &[Picture]) -> Option<&Picture> {
    for picture in pictures {
        if picture.pic_type() == PictureType::CoverFront {
            return Some(picture);
        }
    }
    pictures.first()
}

fn sniff_image_ext(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("png")
    } else if bytes.starts_with(b"GIF8") {
        Some("gif")
    } else if bytes.starts_with(b"BM") {
        Some("bmp")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct FixedTags(Option<Tags>);

    impl TagReader for FixedTags {
        fn read(&self, _path: &Path) -> Result<Tags, MetadataError> {
            match &self.0 {
                Some(tags) => Ok(tags.clone()),
                None => Err(MetadataError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "no tags",
                ))),
            }
        }
    }

    struct FixedDuration(f64);

    impl DurationProbe for FixedDuration {
        fn examine(&self, _path: &Path) -> Result<f64, MetadataError> {
            Ok(self.0)
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"not really audio").unwrap();
        path
    }

    fn full_tags() -> Tags {
        Tags {
            file_type: "MP3".to_string(),
            title: "  Schism\0 ".to_string(),
            album: "Lateralus".to_string(),
            artist: " Tool".to_string(),
            album_artist: String::new(),
            genre: "Progressive Metal\0".to_string(),
            year: 2001,
            track: 6,
            disc: 1,
            disc_total: 1,
            picture: None,
        }
    }

    #[test]
    fn extract_sanitizes_tag_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "06 - Schism.mp3");
        let extractor = Extractor::new(FixedTags(Some(full_tags())), FixedDuration(0.0));

        let meta = extractor.extract(&path).unwrap();
        assert_eq!(meta.format, "MP3");
        assert_eq!(meta.title, "Schism");
        assert_eq!(meta.artist, "Tool");
        assert_eq!(meta.album, "Lateralus");
        assert_eq!(meta.genre, "Progressive Metal");
        assert_eq!(meta.year, "2001");
        assert_eq!(meta.track, 6);
        assert_eq!(meta.path, path);
    }

    #[test]
    fn single_disc_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "a.mp3");

        let extractor = Extractor::new(FixedTags(Some(full_tags())), FixedDuration(0.0));
        assert_eq!(extractor.extract(&path).unwrap().disc, "");

        let mut tags = full_tags();
        tags.disc = 2;
        tags.disc_total = 3;
        let extractor = Extractor::new(FixedTags(Some(tags)), FixedDuration(0.0));
        assert_eq!(extractor.extract(&path).unwrap().disc, "2/3");
    }

    #[test]
    fn zero_year_is_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "a.mp3");
        let mut tags = full_tags();
        tags.year = 0;
        let extractor = Extractor::new(FixedTags(Some(tags)), FixedDuration(0.0));
        assert_eq!(extractor.extract(&path).unwrap().year, "");
    }

    #[test]
    fn blank_title_falls_back_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "no artist - no album - no title.mp3");
        let mut tags = full_tags();
        tags.title = " \0 ".to_string();
        let extractor = Extractor::new(FixedTags(Some(tags)), FixedDuration(0.0));
        assert_eq!(
            extractor.extract(&path).unwrap().title,
            "no artist - no album - no title"
        );
    }

    #[test]
    fn unparsable_tags_keep_path_and_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "broken.mp3");
        let extractor = Extractor::new(FixedTags(None), FixedDuration(12.0));

        let meta = extractor.extract(&path).unwrap();
        assert_eq!(meta.title, "broken");
        assert_eq!(meta.path, path);
        assert!(meta.artist.is_empty());
        assert!(meta.album.is_empty());
        assert!(meta.format.is_empty());
        assert!(meta.picture.is_none());
        assert_eq!(meta.duration, 12);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let extractor = Extractor::new(FixedTags(Some(full_tags())), FixedDuration(0.0));
        let err = extractor
            .extract(Path::new("non/existent/file.mp3"))
            .unwrap_err();
        assert!(matches!(err, MetadataError::Io(_)));
    }

    #[test]
    fn duration_rounds_to_nearest_second_for_mp3_only() {
        let dir = tempfile::tempdir().unwrap();
        let mp3 = touch(dir.path(), "loud.MP3");
        let flac = touch(dir.path(), "quiet.flac");

        let extractor = Extractor::new(FixedTags(Some(full_tags())), FixedDuration(241.5));
        assert_eq!(extractor.extract(&mp3).unwrap().duration, 242);
        assert_eq!(extractor.extract(&flac).unwrap().duration, 0);

        let extractor = Extractor::new(FixedTags(Some(full_tags())), FixedDuration(241.49));
        assert_eq!(extractor.extract(&mp3).unwrap().duration, 241);
    }

    #[test]
    fn embedded_picture_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "a.mp3");
        let mut tags = full_tags();
        tags.picture = Some(EmbeddedPicture {
            data: vec![1, 2, 3],
            ext: String::new(),
        });
        let extractor = Extractor::new(FixedTags(Some(tags)), FixedDuration(0.0));
        let picture = extractor.extract(&path).unwrap().picture.unwrap();
        assert_eq!(picture.data, vec![1, 2, 3]);
        assert_eq!(picture.ext, "");
    }

    #[test]
    fn number_pairs_and_years_parse() {
        assert_eq!(parse_pair("2/3"), (Some(2), Some(3)));
        assert_eq!(parse_pair(" 4 "), (Some(4), None));
        assert_eq!(parse_number("x"), None);
        assert_eq!(parse_year("2017-05-01"), Some(2017));
        assert_eq!(parse_year("unknown"), None);
        assert_eq!(sniff_image_ext(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("jpg"));
        assert_eq!(sniff_image_ext(b"nope"), None);
    }
}
