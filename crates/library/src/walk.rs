use std::path::{Path, PathBuf};

use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

#[derive(Clone, Debug, Default)]
pub struct DirectoryBatch {
    pub dir: PathBuf,
    pub audio_files: Vec<PathBuf>,
    // Image files next to the audio. Informational only, the cover
    // resolver finds folder art by name on its own.
    pub cover_candidates: Vec<PathBuf>,
}

impl DirectoryBatch {
    pub fn is_empty(&self) -> bool {
        self.audio_files.is_empty()
    }
}

pub fn walk_directories(root: &Path) -> impl Iterator<Item = DirectoryBatch> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| read_directory(entry.path()))
}

fn read_directory(dir: &Path) -> DirectoryBatch {
    let mut batch = DirectoryBatch {
        dir: dir.to_path_buf(),
        ..DirectoryBatch::default()
    };

    for entry in WalkDir::new(dir)
        .follow_links(false)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_audio_file(path) {
            batch.audio_files.push(path.to_path_buf());
        } else if is_image_file(path) {
            batch.cover_candidates.push(path.to_path_buf());
        }
    }

    batch
}

pub fn is_audio_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase().ends_with(".mp3"))
        .unwrap_or(false)
}

fn is_image_file(path: &Path) -> bool {
    let ext = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_ascii_lowercase(),
        None => return false,
    };
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn walks_depth_first_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b/2.mp3"));
        touch(&root.join("a/inner/3.mp3"));
        touch(&root.join("a/1.mp3"));
        touch(&root.join("top.mp3"));

        let dirs: Vec<PathBuf> = walk_directories(root).map(|batch| batch.dir).collect();
        assert_eq!(
            dirs,
            vec![
                root.to_path_buf(),
                root.join("a"),
                root.join("a/inner"),
                root.join("b"),
            ]
        );
    }

    #[test]
    fn separates_audio_from_images() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("02.MP3"));
        touch(&root.join("01.mp3"));
        touch(&root.join("cover.jpg"));
        touch(&root.join("notes.txt"));
        touch(&root.join("sub/ignored.mp3"));

        let batch = walk_directories(root).next().unwrap();
        assert_eq!(
            batch.audio_files,
            vec![root.join("01.mp3"), root.join("02.MP3")]
        );
        assert_eq!(batch.cover_candidates, vec![root.join("cover.jpg")]);
    }

    #[test]
    fn audio_matching_follows_glob() {
        assert!(is_audio_file(Path::new("/music/a.mp3")));
        assert!(is_audio_file(Path::new("/music/.mp3")));
        assert!(!is_audio_file(Path::new("/music/a.flac")));
        assert!(!is_audio_file(Path::new("/music/a.mp3.part")));
    }
}
