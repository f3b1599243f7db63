use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

/// List of supported audio file extensions
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "opus", "wma",
];

/// Scanner for finding audio files in a directory tree
pub struct SongScanner;

impl SongScanner {
    /// Scan a directory recursively and return all audio file paths, sorted
    pub fn scan<P: AsRef<Path>>(directory: P) -> Result<Vec<PathBuf>> {
        let mut audio_files = Vec::new();

        for entry in WalkDir::new(directory)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();

            if !path.is_file() {
                continue;
            }

            if let Some(extension) = path.extension() {
                let ext_str = extension.to_string_lossy().to_lowercase();
                if SUPPORTED_EXTENSIONS.contains(&ext_str.as_str()) {
                    audio_files.push(path.to_path_buf());
                }
            }
        }

        audio_files.sort();
        Ok(audio_files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};

    #[test]
    fn test_scan_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("a.mp3")).unwrap();
        File::create(dir.path().join("b.FLAC")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        File::create(dir.path().join("cover.png")).unwrap();

        let files = SongScanner::scan(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_scan_recurses_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        File::create(dir.path().join("nested").join("z.wav")).unwrap();
        File::create(dir.path().join("a.wav")).unwrap();

        let files = SongScanner::scan(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.wav"));
        assert!(files[1].ends_with("z.wav"));
    }

    #[test]
    fn test_scan_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let files = SongScanner::scan(dir.path()).unwrap();
        assert!(files.is_empty());
    }
}
