// Mood catalog
// Each subdirectory of the music root is a mood; its audio files are songs

pub mod scanner;
pub mod tags;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use scanner::SongScanner;
use tags::TagReader;

/// One playable song in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub title: String,
    pub path: PathBuf,
}

/// Mood -> songs lookup built from a directory tree
#[derive(Debug, Default)]
pub struct MoodCatalog {
    moods: BTreeMap<String, Vec<Song>>,
}

impl MoodCatalog {
    /// Build a catalog from `root`, one mood per subdirectory.
    /// Moods with no playable songs are left out.
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::CatalogRoot(root.to_path_buf()));
        }

        let mut moods = BTreeMap::new();

        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            let files = SongScanner::scan(&path)?;
            if files.is_empty() {
                debug!("mood directory {:?} has no playable songs", path);
                continue;
            }

            let songs = files
                .into_iter()
                .map(|path| Song {
                    title: TagReader::title(&path),
                    path,
                })
                .collect();
            moods.insert(name.to_string(), songs);
        }

        info!("catalog scanned: {} moods", moods.len());
        Ok(Self { moods })
    }

    /// All moods, sorted by name
    pub fn moods(&self) -> impl Iterator<Item = &str> {
        self.moods.keys().map(|s| s.as_str())
    }

    /// Songs for one mood, in file order
    pub fn songs(&self, mood: &str) -> Option<&[Song]> {
        self.moods.get(mood).map(|songs| songs.as_slice())
    }

    pub fn len(&self) -> usize {
        self.moods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(path: &Path) {
        File::create(path).unwrap();
    }

    #[test]
    fn test_scan_builds_mood_map() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Happy")).unwrap();
        fs::create_dir(dir.path().join("Calm")).unwrap();
        touch(&dir.path().join("Happy").join("upbeat.wav"));
        touch(&dir.path().join("Happy").join("bounce.mp3"));
        touch(&dir.path().join("Calm").join("drift.flac"));

        let catalog = MoodCatalog::scan(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.moods().collect::<Vec<_>>(), vec!["Calm", "Happy"]);
        assert_eq!(catalog.songs("Happy").unwrap().len(), 2);
        assert_eq!(catalog.songs("Calm").unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_mood_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MoodCatalog::scan(dir.path()).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.songs("Angry").is_none());
    }

    #[test]
    fn test_moods_without_songs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Empty")).unwrap();
        fs::create_dir(dir.path().join("Full")).unwrap();
        touch(&dir.path().join("Full").join("song.ogg"));
        touch(&dir.path().join("Empty").join("readme.txt"));

        let catalog = MoodCatalog::scan(dir.path()).unwrap();
        assert_eq!(catalog.moods().collect::<Vec<_>>(), vec!["Full"]);
    }

    #[test]
    fn test_loose_files_in_root_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("stray.mp3"));

        let catalog = MoodCatalog::scan(dir.path()).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let err = MoodCatalog::scan("/nonexistent/music").unwrap_err();
        assert!(matches!(err, Error::CatalogRoot(_)));
    }

    #[test]
    fn test_song_titles_from_file_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Focus")).unwrap();
        touch(&dir.path().join("Focus").join("Deep Work.wav"));

        let catalog = MoodCatalog::scan(dir.path()).unwrap();
        let songs = catalog.songs("Focus").unwrap();
        assert_eq!(songs[0].title, "Deep Work");
    }
}
