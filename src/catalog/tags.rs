// Song title extraction using lofty with id3 fallback for problematic MP3 files
use std::path::Path;

use id3::TagLike;
use lofty::prelude::{Accessor, TaggedFileExt};
use lofty::probe::Probe;
use tracing::debug;

pub struct TagReader;

impl TagReader {
    /// Best-effort song title: tags first, file stem as the last resort.
    /// Never fails; catalog entries always get some title.
    pub fn title(path: &Path) -> String {
        if let Some(title) = Self::title_from_lofty(path) {
            return title;
        }

        // id3 is more lenient with malformed MP3 tags
        let is_mp3 = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.eq_ignore_ascii_case("mp3"))
            .unwrap_or(false);
        if is_mp3 {
            if let Some(title) = Self::title_from_id3(path) {
                return title;
            }
        }

        Self::title_from_stem(path)
    }

    fn title_from_lofty(path: &Path) -> Option<String> {
        let probe = Probe::open(path).ok()?.guess_file_type().ok()?;
        let tagged_file = match probe.read() {
            Ok(f) => f,
            Err(e) => {
                debug!("lofty could not read {:?}: {}", path, e);
                return None;
            }
        };

        let tag = tagged_file.primary_tag().or(tagged_file.first_tag());
        tag.and_then(|t| t.title().map(|s| s.to_string()))
    }

    fn title_from_id3(path: &Path) -> Option<String> {
        let tag = id3::Tag::read_from_path(path).ok()?;
        tag.title().map(|s| s.to_string())
    }

    fn title_from_stem(path: &Path) -> String {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string()
    }
}
