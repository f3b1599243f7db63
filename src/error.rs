// Crate-wide error type
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the playback engine and its supporting modules
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O failures (opening clips, reading settings)
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The container format could not be identified or parsed
    #[error("failed to probe media format: {0}")]
    Probe(String),

    /// The stream was recognized but could not be decoded
    #[error("failed to decode media: {0}")]
    Decode(String),

    /// The container holds no playable audio track
    #[error("no audio track found")]
    NoAudioTrack,

    /// Seeking inside the clip failed
    #[error("seek failed: {0}")]
    Seek(String),

    /// No usable audio output device
    #[error("no audio output device available")]
    NoOutputDevice,

    /// The output device demands a sample format we cannot feed
    #[error("unsupported output sample format: {0}")]
    UnsupportedFormat(String),

    /// Building or starting the output stream failed
    #[error("audio stream error: {0}")]
    Stream(String),

    /// Sample rate conversion failed
    #[error("resampling error: {0}")]
    Resample(String),

    /// Settings file could not be parsed or written
    #[error("settings error: {0}")]
    Settings(String),

    /// The catalog root does not exist or is not a directory
    #[error("catalog root is not a directory: {0}")]
    CatalogRoot(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
