// Moodifyx CLI - a small frontend for the playback engine:
// play a file with live progress, inspect a clip, list the mood catalog

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use moodifyx::audio::ClipDecoder;
use moodifyx::{MoodCatalog, PlaybackEngine, PlaybackEvent};

#[derive(Parser)]
#[command(name = "moodifyx", about = "Mood-based music player backend", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play an audio file to completion
    Play {
        file: PathBuf,
        /// Playback volume, 0.0 to 1.0
        #[arg(long, default_value_t = 0.7)]
        volume: f32,
        /// Start position in seconds
        #[arg(long)]
        start: Option<f64>,
    },
    /// List the moods and songs under a music directory
    Moods { dir: PathBuf },
    /// Show information about an audio file without playing it
    Info { file: PathBuf },
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Play {
            file,
            volume,
            start,
        } => play(file, volume, start),
        Commands::Moods { dir } => moods(dir),
        Commands::Info { file } => info(file),
    }
}

fn play(file: PathBuf, volume: f32, start: Option<f64>) -> Result<()> {
    let engine = PlaybackEngine::new().context("failed to initialize audio output")?;
    engine.set_volume(volume);

    // Events are marshaled onto this thread through a channel; the engine's
    // background threads never touch the terminal
    let (tx, rx) = mpsc::channel();
    engine.subscribe(move |event| {
        let _ = tx.send(event.clone());
    });

    engine
        .play(&file)
        .with_context(|| format!("cannot play {}", file.display()))?;

    if let Some(seconds) = start {
        engine.set_position(Duration::from_secs_f64(seconds.max(0.0)));
    }

    loop {
        match rx.recv() {
            Ok(PlaybackEvent::PositionChanged { position, duration }) => {
                print!("\r{} / {}  ", format_time(position), format_time(duration));
                let _ = io::stdout().flush();
            }
            Ok(PlaybackEvent::Stopped) => {
                println!();
                break;
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }

    Ok(())
}

fn moods(dir: PathBuf) -> Result<()> {
    let catalog = MoodCatalog::scan(&dir)?;

    if catalog.is_empty() {
        println!("no moods found under {}", dir.display());
        return Ok(());
    }

    for mood in catalog.moods() {
        let songs = catalog.songs(mood).unwrap_or(&[]);
        println!("{} ({} songs)", mood, songs.len());
        for song in songs {
            println!("  {}", song.title);
        }
    }

    Ok(())
}

fn info(file: PathBuf) -> Result<()> {
    let decoder =
        ClipDecoder::open(&file).with_context(|| format!("cannot open {}", file.display()))?;

    let duration = decoder
        .duration_us()
        .map(Duration::from_micros)
        .unwrap_or_default();

    println!("{}", file.display());
    println!("  duration: {}", format_time(duration));
    println!("  sample rate: {} Hz", decoder.sample_rate());
    println!("  channels: {}", decoder.channels());

    Ok(())
}

/// Format a position as MM:SS
fn format_time(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}
