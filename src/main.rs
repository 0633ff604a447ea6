//! Dubro - Video Dubbing Pipeline
//!
//! Command line front end: runs the transcription phase, walks the user
//! through reviewing the translated subtitles, then produces the dubbed video.

use anyhow::{anyhow, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dubro::cli::{Args, Commands};
use dubro::config::Config;
use dubro::language::{language_name, resolve_language, LANGUAGES};
use dubro::media::MediaProcessorFactory;
use dubro::pipeline::{PipelineController, PipelineState, VideoSource};
use dubro::subtitle::EditSet;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;
    info!("Starting Dubro - Video Dubbing Pipeline");

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("dubro.toml").exists() {
                info!("Found dubro.toml in current directory, loading...");
                Config::from_file("dubro.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Dub {
            input,
            target_lang,
            source_lang,
            output_dir,
            auto_approve,
            edits,
            keep_workspace,
        } => {
            let target = resolve_language(&target_lang)
                .ok_or_else(|| anyhow!("Unsupported target language '{}'", target_lang))?;
            let source = resolve_language(&source_lang)
                .ok_or_else(|| anyhow!("Unsupported source language '{}'", source_lang))?;

            let review = match (edits, auto_approve) {
                (Some(path), _) => ReviewMode::Edits(load_edits(&path).await?),
                (None, true) => ReviewMode::Edits(EditSet::new()),
                (None, false) => ReviewMode::Interactive,
            };

            let output_dir = match output_dir {
                Some(dir) => dir,
                None => input
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from(".")),
            };

            let mut controller = PipelineController::from_config(&config)?;
            let outcome = dub(&mut controller, input, target, source, review, &output_dir).await;

            if outcome.is_err() && keep_workspace {
                if let Some(path) = controller.keep_workspace() {
                    println!("Workspace kept for inspection: {}", path.display());
                    return outcome;
                }
            }
            if let Err(e) = &outcome {
                warn!("Run did not complete: {}", e);
            }

            match controller.state() {
                PipelineState::AwaitingReview => controller.reject_review()?,
                _ => controller.reset()?,
            }
            outcome?;
        }
        Commands::Languages => {
            println!("{:<25} {:<8}", "Language", "Code");
            println!("{}", "-".repeat(33));
            for (name, code) in LANGUAGES {
                println!("{:<25} {:<8}", name, code);
            }
        }
        Commands::InitConfig { path } => {
            Config::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        Commands::Extract { input, output } => {
            info!("Extracting audio from: {}", input.display());
            let media = MediaProcessorFactory::create_processor(config.media.clone());
            media.check_availability().await?;
            media.extract_audio(&input, &output).await?;
        }
    }

    info!("Dubro completed successfully");
    Ok(())
}

enum ReviewMode {
    /// Apply these edits and approve without prompting
    Edits(EditSet),
    Interactive,
}

async fn dub(
    controller: &mut PipelineController,
    input: PathBuf,
    target: &str,
    source: &str,
    review: ReviewMode,
    output_dir: &Path,
) -> Result<()> {
    let _progress = spawn_progress(controller);

    info!(
        "Dubbing {} from {} to {}",
        input.display(),
        language_name(source),
        language_name(target)
    );
    controller.start(VideoSource::File(input), target, source).await?;

    match review {
        ReviewMode::Edits(edits) => controller.approve_review(edits).await?,
        ReviewMode::Interactive => {
            tokio::task::yield_now().await;
            if !interactive_review(controller).await? {
                println!("Review rejected, run discarded.");
                return Ok(());
            }
        }
    }

    let result = controller.result()?;
    let exported = result.export(output_dir).await?;

    println!("Dubbing complete:");
    for path in exported {
        println!("  {}", path.display());
    }
    Ok(())
}

/// Mirror published status onto a progress bar while a phase runs.
fn spawn_progress(controller: &PipelineController) -> JoinHandle<()> {
    let mut receiver = controller.subscribe();

    tokio::spawn(async move {
        let mut bar: Option<ProgressBar> = None;
        while receiver.changed().await.is_ok() {
            let status = receiver.borrow_and_update().clone();
            if status.state.is_running() {
                let bar = bar.get_or_insert_with(new_progress_bar);
                bar.set_position(status.progress_hint as u64);
                bar.set_message(status.message);
            } else if let Some(finished) = bar.take() {
                finished.finish_and_clear();
            }
        }
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
    })
}

fn new_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}") {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

/// Returns `false` when the reviewer rejected the run.
async fn interactive_review(controller: &mut PipelineController) -> Result<bool> {
    print_review(controller);
    println!("Commands: edit <index> <text> | show | approve | reject");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let mut parts = line.splitn(3, ' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("edit"), Some(index), Some(text)) => match index.parse::<u32>() {
                Ok(index) => controller.edit_segment(index, text.trim())?,
                Err(_) => println!("Segment index must be a number"),
            },
            (Some("show"), None, None) => print_review(controller),
            (Some("approve"), None, None) => match controller.approve_review(EditSet::new()).await {
                Ok(()) => return Ok(true),
                Err(e) if controller.state() == PipelineState::AwaitingReview => {
                    println!("Could not commit edits: {}", e);
                }
                Err(e) => return Err(e.into()),
            },
            (Some("reject"), None, None) => {
                controller.reject_review()?;
                return Ok(false);
            }
            (Some(""), None, None) => {}
            _ => println!("Unknown command: {}", line),
        }
    }

    Err(anyhow!("Input closed before the review was approved"))
}

fn print_review(controller: &PipelineController) {
    let (Some(pair), Some(buffer)) = (controller.review_pair(), controller.edit_buffer()) else {
        return;
    };

    if !pair.drift().is_empty() {
        println!("Warning: translated timing differs from original at positions {:?}", pair.drift());
    }
    for (original, translated) in pair.rows() {
        let pending = buffer
            .get(&translated.index)
            .filter(|text| **text != translated.text);
        println!("{}", original);
        match pending {
            Some(text) => println!("    -> {} (edited)", text),
            None => println!("    -> {}", translated.text),
        }
    }
}

async fn load_edits(path: &Path) -> Result<EditSet> {
    let content = tokio::fs::read_to_string(path).await?;
    let edits: EditSet = serde_json::from_str(&content)?;
    info!("Loaded {} review edits from {}", edits.len(), path.display());
    Ok(edits)
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".dubro").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "dubro.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("dubro.log").display()
    );
    Ok(())
}
