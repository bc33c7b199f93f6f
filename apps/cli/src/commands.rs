//! CLI command definitions and dispatch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use cineload_progress_store::{
    FileBackend, KvProgressStore, PlaybackStore, ProgressRecord, ProgressStore, now_millis,
};
use cineload_protocol::UploadProgress;
use cineload_transfer::{SourceFile, SpeedCalculator};
use cineload_upload::{
    CredentialStore, FileCredentialStore, HttpUploadApi, UploadController, UploadError,
    UploadEvent, UploadOutcome,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::Config;

/// Resumable chunked video uploads.
#[derive(Debug, Parser)]
#[command(name = "cineload", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Store the bearer token used for uploads
    Login {
        #[arg(long)]
        token: String,
    },
    /// Forget the stored token
    Logout,
    /// Upload a video, resuming earlier progress for the same file
    Upload(UploadArgs),
    /// List unfinished uploads
    Pending,
    /// Drop the saved progress of an upload
    Forget {
        upload_id: String,
    },
    /// Saved playback positions
    #[command(subcommand)]
    Playback(PlaybackCommand),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Video file (MP4, M3U8 or M4V)
    pub file: PathBuf,

    /// Overrides `base_url` from the configuration
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum PlaybackCommand {
    /// Print the position to resume a movie from
    Get { movie_id: String },
    /// Save a position in seconds
    Set {
        movie_id: String,
        current_time: f64,
        duration: f64,
    },
    /// Forget the position of a movie
    Clear { movie_id: String },
}

impl Cli {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        match &self.command {
            Commands::Login { token } => login(&config, token),
            Commands::Logout => logout(&config),
            Commands::Upload(args) => upload(&config, args).await,
            Commands::Pending => pending(&config),
            Commands::Forget { upload_id } => forget(&config, upload_id),
            Commands::Playback(cmd) => playback(&config, cmd),
        }
    }
}

fn credentials(config: &Config) -> anyhow::Result<FileCredentialStore> {
    let path = config.credentials_path();
    FileCredentialStore::new(&path)
        .with_context(|| format!("failed to read credentials from {}", path.display()))
}

fn progress_store(config: &Config) -> anyhow::Result<KvProgressStore<FileBackend>> {
    let backend = FileBackend::new(config.store_dir())?;
    Ok(KvProgressStore::with_max_age(
        backend,
        config.upload_config().max_record_age,
    ))
}

fn login(config: &Config, token: &str) -> anyhow::Result<()> {
    let token = token.trim();
    if token.is_empty() {
        bail!("token must not be empty");
    }
    credentials(config)?.set_token(token)?;
    println!("Token saved.");
    Ok(())
}

fn logout(config: &Config) -> anyhow::Result<()> {
    credentials(config)?.clear()?;
    println!("Token removed.");
    Ok(())
}

async fn upload(config: &Config, args: &UploadArgs) -> anyhow::Result<()> {
    let base_url = args.base_url.as_deref().unwrap_or(&config.base_url);
    let api = HttpUploadApi::new(base_url)?;
    let source = SourceFile::open(&args.file)
        .await
        .with_context(|| format!("cannot open {}", args.file.display()))?;

    let mut controller = UploadController::new(
        Arc::new(api),
        Arc::new(progress_store(config)?),
        Arc::new(credentials(config)?),
        config.upload_config(),
    );
    let events = controller
        .take_events()
        .context("upload event channel already taken")?;
    let controller = Arc::new(controller);

    let bar = progress_bar(source.name(), source.size())?;
    let render = tokio::spawn(render_events(events, bar));

    let result = {
        let upload = controller.start(source);
        tokio::pin!(upload);
        loop {
            tokio::select! {
                result = &mut upload => break result,
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    if let Err(e) = controller.pause() {
                        warn!(error = %e, "could not pause");
                    }
                }
            }
        }
    };
    // Closes the event channel so the renderer finishes.
    drop(controller);
    if let Err(e) = render.await {
        warn!(error = %e, "progress renderer stopped");
    }

    match result {
        Ok(UploadOutcome::Completed { file_url, .. }) => {
            println!("{file_url}");
            Ok(())
        }
        Ok(UploadOutcome::Paused {
            uploaded_chunks,
            total_chunks,
            ..
        }) => {
            println!(
                "Paused after {uploaded_chunks}/{total_chunks} chunks. \
                 Run the same command again to resume."
            );
            Ok(())
        }
        Err(e) if e.is_auth() => {
            bail!("{e}. Log in again with `cineload login --token <TOKEN>`.")
        }
        Err(UploadError::NoCredential) => {
            bail!("not logged in. Run `cineload login --token <TOKEN>` first.")
        }
        Err(e) => Err(e.into()),
    }
}

fn progress_bar(file_name: &str, size: u64) -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(size);
    let style = ProgressStyle::with_template(
        "{prefix:20.20} {bar:40.green/blue} {bytes}/{total_bytes} {msg}",
    )?
    .progress_chars("██ ");
    bar.set_style(style);
    bar.set_prefix(file_name.to_string());
    bar.enable_steady_tick(Duration::from_millis(250));
    Ok(bar)
}

async fn render_events(mut events: mpsc::Receiver<UploadEvent>, bar: ProgressBar) {
    // Counts only bytes sent in this run; already uploaded chunks are excluded.
    let mut speed = SpeedCalculator::new(Some(Duration::from_secs(20)), None);
    let mut last_uploaded: Option<u64> = None;
    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::Started {
                resumed_chunks,
                total_chunks,
                ..
            } => {
                speed.reset();
                last_uploaded = None;
                if resumed_chunks > 0 {
                    bar.println(format!(
                        "Resuming: {resumed_chunks}/{total_chunks} chunks already uploaded"
                    ));
                }
            }
            UploadEvent::Progress(progress) => {
                let sent = last_uploaded.map_or(0, |last| progress.uploaded.saturating_sub(last));
                speed.add_sample(sent);
                last_uploaded = Some(progress.uploaded);
                bar.set_position(progress.uploaded);
                bar.set_message(progress_message(&progress, &speed));
            }
            UploadEvent::Paused { .. } => bar.abandon_with_message("paused"),
            UploadEvent::Completed { .. } => bar.finish_with_message("done"),
            UploadEvent::Failed { error } => bar.abandon_with_message(format!("failed: {error}")),
            UploadEvent::Cancelled => bar.abandon_with_message("cancelled"),
        }
    }
}

fn progress_message(progress: &UploadProgress, speed: &SpeedCalculator) -> String {
    let chunk = format!("chunk {}/{}", progress.current_chunk, progress.total_chunks);
    let remaining = progress.total.saturating_sub(progress.uploaded);
    match speed.eta(remaining) {
        Some(eta) => format!(
            "{chunk}, {}/s, {} left",
            HumanBytes(speed.bytes_per_second() as u64),
            HumanDuration(eta)
        ),
        None => chunk,
    }
}

fn pending(config: &Config) -> anyhow::Result<()> {
    let records = progress_store(config)?.list_pending()?;
    if records.is_empty() {
        println!("No unfinished uploads.");
        return Ok(());
    }
    println!(
        "{:<36}  {:<32}  {:>9}  {:>8}",
        "UPLOAD ID", "FILE", "CHUNKS", "AGE"
    );
    let now = now_millis();
    for record in &records {
        println!("{}", format_pending(record, now));
    }
    Ok(())
}

fn format_pending(record: &ProgressRecord, now_ms: i64) -> String {
    let chunks = format!("{}/{}", record.uploaded_chunks.len(), record.total_chunks);
    let age_secs = u64::try_from(now_ms.saturating_sub(record.timestamp) / 1000).unwrap_or(0);
    format!(
        "{:<36}  {:<32}  {:>9}  {:>8}",
        record.upload_id,
        record.file_name,
        chunks,
        format_age(Duration::from_secs(age_secs))
    )
}

fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => format!("{}m", secs / 60),
        _ => format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60),
    }
}

fn forget(config: &Config, upload_id: &str) -> anyhow::Result<()> {
    let store = progress_store(config)?;
    if store.get(upload_id)?.is_none() {
        bail!("no saved progress for upload {upload_id}");
    }
    store.delete(upload_id)?;
    println!("Forgot upload {upload_id}.");
    Ok(())
}

fn playback(config: &Config, cmd: &PlaybackCommand) -> anyhow::Result<()> {
    let store = PlaybackStore::new(FileBackend::new(config.store_dir())?);
    match cmd {
        PlaybackCommand::Get { movie_id } => match store.restore(movie_id)? {
            Some(position) => println!("{position:.1}"),
            None => println!("No saved position for {movie_id}."),
        },
        PlaybackCommand::Set {
            movie_id,
            current_time,
            duration,
        } => {
            if !store.save(movie_id, *current_time, *duration)? {
                bail!("time and duration must both be positive");
            }
        }
        PlaybackCommand::Clear { movie_id } => store.clear(movie_id)?,
    }
    Ok(())
}
