//! CLI entry point for the EPUB downloader.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use epub_downloader_core::{
    ConversionOptions, Converter, CookieFileSession, CredentialProvider, DirectorySink,
    FetchSettings, ReqwestTransport, SiteConfig, StaticSession, Transport,
};
use tracing::{debug, error, info, warn};

mod app_config;
mod cli;
mod progress_ui;

use cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(&args);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %format!("{err:#}"), "startup failed");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Priority: `RUST_LOG` env var > quiet flag > verbose flag > default (info).
fn init_tracing(args: &Args) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(args: Args) -> Result<bool> {
    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_default_file_config()?;
    if let Some(path) = loaded.path.as_deref().filter(|_| loaded.config.is_some()) {
        debug!(path = %path.display(), "config file loaded");
    }
    let file = loaded.values();

    let options = ConversionOptions {
        theme: args.theme.or(file.theme).unwrap_or_default(),
        kindle: args.kindle || file.kindle.unwrap_or(false),
    };
    let site = args
        .site_url
        .clone()
        .or(file.site_url)
        .map_or_else(SiteConfig::default, SiteConfig::new);
    let mut settings = FetchSettings::default();
    if let Some(rate_limit) = args.rate_limit.or(file.rate_limit) {
        settings.base_spacing = Duration::from_millis(rate_limit);
    }
    if let Some(max_retries) = args.max_retries.or(file.max_retries) {
        settings.max_attempts = max_retries;
    }
    let output_dir = args
        .output_dir
        .clone()
        .or(file.output_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let jar;
    let credentials: Arc<dyn CredentialProvider>;
    match args.cookies.clone().or(file.cookies) {
        Some(path) => {
            let session = Arc::new(CookieFileSession::new(path));
            jar = session.jar();
            credentials = session;
        }
        None => {
            warn!("no cookie file given; requests are sent without a session");
            jar = Arc::new(reqwest::cookie::Jar::default());
            credentials = Arc::new(StaticSession);
        }
    }
    let transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::new(jar).context("Failed to build HTTP client")?);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let use_spinner = !args.quiet && io::stderr().is_terminal();
    let ui = progress_ui::spawn_progress_ui(use_spinner, rx);

    info!(book_id = %args.book_id, theme = %options.theme, kindle = options.kindle, "conversion starting");
    let converter =
        Converter::new(transport, credentials, &settings, site, options).with_progress(Arc::new(tx));
    let outcome = converter
        .run(&args.book_id, &DirectorySink::new(&output_dir))
        .await;
    drop(converter);
    let _ = ui.await;

    if let Some(message) = &outcome.error {
        eprintln!("Error: {message}");
    }
    Ok(outcome.ok)
}
