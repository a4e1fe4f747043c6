use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use tiktok_archive::app::{App, check_inputs};
use tiktok_archive::config::{ConfigLoader, FetcherKind, RunConfig};
use tiktok_archive::error::ArchiveError;
use tiktok_archive::fetch::{Fetcher, HttpFetcher, YtDlpFetcher};
use tiktok_archive::output::{JsonOutput, OutputMode, TextOutput};

#[derive(Parser)]
#[command(name = "tiktok-archive")]
#[command(about = "Download every video listed in a TikTok data export")]
#[command(version, author)]
struct Cli {
    /// JSON config file (defaults to ./tiktok-archive.json when present)
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    #[arg(long)]
    export: Option<Utf8PathBuf>,

    /// Netscape-format cookie file
    #[arg(long)]
    cookies: Option<Utf8PathBuf>,

    #[arg(long)]
    output: Option<Utf8PathBuf>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    retries: Option<u32>,

    #[arg(long)]
    backoff_secs: Option<u64>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long, value_enum)]
    fetcher: Option<FetcherKind>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(path) = &self.export {
            config.export_path = path.clone();
        }
        if let Some(path) = &self.cookies {
            config.cookie_path = path.clone();
        }
        if let Some(path) = &self.output {
            config.output_root = path.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if let Some(secs) = self.backoff_secs {
            config.backoff_secs = secs;
        }
        if let Some(secs) = self.timeout_secs {
            config.fetch_timeout_secs = secs;
        }
        if let Some(fetcher) = self.fetcher {
            config.fetcher = fetcher;
        }
        config
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ArchiveError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ArchiveError) -> u8 {
    match error {
        ArchiveError::MissingAuthContext(_) | ArchiveError::MissingExport(_) => 2,
        ArchiveError::MissingTool(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let config = cli.apply(config).validate()?;

    tracing::info!(
        export = %config.export_path,
        cookies = %config.cookie_path,
        output = %config.output_root,
        workers = config.workers,
        "starting run"
    );
    start(config, output_mode)
}

fn start(config: RunConfig, output_mode: OutputMode) -> miette::Result<()> {
    // Missing inputs outrank a missing download tool.
    check_inputs(&config)?;
    match config.fetcher {
        FetcherKind::YtDlp => {
            let fetcher = YtDlpFetcher::new()?;
            if let Some(version) = fetcher.version() {
                tracing::info!(%version, "using yt-dlp");
            }
            run_archive(config, fetcher, output_mode)
        }
        FetcherKind::Http => {
            let fetcher = HttpFetcher::new(config.fetch_timeout())?;
            run_archive(config, fetcher, output_mode)
        }
    }
}

fn run_archive<F: Fetcher>(
    config: RunConfig,
    fetcher: F,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let app = App::new(config, fetcher);
    match output_mode {
        OutputMode::Json => {
            let summary = app.run(&JsonOutput)?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
        }
        OutputMode::Text => {
            let summary = app.run(&TextOutput)?;
            TextOutput::print_summary(&summary).into_diagnostic()?;
        }
    }
    Ok(())
}
