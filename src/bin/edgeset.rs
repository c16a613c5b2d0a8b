use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use edgeset::config::ConfigLoader;
use edgeset::danbooru::DanbooruPaginator;
use edgeset::error::EdgesetError;
use edgeset::export::{ExportOptions, export_pairs};
use edgeset::flickr::FlickrPaginator;
use edgeset::http::{HttpTransport, TransportOptions};
use edgeset::images::{AssetLocator, ImageFetcher};
use edgeset::metadata::{Paginator, load_or_paginate};
use edgeset::store::DatasetStore;

#[derive(Parser)]
#[command(name = "edgeset")]
#[command(about = "Download gallery images and build edge-map training pairs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download posts metadata and images from a gallery")]
    Download(DownloadArgs),
    #[command(about = "Write dataset pairs as PNG files")]
    Export(ExportArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum Platform {
    Danbooru,
    Flickr,
}

#[derive(Args)]
struct DownloadArgs {
    #[arg(value_enum)]
    platform: Platform,

    #[arg(short, long, help = "Download config JSON")]
    config: PathBuf,

    #[arg(short, long, default_value = "none", help = "Proxy address:port, or none")]
    proxy: String,

    #[arg(long = "n_jobs", alias = "n-jobs", default_value_t = 4)]
    n_jobs: usize,

    #[arg(long = "n_retries", alias = "n-retries", default_value_t = 10)]
    n_retries: usize,

    #[arg(long = "retry_delay_ms", alias = "retry-delay-ms", default_value_t = 0)]
    retry_delay_ms: u64,

    #[arg(long = "timeout_secs", alias = "timeout-secs")]
    timeout_secs: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Split {
    Train,
    Valid,
}

#[derive(Clone, Copy, ValueEnum)]
enum YesNo {
    Yes,
    No,
}

#[derive(Args)]
struct ExportArgs {
    #[arg(short, long, help = "Dataset config JSON")]
    config: PathBuf,

    #[arg(long, value_enum, default_value = "valid")]
    split: Split,

    #[arg(short = 'd', long = "data_dir", alias = "data-dir", help = "Override the split directory")]
    data_dir: Option<PathBuf>,

    #[arg(short, long = "save_dir", alias = "save-dir", default_value = "resources/pairs")]
    save_dir: PathBuf,

    #[arg(short, long, help = "JSON list of file stems to export")]
    ids: Option<PathBuf>,

    #[arg(long = "with_inputs", alias = "with-inputs")]
    with_inputs: bool,

    #[arg(long, value_enum, default_value = "yes")]
    unnorm: YesNo,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<EdgesetError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &EdgesetError) -> u8 {
    match error {
        EdgesetError::ConfigRead(_)
        | EdgesetError::ConfigParse(_)
        | EdgesetError::MissingConfigKey(_)
        | EdgesetError::InvalidConfig(_) => 2,
        EdgesetError::Transport { .. } | EdgesetError::HttpClient(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Download(args) => run_download(args),
        Commands::Export(args) => run_export(args),
    }
}

fn run_download(args: DownloadArgs) -> miette::Result<()> {
    let options = TransportOptions {
        timeout: args.timeout_secs.map(Duration::from_secs),
        retry_delay: Duration::from_millis(args.retry_delay_ms),
        ..Default::default()
    }
    .with_proxy_arg(&args.proxy);
    let transport = HttpTransport::new(&options)?;

    match args.platform {
        Platform::Danbooru => {
            let config = ConfigLoader::resolve_danbooru(&args.config)?;
            let paginator = DanbooruPaginator::new(&config, &transport, args.n_retries);
            let store = DatasetStore::new(config.root.clone());
            download(&store, &paginator, &transport, &config.locator(), &args)
        }
        Platform::Flickr => {
            let config = ConfigLoader::resolve_flickr(&args.config)?;
            let paginator = FlickrPaginator::new(&config, &transport, args.n_retries);
            let store = DatasetStore::new(config.root.clone());
            download(&store, &paginator, &transport, &config.locator, &args)
        }
    }
}

fn download(
    store: &DatasetStore,
    paginator: &dyn Paginator,
    transport: &HttpTransport,
    locator: &AssetLocator,
    args: &DownloadArgs,
) -> miette::Result<()> {
    let metadata = load_or_paginate(store, paginator)?;
    let fetcher = ImageFetcher::new(transport, store, locator, args.n_retries);
    let totals = fetcher
        .fetch_images(metadata.posts(), args.n_jobs)?
        .into_result()?;
    println!(
        "downloaded {}, already present {}, without asset {}",
        totals.downloaded, totals.skipped, totals.missing
    );
    Ok(())
}

fn run_export(args: ExportArgs) -> miette::Result<()> {
    let mut config = ConfigLoader::resolve_dataset(&args.config)?;
    if let Some(dir) = args.data_dir {
        match args.split {
            Split::Train => config.train_dir = dir,
            Split::Valid => config.valid_dir = dir,
        }
    }
    let dataset = match args.split {
        Split::Train => config.train_dataset()?,
        Split::Valid => config.valid_dataset()?,
    };
    info!(images = dataset.len(), dir = %dataset.dir().display(), "dataset loaded");

    let ids = match args.ids {
        Some(path) => {
            let ids: Vec<String> = ConfigLoader::read(&path)?;
            Some(ids.into_iter().collect::<HashSet<_>>())
        }
        None => None,
    };
    let options = ExportOptions {
        unnorm: matches!(args.unnorm, YesNo::Yes),
        with_inputs: args.with_inputs,
        ids,
    };
    let summary = export_pairs(&dataset, &args.save_dir, &options)?;
    println!("exported {} pair(s) to {}", summary.written, args.save_dir.display());
    Ok(())
}
