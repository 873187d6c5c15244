use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::error;
use tokio_util::sync::CancellationToken;

use manga_downloader::config::{self, DownloaderConfig};
use manga_downloader::manga_catalog::{FeedOrder, FeedQuery};
use manga_downloader::{ChapterDownloader, DownloadError, DownloadRequest, DownloadStage, MangaCatalog};

/// Search MangaDex, list a title's chapters and download chapter pages as numbered images
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Root directory downloads are written under
    #[arg(short, long, global = true, env = "MANGA_DOWNLOAD_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Base URL of the MangaDex API
    #[arg(long, global = true, env = "MANGA_API_URL", default_value = config::DEFAULT_API_BASE_URL)]
    pub api_url: String,

    /// Pause between two page requests, in milliseconds
    #[arg(long, global = true, default_value = "200")]
    pub delay_ms: u64,

    /// Timeout for each upstream request, in seconds
    #[arg(long, global = true, default_value = "60")]
    pub timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search titles by name
    Search {
        title: String,
    },
    /// List the English chapters of a title
    Chapters {
        manga_id: String,

        #[arg(long, default_value = "100")]
        limit: u32,

        #[arg(long, default_value = "0")]
        offset: u32,

        #[arg(long, value_enum, default_value = "desc")]
        order: Order,
    },
    /// Download every page of one chapter
    Download {
        chapter_id: String,

        #[arg(long)]
        manga_title: String,

        #[arg(long)]
        chapter_title: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Order {
    Asc,
    Desc,
}

impl From<Order> for FeedOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Asc => FeedOrder::Asc,
            Order::Desc => FeedOrder::Desc,
        }
    }
}

impl Args {
    fn downloader_config(&self) -> DownloaderConfig {
        let root = self.output_dir.clone().unwrap_or_else(config::default_download_root);
        DownloaderConfig::new(root)
            .with_api_base_url(self.api_url.as_str())
            .with_page_delay(Duration::from_millis(self.delay_ms))
            .with_request_timeout(Duration::from_secs(self.timeout_secs))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("✗ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), DownloadError> {
    let config = args.downloader_config();

    match args.command {
        Command::Search { title } => {
            let catalog = MangaCatalog::new(&config)?;
            let results = catalog.search(&title).await?;
            if results.is_empty() {
                println!("No titles found for {:?}", title);
            }
            for manga in results {
                let year = manga.year.map(|y| y.to_string()).unwrap_or_else(|| String::from("----"));
                let status = manga.status.unwrap_or_default();
                println!("{}  {}  [{}] {}", manga.id, year, status, manga.title);
            }
        }
        Command::Chapters { manga_id, limit, offset, order } => {
            let catalog = MangaCatalog::new(&config)?;
            let manga = catalog.manga(&manga_id).await?;
            let query = FeedQuery { limit, offset, order: order.into() };
            let feed = catalog.chapter_feed(&manga_id, &query).await?;

            println!("Manga: {}", manga.title);
            println!("------------------");
            for chapter in &feed.chapters {
                println!("[{}] {}  {} ({} pages)", chapter.index, chapter.id, chapter.display_title(), chapter.pages);
            }
            println!("Showing {} of {} chapters", feed.chapters.len(), feed.total);
        }
        Command::Download { chapter_id, manga_title, chapter_title } => {
            let request = DownloadRequest::new(chapter_id, manga_title, chapter_title);
            let directory = download_with_progress(config, &request).await?;
            println!("✓ Saved to {}", directory.display());
        }
    }

    Ok(())
}

async fn download_with_progress(config: DownloaderConfig, request: &DownloadRequest) -> Result<PathBuf, DownloadError> {
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} pages {msg}"
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");

    let pb = ProgressBar::new(0);
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));

    let observer_pb = pb.clone();
    let downloader = ChapterDownloader::new(config)?.with_observer(move |stage| match stage {
        DownloadStage::Resolving => observer_pb.set_message("resolving chapter..."),
        DownloadStage::Preparing { directory } => {
            observer_pb.set_message(format!("writing to {}", directory.display()))
        }
        DownloadStage::FetchingPage { index, total } => {
            observer_pb.set_length(*total as u64);
            observer_pb.set_position(*index as u64);
        }
        DownloadStage::Done { .. } => observer_pb.finish_with_message("complete"),
        DownloadStage::Failed { page_index: Some(index) } => {
            observer_pb.abandon_with_message(format!("failed at page {}", index + 1))
        }
        DownloadStage::Failed { page_index: None } => observer_pb.abandon_with_message("failed"),
        DownloadStage::Cancelled { completed_pages } => {
            observer_pb.abandon_with_message(format!("cancelled after {} pages", completed_pages))
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = downloader.download_with_cancel(request, &cancel).await?;
    Ok(result.directory_path)
}
