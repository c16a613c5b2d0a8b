use std::thread;

use indicatif::{MultiProgress, ProgressBar};
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::Post;
use crate::error::EdgesetError;
use crate::http::{Transport, fetch_with_retries};
use crate::progress::shard_bar;
use crate::store::DatasetStore;

/// How the downloadable asset URL of a post is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLocator {
    /// First listed field holding a string wins.
    FieldPriority(Vec<String>),
    /// `https://live.staticflickr.com/{server}/{id}_{secret}.jpg`
    FlickrStatic,
}

impl AssetLocator {
    pub fn resolve(&self, post: &Post) -> Option<String> {
        match self {
            AssetLocator::FieldPriority(keys) => keys
                .iter()
                .find_map(|key| post.get_str(key))
                .map(str::to_string),
            AssetLocator::FlickrStatic => {
                let server = post.get_text("server")?;
                let secret = post.get_text("secret")?;
                Some(format!(
                    "https://live.staticflickr.com/{server}/{}_{secret}.jpg",
                    post.id()
                ))
            }
        }
    }
}

/// Extension of the final path segment of `url`, without the dot.
pub fn url_extension(url: &str) -> Option<String> {
    let segment = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))?,
        Err(_) => url.rsplit('/').next()?.to_string(),
    };
    let (_, extension) = segment.rsplit_once('.')?;
    if extension.is_empty() {
        return None;
    }
    Some(extension.to_string())
}

/// Stride partitioning: shard `i` of `n` holds indices `i, i + n, ...`.
/// The shard count is capped by `len`, so no shard is ever empty.
pub fn shard(len: usize, requested: usize) -> Vec<Vec<usize>> {
    let n = requested.min(len);
    (0..n).map(|i| (i..len).step_by(n).collect()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Downloaded,
    AlreadyPresent,
    NoAsset,
}

#[derive(Debug, Default)]
pub struct ShardReport {
    pub shard: usize,
    pub assigned: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub missing: usize,
    pub error: Option<EdgesetError>,
}

impl ShardReport {
    fn record(&mut self, outcome: PostOutcome) {
        match outcome {
            PostOutcome::Downloaded => self.downloaded += 1,
            PostOutcome::AlreadyPresent => self.skipped += 1,
            PostOutcome::NoAsset => self.missing += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchTotals {
    pub downloaded: usize,
    pub skipped: usize,
    pub missing: usize,
    pub failed_shards: usize,
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub shards: Vec<ShardReport>,
}

impl FetchReport {
    pub fn totals(&self) -> FetchTotals {
        self.shards
            .iter()
            .fold(FetchTotals::default(), |mut totals, shard| {
                totals.downloaded += shard.downloaded;
                totals.skipped += shard.skipped;
                totals.missing += shard.missing;
                totals.failed_shards += usize::from(shard.error.is_some());
                totals
            })
    }

    /// Totals when every shard finished, otherwise the first shard error.
    pub fn into_result(self) -> Result<FetchTotals, EdgesetError> {
        let totals = self.totals();
        match self.shards.into_iter().find_map(|shard| shard.error) {
            Some(err) => Err(err),
            None => Ok(totals),
        }
    }
}

/// Downloads post assets into a [`DatasetStore`], one worker thread per
/// shard. Workers share nothing but the filesystem, and since shards are
/// disjoint so are the file names they write.
pub struct ImageFetcher<'a, T: Transport + ?Sized> {
    transport: &'a T,
    store: &'a DatasetStore,
    locator: &'a AssetLocator,
    max_retries: usize,
}

impl<'a, T: Transport + ?Sized> ImageFetcher<'a, T> {
    pub fn new(
        transport: &'a T,
        store: &'a DatasetStore,
        locator: &'a AssetLocator,
        max_retries: usize,
    ) -> Self {
        Self {
            transport,
            store,
            locator,
            max_retries,
        }
    }

    pub fn fetch_images(&self, posts: &[Post], n_jobs: usize) -> Result<FetchReport, EdgesetError> {
        if n_jobs == 0 {
            return Err(EdgesetError::InvalidConfig(
                "n_jobs must be at least 1".to_string(),
            ));
        }
        self.store.ensure_root()?;
        let shards = shard(posts.len(), n_jobs);
        info!(posts = posts.len(), workers = shards.len(), "downloading images");

        let multi = MultiProgress::new();
        let reports = thread::scope(|scope| {
            let handles: Vec<_> = shards
                .iter()
                .enumerate()
                .map(|(index, indices)| {
                    let bar = shard_bar(&multi, index, indices.len());
                    scope.spawn(move || {
                        self.fetch_shard(index, indices.iter().map(|&i| &posts[i]), &bar)
                    })
                })
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(index, handle)| {
                    handle.join().unwrap_or_else(|_| ShardReport {
                        shard: index,
                        assigned: shards[index].len(),
                        error: Some(EdgesetError::WorkerPanic { shard: index }),
                        ..Default::default()
                    })
                })
                .collect::<Vec<_>>()
        });

        let report = FetchReport { shards: reports };
        let totals = report.totals();
        info!(
            downloaded = totals.downloaded,
            skipped = totals.skipped,
            missing = totals.missing,
            failed_shards = totals.failed_shards,
            "image download finished"
        );
        Ok(report)
    }

    /// Processes posts in order and stops at the first error, which is
    /// kept in the report instead of being raised.
    pub fn fetch_shard<'p, I>(&self, index: usize, posts: I, progress: &ProgressBar) -> ShardReport
    where
        I: ExactSizeIterator<Item = &'p Post>,
    {
        let mut report = ShardReport {
            shard: index,
            assigned: posts.len(),
            ..Default::default()
        };
        for post in posts {
            match self.fetch_post(post) {
                Ok(outcome) => {
                    report.record(outcome);
                    progress.inc(1);
                }
                Err(err) => {
                    warn!(shard = index, post = %post.id(), "worker stopped: {err}");
                    progress.abandon_with_message("failed");
                    report.error = Some(err);
                    break;
                }
            }
        }
        if report.error.is_none() {
            progress.finish_with_message("done");
        }
        debug!(
            shard = index,
            downloaded = report.downloaded,
            skipped = report.skipped,
            missing = report.missing,
            "shard finished"
        );
        report
    }

    pub fn fetch_post(&self, post: &Post) -> Result<PostOutcome, EdgesetError> {
        let Some(url) = self.locator.resolve(post) else {
            debug!(post = %post.id(), "no asset url, skipping");
            return Ok(PostOutcome::NoAsset);
        };
        let Some(extension) = url_extension(&url) else {
            debug!(post = %post.id(), %url, "asset url has no extension, skipping");
            return Ok(PostOutcome::NoAsset);
        };
        let path = self.store.image_path(post.id(), &extension)?;
        if path.as_std_path().exists() {
            return Ok(PostOutcome::AlreadyPresent);
        }

        let body = fetch_with_retries(self.transport, &url, self.max_retries)?;
        DatasetStore::write_bytes_atomic(&path, &body)?;
        debug!(post = %post.id(), %path, bytes = body.len(), "image saved");
        Ok(PostOutcome::Downloaded)
    }
}
