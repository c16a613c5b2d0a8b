use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::config::FlickrConfig;
use crate::domain::{MetadataSet, Post};
use crate::error::EdgesetError;
use crate::http::{Transport, fetch_with_retries_as};
use crate::metadata::{Paginator, parse_posts};
use crate::progress::page_bar;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    stat: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    photos: Option<PhotoPage>,
}

#[derive(Debug, Deserialize)]
struct PhotoPage {
    #[serde(default)]
    photo: Vec<Value>,
}

/// Page-numbered `flickr.photos.search` walker.
///
/// Stops after `pages` pages or on the first empty page. A page made only
/// of known photos is merged as a no-op and the walk goes on. The remote
/// page count is never trusted for termination.
pub struct FlickrPaginator<'a, T: Transport + ?Sized> {
    config: &'a FlickrConfig,
    transport: &'a T,
    max_retries: usize,
}

impl<'a, T: Transport + ?Sized> FlickrPaginator<'a, T> {
    pub fn new(config: &'a FlickrConfig, transport: &'a T, max_retries: usize) -> Self {
        Self {
            config,
            transport,
            max_retries,
        }
    }

    pub fn page_url(&self, page: u32) -> Result<String, EdgesetError> {
        let mut url = Url::parse(&self.config.api_url).map_err(|err| {
            EdgesetError::InvalidConfig(format!("api_url {}: {err}", self.config.api_url))
        })?;
        url.query_pairs_mut()
            .append_pair("method", "flickr.photos.search")
            .append_pair("api_key", &self.config.api_key)
            .append_pair("text", &self.config.text)
            .append_pair("sort", &self.config.sort)
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &self.config.per_page.to_string())
            .append_pair("format", "json")
            .append_pair("nojsoncallback", "1");
        Ok(url.into())
    }

    fn fetch_page(&self, page: u32) -> Result<Vec<Post>, EdgesetError> {
        let url = self.page_url(page)?;
        let shown_url = redact_api_key(&url);
        let body = fetch_with_retries_as(self.transport, &url, &shown_url, self.max_retries)?;
        let response: SearchResponse = serde_json::from_slice(&body)
            .map_err(|err| EdgesetError::Metadata(format!("flickr page {page}: {err}")))?;
        if response.stat != "ok" {
            return Err(EdgesetError::Transport {
                url: shown_url,
                attempts: 1,
                cause: response
                    .message
                    .unwrap_or_else(|| format!("flickr stat {}", response.stat)),
            });
        }
        let items = response.photos.map(|photos| photos.photo).unwrap_or_default();
        parse_posts(items)
    }
}

impl<T: Transport + ?Sized> Paginator for FlickrPaginator<'_, T> {
    fn platform(&self) -> &'static str {
        "flickr"
    }

    fn paginate(&self) -> Result<MetadataSet, EdgesetError> {
        let mut metadata = MetadataSet::new();
        let bar = page_bar(
            format!("flickr {}", self.config.text),
            u64::from(self.config.pages),
        );
        for page in 1..=self.config.pages {
            let photos = self.fetch_page(page)?;
            bar.inc(1);
            if photos.is_empty() {
                debug!(page, "empty page, search exhausted");
                break;
            }
            let fetched = photos.len();
            let added = metadata.merge(photos);
            debug!(page, fetched, added, "page merged");
        }
        bar.finish_and_clear();
        info!(text = %self.config.text, total = metadata.len(), "search exhausted");
        Ok(metadata)
    }
}

fn redact_api_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(key, value)| {
                    let value = if key == "api_key" {
                        "***".to_string()
                    } else {
                        value.into_owned()
                    };
                    (key.into_owned(), value)
                })
                .collect();
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
            parsed.into()
        }
        Err(_) => url.to_string(),
    }
}
