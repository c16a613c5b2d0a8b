use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::config::DanbooruConfig;
use crate::domain::{MetadataSet, Post, PostId};
use crate::error::EdgesetError;
use crate::http::{Transport, fetch_with_retries};
use crate::metadata::{Paginator, parse_posts};
use crate::progress::page_spinner;

/// Fixed listing page size.
pub const PAGE_LIMIT: usize = 200;

/// Walks `posts.json` with a "before id" cursor, once per OR-tag
/// partition. Offsets are not stable while new posts arrive, so each page
/// after the first is addressed by the last id of the previous one.
pub struct DanbooruPaginator<'a, T: Transport + ?Sized> {
    config: &'a DanbooruConfig,
    transport: &'a T,
    max_retries: usize,
}

impl<'a, T: Transport + ?Sized> DanbooruPaginator<'a, T> {
    pub fn new(config: &'a DanbooruConfig, transport: &'a T, max_retries: usize) -> Self {
        Self {
            config,
            transport,
            max_retries,
        }
    }

    /// The query partitions, `None` standing for "no extra tag".
    pub fn partitions(&self) -> Vec<Option<&str>> {
        if self.config.tags_or.is_empty() {
            vec![None]
        } else {
            self.config.tags_or.iter().map(|tag| Some(tag.as_str())).collect()
        }
    }

    pub fn page_url(
        &self,
        partition: Option<&str>,
        before: Option<&PostId>,
    ) -> Result<String, EdgesetError> {
        let mut tags: Vec<String> = self.config.tags_and.clone();
        if let Some(tag) = partition {
            tags.push(tag.to_string());
        }
        if !self.config.ratings.is_empty() {
            tags.push(format!("rating:{}", self.config.ratings.join(",")));
        }

        let endpoint = format!("{}/posts.json", self.config.api_url);
        let mut url = Url::parse(&endpoint)
            .map_err(|err| EdgesetError::InvalidConfig(format!("api_url {endpoint}: {err}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &PAGE_LIMIT.to_string());
            query.append_pair("tags", &tags.join(" "));
            if let Some(id) = before {
                query.append_pair("page", &format!("b{id}"));
            }
        }
        Ok(url.into())
    }

    fn fetch_page(&self, url: &str) -> Result<Vec<Post>, EdgesetError> {
        let body = fetch_with_retries(self.transport, url, self.max_retries)?;
        let items: Vec<Value> = serde_json::from_slice(&body)
            .map_err(|err| EdgesetError::Metadata(format!("{url}: {err}")))?;
        parse_posts(items)
    }

    fn paginate_partition(
        &self,
        partition: Option<&str>,
        metadata: &mut MetadataSet,
    ) -> Result<(), EdgesetError> {
        let mut cursor: Option<PostId> = None;
        let mut pages = 0usize;
        let spinner = page_spinner(format!("danbooru {}", partition.unwrap_or("all")));
        loop {
            let url = self.page_url(partition, cursor.as_ref())?;
            let page = self.fetch_page(&url)?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id().clone());
            let fetched = page.len();
            let added = metadata.merge(page);
            pages += 1;
            spinner.inc(1);
            debug!(partition = partition.unwrap_or("-"), pages, fetched, added, "page merged");
        }
        spinner.finish_and_clear();
        info!(
            partition = partition.unwrap_or("-"),
            pages,
            total = metadata.len(),
            "partition exhausted"
        );
        Ok(())
    }
}

impl<T: Transport + ?Sized> Paginator for DanbooruPaginator<'_, T> {
    fn platform(&self) -> &'static str {
        "danbooru"
    }

    fn paginate(&self) -> Result<MetadataSet, EdgesetError> {
        let mut metadata = MetadataSet::new();
        for partition in self.partitions() {
            self.paginate_partition(partition, &mut metadata)?;
        }
        Ok(metadata)
    }
}
