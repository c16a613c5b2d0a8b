use tracing::info;

use crate::domain::{MetadataSet, Post};
use crate::error::EdgesetError;
use crate::store::DatasetStore;

/// A listing walker for one remote platform. Implementations return the
/// merged, deduplicated set and leave persistence to the caller.
pub trait Paginator {
    fn platform(&self) -> &'static str;
    fn paginate(&self) -> Result<MetadataSet, EdgesetError>;
}

/// Returns the saved metadata when `meta.json` exists, otherwise walks the
/// listing and saves the result once it is complete.
pub fn load_or_paginate<P>(store: &DatasetStore, paginator: &P) -> Result<MetadataSet, EdgesetError>
where
    P: Paginator + ?Sized,
{
    if store.metadata_exists() {
        let metadata = store.load_metadata()?;
        info!(
            path = %store.metadata_path(),
            posts = metadata.len(),
            "saved posts metadata found, skipping pagination"
        );
        return Ok(metadata);
    }
    paginate_and_save(store, paginator)
}

pub fn paginate_and_save<P>(
    store: &DatasetStore,
    paginator: &P,
) -> Result<MetadataSet, EdgesetError>
where
    P: Paginator + ?Sized,
{
    let metadata = paginator.paginate()?;
    info!(
        platform = paginator.platform(),
        posts = metadata.len(),
        path = %store.metadata_path(),
        "saving posts metadata"
    );
    store.write_metadata(&metadata)?;
    Ok(metadata)
}

/// Decodes a JSON array of post objects.
pub fn parse_posts(items: Vec<serde_json::Value>) -> Result<Vec<Post>, EdgesetError> {
    items.into_iter().map(Post::try_from).collect()
}
