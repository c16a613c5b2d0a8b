//! Paired-image dataset tooling: a resumable, parallel gallery downloader
//! and an edge-map / photograph pairing dataset for image-to-image
//! translation training.

pub mod config;
pub mod danbooru;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod export;
pub mod flickr;
pub mod http;
pub mod images;
pub mod metadata;
pub mod progress;
pub mod store;
