use std::collections::BTreeSet;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::{Value, json};

use edgeset::domain::{Post, PostId};
use edgeset::error::EdgesetError;
use edgeset::http::{Transport, TransportFailure};
use edgeset::images::{AssetLocator, ImageFetcher, PostOutcome, shard, url_extension};
use edgeset::store::DatasetStore;

struct MockCdn {
    broken: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl MockCdn {
    fn new() -> Self {
        Self {
            broken: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn broken_at(url: &str) -> Self {
        Self {
            broken: Some(url.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Transport for MockCdn {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportFailure> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.broken.as_deref() == Some(url) {
            return Err(TransportFailure::Status(404));
        }
        Ok(format!("bytes of {url}").into_bytes())
    }
}

fn post(value: Value) -> Post {
    Post::try_from(value).unwrap()
}

fn gallery_posts(count: i64) -> Vec<Post> {
    (1..=count)
        .map(|id| post(json!({"id": id, "large_file_url": format!("https://cdn.test/data/{id}.jpg")})))
        .collect()
}

fn store() -> (tempfile::TempDir, DatasetStore) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("images")).unwrap();
    (temp, DatasetStore::new(root))
}

fn locator() -> AssetLocator {
    AssetLocator::FieldPriority(vec!["file_url".to_string(), "large_file_url".to_string()])
}

#[test]
fn seven_items_over_three_workers() {
    assert_eq!(shard(7, 3), vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]);
}

#[test]
fn shards_partition_the_index_range() {
    for len in 0..24 {
        for n in 1..9 {
            let shards = shard(len, n);
            assert_eq!(shards.len(), n.min(len));
            let mut seen = BTreeSet::new();
            for indices in &shards {
                assert!(!indices.is_empty());
                for &index in indices {
                    assert!(seen.insert(index), "index {index} assigned twice");
                }
            }
            assert_eq!(seen, (0..len).collect::<BTreeSet<_>>());
        }
    }
}

#[test]
fn locator_prefers_earlier_fields() {
    let locator = locator();
    let both = post(json!({"id": 1, "file_url": "https://a/1.png", "large_file_url": "https://a/1.jpg"}));
    let large_only = post(json!({"id": 2, "large_file_url": "https://a/2.jpg"}));
    let none = post(json!({"id": 3, "preview": "https://a/3.jpg"}));
    assert_eq!(locator.resolve(&both).as_deref(), Some("https://a/1.png"));
    assert_eq!(locator.resolve(&large_only).as_deref(), Some("https://a/2.jpg"));
    assert_eq!(locator.resolve(&none), None);
}

#[test]
fn flickr_static_url_from_server_and_secret() {
    let photo = post(json!({"id": "5321", "server": 65535, "secret": "ab12"}));
    assert_eq!(
        AssetLocator::FlickrStatic.resolve(&photo).as_deref(),
        Some("https://live.staticflickr.com/65535/5321_ab12.jpg")
    );
}

#[test]
fn extension_comes_from_last_path_segment() {
    assert_eq!(
        url_extension("https://cdn.test/original/d3/4f/d34f.jpeg?download=1").as_deref(),
        Some("jpeg")
    );
    assert_eq!(url_extension("https://cdn.test/v1.2/file").as_deref(), None);
}

#[test]
fn second_run_fetches_nothing() {
    let (_temp, store) = store();
    let posts = gallery_posts(9);
    let locator = locator();

    let first = MockCdn::new();
    let totals = ImageFetcher::new(&first, &store, &locator, 2)
        .fetch_images(&posts, 4)
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(totals.downloaded, 9);
    assert_eq!(first.call_count(), 9);

    let second = MockCdn::new();
    let totals = ImageFetcher::new(&second, &store, &locator, 2)
        .fetch_images(&posts, 4)
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(totals.downloaded, 0);
    assert_eq!(totals.skipped, 9);
    assert_eq!(second.call_count(), 0);

    let written = std::fs::read(store.image_path(&PostId::Int(4), "jpg").unwrap().as_std_path()).unwrap();
    assert_eq!(written, b"bytes of https://cdn.test/data/4.jpg");
}

#[test]
fn posts_without_asset_are_skipped() {
    let (_temp, store) = store();
    let locator = locator();
    let cdn = MockCdn::new();
    let fetcher = ImageFetcher::new(&cdn, &store, &locator, 1);
    store.ensure_root().unwrap();

    let outcome = fetcher.fetch_post(&post(json!({"id": 77}))).unwrap();
    assert_eq!(outcome, PostOutcome::NoAsset);
    assert_eq!(cdn.call_count(), 0);
}

#[test]
fn failing_item_only_stops_its_own_shard() {
    let (_temp, store) = store();
    let posts = gallery_posts(6);
    let locator = locator();
    // index 0 -> shard 0, which then never reaches indices 2 and 4
    let cdn = MockCdn::broken_at("https://cdn.test/data/1.jpg");

    let report = ImageFetcher::new(&cdn, &store, &locator, 3)
        .fetch_images(&posts, 2)
        .unwrap();
    let totals = report.totals();
    assert_eq!(totals.failed_shards, 1);
    assert_eq!(totals.downloaded, 3);
    assert!(report.shards[0].error.is_some());
    assert!(report.shards[1].error.is_none());
    for id in [2, 4, 6] {
        assert!(store.image_path(&PostId::Int(id), "jpg").unwrap().as_std_path().exists());
    }
    assert!(!store.image_path(&PostId::Int(3), "jpg").unwrap().as_std_path().exists());

    let err = report.into_result().unwrap_err();
    assert_matches!(err, EdgesetError::Transport { attempts: 3, .. });
}

#[test]
fn traversing_post_id_fails_its_shard_without_writing() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("images")).unwrap();
    let store = DatasetStore::new(root);
    store.ensure_root().unwrap();
    let locator = locator();
    let cdn = MockCdn::new();
    let posts = vec![post(json!({"id": "../escaped", "file_url": "https://cdn.test/a.jpg"}))];

    let report = ImageFetcher::new(&cdn, &store, &locator, 1)
        .fetch_images(&posts, 1)
        .unwrap();
    assert_matches!(report.shards[0].error, Some(EdgesetError::Metadata(_)));
    assert_eq!(cdn.call_count(), 0);
    assert!(!temp.path().join("escaped.jpg").exists());
    assert_eq!(std::fs::read_dir(store.root().as_std_path()).unwrap().count(), 0);
}

#[test]
fn zero_workers_is_rejected() {
    let (_temp, store) = store();
    let locator = locator();
    let cdn = MockCdn::new();
    let err = ImageFetcher::new(&cdn, &store, &locator, 1)
        .fetch_images(&gallery_posts(2), 0)
        .unwrap_err();
    assert_matches!(err, EdgesetError::InvalidConfig(_));
}
