use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dataset::transforms::{Geometric, PostTransform, PreTransform};
use crate::dataset::{EdgesDataset, Thresholds};
use crate::error::EdgesetError;
use crate::images::AssetLocator;

pub const DEFAULT_DANBOORU_API: &str = "https://danbooru.donmai.us";
pub const DEFAULT_FLICKR_API: &str = "https://api.flickr.com/services/rest/";
pub const FLICKR_API_KEY_ENV: &str = "FLICKR_API_KEY";

/// Download config document as written by users. Which keys are required
/// depends on the platform it is resolved for.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DownloadConfigFile {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub tags_and: Vec<String>,
    #[serde(default)]
    pub tags_or: Vec<String>,
    #[serde(default)]
    pub ratings: Vec<String>,
    #[serde(default)]
    pub file_url_priority: Option<Vec<String>>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DanbooruConfig {
    pub root: Utf8PathBuf,
    pub tags_and: Vec<String>,
    pub tags_or: Vec<String>,
    pub ratings: Vec<String>,
    pub file_url_priority: Vec<String>,
    pub api_url: String,
}

impl DanbooruConfig {
    pub fn locator(&self) -> AssetLocator {
        AssetLocator::FieldPriority(self.file_url_priority.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FlickrConfig {
    pub root: Utf8PathBuf,
    pub text: String,
    pub sort: String,
    pub pages: u32,
    pub per_page: u32,
    pub api_key: String,
    pub api_url: String,
    pub locator: AssetLocator,
}

/// Dataset config document for the pairing stage.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DatasetConfigFile {
    #[serde(default)]
    pub images_dir: Option<String>,
    #[serde(default)]
    pub train_dir: Option<String>,
    #[serde(default)]
    pub valid_dir: Option<String>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub thresholds: Option<[f32; 2]>,
    #[serde(default)]
    pub train_pre_transform: Option<PreTransform>,
    #[serde(default)]
    pub valid_pre_transform: Option<PreTransform>,
}

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub train_dir: PathBuf,
    pub valid_dir: PathBuf,
    pub size: u32,
    pub thresholds: Thresholds,
    pub train_pre_transform: PreTransform,
    pub valid_pre_transform: PreTransform,
}

/// Resize to `size` on the shorter side, random crop and random flip.
pub fn default_train_pre_transform(size: u32) -> PreTransform {
    PreTransform::new(vec![
        Geometric::Resize { shorter_side: size },
        Geometric::RandomCrop {
            width: size,
            height: size,
        },
        Geometric::RandomHorizontalFlip { p: 0.5 },
    ])
}

/// Resize to `size` on the shorter side and centre crop.
pub fn default_valid_pre_transform(size: u32) -> PreTransform {
    PreTransform::new(vec![
        Geometric::Resize { shorter_side: size },
        Geometric::CenterCrop {
            width: size,
            height: size,
        },
    ])
}

impl DatasetConfig {
    pub fn train_dataset(&self) -> Result<EdgesDataset, EdgesetError> {
        EdgesDataset::new(
            &self.train_dir,
            self.train_pre_transform.clone(),
            PostTransform::default_input(),
            PostTransform::default_target(),
            self.thresholds,
        )
    }

    pub fn valid_dataset(&self) -> Result<EdgesDataset, EdgesetError> {
        EdgesDataset::new(
            &self.valid_dir,
            self.valid_pre_transform.clone(),
            PostTransform::default_input(),
            PostTransform::default_target(),
            self.thresholds,
        )
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn read<T: DeserializeOwned>(path: &Path) -> Result<T, EdgesetError> {
        let content =
            fs::read_to_string(path).map_err(|_| EdgesetError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| EdgesetError::ConfigParse(err.to_string()))
    }

    pub fn resolve_danbooru(path: &Path) -> Result<DanbooruConfig, EdgesetError> {
        Self::resolve_danbooru_config(Self::read(path)?)
    }

    pub fn resolve_flickr(path: &Path) -> Result<FlickrConfig, EdgesetError> {
        Self::resolve_flickr_config(Self::read(path)?)
    }

    pub fn resolve_dataset(path: &Path) -> Result<DatasetConfig, EdgesetError> {
        Self::resolve_dataset_config(Self::read(path)?)
    }

    pub fn resolve_danbooru_config(
        config: DownloadConfigFile,
    ) -> Result<DanbooruConfig, EdgesetError> {
        let root = required_path(config.path)?;
        let file_url_priority = config
            .file_url_priority
            .ok_or_else(|| EdgesetError::MissingConfigKey("file_url_priority".to_string()))?;
        if file_url_priority.is_empty() {
            return Err(EdgesetError::InvalidConfig(
                "file_url_priority must name at least one field".to_string(),
            ));
        }
        let api_url = config
            .api_url
            .unwrap_or_else(|| DEFAULT_DANBOORU_API.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(DanbooruConfig {
            root,
            tags_and: config.tags_and,
            tags_or: config.tags_or,
            ratings: config.ratings,
            file_url_priority,
            api_url,
        })
    }

    pub fn resolve_flickr_config(config: DownloadConfigFile) -> Result<FlickrConfig, EdgesetError> {
        let root = required_path(config.path)?;
        let text = config
            .text
            .ok_or_else(|| EdgesetError::MissingConfigKey("text".to_string()))?;
        let api_key = config
            .api_key
            .or_else(|| std::env::var(FLICKR_API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| EdgesetError::MissingConfigKey("api_key".to_string()))?;
        let pages = config.pages.unwrap_or(1);
        let per_page = config.per_page.unwrap_or(100);
        if pages == 0 {
            return Err(EdgesetError::InvalidConfig("pages must be positive".to_string()));
        }
        if !(1..=500).contains(&per_page) {
            return Err(EdgesetError::InvalidConfig(format!(
                "per_page must be within 1..=500, got {per_page}"
            )));
        }
        let locator = match config.file_url_priority {
            Some(keys) if !keys.is_empty() => AssetLocator::FieldPriority(keys),
            _ => AssetLocator::FlickrStatic,
        };

        Ok(FlickrConfig {
            root,
            text,
            sort: config.sort.unwrap_or_else(|| "relevance".to_string()),
            pages,
            per_page,
            api_key,
            api_url: config
                .api_url
                .unwrap_or_else(|| DEFAULT_FLICKR_API.to_string()),
            locator,
        })
    }

    pub fn resolve_dataset_config(
        config: DatasetConfigFile,
    ) -> Result<DatasetConfig, EdgesetError> {
        let images_dir = config.images_dir.map(PathBuf::from);
        let split_dir = |explicit: Option<String>, split: &str| match (explicit, &images_dir) {
            (Some(dir), _) => Ok(PathBuf::from(dir)),
            (None, Some(root)) => Ok(root.join(split)),
            (None, None) => Err(EdgesetError::MissingConfigKey(format!(
                "images_dir (or {split}_dir)"
            ))),
        };
        let train_dir = split_dir(config.train_dir, "train")?;
        let valid_dir = split_dir(config.valid_dir, "valid")?;

        let size = config.size.unwrap_or(256);
        if size == 0 {
            return Err(EdgesetError::InvalidConfig("size must be positive".to_string()));
        }
        let [low, high] = config.thresholds.unwrap_or([100.0, 200.0]);

        Ok(DatasetConfig {
            train_dir,
            valid_dir,
            size,
            thresholds: Thresholds::new(low, high)?,
            train_pre_transform: config
                .train_pre_transform
                .unwrap_or_else(|| default_train_pre_transform(size)),
            valid_pre_transform: config
                .valid_pre_transform
                .unwrap_or_else(|| default_valid_pre_transform(size)),
        })
    }
}

fn required_path(path: Option<String>) -> Result<Utf8PathBuf, EdgesetError> {
    let path = path
        .filter(|path| !path.trim().is_empty())
        .ok_or_else(|| EdgesetError::MissingConfigKey("path".to_string()))?;
    // "/" and "//" name the filesystem root, not an empty path
    match path.trim_end_matches('/') {
        "" => Ok(Utf8PathBuf::from("/")),
        trimmed => Ok(Utf8PathBuf::from(trimmed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn danbooru_defaults() {
        let config = DownloadConfigFile {
            path: Some("data/anime/".to_string()),
            file_url_priority: Some(vec!["large_file_url".to_string()]),
            ..Default::default()
        };

        let resolved = ConfigLoader::resolve_danbooru_config(config).unwrap();
        assert_eq!(resolved.root.as_str(), "data/anime");
        assert_eq!(resolved.api_url, DEFAULT_DANBOORU_API);
        assert!(resolved.tags_or.is_empty());
    }

    #[test]
    fn trailing_slashes_are_trimmed_down_to_root() {
        let path = |raw: &str| required_path(Some(raw.to_string())).unwrap();
        assert_eq!(path("data/anime//").as_str(), "data/anime");
        assert_eq!(path("/").as_str(), "/");
        assert_eq!(path("///").as_str(), "/");
        assert_eq!(path("/srv/").as_str(), "/srv");
        assert!(required_path(Some("  ".to_string())).is_err());
    }
}
