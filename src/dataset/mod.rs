//! Edge-map / photograph pairs built on demand from a directory of images.

pub mod edges;
pub mod transforms;

use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageReader, RgbImage};
use ndarray::Array3;
use rand::Rng;

use crate::error::EdgesetError;

pub use edges::Thresholds;
use transforms::{PostTransform, PreTransform};

/// CHW `f32` image tensor.
pub type Tensor = Array3<f32>;

pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Random-access dataset of `(input, target)` pairs.
///
/// The index is the sorted list of image files directly inside the
/// directory, so index `i` names the same file across runs as long as the
/// directory is unchanged. Each access decodes its file afresh and
/// mutates nothing, so one dataset can serve several loader threads.
#[derive(Debug, Clone)]
pub struct EdgesDataset {
    dir: PathBuf,
    ids: Vec<PathBuf>,
    pre_transform: PreTransform,
    input_post_transform: PostTransform,
    target_post_transform: PostTransform,
    thresholds: Thresholds,
}

impl EdgesDataset {
    pub fn new(
        dir: impl AsRef<Path>,
        pre_transform: PreTransform,
        input_post_transform: PostTransform,
        target_post_transform: PostTransform,
        thresholds: Thresholds,
    ) -> Result<Self, EdgesetError> {
        let dir = fs::canonicalize(dir.as_ref()).map_err(|err| {
            EdgesetError::Filesystem(format!("{}: {err}", dir.as_ref().display()))
        })?;
        let ids = index_directory(&dir)?;
        tracing::debug!(dir = %dir.display(), images = ids.len(), "dataset indexed");
        Ok(Self {
            dir,
            ids,
            pre_transform,
            input_post_transform,
            target_post_transform,
            thresholds,
        })
    }

    /// Dataset with default post-transforms and thresholds.
    pub fn with_defaults(
        dir: impl AsRef<Path>,
        pre_transform: PreTransform,
    ) -> Result<Self, EdgesetError> {
        Self::new(
            dir,
            pre_transform,
            PostTransform::default_input(),
            PostTransform::default_target(),
            Thresholds::default(),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Absolute image paths in index order.
    pub fn ids(&self) -> &[PathBuf] {
        &self.ids
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn pre_transform(&self) -> &PreTransform {
        &self.pre_transform
    }

    pub fn get(&self, index: usize) -> Result<(Tensor, Tensor), EdgesetError> {
        self.get_with_rng(index, &mut rand::thread_rng())
    }

    pub fn get_with_rng<R: Rng + ?Sized>(
        &self,
        index: usize,
        rng: &mut R,
    ) -> Result<(Tensor, Tensor), EdgesetError> {
        let (input, target) = self.pair_images_with_rng(index, rng)?;
        let input = self.input_post_transform.apply(&input)?;
        let target = self.target_post_transform.apply(&target)?;
        Ok((input, target))
    }

    /// The pair before post-transforms: inverted edge map and the
    /// pre-transformed colour image.
    pub fn pair_images(&self, index: usize) -> Result<(GrayImage, RgbImage), EdgesetError> {
        self.pair_images_with_rng(index, &mut rand::thread_rng())
    }

    pub fn pair_images_with_rng<R: Rng + ?Sized>(
        &self,
        index: usize,
        rng: &mut R,
    ) -> Result<(GrayImage, RgbImage), EdgesetError> {
        let path = self.ids.get(index).ok_or(EdgesetError::IndexOutOfRange {
            index,
            len: self.ids.len(),
        })?;
        let target = self.pre_transform.apply_with_rng(load_rgb(path)?, rng)?;
        let mut input = edges::canny(&target, self.thresholds);
        edges::invert(&mut input);
        Ok((input, target))
    }
}

/// Decodes any supported format into 8-bit RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage, EdgesetError> {
    let decode_error = |message: String| EdgesetError::Decode {
        path: path.to_path_buf(),
        message,
    };
    let image = ImageReader::open(path)
        .map_err(|err| decode_error(err.to_string()))?
        .with_guessed_format()
        .map_err(|err| decode_error(err.to_string()))?
        .decode()
        .map_err(|err| decode_error(err.to_string()))?;
    Ok(image.to_rgb8())
}

/// Image files directly inside `dir`, sorted by file name.
pub fn index_directory(dir: &Path) -> Result<Vec<PathBuf>, EdgesetError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| EdgesetError::Filesystem(format!("{}: {err}", dir.display())))?;
    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| EdgesetError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if path.is_file() && has_image_extension(&path) {
            ids.push(path);
        }
    }
    ids.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(ids)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
