use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use tracing::{debug, info};

use crate::dataset::{EdgesDataset, Tensor};
use crate::error::EdgesetError;
use crate::store::DatasetStore;

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Map `[-1, 1]` tensors back to `[0, 1]` before quantising.
    pub unnorm: bool,
    /// Also write the edge map as `{basename}_edges.png`.
    pub with_inputs: bool,
    /// Restrict the export to these file stems.
    pub ids: Option<HashSet<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: usize,
    pub filtered: usize,
}

/// Quantises a 1- or 3-channel CHW tensor into an 8-bit image, clipping
/// to `[0, 1]`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn tensor_to_image(tensor: &Tensor, unnorm: bool) -> Result<DynamicImage, EdgesetError> {
    let (channels, height, width) = tensor.dim();
    let quantise = |value: f32| {
        let value = if unnorm { value / 2.0 + 0.5 } else { value };
        (value.clamp(0.0, 1.0) * 255.0).round() as u8
    };
    let (width_u32, height_u32) = (width as u32, height as u32);
    match channels {
        1 => Ok(DynamicImage::ImageLuma8(GrayImage::from_fn(
            width_u32,
            height_u32,
            |x, y| image::Luma([quantise(tensor[[0, y as usize, x as usize]])]),
        ))),
        3 => Ok(DynamicImage::ImageRgb8(RgbImage::from_fn(
            width_u32,
            height_u32,
            |x, y| {
                let (x, y) = (x as usize, y as usize);
                image::Rgb([
                    quantise(tensor[[0, y, x]]),
                    quantise(tensor[[1, y, x]]),
                    quantise(tensor[[2, y, x]]),
                ])
            },
        ))),
        other => Err(EdgesetError::Encode(format!(
            "cannot encode tensor with {other} channels"
        ))),
    }
}

pub fn write_png(image: &DynamicImage, path: &Utf8Path) -> Result<(), EdgesetError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|err| EdgesetError::Encode(format!("{path}: {err}")))?;
    DatasetStore::write_bytes_atomic(path, buffer.get_ref())
}

/// Writes dataset targets (and optionally inputs) as PNG files named after
/// the source image stems, for FID preprocessing or side-by-side review.
pub fn export_pairs(
    dataset: &EdgesDataset,
    out_dir: &Path,
    options: &ExportOptions,
) -> Result<ExportSummary, EdgesetError> {
    let out_dir = Utf8PathBuf::from_path_buf(out_dir.to_path_buf()).map_err(|path| {
        EdgesetError::Filesystem(format!("non UTF-8 output path {}", path.display()))
    })?;
    let mut summary = ExportSummary::default();

    for (index, path) in dataset.ids().iter().enumerate() {
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| {
                EdgesetError::Filesystem(format!("non UTF-8 file name {}", path.display()))
            })?;
        if let Some(ids) = &options.ids {
            if !ids.contains(stem) {
                summary.filtered += 1;
                continue;
            }
        }

        let (input, target) = dataset.get(index)?;
        write_png(
            &tensor_to_image(&target, options.unnorm)?,
            &out_dir.join(format!("{stem}.png")),
        )?;
        if options.with_inputs {
            write_png(
                &tensor_to_image(&input, options.unnorm)?,
                &out_dir.join(format!("{stem}_edges.png")),
            )?;
        }
        summary.written += 1;
        debug!(index, %stem, "pair exported");
    }

    info!(
        written = summary.written,
        filtered = summary.filtered,
        dir = %out_dir,
        "export finished"
    );
    Ok(summary)
}
