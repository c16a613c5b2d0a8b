use image::imageops::{self, FilterType};
use image::{ImageBuffer, Pixel, RgbImage};
use ndarray::Array3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::Tensor;
use crate::error::EdgesetError;

/// One geometric step of a pre-transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Geometric {
    /// Scales so the shorter side equals `shorter_side`, keeping aspect.
    Resize { shorter_side: u32 },
    ResizeExact { width: u32, height: u32 },
    CenterCrop { width: u32, height: u32 },
    RandomCrop { width: u32, height: u32 },
    /// Horizontally centred crop anchored at the top row.
    TopCrop { width: u32, height: u32 },
    RandomHorizontalFlip { p: f64 },
}

impl Geometric {
    pub fn is_random(&self) -> bool {
        matches!(
            self,
            Geometric::RandomCrop { .. } | Geometric::RandomHorizontalFlip { .. }
        )
    }

    pub fn apply<R: Rng + ?Sized>(
        &self,
        image: RgbImage,
        rng: &mut R,
    ) -> Result<RgbImage, EdgesetError> {
        let (width, height) = image.dimensions();
        match *self {
            Geometric::Resize { shorter_side } => {
                if shorter_side == 0 {
                    return Err(EdgesetError::InvalidTransform(
                        "resize target must be positive".to_string(),
                    ));
                }
                let (new_width, new_height) = shorter_side_size(width, height, shorter_side);
                if (new_width, new_height) == (width, height) {
                    return Ok(image);
                }
                Ok(imageops::resize(&image, new_width, new_height, FilterType::Triangle))
            }
            Geometric::ResizeExact {
                width: new_width,
                height: new_height,
            } => {
                if new_width == 0 || new_height == 0 {
                    return Err(EdgesetError::InvalidTransform(
                        "resize target must be positive".to_string(),
                    ));
                }
                if (new_width, new_height) == (width, height) {
                    return Ok(image);
                }
                Ok(imageops::resize(&image, new_width, new_height, FilterType::Triangle))
            }
            Geometric::CenterCrop {
                width: crop_width,
                height: crop_height,
            } => {
                check_crop(width, height, crop_width, crop_height)?;
                let x = centre_offset(width, crop_width);
                let y = centre_offset(height, crop_height);
                Ok(crop(&image, x, y, crop_width, crop_height))
            }
            Geometric::RandomCrop {
                width: crop_width,
                height: crop_height,
            } => {
                check_crop(width, height, crop_width, crop_height)?;
                let x = rng.gen_range(0..=width - crop_width);
                let y = rng.gen_range(0..=height - crop_height);
                Ok(crop(&image, x, y, crop_width, crop_height))
            }
            Geometric::TopCrop {
                width: crop_width,
                height: crop_height,
            } => {
                check_crop(width, height, crop_width, crop_height)?;
                let x = (width - crop_width) / 2;
                Ok(crop(&image, x, 0, crop_width, crop_height))
            }
            Geometric::RandomHorizontalFlip { p } => {
                if !(0.0..=1.0).contains(&p) {
                    return Err(EdgesetError::InvalidTransform(format!(
                        "flip probability {p} outside [0, 1]"
                    )));
                }
                if rng.gen_bool(p) {
                    Ok(imageops::flip_horizontal(&image))
                } else {
                    Ok(image)
                }
            }
        }
    }
}

/// Geometric transform applied before edge extraction. The same pipeline
/// shapes the target, so input and target stay aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreTransform {
    ops: Vec<Geometric>,
}

impl PreTransform {
    pub fn new(ops: Vec<Geometric>) -> Self {
        Self { ops }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[Geometric] {
        &self.ops
    }

    /// True when repeated calls on the same image give the same output.
    pub fn is_deterministic(&self) -> bool {
        !self.ops.iter().any(Geometric::is_random)
    }

    pub fn apply(&self, image: RgbImage) -> Result<RgbImage, EdgesetError> {
        self.apply_with_rng(image, &mut rand::thread_rng())
    }

    pub fn apply_with_rng<R: Rng + ?Sized>(
        &self,
        image: RgbImage,
        rng: &mut R,
    ) -> Result<RgbImage, EdgesetError> {
        self.ops
            .iter()
            .try_fold(image, |image, op| op.apply(image, &mut *rng))
    }
}

/// Conversion of an 8-bit image into a CHW `f32` tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PostTransform {
    /// Scales to `[0, 1]`.
    ToTensor,
    /// Scales to `[0, 1]`, then `(x - mean) / std` per channel. A single
    /// value is broadcast to every channel.
    Normalized { mean: Vec<f32>, std: Vec<f32> },
}

impl PostTransform {
    /// `[-1, 1]` range used for the edge-map input.
    pub fn default_input() -> Self {
        PostTransform::Normalized {
            mean: vec![0.5],
            std: vec![0.5],
        }
    }

    pub fn default_target() -> Self {
        Self::default_input()
    }

    pub fn apply<P>(&self, image: &ImageBuffer<P, Vec<u8>>) -> Result<Tensor, EdgesetError>
    where
        P: Pixel<Subpixel = u8>,
    {
        let channels = usize::from(P::CHANNEL_COUNT);
        let (width, height) = image.dimensions();
        let mut tensor = Array3::<f32>::zeros((channels, height as usize, width as usize));
        for (x, y, pixel) in image.enumerate_pixels() {
            for (c, value) in pixel.channels().iter().enumerate() {
                tensor[[c, y as usize, x as usize]] = f32::from(*value) / 255.0;
            }
        }

        if let PostTransform::Normalized { mean, std } = self {
            for c in 0..channels {
                let m = channel_param(mean, c, channels, "mean")?;
                let s = channel_param(std, c, channels, "std")?;
                if s == 0.0 {
                    return Err(EdgesetError::InvalidTransform(
                        "normalization std must be non-zero".to_string(),
                    ));
                }
                tensor
                    .index_axis_mut(ndarray::Axis(0), c)
                    .mapv_inplace(|value| (value - m) / s);
            }
        }
        Ok(tensor)
    }
}

fn channel_param(
    values: &[f32],
    channel: usize,
    channels: usize,
    name: &str,
) -> Result<f32, EdgesetError> {
    match values.len() {
        1 => Ok(values[0]),
        len if len == channels => Ok(values[channel]),
        len => Err(EdgesetError::InvalidTransform(format!(
            "{name} has {len} values for a {channels}-channel image"
        ))),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn shorter_side_size(width: u32, height: u32, target: u32) -> (u32, u32) {
    if width <= height {
        let scaled = (f64::from(target) * f64::from(height) / f64::from(width)) as u32;
        (target, scaled.max(1))
    } else {
        let scaled = (f64::from(target) * f64::from(width) / f64::from(height)) as u32;
        (scaled.max(1), target)
    }
}

/// Half of the slack, with ties rounded to even.
fn centre_offset(size: u32, crop: u32) -> u32 {
    let slack = size - crop;
    let half = slack / 2;
    if slack % 2 == 1 && half % 2 == 1 {
        half + 1
    } else {
        half
    }
}

fn check_crop(width: u32, height: u32, crop_width: u32, crop_height: u32) -> Result<(), EdgesetError> {
    if crop_width == 0 || crop_height == 0 || crop_width > width || crop_height > height {
        return Err(EdgesetError::InvalidTransform(format!(
            "cannot crop {crop_width}x{crop_height} from {width}x{height} image"
        )));
    }
    Ok(())
}

fn crop(image: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> RgbImage {
    imageops::crop_imm(image, x, y, width, height).to_image()
}
