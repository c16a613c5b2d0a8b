//! Canny edge detection over colour images.
//!
//! Gradients come from a 3x3 Sobel operator with replicated borders. For
//! colour input each pixel takes the gradient of the channel with the
//! largest L1 magnitude. Thin edges survive non-maximum suppression and
//! are then linked by double-threshold hysteresis over 8-neighbours.

use image::{GrayImage, Luma, RgbImage};

use crate::error::EdgesetError;

pub const EDGE: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Hysteresis thresholds on the L1 gradient magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    low: f32,
    high: f32,
}

impl Thresholds {
    /// The pair is reordered when given high-first.
    pub fn new(first: f32, second: f32) -> Result<Self, EdgesetError> {
        if !first.is_finite() || !second.is_finite() || first < 0.0 || second < 0.0 {
            return Err(EdgesetError::InvalidConfig(format!(
                "edge thresholds must be finite and non-negative, got ({first}, {second})"
            )));
        }
        Ok(Self {
            low: first.min(second),
            high: first.max(second),
        })
    }

    pub fn low(&self) -> f32 {
        self.low
    }

    pub fn high(&self) -> f32 {
        self.high
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: 100.0,
            high: 200.0,
        }
    }
}

struct Gradients {
    width: usize,
    height: usize,
    dx: Vec<i32>,
    dy: Vec<i32>,
    magnitude: Vec<i32>,
}

impl Gradients {
    fn magnitude_at(&self, x: isize, y: isize) -> i32 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return 0;
        }
        self.magnitude[y as usize * self.width + x as usize]
    }
}

fn sobel(image: &RgbImage) -> Gradients {
    let (width, height) = image.dimensions();
    let (width, height) = (width as usize, height as usize);
    let mut dx = vec![0i32; width * height];
    let mut dy = vec![0i32; width * height];
    let mut magnitude = vec![0i32; width * height];

    let at = |x: isize, y: isize, c: usize| -> i32 {
        let x = x.clamp(0, width as isize - 1) as u32;
        let y = y.clamp(0, height as isize - 1) as u32;
        i32::from(image.get_pixel(x, y)[c])
    };

    for y in 0..height as isize {
        for x in 0..width as isize {
            let mut best = (0i32, 0i32, -1i32);
            for c in 0..3 {
                let gx = (at(x + 1, y - 1, c) + 2 * at(x + 1, y, c) + at(x + 1, y + 1, c))
                    - (at(x - 1, y - 1, c) + 2 * at(x - 1, y, c) + at(x - 1, y + 1, c));
                let gy = (at(x - 1, y + 1, c) + 2 * at(x, y + 1, c) + at(x + 1, y + 1, c))
                    - (at(x - 1, y - 1, c) + 2 * at(x, y - 1, c) + at(x + 1, y - 1, c));
                let m = gx.abs() + gy.abs();
                if m > best.2 {
                    best = (gx, gy, m);
                }
            }
            let index = y as usize * width + x as usize;
            dx[index] = best.0;
            dy[index] = best.1;
            magnitude[index] = best.2;
        }
    }

    Gradients {
        width,
        height,
        dx,
        dy,
        magnitude,
    }
}

/// Keeps a pixel only when it is a local maximum along its gradient
/// direction, quantised to four orientations.
fn is_local_maximum(gradients: &Gradients, x: isize, y: isize) -> bool {
    // tan(22.5deg) and tan(67.5deg)
    const TAN_22_5: f32 = 0.414_213_57;
    const TAN_67_5: f32 = 2.414_213_6;

    let index = y as usize * gradients.width + x as usize;
    let m = gradients.magnitude[index];
    let gx = gradients.dx[index] as f32;
    let gy = gradients.dy[index] as f32;
    let (ax, ay) = (gx.abs(), gy.abs());

    let ((x1, y1), (x2, y2)) = if ay <= ax * TAN_22_5 {
        ((x - 1, y), (x + 1, y))
    } else if ay >= ax * TAN_67_5 {
        ((x, y - 1), (x, y + 1))
    } else if (gx > 0.0) == (gy > 0.0) {
        ((x - 1, y - 1), (x + 1, y + 1))
    } else {
        ((x + 1, y - 1), (x - 1, y + 1))
    };

    m > gradients.magnitude_at(x1, y1) && m >= gradients.magnitude_at(x2, y2)
}

/// Binary edge map: [`EDGE`] on edges, [`BACKGROUND`] elsewhere.
pub fn canny(image: &RgbImage, thresholds: Thresholds) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut edges = GrayImage::from_pixel(width, height, Luma([BACKGROUND]));
    if width == 0 || height == 0 {
        return edges;
    }

    let gradients = sobel(image);
    let (w, h) = (gradients.width, gradients.height);

    #[derive(Clone, Copy, PartialEq)]
    enum Class {
        None,
        Weak,
        Strong,
    }

    let mut classes = vec![Class::None; w * h];
    let mut stack = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let index = y * w + x;
            let m = gradients.magnitude[index] as f32;
            if m <= thresholds.low || !is_local_maximum(&gradients, x as isize, y as isize) {
                continue;
            }
            if m > thresholds.high {
                classes[index] = Class::Strong;
                stack.push((x, y));
            } else {
                classes[index] = Class::Weak;
            }
        }
    }

    while let Some((x, y)) = stack.pop() {
        edges.put_pixel(x as u32, y as u32, Luma([EDGE]));
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let index = ny * w + nx;
                if classes[index] == Class::Weak {
                    classes[index] = Class::Strong;
                    stack.push((nx, ny));
                }
            }
        }
    }

    edges
}

/// Edges dark on a light background, the sketch convention of the inputs.
pub fn invert(edges: &mut GrayImage) {
    for pixel in edges.pixels_mut() {
        pixel[0] = u8::MAX - pixel[0];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn half_split(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn flat_image_has_no_edges() {
        let image = RgbImage::from_pixel(16, 16, Rgb([120, 30, 200]));
        let edges = canny(&image, Thresholds::default());
        assert!(edges.pixels().all(|p| p[0] == BACKGROUND));
    }

    #[test]
    fn vertical_step_yields_vertical_edge() {
        let edges = canny(&half_split(16, 16), Thresholds::default());
        for y in 0..16 {
            let row: Vec<u32> = (0..16).filter(|&x| edges.get_pixel(x, y)[0] == EDGE).collect();
            assert_eq!(row.len(), 1, "row {y} should have one edge pixel: {row:?}");
            assert!((7..=8).contains(&row[0]));
        }
    }

    #[test]
    fn thresholds_are_reordered() {
        let thresholds = Thresholds::new(200.0, 100.0).unwrap();
        assert_eq!(thresholds.low(), 100.0);
        assert_eq!(thresholds.high(), 200.0);
        assert!(Thresholds::new(-1.0, 5.0).is_err());
    }

    #[test]
    fn invert_swaps_edge_and_background() {
        let mut edges = canny(&half_split(8, 8), Thresholds::default());
        invert(&mut edges);
        assert_eq!(edges.get_pixel(0, 0)[0], 255);
        assert!(edges.pixels().any(|p| p[0] == 0));
    }
}
