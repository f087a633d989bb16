//! Grayscale template matching.
//!
//! Zero-mean normalized cross-correlation over `image` buffers. Good
//! enough for UI chrome, which is pixel-stable; no scale or rotation
//! handling.

use image::{GrayImage, RgbaImage};

use crate::geometry::Point;
use crate::ports::Match;

/// Best match of `needle` inside `haystack` with `score >= threshold`.
///
/// Ties are broken by reading order: the first position scanned
/// (top-to-bottom, left-to-right) keeps the score, later equal scores do
/// not displace it.
pub fn match_template(haystack: &GrayImage, needle: &GrayImage, threshold: f32) -> Option<Match> {
    let (hw, hh) = haystack.dimensions();
    let (nw, nh) = needle.dimensions();
    if nw == 0 || nh == 0 || nw > hw || nh > hh {
        return None;
    }

    let n_pixels = (nw * nh) as f32;
    let needle_mean = mean(needle.as_raw());
    let needle_dev: f32 = needle
        .as_raw()
        .iter()
        .map(|&p| {
            let d = p as f32 - needle_mean;
            d * d
        })
        .sum::<f32>()
        .sqrt();
    let flat_needle = needle_dev < f32::EPSILON;

    let mut best: Option<(f32, u32, u32)> = None;

    for y in 0..=(hh - nh) {
        for x in 0..=(hw - nw) {
            let score = if flat_needle {
                // Correlation is undefined for a solid-color template;
                // fall back to mean absolute difference similarity.
                let mut mad = 0.0f32;
                for ny in 0..nh {
                    for nx in 0..nw {
                        let h = haystack.get_pixel(x + nx, y + ny)[0] as f32;
                        let n = needle.get_pixel(nx, ny)[0] as f32;
                        mad += (h - n).abs();
                    }
                }
                1.0 - (mad / n_pixels / 255.0)
            } else {
                ncc_at(haystack, needle, x, y, needle_mean, needle_dev)
            };

            if score >= threshold && best.map(|(s, _, _)| score > s).unwrap_or(true) {
                best = Some((score, x, y));
            }
        }
    }

    best.map(|(score, x, y)| Match {
        score,
        center: Point::new((x + nw / 2) as i32, (y + nh / 2) as i32),
    })
}

fn ncc_at(
    haystack: &GrayImage,
    needle: &GrayImage,
    x: u32,
    y: u32,
    needle_mean: f32,
    needle_dev: f32,
) -> f32 {
    let (nw, nh) = needle.dimensions();
    let n_pixels = (nw * nh) as f32;

    let mut patch_sum = 0.0f32;
    for ny in 0..nh {
        for nx in 0..nw {
            patch_sum += haystack.get_pixel(x + nx, y + ny)[0] as f32;
        }
    }
    let patch_mean = patch_sum / n_pixels;

    let mut cross = 0.0f32;
    let mut patch_sq = 0.0f32;
    for ny in 0..nh {
        for nx in 0..nw {
            let h = haystack.get_pixel(x + nx, y + ny)[0] as f32 - patch_mean;
            let n = needle.get_pixel(nx, ny)[0] as f32 - needle_mean;
            cross += h * n;
            patch_sq += h * h;
        }
    }

    let denom = patch_sq.sqrt() * needle_dev;
    if denom < f32::EPSILON {
        return 0.0;
    }
    // Negative correlation is "not a match", not an anti-score.
    (cross / denom).max(0.0)
}

fn mean(data: &[u8]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().map(|&p| p as f32).sum::<f32>() / data.len() as f32
}

/// Flatten a captured RGBA bitmap to grayscale for matching.
pub fn to_gray(image: &RgbaImage) -> GrayImage {
    image::DynamicImage::ImageRgba8(image.clone()).to_luma8()
}
