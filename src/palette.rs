use crate::error::AppError;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;

pub type Rgb = [u8; 3];

pub trait PaletteExtractor: Send + Sync {
    /// Up to `count` dominant colors, most common first.
    fn dominant_colors(&self, path: &Path, count: usize) -> Result<Vec<Rgb>, AppError>;
}

/// Quantizes a downsampled copy of the image into 5-bit-per-channel buckets
/// and reports the mean color of the most populated buckets.
pub struct HistogramPalette {
    pub sample_edge: u32,
}

impl Default for HistogramPalette {
    fn default() -> Self {
        Self { sample_edge: 128 }
    }
}

impl PaletteExtractor for HistogramPalette {
    fn dominant_colors(&self, path: &Path, count: usize) -> Result<Vec<Rgb>, AppError> {
        log::trace!("Opening image for palette extraction: {:?}", path);
        let image = image::open(path)
            .map_err(|e| {
                log::warn!("Could not open image for palette extraction {:?}: {}", path, e);
                e
            })?
            .thumbnail(self.sample_edge, self.sample_edge)
            .to_rgb8();
        Ok(palette_of(image.as_raw(), count))
    }
}

#[derive(Default, Clone, Copy)]
struct Bucket {
    sum: [u64; 3],
    pixels: u64,
}

fn bucket_key(px: &[u8]) -> u16 {
    (((px[0] as u16) >> 3) << 10) | (((px[1] as u16) >> 3) << 5) | ((px[2] as u16) >> 3)
}

/// Palette of packed RGB bytes. Ties are broken by bucket key so the result
/// is stable for a given image.
pub fn palette_of(rgb: &[u8], count: usize) -> Vec<Rgb> {
    let histogram = rgb
        .par_chunks_exact(3)
        .fold(HashMap::<u16, Bucket>::new, |mut acc, px| {
            let bucket = acc.entry(bucket_key(px)).or_default();
            for (sum, &channel) in bucket.sum.iter_mut().zip(px) {
                *sum += channel as u64;
            }
            bucket.pixels += 1;
            acc
        })
        .reduce(HashMap::new, |mut a, b| {
            for (key, other) in b {
                let bucket = a.entry(key).or_default();
                for (sum, add) in bucket.sum.iter_mut().zip(other.sum) {
                    *sum += add;
                }
                bucket.pixels += other.pixels;
            }
            a
        });

    let mut buckets: Vec<(u16, Bucket)> = histogram.into_iter().collect();
    buckets.sort_by(|a, b| b.1.pixels.cmp(&a.1.pixels).then(a.0.cmp(&b.0)));
    buckets
        .into_iter()
        .take(count)
        .map(|(_, b)| b.sum.map(|s| (s / b.pixels) as u8))
        .collect()
}

/// One `#rrggbb` per line, the text stored in the `colors` column.
pub fn format_palette(colors: &[Rgb]) -> String {
    colors
        .iter()
        .map(|[r, g, b]| format!("#{:02x}{:02x}{:02x}", r, g, b))
        .collect::<Vec<_>>()
        .join("\n")
}
