// Copyright 2026 Viktor Reusch
//
// This file is part of geo_kml_builder.
//
// geo_kml_builder is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// geo_kml_builder is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License
// for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with geo_kml_builder. If not, see <https://www.gnu.org/licenses/>.

//! Shrinking photos before they are embedded next to the KML file.
//!
//! A single number, `resize_opt`, selects the mode (see [`ResizeMode::select`]):
//! values up to `1.0` scale the pixel area, values from 50 up to the source size
//! are a byte budget in KiB, and everything else leaves the photo untouched.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder, ImageError, ImageFormat};
use log::{debug, warn};
use thiserror::Error;

/// Smallest accepted area ratio.
pub const MIN_RATIO: f64 = 0.01;
/// Largest accepted area ratio.
pub const MAX_RATIO: f64 = 1.0;
/// Smallest accepted byte budget in KiB.
pub const MIN_BUDGET_KB: f64 = 50.0;
/// Default tolerance above the byte budget in percent.
pub const DEFAULT_TOLERANCE: f64 = 5.0;
/// Default number of encode passes when searching for a byte budget.
pub const DEFAULT_MAX_ITERATIONS: u32 = 16;
/// The byte budget search gives up below this side length in pixels.
pub const MIN_DIMENSION: u32 = 16;
const JPEG_QUALITY: u8 = 75;
const FILTER: FilterType = FilterType::Lanczos3;
/// Identifier of an EXIF APP1 segment.
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Error returned from [`Resizer::resize`].
#[derive(Error, Debug)]
pub enum ResizeError {
    /// The source could not be decoded as an image.
    #[error("file is unreadable: {0}")]
    Unreadable(#[source] ImageError),
    /// Encoding the resized image failed.
    #[error("encoding failed: {0}")]
    Encode(#[source] ImageError),
    /// No dimensions met the byte budget within the search bounds.
    #[error("byte budget not reached after {iterations} passes (last size {width}x{height})")]
    BudgetUnreachable {
        iterations: u32,
        width: u32,
        height: u32,
    },
}

/// How a photo is resized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizeMode {
    /// Scale the pixel area by this factor.
    Ratio(f64),
    /// Search for dimensions whose JPEG encoding fits this many bytes.
    ByteBudget { target_bytes: f64 },
    /// Keep the photo as it is.
    Skip,
}

impl ResizeMode {
    /// Select the mode for `resize_opt` and a source of `source_len` bytes.
    pub fn select(resize_opt: f64, source_len: usize) -> Self {
        let source_kb = source_len as f64 / 1024.0;
        if (MIN_RATIO..=MAX_RATIO).contains(&resize_opt) {
            Self::Ratio(resize_opt)
        } else if (MIN_BUDGET_KB..=source_kb).contains(&resize_opt) {
            Self::ByteBudget {
                target_bytes: resize_opt * 1024.0,
            }
        } else {
            Self::Skip
        }
    }
}

/// Encoded result of [`Resizer::resize`].
#[derive(Debug, Clone)]
pub struct Resized {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mode: ResizeMode,
}

/// Resizing parameters shared by all photos of one run.
#[derive(Debug, Clone, Copy)]
pub struct Resizer {
    pub resize_opt: f64,
    /// Allowed overshoot of the byte budget in percent.
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for Resizer {
    fn default() -> Self {
        Self {
            resize_opt: MAX_RATIO,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl Resizer {
    /// Resize the encoded image `source`.
    ///
    /// `exif` is a raw TIFF/EXIF block which is carried over into JPEG outputs.
    pub fn resize(&self, source: &[u8], exif: Option<&[u8]>) -> Result<Resized, ResizeError> {
        let format = image::guess_format(source).map_err(ResizeError::Unreadable)?;
        let image = image::load_from_memory_with_format(source, format)
            .map_err(ResizeError::Unreadable)?;
        let (width, height) = image.dimensions();

        let mode = ResizeMode::select(self.resize_opt, source.len());
        match mode {
            ResizeMode::Ratio(ratio) => {
                let area = f64::from(width) * f64::from(height) * ratio;
                let (new_width, new_height) = find_sides(area, width, height);
                let resized = image.resize_exact(new_width.max(1), new_height.max(1), FILTER);
                let bytes = match format {
                    ImageFormat::Jpeg => encode_jpeg(&resized, exif)?,
                    _ => {
                        if exif.is_some_and(|tiff| !tiff.is_empty()) {
                            warn!("EXIF block is not carried over into {format:?} output");
                        }
                        encode_as(&resized, format)?
                    }
                };
                Ok(Resized {
                    bytes,
                    width: resized.width(),
                    height: resized.height(),
                    mode,
                })
            }
            ResizeMode::ByteBudget { target_bytes } => {
                let (bytes, width, height) = self.fit_budget(&image, target_bytes, exif)?;
                Ok(Resized {
                    bytes,
                    width,
                    height,
                    mode,
                })
            }
            ResizeMode::Skip => {
                warn!(
                    "File resizing ignored: resize option {} is below the 50KB or 1% \
                     thresholds, or larger than the original size",
                    self.resize_opt
                );
                Ok(Resized {
                    bytes: source.to_vec(),
                    width,
                    height,
                    mode,
                })
            }
        }
    }

    /// Search for dimensions whose JPEG encoding is at most `tolerance` percent
    /// above `target_bytes`.
    ///
    /// Every candidate is scaled from `image` itself so that quality losses do
    /// not compound.
    fn fit_budget(
        &self,
        image: &DynamicImage,
        target_bytes: f64,
        exif: Option<&[u8]>,
    ) -> Result<(Vec<u8>, u32, u32), ResizeError> {
        let (mut width, mut height) = image.dimensions();
        let aspect = f64::from(width) / f64::from(height);
        let limit = 1.0 + self.tolerance / 100.0;

        for iteration in 1..=self.max_iterations {
            let bytes = if (width, height) == image.dimensions() {
                encode_jpeg(image, exif)?
            } else {
                encode_jpeg(&image.resize_exact(width, height, FILTER), exif)?
            };
            let deviation = bytes.len() as f64 / target_bytes;
            debug!("pass {iteration}: {width}x{height} is {deviation:.3} of the budget");
            if deviation <= limit {
                return Ok((bytes, width, height));
            }

            // The deviation applies to the area, hence the square root.
            let next_width = ((f64::from(width) / deviation.sqrt()) as u32).min(width.saturating_sub(1));
            let next_height = (f64::from(next_width) / aspect) as u32;
            if next_width < MIN_DIMENSION || next_height < MIN_DIMENSION {
                return Err(ResizeError::BudgetUnreachable {
                    iterations: iteration,
                    width,
                    height,
                });
            }
            width = next_width;
            height = next_height;
        }

        Err(ResizeError::BudgetUnreachable {
            iterations: self.max_iterations,
            width,
            height,
        })
    }
}

/// Find the sides of an image with area `area` and the aspect ratio of
/// `width`x`height`.
pub fn find_sides(area: f64, width: u32, height: u32) -> (u32, u32) {
    let ratio = f64::from(width) / f64::from(height);
    let new_height = (area / ratio).sqrt();
    let new_width = new_height * ratio;
    (new_width.round() as u32, new_height.round() as u32)
}

fn encode_jpeg(image: &DynamicImage, exif: Option<&[u8]>) -> Result<Vec<u8>, ResizeError> {
    let rgb = image.to_rgb8();
    let mut bytes = vec![];
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(ResizeError::Encode)?;
    Ok(match exif {
        Some(tiff) if !tiff.is_empty() => embed_exif(bytes, tiff),
        _ => bytes,
    })
}

fn encode_as(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ResizeError> {
    let mut cursor = Cursor::new(vec![]);
    image
        .write_to(&mut cursor, format)
        .map_err(ResizeError::Encode)?;
    Ok(cursor.into_inner())
}

/// Insert `tiff` as an EXIF APP1 segment into the JPEG stream `jpeg`.
///
/// The segment is placed after the JFIF header, if there is one. Streams that
/// are no JPEG or blocks too large for one segment are returned unchanged.
pub fn embed_exif(jpeg: Vec<u8>, tiff: &[u8]) -> Vec<u8> {
    let segment_len = 2 + EXIF_HEADER.len() + tiff.len();
    if !jpeg.starts_with(&[0xff, 0xd8]) || segment_len > usize::from(u16::MAX) {
        warn!("EXIF block of {} bytes could not be preserved", tiff.len());
        return jpeg;
    }

    let mut insert_at = 2;
    if jpeg.get(2..4) == Some(&[0xff, 0xe0][..]) {
        if let Some(&[hi, lo]) = jpeg.get(4..6) {
            insert_at = (4 + usize::from(u16::from_be_bytes([hi, lo]))).min(jpeg.len());
        }
    }

    let mut out = Vec::with_capacity(jpeg.len() + segment_len + 2);
    out.extend_from_slice(&jpeg[..insert_at]);
    out.extend_from_slice(&[0xff, 0xe1]);
    out.extend_from_slice(&(segment_len as u16).to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);
    out.extend_from_slice(&jpeg[insert_at..]);
    out
}
