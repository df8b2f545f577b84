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

//! Typed view on the EXIF metadata of a photo.
//!
//! Only the handful of tags needed for building overlays is extracted. Every
//! field is optional; see [`PhotoMetadata::dimensions`] for how the image size
//! is resolved from them.

use std::io::{BufRead, Seek};

use chrono::NaiveDateTime;
use exif::{Exif, In, Reader, Tag, Value};

use crate::gps::{GpsBlock, Rational};

/// Format of `DateTimeOriginal`.
const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// EXIF metadata of one photo.
#[derive(Debug, Clone, Default)]
pub struct PhotoMetadata {
    /// `PixelXDimension` from the EXIF sub-IFD.
    pub exif_width: Option<u32>,
    /// `PixelYDimension` from the EXIF sub-IFD.
    pub exif_height: Option<u32>,
    /// `ImageWidth` from the primary IFD.
    pub image_width: Option<u32>,
    /// `ImageLength` from the primary IFD.
    pub image_length: Option<u32>,
    /// `DateTimeOriginal`, if present and well-formed.
    pub captured: Option<NaiveDateTime>,
    pub gps: GpsBlock,
    /// Raw TIFF structure of the EXIF block, used for carrying it over into
    /// resized copies.
    pub raw: Vec<u8>,
}

impl PhotoMetadata {
    /// Read the metadata from an image container (JPEG, TIFF, PNG, ...).
    ///
    /// Returns `None` if the container has no decodable EXIF block.
    pub fn read(container: &mut (impl BufRead + Seek)) -> Option<Self> {
        Reader::new()
            .read_from_container(container)
            .ok()
            .map(|exif| Self::from_exif(&exif))
    }

    /// Parse a raw TIFF/EXIF block.
    pub fn from_raw(raw: Vec<u8>) -> Option<Self> {
        Reader::new()
            .read_raw(raw)
            .ok()
            .map(|exif| Self::from_exif(&exif))
    }

    fn from_exif(exif: &Exif) -> Self {
        Self {
            exif_width: uint(exif, Tag::PixelXDimension),
            exif_height: uint(exif, Tag::PixelYDimension),
            image_width: uint(exif, Tag::ImageWidth),
            image_length: uint(exif, Tag::ImageLength),
            captured: ascii(exif, Tag::DateTimeOriginal)
                .and_then(|s| NaiveDateTime::parse_from_str(&s, EXIF_DATE_FORMAT).ok()),
            gps: GpsBlock {
                latitude_ref: ascii(exif, Tag::GPSLatitudeRef),
                latitude: rationals(exif, Tag::GPSLatitude),
                longitude_ref: ascii(exif, Tag::GPSLongitudeRef),
                longitude: rationals(exif, Tag::GPSLongitude),
                altitude: rationals(exif, Tag::GPSAltitude).and_then(|v| v.first().copied()),
            },
            raw: exif.buf().to_vec(),
        }
    }

    /// Width and height of the photo as recorded in its metadata.
    ///
    /// Each side is taken from the EXIF pixel dimension first and falls back
    /// to the primary IFD's `ImageWidth`/`ImageLength`.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let width = self.exif_width.or(self.image_width)?;
        let height = self.exif_height.or(self.image_length)?;
        Some((width, height))
    }
}

fn uint(exif: &Exif, tag: Tag) -> Option<u32> {
    exif.get_field(tag, In::PRIMARY)?.value.get_uint(0)
}

fn ascii(exif: &Exif, tag: Tag) -> Option<String> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|s| String::from_utf8_lossy(s).trim().to_string()),
        _ => None,
    }
}

fn rationals(exif: &Exif, tag: Tag) -> Option<Vec<Rational>> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(values) => Some(values.clone()),
        _ => None,
    }
}
