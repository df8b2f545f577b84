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

//! Library for building [KML](https://developers.google.com/kml) files from GPS
//! tracks and geotagged photos.
//!
//! Tracks are read from a CSV table (or a GPX file) and drawn as coloured
//! lines. Photos are placed as _PhotoOverlays_ at the position found in their
//! EXIF data and copied, optionally resized, next to the KML file.
//!
//! See [`pipeline::run`] for building a complete output folder and
//! [`write_tracks_kml`] for converting a track table in memory.

use std::io::{self, Read};
use std::path::PathBuf;

use gpx::errors::GpxError;
use thiserror::Error;

pub mod archive;
pub mod document;
pub mod gps;
pub mod metadata;
pub mod palette;
pub mod pipeline;
pub mod resize;
pub mod track;

#[cfg(test)]
mod test_support;

use crate::document::DocumentBuilder;
use crate::palette::{Rgb, UnknownColour};

/// Error returned from this library.
#[derive(Error, Debug)]
pub enum Error {
    /// GPX reading failed.
    #[error("reading GPX failed: {0}")]
    Gpx(#[from] GpxError),
    /// Reading the track table failed.
    #[error("reading the track table failed: {0}")]
    Csv(#[from] csv::Error),
    /// KML writing failed.
    #[error("writing KML failed: {0}")]
    Kml(#[from] kml::Error),
    /// Indenting the written KML failed.
    #[error("formatting KML failed: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Packing the output folder failed.
    #[error("archiving failed: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// Listing a folder failed.
    #[error("listing files failed: {0}")]
    Walk(#[from] walkdir::Error),
    /// Reading or writing a file failed.
    #[error("I/O failed: {0}")]
    Io(#[from] io::Error),
    /// A colour name could not be parsed.
    #[error(transparent)]
    Colour(#[from] UnknownColour),
    /// The output folder exists and clearing it was not confirmed.
    #[error("'{}' already exists and was not cleared", .0.display())]
    OverwriteDeclined(PathBuf),
    /// The output folder is, or contains, the image folder.
    #[error(
        "output folder '{}' would overwrite the image folder '{}'",
        output.display(),
        images.display()
    )]
    OutputCollidesWithSource { output: PathBuf, images: PathBuf },
    /// Neither the metadata nor the image itself gave a width and height.
    #[error("'{}' has no usable width and height", .0.display())]
    MissingDimensions(PathBuf),
    /// The output path cannot name a folder.
    #[error("'{}' is not a usable output folder", .0.display())]
    InvalidOutput(PathBuf),
}

/// Read a CSV track table and write a KML file.
///
/// The table is read from `source` and the document, called `name`, is written
/// to `sink`. Tracks are coloured from red to blue.
///
/// # Example
/// ```
/// # use geo_kml_builder::write_tracks_kml;
/// #
/// let source = "\
/// placemark,keep_elevation,time,lat,lon,elevation
/// Eiffel Tower,0,,48.858222,2.2945,
/// Eiffel Tower,0,,48.8584,2.2950,
/// ";
/// let mut sink = vec![];
///
/// write_tracks_kml(source.as_bytes(), "paris", &mut sink).expect("conversion failed");
///
/// let kml = String::from_utf8(sink).expect("KML data is not valid UTF-8");
/// assert!(kml.contains("<kml"));
/// assert!(kml.contains("2.2945,48.858222"));
/// assert!(kml.contains("<name>Eiffel Tower</name>"));
/// assert!(kml.contains("clampToGround"));
/// ```
pub fn write_tracks_kml(source: impl Read, name: &str, sink: impl io::Write) -> Result<(), Error> {
    let points = track::read_table(source)?;
    let tracks = track::group(&points);

    let mut builder = DocumentBuilder::new(name);
    builder.add_tracks(&tracks, &Rgb::RED, &Rgb::BLUE);
    builder.write(sink)
}
