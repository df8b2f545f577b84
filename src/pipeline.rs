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

//! Building a complete output folder from a track file and an image folder.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use walkdir::WalkDir;

use crate::document::{DocumentBuilder, PhotoAsset, IMG_DIR, PICTURES, TRIPS};
use crate::gps::{self, GpsFix};
use crate::metadata::PhotoMetadata;
use crate::palette::Rgb;
use crate::resize::{Resizer, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE, MAX_RATIO};
use crate::track::{self, Track};
use crate::{archive, Error};

/// Settings of one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Output folder. Its last component names the document and the KML file.
    pub output: PathBuf,
    /// CSV track table, or a GPX file if the extension is `.gpx`.
    pub tracks: Option<PathBuf>,
    /// Folder of photos. Only its direct entries are used.
    pub images: Option<PathBuf>,
    /// Area ratio (0.01 to 1) or byte budget in KiB (50 up to the file size).
    pub resize_opt: f64,
    /// Allowed overshoot of the byte budget in percent.
    pub resize_tolerance: f64,
    pub max_resize_iterations: u32,
    /// Pack the output folder into a sibling ZIP file.
    pub zip: bool,
    /// Colour of the first track.
    pub colour_a: Rgb,
    /// Colour of the last track.
    pub colour_b: Rgb,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: PathBuf::from("output"),
            tracks: None,
            images: None,
            resize_opt: MAX_RATIO,
            resize_tolerance: DEFAULT_TOLERANCE,
            max_resize_iterations: DEFAULT_MAX_ITERATIONS,
            zip: false,
            colour_a: Rgb::RED,
            colour_b: Rgb::BLUE,
        }
    }
}

/// Progress after one photo has been added.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// One-based position of the photo in the folder listing.
    pub index: usize,
    pub total: usize,
    pub file: &'a Path,
}

/// Decisions and feedback which need the user.
pub trait Interaction {
    /// Whether the existing folder `dir` may be emptied.
    fn confirm_clear(&mut self, dir: &Path) -> bool;

    /// Called after each photo overlay has been added.
    fn photo_added(&mut self, _progress: &Progress<'_>) {}
}

/// Interaction with answers fixed in advance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unattended {
    pub clear_existing: bool,
}

impl Interaction for Unattended {
    fn confirm_clear(&mut self, _dir: &Path) -> bool {
        self.clear_existing
    }
}

/// Inputs present in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    Empty,
    TracksOnly,
    PhotosOnly,
    Both,
}

impl Session {
    pub fn of(config: &Config) -> Self {
        match (config.tracks.is_some(), config.images.is_some()) {
            (false, false) => Self::Empty,
            (true, false) => Self::TracksOnly,
            (false, true) => Self::PhotosOnly,
            (true, true) => Self::Both,
        }
    }
}

/// Summary of a written output folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub kml: PathBuf,
    pub archive: Option<PathBuf>,
    pub tracks: usize,
    pub photos: usize,
    /// Photos which were unreadable or had no usable dimensions.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Neither tracks nor images were given, nothing was written.
    Empty,
    Written(Report),
}

/// A photo found in the image folder.
struct Candidate {
    path: PathBuf,
    metadata: Option<PhotoMetadata>,
}

impl Candidate {
    fn open(path: PathBuf) -> Self {
        let metadata = File::open(&path)
            .ok()
            .and_then(|file| PhotoMetadata::read(&mut BufReader::new(file)));
        Self { path, metadata }
    }

    fn captured(&self) -> Option<chrono::NaiveDateTime> {
        self.metadata.as_ref().and_then(|m| m.captured)
    }
}

/// Build the KML file, and the photo copies it links to, in `config.output`.
///
/// All inputs are read before the output folder is touched. An existing output
/// folder is emptied only if `interaction` confirms it. Photos which cannot be
/// read or placed are skipped with a warning.
pub fn run(config: &Config, interaction: &mut dyn Interaction) -> Result<Outcome, Error> {
    let session = Session::of(config);
    if session == Session::Empty {
        info!("No track file and no image folder given, nothing to do");
        return Ok(Outcome::Empty);
    }

    let name = config
        .output
        .file_name()
        .ok_or_else(|| Error::InvalidOutput(config.output.clone()))?
        .to_string_lossy()
        .into_owned();
    if config.output.is_file() {
        return Err(Error::InvalidOutput(config.output.clone()));
    }
    if let Some(images) = &config.images {
        check_collision(&config.output, images)?;
    }

    let tracks = match &config.tracks {
        Some(path) => read_tracks(path)?,
        None => vec![],
    };
    let candidates = match &config.images {
        Some(dir) => list_images(dir)?,
        None => vec![],
    };

    prepare_output(&config.output, interaction)?;

    let mut builder = DocumentBuilder::new(&name);
    let mut skipped = 0;
    if config.images.is_some() {
        let img_dir = config.output.join(IMG_DIR);
        fs::create_dir_all(&img_dir)?;
        if session == Session::Both {
            builder.open_section(PICTURES);
        }

        let resizer = Resizer {
            resize_opt: config.resize_opt,
            tolerance: config.resize_tolerance,
            max_iterations: config.max_resize_iterations,
        };
        let total = candidates.len();
        for (i, candidate) in candidates.iter().enumerate() {
            if !add_photo(&mut builder, &resizer, candidate, &img_dir)? {
                skipped += 1;
                continue;
            }
            let progress = Progress {
                index: i + 1,
                total,
                file: &candidate.path,
            };
            info!(
                "Image {} out of {} added to KML file: {}",
                progress.index,
                total,
                candidate.path.display()
            );
            interaction.photo_added(&progress);
        }
    }

    if !tracks.is_empty() {
        if session == Session::Both {
            builder.open_section(TRIPS);
        }
        builder.add_tracks(&tracks, &config.colour_a, &config.colour_b);
    }

    let photos = builder.photo_count();
    let kml = config.output.join(format!("{name}.kml"));
    let mut sink = BufWriter::new(File::create(&kml)?);
    builder.write(&mut sink)?;
    sink.flush()?;
    info!(
        "KML file written to {} ({} tracks, {photos} photos, {skipped} skipped)",
        kml.display(),
        tracks.len()
    );

    let archive = if config.zip {
        let archive = archive::zip_dir(&config.output)?;
        info!("Output packed into {}", archive.display());
        Some(archive)
    } else {
        None
    };

    Ok(Outcome::Written(Report {
        kml,
        archive,
        tracks: tracks.len(),
        photos,
        skipped,
    }))
}

/// Resize, copy and place one photo. Returns whether it was added.
fn add_photo(
    builder: &mut DocumentBuilder,
    resizer: &Resizer,
    candidate: &Candidate,
    img_dir: &Path,
) -> Result<bool, Error> {
    let path = &candidate.path;
    let source = match fs::read(path) {
        Ok(source) => source,
        Err(err) => {
            warn!("Skipping {}: {err}", path.display());
            return Ok(false);
        }
    };
    let exif = candidate.metadata.as_ref().map(|m| m.raw.as_slice());
    let resized = match resizer.resize(&source, exif) {
        Ok(resized) => resized,
        Err(err) => {
            warn!("Skipping {}: {err}", path.display());
            return Ok(false);
        }
    };

    let Some(file_name) = path.file_name() else {
        return Ok(false);
    };
    let destination = img_dir.join(file_name);
    fs::write(&destination, &resized.bytes)?;

    let asset = PhotoAsset {
        source_path: path.clone(),
        destination_path: destination,
        dimensions: Some((resized.width, resized.height)),
        gps: candidate
            .metadata
            .as_ref()
            .map(|m| gps::decode(&m.gps))
            .unwrap_or_else(GpsFix::unlocated),
        raw_exif: exif.map(<[u8]>::to_vec).unwrap_or_default(),
    };

    match builder.add_photo(&asset) {
        Ok(_) => Ok(true),
        Err(err) => {
            warn!("Skipping {}: {err}", path.display());
            fs::remove_file(&asset.destination_path)?;
            Ok(false)
        }
    }
}

/// Read a GPX file or a CSV table and group its points into tracks.
fn read_tracks(path: &Path) -> Result<Vec<Track>, Error> {
    let reader = BufReader::new(File::open(path)?);
    let is_gpx = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gpx"));
    let points = if is_gpx {
        track::read_gpx(reader)?
    } else {
        track::read_table(reader)?
    };
    Ok(track::group(&points))
}

/// Files directly inside `dir`, by capture date with undated files last.
///
/// Ties keep the file name order.
fn list_images(dir: &Path) -> Result<Vec<Candidate>, Error> {
    let mut candidates = vec![];
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_file() {
            candidates.push(Candidate::open(entry.into_path()));
        }
    }
    candidates.sort_by_key(|c| (c.captured().is_none(), c.captured()));
    Ok(candidates)
}

/// Fail if writing to `output` would clear or overwrite `images`.
fn check_collision(output: &Path, images: &Path) -> Result<(), Error> {
    let output_abs = resolve(output)?;
    let images_abs = resolve(images)?;
    if images_abs.starts_with(&output_abs) {
        return Err(Error::OutputCollidesWithSource {
            output: output.to_path_buf(),
            images: images.to_path_buf(),
        });
    }
    Ok(())
}

/// Absolute form of `path`, resolving links of the part that exists.
fn resolve(path: &Path) -> io::Result<PathBuf> {
    if path.exists() {
        return path.canonicalize();
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            Ok(resolve(parent)?.join(name))
        }
        (_, Some(name)) => Ok(std::env::current_dir()?.join(name)),
        _ => Ok(path.to_path_buf()),
    }
}

/// Create `dir`, or empty it after confirmation if it exists.
fn prepare_output(dir: &Path, interaction: &mut dyn Interaction) -> Result<(), Error> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        return Ok(());
    }
    if !interaction.confirm_clear(dir) {
        return Err(Error::OverwriteDeclined(dir.to_path_buf()));
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
