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

//! Packing an output folder into a ZIP file.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::Error;

/// Pack all files below `dir` into `<dir>.zip` next to it.
///
/// Paths inside the archive start with the folder's own name. Returns the path
/// of the archive.
pub fn zip_dir(dir: &Path) -> Result<PathBuf, Error> {
    let name = dir
        .file_name()
        .ok_or_else(|| Error::InvalidOutput(dir.to_path_buf()))?;
    let parent = dir.parent().unwrap_or_else(|| Path::new(""));
    let archive = parent.join(format!("{}.zip", name.to_string_lossy()));

    let mut zip = ZipWriter::new(BufWriter::new(File::create(&archive)?));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(parent)
            .map_err(|_| Error::InvalidOutput(entry.path().to_path_buf()))?;
        let entry_name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        debug!("archiving {entry_name}");
        zip.start_file(entry_name, options)?;
        io::copy(&mut File::open(entry.path())?, &mut zip)?;
    }
    zip.finish()?;

    Ok(archive)
}
