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

//! Command-line interface for building a KML folder from tracks and photos.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use geo_kml_builder::palette::Rgb;
use geo_kml_builder::pipeline::{self, Config, Interaction, Outcome};
use geo_kml_builder::resize::{DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
use log::{error, info, LevelFilter};

#[derive(Parser, Debug)]
#[command(name = "geo-kml-builder", version, about)]
struct Args {
    /// Output folder; its name is used for the KML file
    output: PathBuf,

    /// Track table (CSV with placemark,keep_elevation,time,lat,lon,elevation) or GPX file
    #[arg(short, long)]
    tracks: Option<PathBuf>,

    /// Folder of geotagged photos
    #[arg(short, long)]
    images: Option<PathBuf>,

    /// Area ratio (0.01 to 1) or target size in KB (50 up to the file size)
    #[arg(short, long, default_value_t = 1.0)]
    resize: f64,

    /// Allowed overshoot of the target size in percent
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    resize_tolerance: f64,

    /// Maximum number of encode passes when fitting a target size
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_resize_iterations: u32,

    /// Colour of the first track (name or #rrggbb)
    #[arg(long, default_value = "red")]
    colour_a: Rgb,

    /// Colour of the last track (name or #rrggbb)
    #[arg(long, default_value = "blue")]
    colour_b: Rgb,

    /// Pack the output folder into a ZIP file next to it
    #[arg(short, long)]
    zip: bool,

    /// Clear an existing output folder without asking
    #[arg(short, long)]
    yes: bool,

    /// More log output (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn config(&self) -> Config {
        Config {
            output: self.output.clone(),
            tracks: self.tracks.clone(),
            images: self.images.clone(),
            resize_opt: self.resize,
            resize_tolerance: self.resize_tolerance,
            max_resize_iterations: self.max_resize_iterations,
            zip: self.zip,
            colour_a: self.colour_a,
            colour_b: self.colour_b,
        }
    }
}

/// Asks on the terminal before clearing an existing folder.
struct Terminal {
    assume_yes: bool,
}

impl Interaction for Terminal {
    fn confirm_clear(&mut self, dir: &Path) -> bool {
        if self.assume_yes {
            return true;
        }

        print!(
            "'{}' already exists and all of its content will be deleted. Continue? [y/N] ",
            dir.display()
        );
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes" | "1")
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.level())
        .parse_default_env()
        .init();

    let mut terminal = Terminal {
        assume_yes: args.yes,
    };
    match pipeline::run(&args.config(), &mut terminal) {
        Ok(Outcome::Empty) => {
            info!("Give a track file (-t) and/or an image folder (-i)");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Written(report)) => {
            println!("{}", report.kml.display());
            if let Some(archive) = report.archive {
                println!("{}", archive.display());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            error!("Building the KML file failed, please check your inputs");
            ExitCode::FAILURE
        }
    }
}
