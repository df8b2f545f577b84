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

//! Track points and their grouping into named tracks.

use std::collections::{HashMap, HashSet};
use std::io::Read;

use gpx::errors::GpxError;
use kml::types::Coord;
use log::warn;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

/// One row of the track table.
///
/// The CSV columns are `placemark`, `keep_elevation`, `time`, `lat`, `lon` and
/// `elevation`; `time` and `elevation` may be empty or missing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackPoint {
    #[serde(rename = "placemark")]
    pub track_name: String,
    #[serde(deserialize_with = "flag")]
    pub keep_elevation: bool,
    #[serde(default)]
    pub time: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub elevation: Option<f64>,
}

/// Points sharing one name, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub name: String,
    /// Whether the points carry elevation.
    pub is_elevated: bool,
    pub coords: Vec<Coord>,
}

impl Track {
    fn new(name: &str, is_elevated: bool) -> Self {
        Self {
            name: name.to_string(),
            is_elevated,
            coords: vec![],
        }
    }

    /// The coordinates as `lon,lat[,elevation]` lines.
    pub fn coordinate_text(&self) -> String {
        self.coords
            .iter()
            .map(|c| match c.z {
                Some(z) => format!("{},{},{}", c.x, c.y, z),
                None => format!("{},{}", c.x, c.y),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Group `points` by track name.
///
/// Tracks are returned in order of first appearance and keep the row order of
/// their points. The first row of a track decides whether elevation is kept.
pub fn group(points: &[TrackPoint]) -> Vec<Track> {
    let mut tracks: Vec<Track> = vec![];
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut inconsistent = HashSet::new();

    for point in points {
        let i = *index.entry(point.track_name.as_str()).or_insert_with(|| {
            tracks.push(Track::new(&point.track_name, point.keep_elevation));
            tracks.len() - 1
        });
        let track = &mut tracks[i];

        if point.keep_elevation != track.is_elevated && inconsistent.insert(i) {
            warn!(
                "track '{}' mixes keep_elevation values, keeping {}",
                track.name, track.is_elevated
            );
        }

        track.coords.push(Coord {
            x: point.lon,
            y: point.lat,
            z: point.elevation.filter(|_| track.is_elevated),
        });
    }

    tracks
}

/// Read the CSV track table from `source`.
pub fn read_table(source: impl Read) -> Result<Vec<TrackPoint>, csv::Error> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source)
        .deserialize()
        .collect()
}

/// Read the tracks of a GPX file as track points.
///
/// Each GPX track becomes one track name, its segments are joined in order.
/// Elevation is kept if any point of the track has one.
pub fn read_gpx(source: impl Read) -> Result<Vec<TrackPoint>, GpxError> {
    let gpx = gpx::read(source)?;

    let mut points = vec![];
    for (n, track) in gpx.tracks.into_iter().enumerate() {
        let name = track.name.unwrap_or_else(|| format!("Track {}", n + 1));
        let waypoints: Vec<_> = track
            .segments
            .into_iter()
            .flat_map(|segment| segment.points)
            .collect();
        let keep_elevation = waypoints.iter().any(|w| w.elevation.is_some());

        for waypoint in waypoints {
            let point = waypoint.point();
            points.push(TrackPoint {
                track_name: name.clone(),
                keep_elevation,
                time: waypoint.time.and_then(|t| t.format().ok()),
                lat: point.y(),
                lon: point.x(),
                elevation: waypoint.elevation,
            });
        }
    }

    Ok(points)
}

/// Deserialize `0`/`1` (or `true`/`false`) into a bool.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" | "" => Ok(false),
        other => other
            .parse::<f64>()
            .map(|v| v != 0.0)
            .map_err(|_| D::Error::custom(format!("invalid keep_elevation value '{other}'"))),
    }
}
