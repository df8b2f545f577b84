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

//! Decoding of EXIF GPS tags into decimal degrees.

pub use exif::Rational;

/// Raw GPS tags of one photo, as found in its EXIF block.
///
/// Every field is optional because cameras write any subset of them.
#[derive(Debug, Clone, Default)]
pub struct GpsBlock {
    /// `GPSLatitudeRef`, usually `N` or `S`.
    pub latitude_ref: Option<String>,
    /// `GPSLatitude` as degree, minute and second rationals.
    pub latitude: Option<Vec<Rational>>,
    /// `GPSLongitudeRef`, usually `E` or `W`.
    pub longitude_ref: Option<String>,
    /// `GPSLongitude` as degree, minute and second rationals.
    pub longitude: Option<Vec<Rational>>,
    /// `GPSAltitude`.
    pub altitude: Option<Rational>,
}

/// Decoded position of a photo.
///
/// Latitude and longitude are either both known or both unknown. The altitude
/// is `0` whenever it could not be decoded or no position is known.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpsFix {
    position: Option<(f64, f64)>,
    altitude: f64,
}

impl GpsFix {
    /// A fix without a position.
    pub fn unlocated() -> Self {
        Self::default()
    }

    /// A fix at `latitude`/`longitude` and `altitude`.
    pub fn located(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            position: Some((latitude, longitude)),
            altitude,
        }
    }

    pub fn latitude(&self) -> Option<f64> {
        self.position.map(|(lat, _)| lat)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.position.map(|(_, lon)| lon)
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn is_located(&self) -> bool {
        self.position.is_some()
    }
}

/// Decode `block` into a [`GpsFix`].
///
/// A latitude or longitude that cannot be decoded discards the whole position.
/// This never fails; absence is signaled through the returned fix.
pub fn decode(block: &GpsBlock) -> GpsFix {
    let latitude = block
        .latitude
        .as_deref()
        .and_then(dms_to_decimal)
        .map(|lat| apply_ref(lat, block.latitude_ref.as_deref(), "S"));
    let longitude = block
        .longitude
        .as_deref()
        .and_then(dms_to_decimal)
        .map(|lon| apply_ref(lon, block.longitude_ref.as_deref(), "W"));

    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => {
            let altitude = block.altitude.and_then(ratio).unwrap_or(0.0);
            GpsFix::located(latitude, longitude, altitude)
        }
        _ => GpsFix::unlocated(),
    }
}

/// Convert degree, minute and second rationals to decimal degrees.
///
/// Returns `None` when fewer than three components are present or any
/// denominator is zero.
pub fn dms_to_decimal(dms: &[Rational]) -> Option<f64> {
    let [degree, minute, second] = dms.get(..3)? else {
        return None;
    };
    Some(ratio(*degree)? + ratio(*minute)? / 60.0 + ratio(*second)? / 3600.0)
}

fn ratio(value: Rational) -> Option<f64> {
    (value.denom != 0).then(|| f64::from(value.num) / f64::from(value.denom))
}

/// Negate `value` when the hemisphere reference equals `negative`.
fn apply_ref(value: f64, reference: Option<&str>, negative: &str) -> f64 {
    match reference {
        Some(r) if r.trim() == negative => -value,
        _ => value,
    }
}
