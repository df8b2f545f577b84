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

//! Line colours for tracks, interpolated between two endpoints.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Alpha channel prepended to every swatch.
const ALPHA: &str = "99";

/// Colour names accepted by [`Rgb::from_str`].
const NAMED: &[(&str, Rgb)] = &[
    ("black", Rgb::new(0x00, 0x00, 0x00)),
    ("white", Rgb::new(0xff, 0xff, 0xff)),
    ("red", Rgb::RED),
    ("lime", Rgb::new(0x00, 0xff, 0x00)),
    ("green", Rgb::new(0x00, 0x80, 0x00)),
    ("blue", Rgb::BLUE),
    ("yellow", Rgb::new(0xff, 0xff, 0x00)),
    ("cyan", Rgb::new(0x00, 0xff, 0xff)),
    ("magenta", Rgb::new(0xff, 0x00, 0xff)),
    ("orange", Rgb::new(0xff, 0xa5, 0x00)),
    ("purple", Rgb::new(0x80, 0x00, 0x80)),
    ("gray", Rgb::new(0x80, 0x80, 0x80)),
    ("grey", Rgb::new(0x80, 0x80, 0x80)),
];

/// Error returned when parsing an [`Rgb`] fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown colour '{0}', expected a colour name or #rrggbb")]
pub struct UnknownColour(pub String);

/// An opaque colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const RED: Rgb = Rgb::new(0xff, 0x00, 0x00);
    pub const BLUE: Rgb = Rgb::new(0x00, 0x00, 0xff);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn to_hsl(self) -> [f64; 3] {
        let [r, g, b] = [self.r, self.g, self.b].map(|c| f64::from(c) / 255.0);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        if max == min {
            return [0.0, 0.0, l];
        }

        let d = max - min;
        let s = if l > 0.5 {
            d / (2.0 - max - min)
        } else {
            d / (max + min)
        };
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        [h / 6.0, s, l]
    }

    fn from_hsl([h, s, l]: [f64; 3]) -> Self {
        if s == 0.0 {
            let v = channel(l);
            return Self::new(v, v, v);
        }

        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        Self::new(
            channel(hue_to_rgb(p, q, h + 1.0 / 3.0)),
            channel(hue_to_rgb(p, q, h)),
            channel(hue_to_rgb(p, q, h - 1.0 / 3.0)),
        )
    }
}

impl FromStr for Rgb {
    type Err = UnknownColour;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if let Some((_, rgb)) = NAMED.iter().find(|(n, _)| *n == name) {
            return Ok(*rgb);
        }

        let hex = name.strip_prefix('#').unwrap_or(&name);
        if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            let parse = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
            if let (Ok(r), Ok(g), Ok(b)) = (parse(0), parse(2), parse(4)) {
                return Ok(Self::new(r, g, b));
            }
        }
        Err(UnknownColour(s.to_string()))
    }
}

fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

fn channel(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Colour of one track line: `99` alpha followed by `rrggbb`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColourSwatch(String);

impl ColourSwatch {
    fn new(rgb: Rgb) -> Self {
        Self(format!("{ALPHA}{:02x}{:02x}{:02x}", rgb.r, rgb.g, rgb.b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColourSwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `n` colours evenly spaced in HSL from `from` to `to`.
///
/// A single colour is `from` itself.
pub fn palette(n: usize, from: &Rgb, to: &Rgb) -> Vec<ColourSwatch> {
    let start = from.to_hsl();
    let end = to.to_hsl();
    let steps = n.saturating_sub(1).max(1) as f64;

    (0..n)
        .map(|i| {
            let t = i as f64 / steps;
            let hsl = [0, 1, 2].map(|c| start[c] + (end[c] - start[c]) * t);
            ColourSwatch::new(Rgb::from_hsl(hsl))
        })
        .collect()
}
