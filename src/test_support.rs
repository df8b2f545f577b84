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

//! Test fixtures: JPEGs with a hand-built EXIF block and a small XML tree for
//! inspecting written KML.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::resize::embed_exif;

const ASCII: u16 = 2;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;

/// One TIFF IFD entry with its value bytes.
struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    data: Vec<u8>,
}

impl Entry {
    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            kind: LONG,
            count: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    fn ascii(tag: u16, value: &str) -> Self {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            kind: ASCII,
            count: data.len() as u32,
            data,
        }
    }

    fn rationals(tag: u16, values: &[(u32, u32)]) -> Self {
        let data = values
            .iter()
            .flat_map(|(num, denom)| num.to_le_bytes().into_iter().chain(denom.to_le_bytes()))
            .collect();
        Self {
            tag,
            kind: RATIONAL,
            count: values.len() as u32,
            data,
        }
    }
}

/// Byte length of an IFD including its out-of-line values.
fn ifd_len(entries: &[Entry]) -> usize {
    let extra: usize = entries
        .iter()
        .filter(|e| e.data.len() > 4)
        .map(|e| e.data.len() + e.data.len() % 2)
        .sum();
    2 + 12 * entries.len() + 4 + extra
}

/// Append an IFD at the end of `out`; offsets are relative to `out[0]`.
fn write_ifd(out: &mut Vec<u8>, entries: &[Entry]) {
    let mut extra_at = out.len() + 2 + 12 * entries.len() + 4;
    let mut extra = vec![];
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for entry in entries {
        out.extend_from_slice(&entry.tag.to_le_bytes());
        out.extend_from_slice(&entry.kind.to_le_bytes());
        out.extend_from_slice(&entry.count.to_le_bytes());
        if entry.data.len() <= 4 {
            let mut inline = entry.data.clone();
            inline.resize(4, 0);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&(extra_at as u32).to_le_bytes());
            extra.extend_from_slice(&entry.data);
            if entry.data.len() % 2 == 1 {
                extra.push(0);
            }
            extra_at += entry.data.len() + entry.data.len() % 2;
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&extra);
}

/// GPS tags of a fixture, as (num, denom) rationals.
pub struct GpsFixture {
    pub latitude_ref: &'static str,
    pub latitude: [(u32, u32); 3],
    pub longitude_ref: &'static str,
    pub longitude: [(u32, u32); 3],
    pub altitude: (u32, u32),
}

/// Tags written into a synthetic EXIF block.
pub struct ExifFixture {
    pub exif_size: (u32, u32),
    pub image_size: (u32, u32),
    pub captured: &'static str,
    pub gps: Option<GpsFixture>,
}

impl ExifFixture {
    /// The Eiffel Tower, placed in the western hemisphere.
    pub fn paris() -> Self {
        Self {
            exif_size: (4000, 3000),
            image_size: (400, 300),
            captured: "2021:07:14 10:30:00",
            gps: Some(GpsFixture {
                latitude_ref: "N",
                latitude: [(48, 1), (51, 1), (295992, 10000)],
                longitude_ref: "W",
                longitude: [(2, 1), (17, 1), (4020, 100)],
                altitude: (3500, 100),
            }),
        }
    }

    pub fn without_gps(captured: &'static str) -> Self {
        Self {
            captured,
            gps: None,
            ..Self::paris()
        }
    }

    /// Little-endian TIFF structure holding the fixture's tags.
    pub fn tiff(&self) -> Vec<u8> {
        let exif = vec![
            Entry::ascii(0x9003, self.captured),
            Entry::long(0xa002, self.exif_size.0),
            Entry::long(0xa003, self.exif_size.1),
        ];
        let gps = self
            .gps
            .as_ref()
            .map(|gps| {
                vec![
                    Entry::ascii(0x0001, gps.latitude_ref),
                    Entry::rationals(0x0002, &gps.latitude),
                    Entry::ascii(0x0003, gps.longitude_ref),
                    Entry::rationals(0x0004, &gps.longitude),
                    Entry::rationals(0x0006, &[gps.altitude]),
                ]
            })
            .unwrap_or_default();

        let mut primary = vec![
            Entry::long(0x0100, self.image_size.0),
            Entry::long(0x0101, self.image_size.1),
            Entry::long(0x8769, 0),
        ];
        if !gps.is_empty() {
            primary.push(Entry::long(0x8825, 0));
        }
        let exif_at = 8 + ifd_len(&primary);
        let gps_at = exif_at + ifd_len(&exif);
        primary[2] = Entry::long(0x8769, exif_at as u32);
        if !gps.is_empty() {
            primary[3] = Entry::long(0x8825, gps_at as u32);
        }

        let mut out = b"II*\0".to_vec();
        out.extend_from_slice(&8u32.to_le_bytes());
        write_ifd(&mut out, &primary);
        write_ifd(&mut out, &exif);
        if !gps.is_empty() {
            write_ifd(&mut out, &gps);
        }
        out
    }
}

/// A smooth gradient image.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
    })
}

/// Deterministic noise, which compresses badly.
pub fn noise(width: u32, height: u32) -> RgbImage {
    let mut state = 0x2545_f491_u32;
    RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [a, b, c, _] = state.to_le_bytes();
        Rgb([a, b, c])
    })
}

pub fn encode_jpeg(image: &RgbImage) -> Vec<u8> {
    let mut bytes = vec![];
    JpegEncoder::new_with_quality(&mut bytes, 90)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .unwrap();
    bytes
}

/// A JPEG without any EXIF block.
pub fn plain_jpeg(width: u32, height: u32) -> Vec<u8> {
    encode_jpeg(&gradient(width, height))
}

/// A JPEG carrying `tiff` as its EXIF block.
pub fn jpeg_with_exif(width: u32, height: u32, tiff: &[u8]) -> Vec<u8> {
    embed_exif(plain_jpeg(width, height), tiff)
}

/// An XML element with its attributes, raw text and children.
#[derive(Debug, Default)]
pub struct Node {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Node>,
}

impl Node {
    fn open(start: &BytesStart<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attrs: start
                .attributes()
                .map(|a| {
                    let a = a.unwrap();
                    (
                        String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                        String::from_utf8_lossy(&a.value).into_owned(),
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    pub fn children_named(&self, name: &str) -> Vec<&Node> {
        self.children.iter().filter(|c| c.name == name).collect()
    }

    /// All descendants called `name`, in document order.
    pub fn find_all(&self, name: &str) -> Vec<&Node> {
        let mut found = vec![];
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            found.extend(child.find_all(name));
        }
        found
    }
}

/// Parse `xml` into a tree below an unnamed root node.
///
/// Text is unescaped; attribute values are kept as written.
pub fn parse_xml(xml: &str) -> Node {
    let mut reader = Reader::from_str(xml);
    let mut stack = vec![Node::default()];
    loop {
        match reader.read_event().unwrap() {
            Event::Start(start) => stack.push(Node::open(&start)),
            Event::Empty(start) => stack.last_mut().unwrap().children.push(Node::open(&start)),
            Event::Text(text) => stack
                .last_mut()
                .unwrap()
                .text
                .push_str(&String::from_utf8_lossy(&text)),
            Event::GeneralRef(entity) => {
                let resolved = match &*entity {
                    b"lt" => "<",
                    b"gt" => ">",
                    b"amp" => "&",
                    b"quot" => "\"",
                    b"apos" => "'",
                    other => panic!("unexpected entity {}", String::from_utf8_lossy(other)),
                };
                stack.last_mut().unwrap().text.push_str(resolved);
            }
            Event::End(_) => {
                let node = stack.pop().unwrap();
                stack.last_mut().unwrap().children.push(node);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    stack.pop().unwrap()
}
