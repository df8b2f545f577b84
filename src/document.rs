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

//! Assembly of the KML document.
//!
//! Tracks become _Placemarks_ with a styled _LineString_. Photos become
//! _PhotoOverlays_ whose camera sits at the photo's GPS position.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use kml::types::Element;
use kml::{Kml, KmlDocument, KmlVersion, KmlWriter};
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::gps::GpsFix;
use crate::metadata::PhotoMetadata;
use crate::palette::{self, Rgb};
use crate::track::Track;
use crate::Error;

/// This line needs to be prepended to the KML output.
const XML_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
/// Namespace attributes for the `<kml>` tag.
const NAMESPACES: &[(&str, &str)] = &[("xmlns", "http://www.opengis.net/kml/2.2")];
/// Spaces per nesting level of the written XML.
const INDENT: usize = 2;
/// Folder, relative to the KML file, holding the photos.
pub const IMG_DIR: &str = "img";
/// Name of the section holding photos when tracks are present as well.
pub const PICTURES: &str = "Pictures";
/// Name of the section holding tracks when photos are present as well.
pub const TRIPS: &str = "Trips";

const GROUND_LINE_WIDTH: u32 = 2;
const ELEVATED_LINE_WIDTH: u32 = 1;
const CAMERA_ALTITUDE: &str = "30";
const CAMERA_TILT: &str = "0";
/// Vertical half-angle of the view volume in degrees.
const HALF_FOV: f64 = 20.0;
const NEAR: &str = "10";

/// Use double precision for coordinate values.
type CoordValue = f64;

/// A photo which has been written next to the KML file.
#[derive(Debug, Clone, Default)]
pub struct PhotoAsset {
    pub source_path: PathBuf,
    /// Location of the (resized) copy. Only its file name ends up in the KML.
    pub destination_path: PathBuf,
    /// Decoded width and height of the copy.
    pub dimensions: Option<(u32, u32)>,
    pub gps: GpsFix,
    /// Raw TIFF/EXIF block of the source; may be empty.
    pub raw_exif: Vec<u8>,
}

impl PhotoAsset {
    /// Width and height for the view volume.
    ///
    /// The sizes recorded in `raw_exif` win over the decoded `dimensions`.
    pub fn resolved_dimensions(&self) -> Option<(u32, u32)> {
        PhotoMetadata::from_raw(self.raw_exif.clone())
            .and_then(|metadata| metadata.dimensions())
            .or(self.dimensions)
    }

    /// Width over height, if both are known and non-zero.
    fn aspect(&self) -> Option<f64> {
        match self.resolved_dimensions() {
            Some((w, h)) if w > 0 && h > 0 => Some(f64::from(w) / f64::from(h)),
            _ => None,
        }
    }
}

/// A named sub-document.
struct Section {
    name: String,
    elements: Vec<Kml<CoordValue>>,
}

/// Builder for one KML document.
///
/// Nodes are appended to the most recently opened section, or to the root
/// document while no section has been opened.
pub struct DocumentBuilder {
    name: String,
    elements: Vec<Kml<CoordValue>>,
    sections: Vec<Section>,
    photos: usize,
}

impl DocumentBuilder {
    /// Start a document called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: vec![],
            sections: vec![],
            photos: 0,
        }
    }

    /// Open a sub-document called `name`, which receives all following nodes.
    pub fn open_section(&mut self, name: impl Into<String>) {
        self.sections.push(Section {
            name: name.into(),
            elements: vec![],
        });
    }

    /// Number of photo overlays added so far.
    pub fn photo_count(&self) -> usize {
        self.photos
    }

    fn target(&mut self) -> &mut Vec<Kml<CoordValue>> {
        match self.sections.last_mut() {
            Some(section) => &mut section.elements,
            None => &mut self.elements,
        }
    }

    /// Add one placemark per track, coloured from `from` to `to`.
    pub fn add_tracks(&mut self, tracks: &[Track], from: &Rgb, to: &Rgb) {
        let colours = palette::palette(tracks.len(), from, to);
        for (track, colour) in tracks.iter().zip(colours) {
            self.add_track(track, colour.as_str());
        }
    }

    /// Add a line placemark for `track` drawn in `colour`.
    pub fn add_track(&mut self, track: &Track, colour: &str) {
        let (altitude_mode, width) = if track.is_elevated {
            ("absolute", ELEVATED_LINE_WIDTH)
        } else {
            ("clampToGround", GROUND_LINE_WIDTH)
        };

        let line = parent_element(
            "LineString",
            vec![
                simple_element("extrude", "1"),
                simple_element("altitudeMode", altitude_mode),
                simple_element("coordinates", track.coordinate_text()),
            ],
        );
        let style = parent_element(
            "Style",
            vec![parent_element(
                "LineStyle",
                vec![
                    simple_element("color", colour),
                    simple_element("width", width.to_string()),
                ],
            )],
        );

        self.target().push(Kml::Element(parent_element(
            "Placemark",
            vec![simple_element("name", track.name.as_str()), line, style],
        )));
    }

    /// Add a photo overlay for `photo`.
    ///
    /// Returns the zero-based id index of the overlay. Photos without usable
    /// dimensions are rejected.
    pub fn add_photo(&mut self, photo: &PhotoAsset) -> Result<usize, Error> {
        let aspect = photo
            .aspect()
            .ok_or_else(|| Error::MissingDimensions(photo.source_path.clone()))?;
        let index = self.photos;
        let id = format!("photo{index}");

        let file_name = photo
            .destination_path
            .file_name()
            .unwrap_or(photo.destination_path.as_os_str());
        let href = Path::new(IMG_DIR).join(file_name);
        let stem = Path::new(file_name).file_stem().unwrap_or(file_name);
        let gps = &photo.gps;

        let overlay = Element {
            name: "PhotoOverlay".to_string(),
            attrs: HashMap::from([("id".to_string(), id.clone())]),
            children: vec![
                simple_element("name", stem.to_string_lossy()),
                simple_element(
                    "description",
                    format!(r##"<a href="#{id}">Click here to fly into photo</a>"##),
                ),
                parent_element(
                    "Camera",
                    vec![
                        optional_element("longitude", gps.longitude()),
                        optional_element("latitude", gps.latitude()),
                        simple_element("altitude", CAMERA_ALTITUDE),
                        simple_element("tilt", CAMERA_TILT),
                    ],
                ),
                parent_element(
                    "Icon",
                    vec![simple_element("href", href_text(&href))],
                ),
                parent_element(
                    "ViewVolume",
                    vec![
                        simple_element("leftFov", (aspect * -HALF_FOV).to_string()),
                        simple_element("rightFov", (aspect * HALF_FOV).to_string()),
                        simple_element("bottomFov", (-HALF_FOV).to_string()),
                        simple_element("topFov", HALF_FOV.to_string()),
                        simple_element("near", NEAR),
                    ],
                ),
                parent_element(
                    "Point",
                    vec![simple_element("coordinates", point_coordinates(gps))],
                ),
            ],
            ..Default::default()
        };

        self.target().push(Kml::Element(overlay));
        self.photos += 1;
        Ok(index)
    }

    /// Assemble the complete KML tree.
    pub fn finish(self) -> Kml<CoordValue> {
        let mut elements = vec![simple_kelem("name", self.name)];
        elements.extend(self.elements);
        for section in self.sections {
            let mut children = vec![simple_kelem("name", section.name)];
            children.extend(section.elements);
            elements.push(Kml::Document {
                attrs: Default::default(),
                elements: children,
            });
        }

        let document = Kml::Document {
            elements,
            attrs: Default::default(),
        };
        let namespaces = NAMESPACES
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Kml::KmlDocument(KmlDocument {
            version: KmlVersion::V22,
            attrs: namespaces,
            elements: vec![document],
        })
    }

    /// Write the document as indented UTF-8 XML to `sink`.
    pub fn write(self, mut sink: impl io::Write) -> Result<(), Error> {
        let kml = self.finish();
        let mut raw = vec![];
        KmlWriter::from_writer(&mut raw).write(&kml)?;

        writeln!(&mut sink, "{XML_HEAD}")?;
        indent(&raw, &mut sink)?;
        writeln!(&mut sink)?;
        Ok(())
    }
}

/// Re-emit the XML in `raw` with [`INDENT`] spaces per level.
///
/// Text and entity references between two tags are written back as one text
/// node, still escaped, so that no line breaks end up inside element content.
/// Elements without content are written as empty tags.
fn indent(raw: &[u8], sink: impl io::Write) -> Result<(), Error> {
    let mut reader = Reader::from_reader(raw);
    let mut writer = Writer::new_with_indent(sink, b' ', INDENT);
    let mut text: Vec<u8> = vec![];
    let mut open = None;
    loop {
        let event = reader.read_event()?;
        match event {
            Event::Text(part) => text.extend_from_slice(&part),
            Event::GeneralRef(entity) => {
                text.push(b'&');
                text.extend_from_slice(&entity);
                text.push(b';');
            }
            event => {
                let blank = text.iter().all(u8::is_ascii_whitespace);
                if let Some(start) = open.take() {
                    if blank && matches!(event, Event::End(_)) {
                        writer.write_event(Event::Empty(start))?;
                        text.clear();
                        continue;
                    }
                    writer.write_event(Event::Start(start))?;
                }
                if !blank {
                    let escaped = String::from_utf8_lossy(&text);
                    writer.write_event(Event::Text(BytesText::from_escaped(escaped)))?;
                }
                text.clear();

                match event {
                    Event::Eof => break,
                    Event::Start(start) => open = Some(start),
                    event => writer.write_event(event)?,
                }
            }
        }
    }
    Ok(())
}

/// Relative link to a photo, always with forward slashes.
fn href_text(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// `lon,lat,alt` of a photo; unknown values are left empty.
fn point_coordinates(gps: &GpsFix) -> String {
    let show = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
    format!(
        "{},{},{}",
        show(gps.longitude()),
        show(gps.latitude()),
        gps.altitude()
    )
}

/// Create a simple KML element with `name` and `content`.
fn simple_kelem(name: impl Into<String>, content: impl Into<String>) -> Kml<CoordValue> {
    Kml::Element(simple_element(name, content))
}

/// Create a simple KML element with `name` and `content`.
fn simple_element(name: impl Into<String>, content: impl Into<String>) -> Element {
    Element {
        name: name.into(),
        content: Some(content.into()),
        ..Default::default()
    }
}

/// Create an element which is empty if `value` is unknown.
fn optional_element(name: impl Into<String>, value: Option<f64>) -> Element {
    Element {
        name: name.into(),
        content: value.map(|v| v.to_string()),
        ..Default::default()
    }
}

/// Create a KML element holding `children`.
fn parent_element(name: impl Into<String>, children: Vec<Element>) -> Element {
    Element {
        name: name.into(),
        children,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{parse_xml, ExifFixture, Node};
    use crate::track::{group, TrackPoint};

    fn written(builder: DocumentBuilder) -> String {
        let mut sink = vec![];
        builder.write(&mut sink).unwrap();
        String::from_utf8(sink).unwrap()
    }

    fn tracks() -> Vec<Track> {
        let row = |name: &str, keep: bool, lon: f64, lat: f64| TrackPoint {
            track_name: name.to_string(),
            keep_elevation: keep,
            time: None,
            lat,
            lon,
            elevation: Some(250.0),
        };
        group(&[
            row("Walk", false, 2.29, 48.85),
            row("Flight", true, 7.5, 45.0),
            row("Walk", false, 2.3, 48.86),
        ])
    }

    fn photo(name: &str, dimensions: Option<(u32, u32)>, gps: GpsFix) -> PhotoAsset {
        PhotoAsset {
            source_path: PathBuf::from("input").join(name),
            destination_path: PathBuf::from("out").join(IMG_DIR).join(name),
            dimensions,
            gps,
            raw_exif: vec![],
        }
    }

    fn line_string(placemark: &Node) -> &Node {
        placemark.child("LineString").unwrap()
    }

    #[test]
    fn styles_tracks_by_elevation() {
        let mut builder = DocumentBuilder::new("trip");
        builder.add_tracks(&tracks(), &Rgb::RED, &Rgb::BLUE);
        let xml = written(builder);
        let root = parse_xml(&xml);

        let placemarks = root.find_all("Placemark");
        assert_eq!(placemarks.len(), 2);

        let walk = placemarks[0];
        assert_eq!(walk.child_text("name"), Some("Walk"));
        assert_eq!(line_string(walk).child_text("altitudeMode"), Some("clampToGround"));
        assert_eq!(line_string(walk).child_text("extrude"), Some("1"));
        let lines: Vec<_> = line_string(walk)
            .child_text("coordinates")
            .unwrap()
            .lines()
            .map(str::trim)
            .collect();
        assert_eq!(lines, ["2.29,48.85", "2.3,48.86"]);
        let style = walk.find_all("LineStyle")[0];
        assert_eq!(style.child_text("width"), Some("2"));
        assert_eq!(style.child_text("color"), Some("99ff0000"));

        let flight = placemarks[1];
        assert_eq!(line_string(flight).child_text("altitudeMode"), Some("absolute"));
        assert_eq!(
            line_string(flight).child_text("coordinates").map(str::trim),
            Some("7.5,45,250")
        );
        let style = flight.find_all("LineStyle")[0];
        assert_eq!(style.child_text("width"), Some("1"));
        assert_eq!(style.child_text("color"), Some("990000ff"));
    }

    #[test]
    fn photo_overlay_layout() {
        let mut builder = DocumentBuilder::new("trip");
        let gps = GpsFix::located(48.5, -2.25, 35.0);
        assert_eq!(builder.add_photo(&photo("a.jpg", Some((4000, 2000)), gps)).unwrap(), 0);
        assert_eq!(
            builder
                .add_photo(&photo("b.jpg", Some((300, 300)), GpsFix::unlocated()))
                .unwrap(),
            1
        );
        let root = parse_xml(&written(builder));

        let overlays = root.find_all("PhotoOverlay");
        assert_eq!(overlays.len(), 2);

        let first = overlays[0];
        assert_eq!(first.attr("id"), Some("photo0"));
        assert_eq!(first.child_text("name"), Some("a"));
        assert!(first.child_text("description").unwrap().contains("#photo0"));
        assert_eq!(first.child("Icon").unwrap().child_text("href"), Some("img/a.jpg"));
        let camera = first.child("Camera").unwrap();
        assert_eq!(camera.child_text("longitude"), Some("-2.25"));
        assert_eq!(camera.child_text("latitude"), Some("48.5"));
        assert_eq!(camera.child_text("altitude"), Some("30"));
        assert_eq!(camera.child_text("tilt"), Some("0"));
        let volume = first.child("ViewVolume").unwrap();
        assert_eq!(volume.child_text("leftFov"), Some("-40"));
        assert_eq!(volume.child_text("rightFov"), Some("40"));
        assert_eq!(volume.child_text("bottomFov"), Some("-20"));
        assert_eq!(volume.child_text("topFov"), Some("20"));
        assert_eq!(volume.child_text("near"), Some("10"));
        assert_eq!(
            first.child("Point").unwrap().child_text("coordinates"),
            Some("-2.25,48.5,35")
        );

        let second = overlays[1];
        assert_eq!(second.attr("id"), Some("photo1"));
        let camera = second.child("Camera").unwrap();
        assert_eq!(camera.child_text("longitude"), Some(""));
        assert_eq!(camera.child_text("latitude"), Some(""));
        assert_eq!(
            second.child("Point").unwrap().child_text("coordinates"),
            Some(",,0")
        );
    }

    #[test]
    fn rejects_photo_without_dimensions() {
        let mut builder = DocumentBuilder::new("trip");
        let result = builder.add_photo(&photo("a.jpg", None, GpsFix::unlocated()));
        assert!(matches!(result, Err(Error::MissingDimensions(_))));
        let result = builder.add_photo(&photo("b.jpg", Some((10, 0)), GpsFix::unlocated()));
        assert!(matches!(result, Err(Error::MissingDimensions(_))));

        assert_eq!(builder.add_photo(&photo("c.jpg", Some((10, 10)), GpsFix::unlocated())).unwrap(), 0);
        assert_eq!(builder.photo_count(), 1);
    }

    #[test]
    fn keeps_special_characters_in_text() {
        let mut builder = DocumentBuilder::new("A & B <trip>");
        let tracks = group(&[TrackPoint {
            track_name: "Tom & Jerry".to_string(),
            keep_elevation: false,
            time: None,
            lat: 48.85,
            lon: 2.29,
            elevation: None,
        }]);
        builder.add_tracks(&tracks, &Rgb::RED, &Rgb::BLUE);
        builder
            .add_photo(&photo("a.jpg", Some((3, 2)), GpsFix::unlocated()))
            .unwrap();
        let xml = written(builder);

        assert!(xml.contains("<name>A &amp; B &lt;trip&gt;</name>"));
        assert!(xml.contains("<name>Tom &amp; Jerry</name>"));
        assert!(xml.contains("<longitude/>"));

        let root = parse_xml(&xml);
        let document = root.child("kml").unwrap().child("Document").unwrap();
        assert_eq!(document.child_text("name"), Some("A & B <trip>"));
        assert_eq!(
            root.find_all("Placemark")[0].child_text("name"),
            Some("Tom & Jerry")
        );
        let overlay = root.find_all("PhotoOverlay")[0];
        assert_eq!(
            overlay.child_text("description"),
            Some(r##"<a href="#photo0">Click here to fly into photo</a>"##)
        );
        let camera = overlay.child("Camera").unwrap();
        assert_eq!(camera.child_text("longitude"), Some(""));
        assert_eq!(camera.child_text("latitude"), Some(""));
    }

    #[test]
    fn exif_dimensions_win_over_decoded_size() {
        let mut asset = photo("a.jpg", Some((300, 300)), GpsFix::unlocated());
        assert_eq!(asset.resolved_dimensions(), Some((300, 300)));

        asset.raw_exif = ExifFixture::paris().tiff();
        assert_eq!(asset.resolved_dimensions(), Some((4000, 3000)));
        let mut builder = DocumentBuilder::new("trip");
        builder.add_photo(&asset).unwrap();
        let root = parse_xml(&written(builder));
        let volume = root.find_all("ViewVolume")[0];
        let left: f64 = volume.child_text("leftFov").unwrap().parse().unwrap();
        assert!((left + 80.0 / 3.0).abs() < 1e-9);

        asset.raw_exif = ExifFixture {
            exif_size: (0, 0),
            ..ExifFixture::paris()
        }
        .tiff();
        let mut builder = DocumentBuilder::new("trip");
        assert!(matches!(
            builder.add_photo(&asset),
            Err(Error::MissingDimensions(_))
        ));
    }

    #[test]
    fn sections_nest_in_order() {
        let mut builder = DocumentBuilder::new("holiday");
        builder.open_section(PICTURES);
        builder
            .add_photo(&photo("a.jpg", Some((3, 2)), GpsFix::unlocated()))
            .unwrap();
        builder.open_section(TRIPS);
        builder.add_tracks(&tracks(), &Rgb::RED, &Rgb::BLUE);
        let root = parse_xml(&written(builder));

        let document = root.child("kml").unwrap().child("Document").unwrap();
        assert_eq!(document.child_text("name"), Some("holiday"));
        let sections = document.children_named("Document");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].child_text("name"), Some(PICTURES));
        assert_eq!(sections[0].children_named("PhotoOverlay").len(), 1);
        assert_eq!(sections[1].child_text("name"), Some(TRIPS));
        assert_eq!(sections[1].children_named("Placemark").len(), 2);
    }

    #[test]
    fn writes_indented_xml() {
        let mut builder = DocumentBuilder::new("trip");
        builder.add_tracks(&tracks(), &Rgb::RED, &Rgb::BLUE);
        let xml = written(builder);

        let mut lines = xml.lines();
        assert_eq!(lines.next(), Some(XML_HEAD));
        assert!(lines.next().unwrap().starts_with("<kml"));
        assert_eq!(lines.next(), Some("  <Document>"));
        assert_eq!(lines.next(), Some("    <name>trip</name>"));
        assert!(xml.contains(r#"xmlns="http://www.opengis.net/kml/2.2""#));
        assert!(!xml.contains('\r'));
    }
}
