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

//! This is a WASM wrapper for `geo_kml_builder`.

use wasm_bindgen::{prelude::wasm_bindgen, JsError};

/// This wraps `geo_kml_builder::write_tracks_kml` for interfacing with JS.
///
/// `table` is a CSV track table, the returned bytes are the KML document
/// called `name`.
#[wasm_bindgen]
pub fn convert(table: &[u8], name: &str) -> Result<Box<[u8]>, JsError> {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    let mut sink = vec![];
    geo_kml_builder::write_tracks_kml(table, name, &mut sink)?;
    Ok(sink.into_boxed_slice())
}
