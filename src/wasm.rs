//! JavaScript bindings. A `Reducer` wraps one [`Session`]; encoded images
//! travel as PNG bytes in `Uint8Array`s and errors surface as strings.

use js_sys::{Array, Object, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;

use crate::document::PageSize;
use crate::error::ReduceError;
use crate::session::Session;

fn js_error(e: ReduceError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[wasm_bindgen]
pub struct Reducer {
    session: Session,
}

#[wasm_bindgen]
impl Reducer {
    /// Decode `input` (PNG, JPEG, ...) as the source image.
    #[wasm_bindgen(constructor)]
    pub fn new(input: Vec<u8>) -> Result<Reducer, JsValue> {
        let mut session = Session::new();
        session.load_bytes(&input).map_err(js_error)?;
        Ok(Reducer { session })
    }

    /// Reduce to `n_colors` and return `{ image, palette }`.
    pub fn quantize(&mut self, n_colors: usize) -> Result<Object, JsValue> {
        self.session.quantize(n_colors).map_err(js_error)?;

        let result = Object::new();
        let image: Uint8Array = self.image()?;
        let palette: Array = self.palette()?;
        Reflect::set(&result, &JsValue::from_str("image"), &image)?;
        Reflect::set(&result, &JsValue::from_str("palette"), &palette)?;
        Ok(result)
    }

    /// Palette as lowercase `#rrggbb` strings in cluster order.
    pub fn palette(&self) -> Result<Array, JsValue> {
        let palette_js = Array::new();
        for hex in self.session.palette_hex().map_err(js_error)? {
            palette_js.push(&JsValue::from_str(&hex));
        }
        Ok(palette_js)
    }

    /// `[{ color, percentage }, ...]` in cluster order.
    pub fn distribution(&self) -> Result<Array, JsValue> {
        let rows = Array::new();
        for entry in self.session.distribution().map_err(js_error)? {
            let row = Object::new();
            Reflect::set(&row, &JsValue::from_str("color"), &JsValue::from_str(&entry.hex()))?;
            Reflect::set(
                &row,
                &JsValue::from_str("percentage"),
                &JsValue::from_f64(entry.percentage),
            )?;
            rows.push(&row);
        }
        Ok(rows)
    }

    #[wasm_bindgen(js_name = setOverride)]
    pub fn set_override(&mut self, cluster_id: usize, hex: &str) -> Result<(), JsValue> {
        self.session.set_override_hex(cluster_id, hex).map_err(js_error)
    }

    /// Override the cluster currently shown as `old_hex`; returns its id.
    #[wasm_bindgen(js_name = replaceColor)]
    pub fn replace_color(&mut self, old_hex: &str, new_hex: &str) -> Result<usize, JsValue> {
        self.session
            .replace_palette_color(old_hex, new_hex)
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = clearOverrides)]
    pub fn clear_overrides(&mut self) -> Result<(), JsValue> {
        self.session.clear_overrides().map_err(js_error)
    }

    /// Tolerance recolor of the working image; returns the number of
    /// pixels changed.
    pub fn substitute(
        &mut self,
        target: &str,
        replacement: &str,
        tolerance: Option<f64>,
    ) -> Result<usize, JsValue> {
        self.session
            .substitute_hex(target, replacement, tolerance)
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = clearSubstitutions)]
    pub fn clear_substitutions(&mut self) -> Result<(), JsValue> {
        self.session.clear_substitutions().map_err(js_error)
    }

    /// Working image as PNG.
    pub fn image(&self) -> Result<Uint8Array, JsValue> {
        let png = self.session.encode_png().map_err(js_error)?;
        Ok(Uint8Array::from(png.as_slice()))
    }

    /// PDF bytes for `page_size` ("A0".."A4").
    #[wasm_bindgen(js_name = renderPdf)]
    pub fn render_pdf(&self, page_size: &str) -> Result<Uint8Array, JsValue> {
        let page: PageSize = page_size.parse().map_err(js_error)?;
        let pdf = self.session.render_document(page).map_err(js_error)?;
        Ok(Uint8Array::from(pdf.as_slice()))
    }
}
