use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use crate::error::{Error, Result};
use crate::geometry::Point;
use crate::palette::BrushColor;

pub const BRUSH_RADIUS: f64 = 4.0;
const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Brush {
    pub color: BrushColor,
    pub radius: f64,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            color: BrushColor::default(),
            radius: BRUSH_RADIUS,
        }
    }
}

/// The persistent raster strokes are drawn onto before they are flattened into a mask.
/// Coordinates are layer-local.
pub trait DrawingSurface {
    fn dot(&mut self, at: Point, brush: &Brush);
    fn segment(&mut self, from: Point, to: Point, brush: &Brush);
    fn clear(&mut self);
    fn is_blank(&self) -> bool;
    fn snapshot_png(&self) -> Result<Vec<u8>>;
    fn resize(&mut self, width: f64, height: f64);
}

pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    blank: bool,
}

impl CanvasSurface {
    pub fn new(canvas: HtmlCanvasElement) -> std::result::Result<Self, JsValue> {
        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("Missing canvas context"))?
            .dyn_into::<CanvasRenderingContext2d>()?;
        let surface = Self {
            canvas,
            ctx,
            blank: true,
        };
        surface.reset_pen();
        Ok(surface)
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }

    fn reset_pen(&self) {
        self.ctx.set_line_cap("round");
        self.ctx.set_line_join("round");
    }
}

impl DrawingSurface for CanvasSurface {
    fn dot(&mut self, at: Point, brush: &Brush) {
        self.ctx.set_fill_style_str(brush.color.hex());
        self.ctx.begin_path();
        let _ = self
            .ctx
            .arc(at.x, at.y, brush.radius / 2.0, 0.0, std::f64::consts::PI * 2.0);
        self.ctx.fill();
        self.blank = false;
    }

    fn segment(&mut self, from: Point, to: Point, brush: &Brush) {
        self.ctx.set_stroke_style_str(brush.color.hex());
        self.ctx.set_line_width(brush.radius);
        self.ctx.begin_path();
        self.ctx.move_to(from.x, from.y);
        self.ctx.line_to(to.x, to.y);
        self.ctx.stroke();
        self.blank = false;
    }

    fn clear(&mut self) {
        self.ctx.clear_rect(
            0.0,
            0.0,
            f64::from(self.canvas.width()),
            f64::from(self.canvas.height()),
        );
        self.blank = true;
    }

    fn is_blank(&self) -> bool {
        self.blank
    }

    fn snapshot_png(&self) -> Result<Vec<u8>> {
        let url = self.canvas.to_data_url_with_type("image/png")?;
        let encoded = url
            .strip_prefix(PNG_DATA_URL_PREFIX)
            .ok_or_else(|| Error::Transport("Canvas did not produce a PNG".to_string()))?;
        STANDARD
            .decode(encoded)
            .map_err(|error| Error::Transport(format!("Canvas PNG is not valid base64: {error}")))
    }

    fn resize(&mut self, width: f64, height: f64) {
        let width = width.max(0.0).round() as u32;
        let height = height.max(0.0).round() as u32;
        if self.canvas.width() == width && self.canvas.height() == height {
            return;
        }
        // Resizing a canvas wipes its pixels and its context state.
        self.canvas.set_width(width);
        self.canvas.set_height(height);
        self.reset_pen();
        self.blank = true;
    }
}
