#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

pub fn normalize_point(point: Point) -> Option<Point> {
    if !point.x.is_finite() || !point.y.is_finite() {
        return None;
    }
    Some(point)
}

/// Screen rectangle of an annotation layer, in viewport coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LayerRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl LayerRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn contains_local(&self, point: Point) -> bool {
        point.x >= 0.0 && point.y >= 0.0 && point.x <= self.width && point.y <= self.height
    }

    pub fn same_size(&self, other: &LayerRect) -> bool {
        self.width == other.width && self.height == other.height
    }
}

// Image-relative coordinates have their origin at the layer's top-left corner.
pub fn to_local(point: Point, rect: &LayerRect) -> Point {
    Point {
        x: point.x - rect.left,
        y: point.y - rect.top,
    }
}

pub fn to_viewport(point: Point, rect: &LayerRect) -> Point {
    Point {
        x: point.x + rect.left,
        y: point.y + rect.top,
    }
}

/// Offset that centers a `width`x`height` layer inside a container of the given size.
pub fn center_offset(container_width: f64, container_height: f64, width: f64, height: f64) -> Point {
    Point {
        x: ((container_width - width) / 2.0).round(),
        y: ((container_height - height) / 2.0).round(),
    }
}

/// Integer-pixel position a comment thread is anchored at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionKey {
    pub x: i32,
    pub y: i32,
}

impl PositionKey {
    pub fn quantize(point: Point) -> Self {
        Self {
            x: point.x.round() as i32,
            y: point.y.round() as i32,
        }
    }

    pub fn point(self) -> Point {
        Point {
            x: f64::from(self.x),
            y: f64::from(self.y),
        }
    }
}
