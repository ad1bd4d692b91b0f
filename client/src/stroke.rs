use crate::geometry::{normalize_point, Point};
use crate::palette::BrushColor;
use crate::render::{Brush, DrawingSurface};
use crate::state::Mode;

pub const COMMIT_DELAY_MS: u32 = 1000;

/// Identifies one armed commit timer. Only the most recently issued ticket can fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitTicket(u64);

#[derive(Default)]
pub struct StrokeSession {
    brush: Brush,
    path: Vec<Point>,
    drawing: bool,
    pending: Option<CommitTicket>,
    issued: u64,
}

impl StrokeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn set_color(&mut self, color: BrushColor) {
        self.brush.color = color;
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn path(&self) -> &[Point] {
        &self.path
    }

    pub fn pending(&self) -> Option<CommitTicket> {
        self.pending
    }

    pub fn begin<S: DrawingSurface>(&mut self, mode: Mode, point: Point, surface: &mut S) -> bool {
        if mode != Mode::Draw {
            return false;
        }
        let Some(point) = normalize_point(point) else {
            return false;
        };
        if let Some(ticket) = self.pending.take() {
            log::debug!("stroke resumed, commit {ticket:?} cancelled");
        }
        self.path.push(point);
        self.drawing = true;
        surface.dot(point, &self.brush);
        true
    }

    pub fn extend<S: DrawingSurface>(&mut self, point: Point, surface: &mut S) -> bool {
        if !self.drawing {
            return false;
        }
        let Some(point) = normalize_point(point) else {
            return false;
        };
        match self.path.last().copied() {
            Some(last) if last == point => return false,
            Some(last) => surface.segment(last, point, &self.brush),
            None => surface.dot(point, &self.brush),
        }
        self.path.push(point);
        true
    }

    /// Completes the current path and arms the commit timer, superseding any earlier one.
    pub fn end(&mut self) -> Option<CommitTicket> {
        if !self.drawing {
            return None;
        }
        self.drawing = false;
        self.issued += 1;
        let ticket = CommitTicket(self.issued);
        self.pending = Some(ticket);
        Some(ticket)
    }

    /// Returns true when `ticket` is still the armed timer and the surface should be committed.
    pub fn fire(&mut self, ticket: CommitTicket) -> bool {
        if self.drawing || self.pending != Some(ticket) {
            return false;
        }
        self.pending = None;
        self.path.clear();
        true
    }

    pub fn discard(&mut self) {
        self.pending = None;
        self.drawing = false;
        self.path.clear();
    }
}
