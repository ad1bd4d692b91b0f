use std::cell::{Cell, RefCell};
use std::rc::Rc;

use inkpin_shared::Comment;

use crate::comments::{ThreadFactory, ThreadId, ThreadView};
use crate::error::{Error, Result};
use crate::geometry::{Point, PositionKey};
use crate::mask::MaskSink;
use crate::palette::BrushColor;
use crate::render::{Brush, DrawingSurface};
use crate::sync::Channel;

#[derive(Clone, Debug, PartialEq)]
pub enum Mark {
    Dot(Point),
    Segment(Point, Point),
}

#[derive(Default)]
pub struct RecordingSurface {
    pub marks: Vec<Mark>,
    pub colors: Vec<BrushColor>,
    pub size: (f64, f64),
    pub fail_snapshot: bool,
}

impl DrawingSurface for RecordingSurface {
    fn dot(&mut self, at: Point, brush: &Brush) {
        self.marks.push(Mark::Dot(at));
        self.colors.push(brush.color);
    }

    fn segment(&mut self, from: Point, to: Point, brush: &Brush) {
        self.marks.push(Mark::Segment(from, to));
        self.colors.push(brush.color);
    }

    fn clear(&mut self) {
        self.marks.clear();
    }

    fn is_blank(&self) -> bool {
        self.marks.is_empty()
    }

    fn snapshot_png(&self) -> Result<Vec<u8>> {
        if self.fail_snapshot {
            return Err(Error::Transport("snapshot failed".to_string()));
        }
        Ok(format!("{:?}", self.marks).into_bytes())
    }

    fn resize(&mut self, width: f64, height: f64) {
        if self.size != (width, height) {
            self.size = (width, height);
            self.marks.clear();
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub sent: Vec<Vec<u8>>,
    pub fail_with: Option<Error>,
}

impl MaskSink for RecordingSink {
    fn send_mask(&mut self, payload: Vec<u8>) -> Result<()> {
        if let Some(error) = self.fail_with.clone() {
            return Err(error);
        }
        self.sent.push(payload);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeThreadView {
    pub local: Option<Point>,
    pub viewport: Option<Point>,
    pub comments: Vec<String>,
    pub open: bool,
    pub marker_visible: bool,
    pub pending: bool,
    destroyed: Rc<Cell<usize>>,
}

impl ThreadView for FakeThreadView {
    fn place(&mut self, local: Point, viewport: Point) {
        self.local = Some(local);
        self.viewport = Some(viewport);
    }

    fn insert_comment(&mut self, index: usize, comment: &Comment) {
        self.comments.insert(index, comment.message.clone());
    }

    fn set_body_open(&mut self, open: bool) {
        self.open = open;
    }

    fn set_marker_visible(&mut self, visible: bool) {
        self.marker_visible = visible;
    }

    fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    fn destroy(&mut self) {
        self.destroyed.set(self.destroyed.get() + 1);
    }
}

#[derive(Default)]
pub struct FakeThreadFactory {
    pub created: usize,
    pub fail_next: bool,
    pub destroyed: Rc<Cell<usize>>,
}

impl ThreadFactory for FakeThreadFactory {
    type View = FakeThreadView;

    fn create(&mut self, _id: ThreadId, _anchor: PositionKey) -> Result<FakeThreadView> {
        if self.fail_next {
            self.fail_next = false;
            return Err(Error::Widget("comments layer is detached".to_string()));
        }
        self.created += 1;
        Ok(FakeThreadView {
            destroyed: self.destroyed.clone(),
            ..Default::default()
        })
    }
}

#[derive(Clone, Default)]
pub struct FakeChannel {
    pub sent: Rc<RefCell<Vec<Vec<u8>>>>,
    pub closed: Rc<Cell<bool>>,
}

impl Channel for FakeChannel {
    fn send_binary(&self, payload: &[u8]) -> Result<()> {
        self.sent.borrow_mut().push(payload.to_vec());
        Ok(())
    }

    fn close(&self) {
        self.closed.set(true);
    }
}
