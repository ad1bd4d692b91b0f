use std::collections::HashSet;

use inkpin_shared::{Comment, CommentDraft};

use crate::error::{Error, Result, EMPTY_COMMENT};
use crate::geometry::{normalize_point, to_local, to_viewport, LayerRect, Point, PositionKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

/// Rendered widget of one comment thread: a marker plus a collapsible body.
pub trait ThreadView {
    fn place(&mut self, local: Point, viewport: Point);
    fn insert_comment(&mut self, index: usize, comment: &Comment);
    fn set_body_open(&mut self, open: bool);
    fn set_marker_visible(&mut self, visible: bool);
    fn set_pending(&mut self, pending: bool);
    fn destroy(&mut self);
}

pub trait ThreadFactory {
    type View: ThreadView;

    fn create(&mut self, id: ThreadId, anchor: PositionKey) -> Result<Self::View>;
}

pub struct CommentThread<V> {
    id: ThreadId,
    anchor: PositionKey,
    comments: Vec<Comment>,
    open: bool,
    pending: bool,
    view: V,
}

impl<V: ThreadView> CommentThread<V> {
    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn anchor(&self) -> PositionKey {
        self.anchor
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    fn insert(&mut self, comment: Comment) -> bool {
        if self.comments.contains(&comment) {
            return false;
        }
        let index = self
            .comments
            .partition_point(|held| held.timestamp <= comment.timestamp);
        self.view.insert_comment(index, &comment);
        self.comments.insert(index, comment);
        true
    }

    fn set_open(&mut self, open: bool) {
        self.open = open;
        self.view.set_body_open(open);
    }
}

pub struct CommentBoardRegistry<F: ThreadFactory> {
    factory: F,
    threads: Vec<CommentThread<F::View>>,
    rect: LayerRect,
    markers_visible: bool,
    next_id: u32,
}

impl<F: ThreadFactory> CommentBoardRegistry<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            threads: Vec::new(),
            rect: LayerRect::default(),
            markers_visible: true,
            next_id: 1,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    pub fn threads(&self) -> &[CommentThread<F::View>] {
        &self.threads
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn thread(&self, id: ThreadId) -> Option<&CommentThread<F::View>> {
        self.threads.iter().find(|thread| thread.id == id)
    }

    pub fn thread_at(&self, position: Point) -> Option<&CommentThread<F::View>> {
        let key = PositionKey::quantize(position);
        self.threads.iter().find(|thread| thread.anchor == key)
    }

    pub fn layer_rect(&self) -> LayerRect {
        self.rect
    }

    pub fn markers_visible(&self) -> bool {
        self.markers_visible
    }

    /// Moves every widget to where its anchor now sits on screen.
    pub fn set_layer_rect(&mut self, rect: LayerRect) {
        self.rect = rect;
        for thread in &mut self.threads {
            let local = thread.anchor.point();
            thread.view.place(local, to_viewport(local, &rect));
        }
    }

    /// Finds the thread anchored at the rounded `position` (image-relative), creating it if absent.
    pub fn resolve_thread(&mut self, position: Point) -> Result<&mut CommentThread<F::View>> {
        let position = normalize_point(position)
            .ok_or_else(|| Error::Protocol("comment position is not finite".to_string()))?;
        let key = PositionKey::quantize(position);
        let index = match self.threads.iter().position(|thread| thread.anchor == key) {
            Some(index) => index,
            None => {
                let id = ThreadId(self.next_id);
                let mut view = self.factory.create(id, key)?;
                self.next_id += 1;
                let local = key.point();
                view.place(local, to_viewport(local, &self.rect));
                view.set_body_open(false);
                view.set_marker_visible(self.markers_visible);
                self.threads.push(CommentThread {
                    id,
                    anchor: key,
                    comments: Vec::new(),
                    open: false,
                    pending: false,
                    view,
                });
                log::debug!("thread {id:?} created at {},{}", key.x, key.y);
                self.threads.len() - 1
            }
        };
        Ok(&mut self.threads[index])
    }

    /// Files `comment` into the thread at its position. Returns false for a replayed duplicate.
    pub fn add_comment(&mut self, comment: Comment) -> Result<bool> {
        let position = Point::new(comment.left, comment.top);
        let thread = self.resolve_thread(position)?;
        Ok(thread.insert(comment))
    }

    /// Creates every thread the batch implies first, then files the comments.
    pub fn add_batch(&mut self, comments: Vec<Comment>) -> Result<usize> {
        let mut seen = HashSet::new();
        for comment in &comments {
            let position = Point::new(comment.left, comment.top);
            let Some(position) = normalize_point(position) else {
                continue;
            };
            if seen.insert(PositionKey::quantize(position)) {
                self.resolve_thread(position)?;
            }
        }
        let mut added = 0;
        for comment in comments {
            match self.add_comment(comment) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(Error::Protocol(reason)) => log::warn!("skipping stored comment: {reason}"),
                Err(error) => return Err(error),
            }
        }
        Ok(added)
    }

    pub fn remove_empty_threads(&mut self) -> usize {
        let mut removed = 0;
        self.threads.retain_mut(|thread| {
            if thread.is_empty() {
                thread.view.destroy();
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Handles a click on the comments layer: drops derelict empty threads, then opens the
    /// thread under the click, creating it when needed.
    pub fn open_at(&mut self, viewport: Point) -> Result<Option<ThreadId>> {
        let local = to_local(viewport, &self.rect);
        if !self.rect.contains_local(local) {
            return Ok(None);
        }
        self.remove_empty_threads();
        let id = self.resolve_thread(local)?.id;
        self.focus(id);
        Ok(Some(id))
    }

    /// Opens `id`'s body and collapses every other body. Markers are left alone.
    pub fn focus(&mut self, id: ThreadId) -> bool {
        if self.thread(id).is_none() {
            return false;
        }
        for thread in &mut self.threads {
            if thread.id == id {
                thread.view.set_marker_visible(true);
            }
            thread.set_open(thread.id == id);
        }
        true
    }

    /// Empty threads are destroyed; others only collapse. Returns true when the thread is gone.
    pub fn close(&mut self, id: ThreadId) -> bool {
        let Some(index) = self.threads.iter().position(|thread| thread.id == id) else {
            return false;
        };
        if self.threads[index].is_empty() {
            let mut thread = self.threads.remove(index);
            thread.view.destroy();
            return true;
        }
        self.threads[index].set_open(false);
        false
    }

    pub fn show_all(&mut self, visible: bool) {
        self.markers_visible = visible;
        for thread in &mut self.threads {
            thread.view.set_marker_visible(visible);
            if !visible {
                thread.set_open(false);
            }
        }
    }

    pub fn begin_submit(&mut self, id: ThreadId, message: &str) -> Result<CommentDraft> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::InvalidInput(EMPTY_COMMENT.to_string()));
        }
        let thread = self
            .threads
            .iter_mut()
            .find(|thread| thread.id == id)
            .ok_or_else(|| Error::Widget(format!("thread {} is gone", id.0)))?;
        thread.pending = true;
        thread.view.set_pending(true);
        Ok(CommentDraft {
            left: thread.anchor.x,
            top: thread.anchor.y,
            message: message.to_string(),
        })
    }

    pub fn finish_submit(&mut self, id: ThreadId) {
        if let Some(thread) = self.threads.iter_mut().find(|thread| thread.id == id) {
            thread.pending = false;
            thread.view.set_pending(false);
        }
    }

    pub fn clear(&mut self) {
        for mut thread in self.threads.drain(..) {
            thread.view.destroy();
        }
    }
}
