use inkpin_shared::{CommentDraft, Picture};

use crate::comments::{CommentBoardRegistry, ThreadFactory, ThreadId};
use crate::error::{Error, Result, PUBLISH_FROM_MENU};
use crate::geometry::{to_local, LayerRect, Point};
use crate::layers::LayerStack;
use crate::mask::MaskPipeline;
use crate::palette::BrushColor;
use crate::render::DrawingSurface;
use crate::state::{ErrorTicket, InputRoute, Mode, ModeMachine};
use crate::stroke::{CommitTicket, StrokeSession};
use crate::sync::{Channel, Inbound, SyncController};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Applied { comments: usize },
    AlreadySynchronized,
    Stale,
}

/// Everything annotating one picture needs, owned in one place and rebuilt when the picture
/// is superseded.
pub struct AnnotationSession<S, F: ThreadFactory, C> {
    picture: Option<Picture>,
    modes: ModeMachine,
    layers: LayerStack,
    strokes: StrokeSession,
    masks: MaskPipeline,
    surface: S,
    comments: CommentBoardRegistry<F>,
    sync: Option<SyncController<C>>,
    // Set once the channel delivered a mask; the page-load snapshot may predate it.
    remote_mask: bool,
    rect: LayerRect,
}

impl<S, F, C> AnnotationSession<S, F, C>
where
    S: DrawingSurface,
    F: ThreadFactory,
    C: Channel,
{
    pub fn new(surface: S, factory: F) -> Self {
        Self {
            picture: None,
            modes: ModeMachine::new(),
            layers: LayerStack::new(),
            strokes: StrokeSession::new(),
            masks: MaskPipeline::new(),
            surface,
            comments: CommentBoardRegistry::new(factory),
            sync: None,
            remote_mask: false,
            rect: LayerRect::default(),
        }
    }

    pub fn picture(&self) -> Option<&Picture> {
        self.picture.as_ref()
    }

    pub fn picture_id(&self) -> Option<&str> {
        self.sync.as_ref().map(|sync| sync.picture_id())
    }

    pub fn modes(&self) -> &ModeMachine {
        &self.modes
    }

    pub fn modes_mut(&mut self) -> &mut ModeMachine {
        &mut self.modes
    }

    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut LayerStack {
        &mut self.layers
    }

    pub fn strokes(&self) -> &StrokeSession {
        &self.strokes
    }

    pub fn masks(&self) -> &MaskPipeline {
        &self.masks
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn comments(&self) -> &CommentBoardRegistry<F> {
        &self.comments
    }

    pub fn comments_mut(&mut self) -> &mut CommentBoardRegistry<F> {
        &mut self.comments
    }

    pub fn sync(&self) -> Option<&SyncController<C>> {
        self.sync.as_ref()
    }

    pub fn layer_rect(&self) -> LayerRect {
        self.rect
    }

    /// Makes `picture_id` the active picture. Everything tied to the previous picture is torn down and
    /// a fresh, not yet synchronized sync session is opened for the new identifier.
    pub fn bind_picture(&mut self, picture_id: &str) {
        if let Some(mut previous) = self.sync.take() {
            log::info!(
                "picture {} superseded by {picture_id}",
                previous.picture_id()
            );
            previous.close();
        }
        self.comments.clear();
        self.layers.clear_mask();
        self.strokes.discard();
        self.surface.clear();
        self.picture = None;
        self.remote_mask = false;
        self.sync = Some(SyncController::new(picture_id));
    }

    pub fn attach_channel(&mut self, channel: C) {
        match self.sync.as_mut() {
            Some(sync) => sync.attach(channel),
            None => channel.close(),
        }
    }

    pub fn channel_opened(&mut self) {
        if let Some(sync) = self.sync.as_mut() {
            sync.on_open();
        }
    }

    pub fn channel_dropped(&mut self) {
        if let Some(sync) = self.sync.as_mut() {
            sync.on_drop();
        }
    }

    pub fn close(&mut self) {
        if let Some(sync) = self.sync.as_mut() {
            sync.close();
        }
    }

    /// Renders the canonical picture state unless this picture load was already synchronized.
    /// A snapshot that fails halfway is not claimed, so a later one can complete it.
    pub fn apply_snapshot(&mut self, picture: Picture) -> Result<SnapshotOutcome> {
        match self.sync.as_ref() {
            None => return Ok(SnapshotOutcome::Stale),
            Some(sync) if picture.id != sync.picture_id() => return Ok(SnapshotOutcome::Stale),
            Some(sync) if sync.is_synchronized() => {
                return Ok(SnapshotOutcome::AlreadySynchronized)
            }
            Some(_) => {}
        }
        self.layers.set_picture(&picture.url);
        match picture.mask.as_deref() {
            Some(mask) if self.remote_mask => {
                log::debug!("snapshot mask {mask} predates the channel's mask, skipped")
            }
            Some(mask) => self.apply_mask(mask),
            None => {}
        }
        let comments = self.comments.add_batch(picture.comments.clone())?;
        if let Some(sync) = self.sync.as_mut() {
            sync.claim_snapshot(&picture.id);
        }
        log::info!(
            "picture {} synchronized comments={comments} mask={}",
            picture.id,
            picture.mask.is_some()
        );
        self.picture = Some(picture);
        Ok(SnapshotOutcome::Applied { comments })
    }

    /// Applies one inbound channel message. Returns the picture id to re-fetch when the
    /// message asks for canonical state.
    pub fn handle_message(&mut self, text: &str) -> Result<Option<String>> {
        let Some(sync) = self.sync.as_mut() else {
            return Ok(None);
        };
        let Some(inbound) = sync.on_message(text) else {
            return Ok(None);
        };
        match inbound {
            Inbound::Refetch => Ok(Some(sync.picture_id().to_string())),
            Inbound::Comment(comment) => {
                self.comments.add_comment(comment)?;
                Ok(None)
            }
            Inbound::Mask(url) => {
                self.remote_mask = true;
                self.apply_mask(&url);
                Ok(None)
            }
        }
    }

    // A stroke still being drawn or waiting on its timer is not part of any mask yet.
    fn apply_mask(&mut self, url: &str) {
        if self.strokes.is_drawing() || self.strokes.pending().is_some() {
            self.masks.show(url, &mut self.layers);
        } else {
            self.masks
                .apply_remote(url, &mut self.surface, &mut self.layers);
        }
    }

    /// Resizing wipes the surface, so strokes not yet committed are committed first.
    pub fn set_layer_rect(&mut self, rect: LayerRect) -> Result<()> {
        let mut flushed = Ok(());
        if !self.rect.same_size(&rect) {
            flushed = self.flush_strokes();
            self.surface.resize(rect.width, rect.height);
        }
        self.rect = rect;
        self.comments.set_layer_rect(rect);
        flushed
    }

    fn flush_strokes(&mut self) -> Result<()> {
        let ticket = if self.strokes.is_drawing() {
            self.strokes.end()
        } else {
            self.strokes.pending()
        };
        let Some(ticket) = ticket else {
            return Ok(());
        };
        log::debug!("layer resized, committing {ticket:?} early");
        self.commit_due(ticket).map(|_| ()).map_err(|error| {
            log::warn!("early commit failed: {error}");
            Error::Transport("The drawing could not be saved before the page was resized.".to_string())
        })
    }

    pub fn set_color(&mut self, color: BrushColor) {
        self.strokes.set_color(color);
    }

    pub fn pointer_down(&mut self, viewport: Point) -> bool {
        if self.modes.route() != InputRoute::Strokes {
            return false;
        }
        let local = to_local(viewport, &self.rect);
        self.strokes
            .begin(self.modes.current(), local, &mut self.surface)
    }

    pub fn pointer_move(&mut self, viewport: Point) -> bool {
        if self.modes.route() != InputRoute::Strokes {
            return false;
        }
        let local = to_local(viewport, &self.rect);
        self.strokes.extend(local, &mut self.surface)
    }

    pub fn pointer_up(&mut self) -> Option<CommitTicket> {
        self.strokes.end()
    }

    /// Timer callback: flattens the surface into a mask if `ticket` is still current.
    pub fn commit_due(&mut self, ticket: CommitTicket) -> Result<bool> {
        if !self.strokes.fire(ticket) {
            return Ok(false);
        }
        let Some(sync) = self.sync.as_mut() else {
            return Err(Error::Transport(
                "There is no picture to save the drawing to.".to_string(),
            ));
        };
        self.masks.commit(&mut self.surface, sync)
    }

    pub fn click(&mut self, viewport: Point) -> Result<Option<ThreadId>> {
        if self.modes.route() != InputRoute::Comments {
            return Ok(None);
        }
        self.comments.open_at(viewport)
    }

    pub fn submit_comment(&mut self, thread: ThreadId, message: &str) -> Result<(String, CommentDraft)> {
        let picture_id = self
            .picture_id()
            .map(str::to_string)
            .ok_or_else(|| Error::Transport("There is no picture to comment on.".to_string()))?;
        let draft = self.comments.begin_submit(thread, message)?;
        Ok((picture_id, draft))
    }

    pub fn comment_submitted(&mut self, thread: ThreadId, outcome: Result<()>) -> Result<()> {
        self.comments.finish_submit(thread);
        outcome
    }

    /// A file dropped onto the page may only replace the picture from publication mode.
    pub fn accept_drop(&self) -> Result<()> {
        if self.picture_id().is_some() && self.modes.current() != Mode::Publication {
            return Err(Error::InvalidInput(PUBLISH_FROM_MENU.to_string()));
        }
        Ok(())
    }

    /// Routes a component failure by its class. Returns the error mode entry when one was made.
    pub fn report(&mut self, error: &Error) -> Option<ErrorTicket> {
        if !error.is_user_visible() {
            log::warn!("{error}");
            return None;
        }
        log::error!("{error}");
        Some(self.modes.enter_error(error.to_string()))
    }

    /// Auto-dismiss timer callback for an invalid-input error.
    pub fn error_expired(&mut self, ticket: ErrorTicket) -> Option<Mode> {
        self.modes.expire_error(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerKind;
    use crate::testing::{FakeChannel, FakeThreadFactory, Mark, RecordingSurface};
    use inkpin_shared::Comment;

    type TestSession = AnnotationSession<RecordingSurface, FakeThreadFactory, FakeChannel>;

    const RECT: LayerRect = LayerRect {
        left: 40.0,
        top: 16.0,
        width: 800.0,
        height: 600.0,
    };

    fn picture(id: &str) -> Picture {
        Picture {
            id: id.to_string(),
            url: format!("https://store/{id}.png"),
            ..Default::default()
        }
    }

    fn live_session(id: &str) -> (TestSession, FakeChannel) {
        let mut session = TestSession::new(RecordingSurface::default(), FakeThreadFactory::default());
        session.set_layer_rect(RECT).unwrap();
        session.bind_picture(id);
        let channel = FakeChannel::default();
        session.attach_channel(channel.clone());
        session.channel_opened();
        (session, channel)
    }

    fn vp(x: f64, y: f64) -> Point {
        Point::new(x + RECT.left, y + RECT.top)
    }

    #[test]
    fn page_load_scenario_builds_one_thread_and_one_mask() {
        let (mut session, _) = live_session("abc");
        let mut stored = picture("abc");
        stored.mask = Some("mask.png".to_string());
        stored.comments = vec![
            Comment {
                left: 100.0,
                top: 50.0,
                message: "hi".to_string(),
                timestamp: 0,
            },
            Comment {
                left: 100.0,
                top: 50.0,
                message: "there".to_string(),
                timestamp: 0,
            },
        ];

        let outcome = session.apply_snapshot(stored.clone()).unwrap();
        assert_eq!(outcome, SnapshotOutcome::Applied { comments: 2 });
        assert_eq!(session.comments().len(), 1);
        let thread = session.comments().thread_at(Point::new(100.0, 50.0)).unwrap();
        let messages: Vec<_> = thread.comments().iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, ["hi", "there"]);
        assert_eq!(session.layers().count(LayerKind::Mask), 1);
        assert_eq!(session.layers().source(LayerKind::Mask), Some("mask.png"));

        // The channel's own picture event and a late second load change nothing.
        let refetch = session
            .handle_message(r#"{"event":"pic","pic":{"id":"abc","url":"x"}}"#)
            .unwrap();
        assert_eq!(refetch, None);
        assert_eq!(
            session.apply_snapshot(stored).unwrap(),
            SnapshotOutcome::AlreadySynchronized
        );
        assert_eq!(session.comments().threads()[0].comments().len(), 2);
        assert_eq!(session.layers().count(LayerKind::Mask), 1);
    }

    #[test]
    fn picture_event_before_load_requests_a_refetch() {
        let (mut session, _) = live_session("abc");
        let refetch = session
            .handle_message(r#"{"event":"pic","pic":{"id":"abc","url":"x"}}"#)
            .unwrap();
        assert_eq!(refetch.as_deref(), Some("abc"));
    }

    #[test]
    fn snapshot_for_a_superseded_picture_is_stale() {
        let (mut session, _) = live_session("abc");
        session.bind_picture("def");
        assert_eq!(
            session.apply_snapshot(picture("abc")).unwrap(),
            SnapshotOutcome::Stale
        );
    }

    #[test]
    fn comment_event_racing_the_snapshot_is_not_duplicated() {
        let (mut session, _) = live_session("abc");
        session
            .handle_message(
                r#"{"event":"comment","comment":{"left":10,"top":10,"message":"hey","timestamp":4}}"#,
            )
            .unwrap();
        let mut stored = picture("abc");
        stored.comments = vec![Comment {
            left: 10.0,
            top: 10.0,
            message: "hey".to_string(),
            timestamp: 4,
        }];
        assert_eq!(
            session.apply_snapshot(stored).unwrap(),
            SnapshotOutcome::Applied { comments: 0 }
        );
        assert_eq!(session.comments().threads()[0].comments().len(), 1);
    }

    #[test]
    fn strokes_within_the_debounce_window_commit_once() {
        let (mut session, channel) = live_session("abc");
        session.modes_mut().enter_draw();

        session.pointer_down(vp(0.0, 0.0));
        session.pointer_move(vp(10.0, 0.0));
        let first = session.pointer_up().unwrap();
        session.pointer_down(vp(20.0, 20.0));
        session.pointer_move(vp(30.0, 20.0));
        let second = session.pointer_up().unwrap();

        assert_eq!(session.commit_due(first), Ok(false));
        assert_eq!(session.commit_due(second), Ok(true));
        let sent = channel.sent.borrow();
        assert_eq!(sent.len(), 1);
        let expected = format!(
            "{:?}",
            vec![
                Mark::Dot(Point::new(0.0, 0.0)),
                Mark::Segment(Point::new(0.0, 0.0), Point::new(10.0, 0.0)),
                Mark::Dot(Point::new(20.0, 20.0)),
                Mark::Segment(Point::new(20.0, 20.0), Point::new(30.0, 20.0)),
            ]
        );
        assert_eq!(sent[0], expected.into_bytes());
        assert!(session.surface().is_blank());
    }

    #[test]
    fn failed_commit_keeps_strokes_and_enters_error() {
        let (mut session, _) = live_session("abc");
        session.modes_mut().enter_draw();
        session.channel_dropped();
        session.pointer_down(vp(1.0, 1.0));
        let ticket = session.pointer_up().unwrap();
        let error = session.commit_due(ticket).unwrap_err();
        assert!(session.report(&error).is_some());
        assert_eq!(session.modes().current(), Mode::Error);
        assert_eq!(session.modes().interrupted(), Some(Mode::Draw));
        assert!(!session.surface().is_blank());
    }

    #[test]
    fn draw_mode_never_touches_comments() {
        let (mut session, _) = live_session("abc");
        session.modes_mut().enter_draw();
        session.pointer_down(vp(5.0, 5.0));
        session.pointer_move(vp(6.0, 6.0));
        session.pointer_up();
        assert_eq!(session.click(vp(5.0, 5.0)).unwrap(), None);
        assert!(session.comments().is_empty());
        assert!(!session.surface().is_blank());
    }

    #[test]
    fn comment_mode_never_rasterizes() {
        let (mut session, _) = live_session("abc");
        session.modes_mut().enter_comment();
        assert!(!session.pointer_down(vp(5.0, 5.0)));
        assert!(!session.pointer_move(vp(6.0, 6.0)));
        assert!(session.pointer_up().is_none());
        assert!(session.click(vp(5.0, 5.0)).unwrap().is_some());
        assert!(session.surface().is_blank());
        assert_eq!(session.comments().len(), 1);
    }

    #[test]
    fn remote_mask_clears_idle_surface_only() {
        let (mut session, _) = live_session("abc");
        session.modes_mut().enter_draw();
        session.pointer_down(vp(1.0, 1.0));
        session.handle_message(r#"{"event":"mask","url":"m1.png"}"#).unwrap();
        assert!(!session.surface().is_blank());
        let ticket = session.pointer_up().unwrap();
        session.commit_due(ticket).unwrap();
        session.handle_message(r#"{"event":"mask","url":"m2.png"}"#).unwrap();
        session.handle_message(r#"{"event":"mask","url":"m2.png"}"#).unwrap();
        assert_eq!(session.layers().count(LayerKind::Mask), 1);
        assert_eq!(session.layers().source(LayerKind::Mask), Some("m2.png"));
    }

    #[test]
    fn rebinding_tears_down_the_previous_picture() {
        let (mut session, channel) = live_session("abc");
        let mut stored = picture("abc");
        stored.mask = Some("mask.png".to_string());
        stored.comments = vec![Comment {
            left: 1.0,
            top: 1.0,
            message: "a".to_string(),
            timestamp: 0,
        }];
        session.apply_snapshot(stored).unwrap();

        session.bind_picture("def");
        assert!(channel.closed.get());
        assert!(session.comments().is_empty());
        assert_eq!(session.layers().count(LayerKind::Mask), 0);
        assert_eq!(session.picture_id(), Some("def"));
        assert!(session.picture().is_none());
        assert!(!session.sync().unwrap().is_synchronized());

        session.apply_snapshot(picture("def")).unwrap();
        assert_eq!(
            session.layers().source(LayerKind::Picture),
            Some("https://store/def.png")
        );
    }

    #[test]
    fn drops_outside_publication_are_rejected() {
        let (mut session, _) = live_session("abc");
        session.modes_mut().enter_comment();
        assert!(matches!(session.accept_drop(), Err(Error::InvalidInput(_))));
        session.modes_mut().enter_publication();
        assert!(session.accept_drop().is_ok());
    }

    #[test]
    fn protocol_errors_do_not_change_mode() {
        let (mut session, _) = live_session("abc");
        session.modes_mut().enter_comment();
        assert!(session.report(&Error::Protocol("junk".into())).is_none());
        assert_eq!(session.modes().current(), Mode::Comment);
    }

    #[test]
    fn comment_submission_uses_the_thread_anchor() {
        let (mut session, _) = live_session("abc");
        session.modes_mut().enter_comment();
        let thread = session.click(vp(100.0, 50.0)).unwrap().unwrap();
        let (id, draft) = session.submit_comment(thread, "nice").unwrap();
        assert_eq!(id, "abc");
        assert_eq!((draft.left, draft.top), (100, 50));
        let failed = session.comment_submitted(thread, Err(Error::Transport("503".into())));
        assert!(failed.is_err());
        assert!(!session.comments().thread(thread).unwrap().is_pending());
    }

    #[test]
    fn snapshot_older_than_a_channel_mask_keeps_the_newer_mask() {
        let (mut session, _) = live_session("abc");
        session
            .handle_message(r#"{"event":"mask","url":"abc-mask-2.png"}"#)
            .unwrap();
        let mut stored = picture("abc");
        stored.mask = Some("abc-mask-1.png".to_string());
        session.apply_snapshot(stored).unwrap();
        assert_eq!(session.layers().count(LayerKind::Mask), 1);
        assert_eq!(
            session.layers().source(LayerKind::Mask),
            Some("abc-mask-2.png")
        );
    }

    #[test]
    fn half_built_snapshot_can_be_completed_later() {
        let (mut session, _) = live_session("abc");
        let mut stored = picture("abc");
        stored.comments = vec![
            Comment {
                left: 1.0,
                top: 1.0,
                message: "a".to_string(),
                timestamp: 0,
            },
            Comment {
                left: 9.0,
                top: 9.0,
                message: "b".to_string(),
                timestamp: 1,
            },
        ];
        session.comments_mut().factory_mut().fail_next = true;

        assert!(matches!(
            session.apply_snapshot(stored.clone()),
            Err(Error::Widget(_))
        ));
        assert!(!session.sync().unwrap().is_synchronized());
        assert_eq!(
            session.apply_snapshot(stored).unwrap(),
            SnapshotOutcome::Applied { comments: 2 }
        );
        assert_eq!(session.comments().len(), 2);
        assert!(session.sync().unwrap().is_synchronized());
    }

    #[test]
    fn resize_commits_pending_strokes_first() {
        let (mut session, channel) = live_session("abc");
        session.modes_mut().enter_draw();
        session.pointer_down(vp(1.0, 1.0));
        session.pointer_move(vp(4.0, 1.0));
        let ticket = session.pointer_up().unwrap();

        let wider = LayerRect {
            width: 1024.0,
            ..RECT
        };
        session.set_layer_rect(wider).unwrap();
        assert_eq!(channel.sent.borrow().len(), 1);
        assert!(session.surface().is_blank());
        assert_eq!(session.commit_due(ticket), Ok(false));
        assert_eq!(channel.sent.borrow().len(), 1);
    }

    #[test]
    fn resize_reports_strokes_it_could_not_save() {
        let (mut session, _) = live_session("abc");
        session.modes_mut().enter_draw();
        session.channel_dropped();
        session.pointer_down(vp(1.0, 1.0));

        let wider = LayerRect {
            width: 1024.0,
            ..RECT
        };
        assert!(matches!(
            session.set_layer_rect(wider),
            Err(Error::Transport(_))
        ));
        assert!(!session.strokes().is_drawing());
        assert!(session.set_layer_rect(wider).is_ok());
    }

    #[test]
    fn invalid_input_errors_expire_back_to_the_interrupted_mode() {
        let (mut session, _) = live_session("abc");
        session.modes_mut().enter_comment();
        let error = session.accept_drop().unwrap_err();
        assert!(error.auto_dismisses());
        let ticket = session.report(&error).unwrap();
        assert_eq!(session.modes().current(), Mode::Error);

        assert_eq!(session.error_expired(ticket), Some(Mode::Comment));
        assert_eq!(session.modes().current(), Mode::Comment);
        assert_eq!(session.modes().message(), None);
    }

    #[test]
    fn a_newer_error_outlives_the_older_timer() {
        let (mut session, _) = live_session("abc");
        session.modes_mut().enter_comment();
        let older = session
            .report(&Error::InvalidInput("first".into()))
            .unwrap();
        session.report(&Error::Transport("store down".into())).unwrap();
        assert_eq!(session.error_expired(older), None);
        assert_eq!(session.modes().message(), Some("store down"));
    }
}
