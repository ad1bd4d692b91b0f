use inkpin_shared::{ChannelEvent, Comment};

use crate::error::{Error, Result};
use crate::mask::MaskSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

/// The transport underneath a sync session. Connecting and reconnecting live outside.
pub trait Channel {
    fn send_binary(&self, payload: &[u8]) -> Result<()>;
    fn close(&self);
}

/// What the session has to do about an inbound event.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Refetch,
    Comment(Comment),
    Mask(String),
}

pub struct SyncController<C> {
    picture_id: String,
    channel: Option<C>,
    state: ChannelState,
    synchronized: bool,
    delivered: usize,
}

impl<C: Channel> SyncController<C> {
    pub fn new(picture_id: impl Into<String>) -> Self {
        Self {
            picture_id: picture_id.into(),
            channel: None,
            state: ChannelState::Disconnected,
            synchronized: false,
            delivered: 0,
        }
    }

    pub fn picture_id(&self) -> &str {
        &self.picture_id
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn attach(&mut self, channel: C) {
        if self.state != ChannelState::Disconnected || self.channel.is_some() {
            log::warn!(
                "channel for {} already attached (state {:?})",
                self.picture_id,
                self.state
            );
            return;
        }
        self.channel = Some(channel);
        self.state = ChannelState::Connecting;
    }

    pub fn on_open(&mut self) {
        if self.state == ChannelState::Connecting {
            log::info!("channel open picture={}", self.picture_id);
            self.state = ChannelState::Open;
        }
    }

    /// Transport loss ends the session; no events are delivered afterwards.
    pub fn on_drop(&mut self) {
        if matches!(self.state, ChannelState::Connecting | ChannelState::Open) {
            log::warn!("channel dropped picture={}", self.picture_id);
            self.state = ChannelState::Disconnected;
            self.channel = None;
        }
    }

    pub fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.state = ChannelState::Closed;
    }

    pub fn on_message(&mut self, text: &str) -> Option<Inbound> {
        match self.state {
            ChannelState::Open => {}
            ChannelState::Connecting => {
                log::debug!("channel message arrived before open picture={}", self.picture_id);
                self.state = ChannelState::Open;
            }
            ChannelState::Disconnected | ChannelState::Closed => return None,
        }
        let event = match ChannelEvent::decode(text) {
            Ok(event) => event,
            Err(error) => {
                log::warn!("discarding channel message: {error}");
                return None;
            }
        };
        log::debug!("channel event {}", event.kind());
        let inbound = match event {
            ChannelEvent::Pic { .. } if self.synchronized => {
                log::debug!("picture {} already synchronized", self.picture_id);
                None
            }
            ChannelEvent::Pic { .. } => Some(Inbound::Refetch),
            ChannelEvent::Comment { comment } => Some(Inbound::Comment(comment)),
            ChannelEvent::Mask { url } => Some(Inbound::Mask(url)),
            ChannelEvent::Error { message } => {
                log::warn!("channel reported error: {message}");
                None
            }
        };
        if inbound.is_some() {
            self.delivered += 1;
        }
        inbound
    }

    pub fn send(&self, payload: &[u8]) -> Result<()> {
        match (&self.channel, self.state) {
            (Some(channel), ChannelState::Open) => channel.send_binary(payload),
            _ => Err(Error::Transport(
                "The live connection is not open, strokes were kept.".to_string(),
            )),
        }
    }

    /// First full snapshot of this picture wins; later ones are no-ops.
    pub fn claim_snapshot(&mut self, picture_id: &str) -> bool {
        if picture_id != self.picture_id {
            log::warn!(
                "snapshot for {picture_id} does not belong to session {}",
                self.picture_id
            );
            return false;
        }
        if self.synchronized {
            return false;
        }
        self.synchronized = true;
        true
    }
}

impl<C: Channel> MaskSink for SyncController<C> {
    fn send_mask(&mut self, payload: Vec<u8>) -> Result<()> {
        self.send(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeChannel;

    fn open_controller() -> (SyncController<FakeChannel>, FakeChannel) {
        let channel = FakeChannel::default();
        let mut sync = SyncController::new("abc");
        sync.attach(channel.clone());
        sync.on_open();
        (sync, channel)
    }

    #[test]
    fn lifecycle_walks_connecting_open_closed() {
        let channel = FakeChannel::default();
        let mut sync = SyncController::new("abc");
        assert_eq!(sync.state(), ChannelState::Disconnected);
        sync.attach(channel.clone());
        assert_eq!(sync.state(), ChannelState::Connecting);
        sync.on_open();
        assert_eq!(sync.state(), ChannelState::Open);
        sync.close();
        assert_eq!(sync.state(), ChannelState::Closed);
        assert!(channel.closed.get());
        sync.on_open();
        assert_eq!(sync.state(), ChannelState::Closed);
    }

    #[test]
    fn routes_each_known_event_kind() {
        let (mut sync, _) = open_controller();
        assert_eq!(
            sync.on_message(r#"{"event":"pic","pic":{"id":"abc","url":"a.png"}}"#),
            Some(Inbound::Refetch)
        );
        assert_eq!(
            sync.on_message(r#"{"event":"mask","url":"m.png"}"#),
            Some(Inbound::Mask("m.png".to_string()))
        );
        let comment = sync
            .on_message(
                r#"{"event":"comment","comment":{"left":1,"top":2,"message":"hi","timestamp":3}}"#,
            )
            .unwrap();
        assert!(matches!(comment, Inbound::Comment(ref c) if c.message == "hi"));
        assert_eq!(sync.delivered(), 3);
    }

    #[test]
    fn protocol_noise_is_discarded() {
        let (mut sync, _) = open_controller();
        assert_eq!(sync.on_message("{{nope"), None);
        assert_eq!(sync.on_message(r#"{"event":"presence"}"#), None);
        assert_eq!(sync.on_message(r#"{"event":"error","message":"bad"}"#), None);
        assert_eq!(sync.state(), ChannelState::Open);
        assert_eq!(sync.delivered(), 0);
    }

    #[test]
    fn message_before_open_counts_as_open() {
        let mut sync = SyncController::new("abc");
        sync.attach(FakeChannel::default());
        sync.on_message(r#"{"event":"mask","url":"m.png"}"#);
        assert_eq!(sync.state(), ChannelState::Open);
    }

    #[test]
    fn dropped_channel_stops_delivery_and_sends() {
        let (mut sync, channel) = open_controller();
        sync.on_drop();
        assert_eq!(sync.state(), ChannelState::Disconnected);
        assert_eq!(sync.on_message(r#"{"event":"mask","url":"m.png"}"#), None);
        assert!(matches!(sync.send(b"png"), Err(Error::Transport(_))));
        assert!(channel.sent.borrow().is_empty());
    }

    #[test]
    fn sends_forward_to_the_open_channel() {
        let (mut sync, channel) = open_controller();
        sync.send_mask(vec![1, 2, 3]).unwrap();
        assert_eq!(*channel.sent.borrow(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn only_the_first_snapshot_claim_wins() {
        let (mut sync, _) = open_controller();
        assert!(!sync.claim_snapshot("other"));
        assert!(sync.claim_snapshot("abc"));
        assert!(!sync.claim_snapshot("abc"));
        assert_eq!(
            sync.on_message(r#"{"event":"pic","pic":{"id":"abc","url":"a.png"}}"#),
            None
        );
    }
}
