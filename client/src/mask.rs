use crate::error::Result;
use crate::layers::LayerStack;
use crate::render::DrawingSurface;

/// Outbound side of the message channel, as seen by the mask pipeline.
pub trait MaskSink {
    fn send_mask(&mut self, payload: Vec<u8>) -> Result<()>;
}

#[derive(Default)]
pub struct MaskPipeline {
    committed: usize,
    applied: usize,
}

impl MaskPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed(&self) -> usize {
        self.committed
    }

    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Sends the surface as a PNG mask. The surface is cleared only once the payload is handed
    /// off; on failure the strokes stay on it for the next attempt.
    pub fn commit<S, K>(&mut self, surface: &mut S, sink: &mut K) -> Result<bool>
    where
        S: DrawingSurface,
        K: MaskSink,
    {
        if surface.is_blank() {
            return Ok(false);
        }
        let payload = surface.snapshot_png()?;
        let bytes = payload.len();
        sink.send_mask(payload)?;
        surface.clear();
        self.committed += 1;
        log::info!("mask committed bytes={bytes}");
        Ok(true)
    }

    pub fn apply_remote<S: DrawingSurface>(
        &mut self,
        url: &str,
        surface: &mut S,
        layers: &mut LayerStack,
    ) -> bool {
        surface.clear();
        self.show(url, layers)
    }

    /// Swaps the mask layer without touching the drawing surface.
    pub fn show(&mut self, url: &str, layers: &mut LayerStack) -> bool {
        let changed = layers.show_mask(url);
        if changed {
            self.applied += 1;
            log::debug!("mask layer now {url}");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::geometry::Point;
    use crate::layers::LayerKind;
    use crate::render::Brush;
    use crate::testing::{RecordingSink, RecordingSurface};

    fn scribbled() -> RecordingSurface {
        let mut surface = RecordingSurface::default();
        surface.segment(Point::new(0.0, 0.0), Point::new(4.0, 4.0), &Brush::default());
        surface
    }

    #[test]
    fn successful_commit_clears_the_surface() {
        let mut surface = scribbled();
        let mut sink = RecordingSink::default();
        let mut pipeline = MaskPipeline::new();
        assert_eq!(pipeline.commit(&mut surface, &mut sink), Ok(true));
        assert_eq!(sink.sent.len(), 1);
        assert!(surface.is_blank());
    }

    #[test]
    fn failed_commit_keeps_the_strokes() {
        let mut surface = scribbled();
        let mut sink = RecordingSink {
            fail_with: Some(Error::Transport("channel closed".into())),
            ..Default::default()
        };
        let mut pipeline = MaskPipeline::new();
        assert!(pipeline.commit(&mut surface, &mut sink).is_err());
        assert!(!surface.is_blank());
        assert_eq!(pipeline.committed(), 0);
    }

    #[test]
    fn blank_surface_sends_nothing() {
        let mut surface = RecordingSurface::default();
        let mut sink = RecordingSink::default();
        assert_eq!(MaskPipeline::new().commit(&mut surface, &mut sink), Ok(false));
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn applying_the_same_url_twice_keeps_one_layer() {
        let mut surface = scribbled();
        let mut layers = LayerStack::new();
        let mut pipeline = MaskPipeline::new();
        assert!(pipeline.apply_remote("mask.png", &mut surface, &mut layers));
        assert!(!pipeline.apply_remote("mask.png", &mut surface, &mut layers));
        assert_eq!(layers.count(LayerKind::Mask), 1);
        assert_eq!(layers.source(LayerKind::Mask), Some("mask.png"));
        assert!(surface.is_blank());
        assert_eq!(pipeline.applied(), 1);
    }
}
