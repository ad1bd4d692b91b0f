/// What a rendered layer is, fixed when the layer is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Picture,
    Mask,
    Drawing,
    Comments,
    Control,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub kind: LayerKind,
    pub source: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LayerChange {
    Insert {
        index: usize,
        kind: LayerKind,
        source: Option<String>,
    },
    Replace {
        kind: LayerKind,
        source: Option<String>,
    },
    Remove {
        kind: LayerKind,
    },
}

/// Bottom-to-top model of the annotation stack. Mutations are queued as `LayerChange`s for
/// the renderer to apply.
pub struct LayerStack {
    layers: Vec<Layer>,
    changes: Vec<LayerChange>,
}

impl Default for LayerStack {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStack {
    pub fn new() -> Self {
        let layers = [
            LayerKind::Picture,
            LayerKind::Drawing,
            LayerKind::Comments,
            LayerKind::Control,
        ]
        .into_iter()
        .map(|kind| Layer { kind, source: None })
        .collect();
        Self {
            layers,
            changes: Vec::new(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn position(&self, kind: LayerKind) -> Option<usize> {
        self.layers.iter().position(|layer| layer.kind == kind)
    }

    pub fn count(&self, kind: LayerKind) -> usize {
        self.layers.iter().filter(|layer| layer.kind == kind).count()
    }

    pub fn source(&self, kind: LayerKind) -> Option<&str> {
        self.layers
            .iter()
            .find(|layer| layer.kind == kind)
            .and_then(|layer| layer.source.as_deref())
    }

    pub fn set_picture(&mut self, url: &str) -> bool {
        self.replace_source(LayerKind::Picture, Some(url.to_string()))
    }

    /// Shows `url` as the single mask layer, directly under the control layer.
    pub fn show_mask(&mut self, url: &str) -> bool {
        if self.position(LayerKind::Mask).is_some() {
            return self.replace_source(LayerKind::Mask, Some(url.to_string()));
        }
        let index = self
            .position(LayerKind::Control)
            .unwrap_or(self.layers.len());
        let source = Some(url.to_string());
        self.layers.insert(
            index,
            Layer {
                kind: LayerKind::Mask,
                source: source.clone(),
            },
        );
        self.changes.push(LayerChange::Insert {
            index,
            kind: LayerKind::Mask,
            source,
        });
        true
    }

    pub fn clear_mask(&mut self) -> bool {
        let Some(index) = self.position(LayerKind::Mask) else {
            return false;
        };
        self.layers.remove(index);
        self.changes.push(LayerChange::Remove {
            kind: LayerKind::Mask,
        });
        true
    }

    pub fn drain_changes(&mut self) -> Vec<LayerChange> {
        std::mem::take(&mut self.changes)
    }

    fn replace_source(&mut self, kind: LayerKind, source: Option<String>) -> bool {
        let Some(layer) = self.layers.iter_mut().find(|layer| layer.kind == kind) else {
            return false;
        };
        if layer.source == source {
            return false;
        }
        layer.source = source.clone();
        self.changes.push(LayerChange::Replace { kind, source });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(stack: &LayerStack) -> Vec<LayerKind> {
        stack.layers().iter().map(|layer| layer.kind).collect()
    }

    #[test]
    fn mask_lands_between_picture_and_control() {
        let mut stack = LayerStack::new();
        stack.show_mask("mask.png");
        let kinds = kinds(&stack);
        let mask = stack.position(LayerKind::Mask).unwrap();
        assert!(stack.position(LayerKind::Picture).unwrap() < mask);
        assert_eq!(kinds[mask + 1], LayerKind::Control);
    }

    #[test]
    fn repeated_masks_replace_rather_than_stack() {
        let mut stack = LayerStack::new();
        assert!(stack.show_mask("mask-1.png"));
        assert!(!stack.show_mask("mask-1.png"));
        assert!(stack.show_mask("mask-2.png"));
        assert_eq!(stack.count(LayerKind::Mask), 1);
        assert_eq!(stack.source(LayerKind::Mask), Some("mask-2.png"));
        assert_eq!(
            stack.drain_changes(),
            vec![
                LayerChange::Insert {
                    index: 3,
                    kind: LayerKind::Mask,
                    source: Some("mask-1.png".to_string()),
                },
                LayerChange::Replace {
                    kind: LayerKind::Mask,
                    source: Some("mask-2.png".to_string()),
                },
            ]
        );
        assert!(stack.drain_changes().is_empty());
    }

    #[test]
    fn clearing_removes_the_mask_once() {
        let mut stack = LayerStack::new();
        stack.show_mask("mask.png");
        assert!(stack.clear_mask());
        assert!(!stack.clear_mask());
        assert_eq!(stack.count(LayerKind::Mask), 0);
    }
}
