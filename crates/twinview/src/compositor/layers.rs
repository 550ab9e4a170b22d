use crate::host::{LayerIndex, LayerMask};

/// Layer most hosts draw their interface on.
pub const DEFAULT_UI_LAYER: LayerIndex = LayerIndex(5);

/// Pick a layer for player 2's interface: the highest index not claimed by
/// host content and not player 1's own UI layer.
pub fn pick_second_ui_layer(used: LayerMask, first_ui: LayerIndex) -> Option<LayerIndex> {
    (0..=LayerIndex::MAX.0)
        .rev()
        .map(LayerIndex)
        .find(|layer| *layer != first_ui && !used.contains(*layer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_highest_free_layer() {
        assert_eq!(
            pick_second_ui_layer(LayerMask::EMPTY, DEFAULT_UI_LAYER),
            Some(LayerIndex(31))
        );
    }

    #[test]
    fn skips_used_layers_and_first_ui_layer() {
        let used = LayerMask::single(LayerIndex(31)).with(LayerIndex(30));
        assert_eq!(pick_second_ui_layer(used, LayerIndex(29)), Some(LayerIndex(28)));
    }

    #[test]
    fn reports_exhaustion() {
        let used = LayerMask::ALL.without(LayerIndex(5));
        assert_eq!(pick_second_ui_layer(used, LayerIndex(5)), None);
    }
}
