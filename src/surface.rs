use std::ops::RangeInclusive;

/// Measurements reported by the rendering surface after each layout or scroll.
///
/// All extents are in the surface's own unit along the scroll axis (rows,
/// columns, pixels). `offset` is the scroll position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceMetrics {
    pub visible: Option<RangeInclusive<usize>>,
    /// Item under the viewport's centre line, if the surface knows it.
    pub center_item: Option<usize>,
    /// How far the viewport's leading edge sits inside the first visible item.
    pub leading_item_offset: f32,
    /// Left-to-right and vertical modes: distance from the start of the
    /// content to the viewport's leading edge.
    ///
    /// Right-to-left: distance from the left end of the content to the
    /// viewport's leading (right) edge. The first page therefore sits at
    /// `content_extent` and the last at `viewport_extent`. This is not the
    /// raw horizontal scroll position, which would put the last page at 0.
    pub offset: f32,
    pub content_extent: f32,
    pub viewport_extent: f32,
}

impl SurfaceMetrics {
    /// Metrics for `item_count` items of identical extent laid out end to end.
    pub fn uniform(offset: f32, item_extent: f32, viewport_extent: f32, item_count: usize) -> Self {
        let content_extent = item_extent * item_count as f32;
        if item_count == 0 || item_extent <= 0.0 {
            return Self { offset, content_extent, viewport_extent, ..Self::default() };
        }
        let last = item_count - 1;
        let item_at = |pos: f32| ((pos.max(0.0) / item_extent).floor() as usize).min(last);
        let first = item_at(offset);
        let end = item_at((offset + viewport_extent - f32::EPSILON).max(offset));
        Self {
            visible: Some(first..=end),
            center_item: Some(item_at(offset + viewport_extent / 2.0)),
            leading_item_offset: offset.max(0.0) - first as f32 * item_extent,
            offset,
            content_extent,
            viewport_extent,
        }
    }

    pub fn first_visible(&self) -> Option<usize> {
        self.visible.as_ref().map(|range| *range.start())
    }

    pub fn last_visible(&self) -> Option<usize> {
        self.visible.as_ref().map(|range| *range.end())
    }

    /// Scrollable distance left before the leading edge of the content.
    pub fn distance_to_start(&self) -> f32 {
        self.offset.max(0.0)
    }

    /// Scrollable distance left before the trailing edge of the content.
    pub fn distance_to_end(&self) -> f32 {
        (self.content_extent - (self.offset + self.viewport_extent)).max(0.0)
    }
}
