use log::debug;

use crate::{
    chapter::ChapterId, mapper::PageMapper, surface::SurfaceMetrics, tracker::ReadingPosition,
};

/// Snapshot of what sits at the top of the viewport, taken right before a
/// structural mutation and consumed right after it.
#[derive(Clone, Debug, PartialEq)]
pub struct Anchor {
    pub chapter: ChapterId,
    pub page: usize,
    pub visual_offset: f32,
}

/// How the surface has to move to keep the anchor in place.
#[derive(Clone, Debug, PartialEq)]
pub enum Restore {
    JumpTo { index: usize, visual_offset: f32 },
    AdjustOffset { delta: f32 },
}

pub fn capture(
    metrics: Option<&SurfaceMetrics>,
    mapper: &PageMapper,
    fallback: Option<&ReadingPosition>,
) -> Option<Anchor> {
    let from_surface = metrics.and_then(|metrics| {
        let top = metrics.first_visible()?;
        let pos = mapper.chapter_and_page(top)?;
        Some(Anchor { chapter: pos.chapter, page: pos.page, visual_offset: metrics.leading_item_offset })
    });
    let anchor = from_surface.or_else(|| {
        fallback.map(|pos| Anchor { chapter: pos.chapter.clone(), page: pos.page, visual_offset: 0.0 })
    });
    debug!("captured anchor {anchor:?}");
    anchor
}

pub fn resolve(anchor: &Anchor, mapper: &PageMapper) -> Option<Restore> {
    let index = mapper.global_index(&anchor.chapter, anchor.page)?;
    Some(Restore::JumpTo { index, visual_offset: anchor.visual_offset })
}

/// Used when the anchor no longer resolves: shift the raw offset by the
/// change in content extent ahead of the viewport. Content added or removed
/// past the viewport does not move the reader.
pub fn extent_fallback(removed_ahead: f32, added_ahead: f32) -> Restore {
    Restore::AdjustOffset { delta: added_ahead - removed_ahead }
}
