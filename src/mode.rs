//! Reading modes and how each one turns surface measurements into a page index.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::surface::SurfaceMetrics;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingMode {
    #[default]
    ContinuousVertical,
    PagedVertical,
    PagedLeftToRight,
    PagedRightToLeft,
}

impl ReadingMode {
    pub const ALL: [ReadingMode; 4] = [
        ReadingMode::ContinuousVertical,
        ReadingMode::PagedVertical,
        ReadingMode::PagedLeftToRight,
        ReadingMode::PagedRightToLeft,
    ];

    pub fn is_paged(self) -> bool {
        !matches!(self, ReadingMode::ContinuousVertical)
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, ReadingMode::PagedLeftToRight | ReadingMode::PagedRightToLeft)
    }

    pub fn cycle(self) -> Self {
        let pos = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(pos + 1) % Self::ALL.len()]
    }

    /// Global index the reader is on, or `None` when nothing is laid out.
    pub fn current_index(self, metrics: &SurfaceMetrics, total_pages: usize) -> Option<usize> {
        match self {
            ReadingMode::ContinuousVertical => continuous_index(metrics),
            ReadingMode::PagedVertical | ReadingMode::PagedLeftToRight => {
                paged_index(metrics.offset, metrics.viewport_extent, total_pages)
            }
            ReadingMode::PagedRightToLeft => {
                paged_index(mirrored_offset(metrics), metrics.viewport_extent, total_pages)
            }
        }
    }
}

impl fmt::Display for ReadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadingMode::ContinuousVertical => "continuous",
            ReadingMode::PagedVertical => "paged (vertical)",
            ReadingMode::PagedLeftToRight => "paged (left to right)",
            ReadingMode::PagedRightToLeft => "paged (right to left)",
        };
        f.write_str(name)
    }
}

pub fn continuous_index(metrics: &SurfaceMetrics) -> Option<usize> {
    metrics.center_item.or_else(|| metrics.last_visible())
}

pub fn paged_index(offset: f32, extent: f32, total_pages: usize) -> Option<usize> {
    if total_pages == 0 || extent <= 0.0 {
        return None;
    }
    let raw = ((offset + extent / 2.0) / extent).floor();
    let index = if raw <= 0.0 { 0 } else { raw as usize };
    Some(index.min(total_pages - 1))
}

/// Right-to-left surfaces report offsets from the opposite edge of the content.
pub fn mirrored_offset(metrics: &SurfaceMetrics) -> f32 {
    (metrics.content_extent - metrics.offset).max(0.0)
}
