//! Translation between the flat page index and (chapter, local page).
//!
//! The mapper keeps one prefix sum per windowed chapter. `starts[i]` is the
//! global index of chapter `i`'s first page and the final entry is the total
//! page count, so every lookup is a binary search over `starts`.

use std::ops::Range;

use crate::chapter::{ChapterId, LoadedChapter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PagePosition {
    pub chapter: ChapterId,
    pub page: usize,
}

#[derive(Clone, Debug, Default)]
pub struct PageMapper {
    ids: Vec<ChapterId>,
    starts: Vec<usize>,
}

impl PageMapper {
    pub fn new() -> Self {
        Self { ids: Vec::new(), starts: vec![0] }
    }

    /// Rebuilds the prefix sums for the window, in window order.
    pub fn update_mapping<'a>(&mut self, chapters: impl IntoIterator<Item = &'a LoadedChapter>) {
        self.ids.clear();
        self.starts.clear();
        self.starts.push(0);
        let mut total = 0;
        for chapter in chapters {
            total += chapter.page_count();
            self.ids.push(chapter.id().clone());
            self.starts.push(total);
        }
    }

    pub fn total_pages(&self) -> usize {
        self.starts.last().copied().unwrap_or(0)
    }

    pub fn chapter_and_page(&self, index: usize) -> Option<PagePosition> {
        if index >= self.total_pages() {
            return None;
        }
        // First start strictly greater than `index`, minus one, is the owning chapter.
        let slot = self.starts.partition_point(|&start| start <= index) - 1;
        let chapter = self.ids.get(slot)?;
        Some(PagePosition { chapter: chapter.clone(), page: index - self.starts[slot] })
    }

    pub fn global_index(&self, chapter: &ChapterId, page: usize) -> Option<usize> {
        let range = self.chapter_range(chapter)?;
        let index = range.start + page;
        range.contains(&index).then_some(index)
    }

    pub fn chapter_range(&self, chapter: &ChapterId) -> Option<Range<usize>> {
        let slot = self.ids.iter().position(|id| id == chapter)?;
        Some(self.starts[slot]..self.starts[slot + 1])
    }

    pub fn page_count(&self, chapter: &ChapterId) -> Option<usize> {
        self.chapter_range(chapter).map(|range| range.len())
    }
}
