use log::debug;

use crate::{chapter::ChapterId, mapper::PageMapper};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeReason {
    UserScroll,
    ProgrammaticJump,
    PreloadInsert,
}

/// Where the reader is. Replaced wholesale on every update, never edited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadingPosition {
    pub chapter: ChapterId,
    pub page: usize,
    pub chapter_pages: usize,
    pub index: usize,
}

impl ReadingPosition {
    pub fn resolve(mapper: &PageMapper, index: usize) -> Option<Self> {
        let pos = mapper.chapter_and_page(index)?;
        let chapter_pages = mapper.page_count(&pos.chapter)?;
        Some(Self { chapter: pos.chapter, page: pos.page, chapter_pages, index })
    }

    fn same_place(&self, other: &ReadingPosition) -> bool {
        self.chapter == other.chapter && self.page == other.page
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageChange {
    pub chapter: ChapterId,
    pub page: usize,
    pub chapter_pages: usize,
    pub reason: ChangeReason,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionUpdate {
    pub position: ReadingPosition,
    pub page_changed: bool,
    pub chapter_changed: bool,
}

impl PositionUpdate {
    pub fn page_change(&self, reason: ChangeReason) -> Option<PageChange> {
        self.page_changed.then(|| PageChange {
            chapter: self.position.chapter.clone(),
            page: self.position.page,
            chapter_pages: self.position.chapter_pages,
            reason,
        })
    }
}

pub fn advance(current: Option<&ReadingPosition>, next: ReadingPosition) -> PositionUpdate {
    let (page_changed, chapter_changed) = match current {
        Some(current) => (!current.same_place(&next), current.chapter != next.chapter),
        None => (true, true),
    };
    PositionUpdate { position: next, page_changed, chapter_changed }
}

/// Holds the last committed position and decides which updates get through.
#[derive(Debug, Default)]
pub struct PositionTracker {
    current: Option<ReadingPosition>,
    zooming: bool,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&ReadingPosition> {
        self.current.as_ref()
    }

    pub fn set_zooming(&mut self, zooming: bool) {
        self.zooming = zooming;
    }

    /// Evaluates `index` and commits the result unless updates are suppressed.
    /// Returns `None` when suppressed or when `index` does not resolve.
    pub fn observe(
        &mut self,
        mapper: &PageMapper,
        index: usize,
        reason: ChangeReason,
        mutating: bool,
    ) -> Option<PositionUpdate> {
        if (self.zooming || mutating) && reason != ChangeReason::PreloadInsert {
            debug!("position update at {index} suppressed ({reason:?})");
            return None;
        }
        let next = ReadingPosition::resolve(mapper, index)?;
        let update = advance(self.current.as_ref(), next);
        self.current = Some(update.position.clone());
        Some(update)
    }

    /// Re-derives the held position's index after the window was remapped.
    /// Drops the position if its chapter left the window.
    pub fn rebase(&mut self, mapper: &PageMapper) {
        self.current = self.current.take().and_then(|pos| {
            let index = mapper.global_index(&pos.chapter, pos.page)?;
            ReadingPosition::resolve(mapper, index)
        });
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapter::{LoadedChapter, PageRef};

    fn mapper(layout: &[(&str, usize)]) -> PageMapper {
        let chapters: Vec<_> = layout
            .iter()
            .map(|(id, n)| {
                let pages = (0..*n).map(|p| PageRef::Remote(format!("{id}/{p}"))).collect();
                LoadedChapter::new(ChapterId::from(*id), pages)
            })
            .collect();
        let mut mapper = PageMapper::new();
        mapper.update_mapping(&chapters);
        mapper
    }

    #[test]
    fn first_observation_changes_page_and_chapter() {
        let mapper = mapper(&[("a", 3), ("b", 2)]);
        let mut tracker = PositionTracker::new();
        let update = tracker.observe(&mapper, 4, ChangeReason::UserScroll, false).unwrap();
        assert!(update.page_changed);
        assert!(update.chapter_changed);
        assert_eq!(update.position.chapter, ChapterId::from("b"));
        assert_eq!(update.position.page, 1);
        assert_eq!(update.position.chapter_pages, 2);
    }

    #[test]
    fn repeated_index_is_not_a_change() {
        let mapper = mapper(&[("a", 3)]);
        let mut tracker = PositionTracker::new();
        tracker.observe(&mapper, 1, ChangeReason::UserScroll, false);
        let update = tracker.observe(&mapper, 1, ChangeReason::UserScroll, false).unwrap();
        assert!(!update.page_changed);
        assert!(!update.chapter_changed);
        assert_eq!(update.page_change(ChangeReason::UserScroll), None);
    }

    #[test]
    fn page_change_within_chapter() {
        let mapper = mapper(&[("a", 3)]);
        let mut tracker = PositionTracker::new();
        tracker.observe(&mapper, 0, ChangeReason::UserScroll, false);
        let update = tracker.observe(&mapper, 2, ChangeReason::UserScroll, false).unwrap();
        assert!(update.page_changed);
        assert!(!update.chapter_changed);
    }

    #[test]
    fn zoom_and_mutation_suppress_all_but_preload_insert() {
        let mapper = mapper(&[("a", 3)]);
        let mut tracker = PositionTracker::new();
        tracker.set_zooming(true);
        assert_eq!(tracker.observe(&mapper, 1, ChangeReason::UserScroll, false), None);
        assert_eq!(tracker.current(), None);
        tracker.set_zooming(false);
        assert_eq!(tracker.observe(&mapper, 1, ChangeReason::ProgrammaticJump, true), None);
        assert!(tracker.observe(&mapper, 1, ChangeReason::PreloadInsert, true).is_some());
        assert_eq!(tracker.current().map(|p| p.page), Some(1));
    }

    #[test]
    fn unresolvable_index_keeps_position() {
        let mapper = mapper(&[("a", 3)]);
        let mut tracker = PositionTracker::new();
        tracker.observe(&mapper, 2, ChangeReason::UserScroll, false);
        assert_eq!(tracker.observe(&mapper, 10, ChangeReason::UserScroll, false), None);
        assert_eq!(tracker.current().map(|p| p.index), Some(2));
    }

    #[test]
    fn rebase_follows_the_chapter_not_the_index() {
        let before = mapper(&[("b", 4), ("c", 3)]);
        let mut tracker = PositionTracker::new();
        tracker.observe(&before, 6, ChangeReason::UserScroll, false);
        let after = mapper(&[("a", 5), ("b", 4), ("c", 3)]);
        tracker.rebase(&after);
        let pos = tracker.current().unwrap();
        assert_eq!((pos.chapter.as_str(), pos.page, pos.index), ("c", 2, 11));

        let evicted = mapper(&[("a", 5)]);
        tracker.rebase(&evicted);
        assert_eq!(tracker.current(), None);
    }
}
