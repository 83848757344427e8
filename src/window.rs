//! The materialized chapter window and its per-edge load slots.

use std::collections::VecDeque;

use log::{debug, info};
use tokio::task::AbortHandle;

use crate::chapter::{ChapterId, LoadPosition, LoadedChapter};

#[derive(Debug)]
struct InFlight {
    chapter: ChapterId,
    ticket: u64,
    task: Option<AbortHandle>,
}

#[derive(Debug, Default)]
struct LoadSlots {
    initial: Option<InFlight>,
    previous: Option<InFlight>,
    next: Option<InFlight>,
}

impl LoadSlots {
    fn get(&self, position: LoadPosition) -> Option<&InFlight> {
        match position {
            LoadPosition::Initial => self.initial.as_ref(),
            LoadPosition::Previous => self.previous.as_ref(),
            LoadPosition::Next => self.next.as_ref(),
        }
    }

    fn get_mut(&mut self, position: LoadPosition) -> &mut Option<InFlight> {
        match position {
            LoadPosition::Initial => &mut self.initial,
            LoadPosition::Previous => &mut self.previous,
            LoadPosition::Next => &mut self.next,
        }
    }

    fn drain(&mut self) -> impl Iterator<Item = InFlight> {
        [self.initial.take(), self.previous.take(), self.next.take()]
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    AlreadyLoaded,
    SlotBusy { in_flight: ChapterId },
}

/// What an insert did to the window.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub inserted: bool,
    pub evicted: Vec<ChapterId>,
    /// Pages held by the evicted chapters.
    pub evicted_pages: usize,
    /// Chapters were removed ahead of the reader, shifting every later index.
    pub evicted_front: bool,
}

#[derive(Debug, Default)]
pub struct ChapterWindow {
    chapters: VecDeque<LoadedChapter>,
    capacity: Option<usize>,
    slots: LoadSlots,
    next_ticket: u64,
}

impl ChapterWindow {
    pub fn new(capacity: Option<usize>) -> Self {
        Self { capacity: capacity.map(|c| c.max(1)), ..Self::default() }
    }

    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity.map(|c| c.max(1));
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn chapters(&self) -> impl Iterator<Item = &LoadedChapter> {
        self.chapters.iter()
    }

    pub fn first_id(&self) -> Option<&ChapterId> {
        self.chapters.front().map(LoadedChapter::id)
    }

    pub fn last_id(&self) -> Option<&ChapterId> {
        self.chapters.back().map(LoadedChapter::id)
    }

    pub fn get(&self, id: &ChapterId) -> Option<&LoadedChapter> {
        self.chapters.iter().find(|c| c.id() == id)
    }

    pub fn is_chapter_loaded(&self, id: &ChapterId) -> bool {
        self.get(id).is_some()
    }

    pub fn is_slot_idle(&self, position: LoadPosition) -> bool {
        self.slots.get(position).is_none()
    }

    pub fn can_load_next(&self, current: &ChapterId, candidate: Option<&ChapterId>) -> bool {
        self.admits(LoadPosition::Next, current, candidate)
    }

    pub fn can_load_previous(&self, current: &ChapterId, candidate: Option<&ChapterId>) -> bool {
        self.admits(LoadPosition::Previous, current, candidate)
    }

    fn admits(&self, position: LoadPosition, current: &ChapterId, candidate: Option<&ChapterId>) -> bool {
        let Some(candidate) = candidate else {
            return false;
        };
        let admitted = self.is_slot_idle(position) && !self.is_chapter_loaded(candidate);
        if !admitted {
            debug!("{position:?} load of '{candidate}' from '{current}' not admitted");
        }
        admitted
    }

    /// Claims the slot for `position`. Returns the ticket that identifies this
    /// load when its result comes back.
    pub fn reserve(&mut self, position: LoadPosition, chapter: &ChapterId) -> Result<u64, SlotError> {
        if self.is_chapter_loaded(chapter) {
            return Err(SlotError::AlreadyLoaded);
        }
        if let Some(slot) = self.slots.get(position) {
            return Err(SlotError::SlotBusy { in_flight: slot.chapter.clone() });
        }
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        *self.slots.get_mut(position) = Some(InFlight { chapter: chapter.clone(), ticket, task: None });
        Ok(ticket)
    }

    pub fn attach(&mut self, position: LoadPosition, ticket: u64, task: AbortHandle) {
        match self.slots.get_mut(position) {
            Some(slot) if slot.ticket == ticket => slot.task = Some(task),
            _ => task.abort(),
        }
    }

    /// Whether `ticket` still owns the slot, i.e. its result is not stale.
    pub fn holds(&self, position: LoadPosition, ticket: u64) -> bool {
        self.slots.get(position).is_some_and(|slot| slot.ticket == ticket)
    }

    pub fn release(&mut self, position: LoadPosition, ticket: u64) -> bool {
        let slot = self.slots.get_mut(position);
        if slot.as_ref().is_some_and(|s| s.ticket == ticket) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub fn insert(
        &mut self,
        position: LoadPosition,
        chapter: LoadedChapter,
        protect: Option<&ChapterId>,
    ) -> Insertion {
        let mut insertion = Insertion::default();
        if position != LoadPosition::Initial && self.is_chapter_loaded(chapter.id()) {
            return insertion;
        }
        match position {
            LoadPosition::Initial => {
                self.chapters.clear();
                self.chapters.push_back(chapter);
            }
            LoadPosition::Previous => {
                self.chapters.push_front(chapter);
                while self.over_capacity() {
                    let Some(last) = self.chapters.back() else { break };
                    if protect == Some(last.id()) {
                        break;
                    }
                    if let Some(evicted) = self.chapters.pop_back() {
                        insertion.evicted_pages += evicted.page_count();
                        insertion.evicted.push(evicted.id().clone());
                    }
                }
            }
            LoadPosition::Next => {
                self.chapters.push_back(chapter);
                while self.over_capacity() {
                    let Some(first) = self.chapters.front() else { break };
                    if protect == Some(first.id()) {
                        break;
                    }
                    if let Some(evicted) = self.chapters.pop_front() {
                        insertion.evicted_pages += evicted.page_count();
                        insertion.evicted.push(evicted.id().clone());
                        insertion.evicted_front = true;
                    }
                }
            }
        }
        if !insertion.evicted.is_empty() {
            info!("evicted chapters {:?} from window", insertion.evicted);
        }
        insertion.inserted = true;
        insertion
    }

    fn over_capacity(&self) -> bool {
        self.capacity.is_some_and(|cap| self.chapters.len() > cap)
    }

    pub fn abort_all(&mut self) -> usize {
        let mut aborted = 0;
        for slot in self.slots.drain() {
            if let Some(task) = slot.task {
                task.abort();
            }
            debug!("aborted in-flight load of '{}'", slot.chapter);
            aborted += 1;
        }
        aborted
    }
}
