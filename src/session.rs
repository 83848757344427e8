//! The reading session: one consumer driving the window, the mapper and the
//! tracker, with chapter fetches running as background tasks.
//!
//! Every structural change (insert, remap, anchor restore) happens inside a
//! single `&mut self` call, so queries never observe a half-applied window.
//! Fetch results come back over a channel and are applied by [`ReaderSession::pump`]
//! or [`ReaderSession::wait_for_fetch`]; a session must live inside a tokio runtime.

use std::{collections::VecDeque, sync::Arc};

use anyhow::anyhow;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::{
    anchor::{self, Anchor, Restore},
    chapter::{ChapterId, ChapterOrder, LoadPosition, LoadedChapter, PageRef},
    config::ReaderConfig,
    error::ReaderError,
    loading::{LoadDirection, LoadingState, LoadingStateMachine},
    mapper::{PageMapper, PagePosition},
    mode::ReadingMode,
    prefetch::PrefetchTrigger,
    source::ChapterSource,
    surface::SurfaceMetrics,
    tracker::{ChangeReason, PageChange, PositionTracker, ReadingPosition},
    window::{ChapterWindow, SlotError},
};

/// Everything the session tells the outside world, in order.
#[derive(Debug)]
pub enum ReaderEvent {
    PageChanged(PageChange),
    ChapterChanged { chapter: ChapterId },
    ScrollState { is_scrolling: bool },
    Error { error: ReaderError },
    /// The window changed shape; the surface should re-layout.
    WindowChanged { total_pages: usize },
    /// Non-animated jumps are used to hold the reader's place.
    ScrollTo { index: usize, visual_offset: f32, animated: bool },
    ScrollBy { delta: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    SlotBusy,
    NotAdmitted,
    UnknownChapter,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadRequest {
    Started,
    AlreadyLoaded,
    Rejected(Rejection),
}

#[derive(Debug)]
struct FetchOutcome {
    position: LoadPosition,
    chapter: ChapterId,
    ticket: u64,
    generation: u64,
    result: anyhow::Result<Vec<PageRef>>,
}

#[derive(Debug)]
struct ReadyChapter {
    position: LoadPosition,
    ticket: u64,
    chapter: LoadedChapter,
}

pub struct ReaderSession<S> {
    source: Arc<S>,
    order: ChapterOrder,
    window: ChapterWindow,
    mapper: PageMapper,
    loading: LoadingStateMachine,
    tracker: PositionTracker,
    prefetch: PrefetchTrigger,
    mode: ReadingMode,
    initial_page: Option<(ChapterId, usize)>,
    /// Offset correction for a mutation whose anchor could not be resolved,
    /// issued once the surface has laid out the new window.
    pending_shift: Option<f32>,
    deferred: VecDeque<ReadyChapter>,
    metrics: Option<SurfaceMetrics>,
    scrolling: bool,
    awaiting: usize,
    generation: u64,
    closed: bool,
    outcome_tx: mpsc::UnboundedSender<FetchOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    events: mpsc::UnboundedSender<ReaderEvent>,
}

impl<S: ChapterSource> ReaderSession<S> {
    pub fn new(
        source: Arc<S>,
        order: ChapterOrder,
        config: &ReaderConfig,
        events: mpsc::UnboundedSender<ReaderEvent>,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            source,
            order,
            window: ChapterWindow::new(config.max_chapters),
            mapper: PageMapper::new(),
            loading: LoadingStateMachine::new(),
            tracker: PositionTracker::new(),
            prefetch: PrefetchTrigger::new(config.preload),
            mode: config.reading_mode,
            initial_page: None,
            pending_shift: None,
            deferred: VecDeque::new(),
            metrics: None,
            scrolling: false,
            awaiting: 0,
            generation: 0,
            closed: false,
            outcome_tx,
            outcome_rx,
            events,
        }
    }

    /// Starts reading `chapter` at `page`, replacing the window once it arrives.
    pub fn open(&mut self, chapter: &ChapterId, page: usize) -> LoadRequest {
        self.initial_page = Some((chapter.clone(), page));
        self.load_chapter(chapter, LoadPosition::Initial)
    }

    pub fn load_chapter(&mut self, chapter: &ChapterId, position: LoadPosition) -> LoadRequest {
        if self.closed {
            return LoadRequest::Rejected(Rejection::Closed);
        }
        if !self.order.contains(chapter) {
            warn!("refusing to load unknown chapter '{chapter}'");
            return LoadRequest::Rejected(Rejection::UnknownChapter);
        }
        if self.window.is_chapter_loaded(chapter) {
            if position == LoadPosition::Initial {
                self.jump_to_initial(chapter);
            }
            return LoadRequest::AlreadyLoaded;
        }
        let ticket = match self.window.reserve(position, chapter) {
            Ok(ticket) => ticket,
            Err(SlotError::AlreadyLoaded) => return LoadRequest::AlreadyLoaded,
            Err(SlotError::SlotBusy { in_flight }) => {
                debug!("{position:?} slot busy with '{in_flight}', rejecting '{chapter}'");
                return LoadRequest::Rejected(Rejection::SlotBusy);
            }
        };

        info!("fetching {position:?} chapter '{chapter}'");
        let source = Arc::clone(&self.source);
        let outcome_tx = self.outcome_tx.clone();
        let generation = self.generation;
        let chapter = chapter.clone();
        let fetch = {
            let chapter = chapter.clone();
            tokio::spawn(async move { source.fetch_pages(&chapter).await })
        };
        self.window.attach(position, ticket, fetch.abort_handle());
        // A panicking source still has to hand its slot back.
        tokio::spawn(async move {
            let result = match fetch.await {
                Ok(result) => result,
                Err(err) if err.is_panic() => Err(anyhow!("chapter source panicked")),
                Err(_) => return,
            };
            let _ = outcome_tx.send(FetchOutcome { position, chapter, ticket, generation, result });
        });
        self.awaiting += 1;
        LoadRequest::Started
    }

    /// Grows the window by the neighbour of its previous or next edge.
    pub fn preload(&mut self, position: LoadPosition) -> LoadRequest {
        if self.closed {
            return LoadRequest::Rejected(Rejection::Closed);
        }
        let (edge, candidate) = match position {
            LoadPosition::Next => {
                let edge = self.window.last_id().cloned();
                let candidate = edge.as_ref().and_then(|id| self.order.next(id)).cloned();
                (edge, candidate)
            }
            LoadPosition::Previous => {
                let edge = self.window.first_id().cloned();
                let candidate = edge.as_ref().and_then(|id| self.order.previous(id)).cloned();
                (edge, candidate)
            }
            LoadPosition::Initial => return LoadRequest::Rejected(Rejection::NotAdmitted),
        };
        let Some(edge) = edge else {
            return LoadRequest::Rejected(Rejection::NotAdmitted);
        };
        let admitted = match position {
            LoadPosition::Next => self.window.can_load_next(&edge, candidate.as_ref()),
            _ => self.window.can_load_previous(&edge, candidate.as_ref()),
        };
        match candidate {
            Some(candidate) if admitted => self.load_chapter(&candidate, position),
            _ => LoadRequest::Rejected(Rejection::NotAdmitted),
        }
    }

    /// Applies every fetch result that has arrived so far without waiting.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.handle_outcome(outcome);
            handled += 1;
        }
        handled
    }

    /// Waits for the next fetch result and applies it. Returns `false` when no
    /// fetch is outstanding.
    pub async fn wait_for_fetch(&mut self) -> bool {
        if self.closed || self.awaiting == 0 {
            return false;
        }
        match self.outcome_rx.recv().await {
            Some(outcome) => {
                self.handle_outcome(outcome);
                true
            }
            None => false,
        }
    }

    /// Feeds a fresh measurement from the rendering surface.
    pub fn on_surface(&mut self, metrics: SurfaceMetrics) {
        if self.closed {
            return;
        }
        if let Some(delta) = self.pending_shift.take() {
            self.emit(ReaderEvent::ScrollBy { delta });
            // This measurement predates the correction, so it is not tracked.
            self.loading.finish();
            self.apply_deferred();
            return;
        }

        let index = self.mode.current_index(&metrics, self.mapper.total_pages());
        self.metrics = Some(metrics);
        if let Some(index) = index {
            self.observe(index, ChangeReason::UserScroll);
        }
        self.maybe_prefetch(index);
    }

    pub fn set_scrolling(&mut self, is_scrolling: bool) {
        if self.scrolling != is_scrolling {
            self.scrolling = is_scrolling;
            self.emit(ReaderEvent::ScrollState { is_scrolling });
        }
    }

    pub fn set_zooming(&mut self, zooming: bool) {
        self.tracker.set_zooming(zooming);
    }

    /// Switches layout strategy and re-anchors to the active chapter's first page.
    pub fn set_mode(&mut self, mode: ReadingMode) {
        if mode == self.mode {
            return;
        }
        info!("reading mode {} -> {}", self.mode, mode);
        self.mode = mode;
        self.mapper.update_mapping(self.window.chapters());
        self.metrics = None;
        let active = self
            .tracker
            .current()
            .map(|pos| pos.chapter.clone())
            .or_else(|| self.window.first_id().cloned());
        if let Some(active) = active {
            self.initial_page = Some((active.clone(), 0));
            self.load_chapter(&active, LoadPosition::Initial);
        }
    }

    pub fn apply_config(&mut self, config: &ReaderConfig) {
        self.prefetch.set_threshold(config.preload);
        self.window.set_capacity(config.max_chapters);
        self.set_mode(config.reading_mode);
    }

    /// Cancels all in-flight fetches; late results can no longer touch the window.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.generation += 1;
        let aborted = self.window.abort_all();
        self.deferred.clear();
        self.pending_shift = None;
        self.awaiting = 0;
        self.loading.finish();
        self.outcome_rx.close();
        info!("session closed, aborted {aborted} in-flight loads");
    }

    fn handle_outcome(&mut self, outcome: FetchOutcome) {
        self.awaiting = self.awaiting.saturating_sub(1);
        let FetchOutcome { position, chapter, ticket, generation, result } = outcome;
        if self.closed || generation != self.generation || !self.window.holds(position, ticket) {
            debug!("discarding stale {position:?} result for '{chapter}'");
            return;
        }
        match result {
            Err(source) => {
                self.window.release(position, ticket);
                warn!("fetching chapter '{chapter}' failed: {source:#}");
                self.emit(ReaderEvent::Error { error: ReaderError::Fetch { chapter, source } });
            }
            Ok(pages) if pages.is_empty() => {
                self.window.release(position, ticket);
                info!("chapter '{chapter}' has no pages, skipping");
            }
            Ok(pages) => {
                let ready = ReadyChapter { position, ticket, chapter: LoadedChapter::new(chapter, pages) };
                if self.loading.can_start_loading() {
                    self.apply(ready);
                    self.apply_deferred();
                } else {
                    debug!("deferring '{}' until {:?} completes", ready.chapter.id(), self.loading.state());
                    self.deferred.push_back(ready);
                }
            }
        }
    }

    fn apply_deferred(&mut self) {
        while self.loading.can_start_loading() {
            let Some(ready) = self.deferred.pop_front() else {
                break;
            };
            self.apply(ready);
        }
    }

    fn is_adjacent(&self, position: LoadPosition, chapter: &ChapterId) -> bool {
        match position {
            LoadPosition::Initial => true,
            LoadPosition::Next => {
                self.window.last_id().and_then(|last| self.order.next(last)) == Some(chapter)
            }
            LoadPosition::Previous => {
                self.window.first_id().and_then(|first| self.order.previous(first)) == Some(chapter)
            }
        }
    }

    fn apply(&mut self, ready: ReadyChapter) {
        let ReadyChapter { position, ticket, chapter } = ready;
        let id = chapter.id().clone();
        if !self.is_adjacent(position, &id) {
            debug!("discarding '{id}': no longer adjacent to the window");
            self.window.release(position, ticket);
            return;
        }
        let direction = match position {
            LoadPosition::Previous => LoadDirection::Previous,
            LoadPosition::Initial | LoadPosition::Next => LoadDirection::Next,
        };
        if let Err(busy) = self.loading.begin(direction) {
            debug!("{busy}, deferring '{id}'");
            self.deferred.push_front(ReadyChapter { position, ticket, chapter });
            return;
        }

        let anchor = match position {
            LoadPosition::Initial => None,
            _ => anchor::capture(self.metrics.as_ref(), &self.mapper, self.tracker.current()),
        };
        let total_before = self.mapper.total_pages();
        let page_extent = match &self.metrics {
            Some(metrics) if total_before > 0 => metrics.content_extent / total_before as f32,
            _ => 0.0,
        };
        let inserted_pages = chapter.page_count();
        let protect = self.tracker.current().map(|pos| pos.chapter.clone());

        let insertion = self.window.insert(position, chapter, protect.as_ref());
        self.window.release(position, ticket);
        if !insertion.inserted {
            self.loading.finish();
            return;
        }
        self.mapper.update_mapping(self.window.chapters());
        self.metrics = None;
        info!(
            "{position:?} chapter '{id}' applied, window {} chapters / {} pages",
            self.window.len(),
            self.mapper.total_pages()
        );
        self.emit(ReaderEvent::WindowChanged { total_pages: self.mapper.total_pages() });

        // Extent that appeared or vanished ahead of the viewport.
        let added_ahead = match position {
            LoadPosition::Previous => inserted_pages as f32 * page_extent,
            _ => 0.0,
        };
        let removed_ahead =
            if insertion.evicted_front { insertion.evicted_pages as f32 * page_extent } else { 0.0 };
        let fallback = anchor::extent_fallback(removed_ahead, added_ahead);

        match position {
            LoadPosition::Initial => {
                self.tracker.reset();
                self.loading.finish();
                self.jump_to_initial(&id);
            }
            LoadPosition::Previous => self.restore_anchor(anchor, fallback),
            LoadPosition::Next if insertion.evicted_front => self.restore_anchor(anchor, fallback),
            LoadPosition::Next => {
                self.refresh_position();
                self.loading.finish();
            }
        }
    }

    fn restore_anchor(&mut self, anchor: Option<Anchor>, fallback: Restore) {
        let Some(anchor) = anchor else {
            self.refresh_position();
            self.loading.finish();
            return;
        };
        match anchor::resolve(&anchor, &self.mapper).unwrap_or(fallback) {
            Restore::JumpTo { index, visual_offset } => {
                debug!("restoring anchor {}:{} at index {index}", anchor.chapter, anchor.page);
                self.emit(ReaderEvent::ScrollTo { index, visual_offset, animated: false });
                self.refresh_position();
                self.loading.finish();
            }
            Restore::AdjustOffset { delta } => {
                debug!("anchor {}:{} left the window, shifting by {delta} after layout", anchor.chapter, anchor.page);
                self.refresh_position();
                self.pending_shift = Some(delta);
            }
        }
    }

    fn jump_to_initial(&mut self, chapter: &ChapterId) {
        let page = match &self.initial_page {
            Some((id, page)) if id == chapter => *page,
            _ => 0,
        };
        let last = self.mapper.page_count(chapter).unwrap_or(1).saturating_sub(1);
        let Some(index) = self.mapper.global_index(chapter, page.min(last)) else {
            return;
        };
        self.emit(ReaderEvent::ScrollTo { index, visual_offset: 0.0, animated: false });
        self.observe(index, ChangeReason::ProgrammaticJump);
    }

    /// Keeps the tracked position's index in step with a remapped window.
    fn refresh_position(&mut self) {
        let index = self
            .tracker
            .current()
            .and_then(|pos| self.mapper.global_index(&pos.chapter, pos.page));
        match index {
            Some(index) => self.observe(index, ChangeReason::PreloadInsert),
            None => self.tracker.rebase(&self.mapper),
        }
    }

    fn observe(&mut self, index: usize, reason: ChangeReason) {
        let mutating = !self.loading.can_start_loading();
        let Some(update) = self.tracker.observe(&self.mapper, index, reason, mutating) else {
            return;
        };
        if update.chapter_changed {
            self.emit(ReaderEvent::ChapterChanged { chapter: update.position.chapter.clone() });
        }
        if let Some(change) = update.page_change(reason) {
            self.emit(ReaderEvent::PageChanged(change));
        }
    }

    fn maybe_prefetch(&mut self, index: Option<usize>) {
        let Some(metrics) = self.metrics.as_ref() else {
            return;
        };
        let request = self.prefetch.evaluate(self.mode, metrics, index, self.mapper.total_pages());
        if request.next {
            self.preload(LoadPosition::Next);
        }
        if request.previous {
            self.preload(LoadPosition::Previous);
        }
    }

    fn emit(&self, event: ReaderEvent) {
        let _ = self.events.send(event);
    }
}

impl<S> ReaderSession<S> {
    pub fn chapter_and_page(&self, index: usize) -> Option<PagePosition> {
        self.mapper.chapter_and_page(index)
    }

    pub fn global_index(&self, chapter: &ChapterId, page: usize) -> Option<usize> {
        self.mapper.global_index(chapter, page)
    }

    pub fn is_chapter_loaded(&self, chapter: &ChapterId) -> bool {
        self.window.is_chapter_loaded(chapter)
    }

    pub fn can_start_loading(&self) -> bool {
        self.loading.can_start_loading()
    }

    pub fn loading_state(&self) -> LoadingState {
        self.loading.state()
    }

    pub fn total_pages(&self) -> usize {
        self.mapper.total_pages()
    }

    pub fn page(&self, index: usize) -> Option<&PageRef> {
        let pos = self.mapper.chapter_and_page(index)?;
        self.window.get(&pos.chapter)?.pages().get(pos.page)
    }

    pub fn position(&self) -> Option<&ReadingPosition> {
        self.tracker.current()
    }

    pub fn mode(&self) -> ReadingMode {
        self.mode
    }

    pub fn window_chapters(&self) -> Vec<ChapterId> {
        self.window.chapters().map(|chapter| chapter.id().clone()).collect()
    }

    pub fn order(&self) -> &ChapterOrder {
        &self.order
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S> Drop for ReaderSession<S> {
    fn drop(&mut self) {
        self.window.abort_all();
    }
}
