use anyhow::{Context, Result, bail};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use image::DynamicImage;
use log::{debug, info, warn};
use ratatui::{prelude::*, widgets::*};
use ratatui_image::{StatefulImage, picker::Picker, protocol::StatefulProtocol};
use rmanga::{
    ChapterId, Library, PageRef, ReaderConfig, ReaderError, ReaderEvent, ReaderSession, ReadingMode,
    SurfaceMetrics, config,
};
use std::{
    collections::{HashMap, HashSet},
    io,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::mpsc;

enum Action {
    LoadPage(PageRef),
}

enum LoaderEvent {
    PageLoaded(String, DynamicImage),
    PageFailed(String, String),
}

#[derive(Clone, Debug)]
enum AppState {
    Loading,
    Reading,
    Error(String),
}

/// The reading surface: a strip of equally sized pages and a scroll position
/// measured from the start of the window, in terminal cells.
struct Surface {
    pos: f32,
    width: u16,
    height: u16,
    total_pages: usize,
    dirty: bool,
}

impl Surface {
    fn new() -> Self {
        Self { pos: 0.0, width: 0, height: 0, total_pages: 0, dirty: false }
    }

    fn extent(&self, mode: ReadingMode) -> f32 {
        if mode.is_horizontal() { self.width as f32 } else { self.height as f32 }
    }

    fn max_pos(&self, mode: ReadingMode) -> f32 {
        let extent = self.extent(mode);
        (extent * self.total_pages as f32 - extent).max(0.0)
    }

    fn set_pos(&mut self, mode: ReadingMode, pos: f32) {
        let pos = pos.clamp(0.0, self.max_pos(mode));
        if pos != self.pos {
            self.pos = pos;
            self.dirty = true;
        }
    }

    fn page_index(&self, mode: ReadingMode) -> usize {
        let extent = self.extent(mode);
        if extent <= 0.0 { 0 } else { (self.pos / extent).round() as usize }
    }

    fn jump(&mut self, mode: ReadingMode, index: usize, visual_offset: f32) {
        let pos = index as f32 * self.extent(mode) + visual_offset;
        self.set_pos(mode, pos);
        self.dirty = true;
    }

    fn step_page(&mut self, mode: ReadingMode, forward: bool) {
        let index = self.page_index(mode);
        let target = if forward { index + 1 } else { index.saturating_sub(1) };
        self.jump(mode, target, 0.0);
    }

    fn resize(&mut self, mode: ReadingMode, width: u16, height: u16) {
        if width == self.width && height == self.height {
            return;
        }
        let index = self.page_index(mode);
        self.width = width;
        self.height = height;
        self.jump(mode, index, 0.0);
    }

    fn set_total_pages(&mut self, mode: ReadingMode, total_pages: usize) {
        self.total_pages = total_pages;
        self.set_pos(mode, self.pos);
        self.dirty = true;
    }

    fn metrics(&self, mode: ReadingMode) -> SurfaceMetrics {
        let extent = self.extent(mode);
        let mut metrics = SurfaceMetrics::uniform(self.pos, extent, extent, self.total_pages);
        if mode == ReadingMode::PagedRightToLeft {
            metrics.offset = metrics.content_extent - self.pos;
        }
        metrics
    }
}

struct App {
    state: AppState,
    session: ReaderSession<Library>,
    surface: Surface,
    theme: Color,
    title: String,
    page_label: String,
    notice: Option<String>,
    zooming: bool,
    last_scroll: Option<Instant>,

    image_picker: Picker,
    image_protocols: HashMap<String, StatefulProtocol>,
    requested: HashSet<String>,

    action_tx: mpsc::UnboundedSender<Action>,
}

fn theme_color(config: &ReaderConfig) -> Color {
    match config.theme_rgb() {
        Some((r, g, b)) => Color::Rgb(r, g, b),
        None => Color::Yellow,
    }
}

async fn run_image_loop(mut action_rx: mpsc::UnboundedReceiver<Action>, event_tx: mpsc::UnboundedSender<LoaderEvent>) {
    let client = reqwest::Client::builder()
        .user_agent("rmanga/0.1.0")
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    while let Some(action) = action_rx.recv().await {
        let client = client.clone();
        let event_tx = event_tx.clone();

        tokio::spawn(async move {
            match action {
                Action::LoadPage(page) => {
                    let key = page.key();
                    match load_page_image(&client, &page).await {
                        Ok(img) => {
                            let _ = event_tx.send(LoaderEvent::PageLoaded(key, img));
                        }
                        Err(err) => {
                            warn!("could not load page {key}: {err:#}");
                            let _ = event_tx.send(LoaderEvent::PageFailed(key, format!("{err:#}")));
                        }
                    }
                }
            }
        });
    }
}

async fn load_page_image(client: &reqwest::Client, page: &PageRef) -> Result<DynamicImage> {
    let bytes = match page {
        PageRef::Local(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        PageRef::Remote(url) => client.get(url).send().await?.error_for_status()?.bytes().await?.to_vec(),
    };
    let img = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes)).await??;
    Ok(img)
}

impl App {
    fn new(session: ReaderSession<Library>, config: &ReaderConfig, action_tx: mpsc::UnboundedSender<Action>) -> Self {
        let image_picker = Picker::from_query_stdio().unwrap_or_else(|_| Picker::from_fontsize((8, 12)));
        Self {
            state: AppState::Loading,
            session,
            surface: Surface::new(),
            theme: theme_color(config),
            title: String::new(),
            page_label: String::new(),
            notice: None,
            zooming: false,
            last_scroll: None,
            image_picker,
            image_protocols: HashMap::new(),
            requested: HashSet::new(),
            action_tx,
        }
    }

    fn mode(&self) -> ReadingMode {
        self.session.mode()
    }

    fn on_reader_event(&mut self, event: ReaderEvent) {
        let mode = self.mode();
        match event {
            ReaderEvent::WindowChanged { total_pages } => self.surface.set_total_pages(mode, total_pages),
            ReaderEvent::ScrollTo { index, visual_offset, .. } => self.surface.jump(mode, index, visual_offset),
            ReaderEvent::ScrollBy { delta } => self.surface.set_pos(mode, self.surface.pos + delta),
            ReaderEvent::ChapterChanged { chapter } => {
                self.title = chapter.to_string();
            }
            ReaderEvent::PageChanged(change) => {
                debug!("page {}/{} of '{}' ({:?})", change.page + 1, change.chapter_pages, change.chapter, change.reason);
                self.page_label = format!("{}/{}", change.page + 1, change.chapter_pages);
                self.state = AppState::Reading;
            }
            ReaderEvent::ScrollState { .. } => {}
            ReaderEvent::Error { error } => {
                if self.session.total_pages() == 0 {
                    self.state = AppState::Error(error.to_string());
                } else {
                    self.notice = Some(error.to_string());
                }
            }
        }
    }

    fn on_loader_event(&mut self, event: LoaderEvent) {
        match event {
            LoaderEvent::PageLoaded(key, img) => {
                let protocol = self.image_picker.new_resize_protocol(img);
                self.image_protocols.insert(key, protocol);
            }
            LoaderEvent::PageFailed(key, msg) => {
                self.requested.remove(&key);
                self.notice = Some(msg);
            }
        }
    }

    fn on_config(&mut self, config: ReaderConfig) {
        info!("applying updated config");
        self.theme = theme_color(&config);
        self.session.apply_config(&config);
    }

    fn scrolled(&mut self) {
        self.last_scroll = Some(Instant::now());
        self.session.set_scrolling(true);
    }

    fn on_tick(&mut self) {
        if self.last_scroll.is_some_and(|at| at.elapsed() > Duration::from_millis(250)) {
            self.last_scroll = None;
            self.session.set_scrolling(false);
        }
        if self.surface.dirty {
            self.surface.dirty = false;
            let metrics = self.surface.metrics(self.mode());
            self.session.on_surface(metrics);
        }
    }

    fn jump_chapter(&mut self, forward: bool) {
        let Some(current) = self.session.position().map(|pos| pos.chapter.clone()) else {
            return;
        };
        let order = self.session.order();
        let target = if forward { order.next(&current) } else { order.previous(&current) };
        if let Some(target) = target.cloned() {
            self.session.open(&target, 0);
        }
    }

    fn handle_key(&mut self, key: KeyCode) -> bool {
        let mode = self.mode();
        match key {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('m') => {
                self.session.set_mode(mode.cycle());
                self.surface.dirty = true;
            }
            KeyCode::Char('z') => {
                self.zooming = !self.zooming;
                self.session.set_zooming(self.zooming);
            }
            KeyCode::Char('n') => self.jump_chapter(true),
            KeyCode::Char('p') => self.jump_chapter(false),
            KeyCode::Char('j') | KeyCode::Down if mode == ReadingMode::ContinuousVertical => {
                self.surface.set_pos(mode, self.surface.pos + 1.0);
                self.scrolled();
            }
            KeyCode::Char('k') | KeyCode::Up if mode == ReadingMode::ContinuousVertical => {
                self.surface.set_pos(mode, self.surface.pos - 1.0);
                self.scrolled();
            }
            KeyCode::Char('j') | KeyCode::Down | KeyCode::Char(' ') => {
                self.surface.step_page(mode, true);
                self.scrolled();
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.surface.step_page(mode, false);
                self.scrolled();
            }
            KeyCode::Char('l') | KeyCode::Right => {
                self.surface.step_page(mode, mode != ReadingMode::PagedRightToLeft);
                self.scrolled();
            }
            KeyCode::Char('h') | KeyCode::Left => {
                self.surface.step_page(mode, mode == ReadingMode::PagedRightToLeft);
                self.scrolled();
            }
            _ => {}
        }
        false
    }

    fn request_page(&mut self, page: &PageRef) {
        let key = page.key();
        if self.image_protocols.contains_key(&key) || !self.requested.insert(key) {
            return;
        }
        let _ = self.action_tx.send(Action::LoadPage(page.clone()));
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let c = Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).split(f.area());
    let (main_area, bottom_area) = (c[0], c[1]);

    match app.state.clone() {
        AppState::Loading => {
            f.render_widget(
                Paragraph::new("Fetching...")
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(app.theme).add_modifier(Modifier::RAPID_BLINK)),
                main_area,
            );
        }
        AppState::Error(msg) => {
            f.render_widget(
                Paragraph::new(format!("Error: {}", msg))
                    .style(Style::default().fg(Color::Red))
                    .block(Block::default().borders(Borders::ALL)),
                main_area,
            );
        }
        AppState::Reading => render_pages(f, app, main_area),
    }

    let zoom = if app.zooming { " [zoom]" } else { "" };
    let status = format!(
        " {} {} | {}{} | j/k scroll  h/l page  n/p chapter  m mode  q quit ",
        app.title,
        app.page_label,
        app.mode(),
        zoom
    );
    let status = match &app.notice {
        Some(notice) => format!("{status}| {notice}"),
        None => status,
    };
    f.render_widget(Paragraph::new(status).style(Style::default().bg(app.theme).fg(Color::Black)), bottom_area);
}

fn render_pages(f: &mut Frame, app: &mut App, area: Rect) {
    let mode = app.mode();
    app.surface.resize(mode, area.width, area.height);
    let metrics = app.surface.metrics(mode);
    let Some(visible) = metrics.visible.clone() else {
        return;
    };

    let extent = app.surface.extent(mode);
    let mut slots = Vec::new();
    if mode.is_paged() {
        let index = app.surface.page_index(mode).min(*visible.end());
        slots.push((index, area));
    } else {
        for index in visible {
            let top = index as f32 * extent - app.surface.pos;
            let start = top.max(0.0) as u16;
            let end = (top + extent).min(area.height as f32).max(0.0) as u16;
            if end > start {
                slots.push((index, Rect::new(area.x, area.y + start, area.width, end - start)));
            }
        }
    }

    for (index, rect) in slots {
        let Some(page) = app.session.page(index).cloned() else {
            continue;
        };
        app.request_page(&page);
        match app.image_protocols.get_mut(&page.key()) {
            Some(protocol) => f.render_stateful_widget(StatefulImage::default(), rect, protocol),
            None => f.render_widget(
                Paragraph::new("[Loading page...]")
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(Color::DarkGray)),
                rect,
            ),
        }
    }
}

fn init_logging() -> Result<()> {
    let dir = dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("rmanga");
    std::fs::create_dir_all(&dir)?;
    let file = std::fs::File::create(dir.join("rmanga.log"))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(location) = args.next() else {
        bail!("usage: rmanga <directory-or-url> [chapter]");
    };
    let start = args.next();

    init_logging()?;
    let config = config::load_config();
    let library = Library::open(&location)?;
    let order = library.list_chapters().await?;
    let first = match start {
        Some(id) if order.contains(&ChapterId::new(id.as_str())) => ChapterId::new(id),
        Some(id) => return Err(ReaderError::UnknownChapter(ChapterId::new(id)).into()),
        None => order.first().cloned().context("source has no chapters")?,
    };
    info!("opening {location} at chapter '{first}' ({} chapters)", order.len());

    let (action_tx, action_rx) = mpsc::unbounded_channel();
    let (loader_tx, mut loader_rx) = mpsc::unbounded_channel();
    let (reader_tx, mut reader_rx) = mpsc::unbounded_channel();
    let (config_tx, mut config_rx) = mpsc::unbounded_channel();

    let mut session = ReaderSession::new(Arc::new(library), order, &config, reader_tx);
    session.open(&first, 0);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session, &config, action_tx);
    tokio::spawn(run_image_loop(action_rx, loader_tx));
    if let Some(path) = config::config_path() {
        tokio::spawn(config::watch_config(path, Duration::from_secs(1), config_tx));
    }

    let tick_rate = Duration::from_millis(50);
    let res: Result<()> = loop {
        if let Err(err) = terminal.draw(|f| ui(f, &mut app)) {
            break Err(err.into());
        }
        match event::poll(tick_rate) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if app.handle_key(key.code) {
                        break Ok(());
                    }
                }
                Ok(_) => {}
                Err(err) => break Err(err.into()),
            },
            Ok(false) => {}
            Err(err) => break Err(err.into()),
        }

        app.session.pump();
        while let Ok(e) = reader_rx.try_recv() {
            app.on_reader_event(e);
        }
        while let Ok(e) = loader_rx.try_recv() {
            app.on_loader_event(e);
        }
        while let Ok(c) = config_rx.try_recv() {
            app.on_config(c);
        }
        app.on_tick();
    };

    app.session.teardown();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res
}
