use crate::config::Config;
use crate::events::{AppEvent, InboundSignal};
use crate::scheduler::{BackendEvent, BackendReply, RefreshScheduler, RefreshTimer};
use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use portwatch_core::{
    compute_visible_range, parse_bounds, preset_scan_ranges, AppSettings, KillResult, PortRange,
    PortRecord, PortView, PresetCatalog, RecordKey, SortColumn, TransportError, ViewChange,
    Viewport, VisibleRange,
};
use ratatui::layout::Rect;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One terminal line per record.
pub const ROW_HEIGHT: u32 = 1;
const NOTIFICATION_TTL: Duration = Duration::from_secs(4);
const WHEEL_STEP: i64 = 3;
const INTERVAL_STEP_MS: i64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    Search,
    RangeFilterPrompt,
    ScanPrompt,
    Presets,
    Settings,
    Help,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Search => "search",
            Mode::RangeFilterPrompt => "port range",
            Mode::ScanPrompt => "scan",
            Mode::Presets => "presets",
            Mode::Settings => "settings",
            Mode::Help => "help",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub expires_at: Instant,
}

pub struct App {
    pub view: PortView,
    pub viewport: Viewport,
    pub selected: Option<RecordKey>,
    pub selected_index: usize,
    pub mode: Mode,
    pub input: String,
    pub presets: PresetCatalog,
    pub preset_cursor: usize,
    pub settings: AppSettings,
    pub settings_draft: AppSettings,
    pub settings_path: PathBuf,
    pub notification: Option<Notification>,
    pub pending_elevation: Option<u32>,
    pub table_area: Option<Rect>,
    pub scheduler: RefreshScheduler,
    pub timer: RefreshTimer,
    pending_preset: Option<String>,
    changes: Receiver<ViewChange>,
    dirty: bool,
    should_quit: bool,
}

impl App {
    /// Needs a tokio runtime: the refresh timer is armed immediately.
    pub fn new(config: &Config, scheduler: RefreshScheduler) -> Self {
        let mut view = PortView::new(config.sort);
        let changes = view.subscribe();
        view.set_search(config.search.clone());
        let mut filters = *view.criteria().filters();
        filters.protocol = config.protocol;
        view.set_filters(filters);

        Self {
            view,
            viewport: Viewport::default(),
            selected: None,
            selected_index: 0,
            mode: Mode::Normal,
            input: String::new(),
            presets: PresetCatalog::default(),
            preset_cursor: 0,
            settings: config.settings.clone(),
            settings_draft: config.settings.clone(),
            settings_path: config.settings_path.clone(),
            notification: None,
            pending_elevation: None,
            table_area: None,
            scheduler,
            timer: RefreshTimer::new(config.refresh_interval()),
            pending_preset: None,
            changes,
            dirty: true,
            should_quit: false,
        }
    }

    /// Kicks off the first snapshot and the preset load.
    pub fn start(&mut self) {
        self.scheduler.fetch_all();
        self.scheduler.load_presets();
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn dispatch(&mut self, event: AppEvent) {
        match event {
            AppEvent::Input(Event::Key(key)) => {
                if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
                    self.handle_key(key);
                }
            }
            AppEvent::Input(Event::Mouse(mouse)) => self.handle_mouse(mouse),
            AppEvent::Input(Event::FocusLost) => self.on_focus_lost(),
            AppEvent::Input(Event::FocusGained) => self.on_focus_gained(),
            AppEvent::Input(Event::Paste(text)) => self.handle_paste(&text),
            AppEvent::Input(Event::Resize(_, _)) => {}
            AppEvent::Tick => self.on_tick(),
            AppEvent::RefreshDue => self.on_refresh_due(),
            AppEvent::Backend(event) => self.apply_backend(event),
            AppEvent::Signal(signal) => self.handle_signal(signal),
        }
        if self.changes.try_iter().count() > 0 {
            self.sync_selection();
        }
        self.mark_dirty();
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::Search => self.handle_search_key(key),
            Mode::RangeFilterPrompt | Mode::ScanPrompt => self.handle_prompt_key(key),
            Mode::Presets => self.handle_presets_key(key),
            Mode::Settings => self.handle_settings_key(key),
            Mode::Help => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                    self.mode = Mode::Normal;
                }
            }
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.mode = Mode::Help,
            KeyCode::Char('/') => {
                self.input = self.view.criteria().search().to_string();
                self.mode = Mode::Search;
            }
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::PageDown => self.move_selection(self.page_size()),
            KeyCode::PageUp => self.move_selection(-self.page_size()),
            KeyCode::Home => self.select_index(0),
            KeyCode::End => {
                let len = self.view.filtered_count();
                if len > 0 {
                    self.select_index(len - 1);
                }
            }
            KeyCode::Char(digit @ '1'..='6') => {
                let idx = digit as usize - '1' as usize;
                self.view.toggle_sort(SortColumn::ALL[idx]);
            }
            KeyCode::Char('o') => {
                self.view.reset_sort();
            }
            KeyCode::Char('p') => {
                let mut filters = *self.view.criteria().filters();
                filters.protocol = filters.protocol.next();
                self.view.set_filters(filters);
            }
            KeyCode::Char('u') => {
                let mut filters = *self.view.criteria().filters();
                filters.user = filters.user.toggle();
                self.view.set_filters(filters);
            }
            KeyCode::Char('t') => {
                let mut filters = *self.view.criteria().filters();
                filters.state = filters.state.next();
                self.view.set_filters(filters);
            }
            KeyCode::Char('g') => {
                self.input = self
                    .view
                    .criteria()
                    .filters()
                    .port_range
                    .map(|range| range.to_string())
                    .unwrap_or_default();
                self.mode = Mode::RangeFilterPrompt;
            }
            KeyCode::Char('c') => {
                if self.view.reset() {
                    self.notify(NotificationLevel::Info, "Filters cleared");
                }
            }
            KeyCode::Char('s') => {
                if self.refuse_while_busy() {
                    return;
                }
                self.input.clear();
                self.mode = Mode::ScanPrompt;
            }
            KeyCode::Char('P') => self.open_presets(),
            KeyCode::Char('r') => {
                self.request_refresh();
            }
            KeyCode::Char('K') => self.terminate_selected(),
            KeyCode::Char('E') => self.retry_elevated(),
            KeyCode::Char(',') => self.open_settings(),
            _ => {}
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.input.clear();
                self.view.set_search("");
                self.mode = Mode::Normal;
            }
            KeyCode::Enter => self.mode = Mode::Normal,
            KeyCode::Backspace => {
                self.input.pop();
                self.view.set_search(self.input.clone());
            }
            KeyCode::Char(ch) => {
                self.input.push(ch);
                self.view.set_search(self.input.clone());
            }
            _ => {}
        }
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.input.clear();
                self.mode = Mode::Normal;
            }
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.input);
                let mode = std::mem::take(&mut self.mode);
                if mode == Mode::ScanPrompt {
                    self.submit_scan(&text);
                } else {
                    self.submit_range_filter(&text);
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() || matches!(ch, '-' | ':' | ' ') => {
                self.input.push(ch);
            }
            _ => {}
        }
    }

    fn handle_presets_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => self.mode = Mode::Normal,
            KeyCode::Char('j') | KeyCode::Down => {
                if self.preset_cursor + 1 < self.presets.len() {
                    self.preset_cursor += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.preset_cursor = self.preset_cursor.saturating_sub(1);
            }
            KeyCode::Enter => {
                if self.refuse_while_busy() {
                    return;
                }
                if let Some(id) = self.presets.get(self.preset_cursor).map(|p| p.id.clone()) {
                    self.mode = Mode::Normal;
                    self.run_preset(id);
                }
            }
            _ => {}
        }
    }

    fn handle_settings_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Right => {
                self.settings_draft.adjust_interval(INTERVAL_STEP_MS);
            }
            KeyCode::Char('-') | KeyCode::Left => {
                self.settings_draft.adjust_interval(-INTERVAL_STEP_MS);
            }
            KeyCode::Enter => self.save_settings(),
            _ => {}
        }
    }

    fn handle_paste(&mut self, text: &str) {
        match self.mode {
            Mode::Search => {
                self.input.push_str(text.trim_end_matches(['\r', '\n']));
                self.view.set_search(self.input.clone());
            }
            Mode::RangeFilterPrompt | Mode::ScanPrompt => self.input.push_str(text.trim()),
            _ => {}
        }
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        let total_height = self.total_height();
        match mouse.kind {
            MouseEventKind::ScrollDown => self.viewport.scroll_by(WHEEL_STEP, total_height),
            MouseEventKind::ScrollUp => self.viewport.scroll_by(-WHEEL_STEP, total_height),
            MouseEventKind::Down(MouseButton::Left) => {
                let Some(area) = self.table_area else {
                    return;
                };
                let inside = mouse.column >= area.x
                    && mouse.column < area.x + area.width
                    && mouse.row >= area.y
                    && mouse.row < area.y + area.height;
                if !inside {
                    return;
                }
                let index = self.viewport.first_row(ROW_HEIGHT) + usize::from(mouse.row - area.y);
                if index < self.view.filtered_count() {
                    self.select_index(index);
                }
            }
            _ => {}
        }
    }

    pub fn on_tick(&mut self) {
        let expired = self
            .notification
            .as_ref()
            .is_some_and(|notification| notification.expires_at <= Instant::now());
        if expired {
            self.notification = None;
        }
    }

    pub fn on_refresh_due(&mut self) {
        if self.scheduler.is_busy() {
            debug!(event = "refresh_tick_skipped", in_flight = self.scheduler.in_flight());
            return;
        }
        self.scheduler.fetch_all();
    }

    fn on_focus_lost(&mut self) {
        if self.timer.pause() {
            info!(event = "refresh_paused");
        }
    }

    fn on_focus_gained(&mut self) {
        if self.timer.resume() {
            info!(event = "refresh_resumed");
            self.scheduler.fetch_all();
        }
    }

    pub fn handle_signal(&mut self, signal: InboundSignal) {
        info!(event = "inbound_signal", signal = ?signal);
        match signal {
            InboundSignal::RefreshRequested => {
                self.scheduler.fetch_all();
            }
            InboundSignal::ScanPresetRequested { preset_id } => self.run_preset(preset_id),
            InboundSignal::OpenSettings => self.open_settings(),
        }
    }

    pub fn apply_backend(&mut self, event: BackendEvent) {
        if !self.scheduler.settle(&event) {
            return;
        }
        match event.reply {
            BackendReply::Discovered(Ok(records)) => {
                info!(event = "snapshot_applied", seq = event.seq, count = records.len());
                self.view.set_snapshot(records);
            }
            BackendReply::Scanned {
                range,
                result: Ok(records),
            } => {
                info!(
                    event = "scan_merged",
                    seq = event.seq,
                    range = %range,
                    count = records.len()
                );
                let found = records.len();
                self.view.merge_snapshot(records);
                self.notify(
                    NotificationLevel::Success,
                    format!("Scanned {range}: {found} port(s)"),
                );
            }
            BackendReply::Terminated {
                pid,
                elevated,
                result: Ok(outcome),
            } => self.apply_kill_result(pid, elevated, outcome),
            BackendReply::Presets(Ok(presets)) => {
                self.presets.replace(presets);
                self.preset_cursor = self.preset_cursor.min(self.presets.len().saturating_sub(1));
                if let Some(id) = self.pending_preset.take() {
                    if self.presets.is_empty() {
                        self.notify(NotificationLevel::Error, "No presets available");
                    } else {
                        self.run_preset(id);
                    }
                }
            }
            BackendReply::Discovered(Err(err))
            | BackendReply::Scanned { result: Err(err), .. }
            | BackendReply::Terminated { result: Err(err), .. } => self.report_transport(err),
            BackendReply::Presets(Err(err)) => {
                self.pending_preset = None;
                self.report_transport(err);
            }
        }
    }

    fn apply_kill_result(&mut self, pid: u32, elevated: bool, outcome: KillResult) {
        info!(event = "terminate_result", pid, elevated, status = outcome.label());
        match outcome {
            KillResult::Success => {
                self.pending_elevation = None;
                self.notify(NotificationLevel::Success, format!("Terminated process {pid}"));
                self.scheduler.fetch_all();
            }
            KillResult::ProcessNotFound { pid } => {
                self.pending_elevation = None;
                self.notify(NotificationLevel::Info, format!("Process {pid} already exited"));
                self.scheduler.fetch_all();
            }
            KillResult::PermissionDenied { .. } | KillResult::ElevationRequired { .. } => {
                if elevated {
                    self.notify(
                        NotificationLevel::Error,
                        format!("Elevated termination of {pid} was refused"),
                    );
                } else {
                    self.pending_elevation = Some(pid);
                    self.notify(
                        NotificationLevel::Error,
                        format!("Permission denied for {pid}; press E to retry with elevation"),
                    );
                }
            }
            KillResult::Error { message } => self.notify(NotificationLevel::Error, message),
        }
    }

    fn report_transport(&mut self, err: TransportError) {
        warn!(event = "backend_error", operation = err.operation(), error = %err);
        self.notify(NotificationLevel::Error, err.to_string());
    }

    /// Returns `false` when refused because a refresh is already running.
    pub fn request_refresh(&mut self) -> bool {
        if self.refuse_while_busy() {
            return false;
        }
        self.scheduler.fetch_all();
        true
    }

    fn refuse_while_busy(&mut self) -> bool {
        if self.scheduler.is_busy() {
            self.notify(NotificationLevel::Info, "Refresh already in progress");
            return true;
        }
        false
    }

    fn submit_scan(&mut self, text: &str) {
        let outcome =
            parse_bounds(text).and_then(|(start, end)| self.scheduler.scan_range(start, end));
        match outcome {
            Ok(range) => self.notify(NotificationLevel::Info, format!("Scanning {range}")),
            Err(err) => {
                debug!(event = "scan_range_rejected", input = text, error = %err);
                self.notify(NotificationLevel::Error, err.to_string());
            }
        }
    }

    fn submit_range_filter(&mut self, text: &str) {
        let mut filters = *self.view.criteria().filters();
        if text.trim().is_empty() {
            filters.port_range = None;
            self.view.set_filters(filters);
            return;
        }
        match PortRange::parse(text) {
            Ok(range) => {
                filters.port_range = Some(range);
                self.view.set_filters(filters);
            }
            Err(err) => {
                debug!(event = "port_range_rejected", input = text, error = %err);
                self.notify(NotificationLevel::Error, err.to_string());
            }
        }
    }

    fn run_preset(&mut self, id: String) {
        if self.presets.needs_load() {
            self.pending_preset = Some(id);
            self.scheduler.load_presets();
            return;
        }
        let Some(preset) = self.presets.find(&id) else {
            self.notify(NotificationLevel::Error, format!("Unknown preset: {id}"));
            return;
        };
        let name = preset.name.clone();
        let ranges = preset_scan_ranges(preset);
        for range in &ranges {
            self.scheduler.scan(*range);
        }
        self.notify(
            NotificationLevel::Info,
            format!("Scanning {name} ({} range(s))", ranges.len()),
        );
    }

    fn open_presets(&mut self) {
        if self.presets.needs_load() {
            self.scheduler.load_presets();
        }
        self.mode = Mode::Presets;
    }

    fn open_settings(&mut self) {
        self.settings_draft = self.settings.clone();
        self.mode = Mode::Settings;
    }

    fn save_settings(&mut self) {
        let draft = self.settings_draft.clone().normalized();
        if let Err(err) = draft.save(&self.settings_path) {
            warn!(event = "settings_save_failed", error = %err);
            self.notify(NotificationLevel::Error, err.to_string());
            return;
        }
        if self
            .timer
            .set_period(Duration::from_millis(draft.refresh_interval_ms))
        {
            info!(event = "refresh_interval_changed", ms = draft.refresh_interval_ms);
        }
        self.settings = draft;
        self.mode = Mode::Normal;
        self.notify(NotificationLevel::Success, "Settings saved");
    }

    fn terminate_selected(&mut self) {
        let Some(record) = self.selected_record().cloned() else {
            return;
        };
        self.pending_elevation = None;
        self.scheduler.terminate(record.pid, false);
        self.notify(
            NotificationLevel::Info,
            format!("Terminating {} ({})", record.process_name, record.pid),
        );
    }

    fn retry_elevated(&mut self) {
        match self.pending_elevation.take() {
            Some(pid) => {
                self.scheduler.terminate(pid, true);
                self.notify(
                    NotificationLevel::Info,
                    format!("Retrying termination of {pid} with elevation"),
                );
            }
            None => self.notify(NotificationLevel::Info, "Nothing to retry"),
        }
    }

    pub fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        self.notification = Some(Notification {
            level,
            message: message.into(),
            expires_at: Instant::now() + NOTIFICATION_TTL,
        });
    }

    pub fn selected_record(&mut self) -> Option<&PortRecord> {
        let key = self.selected?;
        let view = self.view.view();
        view.position_of(key).and_then(|position| view.get(position))
    }

    pub fn total_height(&mut self) -> u64 {
        self.view.filtered_count() as u64 * u64::from(ROW_HEIGHT)
    }

    pub fn visible_range(&mut self) -> VisibleRange {
        compute_visible_range(
            self.view.filtered_count(),
            ROW_HEIGHT,
            self.viewport.scroll_offset,
            self.viewport.container_height,
            self.settings.overscan,
        )
    }

    /// Called by the renderer with the table body area.
    pub fn update_layout(&mut self, body: Rect) {
        self.table_area = Some(body);
        let height = u64::from(body.height);
        if self.viewport.container_height != height {
            self.viewport.container_height = height;
            self.viewport.ensure_visible(self.selected_index, ROW_HEIGHT);
        }
        let total_height = self.total_height();
        self.viewport.clamp(total_height);
    }

    fn page_size(&self) -> i64 {
        (self.viewport.container_height / u64::from(ROW_HEIGHT)).max(1) as i64
    }

    fn move_selection(&mut self, delta: i64) {
        let len = self.view.filtered_count();
        if len == 0 {
            return;
        }
        let next = (self.selected_index as i64 + delta).clamp(0, len as i64 - 1);
        self.select_index(next as usize);
    }

    fn select_index(&mut self, index: usize) {
        let key = self.view.view().get(index).map(PortRecord::key);
        if key.is_none() {
            return;
        }
        self.selected = key;
        self.selected_index = index;
        self.viewport.ensure_visible(index, ROW_HEIGHT);
    }

    /// Re-anchors the selection after the derived view changed: the same
    /// record if it is still visible, otherwise the nearest position.
    fn sync_selection(&mut self) {
        let view = self.view.view();
        let len = view.len();
        if len == 0 {
            self.selected = None;
            self.selected_index = 0;
            self.viewport.scroll_offset = 0;
            return;
        }
        let index = self
            .selected
            .and_then(|key| view.position_of(key))
            .unwrap_or_else(|| self.selected_index.min(len - 1));
        self.selected = view.get(index).map(PortRecord::key);
        self.selected_index = index;
        self.viewport.ensure_visible(index, ROW_HEIGHT);
        let total_height = len as u64 * u64::from(ROW_HEIGHT);
        self.viewport.clamp(total_height);
    }
}
