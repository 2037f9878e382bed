use crate::app::{App, Mode, ROW_HEIGHT};
use crate::theme::{self, icons};
use portwatch_core::{SortColumn, SortDirection};
use ratatui::{
    layout::{Constraint, Direction, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Scrollbar,
        ScrollbarOrientation, ScrollbarState, Table, TableState, Wrap,
    },
    Frame,
};

const WIDTHS: [Constraint; 6] = [
    Constraint::Length(7),
    Constraint::Min(14),
    Constraint::Length(8),
    Constraint::Length(6),
    Constraint::Length(24),
    Constraint::Length(12),
];

pub fn render(f: &mut Frame, app: &mut App) {
    let area = f.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(4),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_table(f, app, chunks[1]);
    render_status(f, app, chunks[2]);

    match app.mode {
        Mode::Help => render_help(f, area),
        Mode::Presets => render_presets(f, app, area),
        Mode::Settings => render_settings(f, app, area),
        Mode::RangeFilterPrompt | Mode::ScanPrompt => render_prompt(f, app, area),
        Mode::Normal | Mode::Search => {}
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let criteria = app.view.criteria();
    let filters = criteria.filters();
    let sort = criteria.sort();

    let busy = if app.scheduler.is_busy() {
        icons::BUSY
    } else if app.timer.is_paused() {
        icons::PAUSED
    } else {
        icons::IDLE
    };
    let search_style = if app.mode == Mode::Search {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let mut search = criteria.search().to_string();
    if app.mode == Mode::Search {
        search.push('_');
    }

    let title = Line::from(vec![
        Span::styled("portwatch ", theme::HEADER_STYLE),
        Span::styled(busy, Style::default().fg(Color::Yellow)),
        Span::raw("  "),
        Span::styled("search: ", theme::MUTED_STYLE),
        Span::styled(search, search_style),
    ]);

    let range = filters
        .port_range
        .map(|range| range.to_string())
        .unwrap_or_else(|| "-".to_string());
    let summary = Line::from(vec![
        Span::styled("proto ", theme::MUTED_STYLE),
        Span::raw(filters.protocol.label()),
        Span::styled("  state ", theme::MUTED_STYLE),
        Span::raw(filters.state.label()),
        Span::styled("  user ", theme::MUTED_STYLE),
        Span::raw(filters.user.label()),
        Span::styled("  range ", theme::MUTED_STYLE),
        Span::raw(range),
        Span::styled("  sort ", theme::MUTED_STYLE),
        Span::raw(format!("{} {}", sort.column.label(), sort.direction.label())),
        Span::styled(
            format!("  [{}] ? help", app.mode.label()),
            theme::MUTED_STYLE,
        ),
    ]);

    f.render_widget(Paragraph::new(vec![title, summary]), area);
}

fn render_table(f: &mut Frame, app: &mut App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Ports")
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    let body = Rect {
        y: inner.y.saturating_add(1),
        height: inner.height.saturating_sub(1),
        ..inner
    };
    app.update_layout(body);

    let sort = app.view.criteria().sort();
    let header = Row::new(
        SortColumn::ALL.map(|column| header_label(column, sort.column, sort.direction)),
    )
    .style(theme::HEADER_STYLE);

    if app.view.filtered_count() == 0 {
        let message = if app.view.total_count() == 0 && app.scheduler.is_busy() {
            "Scanning ports..."
        } else if app.view.total_count() == 0 {
            "No listening ports found. Press r to refresh."
        } else {
            "No ports match the current search and filters. Press c to clear."
        };
        f.render_widget(block, area);
        f.render_widget(Table::new(Vec::<Row>::new(), WIDTHS).header(header), inner);
        let hint = Rect {
            y: body.y,
            height: body.height.min(2),
            ..body
        };
        f.render_widget(
            Paragraph::new(Span::styled(message, Style::default().fg(Color::Yellow)))
                .wrap(Wrap { trim: true }),
            hint,
        );
        return;
    }

    let range = app.visible_range();
    let first_row = app
        .viewport
        .first_row(ROW_HEIGHT)
        .clamp(range.start_index, range.end_index);
    let selected = app.selected;
    let total_rows = app.view.filtered_count();

    let mut selected_in_window = None;
    let rows: Vec<Row> = app
        .view
        .view()
        .slice(range.start_index, range.end_index)
        .enumerate()
        .map(|(offset, record)| {
            if Some(record.key()) == selected {
                selected_in_window = Some(offset);
            }
            Row::new(vec![
                Cell::from(Span::styled(
                    record.port.to_string(),
                    theme::port_color(record.port),
                )),
                Cell::from(record.process_name.clone()),
                Cell::from(record.pid.to_string()),
                Cell::from(Span::styled(
                    record.protocol.as_str(),
                    theme::protocol_color(record.protocol),
                )),
                Cell::from(record.address.clone()),
                Cell::from(record.user.clone()),
            ])
            .style(theme::zebra_row_style(range.start_index + offset))
        })
        .collect();

    // Overscan rows sit above the viewport; skip them through the table offset.
    let skip = first_row - range.start_index;
    let visible_rows = usize::from(body.height);
    let highlighted =
        selected_in_window.filter(|offset| *offset >= skip && *offset < skip + visible_rows);
    let mut state = TableState::default()
        .with_offset(skip)
        .with_selected(highlighted);

    let table = Table::new(rows, WIDTHS)
        .header(header)
        .block(block)
        .highlight_style(theme::SELECTED_STYLE);
    f.render_stateful_widget(table, area, &mut state);

    if total_rows > visible_rows {
        let mut scrollbar_state = ScrollbarState::new(total_rows)
            .position(first_row)
            .viewport_content_length(visible_rows);
        f.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area.inner(&Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn header_label(column: SortColumn, sorted: SortColumn, direction: SortDirection) -> String {
    let title = match column {
        SortColumn::Port => "Port",
        SortColumn::Process => "Process",
        SortColumn::Pid => "PID",
        SortColumn::Protocol => "Proto",
        SortColumn::Address => "Address",
        SortColumn::User => "User",
    };
    if column != sorted {
        return title.to_string();
    }
    let arrow = match direction {
        SortDirection::Ascending => icons::SORT_ASC,
        SortDirection::Descending => icons::SORT_DESC,
    };
    format!("{title} {arrow}")
}

fn render_status(f: &mut Frame, app: &mut App, area: Rect) {
    let filtered = app.view.filtered_count();
    let stats = app.view.stats();
    let age = app
        .view
        .record_store()
        .last_refresh()
        .map(|at| {
            let seconds = chrono::Utc::now()
                .signed_duration_since(at)
                .num_seconds()
                .max(0);
            format!("{seconds}s ago")
        })
        .unwrap_or_else(|| "never".to_string());
    let interval = app.timer.period().as_millis() as f64 / 1000.0;

    let mut spans = vec![
        Span::styled(
            format!("{filtered}/{} ports", stats.total),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(
                "  tcp {} udp {} procs {}",
                stats.tcp, stats.udp, stats.processes
            ),
            theme::MUTED_STYLE,
        ),
        Span::styled(
            format!("  refreshed {age}  every {interval:.1}s"),
            theme::MUTED_STYLE,
        ),
    ];
    if let Some(pid) = app.pending_elevation {
        spans.push(Span::styled(
            format!("  E: retry {pid} elevated"),
            Style::default().fg(Color::Yellow),
        ));
    }
    if let Some(notification) = &app.notification {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            notification.message.clone(),
            theme::notification_style(notification.level),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_help(f: &mut Frame, area: Rect) {
    let area = centered_rect(60, 80, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Help")
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let bindings = [
        ("/", "Search (Esc clears, Enter keeps)"),
        ("j k / arrows", "Move selection"),
        ("PgUp PgDn Home End", "Jump"),
        ("1-6", "Sort by column (again to reverse)"),
        ("o", "Reset sort"),
        ("p", "Cycle protocol filter"),
        ("u", "Toggle current-user filter"),
        ("t", "Cycle state filter"),
        ("g", "Port range filter"),
        ("c", "Clear search and filters"),
        ("s", "Scan a port range"),
        ("P", "Scan a preset"),
        ("r", "Refresh now"),
        ("K", "Terminate selected process"),
        ("E", "Retry termination with elevation"),
        (",", "Settings"),
        ("q", "Quit"),
    ];
    let mut lines = vec![
        Line::from(Span::styled(
            "Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    lines.extend(bindings.iter().map(|(keys, action)| {
        Line::from(vec![
            Span::styled(format!("{keys:<20}"), theme::KEY_STYLE),
            Span::raw(*action),
        ])
    }));
    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn render_presets(f: &mut Frame, app: &App, area: Rect) {
    let area = centered_rect(70, 60, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Presets (Enter scans, Esc closes)")
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    if app.presets.is_empty() {
        f.render_widget(Paragraph::new("Loading presets..."), inner);
        return;
    }

    let items: Vec<ListItem> = app
        .presets
        .iter()
        .map(|preset| {
            let mut spans = vec![
                Span::styled(format!("{:<10}", preset.id), theme::KEY_STYLE),
                Span::raw(preset.name.clone()),
            ];
            if let Some(description) = &preset.description {
                spans.push(Span::styled(format!("  {description}"), theme::MUTED_STYLE));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();
    let mut state = ListState::default().with_selected(Some(app.preset_cursor));
    let list = List::new(items)
        .highlight_style(theme::SELECTED_STYLE)
        .highlight_symbol("> ");
    f.render_stateful_widget(list, inner, &mut state);
}

fn render_settings(f: &mut Frame, app: &App, area: Rect) {
    let area = centered_rect(50, 40, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Settings")
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let draft = &app.settings_draft;
    let lines = vec![
        Line::from(vec![
            Span::styled("Refresh interval  ", theme::MUTED_STYLE),
            Span::styled(
                format!("{} ms", draft.refresh_interval_ms),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("Overscan          ", theme::MUTED_STYLE),
            Span::raw(draft.overscan.to_string()),
        ]),
        Line::from(vec![
            Span::styled("Default sort      ", theme::MUTED_STYLE),
            Span::raw(format!(
                "{} {}",
                draft.display.default_sort.label(),
                draft.display.default_sort_direction.label()
            )),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("+/-", theme::KEY_STYLE),
            Span::raw(" change interval  "),
            Span::styled("Enter", theme::KEY_STYLE),
            Span::raw(" save  "),
            Span::styled("Esc", theme::KEY_STYLE),
            Span::raw(" cancel"),
        ]),
        Line::from(Span::styled(
            app.settings_path.display().to_string(),
            theme::MUTED_STYLE,
        )),
    ];
    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn render_prompt(f: &mut Frame, app: &App, area: Rect) {
    let title = if app.mode == Mode::ScanPrompt {
        "Scan port range"
    } else {
        "Filter by port range (empty clears)"
    };
    let outer = centered_rect(50, 20, area);
    let area = Rect {
        height: outer.height.min(4),
        ..outer
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let lines = vec![
        Line::from(vec![
            Span::styled("> ", theme::KEY_STYLE),
            Span::raw(format!("{}_", app.input)),
        ]),
        Line::from(Span::styled("start-end, e.g. 3000-3010", theme::MUTED_STYLE)),
    ];
    f.render_widget(Paragraph::new(lines), inner);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_column_carries_direction_arrow() {
        assert_eq!(
            header_label(SortColumn::Port, SortColumn::Port, SortDirection::Descending),
            "Port v"
        );
        assert_eq!(
            header_label(SortColumn::User, SortColumn::Port, SortDirection::Ascending),
            "User"
        );
    }

    #[test]
    fn centered_rect_stays_inside_area() {
        let area = Rect::new(0, 0, 100, 40);
        let inner = centered_rect(50, 50, area);
        assert_eq!(inner.width, 50);
        assert_eq!(inner.height, 20);
        assert_eq!(inner.x, 25);
        assert_eq!(inner.y, 10);
    }
}
