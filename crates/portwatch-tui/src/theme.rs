use crate::app::NotificationLevel;
use portwatch_core::Protocol;
use ratatui::style::{Color, Modifier, Style};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(131, 165, 152))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);
pub const MUTED_STYLE: Style = Style::new().fg(Color::Rgb(146, 131, 116));
pub const KEY_STYLE: Style = Style::new().fg(Color::Cyan);

pub fn zebra_row_style(index: usize) -> Style {
    let bg = if index % 2 == 0 {
        Color::Rgb(18, 20, 26)
    } else {
        Color::Rgb(24, 27, 34)
    };
    Style::new().bg(bg)
}

pub fn protocol_color(protocol: Protocol) -> Color {
    match protocol {
        Protocol::Tcp => Color::Rgb(131, 165, 152),
        Protocol::Udp => Color::Rgb(211, 134, 155),
    }
}

/// Ports below 1024 need privileges to bind, so they stand out.
pub fn port_color(port: u16) -> Color {
    if port < 1024 {
        Color::Rgb(250, 189, 47)
    } else {
        Color::Rgb(235, 219, 178)
    }
}

pub fn notification_style(level: NotificationLevel) -> Style {
    let color = match level {
        NotificationLevel::Info => Color::Rgb(131, 165, 152),
        NotificationLevel::Success => Color::Rgb(184, 187, 38),
        NotificationLevel::Error => Color::Rgb(251, 73, 52),
    };
    Style::new().fg(color).add_modifier(Modifier::BOLD)
}

pub mod icons {
    pub const SORT_ASC: &str = "^";
    pub const SORT_DESC: &str = "v";
    pub const BUSY: &str = "*";
    pub const IDLE: &str = " ";
    pub const PAUSED: &str = "||";
}
