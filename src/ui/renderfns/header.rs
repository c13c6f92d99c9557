use crate::ui::view::ShortcutInfo;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with title, backend host, connectivity and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  host: &str,
  online: bool,
  shortcuts: &[ShortcutInfo],
) {
  let (link, link_color) = if online {
    (" online ", Color::Green)
  } else {
    (" offline ", Color::Red)
  };

  let mut spans = vec![
    Span::styled(format!(" {} ", title), Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", host), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(link, Style::default().fg(link_color).bold()),
    Span::raw(" "),
  ];

  let mut shortcuts = shortcuts.to_vec();
  shortcuts.sort_by_key(|s| s.priority);
  for shortcut in shortcuts {
    // Keys highlighted, descriptions dimmed
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}
