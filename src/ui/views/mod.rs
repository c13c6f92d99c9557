mod confreres;
mod dashboard;
mod personnel;
mod profile_detail;

pub use confreres::ConfreresView;
pub use dashboard::DashboardView;
pub use personnel::PersonnelView;
pub use profile_detail::ProfileDetailView;

use crate::ui::renderfns::{format_age, state_badge};
use chrono::{DateTime, Utc};
use formation_portal::view::ViewState;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders};

/// Bordered block whose title carries the query state and data age.
fn query_block<'a, T>(
  title: &str,
  count: Option<usize>,
  view: &ViewState<'_, T>,
  fetched_at: Option<DateTime<Utc>>,
) -> Block<'a> {
  let mut spans = vec![Span::raw(format!(" {} ", title))];
  if let Some(count) = count {
    spans.push(Span::raw(format!("({}) ", count)));
  }
  match state_badge(view) {
    Some((label, color)) => spans.push(Span::styled(
      format!("[{}] ", label),
      Style::default().fg(color),
    )),
    None if fetched_at.is_some() => spans.push(Span::styled(
      format!("· {} ", format_age(fetched_at, Utc::now())),
      Style::default().fg(Color::DarkGray),
    )),
    None => {}
  }

  Block::default()
    .title(Line::from(spans))
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue))
}

/// Placeholder text when there are no rows to show, `None` when there are.
fn placeholder<T>(view: &ViewState<'_, T>, empty_text: &'static str) -> Option<String> {
  if view.loading {
    Some("Loading...".to_string())
  } else if view.is_empty {
    Some(empty_text.to_string())
  } else if view.data.is_none() {
    Some(match view.error {
      Some(e) => format!("Failed to load: {}\n\nPress 'r' to retry.", e),
      None => "Nothing loaded yet. Press 'r' to fetch.".to_string(),
    })
  } else {
    None
  }
}
