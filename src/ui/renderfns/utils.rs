use chrono::{DateTime, Utc};
use formation_portal::cache::FetchError;
use formation_portal::view::ViewState;
use ratatui::prelude::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Human readable age of a fetch timestamp
pub fn format_age(fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
  let Some(at) = fetched_at else {
    return "never".to_string();
  };
  let secs = (now - at).num_seconds().max(0);
  match secs {
    0..=9 => "just now".to_string(),
    10..=59 => format!("{}s ago", secs),
    60..=3599 => format!("{}m ago", secs / 60),
    3600..=86399 => format!("{}h ago", secs / 3600),
    _ => format!("{}d ago", secs / 86400),
  }
}

/// Short status label and color for a block title
pub fn state_badge<T>(view: &ViewState<'_, T>) -> Option<(String, Color)> {
  if view.loading {
    Some(("loading...".to_string(), Color::Yellow))
  } else if view.is_refreshing {
    Some(("refreshing".to_string(), Color::Cyan))
  } else {
    view.error.map(error_badge)
  }
}

fn error_badge(error: &FetchError) -> (String, Color) {
  (format!("error: {}", truncate(error.message(), 40)), Color::Red)
}
