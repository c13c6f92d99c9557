mod components;
pub mod renderfns;
pub mod view;
pub mod views;

pub use components::{CommandInput, KeyResult};

use crate::app::App;
use ratatui::prelude::*;
use ratatui::widgets::ListState;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Footer
    ])
    .split(frame.area());

  let shortcuts = app.current_view().map(|v| v.shortcuts()).unwrap_or_default();
  renderfns::draw_header(
    frame,
    chunks[0],
    app.title(),
    app.host(),
    app.is_online(),
    &shortcuts,
  );

  if let Some(view) = app.current_view_mut() {
    view.render(frame, chunks[1]);
  }
  app.command().render_overlay(frame, chunks[1]);

  renderfns::draw_footer(frame, chunks[2], &app.view_breadcrumb(), app.notice());
}

/// Keep a list selection inside `0..len`, selecting the first row when the
/// list gains items and clearing it when the list empties.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  match (state.selected(), len) {
    (_, 0) => state.select(None),
    (None, _) => state.select(Some(0)),
    (Some(i), len) if i >= len => state.select(Some(len - 1)),
    _ => {}
  }
}
