use super::KeyResult;
use crate::commands::{self, Command};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};

const MAX_SUGGESTIONS: usize = 8;

/// Command input component with autocomplete
#[derive(Debug, Clone, Default)]
pub struct CommandInput {
  buffer: String,
  active: bool,
  selected_suggestion: usize,
}

impl CommandInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn value(&self) -> &str {
    &self.buffer
  }

  fn activate(&mut self) {
    self.active = true;
    self.reset();
  }

  fn reset(&mut self) {
    self.buffer.clear();
    self.selected_suggestion = 0;
  }

  pub fn suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(&self.buffer)
  }

  /// Handle a key event.
  ///
  /// Call this regardless of active state; `:` activates it. Returns the
  /// resolved command name when one is submitted.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<String> {
    if !self.active {
      if key.code == KeyCode::Char(':') {
        self.activate();
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    match key.code {
      KeyCode::Esc => {
        self.active = false;
        self.reset();
      }
      KeyCode::Enter => {
        self.active = false;
        let cmd = self.resolve_command();
        self.reset();
        return KeyResult::Event(cmd);
      }
      KeyCode::Tab | KeyCode::Down => {
        let count = self.suggestions().len();
        if count > 0 {
          self.selected_suggestion = (self.selected_suggestion + 1) % count;
        }
      }
      KeyCode::BackTab | KeyCode::Up => {
        let count = self.suggestions().len();
        if count > 0 {
          self.selected_suggestion = (self.selected_suggestion + count - 1) % count;
        }
      }
      KeyCode::Backspace => {
        self.buffer.pop();
        self.selected_suggestion = 0;
      }
      KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => self.reset(),
      KeyCode::Char(c) => {
        self.buffer.push(c);
        self.selected_suggestion = 0;
      }
      _ => {}
    }
    KeyResult::Handled
  }

  /// The selected suggestion, or the raw input when nothing matches
  fn resolve_command(&self) -> String {
    self
      .suggestions()
      .get(self.selected_suggestion)
      .map(|cmd| cmd.name.to_string())
      .unwrap_or_else(|| self.buffer.trim().to_lowercase())
  }

  /// Render the command overlay if active
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.is_active() {
      return;
    }

    let suggestions = self.suggestions();
    let shown = suggestions.len().min(MAX_SUGGESTIONS);

    let width = (area.width * 60 / 100).clamp(30, 60).min(area.width);
    let height = (3 + shown as u16).min(area.height.saturating_sub(1));
    let overlay_area = Rect::new(area.x + 1, area.y + 1, width.saturating_sub(1), height);

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(" Command ");
    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    if inner.height == 0 {
      return;
    }

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(1), Constraint::Min(0)])
      .split(inner);

    let input_line = Line::from(vec![
      Span::styled(":", Style::default().fg(Color::Yellow)),
      Span::raw(self.value()),
      Span::styled("_", Style::default().fg(Color::Yellow)), // Cursor
    ]);
    frame.render_widget(Paragraph::new(input_line), chunks[0]);

    if shown > 0 && chunks[1].height > 0 {
      let items: Vec<ListItem> = suggestions
        .iter()
        .take(MAX_SUGGESTIONS)
        .map(|cmd| {
          ListItem::new(Line::from(vec![
            Span::styled(format!("{:<12}", cmd.name), Style::default().fg(Color::Cyan)),
            Span::styled(cmd.description, Style::default().fg(Color::DarkGray)),
          ]))
        })
        .collect();

      let list =
        List::new(items).highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));
      let mut state = ListState::default().with_selected(Some(self.selected_suggestion));
      frame.render_stateful_widget(list, chunks[1], &mut state);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn press(input: &mut CommandInput, code: KeyCode) -> KeyResult<String> {
    input.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
  }

  fn type_str(input: &mut CommandInput, text: &str) {
    for c in text.chars() {
      press(input, KeyCode::Char(c));
    }
  }

  #[test]
  fn test_inactive_ignores_keys() {
    let mut input = CommandInput::new();
    assert_eq!(press(&mut input, KeyCode::Char('r')), KeyResult::NotHandled);
    assert!(!input.is_active());
  }

  #[test]
  fn test_submit_resolves_suggestion() {
    let mut input = CommandInput::new();
    assert_eq!(press(&mut input, KeyCode::Char(':')), KeyResult::Handled);
    type_str(&mut input, "conf");
    assert_eq!(
      press(&mut input, KeyCode::Enter),
      KeyResult::Event("confreres".to_string())
    );
    assert!(!input.is_active());
    assert_eq!(input.value(), "");
  }

  #[test]
  fn test_tab_cycles_suggestions() {
    let mut input = CommandInput::new();
    press(&mut input, KeyCode::Char(':'));
    press(&mut input, KeyCode::Tab);
    assert_eq!(
      press(&mut input, KeyCode::Enter),
      KeyResult::Event(commands::COMMANDS[1].name.to_string())
    );
  }

  #[test]
  fn test_unknown_command_passes_raw_input() {
    let mut input = CommandInput::new();
    press(&mut input, KeyCode::Char(':'));
    type_str(&mut input, "Zzz");
    assert_eq!(
      press(&mut input, KeyCode::Enter),
      KeyResult::Event("zzz".to_string())
    );
  }

  #[test]
  fn test_escape_cancels() {
    let mut input = CommandInput::new();
    press(&mut input, KeyCode::Char(':'));
    type_str(&mut input, "quit");
    assert_eq!(press(&mut input, KeyCode::Esc), KeyResult::Handled);
    assert!(!input.is_active());
  }
}
