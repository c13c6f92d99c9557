use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use formation_portal::portal::{Confrere, FormationMember};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// Read-only details of one person, taken from the list it was opened from
pub struct ProfileDetailView {
  name: String,
  fields: Vec<(&'static str, String)>,
}

impl ProfileDetailView {
  pub fn member(member: &FormationMember) -> Self {
    Self {
      name: member.full_name.clone(),
      fields: vec![
        ("Role", member.role.clone()),
        ("Email", member.email.clone().unwrap_or_else(|| "-".to_string())),
        (
          "Community",
          member.community.clone().unwrap_or_else(|| "-".to_string()),
        ),
      ],
    }
  }

  pub fn confrere(confrere: &Confrere) -> Self {
    Self {
      name: confrere.full_name.clone(),
      fields: vec![
        ("Stage", confrere.stage.clone()),
        (
          "Community",
          confrere.community.clone().unwrap_or_else(|| "-".to_string()),
        ),
        (
          "Entered",
          confrere.entered_on.clone().unwrap_or_else(|| "-".to_string()),
        ),
      ],
    }
  }
}

impl View for ProfileDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('q') | KeyCode::Esc => ViewAction::Pop,
      _ => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(format!(" {} ", self.name))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let lines: Vec<Line> = self
      .fields
      .iter()
      .map(|(label, value)| {
        Line::from(vec![
          Span::styled(format!("{:<12}", label), Style::default().fg(Color::Cyan)),
          Span::raw(value.as_str()),
        ])
      })
      .collect();

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
  }

  fn breadcrumb_label(&self) -> String {
    self.name.clone()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
