use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{placeholder, query_block, ProfileDetailView};
use crossterm::event::{KeyCode, KeyEvent};
use formation_portal::portal::{FormationMember, PortalQueries};
use formation_portal::query::Query;
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, ListState, Paragraph};

/// Formators and directors
pub struct PersonnelView {
  query: Query<Vec<FormationMember>>,
  list_state: ListState,
}

impl PersonnelView {
  pub fn new(queries: &PortalQueries) -> Self {
    Self {
      query: queries.formation_personnel(),
      list_state: ListState::default(),
    }
  }

  fn members(&self) -> &[FormationMember] {
    self.query.data().map(Vec::as_slice).unwrap_or(&[])
  }

  fn selected(&self) -> Option<&FormationMember> {
    self.list_state.selected().and_then(|i| self.members().get(i))
  }
}

fn role_color(role: &str) -> Color {
  match role {
    "director" => Color::Magenta,
    "formator" => Color::Green,
    _ => Color::White,
  }
}

impl View for PersonnelView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Enter => {
        if let Some(member) = self.selected() {
          return ViewAction::Push(Box::new(ProfileDetailView::member(member)));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.members().len();
    ensure_valid_selection(&mut self.list_state, len);

    let view = self.query.view();
    let block = query_block(
      "Formation personnel",
      view.data.map(Vec::len),
      &view,
      self.query.fetched_at(),
    );

    if let Some(text) = placeholder(&view, "No formators or directors found.") {
      let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .members()
      .iter()
      .map(|member| {
        ListItem::new(Line::from(vec![
          Span::raw(format!("{:<32}", truncate(&member.full_name, 30))),
          Span::styled(
            format!("{:<10}", member.role),
            Style::default().fg(role_color(&member.role)),
          ),
          Span::styled(
            member.community.clone().unwrap_or_default(),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }

  fn breadcrumb_label(&self) -> String {
    "Personnel".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("r", "refresh").with_priority(20),
      ShortcutInfo::new("enter", "details").with_priority(30),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
