use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{placeholder, query_block, ProfileDetailView};
use crossterm::event::{KeyCode, KeyEvent};
use formation_portal::portal::{Confrere, PortalQueries};
use formation_portal::query::Query;
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, ListState, Paragraph};

/// Stage filters cycled with `s`; `None` shows every stage
const STAGES: &[Option<&str>] = &[
  None,
  Some("postulancy"),
  Some("novitiate"),
  Some("scholasticate"),
];

/// Confreres in formation, filterable by stage
pub struct ConfreresView {
  queries: PortalQueries,
  stage_idx: usize,
  query: Query<Vec<Confrere>>,
  list_state: ListState,
}

impl ConfreresView {
  pub fn new(queries: &PortalQueries) -> Self {
    Self {
      query: queries.confreres_in_formation(None),
      queries: queries.clone(),
      stage_idx: 0,
      list_state: ListState::default(),
    }
  }

  fn stage(&self) -> Option<&'static str> {
    STAGES[self.stage_idx]
  }

  /// Switch to the next stage filter. Each stage is its own cache key, so
  /// switching back shows the earlier result immediately.
  fn cycle_stage(&mut self) {
    self.stage_idx = (self.stage_idx + 1) % STAGES.len();
    // Replacing the query unmounts the previous key
    self.query = self.queries.confreres_in_formation(self.stage());
    self.list_state = ListState::default();
  }

  fn confreres(&self) -> &[Confrere] {
    self.query.data().map(Vec::as_slice).unwrap_or(&[])
  }

  fn title(&self) -> String {
    match self.stage() {
      Some(stage) => format!("Confreres in formation [{}]", stage),
      None => "Confreres in formation".to_string(),
    }
  }
}

impl View for ConfreresView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('s') => self.cycle_stage(),
      KeyCode::Enter => {
        let selected = self
          .list_state
          .selected()
          .and_then(|i| self.confreres().get(i));
        if let Some(confrere) = selected {
          return ViewAction::Push(Box::new(ProfileDetailView::confrere(confrere)));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.confreres().len();
    ensure_valid_selection(&mut self.list_state, len);

    let title = self.title();
    let view = self.query.view();
    let block = query_block(&title, view.data.map(Vec::len), &view, self.query.fetched_at());

    if let Some(text) = placeholder(&view, "No confreres in this stage.") {
      let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .confreres()
      .iter()
      .map(|c| {
        ListItem::new(Line::from(vec![
          Span::raw(format!("{:<32}", truncate(&c.full_name, 30))),
          Span::styled(format!("{:<15}", c.stage), Style::default().fg(Color::Yellow)),
          Span::styled(
            c.entered_on.clone().unwrap_or_default(),
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
    match self.stage() {
      Some(stage) => format!("Confreres [{}]", stage),
      None => "Confreres".to_string(),
    }
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("r", "refresh").with_priority(20),
      ShortcutInfo::new("s", "stage").with_priority(25),
      ShortcutInfo::new("enter", "details").with_priority(30),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
