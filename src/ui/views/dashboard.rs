use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{placeholder, query_block, ConfreresView, PersonnelView};
use crossterm::event::{KeyCode, KeyEvent};
use formation_portal::portal::{Confrere, FormationMember, PortalQueries};
use formation_portal::query::Query;
use formation_portal::view::ViewState;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use std::collections::BTreeMap;

/// Overview cards: personnel, confreres by stage and pending approvals
pub struct DashboardView {
  queries: PortalQueries,
  personnel: Query<Vec<FormationMember>>,
  confreres: Query<Vec<Confrere>>,
  pending: Query<u64>,
}

impl DashboardView {
  pub fn new(queries: &PortalQueries) -> Self {
    Self {
      personnel: queries.formation_personnel(),
      confreres: queries.confreres_in_formation(None),
      pending: queries.pending_approvals(),
      queries: queries.clone(),
    }
  }

  fn refetch_all(&mut self) {
    self.personnel.refetch();
    self.confreres.refetch();
    self.pending.refetch();
  }
}

/// Render a card body, or the placeholder when there is nothing to show.
fn render_card<T>(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  view: &ViewState<'_, T>,
  fetched_at: Option<chrono::DateTime<chrono::Utc>>,
  empty_text: &'static str,
  body: impl FnOnce(&T) -> Vec<Line<'static>>,
) {
  let block = query_block(title, None, view, fetched_at);
  let paragraph = match (placeholder(view, empty_text), view.data) {
    (None, Some(data)) => Paragraph::new(body(data)),
    (text, _) => Paragraph::new(text.unwrap_or_default()).style(Style::default().fg(Color::DarkGray)),
  };
  frame.render_widget(paragraph.block(block), area);
}

fn count_line(label: &str, count: usize, color: Color) -> Line<'static> {
  Line::from(vec![
    Span::styled(format!("{:>5} ", count), Style::default().fg(color).bold()),
    Span::raw(label.to_string()),
  ])
}

fn personnel_lines(members: &[FormationMember]) -> Vec<Line<'static>> {
  let directors = members.iter().filter(|m| m.role == "director").count();
  vec![
    count_line("members", members.len(), Color::White),
    count_line("directors", directors, Color::Magenta),
    count_line("formators", members.len() - directors, Color::Green),
  ]
}

fn confrere_lines(confreres: &[Confrere]) -> Vec<Line<'static>> {
  let mut by_stage: BTreeMap<&str, usize> = BTreeMap::new();
  for c in confreres {
    let stage = if c.stage.is_empty() { "unknown" } else { c.stage.as_str() };
    *by_stage.entry(stage).or_default() += 1;
  }

  let mut lines = vec![count_line("in formation", confreres.len(), Color::White)];
  lines.extend(
    by_stage
      .into_iter()
      .map(|(stage, n)| count_line(stage, n, Color::Yellow)),
  );
  lines
}

fn pending_lines(count: &u64) -> Vec<Line<'static>> {
  let color = if *count > 0 { Color::Red } else { Color::Green };
  vec![count_line("awaiting approval", *count as usize, color)]
}

impl View for DashboardView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => self.refetch_all(),
      KeyCode::Char('p') => return ViewAction::Push(Box::new(PersonnelView::new(&self.queries))),
      KeyCode::Char('c') => return ViewAction::Push(Box::new(ConfreresView::new(&self.queries))),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let columns = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
      ])
      .split(area);

    render_card(
      frame,
      columns[0],
      "Personnel",
      &self.personnel.view(),
      self.personnel.fetched_at(),
      "No formation personnel.",
      |members| personnel_lines(members),
    );
    render_card(
      frame,
      columns[1],
      "Confreres",
      &self.confreres.view(),
      self.confreres.fetched_at(),
      "Nobody in formation.",
      |confreres| confrere_lines(confreres),
    );
    render_card(
      frame,
      columns[2],
      "Approvals",
      &self.pending.view(),
      self.pending.fetched_at(),
      "",
      pending_lines,
    );
  }

  fn breadcrumb_label(&self) -> String {
    "Dashboard".to_string()
  }

  fn tick(&mut self) {
    self.personnel.poll();
    self.confreres.poll();
    self.pending.poll();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("r", "refresh").with_priority(20),
      ShortcutInfo::new("p", "personnel").with_priority(30),
      ShortcutInfo::new("c", "confreres").with_priority(31),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn confrere(stage: &str) -> Confrere {
    Confrere {
      id: stage.to_string(),
      full_name: "Test".to_string(),
      stage: stage.to_string(),
      community: None,
      entered_on: None,
    }
  }

  #[test]
  fn test_confreres_grouped_by_stage() {
    let confreres = vec![confrere("novitiate"), confrere("novitiate"), confrere("")];
    let lines = confrere_lines(&confreres);

    // Total, then stages in name order
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1].spans[1].content, "novitiate");
    assert_eq!(lines[1].spans[0].content.trim(), "2");
    assert_eq!(lines[2].spans[1].content, "unknown");
  }

  #[test]
  fn test_personnel_counts() {
    let member = |role: &str| FormationMember {
      id: role.to_string(),
      full_name: "Test".to_string(),
      role: role.to_string(),
      email: None,
      community: None,
    };
    let lines = personnel_lines(&[member("director"), member("formator"), member("formator")]);
    assert_eq!(lines[1].spans[0].content.trim(), "1");
    assert_eq!(lines[2].spans[0].content.trim(), "2");
  }
}
