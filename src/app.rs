use crate::event::{Event, EventHandler};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{ConfreresView, DashboardView, PersonnelView};
use crate::ui::{self, CommandInput, KeyResult};
use color_eyre::Result;
use crossterm::event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use formation_portal::portal::PortalQueries;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::info;

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` command input with autocomplete
  command: CommandInput,

  /// Portal data bound to the session cache
  queries: PortalQueries,

  title: String,

  /// Last status message shown in the footer
  notice: Option<String>,

  should_quit: bool,
}

impl App {
  pub fn new(queries: PortalQueries, title: String) -> Self {
    let root: Box<dyn View> = Box::new(DashboardView::new(&queries));
    Self {
      view_stack: vec![root],
      command: CommandInput::new(),
      queries,
      title,
      notice: None,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableFocusChange)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.event_loop(&mut terminal).await;

    // Restore the terminal even if the loop failed
    stdout().execute(DisableFocusChange)?;
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
  ) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(250));

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Focus => self.queries.layer().focus(),
      Event::Tick => {
        // Views below the top keep their queries mounted, poll them too
        for view in self.view_stack.iter_mut() {
          view.tick();
        }
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    match self.command.handle_key(key) {
      KeyResult::Handled => return,
      KeyResult::Event(cmd) => {
        self.execute_command(&cmd);
        return;
      }
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('f') => {
        self.queries.layer().focus();
        self.notice = Some("Revalidating stale data".to_string());
      }
      KeyCode::Char('o') => self.toggle_online(),
      _ => self.dispatch_to_view(key),
    }
  }

  fn dispatch_to_view(&mut self, key: KeyEvent) {
    let Some(view) = self.view_stack.last_mut() else {
      return;
    };

    match view.handle_key(key) {
      ViewAction::None => {}
      ViewAction::Push(next) => self.view_stack.push(next),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn toggle_online(&mut self) {
    let layer = self.queries.layer();
    let online = !layer.is_online();
    layer.set_online(online);
    self.notice = Some(if online {
      "Back online, revalidating".to_string()
    } else {
      "Offline: background refresh paused".to_string()
    });
  }

  fn set_root(&mut self, root: Box<dyn View>) {
    self.view_stack.clear();
    self.view_stack.push(root);
  }

  fn execute_command(&mut self, cmd: &str) {
    match cmd {
      "dashboard" => self.set_root(Box::new(DashboardView::new(&self.queries))),
      "personnel" => self.set_root(Box::new(PersonnelView::new(&self.queries))),
      "confreres" => self.set_root(Box::new(ConfreresView::new(&self.queries))),
      "signout" => {
        self.queries.layer().sign_out();
        // Remount so the root starts from an empty cache
        self.set_root(Box::new(DashboardView::new(&self.queries)));
        info!("signed out");
        self.notice = Some("Signed out, cached data cleared".to_string());
      }
      "quit" => self.should_quit = true,
      "" => {}
      other => self.notice = Some(format!("Unknown command: {}", other)),
    }
  }

  // Accessors for UI rendering
  pub fn current_view(&self) -> Option<&dyn View> {
    self.view_stack.last().map(|v| v.as_ref())
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn command(&self) -> &CommandInput {
    &self.command
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn host(&self) -> &str {
    self.queries.client().host()
  }

  pub fn is_online(&self) -> bool {
    self.queries.layer().is_online()
  }

  pub fn notice(&self) -> Option<&str> {
    self.notice.as_deref()
  }

  pub fn view_breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use formation_portal::cache::CacheLayer;
  use formation_portal::portal::PortalClient;
  use formation_portal::query::QueryOptions;

  fn app() -> App {
    // Nothing is fetched: queries never revalidate on their own
    let client =
      PortalClient::with_credentials("http://127.0.0.1:9", "public", "anon-key", None).unwrap();
    let options = QueryOptions::default()
      .with_revalidate_on_mount(false)
      .with_revalidate_on_focus(false)
      .with_revalidate_on_reconnect(false)
      .with_refresh_interval(Duration::ZERO);
    let queries = PortalQueries::new(client, CacheLayer::in_memory(), options);
    App::new(queries, "formation-portal".to_string())
  }

  fn press(app: &mut App, code: KeyCode) {
    app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
  }

  fn run_command(app: &mut App, cmd: &str) {
    press(app, KeyCode::Char(':'));
    for c in cmd.chars() {
      press(app, KeyCode::Char(c));
    }
    press(app, KeyCode::Enter);
  }

  #[tokio::test]
  async fn test_navigation_stack() {
    let mut app = app();
    assert_eq!(app.view_breadcrumb(), vec!["Dashboard"]);

    press(&mut app, KeyCode::Char('p'));
    assert_eq!(app.view_breadcrumb(), vec!["Dashboard", "Personnel"]);

    press(&mut app, KeyCode::Char('q'));
    assert_eq!(app.view_breadcrumb(), vec!["Dashboard"]);
    assert!(!app.should_quit);

    press(&mut app, KeyCode::Char('q'));
    assert!(app.should_quit);
  }

  #[tokio::test]
  async fn test_command_replaces_root() {
    let mut app = app();
    press(&mut app, KeyCode::Char('p'));

    run_command(&mut app, "confreres");
    assert_eq!(app.view_breadcrumb(), vec!["Confreres"]);

    run_command(&mut app, "bogus");
    assert_eq!(app.notice(), Some("Unknown command: bogus"));
  }

  #[tokio::test]
  async fn test_toggle_online() {
    let mut app = app();
    press(&mut app, KeyCode::Char('o'));
    assert!(!app.is_online());
    press(&mut app, KeyCode::Char('o'));
    assert!(app.is_online());
  }

  #[tokio::test]
  async fn test_signout_clears_cache() {
    let mut app = app();
    let layer = app.queries.layer().clone();
    layer.mutate("pending-approvals", serde_json::json!(3));

    run_command(&mut app, "signout");

    assert!(layer.get("pending-approvals").is_none());
    assert_eq!(app.view_breadcrumb(), vec!["Dashboard"]);
  }
}
