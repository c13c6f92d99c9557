//! Per-key query status and its transitions.

/// Lifecycle status of a cached key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
  /// Nothing cached and nothing requested
  #[default]
  Empty,
  /// First fetch in progress, no value to show yet
  Loading,
  /// A value is cached and no request is outstanding
  Ready,
  /// A value is cached and a background request is outstanding
  Revalidating,
  /// The last request failed (a stale value may still be cached)
  Errored,
}

/// Events driving [`QueryStatus`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEvent {
  FetchStart,
  FetchSuccess,
  FetchFailure,
  /// The consumer regained foreground attention
  Focus,
  /// Network connectivity came back
  Reconnect,
}

impl QueryStatus {
  /// Status of a key that has no request outstanding.
  pub fn settled(has_value: bool, has_error: bool) -> Self {
    if has_error {
      QueryStatus::Errored
    } else if has_value {
      QueryStatus::Ready
    } else {
      QueryStatus::Empty
    }
  }

  /// Apply an event. `has_value` tells whether a value is cached before the event.
  ///
  /// Focus and reconnect never change the status on their own; they only ask
  /// the layer to revalidate, which emits `FetchStart` if a request starts.
  pub fn on(self, event: QueryEvent, has_value: bool) -> Self {
    match event {
      QueryEvent::FetchStart => {
        if has_value {
          QueryStatus::Revalidating
        } else {
          QueryStatus::Loading
        }
      }
      QueryEvent::FetchSuccess => QueryStatus::Ready,
      QueryEvent::FetchFailure => QueryStatus::Errored,
      QueryEvent::Focus | QueryEvent::Reconnect => self,
    }
  }

  /// No value yet and the first request is outstanding.
  pub fn is_loading(self) -> bool {
    self == QueryStatus::Loading
  }

  /// Any request is outstanding, with or without a cached value.
  pub fn is_validating(self) -> bool {
    matches!(self, QueryStatus::Loading | QueryStatus::Revalidating)
  }
}
