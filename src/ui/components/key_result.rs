/// How a component dealt with a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Key was consumed, nothing for the parent to do
  Handled,
  /// Key was consumed and produced an event for the parent
  Event(T),
  /// Key was not consumed, parent should try next handler
  NotHandled,
}
