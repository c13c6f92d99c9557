//! UI-facing projection of a query's state.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::cache::FetchError;
use crate::query::Query;

/// Values that can be "empty" for display purposes.
pub trait Emptiness {
  fn is_empty_value(&self) -> bool;
}

impl<T> Emptiness for Vec<T> {
  fn is_empty_value(&self) -> bool {
    self.is_empty()
  }
}

impl<K, V> Emptiness for HashMap<K, V> {
  fn is_empty_value(&self) -> bool {
    self.is_empty()
  }
}

impl<K, V> Emptiness for BTreeMap<K, V> {
  fn is_empty_value(&self) -> bool {
    self.is_empty()
  }
}

// Counts are scalars: zero pending approvals is a value, not an empty list
macro_rules! never_empty {
  ($($t:ty),*) => {
    $(impl Emptiness for $t {
      fn is_empty_value(&self) -> bool {
        false
      }
    })*
  };
}

never_empty!(u32, u64, usize, i32, i64);

/// What a view binds to: data plus the flags it renders from.
///
/// Holds no state of its own; derive it again on every render.
#[derive(Debug, Clone, Copy)]
pub struct ViewState<'a, T> {
  pub data: Option<&'a T>,
  pub loading: bool,
  pub error: Option<&'a FetchError>,
  /// Loading finished and the collection has no elements
  pub is_empty: bool,
  /// A cached value is shown while a background request runs
  pub is_refreshing: bool,
}

impl<'a, T: Emptiness> ViewState<'a, T> {
  pub fn derive(
    data: Option<&'a T>,
    is_loading: bool,
    is_validating: bool,
    error: Option<&'a FetchError>,
  ) -> Self {
    Self {
      data,
      loading: is_loading,
      error,
      is_empty: !is_loading && data.is_some_and(Emptiness::is_empty_value),
      is_refreshing: is_validating && !is_loading,
    }
  }
}

impl<T> Query<T>
where
  T: Serialize + DeserializeOwned + Emptiness + Send + 'static,
{
  pub fn view(&self) -> ViewState<'_, T> {
    ViewState::derive(
      self.data(),
      self.is_loading(),
      self.is_validating(),
      self.error(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_never_empty_while_loading() {
    let records: Vec<u32> = Vec::new();
    let view = ViewState::derive(Some(&records), true, true, None);
    assert!(!view.is_empty);
    assert!(!view.is_refreshing);
  }

  #[test]
  fn test_empty_after_loading() {
    let records: Vec<u32> = Vec::new();
    let view = ViewState::derive(Some(&records), false, false, None);
    assert!(view.is_empty);
    assert!(!view.loading);
  }

  #[test]
  fn test_no_data_is_not_empty() {
    let view: ViewState<'_, Vec<u32>> = ViewState::derive(None, false, false, None);
    assert!(!view.is_empty);
  }

  #[test]
  fn test_refreshing_shows_cached_value() {
    let records = vec![1, 2, 3, 4, 5];
    let view = ViewState::derive(Some(&records), false, true, None);
    assert!(view.is_refreshing);
    assert_eq!(view.data.map(Vec::len), Some(5));
  }

  #[test]
  fn test_error_does_not_affect_emptiness() {
    let records = vec![1, 2];
    let error = FetchError::transient("timeout");
    let view = ViewState::derive(Some(&records), false, false, Some(&error));
    assert!(!view.is_empty);
    assert!(view.error.is_some());
  }

  #[test]
  fn test_zero_count_is_not_empty() {
    let count = 0u64;
    let view = ViewState::derive(Some(&count), false, false, None);
    assert!(!view.is_empty);
  }
}
