//! Cache keys for portal queries.

/// Query key types for portal API calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortalQueryKey {
  /// Formators and directors
  FormationPersonnel,
  /// Confreres in formation, optionally restricted to one stage
  ConfreresInFormation { stage: Option<String> },
  /// Number of accounts waiting for approval
  PendingApprovals,
}

impl PortalQueryKey {
  /// Stable key used in the cache and its persisted snapshot.
  pub fn cache_key(&self) -> String {
    match self {
      Self::FormationPersonnel => "formation-personnel".to_string(),
      Self::ConfreresInFormation { stage: None } => "confreres-in-formation".to_string(),
      Self::ConfreresInFormation { stage: Some(stage) } => {
        format!("confreres-in-formation:{}", normalize_stage(stage))
      }
      Self::PendingApprovals => "pending-approvals".to_string(),
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::FormationPersonnel => "formation personnel".to_string(),
      Self::ConfreresInFormation { stage } => {
        if let Some(s) = stage {
          format!("confreres in formation ({})", s)
        } else {
          "confreres in formation".to_string()
        }
      }
      Self::PendingApprovals => "pending approvals".to_string(),
    }
  }
}

/// Normalize a stage name for consistent keys.
/// Trims whitespace and lowercases for case-insensitive matching.
fn normalize_stage(stage: &str) -> String {
  stage.trim().to_lowercase()
}
