//! Serde-deserializable types matching backend REST rows.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::Deserialize;

use super::types::{Confrere, FormationMember};

// ============================================================================
// profiles table
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiProfile {
  pub id: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
  pub email: Option<String>,
  pub role: Option<String>,
  pub stage: Option<String>,
  pub community: Option<ApiCommunity>,
  pub created_at: Option<String>,
}

/// Embedded `communities(name)` relation
#[derive(Debug, Deserialize)]
pub struct ApiCommunity {
  pub name: String,
}

impl ApiProfile {
  fn full_name(&self) -> String {
    let name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
    let name = name.trim();
    if name.is_empty() {
      self.email.clone().unwrap_or_else(|| self.id.clone())
    } else {
      name.to_string()
    }
  }

  pub fn into_member(self) -> FormationMember {
    FormationMember {
      full_name: self.full_name(),
      role: self.role.clone().unwrap_or_else(|| "member".to_string()),
      community: self.community.map(|c| c.name),
      id: self.id,
      email: self.email,
    }
  }

  pub fn into_confrere(self) -> Confrere {
    Confrere {
      full_name: self.full_name(),
      stage: self.stage.clone().unwrap_or_default(),
      community: self.community.map(|c| c.name),
      entered_on: self
        .created_at
        .as_deref()
        .map(|ts| ts.split('T').next().unwrap_or(ts).to_string()),
      id: self.id,
    }
  }
}
