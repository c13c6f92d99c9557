use serde::{Deserialize, Serialize};

/// Member of the formation team (formators, directors)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationMember {
  pub id: String,
  pub full_name: String,
  pub role: String,
  pub email: Option<String>,
  pub community: Option<String>,
}

/// Confrere currently in formation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confrere {
  pub id: String,
  pub full_name: String,
  pub stage: String, // "postulancy", "novitiate", ...
  pub community: Option<String>,
  pub entered_on: Option<String>,
}
