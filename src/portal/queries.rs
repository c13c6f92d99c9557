//! Portal data as revalidating queries.
//!
//! Wraps [`PortalClient`] calls with the shared [`CacheLayer`]. Every screen
//! that mounts the same key shares its cached value and in-flight request.

use std::time::Duration;

use crate::cache::CacheLayer;
use crate::query::{Query, QueryOptions};

use super::client::PortalClient;
use super::keys::PortalQueryKey;
use super::types::{Confrere, FormationMember};

const PENDING_REFRESH: Duration = Duration::from_secs(60);

/// Portal client bound to a cache layer.
#[derive(Clone)]
pub struct PortalQueries {
  client: PortalClient,
  layer: CacheLayer,
  options: QueryOptions,
}

impl PortalQueries {
  pub fn new(client: PortalClient, layer: CacheLayer, options: QueryOptions) -> Self {
    Self {
      client,
      layer,
      options,
    }
  }

  pub fn layer(&self) -> &CacheLayer {
    &self.layer
  }

  pub fn client(&self) -> &PortalClient {
    &self.client
  }

  pub fn formation_personnel(&self) -> Query<Vec<FormationMember>> {
    let client = self.client.clone();
    self.layer.query(
      PortalQueryKey::FormationPersonnel.cache_key(),
      move || {
        let client = client.clone();
        async move { client.formation_personnel().await }
      },
      self.options.clone(),
    )
  }

  pub fn confreres_in_formation(&self, stage: Option<&str>) -> Query<Vec<Confrere>> {
    let key = PortalQueryKey::ConfreresInFormation {
      stage: stage.map(String::from),
    };
    let client = self.client.clone();
    let stage = stage.map(String::from);
    self.layer.query(
      key.cache_key(),
      move || {
        let client = client.clone();
        let stage = stage.clone();
        async move { client.confreres_in_formation(stage.as_deref()).await }
      },
      self.options.clone(),
    )
  }

  /// Count of accounts waiting for approval. Refreshed more often than lists.
  pub fn pending_approvals(&self) -> Query<u64> {
    let client = self.client.clone();
    let mut options = self.options.clone();
    if !options.refresh_interval.is_zero() {
      options.refresh_interval = options.refresh_interval.min(PENDING_REFRESH);
    }
    self.layer.query(
      PortalQueryKey::PendingApprovals.cache_key(),
      move || {
        let client = client.clone();
        async move { client.pending_approvals().await }
      },
      options,
    )
  }
}
