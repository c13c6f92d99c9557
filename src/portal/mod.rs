mod api_types;
pub mod client;
pub mod keys;
pub mod queries;
pub mod types;

pub use client::PortalClient;
pub use keys::PortalQueryKey;
pub use queries::PortalQueries;
pub use types::{Confrere, FormationMember};
