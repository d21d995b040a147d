//! meshroute-core — shared types, advertisement payloads, configuration and
//! the sealed-box primitive. All other meshroute crates depend on this one.

pub mod advert;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod identity;
pub mod prefix;

pub use advert::{
    AgentEntry, DomainEntry, ForwardEntry, Metric, NodeInfo, NodeInfoPayload, PathInfo,
    RouteEntry,
};
pub use domain::{DomainError, DomainPattern};
pub use identity::{AgentId, IdentityError};
pub use prefix::{Prefix, PrefixError};
