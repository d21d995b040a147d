//! meshroute-routing — route tables, NodeInfo store and the Manager that
//! ties them together for the flooding component and the data plane.

pub mod agent;
pub mod cidr;
pub mod domain;
pub mod events;
pub mod forward;
pub mod keyed;
pub mod manager;
pub mod node_info;
pub mod record;
mod store;
pub mod sweeper;

pub use agent::{AgentRoute, AgentTable};
pub use cidr::{Route, RouteTable};
pub use domain::{DomainRoute, DomainTable};
pub use events::{EventBus, RouteAction, RouteEvent, RouteKind};
pub use forward::{ForwardRoute, ForwardTable};
pub use keyed::{KeyedRoute, KeyedTable};
pub use manager::{Advertisement, Manager, ManagerStats, SweepReport};
pub use node_info::{NodeInfoRecord, NodeInfoStore};
pub use record::{Admission, Rejection, RouteMeta, Routed};
pub use sweeper::{refresh_loop, sweep_loop};
