//! tenantry-resolver: which partition a request uses, and how a user
//! moves between tenants.
//!
//! Resolution walks request → cache → directory → heuristic → default and
//! reports the tier that answered as a [`Resolution`]. Switching is handled
//! by the [`SwitchCoordinator`]. Cache repopulation and switch recording run
//! on the [`BackgroundQueue`].

pub mod background;
pub mod heuristic;
pub mod resolver;
pub mod services;
pub mod switch;
pub mod tenant_cache;

pub use background::{BackgroundEvent, BackgroundJob, BackgroundQueue, EnqueueError};
pub use heuristic::Derivation;
pub use resolver::{Resolution, TenantResolver};
pub use services::{TenantServices, TenantView, ViewSource};
pub use switch::{SwitchCoordinator, SwitchError, SwitchOutcome, SwitchReport};
pub use tenant_cache::TenantCache;
