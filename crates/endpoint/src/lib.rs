//! Endpoint groups, selection strategies, and health-checked groups (§4.5, §4.6).

mod composite;
mod endpoint;
mod error;
mod group;
mod health;
mod selector;
mod static_group;

pub use composite::CompositeEndpointGroup;
pub use endpoint::{Endpoint, DEFAULT_WEIGHT};
pub use error::EndpointError;
pub use group::{DynamicEndpointGroup, EndpointGroup, EndpointListener, ReadySignal};
pub use health::{
    is_healthy, Backoff, CheckerContext, CheckerFactory, FixedJitterBackoff, HealthChecker, HealthCheckedEndpointGroup,
    LongPollingChecker,
};
pub use selector::{RoundRobinSelector, Selector, WeightedRoundRobinSelector};
pub use static_group::StaticEndpointGroup;
