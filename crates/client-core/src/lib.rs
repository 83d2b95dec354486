//! Composes the resilience and transport primitives (scheduler, streams,
//! circuit breaker, endpoint groups, lifecycle, limiters, request context,
//! and the HTTP/2 request publisher) into one client-facing surface.

mod error;
mod facade;

pub use error::CoreError;
pub use facade::OutboundClient;

pub use breaker::{by_authority, by_method, by_method_and_authority, BreakerConfig, BreakerKeyFn, BreakerListener, BreakerRegistry, CircuitBreaker, CircuitState};
pub use endpoint::{
    CheckerContext, CheckerFactory, CompositeEndpointGroup, DynamicEndpointGroup, Endpoint, EndpointGroup, EndpointListener, HealthChecker, HealthCheckedEndpointGroup,
    LongPollingChecker, ReadySignal, RoundRobinSelector, Selector, StaticEndpointGroup, WeightedRoundRobinSelector, DEFAULT_WEIGHT,
};
pub use http_request_publisher::{spawn_publisher, HttpRequestSubscriber, RequestStreamElement};
pub use lifecycle::{Component, LifecycleError, LifecycleListener, LifecycleState, StartStopSupport};
pub use limiter::{AcceptedConnection, ConcurrencyLimiter, ConnectionControl, ConnectionPoolLimiter, InboundTrafficController, ReadControl};
pub use request_context::{AttributeMap, ContextAwareExecutor, RequestContext, RequestContextBuilder, RequestHandle, SessionProtocol, TokioContextAwareExecutor};
pub use scheduler::{AcquiredEntry, EventLoopScheduler};
pub use stream::{StreamError, Subscriber, Subscription};
