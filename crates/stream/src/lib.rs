//! Single-subscriber reactive streams with explicit demand accounting.
//!
//! See the "Reactive stream" component of the resilience core design: a
//! [`StreamMessage`] is a publisher-writer over a bounded in-memory queue,
//! with exact-once element delivery, cancellation, and abort.

mod demand;
mod error;
mod fixed;
mod message;
mod publisher_adapter;

pub use error::StreamError;
pub use fixed::{EmptyStream, FixedStream};
pub use message::StreamMessage;
pub use publisher_adapter::{flatten_error, PublisherAdapter};
pub use subscriber::{FnSubscriber, Subscriber, Subscription, SubscriptionOptions};

mod subscriber;
