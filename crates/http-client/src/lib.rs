//! Drives a caller's request stream onto an HTTP/2 encoder under flow
//! control (§4.3).

mod element;
mod error;
mod publisher;

pub use element::RequestStreamElement;
pub use error::HttpClientError;
pub use publisher::{spawn_publisher, HttpRequestSubscriber};
