use std::sync::Arc;

use crate::error::EndpointError;
use crate::group::{EndpointGroup, EndpointListener, ReadySignal};
use crate::Endpoint;

/// A group whose endpoints never change after construction.
pub struct StaticEndpointGroup {
    endpoints: Arc<Vec<Endpoint>>,
    ready: Arc<ReadySignal>,
}

impl StaticEndpointGroup {
    pub fn new(mut endpoints: Vec<Endpoint>) -> Self {
        endpoints.sort();
        let ready = Arc::new(ReadySignal::default());
        if !endpoints.is_empty() {
            ready.mark_ready();
        }
        Self {
            endpoints: Arc::new(endpoints),
            ready,
        }
    }

    /// Parses a comma-separated list of `host[:port[:weight]]` entries.
    pub fn parse(list: &str) -> Result<Self, EndpointError> {
        let endpoints = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Endpoint::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(endpoints))
    }
}

impl EndpointGroup for StaticEndpointGroup {
    fn snapshot(&self) -> Arc<Vec<Endpoint>> {
        Arc::clone(&self.endpoints)
    }

    fn add_listener(&self, _listener: Arc<dyn EndpointListener>) {
        // A static group never mutates, so there is nothing to notify later.
    }

    fn ready(&self) -> Arc<ReadySignal> {
        Arc::clone(&self.ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_sorts_csv_list() {
        let group = StaticEndpointGroup::parse("b:80, a:80:500").unwrap();
        let snapshot = group.snapshot();
        assert_eq!(snapshot[0].authority(), "a:80");
        assert_eq!(snapshot[1].authority(), "b:80");
        assert!(group.ready().is_ready());
    }
}
