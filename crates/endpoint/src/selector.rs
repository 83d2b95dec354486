use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::group::EndpointGroup;
use crate::Endpoint;

/// Picks one endpoint from a group's current snapshot (§4.5 "Selection strategies").
pub trait Selector: Send + Sync {
    fn select(&self) -> Option<Endpoint>;
}

/// Plain round-robin: an atomic counter modulo the snapshot length.
pub struct RoundRobinSelector {
    group: Arc<dyn EndpointGroup>,
    counter: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new(group: Arc<dyn EndpointGroup>) -> Self {
        Self {
            group,
            counter: AtomicUsize::new(0),
        }
    }
}

impl Selector for RoundRobinSelector {
    fn select(&self) -> Option<Endpoint> {
        let endpoints = self.group.snapshot();
        if endpoints.is_empty() {
            return None;
        }
        let i = self.counter.fetch_add(1, Ordering::Relaxed) % endpoints.len();
        Some(endpoints[i].clone())
    }
}

struct Schedule {
    endpoints: Arc<Vec<Endpoint>>,
    /// `schedule[i]` is an index into `endpoints`; built so endpoint `k`
    /// appears `weight(k)` times (§4.5 "Weighted round-robin").
    order: Vec<usize>,
}

fn build_schedule(endpoints: &Arc<Vec<Endpoint>>) -> Schedule {
    let mut order = Vec::new();
    for (i, endpoint) in endpoints.iter().enumerate() {
        for _ in 0..endpoint.weight().max(1) {
            order.push(i);
        }
    }
    Schedule {
        endpoints: Arc::clone(endpoints),
        order,
    }
}

/// Weighted round-robin over a pre-computed schedule, rebuilt whenever the
/// group's snapshot changes.
pub struct WeightedRoundRobinSelector {
    group: Arc<dyn EndpointGroup>,
    counter: AtomicUsize,
    schedule: ArcSwap<Schedule>,
}

impl WeightedRoundRobinSelector {
    pub fn new(group: Arc<dyn EndpointGroup>) -> Self {
        let initial = group.snapshot();
        let schedule = build_schedule(&initial);
        Self {
            group,
            counter: AtomicUsize::new(0),
            schedule: ArcSwap::from_pointee(schedule),
        }
    }
}

impl Selector for WeightedRoundRobinSelector {
    fn select(&self) -> Option<Endpoint> {
        let current = self.group.snapshot();
        let mut schedule = self.schedule.load_full();
        if !Arc::ptr_eq(&schedule.endpoints, &current) {
            let rebuilt = Arc::new(build_schedule(&current));
            self.schedule.store(Arc::clone(&rebuilt));
            schedule = rebuilt;
        }

        if schedule.order.is_empty() {
            return None;
        }
        let i = self.counter.fetch_add(1, Ordering::Relaxed) % schedule.order.len();
        Some(schedule.endpoints[schedule.order[i]].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::DynamicEndpointGroup;

    #[test]
    fn round_robin_cycles_and_adapts_to_removal() {
        let group = Arc::new(DynamicEndpointGroup::new());
        group.add(Endpoint::new("a"));
        group.add(Endpoint::new("b"));
        group.add(Endpoint::new("c"));
        let selector = RoundRobinSelector::new(group.clone());

        let picks: Vec<_> = (0..6).map(|_| selector.select().unwrap().authority().to_owned()).collect();
        assert_eq!(picks, vec!["a", "b", "c", "a", "b", "c"]);

        group.remove(&Endpoint::new("b"));
        let picks: Vec<_> = (0..4).map(|_| selector.select().unwrap().authority().to_owned()).collect();
        assert_eq!(picks, vec!["a", "c", "a", "c"]);
    }

    #[test]
    fn weighted_round_robin_respects_weight_counts() {
        let group = Arc::new(DynamicEndpointGroup::new());
        group.add(Endpoint::new("a").with_weight(1));
        group.add(Endpoint::new("b").with_weight(2));
        group.add(Endpoint::new("c").with_weight(3));
        let selector = WeightedRoundRobinSelector::new(group);

        let mut counts = std::collections::HashMap::new();
        for _ in 0..6 {
            let e = selector.select().unwrap();
            *counts.entry(e.authority().to_owned()).or_insert(0) += 1;
        }
        assert_eq!(counts.get("a"), Some(&1));
        assert_eq!(counts.get("b"), Some(&2));
        assert_eq!(counts.get("c"), Some(&3));
    }
}
