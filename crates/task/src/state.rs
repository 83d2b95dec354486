/// The five states of a component's async life-cycle (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Started,
    Stopping,
}
