use crate::{AgentState, Node, PendingApproval};

/// Progress hooks, all optional. Called on the driver's task, in order.
pub trait Observer: Send + Sync {
    fn on_node_enter(&self, _thread_id: &str, _node: Node) {}
    fn on_node_exit(&self, _thread_id: &str, _node: Node, _state: &AgentState) {}
    fn on_error(&self, _thread_id: &str, _node: Node, _error: &str) {}
    fn on_interrupt(&self, _pending: &PendingApproval) {}
    fn on_checkpoint_saved(&self, _thread_id: &str, _node: Node) {}
}
