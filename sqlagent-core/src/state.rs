use serde::{de::DeserializeOwned, Serialize};

/// State record threaded through a graph run.
///
/// Nodes never mutate the state in place. They return an `Update` and the
/// driver folds it into the current value with [`StateSchema::apply`].
pub trait StateSchema:
    Serialize + DeserializeOwned + Clone + Default + Send + Sync + std::fmt::Debug + 'static
{
    type Update: Serialize + DeserializeOwned + Clone + Default + Send + Sync + std::fmt::Debug + 'static;

    fn apply(current: &Self, update: Self::Update) -> Self;

    /// Human-readable representation for tracing/debugging.
    fn trace_repr(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "<unserializable>".to_string())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;
