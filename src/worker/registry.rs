//! Action registry. Maps action names to their handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::ActionError;
use crate::worker::Worker;

/// A unit of work a participant can perform, dispatched by name.
#[async_trait]
pub trait Action: Send + Sync {
    /// Run the action against the worker's workitem.
    async fn run(&self, worker: &mut Worker) -> Result<(), ActionError>;
}

/// Adapter turning a closure into an [`Action`].
///
/// The closure returns a boxed future borrowing the worker:
///
/// ```ignore
/// FnAction::new(|worker| Box::pin(async move {
///     worker.write_output("hello\n", false).await;
///     Ok(())
/// }))
/// ```
pub struct FnAction<F> {
    f: F,
}

impl<F> FnAction<F>
where
    F: for<'a> Fn(&'a mut Worker) -> BoxFuture<'a, Result<(), ActionError>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: for<'a> Fn(&'a mut Worker) -> BoxFuture<'a, Result<(), ActionError>> + Send + Sync,
{
    async fn run(&self, worker: &mut Worker) -> Result<(), ActionError> {
        (self.f)(worker).await
    }
}

/// Registry of the actions a participant supports.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. A later registration under the same name wins.
    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn Action>) {
        let name = name.into();
        if self.actions.insert(name.clone(), action).is_some() {
            tracing::debug!(action = %name, "Replaced registered action");
        } else {
            tracing::debug!(action = %name, "Registered action");
        }
    }

    /// Register a closure as an action.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: for<'a> Fn(&'a mut Worker) -> BoxFuture<'a, Result<(), ActionError>>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, Arc::new(FnAction::new(f)));
    }

    /// Look up an action by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    /// Look up an action, failing with [`ActionError::UnknownAction`].
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Action>, ActionError> {
        self.get(name)
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// All registered action names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.actions.len()
    }
}
