use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::application::ports::{BrokerError, Task, TaskBroker, TaskKind, TaskSubscription};

struct Route {
    sender: mpsc::Sender<Task>,
    subscription: TaskSubscription,
}

/// Tasks are lost on restart; the reconciler re-dispatches anything left
/// unclaimed in the job store.
pub struct ChannelBroker {
    routes: HashMap<TaskKind, Route>,
    closed: AtomicBool,
}

impl ChannelBroker {
    pub fn new(capacity: usize) -> Self {
        Self::with_kinds(&TaskKind::ALL, capacity)
    }

    pub fn with_kinds(kinds: &[TaskKind], capacity: usize) -> Self {
        let routes = kinds
            .iter()
            .map(|&kind| {
                let (sender, receiver) = mpsc::channel(capacity.max(1));
                (
                    kind,
                    Route {
                        sender,
                        subscription: TaskSubscription::new(kind, receiver),
                    },
                )
            })
            .collect();

        Self {
            routes,
            closed: AtomicBool::new(false),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        tracing::info!("Task broker closed");
    }
}

#[async_trait]
impl TaskBroker for ChannelBroker {
    async fn dispatch(&self, task: Task) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("broker is closed".to_string()));
        }

        let route = self
            .routes
            .get(&task.kind)
            .ok_or(BrokerError::NoRoute(task.kind))?;

        match route.sender.try_send(task) {
            Ok(()) => {
                tracing::debug!(job_id = %task.job_id, kind = %task.kind, "Task dispatched");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(BrokerError::QueueFull(task.kind)),
            Err(TrySendError::Closed(_)) => Err(BrokerError::Unavailable(format!(
                "{} queue has no consumers",
                task.kind
            ))),
        }
    }

    fn subscribe(&self, kind: TaskKind) -> Result<TaskSubscription, BrokerError> {
        self.routes
            .get(&kind)
            .map(|route| route.subscription.clone())
            .ok_or(BrokerError::NoRoute(kind))
    }
}
