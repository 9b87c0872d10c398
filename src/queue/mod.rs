pub mod startup;
pub mod task;

use std::collections::VecDeque;
use std::sync::Arc;

use crate::server::AppState;
use crate::task::handler::process_feature;

use task::Task;

/// In-process task delivery: a FIFO of pending tasks plus a wake-up channel
/// for the processor.
pub struct TaskQueue {
    pending: VecDeque<Task>,
    notify: Option<tokio::sync::mpsc::UnboundedSender<()>>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            notify: None,
        }
    }

    pub fn set_notifier(&mut self, tx: tokio::sync::mpsc::UnboundedSender<()>) {
        self.notify = Some(tx);
    }

    /// Enqueue a task. A task already waiting in the queue is not added twice.
    /// Returns whether the task was added.
    pub fn enqueue(&mut self, task: Task) -> bool {
        if self.pending.contains(&task) {
            tracing::debug!(task = %task.description(), "Task already queued");
            return false;
        }

        tracing::info!(task = %task.description(), "Enqueuing task");
        self.pending.push_back(task);

        if let Some(ref tx) = self.notify {
            let _ = tx.send(());
        }
        true
    }

    pub fn take_next(&mut self) -> Option<Task> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Run the background queue processor.
pub async fn run_queue_processor(state: Arc<AppState>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    {
        let mut queue = state.task_queue.write().await;
        queue.set_notifier(tx);
    }

    tracing::info!("Queue processor started");

    loop {
        // Drain first: tasks may have been queued before the notifier was set.
        loop {
            let task = {
                let mut queue = state.task_queue.write().await;
                queue.take_next()
            };

            let task = match task {
                Some(t) => t,
                None => break,
            };

            tracing::info!(task = %task.description(), "Processing task");

            match &task {
                Task::EvaluateCoverage { feature_id } => {
                    match process_feature(&state, *feature_id).await {
                        Ok(message) => {
                            tracing::info!(
                                task = %task.description(),
                                message = %message,
                                "Task completed"
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                task = %task.description(),
                                error = %e,
                                "Task failed"
                            );
                        }
                    }
                }
            }
        }

        if rx.recv().await.is_none() {
            tracing::info!("Queue notifier closed, stopping processor");
            return;
        }
    }
}
