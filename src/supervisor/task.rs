//! First-terminal-outcome task set
//!
//! Tasks are spawned on the tokio runtime and tracked by name. The set
//! yields each task's terminal outcome as it completes; a task that panics
//! yields its `JoinError`. Dropping the set detaches the remaining tasks.

use std::future::Future;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::task::JoinError;

/// How a task ended
#[derive(Debug)]
pub struct TaskExit<T> {
    pub name: &'static str,
    /// `Err` when the task panicked or was aborted
    pub outcome: Result<T, JoinError>,
}

/// Named long-running tasks awaited together
pub struct TaskSet<T> {
    tasks: FuturesUnordered<BoxFuture<'static, TaskExit<T>>>,
}

impl<T: Send + 'static> TaskSet<T> {
    pub fn new() -> Self {
        Self {
            tasks: FuturesUnordered::new(),
        }
    }

    /// Spawn `future` as an independent task
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks
            .push(handle.map(move |outcome| TaskExit { name, outcome }).boxed());
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The next task to terminate, `None` once the set is empty
    pub async fn next_terminal(&mut self) -> Option<TaskExit<T>> {
        self.tasks.next().await
    }
}

impl<T: Send + 'static> Default for TaskSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TaskSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSet")
            .field("pending", &self.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_to_finish_wins() {
        let mut tasks = TaskSet::new();
        tasks.spawn("slow", async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            1
        });
        tasks.spawn("fast", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            2
        });
        assert_eq!(tasks.len(), 2);

        let exit = tasks.next_terminal().await.unwrap();
        assert_eq!(exit.name, "fast");
        assert_eq!(exit.outcome.unwrap(), 2);
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_panic_is_a_terminal_outcome() {
        let mut tasks: TaskSet<()> = TaskSet::new();
        tasks.spawn("boom", async { panic!("boom") });

        let exit = tasks.next_terminal().await.unwrap();
        assert_eq!(exit.name, "boom");
        assert!(exit.outcome.unwrap_err().is_panic());
    }

    #[tokio::test]
    async fn test_empty_set() {
        let mut tasks: TaskSet<()> = TaskSet::default();
        assert!(tasks.is_empty());
        assert!(tasks.next_terminal().await.is_none());
    }
}
