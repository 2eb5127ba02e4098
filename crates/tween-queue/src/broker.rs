//! Storage backends for the task list and result slots.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;
use tween_models::TaskId;

use crate::error::QueueResult;

/// A FIFO task list plus an expiring key/value store for results.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append a payload to the tail of the task list.
    async fn push_task(&self, payload: String) -> QueueResult<()>;

    /// Pop from the head, waiting up to `timeout` (forever when None).
    async fn pop_task(&self, timeout: Option<Duration>) -> QueueResult<Option<String>>;

    /// Store a result payload, replacing any previous one.
    async fn put_result(&self, task_id: &TaskId, payload: String, ttl: Duration)
        -> QueueResult<()>;

    /// Read a result payload without consuming it.
    async fn get_result(&self, task_id: &TaskId) -> QueueResult<Option<String>>;

    /// Number of queued tasks.
    async fn pending(&self) -> QueueResult<usize>;

    /// Drop all queued tasks, returning how many were dropped.
    async fn purge(&self) -> QueueResult<usize>;

    /// Queued payloads, head first, without removing them.
    async fn queued_tasks(&self) -> QueueResult<Vec<String>>;

    /// Remove one queued payload. Returns false when a worker got there first.
    async fn remove_task(&self, payload: &str) -> QueueResult<bool>;
}

/// Redis lists and string keys.
pub struct RedisBroker {
    client: redis::Client,
    tasks_key: String,
    results_prefix: String,
}

impl RedisBroker {
    pub fn new(redis_url: &str, prefix: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            tasks_key: format!("{}:tasks", prefix),
            results_prefix: format!("{}:results", prefix),
        })
    }

    pub fn tasks_key(&self) -> &str {
        &self.tasks_key
    }

    pub fn result_key(&self, task_id: &TaskId) -> String {
        format!("{}:{}", self.results_prefix, task_id)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn push_task(&self, payload: String) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.rpush::<_, _, ()>(&self.tasks_key, payload).await?;
        Ok(())
    }

    async fn pop_task(&self, timeout: Option<Duration>) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        // BLPOP treats 0 as "block forever"
        let secs = timeout.map(|t| t.as_secs_f64().max(0.001)).unwrap_or(0.0);
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(&self.tasks_key)
            .arg(secs)
            .query_async(&mut conn)
            .await?;
        Ok(popped.map(|(_, payload)| payload))
    }

    async fn put_result(
        &self,
        task_id: &TaskId,
        payload: String,
        ttl: Duration,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = self.result_key(task_id);
        conn.set_ex::<_, _, ()>(&key, payload, ttl.as_secs().max(1)).await?;
        debug!("Stored result at {}", key);
        Ok(())
    }

    async fn get_result(&self, task_id: &TaskId) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.get(self.result_key(task_id)).await?)
    }

    async fn pending(&self) -> QueueResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.llen(&self.tasks_key).await?)
    }

    async fn purge(&self) -> QueueResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (count, _deleted): (usize, i64) = redis::pipe()
            .atomic()
            .llen(&self.tasks_key)
            .del(&self.tasks_key)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn queued_tasks(&self) -> QueueResult<Vec<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.lrange(&self.tasks_key, 0, -1).await?)
    }

    async fn remove_task(&self, payload: &str) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let removed: i64 = conn.lrem(&self.tasks_key, 1, payload).await?;
        Ok(removed > 0)
    }
}

/// In-process broker with the same semantics as [`RedisBroker`].
#[derive(Default)]
pub struct MemoryBroker {
    tasks: Mutex<VecDeque<String>>,
    task_added: Notify,
    results: Mutex<HashMap<TaskId, (String, Instant)>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn push_task(&self, payload: String) -> QueueResult<()> {
        self.tasks.lock().await.push_back(payload);
        self.task_added.notify_one();
        Ok(())
    }

    async fn pop_task(&self, timeout: Option<Duration>) -> QueueResult<Option<String>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            // Register interest before checking so a concurrent push is not missed
            let notified = self.task_added.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.tasks.lock().await.pop_front() {
                return Ok(Some(payload));
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn put_result(
        &self,
        task_id: &TaskId,
        payload: String,
        ttl: Duration,
    ) -> QueueResult<()> {
        self.results
            .lock()
            .await
            .insert(task_id.clone(), (payload, Instant::now() + ttl));
        Ok(())
    }

    async fn get_result(&self, task_id: &TaskId) -> QueueResult<Option<String>> {
        let mut results = self.results.lock().await;
        match results.get(task_id) {
            Some((_, expires)) if *expires <= Instant::now() => {
                results.remove(task_id);
                Ok(None)
            }
            Some((payload, _)) => Ok(Some(payload.clone())),
            None => Ok(None),
        }
    }

    async fn pending(&self) -> QueueResult<usize> {
        Ok(self.tasks.lock().await.len())
    }

    async fn purge(&self) -> QueueResult<usize> {
        let mut tasks = self.tasks.lock().await;
        let count = tasks.len();
        tasks.clear();
        Ok(count)
    }

    async fn queued_tasks(&self) -> QueueResult<Vec<String>> {
        Ok(self.tasks.lock().await.iter().cloned().collect())
    }

    async fn remove_task(&self, payload: &str) -> QueueResult<bool> {
        let mut tasks = self.tasks.lock().await;
        match tasks.iter().position(|queued| queued == payload) {
            Some(index) => {
                tasks.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_broker_is_fifo() {
        let broker = MemoryBroker::new();
        broker.push_task("a".to_string()).await.unwrap();
        broker.push_task("b".to_string()).await.unwrap();

        assert_eq!(broker.pending().await.unwrap(), 2);
        assert_eq!(broker.pop_task(None).await.unwrap().as_deref(), Some("a"));
        assert_eq!(broker.pop_task(None).await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_memory_pop_times_out() {
        let broker = MemoryBroker::new();
        let popped = broker
            .pop_task(Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_memory_pop_wakes_on_push() {
        let broker = Arc::new(MemoryBroker::new());
        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.pop_task(Some(Duration::from_secs(5))).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.push_task("late".to_string()).await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_memory_results_are_rereadable_and_expire() {
        let broker = MemoryBroker::new();
        let id = TaskId::from_string("task_r");
        broker
            .put_result(&id, "{}".to_string(), Duration::from_millis(30))
            .await
            .unwrap();

        assert!(broker.get_result(&id).await.unwrap().is_some());
        assert!(broker.get_result(&id).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(broker.get_result(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_purge() {
        let broker = MemoryBroker::new();
        broker.push_task("x".to_string()).await.unwrap();
        assert_eq!(broker.purge().await.unwrap(), 1);
        assert_eq!(broker.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_listing_and_removal() {
        let broker = MemoryBroker::new();
        for payload in ["a", "b", "c"] {
            broker.push_task(payload.to_string()).await.unwrap();
        }
        assert_eq!(broker.queued_tasks().await.unwrap(), vec!["a", "b", "c"]);

        assert!(broker.remove_task("b").await.unwrap());
        assert!(!broker.remove_task("b").await.unwrap());
        assert_eq!(broker.pop_task(None).await.unwrap().as_deref(), Some("a"));
        assert_eq!(broker.pop_task(None).await.unwrap().as_deref(), Some("c"));
    }

    #[test]
    fn test_redis_keys() {
        let broker = RedisBroker::new("redis://localhost:6379", "tween").unwrap();
        assert_eq!(broker.tasks_key(), "tween:tasks");
        assert_eq!(
            broker.result_key(&TaskId::from_string("task_1")),
            "tween:results:task_1"
        );
    }
}
