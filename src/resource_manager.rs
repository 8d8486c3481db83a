//! Resource Manager (C6): the single global concurrency gate all folder
//! orchestrators submit work through, so that N folders never run more
//! than `max_concurrent_operations` embedding/extraction jobs at once.
//!
//! The priority queue and cancellation-token registry follow the
//! teacher crate's concurrency style in `ingest.rs` (bounded worker pool,
//! per-item cancellation) generalized from a single source to N folders
//! sharing one budget. `Inner` is guarded by a plain `std::sync::Mutex`
//! rather than `tokio::sync::Mutex`: the critical section never spans an
//! `.await`, so a blocking lock is both correct and cheap, and it lets the
//! synchronous `Drop` impl promote the next waiter directly instead of
//! deferring to a notification nobody can guarantee to await.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Immediate,
    Batch,
}

struct Waiter {
    #[allow(dead_code)]
    id: String,
    grant: oneshot::Sender<()>,
}

struct Inner {
    in_use: usize,
    immediate: VecDeque<Waiter>,
    batch: VecDeque<Waiter>,
}

impl Inner {
    /// Grants as many queued waiters as current capacity allows, immediate
    /// waiters first. A waiter whose receiver was already dropped (its
    /// acquire call was cancelled) is skipped without consuming a slot.
    fn promote(&mut self, max_concurrent: usize) {
        while self.in_use < max_concurrent {
            let next = self.immediate.pop_front().or_else(|| self.batch.pop_front());
            match next {
                Some(waiter) => {
                    if waiter.grant.send(()).is_ok() {
                        self.in_use += 1;
                    }
                }
                None => break,
            }
        }
    }
}

/// A held concurrency slot. Dropping it frees the slot and promotes the
/// next queued waiter.
pub struct ResourcePermit<'a> {
    manager: &'a ResourceManager,
}

impl Drop for ResourcePermit<'_> {
    fn drop(&mut self) {
        self.manager.release();
    }
}

pub struct ResourceManager {
    max_concurrent: usize,
    max_queue_size: usize,
    inner: Mutex<Inner>,
    tokens: DashMap<String, CancellationToken>,
}

impl ResourceManager {
    pub fn new(max_concurrent: usize, max_queue_size: usize) -> Self {
        Self {
            max_concurrent,
            max_queue_size,
            inner: Mutex::new(Inner {
                in_use: 0,
                immediate: VecDeque::new(),
                batch: VecDeque::new(),
            }),
            tokens: DashMap::new(),
        }
    }

    fn release(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.in_use = inner.in_use.saturating_sub(1);
        inner.promote(self.max_concurrent);
    }

    /// Waits for a concurrency slot, honoring priority (immediate work is
    /// always served ahead of batch work) and the caller's cancellation
    /// token. Fails with `ResourceExhausted` if the wait queue is already
    /// full.
    pub async fn acquire(
        &self,
        id: &str,
        priority: Priority,
        cancel: CancellationToken,
    ) -> Result<ResourcePermit<'_>> {
        loop {
            let (tx, rx) = oneshot::channel();
            {
                let mut inner = self.inner.lock().unwrap();
                if inner.in_use < self.max_concurrent
                    && inner.immediate.is_empty()
                    && inner.batch.is_empty()
                {
                    inner.in_use += 1;
                    return Ok(ResourcePermit { manager: self });
                }

                let queued = inner.immediate.len() + inner.batch.len();
                if queued >= self.max_queue_size {
                    return Err(HarnessError::ResourceExhausted(format!(
                        "resource manager queue full ({queued}/{})",
                        self.max_queue_size
                    )));
                }
                let waiter = Waiter {
                    id: id.to_string(),
                    grant: tx,
                };
                match priority {
                    Priority::Immediate => inner.immediate.push_back(waiter),
                    Priority::Batch => inner.batch.push_back(waiter),
                }
            }

            tokio::select! {
                granted = rx => {
                    if granted.is_ok() {
                        let mut inner = self.inner.lock().unwrap();
                        inner.in_use += 1;
                        return Ok(ResourcePermit { manager: self });
                    }
                    // Channel dropped without granting (shutdown); retry the loop
                    // so a fresh acquire attempt observes current capacity.
                }
                _ = cancel.cancelled() => {
                    return Err(HarnessError::Cancelled(format!("operation {id} cancelled while queued")));
                }
            }

            self.try_promote_waiters();
        }
    }

    fn try_promote_waiters(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.promote(self.max_concurrent);
    }

    /// Runs `f` once a slot is acquired for `(id, folder_path)`, releasing
    /// the slot when `f` completes or is cancelled.
    pub async fn submit<F, Fut, T>(
        &self,
        id: &str,
        _folder_path: &PathBuf,
        priority: Priority,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = CancellationToken::new();
        self.tokens.insert(id.to_string(), token.clone());
        let permit = self.acquire(id, priority, token.clone()).await;
        self.tokens.remove(id);
        let _permit = permit?;
        tokio::select! {
            result = f() => result,
            _ = token.cancelled() => Err(HarnessError::Cancelled(format!("operation {id} cancelled"))),
        }
    }

    /// Cancels a queued or running operation by id. No-op if unknown.
    pub fn cancel(&self, id: &str) {
        if let Some((_, token)) = self.tokens.remove(id) {
            token.cancel();
        }
    }

    pub async fn in_use(&self) -> usize {
        self.inner.lock().unwrap().in_use
    }

    /// Cancels every outstanding operation, for daemon shutdown.
    pub fn shutdown(&self) {
        for entry in self.tokens.iter() {
            entry.value().cancel();
        }
        self.tokens.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn respects_max_concurrency() {
        let manager = Arc::new(ResourceManager::new(1, 10));
        let counter = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..3 {
            let m = manager.clone();
            let c = counter.clone();
            let p = peak.clone();
            handles.push(tokio::spawn(async move {
                m.submit(&format!("op{i}"), &PathBuf::from("/tmp"), Priority::Batch, || async {
                    let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    c.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), HarnessError>(())
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_unblocks_queued_waiter() {
        let manager = Arc::new(ResourceManager::new(1, 10));
        let token = CancellationToken::new();
        let _busy = manager.acquire("busy", Priority::Batch, CancellationToken::new()).await.unwrap();

        let waiter = {
            let m = manager.clone();
            let t = token.clone();
            tokio::spawn(async move { m.acquire("waiter", Priority::Batch, t).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        token.cancel();
        let result = waiter.await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn immediate_priority_jumps_ahead_of_batch() {
        let manager = Arc::new(ResourceManager::new(1, 10));
        let _busy = manager.acquire("busy", Priority::Batch, CancellationToken::new()).await.unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let m1 = manager.clone();
        let o1 = order.clone();
        let batch = tokio::spawn(async move {
            let _p = m1.acquire("batch", Priority::Batch, CancellationToken::new()).await.unwrap();
            o1.lock().unwrap().push("batch");
        });
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let m2 = manager.clone();
        let o2 = order.clone();
        let immediate = tokio::spawn(async move {
            let _p = m2.acquire("immediate", Priority::Immediate, CancellationToken::new()).await.unwrap();
            o2.lock().unwrap().push("immediate");
        });

        drop(_busy);
        batch.await.unwrap();
        immediate.await.unwrap();
        let order = order.lock().unwrap();
        assert_eq!(order.as_slice(), ["immediate", "batch"]);
    }

    /// Regression test for the release-never-promotes deadlock: with a
    /// single slot and two queued waiters, dropping the held permit must
    /// wake the next waiter without any other thread calling `acquire`
    /// again to trigger promotion.
    #[tokio::test]
    async fn dropping_a_permit_promotes_the_next_waiter_without_further_acquire_calls() {
        let manager = Arc::new(ResourceManager::new(1, 10));
        let busy = manager.acquire("busy", Priority::Batch, CancellationToken::new()).await.unwrap();

        let m = manager.clone();
        let waiter = tokio::spawn(async move { m.acquire("waiter", Priority::Batch, CancellationToken::new()).await });
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        drop(busy);

        let result = tokio::time::timeout(std::time::Duration::from_millis(200), waiter)
            .await
            .expect("waiter should be promoted on release, not hang")
            .unwrap();
        assert!(result.is_ok());
    }
}
