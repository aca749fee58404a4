//! Per-wallet mutual exclusion for the execution pipeline
//!
//! Every signing/broadcast sequence for a wallet runs while holding that
//! wallet's lock, so two requests never have two signed-but-unconfirmed
//! transactions racing for the same account state. Locks for different
//! wallets live in different `DashMap` shards and never wait on each other.
//!
//! ## RAII Contract
//!
//! - `acquire()` returns a [`WalletLockGuard`]; the lock is held until the
//!   guard is dropped (normal return, `?` error, panic unwind or task
//!   cancellation all drop it).
//! - When the last holder/waiter for an address goes away the table entry is
//!   removed, so the table only contains wallets that are currently contended.
//!
//! ## Scope
//!
//! The table is process-local. Two processes serving the same wallet are not
//! serialized against each other; see DESIGN.md.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

use crate::metrics::metrics;

type LockTable = DashMap<Pubkey, Arc<Mutex<()>>>;

/// Keyed mutex service, one async mutex per wallet address
#[derive(Debug, Default, Clone)]
pub struct WalletLockManager {
    locks: Arc<LockTable>,
}

impl WalletLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `address`.
    ///
    /// Waiters are served in FIFO order (tokio's mutex is fair).
    pub async fn acquire(&self, address: &Pubkey) -> WalletLockGuard {
        // The shard guard returned by `entry` must be gone before we await
        let mutex = Arc::clone(
            &self
                .locks
                .entry(*address)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );

        let wait_start = Instant::now();
        let guard = mutex.lock_owned().await;
        let waited = wait_start.elapsed();

        metrics().lock_wait.observe(waited.as_secs_f64());
        debug!(
            wallet = %address,
            waited_ms = waited.as_millis() as u64,
            "Wallet lock acquired"
        );

        WalletLockGuard {
            address: *address,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
            acquired_at: Instant::now(),
        }
    }

    /// Run `f` while holding the lock for `address`.
    ///
    /// Calls for the same address queue behind each other; calls for
    /// different addresses proceed in parallel.
    pub async fn with_lock<F, Fut, T>(&self, address: &Pubkey, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(address).await;
        f().await
    }

    /// Number of wallets currently held or waited on
    pub fn active_wallets(&self) -> usize {
        self.locks.len()
    }

    /// Whether some request currently holds the lock for `address`
    pub fn is_locked(&self, address: &Pubkey) -> bool {
        self.locks
            .get(address)
            .map(|mutex| mutex.try_lock().is_err())
            .unwrap_or(false)
    }
}

/// Exclusive access to one wallet; released on drop
pub struct WalletLockGuard {
    address: Pubkey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockTable>,
    acquired_at: Instant,
}

impl WalletLockGuard {
    pub fn address(&self) -> &Pubkey {
        &self.address
    }

    pub fn held_for(&self) -> std::time::Duration {
        self.acquired_at.elapsed()
    }
}

impl std::fmt::Debug for WalletLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletLockGuard")
            .field("address", &self.address)
            .field("held_for", &self.held_for())
            .finish_non_exhaustive()
    }
}

impl Drop for WalletLockGuard {
    fn drop(&mut self) {
        // Release first so the next waiter can proceed immediately
        drop(self.guard.take());

        // Only the table's own reference left means nobody holds or waits
        self.locks
            .remove_if(&self.address, |_, mutex| Arc::strong_count(mutex) == 1);

        trace!(
            wallet = %self.address,
            held_ms = self.held_for().as_millis() as u64,
            "Wallet lock released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_same_wallet_is_serialized() {
        let manager = WalletLockManager::new();
        let wallet = Pubkey::new_unique();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                manager
                    .with_lock(&wallet, || async {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_wallets(), 0);
    }

    #[tokio::test]
    async fn test_different_wallets_do_not_block() {
        let manager = WalletLockManager::new();
        let busy = Pubkey::new_unique();
        let free = Pubkey::new_unique();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let holder = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .with_lock(&busy, || async {
                        let _ = release_rx.await;
                    })
                    .await
            })
        };

        // Wait until the first wallet is actually held
        while !manager.is_locked(&busy) {
            tokio::task::yield_now().await;
        }

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            manager.with_lock(&free, || async { 42 }),
        )
        .await;
        assert_eq!(other.unwrap(), 42);

        release_tx.send(()).unwrap();
        holder.await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_released_after_panic() {
        let manager = WalletLockManager::new();
        let wallet = Pubkey::new_unique();

        let panicking = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .with_lock(&wallet, || async {
                        panic!("boom inside critical section");
                    })
                    .await
            })
        };
        assert!(panicking.await.is_err());

        let reacquired =
            tokio::time::timeout(Duration::from_secs(1), manager.acquire(&wallet)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_holder_releases_lock() {
        let manager = WalletLockManager::new();
        let wallet = Pubkey::new_unique();

        let holder = {
            let manager = manager.clone();
            tokio::spawn(async move {
                let _guard = manager.acquire(&wallet).await;
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
        };
        while !manager.is_locked(&wallet) {
            tokio::task::yield_now().await;
        }
        holder.abort();
        let _ = holder.await;

        let guard = tokio::time::timeout(Duration::from_secs(1), manager.acquire(&wallet))
            .await
            .expect("lock must be free after cancellation");
        assert_eq!(guard.address(), &wallet);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_reports_hold_time() {
        let manager = WalletLockManager::new();
        let guard = manager.acquire(&Pubkey::new_unique()).await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(guard.held_for() >= Duration::from_millis(250));
        assert!(format!("{:?}", guard).contains("held_for"));
    }

    #[tokio::test]
    async fn test_table_entry_kept_while_waiters_exist() {
        let manager = WalletLockManager::new();
        let wallet = Pubkey::new_unique();

        let first = manager.acquire(&wallet).await;
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move {
                let _guard = manager.acquire(&wallet).await;
            })
        };
        tokio::task::yield_now().await;

        drop(first);
        waiter.await.unwrap();
        assert_eq!(manager.active_wallets(), 0);
        assert!(!manager.is_locked(&wallet));
    }
}
