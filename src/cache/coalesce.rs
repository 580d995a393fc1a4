//! In-process single-flight coalescing.
//!
//! At most one computation per fingerprint is in flight within a process.
//! Callers racing on the same fingerprint converge on one shared completion
//! signal; the loser waits, then re-checks the cache. Claims live only in
//! memory — there is no cross-process coordination (two OS processes can
//! still compute the same fingerprint concurrently; the on-disk store only
//! deduplicates storage, last writer wins).

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

/// A set-once event the computing caller fires when it finishes.
///
/// `wait` has no timeout of its own: the computing path's worker timeout is
/// the bound on how long a claim can stay open.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    done: Mutex<bool>,
    cvar: Condvar,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal, waking all waiters. Idempotent.
    pub fn set(&self) {
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        *done = true;
        self.cvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.done.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until the signal fires.
    pub fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        while !*done {
            done = self.cvar.wait(done).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Wait without blocking the async runtime: the blocking wait is
    /// offloaded to the runtime's blocking thread pool.
    pub async fn wait_async(self: Arc<Self>) {
        let signal = Arc::clone(&self);
        // The task only blocks on the condvar; if the runtime drops it the
        // signal itself is unaffected.
        let _ = tokio::task::spawn_blocking(move || signal.wait()).await;
    }
}

/// Outcome of [`ProcessingRegistry::claim`].
pub enum Claim {
    /// This caller won the race and must compute, then release.
    Winner(ClaimGuard),
    /// Another caller is computing; wait on its signal, then re-check the
    /// cache. If the cache is still empty after waking (the computation
    /// failed), claim again and compute.
    Waiter(Arc<CompletionSignal>),
}

/// Tracks which fingerprints are currently being computed by this process.
#[derive(Debug, Default)]
pub struct ProcessingRegistry {
    claims: Mutex<HashMap<String, Arc<CompletionSignal>>>,
}

impl ProcessingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a computation for `fingerprint` is currently in flight.
    pub fn is_claimed(&self, fingerprint: &str) -> bool {
        self.claims
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(fingerprint)
    }

    /// Return the completion signal for `fingerprint`, creating the claim if
    /// absent. Idempotent: concurrent callers all receive the same signal.
    pub fn signal_for(&self, fingerprint: &str) -> Arc<CompletionSignal> {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            claims
                .entry(fingerprint.to_string())
                .or_insert_with(|| Arc::new(CompletionSignal::new())),
        )
    }

    /// Atomically claim `fingerprint` or join the existing claim.
    ///
    /// The winner receives a [`ClaimGuard`] that releases the claim when
    /// dropped, so release happens on every exit path — early returns, `?`,
    /// and panic unwinds included.
    pub fn claim(self: &Arc<Self>, fingerprint: &str) -> Claim {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        match claims.get(fingerprint) {
            Some(signal) => Claim::Waiter(Arc::clone(signal)),
            None => {
                claims.insert(
                    fingerprint.to_string(),
                    Arc::new(CompletionSignal::new()),
                );
                Claim::Winner(ClaimGuard {
                    registry: Arc::clone(self),
                    fingerprint: fingerprint.to_string(),
                })
            }
        }
    }

    /// Remove the claim for `fingerprint` and wake all waiters.
    ///
    /// Releasing an untracked fingerprint is a no-op, not an error: cleanup
    /// paths must be able to call this unconditionally.
    pub fn release(&self, fingerprint: &str) {
        let signal = {
            let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
            claims.remove(fingerprint)
        };
        // Wake outside the lock; waiters re-check the cache, not the table.
        if let Some(signal) = signal {
            signal.set();
        }
    }

    /// Number of in-flight claims (for stats).
    pub fn claimed_count(&self) -> usize {
        self.claims.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// RAII handle for a won claim; releases on drop.
pub struct ClaimGuard {
    registry: Arc<ProcessingRegistry>,
    fingerprint: String,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.registry.release(&self.fingerprint);
    }
}
