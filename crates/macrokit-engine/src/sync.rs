//! Cancellation and pause primitives shared by the coordinators.
//!
//! Both are cheap clonable handles around shared state.  [`CancelSignal`]
//! is dual-faced on purpose: the async side of the engine awaits it in
//! `select!` arms, while the blocking interpreter worker polls the flag
//! between instructions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// One-shot cancellation signal for an execution session.
///
/// Latches on the first `cancel()`; later calls are no-ops.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(tx),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.tx.send(true);
    }

    /// Lock-free check for the blocking side (interpreter hook, sleep
    /// slices).
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is cancelled.  Never resolves otherwise;
    /// callers pair it with another future in `select!`.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so wait_for can only fail after
        // cancellation has already been observed.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Pause gate for an interactive execution session.
///
/// Unlike [`CancelSignal`] this toggles freely in both directions.
#[derive(Debug, Clone)]
pub struct PauseGate {
    tx: Arc<watch::Sender<bool>>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn pause(&self) {
        self.tx.send_replace(true);
    }

    pub fn resume(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves immediately when not paused, otherwise waits for the next
    /// `resume()`.
    pub async fn wait_until_resumed(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks windows of time during which the engine itself is injecting
/// input, so the capture hooks can tell synthetic events from operator
/// events and ignore them.
///
/// Reentrant: the flag stays active while any guard is alive.
#[derive(Debug, Clone, Default)]
pub struct SyntheticInputFlag {
    depth: Arc<AtomicUsize>,
}

impl SyntheticInputFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag for the lifetime of the returned guard.
    pub fn activate(&self) -> SyntheticInputGuard {
        self.depth.fetch_add(1, Ordering::SeqCst);
        SyntheticInputGuard {
            depth: Arc::clone(&self.depth),
        }
    }

    pub fn is_active(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }
}

pub struct SyntheticInputGuard {
    depth: Arc<AtomicUsize>,
}

impl Drop for SyntheticInputGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
