//! Abortable one-shot timers for the proactive scheduler and the
//! inactivity monitor.
//!
//! Each concern owns exactly one slot. Arming a slot invalidates and aborts
//! whatever was armed before, so two live timers for the same concern never
//! coexist. A generation token guards the fire path: a task that was
//! superseded between its wake-up and its action sees a stale token and
//! does nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::task::JoinHandle;

#[derive(Default)]
pub(crate) struct TimerSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
}

impl TimerSlot {
    /// Invalidate and abort the current timer, reserving the generation
    /// token for the next one. Callers spawn their task with the returned
    /// token and then `store` its handle.
    pub fn begin(&self) -> u64 {
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(handle) = self.handle.lock().expect("timer slot lock poisoned").take() {
            handle.abort();
        }
        token
    }

    /// Track the spawned task so a later `begin`/`cancel` can abort it.
    pub fn store(&self, handle: JoinHandle<()>) {
        let previous = self
            .handle
            .lock()
            .expect("timer slot lock poisoned")
            .replace(handle);
        if let Some(stale) = previous {
            stale.abort();
        }
    }

    /// True while `token` is still the latest armed generation.
    pub fn is_current(&self, token: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == token
    }

    /// Invalidate and abort without arming a replacement.
    pub fn cancel(&self) {
        self.begin();
    }
}

/// The two timers owned by the session facade. Both are cancelled on
/// logout and on teardown; leaking an armed timer past the session it
/// belongs to is a bug.
#[derive(Default)]
pub(crate) struct SessionTimers {
    pub proactive: TimerSlot,
    pub inactivity: TimerSlot,
}

impl SessionTimers {
    pub fn cancel_all(&self) {
        self.proactive.cancel();
        self.inactivity.cancel();
    }
}

impl Drop for SessionTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous_timer() {
        let slot = Arc::new(TimerSlot::default());
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let token = slot.begin();
            let slot_ref = Arc::clone(&slot);
            let fired_ref = Arc::clone(&fired);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                if slot_ref.is_current(token) {
                    fired_ref.fetch_add(1, Ordering::SeqCst);
                }
            });
            slot.store(handle);
        }

        tokio::time::sleep(Duration::from_secs(120)).await;
        // Only the last armed timer acts.
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let slot = Arc::new(TimerSlot::default());
        let fired = Arc::new(AtomicUsize::new(0));

        let token = slot.begin();
        let slot_ref = Arc::clone(&slot);
        let fired_ref = Arc::clone(&fired);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            if slot_ref.is_current(token) {
                fired_ref.fetch_add(1, Ordering::SeqCst);
            }
        });
        slot.store(handle);
        slot.cancel();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
