//! Single-slot, non-blocking admission gate.
//!
//! At most one fetch/announce cycle may run per source.  A trigger that
//! arrives while a cycle is in flight is dropped on the floor; it is never
//! queued and never waits.  Slow upstreams therefore cannot accumulate a
//! backlog of pending work.

use std::sync::atomic::{AtomicBool, Ordering};

/// Busy flag for one source.
#[derive(Debug, Default)]
pub struct FetchGate {
    busy: AtomicBool,
}

impl FetchGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the slot.
    ///
    /// Returns a guard that releases the slot when dropped, on every exit
    /// path including unwinding, or `None` if a cycle is already running.
    pub fn try_enter(&self) -> Option<GateGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| GateGuard { gate: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn exit(&self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Proof of admission; the slot is released on drop.
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a FetchGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn second_entry_is_refused_while_held() {
        let gate = FetchGate::new();
        let guard = gate.try_enter();
        assert!(guard.is_some());
        assert!(gate.is_busy());
        assert!(gate.try_enter().is_none());
        drop(guard);
        assert!(!gate.is_busy());
        assert!(gate.try_enter().is_some());
    }

    #[test]
    fn slot_is_released_when_holder_panics() {
        let gate = FetchGate::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = gate.try_enter().unwrap();
            panic!("cycle blew up");
        }));
        assert!(result.is_err());
        assert!(!gate.is_busy());
    }

    #[test]
    fn only_one_of_many_racing_threads_is_admitted() {
        let gate = Arc::new(FetchGate::new());
        let admitted = Arc::new(AtomicUsize::new(0));
        let ready = Arc::new(Barrier::new(8));
        let hold = Arc::new(Barrier::new(9));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let admitted = Arc::clone(&admitted);
                let ready = Arc::clone(&ready);
                let hold = Arc::clone(&hold);
                thread::spawn(move || {
                    ready.wait();
                    let guard = gate.try_enter();
                    if guard.is_some() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                    // Keep the winner's guard alive until everyone has tried.
                    hold.wait();
                    drop(guard);
                })
            })
            .collect();

        hold.wait();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert!(!gate.is_busy());
    }
}
