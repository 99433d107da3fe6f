//! Delayed and periodic script callbacks on the host main loop
//!
//! Each timer owns a persistent handle to its callback and a token whose
//! state moves `Pending -> Fired` (one-shot) or `Pending -> Cancelled`
//! exactly once. Whoever wins that transition releases the handle, so a fire
//! message still in the queue after a cancel finds the token settled and
//! does nothing.

use crate::error::{BridgeError, BridgeResult};
use crate::marshal;
use crate::runtime::{IsolateRuntime, Scope};
use crate::services::HostServices;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tether_host::MainLoop;
use tether_script::{ContextId, Heap, Persistent, Value};

/// Largest delay honored as given, in milliseconds
pub const MAX_DELAY_MS: f64 = 2_147_483_647.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    OneShot,
    Periodic,
}

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug)]
struct TimerToken(AtomicU8);

impl TimerToken {
    fn new() -> Self {
        Self(AtomicU8::new(PENDING))
    }

    fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire) == PENDING
    }

    fn transition(&self, to: u8) -> bool {
        self.0
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct TimerEntry {
    callback: Persistent,
    context: ContextId,
    mode: TimerMode,
    delay: Duration,
    token: Arc<TimerToken>,
}

enum Firing {
    Once(Persistent),
    Repeat(Value, Duration),
}

/// Clamp a script-supplied delay
pub fn normalize_delay(delay_ms: f64) -> Duration {
    if !delay_ms.is_finite() || delay_ms < 0.0 {
        Duration::ZERO
    } else if delay_ms > MAX_DELAY_MS {
        Duration::from_millis(1)
    } else {
        Duration::from_millis(delay_ms as u64)
    }
}

pub struct TimerBridge {
    runtime: Weak<IsolateRuntime>,
    main_loop: MainLoop,
    services: Arc<dyn HostServices>,
    next_id: AtomicU64,
    timers: Mutex<FxHashMap<TimerId, TimerEntry>>,
}

impl TimerBridge {
    pub(crate) fn new(
        runtime: Weak<IsolateRuntime>,
        main_loop: MainLoop,
        services: Arc<dyn HostServices>,
    ) -> Self {
        Self {
            runtime,
            main_loop,
            services,
            next_id: AtomicU64::new(1),
            timers: Mutex::new(FxHashMap::default()),
        }
    }

    /// Timers not yet fired or cancelled
    pub fn active(&self) -> usize {
        self.timers.lock().len()
    }

    /// Persist `callback` and post its first fire message
    pub fn schedule(
        self: &Arc<Self>,
        heap: &mut Heap,
        context: ContextId,
        callback: Value,
        delay_ms: f64,
        mode: TimerMode,
    ) -> BridgeResult<TimerId> {
        if !heap.is_callable(&callback) {
            return Err(BridgeError::type_mismatch("function", marshal::describe(heap, &callback)));
        }
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let delay = normalize_delay(delay_ms);
        let token = Arc::new(TimerToken::new());
        let entry = TimerEntry {
            callback: heap.persist(callback),
            context,
            mode,
            delay,
            token: token.clone(),
        };
        self.timers.lock().insert(id, entry);
        tracing::debug!(timer = %id, ?mode, delay_ms = delay.as_millis() as u64, "timer scheduled");
        self.post(id, token, delay);
        Ok(id)
    }

    fn post(self: &Arc<Self>, id: TimerId, token: Arc<TimerToken>, delay: Duration) {
        let timers = Arc::downgrade(self);
        self.main_loop.post_delayed(
            move || {
                if let Some(timers) = timers.upgrade() {
                    timers.fire(id, token);
                }
            },
            delay,
        );
    }

    fn fire(self: &Arc<Self>, id: TimerId, token: Arc<TimerToken>) {
        if !token.is_pending() {
            return;
        }
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        let context = match self.timers.lock().get(&id) {
            Some(entry) => entry.context,
            None => return,
        };
        let outcome = runtime.enter(Some(context), |scope| self.fire_in(scope, id, &token));
        match outcome {
            Ok(()) => {}
            Err(BridgeError::ShutDown) => {
                tracing::debug!(timer = %id, "timer fired after shutdown");
            }
            Err(err) => self.report(id, &err),
        }
    }

    fn fire_in(
        self: &Arc<Self>,
        scope: &mut Scope<'_>,
        id: TimerId,
        token: &Arc<TimerToken>,
    ) -> BridgeResult<()> {
        let firing = {
            let mut timers = self.timers.lock();
            let Some(entry) = timers.get(&id) else {
                return Ok(());
            };
            match entry.mode {
                TimerMode::OneShot => {
                    if !token.transition(FIRED) {
                        return Ok(());
                    }
                    match timers.remove(&id) {
                        Some(entry) => Firing::Once(entry.callback),
                        None => return Ok(()),
                    }
                }
                TimerMode::Periodic => {
                    if !token.is_pending() {
                        return Ok(());
                    }
                    Firing::Repeat(scope.resolve(&entry.callback)?, entry.delay)
                }
            }
        };
        // The table lock is free again, so callbacks may schedule or cancel
        match firing {
            Firing::Once(callback) => {
                let result = scope
                    .resolve(&callback)
                    .and_then(|value| scope.call(&value, &[]));
                scope.release(callback);
                if let Err(err) = result {
                    self.report(id, &err);
                }
            }
            Firing::Repeat(callback, delay) => {
                if let Err(err) = scope.call(&callback, &[]) {
                    self.report(id, &err);
                }
                if token.is_pending() {
                    self.post(id, token.clone(), delay);
                }
            }
        }
        Ok(())
    }

    fn report(&self, id: TimerId, err: &BridgeError) {
        tracing::warn!(timer = %id, error = %err, "timer callback failed");
        self.services
            .error(&format!("timer {} callback failed: {}: {}", id, err.kind(), err));
    }

    /// Cancel a pending timer. False if it already fired or was cancelled.
    pub fn cancel(&self, heap: &mut Heap, id: TimerId) -> bool {
        let entry = {
            let mut timers = self.timers.lock();
            match timers.get(&id) {
                Some(entry) if entry.token.transition(CANCELLED) => timers.remove(&id),
                _ => None,
            }
        };
        match entry {
            Some(entry) => {
                heap.release(entry.callback);
                tracing::debug!(timer = %id, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel the timers scheduled from `context`
    pub fn cancel_for_context(&self, heap: &mut Heap, context: ContextId) -> usize {
        self.cancel_where(heap, |entry| entry.context == context)
    }

    /// Cancel every timer
    pub fn cancel_all(&self, heap: &mut Heap) -> usize {
        self.cancel_where(heap, |_| true)
    }

    fn cancel_where(&self, heap: &mut Heap, mut matches: impl FnMut(&TimerEntry) -> bool) -> usize {
        let cancelled: Vec<TimerEntry> = {
            let mut timers = self.timers.lock();
            let ids: Vec<TimerId> = timers
                .iter()
                .filter(|(_, entry)| matches(entry))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| match timers.get(&id) {
                    Some(entry) if entry.token.transition(CANCELLED) => timers.remove(&id),
                    _ => None,
                })
                .collect()
        };
        let count = cancelled.len();
        for entry in cancelled {
            heap.release(entry.callback);
        }
        count
    }

    /// Cancel and drop every entry without touching a heap. Used when the
    /// isolate is already gone.
    pub(crate) fn forget_all(&self) {
        let mut timers = self.timers.lock();
        for entry in timers.values() {
            entry.token.transition(CANCELLED);
        }
        timers.clear();
    }
}

impl fmt::Debug for TimerBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerBridge")
            .field("active", &self.active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_delay() {
        assert_eq!(normalize_delay(25.0), Duration::from_millis(25));
        assert_eq!(normalize_delay(2.9), Duration::from_millis(2));
        assert_eq!(normalize_delay(-5.0), Duration::ZERO);
        assert_eq!(normalize_delay(f64::NAN), Duration::ZERO);
        assert_eq!(normalize_delay(f64::INFINITY), Duration::ZERO);
        assert_eq!(normalize_delay(MAX_DELAY_MS), Duration::from_millis(2_147_483_647));
        assert_eq!(normalize_delay(MAX_DELAY_MS + 1.0), Duration::from_millis(1));
    }

    #[test]
    fn test_token_settles_once() {
        let token = TimerToken::new();
        assert!(token.is_pending());
        assert!(token.transition(CANCELLED));
        assert!(!token.transition(FIRED));
        assert!(!token.transition(CANCELLED));
        assert!(!token.is_pending());
    }
}
