//! Owned timer wheel over a virtual clock.
//!
//! Every animation stage, glow fade, counter frame and winner stage is a
//! timer registered here. Callbacks are plain event values handed back to the
//! owner when due, so the owner decides how to continue the chain and nothing
//! runs after `cancel_all`/`close`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug)]
pub struct Scheduler<E> {
    now: Duration,
    next_id: u64,
    queue: BinaryHeap<Reverse<(Duration, u64)>>,
    live: HashMap<u64, E>,
    closed: bool,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            queue: BinaryHeap::new(),
            live: HashMap::new(),
            closed: false,
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Registers `event` to fire `delay` after the current virtual time.
    ///
    /// Timers sharing a deadline fire in registration order. A closed
    /// scheduler hands out handles that never fire.
    pub fn schedule(&mut self, delay: Duration, event: E) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        if self.closed {
            return TimerHandle(id);
        }
        let deadline = self.now + delay;
        self.queue.push(Reverse((deadline, id)));
        self.live.insert(id, event);
        TimerHandle(id)
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.live.remove(&handle.0).is_some()
    }

    /// Cancels every pending timer and returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.live.len();
        self.live.clear();
        self.queue.clear();
        dropped
    }

    /// Cancels everything and refuses further scheduling.
    pub fn close(&mut self) {
        self.cancel_all();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.live.contains_key(&handle.0)
    }

    pub fn pending(&self) -> usize {
        self.live.len()
    }

    /// Deadline of the earliest live timer.
    pub fn next_deadline(&mut self) -> Option<Duration> {
        self.prune();
        self.queue.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Pops the earliest timer due at or before `until`, moving the clock to
    /// its deadline.
    pub fn pop_due(&mut self, until: Duration) -> Option<(Duration, E)> {
        loop {
            let Reverse((deadline, id)) = *self.queue.peek()?;
            if deadline > until {
                return None;
            }
            self.queue.pop();
            if let Some(event) = self.live.remove(&id) {
                if deadline > self.now {
                    self.now = deadline;
                }
                return Some((deadline, event));
            }
        }
    }

    /// Moves the clock forward; never backwards.
    pub fn advance_to(&mut self, now: Duration) {
        if now > self.now {
            self.now = now;
        }
    }

    fn prune(&mut self) {
        while let Some(Reverse((_, id))) = self.queue.peek() {
            if self.live.contains_key(id) {
                break;
            }
            self.queue.pop();
        }
    }
}
