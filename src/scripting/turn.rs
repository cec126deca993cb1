//! Script bodies take turns.
//!
//! Only one executor body runs at a time, so read-modify-write sequences on
//! shared state never interleave inside a script. A script blocked in
//! `wait()` or `sc::sleep` hands its turn on until it resumes.

use std::cell::RefCell;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

#[derive(Default)]
struct Baton {
    busy: Mutex<bool>,
    free: Condvar,
}

impl Baton {
    fn take(&self) {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        while *busy {
            busy = self.free.wait(busy).unwrap_or_else(PoisonError::into_inner);
        }
        *busy = true;
    }

    fn give(&self) {
        *self.busy.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.free.notify_one();
    }
}

thread_local! {
    static HELD: RefCell<Option<Arc<Baton>>> = const { RefCell::new(None) };
}

struct Held(Arc<Baton>);

impl Drop for Held {
    fn drop(&mut self) {
        HELD.with(|held| held.borrow_mut().take());
        self.0.give();
    }
}

struct Reclaim(Arc<Baton>);

impl Drop for Reclaim {
    fn drop(&mut self) {
        self.0.take();
    }
}

/// The turn shared by every script an engine loads
#[derive(Clone, Default)]
pub struct Turns(Arc<Baton>);

impl Turns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on this thread once no other script body is running.
    ///
    /// Blocks the thread; call it from the blocking pool.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        self.0.take();
        HELD.with(|held| *held.borrow_mut() = Some(Arc::clone(&self.0)));
        let _held = Held(Arc::clone(&self.0));
        f()
    }
}

/// Run `f` with this thread's turn handed on, taking it back afterwards
pub fn yielding<T>(f: impl FnOnce() -> T) -> T {
    let Some(baton) = HELD.with(|held| held.borrow().clone()) else {
        return f();
    };
    baton.give();
    let _reclaim = Reclaim(baton);
    f()
}
