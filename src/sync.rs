//! Error-checking locks
//!
//! The registry lock and the per-bucket locks are wrapped in [`CheckedMutex`],
//! which turns two classes of programming errors into panics instead of hangs:
//!
//! - re-locking a mutex the current thread already holds (self-deadlock)
//! - acquiring a second lifecycle lock while one is held (lock nesting)
//!
//! The second rule is what keeps the registry lock and a bucket lock from
//! ever being held together by the same thread.

use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Source of per-thread lock owner tokens (0 means "unowned")
static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);

    /// Name of the lifecycle lock currently held by this thread, if any
    static HELD_LOCK: Cell<Option<&'static str>> = const { Cell::new(None) };
}

fn current_token() -> u64 {
    THREAD_TOKEN.with(|t| *t)
}

/// A mutex that detects self-deadlock and lifecycle-lock nesting
pub struct CheckedMutex<T> {
    name: &'static str,
    owner: AtomicU64,
    inner: Mutex<T>,
}

impl<T> CheckedMutex<T> {
    /// Create a new checked mutex. `name` shows up in panic messages.
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            owner: AtomicU64::new(0),
            inner: Mutex::new(value),
        }
    }

    /// Acquire the lock
    ///
    /// # Panics
    /// If this thread already owns this mutex, or owns any other
    /// `CheckedMutex`.
    pub fn lock(&self) -> CheckedGuard<'_, T> {
        let me = current_token();
        if self.owner.load(Ordering::Acquire) == me {
            panic!("self-deadlock: thread already holds the {} lock", self.name);
        }
        HELD_LOCK.with(|held| {
            if let Some(other) = held.get() {
                panic!(
                    "lock nesting: acquiring the {} lock while holding the {} lock",
                    self.name, other
                );
            }
        });

        let guard = self.inner.lock();
        self.owner.store(me, Ordering::Release);
        HELD_LOCK.with(|held| held.set(Some(self.name)));

        CheckedGuard { lock: self, guard }
    }

    /// True if the calling thread currently holds this lock
    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Acquire) == current_token()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// RAII guard for [`CheckedMutex`]
pub struct CheckedGuard<'a, T> {
    lock: &'a CheckedMutex<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for CheckedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for CheckedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for CheckedGuard<'_, T> {
    fn drop(&mut self) {
        // Runs before the inner MutexGuard is dropped
        self.lock.owner.store(0, Ordering::Release);
        HELD_LOCK.with(|held| held.set(None));
    }
}

/// Condition variable paired with a [`CheckedMutex`]
#[derive(Default)]
pub struct CheckedCondvar {
    inner: Condvar,
}

impl CheckedCondvar {
    pub fn new() -> Self {
        Self {
            inner: Condvar::new(),
        }
    }

    /// Block until notified, releasing the lock while waiting
    pub fn wait<T>(&self, guard: &mut CheckedGuard<'_, T>) {
        let lock = guard.lock;
        lock.owner.store(0, Ordering::Release);
        HELD_LOCK.with(|held| held.set(None));

        self.inner.wait(&mut guard.guard);

        lock.owner.store(current_token(), Ordering::Release);
        HELD_LOCK.with(|held| held.set(Some(lock.name)));
    }

    /// Block until `condition` returns false
    pub fn wait_while<T, F>(&self, guard: &mut CheckedGuard<'_, T>, mut condition: F)
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut *guard) {
            self.wait(guard);
        }
    }

    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}
