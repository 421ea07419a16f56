//! Single-slot, latest-wins handoff between lanes.
//!
//! A `Mailbox` holds at most one message. Posting replaces an unread
//! message, so a consumer always sees the most recent one and never a
//! backlog. Every critical section is a single `Option` swap.
//!
//! The RT cycle only uses the non-waiting pair [`Mailbox::try_take`] and
//! [`Mailbox::try_post`]. If another lane holds the slot at that instant,
//! a command is picked up on the next cycle and a feedback post is counted
//! as dropped; the next cycle posts a fresher one anyway.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    posted: AtomicU64,
    overwritten: AtomicU64,
    dropped: AtomicU64,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            posted: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Store `message`, returning the unread message it replaced.
    pub fn post(&self, message: T) -> Option<T> {
        let replaced = self.slot.lock().replace(message);
        self.posted.fetch_add(1, Ordering::Relaxed);
        if replaced.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        replaced
    }

    /// Store `message` without waiting.
    ///
    /// Returns `Err(message)` if the slot is momentarily held by another
    /// lane; the message is dropped and counted.
    #[inline]
    pub fn try_post(&self, message: T) -> Result<Option<T>, T> {
        let Some(mut slot) = self.slot.try_lock() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(message);
        };
        let replaced = slot.replace(message);
        drop(slot);
        self.posted.fetch_add(1, Ordering::Relaxed);
        if replaced.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        Ok(replaced)
    }

    /// Take the pending message without waiting.
    ///
    /// Returns `None` if the slot is empty or momentarily held by a producer.
    #[inline]
    pub fn try_take(&self) -> Option<T> {
        self.slot.try_lock().and_then(|mut slot| slot.take())
    }

    /// Take the pending message, waiting for a concurrent producer.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    /// True if a message is waiting.
    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Messages posted since creation.
    pub fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }

    /// Messages replaced before being read.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    /// Messages lost by [`Mailbox::try_post`] to a busy slot.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Hold the slot as a slow reader would.
    #[cfg(test)]
    pub(crate) fn hold(&self) -> parking_lot::MutexGuard<'_, Option<T>> {
        self.slot.lock()
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
