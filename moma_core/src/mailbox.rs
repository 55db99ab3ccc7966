//! Latest-value slot for asynchronously pushed base odometry.
//!
//! The control thread takes a snapshot through [`OdometryMailbox::fence`].
//! While the returned guard is alive, incoming samples are dropped (not
//! queued); the guard clears the fence when it goes out of scope. The fence
//! flag lives under the same lock as the sample, so a writer can never slip a
//! sample in between the check and the store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use moma_traits::messages::OdometrySample;

#[derive(Debug, Default)]
struct Slot {
    sample: Option<OdometrySample>,
    fenced: bool,
}

#[derive(Debug, Default)]
pub struct OdometryMailbox {
    slot: Mutex<Slot>,
    ready: AtomicBool,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl OdometryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A panicking writer cannot leave the slot half-written: both fields
        // are plain values, so the poisoned state is still usable.
        self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Store `sample` unless a snapshot is in progress. Returns whether the
    /// sample was accepted.
    pub fn offer(&self, sample: OdometrySample) -> bool {
        self.received.fetch_add(1, Ordering::Relaxed);
        let mut slot = self.lock();
        if slot.fenced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("odometry update dropped during snapshot");
            return false;
        }
        slot.sample = Some(sample);
        self.ready.store(true, Ordering::Release);
        true
    }

    /// At least one sample has been accepted.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Raise the fence and capture the current sample.
    pub fn fence(&self) -> FencedSnapshot<'_> {
        let mut slot = self.lock();
        slot.fenced = true;
        let sample = slot.sample;
        FencedSnapshot {
            mailbox: self,
            sample,
        }
    }

    /// Latest accepted sample, without fencing.
    pub fn peek(&self) -> Option<OdometrySample> {
        self.lock().sample
    }

    pub fn received_count(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Snapshot taken under the fence; dropping it lowers the fence.
#[derive(Debug)]
pub struct FencedSnapshot<'a> {
    mailbox: &'a OdometryMailbox,
    sample: Option<OdometrySample>,
}

impl FencedSnapshot<'_> {
    pub fn sample(&self) -> Option<&OdometrySample> {
        self.sample.as_ref()
    }
}

impl Drop for FencedSnapshot<'_> {
    fn drop(&mut self) {
        self.mailbox.lock().fenced = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_until_first_sample() {
        let m = OdometryMailbox::new();
        assert!(!m.is_ready());
        assert!(m.fence().sample().is_none());
        assert!(m.offer(OdometrySample::planar(0.0, 0.0, 0.0)));
        assert!(m.is_ready());
    }

    #[test]
    fn fence_drops_and_counts_updates() {
        let m = OdometryMailbox::new();
        m.offer(OdometrySample::planar(1.0, 0.0, 0.0));
        {
            let snap = m.fence();
            assert!(!m.offer(OdometrySample::planar(5.0, 0.0, 0.0)));
            assert_eq!(snap.sample().map(|s| s.position[0]), Some(1.0));
        }
        assert_eq!(m.dropped_count(), 1);
        assert_eq!(m.received_count(), 2);
        // the dropped sample is gone, not replayed
        assert_eq!(m.peek().map(|s| s.position[0]), Some(1.0));
        assert!(m.offer(OdometrySample::planar(7.0, 0.0, 0.0)));
        assert_eq!(m.peek().map(|s| s.position[0]), Some(7.0));
    }
}
