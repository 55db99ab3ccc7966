//! Background odometry intake.
//!
//! Spawns a thread that drains pushed odometry samples from a channel into
//! the [`OdometryMailbox`] and tracks the last-received timestamp for stall
//! detection. The thread is shut down and joined when the listener drops.
use crossbeam_channel as xch;
use moma_traits::clock::Clock;
use moma_traits::messages::OdometrySample;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::mailbox::OdometryMailbox;

/// How long one receive blocks before the shutdown flag is rechecked.
const POLL: Duration = Duration::from_millis(20);

pub struct OdometryListener {
    mailbox: Arc<OdometryMailbox>,
    last_ok: Arc<AtomicU64>,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl OdometryListener {
    pub fn spawn<C: Clock + Send + Sync + 'static>(
        rx: xch::Receiver<OdometrySample>,
        mailbox: Arc<OdometryMailbox>,
        clock: C,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_clone = last_ok.clone();
        let mailbox_clone = mailbox.clone();
        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(clock);
        let thread_clock = clock.clone();
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("odometry listener received shutdown signal");
                    break;
                }

                match rx.recv_timeout(POLL) {
                    Ok(sample) => {
                        mailbox_clone.offer(sample);
                        last_ok_clone.store(thread_clock.ms_since(epoch), Ordering::Relaxed);
                    }
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    Err(xch::RecvTimeoutError::Disconnected) => {
                        tracing::debug!("odometry producer disconnected, exiting thread");
                        break;
                    }
                }
            }
            tracing::trace!("odometry listener exiting cleanly");
        });

        Self {
            mailbox,
            last_ok,
            clock,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn mailbox(&self) -> &Arc<OdometryMailbox> {
        &self.mailbox
    }

    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    /// Stall measured on the listener's own clock, the one that stamps
    /// received samples.
    pub fn stalled_for_now(&self) -> u64 {
        self.stalled_for(self.clock.ms_since(self.epoch))
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for OdometryListener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("odometry listener joined"),
                Err(e) => tracing::warn!(?e, "odometry listener panicked during shutdown"),
            }
        }
    }
}
