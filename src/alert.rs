//! Ring alert playback
//!
//! One alert session at a time. A session raises the ring volume to maximum,
//! loops the alert sound and shows a dismissible overlay. It ends on the
//! alert timer, the overlay timer or an explicit dismiss, whichever comes
//! first; cleanup runs once no matter how many of those fire.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::platform::{AudioControl, OverlayDisplay};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    AlertTimeout,
    OverlayTimeout,
    Dismissed,
    Replaced,
    Failed,
}

pub struct AlertSession {
    id: u64,
    audio: Arc<dyn AudioControl>,
    overlay: Arc<dyn OverlayDisplay>,
    original_volume: u32,
    finished: AtomicBool,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl AlertSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn original_volume(&self) -> u32 {
        self.original_volume
    }

    pub fn is_active(&self) -> bool {
        !self.finished.load(Ordering::Acquire)
    }

    /// Stop sound, restore volume, remove overlay. Returns false if the
    /// session had already finished.
    pub fn finish(&self, reason: StopReason) -> bool {
        if self.finished.swap(true, Ordering::AcqRel) {
            debug!(session = self.id, ?reason, "Alert already stopped");
            return false;
        }

        self.audio.stop_alert_sound();
        if let Err(e) = self.audio.set_ring_volume(self.original_volume) {
            warn!("Failed to restore ring volume: {}", e);
        }
        self.overlay.remove();

        for timer in lock(&self.timers).drain(..) {
            timer.abort();
        }

        info!(session = self.id, ?reason, "Alert stopped");
        true
    }
}

/// Owner of the device's alert sound
pub struct AlertPlayer {
    audio: Arc<dyn AudioControl>,
    overlay: Arc<dyn OverlayDisplay>,
    alert_duration: Duration,
    overlay_timeout: Duration,
    current: Mutex<Option<Arc<AlertSession>>>,
    next_id: AtomicU64,
}

impl AlertPlayer {
    pub fn new(
        config: &Config,
        audio: Arc<dyn AudioControl>,
        overlay: Arc<dyn OverlayDisplay>,
    ) -> Self {
        Self {
            audio,
            overlay,
            alert_duration: config.alert_duration,
            overlay_timeout: config.overlay_timeout,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a new alert, tearing down any active one first. Must be called
    /// from within a tokio runtime so the timers can be armed.
    pub fn start(&self, message: &str) -> Result<Arc<AlertSession>> {
        let mut current = lock(&self.current);
        if let Some(previous) = current.take() {
            previous.finish(StopReason::Replaced);
        }

        let session = Arc::new(AlertSession {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            audio: self.audio.clone(),
            overlay: self.overlay.clone(),
            original_volume: self.audio.ring_volume(),
            finished: AtomicBool::new(false),
            timers: Mutex::new(Vec::new()),
        });
        *current = Some(session.clone());

        if let Err(e) = self.begin(&session, message) {
            session.finish(StopReason::Failed);
            return Err(Error::Alert(e.to_string()));
        }

        info!(session = session.id, "Alert started");
        Ok(session)
    }

    fn begin(&self, session: &Arc<AlertSession>, message: &str) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Alert(format!("no runtime for alert timers: {}", e)))?;

        self.audio.set_ring_volume(self.audio.max_ring_volume())?;
        self.audio.start_alert_sound()?;
        self.overlay.show(message)?;

        let mut timers = lock(&session.timers);
        timers.push(arm(&runtime, session, self.alert_duration, StopReason::AlertTimeout));
        timers.push(arm(&runtime, session, self.overlay_timeout, StopReason::OverlayTimeout));
        Ok(())
    }

    /// The overlay's dismiss control. Returns whether an alert was stopped.
    pub fn dismiss(&self) -> bool {
        let session = lock(&self.current).take();
        match session {
            Some(session) => session.finish(StopReason::Dismissed),
            None => false,
        }
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.current)
            .as_ref()
            .map(|s| s.is_active())
            .unwrap_or(false)
    }
}

fn arm(
    runtime: &tokio::runtime::Handle,
    session: &Arc<AlertSession>,
    after: Duration,
    reason: StopReason,
) -> JoinHandle<()> {
    let session = Arc::clone(session);
    runtime.spawn(async move {
        tokio::time::sleep(after).await;
        session.finish(reason);
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
