//! Live GPS feed
//!
//! A reader thread polls a sample source and publishes the newest fix into a
//! single slot. The simulation drains the slot once per vehicle update.
//! Before the first fix the slot holds the all-zero sample.

use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::types::Coords;

/// Longest the reader sleeps before checking its stop flag
const STOP_POLL: Duration = Duration::from_millis(20);

/// One position fix
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsSample {
    pub position: Coords,
    /// mph
    pub speed: f64,
    /// Degrees clockwise from north
    pub heading: f64,
}

impl GpsSample {
    /// False for the zero sentinel
    pub fn is_fix(&self) -> bool {
        *self != GpsSample::default()
    }
}

#[derive(Debug, Default)]
struct Slot {
    sample: GpsSample,
    fresh: bool,
}

/// Single-slot mailbox between a GPS reader and the simulation
#[derive(Debug, Clone, Default)]
pub struct GpsFeed {
    slot: Arc<Mutex<Slot>>,
}

impl GpsFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the stored sample with a newer one
    pub fn publish(&self, sample: GpsSample) {
        let mut slot = self.lock();
        slot.sample = sample;
        slot.fresh = true;
    }

    /// Newest sample, or the zero sentinel before the first fix
    pub fn latest(&self) -> GpsSample {
        self.lock().sample
    }

    /// The newest fix if one arrived since the last call
    pub fn take(&self) -> Option<GpsSample> {
        let mut slot = self.lock();
        if !slot.fresh {
            return None;
        }
        slot.fresh = false;
        Some(slot.sample).filter(GpsSample::is_fix)
    }
}

/// Background thread feeding a [`GpsFeed`]
pub struct GpsReader {
    stop: Arc<AtomicBool>,
    done: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl GpsReader {
    /// Start polling `source` every `poll`, publishing each sample it yields
    pub fn spawn<F>(feed: GpsFeed, poll: Duration, mut source: F) -> std::io::Result<Self>
    where
        F: FnMut() -> Option<GpsSample> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let (done_tx, done) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("gps-reader".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    if let Some(sample) = source() {
                        feed.publish(sample);
                    }
                    let mut slept = Duration::ZERO;
                    while slept < poll && !flag.load(Ordering::Relaxed) {
                        let step = STOP_POLL.min(poll - slept);
                        thread::sleep(step);
                        slept += step;
                    }
                }
                debug!("GPS reader stopping");
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            stop,
            done,
            handle: Some(handle),
        })
    }

    /// Ask the reader to stop and wait up to `timeout` for it
    ///
    /// Returns false if the thread did not finish in time; it is then
    /// detached and left to exit on its own.
    pub fn stop(mut self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::Relaxed);
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        warn!("GPS reader thread panicked");
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("GPS reader did not stop within {:?}, detaching it", timeout);
                self.handle.take();
                false
            }
        }
    }
}

impl Drop for GpsReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sample(lat: f64) -> GpsSample {
        GpsSample {
            position: Coords::from_degrees(lat, -80.0),
            speed: 30.0,
            heading: 0.0,
        }
    }

    #[test]
    fn test_zero_sentinel_before_first_fix() {
        let feed = GpsFeed::new();
        assert!(!feed.latest().is_fix());
        assert_eq!(feed.take(), None);

        feed.publish(sample(40.0));
        feed.publish(sample(40.1));
        assert_eq!(feed.take(), Some(sample(40.1)));
        // Drained until the next publish
        assert_eq!(feed.take(), None);
        assert_eq!(feed.latest(), sample(40.1));
    }

    #[test]
    fn test_reader_publishes_and_stops() {
        let feed = GpsFeed::new();
        let mut lat = 40.0;
        let reader = GpsReader::spawn(feed.clone(), Duration::from_millis(5), move || {
            lat += 0.001;
            Some(sample(lat))
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !feed.latest().is_fix() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(feed.latest().is_fix());
        assert!(reader.stop(Duration::from_secs(5)));
    }

    #[test]
    fn test_stuck_reader_is_detached() {
        let feed = GpsFeed::new();
        let reader = GpsReader::spawn(feed, Duration::from_millis(5), || {
            thread::sleep(Duration::from_millis(500));
            None
        })
        .unwrap();
        assert!(!reader.stop(Duration::from_millis(20)));
    }
}
