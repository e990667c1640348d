use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::ingest::UidSink;
use super::{CardReader, ReaderError, format_uid};
use crate::utils::shutdown::Shutdown;

/// Same-UID reads closer together than this collapse into one event.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

/// Drops repeated reads of a card resting on the terminal.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// True when `uid` read at `at` must be emitted; records it as the last emission.
    pub fn should_emit(&mut self, uid: &str, at: Instant) -> bool {
        let emit = match &self.last {
            Some((last_uid, last_at)) => {
                last_uid != uid || at.saturating_duration_since(*last_at) >= self.window
            }
            None => true,
        };
        if emit {
            self.last = Some((uid.to_string(), at));
        }
        emit
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollerTimings {
    /// Pause between presence checks while no card is on the terminal.
    pub poll_interval: Duration,
    /// Pause before retrying discovery after a missing reader or a fault.
    pub retry_backoff: Duration,
    /// Upper bound for one "wait until the card is removed" call.
    pub absent_wait: Duration,
}

impl Default for PollerTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            retry_backoff: Duration::from_secs(1),
            absent_wait: Duration::from_secs(1),
        }
    }
}

/// Supervised polling loop over a [`CardReader`].
///
/// Never gives up on the hardware: a missing terminal or a read fault only
/// leads to a backoff and a new discovery round. Stops when `shutdown` fires.
pub struct CardReaderPoller<R: CardReader> {
    reader: R,
    sink: UidSink,
    shutdown: Shutdown,
    timings: PollerTimings,
    debouncer: Debouncer,
    terminal: Option<String>,
    searching_logged: bool,
}

impl<R: CardReader + 'static> CardReaderPoller<R> {
    pub fn new(reader: R, sink: UidSink, shutdown: Shutdown) -> Self {
        Self {
            reader,
            sink,
            shutdown,
            timings: PollerTimings::default(),
            debouncer: Debouncer::default(),
            terminal: None,
            searching_logged: false,
        }
    }

    pub fn with_timings(mut self, timings: PollerTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Moves the loop onto its own OS thread; reader calls block.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("card-reader".into())
            .spawn(move || self.run())
    }

    pub fn run(mut self) {
        info!("Card reader poller started");
        while !self.shutdown.is_triggered() {
            let pause = match self.step() {
                Ok(pause) => pause,
                Err(e) => {
                    self.disconnect(&e);
                    self.timings.retry_backoff
                }
            };
            if !pause.is_zero() {
                thread::sleep(pause);
            }
        }
        info!("Card reader poller stopped");
    }

    /// One iteration of the loop; returns how long to sleep afterwards.
    fn step(&mut self) -> Result<Duration, ReaderError> {
        let Some(terminal) = self.connect()? else {
            return Ok(self.timings.retry_backoff);
        };

        if !self.reader.is_card_present(&terminal)? {
            return Ok(self.timings.poll_interval);
        }

        let uid = format_uid(&self.reader.read_uid(&terminal)?);
        if uid.is_empty() {
            return Ok(self.timings.poll_interval);
        }

        if self.debouncer.should_emit(&uid, Instant::now()) {
            info!(uid = %uid, terminal = %terminal, "Card UID detected");
            self.sink.publish(uid);
        } else {
            debug!(uid = %uid, "Repeated read suppressed");
        }

        self.reader
            .wait_for_card_absent(&terminal, self.timings.absent_wait)?;
        Ok(Duration::ZERO)
    }

    fn connect(&mut self) -> Result<Option<String>, ReaderError> {
        if let Some(terminal) = &self.terminal {
            return Ok(Some(terminal.clone()));
        }
        match self.reader.list_terminals()?.into_iter().next() {
            Some(terminal) => {
                info!(terminal = %terminal, "Card reader connected");
                self.searching_logged = false;
                self.terminal = Some(terminal.clone());
                Ok(Some(terminal))
            }
            None => {
                if !self.searching_logged {
                    info!("Searching for a card reader");
                    self.searching_logged = true;
                }
                Ok(None)
            }
        }
    }

    fn disconnect(&mut self, error: &ReaderError) {
        match self.terminal.take() {
            Some(terminal) => warn!(terminal = %terminal, error = %error, "Card reader disconnected"),
            None => debug!(error = %error, "Card reader discovery failed"),
        }
    }
}
