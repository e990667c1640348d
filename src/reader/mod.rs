//! Contactless card reader plumbing: hardware access, polling and scan delivery.

pub mod ingest;
#[cfg(feature = "pcsc")]
pub mod pcsc;
pub mod poller;

use std::time::Duration;

/// Failures reported by a [`CardReader`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// No reader subsystem or no terminal attached.
    #[error("card reader unavailable: {0}")]
    Unavailable(String),

    /// The terminal went away or the card could not be read.
    #[error("card reader fault: {0}")]
    Fault(String),
}

/// Blocking access to a contactless card terminal.
///
/// Calls may block for up to the given timeout, so implementations are driven
/// from a dedicated OS thread, never from the async runtime.
pub trait CardReader: Send {
    /// Names of the terminals currently attached.
    fn list_terminals(&mut self) -> Result<Vec<String>, ReaderError>;

    fn is_card_present(&mut self, terminal: &str) -> Result<bool, ReaderError>;

    /// Raw UID bytes of the card on the terminal.
    fn read_uid(&mut self, terminal: &str) -> Result<Vec<u8>, ReaderError>;

    /// Blocks until the card is removed or `timeout` elapses.
    fn wait_for_card_absent(&mut self, terminal: &str, timeout: Duration) -> Result<(), ReaderError>;
}

/// Stand-in used when no reader backend is compiled in or enabled.
pub struct NoReader;

impl CardReader for NoReader {
    fn list_terminals(&mut self) -> Result<Vec<String>, ReaderError> {
        Ok(Vec::new())
    }

    fn is_card_present(&mut self, _terminal: &str) -> Result<bool, ReaderError> {
        Err(ReaderError::Unavailable("no card reader backend".into()))
    }

    fn read_uid(&mut self, _terminal: &str) -> Result<Vec<u8>, ReaderError> {
        Err(ReaderError::Unavailable("no card reader backend".into()))
    }

    fn wait_for_card_absent(&mut self, _terminal: &str, _timeout: Duration) -> Result<(), ReaderError> {
        Ok(())
    }
}

/// Uppercase hex, no separators: `[0x04, 0xa1]` becomes `"04A1"`.
pub fn format_uid(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}
