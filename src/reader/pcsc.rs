//! PC/SC binding for contactless readers (ACR122U and friends).

use std::ffi::CString;
use std::time::Duration;

use pcsc::{Context, Disposition, Protocols, ReaderState, Scope, ShareMode, State};

use super::{CardReader, ReaderError};

/// GET DATA for the card UID; the reply ends with status word `90 00`.
const GET_UID_APDU: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];

pub struct PcscReader {
    context: Option<Context>,
}

impl PcscReader {
    pub fn new() -> Self {
        Self { context: None }
    }

    fn context(&mut self) -> Result<&Context, ReaderError> {
        if self.context.is_none() {
            let ctx = Context::establish(Scope::User).map_err(unavailable)?;
            self.context = Some(ctx);
        }
        self.context
            .as_ref()
            .ok_or_else(|| ReaderError::Unavailable("no PC/SC context".into()))
    }

    /// Drops the context after service-level errors so the next call re-establishes it.
    fn reset_on(&mut self, err: pcsc::Error) -> ReaderError {
        match err {
            pcsc::Error::NoService | pcsc::Error::ServiceStopped | pcsc::Error::InvalidHandle => {
                self.context = None;
                unavailable(err)
            }
            pcsc::Error::NoReadersAvailable | pcsc::Error::UnknownReader | pcsc::Error::ReaderUnavailable => {
                unavailable(err)
            }
            other => ReaderError::Fault(other.to_string()),
        }
    }

    fn state(&mut self, terminal: &str, current: State, timeout: Duration) -> Result<State, ReaderError> {
        let name = terminal_name(terminal)?;
        let mut states = [ReaderState::new(name, current)];
        let result = self.context()?.get_status_change(timeout, &mut states);
        match result {
            Ok(()) => Ok(states[0].event_state()),
            Err(pcsc::Error::Timeout) => Ok(current),
            Err(e) => Err(self.reset_on(e)),
        }
    }
}

impl Default for PcscReader {
    fn default() -> Self {
        Self::new()
    }
}

fn unavailable(err: pcsc::Error) -> ReaderError {
    ReaderError::Unavailable(err.to_string())
}

fn terminal_name(terminal: &str) -> Result<CString, ReaderError> {
    CString::new(terminal).map_err(|e| ReaderError::Fault(e.to_string()))
}

impl CardReader for PcscReader {
    fn list_terminals(&mut self) -> Result<Vec<String>, ReaderError> {
        let result = self.context()?.list_readers_owned();
        match result {
            Ok(readers) => Ok(readers
                .into_iter()
                .map(|r| r.to_string_lossy().into_owned())
                .collect()),
            Err(pcsc::Error::NoReadersAvailable) => Ok(Vec::new()),
            Err(e) => Err(self.reset_on(e)),
        }
    }

    fn is_card_present(&mut self, terminal: &str) -> Result<bool, ReaderError> {
        let state = self.state(terminal, State::UNAWARE, Duration::ZERO)?;
        if state.intersects(State::UNKNOWN | State::UNAVAILABLE) {
            return Err(ReaderError::Fault(format!("terminal {terminal} gone")));
        }
        Ok(state.contains(State::PRESENT))
    }

    fn read_uid(&mut self, terminal: &str) -> Result<Vec<u8>, ReaderError> {
        let name = terminal_name(terminal)?;
        let connected = self
            .context()?
            .connect(&name, ShareMode::Shared, Protocols::ANY);
        let card = connected.map_err(|e| self.reset_on(e))?;

        let mut buf = [0u8; pcsc::MAX_BUFFER_SIZE];
        let uid = match card.transmit(&GET_UID_APDU, &mut buf) {
            Ok(reply) => match reply.split_last_chunk::<2>() {
                Some((uid, [0x90, 0x00])) => Ok(uid.to_vec()),
                _ => Err(ReaderError::Fault(format!(
                    "unexpected UID reply {}",
                    hex::encode_upper(reply)
                ))),
            },
            Err(e) => Err(ReaderError::Fault(e.to_string())),
        };

        if let Err((_, e)) = card.disconnect(Disposition::LeaveCard) {
            tracing::debug!(error = %e, "Card disconnect failed");
        }
        uid
    }

    fn wait_for_card_absent(&mut self, terminal: &str, timeout: Duration) -> Result<(), ReaderError> {
        let current = self.state(terminal, State::UNAWARE, Duration::ZERO)?;
        if !current.contains(State::PRESENT) {
            return Ok(());
        }
        // returns on the next state change or after `timeout`
        self.state(terminal, current, timeout).map(|_| ())
    }
}
