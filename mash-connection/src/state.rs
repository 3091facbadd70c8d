use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// The four-valued connection lifecycle state, held as a single atomic
/// integer so every transition is a compare-and-swap.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Closing = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Closing,
            _ => unreachable!("StateCell only ever stores the four ConnectionState discriminants"),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        write!(f, "{name}")
    }
}

/// An atomic cell holding a [`ConnectionState`], guarding every transition
/// with compare-and-swap.
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(initial: ConnectionState) -> Self {
        StateCell(AtomicU8::new(initial as u8))
    }

    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Attempt `from -> to`; returns `false` if the cell wasn't in `from`.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0.compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }

    /// Unconditionally set the state, returning the previous value. Used by
    /// the force-close path, where the prior state may be any of several
    /// values depending on how teardown was triggered.
    pub fn force(&self, to: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.0.swap(to as u8, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_succeeds_only_from_the_expected_state() {
        let cell = StateCell::new(ConnectionState::Disconnected);
        assert!(!cell.transition(ConnectionState::Connected, ConnectionState::Closing));
        assert!(cell.transition(ConnectionState::Disconnected, ConnectionState::Connecting));
        assert_eq!(cell.load(), ConnectionState::Connecting);
    }

    #[test]
    fn force_reports_the_previous_state() {
        let cell = StateCell::new(ConnectionState::Connected);
        let prev = cell.force(ConnectionState::Disconnected);
        assert_eq!(prev, ConnectionState::Connected);
        assert_eq!(cell.load(), ConnectionState::Disconnected);
    }
}
