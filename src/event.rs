//! Queue events.
//!
//! Everything the daemon buffers is an [`Event`]: a timestamp plus an [`EventKind`].
//! Input edges land in the input log, everything else in the output schedule.
//!
//! ## Value conventions
//! - **Lines:** bit positions `0..8` within an 8-bit port.
//! - **Bitmasks:** the full 8-bit level of a port, bit `n` = line `n`.
//! - **Timestamps:** seconds on the daemon clock (see [`crate::clock`]). For input
//!   edges it is the sample time; for scheduled entries it is the due time.

use crate::clock::Timestamp;

/// One addressable bit of an 8-bit port.
pub type Line = u8;

/// Level of all eight lines of a port.
pub type Bitmask = u8;

/// Number of lines per port.
pub const LINES_PER_PORT: u8 = 8;

/// What happened, or what should happen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// An input line went 0 → 1.
    InputRose { line: Line },

    /// An input line went 1 → 0.
    InputFell { line: Line },

    /// Drive the output port to `value` once due.
    OutputWrite { value: Bitmask },

    /// Stop the scheduler once due.
    Quit,

    /// Restart the device with the pending port configuration once due.
    Init,
}

/// Timestamped, immutable queue entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    at: Timestamp,
    kind: EventKind,
}

impl Event {
    pub fn new(at: Timestamp, kind: EventKind) -> Self {
        Self { at, kind }
    }

    pub fn rose(at: Timestamp, line: Line) -> Self {
        Self::new(at, EventKind::InputRose { line })
    }

    pub fn fell(at: Timestamp, line: Line) -> Self {
        Self::new(at, EventKind::InputFell { line })
    }

    pub fn output(at: Timestamp, value: Bitmask) -> Self {
        Self::new(at, EventKind::OutputWrite { value })
    }

    pub fn quit(at: Timestamp) -> Self {
        Self::new(at, EventKind::Quit)
    }

    pub fn init(at: Timestamp) -> Self {
        Self::new(at, EventKind::Init)
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.at
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// `true` for edges that belong in the input log.
    #[inline]
    pub fn is_input(&self) -> bool {
        matches!(
            self.kind,
            EventKind::InputRose { .. } | EventKind::InputFell { .. }
        )
    }
}
