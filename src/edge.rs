//! Edge detection over successive port samples.

use crate::clock::Timestamp;
use crate::event::{Bitmask, Event, LINES_PER_PORT};

/// Compare two samples and emit one event per line that changed.
///
/// Lines that went high produce [`EventKind::InputRose`](crate::event::EventKind::InputRose),
/// lines that went low produce `InputFell`. All events carry `now` and are ordered by
/// ascending line index.
pub fn detect_edges(previous: Bitmask, current: Bitmask, now: Timestamp) -> Vec<Event> {
    let changed = previous ^ current;
    if changed == 0 {
        return Vec::new();
    }

    let mut events = Vec::with_capacity(changed.count_ones() as usize);
    for line in 0..LINES_PER_PORT {
        let mask = 1u8 << line;
        if changed & mask == 0 {
            continue;
        }
        if current & mask != 0 {
            events.push(Event::rose(now, line));
        } else {
            events.push(Event::fell(now, line));
        }
    }
    events
}
