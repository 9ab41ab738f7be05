//! Offset-based tailing of the sensor's append-only output file.
//!
//! The cursor re-opens the file every cycle and reads from its last offset to
//! the current end. No filesystem-notification API is used; the sensor keeps
//! appending while we read.

use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use super::event::{SensorEvent, parse_line};

/// Position in the monitored output stream. Only ever advances; a partially
/// written trailing line is consumed along with everything before it, so each
/// observed line is processed exactly once.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TailCursor {
    offset: u64,
}

impl TailCursor {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn advance(&mut self, bytes: u64) {
        self.offset += bytes;
    }
}

/// Read every line appended since `cursor`, returning the events parsed from
/// them in file order and advancing the cursor to the new end of stream.
///
/// Lines that fail to parse are dropped silently; an I/O failure on the file
/// itself is fatal and propagated.
pub fn read_new_events(path: &Path, cursor: &mut TailCursor) -> std::io::Result<Vec<SensorEvent>> {
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(cursor.offset()))?;

    let mut events = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf)?;
        if read == 0 {
            break;
        }
        cursor.advance(read as u64);

        let line = String::from_utf8_lossy(&buf);
        if let Some(event) = parse_line(line.trim_end()) {
            events.push(event);
        }
    }

    Ok(events)
}
