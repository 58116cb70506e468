//! Per-session accumulation of streamed telemetry.
//!
//! The wire carries no length prefix: a cycle ends wherever the controller
//! prints its end-of-cycle line. [`CycleBuffer`] collects decoded text until
//! that marker shows up, then hands the finished cycle out and keeps whatever
//! followed it as the beginning of the next one.
//!
//! Program text closing a cycle (`M30`, the `%` terminator) belongs to the
//! cycle it closes. If it is buffered when the cycle is cut, it goes out with
//! the cycle. If it arrives afterwards, it is dropped instead of opening the
//! next cycle.

use std::borrow::Cow;

use super::field_extractor;

/// How far before the previously scanned end the part-number search restarts.
///
/// Covers a marker plus its token being split across two reads.
const TAG_LOOKBACK: usize = 128;

#[derive(Debug, Default)]
pub struct CycleBuffer {
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence, completed by the next chunk.
    pending: Vec<u8>,
    tag: Option<String>,
    /// Length of `text` already searched for the part number.
    tag_scanned: usize,
    /// The last cycle was cut before its closing program text arrived.
    trailing: bool,
}

enum TrailerScan {
    /// Trailer lines through the `%` terminator, this many bytes.
    Through(usize),
    /// Telemetry shows up before any terminator.
    NotTrailer,
    /// Only trailer text so far; more is needed to decide.
    Incomplete,
}

fn scan_trailer(text: &str) -> TrailerScan {
    let mut pos = 0;
    while let Some(offset) = text[pos..].find('\n') {
        let line = &text[pos..pos + offset];
        if !field_extractor::is_trailer_line(line) {
            return TrailerScan::NotTrailer;
        }
        pos += offset + 1;
        if line.trim() == "%" {
            return TrailerScan::Through(pos);
        }
    }
    let partial = &text[pos..];
    if !partial.is_empty() && !field_extractor::is_trailer_line(partial) {
        TrailerScan::NotTrailer
    } else {
        TrailerScan::Incomplete
    }
}

impl CycleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw chunk, decoding it as UTF-8.
    ///
    /// Invalid sequences are dropped. A multi-byte character split across two
    /// chunks is held back until its remaining bytes arrive.
    pub fn push(&mut self, bytes: &[u8]) {
        let data: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(bytes)
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(bytes);
            Cow::Owned(joined)
        };

        let mut rest: &[u8] = &data;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    self.text
                        .push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => rest = &tail[bad..],
                        None => {
                            self.pending.extend_from_slice(tail);
                            break;
                        }
                    }
                }
            }
        }
        self.settle_trailer();
    }

    /// Drops closing program text of an already taken cycle once it is complete.
    fn settle_trailer(&mut self) {
        if !self.trailing {
            return;
        }
        match scan_trailer(&self.text) {
            TrailerScan::Through(len) => {
                self.text.drain(..len);
                self.tag_scanned = 0;
                self.trailing = false;
            }
            TrailerScan::NotTrailer => self.trailing = false,
            TrailerScan::Incomplete => {}
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.pending.is_empty()
    }

    /// Part number seen so far in the current cycle, if any.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Whether the buffered text holds any telemetry, as opposed to leftover program text.
    pub fn holds_telemetry(&self) -> bool {
        self.text.lines().any(|line| !field_extractor::is_trailer_line(line))
    }

    /// Searches the newly appended text for the part number.
    ///
    /// Returns the tag only on the call that first captures it. Each call scans
    /// the suffix added since the previous one plus [`TAG_LOOKBACK`] bytes, so
    /// repeated calls stay linear in the total amount of text.
    pub fn capture_tag(&mut self) -> Option<&str> {
        if self.tag.is_some() {
            return None;
        }
        let start = floor_char_boundary(&self.text, self.tag_scanned.saturating_sub(TAG_LOOKBACK));
        self.tag = field_extractor::extract_part_number(&self.text[start..]).map(str::to_string);
        self.tag_scanned = self.text.len();
        self.tag.as_deref()
    }

    /// Removes and returns the first complete cycle, if the buffer holds one.
    ///
    /// The cycle runs through the end of the marker's line when that newline is
    /// already buffered, otherwise through the marker itself. Buffered closing
    /// program text up to a `%` line is taken along. The rest stays in the
    /// buffer and the tag is reset for the next cycle.
    pub fn take_cycle(&mut self) -> Option<String> {
        self.settle_trailer();
        let marker = field_extractor::find_cycle_end(&self.text)?;
        let (cut, trailing) = match self.text[marker.end..].find('\n') {
            Some(offset) => {
                let line_end = marker.end + offset + 1;
                match scan_trailer(&self.text[line_end..]) {
                    TrailerScan::Through(len) => (line_end + len, false),
                    TrailerScan::NotTrailer => (line_end, false),
                    TrailerScan::Incomplete => (line_end, true),
                }
            }
            None => (marker.end, true),
        };

        let rest = self.text.split_off(cut);
        let cycle = std::mem::replace(&mut self.text, rest);
        self.tag = None;
        self.tag_scanned = 0;
        self.trailing = trailing;
        self.settle_trailer();
        Some(cycle)
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.pending.clear();
        self.tag = None;
        self.tag_scanned = 0;
        self.trailing = false;
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_chunks_in_order() {
        let mut buffer = CycleBuffer::new();
        buffer.push(b"DPRNT[ PART ");
        buffer.push(b"NUMBER: 1]\n");
        assert_eq!(buffer.text(), "DPRNT[ PART NUMBER: 1]\n");
        assert!(buffer.take_cycle().is_none());
        assert_eq!(buffer.len(), 23);
    }

    #[test]
    fn drops_invalid_bytes_without_failing() {
        let mut buffer = CycleBuffer::new();
        buffer.push(b"ok \xff\xfe here");
        assert_eq!(buffer.text(), "ok  here");
    }

    #[test]
    fn joins_multibyte_character_split_across_chunks() {
        let bytes = "Ø-ring".as_bytes();
        let mut buffer = CycleBuffer::new();
        buffer.push(&bytes[..1]);
        assert_eq!(buffer.text(), "");
        assert!(!buffer.is_empty());
        buffer.push(&bytes[1..]);
        assert_eq!(buffer.text(), "Ø-ring");
    }

    #[test]
    fn captures_tag_once_it_is_terminated() {
        let mut buffer = CycleBuffer::new();
        buffer.push(b"DPRNT[ PART NUMBER: 265-41");
        assert_eq!(buffer.capture_tag(), None);
        buffer.push(b"83, REV. X2]\n");
        assert_eq!(buffer.capture_tag(), Some("265-4183"));
        assert_eq!(buffer.tag(), Some("265-4183"));
        // already captured: later calls report nothing new
        buffer.push(b"DPRNT[ PART NUMBER: 999, REV. B]\n");
        assert_eq!(buffer.capture_tag(), None);
        assert_eq!(buffer.tag(), Some("265-4183"));
    }

    #[test]
    fn captures_tag_split_inside_the_marker() {
        let mut buffer = CycleBuffer::new();
        buffer.push(b"DPRNT[ PART NUM");
        assert_eq!(buffer.capture_tag(), None);
        buffer.push(b"BER: 265-4183, REV. X2]");
        assert_eq!(buffer.capture_tag(), Some("265-4183"));
    }

    #[test]
    fn tag_search_skips_text_outside_the_lookback() {
        let mut buffer = CycleBuffer::new();
        buffer.push("x".repeat(4 * TAG_LOOKBACK).as_bytes());
        assert_eq!(buffer.capture_tag(), None);
        assert_eq!(buffer.tag_scanned, 4 * TAG_LOOKBACK);
        buffer.push(b" PART NUMBER: A1 ");
        assert_eq!(buffer.capture_tag(), Some("A1"));
    }

    #[test]
    fn lookback_start_respects_char_boundaries() {
        let mut buffer = CycleBuffer::new();
        // 257 bytes scanned, so the next start (129) falls inside a two-byte char
        buffer.push(format!("{}a", "é".repeat(TAG_LOOKBACK)).as_bytes());
        assert_eq!(buffer.capture_tag(), None);
        buffer.push("é".as_bytes());
        assert_eq!(buffer.capture_tag(), None);
    }

    #[test]
    fn take_cycle_keeps_the_following_cycle() {
        let mut buffer = CycleBuffer::new();
        buffer.push(b"PART NUMBER: A, REV. 1]\nDPRNT[ End of Cycle]\nPART NUMBER: B, REV. 2]\n");
        buffer.capture_tag();
        assert_eq!(buffer.tag(), Some("A"));

        let first = buffer.take_cycle().expect("first cycle");
        assert_eq!(first, "PART NUMBER: A, REV. 1]\nDPRNT[ End of Cycle]\n");
        assert_eq!(buffer.text(), "PART NUMBER: B, REV. 2]\n");
        assert_eq!(buffer.tag(), None);
        assert_eq!(buffer.capture_tag(), Some("B"));
        assert!(buffer.take_cycle().is_none());
    }

    #[test]
    fn take_cycle_cuts_at_marker_when_line_is_unfinished() {
        let mut buffer = CycleBuffer::new();
        buffer.push(b"abc END OF CYCLE");
        assert_eq!(buffer.take_cycle().as_deref(), Some("abc END OF CYCLE"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn take_cycle_handles_back_to_back_cycles() {
        let mut buffer = CycleBuffer::new();
        buffer.push(b"one end of cycle\ntwo End Of Cycle\nthree");
        assert_eq!(buffer.take_cycle().as_deref(), Some("one end of cycle\n"));
        assert_eq!(buffer.take_cycle().as_deref(), Some("two End Of Cycle\n"));
        assert_eq!(buffer.take_cycle(), None);
        assert_eq!(buffer.text(), "three");
    }

    #[test]
    fn closing_program_text_goes_out_with_the_cycle() {
        let mut buffer = CycleBuffer::new();
        buffer.push(b"DPRNT[ PART NUMBER: A, REV. 1]\nDPRNT[ End of Cycle]\nG103\nM30\n%\n%\nO03020\n");

        assert_eq!(
            buffer.take_cycle().as_deref(),
            Some("DPRNT[ PART NUMBER: A, REV. 1]\nDPRNT[ End of Cycle]\nG103\nM30\n%\n")
        );
        assert_eq!(buffer.text(), "%\nO03020\n");
    }

    #[test]
    fn closing_text_after_the_cut_is_dropped() {
        let mut buffer = CycleBuffer::new();
        buffer.push(b"DPRNT[ PART NUMBER: A, REV. 1]\nDPRNT[ End of Cycle");
        assert_eq!(
            buffer.take_cycle().as_deref(),
            Some("DPRNT[ PART NUMBER: A, REV. 1]\nDPRNT[ End of Cycle")
        );

        buffer.push(b"]\nG103 (RETURN TO NORMAL LOOKAHEAD)\nM3");
        assert!(!buffer.holds_telemetry());
        buffer.push(b"0\n%\n");
        assert!(buffer.is_empty());

        buffer.push(b"DPRNT[ PART NUMBER: B, REV. 2]\n");
        assert_eq!(buffer.text(), "DPRNT[ PART NUMBER: B, REV. 2]\n");
        assert_eq!(buffer.capture_tag(), Some("B"));
    }

    #[test]
    fn unterminated_program_text_stays_with_the_next_cycle() {
        let mut buffer = CycleBuffer::new();
        buffer.push(b"End of Cycle\nM30\nDPRNT[ PART NUMBER: B, REV. 2]\n");

        assert_eq!(buffer.take_cycle().as_deref(), Some("End of Cycle\n"));
        assert_eq!(buffer.text(), "M30\nDPRNT[ PART NUMBER: B, REV. 2]\n");
        assert!(buffer.holds_telemetry());
    }

    #[test]
    fn clear_resets_everything() {
        let mut buffer = CycleBuffer::new();
        buffer.push(b"PART NUMBER: A \xe2");
        buffer.capture_tag();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.tag(), None);
    }
}
