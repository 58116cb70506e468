//! Field extraction for controller telemetry.
//!
//! Controllers print semi-structured `DPRNT[...]` lines. Nothing here parses a
//! grammar: each field is a case-insensitive marker followed by a token, and
//! a field whose marker is missing comes back empty.
//!
//! ```text
//! DPRNT[ PART NUMBER: 265-4183, REV. X2]   -> part_number, revision
//! DPRNT[ DATE YYMMDD: 240117]              -> date_yymmdd
//! DPRNT[ TIME HHMMSS: 134502]              -> time_hhmmss
//! DPRNT[ PARTS MADE: 17]                   -> parts_counter
//! DPRNT[ TIME, LAST PART: 93.5 SECONDS]    -> last_part_seconds
//! DPRNT[ End of Cycle]                     -> cycle boundary
//! ```
//!
//! Every function is pure and linear in the length of its input.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::types::CycleFields;

struct Patterns {
    part_and_revision: Regex,
    part_tag: Regex,
    date: Regex,
    time: Regex,
    parts_made: Regex,
    last_part_time: Regex,
    cycle_end: Regex,
    dprnt: Regex,
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    part_and_revision: compile(r"(?i)PART\s+NUMBER:\s*([^\s,]+)(?:,\s*REV\.\s*([^\]]+))?"),
    part_tag: compile(r"(?i)PART\s+NUMBER:\s*([^\s,]+)[\s,]"),
    date: compile(r"(?i)DATE\s+YYMMDD:\s*([0-9]+)"),
    time: compile(r"(?i)TIME\s+HHMMSS:\s*([0-9]+)"),
    parts_made: compile(r"(?i)PARTS\s*MADE:\s*([0-9]+)"),
    last_part_time: compile(r"(?i)TIME,\s*LAST\s*PART:\s*([0-9]+(?:\.[0-9]+)?)\s*SECONDS"),
    cycle_end: compile(r"(?i)end of cycle"),
    dprnt: compile(r"(?i)DPRNT"),
});

// Patterns are literals; a failure here is a programming error caught by the tests below.
fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => panic!("invalid built-in pattern {pattern:?}: {e}"),
    }
}

/// Result of running the extractor over a cycle's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub fields: CycleFields,
    pub cycle_complete: bool,
}

/// Extracts every field and reports whether the text contains a cycle boundary.
pub fn extract(text: &str) -> Extraction {
    Extraction {
        fields: extract_fields(text),
        cycle_complete: is_cycle_complete(text),
    }
}

/// Extracts every field from `text`. Unmatched fields are left empty.
pub fn extract_fields(text: &str) -> CycleFields {
    let p = &*PATTERNS;
    let mut fields = CycleFields::default();

    if let Some(caps) = p.part_and_revision.captures(text) {
        fields.part_number = group(&caps, 1);
        fields.revision = group(&caps, 2);
    }
    fields.date_yymmdd = first_group(&p.date, text);
    fields.time_hhmmss = first_group(&p.time, text);
    fields.parts_counter = first_group(&p.parts_made, text);
    fields.last_part_seconds = first_group(&p.last_part_time, text);

    fields
}

/// Looks for a part number that is already terminated by whitespace or a comma.
///
/// Used while a cycle is still streaming in: a token sitting at the very end of
/// `text` may continue in the next chunk, so it is not reported yet.
pub fn extract_part_number(text: &str) -> Option<&str> {
    PATTERNS
        .part_tag
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Byte range of the first end-of-cycle marker, in any casing.
pub fn find_cycle_end(text: &str) -> Option<Range<usize>> {
    PATTERNS.cycle_end.find(text).map(|m| m.range())
}

pub fn is_cycle_complete(text: &str) -> bool {
    PATTERNS.cycle_end.is_match(text)
}

/// True for a line with no telemetry in it: no DPRNT output, no field, no end marker.
///
/// Program text such as `M30` or `%` after the end-of-cycle line qualifies.
pub fn is_trailer_line(line: &str) -> bool {
    !PATTERNS.dprnt.is_match(line) && !is_cycle_complete(line) && extract_fields(line) == CycleFields::default()
}

fn group(caps: &regex::Captures<'_>, index: usize) -> String {
    caps.get(index)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn first_group(re: &Regex, text: &str) -> String {
    re.captures(text)
        .map(|caps| group(&caps, 1))
        .unwrap_or_default()
}
