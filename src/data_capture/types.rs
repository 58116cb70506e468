//! Common data types used across the data_capture subsystem.

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

/// Wall-clock format used for the `Timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fields pulled out of one cycle's text.
///
/// Unmatched fields are empty strings rather than `None` so that every row in a
/// log file has the same columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleFields {
    pub part_number: String,
    pub revision: String,
    pub date_yymmdd: String,
    pub time_hhmmss: String,
    pub parts_counter: String,
    pub last_part_seconds: String,
}

/// One completed machining cycle, ready to be persisted.
///
/// Field order is the column order of every log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    #[serde(rename = "Machine")]
    pub machine: String,
    #[serde(rename = "Timestamp", with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "Part_Number")]
    pub part_number: String,
    #[serde(rename = "Revision")]
    pub revision: String,
    #[serde(rename = "Date_YYMMDD")]
    pub date_yymmdd: String,
    #[serde(rename = "Time_HHMMSS")]
    pub time_hhmmss: String,
    #[serde(rename = "Parts_Counter")]
    pub parts_counter: String,
    #[serde(rename = "Last_Part_Time_Seconds")]
    pub last_part_seconds: String,
    #[serde(rename = "Raw_Data")]
    pub raw: String,
}

impl CycleRecord {
    /// Builds a record stamped with the current local time, truncated to seconds.
    pub fn new(machine: &str, fields: CycleFields, raw: String) -> Self {
        Self::with_timestamp(machine, Local::now().naive_local().trunc_subsecs(0), fields, raw)
    }

    pub fn with_timestamp(
        machine: &str,
        timestamp: NaiveDateTime,
        fields: CycleFields,
        raw: String,
    ) -> Self {
        Self {
            machine: machine.to_string(),
            timestamp,
            part_number: fields.part_number,
            revision: fields.revision,
            date_yymmdd: fields.date_yymmdd,
            time_hhmmss: fields.time_hhmmss,
            parts_counter: fields.parts_counter,
            last_part_seconds: fields.last_part_seconds,
            raw,
        }
    }

    /// Part number, or `None` when the cycle did not report one.
    pub fn part(&self) -> Option<&str> {
        if self.part_number.is_empty() {
            None
        } else {
            Some(&self.part_number)
        }
    }
}

mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
