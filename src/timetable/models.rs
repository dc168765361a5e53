use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One class's schedule for one week, in the wire shape consumers expect.
///
/// All three tables are keyed by integers; `serde_json` writes the keys as
/// strings. `BTreeMap` keeps the key order deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timetable {
    /// Day column -> period row -> parallel lesson options, in document order
    #[serde(rename = "Lessons")]
    pub lessons: BTreeMap<u8, BTreeMap<i32, Vec<Lesson>>>,

    /// Date of each day column, keyed 1.. in encounter order
    #[serde(rename = "Dates")]
    pub dates: BTreeMap<u32, Date>,

    /// Time range of each period, keyed by the printed period number
    #[serde(rename = "Hours")]
    pub hours: BTreeMap<u32, HourSlot>,
}

/// Calendar date of a day column, as printed in its header cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Date {
    pub day: u32,
    pub month: u32,
}

/// Start and end time of a teaching period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourSlot {
    pub hour_start: u32,
    pub minute_start: u32,
    pub hour_end: u32,
    pub minute_end: u32,
}

/// One lesson option inside a day/period cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    /// 0-based row of the period the lesson belongs to; -1 if the cell
    /// appeared before any period header
    pub hour: i32,

    pub lesson_name: String,
    pub teacher: String,
    pub location: String,
}

/// Entry of the portal's class selector dropdown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub class_name: String,
    pub class_num: i32,
}

/// A cell whose text could not be read. The cell is skipped and the issue
/// reported; the rest of the page still parses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseIssue {
    /// Which cell failed, e.g. "date header 3"
    pub cell: String,
    /// The field that could not be read
    pub field: &'static str,
    /// Raw text found in the markup
    pub raw: String,
}

impl ParseIssue {
    pub(crate) fn new(cell: String, field: &'static str, raw: impl Into<String>) -> Self {
        Self {
            cell,
            field,
            raw: raw.into(),
        }
    }
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: cannot read {} from {:?}", self.cell, self.field, self.raw)
    }
}
