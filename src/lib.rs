//! Fetches a class's weekly timetable from the Shahaf school portal and
//! turns it into JSON, or lists the classes the portal exposes.

use anyhow::Result;
use log::warn;
use scraper::Html;

use crate::timetable::models::ParseIssue;

pub mod fetch;
pub mod ffi;
pub mod timetable;

pub use crate::timetable::models::{Class, Date, HourSlot, Lesson, Timetable};

/// Fetch a class's timetable and serialize it to the wire JSON shape.
pub async fn timetable_json(url: &str, class_code: i32) -> Result<String> {
    let page = fetch::timetable_page(url, class_code).await?;
    let document = Html::parse_document(&page);
    let (timetable, issues) = timetable::schedule(&document)?;
    report(&issues);
    Ok(serde_json::to_string(&timetable)?)
}

/// Fetch the portal's class selector and serialize it as a JSON array.
pub async fn classes_json(url: &str) -> Result<String> {
    let page = fetch::timetable_page(url, fetch::CLASS_LIST_SENTINEL).await?;
    let document = Html::parse_document(&page);
    let (classes, issues) = timetable::classes(&document)?;
    report(&issues);
    Ok(serde_json::to_string(&classes)?)
}

fn report(issues: &[ParseIssue]) {
    for issue in issues {
        warn!("{issue}");
    }
}
