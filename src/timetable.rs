use anyhow::{bail, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::timetable::models::{Class, Date, HourSlot, Lesson, ParseIssue, Timetable};

pub mod models;

/// Class attribute of the timetable container, matched exactly.
const TABLE_MARKER: &str = "TTTable";
/// Class attribute of the class selector `<select>`, matched exactly.
const SELECT_MARKER: &str = "ClassesList";

// Markers on `<td>` class attributes, matched as substrings.
const DATE_MARKER: &str = "CTitle";
const HOUR_MARKER: &str = "CName";
const LESSON_MARKER: &str = "TTCell";

/// The portal renders six day columns per week.
const DAYS_PER_WEEK: u8 = 6;
/// Shortest text taken to be a teacher name inside a lesson entry.
const MIN_TEACHER_NAME_LEN: usize = 5;
/// Dates sit in the last five characters of the header text, as `DD-MM`.
const DATE_TAIL_LEN: usize = 5;

/// Extract the three schedule tables from a rendered timetable page.
///
/// Only the first `TTTable` container is scanned; its `<td>` cells are
/// visited in document order, which is what lines the three tables up:
/// header cells precede the lesson cells of their row, and lesson cells
/// rotate through the day columns as they are encountered. Cells whose
/// text cannot be read are skipped and reported in the issue list.
pub fn schedule(document: &Html) -> Result<(Timetable, Vec<ParseIssue>)> {
    let table_selector = Selector::parse(&format!("[class=\"{TABLE_MARKER}\"]")).unwrap();
    let Some(table) = document.select(&table_selector).next() else {
        bail!("no `{TABLE_MARKER}` container in the page; the portal layout may have changed");
    };

    let mut scan = Scan::new();
    let td_selector = Selector::parse("td").unwrap();
    for cell in table.select(&td_selector) {
        scan.cell(cell);
    }

    Ok((scan.timetable, scan.issues))
}

/// Extract the class selector the portal renders when asked for the
/// class-list page.
///
/// Options without text are fillers ("choose a class") and are skipped.
pub fn classes(document: &Html) -> Result<(Vec<Class>, Vec<ParseIssue>)> {
    let select_selector = Selector::parse(&format!("select[class=\"{SELECT_MARKER}\"]")).unwrap();
    let Some(select) = document.select(&select_selector).next() else {
        bail!("no `{SELECT_MARKER}` selector in the page; the portal layout may have changed");
    };

    let mut list = Vec::new();
    let mut issues = Vec::new();
    let option_selector = Selector::parse("option").unwrap();
    for (index, option) in select.select(&option_selector).enumerate() {
        let name = option.text().collect::<String>().trim().to_string();
        if name.is_empty() {
            continue;
        }
        let raw = option.value().attr("value").unwrap_or_default();
        let Ok(code) = raw.trim().parse::<i32>() else {
            issues.push(ParseIssue::new(
                format!("class option {}", index + 1),
                "class code",
                raw,
            ));
            continue;
        };
        list.push(Class {
            class_name: name,
            class_num: code,
        });
    }

    Ok((list, issues))
}

/// Walk state over the timetable's cells.
struct Scan {
    /// Day column of the next lesson cell, rotating through 1..=6
    day: u8,
    /// Period row currently being filled; -1 until a range is recorded
    row: i32,
    timetable: Timetable,
    issues: Vec<ParseIssue>,
    date_re: Regex,
    time_re: Regex,
}

impl Scan {
    fn new() -> Self {
        Self {
            day: 0,
            row: -1,
            timetable: Timetable::default(),
            issues: Vec::new(),
            // DD-MM and HH:MM; the separator is one arbitrary character
            date_re: Regex::new(r"^([0-9]{2}).([0-9]{2})$").unwrap(),
            time_re: Regex::new(r"^([0-9]{2}).([0-9]{2})").unwrap(),
        }
    }

    fn cell(&mut self, cell: ElementRef) {
        let Some(class) = cell.value().attr("class") else {
            return;
        };
        if class.contains(DATE_MARKER) {
            self.date_cell(cell);
        } else if class.contains(HOUR_MARKER) {
            self.hour_cell(cell);
        } else if class.contains(LESSON_MARKER) {
            self.lesson_cell(cell);
        }
    }

    /// `CTitle` cell: the last five characters of its text are `DD-MM`.
    fn date_cell(&mut self, cell: ElementRef) {
        let index = self.timetable.dates.len() as u32 + 1;
        let text = direct_text(&cell);

        let chars: Vec<char> = text.chars().collect();
        if chars.len() < DATE_TAIL_LEN {
            self.issues.push(ParseIssue::new(
                format!("date header {index}"),
                "date text",
                text,
            ));
            return;
        }
        let tail: String = chars[chars.len() - DATE_TAIL_LEN..].iter().collect();

        let parsed = self.date_re.captures(&tail).and_then(|caps| {
            match (caps[1].parse(), caps[2].parse()) {
                (Ok(day), Ok(month)) => Some(Date { day, month }),
                _ => None,
            }
        });
        match parsed {
            Some(date) => {
                self.timetable.dates.insert(index, date);
            }
            None => self.issues.push(ParseIssue::new(
                format!("date header {index}"),
                "date text",
                tail,
            )),
        }
    }

    /// `CName` cell: its leading element holds the period number as text
    /// plus two `<span>`s carrying the start and end times as `HH:MM`.
    ///
    /// Placeholder rows render an empty first span; those record nothing
    /// and raise no issue. Recording a new period advances the row index
    /// the following lesson cells are filed under.
    fn hour_cell(&mut self, cell: ElementRef) {
        let Some(head) = cell.children().find_map(ElementRef::wrap) else {
            self.issues.push(ParseIssue::new(
                "period header".to_string(),
                "header element",
                direct_text(&cell),
            ));
            return;
        };

        let mut period_text: Option<String> = None;
        let mut times: Vec<String> = Vec::new();
        for child in head.children() {
            if let Some(text) = child.value().as_text() {
                let text = text.trim();
                if period_text.is_none() && !text.is_empty() {
                    period_text = Some(text.to_string());
                }
            } else if let Some(span) = ElementRef::wrap(child) {
                if span.value().name() == "span" {
                    times.push(span.text().collect::<String>().trim().to_string());
                }
            }
        }

        let Some(period_text) = period_text else {
            self.issues.push(ParseIssue::new(
                "period header".to_string(),
                "period number",
                "",
            ));
            return;
        };
        let Ok(period) = period_text.parse::<u32>() else {
            self.issues.push(ParseIssue::new(
                "period header".to_string(),
                "period number",
                period_text,
            ));
            return;
        };

        let (start, end) = match times.as_slice() {
            // No spans, or a placeholder first span: nothing to record.
            [] => return,
            [start, ..] if start.len() <= 1 => return,
            [start] => {
                self.issues.push(ParseIssue::new(
                    format!("period header {period}"),
                    "end time",
                    start.clone(),
                ));
                return;
            }
            [start, end, ..] => (start, end),
        };

        let Some((hour_start, minute_start)) = time_of(&self.time_re, start) else {
            self.issues.push(ParseIssue::new(
                format!("period header {period}"),
                "start time",
                start.clone(),
            ));
            return;
        };
        let Some((hour_end, minute_end)) = time_of(&self.time_re, end) else {
            self.issues.push(ParseIssue::new(
                format!("period header {period}"),
                "end time",
                end.clone(),
            ));
            return;
        };

        let slot = HourSlot {
            hour_start,
            minute_start,
            hour_end,
            minute_end,
        };
        if self.timetable.hours.insert(period, slot).is_none() {
            self.row += 1;
        }
    }

    /// `TTCell` cell: one `<div>` per parallel lesson option.
    ///
    /// The cell advances the day column even when it holds no lesson:
    /// day identity is positional, derived from cell encounter order.
    fn lesson_cell(&mut self, cell: ElementRef) {
        self.day = self.day % DAYS_PER_WEEK + 1;

        for entry in cell.children().filter_map(ElementRef::wrap) {
            if entry.value().name() != "div" {
                continue;
            }

            let mut lesson_name = String::new();
            let mut teacher = String::new();
            let mut location = String::new();
            for part in entry.children() {
                if let Some(text) = part.value().as_text() {
                    let text = text.trim();
                    if text.contains('(') {
                        // Only the location carries parentheses.
                        location = text.to_string();
                    } else if text.len() >= MIN_TEACHER_NAME_LEN {
                        // The markup has no tag for the teacher; anything
                        // long enough that is not a location is taken as one.
                        teacher = text.to_string();
                    }
                } else if let Some(el) = ElementRef::wrap(part) {
                    if el.value().name() == "b" {
                        lesson_name = el.text().collect::<String>().trim().to_string();
                    }
                }
            }

            let lesson = Lesson {
                hour: self.row,
                lesson_name,
                teacher,
                location,
            };
            self.timetable
                .lessons
                .entry(self.day)
                .or_default()
                .entry(self.row)
                .or_default()
                .push(lesson);
        }
    }
}

/// Text sitting directly under an element, child elements excluded.
fn direct_text(el: &ElementRef) -> String {
    el.children()
        .filter_map(|node| node.value().as_text().map(|text| &**text))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Read `HH:MM` positionally: two digits, one separator, two digits.
fn time_of(re: &Regex, raw: &str) -> Option<(u32, u32)> {
    let caps = re.captures(raw)?;
    match (caps[1].parse(), caps[2].parse()) {
        (Ok(hour), Ok(minute)) => Some((hour, minute)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> Html {
        Html::parse_document(&format!("<html><body>{body}</body></html>"))
    }

    fn table(rows: &str) -> Html {
        page(&format!("<table class=\"TTTable\">{rows}</table>"))
    }

    const HOUR_ONE: &str =
        "<td class=\"CName\"><b>1<span>08:00</span><span>08:45</span></b></td>";

    #[test]
    fn dates_are_indexed_in_document_order() {
        let html = table(concat!(
            "<tr><td class=\"CTitle\">יום א 17-11</td>",
            "<td class=\"CTitle CSelected\">יום ב 18-11</td></tr>",
        ));
        let (timetable, issues) = schedule(&html).unwrap();
        assert!(issues.is_empty());
        assert_eq!(timetable.dates.len(), 2);
        assert_eq!(timetable.dates[&1], Date { day: 17, month: 11 });
        assert_eq!(timetable.dates[&2], Date { day: 18, month: 11 });
    }

    #[test]
    fn hour_header_yields_period_and_range() {
        let html = table(
            "<tr><td class=\"CName\"><b>3<span>09:15</span><span>10:00</span></b></td></tr>",
        );
        let (timetable, issues) = schedule(&html).unwrap();
        assert!(issues.is_empty());
        assert_eq!(
            timetable.hours[&3],
            HourSlot {
                hour_start: 9,
                minute_start: 15,
                hour_end: 10,
                minute_end: 0,
            }
        );
    }

    #[test]
    fn placeholder_hour_header_records_nothing() {
        let html = table("<tr><td class=\"CName\"><b>4<span></span><span></span></b></td></tr>");
        let (timetable, issues) = schedule(&html).unwrap();
        assert!(timetable.hours.is_empty());
        assert!(issues.is_empty());
    }

    #[test]
    fn lesson_cell_classifies_name_teacher_and_location() {
        let html = table(&format!(
            "<tr>{HOUR_ONE}<td class=\"TTCell\"><div><b>Math</b><br>Svetlana<br>(24-0-9)</div></td></tr>",
        ));
        let (timetable, issues) = schedule(&html).unwrap();
        assert!(issues.is_empty());
        assert_eq!(
            timetable.lessons[&1][&0],
            vec![Lesson {
                hour: 0,
                lesson_name: "Math".to_string(),
                teacher: "Svetlana".to_string(),
                location: "(24-0-9)".to_string(),
            }]
        );
    }

    #[test]
    fn parallel_lessons_keep_document_order() {
        let html = table(&format!(
            concat!(
                "<tr>{}<td class=\"TTCell\">",
                "<div><b>מתמטיקה</b><br>סבטלנה לוי<br>(24-0-9)</div>",
                "<div><b>מתמטיקה</b><br>ברלין שרה<br>(24-0-10)</div>",
                "</td></tr>",
            ),
            HOUR_ONE,
        ));
        let (timetable, _) = schedule(&html).unwrap();
        let cell = &timetable.lessons[&1][&0];
        assert_eq!(cell.len(), 2);
        assert_eq!(cell[0].location, "(24-0-9)");
        assert_eq!(cell[1].location, "(24-0-10)");
    }

    #[test]
    fn short_teacher_text_is_dropped_by_the_length_heuristic() {
        let html = table(&format!(
            "<tr>{HOUR_ONE}<td class=\"TTCell\"><div><b>Math</b><br>Dana<br>(24-0-9)</div></td></tr>",
        ));
        let (timetable, _) = schedule(&html).unwrap();
        assert_eq!(timetable.lessons[&1][&0][0].teacher, "");
    }

    #[test]
    fn day_column_rotates_with_wraparound() {
        let cell = "<td class=\"TTCell\"><div><b>x</b></div></td>".repeat(7);
        let html = table(&format!("<tr>{HOUR_ONE}{cell}</tr>"));
        let (timetable, _) = schedule(&html).unwrap();

        let days: Vec<u8> = timetable.lessons.keys().copied().collect();
        assert_eq!(days, vec![1, 2, 3, 4, 5, 6]);
        // The seventh cell wraps back onto day 1.
        assert_eq!(timetable.lessons[&1][&0].len(), 2);
        assert_eq!(timetable.lessons[&2][&0].len(), 1);
    }

    #[test]
    fn empty_lesson_cells_still_advance_the_day() {
        let html = table(&format!(
            concat!(
                "<tr>{}<td class=\"TTCell\">&nbsp;</td>",
                "<td class=\"TTCell\"><div><b>Math</b></div></td></tr>",
            ),
            HOUR_ONE,
        ));
        let (timetable, _) = schedule(&html).unwrap();
        assert!(!timetable.lessons.contains_key(&1));
        assert_eq!(timetable.lessons[&2][&0].len(), 1);
    }

    #[test]
    fn lesson_before_any_period_header_lands_on_row_minus_one() {
        let html = table("<tr><td class=\"TTCell\"><div><b>x</b></div></td></tr>");
        let (timetable, _) = schedule(&html).unwrap();
        assert!(timetable.lessons[&1].contains_key(&-1));
    }

    #[test]
    fn unreadable_date_text_is_reported_not_zeroed() {
        let html = table("<tr><td class=\"CTitle\">חופשה</td></tr>");
        let (timetable, issues) = schedule(&html).unwrap();
        assert!(timetable.dates.is_empty());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "date text");
        assert_eq!(issues[0].cell, "date header 1");
    }

    #[test]
    fn unreadable_period_number_is_reported() {
        let html = table(
            "<tr><td class=\"CName\"><b>x<span>08:00</span><span>08:45</span></b></td></tr>",
        );
        let (timetable, issues) = schedule(&html).unwrap();
        assert!(timetable.hours.is_empty());
        assert_eq!(issues[0].field, "period number");
        assert_eq!(issues[0].raw, "x");
    }

    #[test]
    fn missing_container_is_an_error() {
        let err = schedule(&page("<p>maintenance</p>")).unwrap_err();
        assert!(err.to_string().contains("TTTable"));
    }

    #[test]
    fn container_class_must_match_exactly() {
        let html = page("<table class=\"TTTableOld\"><tr><td class=\"CTitle\">א 17-11</td></tr></table>");
        assert!(schedule(&html).is_err());
    }

    #[test]
    fn class_options_without_text_are_skipped() {
        let html = page(concat!(
            "<select class=\"ClassesList\" name=\"dnn$ctr30329$TimeTableView$ClassesList\">",
            "<option value=\"0\" selected=\"selected\"></option>",
            "<option value=\"42\">8-3</option>",
            "</select>",
        ));
        let (list, issues) = classes(&html).unwrap();
        assert!(issues.is_empty());
        assert_eq!(
            list,
            vec![Class {
                class_name: "8-3".to_string(),
                class_num: 42,
            }]
        );
    }

    #[test]
    fn class_option_with_unreadable_value_is_reported() {
        let html = page(concat!(
            "<select class=\"ClassesList\">",
            "<option value=\"abc\">ז1</option>",
            "<option value=\"9\">ז2</option>",
            "</select>",
        ));
        let (list, issues) = classes(&html).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].class_num, 9);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "class code");
    }

    #[test]
    fn missing_selector_is_an_error() {
        let err = classes(&page("<p>no dropdown here</p>")).unwrap_err();
        assert!(err.to_string().contains("ClassesList"));
    }

    #[test]
    fn fixture_page_parses_all_three_tables() {
        let html = Html::parse_document(include_str!("test_assets/schedule.html"));
        let (timetable, issues) = schedule(&html).unwrap();
        assert!(issues.is_empty());
        assert_eq!(timetable.dates.len(), 2);
        assert_eq!(timetable.hours.len(), 2);
        assert!(!timetable.lessons.is_empty());
    }

    #[test]
    fn fixture_classes_page_lists_the_dropdown() {
        let html = Html::parse_document(include_str!("test_assets/classes.html"));
        let (list, issues) = classes(&html).unwrap();
        assert!(issues.is_empty());
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].class_name, "ז1");
        assert_eq!(list[0].class_num, 9);
    }

    #[test]
    fn wire_json_round_trips() {
        let html = Html::parse_document(include_str!("test_assets/schedule.html"));
        let (timetable, _) = schedule(&html).unwrap();
        let json = serde_json::to_string(&timetable).unwrap();
        let back: Timetable = serde_json::from_str(&json).unwrap();
        assert_eq!(timetable, back);
    }

    #[test]
    fn wire_json_has_the_fixed_shape() {
        let html = Html::parse_document(include_str!("test_assets/schedule.html"));
        let (timetable, _) = schedule(&html).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&timetable).unwrap()).unwrap();

        assert_eq!(value["Dates"]["1"]["day"], 18);
        assert_eq!(value["Dates"]["1"]["month"], 11);
        assert_eq!(value["Hours"]["1"]["hourStart"], 8);
        let lesson = &value["Lessons"]["1"]["0"][0];
        assert_eq!(lesson["lessonName"], "מתמטיקה");
        assert_eq!(lesson["teacher"], "סבטלנה לוי");
        assert_eq!(lesson["location"], "(24-0-9)");
        assert_eq!(lesson["hour"], 0);
    }
}
