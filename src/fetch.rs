//! Postback construction and page download for the Shahaf portal.
//!
//! The portal is an ASP.NET page: rendering a timetable goes through the
//! site's own postback protocol, so every request replays the full set of
//! hidden form fields alongside the class selection.

use std::time::Duration;

use anyhow::{Context, Result};
use log::warn;
use reqwest::multipart::Form;
use reqwest::{Client, Url};

/// Posting this class code makes the portal render the class selector
/// instead of a timetable.
pub const CLASS_LIST_SENTINEL: i32 = 0;

const EVENT_TARGET: &str = "dnn$ctr30329$TimeTableView$btnTimeTable";
const CLASSES_LIST_FIELD: &str = "dnn$ctr30329$TimeTableView$ClassesList";
const WEEK_SHIFT_FIELD: &str = "dnn$ctr30329$TimeTableView$MainControl$WeekShift";
const CONTROL_ID_FIELD: &str = "dnn$ctr30329$TimeTableView$ControlId";

/// Only the current week is ever requested.
const WEEK_SHIFT: &str = "0";
const CONTROL_ID: &str = "8";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;

/// Supplies the `__VIEWSTATE` blob replayed on every postback.
///
/// The default provider replays a token captured from a live browser
/// session. Such tokens eventually expire; a future provider can fetch a
/// fresh one from the portal's landing page without touching the extractor.
pub trait SessionProvider {
    fn view_state(&self) -> &str;
}

/// The token captured from a real browser session.
pub struct CapturedSession;

impl SessionProvider for CapturedSession {
    fn view_state(&self) -> &str {
        include_str!("viewstate.b64")
    }
}

/// Fetch the portal page for a class with the default captured session.
pub async fn timetable_page(url: &str, class_code: i32) -> Result<String> {
    fetch_with(&CapturedSession, url, class_code).await
}

/// Fetch the portal page for a class, retrying transient transport
/// failures with bounded attempts.
///
/// The URL must be absolute; it is validated before any network activity.
pub async fn fetch_with(
    session: &dyn SessionProvider,
    url: &str,
    class_code: i32,
) -> Result<String> {
    let url = Url::parse(url).with_context(|| format!("invalid portal URL {url:?}"))?;

    let client = Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        // Multipart bodies are consumed by the request; build a fresh one
        // per attempt.
        let form = postback_form(session, class_code);
        match post_once(&client, url.clone(), form).await {
            Ok(body) => return Ok(body),
            Err(e) if attempt < MAX_ATTEMPTS => {
                warn!("attempt {attempt}/{MAX_ATTEMPTS} against {url} failed: {e}");
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("portal at {url} did not answer after {MAX_ATTEMPTS} attempts")
                });
            }
        }
    }
}

/// Multipart body for the timetable postback. Field order is irrelevant to
/// the server; the full set is mandatory.
fn postback_form(session: &dyn SessionProvider, class_code: i32) -> Form {
    Form::new()
        .text("__EVENTTARGET", EVENT_TARGET)
        .text("__VIEWSTATE", session.view_state().to_owned())
        .text(CLASSES_LIST_FIELD, class_code.to_string())
        .text(WEEK_SHIFT_FIELD, WEEK_SHIFT)
        .text(CONTROL_ID_FIELD, CONTROL_ID)
}

async fn post_once(client: &Client, url: Url, form: Form) -> reqwest::Result<String> {
    client
        .post(url)
        .multipart(form)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}
