//! Prometheus text exposition for per-account results
//!
//! Three gauge families, each in its own buffer seeded with HELP/TYPE lines:
//!
//! - `dockerhub_ratelimit_current`: pull limit of the window
//! - `dockerhub_ratelimit_remaining`: pulls left in the window
//! - `dockerhub_ratelimit_scrape_error`: 1 when the account could not be checked
//!
//! Accounts without configured limits emit no lines at all, which keeps "no
//! limit applies" distinct from "limit unknown".

use std::borrow::Cow;

use dockerhub_client::display_name;

use crate::result::RateLimitResult;
use crate::snapshot::MetricsSnapshot;

pub const CURRENT_METRIC: &str = "dockerhub_ratelimit_current";
pub const REMAINING_METRIC: &str = "dockerhub_ratelimit_remaining";
pub const SCRAPE_ERROR_METRIC: &str = "dockerhub_ratelimit_scrape_error";

const CURRENT_HELP: &str =
    "Current max limit for DockerHub account (or for ip address if anonymous access)";
const REMAINING_HELP: &str =
    "Remaining limit for DockerHub account (or for ip address if anonymous access)";
const SCRAPE_ERROR_HELP: &str = "Scrape errors (wrong status code or something else)";

/// Build the label set for one account.
///
/// `source_ip` is only rendered when `put_source_ip` is set; otherwise the
/// label is present with an empty value, which Prometheus treats as absent.
pub fn configure_labels_set(account_id: &str, source_ip: Option<&str>, put_source_ip: bool) -> String {
    let source_ip = match source_ip {
        Some(ip) if put_source_ip => ip,
        _ => "",
    };
    format!(
        "dockerhub_user=\"{}\",source_ip=\"{}\"",
        escape_label_value(display_name(account_id)),
        escape_label_value(source_ip)
    )
}

/// Escape a label value: backslash, double quote and line feed.
fn escape_label_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '"', '\n']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

fn preamble(name: &str, help: &str) -> String {
    format!("# HELP {name} {help}\n# TYPE {name} gauge\n")
}

/// Accumulates one refresh pass. Built fresh every cycle.
pub struct MetricsRenderer {
    current: String,
    remaining: String,
    scrape_error: String,
    put_source_ip: bool,
    accounts: usize,
}

impl MetricsRenderer {
    pub fn new(put_source_ip: bool) -> Self {
        Self {
            current: preamble(CURRENT_METRIC, CURRENT_HELP),
            remaining: preamble(REMAINING_METRIC, REMAINING_HELP),
            scrape_error: preamble(SCRAPE_ERROR_METRIC, SCRAPE_ERROR_HELP),
            put_source_ip,
            accounts: 0,
        }
    }

    /// Append the lines for one account's result.
    pub fn record(&mut self, account_id: &str, result: &RateLimitResult) {
        self.accounts += 1;
        match result {
            RateLimitResult::Success {
                limit,
                remaining,
                source_ip,
            } => {
                let labels =
                    configure_labels_set(account_id, source_ip.as_deref(), self.put_source_ip);
                self.current
                    .push_str(&format!("{CURRENT_METRIC}{{{labels}}} {limit}\n"));
                self.remaining
                    .push_str(&format!("{REMAINING_METRIC}{{{labels}}} {remaining}\n"));
                self.scrape_error
                    .push_str(&format!("{SCRAPE_ERROR_METRIC}{{{labels}}} 0\n"));
            }
            RateLimitResult::NoLimitsConfigured => {}
            RateLimitResult::ScrapeError(_) => {
                let labels = configure_labels_set(account_id, None, self.put_source_ip);
                self.scrape_error
                    .push_str(&format!("{SCRAPE_ERROR_METRIC}{{{labels}}} 1\n"));
            }
        }
    }

    /// Concatenate current, remaining and scrape_error into a snapshot.
    pub fn finish(self) -> MetricsSnapshot {
        let mut text =
            String::with_capacity(self.current.len() + self.remaining.len() + self.scrape_error.len());
        text.push_str(&self.current);
        text.push_str(&self.remaining);
        text.push_str(&self.scrape_error);
        MetricsSnapshot::new(text, self.accounts)
    }
}

/// Render a full pass from `(account_id, result)` pairs in order.
pub fn render<'a, I>(results: I, put_source_ip: bool) -> MetricsSnapshot
where
    I: IntoIterator<Item = (&'a str, &'a RateLimitResult)>,
{
    let mut renderer = MetricsRenderer::new(put_source_ip);
    for (account_id, result) in results {
        renderer.record(account_id, result);
    }
    renderer.finish()
}
