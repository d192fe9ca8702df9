//! Availability poller for the reservation schedule endpoint

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::config::TargetConfig;
use crate::io::HttpClient;
use crate::session::USER_AGENT;

/// Schedule endpoint response. The list is absent when nothing is bookable.
#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(rename = "scheduleList", default)]
    schedule_list: Option<Vec<ScheduleEntry>>,
}

#[derive(Debug, Deserialize)]
struct ScheduleEntry {
    #[serde(default)]
    meddate: Option<String>,
}

/// Outcome of one polling cycle
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    /// Bookable dates found this cycle, sorted and deduplicated
    pub found: BTreeSet<NaiveDate>,
    /// Months whose query failed at the network level and were skipped
    pub skipped_months: Vec<u32>,
}

/// Render a date the way the portal displays it, e.g. "2025년 07월 15일"
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%Y년 %m월 %d일").to_string()
}

fn date_lines(dates: &BTreeSet<NaiveDate>) -> String {
    dates
        .iter()
        .map(|date| format!("  - {}", format_date(date)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Plain-text rendering for the console log
pub fn console_message(dates: &BTreeSet<NaiveDate>, booking_url: &str) -> String {
    format!(
        "Found bookable reservation dates:\n{}\nBook now: {}",
        date_lines(dates),
        booking_url
    )
}

/// Markdown rendering for the messaging channel
pub fn markdown_message(dates: &BTreeSet<NaiveDate>, booking_url: &str) -> String {
    format!(
        "🎉 *예약 가능한 날짜가 나왔습니다!*\n\n{}\n\n[지금 바로 예약하기]({})",
        date_lines(dates),
        booking_url
    )
}

/// Client for the per-month schedule availability endpoint
pub struct AvailabilityClient {
    target: TargetConfig,
    request_pause: Duration,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for AvailabilityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityClient")
            .field("endpoint_url", &self.target.endpoint_url)
            .field("dept_cd", &self.target.dept_cd)
            .field("dr_cd", &self.target.dr_cd)
            .finish()
    }
}

impl AvailabilityClient {
    pub fn new(target: &TargetConfig, request_pause: Duration, http: Arc<dyn HttpClient>) -> Self {
        Self {
            target: target.clone(),
            request_pause,
            http,
        }
    }

    /// Query every configured month once. Network failures skip the month;
    /// a response that is not JSON means the portal served its login page
    /// instead, so the session is expired and the cycle is aborted.
    pub async fn poll(&self, session_cookie: &str) -> crate::Result<PollReport> {
        let mut report = PollReport::default();

        for (index, &month) in self.target.months.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.request_pause).await;
            }

            let url = format!(
                "{}?dept_cd={}&dr_cd={}&nextDt={}{:02}01",
                self.target.endpoint_url, self.target.dept_cd, self.target.dr_cd,
                self.target.year, month
            );
            let headers = [
                ("Cookie", session_cookie),
                ("Referer", self.target.referer.as_str()),
                ("User-Agent", USER_AGENT),
                ("X-Requested-With", "XMLHttpRequest"),
            ];

            let response = match self.http.get(&url, &headers).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Query for month {} failed: {}", month, e);
                    report.skipped_months.push(month);
                    continue;
                }
            };

            if response.status != 200 {
                tracing::warn!(
                    "Query for month {} returned status {}",
                    month,
                    response.status
                );
                report.skipped_months.push(month);
                continue;
            }

            let parsed: ScheduleResponse = match serde_json::from_str(&response.body) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(
                        "Response for month {} is not JSON ({}); session expired",
                        month,
                        e
                    );
                    return Err(crate::SlotwatchError::SessionExpired);
                }
            };

            for entry in parsed.schedule_list.unwrap_or_default() {
                let Some(meddate) = entry.meddate else {
                    continue;
                };
                match NaiveDate::parse_from_str(&meddate, "%Y%m%d") {
                    // The endpoint may return adjacent-month entries around
                    // the nextDt anchor; keep only the queried month.
                    Ok(date) if date.month() == month => {
                        report.found.insert(date);
                    }
                    Ok(date) => {
                        tracing::debug!("Ignoring out-of-month date {} for month {}", date, month);
                    }
                    Err(e) => {
                        tracing::debug!("Unparseable meddate '{}': {}", meddate, e);
                    }
                }
            }
        }

        Ok(report)
    }
}
