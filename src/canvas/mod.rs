pub mod dto;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::CanvasConfig;
use crate::error::AppError;
use crate::models::SourceRecord;
use crate::sync::{RetryPolicy, Retryable, retry, retry_after_header};

/// Upstream listing capability consumed by the reconciliation engine.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Full, ordered listing of active records. Malformed items are dropped;
    /// anything that prevents a complete listing is `SourceUnavailable`.
    async fn list_active_records(&self) -> Result<Vec<SourceRecord>, AppError>;
}

pub struct CanvasHttpClient {
    client: Client,
    config: CanvasConfig,
    retry: RetryPolicy,
}

/// Outcome of one failed page request.
#[derive(Debug)]
enum PageError {
    /// Throttling, 5xx or a transport failure; worth repeating.
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },
    Rejected(String),
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageError::Transient { message, .. } | PageError::Rejected(message) => {
                f.write_str(message)
            }
        }
    }
}

impl Retryable for PageError {
    fn is_retryable(&self) -> bool {
        matches!(self, PageError::Transient { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            PageError::Transient { retry_after, .. } => *retry_after,
            PageError::Rejected(_) => None,
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

impl CanvasHttpClient {
    pub fn new(config: CanvasConfig, timeout: Duration, retry: RetryPolicy) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    /// Fetches one page and the `rel="next"` link that follows it.
    async fn get_page(&self, url: &str) -> Result<(Value, Option<String>), PageError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| PageError::Transient {
                message: format!("Canvas request failed: {}", e),
                retry_after: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_header(response.headers());
            let body = response.text().await.unwrap_or_default();
            let message = format!("Canvas API error {}: {}", status, body);
            return Err(if is_transient_status(status) {
                PageError::Transient {
                    message,
                    retry_after,
                }
            } else {
                PageError::Rejected(message)
            });
        }

        let next = next_link(response.headers());
        let page: Value = response.json().await.map_err(|e| {
            PageError::Rejected(format!("Failed to parse Canvas response: {}", e))
        })?;
        Ok((page, next))
    }

    /// Follows `Link: <...>; rel="next"` until the last page. Each page is
    /// retried on its own; a page that still fails makes the listing unavailable.
    async fn get_paginated(&self, first_url: String) -> Result<Vec<Value>, AppError> {
        let mut items = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next {
            let page_url = url.as_str();
            let (page, next_url) = retry(&self.retry, page_url, move || self.get_page(page_url))
                .await
                .map_err(|e| AppError::SourceUnavailable(e.to_string()))?;

            match page {
                Value::Array(values) => items.extend(values),
                other => items.push(other),
            }
            next = next_url;
        }

        Ok(items)
    }

    pub async fn fetch_active_courses(&self) -> Result<Vec<dto::Course>, AppError> {
        let url = format!(
            "{}/api/v1/courses?enrollment_state=active&per_page=100",
            self.config.base_url
        );
        let mut courses = Vec::new();

        for value in self.get_paginated(url).await? {
            match serde_json::from_value::<dto::Course>(value) {
                Ok(course) if course.id > 0 => courses.push(course),
                Ok(course) => warn!("Skipping malformed course: non-positive id {}", course.id),
                Err(e) => warn!("Skipping malformed course data: {}", e),
            }
        }

        info!("Found {} active courses", courses.len());
        Ok(courses)
    }

    async fn fetch_assignments(&self, course: &dto::Course) -> Result<Vec<SourceRecord>, AppError> {
        let url = format!(
            "{}/api/v1/courses/{}/assignments?include[]=submission&per_page=100",
            self.config.base_url, course.id
        );
        let mut records = Vec::new();

        for value in self.get_paginated(url).await? {
            match parse_assignment(course, value) {
                Ok(Some(record)) => {
                    debug!(
                        "Found assignment: {} (submitted: {})",
                        record.title, record.completed
                    );
                    records.push(record);
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping assignment: {}", e),
            }
        }

        info!("Found {} assignments in {}", records.len(), course.display_name());
        Ok(records)
    }
}

#[async_trait]
impl SourceReader for CanvasHttpClient {
    async fn list_active_records(&self) -> Result<Vec<SourceRecord>, AppError> {
        let mut records = Vec::new();
        for course in self.fetch_active_courses().await? {
            records.extend(self.fetch_assignments(&course).await?);
        }
        info!("Total assignments across all courses: {}", records.len());
        Ok(records)
    }
}

/// Parses one assignment of `course`. `Ok(None)` for unpublished assignments.
pub fn parse_assignment(course: &dto::Course, value: Value) -> Result<Option<SourceRecord>, AppError> {
    let raw_id = value.get("id").cloned().unwrap_or(Value::Null);
    let assignment: dto::Assignment = serde_json::from_value(value)
        .map_err(|e| AppError::malformed(format!("{}:{}", course.id, raw_id), e.to_string()))?;
    let key = format!("{}:{}", course.id, assignment.id);

    if assignment.id <= 0 {
        return Err(AppError::malformed(key, "assignment id must be positive"));
    }
    if !assignment.published {
        debug!("Skipping unpublished assignment {}", key);
        return Ok(None);
    }

    let due_at = assignment
        .due_at
        .as_deref()
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| AppError::malformed(&key, format!("invalid due_at {}: {}", raw, e)))
        })
        .transpose()?;

    Ok(Some(SourceRecord {
        id: assignment.id,
        parent_id: course.id,
        parent_name: course.display_name().to_string(),
        title: assignment
            .name
            .unwrap_or_else(|| "Untitled Assignment".to_string()),
        due_at,
        html_url: assignment.html_url.filter(|u| !u.is_empty()),
        completed: assignment
            .submission
            .as_ref()
            .is_some_and(dto::Submission::is_submitted),
    }))
}

fn next_link(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(LINK)?.to_str().ok()?;
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let url = parts.next()?.trim().trim_start_matches('<').trim_end_matches('>');
        parts
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| url.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn course() -> dto::Course {
        dto::Course {
            id: 12345,
            name: Some("CS101".to_string()),
            course_code: None,
        }
    }

    #[test]
    fn test_parse_submitted_assignment() {
        let value = json!({
            "id": 67890,
            "name": "Homework 1",
            "due_at": "2026-01-20T23:59:00Z",
            "html_url": "https://canvas.example.com/courses/12345/assignments/67890",
            "published": true,
            "submission": { "submitted_at": null, "workflow_state": "graded" }
        });

        let record = parse_assignment(&course(), value).unwrap().unwrap();
        assert_eq!(record.parent_id, 12345);
        assert_eq!(record.id, 67890);
        assert!(record.completed);
        assert_eq!(record.display_title(), "[CS101] Homework 1");
        assert_eq!(record.due_date(), NaiveDate::from_ymd_opt(2026, 1, 20));
    }

    #[test]
    fn test_parse_without_submission_is_not_completed() {
        let value = json!({ "id": 1, "name": "Quiz" });
        let record = parse_assignment(&course(), value).unwrap().unwrap();
        assert!(!record.completed);
        assert_eq!(record.due_at, None);
        assert_eq!(record.html_url, None);
    }

    #[test]
    fn test_unpublished_is_skipped() {
        let value = json!({ "id": 1, "name": "Draft", "published": false });
        assert!(parse_assignment(&course(), value).unwrap().is_none());
    }

    #[test]
    fn test_malformed_assignments() {
        let bad_id = parse_assignment(&course(), json!({ "id": 0, "name": "x" }));
        assert!(matches!(bad_id, Err(AppError::MalformedRecord { .. })));

        let bad_due = parse_assignment(&course(), json!({ "id": 2, "due_at": "tomorrow" }));
        assert!(matches!(bad_due, Err(AppError::MalformedRecord { .. })));

        let missing_id = parse_assignment(&course(), json!({ "name": "no id" }));
        assert!(matches!(missing_id, Err(AppError::MalformedRecord { .. })));
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_next_link() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                r#"<https://c.example.com/api/v1/courses?page=1>; rel="current", <https://c.example.com/api/v1/courses?page=2>; rel="next", <https://c.example.com/api/v1/courses?page=3>; rel="last""#,
            ),
        );
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("https://c.example.com/api/v1/courses?page=2")
        );

        headers.insert(
            LINK,
            HeaderValue::from_static(r#"<https://c.example.com/x?page=3>; rel="last""#),
        );
        assert_eq!(next_link(&headers), None);
    }
}
