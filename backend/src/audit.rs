use reqwest::Client;
use serde::Serialize;
use shared::{Category, Entry};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

const ANONYMOUS_EMAIL: &str = "anonymous";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub title: String,
    pub author: String,
    pub location: String,
    pub category: Category,
    pub url: String,
    pub user_email: String,
    pub timestamp: String,
}

impl SubmissionRecord {
    pub fn new(entry: &Entry, email: Option<&str>) -> Self {
        Self {
            title: entry.title.clone(),
            author: entry.author.clone(),
            location: entry.location.clone(),
            category: entry.category,
            url: entry.url.clone(),
            user_email: email.unwrap_or(ANONYMOUS_EMAIL).to_string(),
            timestamp: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }
    }
}

/// Optional secondary copy of each submission (e.g. a spreadsheet webhook).
/// Delivery never affects the submission itself.
#[derive(Clone)]
pub struct AuditSink {
    client: Client,
    webhook: Option<String>,
}

impl AuditSink {
    pub fn new(webhook: Option<String>) -> Self {
        Self { client: Client::new(), webhook }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook.is_some()
    }

    pub fn record(&self, record: SubmissionRecord) {
        let Some(webhook) = self.webhook.clone() else { return };
        let client = self.client.clone();

        tokio::spawn(async move {
            match client.post(&webhook).json(&record).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Audit copy delivered for {:?}", record.title);
                }
                Ok(response) => warn!("Audit webhook answered {}", response.status()),
                Err(e) => warn!("Error sending audit copy: {}", e),
            }
        });
    }
}
