use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSubject {
    General,
    Bug,
    Feature,
    Content,
    Other,
}

impl FeedbackSubject {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackSubject::General => "general",
            FeedbackSubject::Bug => "bug",
            FeedbackSubject::Feature => "feature",
            FeedbackSubject::Content => "content",
            FeedbackSubject::Other => "other",
        }
    }
}

impl fmt::Display for FeedbackSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackSubject {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(FeedbackSubject::General),
            "bug" => Ok(FeedbackSubject::Bug),
            "feature" => Ok(FeedbackSubject::Feature),
            "content" => Ok(FeedbackSubject::Content),
            "other" => Ok(FeedbackSubject::Other),
            other => Err(Error::Validation(format!("Unknown feedback subject: {}", other))),
        }
    }
}

/// A visitor's message to the editors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub name: String,
    pub email: String,
    pub subject: FeedbackSubject,
    pub message: String,
    pub rating: u8,
}

impl Feedback {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        subject: FeedbackSubject,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            subject,
            message: message.into(),
            rating: 5,
        }
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = rating;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("name is required".to_string()));
        }
        if !EMAIL_RE.is_match(self.email.trim()) {
            return Err(Error::Validation(format!("invalid email address: {}", self.email)));
        }
        if self.message.trim().is_empty() {
            return Err(Error::Validation("message is required".to_string()));
        }
        if !(1..=5).contains(&self.rating) {
            return Err(Error::Validation("rating must be between 1 and 5".to_string()));
        }
        Ok(())
    }

    fn form_fields(&self, form_name: &str) -> Vec<(&'static str, String)> {
        vec![
            ("form-name", form_name.to_string()),
            ("bot-field", String::new()),
            ("name", self.name.clone()),
            ("email", self.email.clone()),
            ("subject", self.subject.to_string()),
            ("message", self.message.clone()),
            ("rating", self.rating.to_string()),
        ]
    }
}

#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn submit(&self, feedback: &Feedback) -> Result<()>;
}

/// Posts the feedback as a URL-encoded form to a hosted form handler.
#[derive(Debug, Clone)]
pub struct FormFeedbackSink {
    client: Client,
    endpoint: String,
    form_name: String,
}

impl FormFeedbackSink {
    pub fn new(endpoint: impl Into<String>, form_name: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        url::Url::parse(&endpoint).map_err(|_| Error::InvalidUrl(endpoint.clone()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::HttpError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            form_name: form_name.into(),
        })
    }
}

#[async_trait]
impl FeedbackSink for FormFeedbackSink {
    async fn submit(&self, feedback: &Feedback) -> Result<()> {
        feedback.validate()?;

        let response = self
            .client
            .post(&self.endpoint)
            .form(&feedback.form_fields(&self.form_name))
            .send()
            .await
            .map_err(|e| Error::HttpError(format!("Feedback request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::HttpError(format!(
                "Feedback submission failed with HTTP {}",
                response.status().as_u16()
            )));
        }

        info!("Feedback from {} submitted ({})", feedback.email, feedback.subject);
        Ok(())
    }
}

/// Keeps submissions in memory; used when no form endpoint is configured.
#[derive(Default)]
pub struct MemoryFeedbackSink {
    received: Mutex<Vec<Feedback>>,
}

impl MemoryFeedbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Feedback> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl FeedbackSink for MemoryFeedbackSink {
    async fn submit(&self, feedback: &Feedback) -> Result<()> {
        feedback.validate()?;
        self.received.lock().push(feedback.clone());
        info!("Feedback from {} recorded locally", feedback.email);
        Ok(())
    }
}
