use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BotError, Result};

pub const DEFAULT_BASE_URL: &str = "https://electrolyte.fitforfree.nl/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A scheduled class as reported by the booking API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    #[serde(default)]
    pub venue_name: String,
    pub start_timestamp: i64,
    pub duration_seconds: i64,
    #[serde(default)]
    pub activity: Activity,
    pub class_type: String,
    #[serde(default)]
    pub spots_available: u32,
}

impl Lesson {
    pub fn end_timestamp(&self) -> i64 {
        self.start_timestamp + self.duration_seconds
    }

    pub fn has_spots(&self) -> bool {
        self.spots_available > 0
    }
}

/// Kind of class a user can pick when adding a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassType {
    /// Instructor-led and mixed lessons.
    Group,
    /// Free practice slots.
    Free,
}

impl ClassType {
    pub const ALL: [ClassType; 2] = [ClassType::Group, ClassType::Free];

    pub fn label(self) -> &'static str {
        match self {
            ClassType::Group => "Groepsles",
            ClassType::Free => "Vrij",
        }
    }

    /// Data carried by the keyboard button for this type.
    pub fn callback_data(self) -> &'static str {
        match self {
            ClassType::Group => "group_lesson|mixed_lesson",
            ClassType::Free => "free_practise",
        }
    }

    pub fn from_callback_data(data: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|class_type| class_type.callback_data() == data)
    }

    /// Whether a lesson's API class type falls under this type.
    pub fn matches(self, lesson: &Lesson) -> bool {
        self.callback_data()
            .split('|')
            .any(|api_type| api_type == lesson.class_type)
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where lesson schedules come from.
#[async_trait]
pub trait LessonSource: Send + Sync {
    /// Lessons starting between the two unix timestamps.
    async fn lessons(&self, from: i64, to: i64) -> Result<Vec<Lesson>>;
}

#[derive(Debug, Deserialize)]
struct LessonResponse {
    data: LessonResponseData,
}

#[derive(Debug, Deserialize)]
struct LessonResponseData {
    #[serde(default)]
    lessons: Vec<Lesson>,
}

/// Booking API client.
pub struct HttpLessonSource {
    client: reqwest::Client,
    base_url: String,
    venues: Vec<String>,
    token: Option<String>,
}

impl HttpLessonSource {
    pub fn new(base_url: impl Into<String>, venues: Vec<String>, token: Option<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            venues,
            token,
        }
    }
}

#[async_trait]
impl LessonSource for HttpLessonSource {
    async fn lessons(&self, from: i64, to: i64) -> Result<Vec<Lesson>> {
        if from > to {
            return Err(BotError::lessons_error(format!(
                "start {from} is after end {to}"
            )));
        }

        let venues = serde_json::to_string(&self.venues)
            .map_err(|e| BotError::lessons_error_with_source("Failed to encode venues", e))?;
        let url = format!("{}v0/lessons/", self.base_url);
        debug!(%url, from, to, "fetching lessons");

        let mut request = self.client.get(&url).query(&[
            ("venues", venues),
            ("from", from.to_string()),
            ("to", to.to_string()),
            ("language", "nl_NL".to_string()),
        ]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BotError::lessons_error_with_source("Failed to request lessons", e))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(BotError::lessons_error(format!(
                "lessons request returned {status}"
            )));
        }

        let body: LessonResponse = response
            .json()
            .await
            .map_err(|e| BotError::lessons_error_with_source("Failed to decode lessons", e))?;
        Ok(body.data.lessons)
    }
}
