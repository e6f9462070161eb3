//! Requests, generated content and stored items.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;

/// Upper bound on questions generated by one request.
pub const MAX_QUESTIONS_PER_REQUEST: u8 = 10;

/// Kind of interview question to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "exercise")]
    Exercise,
    #[serde(rename = "knowledge question")]
    KnowledgeQuestion,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Exercise => "exercise",
            QuestionType::KnowledgeQuestion => "knowledge question",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role the candidate is interviewing for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobTitle {
    #[serde(rename = "data analyst")]
    DataAnalyst,
    #[serde(rename = "data scientist")]
    DataScientist,
    #[serde(rename = "data engineer")]
    DataEngineer,
}

impl JobTitle {
    pub fn as_str(self) -> &'static str {
        match self {
            JobTitle::DataAnalyst => "data analyst",
            JobTitle::DataScientist => "data scientist",
            JobTitle::DataEngineer => "data engineer",
        }
    }
}

impl fmt::Display for JobTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input of the question generation API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionGenerationRequest {
    pub user_id: Uuid,
    pub question_type: QuestionType,
    pub job_title: JobTitle,
    pub skill_to_test: String,
    /// Number of questions to generate, `1..=10`.
    pub n: u8,
}

impl QuestionGenerationRequest {
    /// Reject requests the generation loop cannot serve.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if !(1..=MAX_QUESTIONS_PER_REQUEST).contains(&self.n) {
            return Err(ServiceError::InvalidRequest(format!(
                "n must be between 1 and {MAX_QUESTIONS_PER_REQUEST}, got {}",
                self.n
            )));
        }
        if self.skill_to_test.trim().is_empty() {
            return Err(ServiceError::InvalidRequest(
                "skill_to_test must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Input of the tip generation API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipGenerationRequest {
    pub question_id: Uuid,
}

/// Question content as produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionContent {
    pub question: String,
    pub expected_answer: String,
    pub evaluation_criteria: String,
    pub expected_duration: String,
}

/// Tip content as produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TipContent {
    pub tip: String,
}

/// Generated content that can be compared against earlier generations.
pub trait GeneratedText {
    /// Human readable kind, used in logs and rejection messages.
    const KIND: &'static str;

    /// The text whose embedding decides whether the content is a duplicate.
    fn text(&self) -> &str;
}

impl GeneratedText for QuestionContent {
    const KIND: &'static str = "question";

    fn text(&self) -> &str {
        &self.question
    }
}

impl GeneratedText for TipContent {
    const KIND: &'static str = "tip";

    fn text(&self) -> &str {
        &self.tip
    }
}

/// Metadata shared by every stored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub created_at: DateTime<Utc>,
    pub app_version: String,
}

impl Metadata {
    /// Metadata stamped with the current time.
    pub fn now(app_version: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            app_version: app_version.into(),
        }
    }
}

/// A persisted question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub id: Uuid,
    #[serde(flatten)]
    pub content: QuestionContent,
    #[serde(flatten)]
    pub metadata: Metadata,
    pub request: QuestionGenerationRequest,
}

/// A persisted tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedTip {
    pub id: Uuid,
    #[serde(flatten)]
    pub content: TipContent,
    #[serde(flatten)]
    pub metadata: Metadata,
    pub request: TipGenerationRequest,
}
