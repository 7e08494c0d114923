//! REST client for the recruitment backend.
//!
//! Endpoints (relative to `ServiceConfig::base_url`):
//!
//! | Method | Path                                 | Used by                   |
//! |--------|--------------------------------------|---------------------------|
//! | GET    | `/api/interview/questions?subject=`  | [`QuestionBank`]          |
//! | POST   | `/api/interview/questions/resume`    | [`QuestionBank`]          |
//! | POST   | `/api/interview/evaluate`            | [`AnswerEvaluator`]       |
//! | POST   | `/api/interview/results`             | [`ResultStore`]           |
//! | POST   | `/api/interview/recordings`          | [`RecordingSink`] upload  |
//!
//! All connection details come from [`ServiceConfig`]; nothing is hardcoded.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ServiceConfig;
use crate::media::RecordingBlob;
use crate::scoring::ScoreRecord;
use crate::services::{
    AnswerEvaluator, Evaluation, Question, QuestionBank, RecordingLocation, RecordingMetadata,
    RecordingSink, ResultStore, ServiceError,
};

#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: ServiceConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

impl HttpBackend {
    /// Build a client with the per-request timeout from `config.timeout_secs`.
    ///
    /// A default (no-timeout) client is used if the builder fails.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Attach `Authorization: Bearer …` only for a non-empty key.
    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }

    async fn questions_from(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<Vec<Question>, ServiceError> {
        let response = self.authorize(req).send().await?.error_for_status()?;
        let questions: Vec<Question> = response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;
        Ok(questions)
    }
}

#[async_trait]
impl QuestionBank for HttpBackend {
    async fn fetch_questions(&self, subject: &str) -> Result<Vec<Question>, ServiceError> {
        let req = self
            .client
            .get(self.url("/api/interview/questions"))
            .query(&[("subject", subject)]);
        self.questions_from(req).await
    }

    async fn generate_from_resume(&self) -> Result<Vec<Question>, ServiceError> {
        let req = self
            .client
            .post(self.url("/api/interview/questions/resume"))
            .json(&serde_json::json!({}));
        self.questions_from(req).await
    }
}

#[async_trait]
impl AnswerEvaluator for HttpBackend {
    async fn evaluate(
        &self,
        question: &Question,
        answer: &str,
    ) -> Result<Evaluation, ServiceError> {
        let body = serde_json::json!({
            "questionId": question.id,
            "question":   question.prompt,
            "topics":     question.expected_topics,
            "answer":     answer,
        });

        let req = self.client.post(self.url("/api/interview/evaluate")).json(&body);
        let response = self.authorize(req).send().await?.error_for_status()?;

        let evaluation: Evaluation = response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        if evaluation.feedback.trim().is_empty() {
            return Err(ServiceError::EmptyResponse);
        }
        Ok(evaluation)
    }
}

#[async_trait]
impl ResultStore for HttpBackend {
    async fn save_interview_result(&self, record: &ScoreRecord) -> Result<(), ServiceError> {
        let req = self.client.post(self.url("/api/interview/results")).json(record);
        self.authorize(req).send().await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl RecordingSink for HttpBackend {
    async fn export(
        &self,
        blob: &RecordingBlob,
        metadata: &RecordingMetadata,
    ) -> Result<RecordingLocation, ServiceError> {
        let file = tokio::fs::File::open(blob.path()).await?;
        let req = self
            .client
            .post(self.url("/api/interview/recordings"))
            .header(reqwest::header::CONTENT_TYPE, metadata.mime_type.as_str())
            .header(reqwest::header::CONTENT_LENGTH, blob.len())
            .header("X-Session-Id", metadata.session_id.as_str())
            .header("X-File-Name", metadata.file_name.as_str())
            .query(&[("subject", metadata.subject.as_str())])
            .body(reqwest::Body::from(file));

        let response = self.authorize(req).send().await?.error_for_status()?;
        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        if uploaded.url.is_empty() {
            return Err(ServiceError::EmptyResponse);
        }
        Ok(RecordingLocation::Url(uploaded.url))
    }
}
