//! AI collaborator client.
//!
//! Exam analysis and plan critique ask the model first and fall back to
//! local rules when it is missing, unreachable, or answers with something
//! unusable. The result's `source` says which path produced it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinic_engine::analysis::{
    exam_prompt, fallback_exam_analysis, fallback_plan_critique, parse_exam_analysis,
    plan_critique_prompt,
};
use clinic_engine::{
    AiSettings, AnalysisSource, Exam, ExamAnalysis, NutritionalPlan, Patient, PlanCritique,
};
use serde::{Deserialize, Serialize};

/// Errors from the AI service.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("no AI service is configured")]
    NotConfigured,

    #[error("AI service not reachable at {0}")]
    NotReachable(String),

    #[error("AI service timed out")]
    Timeout,

    #[error("AI service error: {0}")]
    Service(String),
}

/// A text-generation backend.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, AnalysisError>;
}

/// Ollama HTTP API.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Service(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl AnalysisProvider for OllamaProvider {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, AnalysisError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    AnalysisError::NotReachable(self.base_url.clone())
                } else if e.is_timeout() {
                    AnalysisError::Timeout
                } else {
                    AnalysisError::Service(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Service(format!("status {status}: {body}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Service(format!("unreadable response: {e}")))?;
        Ok(parsed.response)
    }
}

/// Used when no AI service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledProvider;

#[async_trait]
impl AnalysisProvider for DisabledProvider {
    async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, AnalysisError> {
        Err(AnalysisError::NotConfigured)
    }
}

fn system_prompt(ai: &AiSettings) -> String {
    format!(
        "You are a {} clinical assistant. Focus: {}. Be concise and never invent values.",
        ai.personality, ai.focus
    )
}

/// Analyse an exam, falling back to local rules.
pub async fn analyze_exam(
    provider: &dyn AnalysisProvider,
    exam: &Exam,
    patient: Option<&Patient>,
    ai: &AiSettings,
    at: DateTime<Utc>,
) -> ExamAnalysis {
    let prompt = exam_prompt(exam, patient, ai);
    match provider.generate(&system_prompt(ai), &prompt).await {
        Ok(raw) => match parse_exam_analysis(&raw, at) {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(exam_id = %exam.id, error = %e, "unusable AI analysis, using local rules");
                fallback_exam_analysis(exam, at)
            }
        },
        Err(e) => {
            tracing::warn!(exam_id = %exam.id, error = %e, "AI analysis unavailable, using local rules");
            fallback_exam_analysis(exam, at)
        }
    }
}

/// Critique a nutritional plan, falling back to local checks.
pub async fn critique_plan(
    provider: &dyn AnalysisProvider,
    patient: &Patient,
    plan: &NutritionalPlan,
    ai: &AiSettings,
    at: DateTime<Utc>,
) -> PlanCritique {
    let prompt = plan_critique_prompt(patient, plan, ai);
    match provider.generate(&system_prompt(ai), &prompt).await {
        Ok(text) if !text.trim().is_empty() => PlanCritique {
            source: AnalysisSource::Ai,
            text: text.trim().to_string(),
            generated_at: at,
        },
        Ok(_) => {
            tracing::warn!(plan_id = %plan.id, "empty AI critique, using local checks");
            fallback_plan_critique(patient, plan, at)
        }
        Err(e) => {
            tracing::warn!(plan_id = %plan.id, error = %e, "AI critique unavailable, using local checks");
            fallback_plan_critique(patient, plan, at)
        }
    }
}
