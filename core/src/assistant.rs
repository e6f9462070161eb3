//! Wires configuration into ready-to-use question and tip services.

use std::sync::Arc;

use interview_embeddings::{Embedder, EmbeddingCache, OpenAIProvider, SimilarityChecker};
use tracing::info;

use crate::config::AssistantConfig;
use crate::content::{OpenAIQuestionGenerator, OpenAITipGenerator};
use crate::error::{AttemptError, ConfigError};
use crate::kv::KeyValueStore;
use crate::llm::ChatClient;
use crate::retry::RetryPolicy;
use crate::service::{QuestionService, TipService};
use crate::storage::{QuestionStorage, TipStorage};
use crate::unique::UniqueGenerator;

pub const QUESTION_RETRY_LABEL: &str = "failed to generate a unique question";
pub const TIP_RETRY_LABEL: &str = "failed to generate a unique tip";

/// Question and tip services sharing one store and one embedder.
pub struct InterviewAssistant {
    questions: QuestionService,
    tips: TipService,
}

impl InterviewAssistant {
    /// Build both services against `store`.
    pub fn from_config(
        config: &AssistantConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut chat = ChatClient::new()
            .with_base_url(&config.openai.base_url)
            .with_model(&config.chat_model)
            .with_temperature(config.temperature);
        let mut provider = OpenAIProvider::new()
            .with_base_url(&config.openai.base_url)
            .with_model(&config.embedding_model);
        if let Some(key) = &config.openai.api_key {
            chat = chat.with_api_key(key);
            provider = provider.with_api_key(key);
        }

        let checker = SimilarityChecker::new(config.similarity_threshold).map_err(|e| {
            ConfigError::Invalid {
                key: "similarity_threshold".to_string(),
                reason: e.to_string(),
            }
        })?;
        let embedder = Arc::new(Embedder::new(
            Arc::new(provider),
            EmbeddingCache::new(config.embedding_cache_capacity),
            checker,
        ));

        let question_storage = Arc::new(QuestionStorage::new(
            Arc::clone(&store),
            config.expiration(),
            &config.app_version,
        ));
        let tip_storage = Arc::new(TipStorage::new(
            store,
            config.expiration(),
            &config.app_version,
        ));

        let questions = QuestionService::new(
            Arc::clone(&question_storage),
            UniqueGenerator::new(
                OpenAIQuestionGenerator::new(chat.clone()),
                Arc::clone(&embedder),
                policy(config, QUESTION_RETRY_LABEL),
            ),
        );
        let tips = TipService::new(
            question_storage,
            tip_storage,
            UniqueGenerator::new(
                OpenAITipGenerator::new(chat),
                embedder,
                policy(config, TIP_RETRY_LABEL),
            ),
        );

        info!(
            "Interview assistant ready (chat model {}, threshold {}, {} attempts)",
            config.chat_model, config.similarity_threshold, config.max_attempts
        );
        Ok(Self { questions, tips })
    }

    pub fn questions(&self) -> &QuestionService {
        &self.questions
    }

    pub fn tips(&self) -> &TipService {
        &self.tips
    }
}

fn policy(config: &AssistantConfig, label: &str) -> RetryPolicy<AttemptError> {
    let policy = RetryPolicy::new(config.max_attempts)
        .with_label(label)
        .with_predicate(AttemptError::is_retryable);
    match config.backoff() {
        Some(backoff) => policy.with_backoff(backoff),
        None => policy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::kv::MemoryStore;
    use crate::schema::{JobTitle, QuestionGenerationRequest, QuestionType};
    use uuid::Uuid;

    fn offline_config() -> AssistantConfig {
        let mut config = AssistantConfig::default();
        config.openai.api_key = None;
        config.openai.base_url = "http://127.0.0.1:9".to_string();
        config
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = offline_config();
        config.max_attempts = 0;
        let result = InterviewAssistant::from_config(&config, Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_retry_settings_reach_both_services() {
        let mut config = offline_config();
        config.max_attempts = 4;
        config.retry_initial_delay_ms = 100;
        let assistant =
            InterviewAssistant::from_config(&config, Arc::new(MemoryStore::new())).unwrap();

        let questions = assistant.questions().generator().policy();
        assert_eq!(questions.max_attempts(), 4);
        assert_eq!(questions.label(), QUESTION_RETRY_LABEL);
        assert_eq!(questions.backoff(), config.backoff());

        let tips = assistant.tips().generator().policy();
        assert_eq!(tips.label(), TIP_RETRY_LABEL);
        assert!(tips.backoff().is_some());
    }

    #[tokio::test]
    async fn test_unknown_question_is_reported_without_generation() {
        let assistant =
            InterviewAssistant::from_config(&offline_config(), Arc::new(MemoryStore::new()))
                .unwrap();
        let id = Uuid::now_v7();
        let err = assistant.tips().generate_tip(id).await.unwrap_err();
        assert!(matches!(err, ServiceError::QuestionNotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_generation() {
        let assistant =
            InterviewAssistant::from_config(&offline_config(), Arc::new(MemoryStore::new()))
                .unwrap();
        let request = QuestionGenerationRequest {
            user_id: Uuid::now_v7(),
            question_type: QuestionType::Exercise,
            job_title: JobTitle::DataEngineer,
            skill_to_test: "spark".to_string(),
            n: 0,
        };
        let err = assistant.questions().generate_questions(&request).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }
}
