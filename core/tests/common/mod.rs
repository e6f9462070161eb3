//! Deterministic stand-ins for the chat and embedding providers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use interview_core::content::{
    ContentGenerator, ContentStream, parse_question_sections, parse_tip,
};
use interview_core::error::{AttemptError, GenerationError};
use interview_core::retry::RetryPolicy;
use interview_core::schema::{
    GeneratedText, JobTitle, QuestionContent, QuestionGenerationRequest, QuestionType, TipContent,
};
use interview_core::{
    GeneratedQuestion, KeyValueStore, MemoryStore, QuestionService, QuestionStorage, TipService,
    TipStorage, UniqueGenerator,
};
use interview_embeddings::{
    Embedder, EmbeddingCache, EmbeddingError, EmbeddingProvider, EmbeddingRequest,
    EmbeddingResponse, SimilarityChecker,
};
use uuid::Uuid;

/// Maps known texts onto fixed vectors and counts provider calls.
pub struct TableProvider {
    table: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl TableProvider {
    pub fn new(entries: &[(&str, [f32; 4])]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(text, vector)| ((*text).to_string(), vector.to_vec()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for TableProvider {
    fn name(&self) -> &str {
        "table"
    }

    fn default_model(&self) -> &str {
        "table"
    }

    fn default_dimension(&self) -> usize {
        4
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> interview_embeddings::Result<EmbeddingResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let embedding = self.table.get(&request.text).cloned().ok_or_else(|| {
            EmbeddingError::InvalidResponse(format!("no vector for {:?}", request.text))
        })?;
        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: "table".to_string(),
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Vectors shared by every test. `*-dup` texts sit close to their originals.
pub fn vectors() -> TableProvider {
    TableProvider::new(&[
        ("q-joins", [1.0, 0.0, 0.0, 0.0]),
        ("q-joins-dup", [0.99, 0.1, 0.0, 0.0]),
        ("q-pandas", [0.0, 1.0, 0.0, 0.0]),
        ("q-spark", [0.0, 0.0, 1.0, 0.0]),
        ("q-dbt", [0.0, 0.0, 0.0, 1.0]),
        ("t-index", [1.0, 0.0, 0.0, 0.0]),
        ("t-index-dup", [0.95, 0.05, 0.0, 0.0]),
        ("t-nulls", [0.0, 1.0, 0.0, 0.0]),
        ("t-grain", [0.0, 0.0, 1.0, 0.0]),
    ])
}

/// Content the scripted generator can emit in one piece or as fragments.
pub trait Scriptable: GeneratedText + Clone + Send + Sync + 'static {
    fn fragments(&self) -> Vec<String>;
    fn parse(text: &str) -> Result<Self, GenerationError>;
}

impl Scriptable for QuestionContent {
    fn fragments(&self) -> Vec<String> {
        vec![
            format!("Question: {}\n", self.question),
            format!("Expected Answer: {}\n", self.expected_answer),
            format!("Evaluation Criteria: {}\n", self.evaluation_criteria),
            format!("Expected Duration: {}", self.expected_duration),
        ]
    }

    fn parse(text: &str) -> Result<Self, GenerationError> {
        parse_question_sections(text)
    }
}

impl Scriptable for TipContent {
    fn fragments(&self) -> Vec<String> {
        let (head, tail) = self.tip.split_at(self.tip.len() / 2);
        vec![head.to_string(), tail.to_string()]
    }

    fn parse(text: &str) -> Result<Self, GenerationError> {
        parse_tip(text)
    }
}

/// One scripted generator response.
#[derive(Debug, Clone)]
pub enum Step<C> {
    Content(C),
    Fail(String),
    Unconfigured,
}

impl<C: Clone> Step<C> {
    fn resolve(&self) -> Result<C, GenerationError> {
        match self {
            Step::Content(content) => Ok(content.clone()),
            Step::Fail(reason) => Err(GenerationError::ApiRequest(reason.clone())),
            Step::Unconfigured => Err(GenerationError::NotConfigured),
        }
    }
}

/// Replays a script of responses. The last step repeats once the script runs out.
pub struct ScriptedGenerator<I, C> {
    steps: Vec<Step<C>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<String>>>,
    _input: PhantomData<fn(&I)>,
}

impl<I, C: Scriptable> ScriptedGenerator<I, C> {
    pub fn new(steps: Vec<Step<C>>) -> Self {
        assert!(!steps.is_empty(), "script needs at least one step");
        Self {
            steps,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            _input: PhantomData,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The previous texts handed to each call, in call order.
    pub fn seen(&self) -> Vec<Vec<String>> {
        self.seen.lock().unwrap().clone()
    }

    fn next(&self, previous: &[String]) -> Result<C, GenerationError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(previous.to_vec());
        self.steps[index.min(self.steps.len() - 1)].resolve()
    }
}

#[async_trait]
impl<I, C> ContentGenerator for ScriptedGenerator<I, C>
where
    I: Send + Sync,
    C: Scriptable,
{
    type Input = I;
    type Content = C;

    async fn generate(&self, _input: &I, previous: &[String]) -> Result<C, GenerationError> {
        self.next(previous)
    }

    async fn generate_stream(
        &self,
        _input: &I,
        previous: &[String],
    ) -> Result<ContentStream<C>, GenerationError> {
        let content = self.next(previous)?;
        Ok(ContentStream::from_fragments(content.fragments(), C::parse))
    }
}

pub type QuestionScript = ScriptedGenerator<QuestionGenerationRequest, QuestionContent>;
pub type TipScript = ScriptedGenerator<GeneratedQuestion, TipContent>;

pub fn question(text: &str) -> QuestionContent {
    QuestionContent {
        question: text.to_string(),
        expected_answer: format!("answer to {text}"),
        evaluation_criteria: "correctness, clarity".to_string(),
        expected_duration: "5 minutes".to_string(),
    }
}

pub fn tip(text: &str) -> TipContent {
    TipContent {
        tip: text.to_string(),
    }
}

pub fn questions(texts: &[&str]) -> Vec<Step<QuestionContent>> {
    texts.iter().map(|text| Step::Content(question(text))).collect()
}

pub fn tips(texts: &[&str]) -> Vec<Step<TipContent>> {
    texts.iter().map(|text| Step::Content(tip(text))).collect()
}

pub fn request(user_id: Uuid, n: u8) -> QuestionGenerationRequest {
    QuestionGenerationRequest {
        user_id,
        question_type: QuestionType::KnowledgeQuestion,
        job_title: JobTitle::DataEngineer,
        skill_to_test: "data modelling".to_string(),
        n,
    }
}

pub fn policy(max_attempts: u32) -> RetryPolicy<AttemptError> {
    RetryPolicy::new(max_attempts)
        .with_label("Failed to generate a unique item")
        .with_predicate(AttemptError::is_retryable)
}

/// Everything the services need, backed by one in-memory store.
pub struct Harness {
    pub provider: Arc<TableProvider>,
    pub embedder: Arc<Embedder>,
    pub questions: Arc<QuestionStorage>,
    pub tips: Arc<TipStorage>,
}

impl Default for Harness {
    fn default() -> Self {
        let provider = Arc::new(vectors());
        let embedder = Arc::new(Embedder::new(
            Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
            EmbeddingCache::new(64),
            SimilarityChecker::default(),
        ));
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let ttl = Duration::from_secs(3600);
        Self {
            provider,
            embedder,
            questions: Arc::new(QuestionStorage::new(Arc::clone(&store), ttl, "test")),
            tips: Arc::new(TipStorage::new(store, ttl, "test")),
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique<G: ContentGenerator>(
        &self,
        generator: G,
        max_attempts: u32,
    ) -> UniqueGenerator<G> {
        UniqueGenerator::new(generator, Arc::clone(&self.embedder), policy(max_attempts))
    }

    pub fn question_service(
        &self,
        steps: Vec<Step<QuestionContent>>,
        max_attempts: u32,
    ) -> QuestionService<QuestionScript> {
        QuestionService::new(
            Arc::clone(&self.questions),
            self.unique(ScriptedGenerator::new(steps), max_attempts),
        )
    }

    pub fn tip_service(
        &self,
        steps: Vec<Step<TipContent>>,
        max_attempts: u32,
    ) -> TipService<TipScript> {
        TipService::new(
            Arc::clone(&self.questions),
            Arc::clone(&self.tips),
            self.unique(ScriptedGenerator::new(steps), max_attempts),
        )
    }

    /// Store a question directly, bypassing generation.
    pub async fn seed_question(&self, user_id: Uuid, text: &str) -> GeneratedQuestion {
        self.questions
            .add(request(user_id, 1), question(text))
            .await
            .unwrap()
    }
}

/// Call inspection for services driven by a scripted generator.
pub trait ScriptedService {
    fn generator_calls(&self) -> usize;
    fn seen(&self) -> Vec<Vec<String>>;
}

impl ScriptedService for QuestionService<QuestionScript> {
    fn generator_calls(&self) -> usize {
        self.generator().generator().calls()
    }

    fn seen(&self) -> Vec<Vec<String>> {
        self.generator().generator().seen()
    }
}

impl ScriptedService for TipService<TipScript> {
    fn generator_calls(&self) -> usize {
        self.generator().generator().calls()
    }

    fn seen(&self) -> Vec<Vec<String>> {
        self.generator().generator().seen()
    }
}
