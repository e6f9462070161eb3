//! Uniqueness-enforcing generation.
//!
//! Each attempt asks the [`ContentGenerator`] for a candidate, embeds its
//! text and rejects it if it is too similar to anything in the [`Scope`].
//! Rejections and generation failures go through the [`RetryPolicy`]; the
//! exhausted policy surfaces the last failure as a [`RetryError`].
//!
//! The streaming variant forwards fragments as they arrive, including those
//! of attempts that are later rejected, validates the candidate once its
//! stream is exhausted, and ends with a single [`StreamChunk::Final`].
//!
//! Nothing here persists. Callers store accepted content themselves, so a
//! storage failure is never retried.

use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use interview_embeddings::{Embedder, Embedding, EmbeddingError};
use serde::Serialize;
use tracing::{debug, info};

use crate::content::ContentGenerator;
use crate::error::{AttemptError, GenerationError, RetryError};
use crate::retry::RetryPolicy;
use crate::schema::GeneratedText;

/// One element of a streamed generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamChunk<T> {
    /// Incremental text. Not final until a [`StreamChunk::Final`] follows.
    Fragment(String),
    /// The accepted item. Always the last element.
    Final(T),
}

/// Previously accepted texts and their embeddings.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    texts: Vec<String>,
    embeddings: Vec<Embedding>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embed every text of an existing scope.
    pub async fn load(embedder: &Embedder, texts: Vec<String>) -> Result<Self, EmbeddingError> {
        let embeddings = embedder.embed_all(&texts[..]).await?;
        Ok(Self { texts, embeddings })
    }

    /// Add an accepted text so later candidates are checked against it.
    pub async fn push(&mut self, embedder: &Embedder, text: String) -> Result<(), EmbeddingError> {
        let embedding = embedder.embed(&text).await?;
        self.texts.push(text);
        self.embeddings.push(embedding);
        Ok(())
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// Generates content that differs from everything in a scope.
pub struct UniqueGenerator<G> {
    generator: G,
    embedder: Arc<Embedder>,
    policy: RetryPolicy<AttemptError>,
}

impl<G> UniqueGenerator<G>
where
    G: ContentGenerator,
{
    pub fn new(generator: G, embedder: Arc<Embedder>, policy: RetryPolicy<AttemptError>) -> Self {
        Self {
            generator,
            embedder,
            policy,
        }
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn policy(&self) -> &RetryPolicy<AttemptError> {
        &self.policy
    }

    /// Generate one candidate that is different from every item of `scope`.
    pub async fn generate(
        &self,
        operation: &'static str,
        input: &G::Input,
        scope: &Scope,
    ) -> Result<G::Content, RetryError<AttemptError>> {
        self.policy
            .execute(operation, |attempt| async move {
                debug!("'{operation}' attempt {attempt} against {} prior items", scope.len());
                let candidate = self.generator.generate(input, scope.texts()).await?;
                self.validate(&candidate, scope).await?;
                Ok::<_, AttemptError>(candidate)
            })
            .await
    }

    /// Stream candidates until one is accepted or the policy gives up.
    ///
    /// A rejected attempt starts a fresh stream, so the caller sees the
    /// fragments of every attempt. The last element is either the accepted
    /// [`StreamChunk::Final`] or the exhaustion error.
    pub fn generate_stream<'a>(
        &'a self,
        operation: &'static str,
        input: &'a G::Input,
        scope: &'a Scope,
    ) -> impl Stream<Item = Result<StreamChunk<G::Content>, RetryError<AttemptError>>> + Send + 'a
    {
        stream! {
            let mut attempt = 1;
            loop {
                debug!("'{operation}' streaming attempt {attempt} against {} prior items", scope.len());

                let outcome: Result<G::Content, AttemptError> = match self
                    .generator
                    .generate_stream(input, scope.texts())
                    .await
                {
                    Err(e) => Err(e.into()),
                    Ok(mut fragments) => {
                        let mut broken: Option<GenerationError> = None;
                        while let Some(fragment) = fragments.next().await {
                            match fragment {
                                Ok(text) => yield Ok(StreamChunk::Fragment(text)),
                                Err(e) => {
                                    broken = Some(e);
                                    break;
                                }
                            }
                        }
                        match broken {
                            Some(e) => Err(e.into()),
                            None => match fragments.into_content() {
                                Ok(candidate) => self
                                    .validate(&candidate, scope)
                                    .await
                                    .map(|()| candidate),
                                Err(e) => Err(e.into()),
                            },
                        }
                    }
                };

                match outcome {
                    Ok(candidate) => {
                        yield Ok(StreamChunk::Final(candidate));
                        return;
                    }
                    Err(err) => {
                        if !self.policy.can_retry(operation, attempt, &err) {
                            yield Err(self.policy.give_up(operation, attempt, err));
                            return;
                        }
                        self.policy.pause(attempt).await;
                        attempt += 1;
                    }
                }
            }
        }
    }

    /// Reject `candidate` if it is too similar to anything in `scope`.
    ///
    /// An empty scope accepts without embedding the candidate.
    async fn validate(&self, candidate: &G::Content, scope: &Scope) -> Result<(), AttemptError> {
        if scope.is_empty() {
            return Ok(());
        }
        let embedding = self.embedder.embed(candidate.text()).await?;
        if !self.embedder.all_different(&embedding, scope.embeddings())? {
            return Err(AttemptError::Duplicate {
                kind: <G::Content as GeneratedText>::KIND,
            });
        }
        info!(
            "Accepted {} different from {} prior items",
            <G::Content as GeneratedText>::KIND,
            scope.len()
        );
        Ok(())
    }
}
