//! Question and tip services.
//!
//! Each service loads the scope of prior items once, runs the uniqueness
//! loop and persists what it accepts. Accepted questions of a batch join
//! the scope before the next one is generated.

use std::pin::pin;
use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use tracing::info;
use uuid::Uuid;

use crate::content::{ContentGenerator, OpenAIQuestionGenerator, OpenAITipGenerator};
use crate::error::{Result, ServiceError};
use crate::schema::{
    GeneratedQuestion, GeneratedTip, QuestionContent, QuestionGenerationRequest, TipContent,
    TipGenerationRequest,
};
use crate::storage::{QuestionStorage, TipStorage};
use crate::unique::{Scope, StreamChunk, UniqueGenerator};

/// Generates unique questions per user.
pub struct QuestionService<G = OpenAIQuestionGenerator> {
    questions: Arc<QuestionStorage>,
    generator: UniqueGenerator<G>,
}

impl<G> QuestionService<G>
where
    G: ContentGenerator<Input = QuestionGenerationRequest, Content = QuestionContent>,
{
    pub fn new(questions: Arc<QuestionStorage>, generator: UniqueGenerator<G>) -> Self {
        Self {
            questions,
            generator,
        }
    }

    pub fn storage(&self) -> &QuestionStorage {
        &self.questions
    }

    pub fn generator(&self) -> &UniqueGenerator<G> {
        &self.generator
    }

    /// Generate and store `request.n` questions, each different from the
    /// user's earlier questions and from one another.
    pub async fn generate_questions(
        &self,
        request: &QuestionGenerationRequest,
    ) -> Result<Vec<GeneratedQuestion>> {
        request.validate()?;
        let mut scope = self.load_scope(request.user_id).await?;

        let mut generated = Vec::with_capacity(usize::from(request.n));
        for index in 1..=request.n {
            let content = self
                .generator
                .generate("generate_question", request, &scope)
                .await?;
            let question = self.questions.add(request.clone(), content).await?;
            info!("Generated question {index}/{} for user {}", request.n, request.user_id);

            scope
                .push(self.generator.embedder(), question.content.question.clone())
                .await?;
            generated.push(question);
        }
        Ok(generated)
    }

    /// Stream `request.n` questions one after another.
    ///
    /// Every stored question arrives as a [`StreamChunk::Final`] after its
    /// fragments. The first error ends the stream.
    pub fn generate_questions_stream<'a>(
        &'a self,
        request: &'a QuestionGenerationRequest,
    ) -> impl Stream<Item = Result<StreamChunk<GeneratedQuestion>>> + Send + 'a {
        stream! {
            if let Err(e) = request.validate() {
                yield Err(e);
                return;
            }
            let mut scope = match self.load_scope(request.user_id).await {
                Ok(scope) => scope,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for index in 1..=request.n {
                let mut accepted = None;
                {
                    let mut chunks = pin!(self.generator.generate_stream(
                        "generate_question_stream",
                        request,
                        &scope,
                    ));
                    while let Some(chunk) = chunks.next().await {
                        match chunk {
                            Ok(StreamChunk::Fragment(text)) => yield Ok(StreamChunk::Fragment(text)),
                            Ok(StreamChunk::Final(content)) => accepted = Some(content),
                            Err(e) => {
                                yield Err(ServiceError::from(e));
                                return;
                            }
                        }
                    }
                }
                let Some(content) = accepted else {
                    return;
                };

                let question = match self.questions.add(request.clone(), content).await {
                    Ok(question) => question,
                    Err(e) => {
                        yield Err(ServiceError::from(e));
                        return;
                    }
                };
                info!("Streamed question {index}/{} for user {}", request.n, request.user_id);

                let pushed = scope
                    .push(self.generator.embedder(), question.content.question.clone())
                    .await;
                yield Ok(StreamChunk::Final(question));
                if let Err(e) = pushed {
                    yield Err(ServiceError::from(e));
                    return;
                }
            }
        }
    }

    async fn load_scope(&self, user_id: Uuid) -> Result<Scope> {
        let texts = self
            .questions
            .list_by_parent(user_id)
            .await?
            .into_iter()
            .map(|question| question.content.question)
            .collect();
        Ok(Scope::load(self.generator.embedder(), texts).await?)
    }
}

/// Generates unique tips per question.
pub struct TipService<G = OpenAITipGenerator> {
    questions: Arc<QuestionStorage>,
    tips: Arc<TipStorage>,
    generator: UniqueGenerator<G>,
}

impl<G> TipService<G>
where
    G: ContentGenerator<Input = GeneratedQuestion, Content = TipContent>,
{
    pub fn new(
        questions: Arc<QuestionStorage>,
        tips: Arc<TipStorage>,
        generator: UniqueGenerator<G>,
    ) -> Self {
        Self {
            questions,
            tips,
            generator,
        }
    }

    pub fn storage(&self) -> &TipStorage {
        &self.tips
    }

    pub fn generator(&self) -> &UniqueGenerator<G> {
        &self.generator
    }

    /// Generate and store one tip for an existing question.
    ///
    /// Fails with [`ServiceError::QuestionNotFound`] before any generation
    /// if the question is missing or expired.
    pub async fn generate_tip(&self, question_id: Uuid) -> Result<GeneratedTip> {
        let question = self.find_question(question_id).await?;
        let scope = self.load_scope(question_id).await?;

        let content = self
            .generator
            .generate("generate_tip", &question, &scope)
            .await?;
        let tip = self
            .tips
            .add(TipGenerationRequest { question_id }, content)
            .await?;
        info!("Generated tip {} for question {question_id}", tip.id);
        Ok(tip)
    }

    /// Stream one tip for an existing question.
    ///
    /// The question is looked up before the stream is returned, so a
    /// missing question fails here rather than inside the stream.
    pub async fn generate_tip_stream(
        &self,
        question_id: Uuid,
    ) -> Result<impl Stream<Item = Result<StreamChunk<GeneratedTip>>> + Send + '_> {
        let question = self.find_question(question_id).await?;
        let scope = self.load_scope(question_id).await?;

        Ok(stream! {
            let mut accepted = None;
            {
                let mut chunks = pin!(self.generator.generate_stream(
                    "generate_tip_stream",
                    &question,
                    &scope,
                ));
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(StreamChunk::Fragment(text)) => yield Ok(StreamChunk::Fragment(text)),
                        Ok(StreamChunk::Final(content)) => accepted = Some(content),
                        Err(e) => {
                            yield Err(ServiceError::from(e));
                            return;
                        }
                    }
                }
            }
            let Some(content) = accepted else {
                return;
            };

            match self.tips.add(TipGenerationRequest { question_id }, content).await {
                Ok(tip) => {
                    info!("Streamed tip {} for question {question_id}", tip.id);
                    yield Ok(StreamChunk::Final(tip));
                }
                Err(e) => yield Err(ServiceError::from(e)),
            }
        })
    }

    async fn find_question(&self, question_id: Uuid) -> Result<GeneratedQuestion> {
        self.questions
            .get(question_id)
            .await?
            .ok_or(ServiceError::QuestionNotFound(question_id))
    }

    async fn load_scope(&self, question_id: Uuid) -> Result<Scope> {
        let texts = self
            .tips
            .list_by_parent(question_id)
            .await?
            .into_iter()
            .map(|tip| tip.content.tip)
            .collect();
        Ok(Scope::load(self.generator.embedder(), texts).await?)
    }
}
