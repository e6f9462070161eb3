//! Content generators.
//!
//! A [`ContentGenerator`] produces one candidate either in a single call or
//! as a [`ContentStream`] of text fragments whose assembled buffer is parsed
//! once the stream is exhausted.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use tracing::debug;

use crate::error::GenerationError;
use crate::llm::{ChatClient, ChatMessage, TextStream};
use crate::prompt;
use crate::schema::{
    GeneratedQuestion, GeneratedText, QuestionContent, QuestionGenerationRequest, TipContent,
};

/// Parser turning an assembled stream buffer into content.
pub type ParseFn<C> = fn(&str) -> Result<C, GenerationError>;

/// Produces candidate content for the uniqueness loop.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// What the content is generated from.
    type Input: Send + Sync;
    type Content: GeneratedText + Send + Sync + 'static;

    /// Generate one candidate, steering away from `previous` texts.
    async fn generate(
        &self,
        input: &Self::Input,
        previous: &[String],
    ) -> Result<Self::Content, GenerationError>;

    /// Start streaming one candidate.
    async fn generate_stream(
        &self,
        input: &Self::Input,
        previous: &[String],
    ) -> Result<ContentStream<Self::Content>, GenerationError>;
}

/// Single-pass stream of text fragments that remembers what it yielded.
///
/// [`ContentStream::into_content`] parses the buffer, and fails with
/// [`GenerationError::NothingGenerated`] unless the stream ran to its end.
pub struct ContentStream<C> {
    inner: TextStream,
    buffer: String,
    finished: bool,
    parse: ParseFn<C>,
}

impl<C> ContentStream<C> {
    pub fn new(inner: TextStream, parse: ParseFn<C>) -> Self {
        Self {
            inner,
            buffer: String::new(),
            finished: false,
            parse,
        }
    }

    /// A stream replaying fixed fragments.
    pub fn from_fragments<I, S>(fragments: I, parse: ParseFn<C>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments: Vec<Result<String, GenerationError>> =
            fragments.into_iter().map(|f| Ok(f.into())).collect();
        Self::new(futures::stream::iter(fragments).boxed(), parse)
    }

    /// Text received so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Parse the assembled buffer into content.
    pub fn into_content(self) -> Result<C, GenerationError> {
        if !self.finished {
            return Err(GenerationError::NothingGenerated);
        }
        (self.parse)(&self.buffer)
    }
}

impl<C> Stream for ContentStream<C> {
    type Item = Result<String, GenerationError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(fragment))) => {
                this.buffer.push_str(&fragment);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

const SECTION_LABELS: [&str; 4] = [
    "Question:",
    "Expected Answer:",
    "Evaluation Criteria:",
    "Expected Duration:",
];

/// Parse a streamed question written as labelled sections.
///
/// Lines without a label continue the current section.
pub fn parse_question_sections(text: &str) -> Result<QuestionContent, GenerationError> {
    let mut sections: [String; 4] = Default::default();
    let mut current: Option<usize> = None;

    for line in text.lines().map(str::trim) {
        let labelled = SECTION_LABELS
            .iter()
            .enumerate()
            .find_map(|(index, label)| line.split_once(*label).map(|(_, rest)| (index, rest)));

        match (labelled, current) {
            (Some((index, rest)), _) => {
                sections[index] = rest.trim_start_matches('*').trim().to_string();
                current = Some(index);
            }
            (None, Some(index)) if !line.is_empty() => {
                let section = &mut sections[index];
                if !section.is_empty() {
                    section.push(' ');
                }
                section.push_str(line);
            }
            _ => {}
        }
    }

    let [question, expected_answer, evaluation_criteria, expected_duration] = sections;
    if question.is_empty() {
        return Err(GenerationError::Parse(
            "streamed content has no Question section".to_string(),
        ));
    }
    Ok(QuestionContent {
        question,
        expected_answer,
        evaluation_criteria,
        expected_duration,
    })
}

/// The whole trimmed stream is the tip.
pub fn parse_tip(text: &str) -> Result<TipContent, GenerationError> {
    let tip = text.trim();
    if tip.is_empty() {
        return Err(GenerationError::Parse("streamed tip is empty".to_string()));
    }
    Ok(TipContent {
        tip: tip.to_string(),
    })
}

/// Question generator backed by the chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAIQuestionGenerator {
    client: ChatClient,
}

impl OpenAIQuestionGenerator {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentGenerator for OpenAIQuestionGenerator {
    type Input = QuestionGenerationRequest;
    type Content = QuestionContent;

    async fn generate(
        &self,
        request: &QuestionGenerationRequest,
        previous: &[String],
    ) -> Result<QuestionContent, GenerationError> {
        let messages = [
            ChatMessage::system(prompt::QUESTION_SYSTEM_ROLE),
            ChatMessage::user(prompt::question_prompt(request, previous)),
        ];
        debug!("Generating question avoiding {} previous", previous.len());
        self.client
            .complete_structured("question_content", &messages)
            .await
    }

    async fn generate_stream(
        &self,
        request: &QuestionGenerationRequest,
        previous: &[String],
    ) -> Result<ContentStream<QuestionContent>, GenerationError> {
        let messages = [
            ChatMessage::system(prompt::QUESTION_SYSTEM_ROLE),
            ChatMessage::user(prompt::question_stream_prompt(request, previous)),
        ];
        let stream = self.client.stream(&messages).await?;
        Ok(ContentStream::new(stream, parse_question_sections))
    }
}

/// Tip generator backed by the chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAITipGenerator {
    client: ChatClient,
}

impl OpenAITipGenerator {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentGenerator for OpenAITipGenerator {
    type Input = GeneratedQuestion;
    type Content = TipContent;

    async fn generate(
        &self,
        question: &GeneratedQuestion,
        previous: &[String],
    ) -> Result<TipContent, GenerationError> {
        let messages = [
            ChatMessage::system(prompt::TIP_SYSTEM_ROLE),
            ChatMessage::user(prompt::tip_prompt(question, previous)),
        ];
        debug!("Generating tip avoiding {} previous", previous.len());
        self.client.complete_structured("tip_content", &messages).await
    }

    async fn generate_stream(
        &self,
        question: &GeneratedQuestion,
        previous: &[String],
    ) -> Result<ContentStream<TipContent>, GenerationError> {
        let messages = [
            ChatMessage::system(prompt::TIP_SYSTEM_ROLE),
            ChatMessage::user(prompt::tip_prompt(question, previous)),
        ];
        let stream = self.client.stream(&messages).await?;
        Ok(ContentStream::new(stream, parse_tip))
    }
}
