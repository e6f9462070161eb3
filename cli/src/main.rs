//! Command line front end for the interview assistant.
//!
//! # Usage
//!
//! ```bash
//! interview questions --job data-engineer --skill "data modelling" -n 3
//! interview session --job data-analyst --skill sql -n 2 --tips 2 --stream
//! ```
//!
//! Generated items are written to stdout as JSON, one document per line.
//! Streamed runs emit every chunk (`{"type":"fragment",...}` or
//! `{"type":"final",...}`) as it arrives. Logs go to stderr.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use interview_core::{
    AssistantConfig, GeneratedQuestion, GeneratedTip, InterviewAssistant, JobTitle, KeyValueStore,
    MemoryStore, QuestionGenerationRequest, QuestionType, ServiceError, StreamChunk,
};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "interview", version)]
#[command(about = "Generate unique interview questions and tips")]
struct Cli {
    /// TOML configuration file. Environment variables override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate questions for one user.
    Questions(QuestionArgs),

    /// Generate questions, then tips for each of them.
    Session {
        #[command(flatten)]
        questions: QuestionArgs,

        /// Tips to generate per question.
        #[arg(long, default_value_t = 1)]
        tips: u8,
    },
}

#[derive(Args, Debug)]
struct QuestionArgs {
    /// User the questions belong to. A fresh id is used when omitted.
    #[arg(long)]
    user_id: Option<Uuid>,

    #[arg(long = "type", value_enum, default_value_t = QuestionKind::Knowledge)]
    question_type: QuestionKind,

    #[arg(long, value_enum)]
    job: Job,

    /// Skill the questions should test.
    #[arg(long)]
    skill: String,

    /// Number of questions (1 to 10).
    #[arg(short, long, default_value_t = 1)]
    n: u8,

    /// Stream fragments as they are generated.
    #[arg(long)]
    stream: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum QuestionKind {
    Exercise,
    Knowledge,
}

impl From<QuestionKind> for QuestionType {
    fn from(kind: QuestionKind) -> Self {
        match kind {
            QuestionKind::Exercise => QuestionType::Exercise,
            QuestionKind::Knowledge => QuestionType::KnowledgeQuestion,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Job {
    DataAnalyst,
    DataScientist,
    DataEngineer,
}

impl From<Job> for JobTitle {
    fn from(job: Job) -> Self {
        match job {
            Job::DataAnalyst => JobTitle::DataAnalyst,
            Job::DataScientist => JobTitle::DataScientist,
            Job::DataEngineer => JobTitle::DataEngineer,
        }
    }
}

impl QuestionArgs {
    fn request(&self) -> QuestionGenerationRequest {
        QuestionGenerationRequest {
            user_id: self.user_id.unwrap_or_else(Uuid::now_v7),
            question_type: self.question_type.into(),
            job_title: self.job.into(),
            skill_to_test: self.skill.clone(),
            n: self.n,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let assistant = InterviewAssistant::from_config(&config, store)
        .context("Failed to configure the interview assistant")?;

    match cli.command {
        Command::Questions(args) => {
            let request = args.request();
            info!("Generating {} questions for user {}", request.n, request.user_id);
            if args.stream {
                stream_questions(&assistant, &request).await?;
            } else {
                let questions = generate_questions(&assistant, &request).await?;
                emit(&questions)?;
            }
        }
        Command::Session { questions, tips } => {
            let request = questions.request();
            info!(
                "Starting session for user {}: {} questions, {tips} tips each",
                request.user_id, request.n
            );
            let generated = if questions.stream {
                stream_questions(&assistant, &request).await?
            } else {
                let generated = generate_questions(&assistant, &request).await?;
                emit(&generated)?;
                generated
            };

            for question in &generated {
                for _ in 0..tips {
                    if questions.stream {
                        stream_tip(&assistant, question.id).await?;
                    } else {
                        let tip = generate_tip(&assistant, question.id).await?;
                        emit(&tip)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AssistantConfig> {
    let config = match path {
        Some(path) => AssistantConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AssistantConfig::default(),
    };
    config
        .with_overrides(|key| std::env::var(key).ok())
        .context("Invalid configuration in environment")
}

async fn generate_questions(
    assistant: &InterviewAssistant,
    request: &QuestionGenerationRequest,
) -> Result<Vec<GeneratedQuestion>> {
    assistant
        .questions()
        .generate_questions(request)
        .await
        .map_err(report)
}

/// Emit every chunk and return the questions that were stored.
async fn stream_questions(
    assistant: &InterviewAssistant,
    request: &QuestionGenerationRequest,
) -> Result<Vec<GeneratedQuestion>> {
    let mut chunks = pin!(assistant.questions().generate_questions_stream(request));
    let mut generated = Vec::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(report)?;
        emit(&chunk)?;
        if let StreamChunk::Final(question) = chunk {
            generated.push(question);
        }
    }
    Ok(generated)
}

async fn generate_tip(assistant: &InterviewAssistant, question_id: Uuid) -> Result<GeneratedTip> {
    assistant
        .tips()
        .generate_tip(question_id)
        .await
        .map_err(report)
}

async fn stream_tip(assistant: &InterviewAssistant, question_id: Uuid) -> Result<()> {
    let chunks = assistant
        .tips()
        .generate_tip_stream(question_id)
        .await
        .map_err(report)?;
    let mut chunks = pin!(chunks);
    while let Some(chunk) = chunks.next().await {
        emit(&chunk.map_err(report)?)?;
    }
    Ok(())
}

fn report(err: ServiceError) -> anyhow::Error {
    error!("Request failed with status {}: {err}", err.status_code());
    err.into()
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
