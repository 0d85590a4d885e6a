//! Ask command handler.
//!
//! Runs one question through the grounded answer pipeline and prints the
//! streamed answer.

use clap::Args;
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tutor_core::{config::AppConfig, AppError, AppResult, GenerationSettings};
use tutor_llm::create_client;
use tutor_prompt::load_profile_or_default;
use tutor_rag::{
    sse_stream, stream_answer, AskOutcome, AskRequest, AskService, GroundingPolicy, SqliteStore,
    StreamEvent, StreamOptions,
};

/// Ask a question about the course materials
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Conversation session (a new one is created when omitted)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Restrict the question to a course week
    #[arg(long)]
    pub week: Option<String>,

    /// Restrict the question to a document type (e.g. slides, syllabus)
    #[arg(long)]
    pub doc_type: Option<String>,

    /// Output the outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// Output server-sent-event frames
    #[arg(long, conflicts_with = "json")]
    pub sse: bool,

    /// Include per-attempt retrieval diagnostics
    #[arg(long)]
    pub debug: bool,

    /// Print the answer at once instead of chunk by chunk
    #[arg(long)]
    pub no_stream: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig, provider: &str) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self
            .get_question()
            .ok_or_else(|| AppError::Config("No question provided".to_string()))?;

        let store = Arc::new(SqliteStore::open(&config.database_path())?);

        let settings = GenerationSettings::resolve(config, store.as_ref());
        tracing::debug!(
            retrieval_model = %settings.retrieval_model,
            greeting_model = %settings.greeting_model,
            store = settings.store_name.as_deref().unwrap_or(""),
            "Resolved generation settings"
        );

        let client = create_client(provider, settings, &config.generation)?;
        let profile = load_profile_or_default(config.prompt_profile.as_deref())?;
        let policy = GroundingPolicy::from_overrides(&config.grounding);

        let service = AskService::new(client, store.clone(), store)
            .with_profile(profile)
            .with_policy(policy);

        let mut request = AskRequest::new(question).with_debug(self.debug);
        if let Some(session) = &self.session {
            request = request.with_session(session);
        }
        if let Some(week) = &self.week {
            request = request.with_week(week);
        }
        if let Some(doc_type) = &self.doc_type {
            request = request.with_doc_type(doc_type);
        }

        let outcome = service.ask(request).await?;

        if self.json {
            let json = serde_json::to_string_pretty(&outcome)?;
            println!("{}", json);
            return Ok(());
        }

        if self.sse {
            return self.print_sse(outcome).await;
        }

        self.print_answer(outcome).await
    }

    async fn print_sse(&self, outcome: AskOutcome) -> AppResult<()> {
        let stream = stream_answer(outcome, self.stream_options());
        let mut frames = Box::pin(sse_stream(stream.events));

        let mut stdout = std::io::stdout();
        while let Some(frame) = frames.next().await {
            stdout.write_all(frame?.as_bytes())?;
            stdout.flush()?;
        }

        Ok(())
    }

    async fn print_answer(&self, outcome: AskOutcome) -> AppResult<()> {
        let mut stream = stream_answer(outcome, self.stream_options());
        let mut stdout = std::io::stdout();

        while let Some(event) = stream.events.recv().await {
            match event {
                StreamEvent::Chunk { value } => {
                    stdout.write_all(value.as_bytes())?;
                    stdout.flush()?;
                }
                StreamEvent::Meta(meta) => {
                    println!();
                    eprintln!(
                        "[{}] session {}",
                        meta.grounding_status.as_str(),
                        meta.session_id
                    );
                    for citation in &meta.citations {
                        eprintln!("  - {}", citation.label);
                    }
                    if let Some(debug) = &meta.debug {
                        eprintln!("{}", serde_json::to_string_pretty(&debug.diag)?);
                    }
                }
                StreamEvent::Done => break,
            }
        }

        Ok(())
    }

    fn stream_options(&self) -> StreamOptions {
        if self.no_stream {
            StreamOptions {
                chunk_chars: usize::MAX,
                delay: std::time::Duration::ZERO,
            }
        } else {
            StreamOptions::default()
        }
    }

    /// Get the question text from the argument or the file.
    fn get_question(&self) -> Option<String> {
        self.question
            .clone()
            .or_else(|| {
                self.file.as_ref().and_then(|path| {
                    std::fs::read_to_string(path)
                        .map_err(|e| tracing::error!("Failed to read question file: {}", e))
                        .ok()
                })
            })
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
    }
}
