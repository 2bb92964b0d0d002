//! Interactive question answering over the project context.
//!
//! `ChatSession` owns the transcript, selects and assembles context on the
//! caller's task, and hands the network exchange to an interactive worker.
//! At most one request is in flight per session.

use crate::context::{context_blocks, ContextMode, ProjectContext};
use crate::embeddings::EmbeddingProvider;
use crate::progress::{EventSink, InteractiveEvent};
use crate::reader::{read_text, ContentSource};
use crate::retrieval::RetrievalEngine;
use crate::types::{ContextItem, ItemKind};
use codepilot_core::{AppConfig, AppError, AppResult};
use codepilot_llm::{ChatMessage, ChatRequest, LlmClient};
use codepilot_prompt::{
    build_instructions, build_overview, normalize_roles, parse_file_request, requested_file_turn,
    AssembledPrompt, AssemblyInput, ChatHistory, ChatTurn, PromptBudgetAssembler,
    ServiceCounter, TokenCounter, MAX_REQUESTED_FILE_BYTES,
};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Rounds of model file requests answered per question.
pub const MAX_FILE_REQUESTS: usize = 3;

/// Resolved settings for interactive requests.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub chat_model: String,
    pub max_output_tokens: u32,

    /// Tokens available for the assembled prompt
    pub token_budget: usize,

    /// Chunks retrieved per question
    pub top_n: usize,

    pub mode: ContextMode,
    pub response_language: String,

    /// Rendered instruction template appended to the base instructions
    pub user_instructions: Option<String>,
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let analysis = &config.analysis;
        Self {
            chat_model: config.model.clone(),
            max_output_tokens: u32::try_from(analysis.max_output_tokens).unwrap_or(u32::MAX),
            token_budget: analysis.token_budget(),
            top_n: analysis.top_n,
            mode: ContextMode::from_settings(analysis.chunking, analysis.semantic_retrieval),
            response_language: analysis.response_language.clone(),
            user_instructions: None,
        }
    }

    pub fn with_user_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.user_instructions = Some(instructions.into());
        self
    }
}

/// Handle to one in-flight interactive request.
pub struct InteractiveHandle {
    pub events: mpsc::Receiver<InteractiveEvent>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

pub struct ChatSession {
    options: SessionOptions,
    client: Arc<dyn LlmClient>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    source: Option<Arc<dyn ContentSource>>,
    assembler: PromptBudgetAssembler<ServiceCounter>,
    history: ChatHistory,
    in_flight: Arc<Semaphore>,
}

impl ChatSession {
    pub fn new(
        options: SessionOptions,
        client: Arc<dyn LlmClient>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        history: ChatHistory,
    ) -> Self {
        let counter = ServiceCounter::new(client.clone(), options.chat_model.clone());
        Self {
            options,
            client,
            embedder,
            source: None,
            assembler: PromptBudgetAssembler::new(counter),
            history,
            in_flight: Arc::new(Semaphore::new(1)),
        }
    }

    /// Source used to answer the model's file requests.
    pub fn with_source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn into_history(self) -> ChatHistory {
        self.history
    }

    /// Record the model's final answer in the transcript.
    pub fn record_response(&mut self, text: impl Into<String>) {
        self.history.push(ChatTurn::model(text));
    }

    /// Build the prompt for `question` without sending it.
    ///
    /// # Errors
    /// `AppError::DoesNotFit` when the instructions or the question alone
    /// exceed the token budget.
    pub async fn prepare(
        &self,
        question: &str,
        context: &ProjectContext,
        file_tree: &str,
    ) -> AppResult<AssembledPrompt> {
        let retrieved = self.retrieve(question, context).await;
        let selected = context.select(self.options.mode, &retrieved);
        let blocks = context_blocks(&selected);

        let instructions = build_instructions(
            self.options.user_instructions.as_deref(),
            &self.options.response_language,
        )?;
        let overview = build_overview(file_tree, &context.structure_overview())?;

        let input = AssemblyInput {
            instructions: &instructions,
            structural_overview: &overview,
            context: &blocks,
            history: self.history.turns(),
            question,
        };
        self.assembler.assemble(&input, self.options.token_budget).await
    }

    async fn retrieve<'a>(&self, question: &str, context: &'a ProjectContext) -> Vec<&'a ContextItem> {
        if self.options.mode != ContextMode::Semantic {
            return Vec::new();
        }
        let chunks = context.items_of_kind(ItemKind::Chunk);
        match &self.embedder {
            Some(embedder) => {
                let engine = RetrievalEngine::new(embedder.clone(), self.options.top_n);
                engine.retrieve(question, &chunks).await.items
            }
            None => {
                tracing::info!("No embedding provider; including all chunks unranked");
                chunks
            }
        }
    }

    /// Assemble and send `question`.
    ///
    /// The question joins the transcript once its prompt is assembled; the
    /// answer arrives as an [`InteractiveEvent::Response`] and is recorded
    /// with [`ChatSession::record_response`].
    ///
    /// # Errors
    /// `AppError::Busy` while another request is in flight, and assembly
    /// errors before anything is sent.
    pub async fn submit(
        &mut self,
        question: &str,
        context: &ProjectContext,
        file_tree: &str,
    ) -> AppResult<InteractiveHandle> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Prompt("Enter a question".to_string()));
        }
        if context.is_empty() {
            return Err(AppError::Knowledge(
                "The project context is empty. Run analysis first.".to_string(),
            ));
        }

        let permit = self
            .in_flight
            .clone()
            .try_acquire_owned()
            .map_err(|_| AppError::Busy)?;

        let prompt = self.prepare(question, context, file_tree).await?;
        self.history.push(ChatTurn::user(question));

        for notice in &prompt.notices {
            tracing::warn!("{}", notice);
        }

        let (sink, events) = EventSink::channel(16);
        let cancel = CancellationToken::new();
        let worker = InteractiveWorker {
            client: self.client.clone(),
            source: self.source.clone(),
            model: self.options.chat_model.clone(),
            max_output_tokens: self.options.max_output_tokens,
            token_budget: self.options.token_budget,
        };
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            worker.run(prompt, sink, token, permit).await;
        });

        Ok(InteractiveHandle {
            events,
            cancel,
            task,
        })
    }
}

/// Sends one assembled prompt and answers file requests.
struct InteractiveWorker {
    client: Arc<dyn LlmClient>,
    source: Option<Arc<dyn ContentSource>>,
    model: String,
    max_output_tokens: u32,
    token_budget: usize,
}

impl InteractiveWorker {
    async fn run(
        self,
        prompt: AssembledPrompt,
        sink: EventSink<InteractiveEvent>,
        cancel: CancellationToken,
        _permit: OwnedSemaphorePermit,
    ) {
        let notices = prompt.notices;
        let result = self.exchange(prompt.messages, &sink, &cancel).await;
        match result {
            Ok(text) => sink.emit(InteractiveEvent::Response { text, notices }).await,
            Err(err) => {
                tracing::error!("Interactive request failed: {}", err);
                sink.emit(InteractiveEvent::Failed(err)).await;
            }
        }
    }

    async fn exchange(
        &self,
        mut messages: Vec<ChatMessage>,
        sink: &EventSink<InteractiveEvent>,
        cancel: &CancellationToken,
    ) -> AppResult<String> {
        let mut round = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            sink.emit(InteractiveEvent::Step("Sending the request to the model...".to_string()))
                .await;

            let request = ChatRequest::new(&self.model, messages.clone())
                .with_max_output_tokens(self.max_output_tokens);
            let response = self.client.chat(&request).await;
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            let text = response?.content;

            let requested = match (parse_file_request(&text), &self.source) {
                (Some(path), Some(source)) if round < MAX_FILE_REQUESTS => Some((path, source)),
                _ => None,
            };
            let Some((path, source)) = requested else {
                return Ok(text);
            };
            round += 1;

            sink.emit(InteractiveEvent::Step(format!(
                "The model requested file: {}. Fetching its content...",
                path
            )))
            .await;
            let (path, content) = fetch_requested(source.as_ref(), &path).await?;
            if content.len() > MAX_REQUESTED_FILE_BYTES {
                return Err(AppError::Knowledge(format!(
                    "Requested file '{}' is too large ({:.1} KB)",
                    path,
                    content.len() as f64 / 1024.0
                )));
            }

            let file_turn = requested_file_turn(&path, &content);
            let insert_at = messages.len().saturating_sub(1);
            messages.insert(insert_at, file_turn);
            messages = normalize_roles(messages);

            let counter = ServiceCounter::new(self.client.clone(), self.model.clone());
            let measured = counter.count(&messages).await.tokens;
            if measured > self.token_budget {
                return Err(AppError::DoesNotFit {
                    component: format!("Requested file '{}'", path),
                    required: measured,
                    available: self.token_budget,
                });
            }
            sink.emit(InteractiveEvent::Step(format!(
                "File '{}' received. Sending the extended request...",
                path
            )))
            .await;
        }
    }
}

/// Read a requested file; a leading repository-name component is tolerated.
async fn fetch_requested(source: &dyn ContentSource, path: &str) -> AppResult<(String, String)> {
    let path = path.trim_start_matches("./");
    match read_text(source, path).await {
        Ok(content) => Ok((path.to_string(), content)),
        Err(AppError::NotFound(_)) if path.contains('/') => {
            let stripped = path.split_once('/').map(|(_, rest)| rest).unwrap_or(path);
            let content = read_text(source, stripped).await?;
            Ok((stripped.to_string(), content))
        }
        Err(err) => Err(err),
    }
}
