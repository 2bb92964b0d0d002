//! Per-file analysis: structure, summary, chunks and embeddings.
//!
//! Files are processed strictly in order. Cancellation is checked before each
//! file, before each network call and right after each call returns; a file
//! interrupted by cancellation emits nothing.

use crate::chunk::{ChunkConfig, ChunkPipeline, Language};
use crate::embeddings::{EmbeddingProvider, EmbeddingTask};
use crate::progress::{AnalysisEvent, AnalysisReport, EventSink, ProgressEvent};
use crate::reader::{read_text, ContentSource};
use crate::structure::StructureExtractor;
use crate::types::ContextItem;
use codepilot_core::{AppConfig, AppError, AppResult};
use codepilot_llm::{LlmClient, LlmRequest};
use codepilot_prompt::build_summary_prompt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Summary text for files with no content.
pub const EMPTY_FILE_SUMMARY: &str = "(File is empty)";

/// Resolved settings for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// When false every file becomes one full_file item
    pub chunking: bool,

    /// Embed chunks for ranked retrieval
    pub semantic_retrieval: bool,

    pub chunk: ChunkConfig,

    /// Model asked for file summaries
    pub summary_model: String,

    /// Language the summaries are written in
    pub response_language: String,
}

impl AnalysisOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            chunking: config.analysis.chunking,
            semantic_retrieval: config.analysis.semantic_retrieval,
            chunk: ChunkConfig::from(&config.analysis),
            summary_model: config.model.clone(),
            response_language: config.analysis.response_language.clone(),
        }
    }
}

/// What happened to one file.
#[derive(Debug)]
pub enum FileOutcome {
    /// All items of the file, in structure, summary, chunk order
    Analyzed {
        items: Vec<ContextItem>,
        warnings: Vec<String>,
    },

    /// The file could not be read or decoded
    Skipped(AppError),

    /// Cancellation was observed while the file was in flight
    Cancelled,
}

pub struct AnalysisPipeline {
    options: AnalysisOptions,
    client: Arc<dyn LlmClient>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    chunker: ChunkPipeline,
    extractor: StructureExtractor,
}

impl AnalysisPipeline {
    /// `embedder` is only used when semantic retrieval is enabled.
    pub fn new(
        options: AnalysisOptions,
        client: Arc<dyn LlmClient>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        let chunker = ChunkPipeline::new(options.chunk.clone());
        Self {
            options,
            client,
            embedder,
            chunker,
            extractor: StructureExtractor::new(),
        }
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Analyze `files` in order, reporting through `events`.
    ///
    /// # Errors
    /// Only fatal-batch errors (quota exhaustion) are returned. Items already
    /// emitted for earlier files stay valid.
    pub async fn run(
        &self,
        source: &dyn ContentSource,
        files: &[String],
        events: &EventSink<AnalysisEvent>,
        cancel: &CancellationToken,
    ) -> AppResult<AnalysisReport> {
        let start = Instant::now();
        let total = files.len();
        let mut report = AnalysisReport::default();

        tracing::info!("Starting analysis of {} files from {}", total, source.describe());

        for (index, file_path) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.analyze_file(source, file_path, cancel).await? {
                FileOutcome::Analyzed { items, warnings } => {
                    for message in warnings {
                        report.warnings.push(format!("{}: {}", file_path, message));
                        events
                            .emit(AnalysisEvent::Warning {
                                file_path: file_path.clone(),
                                message,
                            })
                            .await;
                    }
                    report.items += items.len();
                    report.analyzed.push(file_path.clone());
                    events
                        .emit(AnalysisEvent::FileAnalyzed {
                            file_path: file_path.clone(),
                            items,
                        })
                        .await;
                }
                FileOutcome::Skipped(err) => {
                    tracing::warn!("Skipping {}: {}", file_path, err);
                    let message = err.to_string();
                    report.warnings.push(format!("{}: {}", file_path, message));
                    report.skipped.push(file_path.clone());
                    events
                        .emit(AnalysisEvent::Warning {
                            file_path: file_path.clone(),
                            message,
                        })
                        .await;
                }
                FileOutcome::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            }

            events
                .emit(AnalysisEvent::Progress(ProgressEvent::new(
                    index + 1,
                    total,
                    file_path.clone(),
                )))
                .await;
        }

        report.elapsed_secs = start.elapsed().as_secs_f64();
        tracing::info!(
            "Analysis {}: {} analyzed, {} skipped, {} items in {:.2}s",
            if report.cancelled { "cancelled" } else { "completed" },
            report.analyzed.len(),
            report.skipped.len(),
            report.items,
            report.elapsed_secs
        );
        Ok(report)
    }

    /// Analyze one file.
    ///
    /// # Errors
    /// `AppError::QuotaExhausted` from the generative or embedding service.
    pub async fn analyze_file(
        &self,
        source: &dyn ContentSource,
        file_path: &str,
        cancel: &CancellationToken,
    ) -> AppResult<FileOutcome> {
        if cancel.is_cancelled() {
            return Ok(FileOutcome::Cancelled);
        }

        let text = match read_text(source, file_path).await {
            Ok(text) => text,
            Err(err) => return Ok(FileOutcome::Skipped(err)),
        };
        if cancel.is_cancelled() {
            return Ok(FileOutcome::Cancelled);
        }

        if !self.options.chunking {
            return Ok(FileOutcome::Analyzed {
                items: vec![ContextItem::full_file(file_path, text)],
                warnings: Vec::new(),
            });
        }

        let mut items = Vec::new();
        let mut warnings = Vec::new();
        let language = Language::from_path(file_path);

        let structure = self.extractor.extract(&text, language);
        if !structure.is_empty() {
            items.push(ContextItem::structure(file_path, structure));
        }

        let summary = match self.summarize(file_path, &text, cancel).await? {
            Some(summary) => summary,
            None => return Ok(FileOutcome::Cancelled),
        };
        if let Err(err) = &summary {
            warnings.push(format!("Summary failed: {}", err));
        }
        let summary = summary.unwrap_or_else(|err| format!("(Summarization error: {})", err.kind()));
        items.push(ContextItem::summary(file_path, summary));

        let chunks = self.chunker.split(&text, language);
        let texts: Vec<String> = chunks.into_iter().map(|c| c.text).collect();
        let embeddings = match self.embed_chunks(file_path, &texts, cancel).await? {
            Some(embeddings) => embeddings,
            None => return Ok(FileOutcome::Cancelled),
        };
        let embeddings = match embeddings {
            Ok(embeddings) => embeddings,
            Err(message) => {
                warnings.push(message);
                vec![None; texts.len()]
            }
        };

        for (index, (text, embedding)) in texts.into_iter().zip(embeddings).enumerate() {
            items.push(ContextItem::chunk(file_path, (index + 1) as u32, text, embedding));
        }

        tracing::debug!("Analyzed {}: {} items", file_path, items.len());
        Ok(FileOutcome::Analyzed { items, warnings })
    }

    /// Ask for a summary. `Ok(None)` means cancellation was observed; the
    /// inner result carries a per-file failure.
    async fn summarize(
        &self,
        file_path: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> AppResult<Option<AppResult<String>>> {
        if text.trim().is_empty() {
            return Ok(Some(Ok(EMPTY_FILE_SUMMARY.to_string())));
        }
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let result = match build_summary_prompt(file_path, text, &self.options.response_language) {
            Ok(prompt) => {
                let request = LlmRequest::new(prompt, &self.options.summary_model);
                self.client
                    .complete(&request)
                    .await
                    .map(|response| response.content.trim().to_string())
            }
            Err(err) => Err(err),
        };

        if cancel.is_cancelled() {
            return Ok(None);
        }
        match result {
            Err(err) if err.is_fatal_batch() => {
                tracing::error!("Summarization quota exhausted at {}: {}", file_path, err);
                Err(err)
            }
            Err(err) => {
                tracing::warn!("Summarization failed for {}: {}", file_path, err);
                Ok(Some(Err(err)))
            }
            Ok(summary) => Ok(Some(Ok(summary))),
        }
    }

    /// One embedding per chunk, or all `None` when retrieval is off.
    ///
    /// `Ok(None)` means cancellation was observed; `Err(message)` inside means
    /// this file's embeddings were dropped.
    async fn embed_chunks(
        &self,
        file_path: &str,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> AppResult<Option<Result<Vec<Option<Vec<f32>>>, String>>> {
        let embedder = match &self.embedder {
            Some(embedder) if self.options.semantic_retrieval && !texts.is_empty() => embedder,
            _ => return Ok(Some(Ok(vec![None; texts.len()]))),
        };
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let result = embedder
            .embed_batch(texts, EmbeddingTask::RetrievalDocument)
            .await;

        if cancel.is_cancelled() {
            return Ok(None);
        }
        match result {
            Ok(vectors) if vectors.len() == texts.len() => {
                Ok(Some(Ok(vectors.into_iter().map(Some).collect())))
            }
            Ok(vectors) => {
                tracing::warn!(
                    "Embedding count mismatch for {}: {} chunks, {} vectors",
                    file_path,
                    texts.len(),
                    vectors.len()
                );
                Ok(Some(Err(format!(
                    "Embedding count mismatch ({} chunks, {} vectors); chunks stored without embeddings",
                    texts.len(),
                    vectors.len()
                ))))
            }
            Err(err) if err.is_fatal_batch() => {
                tracing::error!("Embedding quota exhausted at {}: {}", file_path, err);
                Err(err)
            }
            Err(err) => {
                tracing::warn!("Embedding failed for {}: {}", file_path, err);
                Ok(Some(Err(format!(
                    "Embedding failed: {}; chunks stored without embeddings",
                    err
                ))))
            }
        }
    }
}

/// Handle to a running analysis worker.
pub struct AnalysisHandle {
    pub events: mpsc::Receiver<AnalysisEvent>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

/// Dedicated background task running one analysis batch.
pub struct AnalysisWorker;

impl AnalysisWorker {
    /// Start analyzing `files`. The last event is always `Finished` or `Failed`.
    pub fn spawn(
        pipeline: Arc<AnalysisPipeline>,
        source: Arc<dyn ContentSource>,
        files: Vec<String>,
        capacity: usize,
    ) -> AnalysisHandle {
        let (sink, events) = EventSink::channel(capacity);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            match pipeline.run(source.as_ref(), &files, &sink, &token).await {
                Ok(report) => sink.emit(AnalysisEvent::Finished(report)).await,
                Err(err) => {
                    tracing::error!("Analysis aborted: {}", err);
                    sink.emit(AnalysisEvent::Failed(err)).await;
                }
            }
        });

        AnalysisHandle {
            events,
            cancel,
            task,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embeddings::providers::MockProvider;
    use crate::types::ItemKind;
    use codepilot_llm::{ChatRequest, LlmResponse, LlmUsage, MockClient};
    use std::collections::BTreeMap;

    /// In-memory content source.
    pub(crate) struct MemorySource {
        pub files: BTreeMap<String, String>,
    }

    impl MemorySource {
        pub(crate) fn new(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait::async_trait]
    impl ContentSource for MemorySource {
        fn describe(&self) -> String {
            "memory".to_string()
        }

        async fn list_files(&self) -> AppResult<Vec<String>> {
            Ok(self.files.keys().cloned().collect())
        }

        async fn read(&self, file_path: &str) -> AppResult<Vec<u8>> {
            self.files
                .get(file_path)
                .map(|c| c.as_bytes().to_vec())
                .ok_or_else(|| AppError::NotFound(file_path.to_string()))
        }
    }

    #[derive(Clone, Copy)]
    enum Failure {
        Generic,
        Quota,
    }

    /// Fails summaries for one file, optionally cancelling on the way out.
    struct ScriptedClient {
        fail_on: Option<(&'static str, Failure)>,
        cancel_on: Option<(&'static str, CancellationToken)>,
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedClient {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            if let Some((path, token)) = &self.cancel_on {
                if request.prompt.contains(&format!("START OF FILE: {} ", path)) {
                    token.cancel();
                }
            }
            if let Some((path, failure)) = self.fail_on {
                if request.prompt.contains(&format!("START OF FILE: {} ", path)) {
                    return Err(match failure {
                        Failure::Generic => AppError::Llm("boom".to_string()),
                        Failure::Quota => AppError::QuotaExhausted("daily limit".to_string()),
                    });
                }
            }
            Ok(LlmResponse {
                content: "A summary.".to_string(),
                model: request.model.clone(),
                usage: LlmUsage::new(1, 1),
                done: true,
            })
        }

        async fn chat(&self, _request: &ChatRequest) -> AppResult<LlmResponse> {
            Err(AppError::Llm("not used".to_string()))
        }
    }

    /// Returns one vector fewer than asked for.
    #[derive(Debug)]
    struct ShortProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for ShortProvider {
        fn provider_name(&self) -> &str {
            "short"
        }

        fn model_name(&self) -> &str {
            "short"
        }

        async fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> AppResult<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
        }
    }

    pub(crate) fn options(chunking: bool, semantic_retrieval: bool) -> AnalysisOptions {
        AnalysisOptions {
            chunking,
            semantic_retrieval,
            chunk: ChunkConfig::default(),
            summary_model: "test-model".to_string(),
            response_language: "English".to_string(),
        }
    }

    fn five_files() -> MemorySource {
        MemorySource::new(&[
            ("a.py", "def a():\n    return 1\n"),
            ("b.py", "def b():\n    return 2\n"),
            ("c.py", "def c():\n    return 3\n"),
            ("d.py", "def d():\n    return 4\n"),
            ("e.py", "def e():\n    return 5\n"),
        ])
    }

    async fn run_collecting(
        pipeline: &AnalysisPipeline,
        source: &dyn ContentSource,
        files: &[String],
        cancel: &CancellationToken,
    ) -> (AppResult<AnalysisReport>, Vec<AnalysisEvent>) {
        let (sink, mut rx) = EventSink::channel(256);
        let result = pipeline.run(source, files, &sink, cancel).await;
        drop(sink);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (result, events)
    }

    fn analyzed(events: &[AnalysisEvent]) -> BTreeMap<String, Vec<ContextItem>> {
        events
            .iter()
            .filter_map(|e| match e {
                AnalysisEvent::FileAnalyzed { file_path, items } => {
                    Some((file_path.clone(), items.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn summary_of(items: &[ContextItem]) -> &str {
        items
            .iter()
            .find(|i| i.kind == ItemKind::Summary)
            .and_then(|i| i.text())
            .unwrap()
    }

    #[tokio::test]
    async fn test_items_per_file_in_order() {
        let source = MemorySource::new(&[("app.py", "import os\n\ndef main():\n    print(os.name)\n")]);
        let pipeline = AnalysisPipeline::new(
            options(true, true),
            Arc::new(MockClient::new()),
            Some(Arc::new(MockProvider::new(16))),
        );
        let files = vec!["app.py".to_string()];
        let (result, events) = run_collecting(&pipeline, &source, &files, &CancellationToken::new()).await;

        let report = result.unwrap();
        assert_eq!(report.analyzed, files);
        let items = &analyzed(&events)["app.py"];
        let kinds: Vec<ItemKind> = items.iter().map(|i| i.kind).collect();
        assert_eq!(kinds[0], ItemKind::Structure);
        assert_eq!(kinds[1], ItemKind::Summary);
        assert!(kinds[2..].iter().all(|k| *k == ItemKind::Chunk));
        assert_eq!(summary_of(items), "This file starts with `import os`.");

        let chunks: Vec<&ContextItem> = items.iter().filter(|i| i.kind == ItemKind::Chunk).collect();
        assert!(!chunks.is_empty());
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_number, index as u32 + 1);
            assert_eq!(chunk.embedding.as_ref().map(Vec::len), Some(16));
        }
        assert!(matches!(events.last(), Some(AnalysisEvent::Progress(p)) if p.processed == 1 && p.total == 1));
    }

    #[tokio::test]
    async fn test_summary_failure_on_third_file_gives_placeholder() {
        let source = five_files();
        let client = ScriptedClient {
            fail_on: Some(("c.py", Failure::Generic)),
            cancel_on: None,
        };
        let pipeline = AnalysisPipeline::new(options(true, false), Arc::new(client), None);
        let files: Vec<String> = source.files.keys().cloned().collect();
        let (result, events) = run_collecting(&pipeline, &source, &files, &CancellationToken::new()).await;

        let report = result.unwrap();
        assert_eq!(report.analyzed.len(), 5);
        assert_eq!(report.warnings.len(), 1);

        let by_file = analyzed(&events);
        for path in ["a.py", "b.py", "d.py", "e.py"] {
            assert_eq!(summary_of(&by_file[path]), "A summary.");
            assert!(by_file[path].iter().any(|i| i.kind == ItemKind::Chunk));
        }
        assert_eq!(summary_of(&by_file["c.py"]), "(Summarization error: LlmError)");
        assert!(by_file["c.py"].iter().any(|i| i.kind == ItemKind::Chunk));
    }

    #[tokio::test]
    async fn test_quota_exhaustion_aborts_batch() {
        let source = five_files();
        let client = ScriptedClient {
            fail_on: Some(("c.py", Failure::Quota)),
            cancel_on: None,
        };
        let pipeline = AnalysisPipeline::new(options(true, false), Arc::new(client), None);
        let files: Vec<String> = source.files.keys().cloned().collect();
        let (result, events) = run_collecting(&pipeline, &source, &files, &CancellationToken::new()).await;

        assert!(matches!(result, Err(AppError::QuotaExhausted(_))));
        let by_file = analyzed(&events);
        assert_eq!(by_file.keys().cloned().collect::<Vec<_>>(), vec!["a.py", "b.py"]);
    }

    #[tokio::test]
    async fn test_cancel_during_call_emits_nothing_for_file() {
        let source = five_files();
        let cancel = CancellationToken::new();
        let client = ScriptedClient {
            fail_on: None,
            cancel_on: Some(("b.py", cancel.clone())),
        };
        let pipeline = AnalysisPipeline::new(options(true, false), Arc::new(client), None);
        let files: Vec<String> = source.files.keys().cloned().collect();
        let (result, events) = run_collecting(&pipeline, &source, &files, &cancel).await;

        let report = result.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.analyzed, vec!["a.py".to_string()]);
        let by_file = analyzed(&events);
        assert!(by_file.contains_key("a.py"));
        assert!(!by_file.contains_key("b.py"));
    }

    #[tokio::test]
    async fn test_embedding_count_mismatch_drops_vectors() {
        let text = "word ".repeat(500);
        let source = MemorySource::new(&[("notes.txt", text.as_str())]);
        let pipeline = AnalysisPipeline::new(
            options(true, true),
            Arc::new(MockClient::new()),
            Some(Arc::new(ShortProvider)),
        );
        let files = vec!["notes.txt".to_string()];
        let (result, events) = run_collecting(&pipeline, &source, &files, &CancellationToken::new()).await;

        let report = result.unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("mismatch"));
        let items = &analyzed(&events)["notes.txt"];
        let chunks: Vec<&ContextItem> = items.iter().filter(|i| i.kind == ItemKind::Chunk).collect();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.embedding.is_none()));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped() {
        let source = MemorySource::new(&[("a.py", "x = 1\n")]);
        let pipeline = AnalysisPipeline::new(options(true, false), Arc::new(MockClient::new()), None);
        let files = vec!["gone.py".to_string(), "a.py".to_string()];
        let (result, events) = run_collecting(&pipeline, &source, &files, &CancellationToken::new()).await;

        let report = result.unwrap();
        assert_eq!(report.skipped, vec!["gone.py".to_string()]);
        assert_eq!(report.analyzed, vec!["a.py".to_string()]);
        let progress: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                AnalysisEvent::Progress(p) => Some(p.processed),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_chunking_disabled_emits_full_file() {
        let source = MemorySource::new(&[("a.py", "x = 1\n"), ("empty.md", "")]);
        let pipeline = AnalysisPipeline::new(options(false, true), Arc::new(MockClient::new()), None);
        let files = vec!["a.py".to_string(), "empty.md".to_string()];
        let (_, events) = run_collecting(&pipeline, &source, &files, &CancellationToken::new()).await;

        let by_file = analyzed(&events);
        assert_eq!(by_file["a.py"].len(), 1);
        assert_eq!(by_file["a.py"][0].kind, ItemKind::FullFile);
        assert_eq!(by_file["a.py"][0].text(), Some("x = 1\n"));
        assert_eq!(by_file["empty.md"][0].kind, ItemKind::FullFile);
    }

    #[tokio::test]
    async fn test_empty_file_summary_without_call() {
        let source = MemorySource::new(&[("empty.py", "  \n")]);
        let client = ScriptedClient {
            fail_on: Some(("empty.py", Failure::Generic)),
            cancel_on: None,
        };
        let pipeline = AnalysisPipeline::new(options(true, true), Arc::new(client), None);
        let outcome = pipeline
            .analyze_file(&source, "empty.py", &CancellationToken::new())
            .await
            .unwrap();

        match outcome {
            FileOutcome::Analyzed { items, warnings } => {
                assert!(warnings.is_empty());
                assert_eq!(items.len(), 1);
                assert_eq!(summary_of(&items), EMPTY_FILE_SUMMARY);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_worker_finishes_with_report() {
        let source: Arc<dyn ContentSource> = Arc::new(five_files());
        let pipeline = Arc::new(AnalysisPipeline::new(
            options(true, false),
            Arc::new(MockClient::new()),
            None,
        ));
        let files = source.list_files().await.unwrap();
        let mut handle = AnalysisWorker::spawn(pipeline, source, files, 8);

        let mut last = None;
        while let Some(event) = handle.events.recv().await {
            last = Some(event);
        }
        handle.task.await.unwrap();
        assert!(matches!(last, Some(AnalysisEvent::Finished(ref r)) if r.analyzed.len() == 5));
    }
}
