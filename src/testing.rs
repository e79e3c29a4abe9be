//! In-memory collaborators for unit tests.

use crate::embedding::Embedder;
use crate::error::{ExtractionFailure, QuarryError, Result};
use crate::extract::{DocumentFormat, TextExtractor};
use crate::generation::{GenerationRequest, Generator};
use crate::store::{KnowledgeStore, SqliteStore};
use crate::transcription::{AudioTranscript, Transcriber};
use crate::video::{TranscriptProvider, VideoTranscript};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Store with a provisioned vector index of the given size.
pub async fn indexed_store(dimensions: usize) -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.ensure_vector_index(dimensions).await.unwrap();
    store
}

/// Embedder producing bag-of-words vectors, with optional fixed vectors per text.
pub struct MockEmbedder {
    dimensions: usize,
    fixed: HashMap<String, Vec<f32>>,
    fail_next: AtomicBool,
    embed_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fixed: HashMap::new(),
            fail_next: AtomicBool::new(false),
            embed_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// Return `vector` whenever exactly `text` is embedded.
    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.fixed.insert(text.to_string(), vector);
        self
    }

    /// Make the next call fail with an embedding error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.fixed.get(text) {
            return v.clone();
        }
        let mut v = vec![0.0; self.dimensions];
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            v[(hasher.finish() as usize) % self.dimensions] += 1.0;
        }
        v
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(QuarryError::Embedding("mock failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Generator returning a fixed answer and recording every request.
pub struct MockGenerator {
    answer: String,
    reject_first: Mutex<Option<(String, String)>>,
    failure: Option<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            reject_first: Mutex::new(None),
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with a generation error.
    pub fn failing(message: &str) -> Self {
        let mut generator = Self::new("");
        generator.failure = Some(message.to_string());
        generator
    }

    /// The first call is rejected as an unsupported parameter.
    pub fn rejecting_first(self, param: &str, message: &str) -> Self {
        *self.reject_first.lock().unwrap() = Some((param.to_string(), message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some((param, message)) = self.reject_first.lock().unwrap().take() {
            return Err(QuarryError::UnsupportedParameter { param, message });
        }
        if let Some(message) = &self.failure {
            return Err(QuarryError::Generation(message.clone()));
        }
        Ok(self.answer.clone())
    }
}

/// Transcript provider backed by a map of known videos.
#[derive(Default)]
pub struct MockTranscriptProvider {
    videos: Mutex<HashMap<String, VideoTranscript>>,
    playlist: Mutex<Vec<String>>,
    fetches: AtomicUsize,
}

impl MockTranscriptProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_video(&self, video_id: &str, transcript: VideoTranscript) {
        self.videos.lock().unwrap().insert(video_id.to_string(), transcript);
    }

    pub fn set_playlist(&self, video_ids: &[&str]) {
        *self.playlist.lock().unwrap() = video_ids.iter().map(|s| s.to_string()).collect();
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptProvider for MockTranscriptProvider {
    async fn fetch_transcript(&self, video_id: &str) -> Result<VideoTranscript> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.videos
            .lock()
            .unwrap()
            .get(video_id)
            .cloned()
            .ok_or_else(|| ExtractionFailure::VideoUnavailable(video_id.to_string()).into())
    }

    async fn list_playlist(&self, _playlist_id: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self.playlist.lock().unwrap().iter().take(limit).cloned().collect())
    }
}

/// Extractor returning fixed text for any file.
pub struct MockExtractor {
    text: String,
}

impl MockExtractor {
    pub fn returning(text: &str) -> Self {
        Self { text: text.to_string() }
    }
}

#[async_trait]
impl TextExtractor for MockExtractor {
    async fn extract(&self, _path: &Path, _format: DocumentFormat) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// Transcriber returning a fixed transcript for any file.
pub struct MockTranscriber {
    transcript: AudioTranscript,
}

impl MockTranscriber {
    pub fn returning(transcript: AudioTranscript) -> Self {
        Self { transcript }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<AudioTranscript> {
        Ok(self.transcript.clone())
    }
}
