#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use lexis_backend::cache::MemoryCache;
use lexis_backend::config::{CascadeSettings, PipelineSettings};
use lexis_backend::db::MemoryDictionary;
use lexis_backend::lexicon::{DictionaryEntry, LexiconStore, INSERT_MARKER};
use lexis_backend::services::contribution::ContributionTarget;
use lexis_backend::services::github::{PullRequest, PullRequestDraft, RepoFile, VcsError, VcsHost};
use lexis_backend::services::learning::{LearningConfig, StoreOptions};
use lexis_backend::services::llm_provider::{InferenceBackend, InferenceRequest, LLMError};
use lexis_backend::services::wiktionary::{ExternalEntry, ExternalLexicon, LexiconFetchError};
use lexis_backend::state::{AppState, StateComponents};
use lexis_backend::store::MemoryLedgerStore;

pub const PR_NUMBER: u64 = 42;

/// Scripted model host: pops queued replies, then repeats the fallback.
pub struct MockInference {
    available: bool,
    queued: Mutex<VecDeque<Result<String, ()>>>,
    fallback: Option<String>,
    models: Mutex<Vec<String>>,
    first_delay: Mutex<Option<Duration>>,
}

impl MockInference {
    pub fn replying(text: &str) -> Self {
        Self {
            available: true,
            queued: Mutex::new(VecDeque::new()),
            fallback: Some(text.to_string()),
            models: Mutex::new(Vec::new()),
            first_delay: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            available: true,
            queued: Mutex::new(VecDeque::new()),
            fallback: None,
            models: Mutex::new(Vec::new()),
            first_delay: Mutex::new(None),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::failing()
        }
    }

    pub fn then_fail(self) -> Self {
        self.queued.lock().push_back(Err(()));
        self
    }

    /// The first call stalls for `delay` before answering.
    pub fn slow_first(self, delay: Duration) -> Self {
        *self.first_delay.lock() = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.models.lock().len()
    }

    pub fn models(&self) -> Vec<String> {
        self.models.lock().clone()
    }
}

#[async_trait]
impl InferenceBackend for MockInference {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn run(&self, model: &str, _request: &InferenceRequest) -> Result<String, LLMError> {
        self.models.lock().push(model.to_string());
        let delay = self.first_delay.lock().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.queued.lock().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(())) => Err(LLMError::EmptyChoices),
            None => self.fallback.clone().ok_or(LLMError::EmptyChoices),
        }
    }
}

#[derive(Default)]
pub struct MockLexicon {
    entry: Option<ExternalEntry>,
    calls: AtomicUsize,
}

impl MockLexicon {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_entry(entry: ExternalEntry) -> Self {
        Self {
            entry: Some(entry),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalLexicon for MockLexicon {
    async fn lookup(&self, _word: &str, _lang: &str) -> Result<Option<ExternalEntry>, LexiconFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.entry.clone())
    }
}

/// In-memory repository host holding one lexicon file.
pub struct MockVcs {
    file: Mutex<String>,
    committed: Mutex<Option<String>>,
    branches: Mutex<Vec<String>>,
    pull_requests: AtomicUsize,
    fail_pull_request: bool,
    delay: Duration,
}

impl MockVcs {
    pub fn new(existing_lines: &[&str]) -> Self {
        let mut file = String::from("# lexicon\n");
        for line in existing_lines {
            file.push_str(line);
            file.push('\n');
        }
        file.push_str(INSERT_MARKER);
        file.push('\n');
        Self {
            file: Mutex::new(file),
            committed: Mutex::new(None),
            branches: Mutex::new(Vec::new()),
            pull_requests: AtomicUsize::new(0),
            fail_pull_request: false,
            delay: Duration::ZERO,
        }
    }

    pub fn failing_pull_requests(mut self) -> Self {
        self.fail_pull_request = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn committed(&self) -> Option<String> {
        self.committed.lock().clone()
    }

    pub fn branches(&self) -> Vec<String> {
        self.branches.lock().clone()
    }

    pub fn pull_requests(&self) -> usize {
        self.pull_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VcsHost for MockVcs {
    async fn get_ref_sha(&self, _branch: &str) -> Result<String, VcsError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok("base-sha".to_string())
    }

    async fn create_branch(&self, branch: &str, _from_sha: &str) -> Result<(), VcsError> {
        self.branches.lock().push(branch.to_string());
        Ok(())
    }

    async fn get_file(&self, _path: &str, _branch: &str) -> Result<RepoFile, VcsError> {
        Ok(RepoFile {
            content: self.file.lock().clone(),
            sha: "blob-sha".to_string(),
        })
    }

    async fn update_file(
        &self,
        _path: &str,
        _branch: &str,
        content: &str,
        _sha: &str,
        _message: &str,
    ) -> Result<(), VcsError> {
        *self.committed.lock() = Some(content.to_string());
        Ok(())
    }

    async fn open_pull_request(&self, _draft: &PullRequestDraft) -> Result<PullRequest, VcsError> {
        if self.fail_pull_request {
            return Err(VcsError::Decode {
                operation: "open pull request",
            });
        }
        self.pull_requests.fetch_add(1, Ordering::SeqCst);
        Ok(PullRequest {
            number: PR_NUMBER,
            html_url: format!("https://github.com/example/lexicon/pull/{PR_NUMBER}"),
        })
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub inference: Arc<MockInference>,
    pub external: Arc<MockLexicon>,
    pub vcs: Option<Arc<MockVcs>>,
    pub ledger: Arc<MemoryLedgerStore>,
}

pub struct HarnessBuilder {
    inference: MockInference,
    external: MockLexicon,
    vcs: Option<MockVcs>,
    learning: LearningConfig,
    dictionary: MemoryDictionary,
    attempt_timeout: Duration,
}

impl HarnessBuilder {
    pub fn inference(mut self, inference: MockInference) -> Self {
        self.inference = inference;
        self
    }

    pub fn external(mut self, external: MockLexicon) -> Self {
        self.external = external;
        self
    }

    pub fn vcs(mut self, vcs: MockVcs) -> Self {
        self.vcs = Some(vcs);
        self
    }

    pub fn learning(mut self, learning: LearningConfig) -> Self {
        self.learning = learning;
        self
    }

    pub fn dictionary(mut self, dictionary: MemoryDictionary) -> Self {
        self.dictionary = dictionary;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn build(self) -> TestHarness {
        let inference = Arc::new(self.inference);
        let external = Arc::new(self.external);
        let vcs = self.vcs.map(Arc::new);
        let ledger = Arc::new(MemoryLedgerStore::new());

        let state = AppState::from_components(StateComponents {
            lexicon: Arc::new(LexiconStore::embedded().expect("embedded lexicon parses")),
            kv: Arc::new(MemoryCache::new()),
            dictionary: Arc::new(self.dictionary),
            ledger: ledger.clone(),
            inference: inference.clone(),
            external: external.clone(),
            vcs: vcs.clone().map(|v| v as Arc<dyn VcsHost>),
            target: vcs.as_ref().map(|_| test_target()),
            pipeline: PipelineSettings::default(),
            cascade: CascadeSettings {
                fast_model: "fast-model".to_string(),
                fallback_model: "fallback-model".to_string(),
                attempt_timeout: self.attempt_timeout,
            },
            learning: self.learning,
            redis: None,
        });

        TestHarness {
            state,
            inference,
            external,
            vcs,
            ledger,
        }
    }
}

pub fn harness() -> HarnessBuilder {
    HarnessBuilder {
        inference: MockInference::unavailable(),
        external: MockLexicon::empty(),
        vcs: None,
        learning: LearningConfig::default(),
        dictionary: MemoryDictionary::new(),
        attempt_timeout: Duration::from_secs(2),
    }
}

pub fn test_target() -> ContributionTarget {
    ContributionTarget {
        base_branch: "main".to_string(),
        lexicon_path: "data/lexicon.jsonl".to_string(),
        marker: INSERT_MARKER.to_string(),
        branch_prefix: "learned-words/".to_string(),
    }
}

pub fn entry(lang: &str, text: &str) -> DictionaryEntry {
    DictionaryEntry {
        translations: translations(lang, text),
        ..DictionaryEntry::default()
    }
}

pub fn translations(lang: &str, text: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(lang.to_string(), text.to_string())])
}

pub fn with_confidence(confidence: f64) -> StoreOptions {
    StoreOptions {
        confidence: Some(confidence),
        ..StoreOptions::default()
    }
}
