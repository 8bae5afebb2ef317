//! Per-record processing: fetch a scoped copy, decode, analyze.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use encoding_rs::Encoding;
use tracing::{debug, error, info};

use crate::decision::DecisionAnalyzer;
use crate::error::ProcessError;
use crate::execution_doc::ExecutionDocAnalyzer;
use crate::fetch::FileFetcher;
use crate::invoker::ModelInvoker;
use crate::schema::{DecisionAnalysisResult, ExecutionDocAnalysisResult};
use crate::text::{decode_bytes, default_encodings};

/// Results for a file analyzed in place.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalAnalysis {
    pub decision: DecisionAnalysisResult,
    pub execution: ExecutionDocAnalysisResult,
}

/// Turns a remote reference into analysis results. Every failure is logged
/// here and surfaces as `None`.
#[derive(Clone)]
pub struct FileProcessor {
    fetcher: Arc<dyn FileFetcher>,
    decisions: DecisionAnalyzer,
    exec_docs: ExecutionDocAnalyzer,
    work_dir: PathBuf,
    encodings: Vec<&'static Encoding>,
}

impl FileProcessor {
    pub fn new(fetcher: Arc<dyn FileFetcher>, invoker: Option<ModelInvoker>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            decisions: DecisionAnalyzer::new(invoker.clone()),
            exec_docs: ExecutionDocAnalyzer::new(invoker),
            work_dir: work_dir.into(),
            encodings: default_encodings(),
        }
    }

    /// Replace the decode order.
    pub fn with_encodings(mut self, encodings: Vec<&'static Encoding>) -> Self {
        self.encodings = encodings;
        self
    }

    /// Decision outcome plus facts from the execution analysis of the same
    /// text. Execution values win where both found one.
    pub async fn process_decision(&self, remote: &str) -> Option<DecisionAnalysisResult> {
        let text = self.load_or_log(remote).await?;
        let decision = self.decisions.analyze(&text).await;
        let exec = self.exec_docs.analyze(&text).await;
        Some(decision.with_execution_facts(&exec))
    }

    pub async fn process_execution_doc(&self, remote: &str) -> Option<ExecutionDocAnalysisResult> {
        let text = self.load_or_log(remote).await?;
        Some(self.exec_docs.analyze(&text).await)
    }

    /// Both analyses of a local file, without retrieval.
    pub async fn analyze_local(&self, path: &Path) -> Result<LocalAnalysis, ProcessError> {
        let raw = tokio::fs::read(path).await.map_err(|source| ProcessError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let text = decode_bytes(&raw, &self.encodings);
        Ok(LocalAnalysis {
            decision: self.decisions.analyze(&text).await,
            execution: self.exec_docs.analyze(&text).await,
        })
    }

    async fn load_or_log(&self, remote: &str) -> Option<String> {
        match self.load_text(remote).await {
            Ok(text) => Some(text),
            Err(e) => {
                error!("Skipping {}: {}", remote, e);
                None
            }
        }
    }

    /// Fetch `remote` into a private temporary directory, read it and
    /// remove the directory before returning.
    pub async fn load_text(&self, remote: &str) -> Result<String, ProcessError> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|source| ProcessError::WorkDir {
                path: self.work_dir.clone(),
                source,
            })?;

        let scratch = tempfile::Builder::new()
            .prefix("doc-")
            .tempdir_in(&self.work_dir)
            .map_err(|source| ProcessError::WorkDir {
                path: self.work_dir.clone(),
                source,
            })?;

        let local = self.fetcher.fetch(remote, scratch.path()).await?;
        let raw = tokio::fs::read(&local).await.map_err(|source| ProcessError::Read {
            path: local.clone(),
            source,
        })?;

        if let Err(e) = scratch.close() {
            debug!("Could not remove temporary copy of {}: {}", remote, e);
        }

        let text = decode_bytes(&raw, &self.encodings);
        info!("Loaded {} ({} bytes, {} chars)", remote, raw.len(), text.chars().count());
        Ok(text)
    }
}
