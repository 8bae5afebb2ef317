//! Batch runs: record source → file processor → result sink.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::PipelineSettings;
use crate::error::{ProcessError, StoreError};
use crate::processor::{FileProcessor, LocalAnalysis};
use crate::scheduler::BatchScheduler;
use crate::schema::{DocumentRef, Extracted, Issuer, ResultRow};
use crate::store::{DateRange, KeywordFilter, RecordSource, ResultSink};

/// Counters of one finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub inserted: usize,
}

/// Coordinates reading records, processing their files and writing rows.
pub struct ParserService {
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn ResultSink>,
    processor: FileProcessor,
    scheduler: BatchScheduler,
    issuer: Issuer,
    range: DateRange,
    keywords: KeywordFilter,
    clear_before_run: bool,
}

impl ParserService {
    pub fn new(
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn ResultSink>,
        processor: FileProcessor,
        pipeline: &PipelineSettings,
    ) -> Self {
        Self {
            source,
            sink,
            processor,
            scheduler: BatchScheduler::new(pipeline.concurrency),
            issuer: pipeline.issuer,
            range: pipeline.date_range,
            keywords: pipeline.keywords.clone(),
            clear_before_run: pipeline.clear_before_run,
        }
    }

    /// Classify decision documents and store one row per processed record.
    pub async fn run_decisions(&self) -> Result<RunSummary, StoreError> {
        let span = info_span!("decisions", run_id = %new_run_id(), issuer = self.issuer.as_str());
        async {
            let records = self.load_records().await?;
            let processor = self.processor.clone();
            let issuer = self.issuer;

            let report = self
                .scheduler
                .run("decisions", records, move |record: DocumentRef| {
                    let processor = processor.clone();
                    async move {
                        let result = processor.process_decision(&record.remote_path).await?;
                        info!(
                            "{} / {}: {}",
                            record.case_number, record.proceeding_number, result.decision
                        );
                        Some(ResultRow::from_decision(&record, &result, issuer))
                    }
                })
                .await;

            self.store(report.processed, report.skipped).await
        }
        .instrument(span)
        .await
    }

    /// Extract execution document facts and store one row per processed record.
    pub async fn run_execution_docs(&self) -> Result<RunSummary, StoreError> {
        let span = info_span!("execution_docs", run_id = %new_run_id(), issuer = self.issuer.as_str());
        async {
            let records = self.load_records().await?;
            let processor = self.processor.clone();
            let issuer = self.issuer;

            let report = self
                .scheduler
                .run("execution_docs", records, move |record: DocumentRef| {
                    let processor = processor.clone();
                    async move {
                        let result = processor.process_execution_doc(&record.remote_path).await?;
                        info!(
                            "{} / {}: mode={}",
                            record.case_number,
                            record.proceeding_number,
                            result.mode.as_str()
                        );
                        Some(ResultRow::from_execution_doc(&record, &result, issuer))
                    }
                })
                .await;

            self.store(report.processed, report.skipped).await
        }
        .instrument(span)
        .await
    }

    async fn load_records(&self) -> Result<Vec<DocumentRef>, StoreError> {
        if self.clear_before_run {
            warn!("Clearing result table before run");
            self.sink.clear_all().await?;
        }
        let records = self.source.recent(&self.range, &self.keywords).await?;
        info!(
            "{} records between {} and {}",
            records.len(),
            self.range.from,
            self.range.to
        );
        Ok(records)
    }

    async fn store(&self, rows: Vec<ResultRow>, skipped: usize) -> Result<RunSummary, StoreError> {
        if !rows.is_empty() {
            self.sink.insert_rows(&rows).await?;
        }
        let summary = RunSummary {
            processed: rows.len(),
            skipped,
            inserted: rows.len(),
        };
        info!(
            "Run complete: {} processed, {} skipped, {} rows inserted",
            summary.processed, summary.skipped, summary.inserted
        );
        Ok(summary)
    }
}

fn new_run_id() -> String {
    format!("run_{}", Uuid::new_v4().simple())
}

// ============================================================================
// Local check mode
// ============================================================================

/// Analyze every `*.html` file of `dir` (every file when there are none) and
/// log one line per file. Unreadable files are logged and left out.
pub async fn check_dir(processor: &FileProcessor, dir: &Path) -> Result<Vec<(PathBuf, LocalAnalysis)>, ProcessError> {
    let files = list_check_files(dir).await?;
    info!("Checking {} files from {:?}", files.len(), dir);

    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        match processor.analyze_local(&path).await {
            Ok(analysis) => {
                info!("{} -> {}", name, describe(&analysis));
                results.push((path, analysis));
            }
            Err(e) => warn!("{} -> error: {}", name, e),
        }
    }
    Ok(results)
}

async fn list_check_files(dir: &Path) -> Result<Vec<PathBuf>, ProcessError> {
    let read_err = |source: std::io::Error| ProcessError::Read {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file {
            files.push(entry.path());
        }
    }
    files.sort();

    let html: Vec<PathBuf> = files
        .iter()
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("html"))
        })
        .cloned()
        .collect();
    Ok(if html.is_empty() { files } else { html })
}

fn describe(analysis: &LocalAnalysis) -> String {
    let exec = &analysis.execution;
    format!(
        "{} | mode={} main={} fee={} aid={} issued={}",
        analysis.decision.decision,
        exec.mode.as_str(),
        field(&exec.main_amount),
        field(&exec.court_fee),
        field(&exec.legal_aid),
        field(&exec.execution_doc_issue_date),
    )
}

fn field<T: std::fmt::Display>(value: &Option<Extracted<T>>) -> String {
    match value {
        Some(f) => format!("{} ({}, {:.2})", f.value, f.source().as_str(), f.provenance.confidence),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MemoryFetcher;
    use crate::fetch::FileFetcher;
    use crate::schema::{Decision, DocKind};
    use crate::store::StaticSource;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    const WRIT: &str = "ВИКОНАВЧИЙ ЛИСТ. Стягнути заборгованість у розмірі 12724 грн. \
        Стягнути судовий збір 2422.40 грн. Виконавчий лист видано 03.02.2026.";

    const DECISION: &str = "РІШЕННЯ 12 січня 2026 року. Суд розглянув справу. \
        УХВАЛИВ: У задоволенні позову відмовити.";

    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<Vec<ResultRow>>,
        cleared: Mutex<usize>,
    }

    #[async_trait]
    impl ResultSink for MemorySink {
        async fn insert_rows(&self, rows: &[ResultRow]) -> Result<(), StoreError> {
            self.rows.lock().unwrap().extend_from_slice(rows);
            Ok(())
        }

        async fn clear_all(&self) -> Result<(), StoreError> {
            self.rows.lock().unwrap().clear();
            *self.cleared.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn record(n: u32, path: &str) -> DocumentRef {
        DocumentRef {
            created_at: NaiveDate::from_ymd_opt(2026, 2, 10)
                .unwrap()
                .and_hms_opt(9, n, 0)
                .unwrap(),
            description: "Виконавчий лист".to_string(),
            proceeding_number: format!("7{}", n),
            case_number: format!("200/{}/26", n),
            remote_path: path.to_string(),
        }
    }

    fn pipeline(clear_before_run: bool) -> PipelineSettings {
        PipelineSettings {
            issuer: Issuer::Ace,
            work_dir: PathBuf::from("unused"),
            concurrency: 2,
            run_mode: crate::config::RunMode::ExecutionDocs,
            date_range: DateRange::new(
                NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
                NaiveDate::from_ymd_opt(2026, 2, 11).unwrap(),
            ),
            keywords: KeywordFilter::parse("виконавчий"),
            check_dir: None,
            clear_before_run,
            encodings: crate::text::default_encodings(),
        }
    }

    fn service(
        fetcher: MemoryFetcher,
        records: Vec<DocumentRef>,
        sink: Arc<MemorySink>,
        work_dir: &Path,
        clear_before_run: bool,
    ) -> ParserService {
        let fetcher: Arc<dyn FileFetcher> = Arc::new(fetcher);
        ParserService::new(
            Arc::new(StaticSource::new(records)),
            sink,
            FileProcessor::new(fetcher, None, work_dir),
            &pipeline(clear_before_run),
        )
    }

    #[tokio::test]
    async fn test_one_failed_retrieval_skips_one_record() {
        let work = tempfile::tempdir().unwrap();
        let fetcher = MemoryFetcher::default()
            .with("1.html", WRIT)
            .with("2.html", WRIT)
            .with("4.html", WRIT)
            .with("5.html", WRIT);
        let records = (1..=5).map(|n| record(n, &format!("{}.html", n))).collect();
        let sink = Arc::new(MemorySink::default());

        let summary = service(fetcher, records, sink.clone(), work.path(), false)
            .run_execution_docs()
            .await
            .unwrap();

        assert_eq!(summary.processed, 4);
        assert_eq!(summary.skipped, 1);
        let rows = sink.rows.lock().unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.doc_type == DocKind::ExecutionDoc));
        assert!(rows.iter().all(|r| r.main_amount == Some(Decimal::from(12724))));
        assert!(rows.iter().all(|r| r.collector == Issuer::Ace));
        assert!(!rows.iter().any(|r| r.local_file_path == "3.html"));
    }

    #[tokio::test]
    async fn test_decision_run_writes_outcome() {
        let work = tempfile::tempdir().unwrap();
        let fetcher = MemoryFetcher::default().with("d.html", DECISION);
        let sink = Arc::new(MemorySink::default());

        let summary = service(fetcher, vec![record(1, "d.html")], sink.clone(), work.path(), true)
            .run_decisions()
            .await
            .unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(*sink.cleared.lock().unwrap(), 1);
        let rows = sink.rows.lock().unwrap();
        assert_eq!(rows[0].decision, Decision::Negative);
        assert_eq!(rows[0].doc_type, DocKind::Decision);
        assert_eq!(rows[0].date_of_decision, NaiveDate::from_ymd_opt(2026, 1, 12));
    }

    #[tokio::test]
    async fn test_records_outside_filter_are_not_processed() {
        let work = tempfile::tempdir().unwrap();
        let mut other = record(2, "2.html");
        other.description = "Ухвала суду".to_string();
        let empty_path = record(3, "");
        let fetcher = MemoryFetcher::default().with("1.html", WRIT).with("2.html", WRIT);
        let sink = Arc::new(MemorySink::default());

        let summary = service(
            fetcher,
            vec![record(1, "1.html"), other, empty_path],
            sink.clone(),
            work.path(),
            false,
        )
        .run_execution_docs()
        .await
        .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn test_check_dir_prefers_html() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.html"), WRIT).unwrap();
        std::fs::write(dir.path().join("a.HTML"), DECISION).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let processor = FileProcessor::new(Arc::new(MemoryFetcher::default()), None, dir.path());
        let results = check_dir(&processor, dir.path()).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].0.ends_with("a.HTML"));
        assert_eq!(results[0].1.decision.decision, Decision::Negative);
        assert_eq!(results[1].1.execution.main_amount_value(), Some(Decimal::from(12724)));
    }

    #[tokio::test]
    async fn test_check_dir_without_html_takes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("writ.txt"), WRIT).unwrap();

        let processor = FileProcessor::new(Arc::new(MemoryFetcher::default()), None, dir.path());
        let results = check_dir(&processor, dir.path()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(check_dir(&processor, &dir.path().join("absent")).await.is_err());
    }
}
