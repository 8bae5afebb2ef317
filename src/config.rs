//! Runtime settings.
//!
//! Built once at startup from the process environment (with `.env` support
//! through `dotenvy` in `main`) and passed by reference into constructors.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration as DateDuration, Local, NaiveDate};
use encoding_rs::Encoding;

use crate::retry::RetryPolicy;
use crate::schema::Issuer;
use crate::store::{DateRange, KeywordFilter};
use crate::text::default_encodings;

pub const DEFAULT_API_VERSION: &str = "2025-04-01-preview";
pub const DEFAULT_BASE_FOLDER: &str = r"Utils\Storage";
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Which batch the binary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Decisions,
    ExecutionDocs,
    CheckDir,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "decisions" => Ok(RunMode::Decisions),
            "execution-docs" | "execution_docs" => Ok(RunMode::ExecutionDocs),
            "check-dir" | "check_dir" => Ok(RunMode::CheckDir),
            other => Err(format!("unknown run mode: {}", other)),
        }
    }
}

/// Azure OpenAI deployment used for both model passes.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_min_wait: Duration,
    pub retry_max_wait: Duration,
}

impl ModelSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.timeout,
            max_attempts: self.retry_attempts,
            min_wait: self.retry_min_wait,
            max_wait: self.retry_max_wait,
        }
    }
}

/// Network share holding the documents. Credentials belong to the mount;
/// `username` and `domain` only label the session in logs.
#[derive(Debug, Clone)]
pub struct ShareSettings {
    pub server: String,
    pub share: String,
    pub username: String,
    pub domain: String,
    /// Local mount point of `\\server\share`.
    pub mount_root: PathBuf,
    pub base_folder: String,
}

/// PostgREST endpoint for record source and result sink.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub url: String,
    pub service_key: String,
    pub schema: String,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub issuer: Issuer,
    pub work_dir: PathBuf,
    pub concurrency: usize,
    pub run_mode: RunMode,
    pub date_range: DateRange,
    pub keywords: KeywordFilter,
    pub check_dir: Option<PathBuf>,
    pub clear_before_run: bool,
    /// Decode order for downloaded documents.
    pub encodings: Vec<&'static Encoding>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Absent when the model is not configured; analysis then runs regex only.
    pub model: Option<ModelSettings>,
    pub share: Option<ShareSettings>,
    pub store: Option<StoreSettings>,
    pub pipeline: PipelineSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pipeline = pipeline_settings(&lookup)?;
        let needs_remote = pipeline.run_mode != RunMode::CheckDir;

        Ok(Self {
            model: model_settings(&lookup)?,
            share: if needs_remote { Some(share_settings(&lookup)?) } else { None },
            store: if needs_remote { Some(store_settings(&lookup)?) } else { None },
            pipeline,
        })
    }
}

fn model_settings(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Option<ModelSettings>> {
    let (Some(endpoint), Some(api_key), Some(deployment)) = (
        optional(lookup, "AZURE_OPENAI_ENDPOINT"),
        optional(lookup, "AZURE_API_KEY"),
        optional(lookup, "AZURE_MODEL"),
    ) else {
        return Ok(None);
    };

    Ok(Some(ModelSettings {
        endpoint: endpoint.trim_end_matches('/').to_string(),
        api_key,
        deployment,
        api_version: optional(lookup, "AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        timeout: Duration::from_secs(parsed(lookup, "LLM_TIMEOUT_SECS", 60)?),
        retry_attempts: parsed(lookup, "LLM_RETRY_ATTEMPTS", 3)?,
        retry_min_wait: Duration::from_secs(parsed(lookup, "LLM_RETRY_MIN_WAIT_SECS", 1)?),
        retry_max_wait: Duration::from_secs(parsed(lookup, "LLM_RETRY_MAX_WAIT_SECS", 10)?),
    }))
}

fn share_settings(lookup: &dyn Fn(&str) -> Option<String>) -> Result<ShareSettings> {
    Ok(ShareSettings {
        server: required(lookup, "SMB_SERVER")?,
        share: required(lookup, "SMB_SHARE")?,
        username: optional(lookup, "SMB_USERNAME").unwrap_or_default(),
        domain: optional(lookup, "SMB_DOMAIN").unwrap_or_default(),
        mount_root: PathBuf::from(required(lookup, "SHARE_MOUNT_ROOT")?),
        base_folder: optional(lookup, "SHARE_BASE_FOLDER")
            .unwrap_or_else(|| DEFAULT_BASE_FOLDER.to_string()),
    })
}

fn store_settings(lookup: &dyn Fn(&str) -> Option<String>) -> Result<StoreSettings> {
    Ok(StoreSettings {
        url: required(lookup, "STORE_URL")?.trim_end_matches('/').to_string(),
        service_key: required(lookup, "STORE_SERVICE_KEY")?,
        schema: optional(lookup, "STORE_SCHEMA").unwrap_or_else(|| "dbo".to_string()),
    })
}

fn pipeline_settings(lookup: &dyn Fn(&str) -> Option<String>) -> Result<PipelineSettings> {
    let today = Local::now().date_naive();
    let from = parsed_date(lookup, "DATE_FROM")?.unwrap_or(today - DateDuration::days(1));
    let to = parsed_date(lookup, "DATE_TO")?.unwrap_or(today);
    if from >= to {
        anyhow::bail!("DATE_FROM ({}) must be before DATE_TO ({})", from, to);
    }

    let concurrency: usize = parsed(lookup, "BATCH_CONCURRENCY", DEFAULT_CONCURRENCY)?;
    if concurrency == 0 {
        anyhow::bail!("BATCH_CONCURRENCY must be at least 1");
    }

    let run_mode: RunMode = parsed(lookup, "RUN_MODE", RunMode::Decisions)?;
    let check_dir = optional(lookup, "CHECK_DIR").map(PathBuf::from);
    if run_mode == RunMode::CheckDir && check_dir.is_none() {
        anyhow::bail!("RUN_MODE=check-dir requires CHECK_DIR");
    }

    Ok(PipelineSettings {
        issuer: parsed(lookup, "ISSUER", Issuer::Unit)?,
        work_dir: PathBuf::from(optional(lookup, "WORK_DIR").unwrap_or_else(|| "tmp".to_string())),
        concurrency,
        run_mode,
        date_range: DateRange::new(from, to),
        keywords: optional(lookup, "KEYWORD_GROUPS")
            .map(|raw| KeywordFilter::parse(&raw))
            .unwrap_or_default(),
        check_dir,
        clear_before_run: optional(lookup, "CLEAR_BEFORE_RUN")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false),
        encodings: encodings(lookup)?,
    })
}

fn encodings(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Vec<&'static Encoding>> {
    let Some(raw) = optional(lookup, "DOCUMENT_ENCODINGS") else {
        return Ok(default_encodings());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(|label| {
            Encoding::for_label(label.as_bytes())
                .with_context(|| format!("unknown encoding {:?} in DOCUMENT_ENCODINGS", label))
        })
        .collect()
}

// ============================================================================
// Lookup helpers
// ============================================================================

fn optional(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    optional(lookup, key).with_context(|| format!("{} environment variable not set", key))
}

fn parsed<T>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match optional(lookup, key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("invalid {} value {:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

fn parsed_date(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<NaiveDate>> {
    optional(lookup, key)
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .with_context(|| format!("invalid {} value {:?}, expected YYYY-MM-DD", key, raw))
        })
        .transpose()
}
