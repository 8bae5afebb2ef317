//! Record source and result sink over a PostgREST endpoint.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use reqwest::Client;
use tracing::{debug, info};

use crate::config::StoreSettings;
use crate::error::StoreError;
use crate::schema::{DocumentRef, Issuer, ResultRow, RECORD_TIMEZONE};

/// Maximum rows per insert request.
pub const INSERT_CHUNK_ROWS: usize = 2000;

const SOURCE_COLUMNS: &str = "message_createdAt,message_description,procNum,caseNum,local_path";

// ============================================================================
// Filters
// ============================================================================

/// Half-open creation-date window `[from, to)` of Kyiv calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// `ts` is Kyiv wall-clock time, as carried by `DocumentRef`.
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        let day = ts.date();
        day >= self.from && day < self.to
    }

    /// UTC instants of local midnight at both ends.
    pub fn utc_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (local_midnight_utc(self.from), local_midnight_utc(self.to))
    }
}

fn local_midnight_utc(day: NaiveDate) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    match RECORD_TIMEZONE.from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&midnight),
    }
}

/// OR-groups of AND-ed keywords matched case-insensitively against a
/// record description. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordFilter {
    groups: Vec<Vec<String>>,
}

impl KeywordFilter {
    pub fn new(groups: Vec<Vec<String>>) -> Self {
        let groups = groups
            .into_iter()
            .map(|group| {
                group
                    .into_iter()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect();
        Self { groups }
    }

    /// Parse `a+b|c` into `(a AND b) OR c`.
    pub fn parse(groups: &str) -> Self {
        Self::new(
            groups.split('|')
                .map(|group| group.split('+').map(str::to_string).collect())
                .collect(),
        )
    }

    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn matches(&self, description: &str) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        let haystack = description.to_lowercase();
        self.groups
            .iter()
            .any(|group| group.iter().all(|k| haystack.contains(&k.to_lowercase())))
    }

    /// PostgREST `or` expression over `column`, e.g.
    /// `(and(col.ilike."*a*",col.ilike."*b*"),and(col.ilike."*c*"))`.
    pub fn to_postgrest(&self, column: &str) -> Option<String> {
        if self.groups.is_empty() {
            return None;
        }
        let groups: Vec<String> = self
            .groups
            .iter()
            .map(|group| {
                let terms: Vec<String> = group
                    .iter()
                    .map(|k| format!("{}.ilike.\"*{}*\"", column, escape_quoted(k)))
                    .collect();
                format!("and({})", terms.join(","))
            })
            .collect();
        Some(format!("({})", groups.join(",")))
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Yields document references awaiting analysis.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Records created inside `range` whose description satisfies
    /// `keywords`. Records without a remote path are never returned.
    async fn recent(
        &self,
        range: &DateRange,
        keywords: &KeywordFilter,
    ) -> Result<Vec<DocumentRef>, StoreError>;
}

/// Receives result rows.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn insert_rows(&self, rows: &[ResultRow]) -> Result<(), StoreError>;

    /// Delete every row of the target table.
    async fn clear_all(&self) -> Result<(), StoreError>;
}

/// Fixed record list filtered in memory with the same rules the remote
/// source applies.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<DocumentRef>,
}

impl StaticSource {
    pub fn new(records: Vec<DocumentRef>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl RecordSource for StaticSource {
    async fn recent(
        &self,
        range: &DateRange,
        keywords: &KeywordFilter,
    ) -> Result<Vec<DocumentRef>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| !r.remote_path.trim().is_empty())
            .filter(|r| range.contains(r.created_at))
            .filter(|r| keywords.matches(&r.description))
            .cloned()
            .collect())
    }
}

// ============================================================================
// PostgREST adapters
// ============================================================================

#[derive(Clone)]
struct RestClient {
    client: Client,
    base_url: String,
    service_key: String,
    schema: String,
}

impl RestClient {
    fn new(settings: &StoreSettings) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.url.clone(),
            service_key: settings.service_key.clone(),
            schema: settings.schema.clone(),
        }
    }

    fn url(&self, relation: &str) -> String {
        format!("{}/{}", self.base_url, relation)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::Rejected { status, body })
    }
}

/// Reads the issuer's document view.
#[derive(Clone)]
pub struct PostgrestSource {
    rest: RestClient,
    view: String,
}

impl PostgrestSource {
    pub fn new(settings: &StoreSettings, issuer: Issuer) -> Self {
        Self {
            rest: RestClient::new(settings),
            view: issuer.source_view(),
        }
    }

    fn query(&self, range: &DateRange, keywords: &KeywordFilter) -> Vec<(String, String)> {
        let (from, to) = range.utc_bounds();
        let mut query = vec![
            ("select".to_string(), SOURCE_COLUMNS.to_string()),
            (
                "message_createdAt".to_string(),
                format!("gte.{}", from.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ),
            (
                "message_createdAt".to_string(),
                format!("lt.{}", to.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ),
            ("local_path".to_string(), "not.is.null".to_string()),
            ("order".to_string(), "message_createdAt.asc".to_string()),
        ];
        if let Some(expr) = keywords.to_postgrest("message_description") {
            query.push(("or".to_string(), expr));
        }
        query
    }
}

#[async_trait]
impl RecordSource for PostgrestSource {
    async fn recent(
        &self,
        range: &DateRange,
        keywords: &KeywordFilter,
    ) -> Result<Vec<DocumentRef>, StoreError> {
        debug!("Querying {} for {} .. {}", self.view, range.from, range.to);
        let resp = self
            .rest
            .client
            .get(self.rest.url(&self.view))
            .header("apikey", &self.rest.service_key)
            .header("Authorization", format!("Bearer {}", self.rest.service_key))
            .header("Accept-Profile", &self.rest.schema)
            .query(&self.query(range, keywords))
            .send()
            .await?;
        let records: Vec<DocumentRef> = RestClient::check(resp).await?.json().await?;
        info!("Loaded {} records from {}", records.len(), self.view);
        Ok(records)
    }
}

/// Writes result rows into the issuer's table.
#[derive(Clone)]
pub struct PostgrestSink {
    rest: RestClient,
    table: &'static str,
}

impl PostgrestSink {
    pub fn new(settings: &StoreSettings, issuer: Issuer) -> Self {
        Self {
            rest: RestClient::new(settings),
            table: issuer.result_table(),
        }
    }
}

#[async_trait]
impl ResultSink for PostgrestSink {
    async fn insert_rows(&self, rows: &[ResultRow]) -> Result<(), StoreError> {
        for (i, chunk) in rows.chunks(INSERT_CHUNK_ROWS).enumerate() {
            let resp = self
                .rest
                .client
                .post(self.rest.url(self.table))
                .header("apikey", &self.rest.service_key)
                .header("Authorization", format!("Bearer {}", self.rest.service_key))
                .header("Content-Profile", &self.rest.schema)
                .header("Prefer", "return=minimal")
                .json(chunk)
                .send()
                .await?;
            RestClient::check(resp).await?;
            debug!("Inserted chunk {} ({} rows) into {}", i + 1, chunk.len(), self.table);
        }
        info!("Inserted {} rows into {}", rows.len(), self.table);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        // PostgREST refuses an unfiltered DELETE.
        let resp = self
            .rest
            .client
            .delete(self.rest.url(self.table))
            .header("apikey", &self.rest.service_key)
            .header("Authorization", format!("Bearer {}", self.rest.service_key))
            .header("Content-Profile", &self.rest.schema)
            .query(&[("createdAt", "not.is.null")])
            .send()
            .await?;
        RestClient::check(resp).await?;
        info!("Cleared {}", self.table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(day: u32, description: &str, path: &str) -> DocumentRef {
        DocumentRef {
            created_at: NaiveDate::from_ymd_opt(2026, 1, day)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            description: description.to_string(),
            proceeding_number: format!("P-{}", day),
            case_number: format!("C-{}", day),
            remote_path: path.to_string(),
        }
    }

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2026, 1, 21).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 24).unwrap(),
        )
    }

    #[test]
    fn test_keyword_groups_parse() {
        let filter = KeywordFilter::parse(" рішення + суду | виконавчий ||+");
        assert_eq!(
            filter.groups(),
            &[
                vec!["рішення".to_string(), "суду".to_string()],
                vec!["виконавчий".to_string()]
            ]
        );
    }

    #[test]
    fn test_keyword_matching() {
        let filter = KeywordFilter::parse("рішення+суду|виконавчий");
        assert!(filter.matches("Копія РІШЕННЯ районного СУДУ"));
        assert!(filter.matches("Виконавчий лист"));
        assert!(!filter.matches("Рішення зборів"));
        assert!(KeywordFilter::default().matches("anything"));
    }

    #[test]
    fn test_postgrest_expression() {
        let filter = KeywordFilter::parse("a+b|c");
        assert_eq!(
            filter.to_postgrest("d").unwrap(),
            r#"(and(d.ilike."*a*",d.ilike."*b*"),and(d.ilike."*c*"))"#
        );
        assert_eq!(KeywordFilter::default().to_postgrest("d"), None);
    }

    #[test]
    fn test_date_range_is_half_open() {
        let r = range();
        assert!(r.contains(record(21, "", "x").created_at));
        assert!(r.contains(record(23, "", "x").created_at));
        assert!(!r.contains(record(24, "", "x").created_at));
        assert!(!r.contains(record(20, "", "x").created_at));
    }

    #[tokio::test]
    async fn test_static_source_filters() {
        let source = StaticSource::new(vec![
            record(21, "Рішення суду", "a.html"),
            record(22, "Рішення суду", ""),
            record(22, "Лист", "b.html"),
            record(25, "Рішення суду", "c.html"),
        ]);
        let records = source
            .recent(&range(), &KeywordFilter::parse("рішення"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].remote_path, "a.html");
    }

    #[test]
    fn test_bounds_follow_kyiv_offset() {
        let (from, to) = range().utc_bounds();
        assert_eq!(from.to_rfc3339_opts(SecondsFormat::Secs, true), "2026-01-20T22:00:00Z");
        assert_eq!(to.to_rfc3339_opts(SecondsFormat::Secs, true), "2026-01-23T22:00:00Z");

        // Across the March switch to summer time.
        let spring = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 3, 28).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 30).unwrap(),
        );
        let (from, to) = spring.utc_bounds();
        assert_eq!(from.to_rfc3339_opts(SecondsFormat::Secs, true), "2026-03-27T22:00:00Z");
        assert_eq!(to.to_rfc3339_opts(SecondsFormat::Secs, true), "2026-03-29T21:00:00Z");

        let late_evening_utc: DocumentRef =
            serde_json::from_str(r#"{"message_createdAt":"2026-01-23T22:30:00Z","local_path":"a.html"}"#).unwrap();
        assert!(!range().contains(late_evening_utc.created_at));
    }

    #[test]
    fn test_source_query_parameters() {
        let settings = StoreSettings {
            url: "http://localhost:3000".to_string(),
            service_key: "k".to_string(),
            schema: "dbo".to_string(),
        };
        let source = PostgrestSource::new(&settings, Issuer::Ace);
        assert_eq!(source.view, "_message_documents_Ace");
        let query = source.query(&range(), &KeywordFilter::parse("x"));
        assert!(query.contains(&("message_createdAt".to_string(), "gte.2026-01-20T22:00:00Z".to_string())));
        assert!(query.contains(&("message_createdAt".to_string(), "lt.2026-01-23T22:00:00Z".to_string())));
        assert!(query.contains(&("local_path".to_string(), "not.is.null".to_string())));
        assert!(query.iter().any(|(k, _)| k == "or"));
    }
}
