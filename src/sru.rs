//! Client for the government SRU search service (zoekservice.overheid.nl).
//!
//! Each configured connection (`BWB` for national law, `CVDR` for local
//! regulations) is queried concurrently; a failing connection only logs.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use regex::Regex;

use crate::config::{RegistryConfig, UpstreamConfig};
use crate::models::LawRecord;
use crate::upstream::{guarded, CallError, CircuitBreaker, RetryPolicy};

static LAW_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{3,64}$").expect("law id pattern is valid"));

/// Search and download access to the official law registry.
#[async_trait]
pub trait LawRegistry: Send + Sync {
    /// Laws whose title matches `query`, across all connections.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<LawRecord>>;

    /// The registry record for one identifier, if any.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<LawRecord>>;

    /// Raw text (XML or HTML) of a law.
    async fn fetch_law_text(&self, identifier: &str) -> Result<String>;
}

/// Accept only identifiers that are safe to put in a URL path.
pub fn is_valid_law_id(identifier: &str) -> bool {
    LAW_ID_RE.is_match(identifier)
}

fn cql_quote(value: &str) -> String {
    let escaped = value.trim().replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn title_index(connection: &str) -> &'static str {
    if connection.eq_ignore_ascii_case("BWB") {
        "overheidbwb.titel"
    } else {
        "dcterms.title"
    }
}

/// CQL title query for one connection.
pub fn build_cql(query: &str, connection: &str) -> String {
    format!("{} any {}", title_index(connection), cql_quote(query))
}

/// CQL exact identifier query.
pub fn build_identifier_cql(identifier: &str) -> String {
    format!("dcterms.identifier=={}", cql_quote(identifier))
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Identifier,
    Title,
    Kind,
}

/// Extract `(identifier, title, type)` per `<record>`. Namespace prefixes are
/// ignored and the first non-empty value of each field wins.
pub fn parse_sru_records(xml: &str, collection: &str) -> Result<Vec<LawRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<LawRecord> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event().context("Malformed SRU response")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"record" => {
                    current = Some(LawRecord {
                        identifier: String::new(),
                        title: String::new(),
                        kind: String::new(),
                        collection: collection.to_string(),
                    });
                }
                b"identifier" => field = Some(Field::Identifier),
                b"title" => field = Some(Field::Title),
                b"type" => field = Some(Field::Kind),
                _ => field = None,
            },
            Event::Text(t) => {
                if let (Some(record), Some(f)) = (current.as_mut(), field) {
                    let value = t.unescape().context("Bad text in SRU response")?;
                    let slot = match f {
                        Field::Identifier => &mut record.identifier,
                        Field::Title => &mut record.title,
                        Field::Kind => &mut record.kind,
                    };
                    if slot.is_empty() {
                        *slot = value.trim().to_string();
                    }
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"record" {
                    if let Some(record) = current.take() {
                        if !record.identifier.is_empty() {
                            records.push(record);
                        }
                    }
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(records)
}

/// Keep the first record per identifier.
fn dedupe_by_identifier(records: Vec<LawRecord>) -> Vec<LawRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.identifier.clone()))
        .collect()
}

pub struct SruClient {
    client: reqwest::Client,
    config: RegistryConfig,
    timeout: Duration,
    retry: RetryPolicy,
    search_breaker: CircuitBreaker,
    text_breaker: CircuitBreaker,
}

impl SruClient {
    pub fn new(client: reqwest::Client, config: RegistryConfig, upstream: &UpstreamConfig) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(config.timeout_secs),
            config,
            retry: RetryPolicy::from_config(upstream),
            search_breaker: CircuitBreaker::from_config("government registry", upstream),
            text_breaker: CircuitBreaker::from_config("law text service", upstream),
        }
    }

    async fn query_connection(
        &self,
        connection: &str,
        cql: &str,
        limit: usize,
    ) -> Result<Vec<LawRecord>> {
        let max_records = limit.clamp(1, self.config.max_records.max(1)).to_string();
        let max_records = max_records.as_str();
        let body = guarded(&self.retry, &self.search_breaker, || async move {
            let resp = self
                .client
                .get(&self.config.sru_url)
                .query(&[
                    ("operation", "searchRetrieve"),
                    ("version", "2.0"),
                    ("x-connection", connection),
                    ("query", cql),
                    ("maximumRecords", max_records),
                ])
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| CallError::from_reqwest(e, "SRU search"))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(CallError::from_status(status, &body, "SRU search"));
            }
            resp.text()
                .await
                .map_err(|e| CallError::from_reqwest(e, "SRU search"))
        })
        .await?;

        parse_sru_records(&body, connection)
    }

    /// Run one CQL builder against every connection concurrently. Failed
    /// branches are logged and count as empty unless every branch failed.
    async fn fan_out<F>(&self, build: F, limit: usize) -> Result<Vec<LawRecord>>
    where
        F: Fn(&str) -> String,
    {
        let queries: Vec<(String, String)> = self
            .config
            .connections
            .iter()
            .map(|c| (c.clone(), build(c)))
            .collect();

        let results = join_all(
            queries
                .iter()
                .map(|(connection, cql)| self.query_connection(connection, cql, limit)),
        )
        .await;

        let branches = queries
            .into_iter()
            .map(|(connection, _)| connection)
            .zip(results)
            .collect();
        join_branches(branches)
    }
}

/// Combine per-connection results. Failed branches are logged and count as
/// empty; the call fails only when no branch succeeded.
fn join_branches(branches: Vec<(String, Result<Vec<LawRecord>>)>) -> Result<Vec<LawRecord>> {
    let mut records = Vec::new();
    let mut last_error = None;
    let mut succeeded = 0usize;
    for (connection, result) in branches {
        match result {
            Ok(found) => {
                succeeded += 1;
                records.extend(found);
            }
            Err(e) => {
                tracing::warn!("SRU connection {connection} failed: {e:#}");
                last_error = Some(e);
            }
        }
    }

    if succeeded == 0 {
        if let Some(e) = last_error {
            return Err(e);
        }
    }
    Ok(dedupe_by_identifier(records))
}

#[async_trait]
impl LawRegistry for SruClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<LawRecord>> {
        let mut records = self
            .fan_out(|connection| build_cql(query, connection), limit)
            .await?;
        records.truncate(limit);
        tracing::info!("Registry search {query:?} returned {} record(s)", records.len());
        Ok(records)
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<LawRecord>> {
        let records = self
            .fan_out(|_| build_identifier_cql(identifier), 1)
            .await?;
        Ok(records
            .into_iter()
            .find(|r| r.identifier.eq_ignore_ascii_case(identifier)))
    }

    async fn fetch_law_text(&self, identifier: &str) -> Result<String> {
        if !is_valid_law_id(identifier) {
            anyhow::bail!("Invalid law identifier: {identifier:?}");
        }
        let url = self.config.law_text_url.replace("{id}", identifier);
        let url = url.as_str();
        let text = guarded(&self.retry, &self.text_breaker, || async move {
            let resp = self
                .client
                .get(url)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| CallError::from_reqwest(e, "law text download"))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(CallError::from_status(status, &body, "law text download"));
            }
            resp.text()
                .await
                .map_err(|e| CallError::from_reqwest(e, "law text download"))
        })
        .await?;
        tracing::info!("Downloaded {} bytes of law text for {identifier}", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sru:searchRetrieveResponse xmlns:sru="http://docs.oasis-open.org/ns/search-ws/sruResponse"
    xmlns:dcterms="http://purl.org/dc/terms/">
  <sru:numberOfRecords>2</sru:numberOfRecords>
  <sru:records>
    <sru:record>
      <sru:recordData>
        <gzd><originalData><meta><owmskern>
          <dcterms:identifier>BWBR0005537</dcterms:identifier>
          <dcterms:title>Algemene wet bestuursrecht</dcterms:title>
          <dcterms:type>wet</dcterms:type>
        </owmskern></meta></originalData></gzd>
      </sru:recordData>
    </sru:record>
    <sru:record>
      <sru:recordData>
        <dcterms:identifier>BWBR0045754</dcterms:identifier>
        <dcterms:title>Wet open overheid &amp; archief</dcterms:title>
        <dcterms:identifier>ignored-second-id</dcterms:identifier>
      </sru:recordData>
    </sru:record>
  </sru:records>
</sru:searchRetrieveResponse>"#;

    fn record(identifier: &str, collection: &str) -> LawRecord {
        LawRecord {
            identifier: identifier.into(),
            title: format!("Titel {identifier}"),
            kind: "wet".into(),
            collection: collection.into(),
        }
    }

    #[test]
    fn test_failed_branch_counts_as_empty() {
        let records = join_branches(vec![
            ("BWB".into(), Ok(vec![record("BWBR0005537", "BWB")])),
            ("CVDR".into(), Err(anyhow::anyhow!("connection reset"))),
        ])
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "BWBR0005537");
    }

    #[test]
    fn test_all_branches_failed_is_an_error() {
        let err = join_branches(vec![
            ("BWB".into(), Err(anyhow::anyhow!("timeout"))),
            ("CVDR".into(), Err(anyhow::anyhow!("connection reset"))),
        ])
        .unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn test_branches_are_joined_and_deduplicated() {
        let records = join_branches(vec![
            ("BWB".into(), Ok(vec![record("A", "BWB"), record("B", "BWB")])),
            ("CVDR".into(), Ok(vec![record("B", "CVDR"), record("C", "CVDR")])),
        ])
        .unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(records[1].collection, "BWB");
    }

    #[test]
    fn test_no_connections_yields_empty() {
        assert!(join_branches(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_records_ignores_prefixes() {
        let records = parse_sru_records(SAMPLE, "BWB").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier, "BWBR0005537");
        assert_eq!(records[0].title, "Algemene wet bestuursrecht");
        assert_eq!(records[0].kind, "wet");
        assert_eq!(records[0].collection, "BWB");
        assert_eq!(records[1].identifier, "BWBR0045754");
        assert_eq!(records[1].title, "Wet open overheid & archief");
        assert_eq!(records[1].kind, "");
    }

    #[test]
    fn test_parse_empty_response() {
        let xml = r#"<searchRetrieveResponse><numberOfRecords>0</numberOfRecords></searchRetrieveResponse>"#;
        assert!(parse_sru_records(xml, "CVDR").unwrap().is_empty());
    }

    #[test]
    fn test_build_cql_per_connection() {
        assert_eq!(
            build_cql("bestuursrecht", "BWB"),
            r#"overheidbwb.titel any "bestuursrecht""#
        );
        assert_eq!(
            build_cql(r#"apv "Utrecht""#, "CVDR"),
            r#"dcterms.title any "apv \"Utrecht\"""#
        );
        assert_eq!(
            build_identifier_cql("BWBR0005537"),
            r#"dcterms.identifier=="BWBR0005537""#
        );
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let rec = |id: &str, c: &str| LawRecord {
            identifier: id.into(),
            title: String::new(),
            kind: String::new(),
            collection: c.into(),
        };
        let out = dedupe_by_identifier(vec![rec("A", "BWB"), rec("B", "BWB"), rec("A", "CVDR")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].collection, "BWB");
    }

    #[test]
    fn test_law_id_validation() {
        assert!(is_valid_law_id("BWBR0005537"));
        assert!(is_valid_law_id("CVDR12345_1"));
        assert!(!is_valid_law_id("../etc/passwd"));
        assert!(!is_valid_law_id("a b"));
    }
}
