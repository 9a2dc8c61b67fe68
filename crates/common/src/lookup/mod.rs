//! External bibliographic metadata
//!
//! The lookup service answers in a line-oriented `KEY  - VALUE` format
//! (RIS). Lines are folded into a map and mapped onto document fields.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoffBuilder};
use reqwest::{header, Client, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LookupConfig;
use crate::errors::{AppError, Result};

/// Separator between tag and value
pub const RIS_DELIMITER: &str = "  - ";

/// Fold `KEY<delim>VALUE` lines into a map. Repeated keys are joined with
/// `", "`; lines without the delimiter are skipped.
pub fn parse_key_values(text: &str) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();

    for line in text.lines() {
        let Some((key, value)) = line.split_once(RIS_DELIMITER) else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            continue;
        }

        map.entry(key.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    map
}

/// Document fields recovered from a lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LookupFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub fn to_patch_fields(map: &BTreeMap<String, String>) -> LookupFields {
    let first = |tags: &[&str]| {
        tags.iter()
            .find_map(|tag| map.get(*tag))
            .filter(|v| !v.is_empty())
            .cloned()
    };

    LookupFields {
        author: first(&["AU", "A1"]),
        title: first(&["TI", "T1"]),
        year: first(&["PY", "Y1", "DA"]).map(|raw| leading_year(&raw).unwrap_or(raw)),
        publisher: first(&["PB"]),
        description: first(&["AB", "N2"]),
    }
}

/// First run of four digits, e.g. `2019/05/01/` gives `2019`
fn leading_year(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    bytes
        .windows(4)
        .position(|w| w.iter().all(u8::is_ascii_digit))
        .map(|start| raw[start..start + 4].to_string())
}

/// Metadata lookup abstraction
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn lookup(&self, identifier: &str) -> Result<LookupFields>;
}

/// Lookup over HTTP with content negotiation
pub struct HttpMetadataLookup {
    client: Client,
    config: LookupConfig,
}

impl HttpMetadataLookup {
    pub fn new(config: LookupConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn url_for(&self, identifier: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            identifier.trim_start_matches('/')
        )
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<String, backoff::Error<AppError>> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, &self.config.accept)
            .send()
            .await
            .map_err(|e| backoff::Error::transient(AppError::HttpClient(e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(backoff::Error::permanent(AppError::NotFound {
                resource_type: "identifier".to_string(),
                id: url.to_string(),
            }));
        }
        if !status.is_success() {
            let err = AppError::Upstream {
                message: format!("lookup returned {}", status),
            };
            return Err(if status.is_server_error() {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            });
        }

        response
            .text()
            .await
            .map_err(|e| backoff::Error::permanent(AppError::HttpClient(e)))
    }
}

#[async_trait]
impl MetadataLookup for HttpMetadataLookup {
    async fn lookup(&self, identifier: &str) -> Result<LookupFields> {
        let url = self.url_for(identifier);
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_elapsed_time(Some(Duration::from_secs(self.config.timeout_secs * 3)))
            .build();

        let max_retries = self.config.max_retries;
        let mut attempt = 0u32;
        let body = retry(policy, || {
            attempt += 1;
            let current = attempt;
            let url = url.as_str();
            async move {
                match self.fetch_once(url).await {
                    Err(backoff::Error::Transient { err, .. }) if current > max_retries => {
                        Err(backoff::Error::permanent(err))
                    }
                    Err(backoff::Error::Transient { err, retry_after }) => {
                        warn!(attempt = current, error = %err, "Lookup failed, retrying");
                        Err(backoff::Error::Transient { err, retry_after })
                    }
                    other => other,
                }
            }
        })
        .await
        .map_err(|e| match e {
            AppError::HttpClient(inner) => AppError::Upstream {
                message: inner.to_string(),
            },
            other => other,
        })?;

        let fields = to_patch_fields(&parse_key_values(&body));
        debug!(identifier, ?fields, "Lookup resolved");
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "TY  - JOUR\n\
        AU  - Novak, Ana\n\
        AU  - Horvat, Jan\n\
        TI  - On shelves\n\
        PY  - 2019/05/01/\n\
        PB  - Example Press\n\
        not a tagged line\n\
        ER  - \n";

    #[test]
    fn test_repeated_keys_are_joined() {
        let map = parse_key_values(SAMPLE);
        assert_eq!(map["AU"], "Novak, Ana, Horvat, Jan");
        assert_eq!(map["TY"], "JOUR");
        assert_eq!(map["ER"], "");
        assert!(!map.contains_key("not a tagged line"));
    }

    #[test]
    fn test_to_patch_fields() {
        let fields = to_patch_fields(&parse_key_values(SAMPLE));
        assert_eq!(fields.author.as_deref(), Some("Novak, Ana, Horvat, Jan"));
        assert_eq!(fields.title.as_deref(), Some("On shelves"));
        assert_eq!(fields.year.as_deref(), Some("2019"));
        assert_eq!(fields.publisher.as_deref(), Some("Example Press"));
        assert_eq!(fields.description, None);
    }

    #[test]
    fn test_alternate_tags() {
        let fields = to_patch_fields(&parse_key_values("T1  - Alt\nY1  - c. 1999\nN2  - Abstract"));
        assert_eq!(fields.title.as_deref(), Some("Alt"));
        assert_eq!(fields.year.as_deref(), Some("1999"));
        assert_eq!(fields.description.as_deref(), Some("Abstract"));
    }

    #[test]
    fn test_year_without_digits_is_kept() {
        let fields = to_patch_fields(&parse_key_values("PY  - undated"));
        assert_eq!(fields.year.as_deref(), Some("undated"));
    }

    #[test]
    fn test_url_for() {
        let lookup = HttpMetadataLookup::new(LookupConfig {
            base_url: "https://doi.org/".into(),
            accept: "application/x-research-info-systems".into(),
            timeout_secs: 1,
            max_retries: 0,
        })
        .unwrap();
        assert_eq!(lookup.url_for("10.1000/xyz"), "https://doi.org/10.1000/xyz");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_upstream_error() {
        let lookup = HttpMetadataLookup::new(LookupConfig {
            base_url: "http://127.0.0.1:9".into(),
            accept: "text/plain".into(),
            timeout_secs: 1,
            max_retries: 0,
        })
        .unwrap();
        let err = lookup.lookup("10.1000/xyz").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { .. }));
    }
}
