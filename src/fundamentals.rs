//! External validity signals: headline feeds per symbol.
//!
//! A failing source contributes an error entry with no headlines instead
//! of failing the whole check, so the invalidation loop always gets a
//! report to fail open against.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    pub headlines: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FundamentalsReport {
    pub symbol: String,
    pub checked_at: String,
    pub sources: Vec<SourceReport>,
}

impl FundamentalsReport {
    /// Every headline from every source, lowercased for matching.
    pub fn all_headlines(&self) -> Vec<String> {
        self.sources
            .iter()
            .flat_map(|s| s.headlines.iter().map(|h| h.to_lowercase()))
            .collect()
    }
}

#[async_trait]
pub trait FundamentalsSource: Send + Sync {
    async fn check(&self, symbol: &str) -> Result<FundamentalsReport>;
}

/// Scrapes FXStreet and Reuters search pages for headlines mentioning the
/// pair. Best-effort by design: markup drift or an outage degrades to an
/// empty source, never to a closure.
pub struct HttpFundamentals {
    client: Client,
    max_per_source: usize,
}

impl HttpFundamentals {
    pub fn new(timeout_secs: u64, max_per_source: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Mozilla/5.0 (compatible; sentinelfx/0.1)")
            .build()?;
        Ok(Self {
            client,
            max_per_source,
        })
    }

    async fn fetch_source(&self, name: &str, url: &str) -> SourceReport {
        let result = async {
            let response = self.client.get(url).send().await?;
            if !response.status().is_success() {
                anyhow::bail!("HTTP {}", response.status().as_u16());
            }
            let html = response.text().await?;
            Ok::<_, anyhow::Error>(extract_headlines(&html))
        }
        .await;

        match result {
            Ok(mut headlines) => {
                headlines.truncate(self.max_per_source);
                SourceReport {
                    source: name.to_string(),
                    headlines,
                    error: None,
                }
            }
            Err(err) => {
                log(
                    Level::Debug,
                    Domain::Fundamentals,
                    "source_failed",
                    obj(&[("source", v_str(name)), ("reason", v_str(&err.to_string()))]),
                );
                SourceReport {
                    source: name.to_string(),
                    headlines: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl FundamentalsSource for HttpFundamentals {
    async fn check(&self, symbol: &str) -> Result<FundamentalsReport> {
        let (base, quote) = split_pair(symbol);

        let fxstreet_url = format!(
            "https://www.fxstreet.com/news?q={}%2F{}",
            base, quote
        );
        let reuters_url = format!(
            "https://www.reuters.com/site-search/?query={}+{}&section=forex",
            base, quote
        );

        let sources = vec![
            self.fetch_source("fxstreet", &fxstreet_url).await,
            self.fetch_source("reuters", &reuters_url).await,
        ];

        let total: usize = sources.iter().map(|s| s.headlines.len()).sum();
        log(
            Level::Debug,
            Domain::Fundamentals,
            "checked",
            obj(&[
                ("symbol", v_str(symbol)),
                ("headlines", serde_json::json!(total)),
            ]),
        );

        Ok(FundamentalsReport {
            symbol: symbol.to_string(),
            checked_at: crate::logging::ts_now(),
            sources,
        })
    }
}

/// "EURUSD" / "EUR/USD" / "eurusd" -> ("EUR", "USD")
fn split_pair(symbol: &str) -> (String, String) {
    let letters: String = symbol
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase();
    if letters.len() >= 6 {
        (letters[0..3].to_string(), letters[3..6].to_string())
    } else {
        (letters.clone(), String::new())
    }
}

/// Pull plausible headlines out of raw HTML: h1-h4 contents and
/// data-analytics-headline attributes, tags stripped, deduplicated.
pub fn extract_headlines(html: &str) -> Vec<String> {
    let mut headlines = Vec::new();

    for level in 1..=4 {
        let open = format!("<h{}", level);
        let close = format!("</h{}>", level);
        let mut rest = html;
        while let Some(start) = rest.find(&open) {
            let after_open = &rest[start..];
            let Some(tag_end) = after_open.find('>') else {
                break;
            };
            let body_start = &after_open[tag_end + 1..];
            let Some(end) = body_start.find(&close) else {
                break;
            };
            push_headline(&mut headlines, &body_start[..end]);
            rest = &body_start[end + close.len()..];
        }
    }

    let marker = "data-analytics-headline=\"";
    let mut rest = html;
    while let Some(start) = rest.find(marker) {
        let body = &rest[start + marker.len()..];
        let Some(end) = body.find('"') else { break };
        push_headline(&mut headlines, &body[..end]);
        rest = &body[end + 1..];
    }

    headlines
}

fn push_headline(headlines: &mut Vec<String>, fragment: &str) {
    let text = strip_tags(fragment);
    let text = text.trim();
    if text.len() > 10 && text.len() < 300 && !headlines.iter().any(|h| h == text) {
        headlines.push(text.to_string());
    }
}

fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pair() {
        assert_eq!(split_pair("EURUSD"), ("EUR".to_string(), "USD".to_string()));
        assert_eq!(split_pair("EUR/USD"), ("EUR".to_string(), "USD".to_string()));
        assert_eq!(split_pair("gbpjpy"), ("GBP".to_string(), "JPY".to_string()));
    }

    #[test]
    fn test_extract_headlines_from_tags() {
        let html = r#"
            <h1 class="title">ECB holds rates steady amid inflation fight</h1>
            <p>body text</p>
            <h2><a href="/x">Dollar rallies on <b>strong</b> payrolls data</a></h2>
            <h3>short</h3>
        "#;
        let headlines = extract_headlines(html);
        assert_eq!(headlines.len(), 2);
        assert_eq!(headlines[0], "ECB holds rates steady amid inflation fight");
        assert_eq!(headlines[1], "Dollar rallies on strong payrolls data");
    }

    #[test]
    fn test_extract_headlines_dedup_and_attr() {
        let html = r#"
            <h2>Fed hints at imminent rate hike</h2>
            <a data-analytics-headline="Fed hints at imminent rate hike">link</a>
            <a data-analytics-headline="Oil slides as supply fears ease">link</a>
        "#;
        let headlines = extract_headlines(html);
        assert_eq!(headlines.len(), 2);
    }

    #[test]
    fn test_all_headlines_lowercased() {
        let report = FundamentalsReport {
            symbol: "EURUSD".to_string(),
            checked_at: String::new(),
            sources: vec![
                SourceReport {
                    source: "a".to_string(),
                    headlines: vec!["Fed Hints At Rate Hike".to_string()],
                    error: None,
                },
                SourceReport {
                    source: "b".to_string(),
                    headlines: Vec::new(),
                    error: Some("HTTP 503".to_string()),
                },
            ],
        };
        assert_eq!(report.all_headlines(), vec!["fed hints at rate hike"]);
    }
}
