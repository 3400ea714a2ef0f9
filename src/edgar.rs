use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const SUBMISSIONS_URL: &str = "https://data.sec.gov/submissions";
const ARCHIVES_URL: &str = "https://www.sec.gov/Archives/edgar/data";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

pub const DEFAULT_USER_AGENT: &str = "edgar_classifier/0.1 admin@example.com";
pub const FORM_8K: &str = "8-K";

/// Well-known issuers, name → CIK.
pub const POPULAR_COMPANIES: &[(&str, &str)] = &[
    ("apple", "320193"),
    ("microsoft", "789019"),
    ("amazon", "1018724"),
    ("tesla", "1318605"),
    ("nvidia", "1045810"),
    ("alphabet", "1652044"),
    ("meta", "1326801"),
    ("berkshire", "1067983"),
    ("jpmorgan", "19617"),
    ("visa", "1403161"),
];

pub fn lookup_company(name: &str) -> Option<&'static str> {
    let name = name.trim().to_lowercase();
    POPULAR_COMPANIES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, cik)| *cik)
}

/// CIKs are zero-padded to 10 digits everywhere in EDGAR URLs.
pub fn pad_cik(cik: &str) -> String {
    format!("{:0>10}", cik.trim())
}

// ── Submissions JSON ──

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Submissions {
    #[serde(default)]
    pub cik: CikValue,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub filings: Filings,
}

/// The `cik` field shows up both as a string and as a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CikValue {
    Number(u64),
    Text(String),
}

impl Default for CikValue {
    fn default() -> Self {
        CikValue::Text(String::new())
    }
}

impl CikValue {
    fn padded(&self) -> String {
        match self {
            CikValue::Number(n) => format!("{:010}", n),
            CikValue::Text(s) => pad_cik(s),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Filings {
    #[serde(default)]
    pub recent: RecentFilings,
}

/// Column-oriented: index `i` of each vector describes the same filing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFilings {
    #[serde(default)]
    pub form: Vec<String>,
    #[serde(default)]
    pub filing_date: Vec<String>,
    #[serde(default)]
    pub accession_number: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilingInfo {
    pub cik: String,
    pub company_name: String,
    pub form: String,
    pub filing_date: NaiveDate,
    pub accession_number: String,
    pub document_url: String,
}

impl FilingInfo {
    /// `<date>_<accession without dashes>_8k`
    pub fn file_stem(&self) -> String {
        format!(
            "{}_{}_8k",
            self.filing_date.format("%Y-%m-%d"),
            self.accession_number.replace('-', "")
        )
    }
}

pub fn document_url(cik: &str, accession_number: &str) -> String {
    format!(
        "{}/{}/{}/{}.txt",
        ARCHIVES_URL,
        cik,
        accession_number.replace('-', ""),
        accession_number
    )
}

/// 8-K rows of the recent-filings table whose date falls in `[start, end]`.
pub fn filter_8k_filings(
    submissions: &Submissions,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<FilingInfo> {
    let recent = &submissions.filings.recent;
    let cik = submissions.cik.padded();
    let company_name = submissions.name.clone().unwrap_or_else(|| "Unknown".into());

    recent
        .form
        .iter()
        .zip(&recent.filing_date)
        .zip(&recent.accession_number)
        .filter(|((form, _), _)| form.as_str() == FORM_8K)
        .filter_map(|((form, date), accession)| {
            let filing_date = match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
                Ok(d) => d,
                Err(_) => {
                    warn!("Skipping {}: bad filing date {:?}", accession, date);
                    return None;
                }
            };
            if start.is_some_and(|s| filing_date < s) || end.is_some_and(|e| filing_date > e) {
                return None;
            }
            Some(FilingInfo {
                cik: cik.clone(),
                company_name: company_name.clone(),
                form: form.clone(),
                filing_date,
                accession_number: accession.clone(),
                document_url: document_url(&cik, accession),
            })
        })
        .collect()
}

// ── Client ──

/// Rate-limited EDGAR HTTP client.
pub struct EdgarClient {
    http: reqwest::Client,
    last_request: Mutex<Option<Instant>>,
}

impl EdgarClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).context("invalid User-Agent")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/html, */*"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(EdgarClient {
            http,
            last_request: Mutex::new(None),
        })
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.throttle().await;
        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("bad status from {}", url))?;
        Ok(response)
    }

    pub async fn company_submissions(&self, cik: &str) -> Result<Submissions> {
        let url = format!("{}/CIK{}.json", SUBMISSIONS_URL, pad_cik(cik));
        info!("Fetching submissions for CIK {}", cik);
        self.get(&url)
            .await?
            .json()
            .await
            .with_context(|| format!("invalid submissions JSON for CIK {}", cik))
    }

    /// Fetch any EDGAR (or other) document as text.
    pub async fn fetch_document(&self, url: &str) -> Result<String> {
        let text = self
            .get(url)
            .await?
            .text()
            .await
            .with_context(|| format!("reading body of {}", url))?;
        Ok(text)
    }

    pub async fn download(&self, filing: &FilingInfo) -> Result<String> {
        self.fetch_document(&filing.document_url).await
    }

    /// Submissions → 8-K filter in one step.
    pub async fn list_8k_filings(
        &self,
        cik: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<FilingInfo>> {
        let submissions = self.company_submissions(cik).await?;
        let filings = filter_8k_filings(&submissions, start, end);
        info!("Found {} 8-K filings for CIK {}", filings.len(), cik);
        Ok(filings)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const SUBMISSIONS: &str = r#"{
        "cik": "320193",
        "name": "Apple Inc.",
        "filings": {
            "recent": {
                "accessionNumber": ["0000320193-24-000010", "0000320193-24-000008", "0000320193-24-000005", "0000320193-23-000120"],
                "filingDate": ["2024-02-01", "2024-01-25", "2024-01-10", "2023-12-15"],
                "form": ["8-K", "10-Q", "8-K", "8-K"]
            }
        }
    }"#;

    fn submissions() -> Submissions {
        serde_json::from_str(SUBMISSIONS).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn keeps_only_8k() {
        let filings = filter_8k_filings(&submissions(), None, None);
        assert_eq!(filings.len(), 3);
        assert!(filings.iter().all(|f| f.form == "8-K"));
    }

    #[test]
    fn date_window_is_inclusive() {
        let filings = filter_8k_filings(&submissions(), Some(date("2024-01-10")), Some(date("2024-02-01")));
        let accessions: Vec<_> = filings.iter().map(|f| f.accession_number.as_str()).collect();
        assert_eq!(accessions, vec!["0000320193-24-000010", "0000320193-24-000005"]);

        let filings = filter_8k_filings(&submissions(), Some(date("2024-01-11")), None);
        assert_eq!(filings.len(), 1);
    }

    #[test]
    fn filing_fields() {
        let filing = &filter_8k_filings(&submissions(), None, None)[0];
        assert_eq!(filing.cik, "0000320193");
        assert_eq!(filing.company_name, "Apple Inc.");
        assert_eq!(filing.filing_date, date("2024-02-01"));
        assert_eq!(
            filing.document_url,
            "https://www.sec.gov/Archives/edgar/data/0000320193/000032019324000010/0000320193-24-000010.txt"
        );
        assert_eq!(filing.file_stem(), "2024-02-01_000032019324000010_8k");
    }

    #[test]
    fn numeric_cik_and_missing_tables() {
        let submissions: Submissions = serde_json::from_str(r#"{"cik": 789019, "name": "Microsoft"}"#).unwrap();
        assert_eq!(submissions.cik.padded(), "0000789019");
        assert!(filter_8k_filings(&submissions, None, None).is_empty());
    }

    #[test]
    fn bad_dates_are_skipped() {
        let submissions: Submissions = serde_json::from_str(
            r#"{"cik": "1", "filings": {"recent": {
                "accessionNumber": ["a-1", "a-2"], "filingDate": ["not-a-date", "2024-03-01"], "form": ["8-K", "8-K"]
            }}}"#,
        )
        .unwrap();
        let filings = filter_8k_filings(&submissions, None, None);
        assert_eq!(filings.len(), 1);
        assert_eq!(filings[0].company_name, "Unknown");
    }

    #[test]
    fn company_lookup_and_padding() {
        assert_eq!(lookup_company("Apple"), Some("320193"));
        assert_eq!(lookup_company("jpmorgan"), Some("19617"));
        assert_eq!(lookup_company("enron"), None);
        assert_eq!(pad_cik("320193"), "0000320193");
        assert_eq!(pad_cik("0000320193"), "0000320193");
        assert_eq!(POPULAR_COMPANIES.len(), 10);
    }

    #[test]
    fn client_builds() {
        assert!(EdgarClient::new(DEFAULT_USER_AGENT).is_ok());
        assert!(EdgarClient::new("bad\nagent").is_err());
    }
}
