use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::classifier::PromptStrategy;
use crate::edgar::FilingInfo;
use crate::parser::ClassificationResult;

pub const DEFAULT_DB_PATH: &str = "data/filings.sqlite";

pub fn connect(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS filings (
            accession_number TEXT PRIMARY KEY,
            cik              TEXT NOT NULL,
            company_name     TEXT NOT NULL,
            form             TEXT NOT NULL,
            filing_date      TEXT NOT NULL,
            document_url     TEXT NOT NULL,
            raw_content      TEXT,
            clean_text       TEXT,
            fetched_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_filings_cik ON filings(cik);

        CREATE TABLE IF NOT EXISTS classifications (
            id                       INTEGER PRIMARY KEY,
            accession_number         TEXT NOT NULL,
            event_type               TEXT NOT NULL,
            relevant                 BOOLEAN NOT NULL,
            reasoning                TEXT NOT NULL DEFAULT '',
            confidence               REAL NOT NULL,
            prompt_strategy          TEXT NOT NULL,
            classification_timestamp TEXT NOT NULL,
            UNIQUE(accession_number, prompt_strategy)
        );
        CREATE INDEX IF NOT EXISTS idx_class_event ON classifications(event_type);
        CREATE INDEX IF NOT EXISTS idx_class_relevant ON classifications(relevant);
        ",
    )?;
    Ok(())
}

// ── Filings ──

/// Insert or refresh a filing. Content columns keep their old value when `None`.
pub fn save_filing(
    conn: &Connection,
    filing: &FilingInfo,
    raw_content: Option<&str>,
    clean_text: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO filings
         (accession_number, cik, company_name, form, filing_date, document_url, raw_content, clean_text)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(accession_number) DO UPDATE SET
            raw_content = COALESCE(excluded.raw_content, filings.raw_content),
            clean_text  = COALESCE(excluded.clean_text, filings.clean_text),
            fetched_at  = datetime('now')",
        rusqlite::params![
            filing.accession_number,
            filing.cik,
            filing.company_name,
            filing.form,
            filing.filing_date.format("%Y-%m-%d").to_string(),
            filing.document_url,
            raw_content,
            clean_text,
        ],
    )?;
    Ok(())
}

pub fn is_classified(conn: &Connection, accession_number: &str, strategy: PromptStrategy) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM classifications WHERE accession_number = ?1 AND prompt_strategy = ?2",
        rusqlite::params![accession_number, strategy.as_str()],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

// ── Classifications ──

/// Persisted shape of one classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationRecord {
    pub accession_number: String,
    pub event_type: String,
    pub relevant: bool,
    pub reasoning: String,
    pub confidence: f64,
    pub prompt_strategy: String,
    pub classification_timestamp: DateTime<Utc>,
}

impl ClassificationRecord {
    pub fn from_result(accession_number: &str, result: &ClassificationResult, strategy: PromptStrategy) -> Self {
        ClassificationRecord {
            accession_number: accession_number.to_string(),
            event_type: result.event_type.clone(),
            relevant: result.relevant,
            reasoning: result.reasoning.clone(),
            confidence: result.confidence,
            prompt_strategy: strategy.to_string(),
            classification_timestamp: Utc::now(),
        }
    }
}

pub fn save_classifications(conn: &Connection, records: &[ClassificationRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO classifications
             (accession_number, event_type, relevant, reasoning, confidence, prompt_strategy, classification_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for r in records {
            count += stmt.execute(rusqlite::params![
                r.accession_number,
                r.event_type,
                r.relevant,
                r.reasoning,
                r.confidence,
                r.prompt_strategy,
                r.classification_timestamp.to_rfc3339(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Queries ──

pub struct ReportRow {
    pub accession_number: String,
    pub company_name: Option<String>,
    pub filing_date: Option<String>,
    pub event_type: String,
    pub relevant: bool,
    pub confidence: f64,
    pub prompt_strategy: String,
    pub reasoning: String,
}

fn report_row(row: &rusqlite::Row) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        accession_number: row.get(0)?,
        company_name: row.get(1)?,
        filing_date: row.get(2)?,
        event_type: row.get(3)?,
        relevant: row.get(4)?,
        confidence: row.get(5)?,
        prompt_strategy: row.get(6)?,
        reasoning: row.get(7)?,
    })
}

pub fn fetch_report(
    conn: &Connection,
    cik: Option<&str>,
    relevant_only: bool,
    limit: usize,
) -> Result<Vec<ReportRow>> {
    let mut sql = String::from(
        "SELECT c.accession_number, f.company_name, f.filing_date, c.event_type, c.relevant,
                c.confidence, c.prompt_strategy, c.reasoning
         FROM classifications c
         LEFT JOIN filings f ON f.accession_number = c.accession_number
         WHERE 1 = 1",
    );
    if cik.is_some() {
        sql.push_str(" AND f.cik = ?1");
    }
    if relevant_only {
        sql.push_str(" AND c.relevant = 1");
    }
    sql.push_str(&format!(
        " ORDER BY f.filing_date DESC, c.classification_timestamp DESC LIMIT {}",
        limit
    ));

    let mut stmt = conn.prepare(&sql)?;
    let rows = match cik {
        Some(cik) => stmt
            .query_map([crate::edgar::pad_cik(cik)], report_row)?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt.query_map([], report_row)?.collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

pub struct Stats {
    pub filings: i64,
    pub with_text: i64,
    pub classifications: i64,
    pub relevant: i64,
    pub by_event_type: Vec<(String, i64, i64)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };

    let filings = count("SELECT COUNT(*) FROM filings")?;
    let with_text = count("SELECT COUNT(*) FROM filings WHERE clean_text IS NOT NULL AND clean_text != ''")?;
    let classifications = count("SELECT COUNT(*) FROM classifications")?;
    let relevant = count("SELECT COUNT(*) FROM classifications WHERE relevant = 1")?;

    let mut stmt = conn.prepare(
        "SELECT event_type, COUNT(*), SUM(relevant)
         FROM classifications GROUP BY event_type ORDER BY COUNT(*) DESC, event_type",
    )?;
    let by_event_type = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stats {
        filings,
        with_text,
        classifications,
        relevant,
        by_event_type,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::edgar::document_url;

    fn open() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(dir.path().join("nested/test.sqlite")).unwrap();
        init_schema(&conn).unwrap();
        (dir, conn)
    }

    fn filing(accession: &str, date: &str) -> FilingInfo {
        FilingInfo {
            cik: "0000320193".into(),
            company_name: "Apple Inc.".into(),
            form: "8-K".into(),
            filing_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            accession_number: accession.into(),
            document_url: document_url("0000320193", accession),
        }
    }

    fn result(event_type: &str, relevant: bool) -> ClassificationResult {
        ClassificationResult {
            event_type: event_type.into(),
            relevant,
            confidence: 0.8,
            reasoning: "Because.".into(),
            raw_response: format!("Event Type: {}, Relevant: {}", event_type, relevant),
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let (_dir, conn) = open();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn save_filing_keeps_content_on_refresh() {
        let (_dir, conn) = open();
        let f = filing("0000320193-24-000010", "2024-02-01");
        save_filing(&conn, &f, Some("<html>raw</html>"), Some("clean text here")).unwrap();
        save_filing(&conn, &f, None, None).unwrap();

        let (raw, text): (Option<String>, Option<String>) = conn
            .query_row(
                "SELECT raw_content, clean_text FROM filings WHERE accession_number = ?1",
                [&f.accession_number],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(raw.as_deref(), Some("<html>raw</html>"));
        assert_eq!(text.as_deref(), Some("clean text here"));
    }

    #[test]
    fn record_from_result() {
        let record = ClassificationRecord::from_result("acc-1", &result("Acquisition", true), PromptStrategy::FewShot);
        assert_eq!(record.accession_number, "acc-1");
        assert_eq!(record.event_type, "Acquisition");
        assert!(record.relevant);
        assert_eq!(record.confidence, 0.8);
        assert_eq!(record.prompt_strategy, "few_shot");

        let json = serde_json::to_value(&record).unwrap();
        for key in ["accession_number", "event_type", "relevant", "reasoning", "confidence", "prompt_strategy", "classification_timestamp"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn classifications_replace_per_strategy() {
        let (_dir, conn) = open();
        let f = filing("0000320193-24-000010", "2024-02-01");
        save_filing(&conn, &f, None, Some("text")).unwrap();

        let first = ClassificationRecord::from_result(&f.accession_number, &result("Other", false), PromptStrategy::Basic);
        let second = ClassificationRecord::from_result(&f.accession_number, &result("Acquisition", true), PromptStrategy::Basic);
        save_classifications(&conn, &[first]).unwrap();
        save_classifications(&conn, &[second]).unwrap();

        assert!(is_classified(&conn, &f.accession_number, PromptStrategy::Basic).unwrap());
        assert!(!is_classified(&conn, &f.accession_number, PromptStrategy::Detailed).unwrap());

        let rows = fetch_report(&conn, None, false, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, "Acquisition");
        assert_eq!(rows[0].company_name.as_deref(), Some("Apple Inc."));
    }

    #[test]
    fn report_filters_and_stats() {
        let (_dir, conn) = open();
        let a = filing("0000320193-24-000010", "2024-02-01");
        let b = filing("0000320193-24-000005", "2024-01-10");
        save_filing(&conn, &a, None, Some("text a")).unwrap();
        save_filing(&conn, &b, None, None).unwrap();
        save_classifications(
            &conn,
            &[
                ClassificationRecord::from_result(&a.accession_number, &result("Acquisition", true), PromptStrategy::Detailed),
                ClassificationRecord::from_result(&b.accession_number, &result("Scheduling Event", false), PromptStrategy::Detailed),
            ],
        )
        .unwrap();

        let all = fetch_report(&conn, Some("320193"), false, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].accession_number, a.accession_number);

        let relevant = fetch_report(&conn, None, true, 10).unwrap();
        assert_eq!(relevant.len(), 1);
        assert_eq!(relevant[0].event_type, "Acquisition");

        assert!(fetch_report(&conn, Some("789019"), false, 10).unwrap().is_empty());
        assert_eq!(fetch_report(&conn, None, false, 1).unwrap().len(), 1);

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.filings, 2);
        assert_eq!(stats.with_text, 1);
        assert_eq!(stats.classifications, 2);
        assert_eq!(stats.relevant, 1);
        assert_eq!(stats.by_event_type.len(), 2);
    }
}
