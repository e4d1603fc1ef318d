//! Durable trade rationales.
//!
//! One JSON file per thesis is the source of truth; a Markdown rendering
//! is written next to it for humans and external tooling but is never read
//! back. Records are only ever replaced whole (read-modify-write) and are
//! never deleted here. A record that fails to parse surfaces as status
//! UNKNOWN instead of an error, so one corrupt file cannot stall the
//! invalidation loop.

use anyhow::{Context, Result};
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThesisStatus {
    Active,
    Orphaned,
    Closed,
    /// Parse-failure marker. Never written intentionally.
    #[serde(other)]
    Unknown,
}

impl ThesisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThesisStatus::Active => "ACTIVE",
            ThesisStatus::Orphaned => "ORPHANED",
            ThesisStatus::Closed => "CLOSED",
            ThesisStatus::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckEntry {
    pub ts: String,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thesis {
    pub id: String,
    pub symbol: String,
    pub direction: String,
    pub reasoning: String,
    #[serde(default)]
    pub invalidation_conditions: Vec<String>,
    #[serde(default)]
    pub fundamental_anchors: Vec<String>,
    pub status: ThesisStatus,
    pub created_at: String,
    pub last_checked: String,
    #[serde(default)]
    pub check_log: Vec<CheckEntry>,
}

impl Thesis {
    /// Placeholder for a record on disk that would not parse.
    fn unreadable(id: &str) -> Self {
        Self {
            id: id.to_string(),
            symbol: String::new(),
            direction: String::new(),
            reasoning: String::new(),
            invalidation_conditions: Vec::new(),
            fundamental_anchors: Vec::new(),
            status: ThesisStatus::Unknown,
            created_at: String::new(),
            last_checked: String::new(),
            check_log: Vec::new(),
        }
    }
}

pub struct ThesisStore {
    dir: PathBuf,
}

impl ThesisStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating theses dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn export_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.md", id))
    }

    pub fn create(
        &self,
        symbol: &str,
        direction: &str,
        reasoning: &str,
        invalidation_conditions: Vec<String>,
        fundamental_anchors: Vec<String>,
    ) -> Result<Thesis> {
        let now = crate::logging::ts_now();
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let mut suffix = [0u8; 3];
        rand::thread_rng().fill_bytes(&mut suffix);
        // Collisions are not retried; at a handful of theses per day the
        // 24-bit suffix makes them a non-event.
        let id = format!("{}-{}-{}-{}", date, symbol, direction, hex::encode(suffix));

        let thesis = Thesis {
            id: id.clone(),
            symbol: symbol.to_string(),
            direction: direction.to_string(),
            reasoning: reasoning.to_string(),
            invalidation_conditions,
            fundamental_anchors,
            status: ThesisStatus::Active,
            created_at: now.clone(),
            last_checked: now.clone(),
            check_log: vec![CheckEntry {
                ts: now,
                note: "created".to_string(),
            }],
        };

        self.write(&thesis)?;
        log(
            Level::Info,
            Domain::Thesis,
            "created",
            obj(&[("id", v_str(&id)), ("symbol", v_str(symbol))]),
        );
        Ok(thesis)
    }

    /// None when no record exists; status UNKNOWN when one exists but
    /// would not parse.
    pub fn get(&self, id: &str) -> Option<Thesis> {
        let path = self.record_path(id);
        if !path.exists() {
            return None;
        }
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Some(Thesis::unreadable(id)),
        };
        match serde_json::from_str::<Thesis>(&raw) {
            Ok(thesis) => Some(thesis),
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Thesis,
                    "unreadable_record",
                    obj(&[("id", v_str(id)), ("reason", v_str(&err.to_string()))]),
                );
                Some(Thesis::unreadable(id))
            }
        }
    }

    /// All parseable records with status ACTIVE, in no particular order.
    pub fn list_active(&self) -> Vec<Thesis> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut active = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(thesis) = self.get(id) {
                if thesis.status == ThesisStatus::Active {
                    active.push(thesis);
                }
            }
        }
        active
    }

    /// Whole-record read-modify-write: replace the status, stamp the check
    /// time, append exactly one log line. False when no such record or the
    /// record is unreadable.
    pub fn update_status(&self, id: &str, status: ThesisStatus, note: &str) -> Result<bool> {
        let Some(mut thesis) = self.get(id) else {
            return Ok(false);
        };
        if thesis.status == ThesisStatus::Unknown && thesis.created_at.is_empty() {
            return Ok(false);
        }

        let now = crate::logging::ts_now();
        thesis.status = status;
        thesis.last_checked = now.clone();
        let note = if note.is_empty() {
            format!("status changed to {}", status.as_str())
        } else {
            note.to_string()
        };
        thesis.check_log.push(CheckEntry { ts: now, note });

        self.write(&thesis)?;
        log(
            Level::Info,
            Domain::Thesis,
            "status_updated",
            obj(&[("id", v_str(id)), ("status", v_str(status.as_str()))]),
        );
        Ok(true)
    }

    fn write(&self, thesis: &Thesis) -> Result<()> {
        let json = serde_json::to_string_pretty(thesis)?;
        fs::write(self.record_path(&thesis.id), json)
            .with_context(|| format!("writing thesis {}", thesis.id))?;
        // Derived export only; parse failures here would be a bug in
        // render, not in the record.
        let _ = fs::write(self.export_path(&thesis.id), render_markdown(thesis));
        Ok(())
    }
}

/// One-way human-readable rendering, regenerated on every write.
pub fn render_markdown(thesis: &Thesis) -> String {
    let list = |items: &[String]| {
        if items.is_empty() {
            "- None specified".to_string()
        } else {
            items
                .iter()
                .map(|item| format!("- {}", item))
                .collect::<Vec<_>>()
                .join("\n")
        }
    };
    let check_log = thesis
        .check_log
        .iter()
        .map(|entry| format!("- {}: {}", entry.ts, entry.note))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "# {symbol} {direction}\n\n\
         ## Thesis\n{reasoning}\n\n\
         ## Invalidation Conditions\n{conditions}\n\n\
         ## Fundamental Anchors\n{anchors}\n\n\
         ## Status: {status}\nLast checked: {checked}\n\n\
         ## Check Log\n{check_log}\n",
        symbol = thesis.symbol,
        direction = thesis.direction,
        reasoning = thesis.reasoning,
        conditions = list(&thesis.invalidation_conditions),
        anchors = list(&thesis.fundamental_anchors),
        status = thesis.status.as_str(),
        checked = thesis.last_checked,
        check_log = check_log,
    )
}
