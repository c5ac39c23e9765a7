//! Append-only JSONL journal backing the credit ledger.
//!
//! One record per line: an `account` record when an account is first opened,
//! a `usage` record per applied debit. Replaying the file in order rebuilds
//! every balance and history. A torn final line (crash mid-write) is skipped
//! by replay and repaired by `open` before anything new is appended; a
//! malformed line anywhere else fails the replay.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use meterline_core::error::{MeterError, Result};
use meterline_core::{CreditAccount, UsageEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rec", rename_all = "snake_case")]
pub enum JournalRecord {
    Account(CreditAccount),
    Usage(UsageEvent),
}

pub struct UsageJournal {
    path: PathBuf,
    file: Mutex<File>,
}

impl UsageJournal {
    /// Open for appending. A torn final line left by a crash is repaired
    /// first so the next record starts on a fresh line.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        repair_tail(&path).await?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| MeterError::Internal(format!("open journal {}: {e}", path.display())))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. A write that fails partway is cut back to the
    /// previous end of file so no partial line is left behind.
    pub async fn append(&self, rec: &JournalRecord) -> Result<()> {
        let mut line = serde_json::to_string(rec)
            .map_err(|e| MeterError::Internal(format!("journal encode failed: {e}")))?;
        line.push('\n');

        let mut file = self.file.lock().await;
        let before = file
            .metadata()
            .await
            .map_err(|e| MeterError::Internal(format!("journal stat failed: {e}")))?
            .len();

        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(te) = file.set_len(before).await {
                tracing::error!(path=%self.path.display(), error=%te, "journal rollback failed");
            }
            return Err(MeterError::Internal(format!("journal write failed: {e}")));
        }
        Ok(())
    }

    /// Read every record in file order. A missing file is an empty journal.
    pub async fn replay(path: impl AsRef<Path>) -> Result<Vec<JournalRecord>> {
        let path = path.as_ref();
        let text = match tokio::fs::read_to_string(path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MeterError::Internal(format!(
                    "read journal {}: {e}",
                    path.display()
                )))
            }
        };

        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut out = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str::<JournalRecord>(line) {
                Ok(rec) => out.push(rec),
                Err(e) if i + 1 == lines.len() && !text.ends_with('\n') => {
                    tracing::warn!(path=%path.display(), error=%e, "skipping torn journal tail");
                }
                Err(e) => {
                    return Err(MeterError::Internal(format!(
                        "journal {} line {}: {e}",
                        path.display(),
                        i + 1
                    )))
                }
            }
        }
        Ok(out)
    }
}

/// Make the file end on a line boundary. A final line that still parses is
/// completed with `\n`; anything else after the last newline is cut off.
async fn repair_tail(path: &Path) -> Result<()> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(MeterError::Internal(format!(
                "read journal {}: {e}",
                path.display()
            )))
        }
    };
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }

    let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    let tail = &bytes[keep..];
    let io_err = |e: std::io::Error| MeterError::Internal(format!("repair journal {}: {e}", path.display()));
    let mut file = OpenOptions::new().write(true).open(path).await.map_err(io_err)?;

    if serde_json::from_slice::<JournalRecord>(tail).is_ok() {
        file.seek(SeekFrom::End(0)).await.map_err(io_err)?;
        file.write_all(b"\n").await.map_err(io_err)?;
        tracing::warn!(path=%path.display(), "journal tail missing newline, completed");
    } else {
        file.set_len(keep as u64).await.map_err(io_err)?;
        tracing::warn!(path=%path.display(), dropped_bytes = tail.len(), "truncated torn journal tail");
    }
    file.flush().await.map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(desc: &str) -> JournalRecord {
        JournalRecord::Usage(UsageEvent::new("u1", "question", 1, desc))
    }

    #[tokio::test]
    async fn open_cuts_torn_tail_before_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.jsonl");
        {
            let j = UsageJournal::open(&path).await.unwrap();
            j.append(&usage("a")).await.unwrap();
        }
        let mut f = OpenOptions::new().append(true).open(&path).await.unwrap();
        f.write_all(br#"{"rec":"usage","id":"x"#).await.unwrap();
        drop(f);

        let j = UsageJournal::open(&path).await.unwrap();
        j.append(&usage("b")).await.unwrap();

        let recs = UsageJournal::replay(&path).await.unwrap();
        assert_eq!(recs.len(), 2);
        assert!(matches!(&recs[1], JournalRecord::Usage(ev) if ev.description == "b"));
    }

    #[tokio::test]
    async fn open_completes_parseable_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.jsonl");
        let line = serde_json::to_string(&usage("a")).unwrap();
        tokio::fs::write(&path, line).await.unwrap();

        let j = UsageJournal::open(&path).await.unwrap();
        j.append(&usage("b")).await.unwrap();

        let recs = UsageJournal::replay(&path).await.unwrap();
        assert_eq!(recs.len(), 2);
    }
}
