//! Memory records on disk.
//!
//! One markdown file per reflection inside the run directory:
//!
//! ```text
//! # Memory from {url}
//!
//! Timestamp: {rfc3339}
//!
//! {content}
//!
//! Source: {url}
//! ```

use super::summary::SUMMARY_FILE;
use crate::{urls, OdysseusError, Result};
use chrono::{DateTime, Local};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Longest stem kept from `{domain}{path}` before the timestamp
const MAX_STEM_LEN: usize = 120;

/// Give up finding a free name after this many suffixes
const MAX_NAME_ATTEMPTS: u32 = 1_000;

const HEADER_PREFIX: &str = "# Memory from ";
const TIMESTAMP_PREFIX: &str = "Timestamp: ";
const SOURCE_PREFIX: &str = "\n\nSource: ";

/// A persisted reflection. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    /// File name inside the run directory
    pub id: String,
    pub source_url: String,
    pub content: String,
    pub created_at: DateTime<Local>,
}

impl MemoryRecord {
    fn render(&self) -> String {
        format!(
            "{HEADER_PREFIX}{url}\n\n{TIMESTAMP_PREFIX}{ts}\n\n{content}{SOURCE_PREFIX}{url}",
            url = self.source_url,
            ts = self.created_at.to_rfc3339(),
            content = self.content,
        )
    }

    /// Parse a record back out of its file. `None` if it is not in record format.
    fn parse(id: &str, text: &str) -> Option<Self> {
        let (header, rest) = text.split_once("\n\n")?;
        let source_url = header.strip_prefix(HEADER_PREFIX)?.trim().to_string();

        let (ts_line, rest) = rest.split_once("\n\n").unwrap_or((rest, ""));
        let created_at = DateTime::parse_from_rfc3339(ts_line.strip_prefix(TIMESTAMP_PREFIX)?.trim())
            .ok()?
            .with_timezone(&Local);

        let content = match rest.rfind(SOURCE_PREFIX) {
            Some(idx) => &rest[..idx],
            None => rest,
        };

        Some(Self {
            id: id.to_string(),
            source_url,
            content: content.to_string(),
            created_at,
        })
    }

    /// First `max_chars` characters of the content, on one line.
    pub fn preview(&self, max_chars: usize) -> String {
        let flat = self.content.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= max_chars {
            return flat;
        }
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Append-only store of memory records for one run directory
#[derive(Debug, Clone)]
pub struct MemoryStore {
    dir: PathBuf,
}

impl MemoryStore {
    /// Open the store, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            OdysseusError::Memory(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one reflection. Ids are unique even for the same URL in the same instant.
    pub async fn write(&self, content: &str, source_url: &str) -> Result<MemoryRecord> {
        let created_at = Local::now();
        let stem = file_stem(source_url);
        let stamp = created_at.format("%Y%m%d_%H%M%S_%6f");

        let mut record = MemoryRecord {
            id: String::new(),
            source_url: source_url.to_string(),
            content: content.to_string(),
            created_at,
        };
        let body = record.render();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let id = if attempt == 0 {
                format!("{}_{}.md", stem, stamp)
            } else {
                format!("{}_{}-{}.md", stem, stamp, attempt)
            };

            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&id))
                .await;
            let mut file = match opened {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(OdysseusError::Memory(format!("cannot create {}: {}", id, e))),
            };

            let path = self.dir.join(&id);
            fill_or_remove(&path, &mut file, body.as_bytes()).await?;

            debug!("Wrote memory {} ({} bytes)", id, body.len());
            record.id = id;
            return Ok(record);
        }

        Err(OdysseusError::Memory(format!(
            "no free file name for {} after {} attempts",
            stem, MAX_NAME_ATTEMPTS
        )))
    }

    /// Most recent records in this store.
    pub async fn read_recent(&self, limit: usize) -> Result<Vec<MemoryRecord>> {
        read_recent(&self.dir, limit).await
    }
}

/// Write the whole record or leave nothing behind.
async fn fill_or_remove<W>(path: &Path, file: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        file.write_all(body).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        if let Err(rm) = fs::remove_file(path).await {
            warn!("Could not remove partial record {}: {}", path.display(), rm);
        }
        return Err(OdysseusError::Memory(format!(
            "write failed for {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

/// Most recent records in `dir`, newest first. A missing directory is empty.
pub async fn read_recent(dir: &Path, limit: usize) -> Result<Vec<MemoryRecord>> {
    let mut dir_entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries: Vec<(String, SystemTime)> = Vec::new();
    while let Some(entry) = dir_entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(|s| s.to_string()) else {
            continue;
        };
        if !name.ends_with(".md") || name == SUMMARY_FILE {
            continue;
        }
        if let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) {
            entries.push((name, modified));
        }
    }

    // Newest first; names carry the timestamp, so they break mtime ties
    entries.sort_by(|(a_name, a_time), (b_name, b_time)| {
        b_time.cmp(a_time).then_with(|| b_name.cmp(a_name))
    });

    let mut records = Vec::new();
    for (name, _) in entries.into_iter().take(limit) {
        let text = match fs::read_to_string(dir.join(&name)).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to read memory {}: {}", name, e);
                continue;
            }
        };
        match MemoryRecord::parse(&name, &text) {
            Some(record) => records.push(record),
            None => warn!("Skipping {}: not a memory record", name),
        }
    }

    Ok(records)
}

/// `{domain}{path with / as _}`, restricted to filename-safe characters.
fn file_stem(source_url: &str) -> String {
    let (domain, path) = match url::Url::parse(source_url) {
        Ok(parsed) => (
            urls::domain(source_url).unwrap_or_else(|| "unknown".to_string()),
            parsed.path().trim_end_matches('/').replace('/', "_"),
        ),
        Err(_) => ("unknown".to_string(), String::new()),
    };

    let stem: String = format!("{}{}", domain, path)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();

    if stem.is_empty() {
        "unknown".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::TempDir;

    /// Accepts nothing, like a full disk
    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::other("no space left on device")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.com_20240101_000000_000000.md");
        std::fs::write(&path, "").unwrap();

        let result = fill_or_remove(&path, &mut FullDisk, b"# Memory from https://a.com").await;

        assert!(matches!(result, Err(OdysseusError::Memory(_))));
        assert!(!path.exists());
        assert!(read_recent(tmp.path(), 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(
            file_stem("https://en.wikipedia.org/wiki/Deontic_logic"),
            "en.wikipedia.org_wiki_Deontic_logic"
        );
        assert_eq!(file_stem("https://a.com/"), "a.com");
        assert_eq!(file_stem("https://a.com/x%20y?q=1"), "a.com_x_20y");
        assert_eq!(file_stem("not a url"), "unknown");
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("run");
        MemoryStore::open(&dir).await.unwrap();
        MemoryStore::open(&dir).await.unwrap();
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn test_write_format() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::open(tmp.path()).await.unwrap();
        let record = store
            .write("Deontic logic studies obligation.", "https://en.wikipedia.org/wiki/Deontic_logic")
            .await
            .unwrap();

        assert!(record.id.starts_with("en.wikipedia.org_wiki_Deontic_logic_"));
        assert!(record.id.ends_with(".md"));

        let text = std::fs::read_to_string(tmp.path().join(&record.id)).unwrap();
        assert!(text.starts_with("# Memory from https://en.wikipedia.org/wiki/Deontic_logic\n\nTimestamp: "));
        assert!(text.contains("\n\nDeontic logic studies obligation.\n\n"));
        assert!(text.ends_with("Source: https://en.wikipedia.org/wiki/Deontic_logic"));
    }

    #[tokio::test]
    async fn test_repeated_writes_get_distinct_ids() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::open(tmp.path()).await.unwrap();

        let mut ids = HashSet::new();
        for _ in 0..20 {
            let record = store.write("same", "https://a.com/page").await.unwrap();
            assert!(ids.insert(record.id));
        }
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 20);
    }

    #[tokio::test]
    async fn test_read_recent_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::open(tmp.path()).await.unwrap();
        store.write("first\n\nwith paragraphs", "https://a.com/1").await.unwrap();
        store.write("second", "https://a.com/2").await.unwrap();
        std::fs::write(tmp.path().join(SUMMARY_FILE), "# Session").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let records = store.read_recent(10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_url, "https://a.com/2");
        assert_eq!(records[0].content, "second");
        assert_eq!(records[1].content, "first\n\nwith paragraphs");

        let limited = store.read_recent(1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_read_recent_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let records = read_recent(&tmp.path().join("nope"), 3).await.unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_preview() {
        let record = MemoryRecord {
            id: "x.md".to_string(),
            source_url: "https://a.com".to_string(),
            content: "one\ntwo   three".to_string(),
            created_at: Local::now(),
        };
        assert_eq!(record.preview(100), "one two three");
        assert_eq!(record.preview(3), "one...");
    }
}
