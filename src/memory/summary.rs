//! End-of-run session summary

use crate::Result;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// File name of the summary inside the run directory
pub const SUMMARY_FILE: &str = "session_summary.md";

/// Everything the summary reports about a finished run
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub seed: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub model: String,
    pub visited: Vec<String>,
    pub memory_count: usize,
    pub topics: Vec<String>,
}

impl SessionSummary {
    pub fn render(&self) -> String {
        let mut out = String::from("# Odysseus Exploration Session Summary\n\n");
        out.push_str(&format!("Initial concept: {}\n", self.seed));
        out.push_str(&format!("Date: {}\n", self.started_at.format("%Y-%m-%d %H:%M:%S")));
        out.push_str(&format!("Duration: {}\n", format_duration(self.finished_at - self.started_at)));
        out.push_str(&format!("Model used: {}\n", self.model));
        out.push_str(&format!("Memories recorded: {}\n\n", self.memory_count));

        out.push_str(&format!("## Pages Visited ({})\n\n", self.visited.len()));
        for (i, url) in self.visited.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, url));
        }

        out.push_str("\n## Topics Explored\n\n");
        if self.topics.is_empty() {
            out.push_str("None\n");
        }
        for topic in &self.topics {
            out.push_str(&format!("- {}\n", topic));
        }
        out
    }

    /// Write `session_summary.md` into `dir`, replacing any previous one.
    pub async fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(SUMMARY_FILE);
        fs::write(&path, self.render()).await?;
        info!("Session summary written to {}", path.display());
        Ok(path)
    }
}

fn format_duration(duration: chrono::TimeDelta) -> String {
    let secs = duration.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}
