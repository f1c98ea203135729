use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use swe_config::ProjectLayout;
use swe_core::{Result, SweError, ThreadId, Transcript, Turn};

const TITLE_MAX_CHARS: usize = 60;

/// A persisted conversation: its transcript plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: ThreadId,
    pub agent: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Derived from the first user message.
    pub title: Option<String>,
    pub transcript: Transcript,
}

impl ThreadRecord {
    pub fn new(agent: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            agent: agent.into(),
            created_at: now,
            updated_at: now,
            title: None,
            transcript: Transcript::new(),
        }
    }

    /// Replace the transcript after a turn and refresh the title.
    pub fn update(&mut self, transcript: &Transcript) {
        self.transcript = transcript.clone();
        self.updated_at = Utc::now();
        if self.title.is_none() {
            self.title = title_of(transcript);
        }
    }

    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            id: self.id,
            agent: self.agent.clone(),
            title: self.title.clone(),
            turns: self.transcript.len(),
            updated_at: self.updated_at,
        }
    }
}

/// Listing entry for `threads list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub agent: String,
    pub title: Option<String>,
    pub turns: usize,
    pub updated_at: DateTime<Utc>,
}

fn title_of(transcript: &Transcript) -> Option<String> {
    transcript.turns().iter().find_map(|turn| match turn {
        Turn::User { text } => {
            let line = text.lines().next().unwrap_or("").trim();
            if line.is_empty() {
                return None;
            }
            let mut title: String = line.chars().take(TITLE_MAX_CHARS).collect();
            if line.chars().count() > TITLE_MAX_CHARS {
                title.push('…');
            }
            Some(title)
        }
        _ => None,
    })
}

/// One JSON file per thread under `~/.swe-workflow/threads/`.
#[derive(Debug, Clone)]
pub struct ThreadStore {
    dir: PathBuf,
}

impl ThreadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_layout(layout: &ProjectLayout) -> Self {
        Self::new(layout.threads_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: ThreadId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write through a temp file so a crash never leaves a torn record.
    pub fn save(&self, record: &ThreadRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(record.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!(thread = %record.id, turns = record.transcript.len(), "thread saved");
        Ok(())
    }

    pub fn load(&self, id: ThreadId) -> Result<ThreadRecord> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(SweError::ThreadNotFound(id.to_string()));
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Accepts a full id or a unique prefix of one.
    pub fn find(&self, id_or_prefix: &str) -> Result<ThreadRecord> {
        if let Ok(id) = Uuid::parse_str(id_or_prefix) {
            return self.load(id);
        }
        let matches: Vec<ThreadSummary> = self
            .list(None, usize::MAX)?
            .into_iter()
            .filter(|s| s.id.to_string().starts_with(id_or_prefix))
            .collect();
        match matches.as_slice() {
            [one] => self.load(one.id),
            [] => Err(SweError::ThreadNotFound(id_or_prefix.to_string())),
            _ => Err(SweError::Other(anyhow::anyhow!(
                "thread prefix '{id_or_prefix}' is ambiguous ({} matches)",
                matches.len()
            ))),
        }
    }

    pub fn delete(&self, id: ThreadId) -> Result<()> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(SweError::ThreadNotFound(id.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// Newest first. Unreadable files are skipped with a warning.
    pub fn list(&self, agent: Option<&str>, limit: usize) -> Result<Vec<ThreadSummary>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let record: ThreadRecord = match fs::read_to_string(&path)
                .map_err(SweError::from)
                .and_then(|raw| serde_json::from_str(&raw).map_err(SweError::from))
            {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable thread");
                    continue;
                }
            };
            if agent.is_some_and(|a| a != record.agent) {
                continue;
            }
            summaries.push(record.summary());
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries.truncate(limit);
        Ok(summaries)
    }

    /// Most recently updated thread for `agent`.
    pub fn latest(&self, agent: &str) -> Result<Option<ThreadRecord>> {
        match self.list(Some(agent), 1)?.first() {
            Some(summary) => self.load(summary.id).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_comes_from_first_user_line() {
        let mut t = Transcript::new();
        t.push_assistant_text("hello");
        t.push_user("fix the failing test in parser.rs\nit panics on empty input");
        assert_eq!(
            title_of(&t).as_deref(),
            Some("fix the failing test in parser.rs")
        );

        let mut long = Transcript::new();
        long.push_user("x".repeat(100));
        let title = title_of(&long).unwrap();
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(tmp.path());
        let record = ThreadRecord::new("agent");
        store.save(&record).unwrap();

        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.json", record.id)]);
    }
}
