//! Workspace persistence
//!
//! Persistence is expressed over a minimal key-value capability
//! ([`KvTable`]): `put` (upsert by key), `get_all` and `delete`. Two tables
//! are used, one for workspaces and one for the plain-text topic mirror.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::export::{flatten_description, sanitize_name};
use super::model::{Topic, Workspace, next_workspace_id, now_millis};
use super::tree;

/// A record addressable by a string key
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Primary key
    fn key(&self) -> String;
}

impl Record for Workspace {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Flattened plain-text copy of a topic description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicFile {
    /// `workspaceId/unit/chapter/topic.txt`
    pub path: String,
    /// Plain text body
    pub content: String,
    /// Last write, milliseconds since the epoch
    pub updated_at: u64,
}

impl Record for TopicFile {
    fn key(&self) -> String {
        self.path.clone()
    }
}

/// Key-value table capability
pub trait KvTable<R: Record>: Send {
    /// Insert or replace a record by key
    fn put(&mut self, record: R) -> Result<()>;
    /// All records in insertion order
    fn get_all(&self) -> Result<Vec<R>>;
    /// Delete a record by key, returning whether it existed
    fn delete(&mut self, key: &str) -> Result<bool>;
}

fn upsert<R: Record>(entries: &mut Vec<R>, record: R) {
    let key = record.key();
    if let Some(existing) = entries.iter_mut().find(|e| e.key() == key) {
        *existing = record;
    } else {
        entries.push(record);
    }
}

fn remove_key<R: Record>(entries: &mut Vec<R>, key: &str) -> bool {
    let len_before = entries.len();
    entries.retain(|e| e.key() != key);
    entries.len() < len_before
}

/// In-memory table
#[derive(Debug, Clone)]
pub struct MemoryTable<R> {
    entries: Vec<R>,
}

impl<R> Default for MemoryTable<R> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<R: Record + Send> KvTable<R> for MemoryTable<R> {
    fn put(&mut self, record: R) -> Result<()> {
        upsert(&mut self.entries, record);
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<R>> {
        Ok(self.entries.clone())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        Ok(remove_key(&mut self.entries, key))
    }
}

/// Table persisted as a pretty-printed JSON array
#[derive(Debug)]
pub struct JsonTable<R> {
    path: PathBuf,
    entries: Vec<R>,
}

impl<R: Record> JsonTable<R> {
    /// Open a table, reading existing records if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read table from {:?}", path))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse table {:?}", path))?
        } else {
            Vec::new()
        };

        Ok(Self { path, entries })
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &[R]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(entries)
            .with_context(|| "Failed to serialize table")?;

        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write table to {:?}", self.path))?;

        Ok(())
    }
}

impl<R: Record + Send> KvTable<R> for JsonTable<R> {
    fn put(&mut self, record: R) -> Result<()> {
        // Memory only changes once the file write succeeded
        let mut staged = self.entries.clone();
        upsert(&mut staged, record);
        self.flush(&staged)?;
        self.entries = staged;
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<R>> {
        Ok(self.entries.clone())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        let mut staged = self.entries.clone();
        if !remove_key(&mut staged, key) {
            return Ok(false);
        }
        self.flush(&staged)?;
        self.entries = staged;
        Ok(true)
    }
}

/// Workspace persistence facade
pub struct WorkspaceStore {
    workspaces: Box<dyn KvTable<Workspace>>,
    files: Box<dyn KvTable<TopicFile>>,
}

impl WorkspaceStore {
    /// Wrap two tables
    pub fn new(
        workspaces: impl KvTable<Workspace> + 'static,
        files: impl KvTable<TopicFile> + 'static,
    ) -> Self {
        Self { workspaces: Box::new(workspaces), files: Box::new(files) }
    }

    /// Store backed by memory only
    pub fn in_memory() -> Self {
        Self::new(MemoryTable::default(), MemoryTable::default())
    }

    /// Store backed by `workspaces.json` and `files.json` in `dir`
    pub fn open_dir(dir: &Path) -> Result<Self> {
        Ok(Self::new(
            JsonTable::<Workspace>::open(dir.join("workspaces.json"))?,
            JsonTable::<TopicFile>::open(dir.join("files.json"))?,
        ))
    }

    /// All workspaces; seeds the default workspace on first use
    pub fn list(&mut self) -> Result<Vec<Workspace>> {
        let workspaces = self.workspaces.get_all()?;
        if !workspaces.is_empty() {
            return Ok(workspaces);
        }

        let seeded = default_workspace();
        tracing::info!("Seeding default workspace {}", seeded.id);
        self.workspaces.put(seeded.clone())?;
        Ok(vec![seeded])
    }

    /// Look up a workspace by id
    pub fn get(&mut self, id: u64) -> Result<Option<Workspace>> {
        Ok(self.list()?.into_iter().find(|w| w.id == id))
    }

    /// The default workspace, or the first one
    pub fn primary(&mut self) -> Result<Workspace> {
        let workspaces = self.list()?;
        let primary = workspaces
            .iter()
            .find(|w| w.is_default())
            .or_else(|| workspaces.first())
            .cloned()
            .context("No workspaces available")?;
        Ok(primary)
    }

    /// Create and persist a workspace with a starter hierarchy
    pub fn create(&mut self, title: &str) -> Result<Workspace> {
        let title = title.trim();
        anyhow::ensure!(!title.is_empty(), "Enter workspace title");

        let ws = starter_workspace(title);
        self.workspaces.put(ws.clone())?;
        tracing::info!("Created workspace {} ({})", ws.id, ws.title);
        Ok(ws)
    }

    /// Insert or update a workspace
    pub fn save(&mut self, ws: &Workspace) -> Result<()> {
        self.workspaces.put(ws.clone())
    }

    /// Import an externally produced workspace document
    ///
    /// Imported workspaces never carry the default flag, and a document
    /// whose id belongs to the default workspace gets a fresh id.
    pub fn import(&mut self, mut ws: Workspace) -> Result<Workspace> {
        ws.is_default = None;
        if self.list()?.iter().any(|w| w.id == ws.id && w.is_default()) {
            let fresh = next_workspace_id();
            tracing::info!("Imported workspace {} collides with the default, using {}", ws.id, fresh);
            ws.id = fresh;
        }
        self.workspaces.put(ws.clone())?;
        Ok(ws)
    }

    /// Delete a workspace; the default workspace is protected
    pub fn delete(&mut self, id: u64) -> Result<bool> {
        if let Some(ws) = self.workspaces.get_all()?.into_iter().find(|w| w.id == id) {
            anyhow::ensure!(!ws.is_default(), "The default workspace cannot be deleted");
        }
        self.workspaces.delete(&id.to_string())
    }

    /// Mirror a topic's flattened description into the files table
    ///
    /// Failures are logged and swallowed.
    pub fn mirror_topic(&mut self, ws: &Workspace, topic_id: &str) {
        let Some(topic) = tree::find_by_id(&ws.topics, topic_id) else {
            return;
        };

        let record = TopicFile {
            path: mirror_path(ws, topic),
            content: mirror_text(topic),
            updated_at: now_millis(),
        };

        if let Err(e) = self.files.put(record) {
            tracing::debug!("Topic mirror write failed: {:#}", e);
        }
    }

    /// All mirrored topic files
    pub fn files(&self) -> Result<Vec<TopicFile>> {
        self.files.get_all()
    }
}

/// Mirror key for a topic
pub fn mirror_path(ws: &Workspace, topic: &Topic) -> String {
    let unit = tree::parent_unit(&ws.topics, &topic.id);
    let chapter = tree::parent_chapter(&ws.topics, &topic.id);
    format!(
        "{}/{}/{}/{}.txt",
        ws.id,
        sanitize_name(&unit),
        sanitize_name(&chapter),
        sanitize_name(&topic.name)
    )
}

fn mirror_text(topic: &Topic) -> String {
    let text = topic.description().map(flatten_description).unwrap_or_default();
    if text.is_empty() { topic.name.clone() } else { text }
}

/// The workspace seeded when none exist
pub fn default_workspace() -> Workspace {
    let mut chapter = Topic::new("chapter-default", "General Chapter");
    for i in 1..=5 {
        chapter.subtopics.push(Topic::new(format!("topic-{i}"), format!("Sample Topic {i}")));
    }

    let mut ws = Workspace::new("Workspace for Any Topic");
    ws.is_default = Some(true);
    ws.topics.push(Topic::new("unit-default", "General Topics").with_child(chapter));
    ws
}

fn starter_workspace(title: &str) -> Workspace {
    let stamp = now_millis();
    let mut ws = Workspace::new(title);
    ws.topics.push(
        Topic::new(format!("unit-{stamp}"), "Unit 1: Fundamentals").with_child(
            Topic::new(format!("chapter-{stamp}"), "Chapter 1: Introduction")
                .with_child(Topic::new(format!("topic-{stamp}-1"), "Topic 1.1")),
        ),
    );
    ws
}
