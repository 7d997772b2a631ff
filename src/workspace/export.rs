//! Plain-text and JSON export/import of workspaces and topics

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

use super::model::{Topic, TopicContent, Workspace, node_id};
use super::tree;

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\-_\s]").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Unit name used when an imported topic names no known unit
pub const IMPORTED_UNIT: &str = "Imported Unit";
/// Chapter name used when an imported topic names no known chapter
pub const IMPORTED_CHAPTER: &str = "Imported Chapter";

/// Header lines are only looked for near the top of a topic file
const HEADER_SCAN_LINES: usize = 10;

/// File-system-safe lowercase name
pub fn sanitize_name(name: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(name, "_");
    let collapsed = WHITESPACE_RUN.replace_all(replaced.trim(), "_");
    let lowered = collapsed.to_lowercase();
    if lowered.is_empty() { "untitled".to_string() } else { lowered }
}

/// Text content of description markup
pub fn flatten_description(markup: &str) -> String {
    let fragment = Html::parse_fragment(markup);
    fragment.root_element().text().collect::<String>().trim().to_string()
}

/// A topic in the `#unit:` / `#chapter:` / `#topic:` text format
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicText {
    pub unit: String,
    pub chapter: String,
    pub topic: String,
    pub body: String,
}

impl TopicText {
    /// Parse a topic file
    ///
    /// Headers are read from the first lines until a blank line, which starts
    /// the body. Without a blank line the whole file is the body.
    pub fn parse(content: &str) -> Self {
        let lines: Vec<&str> = content.lines().collect();
        let mut parsed = Self::default();
        let mut body_start = 0;

        for (i, line) in lines.iter().take(HEADER_SCAN_LINES).enumerate() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("#unit:") {
                parsed.unit = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("#chapter:") {
                parsed.chapter = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("#topic:") {
                parsed.topic = rest.trim().to_string();
            } else if line.is_empty() {
                body_start = i + 1;
                break;
            }
        }

        parsed.body = lines[body_start.min(lines.len())..].join("\n").trim().to_string();
        parsed
    }

    /// Render in the same format `parse` accepts
    pub fn render(&self) -> String {
        format!(
            "#unit: {}\n#chapter: {}\n#topic: {}\n\n{}",
            self.unit, self.chapter, self.topic, self.body
        )
    }

    /// Suggested download name, `unit_chapter_topic.txt`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.txt",
            sanitize_name(&self.unit),
            sanitize_name(&self.chapter),
            sanitize_name(&self.topic)
        )
    }
}

/// Export one topic of a workspace as text
pub fn export_topic(ws: &Workspace, topic_id: &str) -> Option<TopicText> {
    let topic = tree::find_by_id(&ws.topics, topic_id)?;
    Some(TopicText {
        unit: tree::parent_unit(&ws.topics, topic_id),
        chapter: tree::parent_chapter(&ws.topics, topic_id),
        topic: topic.name.clone(),
        body: topic.description().map(flatten_description).unwrap_or_default(),
    })
}

/// Where imported topics go when the file names no known unit or chapter
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportTarget<'a> {
    pub unit_id: Option<&'a str>,
    pub chapter_id: Option<&'a str>,
}

/// Import a topic file into a workspace, returning the new topic id
///
/// The unit is matched by name among the root nodes, then by the target
/// id, and otherwise created. The chapter is resolved the same way inside
/// that unit. `file_stem` names the topic when the file has no `#topic:`.
pub fn import_topic(
    ws: &mut Workspace,
    file_stem: &str,
    content: &str,
    target: ImportTarget<'_>,
) -> String {
    let parsed = TopicText::parse(content);

    let title = if parsed.topic.is_empty() { file_stem.to_string() } else { parsed.topic.clone() };
    let mut topic = Topic::new(node_id("topic"), title);
    topic.attach_content(TopicContent { description: Some(parsed.body), ..Default::default() });
    let topic_id = topic.id.clone();

    let unit_idx = position_by(&ws.topics, &parsed.unit, target.unit_id).unwrap_or_else(|| {
        let name = non_empty_or(&parsed.unit, IMPORTED_UNIT);
        ws.topics.push(Topic::new(node_id("unit"), name));
        ws.topics.len() - 1
    });
    let unit = &mut ws.topics[unit_idx];

    let chapter_idx =
        position_by(&unit.subtopics, &parsed.chapter, target.chapter_id).unwrap_or_else(|| {
            let name = non_empty_or(&parsed.chapter, IMPORTED_CHAPTER);
            unit.subtopics.push(Topic::new(node_id("chapter"), name));
            unit.subtopics.len() - 1
        });
    unit.subtopics[chapter_idx].subtopics.push(topic);

    tracing::info!("Imported topic {} into workspace {}", topic_id, ws.id);
    topic_id
}

fn position_by(nodes: &[Topic], name: &str, fallback_id: Option<&str>) -> Option<usize> {
    let by_name = (!name.is_empty()).then(|| nodes.iter().position(|n| n.name == name)).flatten();
    by_name.or_else(|| fallback_id.and_then(|id| nodes.iter().position(|n| n.id == id)))
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() { fallback.to_string() } else { value.to_string() }
}

/// Serialize a workspace as a pretty JSON document
pub fn export_json(ws: &Workspace) -> Result<String> {
    serde_json::to_string_pretty(ws).with_context(|| "Failed to serialize workspace")
}

/// Parse a workspace JSON document
pub fn import_json(text: &str) -> Result<Workspace> {
    serde_json::from_str(text).with_context(|| "Failed to parse workspace JSON")
}

/// Write a workspace as a directory tree under `dest`
///
/// Layout: `<workspace>/<unit>/<chapter>/<topic>.txt` for every leaf, plus
/// `<workspace>/workspace.json`. Returns the workspace directory.
pub fn export_directory(ws: &Workspace, dest: &Path) -> Result<PathBuf> {
    let root = dest.join(sanitize_name(&ws.title));
    fs::create_dir_all(&root)
        .with_context(|| format!("Failed to create export directory {:?}", root))?;

    for unit in &ws.topics {
        write_leaves(&root, unit, &mut Vec::new())?;
    }

    let manifest = root.join("workspace.json");
    fs::write(&manifest, export_json(ws)?)
        .with_context(|| format!("Failed to write {:?}", manifest))?;

    tracing::info!("Exported workspace {} to {:?}", ws.id, root);
    Ok(root)
}

fn write_leaves<'a>(root: &Path, node: &'a Topic, ancestors: &mut Vec<&'a str>) -> Result<()> {
    if !node.subtopics.is_empty() {
        ancestors.push(&node.name);
        for child in &node.subtopics {
            write_leaves(root, child, ancestors)?;
        }
        ancestors.pop();
        return Ok(());
    }

    let unit = sanitize_name(ancestors.first().copied().unwrap_or("unit"));
    let chapter = sanitize_name(ancestors.get(1).copied().unwrap_or("chapter"));
    let dir = root.join(unit).join(chapter);
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;

    let path = dir.join(format!("{}.txt", sanitize_name(&node.name)));
    let text = node.description().map(flatten_description).unwrap_or_default();
    fs::write(&path, text).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}
