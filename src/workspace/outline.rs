//! Course outlines produced by the structure prompt

use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::extract::quiz::extract_braced;

use super::model::{Topic, Workspace, now_millis};

/// Top-level outline document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Outline {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub units: Vec<OutlineUnit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutlineUnit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub chapters: Vec<OutlineChapter>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutlineChapter {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub topics: Vec<OutlineTopic>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutlineTopic {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
}

/// Parse JSON directly, or from the first `{` to the last `}`
pub fn safe_parse_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }

    let braced = extract_braced(text).context("Invalid JSON format")?;
    serde_json::from_str(braced).context("Invalid JSON format")
}

fn title_or(title: &Option<String>, fallback: impl FnOnce() -> String) -> String {
    match title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => fallback(),
    }
}

/// Build a new workspace from an outline
///
/// Missing titles are numbered by position (`Unit 1`, `Chapter 1.2`,
/// `Topic 1.2.3`) and every node starts out pending.
pub fn build_workspace(outline: &Outline, fallback_title: &str) -> Workspace {
    let title = title_or(&outline.subject, || {
        if fallback_title.trim().is_empty() {
            "Workspace".to_string()
        } else {
            fallback_title.trim().to_string()
        }
    });

    let stamp = now_millis();
    let mut ws = Workspace::new(title);

    for (ui, unit) in outline.units.iter().enumerate() {
        let u = ui + 1;
        let mut unit_node = Topic::new(
            format!("unit-{stamp}-{ui}"),
            title_or(&unit.title, || format!("Unit {u}")),
        );

        for (ci, chapter) in unit.chapters.iter().enumerate() {
            let c = ci + 1;
            let mut chapter_node = Topic::new(
                format!("chapter-{stamp}-{ui}-{ci}"),
                title_or(&chapter.title, || format!("Chapter {u}.{c}")),
            );

            for (ti, topic) in chapter.topics.iter().enumerate() {
                let t = ti + 1;
                let mut node = Topic::new(
                    format!("topic-{stamp}-{ui}-{ci}-{ti}"),
                    title_or(&topic.title, || format!("Topic {u}.{c}.{t}")),
                );
                node.objective = topic.objective.clone();
                chapter_node.subtopics.push(node);
            }

            unit_node.subtopics.push(chapter_node);
        }

        ws.topics.push(unit_node);
    }

    tracing::info!(
        "Built workspace \"{}\" with {} units from outline",
        ws.title,
        ws.topics.len()
    );
    ws
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::tree;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_outline_wrapped_in_prose() {
        let text = r#"Sure! Here is the outline:
```json
{"subject":"Algebra","units":[{"title":"Basics","chapters":[{"title":"Numbers","topics":[{"title":"Integers","objective":"Add integers"}]}]}]}
```"#;
        let outline: Outline = safe_parse_json(text).unwrap();
        assert_eq!(outline.subject.as_deref(), Some("Algebra"));
        assert_eq!(outline.units[0].chapters[0].topics[0].objective.as_deref(), Some("Add integers"));
    }

    #[test]
    fn rejects_text_without_json() {
        assert!(safe_parse_json::<Outline>("no outline today").is_err());
    }

    #[test]
    fn builds_tree_with_objectives() {
        let outline: Outline = safe_parse_json(
            r#"{"subject":"Algebra","units":[{"title":"Basics","chapters":[{"title":"Numbers","topics":[{"title":"Integers","objective":"Add integers"}]}]}]}"#,
        )
        .unwrap();
        let ws = build_workspace(&outline, "ignored");

        assert_eq!(ws.title, "Algebra");
        let all = tree::collect_all(&ws.topics);
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|t| !t.is_ready()));

        let leaf = &ws.topics[0].subtopics[0].subtopics[0];
        assert_eq!(leaf.name, "Integers");
        assert_eq!(leaf.objective.as_deref(), Some("Add integers"));
        assert!(leaf.id.starts_with("topic-") && leaf.id.ends_with("-0-0-0"));
    }

    #[test]
    fn missing_titles_get_positional_names() {
        let outline: Outline =
            safe_parse_json(r#"{"units":[{},{"chapters":[{},{"topics":[{},{},{}]}]}]}"#).unwrap();
        let ws = build_workspace(&outline, "My Course");

        assert_eq!(ws.title, "My Course");
        let names: Vec<&str> = tree::collect_all(&ws.topics).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Unit 1",
                "Unit 2",
                "Chapter 2.1",
                "Chapter 2.2",
                "Topic 2.2.1",
                "Topic 2.2.2",
                "Topic 2.2.3",
            ]
        );
    }

    #[test]
    fn empty_titles_fall_back_to_workspace() {
        let ws = build_workspace(&Outline::default(), "  ");
        assert_eq!(ws.title, "Workspace");
        assert!(ws.topics.is_empty());
    }
}
