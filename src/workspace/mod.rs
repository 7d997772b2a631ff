//! Study workspaces: the topic tree, its persistence and its file formats

pub mod export;
pub mod model;
pub mod outline;
pub mod store;
pub mod tree;

use anyhow::Result;

pub use model::{
    GENERAL_NOTE, Topic, TopicContent, TopicStatus, VisualPayload, Workspace, node_id,
};
pub use store::{JsonTable, KvTable, MemoryTable, Record, TopicFile, WorkspaceStore};

/// Add a pending topic under `parent_id`, or at the root when `None`
///
/// Returns the new topic's id.
pub fn add_topic(ws: &mut Workspace, parent_id: Option<&str>, title: &str) -> Result<String> {
    let title = title.trim();
    anyhow::ensure!(!title.is_empty(), "Enter topic title");

    let topic = Topic::new(node_id("topic"), title);
    let id = topic.id.clone();
    if !tree::insert(&mut ws.topics, parent_id, topic) {
        anyhow::bail!("Parent {} not found", parent_id.unwrap_or_default());
    }
    Ok(id)
}
