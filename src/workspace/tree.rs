//! Topic tree operations
//!
//! All functions operate on a workspace's root sequence of units. Lookups
//! walk the tree depth-first in pre-order and return the first match, so DFS
//! order is the tie-break should two nodes ever share an id.

use super::model::Topic;

/// Name reported when a node has no unit ancestor
pub const NO_UNIT: &str = "No Unit";
/// Name reported when a node has no chapter ancestor
pub const NO_CHAPTER: &str = "No Chapter";

/// Find a node by id
pub fn find_by_id<'a>(topics: &'a [Topic], id: &str) -> Option<&'a Topic> {
    for topic in topics {
        if topic.id == id {
            return Some(topic);
        }
        if let Some(found) = find_by_id(&topic.subtopics, id) {
            return Some(found);
        }
    }
    None
}

/// Find a node by id for mutation
pub fn find_by_id_mut<'a>(topics: &'a mut [Topic], id: &str) -> Option<&'a mut Topic> {
    for topic in topics.iter_mut() {
        if topic.id == id {
            return Some(topic);
        }
        if let Some(found) = find_by_id_mut(&mut topic.subtopics, id) {
            return Some(found);
        }
    }
    None
}

/// Root-to-node chain of the first node matching `id` (node included)
pub fn ancestry<'a>(topics: &'a [Topic], id: &str) -> Option<Vec<&'a Topic>> {
    for topic in topics {
        if topic.id == id {
            return Some(vec![topic]);
        }
        if let Some(mut path) = ancestry(&topic.subtopics, id) {
            path.insert(0, topic);
            return Some(path);
        }
    }
    None
}

/// Nesting depth of a node (0 = unit)
pub fn depth_of(topics: &[Topic], id: &str) -> Option<usize> {
    ancestry(topics, id).map(|path| path.len() - 1)
}

/// Name of the depth-0 ancestor, or [`NO_UNIT`] for units and unknown ids
pub fn parent_unit(topics: &[Topic], id: &str) -> String {
    match ancestry(topics, id) {
        Some(path) if path.len() >= 2 => path[0].name.clone(),
        _ => NO_UNIT.to_string(),
    }
}

/// Name of the chapter a node belongs to
///
/// A chapter's own "chapter" is its parent unit; deeper nodes resolve to
/// their depth-1 ancestor. Units and unknown ids give [`NO_CHAPTER`].
pub fn parent_chapter(topics: &[Topic], id: &str) -> String {
    match ancestry(topics, id) {
        Some(path) if path.len() == 2 => path[0].name.clone(),
        Some(path) if path.len() >= 3 => path[1].name.clone(),
        _ => NO_CHAPTER.to_string(),
    }
}

/// Breadcrumb label such as `Unit > Chapter > Topic`
pub fn label_path(topics: &[Topic], id: &str) -> Option<String> {
    ancestry(topics, id)
        .map(|path| path.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(" > "))
}

/// Pre-order flatten of every node at every depth
pub fn collect_all(topics: &[Topic]) -> Vec<&Topic> {
    let mut out = Vec::new();
    collect_into(topics, &mut out);
    out
}

fn collect_into<'a>(topics: &'a [Topic], out: &mut Vec<&'a Topic>) {
    for topic in topics {
        out.push(topic);
        collect_into(&topic.subtopics, out);
    }
}

/// Insert a node under `parent_id`, or at the root when `parent_id` is `None`
///
/// Returns `false` (and drops the node) when the parent does not exist.
pub fn insert(topics: &mut Vec<Topic>, parent_id: Option<&str>, node: Topic) -> bool {
    match parent_id {
        None => {
            topics.push(node);
            true
        }
        Some(pid) => match find_by_id_mut(topics, pid) {
            Some(parent) => {
                parent.subtopics.push(node);
                true
            }
            None => false,
        },
    }
}

/// Remove the first node matching `id` together with its subtree
pub fn remove(topics: &mut Vec<Topic>, id: &str) -> bool {
    for i in 0..topics.len() {
        if topics[i].id == id {
            topics.remove(i);
            return true;
        }
        if remove(&mut topics[i].subtopics, id) {
            return true;
        }
    }
    false
}

/// Rename a node
pub fn rename(topics: &mut [Topic], id: &str, new_name: &str) -> bool {
    match find_by_id_mut(topics, id) {
        Some(topic) => {
            topic.name = new_name.to_string();
            true
        }
        None => false,
    }
}

/// Percentage (0-100) of nodes whose content is ready
pub fn progress(topics: &[Topic]) -> f64 {
    let all = collect_all(topics);
    if all.is_empty() {
        return 0.0;
    }
    let ready = all.iter().filter(|t| t.is_ready()).count();
    ready as f64 / all.len() as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::model::{TopicContent, TopicStatus};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sample_tree() -> Vec<Topic> {
        vec![
            Topic::new("u1", "Unit 1")
                .with_child(
                    Topic::new("c1", "Chapter 1")
                        .with_child(Topic::new("t1", "Topic 1"))
                        .with_child(
                            Topic::new("t2", "Topic 2").with_child(Topic::new("t2a", "Deep")),
                        ),
                )
                .with_child(Topic::new("c2", "Chapter 2")),
            Topic::new("u2", "Unit 2"),
        ]
    }

    #[test]
    fn find_by_id_searches_all_depths() {
        let tree = sample_tree();
        assert_eq!(find_by_id(&tree, "t2a").map(|t| t.name.as_str()), Some("Deep"));
        assert_eq!(find_by_id(&tree, "u2").map(|t| t.name.as_str()), Some("Unit 2"));
        assert!(find_by_id(&tree, "missing").is_none());
    }

    #[test]
    fn find_by_id_is_exact_match() {
        let tree = sample_tree();
        assert!(find_by_id(&tree, "T1").is_none());
        assert!(find_by_id(&tree, "t").is_none());
    }

    #[test]
    fn duplicate_ids_resolve_in_preorder() {
        let tree = vec![
            Topic::new("a", "First").with_child(Topic::new("dup", "Nested")),
            Topic::new("dup", "Root"),
        ];
        assert_eq!(find_by_id(&tree, "dup").unwrap().name, "Nested");
    }

    #[test]
    fn parent_unit_resolves_root_ancestor() {
        let tree = sample_tree();
        assert_eq!(parent_unit(&tree, "u1"), NO_UNIT);
        assert_eq!(parent_unit(&tree, "c1"), "Unit 1");
        assert_eq!(parent_unit(&tree, "t1"), "Unit 1");
        assert_eq!(parent_unit(&tree, "t2a"), "Unit 1");
        assert_eq!(parent_unit(&tree, "missing"), NO_UNIT);
    }

    #[test]
    fn parent_chapter_resolves_depth_one_ancestor() {
        let tree = sample_tree();
        assert_eq!(parent_chapter(&tree, "u1"), NO_CHAPTER);
        assert_eq!(parent_chapter(&tree, "c1"), "Unit 1");
        assert_eq!(parent_chapter(&tree, "t1"), "Chapter 1");
        assert_eq!(parent_chapter(&tree, "t2a"), "Chapter 1");
        assert_eq!(parent_chapter(&tree, "missing"), NO_CHAPTER);
    }

    #[test]
    fn label_path_joins_names() {
        let tree = sample_tree();
        assert_eq!(label_path(&tree, "t1").as_deref(), Some("Unit 1 > Chapter 1 > Topic 1"));
        assert_eq!(label_path(&tree, "nope"), None);
    }

    #[test]
    fn depth_matches_nesting() {
        let tree = sample_tree();
        assert_eq!(depth_of(&tree, "u2"), Some(0));
        assert_eq!(depth_of(&tree, "c2"), Some(1));
        assert_eq!(depth_of(&tree, "t2a"), Some(3));
    }

    #[test]
    fn collect_all_is_preorder() {
        let tree = sample_tree();
        let ids: Vec<&str> = collect_all(&tree).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "c1", "t1", "t2", "t2a", "c2", "u2"]);
    }

    #[test]
    fn insert_appends_to_parent_or_root() {
        let mut tree = sample_tree();
        assert!(insert(&mut tree, Some("c2"), Topic::new("t3", "Topic 3")));
        assert!(insert(&mut tree, None, Topic::new("u3", "Unit 3")));
        assert!(!insert(&mut tree, Some("missing"), Topic::new("x", "X")));

        assert_eq!(parent_chapter(&tree, "t3"), "Chapter 2");
        assert_eq!(tree.last().unwrap().id, "u3");
        assert!(find_by_id(&tree, "x").is_none());
    }

    #[test]
    fn remove_drops_whole_subtree() {
        let mut tree = sample_tree();
        assert!(remove(&mut tree, "c1"));
        assert!(find_by_id(&tree, "c1").is_none());
        assert!(find_by_id(&tree, "t2a").is_none());
        assert_eq!(collect_all(&tree).len(), 3);
        assert!(!remove(&mut tree, "c1"));
    }

    #[test]
    fn rename_is_idempotent() {
        let mut once = sample_tree();
        assert!(rename(&mut once, "t1", "Renamed"));

        let mut twice = sample_tree();
        assert!(rename(&mut twice, "t1", "Renamed"));
        assert!(rename(&mut twice, "t1", "Renamed"));

        assert_eq!(once, twice);
        assert!(!rename(&mut once, "missing", "x"));
    }

    #[test]
    fn progress_counts_ready_nodes() {
        assert_eq!(progress(&[]), 0.0);

        let mut tree = vec![Topic::new("u", "U").with_child(Topic::new("t", "T"))];
        assert_eq!(progress(&tree), 0.0);

        find_by_id_mut(&mut tree, "t").unwrap().attach_content(TopicContent::default());
        assert_eq!(progress(&tree), 50.0);
        assert_eq!(find_by_id(&tree, "t").unwrap().status, TopicStatus::Ready);
    }

    /// Builds a random tree from a list of parent choices: node `i` is
    /// attached under node `choice % i`, or at the root when that is zero.
    fn build_tree(choices: &[usize]) -> Vec<Topic> {
        let mut tree = Vec::new();
        for (i, choice) in choices.iter().enumerate() {
            let node = Topic::new(format!("n{i}"), format!("Node {i}"));
            let parent = if i == 0 { 0 } else { choice % (i + 1) };
            if parent == 0 {
                insert(&mut tree, None, node);
            } else {
                let parent_id = format!("n{}", parent - 1);
                assert!(insert(&mut tree, Some(&parent_id), node));
            }
        }
        tree
    }

    proptest! {
        #[test]
        fn collect_all_counts_every_node(choices in proptest::collection::vec(0usize..50, 0..40)) {
            let tree = build_tree(&choices);
            prop_assert_eq!(collect_all(&tree).len(), choices.len());
        }

        #[test]
        fn insert_then_find_then_remove(choices in proptest::collection::vec(0usize..50, 1..30), pick in 0usize..100) {
            let mut tree = build_tree(&choices);
            let parent = format!("n{}", pick % choices.len());

            prop_assert!(insert(&mut tree, Some(&parent), Topic::new("fresh", "Fresh")));
            prop_assert_eq!(find_by_id(&tree, "fresh").map(|t| t.name.as_str()), Some("Fresh"));
            prop_assert_eq!(collect_all(&tree).len(), choices.len() + 1);

            prop_assert!(remove(&mut tree, "fresh"));
            prop_assert!(find_by_id(&tree, "fresh").is_none());
            prop_assert_eq!(collect_all(&tree).len(), choices.len());
        }
    }
}
