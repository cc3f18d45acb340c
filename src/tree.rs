//! Tree builder & navigator (C5): turns a flat node list plus share-key
//! messages into a parent/child graph, and provides path/glob/walk
//! navigation over it: deferred-orphan linking so nodes can arrive in any
//! order, glob matching, and a pre-order walk.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

pub use crate::commands::NodeKind;
use crate::attributes::NodeAttributes;

/// A node stored in MEGA: a file, folder, or one of the account's root
/// containers (Cloud Drive, Inbox, Rubbish Bin).
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) hash: String,
    pub(crate) size: u64,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<String>,
    pub(crate) children: Vec<String>,
    pub(crate) key: Vec<u8>,
    pub(crate) attributes: Option<NodeAttributes>,
    pub(crate) created_at: Option<DateTime<Utc>>,
    pub(crate) download_id: Option<String>,
    pub(crate) thumbnail_handle: Option<String>,
    pub(crate) preview_image_handle: Option<String>,
    /// Set when the node's key couldn't be resolved against any known
    /// user/share key; such nodes are kept (not dropped) so they're still
    /// visible in the tree, but their name/attributes are unavailable.
    pub(crate) undecryptable: bool,
    /// Handles of the ancestor share roots this node lives under, outermost
    /// first. Populated by [`Nodes::build_with_share_roots`]; empty for
    /// trees built without share-key context (public-link fetches, a lone
    /// file, tests).
    pub(crate) shares: Vec<String>,
}

impl Node {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn children(&self) -> &[String] {
        self.children.as_slice()
    }

    pub fn key(&self) -> &[u8] {
        self.key.as_slice()
    }

    pub fn attributes(&self) -> Option<&NodeAttributes> {
        self.attributes.as_ref()
    }

    pub fn created_at(&self) -> Option<&DateTime<Utc>> {
        self.created_at.as_ref()
    }

    pub fn download_id(&self) -> Option<&str> {
        self.download_id.as_deref()
    }

    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail_handle.is_some()
    }

    pub fn has_preview_image(&self) -> bool {
        self.preview_image_handle.is_some()
    }

    pub fn thumbnail_handle(&self) -> Option<&str> {
        self.thumbnail_handle.as_deref()
    }

    pub fn preview_image_handle(&self) -> Option<&str> {
        self.preview_image_handle.as_deref()
    }

    pub fn is_undecryptable(&self) -> bool {
        self.undecryptable
    }

    /// Handles of the ancestor share roots this node lives under, outermost
    /// first; empty if the node isn't reached through any share.
    pub fn shares(&self) -> &[String] {
        self.shares.as_slice()
    }

    pub(crate) fn placeholder(hash: String, kind: NodeKind, ts: u64, parent: Option<String>) -> Self {
        Self {
            name: match kind {
                NodeKind::Root => "Root".to_string(),
                NodeKind::Inbox => "Inbox".to_string(),
                NodeKind::Trash => "Trash".to_string(),
                _ => String::new(),
            },
            hash,
            size: 0,
            kind,
            parent,
            children: Vec::new(),
            key: Vec::new(),
            attributes: None,
            created_at: Utc.timestamp_opt(ts as i64, 0).single(),
            download_id: None,
            thumbnail_handle: None,
            preview_image_handle: None,
            undecryptable: false,
            shares: Vec::new(),
        }
    }

    /// A node whose key couldn't be resolved against any known user/share
    /// key: kept in the tree (not dropped) so callers can still see it's
    /// there, but with no name or attributes available.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn undecryptable(
        hash: String,
        size: u64,
        kind: NodeKind,
        parent: Option<String>,
        created_at: Option<DateTime<Utc>>,
        download_id: Option<&str>,
        thumbnail_handle: Option<String>,
        preview_image_handle: Option<String>,
    ) -> Self {
        Self {
            name: String::new(),
            hash,
            size,
            kind,
            parent,
            children: Vec::new(),
            key: Vec::new(),
            attributes: None,
            created_at,
            download_id: download_id.map(str::to_string),
            thumbnail_handle,
            preview_image_handle,
            undecryptable: true,
            shares: Vec::new(),
        }
    }

    /// A node with a successfully resolved key and decrypted attributes.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn decrypted(
        hash: String,
        size: u64,
        kind: NodeKind,
        parent: Option<String>,
        key: Vec<u8>,
        attributes: NodeAttributes,
        created_at: Option<DateTime<Utc>>,
        download_id: Option<&str>,
        thumbnail_handle: Option<String>,
        preview_image_handle: Option<String>,
    ) -> Self {
        Self {
            name: attributes.name.clone(),
            hash,
            size,
            kind,
            parent,
            children: Vec::new(),
            key,
            attributes: Some(attributes),
            created_at,
            download_id: download_id.map(str::to_string),
            thumbnail_handle,
            preview_image_handle,
            undecryptable: false,
            shares: Vec::new(),
        }
    }

    /// A lone file node reached through a public file link, which carries
    /// no parent and is addressed by its own handle as its download id.
    pub(crate) fn file_from_public_link(hash: String, size: u64, key: Vec<u8>, attributes: NodeAttributes) -> Self {
        let download_id = Some(hash.clone());
        Self {
            name: attributes.name.clone(),
            hash,
            size,
            kind: NodeKind::File,
            parent: None,
            children: Vec::new(),
            key,
            attributes: Some(attributes),
            created_at: None,
            download_id,
            thumbnail_handle: None,
            preview_image_handle: None,
            undecryptable: false,
            shares: Vec::new(),
        }
    }
}

/// A collection of nodes, indexed for O(1) handle lookup, with cached root
/// handles for the three well-known containers.
pub struct Nodes {
    pub(crate) nodes: HashMap<String, Node>,
    pub(crate) cloud_drive: Option<String>,
    pub(crate) rubbish_bin: Option<String>,
    pub(crate) inbox: Option<String>,
}

impl Nodes {
    /// Builds the tree from an unordered set of nodes in two passes: first
    /// every node is present with its own fields filled in, then parent
    /// links are resolved, deferring a node whose parent hasn't appeared
    /// yet until that parent is in the map (never attaching a node before
    /// its parent exists).
    pub fn build(nodes: HashMap<String, Node>) -> Self {
        Self::build_with_share_roots(nodes, &std::collections::HashSet::new())
    }

    /// Like [`Nodes::build`], but also stamps each node's [`Node::shares`]
    /// with the chain of ancestor handles found in `share_roots` (the set
    /// of node handles for which an authenticated share key was resolved).
    pub fn build_with_share_roots(mut nodes: HashMap<String, Node>, share_roots: &std::collections::HashSet<String>) -> Self {
        let mut pending: Vec<String> = nodes.keys().cloned().collect();
        let mut progressed = true;

        while progressed && !pending.is_empty() {
            progressed = false;
            let mut still_pending = Vec::new();

            for hash in pending {
                let Some(parent_hash) = nodes.get(&hash).and_then(|n| n.parent.clone()) else {
                    continue;
                };

                if nodes.contains_key(&parent_hash) {
                    if let Some(parent) = nodes.get_mut(&parent_hash) {
                        if !parent.children.contains(&hash) {
                            parent.children.push(hash.clone());
                            progressed = true;
                        }
                    }
                } else {
                    still_pending.push(hash);
                }
            }

            pending = still_pending;
        }

        if !share_roots.is_empty() {
            let shares_by_hash: HashMap<String, Vec<String>> = nodes
                .keys()
                .map(|hash| {
                    let mut chain = Vec::new();
                    let mut current = nodes.get(hash).and_then(|n| n.parent.clone());
                    while let Some(ancestor_hash) = current {
                        if share_roots.contains(&ancestor_hash) {
                            chain.push(ancestor_hash.clone());
                        }
                        current = nodes.get(&ancestor_hash).and_then(|n| n.parent.clone());
                    }
                    chain.reverse();
                    (hash.clone(), chain)
                })
                .collect();

            for (hash, chain) in shares_by_hash {
                if let Some(node) = nodes.get_mut(&hash) {
                    node.shares = chain;
                }
            }
        }

        let cloud_drive = nodes
            .values()
            .find(|n| n.kind == NodeKind::Root)
            .map(|n| n.hash.clone());
        let rubbish_bin = nodes
            .values()
            .find(|n| n.kind == NodeKind::Trash)
            .map(|n| n.hash.clone());
        let inbox = nodes
            .values()
            .find(|n| n.kind == NodeKind::Inbox)
            .map(|n| n.hash.clone());

        Self {
            nodes,
            cloud_drive,
            rubbish_bin,
            inbox,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes with no known parent in this collection: the three root
    /// containers for an own-account fetch, or the shared subtree's root
    /// for a public-link fetch.
    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .values()
            .filter(|node| node.parent.as_deref().map_or(true, |p| !self.nodes.contains_key(p)))
    }

    pub fn get_node_by_hash(&self, hash: &str) -> Option<&Node> {
        self.nodes.get(hash)
    }

    /// Resolves a `/`-segmented path. Duplicate sibling names resolve to
    /// the first-seen match; use [`Nodes::find_all`] to see every match.
    pub fn get_node_by_path(&self, path: &str) -> Option<&Node> {
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            return None;
        }

        let Some((root_name, rest)) = path.split_once('/') else {
            return self.roots().find(|n| n.name == path);
        };

        let root = self.roots().find(|n| n.name == root_name)?;
        rest.split('/').filter(|s| !s.is_empty()).try_fold(root, |node, segment| {
            match segment {
                "." => Some(node),
                ".." => node.parent.as_deref().and_then(|p| self.get_node_by_hash(p)),
                name => node
                    .children
                    .iter()
                    .find_map(|hash| self.get_node_by_hash(hash).filter(|n| n.name == name)),
            }
        })
    }

    /// Every node whose path matches `name` exactly, anywhere in the tree
    /// (unlike `get_node_by_path`, which stops at the first sibling match).
    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> {
        self.nodes.values().filter(move |n| n.name == name)
    }

    /// Matches `pattern` against node names using shell-style glob
    /// semantics: `*` matches any run of characters within one path
    /// segment, `?` matches exactly one character, and `**` matches across
    /// segment boundaries (zero or more whole segments).
    pub fn glob<'a>(&'a self, pattern: &'a str) -> Vec<&'a Node> {
        let pattern = pattern.strip_prefix('/').unwrap_or(pattern);
        let segments: Vec<&str> = pattern.split('/').collect();

        let mut matches = Vec::new();
        for root in self.roots() {
            self.glob_walk(root, &segments, &mut matches);
        }
        matches
    }

    fn glob_walk<'a>(&'a self, node: &'a Node, segments: &[&str], out: &mut Vec<&'a Node>) {
        let Some((first, rest)) = segments.split_first() else {
            return;
        };

        if *first == "**" {
            // `**` may consume zero segments (match here) or expand across
            // any number of child levels.
            if rest.is_empty() || rest == &[""] {
                out.push(node);
            } else {
                self.glob_walk(node, rest, out);
            }
            for child_hash in &node.children {
                if let Some(child) = self.get_node_by_hash(child_hash) {
                    self.glob_walk(child, segments, out);
                }
            }
            return;
        }

        if rest.is_empty() {
            if glob_match(first, &node.name) {
                out.push(node);
            }
            return;
        }

        if glob_match(first, &node.name) {
            for child_hash in &node.children {
                if let Some(child) = self.get_node_by_hash(child_hash) {
                    self.glob_walk(child, rest, out);
                }
            }
        }
    }

    /// Pre-order walk starting at `root`, yielding `(folder, subfolders,
    /// files)` for every folder reached, analogous to a filesystem walk.
    pub fn walk<'a>(&'a self, root: &'a Node) -> Vec<(&'a Node, Vec<&'a Node>, Vec<&'a Node>)> {
        let mut out = Vec::new();
        self.walk_inner(root, &mut out);
        out
    }

    fn walk_inner<'a>(&'a self, node: &'a Node, out: &mut Vec<(&'a Node, Vec<&'a Node>, Vec<&'a Node>)>) {
        if !node.kind.is_folder() && !node.kind.is_root() && !node.kind.is_inbox() && !node.kind.is_rubbish_bin() {
            return;
        }

        let mut folders = Vec::new();
        let mut files = Vec::new();

        for child_hash in &node.children {
            if let Some(child) = self.get_node_by_hash(child_hash) {
                if child.kind.is_file() {
                    files.push(child);
                } else {
                    folders.push(child);
                }
            }
        }

        out.push((node, folders.clone(), files));

        for folder in folders {
            self.walk_inner(folder, out);
        }
    }

    /// Renders the subtree rooted at `root` as an indented tree, folders
    /// before files at each level, down to `max_depth` levels (`None` for
    /// unlimited).
    pub fn print_tree(&self, root: &Node, max_depth: Option<usize>) -> String {
        let mut out = String::new();
        out.push_str(root.name());
        out.push('\n');
        self.print_tree_inner(root, "", max_depth, 0, &mut out);
        out
    }

    fn print_tree_inner(&self, node: &Node, prefix: &str, max_depth: Option<usize>, depth: usize, out: &mut String) {
        if max_depth.is_some_and(|max| depth >= max) {
            return;
        }

        let mut children: Vec<&Node> = node
            .children
            .iter()
            .filter_map(|h| self.get_node_by_hash(h))
            .collect();
        children.sort_by(|a, b| match (a.kind.is_folder(), b.kind.is_folder()) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });

        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            let is_last = i + 1 == count;
            let branch = if is_last { "└── " } else { "├── " };
            out.push_str(prefix);
            out.push_str(branch);
            out.push_str(child.name());
            out.push('\n');

            let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
            self.print_tree_inner(child, &child_prefix, max_depth, depth + 1, out);
        }
    }

    pub fn cloud_drive(&self) -> Option<&Node> {
        self.cloud_drive.as_deref().and_then(|h| self.nodes.get(h))
    }

    pub fn inbox(&self) -> Option<&Node> {
        self.inbox.as_deref().and_then(|h| self.nodes.get(h))
    }

    pub fn rubbish_bin(&self) -> Option<&Node> {
        self.rubbish_bin.as_deref().and_then(|h| self.nodes.get(h))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }
}

impl IntoIterator for Nodes {
    type Item = Node;
    type IntoIter = std::collections::hash_map::IntoValues<String, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_values()
    }
}

/// A minimal glob matcher supporting `*` (any run within the segment) and
/// `?` (exactly one character); `**` is handled one level up in
/// [`Nodes::glob_walk`] since it spans segments.
fn glob_match(pattern: &str, name: &str) -> bool {
    fn inner(pattern: &[u8], name: &[u8]) -> bool {
        match (pattern.first(), name.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(&pattern[1..], name) || (!name.is_empty() && inner(pattern, &name[1..]))
            }
            (Some(b'?'), Some(_)) => inner(&pattern[1..], &name[1..]),
            (Some(p), Some(n)) if p == n => inner(&pattern[1..], &name[1..]),
            _ => false,
        }
    }

    inner(pattern.as_bytes(), name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(hash: &str, parent: &str, kind: NodeKind) -> Node {
        Node {
            name: hash.to_string(),
            hash: hash.to_string(),
            size: 0,
            kind,
            parent: Some(parent.to_string()),
            children: Vec::new(),
            key: Vec::new(),
            attributes: None,
            created_at: None,
            download_id: None,
            thumbnail_handle: None,
            preview_image_handle: None,
            undecryptable: false,
            shares: Vec::new(),
        }
    }

    #[test]
    fn deferred_orphan_links_after_parent_arrives() {
        let mut map = HashMap::new();
        // child inserted before its parent exists in the map
        map.insert("child".to_string(), leaf("child", "root", NodeKind::File));
        map.insert(
            "root".to_string(),
            Node::placeholder("root".to_string(), NodeKind::Root, 0, None),
        );

        let nodes = Nodes::build(map);
        let root = nodes.get_node_by_hash("root").unwrap();
        assert_eq!(root.children(), &["child".to_string()]);
    }

    #[test]
    fn glob_match_supports_star_and_question_mark() {
        assert!(glob_match("*.txt", "report.txt"));
        assert!(!glob_match("*.txt", "report.pdf"));
        assert!(glob_match("rep?rt.txt", "report.txt"));
        assert!(!glob_match("rep?rt.txt", "repoort.txt"));
    }

    #[test]
    fn shares_lists_ancestor_share_roots_outermost_first() {
        let mut map = HashMap::new();
        map.insert(
            "root".to_string(),
            Node::placeholder("root".to_string(), NodeKind::Root, 0, None),
        );

        let mut outer_share = leaf("outer_share", "root", NodeKind::Folder);
        outer_share.children = vec!["inner_share".to_string()];
        map.insert("outer_share".to_string(), outer_share);

        let mut inner_share = leaf("inner_share", "outer_share", NodeKind::Folder);
        inner_share.children = vec!["file".to_string()];
        map.insert("inner_share".to_string(), inner_share);

        map.insert("file".to_string(), leaf("file", "inner_share", NodeKind::File));

        let mut share_roots = std::collections::HashSet::new();
        share_roots.insert("outer_share".to_string());
        share_roots.insert("inner_share".to_string());

        let nodes = Nodes::build_with_share_roots(map, &share_roots);

        let file = nodes.get_node_by_hash("file").unwrap();
        assert_eq!(file.shares(), &["outer_share".to_string(), "inner_share".to_string()]);

        let root = nodes.get_node_by_hash("root").unwrap();
        assert!(root.shares().is_empty());
    }

    #[test]
    fn path_resolution_supports_dot_dot() {
        let mut map = HashMap::new();
        let mut root = Node::placeholder("root".to_string(), NodeKind::Root, 0, None);
        root.name = "Root".to_string();
        root.children = vec!["folder".to_string()];
        map.insert("root".to_string(), root);

        let mut folder = leaf("folder", "root", NodeKind::Folder);
        folder.name = "Documents".to_string();
        map.insert("folder".to_string(), folder);

        let nodes = Nodes::build(map);
        let resolved = nodes.get_node_by_path("/Root/Documents/..").unwrap();
        assert_eq!(resolved.name(), "Root");
    }
}
