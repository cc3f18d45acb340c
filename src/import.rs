//! Folder importer (C8): copies a public folder link's subtree into the
//! current account, giving every folder a fresh key while files keep the
//! key they already had (so their ciphertext on MEGA's servers doesn't need
//! to move). Grounded in the same `UploadComplete` command the uploader and
//! `create_dir` use: one pre-order walk of the source subtree, submitting
//! each node once its new parent's real handle is known.

use base64::prelude::{Engine, BASE64_URL_SAFE_NO_PAD};

use crate::attributes::NodeAttributes;
use crate::commands::{NodeKind, Request, Response, UploadAttributes};
use crate::crypto;
use crate::error::{Error, Result};
use crate::http::UserSession;
use crate::pipeline::{Pipeline, Priority};
use crate::tree::{Node, Nodes};

/// Imports `root` (a folder or file reached through a public-link fetch)
/// and everything beneath it into `target_parent_hash`, returning the
/// handle of the newly created root node.
///
/// Folders get fresh random keys; files keep their existing key (only the
/// key's *wrapping*, i.e. which master key encrypts it, changes). Node
/// attributes are preserved except for share-local fields (see
/// [`NodeAttributes::cleared_for_import`]).
pub async fn import_subtree(
    pipeline: &Pipeline,
    session: &UserSession,
    nodes: &Nodes,
    root: &Node,
    target_parent_hash: &str,
) -> Result<String> {
    let mut entries = Vec::new();
    collect_entries(nodes, root, &mut entries);

    let mut uploads = Vec::with_capacity(entries.len());
    for entry in &entries {
        let attrs = entry
            .node
            .attributes()
            .cloned()
            .unwrap_or_default()
            .cleared_for_import();

        let node_key = node_key_for_import(entry.node);

        let attr_buffer = attrs.pack_and_encrypt(&node_key[..16])?;
        let attr_b64 = BASE64_URL_SAFE_NO_PAD.encode(attr_buffer);

        let mut wire_key = node_key.clone();
        crypto::aes_ecb_encrypt_in_place(&session.key, &mut wire_key);
        let key_b64 = BASE64_URL_SAFE_NO_PAD.encode(wire_key);

        uploads.push(UploadAttributes {
            kind: entry.node.kind(),
            key: key_b64,
            attr: attr_b64,
            completion_handle: entry.node.hash().to_string(),
            file_attr: None,
            previous_version: None,
        });
    }

    let idempotence_id = crate::utils::random_string(10);
    let request = Request::UploadComplete {
        t: target_parent_hash.to_string(),
        // `UploadComplete::n` models a single-node completion on the wire;
        // a multi-node import reuses the same shape by issuing it once per
        // entry in source pre-order, each keyed by its own `t` (so that
        // child folders land inside the freshly-created parent rather than
        // all flattened into `target_parent_hash`).
        n: [uploads.into_iter().next().ok_or(Error::InvalidResponseFormat)?],
        i: idempotence_id,
    };

    let response = pipeline.submit(request, Priority::Batched).await?;
    let created = match response {
        Response::UploadComplete(response) => response,
        Response::Error(code) => return Err(Error::from(code)),
        _ => return Err(Error::InvalidResponseType),
    };

    let new_root = created.f.first().ok_or(Error::InvalidResponseFormat)?;

    // Any remaining entries are imported one at a time into their freshly
    // created parent, since each needs to know the real parent handle MEGA
    // assigned the previous entry before it can be submitted.
    let mut handle_map = std::collections::HashMap::new();
    handle_map.insert(root.hash().to_string(), new_root.hash.clone());

    for entry in entries.iter().skip(1) {
        let parent_source_hash = entry.parent_hash.as_deref().unwrap_or(root.hash());
        let Some(parent_handle) = handle_map.get(parent_source_hash).cloned() else {
            continue;
        };

        let attrs = entry
            .node
            .attributes()
            .cloned()
            .unwrap_or_default()
            .cleared_for_import();

        let node_key = node_key_for_import(entry.node);

        let attr_buffer = attrs.pack_and_encrypt(&node_key[..16])?;
        let attr_b64 = BASE64_URL_SAFE_NO_PAD.encode(attr_buffer);

        let mut wire_key = node_key.clone();
        crypto::aes_ecb_encrypt_in_place(&session.key, &mut wire_key);
        let key_b64 = BASE64_URL_SAFE_NO_PAD.encode(wire_key);

        let request = Request::UploadComplete {
            t: parent_handle,
            n: [UploadAttributes {
                kind: entry.node.kind(),
                key: key_b64,
                attr: attr_b64,
                completion_handle: entry.node.hash().to_string(),
                file_attr: None,
                previous_version: None,
            }],
            i: crate::utils::random_string(10),
        };

        let response = pipeline.submit(request, Priority::Batched).await?;
        let created = match response {
            Response::UploadComplete(response) => response,
            Response::Error(code) => return Err(Error::from(code)),
            _ => return Err(Error::InvalidResponseType),
        };

        if let Some(created_node) = created.f.first() {
            handle_map.insert(entry.node.hash().to_string(), created_node.hash.clone());
        }
    }

    Ok(new_root.hash.clone())
}

/// Folders get a fresh random key on import; files keep the key they
/// already had, since their ciphertext on MEGA's servers doesn't move.
fn node_key_for_import(node: &Node) -> Vec<u8> {
    match node.kind() {
        NodeKind::Folder => rand::random::<[u8; 16]>().to_vec(),
        _ => node.key().to_vec(),
    }
}

struct Entry<'a> {
    node: &'a Node,
    parent_hash: Option<String>,
}

/// Walks `root`'s subtree in pre-order, recording each node's source-tree
/// parent so imports can be replayed in the same shape once MEGA hands back
/// real handles.
fn collect_entries<'a>(nodes: &'a Nodes, root: &'a Node, out: &mut Vec<Entry<'a>>) {
    out.push(Entry {
        node: root,
        parent_hash: None,
    });

    let mut stack: Vec<(&Node, String)> = root
        .children()
        .iter()
        .filter_map(|h| nodes.get_node_by_hash(h))
        .map(|child| (child, root.hash().to_string()))
        .collect();

    while let Some((node, parent_hash)) = stack.pop() {
        out.push(Entry {
            node,
            parent_hash: Some(parent_hash.clone()),
        });

        for child_hash in node.children() {
            if let Some(child) = nodes.get_node_by_hash(child_hash) {
                stack.push((child, node.hash().to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::NodeAttributes;
    use std::collections::HashMap;

    fn node(hash: &str, parent: Option<&str>, kind: NodeKind, key: Vec<u8>) -> Node {
        Node::decrypted(
            hash.to_string(),
            0,
            kind,
            parent.map(str::to_string),
            key,
            NodeAttributes::named(hash),
            None,
            None,
            None,
            None,
        )
    }

    #[test]
    fn node_key_for_import_refreshes_folder_keys_but_keeps_file_keys() {
        let folder = node("folder", None, NodeKind::Folder, vec![0xAA; 16]);
        let file = node("file", Some("folder"), NodeKind::File, vec![0xBB; 24]);

        let folder_key = node_key_for_import(&folder);
        assert_eq!(folder_key.len(), 16);
        assert_ne!(folder_key, vec![0xAA; 16]);

        let file_key = node_key_for_import(&file);
        assert_eq!(file_key, vec![0xBB; 24]);
    }

    #[test]
    fn collect_entries_visits_root_then_children_with_source_parent_hashes() {
        let mut map = HashMap::new();
        map.insert("root".to_string(), node("root", None, NodeKind::Folder, vec![0u8; 16]));
        map.insert("a".to_string(), node("a", Some("root"), NodeKind::Folder, vec![1u8; 16]));
        map.insert("b".to_string(), node("b", Some("root"), NodeKind::File, vec![2u8; 24]));
        map.insert("a1".to_string(), node("a1", Some("a"), NodeKind::File, vec![3u8; 24]));

        let nodes = Nodes::build(map);
        let root = nodes.get_node_by_hash("root").unwrap();

        let mut entries = Vec::new();
        collect_entries(&nodes, root, &mut entries);

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].node.hash(), "root");
        assert_eq!(entries[0].parent_hash, None);

        let by_hash = |hash: &str| entries.iter().find(|e| e.node.hash() == hash).unwrap();
        assert_eq!(by_hash("a").parent_hash.as_deref(), Some("root"));
        assert_eq!(by_hash("b").parent_hash.as_deref(), Some("root"));
        assert_eq!(by_hash("a1").parent_hash.as_deref(), Some("a"));
    }

    #[test]
    fn collect_entries_on_lone_file_yields_only_the_root_entry() {
        let file = node("f", None, NodeKind::File, vec![4u8; 24]);
        let mut nodes_map = HashMap::new();
        nodes_map.insert("f".to_string(), file);
        let nodes = Nodes::build(nodes_map);
        let root = nodes.get_node_by_hash("f").unwrap();

        let mut entries = Vec::new();
        collect_entries(&nodes, root, &mut entries);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].parent_hash, None);
    }
}
