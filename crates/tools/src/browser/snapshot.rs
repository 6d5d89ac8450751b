//! Accessibility-tree snapshots.
//!
//! `get_page_state` renders the page as a compact outline of interactive
//! elements, each tagged `[ref=eN]`. The refs are stored on the session so a
//! later `click_element` or `fill_input` can resolve them to backend node IDs.

use std::collections::HashMap;

use serde_json::Value;

use super::session::ElementRef;

/// Roles the model can act on. Anything else is rendered only when it carries
/// a name and helps orient the model (headings, links inside lists, etc).
const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "textbox",
    "searchbox",
    "combobox",
    "checkbox",
    "radio",
    "switch",
    "slider",
    "spinbutton",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "tab",
    "listbox",
];

/// Structural roles worth showing as context even without a ref.
const CONTEXT_ROLES: &[&str] = &["heading", "StaticText", "image"];

/// One node of the parsed accessibility tree.
#[derive(Debug, Clone)]
pub struct AxNode {
    pub role: String,
    pub name: String,
    pub backend_node_id: Option<i64>,
    pub ignored: bool,
    pub children: Vec<usize>,
}

/// Parse the `Accessibility.getFullAXTree` response into a flat arena plus
/// the index of the root node.
pub fn parse_ax_tree(result: &Value) -> (Vec<AxNode>, Option<usize>) {
    let raw_nodes = match result.get("nodes").and_then(|v| v.as_array()) {
        Some(nodes) => nodes,
        None => return (Vec::new(), None),
    };

    let mut arena = Vec::with_capacity(raw_nodes.len());
    let mut id_to_index: HashMap<String, usize> = HashMap::new();

    for raw in raw_nodes {
        let node_id = raw
            .get("nodeId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let role = raw
            .pointer("/role/value")
            .and_then(|v| v.as_str())
            .unwrap_or("generic")
            .to_string();
        let name = raw
            .pointer("/name/value")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let backend_node_id = raw.get("backendDOMNodeId").and_then(|v| v.as_i64());
        let ignored = raw.get("ignored").and_then(|v| v.as_bool()).unwrap_or(false);

        id_to_index.insert(node_id, arena.len());
        arena.push((
            AxNode {
                role,
                name,
                backend_node_id,
                ignored,
                children: Vec::new(),
            },
            raw.get("childIds")
                .and_then(|v| v.as_array())
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| id.as_str().map(String::from))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
        ));
    }

    // Resolve child id strings to arena indices
    let child_lists: Vec<Vec<usize>> = arena
        .iter()
        .map(|(_, child_ids)| {
            child_ids
                .iter()
                .filter_map(|id| id_to_index.get(id).copied())
                .collect()
        })
        .collect();

    let mut nodes: Vec<AxNode> = arena.into_iter().map(|(node, _)| node).collect();
    for (node, children) in nodes.iter_mut().zip(child_lists) {
        node.children = children;
    }

    let root = if nodes.is_empty() { None } else { Some(0) };
    (nodes, root)
}

/// Walk the tree, assign `eN` refs to interactive elements, and render the
/// outline the model sees. Returns the rendered text and the ref table.
pub fn render_snapshot(nodes: &[AxNode], root: Option<usize>) -> (String, HashMap<String, ElementRef>) {
    let mut out = String::new();
    let mut refs = HashMap::new();
    let mut counter = 0usize;

    if let Some(root) = root {
        render_node(nodes, root, 0, &mut out, &mut refs, &mut counter);
    }

    if out.is_empty() {
        out.push_str("(no interactive elements found)");
    }
    (out, refs)
}

fn render_node(
    nodes: &[AxNode],
    index: usize,
    depth: usize,
    out: &mut String,
    refs: &mut HashMap<String, ElementRef>,
    counter: &mut usize,
) {
    let node = &nodes[index];
    if node.ignored {
        for &child in &node.children {
            render_node(nodes, child, depth, out, refs, counter);
        }
        return;
    }

    let interactive = INTERACTIVE_ROLES.contains(&node.role.as_str());
    let contextual = CONTEXT_ROLES.contains(&node.role.as_str()) && !node.name.trim().is_empty();

    let child_depth = if interactive || contextual {
        let indent = "  ".repeat(depth);
        if interactive {
            *counter += 1;
            let ref_id = format!("e{}", counter);
            out.push_str(&format!(
                "{}- {} \"{}\" [ref={}]\n",
                indent,
                node.role,
                node.name.trim(),
                ref_id
            ));
            if let Some(backend_node_id) = node.backend_node_id {
                refs.insert(
                    ref_id,
                    ElementRef {
                        backend_node_id,
                        role: node.role.clone(),
                        name: node.name.trim().to_string(),
                    },
                );
            }
        } else {
            out.push_str(&format!("{}- {} \"{}\"\n", indent, node.role, node.name.trim()));
        }
        depth + 1
    } else {
        depth
    };

    for &child in &node.children {
        render_node(nodes, child, child_depth, out, refs, counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> Value {
        json!({
            "nodes": [
                {
                    "nodeId": "1",
                    "role": {"value": "RootWebArea"},
                    "name": {"value": "Example"},
                    "childIds": ["2", "3", "4"]
                },
                {
                    "nodeId": "2",
                    "role": {"value": "heading"},
                    "name": {"value": "Welcome"},
                    "backendDOMNodeId": 10
                },
                {
                    "nodeId": "3",
                    "role": {"value": "button"},
                    "name": {"value": "Sign in"},
                    "backendDOMNodeId": 11
                },
                {
                    "nodeId": "4",
                    "role": {"value": "textbox"},
                    "name": {"value": "Email"},
                    "backendDOMNodeId": 12
                }
            ]
        })
    }

    #[test]
    fn test_parse_ax_tree_builds_arena() {
        let (nodes, root) = parse_ax_tree(&sample_tree());
        assert_eq!(nodes.len(), 4);
        assert_eq!(root, Some(0));
        assert_eq!(nodes[0].children, vec![1, 2, 3]);
        assert_eq!(nodes[2].role, "button");
    }

    #[test]
    fn test_render_assigns_refs_to_interactive_only() {
        let (nodes, root) = parse_ax_tree(&sample_tree());
        let (text, refs) = render_snapshot(&nodes, root);

        assert!(text.contains("button \"Sign in\" [ref=e1]"));
        assert!(text.contains("textbox \"Email\" [ref=e2]"));
        assert!(text.contains("heading \"Welcome\""));
        assert!(!text.contains("Welcome\" [ref="));

        assert_eq!(refs.len(), 2);
        assert_eq!(refs["e1"].backend_node_id, 11);
        assert_eq!(refs["e2"].backend_node_id, 12);
    }

    #[test]
    fn test_ignored_nodes_are_skipped_but_children_kept() {
        let tree = json!({
            "nodes": [
                {
                    "nodeId": "1",
                    "role": {"value": "generic"},
                    "ignored": true,
                    "childIds": ["2"]
                },
                {
                    "nodeId": "2",
                    "role": {"value": "link"},
                    "name": {"value": "Docs"},
                    "backendDOMNodeId": 5
                }
            ]
        });
        let (nodes, root) = parse_ax_tree(&tree);
        let (text, refs) = render_snapshot(&nodes, root);
        assert!(text.contains("link \"Docs\" [ref=e1]"));
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn test_empty_tree_renders_placeholder() {
        let (nodes, root) = parse_ax_tree(&json!({}));
        let (text, refs) = render_snapshot(&nodes, root);
        assert!(text.contains("no interactive elements"));
        assert!(refs.is_empty());
    }
}
