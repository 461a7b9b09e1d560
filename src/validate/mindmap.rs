//! Mind map structural validation.
//!
//! Two independent passes over the same tree: a recursive shape/duplicate
//! check, and a depth-first cycle check that carries a copy of the current
//! ancestor path. A label repeated along its own branch is a cycle; the
//! same label in two disjoint branches is a duplicate.

use std::collections::HashSet;

use crate::artifact::{MindMap, MindMapNode};

pub const REPAIR_INSTRUCTIONS: &str = "\
A valid mind map is a JSON object with a \"root\" node. Every node must \
have a non-empty \"label\" and a \"children\" array (empty for leaves). No \
two nodes may share a label (comparison ignores case), and no node's label \
may repeat anywhere along its own ancestor path.";

/// Check a mind map against the schema rules. Returns violations, empty = valid.
pub fn validate(map: &MindMap) -> Vec<String> {
    let mut violations = Vec::new();

    let mut labels = HashSet::new();
    check_node(&map.root, true, &mut labels, &mut violations);

    let mut flagged = HashSet::new();
    check_cycles(&map.root, &HashSet::new(), &mut flagged, &mut violations);

    violations
}

/// Shape and duplicate-label pass. `labels` is the global lower-cased set.
fn check_node(
    node: &MindMapNode,
    is_root: bool,
    labels: &mut HashSet<String>,
    violations: &mut Vec<String>,
) {
    let label = node.label.trim();
    if label.is_empty() {
        violations.push(if is_root {
            "Root node: missing label".to_string()
        } else {
            "Node: missing label".to_string()
        });
    } else if !labels.insert(label.to_lowercase()) {
        violations.push(format!("Duplicate label '{label}' appears in multiple nodes"));
    }

    for child in &node.children {
        check_node(child, false, labels, violations);
    }
}

/// Cycle pass. Each recursive call gets its own copy of the ancestor path;
/// `flagged` marks labels already reported so a subtree is flagged once.
fn check_cycles(
    node: &MindMapNode,
    ancestors: &HashSet<String>,
    flagged: &mut HashSet<String>,
    violations: &mut Vec<String>,
) {
    let label = node.label.trim().to_lowercase();

    if !label.is_empty() && ancestors.contains(&label) {
        if flagged.insert(label) {
            violations.push(format!(
                "Circular reference: '{}' repeats along its own branch",
                node.label.trim()
            ));
        }
        // A detected cycle caps this branch — everything below would
        // re-detect the same path.
        return;
    }

    let mut path = ancestors.clone();
    path.insert(label);
    for child in &node.children {
        check_cycles(child, &path, flagged, violations);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(label: &str, children: Vec<MindMapNode>) -> MindMapNode {
        MindMapNode {
            label: label.to_string(),
            children,
        }
    }

    fn leaf(label: &str) -> MindMapNode {
        node(label, vec![])
    }

    #[test]
    fn well_formed_tree_has_zero_violations() {
        let map = MindMap {
            root: node(
                "Biology",
                vec![
                    node("Cells", vec![leaf("Nucleus"), leaf("Mitochondria")]),
                    node("Genetics", vec![leaf("DNA"), leaf("RNA")]),
                ],
            ),
        };
        assert!(validate(&map).is_empty());
    }

    #[test]
    fn empty_root_label_is_flagged() {
        let map = MindMap {
            root: node("", vec![leaf("Orphan")]),
        };
        let violations = validate(&map);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("Root node: missing label"));
    }

    #[test]
    fn repeat_along_own_path_is_a_cycle_flagged_once() {
        // Cell -> Membrane -> Cell
        let map = MindMap {
            root: node("Cell", vec![node("Membrane", vec![leaf("Cell")])]),
        };
        let violations = validate(&map);

        let cycles: Vec<_> = violations
            .iter()
            .filter(|v| v.contains("Circular reference"))
            .collect();
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].contains("Cell"));

        // The repeated label is also a global duplicate — independent pass.
        assert!(violations.iter().any(|v| v.contains("Duplicate label")));
    }

    #[test]
    fn repeat_in_disjoint_branches_is_duplicate_not_cycle() {
        let map = MindMap {
            root: node(
                "Biology",
                vec![
                    node("Cells", vec![leaf("Energy")]),
                    node("Ecology", vec![leaf("Energy")]),
                ],
            ),
        };
        let violations = validate(&map);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("Duplicate label 'Energy'"));
        assert!(!violations.iter().any(|v| v.contains("Circular reference")));
    }

    #[test]
    fn descendants_are_validated_recursively() {
        let map = MindMap {
            root: node("Biology", vec![node("Cells", vec![leaf("")])]),
        };
        let violations = validate(&map);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("Node: missing label"));
    }

    #[test]
    fn duplicate_detection_ignores_case() {
        let map = MindMap {
            root: node("Biology", vec![leaf("enzymes"), leaf("Enzymes")]),
        };
        let violations = validate(&map);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("Duplicate label"));
    }
}
