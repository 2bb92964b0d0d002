//! Text rendering of a project's file tree.

use std::collections::BTreeMap;

#[derive(Default)]
struct TreeNode {
    children: BTreeMap<String, TreeNode>,
}

/// Render `paths` (relative, `/`-separated) below a root label.
pub fn render_file_tree(root_name: &str, paths: &[String]) -> String {
    let mut root = TreeNode::default();
    for path in paths {
        let mut node = &mut root;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            node = node.children.entry(component.to_string()).or_default();
        }
    }

    let mut out = format!("{}/\n", root_name.trim_end_matches('/'));
    render_children(&root, "", &mut out);
    out
}

fn render_children(node: &TreeNode, prefix: &str, out: &mut String) {
    let count = node.children.len();
    for (index, (name, child)) in node.children.iter().enumerate() {
        let last = index + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        let suffix = if child.children.is_empty() { "" } else { "/" };
        out.push_str(&format!("{}{}{}{}\n", prefix, branch, name, suffix));

        let extension = if last { "    " } else { "│   " };
        render_children(child, &format!("{}{}", prefix, extension), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_nested_tree() {
        let paths = vec![
            "README.md".to_string(),
            "src/app.py".to_string(),
            "src/nested/util.py".to_string(),
            "setup.py".to_string(),
        ];
        let rendered = render_file_tree("project", &paths);
        assert_eq!(
            rendered,
            "project/\n\
             ├── README.md\n\
             ├── setup.py\n\
             └── src/\n\
             \u{20}   ├── app.py\n\
             \u{20}   └── nested/\n\
             \u{20}       └── util.py\n"
        );
    }

    #[test]
    fn test_empty_tree() {
        assert_eq!(render_file_tree("project/", &[]), "project/\n");
    }
}
