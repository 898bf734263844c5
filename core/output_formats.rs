/// Placeholder replaced by the file's relative path in either delimiter.
pub const PATH_PLACEHOLDER: &str = "{path}";
pub const TREE_HEADER: &str = "--- REPOSITORY STRUCTURE ---";
pub const TREE_FOOTER: &str = "--- END REPOSITORY STRUCTURE ---";

/// Start and end line templates framing each file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    start: String,
    end: String,
}

impl Delimiters {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    pub fn start_for(&self, relative_path: &str) -> String {
        self.start.replace(PATH_PLACEHOLDER, relative_path)
    }

    pub fn end_for(&self, relative_path: &str) -> String {
        self.end.replace(PATH_PLACEHOLDER, relative_path)
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_START_DELIMITER,
            crate::config::DEFAULT_END_DELIMITER,
        )
    }
}

/// Frames a rendered tree; the first file block follows directly.
pub fn tree_block(rendered_tree: &str) -> String {
    let mut block =
        String::with_capacity(rendered_tree.len() + TREE_HEADER.len() + TREE_FOOTER.len() + 3);
    block.push_str(TREE_HEADER);
    block.push('\n');
    block.push_str(rendered_tree);
    if !rendered_tree.is_empty() && !rendered_tree.ends_with('\n') {
        block.push('\n');
    }
    block.push_str(TREE_FOOTER);
    block.push('\n');
    block
}
