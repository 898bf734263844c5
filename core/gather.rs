use crate::content::{FileCandidate, SkipReason};
use crate::error::{AppError, Result};
use crate::rules::{IgnoreResolver, IncludeFilter};
use log;
use std::cmp::Ordering;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A file that survived ignore rules and the include filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    /// In traversal order.
    pub files: Vec<WalkedFile>,
    /// Entries rejected before classification (symlinks, walk errors).
    pub skipped: Vec<FileCandidate>,
    pub ignored: usize,
    pub not_included: usize,
}

/// Files of a directory before its subdirectories, each group by name.
fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

/// Forward-slash relative path, or `None` when `path` is not under `root`.
pub fn relative_slash_path(path: &Path, root: &Path) -> Option<String> {
    let relative = pathdiff::diff_paths(path, root)?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

pub fn walk_repository(
    root: &Path,
    resolver: &mut IgnoreResolver,
    include: &IncludeFilter,
) -> Result<WalkOutcome> {
    log::info!("Walking repository: {}", root.display());
    let mut outcome = WalkOutcome::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by(files_first)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !resolver.is_ignored(entry.path(), entry.file_type().is_dir())
        });

    for entry_result in walker {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                log::warn!("{}", AppError::from(e));
                let relative = relative_slash_path(&path, root)
                    .unwrap_or_else(|| path.display().to_string());
                outcome
                    .skipped
                    .push(FileCandidate::skipped(relative, path, SkipReason::Unreadable));
                continue;
            }
        };
        if entry.depth() == 0 || entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let Some(relative_path) = relative_slash_path(path, root) else {
            log::warn!("Could not get relative path for: {}", path.display());
            continue;
        };

        if !include.matches(&relative_path) {
            log::trace!("Not matched by include patterns: {}", relative_path);
            outcome.not_included += 1;
            continue;
        }

        if entry.path_is_symlink() && !symlink_stays_inside(path, root) {
            log::warn!("Skipping {}: symlink not followed", relative_path);
            outcome.skipped.push(FileCandidate::skipped(
                relative_path,
                path.to_path_buf(),
                SkipReason::Symlink,
            ));
            continue;
        }

        log::trace!("Walked file: {}", relative_path);
        outcome.files.push(WalkedFile {
            relative_path,
            absolute_path: path.to_path_buf(),
        });
    }

    outcome.ignored = resolver.ignored_count();
    log::info!(
        "Directory walk complete. {} candidate file(s), {} ignored.",
        outcome.files.len(),
        outcome.ignored
    );
    Ok(outcome)
}

/// Only links to regular files whose target resolves inside the repository qualify.
fn symlink_stays_inside(link: &Path, root: &Path) -> bool {
    match fs::canonicalize(link) {
        Ok(target) => target.starts_with(root) && target.is_file(),
        Err(e) => {
            log::debug!("Cannot resolve symlink {}: {}", link.display(), e);
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeKind {
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub kind: NodeKind,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn sort_key(&self) -> (NodeKind, String, &str) {
        sibling_key(self.kind, &self.name)
    }
}

/// Directories first, then case-insensitive name; byte order breaks ties.
fn sibling_key(kind: NodeKind, name: &str) -> (NodeKind, String, &str) {
    (kind, name.to_lowercase(), name)
}

/// Builds the directory hierarchy of the given files. Directories appear only as
/// ancestors of a file, so empty ones never show up.
pub fn build_tree_from_paths(relative_paths: &[String]) -> Vec<TreeNode> {
    log::debug!("Building tree structure from {} paths...", relative_paths.len());
    let mut root_nodes: Vec<TreeNode> = Vec::new();
    for path in relative_paths {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if !components.is_empty() {
            insert_node(&mut root_nodes, &components);
        }
    }
    root_nodes
}

fn insert_node(current_level_nodes: &mut Vec<TreeNode>, components: &[&str]) {
    let Some((component_name, remaining)) = components.split_first() else {
        return;
    };
    let kind = if remaining.is_empty() {
        NodeKind::File
    } else {
        NodeKind::Directory
    };

    let key = sibling_key(kind, component_name);
    let index = match current_level_nodes.binary_search_by(|node| node.sort_key().cmp(&key)) {
        Ok(index) => index,
        Err(insertion_point) => {
            current_level_nodes.insert(
                insertion_point,
                TreeNode {
                    name: component_name.to_string(),
                    kind,
                    children: Vec::new(),
                },
            );
            insertion_point
        }
    };

    if !remaining.is_empty() {
        insert_node(&mut current_level_nodes[index].children, remaining);
    }
}

/// Text rendering, one line per node, rooted at `root_name/`.
pub fn render_tree(root_name: &str, relative_paths: &[String]) -> String {
    let nodes = build_tree_from_paths(relative_paths);
    let mut out = format!("{}/\n", root_name);
    render_level(&nodes, "", &mut out);
    out
}

fn render_level(nodes: &[TreeNode], prefix: &str, out: &mut String) {
    for (i, node) in nodes.iter().enumerate() {
        let last = i + 1 == nodes.len();
        out.push_str(prefix);
        out.push_str(if last { "└── " } else { "├── " });
        out.push_str(&node.name);
        if node.kind == NodeKind::Directory {
            out.push('/');
        }
        out.push('\n');
        if !node.children.is_empty() {
            let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
            render_level(&node.children, &child_prefix, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RunConfiguration, RunFlags};
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("a.py"), "a").unwrap();
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join("sub/keep.py"), "k").unwrap();
        fs::write(root.join("sub/deeper/z.py"), "z").unwrap();
        fs::create_dir(root.join("empty")).unwrap();
        fs::create_dir(root.join(".git")).unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        (temp, root)
    }

    fn walk(root: &Path, config: &Config) -> WalkOutcome {
        let mut config = config.clone();
        config.output.path = Some(PathBuf::from("out.txt"));
        let run = RunConfiguration::resolve(root, &config, RunFlags::default()).unwrap();
        let mut resolver = IgnoreResolver::new(&run).unwrap();
        let include = IncludeFilter::new(&run.include_patterns).unwrap();
        walk_repository(root, &mut resolver, &include).unwrap()
    }

    fn paths(outcome: &WalkOutcome) -> Vec<&str> {
        outcome.files.iter().map(|f| f.relative_path.as_str()).collect()
    }

    #[test]
    fn test_walk_orders_files_before_subdirectories() {
        let (_temp, root) = fixture();
        let outcome = walk(&root, &Config::default());
        assert_eq!(
            paths(&outcome),
            vec!["a.py", "b.txt", "sub/keep.py", "sub/deeper/z.py"]
        );
    }

    #[test]
    fn test_walk_applies_include_filter_to_files() {
        let (_temp, root) = fixture();
        let mut config = Config::default();
        config.filters.include = vec!["*.py".to_string()];
        let outcome = walk(&root, &config);
        assert_eq!(paths(&outcome), vec!["a.py", "sub/keep.py", "sub/deeper/z.py"]);
        assert_eq!(outcome.not_included, 1);
    }

    #[test]
    fn test_walk_prunes_ignored_directories() {
        let (_temp, root) = fixture();
        fs::write(root.join(".gitignore"), "sub/\n").unwrap();
        let outcome = walk(&root, &Config::default());
        assert_eq!(paths(&outcome), vec!["a.py", "b.txt"]);
        assert_eq!(outcome.ignored, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_skips_symlinks_leaving_the_repository() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "s").unwrap();
        let (_temp, root) = fixture();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), root.join("link.txt"))
            .unwrap();
        std::os::unix::fs::symlink(root.join("a.py"), root.join("alias.py")).unwrap();

        let outcome = walk(&root, &Config::default());
        assert!(paths(&outcome).contains(&"alias.py"));
        assert!(!paths(&outcome).contains(&"link.txt"));
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].skip_reason(), Some(SkipReason::Symlink));
    }

    #[test]
    fn test_render_tree_directories_first_and_no_empty_dirs() {
        let included = vec![
            "a.py".to_string(),
            "sub/keep.py".to_string(),
            "sub/deeper/z.py".to_string(),
            "zeta.md".to_string(),
        ];
        let rendered = render_tree("repo", &included);
        assert_eq!(
            rendered,
            "repo/\n\
             ├── sub/\n\
             │   ├── deeper/\n\
             │   │   └── z.py\n\
             │   └── keep.py\n\
             ├── a.py\n\
             └── zeta.md\n"
        );
        assert!(!rendered.contains("empty"));
    }

    #[test]
    fn test_render_tree_sorts_siblings_case_insensitively() {
        let included = vec![
            "README.md".to_string(),
            "a.py".to_string(),
            "Docs/guide.md".to_string(),
            "build/out.txt".to_string(),
            "Makefile".to_string(),
        ];
        assert_eq!(
            render_tree("repo", &included),
            "repo/\n\
             ├── build/\n\
             │   └── out.txt\n\
             ├── Docs/\n\
             │   └── guide.md\n\
             ├── a.py\n\
             ├── Makefile\n\
             └── README.md\n"
        );
    }

    #[test]
    fn test_render_tree_of_nothing_is_the_root_line() {
        assert_eq!(render_tree("repo", &[]), "repo/\n");
    }

    #[test]
    fn test_relative_slash_path() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_slash_path(Path::new("/repo/sub/a.rs"), root),
            Some("sub/a.rs".to_string())
        );
        assert_eq!(relative_slash_path(root, root), None);
    }
}
