use std::collections::BTreeMap;

use crate::FileMap;

/// One entry of the display tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNode {
    Dir { name: String, children: Vec<FileNode> },
    File { name: String, path: String, bytes: usize },
}

impl FileNode {
    pub fn name(&self) -> &str {
        match self {
            FileNode::Dir { name, .. } | FileNode::File { name, .. } => name,
        }
    }
}

/// Nested view of a canonical file map: directories first, then files, each sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileTree {
    pub roots: Vec<FileNode>,
}

#[derive(Default)]
struct DirBuilder {
    dirs: BTreeMap<String, DirBuilder>,
    files: BTreeMap<String, (String, usize)>,
}

impl DirBuilder {
    fn insert(&mut self, path: &str, bytes: usize) {
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some(file_name) = segments.pop() else {
            return;
        };
        let mut dir = self;
        for segment in segments {
            dir = dir.dirs.entry(segment.to_string()).or_default();
        }
        dir.files.insert(file_name.to_string(), (path.to_string(), bytes));
    }

    fn into_nodes(self) -> Vec<FileNode> {
        let dirs = self.dirs.into_iter().map(|(name, dir)| FileNode::Dir {
            name,
            children: dir.into_nodes(),
        });
        let files = self
            .files
            .into_iter()
            .map(|(name, (path, bytes))| FileNode::File { name, path, bytes });
        dirs.chain(files).collect()
    }
}

impl FileTree {
    pub fn from_files(files: &FileMap) -> Self {
        let mut root = DirBuilder::default();
        for (path, content) in files {
            root.insert(path, content.len());
        }
        Self {
            roots: root.into_nodes(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Indented text rendering, two spaces per level; directories end with `/`.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        push_lines(&self.roots, 0, &mut out);
        out
    }
}

fn push_lines(nodes: &[FileNode], depth: usize, out: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    for node in nodes {
        match node {
            FileNode::Dir { name, children } => {
                out.push(format!("{indent}{name}/"));
                push_lines(children, depth + 1, out);
            }
            FileNode::File { name, bytes, .. } => out.push(format!("{indent}{name} ({bytes} B)")),
        }
    }
}
