//! In-memory virtual filesystem behind the [`FileSystem`] port.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum FsNode {
    File { content: String },
    Dir { children: BTreeMap<String, FsNode> },
}

impl FsNode {
    pub fn file(content: &str) -> Self {
        FsNode::File { content: content.to_string() }
    }

    pub fn dir<'a>(children: impl IntoIterator<Item = (&'a str, FsNode)>) -> Self {
        FsNode::Dir { children: children.into_iter().map(|(k, v)| (k.to_string(), v)).collect() }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FsNode::Dir { .. })
    }
}

pub trait FileSystem {
    fn get_node(&self, path: &str) -> Option<&FsNode>;
    /// Create or overwrite a file, creating missing parent directories.
    /// Returns false if a path component (or the target) is not a file slot.
    fn write_file(&mut self, path: &str, content: &str) -> bool;

    /// Absolute, normalized form of `path` relative to `cwd`.
    fn resolve_path(&self, cwd: &str, path: &str) -> String {
        resolve_path(cwd, path)
    }

    /// Sorted entry names, or `None` if `path` is not a directory.
    fn list_dir(&self, path: &str) -> Option<Vec<String>> {
        match self.get_node(path)? {
            FsNode::Dir { children } => Some(children.keys().cloned().collect()),
            FsNode::File { .. } => None,
        }
    }

    fn read_file(&self, path: &str) -> Option<String> {
        match self.get_node(path)? {
            FsNode::File { content } => Some(content.clone()),
            FsNode::Dir { .. } => None,
        }
    }

    fn is_directory(&self, path: &str) -> bool {
        self.get_node(path).is_some_and(FsNode::is_dir)
    }
}

pub fn resolve_path(cwd: &str, path: &str) -> String {
    if path.is_empty() || path == "~" { return "/".to_string(); }
    let joined: Vec<&str> = if path.starts_with('/') {
        path.split('/').collect()
    } else {
        cwd.split('/').chain(path.split('/')).collect()
    };
    let mut parts: Vec<&str> = Vec::new();
    for part in joined {
        match part {
            "" | "." => {}
            ".." => { parts.pop(); }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|p| !p.is_empty())
}

pub struct MemFs {
    root: FsNode,
}

impl MemFs {
    pub fn new(root: FsNode) -> Self {
        Self { root }
    }

    pub fn empty() -> Self {
        Self::new(FsNode::dir([]))
    }

    /// Small starter tree so a fresh shell has something to explore.
    pub fn with_default_tree() -> Self {
        Self::new(FsNode::dir([
            ("readme.txt", FsNode::file("Welcome to shellmux.\nType `help` to list commands.\n")),
            ("notes.txt", FsNode::file("Prefix is C-b. % splits left/right, \" splits top/bottom.\n")),
            ("projects", FsNode::dir([
                ("shellmux.txt", FsNode::file("A line-editing shell with tmux-style panes.\n")),
                ("todo.txt", FsNode::file("- try C-r\n- try tab completion\n")),
            ])),
            ("links", FsNode::dir([
                ("source.txt", FsNode::file("https://example.invalid/shellmux\n")),
            ])),
        ]))
    }
}

impl FileSystem for MemFs {
    fn get_node(&self, path: &str) -> Option<&FsNode> {
        let mut cur = &self.root;
        for part in components(path) {
            match cur {
                FsNode::Dir { children } => cur = children.get(part)?,
                FsNode::File { .. } => return None,
            }
        }
        Some(cur)
    }

    fn write_file(&mut self, path: &str, content: &str) -> bool {
        let mut parts: Vec<&str> = components(path).collect();
        let Some(name) = parts.pop() else { return false };
        let mut cur = &mut self.root;
        for part in parts {
            let FsNode::Dir { children } = cur else { return false };
            cur = children.entry(part.to_string()).or_insert_with(|| FsNode::dir([]));
        }
        let FsNode::Dir { children } = cur else { return false };
        if children.get(name).is_some_and(FsNode::is_dir) { return false; }
        children.insert(name.to_string(), FsNode::file(content));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        assert_eq!(resolve_path("/projects", ".."), "/");
        assert_eq!(resolve_path("/projects", "a/../b/./c"), "/projects/b/c");
        assert_eq!(resolve_path("/projects", "/links"), "/links");
        assert_eq!(resolve_path("/projects", "~"), "/");
        assert_eq!(resolve_path("/", "../../.."), "/");
        assert_eq!(resolve_path("/a", ""), "/");
    }

    #[test]
    fn test_list_and_read() {
        let fs = MemFs::with_default_tree();
        let names = fs.list_dir("/").unwrap();
        assert_eq!(names, vec!["links", "notes.txt", "projects", "readme.txt"]);
        assert!(fs.is_directory("/projects"));
        assert!(!fs.is_directory("/readme.txt"));
        assert!(fs.read_file("/projects").is_none());
        assert!(fs.list_dir("/readme.txt").is_none());
        assert!(fs.read_file("/projects/todo.txt").unwrap().contains("C-r"));
        assert!(fs.get_node("/readme.txt/x").is_none());
    }

    #[test]
    fn test_write_creates_parents() {
        let mut fs = MemFs::empty();
        assert!(fs.write_file("/a/b/c.txt", "hi"));
        assert!(fs.is_directory("/a/b"));
        assert_eq!(fs.read_file("/a/b/c.txt").as_deref(), Some("hi"));
        assert!(fs.write_file("/a/b/c.txt", "again"));
        assert_eq!(fs.read_file("/a/b/c.txt").as_deref(), Some("again"));
    }

    #[test]
    fn test_write_refuses_directory_and_file_parent() {
        let mut fs = MemFs::empty();
        assert!(fs.write_file("/d/f", "x"));
        assert!(!fs.write_file("/d", "x"));
        assert!(!fs.write_file("/d/f/g", "x"));
        assert!(!fs.write_file("/", "x"));
    }
}
