//! Command history shared by every pane, persisted under a fixed storage key.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::Result;

pub const HISTORY_STORAGE_KEY: &str = "shell-history";
pub const DEFAULT_HISTORY_CAP: usize = 500;

pub type SharedHistory = Rc<RefCell<CommandHistory>>;

/// Minimal key/value persistence, the analogue of browser local storage.
pub trait KeyValueStore {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&mut self, key: &str, value: &str) -> Result<()>;
}

/// One `<key>.json` file per key inside `dir`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<data_dir>/shellmux`, falling back to the working directory.
    pub fn default_dir() -> PathBuf {
        dirs::data_dir().map(|d| d.join("shellmux")).unwrap_or_else(|| PathBuf::from("."))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Append-only list of submitted lines, newest last.
pub struct CommandHistory {
    entries: VecDeque<String>,
    cap: usize,
    store: Option<Box<dyn KeyValueStore>>,
}

impl CommandHistory {
    pub fn new(cap: usize) -> Self {
        Self { entries: VecDeque::new(), cap: cap.max(1), store: None }
    }

    /// Load persisted entries from `store` and keep saving to it on every push.
    /// An unreadable or corrupt value starts an empty history.
    pub fn with_store(cap: usize, store: Box<dyn KeyValueStore>) -> Self {
        let mut history = Self::new(cap);
        match store.load(HISTORY_STORAGE_KEY).and_then(|raw| match raw {
            Some(raw) => Ok(serde_json::from_str::<Vec<String>>(&raw)?),
            None => Ok(Vec::new()),
        }) {
            Ok(list) => {
                let skip = list.len().saturating_sub(history.cap);
                history.entries = list.into_iter().skip(skip).collect();
                debug!(entries = history.entries.len(), "loaded command history");
            }
            Err(e) => warn!("ignoring stored history: {e}"),
        }
        history.store = Some(store);
        history
    }

    pub fn shared(self) -> SharedHistory {
        Rc::new(RefCell::new(self))
    }

    /// Record a line. Repeating the newest entry is a no-op; past the cap the
    /// oldest entry is evicted.
    pub fn push(&mut self, line: &str) {
        if self.entries.back().map(String::as_str) == Some(line) { return; }
        self.entries.push_back(line.to_string());
        while self.entries.len() > self.cap { self.entries.pop_front(); }
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.entries.get(idx).map(String::as_str)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> + '_ {
        self.entries.iter().map(String::as_str)
    }

    /// The `nth` (0 = newest) entry containing `query`.
    pub fn search(&self, query: &str, nth: usize) -> Option<&str> {
        self.entries.iter().rev().filter(|e| e.contains(query)).nth(nth).map(String::as_str)
    }

    fn persist(&mut self) {
        let Some(store) = self.store.as_mut() else { return };
        let list: Vec<&String> = self.entries.iter().collect();
        let result = serde_json::to_string(&list)
            .map_err(crate::error::Error::from)
            .and_then(|json| store.save(HISTORY_STORAGE_KEY, &json));
        if let Err(e) = result {
            warn!("failed to save command history: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacent_duplicates_suppressed() {
        let mut h = CommandHistory::new(10);
        h.push("ls");
        h.push("ls");
        assert_eq!(h.len(), 1);
        h.push("pwd");
        h.push("ls");
        assert_eq!(h.iter().collect::<Vec<_>>(), vec!["ls", "pwd", "ls"]);
    }

    #[test]
    fn test_oldest_evicted_at_cap() {
        let mut h = CommandHistory::new(3);
        for line in ["a", "b", "c", "d"] { h.push(line); }
        assert_eq!(h.iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_search_newest_first() {
        let mut h = CommandHistory::new(10);
        for line in ["echo one", "ls", "echo two"] { h.push(line); }
        assert_eq!(h.search("echo", 0), Some("echo two"));
        assert_eq!(h.search("echo", 1), Some("echo one"));
        assert_eq!(h.search("echo", 2), None);
        assert_eq!(h.search("zzz", 0), None);
        assert_eq!(h.search("", 0), Some("echo two"));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut h = CommandHistory::with_store(10, Box::new(FileStore::new(dir.path())));
            h.push("ls");
            h.push("cd /");
        }
        let raw = fs::read_to_string(dir.path().join("shell-history.json")).unwrap();
        assert_eq!(raw, r#"["ls","cd /"]"#);
        let h = CommandHistory::with_store(10, Box::new(FileStore::new(dir.path())));
        assert_eq!(h.iter().collect::<Vec<_>>(), vec!["ls", "cd /"]);
    }

    #[test]
    fn test_load_truncates_to_cap() {
        let mut store = MemoryStore::default();
        store.save(HISTORY_STORAGE_KEY, r#"["a","b","c","d"]"#).unwrap();
        let h = CommandHistory::with_store(2, Box::new(store));
        assert_eq!(h.iter().collect::<Vec<_>>(), vec!["c", "d"]);
    }

    #[test]
    fn test_corrupt_store_starts_empty() {
        let mut store = MemoryStore::default();
        store.save(HISTORY_STORAGE_KEY, "{not json").unwrap();
        let mut h = CommandHistory::with_store(5, Box::new(store));
        assert!(h.is_empty());
        h.push("ok");
        assert_eq!(h.get(0), Some("ok"));
    }
}
