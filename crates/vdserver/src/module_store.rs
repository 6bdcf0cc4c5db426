//! Source text and parsed modules of the editing session.
//!
//! Parsed modules live in two places: the process-wide [`ParseCache`], which
//! also holds indexed library modules and may evict, and a session-local map
//! that always keeps the latest parse of every file the editor sent. Lookups
//! prefer whichever copy is newer.

use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use vdserver_engine::{normalize_path, ActivityCounter, ModuleSnapshot, ParseCache};
use vdserver_parser::ParsedModule;

/// Editor buffers and their parses, keyed by normalized path.
#[derive(Debug)]
pub struct ModuleStore {
    sources: RwLock<HashMap<String, Arc<str>>>,
    local: RwLock<HashMap<String, Arc<ParsedModule>>>,
    shared: Arc<ParseCache>,
    activity: Arc<ActivityCounter>,
}

impl ModuleStore {
    /// Create an empty store publishing into `shared`.
    pub fn new(shared: Arc<ParseCache>, activity: Arc<ActivityCounter>) -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            local: RwLock::new(HashMap::new()),
            shared,
            activity,
        }
    }

    /// Store new text for `path` and parse it.
    ///
    /// The parse is stamped with a fresh activity value and published to
    /// both caches. Queries already running keep the snapshot they took.
    pub fn update_source(
        &self,
        path: &str,
        text: &str,
        task_tokens: &[String],
    ) -> Arc<ParsedModule> {
        let key = normalize_path(path);
        let stamp = self.activity.bump();
        let module = ParsedModule::parse(key.clone(), text, task_tokens).with_stamp(stamp);
        let module = Arc::new(module);
        debug!(
            path = %key,
            stamp,
            errors = module.errors.len(),
            "module updated"
        );

        self.sources.write().insert(key.clone(), Arc::from(text));
        self.local.write().insert(key, Arc::clone(&module));
        self.shared.insert(Arc::clone(&module));
        module
    }

    /// The newest parse of a file the editor sent, if any.
    pub fn lookup(&self, path: &str) -> Option<Arc<ParsedModule>> {
        let key = normalize_path(path);
        self.lookup_key(&key)
    }

    fn lookup_key(&self, key: &str) -> Option<Arc<ParsedModule>> {
        if !self.sources.read().contains_key(key) {
            return None;
        }
        let local = self.local.read().get(key).cloned();
        match (self.shared.get(key), local) {
            (Some(shared), Some(local)) if local.stamp > shared.stamp => Some(local),
            (Some(shared), _) => Some(shared),
            (None, local) => local,
        }
    }

    /// The text last sent for `path`.
    pub fn source(&self, path: &str) -> Option<Arc<str>> {
        self.sources.read().get(&normalize_path(path)).cloned()
    }

    /// Everything a query on `path` needs: its module and source plus every
    /// other module known to the session or the shared cache.
    pub fn snapshot(&self, path: &str) -> Option<ModuleSnapshot> {
        let key = normalize_path(path);
        let primary = self.lookup_key(&key)?;
        let source = self.sources.read().get(&key).cloned()?;

        let local: Vec<Arc<ParsedModule>> = self.local.read().values().cloned().collect();
        let mut others: HashMap<String, Arc<ParsedModule>> = HashMap::new();
        for module in local.into_iter().chain(self.shared.modules()) {
            if module.path == key {
                continue;
            }
            match others.entry(module.path.clone()) {
                Entry::Occupied(mut entry) => {
                    if module.stamp > entry.get().stamp {
                        entry.insert(module);
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(module);
                }
            }
        }
        let mut others: Vec<Arc<ParsedModule>> = others.into_values().collect();
        others.sort_by(|a, b| a.path.cmp(&b.path));

        Some(ModuleSnapshot {
            primary,
            source,
            others,
        })
    }

    /// Number of files the editor has sent.
    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    /// Returns true if no file has been sent yet.
    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(capacity: usize) -> ModuleStore {
        ModuleStore::new(
            Arc::new(ParseCache::new(capacity)),
            Arc::new(ActivityCounter::new()),
        )
    }

    #[test]
    fn test_update_then_lookup() {
        let store = store(8);
        store.update_source(r"C:\Src\App.d", "module app; int x;", &[]);

        let module = store.lookup("c:/src/app.d").unwrap();
        assert_eq!(module.name, "app");
        assert_eq!(module.path, "c:/src/app.d");
        assert_eq!(module.stamp, 1);
        assert_eq!(store.source(r"c:\src\app.d").as_deref(), Some("module app; int x;"));
    }

    #[test]
    fn test_unknown_path_is_absent() {
        let store = store(8);
        assert!(store.lookup("missing.d").is_none());
        assert!(store.snapshot("missing.d").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_latest_update_wins() {
        let store = store(8);
        store.update_source("a.d", "int first;", &[]);
        store.update_source("a.d", "int second;", &[]);
        let module = store.lookup("a.d").unwrap();
        assert_eq!(module.stamp, 2);
        assert_eq!(store.source("a.d").as_deref(), Some("int second;"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_local_copy_survives_shared_eviction() {
        let store = store(1);
        store.update_source("a.d", "int a;", &[]);
        store.update_source("b.d", "int b;", &[]);

        assert!(store.shared.get("a.d").is_none());
        let module = store.lookup("a.d").unwrap();
        assert_eq!(module.path, "a.d");
        assert_eq!(module.stamp, 1);
    }

    #[test]
    fn test_lookup_ignores_indexed_only_modules() {
        let store = store(8);
        store
            .shared
            .insert(Arc::new(ParsedModule::parse("lib.d", "module lib;", &[])));
        assert!(store.lookup("lib.d").is_none());
    }

    #[test]
    fn test_newer_local_parse_beats_older_shared_entry() {
        let store = store(1);
        store.update_source("a.d", "int fresh;", &[]);
        store.update_source("b.d", "int b;", &[]);
        store
            .shared
            .insert(Arc::new(ParsedModule::parse("a.d", "int stale;", &[])));

        assert_eq!(store.lookup("a.d").unwrap().stamp, 1);
    }

    #[test]
    fn test_snapshot_merges_session_and_shared_modules() {
        let store = store(8);
        store
            .shared
            .insert(Arc::new(ParsedModule::parse("lib.d", "module lib;", &[])));
        store.update_source("b.d", "module b;", &[]);
        store.update_source("a.d", "module a; import b; import lib;", &[]);

        let snapshot = store.snapshot("a.d").unwrap();
        assert_eq!(snapshot.primary.name, "a");
        assert_eq!(&*snapshot.source, "module a; import b; import lib;");
        let others: Vec<&str> = snapshot.others.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(others, vec!["b.d", "lib.d"]);
    }

    #[test]
    fn test_task_tokens_apply_to_parse() {
        let store = store(8);
        let module = store.update_source("t.d", "// TODO: later\nint x;", &["TODO".to_string()]);
        assert_eq!(module.tasks.len(), 1);
        assert_eq!(module.tasks[0].message, "TODO: later");
    }
}
