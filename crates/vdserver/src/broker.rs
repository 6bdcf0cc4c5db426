//! The request broker.
//!
//! Every call returns immediately. Source updates and configuration are
//! applied synchronously; semantic queries are split into a `get_*` call that
//! starts background work in a [`QuerySlot`] and a `*_result` call that polls
//! it, answering `__pending__` until the latest request has finished.

use crate::format::{self, LocatedText, NO_MESSAGE};
use crate::module_store::ModuleStore;
use crate::slot::QuerySlot;
use crate::{BrokerConfig, BrokerError, BrokerResult};
use parking_lot::{Mutex, RwLock};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vdserver_engine::{
    index_import_paths, normalize_path, ActivityCounter, AnalysisEngine, CacheStats,
    CancellationToken, DEngine, Definition, EngineError, EngineResult, Environment,
    IdentifierType, ModuleSnapshot, ParseCache, Reference, Tooltip,
};
use vdserver_parser::ParsedModule;

/// Identifier classifications together with the flags they were asked with.
#[derive(Debug)]
struct Classified {
    types: Vec<IdentifierType>,
    flags: u32,
}

/// Bridges editor requests to an [`AnalysisEngine`].
pub struct Broker {
    engine: Arc<dyn AnalysisEngine>,
    store: Arc<ModuleStore>,
    shared: Arc<ParseCache>,
    activity: Arc<ActivityCounter>,
    pool: Arc<ThreadPool>,
    index_pool: ThreadPool,
    task_tokens: RwLock<Vec<String>>,
    imports: Mutex<Option<String>>,
    reindex: Mutex<Option<CancellationToken>>,
    tooltip: QuerySlot<Tooltip>,
    expansions: QuerySlot<Vec<String>>,
    definition: QuerySlot<Definition>,
    references: QuerySlot<Vec<Reference>>,
    identifier_types: QuerySlot<Classified>,
}

impl Broker {
    /// Create a broker on top of `engine`.
    pub fn new(engine: Arc<dyn AnalysisEngine>, config: &BrokerConfig) -> BrokerResult<Self> {
        let pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(config.worker_threads)
                .thread_name(|index| format!("vdserver-worker-{index}"))
                .build()?,
        );
        let index_pool = ThreadPoolBuilder::new()
            .num_threads(config.index_threads)
            .thread_name(|index| format!("vdserver-index-{index}"))
            .build()?;
        let shared = Arc::new(ParseCache::new(config.shared_cache_capacity));
        let activity = Arc::new(ActivityCounter::new());
        let store = Arc::new(ModuleStore::new(Arc::clone(&shared), Arc::clone(&activity)));
        info!(
            workers = pool.current_num_threads(),
            index_workers = index_pool.current_num_threads(),
            cache_capacity = shared.capacity(),
            "broker started"
        );

        Ok(Self {
            engine,
            store,
            shared,
            activity,
            tooltip: QuerySlot::new("tooltip", Arc::clone(&pool)),
            expansions: QuerySlot::new("expansions", Arc::clone(&pool)),
            definition: QuerySlot::new("definition", Arc::clone(&pool)),
            references: QuerySlot::new("references", Arc::clone(&pool)),
            identifier_types: QuerySlot::new("identifier_types", Arc::clone(&pool)),
            pool,
            index_pool,
            task_tokens: RwLock::new(config.comment_tasks.clone()),
            imports: Mutex::new(None),
            reindex: Mutex::new(None),
        })
    }

    /// Create a broker using the built-in D engine.
    pub fn with_d_engine(config: &BrokerConfig) -> BrokerResult<Self> {
        Self::new(Arc::new(DEngine::new()), config)
    }

    // ------------------------------------------------------------------
    // Configuration and source updates
    // ------------------------------------------------------------------

    /// Configure the project `filename` belongs to.
    ///
    /// List arguments are newline- or semicolon-separated. When the import
    /// paths differ from the previous call the shared cache is re-indexed in
    /// the background, cancelling any re-index still running.
    #[allow(clippy::too_many_arguments)]
    pub fn configure_project(
        &self,
        filename: &str,
        imports: &str,
        string_imports: &str,
        version_ids: &str,
        debug_ids: &str,
        cmdline: &str,
        flags: u32,
    ) {
        let env = Environment::from_lists(
            imports,
            string_imports,
            version_ids,
            debug_ids,
            cmdline,
            flags,
        );
        info!(
            file = filename,
            imports = env.import_paths.len(),
            versions = env.version_ids.len(),
            flags,
            "project configured"
        );
        self.engine.configure(&env);

        let mut previous = self.imports.lock();
        if previous.as_deref() != Some(imports) {
            *previous = Some(imports.to_string());
            self.activity.bump();
            self.start_reindex(env.import_dirs());
        }
    }

    /// Accepted for interface compatibility; there is nothing to clear.
    pub fn clear_project(&self) {
        debug!("clear project ignored");
    }

    /// Replace the text of `filename` and parse it. Never fails: parse
    /// problems are reported by [`parse_errors`](Self::parse_errors).
    pub fn update_module(&self, filename: &str, text: &str, flags: u32) {
        let tokens = self.task_tokens.read().clone();
        let module = self.store.update_source(filename, text, &tokens);
        debug!(path = %module.path, flags, "update module");
        self.engine.on_source_changed();
    }

    /// Set the comment task tokens, one per line, for later parses.
    pub fn configure_comment_tasks(&self, tokens: &str) {
        let tokens: Vec<String> = tokens
            .split('\n')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ToString::to_string)
            .collect();
        debug!(?tokens, "comment tasks configured");
        *self.task_tokens.write() = tokens;
    }

    fn start_reindex(&self, dirs: Vec<PathBuf>) {
        let token = CancellationToken::new();
        if let Some(previous) = self.reindex.lock().replace(token.clone()) {
            previous.cancel();
        }
        let cache = Arc::clone(&self.shared);
        let tokens = self.task_tokens.read().clone();
        info!(dirs = dirs.len(), "re-indexing import paths");
        // Query slots never queue behind indexing.
        self.index_pool.spawn(move || match index_import_paths(&dirs, &tokens, &cache, &token) {
            Ok(count) => info!(count, "import paths indexed"),
            Err(EngineError::Cancelled) => debug!("re-index cancelled"),
            Err(err) => warn!(error = %err, "re-index failed"),
        });
    }

    // ------------------------------------------------------------------
    // Synchronous queries
    // ------------------------------------------------------------------

    fn module(&self, filename: &str) -> BrokerResult<Arc<ParsedModule>> {
        self.store
            .lookup(filename)
            .ok_or_else(|| BrokerError::ModuleNotFound(normalize_path(filename)))
    }

    /// Parse errors of `filename`, one `line,col,line,col:message` per line.
    pub fn parse_errors(&self, filename: &str) -> BrokerResult<String> {
        Ok(format::parse_errors(&self.module(filename)?.errors))
    }

    /// Comment tasks of `filename`, one `line,col:message` per line.
    pub fn comment_tasks(&self, filename: &str) -> BrokerResult<String> {
        Ok(format::comment_tasks(&self.module(filename)?.tasks))
    }

    /// Positions of `is`, `!is`, `in` and `!in` operators as a flat
    /// `[line, col, ...]` list.
    pub fn binary_is_in_locations(&self, filename: &str) -> BrokerResult<Vec<u32>> {
        let module = self.module(filename)?;
        Ok(format::flat_locations(&module.binary_is_in_locations()))
    }

    /// Not implemented; fails after checking that the module exists.
    pub fn is_binary_operator(
        &self,
        filename: &str,
        _start_line: u32,
        _start_column: u32,
        _end_line: u32,
        _end_column: u32,
    ) -> BrokerResult<bool> {
        self.module(filename)?;
        Err(BrokerError::NotImplemented("isBinaryOperator"))
    }

    /// Not implemented.
    pub fn parameter_storage_locs(&self, _filename: &str) -> BrokerResult<Vec<u32>> {
        Err(BrokerError::NotImplemented("getParameterStorageLocs"))
    }

    /// Always empty.
    pub fn document_outline(&self, _filename: &str) -> String {
        String::new()
    }

    /// Always [`NO_MESSAGE`].
    pub fn last_message(&self) -> &'static str {
        NO_MESSAGE
    }

    // ------------------------------------------------------------------
    // Background queries
    // ------------------------------------------------------------------

    fn start<T, F>(&self, slot: &QuerySlot<T>, filename: &str, query: F)
    where
        T: Send + Sync + 'static,
        F: FnOnce(&dyn AnalysisEngine, &ModuleSnapshot, &CancellationToken) -> EngineResult<T>
            + Send
            + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let snapshot = self
            .store
            .snapshot(filename)
            .ok_or_else(|| EngineError::ModuleNotFound(normalize_path(filename)));
        slot.run(move |token| {
            let snapshot = snapshot?;
            token.check()?;
            query(engine.as_ref(), &snapshot, token)
        });
    }

    /// Start describing the symbol at the given range.
    pub fn get_tip(
        &self,
        filename: &str,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
        flags: u32,
    ) {
        let start = format::to_internal(start_line, start_column);
        let end = format::to_internal(end_line, end_column);
        self.start(&self.tooltip, filename, move |engine, snapshot, token| {
            engine.tooltip(snapshot, start, end, flags, token)
        });
    }

    /// Poll the latest tooltip request.
    pub fn tip_result(&self) -> LocatedText {
        match self.tooltip.poll().ready() {
            Ok(tip) => LocatedText::new(tip.start, tip.end, tip.text.as_str()),
            Err(sentinel) => LocatedText::sentinel(sentinel),
        }
    }

    /// Start collecting completions for `prefix` at the given position.
    pub fn get_semantic_expansions(&self, filename: &str, prefix: &str, line: u32, column: u32) {
        let location = format::to_internal(line, column);
        let prefix = prefix.to_string();
        self.start(&self.expansions, filename, move |engine, snapshot, token| {
            engine.expansions(snapshot, &prefix, location, token)
        });
    }

    /// Poll the latest expansions request; candidates are newline-separated.
    pub fn semantic_expansions_result(&self) -> String {
        match self.expansions.poll().ready() {
            Ok(names) => format::expansions(&names),
            Err(sentinel) => sentinel.to_string(),
        }
    }

    /// Start looking up the declaration of the symbol at the given range.
    pub fn get_definition(
        &self,
        filename: &str,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) {
        let start = format::to_internal(start_line, start_column);
        let end = format::to_internal(end_line, end_column);
        self.start(&self.definition, filename, move |engine, snapshot, token| {
            engine.definition(snapshot, start, end, token)
        });
    }

    /// Poll the latest definition request; the text is the target file.
    pub fn definition_result(&self) -> LocatedText {
        match self.definition.poll().ready() {
            Ok(found) => LocatedText::new(found.start, found.end, found.file.as_str()),
            Err(sentinel) => LocatedText::sentinel(sentinel),
        }
    }

    /// Start finding every use of the symbol at the given position.
    pub fn get_references(&self, filename: &str, line: u32, column: u32, module_only: bool) {
        let location = format::to_internal(line, column);
        self.start(&self.references, filename, move |engine, snapshot, token| {
            engine.references(snapshot, location, module_only, token)
        });
    }

    /// Poll the latest references request.
    pub fn references_result(&self) -> String {
        match self.references.poll().ready() {
            Ok(found) => format::references(&found),
            Err(sentinel) => sentinel.to_string(),
        }
    }

    /// Start classifying the identifiers on `start_line..=end_line`.
    ///
    /// `end_line` 0 means the end of the file. Flag bit `1` asks for the
    /// occurrences of each identifier as well.
    pub fn get_identifier_types(
        &self,
        filename: &str,
        start_line: u32,
        end_line: u32,
        flags: u32,
    ) {
        self.start(&self.identifier_types, filename, move |engine, snapshot, token| {
            let types = engine.identifier_types(snapshot, start_line, end_line, flags, token)?;
            Ok(Classified { types, flags })
        });
    }

    /// Poll the latest identifier-types request.
    pub fn identifier_types_result(&self) -> String {
        match self.identifier_types.poll().ready() {
            Ok(classified) => format::identifier_types(&classified.types, classified.flags),
            Err(sentinel) => sentinel.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Current value of the activity counter.
    pub fn activity(&self) -> u64 {
        self.activity.current()
    }

    /// Shared parse cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.shared.stats()
    }

    /// Cancel every running query and re-index.
    pub fn shutdown(&self) {
        self.tooltip.cancel();
        self.expansions.cancel();
        self.definition.cancel();
        self.references.cancel();
        self.identifier_types.cancel();
        if let Some(token) = self.reindex.lock().take() {
            token.cancel();
        }
        info!("broker shut down");
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("modules", &self.store.len())
            .field("activity", &self.activity.current())
            .field("cache", &self.shared.stats())
            .finish_non_exhaustive()
    }
}
