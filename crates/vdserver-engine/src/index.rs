//! Import path indexing.
//!
//! Walks the configured import directories and parses every D source file
//! into the shared cache, so cross-module resolution sees library modules
//! the editor never opened.

use crate::paths::{is_d_source, normalize_path};
use crate::{CancellationToken, EngineError, EngineResult, ParseCache};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use vdserver_parser::ParsedModule;
use walkdir::WalkDir;

/// Parse every `.d`/`.di` file below `dirs` into `cache`.
///
/// Indexed modules carry stamp 0, so they never replace a module the
/// editor has updated. Unreadable files are logged and skipped. Returns the
/// number of modules added or refreshed.
///
/// Parsing runs on the current rayon pool.
pub fn index_import_paths(
    dirs: &[PathBuf],
    task_tokens: &[String],
    cache: &ParseCache,
    token: &CancellationToken,
) -> EngineResult<usize> {
    let start = Instant::now();
    let mut files = Vec::new();
    for dir in dirs {
        token.check()?;
        for entry in WalkDir::new(dir).follow_links(true) {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_d_source(entry.path()) => {
                    files.push(entry.into_path());
                }
                Ok(_) => {}
                Err(err) => warn!(dir = %dir.display(), error = %err, "failed to walk import path"),
            }
        }
    }
    info!(files = files.len(), "indexing import paths");

    let indexed = files
        .par_iter()
        .try_fold(
            || 0usize,
            |count, path| {
                token.check()?;
                match read_source(path) {
                    Ok(text) => {
                        let key = normalize_path(&path.to_string_lossy());
                        let module = ParsedModule::parse(key, &text, task_tokens);
                        Ok(count + usize::from(cache.insert(Arc::new(module))))
                    }
                    Err(err) => {
                        warn!(error = %err, "skipping unreadable module");
                        Ok(count)
                    }
                }
            },
        )
        .try_reduce(|| 0, |a, b| Ok(a + b))?;

    debug!(indexed, elapsed = ?start.elapsed(), "import path indexing finished");
    Ok(indexed)
}

fn read_source(path: &Path) -> EngineResult<String> {
    std::fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_indexes_nested_sources() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("std")).unwrap();
        fs::write(dir.path().join("std/stdio.d"), "module std.stdio;\nvoid writeln() {}").unwrap();
        fs::write(dir.path().join("std/conv.di"), "module std.conv;").unwrap();
        fs::write(dir.path().join("README.md"), "not d").unwrap();

        let cache = ParseCache::new(16);
        let count = index_import_paths(
            &[dir.path().to_path_buf()],
            &[],
            &cache,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(count, 2);
        let names: Vec<String> = cache.modules().iter().map(|m| m.name.clone()).collect();
        assert!(names.contains(&"std.stdio".to_string()));
        assert!(names.contains(&"std.conv".to_string()));
        assert!(cache.modules().iter().all(|m| m.stamp == 0));
    }

    #[test]
    fn test_does_not_replace_editor_modules() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.d");
        fs::write(&file, "module app; int disk;").unwrap();
        let key = normalize_path(&file.to_string_lossy());

        let cache = ParseCache::new(16);
        let edited = ParsedModule::parse(key.clone(), "module app; int buffer;", &[]).with_stamp(3);
        cache.insert(Arc::new(edited));

        let count = index_import_paths(
            &[dir.path().to_path_buf()],
            &[],
            &cache,
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(count, 0);
        assert_eq!(cache.get(&key).unwrap().stamp, 3);
    }

    #[test]
    fn test_deeply_nested_library_is_indexed_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let braces = 100_000;
        let body = format!("{}{}", "{".repeat(braces), "}".repeat(braces));
        let source = format!("module deep;\nvoid f() {{ {body} }}");
        fs::write(dir.path().join("deep.d"), source).unwrap();

        let cache = ParseCache::new(4);
        let dirs = [dir.path().to_path_buf()];
        let count = index_import_paths(&dirs, &[], &cache, &CancellationToken::new()).unwrap();
        assert_eq!(count, 1);
        let modules = cache.modules();
        assert_eq!(modules[0].name, "deep");
        assert_eq!(modules[0].errors.len(), 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let dirs = [dir.path().to_path_buf()];
        let result = index_import_paths(&dirs, &[], &ParseCache::new(4), &token);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[test]
    fn test_missing_directory_is_skipped() {
        let count = index_import_paths(
            &[PathBuf::from("/definitely/not/here")],
            &[],
            &ParseCache::new(4),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(count, 0);
    }
}
