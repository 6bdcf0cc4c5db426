//! File path normalization.

use std::path::Path;

/// Normalize a path for use as a cache key.
///
/// Backslashes become forward slashes, repeated separators collapse,
/// trailing separators are dropped and the result is lower-cased, so the
/// same file named differently by the editor and the indexer maps to one
/// key.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    let mut last_was_separator = false;
    for ch in path.chars() {
        if ch == '/' || ch == '\\' {
            if !last_was_separator {
                normalized.push('/');
            }
            last_was_separator = true;
        } else {
            normalized.extend(ch.to_lowercase());
            last_was_separator = false;
        }
    }
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Returns true for D source and interface files.
pub fn is_d_source(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("d") || ext.eq_ignore_ascii_case("di"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(r"C:\Src\\App\Main.d"), "c:/src/app/main.d");
        assert_eq!(normalize_path("/usr/include//d/"), "/usr/include/d");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn test_is_d_source() {
        assert!(is_d_source(Path::new("a/b.d")));
        assert!(is_d_source(Path::new("a/b.DI")));
        assert!(!is_d_source(Path::new("a/b.c")));
        assert!(!is_d_source(Path::new("a/d")));
    }
}
