//! Project environment: import paths and conditional compilation settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vdserver_parser::ast::Condition;

/// `flags` bit: `unittest` blocks and version are enabled.
pub const FLAG_UNITTEST: u32 = 1;
/// `flags` bit: `debug` conditions are enabled.
pub const FLAG_DEBUG: u32 = 2;
/// `flags` bit: the target is 64-bit.
pub const FLAG_64BIT: u32 = 4;

/// Configuration of the project a file belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Environment {
    /// Directories searched for imported modules.
    pub import_paths: Vec<String>,
    /// Directories searched by `import("file")` expressions.
    pub string_import_paths: Vec<String>,
    /// User version identifiers.
    pub version_ids: Vec<String>,
    /// User debug identifiers.
    pub debug_ids: Vec<String>,
    /// Extra compiler command line.
    pub cmdline: String,
    /// Combination of the `FLAG_*` bits.
    pub flags: u32,
}

impl Environment {
    /// Build an environment from delimited lists as sent by the editor.
    pub fn from_lists(
        import_paths: &str,
        string_import_paths: &str,
        version_ids: &str,
        debug_ids: &str,
        cmdline: &str,
        flags: u32,
    ) -> Self {
        Self {
            import_paths: split_list(import_paths),
            string_import_paths: split_list(string_import_paths),
            version_ids: split_list(version_ids),
            debug_ids: split_list(debug_ids),
            cmdline: cmdline.to_string(),
            flags,
        }
    }

    /// Returns true if unittests are enabled.
    pub const fn unittest(&self) -> bool {
        self.flags & FLAG_UNITTEST != 0
    }

    /// Returns true if debug conditions are enabled.
    pub const fn debug(&self) -> bool {
        self.flags & FLAG_DEBUG != 0
    }

    /// Returns true for a 64-bit target.
    pub const fn is_64bit(&self) -> bool {
        self.flags & FLAG_64BIT != 0
    }

    /// Version identifiers that are always set for this configuration.
    pub fn predefined_versions(&self) -> Vec<&'static str> {
        let mut versions = vec!["all", "D_Version2"];
        versions.push(if self.is_64bit() { "X86_64" } else { "X86" });
        if self.unittest() {
            versions.push("unittest");
        }
        versions
    }

    /// Returns true if `version (id)` is active.
    pub fn is_version_active(&self, id: &str) -> bool {
        self.predefined_versions().contains(&id) || self.version_ids.iter().any(|v| v == id)
    }

    /// Returns true if `debug` or `debug (id)` is active.
    pub fn is_debug_active(&self, id: Option<&str>) -> bool {
        match id {
            None => self.debug(),
            Some(id) => self.debug_ids.iter().any(|d| d == id),
        }
    }

    /// Returns true if the `then` branch of `condition` is compiled.
    pub fn is_active(&self, condition: &Condition) -> bool {
        match condition {
            Condition::Version(id) => self.is_version_active(id),
            Condition::Debug(id) => self.is_debug_active(id.as_deref()),
        }
    }

    /// Import directories with duplicates removed.
    pub fn import_dirs(&self) -> Vec<PathBuf> {
        self.import_paths.iter().map(PathBuf::from).collect()
    }
}

/// Split a newline- or semicolon-separated list.
///
/// Entries are trimmed, empty entries dropped and duplicates removed while
/// keeping the first occurrence.
pub fn split_list(list: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in list.split(['\n', ';']).map(str::trim) {
        if !item.is_empty() && !items.iter().any(|seen| seen == item) {
            items.push(item.to_string());
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(" a \n\nb;c;a\r\n"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_predefined_versions() {
        let env = Environment::from_lists("", "", "Custom", "", "", FLAG_64BIT | FLAG_UNITTEST);
        assert!(env.is_version_active("X86_64"));
        assert!(!env.is_version_active("X86"));
        assert!(env.is_version_active("unittest"));
        assert!(env.is_version_active("Custom"));
        assert!(!env.is_version_active("Other"));
    }

    #[test]
    fn test_debug_conditions() {
        let env = Environment::from_lists("", "", "", "Trace", "", 0);
        assert!(!env.is_active(&Condition::Debug(None)));
        assert!(env.is_active(&Condition::Debug(Some("Trace".to_string()))));

        let env = Environment::from_lists("", "", "", "", "", FLAG_DEBUG);
        assert!(env.is_active(&Condition::Debug(None)));
    }

    #[test]
    fn test_import_dirs_are_unique() {
        let env = Environment::from_lists("/usr/include/d\n/usr/include/d;src", "", "", "", "", 0);
        assert_eq!(env.import_dirs().len(), 2);
    }
}
