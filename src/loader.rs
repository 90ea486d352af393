//! This module provides the `DefinitionLoader` struct, responsible for loading machine
//! definitions from files, strings and whole directories.

use crate::parser::parse;
use crate::types::{AutomatonError, Definition, Kind};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `DefinitionLoader` is a utility struct for loading machine definitions.
/// Errors from files carry the file's path instead of the `<input>` placeholder.
pub struct DefinitionLoader;

impl DefinitionLoader {
    /// Loads a single definition of the given kind from `path`.
    ///
    /// # Returns
    ///
    /// * `Ok(Definition)` if the file is read and parsed successfully.
    /// * `Err(AutomatonError::FileError)` if the file cannot be read.
    /// * `Err(AutomatonError::MalformedDefinition)` naming `path` and the offending line.
    pub fn load(path: &Path, kind: Kind) -> Result<Definition, AutomatonError> {
        let content = fs::read_to_string(path).map_err(|e| {
            AutomatonError::FileError(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), %kind, "loading definition");
        parse(&content, kind).map_err(|e| e.in_file(&path.display().to_string()))
    }

    /// Loads a definition from text that is not stored in a file, e.g. user input.
    pub fn load_from_string(content: &str, kind: Kind) -> Result<Definition, AutomatonError> {
        parse(content, kind)
    }

    /// Loads every definition in `directory` whose extension names a machine kind
    /// (`.dfa`, `.nfa`, `.pda`, `.tm`). Directories and other files are skipped.
    ///
    /// # Returns
    ///
    /// One `Result` per candidate file, pairing each loaded definition with its path.
    pub fn load_directory(directory: &Path) -> Vec<Result<(PathBuf, Definition), AutomatonError>> {
        if !directory.exists() {
            return vec![Err(AutomatonError::FileError(format!(
                "Directory {} does not exist",
                directory.display()
            )))];
        }

        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) => {
                return vec![Err(AutomatonError::FileError(format!(
                    "Failed to read directory {}: {}",
                    directory.display(),
                    e
                )))]
            }
        };

        let mut results: Vec<_> = entries
            .filter_map(|entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        return Some(Err(AutomatonError::FileError(format!(
                            "Failed to read directory entry: {}",
                            e
                        ))))
                    }
                };

                let path = entry.path();
                if path.is_dir() {
                    return None;
                }
                let kind = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(Kind::from_extension)?;

                Some(Self::load(&path, kind).map(|definition| (path, definition)))
            })
            .collect();

        // read_dir order is platform dependent
        results.sort_by_key(|result| match result {
            Ok((path, _)) => Some(path.clone()),
            Err(_) => None,
        });
        results
    }
}
