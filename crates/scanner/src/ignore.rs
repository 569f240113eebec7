//! Layered `.gitignore` merging for the repository scanner.

use std::collections::HashSet;
use std::path::Path;

use walkdir::WalkDir;

use nbforge_shared::IgnoreData;

/// Entries always present regardless of any `.gitignore` content.
pub const DEFAULT_IGNORE_ENTRIES: [&str; 6] = [
    ".gitignore",
    "venv",
    "env",
    "virtual-env",
    "virutalenv",
    ".ipynb_checkpoints",
];

/// Merge every `.gitignore` found under `start_path` with the default entries.
///
/// With `root_level_only`, only a `.gitignore` directly inside `start_path`
/// is consulted. Each non-empty line is stripped of spaces and newlines and
/// unioned into the entry set. Missing `.gitignore` files are simply skipped;
/// there are no error conditions.
pub fn load_ignore(start_path: &Path, root_level_only: bool) -> IgnoreData {
    let mut entries: HashSet<String> = DEFAULT_IGNORE_ENTRIES
        .iter()
        .map(|entry| (*entry).to_string())
        .collect();

    let walker = if root_level_only {
        WalkDir::new(start_path).max_depth(1)
    } else {
        WalkDir::new(start_path)
    };

    for entry in walker.into_iter().filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() || entry.file_name() != ".gitignore" {
            continue;
        }

        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };

        for line in content.split('\n') {
            let trimmed = line.trim_matches(|c| c == ' ' || c == '\n');
            if !trimmed.is_empty() {
                entries.insert(trimmed.to_string());
            }
        }
    }

    IgnoreData { entries }
}
