//! Notebook sidecar metadata extraction.
//!
//! Reads the first one or two cells of a notebook to derive a title and
//! description, and writes them as the `{name}.metadata.json` sidecar the
//! artifact merge later consumes. A notebook with no extractable title still
//! gets a sidecar (with a null title); downstream aggregation substitutes a
//! filename-derived fallback.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use nbforge_shared::{NbforgeError, NotebookContext, Result};

/// How many leading cells are consulted for title/description.
const LEADING_CELLS: usize = 2;

/// The sidecar payload: at least `title` and `description` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Extract metadata from the notebook in the build directory and write it to
/// the artifact metadata destination.
///
/// Fatal for this notebook when the file is unreadable, is not valid
/// notebook JSON, or has no cells at all.
pub fn extract_metadata(context: &NotebookContext) -> Result<NotebookMetadata> {
    let raw = std::fs::read_to_string(&context.path)
        .map_err(|e| NbforgeError::io(&context.path, e))?;

    let notebook: Value = serde_json::from_str(&raw).map_err(|e| {
        NbforgeError::metadata(format!(
            "invalid notebook JSON in {}: {e}",
            context.path.display()
        ))
    })?;

    let cells = notebook
        .get("cells")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            NbforgeError::metadata(format!("no cells array in {}", context.path.display()))
        })?;

    if cells.is_empty() {
        return Err(NbforgeError::metadata(format!(
            "notebook has no cells: {}",
            context.path.display()
        )));
    }

    let metadata = derive_from_cells(&cells[..cells.len().min(LEADING_CELLS)]);

    if let Some(parent) = context.metadata.path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| NbforgeError::io(parent, e))?;
    }

    let payload = serde_json::to_string_pretty(&metadata)
        .map_err(|e| NbforgeError::metadata(format!("serialize metadata: {e}")))?;
    std::fs::write(&context.metadata.path, payload)
        .map_err(|e| NbforgeError::io(&context.metadata.path, e))?;

    debug!(
        notebook = %context.notebook.name,
        sidecar = %context.metadata.path.display(),
        title = ?metadata.title,
        "wrote metadata sidecar"
    );

    Ok(metadata)
}

/// Title = first markdown H1; description = first following non-heading
/// paragraph line (the second cell is consulted when the first yields none).
fn derive_from_cells(cells: &[Value]) -> NotebookMetadata {
    let mut title = None;
    let mut description = None;

    for cell in cells {
        if cell.get("cell_type").and_then(Value::as_str) != Some("markdown") {
            continue;
        }

        for line in cell_source(cell).lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(heading) = line.strip_prefix("# ") {
                if title.is_none() {
                    title = Some(heading.trim().to_string());
                }
                continue;
            }

            if line.starts_with('#') {
                continue;
            }

            if description.is_none() {
                description = Some(line.to_string());
            }
        }

        if title.is_some() && description.is_some() {
            break;
        }
    }

    NotebookMetadata { title, description }
}

/// A cell's `source` is either a string or a list of line strings.
fn cell_source(cell: &Value) -> String {
    match cell.get("source") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(lines)) => lines
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

/// Clear `outputs` and `execution_count` of every code cell in place.
pub fn reset_notebook_execution(notebook: &mut Value) {
    let Some(cells) = notebook.get_mut("cells").and_then(Value::as_array_mut) else {
        return;
    };

    for cell in cells {
        if cell.get("cell_type").and_then(Value::as_str) == Some("code") {
            cell["outputs"] = Value::Array(vec![]);
            cell["execution_count"] = Value::Null;
        }
    }
}
