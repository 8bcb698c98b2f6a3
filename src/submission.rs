#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Submissions: ordered sequences of narrative and code cells.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

/// Kind of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// Executable script source.
    Code,
    /// Markdown, raw text, or anything else that is never executed.
    Narrative,
}

/// One element of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Whether this cell is executed.
    pub kind:   CellKind,
    /// Cell source.
    pub source: String,
}

impl Cell {
    /// A code cell.
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            kind:   CellKind::Code,
            source: source.into(),
        }
    }

    /// A narrative cell.
    pub fn narrative(source: impl Into<String>) -> Self {
        Self {
            kind:   CellKind::Narrative,
            source: source.into(),
        }
    }

    /// Returns true for code cells.
    pub fn is_code(&self) -> bool {
        self.kind == CellKind::Code
    }
}

/// A student submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    /// Cells in document order.
    pub cells: Vec<Cell>,
}

/// Notebook document shape, keeping only what grading needs.
#[derive(Deserialize)]
struct NotebookDocument {
    /// Cells in document order.
    cells: Vec<NotebookCell>,
}

/// Notebook cell shape.
#[derive(Deserialize)]
struct NotebookCell {
    /// `code`, `markdown` or `raw`.
    cell_type: String,
    /// Either one string or a list of lines.
    #[serde(deserialize_with = "joined_source")]
    source:    String,
}

/// Accepts notebook sources written either as one string or as a list of
/// lines.
fn joined_source<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    /// Both accepted shapes.
    enum Source {
        /// Whole source.
        Whole(String),
        /// Source split into lines that keep their newlines.
        Lines(Vec<String>),
    }

    Ok(match Source::deserialize(deserializer)? {
        Source::Whole(source) => source,
        Source::Lines(lines) => lines.concat(),
    })
}

impl Submission {
    /// Wraps cells.
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// A submission made of a single script.
    pub fn from_script(source: impl Into<String>) -> Self {
        Self::new(vec![Cell::code(source)])
    }

    /// Parses a notebook document.
    pub fn from_notebook_json(text: &str) -> Result<Self> {
        let document: NotebookDocument =
            serde_json::from_str(text).context("Could not parse notebook document")?;
        let cells = document
            .cells
            .into_iter()
            .map(|cell| {
                if cell.cell_type == "code" {
                    Cell::code(cell.source)
                } else {
                    Cell::narrative(cell.source)
                }
            })
            .collect();
        Ok(Self::new(cells))
    }

    /// Loads a submission from disk. `.rhai` files are single-cell scripts,
    /// anything else is read as a notebook document.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read submission {}", path.display()))?;
        if path.extension().is_some_and(|ext| ext == "rhai") {
            Ok(Self::from_script(text))
        } else {
            Self::from_notebook_json(&text)
                .with_context(|| format!("Invalid submission {}", path.display()))
        }
    }

    /// Code cells with their positions among all cells.
    pub fn code_cells(&self) -> impl Iterator<Item = (usize, &Cell)> {
        self.cells.iter().enumerate().filter(|(_, cell)| cell.is_code())
    }
}
