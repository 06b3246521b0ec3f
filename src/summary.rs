//! Step summary buffer
//!
//! Renderers append to a [`Summary`] and the step writes it out once at the
//! end. The markup matches what the CI summary UI expects: markdown mixed
//! with a small set of HTML elements.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// One table cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub data: String,
    pub header: bool,
}

impl Cell {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            header: false,
        }
    }

    pub fn header(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            header: true,
        }
    }
}

impl From<&str> for Cell {
    fn from(data: &str) -> Self {
        Cell::new(data)
    }
}

impl From<String> for Cell {
    fn from(data: String) -> Self {
        Cell::new(data)
    }
}

pub type Row = Vec<Cell>;

/// Append-only summary buffer
#[derive(Debug, Default, Clone)]
pub struct Summary {
    buffer: String,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_raw(&mut self, text: &str) -> &mut Self {
        self.buffer.push_str(text);
        self
    }

    pub fn add_eol(&mut self) -> &mut Self {
        self.buffer.push('\n');
        self
    }

    pub fn add_break(&mut self) -> &mut Self {
        self.add_raw(&wrap("br", None, &[])).add_eol()
    }

    pub fn add_image(&mut self, src: &str, alt: &str, width: &str, height: &str) -> &mut Self {
        let element = wrap(
            "img",
            None,
            &[("src", src), ("alt", alt), ("width", width), ("height", height)],
        );
        self.add_raw(&element).add_eol()
    }

    pub fn add_link(&mut self, text: &str, href: &str) -> &mut Self {
        self.add_raw(&wrap("a", Some(text), &[("href", href)])).add_eol()
    }

    pub fn add_details(&mut self, label: &str, content: &str) -> &mut Self {
        let summary = wrap("summary", Some(label), &[]);
        let element = wrap("details", Some(&format!("{}{}", summary, content)), &[]);
        self.add_raw(&element).add_eol()
    }

    pub fn add_table(&mut self, rows: &[Row]) -> &mut Self {
        self.add_raw(&table_markup(rows)).add_eol()
    }

    /// Current buffer contents
    pub fn stringify(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) -> &mut Self {
        self.buffer.clear();
        self
    }

    /// Append the buffer to `path` and clear it
    pub fn write(&mut self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(self.buffer.as_bytes())?;
        self.clear();
        Ok(())
    }
}

/// Table element for `rows`, for nesting inside other elements
pub fn table_markup(rows: &[Row]) -> String {
    let body: String = rows
        .iter()
        .map(|row| {
            let cells: String = row
                .iter()
                .map(|cell| {
                    let tag = if cell.header { "th" } else { "td" };
                    wrap(tag, Some(&cell.data), &[])
                })
                .collect();
            wrap("tr", Some(&cells), &[])
        })
        .collect();
    wrap("table", Some(&body), &[])
}

/// An element without content renders as a bare opening tag.
fn wrap(tag: &str, content: Option<&str>, attrs: &[(&str, &str)]) -> String {
    let attrs: String = attrs
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!(" {}=\"{}\"", key, value))
        .collect();
    match content {
        Some(content) if !content.is_empty() => format!("<{tag}{attrs}>{content}</{tag}>"),
        _ => format!("<{tag}{attrs}>"),
    }
}
