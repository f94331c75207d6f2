//! CSV table loading and saving
//!
//! The input must have a header row containing a `url` column (any case).
//! Every other column is carried through untouched and the `results` column
//! is appended on write.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub const URL_COLUMN: &str = "url";
pub const RESULTS_COLUMN: &str = "results";

#[derive(Error, Debug)]
pub enum TableError {
    #[error("'{}' not found.", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed CSV in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("CSV file {} has no 'url' column", .0.display())]
    MissingUrlColumn(PathBuf),
}

/// One input row plus the value extracted for it
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    fields: Vec<String>,
    pub result: Option<String>,
}

impl Row {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields, result: None }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

/// Headers and rows in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    url_index: usize,
    results_index: Option<usize>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Build a table from headers and raw rows.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Option<Self> {
        let url_index = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(URL_COLUMN))?;
        let results_index = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(RESULTS_COLUMN));

        Some(Self {
            headers,
            url_index,
            results_index,
            rows: rows.into_iter().map(Row::new).collect(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row's URL, trimmed, or `None` when the cell is missing or blank
    pub fn url_of<'a>(&self, row: &'a Row) -> Option<&'a str> {
        row.field(self.url_index)
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Number of rows that will trigger a request
    pub fn url_count(&self) -> usize {
        self.rows.iter().filter(|row| self.url_of(row).is_some()).count()
    }

    /// Reset every row's result to absent
    pub fn clear_results(&mut self) {
        for row in &mut self.rows {
            row.result = None;
        }
    }

    /// Keep only the rows at `indices`, in that order
    pub fn select(mut self, indices: &[usize]) -> Self {
        let mut taken: Vec<Option<Row>> = self.rows.drain(..).map(Some).collect();
        self.rows = indices
            .iter()
            .filter_map(|&i| taken.get_mut(i).and_then(Option::take))
            .collect();
        self
    }

    /// Header row of the output file
    pub fn output_headers(&self) -> Vec<String> {
        let mut headers = self.headers.clone();
        if self.results_index.is_none() {
            headers.push(RESULTS_COLUMN.to_string());
        }
        headers
    }

    /// Rows carrying more cells than the header names
    pub fn overwide_rows(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.fields.len() > self.headers.len())
            .count()
    }

    /// Output cells for one row: input fields padded or cut to the header
    /// width, with the result in the `results` column
    pub fn output_record(&self, row: &Row) -> Vec<String> {
        let mut record = row.fields.clone();
        record.resize(self.headers.len(), String::new());

        let result = row.result.clone().unwrap_or_default();
        match self.results_index {
            Some(index) => record[index] = result,
            None => record.push(result),
        }
        record
    }
}

/// Load a CSV file into a table
pub fn load_table(path: &Path) -> Result<Table, TableError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(TableError::NotFound(path.to_path_buf()))
        }
        Err(source) => {
            return Err(TableError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    parse_table(&content, path)
}

/// Parse CSV text. `origin` is only used in error messages.
pub fn parse_table(content: &str, origin: &Path) -> Result<Table, TableError> {
    let csv_error = |source| TableError::Csv {
        path: origin.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_string)
        .collect();

    // Nothing at all in the file
    if headers.iter().all(|h| h.is_empty()) {
        return Ok(Table::default());
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!("Parsed {} rows with {} columns from {}", rows.len(), headers.len(), origin.display());

    Table::from_rows(headers, rows).ok_or_else(|| TableError::MissingUrlColumn(origin.to_path_buf()))
}

/// Write the table, including the `results` column, to `path`
pub fn write_table(table: &Table, path: &Path) -> Result<(), TableError> {
    let io_error = |source| TableError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_error = |source| TableError::Csv {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
    }

    let file = fs::File::create(path).map_err(io_error)?;
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(file);

    wtr.write_record(table.output_headers()).map_err(csv_error)?;
    for row in &table.rows {
        wtr.write_record(table.output_record(row)).map_err(csv_error)?;
    }

    wtr.flush().map_err(io_error)?;
    debug!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}
