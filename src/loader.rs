use crate::error::AppError;
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Cell contents treated as missing values
pub const NA_VALUES: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>",
    "#N/A",
];

/// Inferred type of a whole column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Float,
    Text,
}

impl ColumnKind {
    /// True for columns that can be averaged and plotted on a value axis
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Int | ColumnKind::Float)
    }
}

/// A single table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the cell, `None` for text and missing values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    /// Whether the cell counts as missing (an NA marker or a NaN float)
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Missing => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "NaN"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) if v.is_nan() => write!(f, "NaN"),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => {
                write!(f, "{:.1}", v)
            }
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Tabular data loaded from an uploaded file
///
/// Rows are stored in file order and every row has exactly one value per column.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<String>,
    kinds: Vec<ColumnKind>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Column names in file order, after duplicate and empty headers are renamed
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// The first `n` rows (fewer if the table is shorter).
    pub fn head(&self, n: usize) -> &[Vec<Value>] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the column called `name`
    ///
    /// # Arguments
    /// * `name` - Exact column name, case-sensitive
    ///
    /// # Returns
    /// * `Option<usize>` - Index of the first matching column, or None
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        self.column_index(name).map(|i| self.kinds[i])
    }
}

/// Load a data file as CSV
///
/// The file is always parsed as CSV whatever its extension, so `.xlsx` and
/// `.parquet` uploads either fail here or come back as garbage columns.
/// The whole file is read before column types are inferred.
///
/// # Errors
/// * The file cannot be opened or is not valid CSV
/// * The file has no header row
/// * A row has more fields than the header
///
/// # Examples
/// ```no_run
/// use dataview::loader::load_table;
///
/// match load_table("static/uploads/data.csv") {
///     Ok(table) => println!("Loaded {} rows", table.len()),
///     Err(e) => eprintln!("Error loading data: {}", e),
/// }
/// ```
pub fn load_table(path: impl AsRef<Path>) -> Result<Table, AppError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path.as_ref())?;

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(AppError::EmptyData);
    }
    let columns = unique_headers(&headers);
    let width = columns.len();

    let mut raw: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() > width {
            return Err(AppError::RaggedRow {
                line: record.position().map(|p| p.line()).unwrap_or_default(),
                expected: width,
                found: record.len(),
            });
        }
        let mut row: Vec<String> = record.iter().map(str::to_owned).collect();
        row.resize(width, String::new());
        raw.push(row);
    }

    let kinds: Vec<ColumnKind> = (0..width).map(|col| infer_kind(&raw, col)).collect();
    let rows = raw
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(kinds.iter())
                .map(|(cell, kind)| convert(cell, *kind))
                .collect()
        })
        .collect();

    Ok(Table {
        columns,
        kinds,
        rows,
    })
}

fn is_missing(cell: &str) -> bool {
    NA_VALUES.contains(&cell) || NA_VALUES.contains(&cell.trim())
}

// Int only when nothing is missing; an int column with gaps becomes Float
fn infer_kind(raw: &[Vec<String>], col: usize) -> ColumnKind {
    let mut saw_missing = false;
    let mut all_int = true;

    for row in raw {
        let cell = &row[col];
        if is_missing(cell) {
            saw_missing = true;
            continue;
        }
        let trimmed = cell.trim();
        if all_int && trimmed.parse::<i64>().is_err() {
            all_int = false;
        }
        if !all_int && trimmed.parse::<f64>().is_err() {
            return ColumnKind::Text;
        }
    }

    if all_int && !saw_missing {
        ColumnKind::Int
    } else {
        ColumnKind::Float
    }
}

fn convert(cell: String, kind: ColumnKind) -> Value {
    if is_missing(&cell) {
        return Value::Missing;
    }
    match kind {
        ColumnKind::Int => cell
            .trim()
            .parse()
            .map(Value::Int)
            .unwrap_or(Value::Missing),
        ColumnKind::Float => cell
            .trim()
            .parse()
            .map(Value::Float)
            .unwrap_or(Value::Missing),
        ColumnKind::Text => Value::Text(cell),
    }
}

// Empty names become `Unnamed: <i>`, repeats get `.1`, `.2`, ...
fn unique_headers(headers: &StringRecord) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(headers.len());

    for (i, header) in headers.iter().enumerate() {
        let base = if header.is_empty() {
            format!("Unnamed: {}", i)
        } else {
            header.to_string()
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while seen.contains(&name) {
            name = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        seen.insert(name.clone());
        names.push(name);
    }

    names
}
