use memchr::memchr_iter;
use memmap2::Mmap;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::{collections::HashSet, fs::File, path::Path, str};

use crate::cube::{
    CubeError, CubeResult, ParseError, ParseSummary, SchemaError, Value,
    column::{Column, ColumnType},
    schema::Dimension,
};

/// Rows sampled from the top of a CSV file to infer column types
const SCHEMA_SAMPLE_ROWS: usize = 100;

/// Load-time type of a CSV column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldType {
    column_type: ColumnType,
    /// Dimension columns keep their declared type; other Int64 columns widen
    /// to Float64 on the first fractional value.
    pinned: bool,
}

/// Immutable, fully materialised fact table.
///
/// Column names are normalised (trimmed, lower-case) exactly once, when the
/// snapshot is built; every later lookup uses the normalised name.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    headers: Vec<String>,
    columns: Vec<Column>,
    row_count: usize,
}

struct BatchResult {
    columns: Vec<Column>,
    row_count: usize,
    /// Every line seen in the chunk, blank ones included
    line_count: usize,
    errors: Vec<ParseError>,
}

/// Ingestion-boundary column name normalisation
pub fn normalize_column_name(name: &str) -> String {
    name.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
        .to_lowercase()
}

impl Snapshot {
    /// Builds a snapshot from row-oriented values.
    ///
    /// Column types are inferred from the non-null values: integers only give
    /// Int64, any float widens to Float64, strings give Str. An all-null
    /// column is Float64.
    ///
    /// # Errors
    /// [`SchemaError`] on duplicate normalised names, ragged rows, or columns
    /// mixing strings with numbers.
    pub fn from_rows<H: AsRef<str>>(
        headers: &[H],
        rows: Vec<Vec<Value>>,
    ) -> Result<Snapshot, SchemaError> {
        let headers = Self::normalize_headers(headers.iter().map(AsRef::as_ref))?;
        let width = headers.len();

        if let Some((row, found)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != width)
            .map(|(i, r)| (i, r.len()))
        {
            return Err(SchemaError::RowWidth {
                row,
                expected: width,
                found,
            });
        }

        let mut types = Vec::with_capacity(width);
        for (col_idx, name) in headers.iter().enumerate() {
            let column_type = infer_type(rows.iter().map(|r| &r[col_idx]))
                .ok_or_else(|| SchemaError::MixedColumnTypes(name.clone()))?;
            types.push(column_type);
        }

        let row_count = rows.len();
        let mut columns: Vec<Column> = types
            .iter()
            .map(|t| Column::new(*t, row_count))
            .collect();

        for row in rows {
            for ((column, value), name) in columns.iter_mut().zip(row).zip(&headers) {
                if !column.push(value) {
                    return Err(SchemaError::MixedColumnTypes(name.clone()));
                }
            }
        }

        Ok(Snapshot {
            headers,
            columns,
            row_count,
        })
    }

    /// Loads a CSV file using memory mapping, parsing newline-aligned chunks
    /// in parallel.
    ///
    /// Dimension columns (`anio`, `producto`, `proyecto`) take their declared
    /// type. Other column types are inferred from the first rows (Int, Float,
    /// Str), and an integer column widens to Float64 when a later row holds a
    /// fraction. Empty fields load as null. Rows that fail to parse are
    /// skipped and reported in the returned [`ParseSummary`].
    ///
    /// # Errors
    /// Returns a [`CubeError`] if the file cannot be opened or mapped, has no
    /// header line, or the header holds duplicate names.
    pub fn load_csv(path: &Path) -> CubeResult<(Snapshot, ParseSummary)> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(CubeError::Parse("Missing header line".into()));
        }
        // The mapping is dropped before this function returns; the snapshot
        // owns copies of every value.
        let mmap = unsafe { Mmap::map(&file)? };
        let buf: &[u8] = &mmap[..];

        let header_end = buf.iter().position(|&b| b == b'\n').unwrap_or(buf.len());
        let header_line = trim_cr(&buf[..header_end]);
        let headers = Self::normalize_headers(
            header_line
                .split(|&b| b == b',')
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .collect::<Vec<_>>()
                .iter()
                .map(String::as_str),
        )?;

        let data = if header_end < buf.len() {
            &buf[header_end + 1..]
        } else {
            &[][..]
        };

        let schema: Vec<FieldType> = Self::infer_schema(data, headers.len())
            .into_iter()
            .zip(&headers)
            .map(|(inferred, name)| match Dimension::from_column(name) {
                Some(dim) => FieldType {
                    column_type: dim.expected_type(),
                    pinned: true,
                },
                None => FieldType {
                    column_type: inferred,
                    pinned: false,
                },
            })
            .collect();

        let num_threads = rayon::current_num_threads();
        let chunks = Self::find_chunk_boundaries(data, num_threads);

        let batch_results: Vec<BatchResult> = chunks
            .par_iter()
            .map(|(start, end)| Self::parse_chunk(&data[*start..*end], &schema, &headers))
            .collect();

        let mut columns: Vec<Column> = schema
            .iter()
            .map(|t| Column::new(t.column_type, 0))
            .collect();
        let mut total_rows = 0;
        let mut all_errors = Vec::new();
        // line 1 is the header
        let mut line_offset = 1;

        for mut batch in batch_results {
            total_rows += batch.row_count;
            for mut err in batch.errors {
                err.row += line_offset;
                all_errors.push(err);
            }
            line_offset += batch.line_count;

            for (column, chunk) in columns.iter_mut().zip(batch.columns.iter_mut()) {
                column.append(chunk);
            }
        }

        tracing::debug!(
            path = %path.display(),
            rows = total_rows,
            skipped = all_errors.len(),
            "loaded CSV snapshot"
        );

        Ok((
            Snapshot {
                headers,
                columns,
                row_count: total_rows,
            },
            ParseSummary {
                rows_processed: total_rows,
                errors: all_errors,
            },
        ))
    }

    fn normalize_headers<'a>(
        raw: impl Iterator<Item = &'a str>,
    ) -> Result<Vec<String>, SchemaError> {
        let mut seen = HashSet::new();
        let mut headers = Vec::new();
        for name in raw {
            let name = normalize_column_name(name);
            if !seen.insert(name.clone()) {
                return Err(SchemaError::DuplicateColumn(name));
            }
            headers.push(name);
        }
        Ok(headers)
    }

    fn infer_schema(data: &[u8], num_cols: usize) -> Vec<ColumnType> {
        // (saw int, saw float, saw string) per column
        let mut seen = vec![(false, false, false); num_cols];

        for line in data
            .split(|&b| b == b'\n')
            .map(trim_cr)
            .filter(|l| !l.is_empty())
            .take(SCHEMA_SAMPLE_ROWS)
        {
            let fields: Vec<&[u8]> = line.split(|&b| b == b',').collect();
            if fields.len() != num_cols {
                continue;
            }
            for (flags, field) in seen.iter_mut().zip(fields) {
                if field.is_empty() {
                    continue;
                }
                if atoi_simd::parse::<i64>(field).is_ok() {
                    flags.0 = true;
                } else if fast_float::parse::<f64, _>(field).is_ok() {
                    flags.1 = true;
                } else {
                    flags.2 = true;
                }
            }
        }

        seen.into_iter()
            .map(|(int, float, string)| match (int, float, string) {
                (_, _, true) => ColumnType::Str,
                (true, false, false) => ColumnType::Int64,
                _ => ColumnType::Float64,
            })
            .collect()
    }

    fn find_chunk_boundaries(data: &[u8], num_chunks: usize) -> Vec<(usize, usize)> {
        if data.is_empty() {
            return vec![];
        }

        let num_chunks = num_chunks.max(1);
        let chunk_size = data.len() / num_chunks;
        let mut boundaries = Vec::with_capacity(num_chunks);
        let mut start = 0;

        for i in 0..num_chunks - 1 {
            let mut end = ((i + 1) * chunk_size).max(start);

            // Find next newline
            while end < data.len() && data[end] != b'\n' {
                end += 1;
            }

            if end < data.len() {
                end += 1; // Include the newline
            }

            if start < end {
                boundaries.push((start, end));
            }
            start = end;
        }

        // Last chunk gets everything remaining
        if start < data.len() {
            boundaries.push((start, data.len()));
        }

        boundaries
    }

    fn parse_chunk(chunk: &[u8], schema: &[FieldType], headers: &[String]) -> BatchResult {
        let num_cols = schema.len();
        let estimated_rows = memchr_iter(b'\n', chunk).count() + 1;

        let mut columns: Vec<Column> = schema
            .iter()
            .map(|t| Column::new(t.column_type, estimated_rows))
            .collect();
        let mut errors = Vec::new();
        let mut row_count = 0;
        let mut line_count = 0;
        let mut fields = Vec::with_capacity(num_cols);
        let mut parsed = Vec::with_capacity(num_cols);

        let mut start = 0;
        let line_ends = memchr_iter(b'\n', chunk).chain(
            // trailing line without a newline
            (chunk.last() != Some(&b'\n')).then_some(chunk.len()),
        );

        for end in line_ends {
            let line = trim_cr(&chunk[start..end]);
            start = end + 1;
            line_count += 1;

            if line.is_empty() {
                continue;
            }

            fields.clear();
            let mut field_start = 0;
            for comma_pos in memchr_iter(b',', line) {
                fields.push(&line[field_start..comma_pos]);
                field_start = comma_pos + 1;
            }
            fields.push(&line[field_start..]);

            if fields.len() != num_cols {
                errors.push(ParseError {
                    row: line_count,
                    column: String::new(),
                    value: format!("Expected {} fields, got {}", num_cols, fields.len()),
                    error: None,
                });
                continue;
            }

            parsed.clear();
            let mut failure = None;
            for (col_idx, field) in fields.iter().enumerate() {
                match parse_field(field, schema[col_idx]) {
                    Ok(value) => parsed.push(value),
                    Err(e) => {
                        failure = Some(ParseError {
                            row: line_count,
                            column: headers[col_idx].clone(),
                            value: String::from_utf8_lossy(field).into_owned(),
                            error: Some(e),
                        });
                        break;
                    }
                }
            }

            if let Some(err) = failure {
                errors.push(err);
                continue;
            }

            for (column, value) in columns.iter_mut().zip(parsed.drain(..)) {
                column.push(value);
            }
            row_count += 1;
        }

        BatchResult {
            columns,
            row_count,
            line_count,
            errors,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| self.columns.get(idx))
    }

    /// Column by normalised name.
    ///
    /// # Errors
    /// [`SchemaError::MissingColumn`] if the snapshot has no such column.
    pub fn get_col(&self, name: &str) -> Result<&Column, SchemaError> {
        self.column(name)
            .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<Value> {
        self.column(column).map(|c| c.value(row))
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_field(field: &[u8], field_type: FieldType) -> Result<Value, String> {
    if field.is_empty() {
        return Ok(Value::Null);
    }
    match field_type.column_type {
        ColumnType::Int64 => match atoi_simd::parse::<i64>(field) {
            Ok(v) => Ok(Value::Int(v)),
            Err(_) if !field_type.pinned => fast_float::parse::<f64, _>(field)
                .map(Value::Float)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        },
        ColumnType::Float64 => fast_float::parse::<f64, _>(field)
            .map(Value::Float)
            .map_err(|e| e.to_string()),
        ColumnType::Str => str::from_utf8(field)
            .map(|s| Value::Str(s.to_string()))
            .map_err(|e| e.to_string()),
    }
}

/// `None` when strings and numbers share a column
fn infer_type<'a>(values: impl Iterator<Item = &'a Value>) -> Option<ColumnType> {
    let (mut int, mut float, mut string) = (false, false, false);
    for value in values {
        match value {
            Value::Null => {}
            Value::Int(_) => int = true,
            Value::Float(_) => float = true,
            Value::Str(_) => string = true,
        }
    }
    match (int, float, string) {
        (false, false, true) => Some(ColumnType::Str),
        (_, _, true) => None,
        (true, false, false) => Some(ColumnType::Int64),
        _ => Some(ColumnType::Float64),
    }
}
