use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::StringRecord;
use itertools::Itertools;
use lazy_static::lazy_static;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::error::{ChartError, Result};

lazy_static! {
    pub static ref BUILD_INFO: String = format!("  ver: {}  rev: {}",
        env!("CARGO_PKG_VERSION"), env!("BUILD_GIT_HASH"));
}

/// Route `tracing` events to stderr. `-v` raises the level one step per
/// occurrence; `RUST_LOG` wins when set.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

/// One named CSV column. Header cells are compared after lower-casing and
/// mapping spaces and dashes to underscores.
#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

impl Column {
    pub const fn new(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Column { name, aliases }
    }

    fn matches(&self, header: &str) -> bool {
        let norm = normalize_header(header);
        norm == self.name || self.aliases.iter().any(|a| norm == *a)
    }
}

fn normalize_header(h: &str) -> String {
    h.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// A column order a record type can be read from.
#[derive(Debug)]
pub struct Layout {
    pub name: &'static str,
    pub columns: &'static [Column],
}

#[derive(Debug)]
pub struct FieldError {
    /// Position inside the layout's column list.
    pub column: usize,
    pub msg: String,
}

/// A row type that can be built from the numeric fields of one CSV line.
pub trait Record: Sized {
    /// Known layouts, most specific first.
    const LAYOUTS: &'static [Layout];

    /// `values` are ordered like `LAYOUTS[layout].columns`.
    fn from_values(layout: usize, values: &[f64]) -> std::result::Result<Self, FieldError>;
}

/// Read a whole integer count (tasklets, DPUs, bytes) out of a numeric field.
pub fn as_count(v: f64, column: usize) -> std::result::Result<u64, FieldError> {
    if v < 0.0 || v.fract() != 0.0 || v > u64::MAX as f64 {
        return Err(FieldError { column, msg: format!("{v} is not a whole non-negative count") });
    }
    Ok(v as u64)
}

pub fn as_small_count(v: f64, column: usize) -> std::result::Result<u32, FieldError> {
    let n = as_count(v, column)?;
    u32::try_from(n).map_err(|_| FieldError { column, msg: format!("{n} is out of range") })
}

/// Pick a layout for `header`: by column names when all of them are present,
/// otherwise by column count.
fn resolve_layout(header: &StringRecord, layouts: &[Layout]) -> Option<(usize, Vec<usize>)> {
    for (li, layout) in layouts.iter().enumerate() {
        let by_name: Option<Vec<usize>> = layout
            .columns
            .iter()
            .map(|c| header.iter().position(|h| c.matches(h)))
            .collect();
        if let Some(index) = by_name {
            debug!("header resolved by name to layout \"{}\": {:?}", layout.name, index);
            return Some((li, index));
        }
    }
    let li = layouts.iter().position(|l| l.columns.len() == header.len())?;
    debug!("header not recognised, reading layout \"{}\" by position", layouts[li].name);
    Some((li, (0..header.len()).collect()))
}

fn describe_layouts(layouts: &[Layout]) -> String {
    layouts
        .iter()
        .map(|l| format!("{} [{}]", l.name, l.columns.iter().map(|c| c.name).join(",")))
        .join(" or ")
}

fn create_csv_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(b',')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'));
    builder
}

/// Load every data row of `path`, skipping the header line.
pub fn load_records<R: Record>(path: &Path) -> Result<Vec<R>> {
    let file = File::open(path).map_err(|source| ChartError::Io { path: path.to_path_buf(), source })?;
    let mut reader = create_csv_builder().from_reader(BufReader::new(file));

    let header = reader.headers()?.clone();
    if header.is_empty() {
        return Err(ChartError::Empty(path.to_path_buf()));
    }
    let (layout, index) = resolve_layout(&header, R::LAYOUTS).ok_or_else(|| ChartError::Schema {
        path: path.to_path_buf(),
        msg: format!(
            "header [{}] has {} columns and matches none of: {}",
            header.iter().join(","),
            header.len(),
            describe_layouts(R::LAYOUTS)
        ),
    })?;
    let columns = R::LAYOUTS[layout].columns;

    let mut rows = Vec::new();
    let mut values = vec![0f64; index.len()];
    for rec in reader.records() {
        let rec = rec?;
        let line = rec.position().map(|p| p.line()).unwrap_or_default();
        if rec.len() != header.len() {
            return Err(ChartError::Schema {
                path: path.to_path_buf(),
                msg: format!("line {} has {} fields, header has {}", line, rec.len(), header.len()),
            });
        }
        for (slot, &idx) in index.iter().enumerate() {
            let raw = &rec[idx];
            let v = raw.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(|| ChartError::Parse {
                path: path.to_path_buf(),
                line,
                column: columns[slot].name,
                msg: format!("\"{}\" is not a finite number", raw),
            })?;
            values[slot] = v;
        }
        let row = R::from_values(layout, &values).map_err(|e| ChartError::Parse {
            path: path.to_path_buf(),
            line,
            column: columns[e.column].name,
            msg: e.msg,
        })?;
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(ChartError::Empty(path.to_path_buf()));
    }
    info!("loaded {} rows from {} (layout \"{}\")", rows.len(), path.display(), R::LAYOUTS[layout].name);
    Ok(rows)
}
