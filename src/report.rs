use std::io::Write;

use prettytable::format::{FormatBuilder, LinePosition, LineSeparator, TableFormat};
use prettytable::{Cell, Row, Table};

use crate::plot::Series;

/// Pipe-delimited layout that renders as a markdown table.
fn markdown_format() -> TableFormat {
    FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separators(&[LinePosition::Title], LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

fn fmt_value(v: f64) -> String {
    format!("{:.6}", v)
}

/// `series | min | DPUs at min | max | DPUs at max`, one row per series.
pub fn summary_table(dpus: &[u32], series: &[Series]) -> Table {
    let mut table = Table::new();
    table.set_format(markdown_format());
    table.set_titles(Row::new(
        ["series", "min", "DPUs at min", "max", "DPUs at max"].iter().map(|t| Cell::new(t)).collect(),
    ));
    for s in series {
        let cells = match s.extrema() {
            Some(((lo_i, lo), (hi_i, hi))) => vec![
                Cell::new(&s.label),
                Cell::new(&fmt_value(lo)),
                Cell::new(&dpus[lo_i].to_string()),
                Cell::new(&fmt_value(hi)),
                Cell::new(&dpus[hi_i].to_string()),
            ],
            None => {
                let mut v = vec![Cell::new(&s.label)];
                v.extend((0..4).map(|_| Cell::new("-")));
                v
            }
        };
        table.add_row(Row::new(cells));
    }
    table
}

pub fn print_summary<W: Write + ?Sized>(out: &mut W, dpus: &[u32], series: &[Series]) -> std::io::Result<()> {
    summary_table(dpus, series).print(out)?;
    out.flush()
}
