use std::collections::BTreeMap;

use itertools::Itertools;
use tracing::debug;

use crate::error::{ChartError, Result};
use crate::gen::{as_count, as_small_count, Column, FieldError, Layout, Record};

const MIB: f64 = (1024 * 1024) as f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Host,
    Dpu,
}

/// One timed run over an input file of `size` bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedupRow {
    pub mode: Mode,
    pub time: f64,
    pub size: u64,
    pub nr_tasklets: u32,
    pub nr_dpus: u32,
}

const SPEEDUP_COLUMNS: &[Column] = &[
    Column::new("dpu", &["use_dpu", "mode"]),
    Column::new("time", &["elapsed", "execution_time"]),
    Column::new("size", &["bytes", "file_size", "filesize"]),
    Column::new("nr_tasklets", &["tasklets"]),
    Column::new("nr_dpus", &["dpus"]),
];

impl Record for SpeedupRow {
    const LAYOUTS: &'static [Layout] = &[Layout { name: "speedup", columns: SPEEDUP_COLUMNS }];

    fn from_values(_layout: usize, v: &[f64]) -> std::result::Result<Self, FieldError> {
        Ok(SpeedupRow {
            mode: if v[0] == 0.0 { Mode::Host } else { Mode::Dpu },
            time: v[1],
            size: as_count(v[2], 2)?,
            nr_tasklets: as_small_count(v[3], 3)?,
            nr_dpus: as_small_count(v[4], 4)?,
        })
    }
}

/// Parallel per-point sequences, ordered by file size.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedupPlot {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub tasklets: Vec<u32>,
    pub dpus: Vec<u32>,
}

impl SpeedupPlot {
    /// "dpus (tasklets)" for each point.
    pub fn point_labels(&self) -> Vec<String> {
        self.dpus.iter().zip(&self.tasklets).map(|(d, t)| format!("{} ({})", d, t)).collect()
    }
}

pub fn to_mib(bytes: u64) -> f64 {
    bytes as f64 / MIB
}

/// Best device run per file size: the first row with the lowest time wins.
pub fn best_device_runs(rows: &[SpeedupRow]) -> BTreeMap<u64, &SpeedupRow> {
    let mut best: BTreeMap<u64, &SpeedupRow> = BTreeMap::new();
    for r in rows.iter().filter(|r| r.mode == Mode::Dpu) {
        best.entry(r.size)
            .and_modify(|b| {
                if r.time < b.time {
                    *b = r;
                }
            })
            .or_insert(r);
    }
    best
}

/// Pair host runs with the best device run of the same size, in size order.
pub fn process(rows: &[SpeedupRow]) -> Result<SpeedupPlot> {
    let host: Vec<&SpeedupRow> = rows
        .iter()
        .filter(|r| r.mode == Mode::Host)
        .sorted_by_key(|r| r.size)
        .collect();
    let device = best_device_runs(rows);
    debug!("{} host rows, {} distinct device sizes", host.len(), device.len());

    if host.len() != device.len() {
        return Err(ChartError::Consistency(format!(
            "{} host rows but {} distinct device file sizes; every size needs exactly one host run",
            host.len(),
            device.len()
        )));
    }

    let mut plot = SpeedupPlot::default();
    for (h, (size, d)) in host.iter().zip(device) {
        if h.size != size {
            return Err(ChartError::Consistency(format!(
                "host run for {} bytes lines up with device run for {} bytes",
                h.size, size
            )));
        }
        if d.time <= 0.0 {
            return Err(ChartError::Consistency(format!(
                "device time {} for {} bytes must be positive",
                d.time, size
            )));
        }
        plot.x.push(to_mib(size));
        plot.y.push(h.time / d.time);
        plot.tasklets.push(d.nr_tasklets);
        plot.dpus.push(d.nr_dpus);
    }
    Ok(plot)
}
