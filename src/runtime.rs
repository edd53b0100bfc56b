use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use tracing::{debug, warn};

use crate::error::{ChartError, Result};
use crate::gen::{as_small_count, Column, FieldError, Layout, Record};
use crate::plot::Series;

pub const HOST_LABEL: &str = "Host (1 thread)";

/// Instrumented DPU phases in the order the host program reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Load,
    Alloc,
    CopyIn,
    Execution,
    CopyOut,
    Free,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Prepare,
        Phase::Load,
        Phase::Alloc,
        Phase::CopyIn,
        Phase::Execution,
        Phase::CopyOut,
        Phase::Free,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Load => "load",
            Phase::Alloc => "alloc",
            Phase::CopyIn => "copy in",
            Phase::Execution => "execution",
            Phase::CopyOut => "copy out",
            Phase::Free => "free",
        }
    }
}

pub const REMAINDER_LABEL: &str = "remainder";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phases([f64; 7]);

impl Phases {
    #[cfg(test)]
    pub fn new(values: [f64; 7]) -> Self {
        Phases(values)
    }

    pub fn get(&self, p: Phase) -> f64 {
        self.0[p as usize]
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }
}

/// One run of the benchmark as written by the host program.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeRow {
    pub host_time: f64,
    pub dpu_time: f64,
    /// Absent for files that only carry totals.
    pub phases: Option<Phases>,
    pub nr_tasklets: u32,
    pub nr_dpus: u32,
}

const FULL_COLUMNS: &[Column] = &[
    Column::new("host_time", &["host"]),
    Column::new("dpu_time", &["dpu", "total"]),
    Column::new("prepare", &["prepare_time"]),
    Column::new("load", &["load_time"]),
    Column::new("alloc", &["alloc_time"]),
    Column::new("copy_in", &["copy_in_time"]),
    Column::new("launch", &["execution", "launch_time", "execution_time"]),
    Column::new("copy_out", &["copy_out_time"]),
    Column::new("free", &["free_time"]),
    Column::new("nr_tasklets", &["tasklets"]),
    Column::new("nr_dpus", &["dpus"]),
];

const TOTALS_COLUMNS: &[Column] = &[
    Column::new("host_time", &["host"]),
    Column::new("dpu_time", &["dpu", "total"]),
    Column::new("nr_tasklets", &["tasklets"]),
    Column::new("nr_dpus", &["dpus"]),
];

impl Record for RuntimeRow {
    const LAYOUTS: &'static [Layout] = &[
        Layout { name: "phases", columns: FULL_COLUMNS },
        Layout { name: "totals", columns: TOTALS_COLUMNS },
    ];

    fn from_values(layout: usize, v: &[f64]) -> std::result::Result<Self, FieldError> {
        let (phases, tl) = match layout {
            0 => {
                let mut p = [0f64; 7];
                p.copy_from_slice(&v[2..9]);
                (Some(Phases(p)), 9)
            }
            _ => (None, 2),
        };
        Ok(RuntimeRow {
            host_time: v[0],
            dpu_time: v[1],
            phases,
            nr_tasklets: as_small_count(v[tl], tl)?,
            nr_dpus: as_small_count(v[tl + 1], tl + 1)?,
        })
    }
}

/// Aggregated timings for one (DPU count, tasklet count) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub total: f64,
    pub phases: Option<Phases>,
}

impl RunRecord {
    /// DPU time not covered by any instrumented phase.
    pub fn remainder(&self) -> Option<f64> {
        self.phases.map(|p| self.total - p.sum())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum TaskletFilter {
    #[default]
    All,
    Only(BTreeSet<u32>),
}

impl TaskletFilter {
    pub fn from_list(list: &[u32]) -> Self {
        if list.is_empty() {
            TaskletFilter::All
        } else {
            TaskletFilter::Only(list.iter().copied().collect())
        }
    }

    pub fn accepts(&self, tasklets: u32) -> bool {
        match self {
            TaskletFilter::All => true,
            TaskletFilter::Only(set) => set.contains(&tasklets),
        }
    }
}

/// Runs grouped by DPU count then tasklet count.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeTable {
    /// Sorted distinct DPU counts, the x-axis.
    pub dpus: Vec<u32>,
    pub runs: BTreeMap<u32, BTreeMap<u32, RunRecord>>,
    pub host_mean: f64,
    pub has_phases: bool,
}

pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.into_iter().fold((0f64, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Group `rows` by (DPU count, tasklet count). Duplicate pairs keep the last
/// row. A negative remainder is a warning, or an error when `strict` is set.
pub fn aggregate(rows: &[RuntimeRow], filter: &TaskletFilter, strict: bool) -> Result<RuntimeTable> {
    let host_mean = mean(rows.iter().map(|r| r.host_time))
        .ok_or_else(|| ChartError::consistency("no runtime rows to aggregate"))?;
    let dpus: Vec<u32> = rows.iter().map(|r| r.nr_dpus).unique().sorted().collect();

    let keyed = rows
        .iter()
        .filter(|r| filter.accepts(r.nr_tasklets))
        .map(|r| ((r.nr_dpus, r.nr_tasklets), RunRecord { total: r.dpu_time, phases: r.phases }));
    let flat: BTreeMap<(u32, u32), RunRecord> = keyed.clone().collect();
    let dups = keyed.count() - flat.len();
    if dups > 0 {
        debug!("{} duplicate (dpus, tasklets) rows replaced by later ones", dups);
    }

    for ((d, t), run) in &flat {
        if let Some(rem) = run.remainder().filter(|r| *r < 0.0) {
            let msg = format!(
                "phase times exceed the DPU total by {:.6}s at {} DPUs / {} tasklets",
                -rem, d, t
            );
            if strict {
                return Err(ChartError::Consistency(msg));
            }
            warn!("{}", msg);
        }
    }

    let runs = flat
        .into_iter()
        .map(|((d, t), run)| (d, (t, run)))
        .into_group_map()
        .into_iter()
        .map(|(d, v)| (d, v.into_iter().collect::<BTreeMap<_, _>>()))
        .collect();

    Ok(RuntimeTable {
        dpus,
        runs,
        host_mean,
        has_phases: rows.iter().all(|r| r.phases.is_some()),
    })
}

impl RuntimeTable {
    pub fn tasklets(&self) -> BTreeSet<u32> {
        self.runs.values().flat_map(|m| m.keys().copied()).collect()
    }

    fn run(&self, dpus: u32, tasklets: u32) -> Option<&RunRecord> {
        self.runs.get(&dpus).and_then(|m| m.get(&tasklets))
    }

    fn column(&self, tasklets: u32, pick: impl Fn(&RunRecord) -> Option<f64>) -> Vec<Option<f64>> {
        self.dpus.iter().map(|d| self.run(*d, tasklets).and_then(&pick)).collect()
    }

    pub fn host_series(&self) -> Series {
        Series::new(HOST_LABEL, vec![Some(self.host_mean); self.dpus.len()])
    }

    /// DPU totals, one series per tasklet count, host reference last.
    pub fn line_series(&self, include_host: bool) -> Vec<Series> {
        let mut out: Vec<Series> = self
            .tasklets()
            .into_iter()
            .map(|t| Series::new(format!("{} tasklets", t), self.column(t, |r| Some(r.total))))
            .collect();
        if include_host {
            out.push(self.host_series());
        }
        out
    }

    /// Phase breakdown for one tasklet count, remainder last.
    pub fn phase_series(&self, tasklets: u32) -> Result<Vec<Series>> {
        if !self.has_phases {
            return Err(ChartError::usage(
                "bar charts need the per-phase columns; this file only carries totals",
            ));
        }
        if !self.tasklets().contains(&tasklets) {
            return Err(ChartError::Consistency(format!("no rows with {} tasklets", tasklets)));
        }
        let mut out: Vec<Series> = Phase::ALL
            .iter()
            .map(|p| Series::new(p.label(), self.column(tasklets, |r| r.phases.map(|ph| ph.get(*p)))))
            .collect();
        // stacked bars cannot draw below zero
        out.push(Series::new(
            REMAINDER_LABEL,
            self.column(tasklets, |r| r.remainder().map(|v| v.max(0.0))),
        ));
        Ok(out)
    }

    pub fn total_series(&self, tasklets: u32) -> Series {
        Series::new("total", self.column(tasklets, |r| Some(r.total)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(host: f64, dpu: f64, tasklets: u32, dpus: u32) -> RuntimeRow {
        RuntimeRow { host_time: host, dpu_time: dpu, phases: None, nr_tasklets: tasklets, nr_dpus: dpus }
    }

    fn phased(dpu: f64, phases: [f64; 7], tasklets: u32, dpus: u32) -> RuntimeRow {
        RuntimeRow { phases: Some(Phases::new(phases)), ..row(1.0, dpu, tasklets, dpus) }
    }

    #[test]
    fn two_dpu_groups_single_tasklet() {
        let rows = vec![row(10.0, 3.0, 2, 8), row(12.0, 5.0, 2, 4)];
        let table = aggregate(&rows, &TaskletFilter::All, false).unwrap();
        assert_eq!(table.dpus, vec![4, 8]);
        let series = table.line_series(false);
        assert_eq!(series, vec![Series::new("2 tasklets", vec![Some(5.0), Some(3.0)])]);
    }

    #[test]
    fn series_align_with_dpu_axis() {
        let rows = vec![
            row(1.0, 9.0, 1, 1),
            row(1.0, 5.0, 1, 2),
            row(1.0, 4.0, 4, 2),
            row(1.0, 2.0, 4, 16),
            row(1.0, 7.0, 8, 1),
        ];
        let table = aggregate(&rows, &TaskletFilter::All, false).unwrap();
        for s in table.line_series(true) {
            assert_eq!(s.values.len(), table.dpus.len(), "{}", s.label);
        }
        let series = table.line_series(false);
        assert_eq!(series[1].label, "4 tasklets");
        assert_eq!(series[1].values, vec![None, Some(4.0), Some(2.0)]);
    }

    #[test]
    fn host_mean_ignores_row_order() {
        let mut rows: Vec<RuntimeRow> = (1..=9).map(|i| row(i as f64 * 0.1, 1.0, 1, i)).collect();
        let a = aggregate(&rows, &TaskletFilter::All, false).unwrap();
        rows.reverse();
        rows.swap(2, 6);
        let b = aggregate(&rows, &TaskletFilter::All, false).unwrap();
        assert!((a.host_mean - 0.5).abs() < 1e-12);
        assert!((a.host_mean - b.host_mean).abs() < 1e-12);
        let host = a.line_series(true).pop().unwrap();
        assert_eq!(host.label, HOST_LABEL);
        assert!(host.values.iter().all(|v| *v == Some(a.host_mean)));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let rows = vec![row(1.0, 2.0, 2, 4), row(3.0, 4.0, 4, 4), row(5.0, 6.0, 2, 8)];
        let a = aggregate(&rows, &TaskletFilter::All, false).unwrap();
        let b = aggregate(&rows, &TaskletFilter::All, false).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.line_series(true), b.line_series(true));
    }

    #[test]
    fn duplicate_pair_keeps_last_row() {
        let rows = vec![row(1.0, 2.0, 2, 4), row(1.0, 9.0, 2, 4)];
        let table = aggregate(&rows, &TaskletFilter::All, false).unwrap();
        assert_eq!(table.line_series(false)[0].values, vec![Some(9.0)]);
    }

    #[test]
    fn filter_keeps_selected_tasklets_and_full_axis() {
        let rows = vec![row(1.0, 2.0, 2, 4), row(1.0, 3.0, 4, 8), row(1.0, 4.0, 8, 8)];
        let filter = TaskletFilter::from_list(&[4]);
        let table = aggregate(&rows, &filter, false).unwrap();
        assert_eq!(table.dpus, vec![4, 8]);
        let series = table.line_series(false);
        assert_eq!(series, vec![Series::new("4 tasklets", vec![None, Some(3.0)])]);
    }

    #[test]
    fn remainder_is_total_minus_phases() {
        let rows = vec![phased(100.0, [10.0, 5.0, 5.0, 10.0, 50.0, 10.0, 5.0], 16, 64)];
        let table = aggregate(&rows, &TaskletFilter::All, true).unwrap();
        let phases = table.phase_series(16).unwrap();
        assert_eq!(phases.len(), Phase::ALL.len() + 1);
        let rem = phases.last().unwrap();
        assert_eq!(rem.label, REMAINDER_LABEL);
        assert_eq!(rem.values, vec![Some(5.0)]);
        assert_eq!(phases[4].label, "execution");
        assert_eq!(phases[4].values, vec![Some(50.0)]);
    }

    #[test]
    fn negative_remainder_warns_or_fails() {
        let rows = vec![phased(10.0, [10.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0], 1, 1)];
        let table = aggregate(&rows, &TaskletFilter::All, false).unwrap();
        assert_eq!(table.phase_series(1).unwrap().last().unwrap().values, vec![Some(0.0)]);
        let err = aggregate(&rows, &TaskletFilter::All, true).unwrap_err();
        assert!(matches!(err, ChartError::Consistency(_)), "{err}");
    }

    #[test]
    fn phase_series_needs_phase_columns() {
        let table = aggregate(&[row(1.0, 2.0, 2, 4)], &TaskletFilter::All, false).unwrap();
        assert!(matches!(table.phase_series(2), Err(ChartError::Usage(_))));
    }

    #[test]
    fn phase_series_unknown_tasklet() {
        let rows = vec![phased(100.0, [1.0; 7], 16, 64)];
        let table = aggregate(&rows, &TaskletFilter::All, false).unwrap();
        assert!(matches!(table.phase_series(8), Err(ChartError::Consistency(_))));
    }

    #[test]
    fn loads_phase_file() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            "host_time,dpu_time,prepare,load,alloc,copy_in,launch,copy_out,free,nr_tasklets,nr_dpus\n\
             2.0,1.0,0.1,0.1,0.1,0.1,0.4,0.1,0.05,16,64\n"
        )
        .unwrap();
        let rows: Vec<RuntimeRow> = crate::gen::load_records(f.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].nr_dpus, 64);
        assert_eq!(rows[0].nr_tasklets, 16);
        assert_eq!(rows[0].phases.unwrap().get(Phase::Execution), 0.4);
    }

    #[test]
    fn loads_totals_file_by_position() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "h,d,t,n\n2.0,1.0,4,8\n").unwrap();
        let rows: Vec<RuntimeRow> = crate::gen::load_records(f.path()).unwrap();
        assert_eq!(rows, vec![row(2.0, 1.0, 4, 8)]);
    }
}
