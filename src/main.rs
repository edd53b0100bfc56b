use std::error::Error;
use std::io::{BufWriter, Write};
use std::time::Instant;

use tracing::{info, warn};

mod bars;
mod cli;
mod error;
mod gen;
mod plot;
mod report;
mod runtime;

use bars::BarChart;
use cli::{get_cli, ChartType, RuntimeCli};
use error::ChartError;
use gen::load_records;
use plot::{render, LineChart, Series};
use runtime::{aggregate, RuntimeRow, RuntimeTable, HOST_LABEL};

fn main() {
    if let Err(err) = runtimechart() {
        eprintln!("error: {}", &err);
        std::process::exit(1);
    }
}

fn line_chart(cfg: &RuntimeCli, table: &RuntimeTable, series: Vec<Series>) -> LineChart {
    LineChart {
        title: cfg.title.clone(),
        xlabel: cfg.xlabel.clone(),
        ylabel: cfg.ylabel.clone(),
        x: table.dpus.iter().map(|d| *d as f64).collect(),
        x_precision: 0,
        series,
        baseline: None,
        x_step: cfg.xstepsize,
        y_step: cfg.ystepsize,
        point_labels: None,
        x_ticks_at_points: false,
        legend_left: false,
        size: (cfg.width, cfg.height),
    }
}

fn bar_chart(cfg: &RuntimeCli, table: &RuntimeTable, layers: Vec<Series>) -> BarChart {
    BarChart {
        title: cfg.title.clone(),
        xlabel: cfg.xlabel.clone(),
        ylabel: cfg.ylabel.clone(),
        categories: table.dpus.iter().map(|d| d.to_string()).collect(),
        layers,
        reference: (!cfg.nohost).then(|| (HOST_LABEL.to_string(), table.host_mean)),
        y_step: cfg.ystepsize,
        size: (cfg.width, cfg.height),
    }
}

fn runtimechart() -> Result<(), Box<dyn Error>> {
    let start_f = Instant::now();
    let cfg = get_cli()?;

    let rows: Vec<RuntimeRow> = load_records(&cfg.csvfile)?;
    let table = aggregate(&rows, &cfg.tasklet_filter(), cfg.strict)?;
    info!(
        "{} DPU counts {:?}, tasklet counts {:?}, host mean {:.6}s",
        table.dpus.len(),
        table.dpus,
        table.tasklets(),
        table.host_mean
    );

    let present = table.tasklets();
    for t in cfg.includetasklet.iter().filter(|t| !present.contains(*t)) {
        warn!("no rows with {} tasklets in {}", t, cfg.csvfile.display());
    }

    let summary = match cfg.chart_type {
        ChartType::Line => {
            let series = table.line_series(!cfg.nohost);
            if series.is_empty() {
                return Err(ChartError::consistency("nothing to plot: no rows match the selected tasklet counts").into());
            }
            if !cfg.summary_only {
                render(&line_chart(&cfg, &table, series.clone()), &cfg.outputfile)?;
            }
            series
        }
        ChartType::Bar => {
            let tasklets = cfg
                .bar_tasklet()
                .ok_or_else(|| ChartError::usage("--type bar needs exactly one --includetasklet value"))?;
            let layers = table.phase_series(tasklets)?;
            if !cfg.summary_only {
                render(&bar_chart(&cfg, &table, layers.clone()), &cfg.outputfile)?;
            }
            let mut rows = layers;
            rows.push(table.total_series(tasklets));
            rows
        }
    };

    print_summary(&table, &summary)?;
    info!("runtime: {:.3} secs", start_f.elapsed().as_secs_f64());
    Ok(())
}

fn stdout_writer() -> impl Write {
    BufWriter::new(std::io::stdout().lock())
}

fn print_summary(table: &RuntimeTable, series: &[Series]) -> std::io::Result<()> {
    let mut writer = stdout_writer();
    report::print_summary(&mut writer, &table.dpus, series)
}
