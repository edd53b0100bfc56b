use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;

use clap::{ArgAction, Parser};
use tracing::{debug, info};

mod error;
mod gen;
mod plot;
mod speedup;

use error::ChartError;
use gen::{load_records, BUILD_INFO};
use plot::{render, Ext, LineChart, PointLabels, Series};
use speedup::{process, SpeedupPlot, SpeedupRow};

#[derive(Parser, Debug)]
#[command(name = "filesize_speedup", version = BUILD_INFO.as_str())]
/// Plot the speedup of the best DPU run over the host run per input file size.
///
/// The CSV holds one run per line: dpu (0 = host, 1 = DPU), time, size in
/// bytes, nr_tasklets, nr_dpus. The first line is a header.
struct SpeedupCli {
    #[arg(long = "csvfile")]
    /// Input CSV data file
    csvfile: PathBuf,
    #[arg(long = "xlabel", default_value = "File Size (MB)")]
    /// Chart x-axis label
    xlabel: String,
    #[arg(long = "ylabel", default_value = "Speedup")]
    /// Chart y-axis label
    ylabel: String,
    #[arg(long = "title", default_value = "PIM-HDC Filesize Speedup")]
    /// Chart title
    title: String,
    #[arg(long = "outputfile", default_value = "output.svg")]
    /// Output chart (.png, .bmp, .jpg or .svg)
    outputfile: PathBuf,
    #[arg(long = "width", default_value_t = 2040)]
    width: u32,
    #[arg(long = "height", default_value_t = 750)]
    height: u32,
    #[arg(short = 'v', action = ArgAction::Count)]
    /// Verbosity - use more than one v for greater detail
    verbose: u8,
}

fn main() {
    if let Err(err) = filesize_speedup() {
        eprintln!("error: {}", &err);
        std::process::exit(1);
    }
}

fn speedup_chart(cfg: &SpeedupCli, plot: &SpeedupPlot) -> LineChart {
    let values: Vec<Option<f64>> = plot.y.iter().map(|y| Some(*y)).collect();
    LineChart {
        title: cfg.title.clone(),
        xlabel: cfg.xlabel.clone(),
        ylabel: cfg.ylabel.clone(),
        x: plot.x.clone(),
        x_precision: 2,
        baseline: Some(Series::new("Host", vec![Some(1.0); values.len()])),
        series: vec![Series::new("DPU", values)],
        x_step: None,
        y_step: None,
        point_labels: Some(PointLabels {
            desc: "DPUs (Tasklets)".to_string(),
            labels: plot.point_labels(),
        }),
        x_ticks_at_points: true,
        // the largest sizes peak in the upper right
        legend_left: true,
        size: (cfg.width, cfg.height),
    }
}

fn filesize_speedup() -> Result<(), Box<dyn Error>> {
    let start_f = Instant::now();
    let cfg = SpeedupCli::parse();
    gen::init_logging(cfg.verbose);
    debug!("CLI options: {:?}", cfg);
    if cfg.width == 0 || cfg.height == 0 {
        return Err(ChartError::usage("--width and --height must be greater than 0").into());
    }
    Ext::from_path(&cfg.outputfile)?;

    let rows: Vec<SpeedupRow> = load_records(&cfg.csvfile)?;
    let plot = process(&rows)?;
    if plot.x.is_empty() {
        return Err(ChartError::consistency("nothing to plot: no host/DPU pairs in the input").into());
    }
    for ((x, y), label) in plot.x.iter().zip(&plot.y).zip(plot.point_labels()) {
        info!("{:.2} MiB: speedup {:.3} at {}", x, y, label);
    }

    render(&speedup_chart(&cfg, &plot), &cfg.outputfile)?;
    info!("runtime: {:.3} secs", start_f.elapsed().as_secs_f64());
    Ok(())
}
