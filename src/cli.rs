use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use tracing::debug;

use crate::error::{ChartError, Result};
use crate::gen::BUILD_INFO;
use crate::plot::Ext;
use crate::runtime::TaskletFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChartType {
    /// DPU total per tasklet count
    Line,
    /// Stacked phase breakdown for a single tasklet count
    Bar,
}

#[derive(Parser, Debug)]
#[command(name = "runtimechart", version = BUILD_INFO.as_str())]
/// Generate a runtime chart for PIM-HDC from a benchmark CSV file.
///
/// The CSV holds one run per line: host_time, dpu_time, prepare, load, alloc,
/// copy_in, launch, copy_out, free, nr_tasklets, nr_dpus (or only
/// host_time, dpu_time, nr_tasklets, nr_dpus). The first line is a header.
pub struct RuntimeCli {
    #[arg(long = "csvfile")]
    /// Input CSV data file
    pub csvfile: PathBuf,
    #[arg(long = "xlabel", default_value = "DPUs")]
    /// Chart x-axis label
    pub xlabel: String,
    #[arg(long = "ylabel", default_value = "Time (s)")]
    /// Chart y-axis label
    pub ylabel: String,
    #[arg(long = "xstepsize")]
    /// Spacing between x-axis ticks
    pub xstepsize: Option<f64>,
    #[arg(long = "ystepsize")]
    /// Spacing between y-axis ticks
    pub ystepsize: Option<f64>,
    #[arg(long = "title", default_value = "PIM-HDC Runtimes")]
    /// Chart title
    pub title: String,
    #[arg(long = "nohost")]
    /// Leave out the host reference series
    pub nohost: bool,
    #[arg(long = "outputfile", default_value = "output.png")]
    /// Output chart (.png, .bmp, .jpg or .svg)
    pub outputfile: PathBuf,
    #[arg(long = "type", value_enum, default_value_t = ChartType::Line)]
    /// Chart type
    pub chart_type: ChartType,
    #[arg(long = "includetasklet", action = ArgAction::Append)]
    /// Tasklet count to include, repeatable; bar charts need exactly one
    pub includetasklet: Vec<u32>,
    #[arg(long = "strict")]
    /// Fail instead of warning when phase times exceed the DPU total
    pub strict: bool,
    #[arg(long = "summary_only")]
    /// Print the min/max summary without writing a chart
    pub summary_only: bool,
    #[arg(long = "width", default_value_t = 1024)]
    pub width: u32,
    #[arg(long = "height", default_value_t = 768)]
    pub height: u32,
    #[arg(short = 'v', action = ArgAction::Count)]
    /// Verbosity - use more than one v for greater detail
    pub verbose: u8,
}

fn check_step(step: Option<f64>, opt: &str) -> Result<()> {
    match step {
        Some(s) if !(s.is_finite() && s > 0.0) => {
            Err(ChartError::Usage(format!("{} must be a positive number, got {}", opt, s)))
        }
        _ => Ok(()),
    }
}

impl RuntimeCli {
    /// Checks clap cannot express. Runs before the CSV is touched.
    pub fn validate(&self) -> Result<()> {
        if self.chart_type == ChartType::Bar && self.includetasklet.len() != 1 {
            return Err(ChartError::Usage(format!(
                "--type bar needs exactly one --includetasklet value, got {}",
                self.includetasklet.len()
            )));
        }
        check_step(self.xstepsize, "--xstepsize")?;
        check_step(self.ystepsize, "--ystepsize")?;
        if self.width == 0 || self.height == 0 {
            return Err(ChartError::usage("--width and --height must be greater than 0"));
        }
        if !self.summary_only {
            Ext::from_path(&self.outputfile)?;
        }
        Ok(())
    }

    pub fn tasklet_filter(&self) -> TaskletFilter {
        TaskletFilter::from_list(&self.includetasklet)
    }

    /// The one tasklet count a bar chart is drawn for.
    pub fn bar_tasklet(&self) -> Option<u32> {
        match (self.chart_type, self.includetasklet.as_slice()) {
            (ChartType::Bar, [t]) => Some(*t),
            _ => None,
        }
    }
}

pub fn get_cli() -> Result<RuntimeCli> {
    let cfg = RuntimeCli::parse();
    crate::gen::init_logging(cfg.verbose);
    debug!("CLI options: {:?}", cfg);
    cfg.validate()?;
    Ok(cfg)
}
