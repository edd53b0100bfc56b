use std::error::Error;
use std::path::Path;

use itertools::Itertools;
use plotters::chart::{ChartContext, SeriesLabelPosition};
use plotters::coord::combinators::BindKeyPoints;
use plotters::coord::{CoordTranslate, Shift};
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use tracing::info;

use crate::error::{ChartError, Result};

pub type DrawResult<'a> = std::result::Result<(), Box<dyn Error + 'a>>;

pub const FONT: &str = "sans-serif";

/// A display label with one slot per x-axis point; `None` marks a gap.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub values: Vec<Option<f64>>,
}

impl Series {
    pub fn new(label: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Series { label: label.into(), values }
    }

    /// (index, value) of the smallest and largest present values.
    pub fn extrema(&self) -> Option<((usize, f64), (usize, f64))> {
        let present = self.values.iter().enumerate().filter_map(|(i, v)| v.map(|v| (i, v)));
        match present.minmax_by(|a, b| a.1.total_cmp(&b.1)) {
            itertools::MinMaxResult::NoElements => None,
            itertools::MinMaxResult::OneElement(e) => Some((e, e)),
            itertools::MinMaxResult::MinMax(lo, hi) => Some((lo, hi)),
        }
    }

    pub fn max(&self) -> Option<f64> {
        self.extrema().map(|(_, (_, hi))| hi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ext {
    Bitmap,
    Svg,
}

impl Ext {
    pub fn from_path(path: &Path) -> Result<Ext> {
        let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("png") | Some("bmp") | Some("jpg") | Some("jpeg") => Ok(Ext::Bitmap),
            Some("svg") => Ok(Ext::Svg),
            other => Err(ChartError::Usage(format!(
                "unsupported output format {:?} for {}; use .png, .bmp, .jpg or .svg",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }
}

/// Something that can draw itself on any plotters backend.
pub trait Chart {
    fn size(&self) -> (u32, u32);
    fn draw<'a, DB: DrawingBackend + 'a>(&self, root: DrawingArea<DB, Shift>) -> DrawResult<'a>;
}

pub fn render<C: Chart>(chart: &C, path: &Path) -> Result<()> {
    let res = match Ext::from_path(path)? {
        Ext::Bitmap => chart.draw(BitMapBackend::new(path, chart.size()).into_drawing_area()),
        Ext::Svg => chart.draw(SVGBackend::new(path, chart.size()).into_drawing_area()),
    };
    res.map_err(|e| ChartError::Plot(e.to_string()))?;
    info!("wrote {}", path.display());
    Ok(())
}

/// Axis bounds padded so markers at the ends stay visible.
pub fn padded(lo: f64, hi: f64) -> (f64, f64) {
    let span = hi - lo;
    if span <= 0.0 {
        let pad = (lo.abs() * 0.1).max(0.5);
        (lo - pad, hi + pad)
    } else {
        (lo - span * 0.05, hi + span * 0.05)
    }
}

const MAX_TICKS: usize = 200;

/// Every multiple of `step` inside `[lo, hi]`. Empty when the step is not
/// positive or would produce an unreadable number of ticks.
pub fn step_ticks(lo: f64, hi: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0 && step.is_finite() && hi >= lo) {
        return Vec::new();
    }
    let first = (lo / step - 1e-9).ceil() as i64;
    let last = (hi / step + 1e-9).floor() as i64;
    if last < first || (last - first) as usize >= MAX_TICKS {
        return Vec::new();
    }
    (first..=last).map(|k| k as f64 * step).collect()
}

/// Round-valued ticks, about `target` of them, on a 1/2/5 step.
pub fn nice_ticks(lo: f64, hi: f64, target: usize) -> Vec<f64> {
    let span = hi - lo;
    if !(span > 0.0 && span.is_finite()) {
        return vec![lo];
    }
    let raw = span / target.max(1) as f64;
    let mag = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * mag)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * mag);
    step_ticks(lo, hi, step)
}

/// Ticks `step` apart when a step is given, round values otherwise.
pub fn axis_ticks(lo: f64, hi: f64, step: Option<f64>, target: usize) -> Vec<f64> {
    match step.map(|s| step_ticks(lo, hi, s)) {
        Some(ticks) if !ticks.is_empty() => ticks,
        _ => nice_ticks(lo, hi, target),
    }
}

/// Tick text without float noise such as `0.30000000000000004`.
pub fn tick_label(v: f64) -> String {
    format!("{}", (v * 1e9).round() / 1e9 + 0.0)
}

pub fn color(idx: usize) -> RGBAColor {
    Palette99::pick(idx).to_rgba()
}

pub fn legend<'a, DB: DrawingBackend + 'a, CT: CoordTranslate>(
    chart: &mut ChartContext<'a, DB, CT>,
    pos: SeriesLabelPosition,
) -> std::result::Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    chart
        .configure_series_labels()
        .position(pos)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font((FONT, 14))
        .draw()
}

/// Text drawn next to each point of the first series.
#[derive(Debug, Clone)]
pub struct PointLabels {
    /// What the labels mean, shown in the legend.
    pub desc: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LineChart {
    pub title: String,
    pub xlabel: String,
    pub ylabel: String,
    pub x: Vec<f64>,
    /// Digits after the decimal point on x tick labels.
    pub x_precision: usize,
    pub series: Vec<Series>,
    /// Drawn dashed, without extrema markers.
    pub baseline: Option<Series>,
    pub x_step: Option<f64>,
    pub y_step: Option<f64>,
    pub point_labels: Option<PointLabels>,
    /// Put x ticks on the data points instead of round values, unless
    /// `x_step` is set.
    pub x_ticks_at_points: bool,
    /// Legend in the upper left corner instead of the upper right.
    pub legend_left: bool,
    pub size: (u32, u32),
}

impl LineChart {
    fn points<'s>(&'s self, s: &'s Series) -> impl Iterator<Item = (f64, f64)> + Clone + 's {
        self.x.iter().zip(&s.values).filter_map(|(x, v)| v.map(|v| (*x, v)))
    }

    fn y_max(&self) -> f64 {
        let hi = self
            .series
            .iter()
            .chain(self.baseline.iter())
            .filter_map(Series::max)
            .fold(0f64, f64::max);
        if hi > 0.0 { hi * 1.1 } else { 1.0 }
    }

    fn x_bounds(&self) -> (f64, f64) {
        let (lo, hi) = self.x.iter().copied().minmax_by(f64::total_cmp).into_option().unwrap_or((0.0, 1.0));
        padded(lo, hi)
    }

    fn x_ticks(&self, lo: f64, hi: f64) -> Vec<f64> {
        if self.x_ticks_at_points && self.x_step.is_none() {
            let ticks: Vec<f64> = self.x.iter().copied().sorted_by(f64::total_cmp).dedup().collect();
            if !ticks.is_empty() {
                return ticks;
            }
        }
        axis_ticks(lo, hi, self.x_step, self.x.len().clamp(2, 10))
    }

    fn legend_label(&self, idx: usize, s: &Series) -> String {
        match &self.point_labels {
            Some(p) if idx == 0 => format!("{} [{}]", s.label, p.desc),
            _ => s.label.clone(),
        }
    }
}

impl Chart for LineChart {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn draw<'a, DB: DrawingBackend + 'a>(&self, root: DrawingArea<DB, Shift>) -> DrawResult<'a> {
        root.fill(&WHITE)?;

        let (x_lo, x_hi) = self.x_bounds();
        let y_hi = self.y_max();
        let x_ticks = self.x_ticks(x_lo, x_hi);
        let y_ticks = axis_ticks(0.0, y_hi, self.y_step, 10);
        let (x_labels, y_labels) = (x_ticks.len(), y_ticks.len());

        let mut chart = ChartBuilder::on(&root)
            .caption(&self.title, (FONT, 24).into_font())
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(65)
            .build_cartesian_2d(
                (x_lo..x_hi).with_key_points(x_ticks),
                (0f64..y_hi).with_key_points(y_ticks),
            )?;

        let precision = self.x_precision;
        chart
            .configure_mesh()
            .light_line_style(WHITE)
            .bold_line_style(BLACK.mix(0.15))
            .x_labels(x_labels)
            .y_labels(y_labels)
            .x_desc(&self.xlabel)
            .y_desc(&self.ylabel)
            .x_label_formatter(&|x| format!("{:.*}", precision, x))
            .y_label_formatter(&|y| tick_label(*y))
            .label_style((FONT, 14))
            .axis_desc_style((FONT, 16))
            .draw()?;

        for (idx, s) in self.series.iter().enumerate() {
            let c = color(idx);
            chart
                .draw_series(LineSeries::new(self.points(s), c.stroke_width(2)))?
                .label(self.legend_label(idx, s))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], c.stroke_width(2)));

            if let Some(((lo_i, lo), (hi_i, hi))) = s.extrema() {
                chart.draw_series([
                    Circle::new((self.x[lo_i], lo), 5, c.filled()),
                    Circle::new((self.x[hi_i], hi), 5, c.stroke_width(2)),
                ])?;
            }
        }

        if let (Some(p), Some(first)) = (&self.point_labels, self.series.first()) {
            let labelled = self.points(first).zip(p.labels.iter());
            chart.draw_series(labelled.map(|(coord, text)| {
                EmptyElement::at(coord) + Text::new(text.clone(), (-10, -22), (FONT, 12).into_font())
            }))?;
        }

        if let Some(base) = &self.baseline {
            chart
                .draw_series(DashedLineSeries::new(self.points(base), 10, 6, BLACK.stroke_width(1)))?
                .label(base.label.as_str())
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));
        }

        let pos = if self.legend_left {
            SeriesLabelPosition::UpperLeft
        } else {
            SeriesLabelPosition::UpperRight
        };
        legend(&mut chart, pos)?;
        root.present()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_from_path() {
        assert_eq!(Ext::from_path(Path::new("out.PNG")).unwrap(), Ext::Bitmap);
        assert_eq!(Ext::from_path(Path::new("dir/out.svg")).unwrap(), Ext::Svg);
        assert!(matches!(Ext::from_path(Path::new("out.pdf")), Err(ChartError::Usage(_))));
        assert!(matches!(Ext::from_path(Path::new("out")), Err(ChartError::Usage(_))));
    }

    #[test]
    fn step_ticks_are_multiples_of_step() {
        // DPU axis 4..64 padded to 1..67
        assert_eq!(step_ticks(1.0, 67.0, 8.0), vec![8.0, 16.0, 24.0, 32.0, 40.0, 48.0, 56.0, 64.0]);
        assert_eq!(step_ticks(0.0, 1.0, 0.25), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(step_ticks(-0.5, 0.5, 1.0), vec![0.0]);
        assert!(step_ticks(0.0, 10.0, 0.0).is_empty());
        assert!(step_ticks(0.0, 1e6, 1e-3).is_empty());
    }

    #[test]
    fn axis_ticks_fall_back_to_round_values() {
        assert_eq!(axis_ticks(0.0, 30.0, Some(8.0), 10), vec![0.0, 8.0, 16.0, 24.0]);
        assert_eq!(axis_ticks(0.0, 10.0, None, 5), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
        assert_eq!(axis_ticks(0.0, 10.0, Some(1e-9), 5), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
        let labels: Vec<String> = nice_ticks(0.0, 0.35, 4).into_iter().map(tick_label).collect();
        assert_eq!(labels, vec!["0", "0.1", "0.2", "0.3"]);
        assert_eq!(tick_label(0.30000000000000004), "0.3");
        assert_eq!(nice_ticks(3.0, 3.0, 4), vec![3.0]);
    }

    #[test]
    fn padded_handles_single_point() {
        assert_eq!(padded(4.0, 4.0), (3.5, 4.5));
        let (lo, hi) = padded(0.0, 100.0);
        assert!(lo < 0.0 && hi > 100.0);
    }

    #[test]
    fn extrema_skip_gaps() {
        let s = Series::new("x", vec![None, Some(3.0), Some(1.0), None, Some(7.0)]);
        assert_eq!(s.extrema(), Some(((2, 1.0), (4, 7.0))));
        assert_eq!(s.max(), Some(7.0));
        assert_eq!(Series::new("y", vec![None]).extrema(), None);
        assert_eq!(Series::new("z", vec![Some(2.0)]).extrema(), Some(((0, 2.0), (0, 2.0))));
    }

    #[test]
    fn y_range_covers_baseline() {
        let chart = LineChart {
            title: String::new(),
            xlabel: String::new(),
            ylabel: String::new(),
            x: vec![1.0, 2.0],
            x_precision: 0,
            series: vec![Series::new("a", vec![Some(0.5), None])],
            baseline: Some(Series::new("b", vec![Some(1.0), Some(1.0)])),
            x_step: None,
            y_step: None,
            point_labels: Some(PointLabels { desc: "DPUs (Tasklets)".into(), labels: vec!["4 (16)".into()] }),
            x_ticks_at_points: true,
            legend_left: true,
            size: (100, 100),
        };
        assert_eq!(chart.x_ticks(0.95, 2.05), vec![1.0, 2.0]);
        assert_eq!(chart.legend_label(0, &chart.series[0]), "a [DPUs (Tasklets)]");
        assert_eq!(chart.legend_label(1, &chart.series[0]), "a");
        let (lo, hi) = chart.x_bounds();
        assert!((lo - 0.95).abs() < 1e-12 && (hi - 2.05).abs() < 1e-12);
        assert!((chart.y_max() - 1.1).abs() < 1e-12);
        assert_eq!(chart.points(&chart.series[0]).collect::<Vec<_>>(), vec![(1.0, 0.5)]);
    }
}
