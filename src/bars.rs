use plotters::chart::SeriesLabelPosition;
use plotters::coord::combinators::BindKeyPoints;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::plot::{axis_ticks, color, legend, tick_label, Chart, DrawResult, Series, FONT};

const BAR_WIDTH: f64 = 0.7;

/// Stacked bars, one column per category, layers bottom-up in order.
#[derive(Debug, Clone)]
pub struct BarChart {
    pub title: String,
    pub xlabel: String,
    pub ylabel: String,
    pub categories: Vec<String>,
    pub layers: Vec<Series>,
    /// Dashed horizontal reference (label, value).
    pub reference: Option<(String, f64)>,
    pub y_step: Option<f64>,
    pub size: (u32, u32),
}

impl BarChart {
    /// Height of each stacked column.
    pub fn stack_heights(&self) -> Vec<f64> {
        (0..self.categories.len())
            .map(|i| self.layers.iter().filter_map(|l| l.values.get(i).copied().flatten()).sum())
            .collect()
    }

    fn y_max(&self) -> f64 {
        let hi = self
            .stack_heights()
            .into_iter()
            .chain(self.reference.iter().map(|r| r.1))
            .fold(0f64, f64::max);
        if hi > 0.0 { hi * 1.1 } else { 1.0 }
    }

    /// Bar centres, where the category labels go.
    fn category_ticks(&self) -> Vec<f64> {
        (0..self.categories.len()).map(|i| i as f64 + 0.5).collect()
    }

    /// Rectangles for layer `idx` as ((left, bottom), (right, top)).
    fn layer_boxes(&self, idx: usize) -> Vec<((f64, f64), (f64, f64))> {
        let left_pad = (1.0 - BAR_WIDTH) / 2.0;
        (0..self.categories.len())
            .filter_map(|i| {
                let v = self.layers[idx].values.get(i).copied().flatten()?;
                let bottom: f64 = self.layers[..idx]
                    .iter()
                    .filter_map(|l| l.values.get(i).copied().flatten())
                    .sum();
                let x = i as f64 + left_pad;
                Some(((x, bottom), (x + BAR_WIDTH, bottom + v)))
            })
            .collect()
    }
}

impl Chart for BarChart {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn draw<'a, DB: DrawingBackend + 'a>(&self, root: DrawingArea<DB, Shift>) -> DrawResult<'a> {
        root.fill(&WHITE)?;
        let n = self.categories.len();
        let y_hi = self.y_max();
        let y_ticks = axis_ticks(0.0, y_hi, self.y_step, 10);
        let y_labels = y_ticks.len();

        let mut chart = ChartBuilder::on(&root)
            .caption(&self.title, (FONT, 24).into_font())
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(65)
            .build_cartesian_2d(
                (0f64..n as f64).with_key_points(self.category_ticks()),
                (0f64..y_hi).with_key_points(y_ticks),
            )?;

        let categories = &self.categories;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .light_line_style(WHITE)
            .bold_line_style(BLACK.mix(0.15))
            .x_labels(n.max(1))
            .y_labels(y_labels)
            .x_label_formatter(&|x| categories.get(x.floor() as usize).cloned().unwrap_or_default())
            .y_label_formatter(&|y| tick_label(*y))
            .x_desc(&self.xlabel)
            .y_desc(&self.ylabel)
            .label_style((FONT, 14))
            .axis_desc_style((FONT, 16))
            .draw()?;

        for (idx, layer) in self.layers.iter().enumerate() {
            let c = color(idx);
            chart
                .draw_series(self.layer_boxes(idx).into_iter().map(|(lo, hi)| Rectangle::new([lo, hi], c.filled())))?
                .label(layer.label.as_str())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], c.filled()));
        }

        if let Some((label, value)) = &self.reference {
            chart
                .draw_series(DashedLineSeries::new(
                    vec![(0.0, *value), (n as f64, *value)],
                    10,
                    6,
                    BLACK.stroke_width(2),
                ))?
                .label(label.as_str())
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));
        }

        legend(&mut chart, SeriesLabelPosition::UpperRight)?;
        root.present()?;
        Ok(())
    }
}
