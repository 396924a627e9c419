//! HTML charts rendered with plotly.

use std::{collections::BTreeMap, fs, path::Path};

use plotly::{
    common::{DashType, Line, Marker, Mode},
    layout::Axis,
    Bar, Plot, Scatter,
};

use crate::error::Result;

const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

pub fn color(i: usize) -> &'static str {
    PALETTE[i % PALETTE.len()]
}

pub struct Figure {
    plot: Plot,
}

impl Figure {
    pub fn new(title: &str, x_title: &str, y_title: &str) -> Self {
        let mut plot = Plot::new();
        plot.set_layout(
            plot.layout()
                .clone()
                .title(format!("<b>{title}</b>"))
                .x_axis(Axis::new().title(x_title.to_string()))
                .y_axis(Axis::new().title(y_title.to_string()).show_grid(true)),
        );
        Self { plot }
    }

    /// A line over the sample index.
    pub fn line(mut self, name: &str, y: &[f64]) -> Self {
        let x: Vec<usize> = (0..y.len()).collect();
        let trace = Scatter::new(x, y.to_vec()).mode(Mode::Lines).name(name);
        self.plot.add_trace(trace);
        self
    }

    pub fn line_xy<X: serde::Serialize + Clone + 'static>(mut self, name: &str, x: Vec<X>, y: Vec<f64>) -> Self {
        let trace = Scatter::new(x, y).mode(Mode::LinesMarkers).name(name);
        self.plot.add_trace(trace);
        self
    }

    /// Highlighted samples, given as `(index, value)`.
    pub fn points(mut self, name: &str, color: &'static str, points: &[(usize, f64)]) -> Self {
        let (x, y): (Vec<usize>, Vec<f64>) = points.iter().copied().unzip();
        let trace = Scatter::new(x, y)
            .mode(Mode::Markers)
            .name(name)
            .marker(Marker::new().color(color).size(8));
        self.plot.add_trace(trace);
        self
    }

    /// A dashed horizontal threshold spanning `len` samples.
    pub fn hline(mut self, name: &str, value: f64, len: usize) -> Self {
        let end = len.saturating_sub(1);
        let trace = Scatter::new(vec![0, end], vec![value, value])
            .mode(Mode::Lines)
            .name(name)
            .line(Line::new().color("#d62728").dash(DashType::Dash));
        self.plot.add_trace(trace);
        self
    }

    /// One marker trace per label, so every cluster gets its own color.
    pub fn labelled<L: Ord + std::fmt::Display>(mut self, values: &[f64], labels: &[L]) -> Self {
        let mut groups: BTreeMap<&L, Vec<(usize, f64)>> = BTreeMap::new();
        for (i, (v, l)) in values.iter().zip(labels).enumerate() {
            groups.entry(l).or_default().push((i, *v));
        }
        for (n, (label, points)) in groups.into_iter().enumerate() {
            self = self.points(&format!("cluster {label}"), color(n), &points);
        }
        self
    }

    pub fn bars(mut self, name: &str, x: Vec<String>, y: Vec<f64>) -> Self {
        let trace = Bar::new(x, y).name(name);
        self.plot.add_trace(trace);
        self
    }

    pub fn write(self, path: &Path) -> Result<()> {
        fs::write(path, self.plot.to_html())?;
        log::info!("wrote plot to {path:?}");
        Ok(())
    }
}

/// Bar chart of `(label, value)` pairs.
pub fn bar_chart(path: &Path, title: &str, x_title: &str, y_title: &str, data: &[(String, f64)]) -> Result<()> {
    let (x, y): (Vec<String>, Vec<f64>) = data.iter().cloned().unzip();
    Figure::new(title, x_title, y_title).bars(y_title, x, y).write(path)
}
