#![cfg(feature = "web")]
use crate::error::AppError;
use crate::loader::{ColumnKind, Table, Value};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};

/// Text drawn instead of a chart when the plot kind is not recognised
pub const INVALID_PLOT_TEXT: &str = "Invalid Plot Type Selected";

/// Chart kinds offered on the visualize page
///
/// Anything that isn't `bar`, `line` or `scatter` maps to [`PlotKind::Invalid`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlotKind {
    /// Mean of the y column for each x category, drawn as bars
    Bar,

    /// Mean of the y column for each distinct x, joined by a line
    Line,

    /// One point per row
    Scatter,

    /// Unknown kind; renders only an error message
    Invalid,
}

impl PlotKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "bar" => PlotKind::Bar,
            "line" => PlotKind::Line,
            "scatter" => PlotKind::Scatter,
            _ => PlotKind::Invalid,
        }
    }

    fn title_prefix(self) -> &'static str {
        match self {
            PlotKind::Bar => "Bar Plot",
            PlotKind::Line => "Line Plot",
            PlotKind::Scatter => "Scatter Plot",
            PlotKind::Invalid => "",
        }
    }
}

/// Configuration options for graph generation
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the graph
    pub title: String,

    /// Label for the X-axis
    pub x_label: String,

    /// Label for the Y-axis
    pub y_label: String,

    /// Width of the graph in pixels
    pub width: u32,

    /// Height of the graph in pixels
    pub height: u32,

    pub kind: PlotKind,
}

impl GraphOptions {
    /// Options for plotting `y_col` against `x_col`, titled after the plot kind.
    pub fn for_columns(kind: PlotKind, x_col: &str, y_col: &str, size: (u32, u32)) -> Self {
        Self {
            title: format!("{}: {} vs {}", kind.title_prefix(), x_col, y_col),
            x_label: x_col.to_string(),
            y_label: y_col.to_string(),
            width: size.0,
            height: size.1,
            kind,
        }
    }
}

/// Data pulled out of a table, ready to draw
#[derive(Debug, Clone, PartialEq)]
enum Series {
    /// Continuous x axis
    Numeric(Vec<(f64, f64)>),

    /// One slot per label; points carry the slot index
    Categorical {
        labels: Vec<String>,
        points: Vec<(u32, f64)>,
    },
}

/// Render a chart of `y_col` against `x_col` into the image at `path`
///
/// The image is overwritten on every call. For [`PlotKind::Invalid`] the columns are
/// not looked at and the image only carries a red error message.
///
/// # Errors
/// * Either column is missing from the table
/// * `y_col` is not numeric
/// * The image cannot be rendered or written
///
/// # Examples
/// ```no_run
/// use dataview::graph::{PlotKind, generate_plot};
/// use dataview::loader::load_table;
///
/// let table = load_table("static/uploads/data.csv").unwrap();
/// let path = generate_plot(&table, "month", "sales", PlotKind::Bar, "static/plot.png", (800, 600));
/// ```
pub fn generate_plot(
    table: &Table,
    x_col: &str,
    y_col: &str,
    kind: PlotKind,
    path: impl AsRef<Path>,
    size: (u32, u32),
) -> Result<PathBuf, AppError> {
    let path = path.as_ref();
    let options = GraphOptions::for_columns(kind, x_col, y_col, size);

    let drawn = match kind {
        PlotKind::Invalid => draw_invalid(path, &options),
        PlotKind::Bar | PlotKind::Line | PlotKind::Scatter => {
            let series = extract_series(table, x_col, y_col, kind)?;
            match series {
                Series::Numeric(points) => draw_numeric(path, &points, &options),
                Series::Categorical { labels, points } => {
                    draw_categorical(path, &labels, &points, &options)
                }
            }
        }
    };
    drawn.map_err(|e| AppError::Plot(e.to_string()))?;

    Ok(path.to_path_buf())
}

fn extract_series(
    table: &Table,
    x_col: &str,
    y_col: &str,
    kind: PlotKind,
) -> Result<Series, AppError> {
    let x_idx = table
        .column_index(x_col)
        .ok_or_else(|| AppError::UnknownColumn(x_col.to_string()))?;
    let y_idx = table
        .column_index(y_col)
        .ok_or_else(|| AppError::UnknownColumn(y_col.to_string()))?;
    if !table.kinds()[y_idx].is_numeric() {
        return Err(AppError::NonNumericColumn(y_col.to_string()));
    }

    let pairs: Vec<(&Value, f64)> = table
        .rows()
        .iter()
        .filter(|row| !row[x_idx].is_missing())
        .filter_map(|row| row[y_idx].as_f64().map(|y| (&row[x_idx], y)))
        .collect();

    let x_numeric = table.kinds()[x_idx].is_numeric();
    let series = match (kind, x_numeric) {
        (PlotKind::Scatter, true) => Series::Numeric(
            pairs
                .iter()
                .filter_map(|(x, y)| x.as_f64().map(|x| (x, *y)))
                .collect(),
        ),
        (PlotKind::Line, true) => {
            let mut points: Vec<(f64, f64)> = group_means(
                pairs
                    .iter()
                    .filter_map(|(x, y)| x.as_f64().map(|x| (x.to_bits(), *y))),
            )
            .into_iter()
            .map(|(bits, y)| (f64::from_bits(bits), y))
            .collect();
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            Series::Numeric(points)
        }
        (PlotKind::Scatter, false) => {
            let labels = category_labels(&pairs, table.kinds()[x_idx]);
            let slots = slot_lookup(&labels);
            let points = pairs
                .iter()
                .map(|(x, y)| Ok((slot_of(&slots, x)?, *y)))
                .collect::<Result<Vec<_>, AppError>>()?;
            Series::Categorical { labels, points }
        }
        _ => {
            let labels = category_labels(&pairs, table.kinds()[x_idx]);
            let slots = slot_lookup(&labels);
            let slotted = pairs
                .iter()
                .map(|(x, y)| Ok((slot_of(&slots, x)?, *y)))
                .collect::<Result<Vec<_>, AppError>>()?;
            let mut points = group_means(slotted.into_iter());
            points.sort_by_key(|(slot, _)| *slot);
            Series::Categorical { labels, points }
        }
    };

    Ok(series)
}

// Axis label for an x value; negative zero shares the slot of zero
fn category_label(value: &Value) -> String {
    match value {
        Value::Float(v) if *v == 0.0 => Value::Float(0.0).to_string(),
        other => other.to_string(),
    }
}

// Distinct x labels: numeric columns ascending, text in order of first appearance
fn category_labels(pairs: &[(&Value, f64)], kind: ColumnKind) -> Vec<String> {
    let mut seen: Vec<(String, &Value)> = Vec::new();
    for (x, _) in pairs {
        let label = category_label(x);
        if !seen.iter().any(|(known, _)| *known == label) {
            seen.push((label, *x));
        }
    }
    if kind.is_numeric() {
        seen.sort_by(|(_, a), (_, b)| {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.total_cmp(&b)
        });
    }
    seen.into_iter().map(|(label, _)| label).collect()
}

fn slot_of(slots: &HashMap<String, u32>, value: &Value) -> Result<u32, AppError> {
    let label = category_label(value);
    slots
        .get(&label)
        .copied()
        .ok_or_else(|| AppError::Plot(format!("no axis slot for category `{}`", label)))
}

fn slot_lookup(labels: &[String]) -> HashMap<String, u32> {
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| (label.clone(), i as u32))
        .collect()
}

// Mean of y per key, keys in order of first appearance
fn group_means<K: Copy + Eq + std::hash::Hash>(
    values: impl Iterator<Item = (K, f64)>,
) -> Vec<(K, f64)> {
    let mut order: Vec<K> = Vec::new();
    let mut sums: HashMap<K, (f64, usize)> = HashMap::new();
    for (key, y) in values {
        let entry = sums.entry(key).or_insert_with(|| {
            order.push(key);
            (0.0, 0)
        });
        entry.0 += y;
        entry.1 += 1;
    }
    order
        .into_iter()
        .map(|key| {
            let (sum, count) = sums[&key];
            (key, sum / count as f64)
        })
        .collect()
}

// Padded axis range; a flat or empty range is widened by one unit each way
fn axis_range(values: impl Iterator<Item = f64>, include_zero: bool) -> std::ops::Range<f64> {
    let (mut lo, mut hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if include_zero {
        lo = lo.min(0.0);
        hi = hi.max(0.0);
    }
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    if lo == hi {
        return lo - 1.0..hi + 1.0;
    }
    let pad = (hi - lo) * 0.05;
    let lo = if include_zero && lo == 0.0 { 0.0 } else { lo - pad };
    let hi = if include_zero && hi == 0.0 { 0.0 } else { hi + pad };
    lo..hi
}

fn draw_numeric(
    path: &Path,
    points: &[(f64, f64)],
    options: &GraphOptions,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let x_range = axis_range(points.iter().map(|(x, _)| *x), false);
    let y_range = axis_range(points.iter().map(|(_, y)| *y), false);

    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, ("sans-serif", 24).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .draw()?;

    match options.kind {
        PlotKind::Line => {
            chart.draw_series(LineSeries::new(points.iter().copied(), &BLUE))?;
        }
        _ => {
            chart.draw_series(
                points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 4, BLUE.filled())),
            )?;
        }
    }

    root.present()?;
    Ok(())
}

fn draw_categorical(
    path: &Path,
    labels: &[String],
    points: &[(u32, f64)],
    options: &GraphOptions,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let slots = (labels.len() as u32).max(1);
    let y_range = axis_range(
        points.iter().map(|(_, y)| *y),
        options.kind == PlotKind::Bar,
    );

    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, ("sans-serif", 24).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d((0u32..slots).into_segmented(), y_range)?;

    let label_for = |value: &SegmentValue<u32>| match value {
        SegmentValue::CenterOf(slot) => labels.get(*slot as usize).cloned().unwrap_or_default(),
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len().max(1))
        .x_label_formatter(&label_for)
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .draw()?;

    match options.kind {
        PlotKind::Bar => {
            chart.draw_series(
                Histogram::vertical(&chart)
                    .style(BLUE.mix(0.7).filled())
                    .margin(10)
                    .data(points.iter().copied()),
            )?;
        }
        PlotKind::Line => {
            chart.draw_series(LineSeries::new(
                points
                    .iter()
                    .map(|&(slot, y)| (SegmentValue::CenterOf(slot), y)),
                &BLUE,
            ))?;
        }
        _ => {
            chart.draw_series(points.iter().map(|&(slot, y)| {
                Circle::new((SegmentValue::CenterOf(slot), y), 4, BLUE.filled())
            }))?;
        }
    }

    root.present()?;
    Ok(())
}

fn draw_invalid(path: &Path, options: &GraphOptions) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let style = TextStyle::from(("sans-serif", 28).into_font())
        .color(&RED)
        .pos(Pos::new(HPos::Center, VPos::Center));
    let center = ((options.width / 2) as i32, (options.height / 2) as i32);
    root.draw(&Text::new(INVALID_PLOT_TEXT, center, style))?;

    root.present()?;
    Ok(())
}
