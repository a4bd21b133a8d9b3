//! Chart rendering for the pipeline reports: ROC, calibration, and
//! per-predictor response curves, written as SVG.
//!
//! All appearance settings travel in an explicit [`PlotStyle`] passed per
//! call; nothing here touches process-wide state.

use std::path::Path;

use ndarray::ArrayView1;
use plotters::prelude::*;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub font: String,
    pub title_size: u32,
    /// Half-width of the shaded response band, in standard deviations.
    pub band_stds: f64,
}

impl Default for PlotStyle {
    fn default() -> Self {
        PlotStyle {
            width: 800,
            height: 600,
            font: "sans-serif".to_string(),
            title_size: 24,
            band_stds: 2.0,
        }
    }
}

fn plot_err(err: impl std::fmt::Display) -> Error {
    Error::Plot(err.to_string())
}

/// Mean ROC curve over the fixed false-positive-rate grid, with the
/// no-skill diagonal for reference.
pub fn plot_roc(
    path: &Path,
    fpr: &ArrayView1<f64>,
    tpr: &ArrayView1<f64>,
    style: &PlotStyle,
) -> Result<()> {
    let root = SVGBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("ROC curve", (style.font.as_str(), style.title_size))
        .margin(10)
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(0.0..1.0, 0.0..1.0)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc("False positive rate")
        .y_desc("True positive rate")
        .draw()
        .map_err(plot_err)?;
    chart
        .draw_series(LineSeries::new(
            fpr.iter().zip(tpr.iter()).map(|(&x, &y)| (x, y)),
            BLUE.stroke_width(2),
        ))
        .map_err(plot_err)?;
    chart
        .draw_series(LineSeries::new([(0.0, 0.0), (1.0, 1.0)], BLACK.mix(0.4)))
        .map_err(plot_err)?;
    root.present().map_err(plot_err)?;
    Ok(())
}

/// Reliability diagram: mean predicted probability against observed
/// positive fraction per bin, with the identity diagonal.
pub fn plot_calibration(
    path: &Path,
    mean_predicted: &[f64],
    observed: &[f64],
    style: &PlotStyle,
) -> Result<()> {
    let root = SVGBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Calibration curve", (style.font.as_str(), style.title_size))
        .margin(10)
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(0.0..1.0, 0.0..1.0)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc("Mean predicted probability")
        .y_desc("Observed positive fraction")
        .draw()
        .map_err(plot_err)?;
    chart
        .draw_series(LineSeries::new([(0.0, 0.0), (1.0, 1.0)], BLACK.mix(0.4)))
        .map_err(plot_err)?;
    chart
        .draw_series(LineSeries::new(
            mean_predicted.iter().zip(observed).map(|(&x, &y)| (x, y)),
            BLUE.stroke_width(2),
        ))
        .map_err(plot_err)?;
    chart
        .draw_series(
            mean_predicted
                .iter()
                .zip(observed)
                .map(|(&x, &y)| Circle::new((x, y), 4, BLUE.filled())),
        )
        .map_err(plot_err)?;
    root.present().map_err(plot_err)?;
    Ok(())
}

/// Mean response of one continuous predictor with a shaded
/// `band_stds`-standard-deviation band.
pub fn plot_continuous_response(
    path: &Path,
    predictor: &str,
    values: &[f64],
    mean: &ArrayView1<f64>,
    std: &ArrayView1<f64>,
    style: &PlotStyle,
) -> Result<()> {
    if values.len() != mean.len() || values.len() != std.len() {
        return Err(Error::data(format!(
            "response series for '{predictor}' have mismatched lengths"
        )));
    }
    let x_min = values.first().copied().unwrap_or(0.0);
    let x_max = values.last().copied().unwrap_or(1.0);
    let span = if x_max > x_min { x_max - x_min } else { 1.0 };

    let root = SVGBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(predictor, (style.font.as_str(), style.title_size))
        .margin(10)
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(x_min - 0.02 * span..x_max + 0.02 * span, 0.0..1.0)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc(predictor)
        .y_desc("Probability of presence")
        .draw()
        .map_err(plot_err)?;

    let band: Vec<(f64, f64)> = values
        .iter()
        .zip(mean.iter().zip(std.iter()))
        .map(|(&x, (&m, &s))| (x, (m + style.band_stds * s).min(1.0)))
        .chain(
            values
                .iter()
                .zip(mean.iter().zip(std.iter()))
                .rev()
                .map(|(&x, (&m, &s))| (x, (m - style.band_stds * s).max(0.0))),
        )
        .collect();
    chart
        .draw_series(std::iter::once(Polygon::new(band, BLUE.mix(0.2))))
        .map_err(plot_err)?;
    chart
        .draw_series(LineSeries::new(
            values.iter().zip(mean.iter()).map(|(&x, &m)| (x, m)),
            BLUE.stroke_width(2),
        ))
        .map_err(plot_err)?;
    root.present().map_err(plot_err)?;
    Ok(())
}

/// Mean response per class of one categorical predictor, as bars with
/// standard-deviation whiskers.
pub fn plot_categorical_response(
    path: &Path,
    predictor: &str,
    classes: &[f64],
    mean: &ArrayView1<f64>,
    std: &ArrayView1<f64>,
    style: &PlotStyle,
) -> Result<()> {
    if classes.len() != mean.len() || classes.len() != std.len() {
        return Err(Error::data(format!(
            "response series for '{predictor}' have mismatched lengths"
        )));
    }
    let labels: Vec<String> = classes.iter().map(|c| c.to_string()).collect();
    let root = SVGBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(predictor, (style.font.as_str(), style.title_size))
        .margin(10)
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(-0.5..classes.len() as f64 - 0.5, 0.0..1.0)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc(predictor)
        .y_desc("Probability of presence")
        .x_labels(classes.len())
        .x_label_formatter(&|v| {
            let index = v.round() as i64;
            if index >= 0 && (index as usize) < labels.len() && (v - index as f64).abs() < 0.25 {
                labels[index as usize].clone()
            } else {
                String::new()
            }
        })
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(mean.iter().enumerate().map(|(index, &m)| {
            Rectangle::new(
                [(index as f64 - 0.35, 0.0), (index as f64 + 0.35, m)],
                BLUE.mix(0.5).filled(),
            )
        }))
        .map_err(plot_err)?;
    chart
        .draw_series(mean.iter().zip(std.iter()).enumerate().map(
            |(index, (&m, &s))| {
                ErrorBar::new_vertical(
                    index as f64,
                    (m - s).max(0.0),
                    m,
                    (m + s).min(1.0),
                    BLACK.filled(),
                    12,
                )
            },
        ))
        .map_err(plot_err)?;
    root.present().map_err(plot_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn roc_chart_is_written_as_svg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ROC_Curve.svg");
        let fpr = Array1::linspace(0.0, 1.0, 101);
        let tpr = fpr.mapv(|v: f64| v.sqrt());
        plot_roc(&path, &fpr.view(), &tpr.view(), &PlotStyle::default()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("<?xml") || text.contains("<svg"));
    }

    #[test]
    fn response_charts_render_both_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let style = PlotStyle::default();
        let values: Vec<f64> = (0..99).map(|i| i as f64).collect();
        let mean = Array1::from_elem(99, 0.5);
        let std = Array1::from_elem(99, 0.1);
        plot_continuous_response(
            &dir.path().join("elev.svg"),
            "elev",
            &values,
            &mean.view(),
            &std.view(),
            &style,
        )
        .unwrap();

        let classes = [1.0, 2.0, 5.0];
        let mean = ndarray::array![0.2, 0.7, 0.4];
        let std = ndarray::array![0.05, 0.1, 0.02];
        plot_categorical_response(
            &dir.path().join("soil.svg"),
            "soil",
            &classes,
            &mean.view(),
            &std.view(),
            &style,
        )
        .unwrap();
        assert!(dir.path().join("elev.svg").exists());
        assert!(dir.path().join("soil.svg").exists());
    }

    #[test]
    fn mismatched_series_lengths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mean = ndarray::array![0.5];
        let std = ndarray::array![0.1, 0.2];
        let err = plot_continuous_response(
            &dir.path().join("bad.svg"),
            "bad",
            &[1.0],
            &mean.view(),
            &std.view(),
            &PlotStyle::default(),
        );
        assert!(err.is_err());
    }
}
