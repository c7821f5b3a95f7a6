// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use crate::currencies::{RebasedTable, Window};
use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use plotters::prelude::*;
use std::path::{Path, PathBuf};

const COLOR_BLUE: RGBColor = RGBColor(59, 130, 246);
const COLOR_EMERALD: RGBColor = RGBColor(16, 185, 129);
const COLOR_AMBER: RGBColor = RGBColor(245, 158, 11);
const COLOR_ROSE: RGBColor = RGBColor(244, 63, 94);
const COLOR_PURPLE: RGBColor = RGBColor(139, 92, 246);
const COLOR_TEAL: RGBColor = RGBColor(20, 184, 166);

const CHART_COLORS: [RGBColor; 6] = [
    COLOR_BLUE,
    COLOR_EMERALD,
    COLOR_AMBER,
    COLOR_ROSE,
    COLOR_PURPLE,
    COLOR_TEAL,
];

pub trait ChartRenderer {
    fn render(&self, table: &RebasedTable, window: &Window, output_dir: &Path) -> Result<PathBuf>;
}

/// Renders PNG line charts with plotters.
pub struct PngLineChart;

impl ChartRenderer for PngLineChart {
    fn render(&self, table: &RebasedTable, window: &Window, output_dir: &Path) -> Result<PathBuf> {
        render_chart(table, window, output_dir)
    }
}

/// `EUR_GBP.png` for a group watching EUR and GBP.
pub fn chart_file_name(currencies: &[String]) -> String {
    format!("{}.png", currencies.join("_"))
}

/// Draw one line per watched currency and return the path of the PNG.
pub fn render_chart(table: &RebasedTable, window: &Window, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let output_path = output_dir.join(chart_file_name(table.currencies()));

    if table.is_empty() {
        anyhow::bail!(
            "No {} rates within the last {} to chart",
            table.currencies().join("/"),
            window
        );
    }

    let series: Vec<(&String, Vec<(NaiveDate, f64)>)> = table
        .currencies()
        .iter()
        .map(|code| (code, table.series(code)))
        .collect();

    let points = series.iter().flat_map(|(_, s)| s.iter());
    let (mut first, mut last) = (NaiveDate::MAX, NaiveDate::MIN);
    let (mut min_rate, mut max_rate) = (f64::INFINITY, f64::NEG_INFINITY);
    for (date, rate) in points {
        first = first.min(*date);
        last = last.max(*date);
        min_rate = min_rate.min(*rate);
        max_rate = max_rate.max(*rate);
    }

    if min_rate > max_rate {
        anyhow::bail!(
            "No {} rates within the last {} to chart",
            table.currencies().join("/"),
            window
        );
    }

    // plotters needs a non-empty range on both axes
    if first == last {
        last = last.checked_add_days(Days::new(1)).unwrap_or(last);
    }
    let padding = if max_rate > min_rate {
        (max_rate - min_rate) * 0.05
    } else {
        max_rate.abs().max(1.0) * 0.05
    };
    let y_range = (min_rate - padding)..(max_rate + padding);

    draw_lines(&output_path, table, window, series, (first, last), y_range)?;
    Ok(output_path)
}

fn draw_lines(
    output_path: &Path,
    table: &RebasedTable,
    window: &Window,
    series: Vec<(&String, Vec<(NaiveDate, f64)>)>,
    (first, last): (NaiveDate, NaiveDate),
    y_range: std::ops::Range<f64>,
) -> Result<()> {
    let root_area = BitMapBackend::new(output_path, (1200, 800)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let caption = format!(
        "{} per 1 {} (last {})",
        table.currencies().join("/"),
        table.base_currency(),
        window
    );

    let mut chart = ChartBuilder::on(&root_area)
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .caption(caption, ("sans-serif", 30))
        .build_cartesian_2d(first..last, y_range)?;

    chart
        .configure_mesh()
        .x_labels(10)
        .x_label_formatter(&|d: &NaiveDate| d.format("%d %b %y").to_string())
        .y_desc(format!("Units per 1 {}", table.base_currency()))
        .draw()?;

    for (i, (code, points)) in series.into_iter().enumerate() {
        let color = CHART_COLORS[i % CHART_COLORS.len()];
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))?
            .label(code.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root_area.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currencies::tests::{aud_table, table, today};
    use crate::currencies::{rebase_on, RebaseRequest, WindowUnit};
    use tempfile::tempdir;

    #[test]
    fn test_chart_file_name() {
        let codes = vec!["EUR".to_string(), "GBP".to_string()];
        assert_eq!(chart_file_name(&codes), "EUR_GBP.png");
        assert_eq!(chart_file_name(&["BRL".to_string()]), "BRL.png");
    }

    #[test]
    fn test_render_chart_with_gap() -> Result<()> {
        let dir = tempdir()?;
        let t = today();
        let rates = table(
            &["AUD", "BRL", "GBP"],
            vec![
                (t - Days::new(2), vec![Some(1.62), Some(6.1), Some(0.86)]),
                (t - Days::new(1), vec![Some(1.58), None, Some(0.84)]),
                (t, vec![Some(1.6), Some(6.0), Some(0.85)]),
            ],
        );
        let request = RebaseRequest::new("AUD", &["BRL", "GBP"], 3, "day")?;
        let rebased = rebase_on(&rates, &request, t)?;
        assert_eq!(rebased.series("BRL").len(), 2);

        let path = render_chart(&rebased, &request.window, &dir.path().join("charts"))?;
        assert_eq!(path, dir.path().join("charts").join("BRL_GBP.png"));
        assert!(std::fs::metadata(&path)?.len() > 0);
        Ok(())
    }

    #[test]
    fn test_render_single_day() -> Result<()> {
        let dir = tempdir()?;
        let request = RebaseRequest::new("AUD", &["BRL"], 1, "day")?;
        let rebased = rebase_on(&aud_table(), &request, today() - Days::new(2))?;
        assert_eq!(rebased.rows().len(), 1);

        let path = render_chart(&rebased, &request.window, dir.path())?;
        assert!(std::fs::metadata(&path)?.len() > 0);
        Ok(())
    }

    #[test]
    fn test_render_empty_window_fails() -> Result<()> {
        let dir = tempdir()?;
        let request = RebaseRequest::new("AUD", &["BRL"], 1, "day")?;
        let far_future = today() + Days::new(365);
        let rebased = rebase_on(&aud_table(), &request, far_future)?;
        assert!(rebased.is_empty());

        let window = Window::new(1, WindowUnit::Day);
        assert!(render_chart(&rebased, &window, dir.path()).is_err());
        Ok(())
    }
}
