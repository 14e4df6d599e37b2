// src/chart.rs
// 2x3 panel SVG: rows = cumulative / monthly, columns = blue chest / hihi / compound.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::analysis::{binomial_pmf, binomial_stddev, DropAnalyzer};

const SIZE: (u32, u32) = (1800, 1000);
const BAR: RGBColor = RGBColor(70, 130, 180); // steelblue
const EXPECTED: RGBColor = RGBColor(0, 128, 0);
const ACTUAL: RGBColor = RGBColor(220, 20, 20);

/// One panel's inputs.
struct Panel<'a> {
    title: &'a str,
    n: u64,
    p: f64,
    actual: u64,
    expected: f64,
}

/// `drop_distribution_20260120.svg` style names.
pub fn output_file_name(prefix: &str, ext: &str, date: NaiveDate) -> String {
    format!("{}_{}.{}", prefix, date.format("%Y%m%d"), ext)
}

/// Create `dir` if needed and return the dated chart path inside it.
pub fn output_path(dir: &Path, date: NaiveDate) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating output directory {}", dir.display()))?;
    Ok(dir.join(output_file_name("drop_distribution", "svg", date)))
}

/// Bars drawn for Binomial(n, p): mean +/- 4 sigma, clipped to [0, n].
pub fn plot_range(n: u64, p: f64) -> (u64, u64) {
    let mu = n as f64 * p;
    let sigma = binomial_stddev(n, p);
    let lo = (mu - 4.0 * sigma).max(0.0).floor() as u64;
    let hi = ((mu + 4.0 * sigma).floor() as u64).min(n);
    (lo, hi.max(lo))
}

pub fn render(cumulative: &DropAnalyzer, monthly: &DropAnalyzer, out: &Path) -> Result<()> {
    draw(cumulative, monthly, out).map_err(|e| anyhow::anyhow!("drawing {}: {e}", out.display()))?;
    tracing::info!("chart saved to {}", out.display());
    Ok(())
}

fn draw(cumulative: &DropAnalyzer, monthly: &DropAnalyzer, out: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let root = SVGBackend::new(out, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (labels, grid) = root.split_horizontally(40);
    let rows = grid.split_evenly((2, 1));
    let label_rows = labels.split_evenly((2, 1));

    for ((row_area, label_area), (name, analyzer)) in rows
        .iter()
        .zip(label_rows.iter())
        .zip([("Cumulative", cumulative), ("Monthly", monthly)])
    {
        label_area.draw(&Text::new(
            name,
            (8, 20),
            ("sans-serif", 20).into_font().style(FontStyle::Bold),
        ))?;
        draw_row(row_area, analyzer)?;
    }

    root.present()?;
    Ok(())
}

fn draw_row(area: &DrawingArea<SVGBackend, Shift>, a: &DropAnalyzer) -> Result<(), Box<dyn std::error::Error>> {
    let panels = area.split_evenly((1, 3));
    let s = &a.sample;

    let blue = a.blue_chest_stats();
    draw_panel(&panels[0], &Panel {
        title: "Blue chest drops",
        n: s.trials,
        p: a.blue_chest_prob,
        actual: s.blue_chest_count,
        expected: blue.expected,
    })?;

    if s.blue_chest_count > 0 {
        let hihi = a.hihi_stats();
        draw_panel(&panels[1], &Panel {
            title: "Hihi drops from blue chests",
            n: s.blue_chest_count,
            p: a.hihi_prob,
            actual: s.hihi_count,
            expected: hihi.expected,
        })?;
    } else {
        draw_placeholder(&panels[1], "Hihi drops from blue chests", "no blue chest drops yet")?;
    }

    let combined = a.combined_stats();
    draw_panel(&panels[2], &Panel {
        title: "Compound (blue chest and hihi)",
        n: s.trials,
        p: a.combined_probability(),
        actual: s.hihi_count,
        expected: combined.expected,
    })?;
    Ok(())
}

fn draw_panel(area: &DrawingArea<SVGBackend, Shift>, panel: &Panel) -> Result<(), Box<dyn std::error::Error>> {
    let (lo, hi) = plot_range(panel.n, panel.p);
    let bars: Vec<(u64, f64)> = (lo..=hi).map(|k| (k, binomial_pmf(k, panel.n, panel.p))).collect();
    let y_max = bars.iter().map(|(_, y)| *y).fold(0.0f64, f64::max).max(1e-6) * 1.1;

    // keep both markers visible even when they fall outside the bars
    let x_min = (lo as f64).min(panel.expected).min(panel.actual as f64) - 0.5;
    let x_max = (hi as f64).max(panel.expected).max(panel.actual as f64) + 0.5;

    let mut chart = ChartBuilder::on(area)
        .caption(panel.title, ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(55)
        .build_cartesian_2d(x_min..x_max, 0.0..y_max)?;

    chart
        .configure_mesh()
        .x_desc("drops")
        .y_desc("probability")
        .draw()?;

    chart
        .draw_series(bars.iter().map(|&(k, y)| {
            let x = k as f64;
            Rectangle::new([(x - 0.4, 0.0), (x + 0.4, y)], BAR.mix(0.6).filled())
        }))?
        .label("distribution")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], BAR.mix(0.6).filled()));

    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(panel.expected, 0.0), (panel.expected, y_max)],
            EXPECTED.stroke_width(2),
        )))?
        .label(format!("expected: {:.1}", panel.expected))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], EXPECTED.stroke_width(2)));

    let actual = panel.actual as f64;
    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(actual, 0.0), (actual, y_max)],
            ACTUAL.stroke_width(2),
        )))?
        .label(format!("actual: {}", panel.actual))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], ACTUAL.stroke_width(2)));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK.mix(0.3))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;
    Ok(())
}

fn draw_placeholder(
    area: &DrawingArea<SVGBackend, Shift>,
    title: &str,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let area = area.titled(title, ("sans-serif", 18))?;
    let (w, h) = area.dim_in_pixel();
    let style = TextStyle::from(("sans-serif", 18).into_font())
        .pos(plotters::style::text_anchor::Pos::new(
            plotters::style::text_anchor::HPos::Center,
            plotters::style::text_anchor::VPos::Center,
        ));
    area.draw(&Text::new(message, ((w / 2) as i32, (h / 2) as i32), style))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DropCountSample;

    #[test]
    fn file_name_carries_date() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        assert_eq!(output_file_name("drop_distribution", "svg", d), "drop_distribution_20260120.svg");
    }

    #[test]
    fn range_is_four_sigma_clipped() {
        // mu = 100, sigma ~ 9.49
        assert_eq!(plot_range(1000, 0.1), (62, 137));
        // tiny n clips at both ends
        assert_eq!(plot_range(3, 0.5), (0, 3));
        assert_eq!(plot_range(0, 0.3), (0, 0));
    }

    #[test]
    fn renders_svg_for_both_windows() {
        let dir = std::env::temp_dir().join(format!("grablu_chart_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let out = output_path(&dir, date).unwrap();

        let cumulative = DropAnalyzer::new(DropCountSample::new(4000, 95, 4).unwrap(), 0.0245, 0.0365);
        let monthly = DropAnalyzer::new(DropCountSample::new(120, 0, 0).unwrap(), 0.0245, 0.0365);
        render(&cumulative, &monthly, &out).unwrap();

        let svg = std::fs::read_to_string(&out).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("no blue chest drops yet"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
