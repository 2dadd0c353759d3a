//! # 描画
//!
//! 損失の推移、学習済み関数、領域分割の図を PNG に出力します。
//! 学習には影響しない観測用の機能です。

use crate::convergence::DomainSeries;
use crate::domain::DomainLayout;
use plotters::prelude::*;
use std::path::Path;

type PlotResult = Result<(), Box<dyn std::error::Error>>;

const PALETTE: [RGBColor; 6] = [RED, BLUE, GREEN, MAGENTA, CYAN, BLACK];

/// 部分領域ひとつ分の損失の推移を対数スケールで描画します。
pub fn plot_convergence(series: &DomainSeries, domain: usize, figure_dir: &Path) -> PlotResult {
    let path = figure_dir.join(format!("convergence_model{domain}.png"));
    let curves = [
        ("Loss_B", &series.boundary),
        ("Loss_F", &series.residual),
        ("Loss_I", &series.interface),
        ("Loss", &series.total),
    ];
    let log = |v: f32| v.max(f32::MIN_POSITIVE).log10();
    let (min_log_loss, max_log_loss) = curves
        .iter()
        .flat_map(|(_, values)| values.iter().map(|&v| log(v)))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !min_log_loss.is_finite() {
        return Ok(());
    }

    let root = BitMapBackend::new(&path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Loss History (model {domain})"), ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0..series.len(), (min_log_loss - 0.5)..(max_log_loss + 0.5))?;
    chart
        .configure_mesh()
        .y_desc("Loss (log10 scale)")
        .x_desc("Epochs")
        .draw()?;
    for ((label, values), color) in curves.iter().zip(PALETTE) {
        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, &v)| (i, log(v))),
                &color,
            ))?
            .label(*label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
    }
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// 1本または複数の曲線 `(ラベル, 値)` を同じ座標軸に描画します。
pub fn plot_curves(xs: &[f32], curves: &[(String, Vec<f32>)], caption: &str, path: &Path) -> PlotResult {
    let (Some(&x_min), Some(&x_max)) = (xs.first(), xs.last()) else {
        return Ok(());
    };
    let (y_min, y_max) = curves
        .iter()
        .flat_map(|(_, ys)| ys.iter().copied())
        .filter(|y| y.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), y| (lo.min(y), hi.max(y)));
    if !y_min.is_finite() {
        return Ok(());
    }
    let margin = ((y_max - y_min) * 0.1).max(1e-6);

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, (y_min - margin)..(y_max + margin))?;
    chart.configure_mesh().x_desc("x").y_desc("u").draw()?;
    for ((label, ys), color) in curves.iter().zip(PALETTE.iter().cycle()) {
        let color = *color;
        chart
            .draw_series(LineSeries::new(xs.iter().copied().zip(ys.iter().copied()), &color))?
            .label(label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
    }
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// 学習済みの関数を `model.png` に描画します。
pub fn plot_solution(xs: &[f32], ys: &[f32], figure_dir: &Path) -> PlotResult {
    plot_curves(
        xs,
        &[("CPINN".to_string(), ys.to_vec())],
        "Learned Solution",
        &figure_dir.join("model.png"),
    )
}

/// 部分ネットワークそれぞれの出力を `separate_models.png` に描画します。
pub fn plot_separate_models(xs: &[f32], ys: &[Vec<f32>], figure_dir: &Path) -> PlotResult {
    let curves: Vec<(String, Vec<f32>)> = ys
        .iter()
        .enumerate()
        .map(|(i, values)| (format!("Model{}", i + 1), values.clone()))
        .collect();
    plot_curves(xs, &curves, "Sub-models", &figure_dir.join("separate_models.png"))
}

/// 部分領域ごとの混合重みを `windows.png` に描画します。
pub fn plot_windows(layout: &DomainLayout, figure_dir: &Path) -> PlotResult {
    let (lb, rb) = layout.global_bounds();
    let xs: Vec<f32> = (0..=1000).map(|i| lb + (rb - lb) * i as f32 / 1000.0).collect();
    let curves: Vec<(String, Vec<f32>)> = (0..layout.len())
        .map(|d| {
            let ys = xs.iter().map(|&x| layout.window_weight(d, x)).collect();
            (format!("Window{}", d + 1), ys)
        })
        .collect();
    plot_curves(&xs, &curves, "Blending Windows", &figure_dir.join("windows.png"))
}

/// 領域分割の様子を `domains.png` に描画します。部分領域を帯、継ぎ目を縦線で表します。
pub fn plot_partition(layout: &DomainLayout, figure_dir: &Path) -> PlotResult {
    let path = figure_dir.join("domains.png");
    let (lb, rb) = layout.global_bounds();
    let pad = (rb - lb) * 0.05;
    let rows = layout.len() as f32;

    let root = BitMapBackend::new(&path, (800, 300)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Domains", ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(30)
        .build_cartesian_2d((lb - pad)..(rb + pad), 0f32..rows)?;
    chart.configure_mesh().disable_y_mesh().x_desc("x").draw()?;
    for (domain, color) in layout.domains().iter().zip(PALETTE.iter().cycle()) {
        let row = domain.index as f32;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(domain.lower_bound, row + 0.2), (domain.upper_bound, row + 0.8)],
            color.mix(0.4).filled(),
        )))?;
    }
    for &seam in layout.seams() {
        chart.draw_series(LineSeries::new(vec![(seam, 0.0), (seam, rows)], &BLACK))?;
    }
    root.present()?;
    Ok(())
}
