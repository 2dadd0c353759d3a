use crate::checkpoint::load_state;
use crate::composite::CompositeModel;
use crate::config::TrainingConfig;
use crate::plot;
use crate::training::SAMPLE_COUNT;
use burn::backend::NdArray;
use burn::tensor::ElementConversion;
use log::info;
use std::path::Path;
use std::time::Instant;

type MyBackend = NdArray<f32>;

/// `infer`サブコマンドを実行します。
///
/// 保存済みのパラメータを読み込み、計算領域全体で関数を評価してグラフに描画します。
pub fn run(model_path: &Path, figure_dir: &Path, config: TrainingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let device = Default::default();
    config.validate()?;

    info!("推論を実行します - バックエンド: NdArray (CPU)");
    let inference_start = Instant::now();

    info!("保存済みモデルを '{}' からロード中...", model_path.with_extension("mpk").display());
    let model = CompositeModel::<MyBackend>::new(config.layout()?, &config.model, &device);
    let model = load_state(model, model_path)?;

    let (xs, ys) = model.sample(SAMPLE_COUNT);
    let (_, separate) = model.sample_separately(SAMPLE_COUNT);
    let interface_error = model
        .interface_error(config.interface_order)?
        .into_scalar()
        .elem::<f32>();
    let inference_duration = inference_start.elapsed();

    info!(
        "推論が完了しました。評価点数: {}, 部分ネットワーク数: {}",
        xs.len(),
        model.len()
    );
    info!("=> 界面誤差 ({} 階微分まで): {:.6e}", config.interface_order, interface_error);
    info!("=> 推論時間: {:.2?}", inference_duration);

    std::fs::create_dir_all(figure_dir)?;
    plot::plot_solution(&xs, &ys, figure_dir)?;
    plot::plot_separate_models(&xs, &separate, figure_dir)?;
    info!("=> グラフを '{}' に保存しました。", figure_dir.display());

    Ok(())
}
