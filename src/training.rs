//! # 学習
//!
//! 部分領域ごとに独立した最適化器とスケジューラで複合モデルを学習し、
//! 全体の損失が改善したときだけチェックポイントを保存します。

use crate::boundary::route_conditions;
use crate::checkpoint::{BestCheckpoint, CheckpointRecord, FileCheckpointer, Persistence};
use crate::composite::CompositeModel;
use crate::config::TrainingConfig;
use crate::convergence::{ConvergenceTracker, LossComponents};
use crate::derivative::{Differentiable, InputPoints};
use crate::error::{CpinnError, Result};
use crate::model::{SubModel, gradients_are_finite};
use crate::pinn::{BoundaryBatch, boundary_loss, physics_loss};
use crate::plot;
use crate::points::{PointGenerator, UniformPointGenerator};
use crate::scheduler::PlateauScheduler;
use burn::backend::{Autodiff, NdArray};
use burn::config::Config;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

type MyBackend = Autodiff<NdArray<f32>>;

/// 描画に使う等間隔格子の点数
pub const SAMPLE_COUNT: usize = 2001;

/// 学習の状態遷移。`Converged` と `Terminated` は終端状態です。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainingState {
    Initializing,
    Epoch(usize),
    Converged { epoch: usize },
    Terminated { epoch: usize },
}

/// 1エポックの結果。
#[derive(Clone, Debug)]
pub struct EpochReport {
    pub epoch: usize,
    /// 部分領域ごとの損失の内訳（ミニバッチ平均）
    pub domains: Vec<LossComponents>,
    /// 部分領域の損失の合計
    pub aggregate: f32,
    /// 重みを掛ける前の界面誤差
    pub interface_error: f32,
    pub learning_rates: Vec<f64>,
    /// 保存した場合はチェックポイントのパス
    pub checkpoint: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct TrainingOutcome {
    pub state: TrainingState,
    pub best: Option<CheckpointRecord>,
}

/// 部分領域ひとつ分の学習データ。
struct DomainData<B: Backend> {
    boundary: Vec<BoundaryBatch<B>>,
    collocation: Vec<InputPoints<B>>,
}

/// 部分領域ひとつ分の最適化器とスケジューラ。
struct DomainTrainer<B: Backend, O> {
    data: DomainData<B>,
    optimizer: O,
    scheduler: PlateauScheduler,
}

/// 部分領域ごとの学習を順に回し、全体の最良モデルを保存する学習器。
pub struct Orchestrator<B: AutodiffBackend, O, P> {
    config: TrainingConfig,
    device: B::Device,
    model: CompositeModel<B>,
    trainers: Vec<DomainTrainer<B, O>>,
    checkpoint: BestCheckpoint<P>,
    state: TrainingState,
}

impl<B, O, P> Orchestrator<B, O, P>
where
    B: AutodiffBackend,
    O: Optimizer<SubModel<B>, B>,
    P: Persistence<B>,
{
    /// 領域分割、学習点の振り分け、部分領域ごとの最適化器の構築を行います。
    pub fn new<G, F>(
        config: TrainingConfig,
        device: B::Device,
        generator: &mut G,
        persistence: P,
        mut make_optimizer: F,
    ) -> Result<Self>
    where
        G: PointGenerator + ?Sized,
        F: FnMut() -> O,
    {
        config.validate()?;
        let layout = config.layout()?;
        let model = CompositeModel::new(layout.clone(), &config.model, &device);

        // 境界点は全体で一度だけ生成し、位置を含む部分領域すべてに配る
        let conditions = config.effective_conditions();
        let samples: Vec<_> = conditions
            .iter()
            .map(|c| {
                let count = c.sample_count_or(config.boundary_sample_size);
                generator.boundary_points(count, c.location, c.target_value)
            })
            .collect();
        let routes = route_conditions(&conditions, layout.domains());

        let mut trainers = Vec::with_capacity(layout.len());
        for (domain, route) in layout.domains().iter().zip(routes) {
            let boundary = route
                .iter()
                .map(|&j| BoundaryBatch {
                    points: samples[j].input_points(&device),
                    targets: samples[j].target_tensor(&device),
                    derivative_order: conditions[j].derivative_order,
                })
                .collect();
            let collocation = generator
                .collocation_points(
                    config.collocation_sample_size,
                    domain.lower_bound,
                    domain.upper_bound,
                )
                .chunks(config.batch_size)
                .iter()
                .map(|chunk| chunk.input_points(&device))
                .collect::<Vec<_>>();

            info!(
                "部分領域 {}: [{:.4}, {:.4}] 境界条件 {:?}, ミニバッチ {} 個",
                domain.index,
                domain.lower_bound,
                domain.upper_bound,
                route,
                collocation.len()
            );
            trainers.push(DomainTrainer {
                data: DomainData {
                    boundary,
                    collocation,
                },
                optimizer: make_optimizer(),
                scheduler: config.scheduler.init(config.learning_rate),
            });
        }

        Ok(Self {
            config,
            device,
            model,
            trainers,
            checkpoint: BestCheckpoint::new(persistence),
            state: TrainingState::Initializing,
        })
    }

    pub fn model(&self) -> &CompositeModel<B> {
        &self.model
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn best(&self) -> Option<CheckpointRecord> {
        self.checkpoint.best()
    }

    pub fn persistence(&self) -> &P {
        self.checkpoint.persistence()
    }

    /// 収束するかエポック数の上限に達するまで学習します。
    ///
    /// 各エポックの終わりに `on_epoch` が結果、モデル、それまでの損失の記録を受け取ります。
    pub fn run<F>(&mut self, tracker: &mut ConvergenceTracker, mut on_epoch: F) -> Result<TrainingOutcome>
    where
        F: FnMut(&EpochReport, &CompositeModel<B>, &ConvergenceTracker),
    {
        let mut last_epoch = 0;
        for epoch in 1..=self.config.epoch_budget {
            self.state = TrainingState::Epoch(epoch);
            let report = self.run_epoch(epoch, tracker)?;
            on_epoch(&report, &self.model, &*tracker);
            last_epoch = epoch;
            if report.aggregate < self.config.tolerance {
                self.state = TrainingState::Converged { epoch };
                info!("全体の損失が許容値 {:e} を下回りました", self.config.tolerance);
                break;
            }
        }
        if !matches!(self.state, TrainingState::Converged { .. }) {
            self.state = TrainingState::Terminated { epoch: last_epoch };
        }
        Ok(TrainingOutcome {
            state: self.state,
            best: self.checkpoint.best(),
        })
    }

    /// 1エポック分、全部分領域を番号順に学習します。
    pub fn run_epoch(&mut self, epoch: usize, tracker: &mut ConvergenceTracker) -> Result<EpochReport> {
        let mut domains = Vec::with_capacity(self.trainers.len());
        for index in 0..self.trainers.len() {
            let components = self.train_domain(epoch, index)?;
            let lr = self.trainers[index].scheduler.step(components.total() as f64);
            tracker.record(index, components);
            info!(
                "Epoch: {} | Model{} | LOSS: {:.5} | LOSS_B: {:.5} | LOSS_F: {:.5} | LOSS_I: {:.5}",
                epoch,
                index + 1,
                components.total(),
                components.boundary,
                components.residual,
                components.interface
            );
            debug!("Model{} の学習率: {:e}", index + 1, lr);
            domains.push(components);
        }

        let aggregate: f32 = domains.iter().map(LossComponents::total).sum();
        let interface_error = scalar(self.model.interface_error(self.config.interface_order)?);
        tracker.record_epoch(aggregate, interface_error);
        info!(
            "Epoch: {} | 全体 LOSS: {:.5} | 界面誤差: {:.3e}",
            epoch, aggregate, interface_error
        );
        let checkpoint = self.checkpoint.observe(epoch, aggregate, &self.model)?;

        Ok(EpochReport {
            epoch,
            domains,
            aggregate,
            interface_error,
            learning_rates: self.trainers.iter().map(|t| t.scheduler.lr()).collect(),
            checkpoint,
        })
    }

    /// 部分領域 `index` のミニバッチを順に処理し、その部分ネットワークだけを更新します。
    fn train_domain(&mut self, epoch: usize, index: usize) -> Result<LossComponents> {
        let weights = &self.config.loss_weights;
        let lr = self.trainers[index].scheduler.lr();
        let mut history = Vec::with_capacity(self.trainers[index].data.collocation.len());

        for batch in 0..self.trainers[index].data.collocation.len() {
            let (loss, components) = {
                let data = &self.trainers[index].data;
                let model: &dyn Differentiable<B> = if self.model.layout().is_overlapping() {
                    &self.model
                } else {
                    &self.model.sub_models()[index]
                };
                let loss_b = boundary_loss(model, &data.boundary, weights.boundary, &self.device)?;
                let loss_f = physics_loss(
                    model,
                    &data.collocation[batch],
                    &self.config.equation,
                    weights.residual,
                )?;
                let loss_i = self
                    .model
                    .interface_error(self.config.interface_order)?
                    .mul_scalar(weights.interface);
                let components = LossComponents {
                    boundary: scalar(loss_b.clone()),
                    residual: scalar(loss_f.clone()),
                    interface: scalar(loss_i.clone()),
                };
                (loss_b + loss_f + loss_i, components)
            };

            if !components.total().is_finite() {
                return Err(CpinnError::NumericalDivergence {
                    epoch,
                    domain: index,
                });
            }

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model.sub_models()[index]);
            if !gradients_are_finite(&self.model.sub_models()[index], &grads) {
                return Err(CpinnError::NumericalDivergence {
                    epoch,
                    domain: index,
                });
            }
            let optimizer = &mut self.trainers[index].optimizer;
            self.model
                .update_sub_model(index, |sub| optimizer.step(lr, sub, grads));
            history.push(components);
        }

        Ok(LossComponents::mean(&history))
    }
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

/// `train`サブコマンドを実行します。
///
/// モデルの学習、損失グラフの描画、最良モデルのファイル保存を行います。
pub fn run(
    model_path: &Path,
    figure_dir: &Path,
    config: TrainingConfig,
) -> std::result::Result<TrainingOutcome, Box<dyn std::error::Error>> {
    let device: <MyBackend as Backend>::Device = Default::default();
    MyBackend::seed(config.seed);
    std::fs::create_dir_all(figure_dir)?;
    if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let config_path = TrainingConfig::sidecar_path(model_path);
    config.save(&config_path)?;
    info!("=> 学習設定を '{}' に保存しました。", config_path.display());

    let mut generator = UniformPointGenerator::new(config.seed);
    let mut orchestrator = Orchestrator::<MyBackend, _, _>::new(
        config.clone(),
        device,
        &mut generator,
        FileCheckpointer::new(model_path),
        || config.optimizer.init::<MyBackend, SubModel<MyBackend>>(),
    )?;

    let layout = orchestrator.model().layout().clone();
    if let Err(e) = plot::plot_partition(&layout, figure_dir) {
        warn!("領域分割の描画に失敗しました: {}", e);
    }
    if layout.is_overlapping() {
        if let Err(e) = plot::plot_windows(&layout, figure_dir) {
            warn!("窓関数の描画に失敗しました: {}", e);
        }
    }

    let mut tracker = ConvergenceTracker::new(config.domain_count);
    let training_start = Instant::now();
    info!(
        "学習を開始します (部分領域 {} 個, 重なり幅 {}) - バックエンド: NdArray (CPU)",
        config.domain_count, config.overlap_size
    );

    let plot_interval = config.plot_interval.max(1);
    let outcome = orchestrator.run(&mut tracker, |report, model, tracker| {
        if report.epoch % plot_interval == 0 {
            draw_convergence(tracker, figure_dir);
            draw_model(model, figure_dir);
        }
    })?;

    let training_duration = training_start.elapsed();
    info!("学習が完了しました ({:?})。", outcome.state);
    info!("=> 学習時間: {:.2?}", training_duration);
    match outcome.best {
        Some(best) => info!(
            "=> 最良モデル (epoch {}, loss {:.6}) を '{}' に保存しました。",
            best.epoch,
            best.loss,
            orchestrator.persistence().path().display()
        ),
        None => warn!("一度もモデルが保存されませんでした。"),
    }

    draw_convergence(&tracker, figure_dir);
    draw_model(orchestrator.model(), figure_dir);
    info!("=> グラフを '{}' に保存しました。", figure_dir.display());

    Ok(outcome)
}

/// 描画の失敗は学習を止めずに警告だけ出す
fn draw_convergence(tracker: &ConvergenceTracker, figure_dir: &Path) {
    for domain in 0..tracker.domain_count() {
        if let Some(series) = tracker.domain(domain) {
            if let Err(e) = plot::plot_convergence(series, domain, figure_dir) {
                warn!("損失グラフの描画に失敗しました: {}", e);
            }
        }
    }
}

fn draw_model<B: Backend>(model: &CompositeModel<B>, figure_dir: &Path) {
    let (xs, ys) = model.sample_separately(SAMPLE_COUNT);
    if let Err(e) = plot::plot_separate_models(&xs, &ys, figure_dir) {
        warn!("部分ネットワークの描画に失敗しました: {}", e);
    }
    let (xs, ys) = model.sample(SAMPLE_COUNT);
    if let Err(e) = plot::plot_solution(&xs, &ys, figure_dir) {
        warn!("解の描画に失敗しました: {}", e);
    }
}
