//! # 学習設定
//!
//! 領域分割・損失の重み・最適化のパラメータをひとつの [`TrainingConfig`] にまとめます。
//! JSON で保存・読み込みでき、学習時にはチェックポイントの隣に保存して
//! 推論時のモデル再構築に使います。

use crate::boundary::{BoundaryCondition, default_boundary_conditions};
use crate::domain::DomainLayout;
use crate::error::{self, CpinnError};
use crate::model::SubModelConfig;
use crate::scheduler::PlateauSchedulerConfig;
use burn::config::Config;
use burn::optim::AdamConfig;
use std::path::{Path, PathBuf};

/// 損失の各項に掛ける重み。
#[derive(Config, Debug)]
pub struct LossWeights {
    /// 境界条件 `w_b`
    #[config(default = 100.0)]
    pub boundary: f32,
    /// 方程式の残差 `w_f`
    #[config(default = 1.0)]
    pub residual: f32,
    /// 界面の不一致 `w_i`
    #[config(default = 100.0)]
    pub interface: f32,
}

/// 支配方程式 `d^order u / dx^order = forcing`。
#[derive(Config, Debug)]
pub struct GoverningEquation {
    #[config(default = 4)]
    pub order: usize,
    #[config(default = 1.0)]
    pub forcing: f32,
}

#[derive(Config)]
pub struct TrainingConfig {
    #[config(default = "SubModelConfig::new()")]
    pub model: SubModelConfig,
    #[config(default = "AdamConfig::new()")]
    pub optimizer: AdamConfig,
    #[config(default = "PlateauSchedulerConfig::new()")]
    pub scheduler: PlateauSchedulerConfig,
    #[config(default = "LossWeights::new()")]
    pub loss_weights: LossWeights,
    #[config(default = "GoverningEquation::new()")]
    pub equation: GoverningEquation,
    #[config(default = "default_boundary_conditions()")]
    pub boundary_conditions: Vec<BoundaryCondition>,
    #[config(default = 2)]
    pub domain_count: usize,
    #[config(default = "-1.0")]
    pub global_lb: f32,
    #[config(default = 1.0)]
    pub global_rb: f32,
    #[config(default = 0.0)]
    pub overlap_size: f32,
    /// コロケーション点のミニバッチの大きさ
    #[config(default = 100)]
    pub batch_size: usize,
    /// 境界条件ひとつあたりの点数。`sample_count` を指定していない条件に使います。
    #[config(default = 100)]
    pub boundary_sample_size: usize,
    /// 部分領域ひとつあたりのコロケーション点数
    #[config(default = 10000)]
    pub collocation_sample_size: usize,
    #[config(default = 10000)]
    pub epoch_budget: usize,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// 界面で一致させる微分の最高階数
    #[config(default = 1)]
    pub interface_order: usize,
    /// 全体の損失がこれを下回ったら収束とみなす
    #[config(default = 1e-7)]
    pub tolerance: f32,
    /// 途中経過を描画するエポック間隔
    #[config(default = 50)]
    pub plot_interval: usize,
    #[config(default = 42)]
    pub seed: u64,
}

impl TrainingConfig {
    /// 学習を始める前に設定の整合性を確認します。
    pub fn validate(&self) -> error::Result<()> {
        self.layout()?;
        let invalid = |message: String| Err(CpinnError::InvalidConfiguration(message));
        if self.model.layers < 2 || self.model.hidden_size == 0 {
            return invalid(format!(
                "部分ネットワークは2層以上・幅1以上が必要です (layers = {}, hidden_size = {})",
                self.model.layers, self.model.hidden_size
            ));
        }
        if self.batch_size == 0 || self.collocation_sample_size == 0 {
            return invalid("バッチサイズとコロケーション点数は1以上が必要です".to_string());
        }
        if self.boundary_sample_size == 0
            || self.boundary_conditions.iter().any(|c| c.sample_count == Some(0))
        {
            return invalid("境界点数は1以上が必要です".to_string());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid(format!("学習率 {} は正の値が必要です", self.learning_rate));
        }
        let weights = &self.loss_weights;
        if [weights.boundary, weights.residual, weights.interface]
            .iter()
            .any(|w| !(w.is_finite() && *w >= 0.0))
        {
            return invalid("損失の重みは0以上の有限値が必要です".to_string());
        }
        if !self.equation.forcing.is_finite() {
            return invalid("外力項が有限値ではありません".to_string());
        }
        if !(self.scheduler.factor > 0.0 && self.scheduler.factor < 1.0) {
            return invalid(format!(
                "減衰率 {} は (0, 1) の範囲が必要です",
                self.scheduler.factor
            ));
        }
        if let Some(condition) = self
            .boundary_conditions
            .iter()
            .find(|c| !(c.location.is_finite() && c.target_value.is_finite()))
        {
            return invalid(format!("境界条件 {condition:?} が有限値ではありません"));
        }
        Ok(())
    }

    /// 点数が未指定の条件に `boundary_sample_size` を補った境界条件。
    pub fn effective_conditions(&self) -> Vec<BoundaryCondition> {
        self.boundary_conditions
            .iter()
            .map(|c| {
                let count = c.sample_count_or(self.boundary_sample_size);
                c.clone().with_sample_count(Some(count))
            })
            .collect()
    }

    pub fn layout(&self) -> error::Result<DomainLayout> {
        DomainLayout::new(
            self.domain_count,
            self.global_lb,
            self.global_rb,
            self.overlap_size,
        )
    }

    /// チェックポイントと並べて保存する設定ファイルのパス。
    pub fn sidecar_path(model_path: &Path) -> PathBuf {
        model_path.with_extension("json")
    }

    /// 明示されたファイル、チェックポイント隣の設定ファイル、既定値の順に設定を決めます。
    pub fn resolve(explicit: Option<&Path>, model_path: &Path) -> error::Result<Self> {
        let sidecar = Self::sidecar_path(model_path);
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None if sidecar.exists() => sidecar,
            None => return Ok(Self::new()),
        };
        Self::load(&path).map_err(|e| CpinnError::PersistenceFailure {
            path,
            reason: format!("{e:?}"),
        })
    }
}
