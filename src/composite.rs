//! # 複合モデル
//!
//! 部分領域ごとの部分ネットワークをまとめ、計算領域全体でひとつの関数として
//! 評価します。重なりがなければ点を受け持ちの部分ネットワークに振り分け、
//! 重なりがあれば帯の中で窓関数の重みにより混ぜ合わせます。

use crate::derivative::{Differentiable, InputPoints, derivatives};
use crate::domain::DomainLayout;
use crate::error::Result;
use crate::jet::Jet;
use crate::model::{SubModel, SubModelConfig};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

#[derive(Clone, Debug)]
pub struct CompositeModel<B: Backend> {
    models: Vec<SubModel<B>>,
    layout: DomainLayout,
    device: B::Device,
}

impl<B: Backend> CompositeModel<B> {
    /// 部分領域の数だけ部分ネットワークを初期化します。以後、数は変わりません。
    pub fn new(layout: DomainLayout, config: &SubModelConfig, device: &B::Device) -> Self {
        let models = (0..layout.len()).map(|_| config.init(device)).collect();
        Self {
            models,
            layout,
            device: device.clone(),
        }
    }

    pub fn layout(&self) -> &DomainLayout {
        &self.layout
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn sub_models(&self) -> &[SubModel<B>] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// 部分ネットワーク `index` を取り出して `update` の結果に置き換えます。
    pub fn update_sub_model<F>(&mut self, index: usize, update: F)
    where
        F: FnOnce(SubModel<B>) -> SubModel<B>,
    {
        let model = self.models.remove(index);
        self.models.insert(index, update(model));
    }

    /// 保存・読み込み用に部分ネットワークの並びを取り出します。
    pub(crate) fn models_record(&self) -> Vec<SubModel<B>> {
        self.models.clone()
    }

    pub(crate) fn with_models(mut self, models: Vec<SubModel<B>>) -> Self {
        self.models = models;
        self
    }

    /// 計算領域全体での関数値。
    pub fn evaluate(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward_jet(Jet::constant(points, 0)).value()
    }

    /// 各部分ネットワークの出力を、振り分けや混合をせずにそのまま返します。
    pub fn evaluate_separately(&self, points: Tensor<B, 2>) -> Vec<Tensor<B, 2>> {
        self.models
            .iter()
            .map(|model| model.forward(points.clone()))
            .collect()
    }

    /// 隣り合う部分ネットワークの界面での不一致。
    ///
    /// 界面位置ごとに両者の 0〜`order` 階微分を比べ、差の二乗平均を全界面で足し合わせます。
    pub fn interface_error(&self, order: usize) -> Result<Tensor<B, 1>> {
        let mut total = Tensor::<B, 1>::zeros([1], &self.device);
        for interface in self.layout.interfaces() {
            let points = InputPoints::from_slice(&interface.locations, &self.device).require_grad();
            let left = derivatives(&points, &self.models[interface.left], order)?;
            let right = derivatives(&points, &self.models[interface.right], order)?;
            for (l, r) in left.into_iter().zip(right) {
                total = total + (l - r).powf_scalar(2.0).mean();
            }
        }
        Ok(total)
    }

    /// 計算領域を `count` 点の等間隔格子でサンプリングした学習済み関数。
    pub fn sample(&self, count: usize) -> (Vec<f32>, Vec<f32>) {
        let xs = self.grid(count);
        let points = InputPoints::from_slice(&xs, &self.device);
        let ys = to_host(self.evaluate(points.values()));
        (xs, ys)
    }

    /// 部分ネットワークごとのサンプリング結果。
    pub fn sample_separately(&self, count: usize) -> (Vec<f32>, Vec<Vec<f32>>) {
        let xs = self.grid(count);
        let points = InputPoints::from_slice(&xs, &self.device);
        let ys = self
            .evaluate_separately(points.values())
            .into_iter()
            .map(to_host)
            .collect();
        (xs, ys)
    }

    fn grid(&self, count: usize) -> Vec<f32> {
        let (lb, rb) = self.layout.global_bounds();
        let steps = count.max(2) - 1;
        (0..=steps)
            .map(|i| lb + (rb - lb) * i as f32 / steps as f32)
            .collect()
    }
}

impl<B: Backend> Differentiable<B> for CompositeModel<B> {
    fn forward_jet(&self, input: Jet<B>) -> Jet<B> {
        let weights = if self.layout.is_overlapping() {
            self.layout.window_jets(&input)
        } else {
            self.layout
                .ownership_masks(input.value())
                .into_iter()
                .map(|mask| Jet::constant(mask, input.order()))
                .collect()
        };

        let mut blended: Option<Jet<B>> = None;
        for (model, weight) in self.models.iter().zip(weights) {
            let term = weight.mul(model.forward_jet(input.clone()));
            blended = Some(match blended {
                Some(acc) => acc.add(term),
                None => term,
            });
        }
        blended.unwrap_or_else(|| Jet::constant(Tensor::zeros_like(&input.value()), input.order()))
    }
}

pub(crate) fn to_host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivative::derivative;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn composite(count: usize, overlap: f32) -> CompositeModel<TestBackend> {
        let device = Default::default();
        let layout = DomainLayout::new(count, -1.0, 1.0, overlap).unwrap();
        CompositeModel::new(layout, &SubModelConfig::new(), &device)
    }

    #[test]
    fn one_sub_model_per_domain() {
        let model = composite(3, 0.0);
        assert_eq!(model.len(), 3);
        assert_eq!(model.sub_models().len(), model.layout().len());
    }

    #[test]
    fn non_overlapping_evaluation_routes_to_the_owner() {
        let model = composite(2, 0.0);
        let xs = [-0.9, -0.1, 0.0, 0.1, 0.9];
        let points = InputPoints::<TestBackend>::from_slice(&xs, model.device());
        let combined = to_host(model.evaluate(points.values()));
        let separate: Vec<Vec<f32>> = model
            .evaluate_separately(points.values())
            .into_iter()
            .map(to_host)
            .collect();

        for (i, &x) in xs.iter().enumerate() {
            let owner = model.layout().owner(x);
            assert_relative_eq!(combined[i], separate[owner][i], epsilon = 1e-6);
        }
    }

    #[test]
    fn overlapping_evaluation_blends_with_window_weights() {
        let model = composite(2, 0.2);
        let xs = [-0.5, -0.08, 0.0, 0.05, 0.5];
        let points = InputPoints::<TestBackend>::from_slice(&xs, model.device());
        let combined = to_host(model.evaluate(points.values()));
        let separate: Vec<Vec<f32>> = model
            .evaluate_separately(points.values())
            .into_iter()
            .map(to_host)
            .collect();

        for (i, &x) in xs.iter().enumerate() {
            let expected: f32 = (0..2)
                .map(|d| model.layout().window_weight(d, x) * separate[d][i])
                .sum();
            assert_relative_eq!(combined[i], expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn blended_derivative_includes_the_window_slope() {
        let model = composite(2, 0.4);
        let x = 0.05f32;
        let h = 2e-3f32;
        let points = InputPoints::<TestBackend>::from_slice(&[x], model.device()).require_grad();
        let stencil = InputPoints::<TestBackend>::from_slice(&[x - h, x + h], model.device());

        let slope = to_host(derivative(&points, &model, 1).unwrap())[0];
        let values = to_host(model.evaluate(stencil.values()));
        assert_relative_eq!(slope, (values[1] - values[0]) / (2.0 * h), epsilon = 1e-3);
    }

    #[test]
    fn interface_error_vanishes_for_identical_neighbours() {
        let mut model = composite(2, 0.0);
        let first = model.sub_models()[0].clone();
        model.update_sub_model(1, |_| first);
        let error = to_host(model.interface_error(3).unwrap())[0];
        assert_relative_eq!(error, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn interface_error_is_positive_for_independent_neighbours() {
        let model = composite(3, 0.0);
        let error = to_host(model.interface_error(1).unwrap())[0];
        assert!(error > 0.0);
    }

    #[test]
    fn single_domain_has_no_interface_error() {
        let model = composite(1, 0.0);
        assert_eq!(to_host(model.interface_error(2).unwrap()), vec![0.0]);
    }

    #[test]
    fn sampling_spans_the_global_interval() {
        let model = composite(2, 0.0);
        let (xs, ys) = model.sample(2001);
        assert_eq!(xs.len(), 2001);
        assert_eq!(ys.len(), 2001);
        assert_eq!(xs[0], -1.0);
        assert_eq!(xs[2000], 1.0);
        let (_, separate) = model.sample_separately(11);
        assert_eq!(separate.len(), 2);
    }
}
