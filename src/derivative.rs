//! # 微分エンジン
//!
//! モデル出力の入力座標に関する任意階の微分を計算します。

use crate::error::{CpinnError, Result};
use crate::jet::Jet;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

/// ジェットを受け取って順伝播できる1入力1出力の関数。
///
/// 部分ネットワーク・複合モデルのほか、テスト用の解析関数もこれを実装します。
pub trait Differentiable<B: Backend> {
    fn forward_jet(&self, input: Jet<B>) -> Jet<B>;
}

/// 形状 `[点数, 1]` の入力座標。
///
/// 1階以上の微分を取るには [`InputPoints::require_grad`] で
/// 勾配追跡を有効にしておく必要があります。
#[derive(Clone, Debug)]
pub struct InputPoints<B: Backend> {
    values: Tensor<B, 2>,
    tracked: bool,
}

impl<B: Backend> InputPoints<B> {
    pub fn new(values: Tensor<B, 2>) -> Self {
        Self {
            values,
            tracked: false,
        }
    }

    /// ホスト側の座標列から列ベクトルを作ります。
    pub fn from_slice(values: &[f32], device: &B::Device) -> Self {
        let data = TensorData::new(values.to_vec(), [values.len(), 1]);
        Self::new(Tensor::from_data(data, device))
    }

    pub fn require_grad(mut self) -> Self {
        self.tracked = true;
        self
    }

    pub fn is_tracked(&self) -> bool {
        self.tracked
    }

    pub fn values(&self) -> Tensor<B, 2> {
        self.values.clone()
    }

    pub fn len(&self) -> usize {
        self.values.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `order` 階までの微分を運ぶ入力ジェットを作ります。
    pub fn seed(&self, order: usize) -> Result<Jet<B>> {
        match (order, self.tracked) {
            (0, _) => Ok(Jet::constant(self.values(), 0)),
            (_, true) => Ok(Jet::variable(self.values(), order)),
            (_, false) => Err(CpinnError::NonDifferentiableInput { order }),
        }
    }
}

/// `model` の出力の `order` 階微分を `points` 上で計算します。
///
/// `order = 0` ならモデル出力そのものです。結果は `points` と同じ形状で、
/// パラメータに関して微分可能なまま返ります。
pub fn derivative<B, M>(points: &InputPoints<B>, model: &M, order: usize) -> Result<Tensor<B, 2>>
where
    B: Backend,
    M: Differentiable<B> + ?Sized,
{
    let output = model.forward_jet(points.seed(order)?);
    output
        .derivative(order)
        .ok_or(CpinnError::NonDifferentiableInput { order })
}

/// 0階から `max_order` 階までの微分を一度の順伝播でまとめて計算します。
pub fn derivatives<B, M>(
    points: &InputPoints<B>,
    model: &M,
    max_order: usize,
) -> Result<Vec<Tensor<B, 2>>>
where
    B: Backend,
    M: Differentiable<B> + ?Sized,
{
    let output = model.forward_jet(points.seed(max_order)?);
    (0..=max_order)
        .map(|order| {
            output
                .derivative(order)
                .ok_or(CpinnError::NonDifferentiableInput { order })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubModelConfig;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    /// `f(x) = x²`
    struct Square;

    impl<B: Backend> Differentiable<B> for Square {
        fn forward_jet(&self, input: Jet<B>) -> Jet<B> {
            input.clone().mul(input)
        }
    }

    fn host<B: Backend>(tensor: Tensor<B, 2>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn square_has_expected_first_and_second_derivative() {
        let device = Default::default();
        let xs = [-1.5, -0.2, 0.0, 0.7, 2.0];
        let points = InputPoints::<TestBackend>::from_slice(&xs, &device).require_grad();

        let first = host(derivative(&points, &Square, 1).unwrap());
        let second = host(derivative(&points, &Square, 2).unwrap());
        for (i, x) in xs.iter().enumerate() {
            assert_relative_eq!(first[i], 2.0 * x, epsilon = 1e-6);
            assert_relative_eq!(second[i], 2.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn order_zero_is_the_raw_model_output() {
        let device = Default::default();
        let model = SubModelConfig::new().init::<TestBackend>(&device);
        let xs = [-1.0, -0.3, 0.0, 0.4, 1.0];
        let points = InputPoints::<TestBackend>::from_slice(&xs, &device);

        let via_engine = host(derivative(&points, &model, 0).unwrap());
        let via_forward = host(model.forward(points.values()));
        for (a, b) in via_engine.iter().zip(via_forward.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn untracked_points_reject_higher_orders() {
        let device = Default::default();
        let points = InputPoints::<TestBackend>::from_slice(&[0.0, 1.0], &device);
        let result = derivative(&points, &Square, 1);
        assert!(matches!(
            result,
            Err(CpinnError::NonDifferentiableInput { order: 1 })
        ));
    }

    #[test]
    fn derivatives_are_deterministic() {
        let device = Default::default();
        let model = SubModelConfig::new().init::<TestBackend>(&device);
        let points = InputPoints::<TestBackend>::from_slice(&[-0.5, 0.25], &device).require_grad();

        let first = derivatives(&points, &model, 4).unwrap();
        let second = derivatives(&points, &model, 4).unwrap();
        assert_eq!(first.len(), 5);
        for (a, b) in first.into_iter().zip(second) {
            assert_eq!(host(a), host(b));
        }
    }

    #[test]
    fn model_derivative_matches_finite_difference() {
        let device = Default::default();
        let model = SubModelConfig::new().init::<TestBackend>(&device);
        let x = 0.3f32;
        let h = 1e-2f32;
        let points = InputPoints::<TestBackend>::from_slice(&[x], &device).require_grad();
        let stencil = InputPoints::<TestBackend>::from_slice(&[x - h, x, x + h], &device);

        let values = host(derivative(&stencil, &model, 0).unwrap());
        let first = host(derivative(&points, &model, 1).unwrap())[0];
        let second = host(derivative(&points, &model, 2).unwrap())[0];

        assert_relative_eq!(first, (values[2] - values[0]) / (2.0 * h), epsilon = 1e-3);
        assert_relative_eq!(
            second,
            (values[2] - 2.0 * values[1] + values[0]) / (h * h),
            epsilon = 2e-2
        );
    }
}
