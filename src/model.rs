use crate::derivative::Differentiable;
use crate::jet::Jet;
use burn::config::Config;
use burn::module::{Module, ModuleVisitor, ParamId};
use burn::nn::{Linear, LinearConfig, Tanh};
use burn::optim::GradientsParams;
use burn::prelude::Backend;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};
use std::marker::PhantomData;

/// 部分ネットワークの構成。
#[derive(Config, Debug)]
pub struct SubModelConfig {
    /// 隠れ層のユニット数
    #[config(default = 20)]
    pub hidden_size: usize,
    /// 全結合層の数（入力層と出力層を含む）
    #[config(default = 4)]
    pub layers: usize,
}

impl SubModelConfig {
    /// 新しい部分ネットワークを初期化します。
    pub fn init<B: Backend>(&self, device: &B::Device) -> SubModel<B> {
        let mut linears = Vec::with_capacity(self.layers);
        linears.push(LinearConfig::new(1, self.hidden_size).init(device));
        for _ in 1..(self.layers - 1) {
            linears.push(LinearConfig::new(self.hidden_size, self.hidden_size).init(device));
        }
        linears.push(LinearConfig::new(self.hidden_size, 1).init(device));
        SubModel {
            linears,
            activation: Tanh::new(),
        }
    }
}

/// ひとつの部分領域を受け持つニューラルネットワーク。
///
/// 座標 x を入力とし、その点における解 u を予測する多層パーセプトロン（MLP）です。
#[derive(Module, Debug)]
pub struct SubModel<B: Backend> {
    linears: Vec<Linear<B>>,
    activation: Tanh,
}

impl<B: Backend> SubModel<B> {
    /// モデルの順伝播を実行します。
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let depth = self.linears.len();
        let mut x = input;
        for (i, linear) in self.linears.iter().enumerate() {
            x = linear.forward(x);
            if i + 1 < depth {
                x = self.activation.forward(x);
            }
        }
        x
    }
}

impl<B: Backend> Differentiable<B> for SubModel<B> {
    fn forward_jet(&self, input: Jet<B>) -> Jet<B> {
        let depth = self.linears.len();
        let mut x = input;
        for (i, linear) in self.linears.iter().enumerate() {
            x = x.linear(linear);
            if i + 1 < depth {
                x = x.tanh();
            }
        }
        x
    }
}

/// 部分ネットワークの全パラメータについて、勾配が有限値かどうかを調べます。
pub fn gradients_are_finite<B: AutodiffBackend>(model: &SubModel<B>, grads: &GradientsParams) -> bool {
    let mut visitor = FiniteGradients::<B> {
        grads,
        finite: true,
        backend: PhantomData,
    };
    model.visit(&mut visitor);
    visitor.finite
}

struct FiniteGradients<'a, B> {
    grads: &'a GradientsParams,
    finite: bool,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for FiniteGradients<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            let magnitude: f32 = grad.abs().sum().into_scalar().elem();
            self.finite &= magnitude.is_finite();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivative::{InputPoints, derivative};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn config_controls_depth_and_width() {
        let device = Default::default();
        let model = SubModelConfig::new()
            .with_hidden_size(8)
            .with_layers(3)
            .init::<TestBackend>(&device);
        assert_eq!(model.linears.len(), 3);
        // (1*8 + 8) + (8*8 + 8) + (8*1 + 1)
        assert_eq!(model.num_params(), 97);
    }

    #[test]
    fn forward_maps_column_to_column() {
        let device = Default::default();
        let model = SubModelConfig::new().init::<TestBackend>(&device);
        let points = InputPoints::<TestBackend>::from_slice(&[0.0, 0.5, 1.0], &device);
        assert_eq!(model.forward(points.values()).dims(), [3, 1]);
    }

    #[test]
    fn fourth_derivative_reaches_every_weight() {
        let device = Default::default();
        let model = SubModelConfig::new().init::<TestBackend>(&device);
        let points =
            InputPoints::<TestBackend>::from_slice(&[-0.4, 0.1, 0.6], &device).require_grad();

        let fourth = derivative(&points, &model, 4).unwrap();
        let grads = fourth.powf_scalar(2.0).mean().backward();
        for linear in &model.linears {
            assert!(linear.weight.val().grad(&grads).is_some());
        }
    }

    #[test]
    fn non_finite_gradients_are_detected() {
        let device = Default::default();
        let model = SubModelConfig::new().init::<TestBackend>(&device);
        let points = InputPoints::<TestBackend>::from_slice(&[-0.3, 0.2], &device).require_grad();

        let loss = derivative(&points, &model, 2).unwrap().powf_scalar(2.0).mean();
        let mut grads = GradientsParams::from_grads(loss.backward(), &model);
        assert!(gradients_are_finite(&model, &grads));

        let weight = &model.linears[1].weight;
        let nan = Tensor::<NdArray<f32>, 2>::full(weight.val().dims(), f32::NAN, &device);
        grads.register(weight.id, nan);
        assert!(!gradients_are_finite(&model, &grads));
    }
}
