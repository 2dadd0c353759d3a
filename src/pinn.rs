use crate::config::GoverningEquation;
use crate::derivative::{Differentiable, InputPoints, derivative};
use crate::error::Result;
use burn::nn::loss::{MseLoss, Reduction};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// ひとつの境界条件から作った学習用テンソル。
#[derive(Clone, Debug)]
pub struct BoundaryBatch<B: Backend> {
    pub points: InputPoints<B>,
    pub targets: Tensor<B, 2>,
    pub derivative_order: usize,
}

/// 境界損失を計算します。
///
/// 条件ごとに、指定階数の微分と目標値との二乗平均誤差を取って足し合わせ、`weight` を掛けます。
pub fn boundary_loss<B: Backend>(
    model: &dyn Differentiable<B>,
    batches: &[BoundaryBatch<B>],
    weight: f32,
    device: &B::Device,
) -> Result<Tensor<B, 1>> {
    let mut loss = Tensor::<B, 1>::zeros([1], device);
    for batch in batches {
        let prediction = derivative(&batch.points, model, batch.derivative_order)?;
        loss = loss + MseLoss::new().forward(prediction, batch.targets.clone(), Reduction::Mean);
    }
    Ok(loss.mul_scalar(weight))
}

/// 物理損失を計算します。
///
/// 支配方程式の残差 `d^p u/dx^p - f`（0になるべき値）の二乗平均誤差に `weight` を掛けて返します。
pub fn physics_loss<B: Backend>(
    model: &dyn Differentiable<B>,
    points: &InputPoints<B>,
    equation: &GoverningEquation,
    weight: f32,
) -> Result<Tensor<B, 1>> {
    let residual = derivative(points, model, equation.order)?.sub_scalar(equation.forcing);
    let zeros = Tensor::zeros_like(&residual);
    Ok(MseLoss::new()
        .forward(residual, zeros, Reduction::Mean)
        .mul_scalar(weight))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jet::Jet;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    /// `u(x) = x⁴ / 24`、つまり `u'''' = 1` の厳密解のひとつ
    struct QuarticSolution;

    impl<B: Backend> Differentiable<B> for QuarticSolution {
        fn forward_jet(&self, input: Jet<B>) -> Jet<B> {
            let square = input.clone().mul(input);
            square.clone().mul(square).mul_scalar(1.0 / 24.0)
        }
    }

    fn scalar(tensor: Tensor<TestBackend, 1>) -> f32 {
        tensor.into_scalar()
    }

    #[test]
    fn exact_solution_has_no_residual() {
        let device = Default::default();
        let points = InputPoints::<TestBackend>::from_slice(&[-0.7, 0.0, 0.4], &device).require_grad();
        let loss = physics_loss(&QuarticSolution, &points, &GoverningEquation::new(), 1.0).unwrap();
        assert_relative_eq!(scalar(loss), 0.0, epsilon = 1e-8);
    }

    #[test]
    fn residual_measures_the_forcing_mismatch() {
        let device = Default::default();
        let points = InputPoints::<TestBackend>::from_slice(&[0.1, 0.2], &device).require_grad();
        let equation = GoverningEquation::new().with_forcing(3.0);
        let loss = physics_loss(&QuarticSolution, &points, &equation, 2.0).unwrap();
        // (1 - 3)² * 2
        assert_relative_eq!(scalar(loss), 8.0, epsilon = 1e-4);
    }

    #[test]
    fn boundary_loss_sums_weighted_condition_errors() {
        let device = Default::default();
        let batch = |x: f32, target: f32, order: usize| BoundaryBatch {
            points: InputPoints::<TestBackend>::from_slice(&[x, x], &device).require_grad(),
            targets: Tensor::from_data(TensorData::new(vec![target, target], [2, 1]), &device),
            derivative_order: order,
        };
        // u(1) = 1/24, u''(1) = 1/2
        let batches = vec![batch(1.0, 0.0, 0), batch(1.0, 0.5, 2)];
        let loss = boundary_loss(&QuarticSolution, &batches, 10.0, &device).unwrap();
        assert_relative_eq!(scalar(loss), 10.0 / (24.0 * 24.0), epsilon = 1e-5);
    }

    #[test]
    fn no_conditions_means_zero_boundary_loss() {
        let device = Default::default();
        let loss = boundary_loss::<TestBackend>(&QuarticSolution, &[], 100.0, &device).unwrap();
        assert_eq!(scalar(loss), 0.0);
    }
}
