//! # 切断テイラー級数 (ジェット)
//!
//! 入力座標 `x` に関する高階微分を、ネットワークの順伝播と同じテンソル演算の
//! 中で伝播させるための型です。
//!
//! `burn` の `Tensor::grad` は内側バックエンドの（計算グラフから切り離された）
//! テンソルを返すため、逆伝播を何度も連鎖させて高階微分を得ることができません。
//! そこで各点の値を `c_k = f^(k)(x) / k!` の係数列として持ち運び、
//! 線形層・tanh・cos などを係数の漸化式で合成します。係数はすべて通常の
//! テンソル演算で作られるので、パラメータに関する勾配は `backward()` で
//! そのまま得られます。

use burn::nn::Linear;
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use std::f32::consts::PI;

/// 形状 `[点数, 幅]` のテンソルを係数とする切断テイラー級数。
#[derive(Clone, Debug)]
pub struct Jet<B: Backend> {
    coefficients: Vec<Tensor<B, 2>>,
}

impl<B: Backend> Jet<B> {
    /// 入力に依存しない値（高階係数がすべて0）のジェットを作ります。
    pub fn constant(value: Tensor<B, 2>, order: usize) -> Self {
        let zeros = Tensor::zeros_like(&value);
        let mut coefficients = Vec::with_capacity(order + 1);
        coefficients.push(value);
        coefficients.extend(std::iter::repeat_n(zeros, order));
        Self { coefficients }
    }

    /// 独立変数 `x` 自身のジェット (`dx/dx = 1`) を作ります。
    pub fn variable(value: Tensor<B, 2>, order: usize) -> Self {
        let mut jet = Self::constant(value, order);
        if order >= 1 {
            jet.coefficients[1] = Tensor::ones_like(&jet.coefficients[0]);
        }
        jet
    }

    /// 保持している最高の微分階数。
    pub fn order(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// 0階の係数、つまり関数値。
    pub fn value(&self) -> Tensor<B, 2> {
        self.coefficients[0].clone()
    }

    /// `order` 階微分 (`k! * c_k`) を返します。保持していない階数なら `None`。
    pub fn derivative(&self, order: usize) -> Option<Tensor<B, 2>> {
        self.coefficients
            .get(order)
            .map(|c| c.clone().mul_scalar(factorial(order)))
    }

    pub fn add(self, rhs: Self) -> Self {
        let coefficients = self
            .coefficients
            .into_iter()
            .zip(rhs.coefficients)
            .map(|(a, b)| a + b)
            .collect();
        Self { coefficients }
    }

    pub fn add_scalar(mut self, value: f32) -> Self {
        self.coefficients[0] = self.coefficients[0].clone().add_scalar(value);
        self
    }

    pub fn mul_scalar(self, value: f32) -> Self {
        let coefficients = self
            .coefficients
            .into_iter()
            .map(|c| c.mul_scalar(value))
            .collect();
        Self { coefficients }
    }

    /// `1 - self`
    pub fn one_minus(self) -> Self {
        self.mul_scalar(-1.0).add_scalar(1.0)
    }

    /// 級数同士の積（コーシー積）。階数は短い方に揃えます。
    pub fn mul(self, rhs: Self) -> Self {
        let order = self.order().min(rhs.order());
        let a = &self.coefficients;
        let b = &rhs.coefficients;
        let coefficients = (0..=order)
            .map(|k| {
                let mut acc = a[0].clone() * b[k].clone();
                for j in 1..=k {
                    acc = acc + a[j].clone() * b[k - j].clone();
                }
                acc
            })
            .collect();
        Self { coefficients }
    }

    /// 全結合層を適用します。バイアスは0階の係数にだけ加わります。
    pub fn linear(self, layer: &Linear<B>) -> Self {
        let weight = layer.weight.val();
        let coefficients = self
            .coefficients
            .into_iter()
            .enumerate()
            .map(|(k, c)| {
                if k == 0 {
                    layer.forward(c)
                } else {
                    c.matmul(weight.clone())
                }
            })
            .collect();
        Self { coefficients }
    }

    /// `y = tanh(z)` を `y' = (1 - y²) z'` の漸化式で展開します。
    pub fn tanh(self) -> Self {
        let z = self.coefficients;
        let n = z.len();
        let mut y: Vec<Tensor<B, 2>> = Vec::with_capacity(n);
        // q = 1 - y²
        let mut q: Vec<Tensor<B, 2>> = Vec::with_capacity(n);
        let y0 = z[0].clone().tanh();
        q.push((y0.clone() * y0.clone()).neg().add_scalar(1.0));
        y.push(y0);
        for k in 1..n {
            let mut acc = z[1].clone() * q[k - 1].clone();
            for j in 2..=k {
                acc = acc + (z[j].clone() * q[k - j].clone()).mul_scalar(j as f32);
            }
            y.push(acc.mul_scalar(1.0 / k as f32));

            let mut square = y[0].clone() * y[k].clone();
            for i in 1..=k {
                square = square + y[i].clone() * y[k - i].clone();
            }
            q.push(square.neg());
        }
        Self { coefficients: y }
    }

    /// `sin(z)` と `cos(z)` を同時に展開します。
    pub fn sin_cos(self) -> (Self, Self) {
        let z = self.coefficients;
        let n = z.len();
        let mut s: Vec<Tensor<B, 2>> = Vec::with_capacity(n);
        let mut c: Vec<Tensor<B, 2>> = Vec::with_capacity(n);
        s.push(z[0].clone().sin());
        c.push(z[0].clone().cos());
        for k in 1..n {
            let mut ds = z[1].clone() * c[k - 1].clone();
            let mut dc = z[1].clone() * s[k - 1].clone();
            for j in 2..=k {
                ds = ds + (z[j].clone() * c[k - j].clone()).mul_scalar(j as f32);
                dc = dc + (z[j].clone() * s[k - j].clone()).mul_scalar(j as f32);
            }
            s.push(ds.mul_scalar(1.0 / k as f32));
            c.push(dc.mul_scalar(-1.0 / k as f32));
        }
        (Self { coefficients: s }, Self { coefficients: c })
    }

    pub fn cos(self) -> Self {
        self.sin_cos().1
    }

    /// 値を `[min, max]` に切り詰めます。範囲外の点では高階係数が0になります。
    pub fn clamp(self, min: f32, max: f32) -> Self {
        let value = self.value();
        let inside = value.clone().greater_equal_elem(min).float()
            * value.clone().lower_equal_elem(max).float();
        let coefficients = self
            .coefficients
            .into_iter()
            .enumerate()
            .map(|(k, c)| {
                if k == 0 {
                    c.clamp(min, max)
                } else {
                    c * inside.clone()
                }
            })
            .collect();
        Self { coefficients }
    }

    /// 幅 `width` の区間 `[start, start + width]` で1から0へ滑らかに下がる
    /// 余弦ランプ `½(1 + cos(π·clamp((x - start)/width, 0, 1)))`。
    pub fn cosine_ramp(self, start: f32, width: f32) -> Self {
        self.add_scalar(-start)
            .mul_scalar(1.0 / width)
            .clamp(0.0, 1.0)
            .mul_scalar(PI)
            .cos()
            .add_scalar(1.0)
            .mul_scalar(0.5)
    }
}

pub(crate) fn factorial(n: usize) -> f32 {
    (1..=n).map(|i| i as f32).product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn column(values: &[f32]) -> Tensor<TestBackend, 2> {
        let device = Default::default();
        Tensor::from_data(TensorData::new(values.to_vec(), [values.len(), 1]), &device)
    }

    fn host(tensor: Tensor<TestBackend, 2>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn variable_seeds_unit_slope() {
        let jet = Jet::variable(column(&[0.5, -2.0]), 3);
        assert_eq!(jet.order(), 3);
        assert_eq!(host(jet.derivative(1).unwrap()), vec![1.0, 1.0]);
        assert_eq!(host(jet.derivative(2).unwrap()), vec![0.0, 0.0]);
        assert!(jet.derivative(4).is_none());
    }

    #[test]
    fn product_of_variables_gives_square_derivatives() {
        let xs = [-1.0, 0.25, 3.0];
        let x = Jet::variable(column(&xs), 3);
        let square = x.clone().mul(x);
        let first = host(square.derivative(1).unwrap());
        let second = host(square.derivative(2).unwrap());
        let third = host(square.derivative(3).unwrap());
        for (i, x) in xs.iter().enumerate() {
            assert_relative_eq!(first[i], 2.0 * x, epsilon = 1e-6);
            assert_relative_eq!(second[i], 2.0, epsilon = 1e-6);
            assert_relative_eq!(third[i], 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn tanh_matches_closed_form_derivatives() {
        let xs = [-0.7, 0.0, 0.3, 1.2];
        let jet = Jet::variable(column(&xs), 3).tanh();
        let d1 = host(jet.derivative(1).unwrap());
        let d2 = host(jet.derivative(2).unwrap());
        let d3 = host(jet.derivative(3).unwrap());
        for (i, x) in xs.iter().enumerate() {
            let t = x.tanh();
            let s = 1.0 - t * t;
            assert_relative_eq!(d1[i], s, epsilon = 1e-5);
            assert_relative_eq!(d2[i], -2.0 * t * s, epsilon = 1e-5);
            assert_relative_eq!(d3[i], -2.0 * s * (1.0 - 3.0 * t * t), epsilon = 1e-4);
        }
    }

    #[test]
    fn cosine_of_scaled_input_follows_chain_rule() {
        let xs = [0.1, 0.9];
        let jet = Jet::variable(column(&xs), 4).mul_scalar(2.0).cos();
        let d1 = host(jet.derivative(1).unwrap());
        let d2 = host(jet.derivative(2).unwrap());
        let d4 = host(jet.derivative(4).unwrap());
        for (i, x) in xs.iter().enumerate() {
            assert_relative_eq!(d1[i], -2.0 * (2.0 * x).sin(), epsilon = 1e-5);
            assert_relative_eq!(d2[i], -4.0 * (2.0 * x).cos(), epsilon = 1e-4);
            assert_relative_eq!(d4[i], 16.0 * (2.0 * x).cos(), epsilon = 1e-3);
        }
    }

    #[test]
    fn clamp_flattens_outside_the_range() {
        let jet = Jet::variable(column(&[-0.5, 0.5, 1.5]), 2).clamp(0.0, 1.0);
        assert_eq!(host(jet.value()), vec![0.0, 0.5, 1.0]);
        assert_eq!(host(jet.derivative(1).unwrap()), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn cosine_ramp_runs_from_one_to_zero() {
        let jet = Jet::variable(column(&[-1.0, 0.0, 0.1, 0.2, 1.0]), 1).cosine_ramp(0.0, 0.2);
        let values = host(jet.value());
        assert_relative_eq!(values[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(values[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(values[2], 0.5, epsilon = 1e-6);
        assert_relative_eq!(values[3], 0.0, epsilon = 1e-6);
        assert_relative_eq!(values[4], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn factorial_of_small_orders() {
        assert_eq!(factorial(0), 1.0);
        assert_eq!(factorial(4), 24.0);
    }
}
