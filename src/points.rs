//! # 学習点の生成
//!
//! 境界条件の点と、残差を評価するコロケーション点をサンプリングします。

use crate::derivative::InputPoints;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// ホスト側の座標と目標値の組。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampledPoints {
    pub coordinates: Vec<f32>,
    pub targets: Vec<f32>,
}

impl SampledPoints {
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// 座標を勾配追跡つきの入力点に変換します。
    pub fn input_points<B: Backend>(&self, device: &B::Device) -> InputPoints<B> {
        InputPoints::from_slice(&self.coordinates, device).require_grad()
    }

    /// 目標値を形状 `[点数, 1]` のテンソルに変換します。
    pub fn target_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let data = TensorData::new(self.targets.clone(), [self.targets.len(), 1]);
        Tensor::from_data(data, device)
    }

    /// 先頭から `size` 個ずつに分けます。
    pub fn chunks(&self, size: usize) -> Vec<SampledPoints> {
        self.coordinates
            .chunks(size.max(1))
            .zip(self.targets.chunks(size.max(1)))
            .map(|(coordinates, targets)| SampledPoints {
                coordinates: coordinates.to_vec(),
                targets: targets.to_vec(),
            })
            .collect()
    }
}

/// 学習点の生成器。
pub trait PointGenerator {
    /// `location` に集まった `count` 個の境界点と、その目標値。
    fn boundary_points(&mut self, count: usize, location: f32, target_value: f32) -> SampledPoints;

    /// `[lower, upper]` 内の `count` 個のコロケーション点と、0で埋めた目標値。
    fn collocation_points(&mut self, count: usize, lower: f32, upper: f32) -> SampledPoints;
}

/// 一様乱数による生成器。
///
/// 境界点は既定では同一座標の複製で、`jitter` を与えると `±jitter` の幅でばらつきます。
#[derive(Debug, Clone)]
pub struct UniformPointGenerator {
    rng: StdRng,
    jitter: f32,
}

impl UniformPointGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.jitter = jitter.abs();
        self
    }
}

impl PointGenerator for UniformPointGenerator {
    fn boundary_points(&mut self, count: usize, location: f32, target_value: f32) -> SampledPoints {
        let coordinates = (0..count)
            .map(|_| {
                if self.jitter > 0.0 {
                    location + self.rng.random_range(-self.jitter..=self.jitter)
                } else {
                    location
                }
            })
            .collect();
        SampledPoints {
            coordinates,
            targets: vec![target_value; count],
        }
    }

    fn collocation_points(&mut self, count: usize, lower: f32, upper: f32) -> SampledPoints {
        let coordinates = (0..count)
            .map(|_| self.rng.random_range(lower..=upper))
            .collect();
        SampledPoints {
            coordinates,
            targets: vec![0.0; count],
        }
    }
}
