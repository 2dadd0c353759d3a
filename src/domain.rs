//! # 領域分割
//!
//! 1次元の計算領域 `[global_lb, global_rb]` を部分領域に分割します。
//! 重なり幅が0なら部分領域は隙間なく接し（CPINN）、正なら各境界の両側に
//! 帯を持って重なり、帯の中では余弦窓で部分ネットワークの出力を混ぜ合わせます。

use crate::error::{CpinnError, Result};
use crate::jet::Jet;
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use std::f32::consts::PI;

/// ひとつの部分領域 `[lower_bound, upper_bound]`。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubDomain {
    pub index: usize,
    pub lower_bound: f32,
    pub upper_bound: f32,
}

impl SubDomain {
    /// 閉区間による包含判定。境界点の振り分けと界面位置の選択で共通に使います。
    pub fn contains(&self, x: f32) -> bool {
        self.lower_bound <= x && x <= self.upper_bound
    }

    pub fn width(&self) -> f32 {
        self.upper_bound - self.lower_bound
    }
}

/// 計算領域を `domain_count` 個の部分領域に分割します。
pub fn partition(
    domain_count: usize,
    global_lb: f32,
    global_rb: f32,
    overlap_size: f32,
) -> Result<Vec<SubDomain>> {
    Ok(DomainLayout::new(domain_count, global_lb, global_rb, overlap_size)?.domains)
}

/// 隣り合う2つの部分領域が共有する位置。
#[derive(Clone, Debug, PartialEq)]
pub struct Interface {
    pub left: usize,
    pub right: usize,
    pub locations: Vec<f32>,
}

/// 部分領域の並びと、それらの継ぎ目（分割前の内部境界）。
#[derive(Clone, Debug, PartialEq)]
pub struct DomainLayout {
    domains: Vec<SubDomain>,
    seams: Vec<f32>,
    global_lb: f32,
    global_rb: f32,
    overlap_size: f32,
}

impl DomainLayout {
    pub fn new(domain_count: usize, global_lb: f32, global_rb: f32, overlap_size: f32) -> Result<Self> {
        if domain_count < 1 {
            return Err(CpinnError::InvalidConfiguration(
                "部分領域の数は1以上でなければなりません".to_string(),
            ));
        }
        if !(global_lb.is_finite() && global_rb.is_finite() && global_lb < global_rb) {
            return Err(CpinnError::InvalidConfiguration(format!(
                "計算領域 [{global_lb}, {global_rb}] が不正です"
            )));
        }
        if !(overlap_size.is_finite() && overlap_size >= 0.0) {
            return Err(CpinnError::InvalidConfiguration(format!(
                "重なり幅 {overlap_size} は0以上の有限値でなければなりません"
            )));
        }

        let width = (global_rb - global_lb) / domain_count as f32;
        // 部分領域が1つなら重なりは意味を持たない
        let overlap_size = if domain_count == 1 { 0.0 } else { overlap_size };
        if overlap_size >= width {
            return Err(CpinnError::InvalidConfiguration(format!(
                "重なり幅 {overlap_size} が部分領域の幅 {width} 以上です"
            )));
        }

        let seams: Vec<f32> = (1..domain_count)
            .map(|k| global_lb + width * k as f32)
            .collect();
        let half = overlap_size / 2.0;
        let domains = (0..domain_count)
            .map(|index| SubDomain {
                index,
                lower_bound: if index == 0 {
                    global_lb
                } else {
                    seams[index - 1] - half
                },
                upper_bound: if index + 1 == domain_count {
                    global_rb
                } else {
                    seams[index] + half
                },
            })
            .collect();

        Ok(Self {
            domains,
            seams,
            global_lb,
            global_rb,
            overlap_size,
        })
    }

    pub fn domains(&self) -> &[SubDomain] {
        &self.domains
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn seams(&self) -> &[f32] {
        &self.seams
    }

    pub fn global_bounds(&self) -> (f32, f32) {
        (self.global_lb, self.global_rb)
    }

    pub fn overlap_size(&self) -> f32 {
        self.overlap_size
    }

    pub fn is_overlapping(&self) -> bool {
        self.overlap_size > 0.0
    }

    /// 隣接する部分領域の組ごとに、両方が含む界面位置を列挙します。
    ///
    /// 重なりがなければ継ぎ目の1点、重なりがあれば帯の両端と継ぎ目の3点です。
    pub fn interfaces(&self) -> Vec<Interface> {
        let half = self.overlap_size / 2.0;
        self.seams
            .iter()
            .enumerate()
            .filter_map(|(k, &seam)| {
                let (left, right) = (&self.domains[k], &self.domains[k + 1]);
                let candidates = if self.is_overlapping() {
                    vec![seam - half, seam, seam + half]
                } else {
                    vec![seam]
                };
                let locations: Vec<f32> = candidates
                    .into_iter()
                    .filter(|&x| left.contains(x) && right.contains(x))
                    .collect();
                (!locations.is_empty()).then(|| Interface {
                    left: left.index,
                    right: right.index,
                    locations,
                })
            })
            .collect()
    }

    /// 推論時に点 `x` を評価する部分領域。継ぎ目上の点は番号の小さい方、
    /// 計算領域の外は両端の部分領域が受け持ちます。
    pub fn owner(&self, x: f32) -> usize {
        self.seams
            .iter()
            .position(|&seam| x <= seam)
            .unwrap_or(self.seams.len())
    }

    /// 重なりなしモードでの各部分領域の担当マスク（0 または 1）。
    pub fn ownership_masks<B: Backend>(&self, x: Tensor<B, 2>) -> Vec<Tensor<B, 2>> {
        let last = self.domains.len() - 1;
        self.domains
            .iter()
            .map(|domain| {
                let mut mask = Tensor::ones_like(&x);
                if domain.index > 0 {
                    mask = mask * x.clone().greater_elem(self.seams[domain.index - 1]).float();
                }
                if domain.index < last {
                    mask = mask * x.clone().lower_equal_elem(self.seams[domain.index]).float();
                }
                mask
            })
            .collect()
    }

    /// 重なりありモードでの各部分領域の窓関数を、入力ジェットの関数として返します。
    ///
    /// 継ぎ目 k の帯で1から0へ下がるランプを `r_k` として、部分領域 i の重みは
    /// `(1 - r_{i-1}) * r_i` です。重みの総和は常に1になります。
    pub fn window_jets<B: Backend>(&self, input: &Jet<B>) -> Vec<Jet<B>> {
        let ramps: Vec<Jet<B>> = self
            .seams
            .iter()
            .map(|&seam| {
                input
                    .clone()
                    .cosine_ramp(seam - self.overlap_size / 2.0, self.overlap_size)
            })
            .collect();
        (0..self.domains.len())
            .map(|i| {
                let rise = (i > 0).then(|| ramps[i - 1].clone().one_minus());
                let fall = ramps.get(i).cloned();
                match (rise, fall) {
                    (Some(rise), Some(fall)) => rise.mul(fall),
                    (Some(rise), None) => rise,
                    (None, Some(fall)) => fall,
                    (None, None) => {
                        Jet::constant(Tensor::ones_like(&input.value()), input.order())
                    }
                }
            })
            .collect()
    }

    /// 部分領域 `index` の位置 `x` における混合重み（ホスト側の計算）。
    pub fn window_weight(&self, index: usize, x: f32) -> f32 {
        if !self.is_overlapping() {
            return if self.owner(x) == index { 1.0 } else { 0.0 };
        }
        let ramp = |seam: f32| {
            let t = ((x - (seam - self.overlap_size / 2.0)) / self.overlap_size).clamp(0.0, 1.0);
            0.5 * (1.0 + (PI * t).cos())
        };
        let rise = if index > 0 {
            1.0 - ramp(self.seams[index - 1])
        } else {
            1.0
        };
        let fall = self.seams.get(index).map_or(1.0, |&seam| ramp(seam));
        rise * fall
    }
}
