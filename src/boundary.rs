use crate::domain::SubDomain;
use burn::config::Config;

/// 「解の `derivative_order` 階微分が `location` で `target_value` に等しい」という条件。
///
/// 勾配計算をまとめて行うため、同じ位置の点を `sample_count` 個サンプリングして使います。
/// 未指定なら学習設定の `boundary_sample_size` が使われます。
#[derive(Config, Debug, PartialEq)]
pub struct BoundaryCondition {
    pub location: f32,
    pub target_value: f32,
    pub derivative_order: usize,
    pub sample_count: Option<usize>,
}

impl BoundaryCondition {
    pub fn sample_count_or(&self, fallback: usize) -> usize {
        self.sample_count.unwrap_or(fallback)
    }
}

/// 両端で単純支持 (`u = u'' = 0`)、中央で `u = u' = 0` を課す既定の条件。
pub fn default_boundary_conditions() -> Vec<BoundaryCondition> {
    [
        (-1.0, 0),
        (1.0, 0),
        (-1.0, 2),
        (1.0, 2),
        (0.0, 0),
        (0.0, 1),
    ]
    .into_iter()
    .map(|(location, order)| BoundaryCondition::new(location, 0.0, order))
    .collect()
}

/// 部分領域ごとに、その閉区間が位置を含む条件の番号を集めます。
///
/// 継ぎ目上の条件は隣り合う両方の部分領域に振り分けられます。
pub fn route_conditions(conditions: &[BoundaryCondition], domains: &[SubDomain]) -> Vec<Vec<usize>> {
    domains
        .iter()
        .map(|domain| {
            conditions
                .iter()
                .enumerate()
                .filter(|(_, condition)| domain.contains(condition.location))
                .map(|(index, _)| index)
                .collect()
        })
        .collect()
}
