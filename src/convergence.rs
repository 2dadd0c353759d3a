/// 1エポック分の損失の内訳（重み適用後）。
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LossComponents {
    pub boundary: f32,
    pub residual: f32,
    pub interface: f32,
}

impl LossComponents {
    pub fn total(&self) -> f32 {
        self.boundary + self.residual + self.interface
    }

    /// ミニバッチごとの値の平均。
    pub fn mean(items: &[LossComponents]) -> LossComponents {
        if items.is_empty() {
            return LossComponents::default();
        }
        let n = items.len() as f32;
        let sum = items.iter().fold(LossComponents::default(), |acc, c| LossComponents {
            boundary: acc.boundary + c.boundary,
            residual: acc.residual + c.residual,
            interface: acc.interface + c.interface,
        });
        LossComponents {
            boundary: sum.boundary / n,
            residual: sum.residual / n,
            interface: sum.interface / n,
        }
    }
}

/// 部分領域ひとつ分の損失の履歴。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DomainSeries {
    pub boundary: Vec<f32>,
    pub residual: Vec<f32>,
    pub interface: Vec<f32>,
    pub total: Vec<f32>,
}

impl DomainSeries {
    fn push(&mut self, components: LossComponents) {
        self.boundary.push(components.boundary);
        self.residual.push(components.residual);
        self.interface.push(components.interface);
        self.total.push(components.total());
    }

    pub fn len(&self) -> usize {
        self.total.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total.is_empty()
    }
}

/// 学習中の損失を部分領域ごとに追記していく記録。描画は呼び出し側が行います。
#[derive(Clone, Debug, Default)]
pub struct ConvergenceTracker {
    domains: Vec<DomainSeries>,
    aggregate: Vec<f32>,
    interface_error: Vec<f32>,
}

impl ConvergenceTracker {
    pub fn new(domain_count: usize) -> Self {
        Self {
            domains: vec![DomainSeries::default(); domain_count],
            aggregate: Vec::new(),
            interface_error: Vec::new(),
        }
    }

    pub fn record(&mut self, domain: usize, components: LossComponents) {
        if let Some(series) = self.domains.get_mut(domain) {
            series.push(components);
        }
    }

    /// エポック終了時の全体損失と、重みを掛ける前の界面誤差を記録します。
    pub fn record_epoch(&mut self, aggregate: f32, interface_error: f32) {
        self.aggregate.push(aggregate);
        self.interface_error.push(interface_error);
    }

    pub fn domain(&self, index: usize) -> Option<&DomainSeries> {
        self.domains.get(index)
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    pub fn aggregate(&self) -> &[f32] {
        &self.aggregate
    }

    pub fn interface_error(&self) -> &[f32] {
        &self.interface_error
    }

    pub fn epochs(&self) -> usize {
        self.aggregate.len()
    }
}
