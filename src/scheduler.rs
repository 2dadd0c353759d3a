use burn::config::Config;
use log::info;

/// 損失の停滞で学習率を下げるスケジューラの設定。
#[derive(Config, Debug)]
pub struct PlateauSchedulerConfig {
    /// 改善のないエポックをいくつまで許すか
    #[config(default = 100)]
    pub patience: usize,
    /// 学習率に掛ける減衰率
    #[config(default = 0.1)]
    pub factor: f64,
    /// 改善とみなす相対的な下げ幅
    #[config(default = 1e-4)]
    pub threshold: f64,
    #[config(default = 0.0)]
    pub min_lr: f64,
}

impl PlateauSchedulerConfig {
    pub fn init(&self, initial_lr: f64) -> PlateauScheduler {
        PlateauScheduler {
            lr: initial_lr,
            best: f64::INFINITY,
            bad_epochs: 0,
            config: self.clone(),
        }
    }
}

/// 監視する損失が `patience` エポックを超えて改善しないとき、学習率を
/// `factor` 倍にします。
#[derive(Clone, Debug)]
pub struct PlateauScheduler {
    lr: f64,
    best: f64,
    bad_epochs: usize,
    config: PlateauSchedulerConfig,
}

impl PlateauScheduler {
    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// エポックの損失を観測し、次のエポックで使う学習率を返します。
    pub fn step(&mut self, metric: f64) -> f64 {
        if metric < self.best * (1.0 - self.config.threshold) {
            self.best = metric;
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
        }

        if self.bad_epochs > self.config.patience {
            let reduced = (self.lr * self.config.factor).max(self.config.min_lr);
            if self.lr - reduced > f64::EPSILON {
                info!("学習率を {:.3e} から {:.3e} に下げます", self.lr, reduced);
                self.lr = reduced;
            }
            self.bad_epochs = 0;
        }
        self.lr
    }
}
