use std::path::PathBuf;
use thiserror::Error;

/// 学習・推論の各段階で発生するエラー。
#[derive(Debug, Error)]
pub enum CpinnError {
    /// 領域分割や学習設定のパラメータが不正です。
    #[error("設定が不正です: {0}")]
    InvalidConfiguration(String),

    /// 勾配追跡されていない入力に対して微分が要求されました。
    #[error("勾配追跡されていない入力に対して {order} 階微分が要求されました")]
    NonDifferentiableInput { order: usize },

    /// 損失が有限値でなくなりました。
    #[error("損失が発散しました (epoch {epoch}, 部分領域 {domain})")]
    NumericalDivergence { epoch: usize, domain: usize },

    /// チェックポイントや設定ファイルの読み書きに失敗しました。
    #[error("'{path}' の入出力に失敗しました: {reason}")]
    PersistenceFailure { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, CpinnError>;
