use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(author, version, about = "Conservative PINN: domain-decomposed neural solver for 1D boundary value problems", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// ログの出力レベル
    #[arg(long, value_enum, global = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// 端末に加えてログを書き出すファイル
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

/// 実行するサブコマンドを定義します（train または infer）。
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 部分ネットワークを学習し、最良のモデルをファイルに保存します
    Train(RunArgs),
    /// 保存されたモデルを読み込み、計算領域全体で評価します
    Infer(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// モデルの保存先（拡張子は `.mpk` に置き換えられます）
    pub model_path: PathBuf,

    /// グラフを出力するディレクトリ
    pub figure_dir: PathBuf,

    /// 学習設定の JSON ファイル。省略時はモデル隣の設定ファイルか既定値を使います
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 設定ファイルのエポック数を上書きします
    #[arg(long)]
    pub epochs: Option<usize>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}
