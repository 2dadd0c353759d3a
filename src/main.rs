//! # 保存型物理情報ニューラルネットワーク (cPINN)
//!
//! 計算領域を部分領域に分け、部分領域ごとのネットワークで
//! 1次元の境界値問題を解きます。
//!
//! `clap` クレートを利用して、コマンドラインから`train`（学習）と`infer`（推論）の
//! 機能を個別に実行できます。
//!
//! ## 使い方
//!
//! ### 学習
//! ```bash
//! cargo run --release -- train models/cpinn figures --epochs 2000
//! ```
//!
//! ### 推論
//! ```bash
//! cargo run --release -- infer models/cpinn figures
//! ```

use clap::Parser;
use cpinn::cli::{Cli, Commands};
use cpinn::config::TrainingConfig;
use cpinn::{inference, logging, training};

/// プログラムのエントリーポイント。
///
/// コマンドライン引数を解析し、`train`または`infer`の処理に振り分けます。
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.log_level.into(), cli.log_file.as_deref())?;

    match &cli.command {
        Commands::Train(args) => {
            let mut config = TrainingConfig::resolve(args.config.as_deref(), &args.model_path)?;
            if let Some(epochs) = args.epochs {
                config.epoch_budget = epochs;
            }
            training::run(&args.model_path, &args.figure_dir, config)?;
        }
        Commands::Infer(args) => {
            let config = TrainingConfig::resolve(args.config.as_deref(), &args.model_path)?;
            inference::run(&args.model_path, &args.figure_dir, config)?;
        }
    }
    Ok(())
}
