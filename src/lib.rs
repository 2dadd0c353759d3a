//! # 保存型物理情報ニューラルネットワーク (cPINN) ライブラリ
//!
//! `burn` フレームワークを使用して、1次元の計算領域を部分領域に分割し、
//! 部分領域ごとの小さなネットワークを界面条件でつなぎながら境界値問題
//! （既定では `u'''' = 1`）を解くための主要なコンポーネントを提供します。
//!
//! 高階微分は切断テイラー級数 ([`jet::Jet`]) で計算するため、
//! 微分値そのものもパラメータについて微分可能です。

pub mod boundary;
pub mod checkpoint;
pub mod cli;
pub mod composite;
pub mod config;
pub mod convergence;
pub mod derivative;
pub mod domain;
pub mod error;
pub mod inference;
pub mod jet;
pub mod logging;
pub mod model;
pub mod pinn;
pub mod plot;
pub mod points;
pub mod scheduler;
pub mod training;

pub use composite::CompositeModel;
pub use config::TrainingConfig;
pub use derivative::{Differentiable, InputPoints, derivative};
pub use domain::{DomainLayout, SubDomain};
pub use error::{CpinnError, Result};
pub use training::{Orchestrator, TrainingOutcome, TrainingState};
