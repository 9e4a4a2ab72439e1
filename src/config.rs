//! Configuration module
//!
//! 制御ループ、安全エンベロープ、通信レートなどの固定パラメータを提供します。

pub mod params;

// params.rsから主要な定数を再エクスポート
pub use params::*;
