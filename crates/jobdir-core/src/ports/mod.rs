//! Ports - 抽象化レイヤー
//!
//! Job Store が外から受け取るもの（時刻と ID 生成）を trait にしておく。
//! テストでは FixedClock を差し込んでレコード名を決定的にする。

pub mod clock;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
