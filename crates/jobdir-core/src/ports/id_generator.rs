//! IdGenerator port - JobId 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + 単調増加 ULID（本番用）
//!
//! 同じミリ秒に複数生成しても ULID 部分は単調増加するので、
//! 同じ秒に作られた job 同士でも作成順に並ぶ（同じ generator を使う限り）。

use std::sync::{Mutex, PoisonError};

use ulid::{Generator, Ulid};

use crate::domain::JobId;
use crate::ports::Clock;

/// IdGenerator は JobId を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（store handle を複数スレッドで共有するため）
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;
}

/// UlidGenerator は ULID ベースの ID 生成器
pub struct UlidGenerator<C> {
    clock: C,
    generator: Mutex<Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            generator: Mutex::new(Generator::new()),
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        let now = self.clock.now();
        let mut generator = self.generator.lock().unwrap_or_else(PoisonError::into_inner);
        // 同一ミリ秒内で random 部が溢れた場合だけ非単調な ULID にフォールバック
        let ulid = generator
            .generate_from_datetime(now.into())
            .unwrap_or_else(|_| Ulid::from_parts(now.timestamp_millis() as u64, rand::random()));
        JobId::new(now, ulid)
    }
}
