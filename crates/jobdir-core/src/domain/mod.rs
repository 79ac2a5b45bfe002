//! Domain model (ids, lifecycle state, records, payloads, failures).
//!
//! ストレージにも実行にも依存しない型だけを置く。
//! ファイル名とレコードの相互変換（`record`）もここ。

pub mod errors;
pub mod failure;
pub mod ids;
pub mod job;
pub mod payload;
pub mod record;
pub mod state;

pub use self::errors::{RecordNameError, StoreError, ValidationError};
pub use self::failure::{FailureKind, TaskError, TaskFailure};
pub use self::ids::{InvalidJobId, JobId};
pub use self::job::{ClaimedJob, JobInfo};
pub use self::payload::{JobPayload, RESERVED_ARGS};
pub use self::record::JobRecord;
pub use self::state::{JobStatus, StatusCounts};
