//! PayloadCodec - Task と JobPayload の相互変換

use super::task::Task;
use crate::domain::{JobPayload, ValidationError};

/// PayloadCodec は Task を JobPayload に詰め、取り出す
///
/// # フロー
/// 1. encode: `T` を JSON object にして `T::TYPE` と一緒に JobPayload へ
/// 2. decode: task kind が `T::TYPE` と一致するか確認してから `T` に戻す
pub struct PayloadCodec;

impl PayloadCodec {
    pub fn encode<T: Task>(task: &T) -> Result<JobPayload, ValidationError> {
        let args = serde_json::to_value(task).map_err(|e| ValidationError::InvalidArguments {
            task: T::TYPE.to_string(),
            reason: e.to_string(),
        })?;
        JobPayload::new(T::TYPE, args)
    }

    pub fn decode<T: Task>(payload: &JobPayload) -> Result<T, ValidationError> {
        if payload.task() != T::TYPE {
            return Err(ValidationError::InvalidArguments {
                task: T::TYPE.to_string(),
                reason: format!("payload is for task '{}'", payload.task()),
            });
        }
        Self::decode_args(payload.args_value())
    }

    pub(crate) fn decode_args<T: Task>(args: serde_json::Value) -> Result<T, ValidationError> {
        serde_json::from_value(args).map_err(|e| ValidationError::InvalidArguments {
            task: T::TYPE.to_string(),
            reason: e.to_string(),
        })
    }
}
