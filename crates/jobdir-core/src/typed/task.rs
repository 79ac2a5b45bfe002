//! Task trait - 型付き Task の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Task は task kind の名前と引数の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct TrainQuantifier {
///     dataset: String,
///     overwrite: bool,
/// }
///
/// impl Task for TrainQuantifier {
///     const TYPE: &'static str = "lab.quantifier.train.v1";
/// }
/// ```
///
/// 構造体のフィールドがそのまま job の名前付き引数（JSON object）になる。
/// `job_id` と `store` は実行時に `JobContext` として渡されるので、
/// フィールド名には使えない（作成時に ValidationError）。
///
/// # Trait Bounds
/// - `Serialize`: job レコードへの保存のため
/// - `DeserializeOwned`: worker 側での復元のため
/// - `Send + Sync + 'static`: worker slot をまたいで運ぶため
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// task kind の名前
    ///
    /// # 命名規約
    /// - `{namespace}.{domain}.{action}.v{major}`
    /// - 例: `demo.hello.v1`
    const TYPE: &'static str;
}
