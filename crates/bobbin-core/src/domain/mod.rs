//! Domain model (ids, params, job record, dispatch message, errors).
//!
//! ドメイン層はキュー・ストア・クエリエンジンを知りません。
//! 状態遷移のルールはすべて `JobRecord` のメソッドに集約しています。

pub mod errors;
pub mod ids;
pub mod job;
pub mod message;
pub mod number;
pub mod operation;
pub mod params;

pub use errors::{
    BobbinError, Classify, ErrorKind, QueryError, QueueError, StoreError, ValidationError,
};
pub use ids::JobId;
pub use job::{
    JobRecord, JobResult, JobState, JobStatus, JobView, Row, TerminalOutcome, Transition,
    TransitionError,
};
pub use message::DispatchMessage;
pub use number::{canonical_number, canonical_value};
pub use operation::{Operation, OperationName};
pub use params::JobParams;
