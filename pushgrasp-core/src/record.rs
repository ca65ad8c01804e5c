//! Records of training runs.
//!
//! A [`Record`] is a bag of named [`RecordValue`]s. The environment, the agent and the
//! [`Trainer`](crate::Trainer) each produce one per iteration; they are merged and
//! handed to an [`AggregateRecorder`], which stores them and writes aggregated values
//! on [`AggregateRecorder::flush`].
//!
//! [`GraspLog`] is the separate flat `(is_grasp, reward)` table kept for offline
//! grasp-success analysis.
//!
//! ```rust
//! use pushgrasp_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss", 0.25);
//! record.insert("primitive", RecordValue::String("grasp".into()));
//! assert_eq!(record.get_scalar("loss").unwrap(), 0.25);
//! ```
mod base;
mod buffered_recorder;
mod grasp_log;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use grasp_log::GraspLog;
pub use null_recorder::NullRecorder;
pub use recorder::{AggregateRecorder, Recorder};
pub use storage::RecordStorage;
