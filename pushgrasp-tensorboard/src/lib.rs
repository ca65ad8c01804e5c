//! Writes push-grasp training records as TFRecord for Tensorboard.
use log::trace;
use pushgrasp_core::record::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

/// Rescales a 2-D map to a grayscale image replicated over three channels.
///
/// The minimum maps to 0 and the maximum to 255. Non-finite cells are black.
fn to_image(data: &[f32], shape: [usize; 2]) -> (Vec<u8>, [usize; 3]) {
    let finite = || data.iter().copied().filter(|v| v.is_finite());
    let min = finite().fold(f32::MAX, f32::min);
    let max = finite().fold(f32::MIN, f32::max);
    let scale = max - min;
    let gray: Vec<u8> = data
        .iter()
        .map(|&v| {
            if v.is_finite() && scale > 0.0 {
                ((v - min) / scale * 255.0) as u8
            } else {
                0
            }
        })
        .collect();
    let mut image = Vec::with_capacity(gray.len() * 3);
    for _ in 0..3 {
        image.extend_from_slice(&gray);
    }
    (image, [3, shape[0], shape[1]])
}

/// Writes records to TFRecord.
///
/// Scalars become scalar summaries and 2-D arrays such as depth heightmaps become
/// images. Date-times and strings are skipped.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    step_key: String,
    n_writes: usize,
    storage: RecordStorage,
}

impl TensorboardRecorder {
    /// Construct a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            step_key: "iter".to_string(),
            n_writes: 0,
            storage: RecordStorage::new(),
        }
    }

    /// Sets the key of the scalar used as the step of [`Recorder::write`].
    pub fn step_key(mut self, v: impl Into<String>) -> Self {
        self.step_key = v.into();
        self
    }

    fn write_at(&mut self, record: &Record, step: usize) {
        for (k, v) in record.iter() {
            if *k == self.step_key {
                continue;
            }
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, step),
                RecordValue::Array2(data, shape) => {
                    let (image, dim) = to_image(data, *shape);
                    self.writer.add_image(k, image.as_slice(), &dim, step)
                }
                RecordValue::DateTime(_) | RecordValue::String(_) => {
                    trace!("Skipped {} at step {}", k, step)
                }
            }
        }
        self.writer.flush();
    }
}

impl Recorder for TensorboardRecorder {
    /// Writes a record at the step given by its `step_key` scalar, or at the number
    /// of records written so far if the key is missing.
    fn write(&mut self, record: Record) {
        let step = match record.get(&self.step_key) {
            Some(RecordValue::Scalar(v)) => *v as usize,
            _ => self.n_writes,
        };
        self.write_at(&record, step);
        self.n_writes += 1;
    }
}

impl AggregateRecorder for TensorboardRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        if self.storage.is_empty() {
            return;
        }
        let record = self.storage.aggregate();
        self.write_at(&record, step.max(0) as usize);
        self.n_writes += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn maps_are_rescaled_to_gray() {
        let (image, dim) = to_image(&[0.0, 0.5, 1.0, f32::NAN], [2, 2]);
        assert_eq!(dim, [3, 2, 2]);
        assert_eq!(&image[..4], &[0, 127, 255, 0]);
        assert_eq!(&image[4..8], &image[..4]);
        assert_eq!(image.len(), 12);

        let (image, _) = to_image(&[0.3; 4], [2, 2]);
        assert!(image.iter().all(|&v| v == 0));
    }

    #[test]
    fn flushed_records_reach_the_log_directory() -> std::io::Result<()> {
        let dir = TempDir::new("tensorboard")?;
        let mut recorder = TensorboardRecorder::new(dir.path());
        for i in 0..3 {
            let mut record = Record::from_scalar("loss", i as f32);
            record.insert("depth_heightmap", RecordValue::Array2(vec![0.0, 0.1], [1, 2]));
            recorder.store(record);
        }
        recorder.flush(3);
        recorder.write(Record::from_scalar("iter", 4.0));
        assert!(std::fs::read_dir(dir.path())?.next().is_some());
        Ok(())
    }
}
