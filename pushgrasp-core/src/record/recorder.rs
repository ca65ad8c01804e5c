use super::Record;

/// Writes a record to an output destination.
pub trait Recorder {
    /// Writes a record.
    fn write(&mut self, record: Record);
}

/// A recorder that keeps records until they are flushed as aggregated values.
pub trait AggregateRecorder {
    /// Stores the record.
    fn store(&mut self, record: Record);

    /// Writes values aggregated from the stored records at iteration `step`.
    fn flush(&mut self, step: i64);
}
