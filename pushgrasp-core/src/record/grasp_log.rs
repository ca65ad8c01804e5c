use crate::error::PushGraspError;
use anyhow::Result;
use std::path::Path;

/// Per-iteration `(is_grasp, reward)` table.
///
/// The table has one row per training iteration. Rows that were never written hold
/// [`GraspLog::UNFILLED`] in both columns. On disk it is a space-delimited text file
/// with one row per line.
#[derive(Debug, Clone, PartialEq)]
pub struct GraspLog {
    rows: Vec<[f64; 2]>,
}

impl GraspLog {
    /// Value of unwritten cells.
    pub const UNFILLED: f64 = -1.0;

    /// Creates a log of `max_iter` unwritten rows.
    pub fn new(max_iter: usize) -> Self {
        Self {
            rows: vec![[Self::UNFILLED; 2]; max_iter],
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the log has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Writes the row of iteration `iter`.
    pub fn set(&mut self, iter: usize, is_grasp: bool, reward: f32) -> Result<()> {
        let len = self.rows.len();
        let row = self
            .rows
            .get_mut(iter)
            .ok_or(PushGraspError::GraspLogIndex(iter, len))?;
        *row = [if is_grasp { 1.0 } else { 0.0 }, reward as f64];
        Ok(())
    }

    /// Row of iteration `iter`.
    pub fn row(&self, iter: usize) -> Option<[f64; 2]> {
        self.rows.get(iter).copied()
    }

    /// Saves the table.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .from_path(path)?;
        for [is_grasp, reward] in self.rows.iter() {
            wtr.write_record(&[format!("{:.18e}", is_grasp), format!("{:.18e}", reward)])?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Loads a table written by [`GraspLog::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .from_path(path)?;
        let mut rows = Vec::new();
        for (i, record) in rdr.records().enumerate() {
            let record = record?;
            if record.len() != 2 {
                return Err(PushGraspError::GraspLogRow(i).into());
            }
            rows.push([record[0].trim().parse()?, record[1].trim().parse()?]);
        }
        Ok(Self { rows })
    }

    /// Moving grasp success rate at every iteration.
    ///
    /// At iteration `i` the rate is the number of successful grasps among the last
    /// `interval` grasps made before `i`, divided by `min(interval, max(i, 1))`.
    /// While `i < interval` the rate is further scaled by `i / interval`.
    /// A grasp is successful when its reward equals `success_reward`.
    pub fn grasp_success_rate(&self, interval: usize, success_reward: f64) -> Vec<f64> {
        let grasps: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r[0] == 1.0)
            .map(|(i, _)| i)
            .collect();

        (0..self.rows.len())
            .map(|i| {
                let n_prev = grasps.partition_point(|&g| g < i);
                let window = &grasps[n_prev.saturating_sub(interval)..n_prev];
                let successes = window
                    .iter()
                    .filter(|&&g| self.rows[g][1] == success_reward)
                    .count();
                let mut rate = successes as f64 / interval.min(i.max(1)) as f64;
                if i < interval {
                    rate *= i as f64 / interval as f64;
                }
                rate
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn unwritten_rows_hold_sentinel() -> Result<()> {
        let mut log = GraspLog::new(3);
        log.set(1, true, 1.0)?;
        assert_eq!(log.row(0), Some([-1.0, -1.0]));
        assert_eq!(log.row(1), Some([1.0, 1.0]));
        assert!(log.set(3, false, 0.5).is_err());
        Ok(())
    }

    #[test]
    fn save_and_load() -> Result<()> {
        let dir = TempDir::new("grasp_log")?;
        let path = dir.path().join("records.txt");
        let mut log = GraspLog::new(4);
        log.set(0, false, 0.5)?;
        log.set(1, true, 0.0)?;
        log.save(&path)?;

        let text = std::fs::read_to_string(&path)?;
        assert_eq!(text.lines().count(), 4);
        assert_eq!(GraspLog::load(&path)?, log);
        Ok(())
    }

    #[test]
    fn success_rate_over_window() -> Result<()> {
        // grasps at 0 (success), 1 (fail), 3 (success); push at 2
        let mut log = GraspLog::new(5);
        log.set(0, true, 1.0)?;
        log.set(1, true, 0.0)?;
        log.set(2, false, 0.5)?;
        log.set(3, true, 1.0)?;

        let rate = log.grasp_success_rate(2, 1.0);
        assert_eq!(rate[0], 0.0);
        // i = 1: one success over min(2, 1), scaled by 1/2
        assert!((rate[1] - 0.5).abs() < 1e-12);
        // i = 4: last two grasps are 1 (fail) and 3 (success)
        assert!((rate[4] - 0.5).abs() < 1e-12);
        Ok(())
    }
}
