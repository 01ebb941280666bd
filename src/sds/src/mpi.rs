//! Parallel-write target contract. This crate does not bind to
//! an MPI implementation; `ParallelWriteTarget` is the seam a caller plugs an
//! actual transport into (e.g. a rank-0 aggregator or a parallel filesystem
//! write-at-offset), using `Dataset::per_rank_column_bytes` to size writes.

use crate::error::SdsResult;

/// A sink capable of writing at the current position or at an explicit
/// absolute offset, as required to let each rank write its column shard
/// independently into a single shared file.
pub trait ParallelWriteTarget: Send {
    fn write(&mut self, bytes: &[u8]) -> SdsResult<()>;
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> SdsResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingTarget {
        calls: Mutex<Vec<(Option<u64>, Vec<u8>)>>,
    }

    impl ParallelWriteTarget for RecordingTarget {
        fn write(&mut self, bytes: &[u8]) -> SdsResult<()> {
            self.calls.lock().unwrap().push((None, bytes.to_vec()));
            Ok(())
        }

        fn write_at(&mut self, offset: u64, bytes: &[u8]) -> SdsResult<()> {
            self.calls.lock().unwrap().push((Some(offset), bytes.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn write_at_records_offset() {
        let mut target = RecordingTarget { calls: Mutex::new(Vec::new()) };
        target.write_at(128, b"rank-shard").unwrap();
        let calls = target.calls.lock().unwrap();
        assert_eq!(calls[0], (Some(128), b"rank-shard".to_vec()));
    }
}
