//! # Partition worker pool
//!
//! Fans partition builds out to a bounded set of worker threads. Each task is
//! a pure function of `(range, spec, manifest)` writing to its own output
//! path, so workers share nothing mutable; the manifest is borrowed read-only
//! by every worker. A failing partition never interrupts its siblings:
//! results for all partitions are collected and returned in partition-index
//! order, successes and failures alike.

use std::path::PathBuf;

use crossbeam_channel::{bounded, unbounded};
use log::{debug, warn};

use crate::builder::{self, BuildError, BuildReport, ProducerStamp};
use crate::manifest::Manifest;
use crate::plan::{PartitionPlan, PartitionRange};
use crate::schema::DatasetSpec;

/// Outcome of one pool run: per-partition results in index order.
pub type PoolResults = Vec<(PartitionRange, Result<BuildReport, BuildError>)>;

/// Resolves a worker-count argument; `0` means one worker per CPU core.
pub fn effective_workers(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get().max(1)
    } else {
        requested
    }
}

/// Builds every partition of `plan`, at most `workers` concurrently.
///
/// `outputs` names the container file for each partition, indexed by
/// partition index. `workers == 1` degenerates to a strictly sequential run
/// on a single worker thread. Already-started partitions always run to
/// completion even when another partition has failed; partial results stay
/// on disk for inspection.
pub fn run_all(
    plan: &PartitionPlan,
    spec: &DatasetSpec,
    manifest: &Manifest,
    outputs: &[PathBuf],
    workers: usize,
    stamp: &ProducerStamp,
) -> PoolResults {
    assert_eq!(
        outputs.len(),
        plan.len(),
        "one output path per planned partition"
    );

    let workers = effective_workers(workers).min(plan.len());
    debug!(
        "dispatching {} partition(s) across {} worker(s)",
        plan.len(),
        workers
    );

    let (task_tx, task_rx) = bounded::<(PartitionRange, PathBuf)>(plan.len());
    for range in plan.iter() {
        // Channel is sized to the plan; sends cannot block or fail here
        let _ = task_tx.send((range, outputs[range.index].clone()));
    }
    drop(task_tx);

    let (result_tx, result_rx) = unbounded();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                while let Ok((range, output)) = task_rx.recv() {
                    let result = builder::build(spec, manifest, &range, &output, stamp);
                    if let Err(error) = &result {
                        warn!("partition #{} failed: {error}", range.index);
                    }
                    if result_tx.send((range, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);
    });

    let mut results: PoolResults = result_rx.iter().collect();
    results.sort_by_key(|(range, _)| range.index);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{plan, PlanMode};
    use crate::schema::{DatasetSpec, FieldSpec};
    use crate::parsers::ParserKind;
    use std::path::Path;

    fn spec_for(manifest: &Manifest) -> DatasetSpec {
        DatasetSpec {
            name: "demo".to_string(),
            attrs: vec![],
            manifest_path: manifest.path().to_path_buf(),
            fields: vec![FieldSpec {
                name: "value".to_string(),
                column: "value".to_string(),
                column_index: 0,
                parser: ParserKind::Int16,
            }],
        }
    }

    fn manifest_with_values(dir: &Path, values: &[&str]) -> Manifest {
        Manifest::from_parts(
            dir.join("dataset.csv"),
            vec!["value".to_string()],
            values.iter().map(|v| vec![v.to_string()]).collect(),
        )
    }

    #[test]
    fn zero_workers_means_per_core() {
        assert!(effective_workers(0) >= 1);
        assert_eq!(effective_workers(3), 3);
    }

    #[test]
    fn results_arrive_in_partition_order() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_with_values(dir.path(), &["1", "2", "3", "4", "5", "6"]);
        let spec = spec_for(&manifest);
        let plan = plan(6, PlanMode::FixedCount(3)).unwrap();
        let outputs: Vec<PathBuf> = plan
            .iter()
            .map(|r| builder::partition_path(&dir.path().join("out"), r.index, plan.len()))
            .collect();

        let results = run_all(
            &plan,
            &spec,
            &manifest,
            &outputs,
            4,
            &ProducerStamp::current(),
        );

        assert_eq!(results.len(), 3);
        for (i, (range, result)) in results.iter().enumerate() {
            assert_eq!(range.index, i);
            let report = result.as_ref().expect("partition should build");
            assert!(report.path.is_file());
            assert_eq!(report.rows, 2);
        }
    }

    #[test]
    fn failing_partition_leaves_siblings_intact() {
        let dir = tempfile::tempdir().unwrap();
        // row 2 ("boom") poisons the middle partition only
        let manifest = manifest_with_values(dir.path(), &["1", "2", "boom", "4", "5", "6"]);
        let spec = spec_for(&manifest);
        let plan = plan(6, PlanMode::FixedCount(3)).unwrap();
        let outputs: Vec<PathBuf> = plan
            .iter()
            .map(|r| builder::partition_path(&dir.path().join("out"), r.index, plan.len()))
            .collect();

        let results = run_all(
            &plan,
            &spec,
            &manifest,
            &outputs,
            1,
            &ProducerStamp::current(),
        );

        assert!(results[0].1.is_ok());
        assert!(results[2].1.is_ok());
        let err = results[1].1.as_ref().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("value"));
        assert!(message.contains("row 2"));

        assert!(outputs[0].is_file());
        assert!(!outputs[1].exists());
        assert!(outputs[2].is_file());
    }
}
