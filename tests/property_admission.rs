use std::sync::Arc;
use std::time::Duration;

use joindag::errors::TaskError;
use joindag::lifecycle::{ManagerConfig, NullSampler, TaskManager};
use joindag::types::{ResultMap, TaskStatus};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Ending {
    Succeed,
    Fail,
    Cancel,
}

fn ending_strategy() -> impl Strategy<Value = Ending> {
    prop_oneof![Just(Ending::Succeed), Just(Ending::Fail), Just(Ending::Cancel)]
}

#[derive(Debug, Clone, Copy)]
struct Unit {
    stagger_ms: u64,
    work_ms: u64,
    ending: Ending,
}

fn unit_strategy() -> impl Strategy<Value = Unit> {
    (0..10u64, 0..15u64, ending_strategy()).prop_map(|(stagger_ms, work_ms, ending)| Unit {
        stagger_ms,
        work_ms,
        ending,
    })
}

/// What one submitter saw.
#[derive(Debug)]
enum Seen {
    Admitted { running_after: usize, status: TaskStatus },
    Rejected(TaskError),
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn concurrent_submissions_never_exceed_the_ceiling(
        units in proptest::collection::vec(unit_strategy(), 1..40),
        ceiling in 1..6usize,
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .expect("runtime");

        let (seen, peak, running_at_end) = runtime.block_on(async {
            let manager = TaskManager::builder(ManagerConfig {
                ceiling,
                worker_pool_size: ceiling,
                ..ManagerConfig::default()
            })
            .sampler(Arc::new(NullSampler))
            .build();

            let submitters: Vec<_> = units
                .iter()
                .enumerate()
                .map(|(i, unit)| {
                    let manager = manager.clone();
                    let unit = *unit;
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(unit.stagger_ms)).await;
                        let work = async move {
                            tokio::time::sleep(Duration::from_millis(unit.work_ms)).await;
                            match unit.ending {
                                Ending::Fail => Err(TaskError::ExecutionFailed("scripted".into())),
                                _ => Ok(ResultMap::new()),
                            }
                        };
                        match manager.submit(format!("unit_{i}"), work, None, Vec::new()) {
                            Ok(handle) => {
                                let running_after = manager.running_count();
                                if let Ending::Cancel = unit.ending {
                                    manager.cancel(handle.task_id());
                                }
                                let status = handle.wait().await.status;
                                Seen::Admitted { running_after, status }
                            }
                            Err(e) => Seen::Rejected(e),
                        }
                    })
                })
                .collect();

            let mut seen = Vec::new();
            for submitter in submitters {
                seen.push(submitter.await.expect("submitter finished"));
            }
            let peak = manager.peak_running();
            let running_at_end = manager.running_count();
            manager.shutdown().await;
            (seen, peak, running_at_end)
        });

        let mut admitted = 0;
        for s in &seen {
            match s {
                Seen::Admitted { running_after, status } => {
                    admitted += 1;
                    prop_assert!(*running_after <= ceiling, "{} running with ceiling {}", running_after, ceiling);
                    prop_assert!(status.is_terminal());
                }
                Seen::Rejected(e) => {
                    prop_assert_eq!(e, &TaskError::CapacityExceeded { ceiling });
                }
            }
        }

        prop_assert_eq!(seen.len(), units.len());
        prop_assert!(admitted >= 1);
        prop_assert!(peak >= 1);
        prop_assert!(peak <= ceiling, "peak {} above ceiling {}", peak, ceiling);
        prop_assert_eq!(running_at_end, 0);
    }
}
