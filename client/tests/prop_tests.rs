use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;
use tokio::time::Instant;

use nodepool_client::{CallQueue, ClientError};

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Tasks submitted together start in submission order and their
    /// execution windows never overlap.
    #[test]
    fn queued_tasks_run_in_order_without_overlap(durations in prop::collection::vec(0u64..500, 1..16)) {
        let windows = paused_runtime().block_on(async {
            let queue = CallQueue::new("prop", Duration::from_secs(65));
            let windows = Arc::new(Mutex::new(Vec::new()));

            let replies: Vec<_> = durations
                .iter()
                .enumerate()
                .map(|(i, &millis)| {
                    let windows = Arc::clone(&windows);
                    queue.submit(async move {
                        let start = Instant::now();
                        tokio::time::sleep(Duration::from_millis(millis)).await;
                        windows.lock().unwrap().push((i, start, Instant::now()));
                        Ok::<_, ClientError>(i)
                    })
                })
                .collect();
            for reply in replies {
                reply.await.unwrap();
            }
            let recorded = windows.lock().unwrap().clone();
            recorded
        });

        prop_assert_eq!(windows.len(), durations.len());
        for (position, (index, _, _)) in windows.iter().enumerate() {
            prop_assert_eq!(*index, position);
        }
        for pair in windows.windows(2) {
            let (_, _, previous_end) = pair[0];
            let (_, next_start, _) = pair[1];
            prop_assert!(next_start >= previous_end);
        }
    }

    /// A failing task only fails its own caller.
    #[test]
    fn failures_stay_with_their_caller(failing in prop::collection::vec(any::<bool>(), 1..12)) {
        let results = paused_runtime().block_on(async {
            let queue = CallQueue::new("prop", Duration::from_secs(65));
            let replies: Vec<_> = failing
                .iter()
                .map(|&fail| {
                    queue.submit(async move {
                        if fail {
                            Err(ClientError::InvalidCommand("boom".into()))
                        } else {
                            Ok(())
                        }
                    })
                })
                .collect();
            let mut results = Vec::new();
            for reply in replies {
                results.push(reply.await.is_ok());
            }
            results
        });

        let expected: Vec<bool> = failing.iter().map(|fail| !fail).collect();
        prop_assert_eq!(results, expected);
    }
}
