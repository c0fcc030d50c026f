//! Integration tests for the full job pipeline.
//!
//! Tests: Intake → JobStore + Queue → Worker pool → JobStore → Result query
//!
//! Verifies:
//! - Accepted jobs eventually reach a terminal status with the backend's result
//! - Backend errors surface as `failed` jobs instead of vanishing
//! - Poison messages end up in the dead-letter queue and leave jobs `received`

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use jobpipe_compute::ComputeRegistry;
    use jobpipe_core::{JobId, JobRecord, JobStatus};

    use crate::jobs::{InMemoryJobStore, JobExecutor, WorkerConfig, WorkerHandle};
    use crate::queue::InMemoryJobQueue;
    use crate::services::{IntakeService, ResultQueryService};

    struct Pipeline {
        intake: IntakeService,
        query: ResultQueryService,
        queue: Arc<InMemoryJobQueue>,
        workers: WorkerHandle,
    }

    fn pipeline(concurrency: usize) -> Pipeline {
        let store = InMemoryJobStore::arc();
        let queue = Arc::new(InMemoryJobQueue::with_redelivery(Duration::from_millis(50), 3));

        let workers = JobExecutor::new(
            store.clone(),
            queue.clone(),
            ComputeRegistry::with_defaults(),
        )
        .spawn(
            WorkerConfig::default()
                .with_name("it")
                .with_concurrency(concurrency)
                .with_block(Duration::from_millis(20)),
        );

        Pipeline {
            intake: IntakeService::new(store.clone(), queue.clone()),
            query: ResultQueryService::new(store),
            queue,
            workers,
        }
    }

    async fn submit(p: &Pipeline, body: serde_json::Value) -> JobId {
        p.intake
            .submit(body.to_string().as_bytes())
            .await
            .expect("submission accepted")
    }

    async fn wait_terminal(p: &Pipeline, id: JobId) -> JobRecord {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let job = p.query.get_result(id).await.expect("job exists");
            if job.status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_operation_reaches_its_result() {
        let p = pipeline(2);

        let cases = [
            (json!({"operation": "add", "data": ["2", "3"]}), "5.000000"),
            (json!({"operation": "subtract", "data": [10, 4]}), "6.000000"),
            (json!({"operation": "multiply", "data": ["2.5", "4"]}), "10.000000"),
            (json!({"operation": "divide", "data": ["7", "2"]}), "3.500000"),
            (json!({"operation": "factorial", "data": ["5"]}), "120"),
            (json!({"operation": "fibonacci", "data": ["10"]}), "55"),
        ];

        let mut submitted = Vec::new();
        for (body, expected) in cases {
            submitted.push((submit(&p, body).await, expected));
        }

        for (id, expected) in submitted {
            let job = wait_terminal(&p, id).await;
            assert_eq!(job.status, JobStatus::Completed, "job {id}");
            assert_eq!(job.result, expected, "job {id}");
        }

        p.workers.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backend_errors_are_recorded_as_failures() {
        let p = pipeline(1);

        let by_zero = submit(&p, json!({"operation": "divide", "data": ["1", "0"]})).await;
        let bad_operand = submit(&p, json!({"operation": "factorial", "data": ["-3"]})).await;
        let overflow = submit(&p, json!({"operation": "fibonacci", "data": ["94"]})).await;

        for id in [by_zero, bad_operand, overflow] {
            let job = wait_terminal(&p, id).await;
            assert_eq!(job.status, JobStatus::Failed, "job {id}");
            assert!(job.result.starts_with("error: "), "job {id}: {}", job.result);
        }

        let stats = p.workers.stats();
        assert_eq!(stats.failed, 3);
        p.workers.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unknown_operations_are_dead_lettered() {
        let p = pipeline(1);

        let unknown = submit(&p, json!({"operation": "sqrt", "data": ["9"]})).await;
        let known = submit(&p, json!({"operation": "add", "data": ["1", "1"]})).await;

        // The known job is processed after the unknown one, so once it is done
        // the unknown one has been handled too.
        assert_eq!(wait_terminal(&p, known).await.status, JobStatus::Completed);

        let job = p.query.get_result(unknown).await.unwrap();
        assert_eq!(job.status, JobStatus::Received);
        let dls = p.queue.dead_letters();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].reason, "unknown operation");

        p.workers.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_all_complete() {
        let p = Arc::new(pipeline(4));

        let mut tasks = Vec::new();
        for n in 0..25u64 {
            let p = p.clone();
            tasks.push(tokio::spawn(async move {
                let id = submit(&p, json!({"operation": "fibonacci", "data": [n]})).await;
                (id, n)
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for task in tasks {
            let (id, n) = task.await.unwrap();
            assert!(ids.insert(id), "duplicate id {id}");

            let job = wait_terminal(&p, id).await;
            assert_eq!(job.status, JobStatus::Completed);
            let expected = (0..n).fold((0u64, 1u64), |(a, b), _| (b, a + b)).0;
            assert_eq!(job.result, expected.to_string());
        }
    }
}
