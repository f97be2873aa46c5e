//! End-to-end scheduling flow over an expanded catalog.

use anvil_core::events::{CompletionOutcome, DispatchEvent};
use anvil_core::ids::RunId;
use anvil_core::policy::ForcePolicy;
use anvil_core::ports::{DispatchOrder, WorkerTransport};
use anvil_core::project::{ParameterAxis, Project, TargetTemplate};
use anvil_core::run::RunState;
use anvil_core::worker::{Worker, WorkerStatus};
use anvil_core::Result;
use anvil_scheduler::dispatch::Dispatcher;
use anvil_scheduler::pool::WorkerPool;
use anvil_scheduler::registry::ProjectRegistry;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

struct RecordingTransport {
    orders: Mutex<Vec<DispatchOrder>>,
}

#[async_trait]
impl WorkerTransport for RecordingTransport {
    async fn dispatch(&self, order: DispatchOrder) -> Result<()> {
        self.orders.lock().unwrap().push(order);
        Ok(())
    }

    async fn cancel(&self, _run: RunId, _worker: &str) -> Result<()> {
        Ok(())
    }
}

fn riscv_gcc() -> Project {
    Project {
        name: "riscv-gcc".to_string(),
        url: "https://example.com/riscv-gcc.git".to_string(),
        templates: vec![TargetTemplate {
            name: "gcc-ARCH-LIBC".to_string(),
            branch: "master".to_string(),
            steps: vec![
                vec!["./configure".to_string(), "--with-arch=ARCH".to_string()],
                vec!["make".to_string(), "LIBC".to_string()],
            ],
            parameters: vec![
                ParameterAxis {
                    pattern: "ARCH".to_string(),
                    values: vec!["rv32".to_string(), "rv64".to_string()],
                },
                ParameterAxis {
                    pattern: "LIBC".to_string(),
                    values: vec![
                        "glibc".to_string(),
                        "musl".to_string(),
                        "newlib".to_string(),
                    ],
                },
            ],
            required_capabilities: ["riscv".to_string()].into_iter().collect(),
        }],
    }
}

#[tokio::test]
async fn expanded_catalog_drains_through_one_capable_worker() {
    let registry = Arc::new(ProjectRegistry::build(vec![riscv_gcc()]).unwrap());
    // 2 x 3 axes expand to 6 targets.
    assert_eq!(registry.targets().len(), 6);

    let mut pool = WorkerPool::new();
    pool.register(Worker::new("riscv.example.com", "pw", ["riscv".to_string()]))
        .unwrap();
    pool.register(Worker::new("x86.example.com", "pw", ["x86".to_string()]))
        .unwrap();

    // Only the riscv worker is eligible for any of the six targets.
    for target in registry.targets() {
        let eligible = pool.find_eligible(target);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].hostname, "riscv.example.com");
    }

    let transport = Arc::new(RecordingTransport {
        orders: Mutex::new(vec![]),
    });
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        pool,
        Arc::clone(&transport) as Arc<dyn WorkerTransport>,
        vec![],
        ForcePolicy::None,
        tx,
    );

    dispatcher.handle_event(DispatchEvent::NightlyDue {
        project: "riscv-gcc".to_string(),
    });
    assert_eq!(dispatcher.tracker().len(), 6);
    assert_eq!(dispatcher.queued_len(), 5);

    // Drive every run through ack and success; the single capable worker
    // drains the whole batch one run at a time.
    let mut completed = 0;
    while completed < 6 {
        let active = dispatcher.tracker().active_on_worker("riscv.example.com");
        assert_eq!(active.len(), 1);
        let run = active[0];
        dispatcher.handle_event(DispatchEvent::WorkerAck { run });
        dispatcher.handle_event(DispatchEvent::WorkerCompleted {
            run,
            outcome: CompletionOutcome::Success,
        });
        completed += 1;
    }

    assert_eq!(dispatcher.queued_len(), 0);
    for status in dispatcher.target_statuses() {
        assert_eq!(status.state, Some(RunState::Succeeded));
        assert_eq!(status.worker.as_deref(), Some("riscv.example.com"));
    }
    assert_eq!(
        dispatcher.pool().get("riscv.example.com").unwrap().status,
        WorkerStatus::Idle
    );
    assert_eq!(
        dispatcher.pool().get("x86.example.com").unwrap().status,
        WorkerStatus::Idle
    );

    tokio::task::yield_now().await;
    let orders = transport.orders.lock().unwrap();
    assert_eq!(orders.len(), 6);
    // Substituted steps made it onto the wire in catalog order.
    assert_eq!(
        orders[0].steps,
        vec![
            vec!["./configure".to_string(), "--with-arch=rv32".to_string()],
            vec!["make".to_string(), "glibc".to_string()],
        ]
    );
    assert!(orders.iter().all(|o| o.branch == "master"));
    assert!(orders.iter().all(|o| o.repo_url == "https://example.com/riscv-gcc.git"));
}
