#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gen3d_core::task::TaskStatus;
use gen3d_db::models::task::{NewTask, Task};
use gen3d_db::store::{MemoryTaskStore, TaskStore};
use gen3d_orchestrator::TaskService;
use gen3d_providers::{AdapterRegistry, DownloadResult, ProviderAdapter, ProviderError, RemoteStatus};

pub const MOCK_PROVIDER: &str = "mock";
pub const MOCK_CATEGORY: &str = "mock-category";

/// One scripted answer to a status query.
#[derive(Debug, Clone)]
pub enum Scripted {
    Status(RemoteStatus),
    /// The provider answers 503.
    Unavailable,
}

pub fn status(status: TaskStatus, progress: i16) -> Scripted {
    Scripted::Status(RemoteStatus::new(status).with_progress(progress))
}

pub fn done(model_url: &str) -> Scripted {
    Scripted::Status(
        RemoteStatus::new(TaskStatus::Done)
            .with_progress(100)
            .with_model_url(model_url)
            .with_thumbnail_url("https://cdn.example/thumb.png"),
    )
}

/// Provider stand-in with scripted query answers and call counters.
///
/// Each job walks through its script one query at a time and then keeps
/// repeating the last entry. Jobs without a script stay in WAIT.
#[derive(Default)]
pub struct MockAdapter {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    submitted: AtomicUsize,
    queries: AtomicUsize,
    downloads: AtomicUsize,
    cancels: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    query_delay: Duration,
    download_delay: Duration,
    cancel_supported: bool,
    download_fails: bool,
    submit_fails: bool,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    pub fn with_cancel(mut self) -> Self {
        self.cancel_supported = true;
        self
    }

    pub fn failing_downloads(mut self) -> Self {
        self.download_fails = true;
        self
    }

    pub fn failing_submits(mut self) -> Self {
        self.submit_fails = true;
        self
    }

    pub fn script(&self, provider_task_id: &str, steps: Vec<Scripted>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(provider_task_id.to_string(), steps.into());
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_answer(&self, provider_task_id: &str) -> Scripted {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(provider_task_id) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap(),
            Some(steps) => steps
                .front()
                .cloned()
                .unwrap_or(status(TaskStatus::Wait, 0)),
            None => status(TaskStatus::Wait, 0),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        MOCK_PROVIDER
    }

    fn default_category(&self) -> &str {
        MOCK_CATEGORY
    }

    async fn submit_task(&self, input: &mut NewTask) -> Result<String, ProviderError> {
        if self.submit_fails {
            return Err(ProviderError::Remote {
                code: "InvalidParameter".into(),
                message: "rejected".into(),
            });
        }
        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        input
            .generation_params
            .insert("model".into(), serde_json::json!("mock-1"));
        Ok(format!("job-{n}"))
    }

    async fn query_task(&self, provider_task_id: &str) -> Result<RemoteStatus, ProviderError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.next_answer(provider_task_id) {
            Scripted::Status(status) => Ok(status),
            Scripted::Unavailable => Err(ProviderError::Api {
                status: 503,
                body: "unavailable".into(),
            }),
        }
    }

    async fn download_result(&self, task: &Task) -> Result<DownloadResult, ProviderError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if !self.download_delay.is_zero() {
            tokio::time::sleep(self.download_delay).await;
        }
        if self.download_fails {
            return Err(ProviderError::MissingResult(task.provider_task_id.clone()));
        }
        Ok(DownloadResult {
            local_path: Some(format!("static/mock/{}.glb", task.provider_task_id)),
            file_size: 42,
            file_hash: "0".repeat(64),
            ..Default::default()
        })
    }

    async fn cancel_task(&self, _provider_task_id: &str) -> Result<(), ProviderError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        if self.cancel_supported {
            Ok(())
        } else {
            Err(ProviderError::Unsupported {
                provider: MOCK_PROVIDER.to_string(),
                operation: "cancel",
            })
        }
    }
}

pub struct Harness {
    pub adapter: Arc<MockAdapter>,
    pub store: Arc<MemoryTaskStore>,
    pub service: Arc<TaskService>,
}

pub fn harness(adapter: MockAdapter) -> Harness {
    harness_with(adapter, |service| service)
}

/// Like [`harness`], with a hook to tune the service before it is shared.
pub fn harness_with(
    adapter: MockAdapter,
    configure: impl FnOnce(TaskService) -> TaskService,
) -> Harness {
    let adapter = Arc::new(adapter);
    let store = Arc::new(MemoryTaskStore::new());
    let registry = AdapterRegistry::new().with(Arc::clone(&adapter) as Arc<dyn ProviderAdapter>);
    let service = Arc::new(configure(TaskService::new(
        Arc::clone(&store) as Arc<dyn TaskStore>,
        Arc::new(registry),
    )));
    Harness {
        adapter,
        store,
        service,
    }
}

impl Harness {
    pub async fn submit(&self, prompt: &str) -> Task {
        self.service
            .create_task(NewTask::text(MOCK_PROVIDER, prompt))
            .await
            .unwrap()
    }
}
