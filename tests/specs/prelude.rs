//! Shared fixture for the behavioral specs

use sagaq_adapters::{MemoryBroker, MemoryStore};
use sagaq_engine::{HandlerRegistry, JobManager};
use std::time::Duration;

pub const RECV_BUDGET: Duration = Duration::from_secs(5);

pub struct World {
    pub manager: JobManager<MemoryStore, MemoryBroker>,
    pub store: MemoryStore,
}

pub fn world() -> World {
    let store = MemoryStore::new();
    let manager = JobManager::new(store.clone(), MemoryBroker::new(), HandlerRegistry::new());
    World { manager, store }
}
