//! Process-wide worker services.
//!
//! The keep-alive policy and the worker registry are the only state shared
//! between workers. They are bundled here and handed to each worker at
//! construction, so tests can use a private instance instead of the
//! process singleton.

use std::sync::{Arc, OnceLock};

use crate::lifecycle::keep_alive::{KeepAlivePolicy, SettingsSource};
use crate::lifecycle::registry::WorkerRegistry;

static GLOBAL: OnceLock<Arc<WorkerServices>> = OnceLock::new();

#[derive(Debug)]
pub struct WorkerServices {
    registry: WorkerRegistry,
    keep_alive: KeepAlivePolicy,
}

impl WorkerServices {
    pub fn new(settings: Arc<dyn SettingsSource>) -> Self {
        Self::with_policy(KeepAlivePolicy::new(settings))
    }

    pub fn with_policy(keep_alive: KeepAlivePolicy) -> Self {
        Self {
            registry: WorkerRegistry::new(),
            keep_alive,
        }
    }

    /// Initialise the process singleton. Later calls return the first instance.
    pub fn install(settings: Arc<dyn SettingsSource>) -> Arc<WorkerServices> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(WorkerServices::new(settings))))
    }

    /// The process singleton, if installed.
    pub fn global() -> Option<Arc<WorkerServices>> {
        GLOBAL.get().cloned()
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn keep_alive(&self) -> &KeepAlivePolicy {
        &self.keep_alive
    }

    /// Live worker count.
    pub fn live_worker_count(&self) -> usize {
        self.registry.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn install_is_init_once() {
        let first: HashMap<String, String> =
            [("http.keep_alive_timeout".to_string(), "3".to_string())].into();
        let second: HashMap<String, String> =
            [("http.keep_alive_timeout".to_string(), "99".to_string())].into();

        let a = WorkerServices::install(Arc::new(first));
        let b = WorkerServices::install(Arc::new(second));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.keep_alive().resolve(), 3);
        assert!(WorkerServices::global().is_some());
    }

    #[test]
    fn private_instances_are_independent() {
        let a = WorkerServices::with_policy(KeepAlivePolicy::fixed(1));
        let b = WorkerServices::with_policy(KeepAlivePolicy::fixed(2));
        let _guard = a.registry().enter();
        assert_eq!(a.live_worker_count(), 1);
        assert_eq!(b.live_worker_count(), 0);
    }
}
