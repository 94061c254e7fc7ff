//! Dispatcher registry: method identifier → dispatcher instance.
//!
//! Built once at startup and shared read-only across all notifier workers;
//! there is no ambient global registry.

use std::collections::HashMap;
use std::sync::Arc;

use herald_common::error::{HeraldError, Result};
use herald_common::types::NotificationMethod;

use crate::Dispatcher;

/// Immutable-after-construction lookup of dispatchers by method.
#[derive(Default)]
pub struct DispatcherRegistry {
    dispatchers: HashMap<NotificationMethod, Arc<dyn Dispatcher>>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of dispatchers.
    pub fn from_dispatchers(
        dispatchers: impl IntoIterator<Item = Arc<dyn Dispatcher>>,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for dispatcher in dispatchers {
            registry.register(dispatcher)?;
        }
        Ok(registry)
    }

    /// Add a dispatcher; at most one per method.
    pub fn register(&mut self, dispatcher: Arc<dyn Dispatcher>) -> Result<()> {
        let method = dispatcher.method();
        if self.dispatchers.contains_key(&method) {
            return Err(HeraldError::DuplicateMethod(method.to_string()));
        }
        self.dispatchers.insert(method, dispatcher);
        Ok(())
    }

    /// Look up the dispatcher for `method`.
    ///
    /// The notifier treats the error as a permanent dispatch failure for
    /// any message referencing that method.
    pub fn resolve(&self, method: NotificationMethod) -> Result<Arc<dyn Dispatcher>> {
        self.dispatchers
            .get(&method)
            .cloned()
            .ok_or_else(|| HeraldError::UnknownMethod(method.to_string()))
    }

    /// Registered methods, in no particular order.
    pub fn methods(&self) -> Vec<NotificationMethod> {
        self.dispatchers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use uuid::Uuid;

    use herald_common::types::Labels;

    use super::*;
    use crate::SendError;

    struct NoopDispatcher(NotificationMethod);

    #[async_trait]
    impl Dispatcher for NoopDispatcher {
        fn method(&self) -> NotificationMethod {
            self.0
        }

        fn validate(&self, _input: &Labels) -> Result<(), Vec<String>> {
            Ok(())
        }

        async fn send(&self, _msg_id: Uuid, _input: &Labels) -> Result<(), SendError> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = DispatcherRegistry::from_dispatchers([
            Arc::new(NoopDispatcher(NotificationMethod::Smtp)) as Arc<dyn Dispatcher>,
        ])
        .unwrap();

        let dispatcher = registry.resolve(NotificationMethod::Smtp).unwrap();
        assert_eq!(dispatcher.method(), NotificationMethod::Smtp);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let err = DispatcherRegistry::from_dispatchers([
            Arc::new(NoopDispatcher(NotificationMethod::Smtp)) as Arc<dyn Dispatcher>,
            Arc::new(NoopDispatcher(NotificationMethod::Smtp)) as Arc<dyn Dispatcher>,
        ])
        .err()
        .unwrap();

        assert!(matches!(err, HeraldError::DuplicateMethod(m) if m == "smtp"));
    }

    #[test]
    fn test_resolve_unknown_method_fails() {
        let registry = DispatcherRegistry::new();
        let err = registry.resolve(NotificationMethod::Webhook).err().unwrap();
        assert!(matches!(err, HeraldError::UnknownMethod(m) if m == "webhook"));
    }
}
