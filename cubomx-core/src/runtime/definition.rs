//! Component definitions.

use std::sync::Arc;

use crate::value::Record;

/// How a registered component produces its state.
#[derive(Clone)]
pub enum Definition {
    /// One shared instance, published under the registered name. The record
    /// is copied when the component is hydrated.
    Singleton(Record),
    /// A fresh record per element. Instances are published under their
    /// `mx-ref` or a generated reference.
    Factory(Arc<dyn Fn() -> Record + Send + Sync>),
}

impl Definition {
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn() -> Record + Send + Sync + 'static,
    {
        Definition::Factory(Arc::new(f))
    }

    pub fn is_factory(&self) -> bool {
        matches!(self, Definition::Factory(_))
    }

    pub(crate) fn instantiate(&self) -> Record {
        match self {
            Definition::Singleton(record) => record.clone(),
            Definition::Factory(f) => f(),
        }
    }
}

impl From<Record> for Definition {
    fn from(record: Record) -> Self {
        Definition::Singleton(record)
    }
}

impl std::fmt::Debug for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Definition::Singleton(record) => f.debug_tuple("Singleton").field(record).finish(),
            Definition::Factory(_) => f.write_str("Factory"),
        }
    }
}
