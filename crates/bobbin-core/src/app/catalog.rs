use std::collections::BTreeMap;

use crate::domain::{Operation, OperationName};

/// Registry of recognized operations (name -> query text).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable, shared behind `Arc`).
/// A job param whose name is not registered here is skipped by the worker.
#[derive(Debug, Clone, Default)]
pub struct OperationCatalog {
    operations: BTreeMap<OperationName, Operation>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("operation {0} is already registered")]
    Duplicate(OperationName),

    #[error("operation name must not be blank")]
    BlankName,

    #[error("operation {0} has empty query text")]
    EmptyQuery(OperationName),
}

impl OperationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a query under `name`. Registering a name twice is an error.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        query: impl Into<String>,
    ) -> Result<(), CatalogError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CatalogError::BlankName);
        }
        let name = OperationName::new(name);
        let query = query.into();
        if query.trim().is_empty() {
            return Err(CatalogError::EmptyQuery(name));
        }
        if self.operations.contains_key(&name) {
            return Err(CatalogError::Duplicate(name));
        }
        self.operations
            .insert(name.clone(), Operation::new(name, query));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.get(&OperationName::new(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(OperationName::as_str)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_operation_is_found() {
        let mut catalog = OperationCatalog::new();
        catalog.register("sql_1", "SELECT 1").unwrap();

        let op = catalog.get("sql_1").unwrap();
        assert_eq!(op.query(), "SELECT 1");
        assert!(!catalog.contains("sql_2"));
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["sql_1"]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut catalog = OperationCatalog::new();
        catalog.register("sql_1", "SELECT 1").unwrap();
        let err = catalog.register("sql_1", "SELECT 2").unwrap_err();
        assert_eq!(err, CatalogError::Duplicate(OperationName::new("sql_1")));
        assert_eq!(catalog.get("sql_1").unwrap().query(), "SELECT 1");
    }

    #[test]
    fn blank_entries_are_rejected() {
        let mut catalog = OperationCatalog::new();
        assert_eq!(catalog.register(" ", "SELECT 1"), Err(CatalogError::BlankName));
        assert!(matches!(
            catalog.register("sql_1", ""),
            Err(CatalogError::EmptyQuery(_))
        ));
        assert!(catalog.is_empty());
    }
}
