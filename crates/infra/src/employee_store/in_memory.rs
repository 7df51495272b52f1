use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use emphub_core::{Employee, EmployeeId, Entity, ValidEmployee};

use super::r#trait::{EmployeeStore, StoreError};

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<EmployeeId, Employee>,
}

/// In-memory employee table.
///
/// Intended for tests/dev. Ids start at 1 and increase monotonically.
#[derive(Debug, Default)]
pub struct InMemoryEmployeeStore {
    table: RwLock<Table>,
}

impl InMemoryEmployeeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmployeeStore for InMemoryEmployeeStore {
    async fn insert(&self, employee: ValidEmployee) -> Result<Employee, StoreError> {
        let mut table = self
            .table
            .write()
            .map_err(|_| StoreError::Other("lock poisoned".to_string()))?;

        table.next_id += 1;
        let record = employee.with_id(EmployeeId::new(table.next_id));
        table.rows.insert(*record.id(), record.clone());
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<Employee>, StoreError> {
        let table = self
            .table
            .read()
            .map_err(|_| StoreError::Other("lock poisoned".to_string()))?;
        Ok(table.rows.values().cloned().collect())
    }
}
