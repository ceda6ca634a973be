use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{Backend, DriverError, Row};

type InsertScript = Box<dyn FnMut(&str, &Row) -> Result<Option<String>, DriverError> + Send>;

/// In-memory backend that replays scripted insert outcomes and records every
/// call made against it.
pub struct MockBackend {
    script: Mutex<InsertScript>,
    inserts: Mutex<Vec<(String, Row)>>,
    lookups: Mutex<Vec<(String, String, String)>>,
    deletes: Mutex<Vec<(String, String)>>,
    rows: Mutex<HashMap<(String, String), Row>>,
    latest: Mutex<Option<String>>,
    calls: Mutex<usize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_script(|_, _| Ok(Some("new-id".to_string())))
    }

    pub fn with_script<F>(script: F) -> Self
    where
        F: FnMut(&str, &Row) -> Result<Option<String>, DriverError> + Send + 'static,
    {
        Self {
            script: Mutex::new(Box::new(script)),
            inserts: Mutex::new(Vec::new()),
            lookups: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            rows: Mutex::new(HashMap::new()),
            latest: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    /// Replays `outcomes` in order, then accepts every insert.
    pub fn with_outcomes(outcomes: Vec<Result<Option<String>, DriverError>>) -> Self {
        let mut queue: VecDeque<_> = outcomes.into();
        Self::with_script(move |_, _| {
            queue
                .pop_front()
                .unwrap_or_else(|| Ok(Some("new-id".to_string())))
        })
    }

    pub fn put_row(&self, table: &str, id: &str, row: Row) {
        self.rows
            .lock()
            .unwrap()
            .insert((table.to_string(), id.to_string()), row);
    }

    pub fn set_latest(&self, id: &str) {
        *self.latest.lock().unwrap() = Some(id.to_string());
    }

    pub fn inserted(&self, table: &str) -> Vec<Row> {
        self.inserts
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == table)
            .map(|(_, row)| row.clone())
            .collect()
    }

    pub fn lookups(&self) -> Vec<(String, String, String)> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    fn count(&self) {
        *self.calls.lock().unwrap() += 1;
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn insert_returning_id(
        &self,
        table: &str,
        row: &Row,
    ) -> Result<Option<String>, DriverError> {
        self.count();
        self.inserts
            .lock()
            .unwrap()
            .push((table.to_string(), row.clone()));
        let mut script = self.script.lock().unwrap();
        (script)(table, row)
    }

    async fn latest_id_where(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Option<String>, DriverError> {
        self.count();
        self.lookups.lock().unwrap().push((
            table.to_string(),
            column.to_string(),
            value.to_string(),
        ));
        Ok(self.latest.lock().unwrap().clone())
    }

    async fn fetch_row(&self, table: &str, id: &str) -> Result<Option<Row>, DriverError> {
        self.count();
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(table.to_string(), id.to_string()))
            .cloned())
    }

    async fn delete_row(&self, table: &str, id: &str) -> Result<bool, DriverError> {
        self.count();
        self.deletes
            .lock()
            .unwrap()
            .push((table.to_string(), id.to_string()));
        Ok(self
            .rows
            .lock()
            .unwrap()
            .remove(&(table.to_string(), id.to_string()))
            .is_some())
    }
}
