use crate::types::{BridgeStatus, ListResult, ProcessorDto, ProcessorId};
use crate::{error::BridgeError, Result};
use parking_lot::RwLock;
use std::collections::HashSet;

/// Row source for processor queries. A join fetch over the filter collection returns
/// the parent row once per filter, so callers must deduplicate.
pub trait ProcessorTable: Send + Sync {
    fn join_fetch(&self, predicate: &dyn Fn(&ProcessorDto) -> bool) -> Vec<ProcessorDto>;

    /// Ids of matching rows in insertion order, after skipping `offset`
    fn select_ids(
        &self,
        predicate: &dyn Fn(&ProcessorDto) -> bool,
        offset: usize,
        limit: usize,
    ) -> Vec<ProcessorId>;

    fn count(&self, predicate: &dyn Fn(&ProcessorDto) -> bool) -> u64;

    fn upsert(&self, processor: ProcessorDto);

    fn remove(&self, id: &str) -> Option<ProcessorDto>;
}

/// Insertion-ordered table emulating a left join fetch of processors and filters
#[derive(Default)]
pub struct InMemoryProcessorTable {
    rows: RwLock<Vec<ProcessorDto>>,
}

impl InMemoryProcessorTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessorTable for InMemoryProcessorTable {
    fn join_fetch(&self, predicate: &dyn Fn(&ProcessorDto) -> bool) -> Vec<ProcessorDto> {
        self.rows
            .read()
            .iter()
            .filter(|row| predicate(row))
            .flat_map(|row| std::iter::repeat(row.clone()).take(row.filters.len().max(1)))
            .collect()
    }

    fn select_ids(
        &self,
        predicate: &dyn Fn(&ProcessorDto) -> bool,
        offset: usize,
        limit: usize,
    ) -> Vec<ProcessorId> {
        self.rows
            .read()
            .iter()
            .filter(|row| predicate(row))
            .skip(offset)
            .take(limit)
            .map(|row| row.id.clone())
            .collect()
    }

    fn count(&self, predicate: &dyn Fn(&ProcessorDto) -> bool) -> u64 {
        self.rows.read().iter().filter(|row| predicate(row)).count() as u64
    }

    fn upsert(&self, processor: ProcessorDto) {
        let mut rows = self.rows.write();
        match rows.iter_mut().find(|row| row.id == processor.id) {
            Some(row) => *row = processor,
            None => rows.push(processor),
        }
    }

    fn remove(&self, id: &str) -> Option<ProcessorDto> {
        let mut rows = self.rows.write();
        let index = rows.iter().position(|row| row.id == id)?;
        Some(rows.remove(index))
    }
}

/// Processor queries of the manager
#[derive(Default)]
pub struct ProcessorDao<T: ProcessorTable = InMemoryProcessorTable> {
    table: T,
}

impl ProcessorDao<InMemoryProcessorTable> {
    pub fn in_memory() -> Self {
        Self::new(InMemoryProcessorTable::new())
    }
}

impl<T: ProcessorTable> ProcessorDao<T> {
    pub fn new(table: T) -> Self {
        Self { table }
    }

    pub fn persist(&self, processor: ProcessorDto) {
        self.table.upsert(processor);
    }

    pub fn delete(&self, id: &str) -> Option<ProcessorDto> {
        self.table.remove(id)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<ProcessorDto>> {
        single_result_from_list(self.table.join_fetch(&|p| p.id == id))
    }

    pub fn find_by_bridge_id_and_name(
        &self,
        bridge_id: &str,
        name: &str,
    ) -> Result<Option<ProcessorDto>> {
        single_result_from_list(
            self.table
                .join_fetch(&|p| p.bridge.id == bridge_id && p.name == name),
        )
    }

    pub fn find_by_id_bridge_id_and_customer_id(
        &self,
        id: &str,
        bridge_id: &str,
        customer_id: &str,
    ) -> Result<Option<ProcessorDto>> {
        single_result_from_list(self.table.join_fetch(&|p| {
            p.id == id && p.bridge.id == bridge_id && p.bridge.customer_id == customer_id
        }))
    }

    pub fn find_by_statuses(&self, statuses: &[BridgeStatus]) -> Vec<ProcessorDto> {
        remove_duplicates(self.table.join_fetch(&|p| statuses.contains(&p.status)))
    }

    pub fn count_by_bridge_id_and_customer_id(&self, bridge_id: &str, customer_id: &str) -> u64 {
        self.table
            .count(&|p| p.bridge.id == bridge_id && p.bridge.customer_id == customer_id)
    }

    /// One page of a bridge's processors. Pages are 1-based; page 0 reads as page 1.
    /// Ids are paged first and the join fetch runs over those ids only, so the
    /// duplicated join rows never shift the page window.
    pub fn find_by_bridge_id_and_customer_id(
        &self,
        bridge_id: &str,
        customer_id: &str,
        page: u32,
        size: u32,
    ) -> ListResult<ProcessorDto> {
        let on_bridge =
            |p: &ProcessorDto| p.bridge.id == bridge_id && p.bridge.customer_id == customer_id;

        let total = self.table.count(&on_bridge);
        if total == 0 {
            return ListResult::empty(page);
        }

        let ids: HashSet<ProcessorId> = self
            .table
            .select_ids(&on_bridge, first_result(page, size), size as usize)
            .into_iter()
            .collect();
        let items = remove_duplicates(self.table.join_fetch(&|p| ids.contains(&p.id)));

        ListResult { items, page, total }
    }

    pub fn update_status(&self, id: &str, status: BridgeStatus) -> Result<ProcessorDto> {
        let current = self
            .find_by_id(id)?
            .ok_or_else(|| BridgeError::NotFound(format!("Processor {}", id)))?;
        let updated = current.with_status(status);
        self.table.upsert(updated.clone());
        Ok(updated)
    }
}

fn first_result(page: u32, size: u32) -> usize {
    page.saturating_sub(1) as usize * size as usize
}

/// Keep the first occurrence of each processor id
pub fn remove_duplicates(processors: Vec<ProcessorDto>) -> Vec<ProcessorDto> {
    let mut seen = HashSet::new();
    processors
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .collect()
}

/// Collapse a join-fetched result into at most one entity
pub fn single_result_from_list(processors: Vec<ProcessorDto>) -> Result<Option<ProcessorDto>> {
    let mut processors = remove_duplicates(processors);
    if processors.len() > 1 {
        return Err(BridgeError::InvariantViolated(format!(
            "{} entities returned from a query that should only return a single entity",
            processors.len()
        )));
    }
    Ok(processors.pop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, BridgeDto, Filter};

    fn bridge(id: &str, customer_id: &str) -> BridgeDto {
        BridgeDto::new(
            id,
            format!("bridge-{}", id),
            "http://ingress",
            customer_id,
            BridgeStatus::Available,
        )
    }

    fn processor(id: &str, name: &str, bridge: &BridgeDto, filters: usize) -> ProcessorDto {
        ProcessorDto {
            id: id.to_string(),
            name: name.to_string(),
            bridge: bridge.clone(),
            status: BridgeStatus::Available,
            filters: (0..filters)
                .map(|i| Filter::equals(format!("key{}", i), "value"))
                .collect(),
            transformation_template: None,
            action: Action::Log {
                name: "audit".to_string(),
            },
        }
    }

    #[test]
    fn test_join_fetch_repeats_parent_rows() {
        let table = InMemoryProcessorTable::new();
        let b1 = bridge("b1", "c1");
        table.upsert(processor("p1", "one", &b1, 3));
        table.upsert(processor("p2", "two", &b1, 0));

        assert_eq!(table.join_fetch(&|_| true).len(), 4);
        assert_eq!(table.count(&|_| true), 2);
    }

    #[test]
    fn test_multi_row_lookups_deduplicate() {
        let dao = ProcessorDao::in_memory();
        let b1 = bridge("b1", "c1");
        dao.persist(processor("p1", "one", &b1, 2));
        dao.persist(processor("p2", "two", &b1, 3));
        let mut pending = processor("p3", "three", &b1, 2);
        pending.status = BridgeStatus::Requested;
        dao.persist(pending);

        let found = dao.find_by_statuses(&[BridgeStatus::Available, BridgeStatus::Requested]);
        let ids: Vec<&str> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);

        let found = dao.find_by_statuses(&BridgeStatus::pending());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "p3");
    }

    #[test]
    fn test_single_result_lookups() {
        let dao = ProcessorDao::in_memory();
        let b1 = bridge("b1", "c1");
        dao.persist(processor("p1", "one", &b1, 4));

        let found = dao.find_by_bridge_id_and_name("b1", "one").unwrap();
        assert_eq!(found.map(|p| p.id), Some("p1".to_string()));

        assert!(dao.find_by_bridge_id_and_name("b1", "missing").unwrap().is_none());
        assert!(dao
            .find_by_id_bridge_id_and_customer_id("p1", "b1", "c1")
            .unwrap()
            .is_some());
        assert!(dao
            .find_by_id_bridge_id_and_customer_id("p1", "b1", "other-customer")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_more_than_one_row_is_an_invariant_violation() {
        let dao = ProcessorDao::in_memory();
        let b1 = bridge("b1", "c1");
        dao.persist(processor("p1", "same-name", &b1, 1));
        dao.persist(processor("p2", "same-name", &b1, 1));

        let result = dao.find_by_bridge_id_and_name("b1", "same-name");
        assert!(matches!(result, Err(BridgeError::InvariantViolated(_))));
    }

    #[test]
    fn test_pagination() {
        let dao = ProcessorDao::in_memory();
        let b1 = bridge("b1", "c1");
        for i in 1..=25 {
            dao.persist(processor(&format!("p{}", i), &format!("processor-{}", i), &b1, i % 3));
        }
        dao.persist(processor("other", "other", &bridge("b2", "c1"), 1));

        let page = dao.find_by_bridge_id_and_customer_id("b1", "c1", 2, 10);
        let ids: Vec<String> = page.items.iter().map(|p| p.id.clone()).collect();
        let expected: Vec<String> = (11..=20).map(|i| format!("p{}", i)).collect();
        assert_eq!(ids, expected);
        assert_eq!(page.page, 2);
        assert_eq!(page.total, 25);
        assert_eq!(dao.count_by_bridge_id_and_customer_id("b1", "c1"), 25);

        let last = dao.find_by_bridge_id_and_customer_id("b1", "c1", 3, 10);
        assert_eq!(last.items.len(), 5);

        let first = dao.find_by_bridge_id_and_customer_id("b1", "c1", 0, 10);
        assert_eq!(first.items[0].id, "p1");
    }

    #[test]
    fn test_empty_page() {
        let dao = ProcessorDao::in_memory();
        let page = dao.find_by_bridge_id_and_customer_id("b1", "c1", 1, 10);
        assert_eq!(page, ListResult::empty(1));
    }

    #[test]
    fn test_update_status() {
        let dao = ProcessorDao::in_memory();
        dao.persist(processor("p1", "one", &bridge("b1", "c1"), 2));

        let updated = dao.update_status("p1", BridgeStatus::DeletionRequested).unwrap();
        assert_eq!(updated.status, BridgeStatus::DeletionRequested);
        assert_eq!(dao.find_by_statuses(&[BridgeStatus::DeletionRequested]).len(), 1);

        assert!(matches!(
            dao.update_status("missing", BridgeStatus::Deleted),
            Err(BridgeError::NotFound(_))
        ));
    }
}
