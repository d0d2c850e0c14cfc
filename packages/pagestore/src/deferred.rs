//! Deferred queries: submit now, resolve together later.
//!
//! Queries are pushed onto a bounded queue through a shared reference, then
//! resolved as one batch in parallel. Results stay available until the batch
//! is disposed, which also happens implicitly on any store mutation.

use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_queue::ArrayQueue;
use rayon::prelude::*;

use crate::archetype::ArchetypeRegistry;
use crate::error::{StoreError, StoreResult};
use crate::mask::{ComponentMask, ComponentTypeId};
use crate::query::{scan, QueryResult};

/// A ticket for a submitted query.
///
/// The high 32 bits are the batch generation, the low 32 bits the ticket
/// within that batch.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(u64);

impl QueryHandle {
    fn new(batch: u32, ticket: u32) -> QueryHandle {
        QueryHandle((batch as u64) << 32 | ticket as u64)
    }

    /// Return the batch this query belongs to.
    pub fn batch(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Return the ticket of this query within its batch.
    pub fn ticket(&self) -> u32 {
        self.0 as u32
    }

    /// Return the raw bits of this handle.
    pub fn to_bits(&self) -> u64 {
        self.0
    }
}

impl Display for QueryHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.batch(), self.ticket())
    }
}

impl Debug for QueryHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "QueryHandle({})", self)
    }
}

struct PendingQuery {
    ticket: u32,
    mask: ComponentMask,
    components: Vec<ComponentTypeId>,
}

struct ResolvedBatch {
    batch: u32,
    // Borrows archetype pages. Dropped before any mutation of the store.
    results: HashMap<u32, QueryResult<'static>>,
}

pub(crate) struct DeferredQueries {
    queue: ArrayQueue<PendingQuery>,
    next_ticket: AtomicU32,
    batch: u32,
    resolved: Option<ResolvedBatch>,
}

impl DeferredQueries {
    pub fn new(capacity: usize) -> DeferredQueries {
        DeferredQueries {
            queue: ArrayQueue::new(capacity),
            next_ticket: AtomicU32::new(0),
            batch: 0,
            resolved: None,
        }
    }

    /// Return the number of queries waiting to be resolved.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue a query for the next resolve.
    pub fn submit(&self, mask: ComponentMask, components: Vec<ComponentTypeId>) -> StoreResult<QueryHandle> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let query = PendingQuery { ticket, mask, components };

        if self.queue.push(query).is_err() {
            log::warn!("deferred query queue is full ({} pending)", self.queue.capacity());
            return Err(StoreError::QueryQueueFull);
        }

        Ok(QueryHandle::new(self.batch, ticket))
    }

    /// Resolve every queued query against `archetypes`.
    ///
    /// Returns the number of queries resolved.
    pub fn resolve(&mut self, archetypes: &ArchetypeRegistry) -> StoreResult<usize> {
        if self.resolved.is_some() {
            log::error!("resolve_pending_queries: batch {} was never disposed", self.batch.wrapping_sub(1));
            return Err(StoreError::UndisposedQueries);
        }

        let mut pending = Vec::with_capacity(self.queue.len());
        while let Some(query) = self.queue.pop() {
            pending.push(query);
        }

        let results = pending.par_iter()
            .map(|query| {
                let result = scan(archetypes, &query.mask, &query.components);
                // Only reachable through `get`, which re-borrows the store.
                let result: QueryResult<'static> = unsafe { std::mem::transmute(result) };
                (query.ticket, result)
            })
            .collect::<HashMap<_, _>>();

        let batch = self.batch;
        self.batch = self.batch.wrapping_add(1);
        self.next_ticket.store(0, Ordering::Relaxed);

        log::debug!("resolved {} deferred queries in batch {}", results.len(), batch);
        self.resolved = Some(ResolvedBatch { batch, results });
        Ok(pending.len())
    }

    /// Get the result of a resolved query.
    pub fn get(&self, handle: QueryHandle) -> Option<&QueryResult<'_>> {
        let result = self.resolved.as_ref()
            .filter(|resolved| resolved.batch == handle.batch())
            .and_then(|resolved| resolved.results.get(&handle.ticket()));

        if result.is_none() {
            log::error!("resolved_query: handle {} does not refer to a resolved query", handle);
        }
        result
    }

    /// Drop the resolved batch, if any.
    pub fn dispose(&mut self) {
        if let Some(resolved) = self.resolved.take() {
            log::trace!("disposed {} results of batch {}", resolved.results.len(), resolved.batch);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_handle_bits() {
        let handle = QueryHandle::new(3, 9);
        assert_eq!(handle.batch(), 3);
        assert_eq!(handle.ticket(), 9);
        assert_eq!(handle.to_bits(), 3 << 32 | 9);
        assert_eq!(handle.to_string(), "3#9");
    }

    #[test]
    fn test_queue_bound() {
        let deferred = DeferredQueries::new(2);
        let mask = ComponentMask::empty(4);
        deferred.submit(mask.clone(), Vec::new()).unwrap();
        deferred.submit(mask.clone(), Vec::new()).unwrap();
        assert_eq!(deferred.submit(mask, Vec::new()), Err(StoreError::QueryQueueFull));
        assert_eq!(deferred.pending(), 2);
    }
}
