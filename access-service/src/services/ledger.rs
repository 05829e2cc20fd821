//! Access ledger: bounded, append-only log of validation attempts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::{AccessAction, AccessEvent, Outcome};
use crate::services::error::ServiceError;
use crate::services::metrics::LEDGER_EVICTIONS;

/// Optional filters for `AccessLedger::query`; unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub staff_id: Option<String>,
    pub action: Option<AccessAction>,
    pub outcome: Option<Outcome>,
    pub holder_id: Option<Uuid>,
    pub credential_code: Option<String>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub to: Option<DateTime<Utc>>,
    /// Calendar day (UTC) of the event.
    pub date: Option<NaiveDate>,
}

impl EventFilter {
    pub fn matches(&self, event: &AccessEvent) -> bool {
        self.staff_id.as_ref().is_none_or(|s| *s == event.staff_id)
            && self.action.is_none_or(|a| a == event.action)
            && self.outcome.is_none_or(|o| o == event.outcome)
            && self.holder_id.is_none_or(|h| Some(h) == event.holder_id)
            && self
                .credential_code
                .as_ref()
                .is_none_or(|c| *c == event.credential_code)
            && self.from.is_none_or(|from| event.timestamp >= from)
            && self.to.is_none_or(|to| event.timestamp <= to)
            && self
                .date
                .is_none_or(|d| event.timestamp.date_naive() == d)
    }
}

/// One page of events, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct EventPage {
    pub events: Vec<AccessEvent>,
    pub page: usize,
    pub size: usize,
    /// Matching events across all pages.
    pub total: usize,
    pub total_pages: usize,
}

/// Held append lock on an `AccessLedger`.
pub struct LedgerWriter<'a> {
    capacity: usize,
    events: MutexGuard<'a, VecDeque<AccessEvent>>,
}

impl LedgerWriter<'_> {
    pub fn append(mut self, event: AccessEvent) {
        while self.events.len() >= self.capacity {
            self.events.pop_front();
            LEDGER_EVICTIONS.inc();
        }
        debug!(event_id = %event.event_id, "Access event appended");
        self.events.push_back(event);
    }
}

pub struct AccessLedger {
    capacity: usize,
    events: Mutex<VecDeque<AccessEvent>>,
}

impl AccessLedger {
    pub fn new(capacity: usize) -> Result<Self, ServiceError> {
        if capacity == 0 {
            return Err(ServiceError::InvalidInput(
                "ledger capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<AccessEvent>>, ServiceError> {
        self.events.lock().map_err(|e| {
            error!("Access ledger mutex poisoned");
            ServiceError::StoreInvariantViolation(format!("access ledger mutex poisoned: {}", e))
        })
    }

    /// Take the append lock ahead of time.
    ///
    /// Work done while the writer is held is followed by an append that cannot
    /// fail, so a state change and its event land together or not at all.
    pub fn writer(&self) -> Result<LedgerWriter<'_>, ServiceError> {
        Ok(LedgerWriter {
            capacity: self.capacity,
            events: self.lock()?,
        })
    }

    /// Append an event, evicting the oldest once at capacity.
    pub fn append(&self, event: AccessEvent) -> Result<(), ServiceError> {
        self.writer()?.append(event);
        Ok(())
    }

    /// Filter, then paginate (zero-based `page`), newest first.
    pub fn query(
        &self,
        filter: &EventFilter,
        page: usize,
        size: usize,
    ) -> Result<EventPage, ServiceError> {
        if size == 0 {
            return Err(ServiceError::InvalidInput(
                "page size must be positive".to_string(),
            ));
        }

        let events = self.lock()?;
        let matching: Vec<&AccessEvent> = events.iter().rev().filter(|e| filter.matches(e)).collect();
        let total = matching.len();

        let page_events = matching
            .into_iter()
            .skip(page.saturating_mul(size))
            .take(size)
            .cloned()
            .collect();

        Ok(EventPage {
            events: page_events,
            page,
            size,
            total,
            total_pages: total.div_ceil(size),
        })
    }

    /// Copy of all retained events, oldest first.
    pub fn snapshot(&self) -> Result<Vec<AccessEvent>, ServiceError> {
        Ok(self.lock()?.iter().cloned().collect())
    }

    pub fn find(&self, event_id: Uuid) -> Result<Option<AccessEvent>, ServiceError> {
        Ok(self
            .lock()?
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned())
    }

    pub fn len(&self) -> Result<usize, ServiceError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, ServiceError> {
        Ok(self.lock()?.is_empty())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fails once the ledger lock has been poisoned.
    pub fn health_check(&self) -> Result<(), ServiceError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
impl AccessLedger {
    /// Poison the append lock by panicking while it is held.
    pub(crate) fn poison(&self) {
        std::thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = self.events.lock();
                    panic!("access ledger poisoned on purpose");
                })
                .join();
        });
    }
}
