//! Read-through cache of loaded task records.
//!
//! The map lock covers membership only. Each slot carries its own record
//! lock and an async execution lock, so executions of different tasks never
//! contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::TaskRecord;

/// One cached task.
#[derive(Debug)]
pub(crate) struct TaskSlot {
    record: RwLock<TaskRecord>,
    /// Held for the whole of an execution or status callback.
    pub(crate) exec: tokio::sync::Mutex<()>,
}

impl TaskSlot {
    pub(crate) fn new(record: TaskRecord) -> Self {
        Self {
            record: RwLock::new(record),
            exec: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn record(&self) -> TaskRecord {
        self.record.read().clone()
    }

    pub(crate) fn set_record(&self, record: TaskRecord) {
        *self.record.write() = record;
    }
}

#[derive(Debug, Default)]
pub(crate) struct TaskCache {
    slots: RwLock<HashMap<Uuid, Arc<TaskSlot>>>,
}

impl TaskCache {
    pub(crate) fn get(&self, task_id: Uuid) -> Option<Arc<TaskSlot>> {
        self.slots.read().get(&task_id).cloned()
    }

    /// Inserts `record` unless the task is already cached, and returns the
    /// resident slot either way.
    pub(crate) fn get_or_insert(&self, record: TaskRecord) -> Arc<TaskSlot> {
        let mut slots = self.slots.write();
        Arc::clone(
            slots
                .entry(record.task_id)
                .or_insert_with(|| Arc::new(TaskSlot::new(record))),
        )
    }

    /// Inserts or refreshes `record`, keeping an existing slot's lock.
    pub(crate) fn upsert(&self, record: TaskRecord) -> Arc<TaskSlot> {
        let task_id = record.task_id;
        let mut slots = self.slots.write();
        match slots.get(&task_id) {
            Some(slot) => {
                slot.set_record(record);
                Arc::clone(slot)
            },
            None => {
                let slot = Arc::new(TaskSlot::new(record));
                slots.insert(task_id, Arc::clone(&slot));
                slot
            },
        }
    }

    pub(crate) fn remove(&self, task_id: Uuid) -> bool {
        self.slots.write().remove(&task_id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskStatus, TaskType};
    use serde_json::json;

    fn record() -> TaskRecord {
        TaskRecord::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            TaskType::WaitForEvent,
            json!({}),
        )
    }

    #[test]
    fn get_or_insert_keeps_resident_slot() {
        let cache = TaskCache::default();
        let first = record();
        let slot = cache.get_or_insert(first.clone());

        let mut newer = first.clone();
        newer.status = TaskStatus::InProgress;
        let again = cache.get_or_insert(newer.clone());
        assert!(Arc::ptr_eq(&slot, &again));
        assert_eq!(again.record().status, TaskStatus::Initialized);

        let refreshed = cache.upsert(newer);
        assert!(Arc::ptr_eq(&slot, &refreshed));
        assert_eq!(slot.record().status, TaskStatus::InProgress);
    }

    #[test]
    fn remove() {
        let cache = TaskCache::default();
        let r = record();
        cache.upsert(r.clone());
        assert_eq!(cache.len(), 1);
        assert!(cache.remove(r.task_id));
        assert!(cache.get(r.task_id).is_none());
        assert!(!cache.remove(r.task_id));
    }
}
