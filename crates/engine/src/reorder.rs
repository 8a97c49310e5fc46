use std::collections::HashMap;

use parking_lot::Mutex;

use opsdesk_core::{EntityId, RecordKey};

use crate::error::EngineError;
use crate::merge::DisplayRow;

/// Operator-chosen ordering of the catalog, staged apart from field edits.
#[derive(Debug, Clone, Default)]
pub struct ReorderChannel {
    order: Vec<RecordKey>,
    dirty: bool,
    /// Bumped on every move so a commit can tell whether it sent the latest order.
    revision: u64,
    in_flight: bool,
}

impl ReorderChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn order(&self) -> &[RecordKey] {
        &self.order
    }

    /// Sorts `rows` by the staged order. Rows the order does not mention keep
    /// their relative position after the ones it does.
    pub fn apply(&self, rows: Vec<DisplayRow>) -> Vec<DisplayRow> {
        if self.order.is_empty() {
            return rows;
        }
        let position: HashMap<&RecordKey, usize> =
            self.order.iter().enumerate().map(|(i, k)| (k, i)).collect();
        let mut indexed: Vec<(usize, DisplayRow)> = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| (position.get(&row.key).copied().unwrap_or(self.order.len() + i), row))
            .collect();
        indexed.sort_by_key(|(rank, _)| *rank);
        indexed.into_iter().map(|(_, row)| row).collect()
    }

    /// Moves the row at `from` to `to` within `displayed`, the catalog exactly
    /// as the operator currently sees it.
    pub fn reorder(&mut self, displayed: &[RecordKey], from: usize, to: usize) -> Result<(), EngineError> {
        let len = displayed.len();
        for index in [from, to] {
            if index >= len {
                return Err(EngineError::IndexOutOfRange { index, len });
            }
        }
        if from == to {
            return Ok(());
        }
        let mut order = displayed.to_vec();
        let moved = order.remove(from);
        order.insert(to, moved);
        self.order = order;
        self.dirty = true;
        self.revision += 1;
        tracing::debug!(from, to, revision = self.revision, "catalog reordered");
        Ok(())
    }

    /// Follows a snapshot refresh. A committed order is dropped in favour of
    /// the server's; a pending one loses vanished keys and gains new ones.
    pub fn on_snapshot_replaced(&mut self, merged: &[RecordKey]) {
        if !self.dirty {
            self.order.clear();
            return;
        }
        self.order.retain(|key| merged.contains(key));
        for key in merged {
            if !self.order.contains(key) {
                self.order.push(key.clone());
            }
        }
    }

    fn persisted_ids(&self) -> Vec<EntityId> {
        self.order.iter().filter_map(RecordKey::entity_id).cloned().collect()
    }
}

/// Ids and revision captured when an order commit starts.
pub struct OrderCommit<'a> {
    channel: &'a Mutex<ReorderChannel>,
    pub ids: Vec<EntityId>,
    pub revision: u64,
}

impl<'a> OrderCommit<'a> {
    /// `None` when there is nothing to send.
    pub(crate) fn begin(channel: &'a Mutex<ReorderChannel>) -> Result<Option<Self>, EngineError> {
        let mut state = channel.lock();
        if state.in_flight {
            return Err(EngineError::ReorderInFlight);
        }
        if !state.dirty {
            return Ok(None);
        }
        state.in_flight = true;
        let skipped = state.order.iter().filter(|k| k.is_temp()).count();
        if skipped > 0 {
            tracing::debug!(skipped, "unsaved catalog items left out of order commit");
        }
        Ok(Some(Self {
            channel,
            ids: state.persisted_ids(),
            revision: state.revision,
        }))
    }

    /// Clears the dirty flag unless the order moved again while sending.
    pub(crate) fn succeed(self) {
        let mut state = self.channel.lock();
        if state.revision == self.revision {
            state.dirty = false;
        }
    }
}

impl Drop for OrderCommit<'_> {
    fn drop(&mut self) {
        self.channel.lock().in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdesk_core::{Fields, TempId};

    fn key(s: &str) -> RecordKey {
        RecordKey::parse(s).unwrap()
    }

    fn row(s: &str) -> DisplayRow {
        DisplayRow {
            key: key(s),
            fields: Fields::new(),
            modified: false,
            new: false,
            pending_uploads: 0,
        }
    }

    #[test]
    fn reorder_moves_and_marks_dirty() {
        let mut channel = ReorderChannel::new();
        let displayed = vec![key("P1"), key("P2"), key("P3")];
        channel.reorder(&displayed, 2, 0).unwrap();
        assert!(channel.is_dirty());
        assert_eq!(channel.order(), &[key("P3"), key("P1"), key("P2")]);

        let rows = channel.apply(vec![row("P1"), row("P2"), row("P3"), row("NEW_9")]);
        let keys: Vec<_> = rows.iter().map(|r| r.key.to_string()).collect();
        assert_eq!(keys, vec!["P3", "P1", "P2", "NEW_9"]);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut channel = ReorderChannel::new();
        let err = channel.reorder(&[key("P1")], 0, 1).unwrap_err();
        assert!(matches!(err, EngineError::IndexOutOfRange { index: 1, len: 1 }));
        assert!(!channel.is_dirty());
    }

    #[test]
    fn refresh_reconciles_dirty_and_drops_clean_order() {
        let mut channel = ReorderChannel::new();
        channel
            .reorder(&[key("P1"), key("P2"), key("P3")], 0, 2)
            .unwrap();
        channel.on_snapshot_replaced(&[key("P1"), key("P3"), key("P4")]);
        assert_eq!(channel.order(), &[key("P3"), key("P1"), key("P4")]);

        channel.dirty = false;
        channel.on_snapshot_replaced(&[key("P1")]);
        assert!(channel.order().is_empty());
    }

    #[test]
    fn commit_sends_persisted_ids_and_respects_later_moves() {
        let channel = Mutex::new(ReorderChannel::new());
        let temp = RecordKey::Temp(TempId::generate());
        channel
            .lock()
            .reorder(&[key("P1"), temp.clone(), key("P2")], 2, 0)
            .unwrap();

        let commit = OrderCommit::begin(&channel).unwrap().expect("dirty order");
        assert_eq!(commit.ids, vec![EntityId::new("P2").unwrap(), EntityId::new("P1").unwrap()]);
        assert!(matches!(OrderCommit::begin(&channel), Err(EngineError::ReorderInFlight)));

        // Moved again mid-flight: success must not mark the newer order clean.
        let displayed = channel.lock().order().to_vec();
        channel.lock().reorder(&displayed, 0, 1).unwrap();
        commit.succeed();
        assert!(channel.lock().is_dirty());
        assert!(OrderCommit::begin(&channel).unwrap().is_some());
    }

    #[test]
    fn clean_channel_has_nothing_to_commit() {
        let channel = Mutex::new(ReorderChannel::new());
        assert!(OrderCommit::begin(&channel).unwrap().is_none());
    }
}
