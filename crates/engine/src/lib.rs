pub mod collection;
pub mod commit;
pub mod config;
pub mod error;
pub mod manual_order;
pub mod merge;
pub mod reorder;
pub mod resolver;
pub mod snapshot;
pub mod staging;

pub use collection::{Collection, CollectionKind};
pub use commit::{CommitError, CommitPhase, CommitReport, FailedPhase, UploadFailure};
pub use config::{CollectionConfig, ConsoleConfig};
pub use error::EngineError;
pub use manual_order::{Customer, ManualOrder, OrderLine, Shipping};
pub use merge::{DisplayRow, ViewFilter};
pub use reorder::ReorderChannel;
pub use resolver::{Uploader, UploadOutcome};
pub use snapshot::{Snapshot, SnapshotOrigin};
pub use staging::{StagedEdit, StagingBuffer, StagingKind};

use parking_lot::Mutex;
use serde_json::Value;

use opsdesk_core::{
    AttachmentRef, EntityId, FieldValue, Fields, Record, RecordKey, StagedRecord, TempId,
};
use opsdesk_remote::{RemoteClient, Transport};
use opsdesk_storage::{SnapshotCache, SqliteCache};

use crate::reorder::OrderCommit;
use crate::resolver::ClientUploader;
use crate::staging::ReplaceStaging;

/// The ops console: orders and catalog, each with a snapshot and a staging
/// buffer, committed in batches over one RPC transport.
///
/// Every method takes `&self`; share it behind an `Arc` and concurrent tasks
/// contend for each collection's commit phase.
pub struct Console<T> {
    config: ConsoleConfig,
    client: RemoteClient<T>,
    orders: Collection,
    catalog: Collection,
    reorder: Mutex<ReorderChannel>,
    cache: Option<Mutex<SqliteCache>>,
}

impl<T: Transport> Console<T> {
    pub fn new(config: ConsoleConfig, transport: T) -> Self {
        let client = RemoteClient::new(transport, config.action.clone());
        Self {
            config,
            client,
            orders: Collection::new(CollectionKind::Orders),
            catalog: Collection::new(CollectionKind::Catalog),
            reorder: Mutex::new(ReorderChannel::new()),
            cache: None,
        }
    }

    /// Like [`Console::new`], also opening the snapshot cache at
    /// `config.cache_path` when one is set.
    pub fn open(config: ConsoleConfig, transport: T) -> Result<Self, EngineError> {
        let cache = match &config.cache_path {
            Some(path) => Some(SqliteCache::open(path)?),
            None => None,
        };
        let console = Self::new(config, transport);
        Ok(match cache {
            Some(cache) => console.with_cache(cache),
            None => console,
        })
    }

    pub fn with_cache(mut self, cache: SqliteCache) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn client(&self) -> &RemoteClient<T> {
        &self.client
    }

    pub fn collection(&self, kind: CollectionKind) -> &Collection {
        match kind {
            CollectionKind::Orders => &self.orders,
            CollectionKind::Catalog => &self.catalog,
        }
    }

    fn endpoints(&self, kind: CollectionKind) -> &CollectionConfig {
        match kind {
            CollectionKind::Orders => &self.config.orders,
            CollectionKind::Catalog => &self.config.catalog,
        }
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Installs cached snapshots for collections that have none yet.
    /// Returns how many were installed. Cache faults count as misses.
    pub fn load_cached(&self) -> usize {
        let Some(cache) = &self.cache else {
            return 0;
        };
        let mut installed = 0;
        for kind in [CollectionKind::Orders, CollectionKind::Catalog] {
            let collection = self.collection(kind);
            if collection.snapshot().origin() != SnapshotOrigin::Empty {
                continue;
            }
            let mut cache = cache.lock();
            match cache.load_snapshot(kind.as_str()) {
                Ok(Some(cached)) => {
                    collection.install_snapshot(Snapshot::from_cache(cached));
                    installed += 1;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(collection = %kind, error = %err, "snapshot cache unreadable; dropping entry");
                    if let Err(err) = cache.clear_snapshot(kind.as_str()) {
                        tracing::warn!(collection = %kind, error = %err, "snapshot cache entry not cleared");
                    }
                }
            }
        }
        installed
    }

    pub async fn refresh_orders(&self) -> Result<Snapshot, EngineError> {
        self.refresh(CollectionKind::Orders).await
    }

    pub async fn refresh_catalog(&self) -> Result<Snapshot, EngineError> {
        self.refresh(CollectionKind::Catalog).await
    }

    /// Refetches a whole collection and swaps its snapshot. Staging survives.
    async fn refresh(&self, kind: CollectionKind) -> Result<Snapshot, EngineError> {
        let endpoints = self.endpoints(kind);
        let records = self
            .client
            .fetch_records(&endpoints.fetch_action, &endpoints.data_key, &endpoints.id_field)
            .await?;
        let fetched_at = snapshot::now_ms();
        self.write_cache(kind, &records, fetched_at);

        let snapshot = Snapshot::from_remote(records, fetched_at);
        self.collection(kind).install_snapshot(snapshot.clone());
        if kind == CollectionKind::Catalog {
            let keys = row_keys(&self.catalog.view(&self.config.attachment_field));
            self.reorder.lock().on_snapshot_replaced(&keys);
        }
        Ok(snapshot)
    }

    fn write_cache(&self, kind: CollectionKind, records: &[Record], fetched_at_ms: i64) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(err) = cache.lock().store_snapshot(kind.as_str(), records, fetched_at_ms) {
            tracing::warn!(collection = %kind, error = %err, "snapshot cache write failed");
        }
    }

    // ========================================================================
    // Staging
    // ========================================================================

    pub fn record_order_patch(
        &self,
        id: &EntityId,
        field_key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Result<(), EngineError> {
        self.record_order_patches(id, Fields::from([(field_key.into(), value.into())]))
    }

    /// Several field writes to one order, as the detail form submits them.
    /// Touching the items or the shipping fee restates `total` from the
    /// order as it will look once the patch lands.
    pub fn record_order_patches(&self, id: &EntityId, mut fields: Fields) -> Result<(), EngineError> {
        if fields.contains_key(manual_order::ITEMS_FIELD)
            || fields.contains_key(manual_order::SHIPPING_FEE_FIELD)
        {
            let mut merged = self
                .orders
                .snapshot()
                .get(id)
                .map(|record| record.fields.clone())
                .unwrap_or_default();
            let staging = self.orders.staging();
            if let Some(staged) = staging.as_patch().and_then(|patches| patches.get(id)) {
                merged.extend(staged.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            if let Some(total) = manual_order::order_total(&merged)? {
                fields.insert(manual_order::TOTAL_FIELD.to_string(), FieldValue::Integer(total));
            }
        }
        self.orders.stage(StagedEdit::Patch {
            id: id.clone(),
            fields,
        })
    }

    /// A fresh key for a catalog item that does not exist remotely yet.
    pub fn new_catalog_key(&self) -> RecordKey {
        RecordKey::Temp(TempId::generate())
    }

    /// Validates and wraps a local file for staging on a catalog item.
    pub fn local_attachment(
        &self,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Result<AttachmentRef, EngineError> {
        Ok(self.config.attachments.local(file_name, mime_type, content)?)
    }

    /// The record an edit form should start from: the staged one if any,
    /// otherwise the snapshot's.
    pub fn catalog_draft(&self, key: &RecordKey) -> Option<StagedRecord> {
        if let Some(staged) = self.catalog.staged_record(key) {
            return Some(staged);
        }
        let id = key.entity_id()?;
        self.catalog
            .snapshot()
            .get(id)
            .map(|record| StagedRecord::from_record(record, &self.config.attachment_field))
    }

    /// Stages `record` as the full replacement for its key. URLs set directly
    /// on the attachment field join the attachment list.
    pub fn stage_catalog_record(&self, mut record: StagedRecord) -> Result<(), EngineError> {
        record.lift_attachment_field(&self.config.attachment_field);
        for attachment in &record.attachments {
            if let AttachmentRef::Local(local) = attachment {
                self.config
                    .attachments
                    .check(&local.file_name, &local.mime_type, local.content.len())?;
            }
        }
        self.catalog.stage(StagedEdit::Replace(record))
    }

    /// Drops a staged edit without touching the remote side.
    pub fn discard_staged(&self, kind: CollectionKind, key: &RecordKey) -> Result<bool, EngineError> {
        self.collection(kind).remove_staged(key)
    }

    pub fn orders_dirty(&self) -> bool {
        self.orders.is_dirty()
    }

    pub fn catalog_dirty(&self) -> bool {
        self.catalog.is_dirty()
    }

    pub fn staged_count(&self, kind: CollectionKind) -> usize {
        self.collection(kind).staged_len()
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn orders_view(&self) -> Vec<DisplayRow> {
        self.orders.view(&self.config.attachment_field)
    }

    /// Orders matching `text` over id, customer name and phone, optionally
    /// narrowed to one status.
    pub fn search_orders(&self, text: &str, status: Option<&str>) -> Vec<DisplayRow> {
        let mut filter = ViewFilter::search(&self.config.orders.search_fields, text);
        if let Some(status) = status {
            filter = filter.with_equals("status", status);
        }
        filter.apply(self.orders_view())
    }

    /// Merged catalog rows in the operator's staged order.
    pub fn catalog_view(&self) -> Vec<DisplayRow> {
        let rows = self.catalog.view(&self.config.attachment_field);
        self.reorder.lock().apply(rows)
    }

    pub fn search_catalog(&self, text: &str) -> Vec<DisplayRow> {
        ViewFilter::search(&self.config.catalog.search_fields, text).apply(self.catalog_view())
    }

    // ========================================================================
    // Commit
    // ========================================================================

    pub async fn commit_orders(&self) -> Result<CommitReport, EngineError> {
        self.commit(CollectionKind::Orders).await
    }

    pub async fn commit_catalog(&self) -> Result<CommitReport, EngineError> {
        self.commit(CollectionKind::Catalog).await
    }

    /// Sends every staged edit of `kind` in one batch call.
    ///
    /// Works on a copy of staging; the live buffer is cleared only once the
    /// server accepts the batch. Any failure leaves it exactly as it was.
    async fn commit(&self, kind: CollectionKind) -> Result<CommitReport, EngineError> {
        let guard = self.collection(kind).begin_commit()?;
        let staged = guard.staged();
        let mut report = CommitReport::empty(kind);
        if !staged.is_dirty() {
            tracing::info!(collection = %kind, "nothing to commit");
            return Ok(report);
        }

        let endpoints = self.endpoints(kind);
        let updates = match &staged {
            StagingBuffer::Patch(patches) => patches.build_batch(&endpoints.id_field),
            StagingBuffer::Replace(records) => {
                match self.resolve_replacements(kind, records, &mut report).await {
                    Ok(updates) => updates,
                    Err(err) => {
                        guard.advance(CommitPhase::Failed);
                        return Err(err.into());
                    }
                }
            }
        };
        report.committed = updates.len();

        guard.advance(CommitPhase::Transmitting);
        if let Err(err) = self.client.batch_update(&endpoints.batch_action, updates).await {
            guard.advance(CommitPhase::Failed);
            let err = CommitError::from_remote(kind, err);
            tracing::warn!(collection = %kind, error = %err, "commit failed; staging kept");
            return Err(err.into());
        }

        guard.advance(CommitPhase::Reconciling);
        guard.clear_staging();
        if let Err(err) = self.refresh(kind).await {
            tracing::warn!(collection = %kind, error = %err, "refresh after commit failed");
            report.refresh_error = Some(err.to_string());
        }
        tracing::info!(
            collection = %kind,
            committed = report.committed,
            uploaded = report.uploaded,
            upload_failures = report.upload_failures.len(),
            "commit complete"
        );
        Ok(report)
    }

    /// Uploads local attachments record by record and encodes the batch.
    async fn resolve_replacements(
        &self,
        kind: CollectionKind,
        records: &ReplaceStaging,
        report: &mut CommitReport,
    ) -> Result<Vec<Value>, CommitError> {
        let uploader = ClientUploader::new(&self.client, &self.config.upload_action);
        let id_field = &self.endpoints(kind).id_field;
        let mut updates = Vec::with_capacity(records.len());

        for staged in records.iter() {
            let record = if staged.has_local_attachments() {
                let group = resolver::upload_group(
                    staged,
                    &self.config.upload_group_field,
                    &self.config.default_upload_group,
                );
                let resolution = resolver::resolve(&uploader, staged.clone(), &group).await;
                for outcome in resolution.outcomes {
                    match outcome {
                        UploadOutcome::Uploaded { .. } => report.uploaded += 1,
                        UploadOutcome::Failed { file_name, error } => {
                            report.upload_failures.push(UploadFailure {
                                key: staged.key.clone(),
                                file_name,
                                error,
                            });
                        }
                    }
                }
                resolution.record
            } else {
                staged.clone()
            };
            let wire = record
                .to_wire(id_field, &self.config.attachment_field)
                .map_err(|source| CommitError::Encode {
                    collection: kind,
                    source,
                })?;
            updates.push(wire);
        }
        Ok(updates)
    }

    // ========================================================================
    // Immediate Operations
    // ========================================================================

    pub async fn delete_order(&self, id: &EntityId) -> Result<(), EngineError> {
        self.delete(CollectionKind::Orders, &RecordKey::Persisted(id.clone()))
            .await
    }

    pub async fn delete_catalog_item(&self, key: &RecordKey) -> Result<(), EngineError> {
        self.delete(CollectionKind::Catalog, key).await
    }

    /// Deletes at once, bypassing staging. A record that only exists in
    /// staging is dropped locally with no remote call.
    async fn delete(&self, kind: CollectionKind, key: &RecordKey) -> Result<(), EngineError> {
        let collection = self.collection(kind);
        let id = match key {
            RecordKey::Temp(_) => {
                collection.remove_staged(key)?;
                tracing::debug!(collection = %kind, %key, "unsaved record discarded");
                return Ok(());
            }
            RecordKey::Persisted(id) => id,
        };
        collection.ensure_idle()?;

        let endpoints = self.endpoints(kind);
        self.client
            .delete_record(&endpoints.delete_action, &endpoints.id_field, id)
            .await?;
        tracing::info!(collection = %kind, %key, "record deleted");

        if let Err(err) = collection.remove_staged(key) {
            tracing::warn!(collection = %kind, %key, error = %err, "staged edit for deleted record kept");
        }
        if let Err(err) = self.refresh(kind).await {
            tracing::warn!(collection = %kind, error = %err, "refresh after delete failed");
        }
        Ok(())
    }

    /// Creates an order immediately and refreshes the order list. Returns the
    /// server-assigned id when the server reports one.
    pub async fn create_order(&self, order: &ManualOrder) -> Result<Option<EntityId>, EngineError> {
        order.validate()?;
        let payload = order.to_json()?;
        let order_id = self
            .client
            .create(&self.config.create_order_action, "orderData", payload, "orderId")
            .await?;
        tracing::info!(order_id = ?order_id.as_ref().map(EntityId::as_str), "manual order created");
        if let Err(err) = self.refresh(CollectionKind::Orders).await {
            tracing::warn!(error = %err, "refresh after order creation failed");
        }
        Ok(order_id)
    }

    // ========================================================================
    // Catalog Order
    // ========================================================================

    /// Moves the catalog row at `from` to `to`, by position in
    /// [`Console::catalog_view`].
    pub fn reorder_catalog(&self, from: usize, to: usize) -> Result<(), EngineError> {
        let keys = row_keys(&self.catalog_view());
        self.reorder.lock().reorder(&keys, from, to)
    }

    pub fn catalog_order_dirty(&self) -> bool {
        self.reorder.lock().is_dirty()
    }

    /// Sends the staged catalog order. Returns `false` when there was nothing
    /// to send. Field staging is never touched.
    pub async fn commit_catalog_order(&self) -> Result<bool, EngineError> {
        let Some(commit) = OrderCommit::begin(&self.reorder)? else {
            return Ok(false);
        };
        self.client
            .reorder(&self.config.reorder_action, &commit.ids)
            .await?;
        tracing::info!(items = commit.ids.len(), revision = commit.revision, "catalog order committed");
        commit.succeed();
        Ok(true)
    }
}

fn row_keys(rows: &[DisplayRow]) -> Vec<RecordKey> {
    rows.iter().map(|row| row.key.clone()).collect()
}
