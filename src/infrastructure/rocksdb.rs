use crate::domain::audit::AuditLogEntry;
use crate::domain::money::Amount;
use crate::domain::ports::{PaymentStore, StoreOp};
use crate::domain::refund::{Refund, RefundId, RefundUpdate, ensure_within_cap};
use crate::domain::transaction::{Transaction, TransactionId, TransactionUpdate};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for transaction rows, keyed by transaction id.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for refund rows, keyed by refund id.
pub const CF_REFUNDS: &str = "refunds";
/// Column Family indexing refunds by transaction, keyed `{transaction_id}:{refund_id}`.
pub const CF_REFUND_INDEX: &str = "refunds_by_transaction";
/// Column Family for the append-only audit trail, keyed by entry uuid.
pub const CF_AUDIT: &str = "audit";

const COLUMN_FAMILIES: [&str; 4] = [CF_TRANSACTIONS, CF_REFUNDS, CF_REFUND_INDEX, CF_AUDIT];

fn index_prefix(transaction_id: &TransactionId) -> String {
    format!("{}:", transaction_id)
}

/// A persistent payment store backed by RocksDB.
///
/// Rows are stored as JSON in separate Column Families. Updates are read-modify-write,
/// so writers are serialized by an async mutex and each call commits one `WriteBatch`.
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance, creating missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::DatabaseError(format!("{} column family not found", name)))
    }

    /// Stages `ops` into one `WriteBatch`. Rows touched earlier in the same batch are
    /// taken from the pending maps rather than from disk.
    fn stage(&self, ops: Vec<StoreOp>) -> Result<WriteBatch> {
        let now = Utc::now();
        let mut batch = WriteBatch::default();
        let mut transactions: HashMap<TransactionId, Transaction> = HashMap::new();
        let mut refunds: HashMap<RefundId, Refund> = HashMap::new();

        for op in ops {
            match op {
                StoreOp::InsertTransaction(tx) => {
                    if transactions.contains_key(&tx.id)
                        || self.get_json::<Transaction>(CF_TRANSACTIONS, tx.id.as_str())?.is_some()
                    {
                        return Err(PaymentError::DatabaseError(format!(
                            "transaction {} already exists",
                            tx.id
                        )));
                    }
                    transactions.insert(tx.id.clone(), tx);
                }
                StoreOp::UpdateTransaction(id, update) => {
                    let mut tx = match transactions.remove(&id) {
                        Some(tx) => tx,
                        None => self
                            .get_json::<Transaction>(CF_TRANSACTIONS, id.as_str())?
                            .ok_or_else(|| {
                                PaymentError::DatabaseError(format!(
                                    "transaction {} does not exist",
                                    id
                                ))
                            })?,
                    };
                    update.apply(&mut tx, now);
                    transactions.insert(id, tx);
                }
                StoreOp::InsertRefund(refund) => {
                    if refunds.contains_key(&refund.id)
                        || self.get_json::<Refund>(CF_REFUNDS, refund.id.as_str())?.is_some()
                    {
                        return Err(PaymentError::DatabaseError(format!(
                            "refund {} already exists",
                            refund.id
                        )));
                    }
                    refunds.insert(refund.id.clone(), refund);
                }
                StoreOp::UpdateRefund(id, update) => {
                    let mut refund = match refunds.remove(&id) {
                        Some(refund) => refund,
                        None => self.get_json::<Refund>(CF_REFUNDS, id.as_str())?.ok_or_else(|| {
                            PaymentError::DatabaseError(format!("refund {} does not exist", id))
                        })?,
                    };
                    update.apply(&mut refund, now);
                    refunds.insert(id, refund);
                }
                StoreOp::AppendAudit(entry) => {
                    let cf = self.cf(CF_AUDIT)?;
                    batch.put_cf(cf, entry.id.as_bytes(), encode(&entry)?);
                }
            }
        }

        let cf = self.cf(CF_TRANSACTIONS)?;
        for (id, tx) in &transactions {
            batch.put_cf(cf, id.as_str().as_bytes(), encode(tx)?);
        }
        let cf = self.cf(CF_REFUNDS)?;
        let index = self.cf(CF_REFUND_INDEX)?;
        for (id, refund) in &refunds {
            batch.put_cf(cf, id.as_str().as_bytes(), encode(refund)?);
            let key = format!("{}{}", index_prefix(&refund.transaction_id), id);
            batch.put_cf(index, key.as_bytes(), b"");
        }
        Ok(batch)
    }

    /// Refunds of one transaction, read through the index. The scan seeks to the
    /// transaction's prefix and stops at the first key outside it.
    fn refunds_of(&self, transaction_id: &TransactionId) -> Result<Vec<Refund>> {
        let index = self.cf(CF_REFUND_INDEX)?;
        let prefix = index_prefix(transaction_id);
        let mode = IteratorMode::From(prefix.as_bytes(), Direction::Forward);

        let mut refunds = Vec::new();
        for item in self.db.iterator_cf(index, mode) {
            let (key, _) = item?;
            let Some(refund_id) = key.strip_prefix(prefix.as_bytes()) else {
                break;
            };
            let refund_id = std::str::from_utf8(refund_id)
                .map_err(|e| PaymentError::DatabaseError(format!("Corrupt refund index: {}", e)))?;
            if let Some(refund) = self.get_json::<Refund>(CF_REFUNDS, refund_id)? {
                refunds.push(refund);
            }
        }
        refunds.sort_by_key(|refund| refund.created_at);
        Ok(refunds)
    }

    async fn commit(&self, ops: Vec<StoreOp>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let batch = self.stage(ops)?;
        self.db.write(batch)?;
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| PaymentError::DatabaseError(format!("Serialization error: {}", e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| PaymentError::DatabaseError(format!("Deserialization error: {}", e)))
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn create_transaction(&self, tx: Transaction) -> Result<Transaction> {
        self.commit(vec![StoreOp::InsertTransaction(tx.clone())]).await?;
        Ok(tx)
    }

    async fn update_transaction(
        &self,
        id: &TransactionId,
        update: TransactionUpdate,
    ) -> Result<()> {
        self.commit(vec![StoreOp::UpdateTransaction(id.clone(), update)])
            .await
    }

    async fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        self.get_json(CF_TRANSACTIONS, id.as_str())
    }

    async fn create_refund(&self, refund: Refund) -> Result<()> {
        self.commit(vec![StoreOp::InsertRefund(refund)]).await
    }

    async fn create_refund_within_cap(&self, refund: Refund, cap: Amount) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let existing = self.refunds_of(&refund.transaction_id)?;
        ensure_within_cap(&existing, &refund, cap)?;
        let batch = self.stage(vec![StoreOp::InsertRefund(refund)])?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn update_refund(&self, id: &RefundId, update: RefundUpdate) -> Result<()> {
        self.commit(vec![StoreOp::UpdateRefund(id.clone(), update)])
            .await
    }

    async fn get_refund(&self, id: &RefundId) -> Result<Option<Refund>> {
        self.get_json(CF_REFUNDS, id.as_str())
    }

    async fn list_refunds(&self, transaction_id: &TransactionId) -> Result<Vec<Refund>> {
        self.refunds_of(transaction_id)
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> Result<()> {
        self.commit(vec![StoreOp::AppendAudit(entry)]).await
    }

    async fn run_batch(&self, ops: Vec<StoreOp>) -> Result<()> {
        self.commit(ops).await
    }

    async fn health_check(&self) -> bool {
        COLUMN_FAMILIES
            .iter()
            .all(|name| self.db.cf_handle(name).is_some())
    }
}
