//! The approval ledger.

use std::sync::Arc;

use escrowkit_types::{Address, ApprovedRecord, EscrowError, Result};

use crate::store::RecordStore;

/// Default storage key for the record collection
pub const DEFAULT_STORAGE_KEY: &str = "approvedEscrows";

/// Durable, exactly-once collection of approval records.
///
/// Records are kept in append order. Every successful [`append`] rewrites the
/// whole collection and flushes it before returning.
///
/// [`append`]: ApprovalLedger::append
pub struct ApprovalLedger {
    store: Arc<dyn RecordStore>,
    key: String,
    records: Vec<ApprovedRecord>,
}

impl ApprovalLedger {
    /// Open the ledger and restore previously persisted records
    pub fn open(store: Arc<dyn RecordStore>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let records = Self::load_all(store.as_ref(), &key)?;
        tracing::debug!(key = %key, records = records.len(), "Approval ledger loaded");
        Ok(Self {
            store,
            key,
            records,
        })
    }

    /// Read every record stored under `key`
    pub fn load_all(store: &dyn RecordStore, key: &str) -> Result<Vec<ApprovedRecord>> {
        match store.get(key)? {
            Some(bytes) if !bytes.is_empty() => Ok(serde_json::from_slice(&bytes)?),
            _ => Ok(Vec::new()),
        }
    }

    /// Append one record.
    ///
    /// Fails with `DuplicateRecord` if the contract already has a record; the
    /// stored collection is left untouched in that case.
    pub fn append(&mut self, record: ApprovedRecord) -> Result<()> {
        if self.contains(&record.tx) {
            return Err(EscrowError::DuplicateRecord {
                contract: record.tx.to_string(),
            });
        }

        let mut next = self.records.clone();
        next.push(record);
        self.persist(&next)?;
        self.records = next;
        Ok(())
    }

    /// Write `records` under the ledger key and flush
    fn persist(&self, records: &[ApprovedRecord]) -> Result<()> {
        let bytes = serde_json::to_vec(records)?;
        self.store.put(&self.key, &bytes)?;
        self.store.flush()?;
        Ok(())
    }

    pub fn contains(&self, contract: &Address) -> bool {
        self.records.iter().any(|r| &r.tx == contract)
    }

    pub fn get(&self, contract: &Address) -> Option<&ApprovedRecord> {
        self.records.iter().find(|r| &r.tx == contract)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in append order
    pub fn records(&self) -> &[ApprovedRecord] {
        &self.records
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Delete every record from memory and storage. Returns how many were removed.
    pub fn clear(&mut self) -> Result<usize> {
        self.store.remove(&self.key)?;
        self.store.flush()?;
        let removed = self.records.len();
        self.records.clear();
        tracing::info!(key = %self.key, removed, "Approval ledger cleared");
        Ok(removed)
    }
}

impl std::fmt::Debug for ApprovalLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalLedger")
            .field("key", &self.key)
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SledStore};
    use escrowkit_types::Wei;

    fn record(byte: u8) -> ApprovedRecord {
        ApprovedRecord {
            tx: Address::from_bytes([byte; 20]),
            arbiter: Address::from_bytes([0xa1; 20]),
            beneficiary: Address::from_bytes([0xb2; 20]),
            sender_address: Address::from_bytes([0xa1; 20]),
            value: Wei::from_ether(1),
        }
    }

    #[test]
    fn test_append_rejects_duplicate_contract() {
        let mut ledger = ApprovalLedger::open(Arc::new(MemoryStore::new()), DEFAULT_STORAGE_KEY).unwrap();
        ledger.append(record(1)).unwrap();

        let err = ledger.append(record(1)).unwrap_err();
        assert!(err.is_benign());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_records_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Arc::new(SledStore::open(dir.path()).unwrap());
            let mut ledger = ApprovalLedger::open(store, DEFAULT_STORAGE_KEY).unwrap();
            ledger.append(record(1)).unwrap();
            ledger.append(record(2)).unwrap();
        }

        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let ledger = ApprovalLedger::open(store, DEFAULT_STORAGE_KEY).unwrap();
        assert_eq!(ledger.records(), &[record(1), record(2)]);
    }

    #[test]
    fn test_persisted_format() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = ApprovalLedger::open(store.clone(), DEFAULT_STORAGE_KEY).unwrap();
        ledger.append(record(0xcc)).unwrap();

        let bytes = store.get(DEFAULT_STORAGE_KEY).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let entry = &json[0];
        assert_eq!(entry["tx"], format!("0x{}", "cc".repeat(20)));
        assert_eq!(entry["senderAddress"], format!("0x{}", "a1".repeat(20)));
        assert_eq!(entry["value"], "1000000000000000000");
    }

    #[test]
    fn test_loads_legacy_big_number_values() {
        let store = Arc::new(MemoryStore::new());
        let legacy = format!(
            r#"[{{"tx":"0x{c}","arbiter":"0x{a}","beneficiary":"0x{b}","senderAddress":"0x{a}","value":{{"type":"BigNumber","hex":"0x0de0b6b3a7640000"}}}}]"#,
            c = "cc".repeat(20),
            a = "a1".repeat(20),
            b = "b2".repeat(20),
        );
        store.put(DEFAULT_STORAGE_KEY, legacy.as_bytes()).unwrap();

        let ledger = ApprovalLedger::open(store, DEFAULT_STORAGE_KEY).unwrap();
        assert_eq!(ledger.records()[0].value, Wei::from_ether(1));
    }

    #[test]
    fn test_failed_write_keeps_view_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = ApprovalLedger::open(store.clone(), DEFAULT_STORAGE_KEY).unwrap();
        ledger.append(record(1)).unwrap();

        store.set_read_only(true);
        let err = ledger.append(record(2)).unwrap_err();
        assert_eq!(err.error_code(), "STORAGE_ERROR");
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.contains(&record(2).tx));
    }

    #[test]
    fn test_corrupt_collection_is_a_storage_error() {
        let store = Arc::new(MemoryStore::new());
        store.put(DEFAULT_STORAGE_KEY, b"{not json").unwrap();
        let err = ApprovalLedger::open(store, DEFAULT_STORAGE_KEY).unwrap_err();
        assert!(matches!(err, EscrowError::Storage { .. }));
    }

    #[test]
    fn test_clear_removes_everything() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = ApprovalLedger::open(store.clone(), DEFAULT_STORAGE_KEY).unwrap();
        ledger.append(record(1)).unwrap();
        assert_eq!(ledger.clear().unwrap(), 1);
        assert!(ledger.is_empty());
        assert_eq!(store.get(DEFAULT_STORAGE_KEY).unwrap(), None);
    }
}
