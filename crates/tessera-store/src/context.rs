//! Transaction context: cached KV access, block header, gas and events

use crate::error::{Result, StoreError};
use crate::event::AbciEvent;
use crate::gas::{GasConfig, GasMeter};
use crate::kv::{CacheStore, KvPair, KvRead, Order, WriteSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Bound;

/// Header of the block being executed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub chain_id: String,
    pub height: u64,
    pub time: DateTime<Utc>,
}

impl BlockHeader {
    pub fn new(chain_id: impl Into<String>, height: u64, time: DateTime<Utc>) -> Self {
        Self {
            chain_id: chain_id.into(),
            height,
            time,
        }
    }

    /// Block time in unix milliseconds
    pub fn time_ms(&self) -> i64 {
        self.time.timestamp_millis()
    }
}

/// The only handle modules get on state
///
/// Writes land in a private cache over the parent layer and reach it only
/// through [`Context::into_parts`] or a successful [`Context::cache_context`].
pub struct Context<'a> {
    store: CacheStore<'a>,
    header: BlockHeader,
    gas: GasMeter,
    gas_config: GasConfig,
    events: Vec<AbciEvent>,
}

impl<'a> Context<'a> {
    pub fn new(parent: &'a dyn KvRead, header: BlockHeader, gas: GasMeter) -> Self {
        Self {
            store: CacheStore::new(parent),
            header,
            gas,
            gas_config: GasConfig::default(),
            events: Vec::new(),
        }
    }

    pub fn with_gas_config(mut self, gas_config: GasConfig) -> Self {
        self.gas_config = gas_config;
        self
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn block_height(&self) -> u64 {
        self.header.height
    }

    pub fn block_time(&self) -> DateTime<Utc> {
        self.header.time
    }

    /// Block time in unix milliseconds
    pub fn block_time_ms(&self) -> i64 {
        self.header.time_ms()
    }

    pub fn chain_id(&self) -> &str {
        &self.header.chain_id
    }

    pub fn gas_meter(&self) -> &GasMeter {
        &self.gas
    }

    /// Charge gas outside of KV access
    pub fn consume_gas(&mut self, amount: u64, descriptor: &str) -> Result<()> {
        self.gas.consume(amount, descriptor)
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self.store.get(key);
        let len = value.as_ref().map_or(0, |v| v.len()) as u64;
        self.gas.consume(
            self.gas_config.read_cost_flat + self.gas_config.read_cost_per_byte * len,
            "read",
        )?;
        Ok(value)
    }

    pub fn has(&mut self, key: &[u8]) -> Result<bool> {
        self.gas.consume(self.gas_config.has_cost, "has")?;
        Ok(self.store.get(key).is_some())
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let len = (key.len() + value.len()) as u64;
        self.gas.consume(
            self.gas_config.write_cost_flat + self.gas_config.write_cost_per_byte * len,
            "write",
        )?;
        self.store.set(key, value);
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.gas.consume(self.gas_config.delete_cost, "delete")?;
        self.store.delete(key);
        Ok(())
    }

    /// Ordered snapshot of the entries between the bounds
    pub fn range(
        &mut self,
        start: Bound<&[u8]>,
        end: Bound<&[u8]>,
        order: Order,
    ) -> Result<Vec<KvPair>> {
        let entries = self.store.range(start, end, order);
        let bytes: u64 = entries
            .iter()
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum();
        let cost = self.gas_config.iter_next_cost_flat * entries.len() as u64
            + self.gas_config.read_cost_per_byte * bytes;
        self.gas.consume(cost, "iterate")?;
        Ok(entries)
    }

    pub fn emit(&mut self, event: AbciEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[AbciEvent] {
        &self.events
    }

    /// Run `f` on a nested branch; its writes and events are kept only on `Ok`
    ///
    /// Gas used by the branch is always charged to this context.
    pub fn cache_context<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut Context<'_>) -> std::result::Result<T, E>,
    {
        let gas = match self.gas.remaining() {
            Some(remaining) => GasMeter::new(remaining),
            None => GasMeter::infinite(),
        };
        let (result, used, writes, events) = {
            let mut child = Context {
                store: CacheStore::new(&self.store),
                header: self.header.clone(),
                gas,
                gas_config: self.gas_config,
                events: Vec::new(),
            };
            let result = f(&mut child);
            let used = child.gas.consumed();
            let (writes, events, _) = child.into_parts();
            (result, used, writes, events)
        };
        self.gas.consume(used, "cache context")?;
        if result.is_ok() {
            self.store.merge(writes);
            self.events.extend(events);
        }
        result
    }

    /// Pending writes, emitted events and gas used
    pub fn into_parts(self) -> (WriteSet, Vec<AbciEvent>, u64) {
        let used = self.gas.consumed();
        (self.store.into_writes(), self.events, used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::CommitStore;
    use chrono::TimeZone;

    fn header() -> BlockHeader {
        BlockHeader::new("tessera-test", 10, Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    #[test]
    fn test_branch_commits_on_ok() {
        let store = CommitStore::new();
        let mut ctx = Context::new(&store, header(), GasMeter::infinite());
        let out: std::result::Result<u8, StoreError> = ctx.cache_context(|child| {
            child.set(b"k".to_vec(), b"v".to_vec())?;
            child.emit(AbciEvent::new("touched"));
            Ok(1)
        });
        assert_eq!(out, Ok(1));
        assert_eq!(ctx.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(ctx.events().len(), 1);
    }

    #[test]
    fn test_branch_discards_on_err() {
        let store = CommitStore::new();
        let mut ctx = Context::new(&store, header(), GasMeter::infinite());
        let out: std::result::Result<(), StoreError> = ctx.cache_context(|child| {
            child.set(b"k".to_vec(), b"v".to_vec())?;
            child.emit(AbciEvent::new("touched"));
            Err(StoreError::NotFound("nope".into()))
        });
        assert!(out.is_err());
        assert_eq!(ctx.get(b"k").unwrap(), None);
        assert!(ctx.events().is_empty());
    }

    #[test]
    fn test_branch_sees_parent_writes() {
        let store = CommitStore::new();
        let mut ctx = Context::new(&store, header(), GasMeter::infinite());
        ctx.set(b"a".to_vec(), b"1".to_vec()).unwrap();
        let seen: std::result::Result<Option<Vec<u8>>, StoreError> =
            ctx.cache_context(|child| child.get(b"a"));
        assert_eq!(seen.unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_out_of_gas_aborts_write() {
        let store = CommitStore::new();
        let mut ctx = Context::new(&store, header(), GasMeter::new(100));
        let err = ctx.set(b"k".to_vec(), b"v".to_vec()).unwrap_err();
        assert!(matches!(err, StoreError::OutOfGas { .. }));
    }

    #[test]
    fn test_branch_gas_charged_to_parent() {
        let store = CommitStore::new();
        let mut ctx = Context::new(&store, header(), GasMeter::new(1_000_000));
        let _: std::result::Result<(), StoreError> = ctx.cache_context(|child| {
            child.set(b"k".to_vec(), b"v".to_vec())?;
            Err(StoreError::NotFound("rolled back".into()))
        });
        assert!(ctx.gas_meter().consumed() > 0);
    }

    #[test]
    fn test_into_parts_commits() {
        let store = CommitStore::new();
        let (writes, _, _) = {
            let mut ctx = Context::new(&store, header(), GasMeter::infinite());
            ctx.set(b"x".to_vec(), b"y".to_vec()).unwrap();
            ctx.into_parts()
        };
        store.commit(writes, 10);
        assert_eq!(store.get(b"x"), Some(b"y".to_vec()));
    }
}
