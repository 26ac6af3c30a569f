//! Typed collections over namespaced keys
//!
//! Values are bincode-encoded. Keys are `namespace ++ KeyCodec(key)`. Each
//! module declares its collections as `const` items with distinct,
//! non-nested namespaces.

use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::key::{prefix_end, KeyCodec};
use crate::kv::Order;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::ops::Bound;

fn encode_value<V: Serialize>(value: &V) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Encoding(e.to_string()))
}

fn decode_value<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Decoding(e.to_string()))
}

/// A single value stored under a fixed key
pub struct Item<V> {
    key: &'static [u8],
    _value: PhantomData<fn() -> V>,
}

impl<V> Item<V>
where
    V: Serialize + DeserializeOwned,
{
    pub const fn new(key: &'static [u8]) -> Self {
        Self {
            key,
            _value: PhantomData,
        }
    }

    pub fn may_load(&self, ctx: &mut Context<'_>) -> Result<Option<V>> {
        ctx.get(self.key)?.map(|b| decode_value(&b)).transpose()
    }

    pub fn load(&self, ctx: &mut Context<'_>) -> Result<V> {
        self.may_load(ctx)?
            .ok_or_else(|| StoreError::NotFound(String::from_utf8_lossy(self.key).into_owned()))
    }

    pub fn exists(&self, ctx: &mut Context<'_>) -> Result<bool> {
        ctx.has(self.key)
    }

    pub fn save(&self, ctx: &mut Context<'_>, value: &V) -> Result<()> {
        ctx.set(self.key.to_vec(), encode_value(value)?)
    }

    pub fn remove(&self, ctx: &mut Context<'_>) -> Result<()> {
        ctx.delete(self.key)
    }
}

/// An ordered map from typed keys to typed values
pub struct Map<K, V> {
    namespace: &'static [u8],
    _entry: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Map<K, V>
where
    K: KeyCodec,
    V: Serialize + DeserializeOwned,
{
    pub const fn new(namespace: &'static [u8]) -> Self {
        Self {
            namespace,
            _entry: PhantomData,
        }
    }

    fn raw_key(&self, key: &K) -> Vec<u8> {
        let mut out = self.namespace.to_vec();
        key.encode_key(&mut out);
        out
    }

    fn ns_end(&self) -> Bound<Vec<u8>> {
        match prefix_end(self.namespace) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        }
    }

    fn scan_raw(
        &self,
        ctx: &mut Context<'_>,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
        order: Order,
    ) -> Result<Vec<(Vec<u8>, V)>> {
        let entries = ctx.range(as_ref_bound(&start), as_ref_bound(&end), order)?;
        entries
            .into_iter()
            .map(|(k, v)| {
                let suffix = k
                    .strip_prefix(self.namespace)
                    .ok_or_else(|| StoreError::InvalidKey("key outside namespace".into()))?
                    .to_vec();
                Ok((suffix, decode_value(&v)?))
            })
            .collect()
    }

    pub fn may_load(&self, ctx: &mut Context<'_>, key: &K) -> Result<Option<V>> {
        ctx.get(&self.raw_key(key))?
            .map(|b| decode_value(&b))
            .transpose()
    }

    pub fn load(&self, ctx: &mut Context<'_>, key: &K) -> Result<V> {
        self.may_load(ctx, key)?.ok_or_else(|| {
            StoreError::NotFound(format!(
                "{}{}",
                String::from_utf8_lossy(self.namespace),
                hex::encode(key.to_key_bytes())
            ))
        })
    }

    pub fn has(&self, ctx: &mut Context<'_>, key: &K) -> Result<bool> {
        ctx.has(&self.raw_key(key))
    }

    pub fn save(&self, ctx: &mut Context<'_>, key: &K, value: &V) -> Result<()> {
        ctx.set(self.raw_key(key), encode_value(value)?)
    }

    pub fn remove(&self, ctx: &mut Context<'_>, key: &K) -> Result<()> {
        ctx.delete(&self.raw_key(key))
    }

    /// Entries with keys inside the bounds
    pub fn range(
        &self,
        ctx: &mut Context<'_>,
        min: Bound<&K>,
        max: Bound<&K>,
        order: Order,
    ) -> Result<Vec<(K, V)>> {
        let start = match min {
            Bound::Included(k) => Bound::Included(self.raw_key(k)),
            Bound::Excluded(k) => Bound::Excluded(self.raw_key(k)),
            Bound::Unbounded => Bound::Included(self.namespace.to_vec()),
        };
        let end = match max {
            Bound::Included(k) => Bound::Included(self.raw_key(k)),
            Bound::Excluded(k) => Bound::Excluded(self.raw_key(k)),
            Bound::Unbounded => self.ns_end(),
        };
        self.scan_raw(ctx, start, end, order)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_key_bytes(&k)?, v)))
            .collect()
    }

    /// Every entry, ascending by key
    pub fn all(&self, ctx: &mut Context<'_>) -> Result<Vec<(K, V)>> {
        self.range(ctx, Bound::Unbounded, Bound::Unbounded, Order::Ascending)
    }

    pub fn keys(&self, ctx: &mut Context<'_>, order: Order) -> Result<Vec<K>> {
        Ok(self
            .range(ctx, Bound::Unbounded, Bound::Unbounded, order)?
            .into_iter()
            .map(|(k, _)| k)
            .collect())
    }

    /// Delete every entry in the namespace
    pub fn clear(&self, ctx: &mut Context<'_>) -> Result<usize> {
        let keys = self.scan_raw(
            ctx,
            Bound::Included(self.namespace.to_vec()),
            self.ns_end(),
            Order::Ascending,
        )?;
        let count = keys.len();
        for (suffix, _) in keys {
            let mut key = self.namespace.to_vec();
            key.extend_from_slice(&suffix);
            ctx.delete(&key)?;
        }
        Ok(count)
    }
}

impl<A, B, V> Map<(A, B), V>
where
    A: KeyCodec,
    B: KeyCodec,
    V: Serialize + DeserializeOwned,
{
    /// Entries under the first key component, bounded on the second
    pub fn prefix_range(
        &self,
        ctx: &mut Context<'_>,
        prefix: &A,
        min: Bound<&B>,
        max: Bound<&B>,
        order: Order,
    ) -> Result<Vec<(B, V)>> {
        let mut base = self.namespace.to_vec();
        prefix.encode_key(&mut base);
        let with = |b: &B| {
            let mut key = base.clone();
            b.encode_key(&mut key);
            key
        };
        let start = match min {
            Bound::Included(b) => Bound::Included(with(b)),
            Bound::Excluded(b) => Bound::Excluded(with(b)),
            Bound::Unbounded => Bound::Included(base.clone()),
        };
        let end = match max {
            Bound::Included(b) => Bound::Included(with(b)),
            Bound::Excluded(b) => Bound::Excluded(with(b)),
            Bound::Unbounded => match prefix_end(&base) {
                Some(end) => Bound::Excluded(end),
                None => Bound::Unbounded,
            },
        };
        let prefix_len = base.len() - self.namespace.len();
        self.scan_raw(ctx, start, end, order)?
            .into_iter()
            .map(|(k, v)| Ok((B::from_key_bytes(&k[prefix_len..])?, v)))
            .collect()
    }

    /// Every entry under the first key component, ascending
    pub fn prefix(&self, ctx: &mut Context<'_>, prefix: &A) -> Result<Vec<(B, V)>> {
        self.prefix_range(
            ctx,
            prefix,
            Bound::Unbounded,
            Bound::Unbounded,
            Order::Ascending,
        )
    }
}

fn as_ref_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(b) => Bound::Included(b.as_slice()),
        Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}
