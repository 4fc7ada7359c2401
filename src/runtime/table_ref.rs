use super::table::TableData;
use super::{
    default_policy, get_metavalue, FromValue, IntoValue, MetatablePolicy, Runtime, Value,
    WeakPolicy,
};
use crate::errors::RuntimeError;
use parking_lot::Mutex;
use std::sync::Arc;

// matches stock Lua's MAXTAGLOOP
const METATABLE_CHAIN_LIMIT: usize = 100;

pub(crate) struct TableObj {
    pub(crate) data: Mutex<TableData>,
}

/// Shared handle to a table. Clones alias the same storage; equality is
/// identity.
#[derive(Clone)]
pub struct TableRef(pub(crate) Arc<TableObj>);

impl TableRef {
    pub(crate) fn new(data: TableData) -> Self {
        Self(Arc::new(TableObj {
            data: Mutex::new(data),
        }))
    }

    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn raw_get<K: IntoValue, V: FromValue>(
        &self,
        key: K,
        rt: &Arc<Runtime>,
    ) -> Result<V, RuntimeError> {
        let key = key.into_value(rt)?;
        let value = self.0.data.lock().raw_get(&key)?;
        V::from_value(value, rt)
    }

    pub fn raw_set<K: IntoValue, V: IntoValue>(
        &self,
        key: K,
        value: V,
        rt: &Arc<Runtime>,
    ) -> Result<(), RuntimeError> {
        let key = key.into_value(rt)?;
        let value = value.into_value(rt)?;
        self.0.data.lock().raw_set(key, value)
    }

    /// Raw lookup without conversions, usable before a `Runtime` handle is in
    /// reach (tag method resolution).
    pub(crate) fn raw_table_get(&self, key: &Value) -> Result<Value, RuntimeError> {
        self.0.data.lock().raw_get(key)
    }

    /// Lookup with `__index` dispatch: a nil direct result consults the
    /// metatable, chaining through table handlers up to a fixed depth.
    /// Handlers run with no table lock held.
    pub fn get<K: IntoValue, V: FromValue>(
        &self,
        key: K,
        rt: &Arc<Runtime>,
    ) -> Result<V, RuntimeError> {
        let key = key.into_value(rt)?;
        let mut table = self.clone();

        for _ in 0..METATABLE_CHAIN_LIMIT {
            let value = table.0.data.lock().raw_get(&key)?;

            if !value.is_nil() {
                return V::from_value(value, rt);
            }

            let index_tag = rt.tags().index.clone();

            let Some(handler) = get_metavalue(&Value::Table(table.clone()), &index_tag) else {
                return V::from_value(Value::Nil, rt);
            };

            match handler {
                Value::Function(function) => {
                    let result = function.call((Value::Table(table), key), rt)?;
                    return V::from_value(result.arg1(), rt);
                }
                Value::Table(next_table) => table = next_table,
                other => return Err(RuntimeError::InvalidIndex(other.type_name())),
            }
        }

        Err(RuntimeError::MetatableChainTooLong)
    }

    /// Store with `__newindex` dispatch. The handler only fires when the
    /// direct slot is absent; a present-but-nil slot (tombstone or interior
    /// array nil) writes directly.
    pub fn set<K: IntoValue, V: IntoValue>(
        &self,
        key: K,
        value: V,
        rt: &Arc<Runtime>,
    ) -> Result<(), RuntimeError> {
        let key = key.into_value(rt)?;
        let value = value.into_value(rt)?;
        let mut table = self.clone();

        for _ in 0..METATABLE_CHAIN_LIMIT {
            {
                let mut data = table.0.data.lock();

                if data.is_present(&key)? {
                    return data.raw_set(key, value);
                }
            }

            let newindex_tag = rt.tags().newindex.clone();

            let Some(handler) = get_metavalue(&Value::Table(table.clone()), &newindex_tag) else {
                return table.0.data.lock().raw_set(key, value);
            };

            match handler {
                Value::Function(function) => {
                    function.call((Value::Table(table), key, value), rt)?;
                    return Ok(());
                }
                Value::Table(next_table) => table = next_table,
                other => return Err(RuntimeError::InvalidIndex(other.type_name())),
            }
        }

        Err(RuntimeError::MetatableChainTooLong)
    }

    /// A border of the sequence part.
    pub fn length(&self) -> i32 {
        self.0.data.lock().length()
    }

    /// Stable enumeration step. Pass nil to start; returns `None` when
    /// exhausted. Errors when `previous` was never a key of this table.
    pub fn next<P: IntoValue>(
        &self,
        previous: P,
        rt: &Arc<Runtime>,
    ) -> Result<Option<(Value, Value)>, RuntimeError> {
        let previous = previous.into_value(rt)?;
        self.0.data.lock().next(&previous)
    }

    /// List insertion at 1-based `pos`, shifting later elements up. `pos` of
    /// zero appends. Spills past the array part through the normal `set`
    /// path.
    pub fn insert<V: IntoValue>(
        &self,
        pos: i32,
        value: V,
        rt: &Arc<Runtime>,
    ) -> Result<(), RuntimeError> {
        let length = self.length();
        let pos = if pos == 0 { length + 1 } else { pos };

        if pos < 1 || pos > length + 1 {
            return Err(RuntimeError::PositionOutOfBounds);
        }

        for i in (pos..=length).rev() {
            let shifted: Value = self.raw_get(i, rt)?;
            self.raw_set(i + 1, shifted, rt)?;
        }

        self.raw_set(pos, value, rt)
    }

    /// List removal at 1-based `pos`, shifting later elements down and
    /// returning the removed value. `pos` of zero removes the last element;
    /// removing from an empty table yields nil.
    pub fn remove(&self, pos: i32, rt: &Arc<Runtime>) -> Result<Value, RuntimeError> {
        let length = self.length();
        let pos = if pos == 0 { length } else { pos };

        if pos == 0 && length == 0 {
            return Ok(Value::Nil);
        }

        if pos < 1 || pos > length + 1 {
            return Err(RuntimeError::PositionOutOfBounds);
        }

        let removed: Value = self.raw_get(pos, rt)?;

        for i in pos..length {
            let shifted: Value = self.raw_get(i + 1, rt)?;
            self.raw_set(i, shifted, rt)?;
        }

        self.raw_set(length.max(pos), Value::Nil, rt)?;
        Ok(removed)
    }

    /// Count of live entries across both parts.
    pub fn key_count(&self) -> usize {
        self.0.data.lock().key_count()
    }

    /// Size of the allocated array part, nils included.
    pub fn array_length(&self) -> usize {
        self.0.data.lock().array_length()
    }

    /// Count of live hash-part entries.
    pub fn hash_length(&self) -> usize {
        self.0.data.lock().live_hash_count()
    }

    pub fn get_metatable(&self) -> Option<TableRef> {
        self.0.data.lock().metatable.clone()
    }

    /// Attaches (or clears) the metatable and re-reads `__mode`. A strength
    /// change rebuilds both parts under the new policy.
    pub fn set_metatable(
        &self,
        metatable: Option<&TableRef>,
        rt: &Arc<Runtime>,
    ) -> Result<(), RuntimeError> {
        let mut weak_keys = false;
        let mut weak_values = false;

        if let Some(metatable) = metatable {
            let mode: Value = metatable.raw_get(rt.tags().mode.clone(), rt)?;

            if let Value::String(mode) = mode {
                for byte in mode.as_bytes() {
                    match byte {
                        b'k' => weak_keys = true,
                        b'v' => weak_values = true,
                        _ => {}
                    }
                }
            }
        }

        let mut data = self.0.data.lock();
        data.metatable = metatable.cloned();

        let changed = weak_keys != data.policy.use_weak_keys()
            || weak_values != data.policy.use_weak_values();

        if changed {
            log::debug!(
                "table {:#x} mode change: weak_keys={weak_keys} weak_values={weak_values}",
                self.id()
            );

            let policy: Arc<dyn MetatablePolicy> = if weak_keys || weak_values {
                Arc::new(WeakPolicy {
                    keys: weak_keys,
                    values: weak_values,
                })
            } else {
                default_policy()
            };

            data.apply_policy(policy);
        }

        Ok(())
    }
}

impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TableRef {}

impl std::fmt::Debug for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "table: {:#x}", self.id())
    }
}
