use super::{
    default_policy, ArrayCell, ByteString, MetatablePolicy, Slot, TableRef, Value,
};
use crate::errors::RuntimeError;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;

/// Normalized key identity for the hash part. Doubles that survived
/// [`normalize_key`] are never exact integers, so storing raw bits keeps
/// `Hash`/`Eq` total. Reference types hash by allocation address; userdata by
/// the host object so re-boxed userdata find the same slot. Strength is the
/// slot's concern, never the key's.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub(crate) enum SlotKey {
    Boolean(bool),
    Integer(i32),
    DoubleBits(u64),
    String(ByteString),
    Identity(usize),
}

impl SlotKey {
    pub(crate) fn from_value(value: &Value) -> Result<SlotKey, RuntimeError> {
        match value {
            Value::Nil => Err(RuntimeError::NilTableKey),
            Value::Boolean(b) => Ok(SlotKey::Boolean(*b)),
            Value::Integer(i) => Ok(SlotKey::Integer(*i)),
            Value::Double(d) if d.is_nan() => Err(RuntimeError::NanTableKey),
            Value::Double(d) => {
                let narrowed = *d as i32;

                if narrowed as f64 == *d {
                    Ok(SlotKey::Integer(narrowed))
                } else {
                    Ok(SlotKey::DoubleBits(d.to_bits()))
                }
            }
            Value::String(s) => Ok(SlotKey::String(s.clone())),
            Value::Table(t) => Ok(SlotKey::Identity(t.id())),
            Value::Function(f) => Ok(SlotKey::Identity(f.id())),
            Value::Userdata(u) => Ok(SlotKey::Identity(u.host_id())),
            Value::Thread(t) => Ok(SlotKey::Identity(t.id())),
        }
    }
}

/// Rejects nil and NaN keys and folds exact-integer doubles into `Integer`,
/// so `t[2.0]` and `t[2]` address the same slot.
pub(crate) fn normalize_key(key: Value) -> Result<Value, RuntimeError> {
    match key {
        Value::Nil => Err(RuntimeError::NilTableKey),
        Value::Double(d) if d.is_nan() => Err(RuntimeError::NanTableKey),
        Value::Double(d) => {
            let narrowed = d as i32;

            if narrowed as f64 == d {
                Ok(Value::Integer(narrowed))
            } else {
                Ok(Value::Double(d))
            }
        }
        other => Ok(other),
    }
}

/// Hybrid table storage: a dense array part for the `1..=len` integer range
/// and an insertion-ordered hash part for everything else. Lives behind the
/// owning [`TableRef`]'s mutex.
pub(crate) struct TableData {
    pub(crate) array: Vec<ArrayCell>,
    pub(crate) hash: IndexMap<SlotKey, Slot, FxBuildHasher>,
    pub(crate) metatable: Option<TableRef>,
    pub(crate) policy: Arc<dyn MetatablePolicy>,
    // upper bound; purges reset it
    tombstones: usize,
}

impl TableData {
    pub(crate) fn new() -> Self {
        Self::with_capacity(0, 0)
    }

    pub(crate) fn with_capacity(narray: usize, nhash: usize) -> Self {
        Self {
            array: Vec::with_capacity(narray),
            hash: IndexMap::with_capacity_and_hasher(nhash, FxBuildHasher),
            metatable: None,
            policy: default_policy(),
            tombstones: 0,
        }
    }

    fn array_get(&mut self, index: usize) -> Value {
        let policy = self.policy.clone();

        match self.array.get_mut(index) {
            Some(cell) => policy.array_get(cell),
            None => Value::Nil,
        }
    }

    pub(crate) fn raw_get(&mut self, key: &Value) -> Result<Value, RuntimeError> {
        let key = normalize_key(key.clone())?;

        if let Value::Integer(i) = key {
            if i >= 1 && i as usize <= self.array.len() {
                return Ok(self.array_get(i as usize - 1));
            }
        }

        let slot_key = SlotKey::from_value(&key)?;

        let Some(slot) = self.hash.get_mut(&slot_key) else {
            return Ok(Value::Nil);
        };

        Ok(slot.live_value().unwrap_or(Value::Nil))
    }

    pub(crate) fn raw_set(&mut self, key: Value, value: Value) -> Result<(), RuntimeError> {
        let key = normalize_key(key)?;

        if let Value::Integer(i) = key {
            if i >= 1 {
                let index = (i - 1) as usize;

                if index < self.array.len() {
                    self.set_in_array(index, value);
                    return Ok(());
                }

                if index == self.array.len() && !value.is_nil() {
                    let policy = self.policy.clone();
                    self.array.push(policy.wrap(value));
                    // a tombstone for this key may be shadowed now
                    self.hash.shift_remove(&SlotKey::Integer(i));
                    self.migrate_from_hash();
                    return Ok(());
                }
            }
        }

        let slot_key = SlotKey::from_value(&key)?;

        if value.is_nil() {
            let dead = match self.hash.get_mut(&slot_key) {
                Some(slot) => slot.is_dead(),
                None => return Ok(()),
            };

            if dead {
                self.hash.shift_remove(&slot_key);
            } else if let Some(slot) = self.hash.get_mut(&slot_key) {
                if !slot.is_tombstone() {
                    slot.clear_value();
                    self.tombstones += 1;
                }
            }

            return Ok(());
        }

        let policy = self.policy.clone();

        let Some(new_slot) = policy.entry(key, value) else {
            return Ok(());
        };

        if let Some(existing) = self.hash.get_mut(&slot_key) {
            if existing.is_tombstone() {
                self.tombstones = self.tombstones.saturating_sub(1);
            }

            *existing = new_slot;
            return Ok(());
        }

        self.maybe_purge_tombstones();
        self.hash.insert(slot_key, new_slot);
        Ok(())
    }

    /// True when the slot for this key exists and is not dead. Tombstones
    /// count as present, which is what keeps `__newindex` away from removed
    /// keys.
    pub(crate) fn is_present(&mut self, key: &Value) -> Result<bool, RuntimeError> {
        let key = normalize_key(key.clone())?;

        if let Value::Integer(i) = key {
            if i >= 1 && i as usize <= self.array.len() {
                return Ok(true);
            }
        }

        let slot_key = SlotKey::from_value(&key)?;

        match self.hash.get_mut(&slot_key) {
            Some(slot) => Ok(!slot.is_dead()),
            None => Ok(false),
        }
    }

    fn set_in_array(&mut self, index: usize, value: Value) {
        let policy = self.policy.clone();

        if value.is_nil() && index + 1 == self.array.len() {
            // clearing the last cell truncates the trailing nil run
            self.array.pop();

            loop {
                let trailing_nil = match self.array.last_mut() {
                    Some(cell) => policy.array_get(cell).is_nil(),
                    None => break,
                };

                if !trailing_nil {
                    break;
                }

                self.array.pop();
            }
        } else {
            self.array[index] = policy.wrap(value);
        }
    }

    /// After an append, pulls integer keys that became contiguous out of the
    /// hash part.
    fn migrate_from_hash(&mut self) {
        loop {
            let next_index = self.array.len() as i64 + 1;

            if next_index > i32::MAX as i64 {
                break;
            }

            let slot_key = SlotKey::Integer(next_index as i32);

            let value = match self.hash.get_mut(&slot_key) {
                Some(slot) => slot.live_value(),
                None => break,
            };

            let Some(value) = value else {
                self.hash.shift_remove(&slot_key);
                break;
            };

            if value.is_nil() {
                // tombstone marks the border
                break;
            }

            let policy = self.policy.clone();
            self.array.push(policy.wrap(value));
            self.hash.shift_remove(&slot_key);
        }
    }

    fn maybe_purge_tombstones(&mut self) {
        if self.tombstones * 2 <= self.hash.len() {
            return;
        }

        log::trace!("purging {} table tombstones", self.tombstones);
        self.hash
            .retain(|_, slot| !slot.is_dead() && !slot.is_tombstone());
        self.tombstones = 0;
    }

    /// A border of the sequence part: `t[n]` non-nil and `t[n + 1]` nil.
    /// Exact when the array has no interior nils, otherwise any border found
    /// by binary search.
    pub(crate) fn length(&mut self) -> i32 {
        let len = self.array.len();

        if len == 0 {
            return 0;
        }

        if !self.array_get(len - 1).is_nil() {
            return len as i32;
        }

        let (mut low, mut high) = (0, len);

        while high - low > 1 {
            let mid = (low + high) / 2;

            if self.array_get(mid - 1).is_nil() {
                high = mid;
            } else {
                low = mid;
            }
        }

        low as i32
    }

    /// Enumeration step: array indices in ascending order, then hash entries
    /// in insertion order. Dead weak slots encountered along the way are
    /// removed; tombstones are skipped but keep their position.
    pub(crate) fn next(&mut self, previous: &Value) -> Result<Option<(Value, Value)>, RuntimeError> {
        let mut array_start = 0;
        let mut hash_start = None;

        if !previous.is_nil() {
            let key = normalize_key(previous.clone())?;

            match key {
                Value::Integer(i) if i >= 1 && i as usize <= self.array.len() => {
                    array_start = i as usize;
                }
                other => {
                    let slot_key = SlotKey::from_value(&other)?;

                    let Some(index) = self.hash.get_index_of(&slot_key) else {
                        return Err(RuntimeError::InvalidNextKey);
                    };

                    hash_start = Some(index + 1);
                }
            }
        }

        if hash_start.is_none() {
            let policy = self.policy.clone();

            for index in array_start..self.array.len() {
                let value = policy.array_get(&mut self.array[index]);

                if !value.is_nil() {
                    return Ok(Some((Value::Integer(index as i32 + 1), value)));
                }
            }

            hash_start = Some(0);
        }

        let mut index = hash_start.unwrap_or(0);

        while index < self.hash.len() {
            let resolved = match self.hash.get_index_mut(index) {
                Some((_, slot)) => slot.resolve_pair(),
                None => break,
            };

            match resolved {
                None => {
                    // dead slot; prune and retry the same position
                    self.hash.shift_remove_index(index);
                }
                Some((_, value)) if value.is_nil() => index += 1,
                Some(pair) => return Ok(Some(pair)),
            }
        }

        Ok(None)
    }

    /// Count of live entries across both parts. Linear.
    pub(crate) fn key_count(&mut self) -> usize {
        let policy = self.policy.clone();
        let mut count = 0;

        for cell in &mut self.array {
            if !policy.array_get(cell).is_nil() {
                count += 1;
            }
        }

        count + self.live_hash_count()
    }

    pub(crate) fn array_length(&self) -> usize {
        self.array.len()
    }

    pub(crate) fn live_hash_count(&mut self) -> usize {
        let mut count = 0;

        for slot in self.hash.values_mut() {
            if !slot.is_dead() && !slot.is_tombstone() {
                count += 1;
            }
        }

        count
    }

    /// Rebuilds both parts through a new strength policy. Runs on `__mode`
    /// changes; dead entries and tombstones are dropped along the way.
    pub(crate) fn apply_policy(&mut self, policy: Arc<dyn MetatablePolicy>) {
        let old_hash = std::mem::take(&mut self.hash);

        for (slot_key, mut slot) in old_hash {
            let Some((key, value)) = slot.resolve_pair() else {
                continue;
            };

            if value.is_nil() {
                continue;
            }

            if let Some(new_slot) = policy.entry(key, value) {
                self.hash.insert(slot_key, new_slot);
            }
        }

        self.tombstones = 0;

        let old_policy = std::mem::replace(&mut self.policy, policy);

        for cell in &mut self.array {
            let value = old_policy.array_get(cell);
            *cell = self.policy.wrap(value);
        }
    }
}
