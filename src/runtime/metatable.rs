use super::coroutine::ThreadObj;
use super::function::FunctionObj;
use super::table_ref::{TableObj, TableRef};
use super::userdata::{HostData, UserdataObj, UserdataRef};
use super::{FunctionRef, ThreadRef, Value};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Weak reference to a single collectible value. Numbers, strings and
/// booleans never weaken. Userdata tracks both the visible box and the host
/// object underneath, so a dropped box resurrects as a fresh box around the
/// still-live host, keeping the metatable strongly.
pub(crate) enum WeakHandle {
    Table(Weak<TableObj>),
    Function(Weak<FunctionObj>),
    Thread(Weak<ThreadObj>),
    Userdata {
        boxed: Weak<UserdataObj>,
        host: Weak<dyn HostData>,
        metatable: Option<TableRef>,
    },
}

impl WeakHandle {
    pub(crate) fn weaken(value: &Value) -> Option<WeakHandle> {
        match value {
            Value::Table(table) => Some(WeakHandle::Table(Arc::downgrade(&table.0))),
            Value::Function(function) => Some(WeakHandle::Function(Arc::downgrade(&function.0))),
            Value::Thread(thread) => Some(WeakHandle::Thread(Arc::downgrade(&thread.0))),
            Value::Userdata(userdata) => Some(WeakHandle::Userdata {
                boxed: Arc::downgrade(&userdata.0),
                host: Arc::downgrade(userdata.host()),
                metatable: userdata.get_metatable(),
            }),
            _ => None,
        }
    }

    pub(crate) fn strengthen(&mut self) -> Option<Value> {
        match self {
            WeakHandle::Table(weak) => weak.upgrade().map(|obj| Value::Table(TableRef(obj))),
            WeakHandle::Function(weak) => {
                weak.upgrade().map(|obj| Value::Function(FunctionRef(obj)))
            }
            WeakHandle::Thread(weak) => weak.upgrade().map(|obj| Value::Thread(ThreadRef(obj))),
            WeakHandle::Userdata {
                boxed,
                host,
                metatable,
            } => {
                if let Some(obj) = boxed.upgrade() {
                    return Some(Value::Userdata(UserdataRef(obj)));
                }

                // box died, host survived: re-box
                let host_obj = host.upgrade()?;
                let reboxed = Arc::new(UserdataObj {
                    data: host_obj,
                    metatable: Mutex::new(metatable.clone()),
                });
                *boxed = Arc::downgrade(&reboxed);

                Some(Value::Userdata(UserdataRef(reboxed)))
            }
        }
    }
}

/// Hash part entry. Strength of each half is decided at insertion time by
/// the table's policy. A slot whose weak half died reads as absent; a live
/// slot holding a nil value is a tombstone left behind by removal.
pub(crate) enum Slot {
    Strong { key: Value, value: Value },
    WeakKey { key: WeakHandle, value: Value },
    WeakValue { key: Value, value: WeakHandle },
    WeakBoth { key: WeakHandle, value: WeakHandle },
}

impl Slot {
    pub(crate) fn resolve_pair(&mut self) -> Option<(Value, Value)> {
        match self {
            Slot::Strong { key, value } => Some((key.clone(), value.clone())),
            Slot::WeakKey { key, value } => key.strengthen().map(|k| (k, value.clone())),
            Slot::WeakValue { key, value } => value.strengthen().map(|v| (key.clone(), v)),
            Slot::WeakBoth { key, value } => {
                let key = key.strengthen()?;
                let value = value.strengthen()?;
                Some((key, value))
            }
        }
    }

    pub(crate) fn live_value(&mut self) -> Option<Value> {
        self.resolve_pair().map(|(_, value)| value)
    }

    pub(crate) fn is_dead(&mut self) -> bool {
        self.resolve_pair().is_none()
    }

    pub(crate) fn is_tombstone(&mut self) -> bool {
        self.resolve_pair()
            .map(|(_, value)| value.is_nil())
            .unwrap_or(false)
    }

    /// Turns the slot into a tombstone, dropping the value but keeping the
    /// key at its current strength.
    pub(crate) fn clear_value(&mut self) {
        let old = std::mem::replace(
            self,
            Slot::Strong {
                key: Value::Nil,
                value: Value::Nil,
            },
        );

        *self = match old {
            Slot::Strong { key, .. } | Slot::WeakValue { key, .. } => Slot::Strong {
                key,
                value: Value::Nil,
            },
            Slot::WeakKey { key, .. } | Slot::WeakBoth { key, .. } => Slot::WeakKey {
                key,
                value: Value::Nil,
            },
        };
    }
}

/// Array part cell.
pub(crate) enum ArrayCell {
    Nil,
    Strong(Value),
    Weak(WeakHandle),
}

fn resolve_array_cell(cell: &mut ArrayCell) -> Value {
    match cell {
        ArrayCell::Nil => Value::Nil,
        ArrayCell::Strong(value) => value.clone(),
        ArrayCell::Weak(handle) => match handle.strengthen() {
            Some(value) => value,
            None => {
                *cell = ArrayCell::Nil;
                Value::Nil
            }
        },
    }
}

/// Strength strategy derived from the metatable's `__mode` field. The table
/// engine routes every insertion and array read through its policy; swapping
/// the policy (a `__mode` change) rebuilds both parts.
pub(crate) trait MetatablePolicy: Send + Sync {
    fn use_weak_keys(&self) -> bool;
    fn use_weak_values(&self) -> bool;
    /// Builds the hash slot for an insertion. `None` means the entry is dead
    /// on arrival and should not be stored.
    fn entry(&self, key: Value, value: Value) -> Option<Slot>;
    fn wrap(&self, value: Value) -> ArrayCell;
    fn array_get(&self, cell: &mut ArrayCell) -> Value;
}

pub(crate) struct DefaultPolicy;

impl MetatablePolicy for DefaultPolicy {
    fn use_weak_keys(&self) -> bool {
        false
    }

    fn use_weak_values(&self) -> bool {
        false
    }

    fn entry(&self, key: Value, value: Value) -> Option<Slot> {
        Some(Slot::Strong { key, value })
    }

    fn wrap(&self, value: Value) -> ArrayCell {
        if value.is_nil() {
            ArrayCell::Nil
        } else {
            ArrayCell::Strong(value)
        }
    }

    fn array_get(&self, cell: &mut ArrayCell) -> Value {
        resolve_array_cell(cell)
    }
}

pub(crate) struct WeakPolicy {
    pub(crate) keys: bool,
    pub(crate) values: bool,
}

impl MetatablePolicy for WeakPolicy {
    fn use_weak_keys(&self) -> bool {
        self.keys
    }

    fn use_weak_values(&self) -> bool {
        self.values
    }

    fn entry(&self, key: Value, value: Value) -> Option<Slot> {
        let weak_value = if self.values {
            WeakHandle::weaken(&value)
        } else {
            None
        };

        if self.keys {
            if let Some(weak_key) = WeakHandle::weaken(&key) {
                return Some(match weak_value {
                    Some(weak_value) => Slot::WeakBoth {
                        key: weak_key,
                        value: weak_value,
                    },
                    None => Slot::WeakKey {
                        key: weak_key,
                        value,
                    },
                });
            }
        }

        Some(match weak_value {
            Some(weak_value) => Slot::WeakValue {
                key,
                value: weak_value,
            },
            None => Slot::Strong { key, value },
        })
    }

    fn wrap(&self, value: Value) -> ArrayCell {
        if value.is_nil() {
            return ArrayCell::Nil;
        }

        if self.values {
            if let Some(handle) = WeakHandle::weaken(&value) {
                return ArrayCell::Weak(handle);
            }
        }

        ArrayCell::Strong(value)
    }

    fn array_get(&self, cell: &mut ArrayCell) -> Value {
        resolve_array_cell(cell)
    }
}

static DEFAULT_POLICY: Lazy<Arc<DefaultPolicy>> = Lazy::new(|| Arc::new(DefaultPolicy));

pub(crate) fn default_policy() -> Arc<dyn MetatablePolicy> {
    DEFAULT_POLICY.clone()
}
