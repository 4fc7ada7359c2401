use super::function::FunctionObj;
use super::string_cache::StringCache;
use super::table::TableData;
use super::userdata::UserdataObj;
use super::{
    ByteString, FunctionRef, HostData, IntoMulti, TableRef, ThreadRef, UserdataRef, Varargs,
};
use crate::errors::RuntimeError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ORPHAN_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Tag method names, built once per runtime so lookups reuse the same
/// allocations.
pub(crate) struct TagNames {
    pub(crate) index: ByteString,
    pub(crate) newindex: ByteString,
    pub(crate) mode: ByteString,
    pub(crate) eq: ByteString,
    pub(crate) lt: ByteString,
    pub(crate) le: ByteString,
    pub(crate) add: ByteString,
    pub(crate) sub: ByteString,
    pub(crate) mul: ByteString,
    pub(crate) div: ByteString,
    pub(crate) modulo: ByteString,
    pub(crate) pow: ByteString,
    pub(crate) unm: ByteString,
    pub(crate) concat: ByteString,
}

impl Default for TagNames {
    fn default() -> Self {
        Self {
            index: ByteString::from("__index"),
            newindex: ByteString::from("__newindex"),
            mode: ByteString::from("__mode"),
            eq: ByteString::from("__eq"),
            lt: ByteString::from("__lt"),
            le: ByteString::from("__le"),
            add: ByteString::from("__add"),
            sub: ByteString::from("__sub"),
            mul: ByteString::from("__mul"),
            div: ByteString::from("__div"),
            modulo: ByteString::from("__mod"),
            pow: ByteString::from("__pow"),
            unm: ByteString::from("__unm"),
            concat: ByteString::from("__concat"),
        }
    }
}

/// The execution context. Owns the short string cache, the running-thread
/// slot, and the coroutine bookkeeping. Values created by one runtime are
/// not meant to cross into another.
pub struct Runtime {
    strings: Mutex<StringCache>,
    running: Mutex<ThreadRef>,
    main_thread: ThreadRef,
    orphan_check_interval: Mutex<Duration>,
    coroutine_count: AtomicUsize,
    tags: TagNames,
}

impl Runtime {
    pub fn new() -> Arc<Runtime> {
        Arc::new_cyclic(|weak| {
            let main_thread = ThreadRef::new_main(weak.clone());

            Runtime {
                strings: Mutex::new(StringCache::default()),
                running: Mutex::new(main_thread.clone()),
                main_thread,
                orphan_check_interval: Mutex::new(DEFAULT_ORPHAN_CHECK_INTERVAL),
                coroutine_count: AtomicUsize::new(0),
                tags: TagNames::default(),
            }
        })
    }

    /// Creates a string value, deduplicating short strings through the cache.
    pub fn intern_string(&self, bytes: &[u8]) -> ByteString {
        self.strings.lock().intern(bytes)
    }

    pub fn create_table(&self) -> TableRef {
        TableRef::new(TableData::new())
    }

    pub fn create_table_with(&self, narray: usize, nhash: usize) -> TableRef {
        TableRef::new(TableData::with_capacity(narray, nhash))
    }

    pub fn create_function<F>(&self, body: F) -> FunctionRef
    where
        F: Fn(Varargs, &Arc<Runtime>) -> Result<Varargs, RuntimeError> + Send + Sync + 'static,
    {
        FunctionRef(Arc::new(FunctionObj {
            body: Box::new(body),
        }))
    }

    pub fn create_userdata<T: HostData>(&self, data: T) -> UserdataRef {
        self.create_userdata_shared(Arc::new(data), None)
    }

    /// Userdata over an externally owned host object. Two userdata sharing a
    /// host compare equal and address the same table slots.
    pub fn create_userdata_shared(
        &self,
        data: Arc<dyn HostData>,
        metatable: Option<&TableRef>,
    ) -> UserdataRef {
        UserdataRef(Arc::new(UserdataObj {
            data,
            metatable: Mutex::new(metatable.cloned()),
        }))
    }

    pub fn create_coroutine(self: &Arc<Self>, function: FunctionRef) -> ThreadRef {
        ThreadRef::new(self, function)
    }

    pub fn main_thread(&self) -> &ThreadRef {
        &self.main_thread
    }

    pub fn running_thread(&self) -> ThreadRef {
        self.running.lock().clone()
    }

    pub(crate) fn swap_running(&self, thread: ThreadRef) -> ThreadRef {
        std::mem::replace(&mut *self.running.lock(), thread)
    }

    pub(crate) fn set_running(&self, thread: ThreadRef) {
        *self.running.lock() = thread;
    }

    /// Suspends the running coroutine, handing `results` to its resumer.
    /// Returns the next resume's arguments. Errors on the main thread.
    pub fn do_yield<A: IntoMulti>(self: &Arc<Self>, results: A) -> Result<Varargs, RuntimeError> {
        let results = results.into_multi(self)?;
        let thread = self.running_thread();

        if thread.is_main() {
            return Err(RuntimeError::YieldFromOutside);
        }

        // keep only the state alive while parked, so dropping every handle
        // orphans the coroutine
        let state = thread.0.state.clone();
        drop(thread);

        state.lua_yield(results)
    }

    /// How often a suspended coroutine wakes to check whether every handle to
    /// it was dropped.
    pub fn orphan_check_interval(&self) -> Duration {
        *self.orphan_check_interval.lock()
    }

    pub fn set_orphan_check_interval(&self, interval: Duration) {
        *self.orphan_check_interval.lock() = interval;
    }

    pub(crate) fn next_coroutine_id(&self) -> usize {
        self.coroutine_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn tags(&self) -> &TagNames {
        &self.tags
    }
}
