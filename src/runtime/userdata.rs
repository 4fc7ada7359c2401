use super::TableRef;
use downcast::{downcast_sync, AnySync};
use parking_lot::Mutex;
use std::sync::Arc;

/// Opaque host data carried by userdata values.
pub trait HostData: AnySync {}
impl<T: std::any::Any + Send + Sync> HostData for T {}
downcast_sync!(dyn HostData);

pub(crate) struct UserdataObj {
    pub(crate) data: Arc<dyn HostData>,
    pub(crate) metatable: Mutex<Option<TableRef>>,
}

/// Boxed host object with an optional metatable. Equality is identity of the
/// host object, not of the box: a userdata re-boxed after weak-table
/// resurrection still compares equal to the original.
#[derive(Clone)]
pub struct UserdataRef(pub(crate) Arc<UserdataObj>);

impl UserdataRef {
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub(crate) fn host_id(&self) -> usize {
        Arc::as_ptr(&self.0.data) as *const () as usize
    }

    pub fn data<T: std::any::Any + Send + Sync>(&self) -> Option<&T> {
        self.0.data.as_ref().downcast_ref::<T>().ok()
    }

    pub(crate) fn host(&self) -> &Arc<dyn HostData> {
        &self.0.data
    }

    pub fn get_metatable(&self) -> Option<TableRef> {
        self.0.metatable.lock().clone()
    }

    pub fn set_metatable(&self, metatable: Option<&TableRef>) {
        *self.0.metatable.lock() = metatable.cloned();
    }
}

impl PartialEq for UserdataRef {
    fn eq(&self, other: &Self) -> bool {
        self.host_id() == other.host_id()
    }
}

impl Eq for UserdataRef {}

impl std::fmt::Debug for UserdataRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "userdata: {:#x}", self.id())
    }
}
