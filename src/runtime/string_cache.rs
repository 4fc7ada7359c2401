use super::ByteString;
use rustc_hash::FxHasher;
use std::hash::Hasher;

const CACHE_SLOTS: usize = 128;
const SHORT_STRING_LEN: usize = 32;

/// Direct mapped cache of recently created short strings. A hit returns the
/// cached allocation, a miss evicts whatever occupied the slot. Strings over
/// [`SHORT_STRING_LEN`] bytes bypass the cache entirely.
pub(crate) struct StringCache {
    slots: Vec<Option<ByteString>>,
}

impl Default for StringCache {
    fn default() -> Self {
        Self {
            slots: vec![None; CACHE_SLOTS],
        }
    }
}

impl StringCache {
    pub(crate) fn intern(&mut self, bytes: &[u8]) -> ByteString {
        if bytes.len() > SHORT_STRING_LEN {
            return ByteString::from(bytes);
        }

        let mut hasher = FxHasher::default();
        hasher.write(bytes);
        let index = hasher.finish() as usize % CACHE_SLOTS;

        if let Some(existing) = &self.slots[index] {
            if existing.as_bytes() == bytes {
                return existing.clone();
            }
        }

        let string = ByteString::from(bytes);
        self.slots[index] = Some(string.clone());
        string
    }
}
