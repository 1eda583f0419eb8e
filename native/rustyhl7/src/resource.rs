//! ResourceArc Wrappers
//!
//! A parsed message lives in Rust memory between NIF calls. Elements are
//! positional views borrowed from the message, so only the message itself is
//! stored; every call resolves its paths afresh under the lock.

use std::sync::{Mutex, MutexGuard};

use log::debug;
use rustler::ResourceArc;

use crate::parser::Message;

/// Divider slots a stored message may keep cached between calls
pub const MAX_CACHED_DIVIDERS: usize = 4096;

/// Wrapper for a parsed `Message` that can be stored in a ResourceArc.
///
/// The message is not safe for concurrent mutation, so every access is
/// serialised by the mutex.
pub struct MessageResource {
    pub inner: Mutex<Message>,
}

impl MessageResource {
    pub fn new(message: Message) -> Self {
        MessageResource {
            inner: Mutex::new(message),
        }
    }

    /// Exclusive access to the message
    ///
    /// # Errors
    ///
    /// Returns `"mutex_poisoned"` if a previous holder panicked.
    pub fn lock(&self) -> Result<MutexGuard<'_, Message>, &'static str> {
        self.inner.lock().map_err(|_| "mutex_poisoned")
    }

    /// Run `f` under the lock. Afterwards the message's cached dividers are
    /// dropped if they have grown past `MAX_CACHED_DIVIDERS`, so a long-lived
    /// message does not accumulate one slot per position ever addressed.
    ///
    /// # Errors
    ///
    /// Returns `"mutex_poisoned"` if a previous holder panicked.
    pub fn with<R>(&self, f: impl FnOnce(&Message) -> R) -> Result<R, &'static str> {
        let mut message = self.lock()?;
        let result = f(&message);
        if message.divider_count() > MAX_CACHED_DIVIDERS {
            debug!("message holds {} divider slots, compacting", message.divider_count());
            message.compact();
        }
        Ok(result)
    }

    /// Current text of the message, copied out so the lock is not held
    /// while it is read.
    ///
    /// # Errors
    ///
    /// Returns `"mutex_poisoned"` if a previous holder panicked.
    pub fn snapshot(&self) -> Result<String, &'static str> {
        Ok(self.lock()?.to_string())
    }
}

#[rustler::resource_impl]
impl rustler::Resource for MessageResource {}

/// Type alias for the ResourceArc
pub type MessageRef = ResourceArc<MessageResource>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    #[test]
    fn test_snapshot_reflects_edits() {
        let resource = MessageResource::new(Message::parse("MSH|^~\\&|A\rPID|1").unwrap());
        resource.lock().unwrap().segment(2).descendant(1).set_value("2").unwrap();
        assert_eq!(resource.snapshot().unwrap(), "MSH|^~\\&|A\rPID|2");
    }

    #[test]
    fn test_cached_dividers_stay_bounded() {
        let resource = MessageResource::new(Message::parse("MSH|^~\\&|A\rPID|1").unwrap());
        for n in 0..10_000 {
            let value = resource
                .with(|message| message.segment(2).descendant(n + 2).value())
                .unwrap();
            assert_eq!(value, "");
        }
        let count = resource.lock().unwrap().divider_count();
        assert!(count <= MAX_CACHED_DIVIDERS, "{count} divider slots cached");
        assert_eq!(resource.snapshot().unwrap(), "MSH|^~\\&|A\rPID|1");
    }

    #[test]
    fn test_with_keeps_edits() {
        let resource = MessageResource::new(Message::parse("MSH|^~\\&|A\rPID|1").unwrap());
        resource.with(|message| message.set("PID.3", "x")).unwrap().unwrap();
        assert_eq!(resource.with(|message| message.get("PID.3")).unwrap().unwrap(), "x");
    }
}
