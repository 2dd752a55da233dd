//! Typed per-request attachments.
//!
//! Plugins share state across stages of one request through [`Attachments`].
//! Each slot is addressed by a named [`AttachmentKey`] that also fixes the
//! value type, so a reader can never observe a value of the wrong type.
//!
//! ```
//! use docgate_core::{AttachmentKey, Attachments};
//!
//! const TRAIL: AttachmentKey<Vec<String>> = AttachmentKey::new("trail");
//!
//! let mut attachments = Attachments::default();
//! attachments.put(&TRAIL, vec!["x".to_string()]);
//! assert_eq!(attachments.get(&TRAIL).map(Vec::len), Some(1));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// A named, typed key into [`Attachments`].
pub struct AttachmentKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttachmentKey<T> {
    /// Creates a key. Keys with the same name address the same slot.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Returns the key name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for AttachmentKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttachmentKey<T> {}

impl<T> fmt::Debug for AttachmentKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttachmentKey").field(&self.name).finish()
    }
}

/// Type-safe per-request storage.
#[derive(Default)]
pub struct Attachments {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl Attachments {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, returning the previous one when it had the same type.
    pub fn put<T: Send + Sync + 'static>(&mut self, key: &AttachmentKey<T>, value: T) -> Option<T> {
        self.values
            .insert(key.name, Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|previous| *previous)
    }

    /// Returns a reference to the value, if present.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: &AttachmentKey<T>) -> Option<&T> {
        self.values.get(key.name).and_then(|v| v.downcast_ref::<T>())
    }

    /// Returns a mutable reference to the value, if present.
    pub fn get_mut<T: Send + Sync + 'static>(&mut self, key: &AttachmentKey<T>) -> Option<&mut T> {
        self.values
            .get_mut(key.name)
            .and_then(|v| v.downcast_mut::<T>())
    }

    /// Removes and returns the value.
    pub fn remove<T: Send + Sync + 'static>(&mut self, key: &AttachmentKey<T>) -> Option<T> {
        self.values
            .remove(key.name)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Returns `true` if a value of the key's type is present.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self, key: &AttachmentKey<T>) -> bool {
        self.get(key).is_some()
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Attachments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Attachments").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNT: AttachmentKey<u32> = AttachmentKey::new("count");
    const SHADOW: AttachmentKey<String> = AttachmentKey::new("count");

    #[test]
    fn test_put_get_remove() {
        let mut attachments = Attachments::new();
        assert!(attachments.is_empty());

        assert_eq!(attachments.put(&COUNT, 1), None);
        assert_eq!(attachments.put(&COUNT, 2), Some(1));
        assert_eq!(attachments.get(&COUNT), Some(&2));

        if let Some(count) = attachments.get_mut(&COUNT) {
            *count += 1;
        }
        assert_eq!(attachments.remove(&COUNT), Some(3));
        assert!(!attachments.contains(&COUNT));
    }

    #[test]
    fn test_same_name_other_type_is_not_visible() {
        let mut attachments = Attachments::new();
        attachments.put(&COUNT, 7);
        assert!(attachments.get(&SHADOW).is_none());

        assert_eq!(attachments.put(&SHADOW, "seven".to_string()), None);
        assert!(attachments.get(&COUNT).is_none());
        assert_eq!(attachments.len(), 1);
    }
}
