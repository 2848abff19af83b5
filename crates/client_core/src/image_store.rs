//! Displayable references.
//!
//! Image payloads live in a content-addressed [`ImageStore`]; everything else in the
//! session holds a [`DisplayRef`]. Cloning a reference adds a holder and dropping the
//! last holder releases the payload, so a result shared by the current-result slot
//! and a history entry stays alive until both let go of it.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, Weak},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::lock;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey(String);

impl ImageKey {
    fn for_bytes(bytes: &[u8]) -> Self {
        Self(URL_SAFE_NO_PAD.encode(Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct StoredImage {
    pub bytes: Arc<[u8]>,
    pub mime_type: Option<String>,
}

impl StoredImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

struct Slot {
    image: StoredImage,
    holders: usize,
}

type Slots = Mutex<HashMap<ImageKey, Slot>>;

#[derive(Clone, Default)]
pub struct ImageStore {
    slots: Arc<Slots>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bytes: impl Into<Arc<[u8]>>, mime_type: Option<String>) -> DisplayRef {
        let bytes = bytes.into();
        let key = ImageKey::for_bytes(&bytes);
        let mut slots = lock(&self.slots);
        match slots.get_mut(&key) {
            Some(slot) => {
                slot.holders += 1;
                if slot.image.mime_type.is_none() {
                    slot.image.mime_type = mime_type;
                }
            }
            None => {
                debug!(key = %key, size = bytes.len(), "created display reference");
                slots.insert(
                    key.clone(),
                    Slot {
                        image: StoredImage { bytes, mime_type },
                        holders: 1,
                    },
                );
            }
        }

        DisplayRef {
            key,
            slots: Arc::downgrade(&self.slots),
        }
    }

    pub fn read(&self, reference: &DisplayRef) -> Option<StoredImage> {
        lock(&self.slots)
            .get(&reference.key)
            .map(|slot| slot.image.clone())
    }

    pub fn contains(&self, key: &ImageKey) -> bool {
        lock(&self.slots).contains_key(key)
    }

    pub fn holder_count(&self, key: &ImageKey) -> usize {
        lock(&self.slots)
            .get(key)
            .map(|slot| slot.holders)
            .unwrap_or(0)
    }

    pub fn live_count(&self) -> usize {
        lock(&self.slots).len()
    }
}

pub struct DisplayRef {
    key: ImageKey,
    slots: Weak<Slots>,
}

impl DisplayRef {
    pub fn key(&self) -> &ImageKey {
        &self.key
    }

    pub fn uri(&self) -> String {
        format!("image://{}", self.key)
    }
}

impl Clone for DisplayRef {
    fn clone(&self) -> Self {
        if let Some(slots) = self.slots.upgrade() {
            if let Some(slot) = lock(&slots).get_mut(&self.key) {
                slot.holders += 1;
            }
        }
        Self {
            key: self.key.clone(),
            slots: self.slots.clone(),
        }
    }
}

impl Drop for DisplayRef {
    fn drop(&mut self) {
        let Some(slots) = self.slots.upgrade() else {
            return;
        };
        let mut slots = lock(&slots);
        let released = match slots.get_mut(&self.key) {
            Some(slot) => {
                slot.holders = slot.holders.saturating_sub(1);
                slot.holders == 0
            }
            None => false,
        };
        if released {
            slots.remove(&self.key);
            debug!(key = %self.key, "released display reference");
        }
    }
}

impl PartialEq for DisplayRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DisplayRef {}

impl fmt::Debug for DisplayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DisplayRef").field(&self.key.0).finish()
    }
}
