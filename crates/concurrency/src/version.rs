//! Version registry: the MVCC heart of the store.
//!
//! Every committed version gets a slot holding its commit number and group
//! root ref. Readers pin the slot of the version they are attached to;
//! pinned slots keep the version's nodes from being reclaimed. The
//! watermark is the smallest pinned commit number: the arena may recycle
//! any range freed at a version strictly below it.
//!
//! Invariants:
//! - The latest slot is never pruned, pinned or not.
//! - A slot's `(number, top_ref)` pair is immutable once published.
//! - Watermark never decreases.

use mica_core::{Error, Ref, Result, VersionId};
use parking_lot::Mutex;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct Slot {
    number: u64,
    top_ref: Ref,
    pins: u32,
}

#[derive(Debug)]
struct Inner {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    /// Slot index of the latest published version
    latest: usize,
}

impl Inner {
    fn slot(&self, index: u32) -> Result<&Slot> {
        self.slots
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                Error::InvalidOperation(format!("version slot {index} is not live"))
            })
    }

    fn insert(&mut self, slot: Slot) -> usize {
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(slot);
            index
        } else {
            self.slots.push(Some(slot));
            self.slots.len() - 1
        }
    }

    /// Drop every unpinned slot other than the latest
    fn prune(&mut self) {
        for index in 0..self.slots.len() {
            if index == self.latest {
                continue;
            }
            if let Some(slot) = self.slots[index] {
                if slot.pins == 0 {
                    self.slots[index] = None;
                    self.free.push(index);
                }
            }
        }
    }

    fn watermark(&self) -> u64 {
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.pins > 0)
            .map(|s| s.number)
            .min()
            .unwrap_or_else(|| {
                self.slots[self.latest].map(|s| s.number).unwrap_or(0)
            })
    }
}

/// Registry of live versions and their reader pins
pub struct VersionRegistry {
    inner: Mutex<Inner>,
}

impl VersionRegistry {
    /// Create a registry seeded with the recovered (or fresh) version
    pub fn new(number: u64, top_ref: Ref) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: vec![Some(Slot {
                    number,
                    top_ref,
                    pins: 0,
                })],
                free: Vec::new(),
                latest: 0,
            }),
        }
    }

    /// Commit number and root ref of the latest published version
    pub fn current(&self) -> (u64, Ref) {
        let inner = self.inner.lock();
        let slot = inner.slots[inner.latest].expect("latest slot is always live");
        (slot.number, slot.top_ref)
    }

    /// Pin the latest version for a new reader
    pub fn pin_current(&self) -> (VersionId, Ref) {
        let mut inner = self.inner.lock();
        let latest = inner.latest;
        let slot = inner.slots[latest].as_mut().expect("latest slot is always live");
        slot.pins += 1;
        let id = VersionId::new(slot.number, latest as u32);
        trace!(version = id.number, pins = slot.pins, "reader pinned");
        (id, slot.top_ref)
    }

    /// Root ref of a pinned version
    pub fn top_ref(&self, id: VersionId) -> Result<Ref> {
        Ok(self.inner.lock().slot(id.slot)?.top_ref)
    }

    /// Release a reader's pin, returning the new watermark
    pub fn unpin(&self, id: VersionId) -> Result<u64> {
        let mut inner = self.inner.lock();
        {
            let slot = inner
                .slots
                .get_mut(id.slot as usize)
                .and_then(Option::as_mut)
                .ok_or_else(|| {
                    Error::InvalidOperation(format!("version slot {} is not live", id.slot))
                })?;
            if slot.pins == 0 {
                return Err(Error::InvalidOperation(format!(
                    "unbalanced unpin of version {}",
                    slot.number
                )));
            }
            slot.pins -= 1;
        }
        inner.prune();
        Ok(inner.watermark())
    }

    /// Publish the next version, returning its commit number.
    ///
    /// Called by the single writer while holding the writer gate.
    pub fn publish(&self, top_ref: Ref) -> u64 {
        let mut inner = self.inner.lock();
        let number = inner.slots[inner.latest]
            .map(|s| s.number)
            .unwrap_or(0)
            + 1;
        let index = inner.insert(Slot {
            number,
            top_ref,
            pins: 0,
        });
        inner.latest = index;
        inner.prune();
        trace!(version = number, "version published");
        number
    }

    /// Smallest commit number any reader still pins (or the current
    /// version when nothing is pinned)
    pub fn watermark(&self) -> u64 {
        self.inner.lock().watermark()
    }

    /// Number of live slots (diagnostics and tests)
    pub fn live_slots(&self) -> usize {
        self.inner.lock().slots.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_current_and_publish() {
        let reg = VersionRegistry::new(0, Ref::NULL);
        let (id, top) = reg.pin_current();
        assert_eq!(id.number, 0);
        assert!(top.is_null());

        let n = reg.publish(Ref(128));
        assert_eq!(n, 1);
        assert_eq!(reg.current(), (1, Ref(128)));
        // The pinned version 0 still resolves
        assert_eq!(reg.top_ref(id).unwrap(), Ref::NULL);
    }

    #[test]
    fn test_watermark_follows_oldest_pin() {
        let reg = VersionRegistry::new(0, Ref::NULL);
        let (old, _) = reg.pin_current();
        reg.publish(Ref(128));
        let (mid, _) = reg.pin_current();
        reg.publish(Ref(256));

        assert_eq!(reg.watermark(), 0);
        assert_eq!(reg.unpin(old).unwrap(), 1);
        assert_eq!(reg.unpin(mid).unwrap(), 2);
    }

    #[test]
    fn test_unpinned_superseded_slots_pruned() {
        let reg = VersionRegistry::new(0, Ref::NULL);
        let (id, _) = reg.pin_current();
        reg.publish(Ref(128));
        reg.publish(Ref(256));
        assert_eq!(reg.live_slots(), 2); // pinned v0 + latest

        reg.unpin(id).unwrap();
        assert_eq!(reg.live_slots(), 1);
    }

    #[test]
    fn test_double_unpin_rejected() {
        let reg = VersionRegistry::new(0, Ref::NULL);
        let (id, _) = reg.pin_current();
        reg.publish(Ref(128));
        reg.unpin(id).unwrap();
        assert!(reg.unpin(id).is_err());
    }

    #[test]
    fn test_slot_reuse_does_not_confuse_pins() {
        let reg = VersionRegistry::new(0, Ref::NULL);
        let (a, _) = reg.pin_current();
        reg.publish(Ref(128));
        let (b, _) = reg.pin_current();
        reg.unpin(a).unwrap();
        // New publish may reuse the freed slot
        reg.publish(Ref(256));
        let (c, _) = reg.pin_current();
        assert_eq!(c.number, 2);
        reg.unpin(b).unwrap();
        reg.unpin(c).unwrap();
        assert_eq!(reg.watermark(), 2);
    }
}
