//! Identity types for the object runtime
//!
//! Instances live in an arena owned by the runtime. A [`GObjId`] is the
//! arena slot plus a generation counter, so a stale id never resolves to a
//! newer instance that reused the slot.

use std::fmt;

/// Instance identity - arena slot and generation
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GObjId {
    pub index: u32,
    pub generation: u32,
}

impl GObjId {
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        GObjId { index, generation }
    }

    /// Slot index as usize, for arena access
    #[inline]
    pub fn slot(self) -> usize {
        self.index as usize
    }

    /// Pack into a single integer (generation in the high half)
    #[inline]
    pub fn to_u64(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[inline]
    pub fn from_u64(raw: u64) -> Self {
        GObjId {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl fmt::Debug for GObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GObj({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for GObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Subscription identity - unique per runtime, never reused
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    #[inline]
    pub fn new(id: u64) -> Self {
        SubscriptionId(id)
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gobj_id_pack() {
        let id = GObjId::new(7, 3);
        let raw = id.to_u64();
        assert_eq!(raw, (3u64 << 32) | 7);
        assert_eq!(GObjId::from_u64(raw), id);
    }

    #[test]
    fn test_generation_distinguishes_slot_reuse() {
        let old = GObjId::new(4, 1);
        let new = GObjId::new(4, 2);
        assert_eq!(old.slot(), new.slot());
        assert_ne!(old, new);
    }

    #[test]
    fn test_display() {
        assert_eq!(GObjId::new(12, 0).to_string(), "12v0");
        assert_eq!(format!("{:?}", SubscriptionId::new(9)), "Sub(9)");
    }
}
