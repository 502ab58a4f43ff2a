//! Flag sets for attributes, events, classes and instances

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

macro_rules! flag_set {
    ($name:ident) => {
        impl $name {
            pub const NONE: $name = $name(0);

            #[inline]
            pub fn new(bits: u32) -> Self {
                $name(bits)
            }

            #[inline]
            pub fn bits(self) -> u32 {
                self.0
            }

            #[inline]
            pub fn contains(self, other: $name) -> bool {
                other.0 != 0 && self.0 & other.0 == other.0
            }

            #[inline]
            pub fn intersects(self, other: $name) -> bool {
                self.0 & other.0 != 0
            }

            #[inline]
            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            #[inline]
            pub fn remove(&mut self, other: $name) {
                self.0 &= !other.0;
            }

            #[inline]
            pub fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = $name;

            #[inline]
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            #[inline]
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#06x})", stringify!($name), self.0)
            }
        }
    };
}

/// Attribute flags (schema entry)
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AttrFlags(pub u32);

flag_set!(AttrFlags);

impl AttrFlags {
    pub const NOT_ACCESS: AttrFlags = AttrFlags(0x0000_0001);
    pub const RD: AttrFlags = AttrFlags(0x0000_0002);
    pub const WR: AttrFlags = AttrFlags(0x0000_0004);
    pub const REQUIRED: AttrFlags = AttrFlags(0x0000_0008);
    pub const PERSIST: AttrFlags = AttrFlags(0x0000_0010);
    pub const VOLATIL: AttrFlags = AttrFlags(0x0000_0020);
    pub const STATS: AttrFlags = AttrFlags(0x0000_0800);
    pub const RSTATS: AttrFlags = AttrFlags(0x0000_2000);
    pub const PSTATS: AttrFlags = AttrFlags(0x0000_4000);

    /// Every flag that makes an attribute visible from outside
    pub const PUBLIC: AttrFlags = AttrFlags(
        Self::RD.0 | Self::WR.0 | Self::STATS.0 | Self::PERSIST.0 | Self::VOLATIL.0 | Self::RSTATS.0 | Self::PSTATS.0,
    );
    pub const WRITABLE: AttrFlags = AttrFlags(Self::WR.0 | Self::PERSIST.0);

    #[inline]
    pub fn is_required(self) -> bool {
        self.contains(Self::REQUIRED)
    }

    #[inline]
    pub fn is_persistent(self) -> bool {
        self.contains(Self::PERSIST)
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        self.intersects(Self::WRITABLE)
    }
}

/// Event type flags
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventFlags(pub u32);

flag_set!(EventFlags);

impl EventFlags {
    /// Don't warn when publishing without subscribers
    pub const NO_WARN_SUBS: EventFlags = EventFlags(0x0001);
    pub const OUTPUT: EventFlags = EventFlags(0x0002);
    pub const SYSTEM: EventFlags = EventFlags(0x0004);
    /// Part of the documented API of the class
    pub const PUBLIC: EventFlags = EventFlags(0x0008);

    #[inline]
    pub fn is_output(self) -> bool {
        self.contains(Self::OUTPUT)
    }

    #[inline]
    pub fn is_system(self) -> bool {
        self.contains(Self::SYSTEM)
    }

    #[inline]
    pub fn no_warn_subs(self) -> bool {
        self.contains(Self::NO_WARN_SUBS)
    }
}

/// Class feature flags
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClassFlags(pub u32);

flag_set!(ClassFlags);

impl ClassFlags {
    /// `start_tree` does not start instances of this class
    pub const MANUAL_START: ClassFlags = ClassFlags(0x0001);
    /// Publishing doesn't check the event table
    pub const NO_CHECK_OUTPUT_EVENTS: ClassFlags = ClassFlags(0x0002);
    /// Creation ignores config keys that are not attributes
    pub const IGNORE_UNKNOWN_ATTRS: ClassFlags = ClassFlags(0x0004);
    /// `play` fails instead of auto-starting
    pub const REQUIRED_START_TO_PLAY: ClassFlags = ClassFlags(0x0008);
    pub const SINGLETON: ClassFlags = ClassFlags(0x0010);
}

/// Instance flags, fixed at creation
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GObjFlags(pub u32);

flag_set!(GObjFlags);

impl GObjFlags {
    pub const YUNO: GObjFlags = GObjFlags(0x0001);
    pub const DEFAULT_SERVICE: GObjFlags = GObjFlags(0x0002);
    /// Registered under a process-wide unique name
    pub const SERVICE: GObjFlags = GObjFlags(0x0004);
    pub const VOLATIL: GObjFlags = GObjFlags(0x0008);
    /// Sends output events to its parent instead of publishing them
    pub const PURE_CHILD: GObjFlags = GObjFlags(0x0010);
    pub const AUTOSTART: GObjFlags = GObjFlags(0x0020);
    pub const AUTOPLAY: GObjFlags = GObjFlags(0x0040);

    #[inline]
    pub fn is_service(self) -> bool {
        self.intersects(Self::SERVICE | Self::DEFAULT_SERVICE | Self::YUNO)
    }

    #[inline]
    pub fn is_pure_child(self) -> bool {
        self.contains(Self::PURE_CHILD)
    }

    #[inline]
    pub fn is_volatil(self) -> bool {
        self.contains(Self::VOLATIL)
    }
}
