//! Opaque handle encoding
//!
//! A handle packs a type tag, a slot generation and a slot index into a `u32`:
//!
//! ```text
//!  31      28 27              16 15                0
//! ┌──────────┬──────────────────┬──────────────────┐
//! │   kind   │    generation    │      index       │
//! └──────────┴──────────────────┴──────────────────┘
//! ```
//!
//! Kind tags start at 1, so no live handle is ever `0`; `0` is
//! [`Handle::INVALID`].

const KIND_SHIFT: u32 = 28;
const GEN_SHIFT: u32 = 16;
const GEN_MASK: u32 = 0x0fff;
const INDEX_MASK: u32 = 0xffff;

/// Largest slot index a handle can address
pub const MAX_INDEX: usize = INDEX_MASK as usize;

/// Type tag carried in a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Source = 1,
    Sink = 2,
    Property = 3,
    Listener = 4,
}

impl HandleKind {
    fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(HandleKind::Source),
            2 => Some(HandleKind::Sink),
            3 => Some(HandleKind::Property),
            4 => Some(HandleKind::Listener),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandleKind::Source => "source",
            HandleKind::Sink => "sink",
            HandleKind::Property => "property",
            HandleKind::Listener => "listener",
        }
    }
}

/// Opaque identifier of one registry object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(u32);

impl Handle {
    /// The invalid handle
    pub const INVALID: Handle = Handle(0);

    pub(crate) fn new(kind: HandleKind, generation: u16, index: usize) -> Self {
        debug_assert!(index <= MAX_INDEX);
        Handle(
            ((kind as u32) << KIND_SHIFT)
                | ((u32::from(generation) & GEN_MASK) << GEN_SHIFT)
                | (index as u32 & INDEX_MASK),
        )
    }

    /// Rebuild a handle from its raw integer form
    pub fn from_raw(raw: u32) -> Self {
        Handle(raw)
    }

    /// Raw integer form for foreign bindings
    pub fn into_raw(self) -> u32 {
        self.0
    }

    /// Type tag, or `None` for the invalid handle or garbage values
    pub fn kind(self) -> Option<HandleKind> {
        HandleKind::from_tag(self.0 >> KIND_SHIFT)
    }

    pub fn is_valid_form(self) -> bool {
        self.kind().is_some()
    }

    pub(crate) fn generation(self) -> u16 {
        ((self.0 >> GEN_SHIFT) & GEN_MASK) as u16
    }

    pub(crate) fn index(self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{}#{}.{}", kind.as_str(), self.index(), self.generation()),
            None => write!(f, "invalid({:#x})", self.0),
        }
    }
}

/// Next slot generation, or `None` once the 12 bits a handle carries are used up
pub(crate) fn next_generation(generation: u16) -> Option<u16> {
    let next = u32::from(generation) + 1;
    (next <= GEN_MASK).then_some(next as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_packing() {
        let h = Handle::new(HandleKind::Sink, 7, 42);

        assert_eq!(h.kind(), Some(HandleKind::Sink));
        assert_eq!(h.generation(), 7);
        assert_eq!(h.index(), 42);
        assert_ne!(h, Handle::INVALID);
    }

    #[test]
    fn test_invalid_handle_has_no_kind() {
        assert_eq!(Handle::INVALID.kind(), None);
        assert_eq!(Handle::from_raw(0xf000_0001).kind(), None);
        assert!(!Handle::INVALID.is_valid_form());
    }

    #[test]
    fn test_raw_roundtrip_preserves_identity() {
        let h = Handle::new(HandleKind::Property, 0, MAX_INDEX);
        assert_eq!(Handle::from_raw(h.into_raw()), h);
    }

    #[test]
    fn test_generation_exhausts_instead_of_wrapping() {
        assert_eq!(next_generation(1), Some(2));
        assert_eq!(next_generation(0x0ffe), Some(0x0fff));
        assert_eq!(next_generation(0x0fff), None);
    }

    #[test]
    fn test_display() {
        let h = Handle::new(HandleKind::Source, 3, 9);
        assert_eq!(h.to_string(), "source#9.3");
    }
}
