//! Value representation using tagged words (64-bit)
//!
//! Values are stored in 64 bits with the lowest 3 bits used as a type tag.
//! Heap objects are not addressed by raw pointers: the payload of an object
//! value is an [`ObjRef`] handle into the VM heap arena.
//!
//! # Encoding Strategy
//!
//! ```text
//! object:   hhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhh00000000000000000000000000000011
//! i32:      iiiiiiiiiiiiiiiiiiiiiiiiiiiiiiii00000000000000000000000000000001
//! bool:     000000000000000000000000000000000000000000000000000000000000b010
//! null:     0000000000000000000000000000000000000000000000000000000000000110
//! ```

use std::fmt;

/// Handle to an object living in the VM heap.
///
/// Handles are plain indices; they do not keep the object alive. An object
/// stays alive only while it is reachable from the heap's roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(u32);

impl ObjRef {
    /// Create a handle from a raw heap slot index
    #[inline]
    pub const fn from_index(index: u32) -> Self {
        ObjRef(index)
    }

    /// Get the heap slot index
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the raw handle bits
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tagged value representation
///
/// The "empty" value of the language is `null`; every freshly allocated
/// field slot starts out as `Value::null()`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

impl Value {
    // Tag constants (lowest 3 bits)
    const TAG_MASK: u64 = 0b111;
    const TAG_I32: u64 = 0b001;
    const TAG_BOOL: u64 = 0b010;
    const TAG_OBJ: u64 = 0b011;
    const TAG_NULL: u64 = 0b110;

    // Special values
    const NULL: u64 = Self::TAG_NULL;
    const TRUE: u64 = (1 << 3) | Self::TAG_BOOL;
    const FALSE: u64 = Self::TAG_BOOL;

    /// Create a null value
    #[inline]
    pub const fn null() -> Self {
        Value(Self::NULL)
    }

    /// Create a boolean value
    #[inline]
    pub const fn bool(b: bool) -> Self {
        Value(if b { Self::TRUE } else { Self::FALSE })
    }

    /// Create an i32 value
    #[inline]
    pub const fn i32(i: i32) -> Self {
        // Store i32 in upper 32 bits, tag in lower bits
        Value(((i as u32 as u64) << 32) | Self::TAG_I32)
    }

    /// Create an object value from a heap handle
    #[inline]
    pub const fn object(obj: ObjRef) -> Self {
        Value(((obj.raw() as u64) << 32) | Self::TAG_OBJ)
    }

    /// Check if this value is null
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.0 == Self::NULL
    }

    /// Check if this value is a boolean
    #[inline]
    pub const fn is_bool(&self) -> bool {
        (self.0 & Self::TAG_MASK) == Self::TAG_BOOL
    }

    /// Check if this value is an i32
    #[inline]
    pub const fn is_i32(&self) -> bool {
        (self.0 & Self::TAG_MASK) == Self::TAG_I32
    }

    /// Check if this value refers to a heap object
    #[inline]
    pub const fn is_object(&self) -> bool {
        (self.0 & Self::TAG_MASK) == Self::TAG_OBJ
    }

    /// Extract boolean value
    #[inline]
    pub const fn as_bool(&self) -> Option<bool> {
        if self.is_bool() {
            Some((self.0 >> 3) != 0)
        } else {
            None
        }
    }

    /// Extract i32 value
    #[inline]
    pub const fn as_i32(&self) -> Option<i32> {
        if self.is_i32() {
            Some((self.0 >> 32) as i32)
        } else {
            None
        }
    }

    /// Extract the heap handle
    #[inline]
    pub const fn as_object(&self) -> Option<ObjRef> {
        if self.is_object() {
            Some(ObjRef((self.0 >> 32) as u32))
        } else {
            None
        }
    }

    /// Get raw bits (for debugging)
    #[inline]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Get tag bits
    #[inline]
    pub const fn tag(&self) -> u64 {
        self.0 & Self::TAG_MASK
    }

    /// Only `false` and `null` are falsy
    pub fn is_truthy(&self) -> bool {
        match self.as_bool() {
            Some(b) => b,
            None => !self.is_null(),
        }
    }

    /// Get type name for debugging
    pub const fn type_name(&self) -> &'static str {
        match self.tag() {
            Self::TAG_NULL => "null",
            Self::TAG_BOOL => "bool",
            Self::TAG_I32 => "i32",
            Self::TAG_OBJ => "object",
            _ => "unknown",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(b) = self.as_bool() {
            write!(f, "bool({})", b)
        } else if let Some(i) = self.as_i32() {
            write!(f, "i32({})", i)
        } else if let Some(obj) = self.as_object() {
            write!(f, "obj({})", obj)
        } else if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "Value({:#x})", self.0)
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(b) = self.as_bool() {
            write!(f, "{}", b)
        } else if let Some(i) = self.as_i32() {
            write!(f, "{}", i)
        } else if let Some(obj) = self.as_object() {
            write!(f, "[object {}]", obj)
        } else if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "<??>")
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::null()
    }
}

impl From<ObjRef> for Value {
    fn from(obj: ObjRef) -> Self {
        Value::object(obj)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::i32(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null() {
        let v = Value::null();
        assert!(v.is_null());
        assert!(!v.is_bool());
        assert!(!v.is_i32());
        assert!(!v.is_object());
        assert_eq!(v.type_name(), "null");
        assert_eq!(Value::default(), v);
    }

    #[test]
    fn test_value_bool() {
        let t = Value::bool(true);
        assert!(t.is_bool());
        assert_eq!(t.as_bool(), Some(true));

        let f = Value::bool(false);
        assert!(f.is_bool());
        assert_eq!(f.as_bool(), Some(false));
        assert_ne!(f, Value::null());
    }

    #[test]
    fn test_value_i32_extremes() {
        for i in [0, 42, -100, i32::MIN, i32::MAX] {
            let v = Value::i32(i);
            assert!(v.is_i32());
            assert_eq!(v.as_i32(), Some(i));
        }
    }

    #[test]
    fn test_value_object_handle() {
        let obj = ObjRef::from_index(7);
        let v = Value::object(obj);
        assert!(v.is_object());
        assert_eq!(v.as_object(), Some(obj));
        assert_eq!(v.as_i32(), None);

        let high = ObjRef::from_index(u32::MAX);
        assert_eq!(Value::object(high).as_object(), Some(high));
    }

    #[test]
    fn test_value_truthiness() {
        assert!(!Value::null().is_truthy());
        assert!(!Value::bool(false).is_truthy());
        assert!(Value::bool(true).is_truthy());
        assert!(Value::i32(0).is_truthy());
        assert!(Value::object(ObjRef::from_index(0)).is_truthy());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(format!("{}", Value::null()), "null");
        assert_eq!(format!("{}", Value::bool(true)), "true");
        assert_eq!(format!("{}", Value::i32(-10)), "-10");
        assert_eq!(format!("{:?}", Value::object(ObjRef::from_index(3))), "obj(#3)");
    }

    #[test]
    fn test_value_size() {
        assert_eq!(std::mem::size_of::<Value>(), 8);
    }
}
