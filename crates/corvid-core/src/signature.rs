//! Method signatures
//!
//! A signature is a method name plus its call shape. Its canonical string is
//! what gets interned into the method symbol table, so `foo(_)` and `foo(_,_)`
//! are different methods and may coexist on one class.

use std::fmt;

/// Maximum number of parameters a method may declare
pub const MAX_PARAMETERS: u8 = 16;

/// The syntactic shape of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureKind {
    /// `name(_,_)`
    Method,
    /// `name`
    Getter,
    /// `name=(_)`
    Setter,
    /// `[_,_]`
    Subscript,
    /// `[_]=(_)`
    SubscriptSetter,
    /// `init name(_)`
    Initializer,
}

/// A method name together with its call shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature<'a> {
    /// Method name (ignored for subscripts)
    pub name: &'a str,
    /// Call shape
    pub kind: SignatureKind,
    /// Parameter count, not counting the receiver
    pub arity: u8,
}

impl<'a> Signature<'a> {
    /// Regular method call with `arity` arguments
    pub fn method(name: &'a str, arity: u8) -> Self {
        Self::new(name, SignatureKind::Method, arity)
    }

    /// Getter (no argument list)
    pub fn getter(name: &'a str) -> Self {
        Self::new(name, SignatureKind::Getter, 0)
    }

    /// Setter (one argument)
    pub fn setter(name: &'a str) -> Self {
        Self::new(name, SignatureKind::Setter, 1)
    }

    /// Subscript getter with `arity` indices
    pub fn subscript(arity: u8) -> Self {
        Self::new("", SignatureKind::Subscript, arity)
    }

    /// Subscript setter with `arity` indices, plus the assigned value
    pub fn subscript_setter(arity: u8) -> Self {
        Self::new("", SignatureKind::SubscriptSetter, arity)
    }

    /// Constructor initializer
    pub fn initializer(name: &'a str, arity: u8) -> Self {
        Self::new(name, SignatureKind::Initializer, arity)
    }

    fn new(name: &'a str, kind: SignatureKind, arity: u8) -> Self {
        Self {
            name,
            kind,
            arity: arity.min(MAX_PARAMETERS),
        }
    }

    /// Number of arguments a call site passes, not counting the receiver
    pub fn arg_count(&self) -> u8 {
        match self.kind {
            SignatureKind::SubscriptSetter => self.arity + 1,
            _ => self.arity,
        }
    }
}

fn write_params(f: &mut fmt::Formatter<'_>, count: u8) -> fmt::Result {
    for i in 0..count {
        if i > 0 {
            f.write_str(",")?;
        }
        f.write_str("_")?;
    }
    Ok(())
}

impl fmt::Display for Signature<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SignatureKind::Method => {
                write!(f, "{}(", self.name)?;
                write_params(f, self.arity)?;
                f.write_str(")")
            }
            SignatureKind::Getter => f.write_str(self.name),
            SignatureKind::Setter => write!(f, "{}=(_)", self.name),
            SignatureKind::Subscript => {
                f.write_str("[")?;
                write_params(f, self.arity)?;
                f.write_str("]")
            }
            SignatureKind::SubscriptSetter => {
                f.write_str("[")?;
                write_params(f, self.arity)?;
                f.write_str("]=(_)")
            }
            SignatureKind::Initializer => {
                write!(f, "init {}(", self.name)?;
                write_params(f, self.arity)?;
                f.write_str(")")
            }
        }
    }
}
