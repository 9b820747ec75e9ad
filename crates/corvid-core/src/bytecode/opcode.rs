//! Bytecode opcodes understood by the object-model core
//!
//! Only the instructions that touch classes, fields and dispatch live here;
//! arithmetic and control flow belong to the general interpreter and are
//! expressed as method calls on core classes instead.

/// Bytecode opcode enumeration
///
/// Opcodes are organized into categories:
/// - 0x00-0x0F: Stack manipulation & constants
/// - 0x10-0x1F: Locals and module variables
/// - 0x20-0x2F: Field access
/// - 0x30-0x3F: Method calls
/// - 0x40-0x4F: Returns
/// - 0x50-0x5F: Instantiation
/// - 0x60-0x6F: Class definition
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x00-0x0F) =====
    /// Push constant from the function's pool (operand: u16 index)
    Constant = 0x01,
    /// Push null
    Null = 0x02,
    /// Push false
    False = 0x03,
    /// Push true
    True = 0x04,
    /// Discard the top of stack
    Pop = 0x05,
    /// Duplicate the top of stack
    Dup = 0x06,

    // ===== Variables (0x10-0x1F) =====
    /// Push frame slot (operand: u8 slot)
    LoadLocal = 0x10,
    /// Store top of stack into frame slot, leaving it (operand: u8 slot)
    StoreLocal = 0x11,
    /// Push module variable (operand: u16 index)
    LoadModuleVar = 0x12,
    /// Store top of stack into module variable, leaving it (operand: u16 index)
    StoreModuleVar = 0x13,

    // ===== Fields (0x20-0x2F) =====
    /// Push field of the receiver in slot 0 (operand: u8 field)
    LoadFieldThis = 0x20,
    /// Store top of stack into field of slot 0, leaving it (operand: u8 field)
    StoreFieldThis = 0x21,
    /// Pop receiver, push its field (operand: u8 field)
    LoadField = 0x22,
    /// Pop receiver, store the value under it into its field (operand: u8 field)
    StoreField = 0x23,

    // ===== Calls (0x30-0x3F) =====
    /// Dynamic dispatch on the receiver's class (operands: u8 argc, u16 symbol)
    Call = 0x30,
    /// Dispatch on a statically bound class (operands: u8 argc, u16 symbol, u16 constant)
    Super = 0x31,

    // ===== Returns (0x40-0x4F) =====
    /// Return top of stack to the caller
    Return = 0x40,

    // ===== Instantiation (0x50-0x5F) =====
    /// Replace the class in slot 0 with a new instance of it
    Construct = 0x50,
    /// Replace the class in slot 0 with a new opaque instance from its allocator
    ForeignConstruct = 0x51,

    // ===== Class Definition (0x60-0x6F) =====
    /// Pop superclass, push new class (operands: u16 name constant, u8 own field count)
    Class = 0x60,
    /// Pop superclass, push new opaque class (operand: u16 name constant)
    ForeignClass = 0x61,
    /// Bind constant as instance method of the class on top (operands: u16 symbol, u16 constant)
    MethodInstance = 0x62,
    /// Bind constant as static method of the class on top (operands: u16 symbol, u16 constant)
    MethodStatic = 0x63,
}

impl Opcode {
    /// Convert byte to opcode
    ///
    /// Returns None if the byte does not correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Constant),
            0x02 => Some(Self::Null),
            0x03 => Some(Self::False),
            0x04 => Some(Self::True),
            0x05 => Some(Self::Pop),
            0x06 => Some(Self::Dup),

            0x10 => Some(Self::LoadLocal),
            0x11 => Some(Self::StoreLocal),
            0x12 => Some(Self::LoadModuleVar),
            0x13 => Some(Self::StoreModuleVar),

            0x20 => Some(Self::LoadFieldThis),
            0x21 => Some(Self::StoreFieldThis),
            0x22 => Some(Self::LoadField),
            0x23 => Some(Self::StoreField),

            0x30 => Some(Self::Call),
            0x31 => Some(Self::Super),

            0x40 => Some(Self::Return),

            0x50 => Some(Self::Construct),
            0x51 => Some(Self::ForeignConstruct),

            0x60 => Some(Self::Class),
            0x61 => Some(Self::ForeignClass),
            0x62 => Some(Self::MethodInstance),
            0x63 => Some(Self::MethodStatic),

            _ => None,
        }
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Number of operand bytes following the opcode
    pub fn operand_size(self) -> usize {
        match self {
            Self::Null
            | Self::False
            | Self::True
            | Self::Pop
            | Self::Dup
            | Self::Return
            | Self::Construct
            | Self::ForeignConstruct => 0,

            Self::LoadLocal
            | Self::StoreLocal
            | Self::LoadFieldThis
            | Self::StoreFieldThis
            | Self::LoadField
            | Self::StoreField => 1,

            Self::Constant | Self::LoadModuleVar | Self::StoreModuleVar | Self::ForeignClass => 2,

            Self::Call | Self::Class => 3,

            Self::MethodInstance | Self::MethodStatic => 4,

            Self::Super => 5,
        }
    }

    /// Get the human-readable name of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Constant => "CONSTANT",
            Self::Null => "NULL",
            Self::False => "FALSE",
            Self::True => "TRUE",
            Self::Pop => "POP",
            Self::Dup => "DUP",
            Self::LoadLocal => "LOAD_LOCAL",
            Self::StoreLocal => "STORE_LOCAL",
            Self::LoadModuleVar => "LOAD_MODULE_VAR",
            Self::StoreModuleVar => "STORE_MODULE_VAR",
            Self::LoadFieldThis => "LOAD_FIELD_THIS",
            Self::StoreFieldThis => "STORE_FIELD_THIS",
            Self::LoadField => "LOAD_FIELD",
            Self::StoreField => "STORE_FIELD",
            Self::Call => "CALL",
            Self::Super => "SUPER",
            Self::Return => "RETURN",
            Self::Construct => "CONSTRUCT",
            Self::ForeignConstruct => "FOREIGN_CONSTRUCT",
            Self::Class => "CLASS",
            Self::ForeignClass => "FOREIGN_CLASS",
            Self::MethodInstance => "METHOD_INSTANCE",
            Self::MethodStatic => "METHOD_STATIC",
        }
    }

    /// Check if this opcode addresses a field by compile-time index
    pub fn is_field_access(self) -> bool {
        matches!(
            self,
            Self::LoadFieldThis | Self::StoreFieldThis | Self::LoadField | Self::StoreField
        )
    }

    /// Check if this opcode is a call instruction
    pub fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::Super)
    }
}
