//! Opcode set and operand layouts.

/// Operand encoding that follows the opcode byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandLayout {
    None,
    ImmediateI64,
    ImmediateDbl,
    ImmediateChr,
    AddressU32,
    TypeU8,
    FlagsAddress,
    FlagsAddressPlacement,
    OffsetU16,
    JumpI16,
}

impl OperandLayout {
    /// Operand size in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::None => 0,
            Self::ImmediateI64 | Self::ImmediateDbl => 8,
            Self::ImmediateChr | Self::AddressU32 => 4,
            Self::TypeU8 => 1,
            Self::FlagsAddress => 5,
            Self::FlagsAddressPlacement => 7,
            Self::OffsetU16 | Self::JumpI16 => 2,
        }
    }
}

macro_rules! opcodes {
    ($($name:ident = $value:literal => $layout:ident, $mnemonic:literal;)*) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $value,)*
        }

        impl Opcode {
            pub fn from_u8(v: u8) -> Option<Self> {
                match v {
                    $($value => Some(Self::$name),)*
                    _ => None,
                }
            }

            pub fn layout(self) -> OperandLayout {
                match self {
                    $(Self::$name => OperandLayout::$layout,)*
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => $mnemonic,)*
                }
            }
        }
    };
}

opcodes! {
    Noop = 0x00 => None, "NOOP";
    Nil = 0x01 => None, "NIL";
    Undef = 0x02 => None, "UNDEF";
    True = 0x03 => None, "TRUE";
    False = 0x04 => None, "FALSE";
    I64 = 0x05 => ImmediateI64, "I64";
    Dbl = 0x06 => ImmediateDbl, "DBL";
    Chr = 0x07 => ImmediateChr, "CHR";
    Literal = 0x08 => AddressU32, "LITERAL";
    String = 0x09 => AddressU32, "STRING";
    Synthetic = 0x0A => TypeU8, "SYNTHETIC";
    Descriptor = 0x0B => FlagsAddress, "DESCRIPTOR";
    Load = 0x0C => FlagsAddress, "LOAD";
    Store = 0x0D => FlagsAddress, "STORE";
    VaLoad = 0x0E => None, "VA_LOAD";
    VaSize = 0x0F => None, "VA_SIZE";

    Pop = 0x10 => None, "POP";
    Dup = 0x11 => None, "DUP";
    Pick = 0x12 => OffsetU16, "PICK";
    Drop = 0x13 => OffsetU16, "DROP";
    RPick = 0x14 => OffsetU16, "RPICK";
    RDrop = 0x15 => OffsetU16, "RDROP";

    I64Add = 0x20 => None, "I64_ADD";
    I64Sub = 0x21 => None, "I64_SUB";
    I64Mul = 0x22 => None, "I64_MUL";
    I64Div = 0x23 => None, "I64_DIV";
    I64Neg = 0x24 => None, "I64_NEG";
    DblAdd = 0x25 => None, "DBL_ADD";
    DblSub = 0x26 => None, "DBL_SUB";
    DblMul = 0x27 => None, "DBL_MUL";
    DblDiv = 0x28 => None, "DBL_DIV";
    DblNeg = 0x29 => None, "DBL_NEG";

    BoolCmp = 0x30 => None, "BOOL_CMP";
    I64Cmp = 0x31 => None, "I64_CMP";
    DblCmp = 0x32 => None, "DBL_CMP";
    ChrCmp = 0x33 => None, "CHR_CMP";
    TypeCmp = 0x34 => None, "TYPE_CMP";
    LogicalAnd = 0x35 => None, "LOGICAL_AND";
    LogicalOr = 0x36 => None, "LOGICAL_OR";
    LogicalNot = 0x37 => None, "LOGICAL_NOT";

    IfNil = 0x40 => JumpI16, "IF_NIL";
    IfNotNil = 0x41 => JumpI16, "IF_NOTNIL";
    IfTrue = 0x42 => JumpI16, "IF_TRUE";
    IfFalse = 0x43 => JumpI16, "IF_FALSE";
    IfZero = 0x44 => JumpI16, "IF_ZERO";
    IfNotZero = 0x45 => JumpI16, "IF_NOTZERO";
    IfGt = 0x46 => JumpI16, "IF_GT";
    IfGe = 0x47 => JumpI16, "IF_GE";
    IfLt = 0x48 => JumpI16, "IF_LT";
    IfLe = 0x49 => JumpI16, "IF_LE";
    Jump = 0x4A => JumpI16, "JUMP";

    CallStatic = 0x50 => FlagsAddressPlacement, "CALL_STATIC";
    CallVirtual = 0x51 => FlagsAddressPlacement, "CALL_VIRTUAL";
    CallConcept = 0x52 => FlagsAddressPlacement, "CALL_CONCEPT";
    CallExistential = 0x53 => FlagsAddressPlacement, "CALL_EXISTENTIAL";
    Trap = 0x54 => FlagsAddress, "TRAP";
    Return = 0x55 => None, "RETURN";
    New = 0x56 => FlagsAddressPlacement, "NEW";
    TypeOf = 0x57 => None, "TYPE_OF";
    Raise = 0x58 => None, "RAISE";

    Interrupt = 0x60 => None, "INTERRUPT";
    Halt = 0x61 => None, "HALT";
    Abort = 0x62 => None, "ABORT";
}

impl Opcode {
    /// Instruction size in bytes, opcode byte included.
    #[inline]
    pub fn size(self) -> usize {
        1 + self.layout().size()
    }

    pub fn is_branch(self) -> bool {
        self.layout() == OperandLayout::JumpI16
    }

    /// Instructions after which control never falls through.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Jump | Self::Return | Self::Raise | Self::Halt | Self::Abort
        )
    }
}

/// Operand flag constants.
pub mod op_flags {
    // LOAD / STORE / DESCRIPTOR targets (low nibble)
    pub const ARGUMENT: u8 = 1;
    pub const LOCAL: u8 = 2;
    pub const LEXICAL: u8 = 3;
    pub const FIELD: u8 = 4;
    pub const STATIC: u8 = 5;
    pub const INSTANCE: u8 = 6;
    pub const ENUM: u8 = 7;

    // CALL_* flags
    pub const CALL_RECEIVER_FOLLOWS: u8 = 0x01;

    // NEW types, stored in bits 4..7
    pub const NEW_CLASS: u8 = 1;
    pub const NEW_ENUM: u8 = 2;
    pub const NEW_INSTANCE: u8 = 3;
    pub const NEW_STRUCT: u8 = 4;

    // SYNTHETIC types
    pub const SYNTHETIC_THIS: u8 = 1;

    // TRAP flags
    pub const TRAP_INDEX_FOLLOWS: u8 = 0x01;

    #[inline]
    pub fn new_type(flags: u8) -> u8 {
        (flags & 0x70) >> 4
    }

    #[inline]
    pub fn call_flags(flags: u8) -> u8 {
        flags & 0x0F
    }

    #[inline]
    pub fn make_new_flags(new_type: u8, call_flags: u8) -> u8 {
        ((new_type << 4) & 0x70) | (call_flags & 0x0F)
    }
}
