//! The concrete instruction set.
//!
//! Opcodes fall into four classes distinguished by their high bits. The
//! first three pack a small operand into the opcode byte itself:
//!
//! ```text
//! class 1   1xxppppp   5-bit operand   JUMP_FW_S JUMP_BW_S TJUMP_FW_S LOAD_VAR_S
//! class 2   010xpppp   4-bit operand   STORE_VAR_S LOAD_CONST_S
//! class 3   011xxppp   3-bit operand   CALL_S CALL_LIB_S INCR_VAR_S
//! class 4   00xxxxxx   full byte       everything else
//! ```

use std::fmt;

/// Layout of an instruction's operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// No operand
    None,
    /// Operand in the low 5 bits of the opcode
    Inline5,
    /// Operand in the low 4 bits of the opcode
    Inline4,
    /// Operand in the low 3 bits of the opcode
    Inline3,
    /// Function index in the low 3 bits, then a u8 library index
    Inline3Library,
    /// One u8
    U8,
    /// One u16
    U16,
    /// u8 function index, u8 library index
    LibraryU8,
    /// u8 function index, u16 library index
    LibraryU16,
    /// u8 url index, u8 function-name index, u8 argument count
    UrlU8,
    /// u16 url index, u16 function-name index, u8 argument count
    UrlU16,
}

impl Operands {
    /// Encoded size of an instruction with this layout, opcode included.
    pub const fn size(self) -> usize {
        match self {
            Operands::None | Operands::Inline5 | Operands::Inline4 | Operands::Inline3 => 1,
            Operands::Inline3Library | Operands::U8 => 2,
            Operands::U16 | Operands::LibraryU8 => 3,
            Operands::LibraryU16 | Operands::UrlU8 => 4,
            Operands::UrlU16 => 6,
        }
    }
}

macro_rules! opcodes {
    ($($name:ident = $byte:literal, $mnemonic:literal, $operands:ident;)*) => {
        /// A concrete opcode.
        ///
        /// For the inline-operand classes the discriminant is the opcode
        /// byte with the operand bits cleared.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        #[allow(missing_docs)]
        pub enum Opcode {
            $($name = $byte,)*
        }

        impl Opcode {
            /// All opcodes in table order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// Assembler mnemonic.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            /// Operand layout.
            pub const fn operands(self) -> Operands {
                match self {
                    $(Opcode::$name => Operands::$operands,)*
                }
            }
        }
    };
}

opcodes! {
    // Class 1
    JumpFwS = 0x80, "JUMP_FW_S", Inline5;
    JumpBwS = 0xA0, "JUMP_BW_S", Inline5;
    TJumpFwS = 0xC0, "TJUMP_FW_S", Inline5;
    LoadVarS = 0xE0, "LOAD_VAR_S", Inline5;

    // Class 2
    StoreVarS = 0x40, "STORE_VAR_S", Inline4;
    LoadConstS = 0x50, "LOAD_CONST_S", Inline4;

    // Class 3
    CallS = 0x60, "CALL_S", Inline3;
    CallLibS = 0x68, "CALL_LIB_S", Inline3Library;
    IncrVarS = 0x70, "INCR_VAR_S", Inline3;

    // Class 4: branches
    JumpFw = 0x01, "JUMP_FW", U8;
    JumpFwW = 0x02, "JUMP_FW_W", U16;
    JumpBw = 0x03, "JUMP_BW", U8;
    JumpBwW = 0x04, "JUMP_BW_W", U16;
    TJumpFw = 0x05, "TJUMP_FW", U8;
    TJumpFwW = 0x06, "TJUMP_FW_W", U16;
    TJumpBw = 0x07, "TJUMP_BW", U8;
    TJumpBwW = 0x08, "TJUMP_BW_W", U16;

    // Class 4: calls
    Call = 0x09, "CALL", U8;
    CallLib = 0x0A, "CALL_LIB", LibraryU8;
    CallLibW = 0x0B, "CALL_LIB_W", LibraryU16;
    CallUrl = 0x0C, "CALL_URL", UrlU8;
    CallUrlW = 0x0D, "CALL_URL_W", UrlU16;

    // Class 4: variables and constants
    LoadVar = 0x0E, "LOAD_VAR", U8;
    StoreVar = 0x0F, "STORE_VAR", U8;
    IncrVar = 0x10, "INCR_VAR", U8;
    DecrVar = 0x11, "DECR_VAR", U8;
    LoadConst = 0x12, "LOAD_CONST", U8;
    LoadConstW = 0x13, "LOAD_CONST_W", U16;
    Const0 = 0x14, "CONST_0", None;
    Const1 = 0x15, "CONST_1", None;
    ConstM1 = 0x16, "CONST_M1", None;
    ConstEs = 0x17, "CONST_ES", None;
    ConstInvalid = 0x18, "CONST_INVALID", None;
    ConstTrue = 0x19, "CONST_TRUE", None;
    ConstFalse = 0x1A, "CONST_FALSE", None;

    // Class 4: arithmetic
    Incr = 0x1B, "INCR", None;
    Decr = 0x1C, "DECR", None;
    AddAsg = 0x1D, "ADD_ASG", U8;
    SubAsg = 0x1E, "SUB_ASG", U8;
    UMinus = 0x1F, "UMINUS", None;
    Add = 0x20, "ADD", None;
    Sub = 0x21, "SUB", None;
    Mul = 0x22, "MUL", None;
    Div = 0x23, "DIV", None;
    IDiv = 0x24, "IDIV", None;
    Rem = 0x25, "REM", None;

    // Class 4: bitwise
    BAnd = 0x26, "B_AND", None;
    BOr = 0x27, "B_OR", None;
    BXor = 0x28, "B_XOR", None;
    BNot = 0x29, "B_NOT", None;
    BLShift = 0x2A, "B_LSHIFT", None;
    BRsShift = 0x2B, "B_RSSHIFT", None;
    BRszShift = 0x2C, "B_RSZSHIFT", None;

    // Class 4: comparison
    Eq = 0x2D, "EQ", None;
    Le = 0x2E, "LE", None;
    Lt = 0x2F, "LT", None;
    Ge = 0x30, "GE", None;
    Gt = 0x31, "GT", None;
    Ne = 0x32, "NE", None;

    // Class 4: logical, stack and misc
    Not = 0x33, "NOT", None;
    ScAnd = 0x34, "SCAND", None;
    ScOr = 0x35, "SCOR", None;
    ToBool = 0x36, "TOBOOL", None;
    Pop = 0x37, "POP", None;
    TypeOf = 0x38, "TYPEOF", None;
    IsValid = 0x39, "ISVALID", None;
    Return = 0x3A, "RETURN", None;
    ReturnEs = 0x3B, "RETURN_ES", None;
    Debug = 0x3C, "DEBUG", None;
}

impl Opcode {
    /// The opcode byte (operand bits clear for inline classes).
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Encoded size in bytes.
    pub const fn size(self) -> usize {
        self.operands().size()
    }

    /// Largest value the inline operand field can hold, if any.
    pub const fn inline_max(self) -> Option<u8> {
        match self.operands() {
            Operands::Inline5 => Some(0x1f),
            Operands::Inline4 => Some(0x0f),
            Operands::Inline3 | Operands::Inline3Library => Some(0x07),
            _ => None,
        }
    }

    /// Splits an opcode byte into its opcode and inline operand.
    pub fn decode(byte: u8) -> Option<(Opcode, u8)> {
        let (base, operand) = if byte & 0x80 != 0 {
            (byte & 0xe0, byte & 0x1f)
        } else if byte & 0xe0 == 0x40 {
            (byte & 0xf0, byte & 0x0f)
        } else if byte & 0xe0 == 0x60 {
            (byte & 0xf8, byte & 0x07)
        } else {
            (byte, 0)
        };
        Opcode::from_base(base).map(|op| (op, operand))
    }

    fn from_base(base: u8) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| op.byte() == base)
    }

    /// Returns true for the jump opcodes.
    pub const fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::JumpFwS
                | Opcode::JumpBwS
                | Opcode::TJumpFwS
                | Opcode::JumpFw
                | Opcode::JumpFwW
                | Opcode::JumpBw
                | Opcode::JumpBwW
                | Opcode::TJumpFw
                | Opcode::TJumpFwW
                | Opcode::TJumpBw
                | Opcode::TJumpBwW
        )
    }

    /// Returns true for backward jumps.
    pub const fn is_backward_branch(self) -> bool {
        matches!(
            self,
            Opcode::JumpBwS | Opcode::JumpBw | Opcode::JumpBwW | Opcode::TJumpBw | Opcode::TJumpBwW
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
