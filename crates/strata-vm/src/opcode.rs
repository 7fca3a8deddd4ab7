//! Opcode definitions

/// VM opcodes, one byte each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    // Register and stack moves
    NOP = 0,
    MOVE = 1,
    COPY = 2,
    PUSH = 3,
    POP = 4,
    SWAP = 5,

    // Flow control
    CALL = 6,
    EXTCALL = 7,
    JMP = 8,
    JMPIF = 9,
    JMPNOT = 10,
    RET = 11,
    THROW = 12,

    // Data
    LOAD = 13,
    CAST = 14,
    CAT = 15,
    RANGE = 16,
    LEFT = 17,
    RIGHT = 18,
    SIZE = 19,
    COUNT = 20,

    // Logic and comparison
    NOT = 21,
    AND = 22,
    OR = 23,
    XOR = 24,
    EQUAL = 25,
    LT = 26,
    GT = 27,
    LTE = 28,
    GTE = 29,

    // Arithmetic
    INC = 30,
    DEC = 31,
    SIGN = 32,
    NEGATE = 33,
    ABS = 34,
    ADD = 35,
    SUB = 36,
    MUL = 37,
    DIV = 38,
    MOD = 39,
    SHL = 40,
    SHR = 41,
    MIN = 42,
    MAX = 43,
    POW = 44,

    // Contexts
    CTX = 45,
    SWITCH = 46,

    // Structs
    PUT = 47,
    GET = 48,
    CLEAR = 49,
    UNPACK = 50,
    PACK = 51,

    DEBUG = 52,
    SUBSTR = 53,
}

impl Opcode {
    /// Every defined opcode, in encoding order
    pub const ALL: [Opcode; 54] = [
        Opcode::NOP, Opcode::MOVE, Opcode::COPY, Opcode::PUSH, Opcode::POP, Opcode::SWAP,
        Opcode::CALL, Opcode::EXTCALL, Opcode::JMP, Opcode::JMPIF, Opcode::JMPNOT,
        Opcode::RET, Opcode::THROW, Opcode::LOAD, Opcode::CAST, Opcode::CAT, Opcode::RANGE,
        Opcode::LEFT, Opcode::RIGHT, Opcode::SIZE, Opcode::COUNT, Opcode::NOT, Opcode::AND,
        Opcode::OR, Opcode::XOR, Opcode::EQUAL, Opcode::LT, Opcode::GT, Opcode::LTE,
        Opcode::GTE, Opcode::INC, Opcode::DEC, Opcode::SIGN, Opcode::NEGATE, Opcode::ABS,
        Opcode::ADD, Opcode::SUB, Opcode::MUL, Opcode::DIV, Opcode::MOD, Opcode::SHL,
        Opcode::SHR, Opcode::MIN, Opcode::MAX, Opcode::POW, Opcode::CTX, Opcode::SWITCH,
        Opcode::PUT, Opcode::GET, Opcode::CLEAR, Opcode::UNPACK, Opcode::PACK,
        Opcode::DEBUG, Opcode::SUBSTR,
    ];

    /// Decode an opcode byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Get opcode name
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::NOP => "NOP",
            Opcode::MOVE => "MOVE",
            Opcode::COPY => "COPY",
            Opcode::PUSH => "PUSH",
            Opcode::POP => "POP",
            Opcode::SWAP => "SWAP",
            Opcode::CALL => "CALL",
            Opcode::EXTCALL => "EXTCALL",
            Opcode::JMP => "JMP",
            Opcode::JMPIF => "JMPIF",
            Opcode::JMPNOT => "JMPNOT",
            Opcode::RET => "RET",
            Opcode::THROW => "THROW",
            Opcode::LOAD => "LOAD",
            Opcode::CAST => "CAST",
            Opcode::CAT => "CAT",
            Opcode::RANGE => "RANGE",
            Opcode::LEFT => "LEFT",
            Opcode::RIGHT => "RIGHT",
            Opcode::SIZE => "SIZE",
            Opcode::COUNT => "COUNT",
            Opcode::NOT => "NOT",
            Opcode::AND => "AND",
            Opcode::OR => "OR",
            Opcode::XOR => "XOR",
            Opcode::EQUAL => "EQUAL",
            Opcode::LT => "LT",
            Opcode::GT => "GT",
            Opcode::LTE => "LTE",
            Opcode::GTE => "GTE",
            Opcode::INC => "INC",
            Opcode::DEC => "DEC",
            Opcode::SIGN => "SIGN",
            Opcode::NEGATE => "NEGATE",
            Opcode::ABS => "ABS",
            Opcode::ADD => "ADD",
            Opcode::SUB => "SUB",
            Opcode::MUL => "MUL",
            Opcode::DIV => "DIV",
            Opcode::MOD => "MOD",
            Opcode::SHL => "SHL",
            Opcode::SHR => "SHR",
            Opcode::MIN => "MIN",
            Opcode::MAX => "MAX",
            Opcode::POW => "POW",
            Opcode::CTX => "CTX",
            Opcode::SWITCH => "SWITCH",
            Opcode::PUT => "PUT",
            Opcode::GET => "GET",
            Opcode::CLEAR => "CLEAR",
            Opcode::UNPACK => "UNPACK",
            Opcode::PACK => "PACK",
            Opcode::DEBUG => "DEBUG",
            Opcode::SUBSTR => "SUBSTR",
        }
    }

    /// Binary operators taking `a, b, dst`
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            Opcode::AND
                | Opcode::OR
                | Opcode::XOR
                | Opcode::EQUAL
                | Opcode::LT
                | Opcode::GT
                | Opcode::LTE
                | Opcode::GTE
                | Opcode::ADD
                | Opcode::SUB
                | Opcode::MUL
                | Opcode::DIV
                | Opcode::MOD
                | Opcode::SHL
                | Opcode::SHR
                | Opcode::MIN
                | Opcode::MAX
                | Opcode::POW
        )
    }
}
