//! The opcode specification table: for every opcode, a *parse program* (a
//! micro-instruction stream walked by the interpreter's `exec_op`) plus
//! property bits used to validate dynamic arguments against what the
//! preempted parent opcode expects.

pub const ZERO_OP: u16 = 0x00;
pub const ONE_OP: u16 = 0x01;
pub const ALIAS_OP: u16 = 0x06;
pub const NAME_OP: u16 = 0x08;
pub const BYTE_CONST: u16 = 0x0a;
pub const WORD_CONST: u16 = 0x0b;
pub const DWORD_CONST: u16 = 0x0c;
pub const STRING_PREFIX: u16 = 0x0d;
pub const QWORD_CONST: u16 = 0x0e;
pub const SCOPE_OP: u16 = 0x10;
pub const BUFFER_OP: u16 = 0x11;
pub const PACKAGE_OP: u16 = 0x12;
pub const VAR_PACKAGE_OP: u16 = 0x13;
pub const METHOD_OP: u16 = 0x14;
pub const EXTERNAL_OP: u16 = 0x15;
pub const DUAL_NAME_PREFIX: u16 = 0x2e;
pub const MULTI_NAME_PREFIX: u16 = 0x2f;
pub const ROOT_CHAR: u16 = 0x5c;
pub const PARENT_PREFIX_CHAR: u16 = 0x5e;
pub const LOCAL0_OP: u16 = 0x60;
pub const LOCAL7_OP: u16 = 0x67;
pub const ARG0_OP: u16 = 0x68;
pub const ARG6_OP: u16 = 0x6e;
pub const STORE_OP: u16 = 0x70;
pub const REF_OF_OP: u16 = 0x71;
pub const ADD_OP: u16 = 0x72;
pub const CONCAT_OP: u16 = 0x73;
pub const SUBTRACT_OP: u16 = 0x74;
pub const INCREMENT_OP: u16 = 0x75;
pub const DECREMENT_OP: u16 = 0x76;
pub const MULTIPLY_OP: u16 = 0x77;
pub const DIVIDE_OP: u16 = 0x78;
pub const SHIFT_LEFT_OP: u16 = 0x79;
pub const SHIFT_RIGHT_OP: u16 = 0x7a;
pub const AND_OP: u16 = 0x7b;
pub const NAND_OP: u16 = 0x7c;
pub const OR_OP: u16 = 0x7d;
pub const NOR_OP: u16 = 0x7e;
pub const XOR_OP: u16 = 0x7f;
pub const NOT_OP: u16 = 0x80;
pub const FIND_SET_LEFT_BIT_OP: u16 = 0x81;
pub const FIND_SET_RIGHT_BIT_OP: u16 = 0x82;
pub const DEREF_OF_OP: u16 = 0x83;
pub const CONCAT_RES_OP: u16 = 0x84;
pub const MOD_OP: u16 = 0x85;
pub const NOTIFY_OP: u16 = 0x86;
pub const SIZE_OF_OP: u16 = 0x87;
pub const INDEX_OP: u16 = 0x88;
pub const MATCH_OP: u16 = 0x89;
pub const CREATE_DWORD_FIELD_OP: u16 = 0x8a;
pub const CREATE_WORD_FIELD_OP: u16 = 0x8b;
pub const CREATE_BYTE_FIELD_OP: u16 = 0x8c;
pub const CREATE_BIT_FIELD_OP: u16 = 0x8d;
pub const OBJECT_TYPE_OP: u16 = 0x8e;
pub const CREATE_QWORD_FIELD_OP: u16 = 0x8f;
pub const LAND_OP: u16 = 0x90;
pub const LOR_OP: u16 = 0x91;
pub const LNOT_OP: u16 = 0x92;
pub const LEQUAL_OP: u16 = 0x93;
pub const LGREATER_OP: u16 = 0x94;
pub const LLESS_OP: u16 = 0x95;
pub const TO_BUFFER_OP: u16 = 0x96;
pub const TO_DECIMAL_STRING_OP: u16 = 0x97;
pub const TO_HEX_STRING_OP: u16 = 0x98;
pub const TO_INTEGER_OP: u16 = 0x99;
pub const TO_STRING_OP: u16 = 0x9c;
pub const COPY_OBJECT_OP: u16 = 0x9d;
pub const MID_OP: u16 = 0x9e;
pub const CONTINUE_OP: u16 = 0x9f;
pub const IF_OP: u16 = 0xa0;
pub const ELSE_OP: u16 = 0xa1;
pub const WHILE_OP: u16 = 0xa2;
pub const NOOP_OP: u16 = 0xa3;
pub const RETURN_OP: u16 = 0xa4;
pub const BREAK_OP: u16 = 0xa5;
pub const BREAKPOINT_OP: u16 = 0xcc;
pub const ONES_OP: u16 = 0xff;

pub const EXT_OPCODE_PREFIX: u8 = 0x5b;

pub const MUTEX_OP: u16 = 0x5b01;
pub const EVENT_OP: u16 = 0x5b02;
pub const COND_REF_OF_OP: u16 = 0x5b12;
pub const CREATE_FIELD_OP: u16 = 0x5b13;
pub const LOAD_TABLE_OP: u16 = 0x5b1f;
pub const LOAD_OP: u16 = 0x5b20;
pub const STALL_OP: u16 = 0x5b21;
pub const SLEEP_OP: u16 = 0x5b22;
pub const ACQUIRE_OP: u16 = 0x5b23;
pub const SIGNAL_OP: u16 = 0x5b24;
pub const WAIT_OP: u16 = 0x5b25;
pub const RESET_OP: u16 = 0x5b26;
pub const RELEASE_OP: u16 = 0x5b27;
pub const FROM_BCD_OP: u16 = 0x5b28;
pub const TO_BCD_OP: u16 = 0x5b29;
pub const REVISION_OP: u16 = 0x5b30;
pub const DEBUG_OP: u16 = 0x5b31;
pub const FATAL_OP: u16 = 0x5b32;
pub const TIMER_OP: u16 = 0x5b33;
pub const OP_REGION_OP: u16 = 0x5b80;
pub const FIELD_OP: u16 = 0x5b81;
pub const DEVICE_OP: u16 = 0x5b82;
pub const PROCESSOR_OP: u16 = 0x5b83;
pub const POWER_RES_OP: u16 = 0x5b84;
pub const THERMAL_ZONE_OP: u16 = 0x5b85;
pub const INDEX_FIELD_OP: u16 = 0x5b86;
pub const BANK_FIELD_OP: u16 = 0x5b87;
pub const DATA_REGION_OP: u16 = 0x5b88;

/*
 * Internal opcodes are never fetched from the bytecode. CONVERT_NAMESTRING
 * rewrites an in-flight name-string op to one of these once it knows what the
 * name resolved to.
 */
pub const INTERNAL_NAMED_OBJECT_OP: u16 = 0x1000;
pub const INTERNAL_METHOD_CALL0_OP: u16 = 0x1010;
pub const INTERNAL_METHOD_CALL7_OP: u16 = 0x1017;
pub const INTERNAL_FIELD_READ_AS_BUFFER_OP: u16 = 0x1020;
pub const INTERNAL_FIELD_READ_AS_INTEGER_OP: u16 = 0x1021;

pub const PROP_SIMPLE_NAME: u8 = 1 << 0;
pub const PROP_SUPER_NAME: u8 = 1 << 1;
pub const PROP_TARGET: u8 = 1 << 2;
pub const PROP_TERM_ARG: u8 = 1 << 3;

macro_rules! parse_ops {
    ($($variant:ident = $value:expr,)*) => {
        /// One micro-instruction of a parse program.
        #[derive(Clone, Copy, PartialEq, Eq, Debug)]
        #[repr(u8)]
        pub enum ParseOp {
            $($variant = $value,)*
        }

        impl ParseOp {
            pub fn from_byte(byte: u8) -> Option<ParseOp> {
                match byte {
                    $($value => Some(ParseOp::$variant),)*
                    _ => None,
                }
            }
        }

        pub mod op {
            $(pub const $variant: u8 = $value;)*
        }
    };
}

#[allow(non_upper_case_globals)]
mod names {
    parse_ops! {
        End = 0x00,
        SimpleName = 0x01,
        Supername = 0x02,
        SupernameImplicitDeref = 0x03,
        SupernameOrUnresolved = 0x04,
        TermArg = 0x05,
        TermArgUnwrapInternal = 0x06,
        TermArgOrNamedObject = 0x07,
        TermArgOrNamedObjectOrUnresolved = 0x08,
        Operand = 0x09,
        ComputationalData = 0x0a,
        Target = 0x0b,
        Pkglen = 0x0c,
        TrackedPkglen = 0x0d,
        CreateNamestring = 0x0e,
        ExistingNamestring = 0x0f,
        ExistingNamestringOrNull = 0x10,
        LoadInlineImm = 0x11,
        LoadInlineImmAsObject = 0x12,
        LoadImm = 0x13,
        LoadImmAsObject = 0x14,
        LoadFalseObject = 0x15,
        LoadTrueObject = 0x16,
        RecordAmlPc = 0x17,
        TruncateNumber = 0x18,
        Typecheck = 0x19,
        InstallNamespaceNode = 0x1a,
        InvokeHandler = 0x1b,
        DispatchMethodCall = 0x1c,
        ObjectTransferToPrev = 0x1d,
        ObjectCopyToPrev = 0x1e,
        StoreToTarget = 0x1f,
        StoreToTargetIndirect = 0x20,
        ConvertNamestring = 0x21,
        IfNull = 0x22,
        IfNotNull = 0x23,
        IfHasData = 0x24,
        IfEquals = 0x25,
        Jmp = 0x26,
        ImmDecrement = 0x27,
        AmlPcDecrement = 0x28,
        ObjectConvertToShallowCopy = 0x29,
        ObjectConvertToDeepCopy = 0x2a,
        Todo = 0x2b,
        BadOpcode = 0x2c,
        Unreachable = 0x2d,
    }
}

pub use names::ParseOp;
use names::op::*;

/// Everything the interpreter knows about one opcode.
pub struct OpSpec {
    pub name: &'static str,
    pub code: u16,
    pub properties: u8,
    pub ops: &'static [u8],
}

// ObjectType discriminants used as TYPECHECK operands.
const TYPE_INTEGER: u8 = 1;
const TYPE_BUFFER: u8 = 3;

const PROGRAM_CONST_TRANSFER: &[u8] = &[InvokeHandler, ObjectTransferToPrev, End];

const PROGRAM_BINARY_MATH: &[u8] = &[
    Operand,
    Operand,
    Target,
    InvokeHandler,
    TruncateNumber,
    StoreToTarget, 2,
    ObjectTransferToPrev,
    End,
];

const PROGRAM_DIVIDE: &[u8] = &[
    Operand,
    Operand,
    Target,
    Target,
    InvokeHandler,
    StoreToTargetIndirect, 2, 4,
    StoreToTargetIndirect, 3, 5,
    ObjectTransferToPrev,
    End,
];

const PROGRAM_UNARY_MATH: &[u8] = &[
    Operand,
    Target,
    InvokeHandler,
    StoreToTarget, 1,
    ObjectTransferToPrev,
    End,
];

const PROGRAM_INC_DEC: &[u8] = &[
    SupernameImplicitDeref,
    Typecheck, TYPE_INTEGER,
    InvokeHandler,
    TruncateNumber,
    ObjectTransferToPrev,
    End,
];

const PROGRAM_BINARY_LOGIC: &[u8] =
    &[ComputationalData, ComputationalData, InvokeHandler, ObjectTransferToPrev, End];

const PROGRAM_SUPERNAME_QUERY: &[u8] = &[Supername, InvokeHandler, ObjectTransferToPrev, End];

const PROGRAM_TO: &[u8] = &[
    ComputationalData,
    Target,
    InvokeHandler,
    StoreToTarget, 1,
    ObjectTransferToPrev,
    End,
];

const PROGRAM_CREATE_BUFFER_FIELD: &[u8] = &[
    TermArgUnwrapInternal,
    Typecheck, TYPE_BUFFER,
    Operand,
    CreateNamestring,
    InvokeHandler,
    InstallNamespaceNode, 2,
    End,
];

/*
 * PACKAGE/VAR_PACKAGE loop until the tracked package length runs out of
 * data, recording the AML pc of every element so unresolved names can be
 * converted to path strings later.
 */
const PROGRAM_PACKAGE: &[u8] = &[
    TrackedPkglen,                          // 0
    LoadImm, 1,                             // 1
    IfHasData, 4,                           // 3: exhausted -> pc 9
    RecordAmlPc,                            // 5
    TermArgOrNamedObjectOrUnresolved,       // 6
    Jmp, 3,                                 // 7
    InvokeHandler,                          // 9
    ObjectTransferToPrev,                   // 10
    End,                                    // 11
];

const PROGRAM_VAR_PACKAGE: &[u8] = &[
    TrackedPkglen,                          // 0
    Operand,                                // 1
    IfHasData, 4,                           // 2: exhausted -> pc 8
    RecordAmlPc,                            // 4
    TermArgOrNamedObjectOrUnresolved,       // 5
    Jmp, 2,                                 // 6
    InvokeHandler,                          // 8
    ObjectTransferToPrev,                   // 9
    End,                                    // 10
];

/*
 * A name string encountered as an opcode. Resolution backs the cursor up over
 * the lead byte (it is part of the name), then CONVERT_NAMESTRING decides
 * whether the op becomes a named-object load, a method call, or a
 * buffer-field read. An unresolved-but-allowed name ends with the parent's
 * slot left empty.
 */
const PROGRAM_NAMESTRING: &[u8] = &[
    AmlPcDecrement,                         // 0
    ExistingNamestringOrNull,               // 1
    IfNotNull, 0, 1,                        // 2: null -> pc 6
    ConvertNamestring,                      // 5
    End,                                    // 6
];

const PROGRAM_COND_REF_OF: &[u8] = &[
    SupernameOrUnresolved,                  // 0
    Target,                                 // 1
    IfNotNull, 0, 6,                        // 2: unresolved -> pc 11
    InvokeHandler,                          // 5
    StoreToTarget, 1,                       // 6
    LoadTrueObject,                         // 8
    Jmp, 12,                                // 9
    LoadFalseObject,                        // 11
    ObjectTransferToPrev,                   // 12
    End,                                    // 13
];

const PROGRAM_METHOD_CALL_LEN: usize = 17;

const fn method_call_program(arg_count: u8) -> [u8; PROGRAM_METHOD_CALL_LEN] {
    [
        LoadInlineImm, 1, arg_count,        // 0
        IfEquals, 1, 0, 2,                  // 3: args left -> pc 9
        Jmp, 14,                            // 7
        TermArgUnwrapInternal,              // 9
        ImmDecrement, 1,                    // 10
        Jmp, 3,                             // 12
        DispatchMethodCall,                 // 14
        ObjectTransferToPrev,               // 15
        End,                                // 16
    ]
}

const METHOD_CALL_PROGRAM_0: [u8; PROGRAM_METHOD_CALL_LEN] = method_call_program(0);
const METHOD_CALL_PROGRAM_1: [u8; PROGRAM_METHOD_CALL_LEN] = method_call_program(1);
const METHOD_CALL_PROGRAM_2: [u8; PROGRAM_METHOD_CALL_LEN] = method_call_program(2);
const METHOD_CALL_PROGRAM_3: [u8; PROGRAM_METHOD_CALL_LEN] = method_call_program(3);
const METHOD_CALL_PROGRAM_4: [u8; PROGRAM_METHOD_CALL_LEN] = method_call_program(4);
const METHOD_CALL_PROGRAM_5: [u8; PROGRAM_METHOD_CALL_LEN] = method_call_program(5);
const METHOD_CALL_PROGRAM_6: [u8; PROGRAM_METHOD_CALL_LEN] = method_call_program(6);
const METHOD_CALL_PROGRAM_7: [u8; PROGRAM_METHOD_CALL_LEN] = method_call_program(7);

macro_rules! op_specs {
    ($($spec:ident { $name:expr, $code:expr, $props:expr, $ops:expr }),* $(,)?) => {
        $(static $spec: OpSpec = OpSpec { name: $name, code: $code, properties: $props, ops: $ops };)*
    };
}

op_specs! {
    ZERO { "Zero", ZERO_OP, PROP_TERM_ARG | PROP_TARGET, &[LoadFalseObject, ObjectTransferToPrev, End] },
    ONE { "One", ONE_OP, PROP_TERM_ARG, &[LoadInlineImmAsObject, 8, 1, 0, 0, 0, 0, 0, 0, 0, ObjectTransferToPrev, End] },
    ONES { "Ones", ONES_OP, PROP_TERM_ARG, &[LoadTrueObject, ObjectTransferToPrev, End] },
    BYTE { "Byte", BYTE_CONST, PROP_TERM_ARG, &[LoadImmAsObject, 1, ObjectTransferToPrev, End] },
    WORD { "Word", WORD_CONST, PROP_TERM_ARG, &[LoadImmAsObject, 2, ObjectTransferToPrev, End] },
    DWORD { "DWord", DWORD_CONST, PROP_TERM_ARG, &[LoadImmAsObject, 4, ObjectTransferToPrev, End] },
    QWORD { "QWord", QWORD_CONST, PROP_TERM_ARG, &[LoadImmAsObject, 8, ObjectTransferToPrev, End] },
    STRING { "String", STRING_PREFIX, PROP_TERM_ARG, PROGRAM_CONST_TRANSFER },
    ALIAS { "Alias", ALIAS_OP, 0, &[ExistingNamestring, CreateNamestring, InvokeHandler, InstallNamespaceNode, 1, End] },
    NAME { "Name", NAME_OP, 0, &[CreateNamestring, TermArgOrNamedObject, InvokeHandler, InstallNamespaceNode, 0, End] },
    SCOPE { "Scope", SCOPE_OP, 0, &[Pkglen, ExistingNamestring, InvokeHandler, End] },
    BUFFER { "Buffer", BUFFER_OP, PROP_TERM_ARG, &[TrackedPkglen, Operand, RecordAmlPc, InvokeHandler, ObjectTransferToPrev, End] },
    PACKAGE { "Package", PACKAGE_OP, PROP_TERM_ARG, PROGRAM_PACKAGE },
    VAR_PACKAGE { "VarPackage", VAR_PACKAGE_OP, PROP_TERM_ARG, PROGRAM_VAR_PACKAGE },
    METHOD { "Method", METHOD_OP, 0, &[TrackedPkglen, CreateNamestring, LoadImm, 1, RecordAmlPc, InvokeHandler, InstallNamespaceNode, 1, End] },
    EXTERNAL { "External", EXTERNAL_OP, 0, &[ExistingNamestringOrNull, LoadImm, 1, LoadImm, 1, End] },
    NAMESTRING { "NameString", 0, PROP_SIMPLE_NAME | PROP_SUPER_NAME | PROP_TERM_ARG, PROGRAM_NAMESTRING },
    LOCAL { "Local", LOCAL0_OP, PROP_SIMPLE_NAME | PROP_SUPER_NAME | PROP_TERM_ARG, PROGRAM_CONST_TRANSFER },
    ARG { "Arg", ARG0_OP, PROP_SIMPLE_NAME | PROP_SUPER_NAME | PROP_TERM_ARG, PROGRAM_CONST_TRANSFER },
    STORE { "Store", STORE_OP, PROP_TERM_ARG, &[TermArg, Supername, InvokeHandler, ObjectTransferToPrev, End] },
    COPY_OBJECT { "CopyObject", COPY_OBJECT_OP, PROP_TERM_ARG, &[TermArg, SimpleName, InvokeHandler, ObjectTransferToPrev, End] },
    REF_OF { "RefOf", REF_OF_OP, PROP_SUPER_NAME | PROP_TERM_ARG, PROGRAM_SUPERNAME_QUERY },
    COND_REF_OF { "CondRefOf", COND_REF_OF_OP, PROP_TERM_ARG, PROGRAM_COND_REF_OF },
    DEREF_OF { "DerefOf", DEREF_OF_OP, PROP_SUPER_NAME | PROP_TERM_ARG, &[TermArg, InvokeHandler, ObjectTransferToPrev, End] },
    ADD { "Add", ADD_OP, PROP_TERM_ARG, PROGRAM_BINARY_MATH },
    SUBTRACT { "Subtract", SUBTRACT_OP, PROP_TERM_ARG, PROGRAM_BINARY_MATH },
    MULTIPLY { "Multiply", MULTIPLY_OP, PROP_TERM_ARG, PROGRAM_BINARY_MATH },
    DIVIDE { "Divide", DIVIDE_OP, PROP_TERM_ARG, PROGRAM_DIVIDE },
    SHIFT_LEFT { "ShiftLeft", SHIFT_LEFT_OP, PROP_TERM_ARG, PROGRAM_BINARY_MATH },
    SHIFT_RIGHT { "ShiftRight", SHIFT_RIGHT_OP, PROP_TERM_ARG, PROGRAM_BINARY_MATH },
    AND { "And", AND_OP, PROP_TERM_ARG, PROGRAM_BINARY_MATH },
    NAND { "Nand", NAND_OP, PROP_TERM_ARG, PROGRAM_BINARY_MATH },
    OR { "Or", OR_OP, PROP_TERM_ARG, PROGRAM_BINARY_MATH },
    NOR { "Nor", NOR_OP, PROP_TERM_ARG, PROGRAM_BINARY_MATH },
    XOR { "Xor", XOR_OP, PROP_TERM_ARG, PROGRAM_BINARY_MATH },
    MOD { "Mod", MOD_OP, PROP_TERM_ARG, PROGRAM_BINARY_MATH },
    NOT { "Not", NOT_OP, PROP_TERM_ARG, PROGRAM_UNARY_MATH },
    FIND_SET_LEFT_BIT { "FindSetLeftBit", FIND_SET_LEFT_BIT_OP, PROP_TERM_ARG, PROGRAM_UNARY_MATH },
    FIND_SET_RIGHT_BIT { "FindSetRightBit", FIND_SET_RIGHT_BIT_OP, PROP_TERM_ARG, PROGRAM_UNARY_MATH },
    INCREMENT { "Increment", INCREMENT_OP, PROP_TERM_ARG, PROGRAM_INC_DEC },
    DECREMENT { "Decrement", DECREMENT_OP, PROP_TERM_ARG, PROGRAM_INC_DEC },
    LNOT { "LNot", LNOT_OP, PROP_TERM_ARG, &[Operand, InvokeHandler, ObjectTransferToPrev, End] },
    LAND { "LAnd", LAND_OP, PROP_TERM_ARG, PROGRAM_BINARY_LOGIC },
    LOR { "LOr", LOR_OP, PROP_TERM_ARG, PROGRAM_BINARY_LOGIC },
    LEQUAL { "LEqual", LEQUAL_OP, PROP_TERM_ARG, PROGRAM_BINARY_LOGIC },
    LGREATER { "LGreater", LGREATER_OP, PROP_TERM_ARG, PROGRAM_BINARY_LOGIC },
    LLESS { "LLess", LLESS_OP, PROP_TERM_ARG, PROGRAM_BINARY_LOGIC },
    SIZE_OF { "SizeOf", SIZE_OF_OP, PROP_TERM_ARG, PROGRAM_SUPERNAME_QUERY },
    OBJECT_TYPE { "ObjectType", OBJECT_TYPE_OP, PROP_TERM_ARG, PROGRAM_SUPERNAME_QUERY },
    INDEX { "Index", INDEX_OP, PROP_SUPER_NAME | PROP_TERM_ARG, &[TermArgUnwrapInternal, Operand, Target, InvokeHandler, StoreToTarget, 2, ObjectTransferToPrev, End] },
    MID { "Mid", MID_OP, PROP_TERM_ARG, &[TermArgUnwrapInternal, Operand, Operand, Target, InvokeHandler, StoreToTarget, 3, ObjectTransferToPrev, End] },
    CONCAT { "Concat", CONCAT_OP, PROP_TERM_ARG, &[ComputationalData, ComputationalData, Target, InvokeHandler, StoreToTarget, 2, ObjectTransferToPrev, End] },
    TO_BUFFER { "ToBuffer", TO_BUFFER_OP, PROP_TERM_ARG, PROGRAM_TO },
    TO_DECIMAL_STRING { "ToDecimalString", TO_DECIMAL_STRING_OP, PROP_TERM_ARG, PROGRAM_TO },
    TO_HEX_STRING { "ToHexString", TO_HEX_STRING_OP, PROP_TERM_ARG, PROGRAM_TO },
    TO_INTEGER { "ToInteger", TO_INTEGER_OP, PROP_TERM_ARG, PROGRAM_TO },
    TO_STRING { "ToString", TO_STRING_OP, PROP_TERM_ARG, &[TermArgUnwrapInternal, Typecheck, TYPE_BUFFER, Operand, Target, InvokeHandler, StoreToTarget, 2, ObjectTransferToPrev, End] },
    CREATE_BIT_FIELD { "CreateBitField", CREATE_BIT_FIELD_OP, 0, PROGRAM_CREATE_BUFFER_FIELD },
    CREATE_BYTE_FIELD { "CreateByteField", CREATE_BYTE_FIELD_OP, 0, PROGRAM_CREATE_BUFFER_FIELD },
    CREATE_WORD_FIELD { "CreateWordField", CREATE_WORD_FIELD_OP, 0, PROGRAM_CREATE_BUFFER_FIELD },
    CREATE_DWORD_FIELD { "CreateDWordField", CREATE_DWORD_FIELD_OP, 0, PROGRAM_CREATE_BUFFER_FIELD },
    CREATE_QWORD_FIELD { "CreateQWordField", CREATE_QWORD_FIELD_OP, 0, PROGRAM_CREATE_BUFFER_FIELD },
    CREATE_FIELD { "CreateField", CREATE_FIELD_OP, 0, &[TermArgUnwrapInternal, Typecheck, TYPE_BUFFER, Operand, Operand, CreateNamestring, InvokeHandler, InstallNamespaceNode, 3, End] },
    IF { "If", IF_OP, 0, &[Pkglen, Operand, InvokeHandler, End] },
    ELSE { "Else", ELSE_OP, 0, &[Pkglen, InvokeHandler, End] },
    WHILE { "While", WHILE_OP, 0, &[Pkglen, Operand, InvokeHandler, End] },
    CONTINUE { "Continue", CONTINUE_OP, 0, &[InvokeHandler, End] },
    BREAK { "Break", BREAK_OP, 0, &[InvokeHandler, End] },
    RETURN { "Return", RETURN_OP, 0, &[TermArgUnwrapInternal, InvokeHandler, End] },
    NOOP { "Noop", NOOP_OP, 0, &[End] },
    BREAKPOINT { "Breakpoint", BREAKPOINT_OP, 0, &[InvokeHandler, End] },
    MUTEX { "Mutex", MUTEX_OP, 0, &[CreateNamestring, LoadImm, 1, InvokeHandler, InstallNamespaceNode, 0, End] },
    DEBUG { "Debug", DEBUG_OP, PROP_SUPER_NAME, PROGRAM_CONST_TRANSFER },
    TIMER { "Timer", TIMER_OP, PROP_TERM_ARG, PROGRAM_CONST_TRANSFER },
    OP_REGION { "OpRegion", OP_REGION_OP, 0, &[CreateNamestring, LoadImm, 1, Operand, Operand, InvokeHandler, InstallNamespaceNode, 0, End] },
    FIELD { "Field", FIELD_OP, 0, &[TrackedPkglen, ExistingNamestring, LoadImm, 1, InvokeHandler, End] },
    DEVICE { "Device", DEVICE_OP, 0, &[Pkglen, CreateNamestring, InvokeHandler, InstallNamespaceNode, 1, End] },
    PROCESSOR { "Processor", PROCESSOR_OP, 0, &[Pkglen, CreateNamestring, LoadImm, 1, LoadImm, 4, LoadImm, 1, InvokeHandler, InstallNamespaceNode, 1, End] },
    POWER_RES { "PowerRes", POWER_RES_OP, 0, &[Pkglen, CreateNamestring, LoadImm, 1, LoadImm, 2, InvokeHandler, InstallNamespaceNode, 1, End] },
    THERMAL_ZONE { "ThermalZone", THERMAL_ZONE_OP, 0, &[Pkglen, CreateNamestring, InvokeHandler, InstallNamespaceNode, 1, End] },
    RESERVED { "Reserved", 0x30, 0, &[BadOpcode] },
    CONCAT_RES { "ConcatRes", CONCAT_RES_OP, PROP_TERM_ARG, &[Todo] },
    NOTIFY { "Notify", NOTIFY_OP, 0, &[Todo] },
    MATCH { "Match", MATCH_OP, PROP_TERM_ARG, &[Todo] },
    EVENT { "Event", EVENT_OP, 0, &[Todo] },
    LOAD_TABLE { "LoadTable", LOAD_TABLE_OP, PROP_TERM_ARG, &[Todo] },
    LOAD { "Load", LOAD_OP, 0, &[Todo] },
    STALL { "Stall", STALL_OP, 0, &[Todo] },
    SLEEP { "Sleep", SLEEP_OP, 0, &[Todo] },
    ACQUIRE { "Acquire", ACQUIRE_OP, PROP_TERM_ARG, &[Todo] },
    SIGNAL { "Signal", SIGNAL_OP, 0, &[Todo] },
    WAIT { "Wait", WAIT_OP, PROP_TERM_ARG, &[Todo] },
    RESET { "Reset", RESET_OP, 0, &[Todo] },
    RELEASE { "Release", RELEASE_OP, 0, &[Todo] },
    FROM_BCD { "FromBCD", FROM_BCD_OP, PROP_TERM_ARG, &[Todo] },
    TO_BCD { "ToBCD", TO_BCD_OP, PROP_TERM_ARG, &[Todo] },
    REVISION { "Revision", REVISION_OP, PROP_TERM_ARG, &[Todo] },
    FATAL { "Fatal", FATAL_OP, 0, &[Todo] },
    INDEX_FIELD { "IndexField", INDEX_FIELD_OP, 0, &[Todo] },
    BANK_FIELD { "BankField", BANK_FIELD_OP, 0, &[Todo] },
    DATA_REGION { "DataRegion", DATA_REGION_OP, 0, &[Todo] },
    INTERNAL_NAMED_OBJECT { "Internal(NamedObject)", INTERNAL_NAMED_OBJECT_OP, PROP_SIMPLE_NAME | PROP_SUPER_NAME | PROP_TERM_ARG, PROGRAM_CONST_TRANSFER },
    INTERNAL_FIELD_READ_AS_BUFFER { "Internal(FieldReadAsBuffer)", INTERNAL_FIELD_READ_AS_BUFFER_OP, PROP_TERM_ARG, &[InvokeHandler, ObjectCopyToPrev, End] },
    INTERNAL_FIELD_READ_AS_INTEGER { "Internal(FieldReadAsInteger)", INTERNAL_FIELD_READ_AS_INTEGER_OP, PROP_TERM_ARG, &[InvokeHandler, ObjectCopyToPrev, End] },
}

op_specs! {
    METHOD_CALL0 { "Internal(MethodCall0)", INTERNAL_METHOD_CALL0_OP, PROP_TERM_ARG, &METHOD_CALL_PROGRAM_0 },
    METHOD_CALL1 { "Internal(MethodCall1)", INTERNAL_METHOD_CALL0_OP + 1, PROP_TERM_ARG, &METHOD_CALL_PROGRAM_1 },
    METHOD_CALL2 { "Internal(MethodCall2)", INTERNAL_METHOD_CALL0_OP + 2, PROP_TERM_ARG, &METHOD_CALL_PROGRAM_2 },
    METHOD_CALL3 { "Internal(MethodCall3)", INTERNAL_METHOD_CALL0_OP + 3, PROP_TERM_ARG, &METHOD_CALL_PROGRAM_3 },
    METHOD_CALL4 { "Internal(MethodCall4)", INTERNAL_METHOD_CALL0_OP + 4, PROP_TERM_ARG, &METHOD_CALL_PROGRAM_4 },
    METHOD_CALL5 { "Internal(MethodCall5)", INTERNAL_METHOD_CALL0_OP + 5, PROP_TERM_ARG, &METHOD_CALL_PROGRAM_5 },
    METHOD_CALL6 { "Internal(MethodCall6)", INTERNAL_METHOD_CALL0_OP + 6, PROP_TERM_ARG, &METHOD_CALL_PROGRAM_6 },
    METHOD_CALL7 { "Internal(MethodCall7)", INTERNAL_METHOD_CALL7_OP, PROP_TERM_ARG, &METHOD_CALL_PROGRAM_7 },
}

/// Look an opcode up. `None` means the opcode is reserved or undefined, which
/// the caller treats as bad bytecode.
pub fn op_spec(code: u16) -> Option<&'static OpSpec> {
    let spec = match code {
        ZERO_OP => &ZERO,
        ONE_OP => &ONE,
        ONES_OP => &ONES,
        ALIAS_OP => &ALIAS,
        NAME_OP => &NAME,
        BYTE_CONST => &BYTE,
        WORD_CONST => &WORD,
        DWORD_CONST => &DWORD,
        QWORD_CONST => &QWORD,
        STRING_PREFIX => &STRING,
        SCOPE_OP => &SCOPE,
        BUFFER_OP => &BUFFER,
        PACKAGE_OP => &PACKAGE,
        VAR_PACKAGE_OP => &VAR_PACKAGE,
        METHOD_OP => &METHOD,
        EXTERNAL_OP => &EXTERNAL,
        DUAL_NAME_PREFIX | MULTI_NAME_PREFIX | ROOT_CHAR | PARENT_PREFIX_CHAR => &NAMESTRING,
        0x41..=0x5a | 0x5f => &NAMESTRING,
        // Digits cannot lead a name segment and have no opcode meaning.
        0x30..=0x39 => &RESERVED,
        LOCAL0_OP..=LOCAL7_OP => &LOCAL,
        ARG0_OP..=ARG6_OP => &ARG,
        STORE_OP => &STORE,
        COPY_OBJECT_OP => &COPY_OBJECT,
        REF_OF_OP => &REF_OF,
        COND_REF_OF_OP => &COND_REF_OF,
        DEREF_OF_OP => &DEREF_OF,
        ADD_OP => &ADD,
        SUBTRACT_OP => &SUBTRACT,
        MULTIPLY_OP => &MULTIPLY,
        DIVIDE_OP => &DIVIDE,
        SHIFT_LEFT_OP => &SHIFT_LEFT,
        SHIFT_RIGHT_OP => &SHIFT_RIGHT,
        AND_OP => &AND,
        NAND_OP => &NAND,
        OR_OP => &OR,
        XOR_OP => &XOR,
        NOR_OP => &NOR,
        MOD_OP => &MOD,
        NOT_OP => &NOT,
        FIND_SET_LEFT_BIT_OP => &FIND_SET_LEFT_BIT,
        FIND_SET_RIGHT_BIT_OP => &FIND_SET_RIGHT_BIT,
        INCREMENT_OP => &INCREMENT,
        DECREMENT_OP => &DECREMENT,
        LNOT_OP => &LNOT,
        LAND_OP => &LAND,
        LOR_OP => &LOR,
        LEQUAL_OP => &LEQUAL,
        LGREATER_OP => &LGREATER,
        LLESS_OP => &LLESS,
        SIZE_OF_OP => &SIZE_OF,
        OBJECT_TYPE_OP => &OBJECT_TYPE,
        INDEX_OP => &INDEX,
        MID_OP => &MID,
        CONCAT_OP => &CONCAT,
        TO_BUFFER_OP => &TO_BUFFER,
        TO_DECIMAL_STRING_OP => &TO_DECIMAL_STRING,
        TO_HEX_STRING_OP => &TO_HEX_STRING,
        TO_INTEGER_OP => &TO_INTEGER,
        TO_STRING_OP => &TO_STRING,
        CREATE_BIT_FIELD_OP => &CREATE_BIT_FIELD,
        CREATE_BYTE_FIELD_OP => &CREATE_BYTE_FIELD,
        CREATE_WORD_FIELD_OP => &CREATE_WORD_FIELD,
        CREATE_DWORD_FIELD_OP => &CREATE_DWORD_FIELD,
        CREATE_QWORD_FIELD_OP => &CREATE_QWORD_FIELD,
        CREATE_FIELD_OP => &CREATE_FIELD,
        IF_OP => &IF,
        ELSE_OP => &ELSE,
        WHILE_OP => &WHILE,
        CONTINUE_OP => &CONTINUE,
        BREAK_OP => &BREAK,
        RETURN_OP => &RETURN,
        NOOP_OP => &NOOP,
        BREAKPOINT_OP => &BREAKPOINT,
        MUTEX_OP => &MUTEX,
        EVENT_OP => &EVENT,
        DEBUG_OP => &DEBUG,
        TIMER_OP => &TIMER,
        OP_REGION_OP => &OP_REGION,
        FIELD_OP => &FIELD,
        DEVICE_OP => &DEVICE,
        PROCESSOR_OP => &PROCESSOR,
        POWER_RES_OP => &POWER_RES,
        THERMAL_ZONE_OP => &THERMAL_ZONE,
        CONCAT_RES_OP => &CONCAT_RES,
        NOTIFY_OP => &NOTIFY,
        MATCH_OP => &MATCH,
        LOAD_TABLE_OP => &LOAD_TABLE,
        LOAD_OP => &LOAD,
        STALL_OP => &STALL,
        SLEEP_OP => &SLEEP,
        ACQUIRE_OP => &ACQUIRE,
        SIGNAL_OP => &SIGNAL,
        WAIT_OP => &WAIT,
        RESET_OP => &RESET,
        RELEASE_OP => &RELEASE,
        FROM_BCD_OP => &FROM_BCD,
        TO_BCD_OP => &TO_BCD,
        REVISION_OP => &REVISION,
        FATAL_OP => &FATAL,
        INDEX_FIELD_OP => &INDEX_FIELD,
        BANK_FIELD_OP => &BANK_FIELD,
        DATA_REGION_OP => &DATA_REGION,
        INTERNAL_NAMED_OBJECT_OP => &INTERNAL_NAMED_OBJECT,
        INTERNAL_METHOD_CALL0_OP..=INTERNAL_METHOD_CALL7_OP => {
            match code - INTERNAL_METHOD_CALL0_OP {
                0 => &METHOD_CALL0,
                1 => &METHOD_CALL1,
                2 => &METHOD_CALL2,
                3 => &METHOD_CALL3,
                4 => &METHOD_CALL4,
                5 => &METHOD_CALL5,
                6 => &METHOD_CALL6,
                _ => &METHOD_CALL7,
            }
        }
        INTERNAL_FIELD_READ_AS_BUFFER_OP => &INTERNAL_FIELD_READ_AS_BUFFER,
        INTERNAL_FIELD_READ_AS_INTEGER_OP => &INTERNAL_FIELD_READ_AS_INTEGER,
        _ => return None,
    };
    Some(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_covers_whole_families() {
        for code in LOCAL0_OP..=LOCAL7_OP {
            assert_eq!(op_spec(code).unwrap().name, "Local");
        }
        for code in ARG0_OP..=ARG6_OP {
            assert_eq!(op_spec(code).unwrap().name, "Arg");
        }
        for byte in b'A'..=b'Z' {
            assert_eq!(op_spec(byte as u16).unwrap().name, "NameString");
        }
    }

    #[test]
    fn reserved_opcodes_are_rejected() {
        assert!(op_spec(0x02).is_none());
        assert!(op_spec(0x6f).is_none());
        assert!(op_spec(0x5bff).is_none());
    }

    #[test]
    fn every_program_terminates() {
        // Every jump-free path must hit End/Todo before the slice runs out;
        // check that at least the final micro-op of each inventory entry is a
        // terminator.
        let mut codes: alloc::vec::Vec<u16> = alloc::vec![
            ZERO_OP, ONE_OP, ONES_OP, ALIAS_OP, NAME_OP, SCOPE_OP, BUFFER_OP, PACKAGE_OP,
            VAR_PACKAGE_OP, METHOD_OP, EXTERNAL_OP, STORE_OP, COPY_OBJECT_OP, REF_OF_OP,
            COND_REF_OF_OP, DEREF_OF_OP, ADD_OP, DIVIDE_OP, INCREMENT_OP, LNOT_OP, LEQUAL_OP,
            SIZE_OF_OP, OBJECT_TYPE_OP, INDEX_OP, MID_OP, CONCAT_OP, TO_BUFFER_OP, TO_STRING_OP,
            CREATE_BIT_FIELD_OP, CREATE_FIELD_OP, IF_OP, ELSE_OP, WHILE_OP, CONTINUE_OP,
            BREAK_OP, RETURN_OP, NOOP_OP, MUTEX_OP, DEBUG_OP, TIMER_OP, OP_REGION_OP, FIELD_OP,
            DEVICE_OP, PROCESSOR_OP, POWER_RES_OP, THERMAL_ZONE_OP, INTERNAL_NAMED_OBJECT_OP,
            INTERNAL_FIELD_READ_AS_BUFFER_OP,
        ];
        codes.extend(INTERNAL_METHOD_CALL0_OP..=INTERNAL_METHOD_CALL7_OP);

        for code in codes {
            let spec = op_spec(code).unwrap();
            let last = *spec.ops.last().unwrap();
            assert!(
                last == ParseOp::End as u8 || last == ParseOp::Todo as u8,
                "program for {} does not end in a terminator",
                spec.name
            );
        }
    }
}
