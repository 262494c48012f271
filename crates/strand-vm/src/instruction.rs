//! Instruction format and opcodes.

use std::sync::Arc;

use num_enum::TryFromPrimitive;
use strand_common_core::TypeCode;

use crate::ext::Extensions;
use crate::method::MethodId;
use crate::thread::ThreadInfo;
use crate::vm::VmError;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Opcode {
    // === CONST / LOCAL / STACK ===
    Nop = 0,
    IConst,
    LConst,
    DConst,
    AConstNull,
    ILoad,
    IStore,
    LLoad,
    LStore,
    DLoad,
    DStore,
    ALoad,
    AStore,
    Dup,
    Pop,
    Pop2,
    Swap,

    // === ARITH: int ===
    IAdd,
    ISub,
    IMul,
    IDiv,
    IRem,
    INeg,
    IInc,

    // === ARITH: long ===
    LAdd,
    LSub,
    LMul,
    LDiv,
    LCmp,
    I2L,
    L2I,

    // === ARITH: double ===
    DAdd,
    DSub,
    DMul,
    DDiv,
    DCmpl,
    I2D,
    D2I,
    F2D,

    // === BRANCH ===
    IfEq,
    IfNe,
    IfLt,
    IfGe,
    IfGt,
    IfLe,
    IfICmpEq,
    IfICmpNe,
    IfICmpLt,
    IfICmpGe,
    IfICmpGt,
    IfICmpLe,
    IfACmpEq,
    IfACmpNe,
    IfNull,
    IfNonNull,
    Goto,

    // === OBJECT / ARRAY ===
    New,
    NewArray,
    ANewArray,
    ArrayLength,
    IALoad,
    IAStore,
    AALoad,
    AAStore,
    GetField,
    PutField,
    GetStatic,
    PutStatic,

    // === CALL ===
    InvokeVirtual,
    InvokeSpecial,
    InvokeStatic,
    /// Overlay: run `<clinit>` of the operand class if it is not initialized yet.
    InvokeClinit,
    /// Pops a synthetic stub frame without advancing the caller.
    DirectCallReturn,
    Return,
    IReturn,
    LReturn,
    DReturn,
    AReturn,

    // === EXCEPTION / MONITOR ===
    AThrow,
    MonitorEnter,
    MonitorExit,
    /// Raise `AssertionError` with the operand message when the popped int is 0.
    Assert,

    // === THREAD ===
    ThreadStart,
    ThreadJoin,
    ThreadYield,
}

impl Opcode {
    pub const MAX_VALID: u8 = Opcode::ThreadYield as u8;

    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Encoded length in bytes; positions accumulate these.
    pub fn length(self) -> u32 {
        use Opcode::*;
        match self {
            IConst | ILoad | IStore | LLoad | LStore | DLoad | DStore | ALoad | AStore
            | NewArray => 2,
            LConst | DConst | IInc | New | ANewArray | GetField | PutField | GetStatic
            | PutStatic | InvokeVirtual | InvokeSpecial | InvokeStatic | Assert => 3,
            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe | IfICmpEq | IfICmpNe | IfICmpLt
            | IfICmpGe | IfICmpGt | IfICmpLe | IfACmpEq | IfACmpNe | IfNull | IfNonNull
            | Goto => 3,
            _ => 1,
        }
    }

    #[inline]
    pub fn is_branch(self) -> bool {
        (Opcode::IfEq as u8..=Opcode::Goto as u8).contains(&(self as u8))
    }

    #[inline]
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Opcode::InvokeVirtual | Opcode::InvokeSpecial | Opcode::InvokeStatic
        )
    }

    #[inline]
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::Return | Opcode::IReturn | Opcode::LReturn | Opcode::DReturn | Opcode::AReturn
        )
    }

    /// Opcodes that exist only for the interpreter and have no class-file form.
    pub fn is_extended(self) -> bool {
        matches!(
            self,
            Opcode::InvokeClinit
                | Opcode::DirectCallReturn
                | Opcode::Assert
                | Opcode::ThreadStart
                | Opcode::ThreadJoin
                | Opcode::ThreadYield
        )
    }

    pub fn mnemonic(self) -> String {
        format!("{:?}", self).to_lowercase()
    }
}

// =============================================================================
// Operands
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: Arc<str>,
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: Arc<str>,
    pub name: Arc<str>,
    pub signature: Arc<str>,
}

impl MethodRef {
    pub fn new(class: &str, name: &str, signature: &str) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            signature: signature.into(),
        }
    }

    pub fn unique_name(&self) -> String {
        format!("{}{}", self.name, self.signature)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Int(i64),
    Double(f64),
    Local(u16),
    Iinc { local: u16, delta: i32 },
    /// Branch target as an instruction index.
    Target(u32),
    Type(TypeCode),
    Class(Arc<str>),
    Field(FieldRef),
    Method(MethodRef),
    Message(Arc<str>),
}

/// A static location: method id plus instruction index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramPoint {
    pub method: MethodId,
    pub index: u32,
}

// =============================================================================
// Instruction
// =============================================================================

#[derive(Debug, Clone)]
pub struct Instruction {
    pub op: Opcode,
    pub operand: Operand,
    index: u32,
    position: u32,
    method: MethodId,
    ext: Extensions,
}

impl Instruction {
    pub fn new(op: Opcode, operand: Operand) -> Self {
        Self {
            op,
            operand,
            index: 0,
            position: 0,
            method: MethodId::UNREGISTERED,
            ext: Extensions::new(),
        }
    }

    #[inline]
    pub(crate) fn set_location(&mut self, index: u32, position: u32) {
        self.index = index;
        self.position = position;
    }

    #[inline]
    pub(crate) fn set_method(&mut self, method: MethodId) {
        self.method = method;
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Byte offset inside the owning method's code.
    #[inline]
    pub fn position(&self) -> u32 {
        self.position
    }

    #[inline]
    pub fn method_id(&self) -> MethodId {
        self.method
    }

    #[inline]
    pub fn point(&self) -> ProgramPoint {
        ProgramPoint {
            method: self.method,
            index: self.index,
        }
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.op.length()
    }

    #[inline]
    pub fn next_index(&self) -> u32 {
        self.index + 1
    }

    pub fn is_first_instruction(&self) -> bool {
        self.index == 0
    }

    pub fn is_back_jump(&self) -> bool {
        match (self.op.is_branch(), &self.operand) {
            (true, Operand::Target(t)) => *t <= self.index,
            _ => false,
        }
    }

    pub fn mnemonic(&self) -> String {
        self.op.mnemonic()
    }

    pub fn ext(&self) -> &Extensions {
        &self.ext
    }

    pub fn ext_mut(&mut self) -> &mut Extensions {
        &mut self.ext
    }

    /// Has this instruction finished on `thread`, including any overlay calls
    /// it triggered?
    pub fn is_completed(&self, thread: &ThreadInfo) -> bool {
        match thread.next_pc() {
            None => thread.is_terminated(),
            Some(next) => {
                next != self.point() && thread.stack_frame_executing(self.point(), 1).is_none()
            }
        }
    }

    // === Operand accessors ===

    fn malformed(&self, expected: &'static str) -> VmError {
        VmError::MalformedOperand {
            op: self.op,
            expected,
        }
    }

    pub fn local(&self) -> Result<usize, VmError> {
        match self.operand {
            Operand::Local(l) => Ok(l as usize),
            _ => Err(self.malformed("local slot")),
        }
    }

    pub fn int_value(&self) -> Result<i64, VmError> {
        match self.operand {
            Operand::Int(v) => Ok(v),
            _ => Err(self.malformed("int constant")),
        }
    }

    pub fn double_value(&self) -> Result<f64, VmError> {
        match self.operand {
            Operand::Double(v) => Ok(v),
            _ => Err(self.malformed("double constant")),
        }
    }

    pub fn iinc(&self) -> Result<(usize, i32), VmError> {
        match self.operand {
            Operand::Iinc { local, delta } => Ok((local as usize, delta)),
            _ => Err(self.malformed("iinc pair")),
        }
    }

    pub fn target(&self) -> Result<u32, VmError> {
        match self.operand {
            Operand::Target(t) => Ok(t),
            _ => Err(self.malformed("branch target")),
        }
    }

    pub fn type_code(&self) -> Result<TypeCode, VmError> {
        match self.operand {
            Operand::Type(t) => Ok(t),
            _ => Err(self.malformed("type code")),
        }
    }

    pub fn class_name(&self) -> Result<&str, VmError> {
        match &self.operand {
            Operand::Class(c) => Ok(c),
            Operand::Field(f) => Ok(&f.class),
            Operand::Method(m) => Ok(&m.class),
            _ => Err(self.malformed("class name")),
        }
    }

    pub fn field_ref(&self) -> Result<&FieldRef, VmError> {
        match &self.operand {
            Operand::Field(f) => Ok(f),
            _ => Err(self.malformed("field reference")),
        }
    }

    pub fn method_ref(&self) -> Result<&MethodRef, VmError> {
        match &self.operand {
            Operand::Method(m) => Ok(m),
            _ => Err(self.malformed("method reference")),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match &self.operand {
            Operand::Message(m) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for i in 0..=Opcode::MAX_VALID {
            let op = Opcode::from_u8(i).expect("dense opcode numbering");
            assert_eq!(op as u8, i);
        }
        assert_eq!(Opcode::from_u8(Opcode::MAX_VALID + 1), None);
    }

    #[test]
    fn test_branch_classification() {
        assert!(Opcode::IfEq.is_branch());
        assert!(Opcode::Goto.is_branch());
        assert!(!Opcode::New.is_branch());
        assert!(Opcode::AReturn.is_return());
        assert!(Opcode::InvokeSpecial.is_invoke());
        assert!(!Opcode::InvokeClinit.is_invoke());
        assert!(Opcode::InvokeClinit.is_extended());
    }

    #[test]
    fn test_back_jump() {
        let mut insn = Instruction::new(Opcode::Goto, Operand::Target(2));
        insn.set_location(5, 12);
        assert!(insn.is_back_jump());
        insn.operand = Operand::Target(9);
        assert!(!insn.is_back_jump());
        assert_eq!(insn.position(), 12);
        assert_eq!(insn.mnemonic(), "goto");
    }

    #[test]
    fn test_operand_mismatch_is_reported() {
        let insn = Instruction::new(Opcode::ILoad, Operand::Int(3));
        assert!(matches!(
            insn.local(),
            Err(VmError::MalformedOperand { op: Opcode::ILoad, .. })
        ));
        let call = Instruction::new(
            Opcode::InvokeStatic,
            Operand::Method(MethodRef::new("app/Main", "f", "(I)V")),
        );
        assert_eq!(call.class_name().unwrap(), "app/Main");
        assert_eq!(call.method_ref().unwrap().unique_name(), "f(I)V");
    }
}
