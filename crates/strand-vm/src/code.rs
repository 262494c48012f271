//! Instruction construction: the factory seam and a label-resolving code builder.

use std::sync::Arc;

use strand_common_core::TypeCode;

use crate::instruction::{FieldRef, Instruction, MethodRef, Opcode, Operand};
use crate::method::MethodInfo;
use crate::vm::VmError;

/// Creates instructions for one method body.
///
/// Factories may keep per-method state, so every code builder asks the
/// prototype for a fresh instance rather than sharing it.
pub trait InstructionFactory: Send + Sync {
    fn new_instance(&self) -> Box<dyn InstructionFactory>;

    fn create(&mut self, op: Opcode, operand: Operand) -> Instruction {
        Instruction::new(op, operand)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInstructionFactory;

impl InstructionFactory for DefaultInstructionFactory {
    fn new_instance(&self) -> Box<dyn InstructionFactory> {
        Box::new(DefaultInstructionFactory)
    }
}

/// Forward-referencable jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(u32);

struct PendingHandler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: Option<Arc<str>>,
}

pub struct CodeBuilder {
    factory: Box<dyn InstructionFactory>,
    code: Vec<Instruction>,
    labels: Vec<Option<u32>>,
    fixups: Vec<(usize, Label)>,
    lines: Vec<(u32, u32)>,
    current_line: Option<u32>,
    handlers: Vec<PendingHandler>,
}

impl CodeBuilder {
    pub fn new(factory: Box<dyn InstructionFactory>) -> Self {
        Self {
            factory,
            code: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            lines: Vec::new(),
            current_line: None,
            handlers: Vec::new(),
        }
    }

    /// Index the next emitted instruction will get.
    #[inline]
    pub fn next_index(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Bind `label` to the next emitted instruction.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0 as usize] = Some(self.next_index());
    }

    /// Source line attached to subsequently emitted instructions.
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.current_line = Some(line);
        self
    }

    /// Declare a handler for `[start, end)`; `None` catches everything.
    pub fn handler(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) {
        self.handlers.push(PendingHandler {
            start,
            end,
            handler,
            catch_type: catch_type.map(Into::into),
        });
    }

    pub fn emit(&mut self, op: Opcode, operand: Operand) -> u32 {
        let index = self.next_index();
        let insn = self.factory.create(op, operand);
        self.code.push(insn);
        if let Some(line) = self.current_line {
            self.lines.push((index, line));
        }
        index
    }

    // === Shorthands ===

    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.emit(op, Operand::None);
        self
    }

    pub fn iconst(&mut self, v: i32) -> &mut Self {
        self.emit(Opcode::IConst, Operand::Int(v as i64));
        self
    }

    pub fn lconst(&mut self, v: i64) -> &mut Self {
        self.emit(Opcode::LConst, Operand::Int(v));
        self
    }

    pub fn dconst(&mut self, v: f64) -> &mut Self {
        self.emit(Opcode::DConst, Operand::Double(v));
        self
    }

    /// Load or store through a local slot.
    pub fn local(&mut self, op: Opcode, slot: u16) -> &mut Self {
        self.emit(op, Operand::Local(slot));
        self
    }

    pub fn iinc(&mut self, slot: u16, delta: i32) -> &mut Self {
        self.emit(Opcode::IInc, Operand::Iinc { local: slot, delta });
        self
    }

    pub fn branch(&mut self, op: Opcode, target: Label) -> &mut Self {
        let at = self.emit(op, Operand::Target(0));
        self.fixups.push((at as usize, target));
        self
    }

    pub fn goto(&mut self, target: Label) -> &mut Self {
        self.branch(Opcode::Goto, target)
    }

    pub fn new_object(&mut self, class: &str) -> &mut Self {
        self.emit(Opcode::New, Operand::Class(class.into()));
        self
    }

    pub fn new_array(&mut self, elem: TypeCode) -> &mut Self {
        self.emit(Opcode::NewArray, Operand::Type(elem));
        self
    }

    pub fn anew_array(&mut self, class: &str) -> &mut Self {
        self.emit(Opcode::ANewArray, Operand::Class(class.into()));
        self
    }

    pub fn field(&mut self, op: Opcode, class: &str, name: &str, descriptor: &str) -> &mut Self {
        self.emit(
            op,
            Operand::Field(FieldRef {
                class: class.into(),
                name: name.into(),
                descriptor: descriptor.into(),
            }),
        );
        self
    }

    pub fn invoke(&mut self, op: Opcode, class: &str, name: &str, signature: &str) -> &mut Self {
        self.emit(op, Operand::Method(MethodRef::new(class, name, signature)));
        self
    }

    pub fn invoke_clinit(&mut self, class: &str) -> &mut Self {
        self.emit(Opcode::InvokeClinit, Operand::Class(class.into()));
        self
    }

    pub fn assert_true(&mut self, message: &str) -> &mut Self {
        self.emit(Opcode::Assert, Operand::Message(message.into()));
        self
    }

    // === Finishing ===

    fn label_index(&self, label: Label) -> Result<u32, VmError> {
        self.labels
            .get(label.0 as usize)
            .copied()
            .flatten()
            .ok_or(VmError::UnboundLabel(label.0))
    }

    /// Resolve branch targets and hand out the raw instruction list.
    pub fn finish(mut self) -> Result<Vec<Instruction>, VmError> {
        for (at, label) in std::mem::take(&mut self.fixups) {
            let target = self.label_index(label)?;
            self.code[at].operand = Operand::Target(target);
        }
        Ok(self.code)
    }

    /// Install code, line table and handler table into `mi`.
    pub fn install(mut self, mi: &mut MethodInfo) -> Result<(), VmError> {
        let lines = std::mem::take(&mut self.lines);
        let handlers = std::mem::take(&mut self.handlers);
        let mut resolved = Vec::with_capacity(handlers.len());
        for h in &handlers {
            resolved.push((
                self.label_index(h.start)?,
                self.label_index(h.end)?,
                self.label_index(h.handler)?,
                h.catch_type.clone(),
            ));
        }

        let code = self.finish()?;
        // Position of the index-th instruction, or the end of the code.
        let positions: Vec<u32> = code
            .iter()
            .scan(0u32, |pos, insn| {
                let at = *pos;
                *pos += insn.length();
                Some(at)
            })
            .collect();
        let end = positions
            .last()
            .zip(code.last())
            .map_or(0, |(p, insn)| p + insn.length());
        let pos_of = |i: u32| positions.get(i as usize).copied().unwrap_or(end);

        mi.set_code(code);

        if !lines.is_empty() {
            mi.start_line_number_table(lines.len())?;
            for (i, (index, line)) in lines.iter().enumerate() {
                mi.set_line_number(i, *line, pos_of(*index))?;
            }
            mi.finish_line_number_table();
        }

        if !resolved.is_empty() {
            mi.start_exception_handler_table(resolved.len());
            for (i, (start, end, handler, catch_type)) in resolved.into_iter().enumerate() {
                mi.set_exception_handler(
                    i,
                    pos_of(start),
                    pos_of(end),
                    pos_of(handler),
                    catch_type.as_deref(),
                )?;
            }
            mi.finish_exception_handler_table()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_label_resolution() {
        let mut b = CodeBuilder::new(Box::new(DefaultInstructionFactory));
        let done = b.new_label();
        b.local(Opcode::ILoad, 0).branch(Opcode::IfEq, done).iconst(1).op(Opcode::Pop);
        b.bind(done);
        b.op(Opcode::Return);

        let code = b.finish().unwrap();
        assert_eq!(code.len(), 5);
        assert_eq!(code[1].operand, Operand::Target(4));
    }

    #[test]
    fn test_unbound_label_is_an_error() {
        let mut b = CodeBuilder::new(Box::new(DefaultInstructionFactory));
        let nowhere = b.new_label();
        b.goto(nowhere);
        assert!(matches!(b.finish(), Err(VmError::UnboundLabel(0))));
    }

    struct Counting(u32);

    impl InstructionFactory for Counting {
        fn new_instance(&self) -> Box<dyn InstructionFactory> {
            Box::new(Counting(0))
        }

        fn create(&mut self, op: Opcode, operand: Operand) -> Instruction {
            self.0 += 1;
            let mut insn = Instruction::new(op, operand);
            insn.ext_mut().insert(self.0);
            insn
        }
    }

    #[test]
    fn test_factory_instances_do_not_share_state() {
        let proto = Counting(100);
        let mut b = CodeBuilder::new(proto.new_instance());
        b.op(Opcode::Nop).op(Opcode::Return);
        let code = b.finish().unwrap();
        assert_eq!(code[0].ext().get::<u32>(), Some(&1));
        assert_eq!(code[1].ext().get::<u32>(), Some(&2));
        assert_eq!(proto.0, 100);
    }
}
