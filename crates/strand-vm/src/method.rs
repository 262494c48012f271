//! Method descriptors.
//!
//! A `MethodInfo` is populated once (constructor, `set_code`, then the
//! start/set/finish table builders) and frozen behind an `Arc` when the
//! registry assigns its id. Everything derived from the signature is a pure
//! function of it and memoized on first use.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use strand_common_core::{jni, types, Modifiers, TypeCode};

use crate::bytecode::ClassId;
use crate::choice::ChoiceKind;
use crate::code::{CodeBuilder, InstructionFactory};
use crate::ext::Extensions;
use crate::instruction::{Instruction, Opcode};
use crate::thread::ThreadInfo;
use crate::vm::VmError;

/// Registry index of a method. Negative values are reserved for stubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MethodId(pub i32);

impl MethodId {
    pub const DIRECT_CALL: Self = Self(-1);
    pub const REFLECTION_CALL: Self = Self(-2);
    /// Placeholder until the registry assigns the real id.
    pub const UNREGISTERED: Self = Self(i32::MIN);

    #[inline]
    pub fn is_registered(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

/// Execution attributes that are not class-file modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MethodAttributes(u32);

impl MethodAttributes {
    /// No scheduling points inside.
    pub const ATOMIC: Self = Self(0x01);
    /// Not reported to instruction listeners.
    pub const HIDDEN: Self = Self(0x02);
    /// Escaping exceptions become unhandled-exception signals.
    pub const FIREWALL: Self = Self(0x04);
    pub const IS_CLINIT: Self = Self(0x08);
    pub const IS_INIT: Self = Self(0x10);

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    fn set(&mut self, other: Self, on: bool) {
        if on {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

/// What a method knows about its declaring class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRef {
    pub id: ClassId,
    pub name: Arc<str>,
    pub source_file: Option<Arc<str>>,
    pub is_interface: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u32,
    /// Exclusive.
    pub end_pc: u32,
    pub handler_pc: u32,
    /// `None` catches everything.
    pub catch_type: Option<Arc<str>>,
}

impl ExceptionHandler {
    #[inline]
    pub fn covers(&self, position: u32) -> bool {
        self.start_pc <= position && position < self.end_pc
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVarInfo {
    pub name: Arc<str>,
    pub signature: Arc<str>,
    pub generic_signature: Option<Arc<str>>,
    pub start_pc: u32,
    pub length: u32,
    pub slot: u16,
}

impl LocalVarInfo {
    #[inline]
    pub fn in_scope(&self, pc: u32) -> bool {
        self.start_pc <= pc && pc < self.start_pc + self.length
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationInfo {
    pub type_name: Arc<str>,
    pub values: Vec<(Arc<str>, Arc<str>)>,
}

impl AnnotationInfo {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.into(),
            values: Vec::new(),
        }
    }
}

/// Slots filled by index during streaming population.
#[derive(Debug, Clone)]
struct TableBuilder<T> {
    slots: Vec<Option<T>>,
}

impl<T> TableBuilder<T> {
    fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| None).collect(),
        }
    }

    fn set(&mut self, table: &'static str, index: usize, value: T) -> Result<(), VmError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(VmError::TableIndexOutOfRange { table, index })?;
        *slot = Some(value);
        Ok(())
    }

    fn finish(self, table: &'static str) -> Result<Vec<T>, VmError> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, v)| v.ok_or(VmError::MissingTableEntry { table, index }))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct PendingTables {
    handlers: Option<TableBuilder<ExceptionHandler>>,
    local_vars: Option<TableBuilder<LocalVarInfo>>,
    line_count: Option<usize>,
    annotations: Option<TableBuilder<Vec<AnnotationInfo>>>,
    thrown: Option<TableBuilder<Arc<str>>>,
}

#[derive(Debug, Clone, Default)]
struct Derived {
    n_args: OnceLock<usize>,
    arg_size: OnceLock<usize>,
    arg_types: OnceLock<Vec<TypeCode>>,
    return_type: OnceLock<TypeCode>,
    ret_size: OnceLock<usize>,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    global_id: MethodId,
    name: Arc<str>,
    signature: Arc<str>,
    generic_signature: Option<Arc<str>>,
    unique_name: Arc<str>,
    class: Option<ClassRef>,
    modifiers: Modifiers,
    attributes: MethodAttributes,
    max_locals: u16,
    max_stack: u16,
    code: Option<Vec<Instruction>>,
    exception_handlers: Option<Vec<ExceptionHandler>>,
    line_numbers: Option<Vec<u32>>,
    local_vars: Option<Vec<LocalVarInfo>>,
    parameter_annotations: Option<Vec<Vec<AnnotationInfo>>>,
    thrown_exceptions: Option<Vec<Arc<str>>>,
    ext: Extensions,
    pending: PendingTables,
    derived: Derived,
}

impl MethodInfo {
    pub fn new(
        class: Option<ClassRef>,
        name: &str,
        signature: &str,
        max_locals: u16,
        max_stack: u16,
        modifiers: Modifiers,
    ) -> Result<Self, VmError> {
        types::check_signature(signature)?;
        Ok(Self::new_unchecked(class, name, signature, max_locals, max_stack, modifiers))
    }

    /// Constructor for signatures known to be well formed.
    pub(crate) fn new_unchecked(
        class: Option<ClassRef>,
        name: &str,
        signature: &str,
        max_locals: u16,
        max_stack: u16,
        modifiers: Modifiers,
    ) -> Self {
        let mut modifiers = modifiers;
        let mut attributes = MethodAttributes::default();
        if let Some(class) = &class {
            if name == "<init>" {
                attributes.set(MethodAttributes::IS_INIT, true);
            } else if name == "<clinit>" {
                modifiers |= Modifiers::SYNCHRONIZED;
                attributes.set(MethodAttributes::IS_CLINIT, true);
                attributes.set(MethodAttributes::FIREWALL, true);
            }
            if class.is_interface {
                modifiers |= Modifiers::PUBLIC;
            }
        }

        Self {
            global_id: MethodId::UNREGISTERED,
            name: name.into(),
            signature: signature.into(),
            generic_signature: None,
            unique_name: format!("{}{}", name, signature).into(),
            class,
            modifiers,
            attributes,
            max_locals,
            max_stack,
            code: None,
            exception_handlers: None,
            line_numbers: None,
            local_vars: None,
            parameter_annotations: None,
            thrown_exceptions: None,
            ext: Extensions::new(),
            pending: PendingTables::default(),
            derived: Derived::default(),
        }
    }

    /// Called once by the registry.
    pub(crate) fn assign_id(&mut self, id: MethodId) {
        self.global_id = id;
        if let Some(code) = self.code.as_mut() {
            for insn in code {
                insn.set_method(id);
            }
        }
    }

    // =========================================================================
    // Population
    // =========================================================================

    /// Install the instruction array; stamps index, position and owner.
    pub fn set_code(&mut self, mut code: Vec<Instruction>) {
        let mut position = 0;
        for (i, insn) in code.iter_mut().enumerate() {
            insn.set_location(i as u32, position);
            insn.set_method(self.global_id);
            position += insn.length();
        }
        self.code = Some(code);
    }

    pub fn set_generic_signature(&mut self, sig: &str) {
        self.generic_signature = Some(sig.into());
    }

    pub fn set_atomic(&mut self, on: bool) {
        self.attributes.set(MethodAttributes::ATOMIC, on);
    }

    pub fn set_hidden(&mut self, on: bool) {
        self.attributes.set(MethodAttributes::HIDDEN, on);
    }

    pub fn set_firewall(&mut self, on: bool) {
        self.attributes.set(MethodAttributes::FIREWALL, on);
    }

    pub fn ext_mut(&mut self) -> &mut Extensions {
        &mut self.ext
    }

    pub fn start_exception_handler_table(&mut self, count: usize) {
        self.pending.handlers = Some(TableBuilder::new(count));
    }

    pub fn set_exception_handler(
        &mut self,
        index: usize,
        start_pc: u32,
        end_pc: u32,
        handler_pc: u32,
        catch_type: Option<&str>,
    ) -> Result<(), VmError> {
        let table = self
            .pending
            .handlers
            .as_mut()
            .ok_or(VmError::TableNotStarted("exception handler"))?;
        table.set(
            "exception handler",
            index,
            ExceptionHandler {
                start_pc,
                end_pc,
                handler_pc,
                catch_type: catch_type.map(Into::into),
            },
        )
    }

    pub fn finish_exception_handler_table(&mut self) -> Result<(), VmError> {
        let table = self
            .pending
            .handlers
            .take()
            .ok_or(VmError::TableNotStarted("exception handler"))?;
        self.exception_handlers = Some(table.finish("exception handler")?);
        Ok(())
    }

    pub fn start_local_var_table(&mut self, count: usize) {
        self.pending.local_vars = Some(TableBuilder::new(count));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_local_var(
        &mut self,
        index: usize,
        name: &str,
        signature: &str,
        generic_signature: Option<&str>,
        start_pc: u32,
        length: u32,
        slot: u16,
    ) -> Result<(), VmError> {
        let table = self
            .pending
            .local_vars
            .as_mut()
            .ok_or(VmError::TableNotStarted("local variable"))?;
        table.set(
            "local variable",
            index,
            LocalVarInfo {
                name: name.into(),
                signature: signature.into(),
                generic_signature: generic_signature.map(Into::into),
                start_pc,
                length,
                slot,
            },
        )
    }

    pub fn finish_local_var_table(&mut self) -> Result<(), VmError> {
        let table = self
            .pending
            .local_vars
            .take()
            .ok_or(VmError::TableNotStarted("local variable"))?;
        self.local_vars = Some(table.finish("local variable")?);
        Ok(())
    }

    /// One line slot per instruction; requires code.
    pub fn start_line_number_table(&mut self, count: usize) -> Result<(), VmError> {
        let len = self
            .code
            .as_ref()
            .map(Vec::len)
            .ok_or_else(|| VmError::NoCode(self.full_name()))?;
        self.line_numbers = Some(vec![0; len]);
        self.pending.line_count = Some(count);
        Ok(())
    }

    /// Assign `line` to the instruction starting at `start_pc`.
    /// An entry with no matching instruction is ignored.
    pub fn set_line_number(&mut self, index: usize, line: u32, start_pc: u32) -> Result<(), VmError> {
        let count = self
            .pending
            .line_count
            .ok_or(VmError::TableNotStarted("line number"))?;
        if index >= count {
            return Err(VmError::TableIndexOutOfRange {
                table: "line number",
                index,
            });
        }
        let at = self
            .code
            .as_ref()
            .and_then(|code| code.iter().position(|insn| insn.position() == start_pc));
        if let (Some(i), Some(lines)) = (at, self.line_numbers.as_mut()) {
            lines[i] = line;
        }
        Ok(())
    }

    /// Fill unassigned slots with the preceding line.
    pub fn finish_line_number_table(&mut self) {
        self.pending.line_count = None;
        if let Some(lines) = self.line_numbers.as_mut() {
            let mut last = lines.first().copied().unwrap_or(0);
            for l in lines.iter_mut() {
                if *l == 0 {
                    *l = last;
                } else {
                    last = *l;
                }
            }
        }
    }

    pub fn start_parameter_annotations(&mut self, count: usize) {
        self.pending.annotations = Some(TableBuilder::new(count));
    }

    pub fn set_parameter_annotations(
        &mut self,
        index: usize,
        annotations: Vec<AnnotationInfo>,
    ) -> Result<(), VmError> {
        let table = self
            .pending
            .annotations
            .as_mut()
            .ok_or(VmError::TableNotStarted("parameter annotation"))?;
        table.set("parameter annotation", index, annotations)
    }

    pub fn finish_parameter_annotations(&mut self) -> Result<(), VmError> {
        let table = self
            .pending
            .annotations
            .take()
            .ok_or(VmError::TableNotStarted("parameter annotation"))?;
        self.parameter_annotations = Some(table.finish("parameter annotation")?);
        Ok(())
    }

    pub fn start_thrown_exceptions(&mut self, count: usize) {
        self.pending.thrown = Some(TableBuilder::new(count));
    }

    /// `type_name` may be internal (`java/io/IOException`) or a descriptor.
    pub fn set_thrown_exception(&mut self, index: usize, type_name: &str) -> Result<(), VmError> {
        let table = self
            .pending
            .thrown
            .as_mut()
            .ok_or(VmError::TableNotStarted("thrown exception"))?;
        let name = types::class_name_from_type_name(type_name);
        table.set("thrown exception", index, name.into())
    }

    pub fn finish_thrown_exceptions(&mut self) -> Result<(), VmError> {
        let table = self
            .pending
            .thrown
            .take()
            .ok_or(VmError::TableNotStarted("thrown exception"))?;
        self.thrown_exceptions = Some(table.finish("thrown exception")?);
        Ok(())
    }

    // =========================================================================
    // Identity and names
    // =========================================================================

    #[inline]
    pub fn global_id(&self) -> MethodId {
        self.global_id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn generic_signature(&self) -> Option<&str> {
        self.generic_signature.as_deref()
    }

    /// Overload-disambiguating name: name followed by the raw signature.
    #[inline]
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn class_ref(&self) -> Option<&ClassRef> {
        self.class.as_ref()
    }

    pub fn class_id(&self) -> Option<ClassId> {
        self.class.as_ref().map(|c| c.id)
    }

    pub fn class_name(&self) -> &str {
        self.class.as_ref().map_or("[VM]", |c| &c.name)
    }

    pub fn source_file_name(&self) -> &str {
        match &self.class {
            Some(c) => c.source_file.as_deref().unwrap_or(""),
            None => "[VM]",
        }
    }

    pub fn full_name(&self) -> String {
        match &self.class {
            Some(c) => format!("{}.{}", c.name, self.unique_name),
            None => self.unique_name.to_string(),
        }
    }

    pub fn base_name(&self) -> String {
        format!("{}.{}", self.class_name(), self.name)
    }

    pub fn stack_trace_name(&self) -> String {
        match &self.class {
            Some(c) => format!("{}.{}", c.name, self.name),
            None => self.name.to_string(),
        }
    }

    /// `name(Arg,Arg)` with unqualified argument type names.
    pub fn long_name(&self) -> String {
        let args: Vec<String> = self
            .argument_type_names()
            .into_iter()
            .map(|a| match a.rfind('.') {
                Some(i) if i > 0 => a[i + 1..].to_string(),
                _ => a,
            })
            .collect();
        format!("{}({})", self.name, args.join(","))
    }

    pub fn jni_name(&self) -> String {
        jni::mangled_method_name(None, &self.name, Some(&self.signature))
    }

    // =========================================================================
    // Signature-derived (memoized)
    // =========================================================================

    pub fn number_of_arguments(&self) -> usize {
        *self
            .derived
            .n_args
            .get_or_init(|| self.argument_types().len())
    }

    /// Arguments including the receiver.
    pub fn number_of_stack_arguments(&self) -> usize {
        self.number_of_arguments() + usize::from(!self.is_static())
    }

    /// Slots taken by the arguments, including the receiver.
    pub fn arguments_size(&self) -> usize {
        *self.derived.arg_size.get_or_init(|| {
            let n: usize = self.argument_types().iter().map(|t| t.slot_size()).sum();
            n + usize::from(!self.is_static())
        })
    }

    pub fn argument_types(&self) -> &[TypeCode] {
        self.derived
            .arg_types
            .get_or_init(|| types::argument_types(&self.signature).unwrap_or_default())
    }

    pub fn argument_type_names(&self) -> Vec<String> {
        types::argument_type_names(&self.signature).unwrap_or_default()
    }

    /// Return type descriptor.
    pub fn return_type(&self) -> &str {
        types::return_type_signature(&self.signature).unwrap_or("V")
    }

    pub fn return_type_name(&self) -> String {
        types::type_name(self.return_type())
    }

    pub fn return_type_code(&self) -> TypeCode {
        *self
            .derived
            .return_type
            .get_or_init(|| types::descriptor_type_code(self.return_type()))
    }

    pub fn return_size(&self) -> usize {
        *self
            .derived
            .ret_size
            .get_or_init(|| self.return_type_code().slot_size())
    }

    pub fn is_reference_return_type(&self) -> bool {
        self.return_type_code().is_reference()
    }

    /// Caller slots needed to set up the call and receive its result.
    pub fn number_of_caller_stack_slots(&self) -> usize {
        types::number_of_stack_slots(&self.signature, self.is_static()).unwrap_or(0)
    }

    pub fn return_choice_kind(&self) -> ChoiceKind {
        ChoiceKind::for_return_type(self.return_type_code())
    }

    // =========================================================================
    // Modifiers and attributes
    // =========================================================================

    #[inline]
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    #[inline]
    pub fn attributes(&self) -> MethodAttributes {
        self.attributes
    }

    #[inline]
    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    #[inline]
    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.is_static()
    }

    pub fn is_synchronized(&self) -> bool {
        self.modifiers.is_synchronized()
    }

    pub fn is_public(&self) -> bool {
        self.modifiers.contains(Modifiers::PUBLIC)
    }

    pub fn is_private(&self) -> bool {
        self.modifiers.contains(Modifiers::PRIVATE)
    }

    pub fn is_protected(&self) -> bool {
        self.modifiers.contains(Modifiers::PROTECTED)
    }

    pub fn is_package_private(&self) -> bool {
        !(self.is_public() || self.is_private() || self.is_protected())
    }

    pub fn is_final(&self) -> bool {
        self.modifiers.contains(Modifiers::FINAL)
    }

    pub fn is_native(&self) -> bool {
        self.modifiers.contains(Modifiers::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.modifiers.contains(Modifiers::ABSTRACT)
    }

    /// Native methods have no peer here unless the interpreter knows how to
    /// produce their value.
    pub fn is_unresolved_native(&self) -> bool {
        self.is_native() && !self.ext.contains::<crate::choice::NondetSource>()
    }

    pub fn is_synthetic(&self) -> bool {
        self.modifiers.contains(Modifiers::SYNTHETIC)
    }

    pub fn is_varargs(&self) -> bool {
        self.modifiers.contains(Modifiers::VARARGS)
    }

    pub fn is_atomic(&self) -> bool {
        self.attributes.contains(MethodAttributes::ATOMIC)
    }

    pub fn is_hidden(&self) -> bool {
        self.attributes.contains(MethodAttributes::HIDDEN)
    }

    pub fn is_firewall(&self) -> bool {
        self.attributes.contains(MethodAttributes::FIREWALL)
    }

    pub fn is_clinit(&self) -> bool {
        self.attributes.contains(MethodAttributes::IS_CLINIT)
    }

    pub fn is_clinit_of(&self, class: ClassId) -> bool {
        self.is_clinit() && self.class_id() == Some(class)
    }

    pub fn is_init(&self) -> bool {
        self.attributes.contains(MethodAttributes::IS_INIT)
    }

    pub fn is_ctor(&self) -> bool {
        &*self.name == "<init>"
    }

    pub fn is_internal_method(&self) -> bool {
        &*self.name == "<clinit>" || &*self.unique_name == "finalize()V"
    }

    /// Is this the `run()V` that `thread` was started with? A started
    /// thread's bottom frame is the `[run]` stub, with `run()` right above.
    pub fn is_thread_entry(&self, thread: &ThreadInfo) -> bool {
        if &*self.unique_name != "run()V" {
            return false;
        }
        match thread.frames() {
            [stub, entry, ..] => {
                stub.method().is_direct_call_stub()
                    && stub.method().name() == "[run]"
                    && entry.method().global_id() == self.global_id
            }
            _ => false,
        }
    }

    /// Synthetic `<...>` methods never take part in monitor bookkeeping.
    pub fn is_sync_relevant(&self) -> bool {
        !self.name.starts_with('<')
    }

    pub fn is_vm_internal(&self) -> bool {
        self.class.is_none()
    }

    pub fn is_direct_call_stub(&self) -> bool {
        self.global_id == MethodId::DIRECT_CALL
    }

    pub fn is_reflection_call_stub(&self) -> bool {
        self.global_id == MethodId::REFLECTION_CALL
    }

    pub fn ext(&self) -> &Extensions {
        &self.ext
    }

    // =========================================================================
    // Code
    // =========================================================================

    pub fn code(&self) -> &[Instruction] {
        self.code.as_deref().unwrap_or(&[])
    }

    pub fn has_code(&self) -> bool {
        self.code.is_some()
    }

    pub fn number_of_instructions(&self) -> usize {
        self.code().len()
    }

    #[inline]
    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.code().get(index)
    }

    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.code().last()
    }

    /// Instruction starting at byte offset `position`.
    pub fn instruction_at(&self, position: u32) -> Result<&Instruction, VmError> {
        self.code()
            .iter()
            .find(|insn| insn.position() == position)
            .ok_or_else(|| VmError::InstructionNotFound {
                method: self.full_name(),
                position,
            })
    }

    /// Only instruction is a return.
    pub fn has_empty_body(&self) -> bool {
        matches!(self.code(), [only] if only.op.is_return())
    }

    pub fn exception_handlers(&self) -> &[ExceptionHandler] {
        self.exception_handlers.as_deref().unwrap_or(&[])
    }

    /// First declared handler covering `position` whose catch type satisfies
    /// `catches`. Range width plays no part.
    pub fn find_handler(
        &self,
        position: u32,
        mut catches: impl FnMut(&str) -> bool,
    ) -> Option<&ExceptionHandler> {
        self.exception_handlers().iter().find(|h| {
            h.covers(position) && h.catch_type.as_deref().map_or(true, &mut catches)
        })
    }

    pub fn thrown_exceptions(&self) -> &[Arc<str>] {
        self.thrown_exceptions.as_deref().unwrap_or(&[])
    }

    // =========================================================================
    // Line numbers
    // =========================================================================

    pub fn line_numbers(&self) -> Option<&[u32]> {
        self.line_numbers.as_deref()
    }

    /// Source line of `insn`, or its position when there is no line table.
    pub fn line_number(&self, insn: &Instruction) -> u32 {
        self.line_numbers
            .as_ref()
            .and_then(|lines| lines.get(insn.index() as usize).copied())
            .unwrap_or_else(|| insn.position())
    }

    fn first_and_last_line(&self) -> Option<(u32, u32)> {
        let code = self.code();
        let first = code.first()?;
        let last = code.last()?;
        Some((self.line_number(first), self.line_number(last)))
    }

    pub fn includes_line(&self, line: u32) -> bool {
        self.first_and_last_line()
            .map_or(false, |(first, last)| first <= line && line <= last)
    }

    pub fn contains_line_number(&self, n: u32) -> bool {
        match self.line_numbers.as_deref() {
            Some([first, .., last]) => *first <= n && n <= *last,
            Some([only]) => *only == n,
            _ => false,
        }
    }

    pub fn intersects_line_numbers(&self, first: u32, last: u32) -> bool {
        match self.line_numbers.as_deref() {
            Some(lines @ [_, ..]) => {
                let lo = lines[0];
                let hi = lines[lines.len() - 1];
                !(last < lo || first > hi)
            }
            _ => false,
        }
    }

    pub fn instructions_for_line(&self, line: u32) -> Vec<&Instruction> {
        self.instructions_for_line_interval(line, line)
    }

    /// Contiguous run from the first instruction on a line in `[l1, l2]` up to
    /// the last one before a line beyond `l2`.
    pub fn instructions_for_line_interval(&self, l1: u32, l2: u32) -> Vec<&Instruction> {
        let code = self.code();
        let mut start = None;
        let mut end = None;
        for (i, insn) in code.iter().enumerate() {
            let l = self.line_number(insn);
            if l >= l1 && l <= l2 {
                if start.is_none() {
                    start = Some(i);
                }
                end = Some(i);
            } else if l > l2 {
                break;
            }
        }
        match (start, end) {
            (Some(s), Some(e)) => code[s..=e].iter().collect(),
            _ => Vec::new(),
        }
    }

    // =========================================================================
    // Local variables and annotations
    // =========================================================================

    pub fn local_vars(&self) -> Option<&[LocalVarInfo]> {
        self.local_vars.as_deref()
    }

    pub fn local_var(&self, name: &str, pc: u32) -> Option<&LocalVarInfo> {
        self.local_vars()?
            .iter()
            .find(|lv| &*lv.name == name && lv.in_scope(pc))
    }

    pub fn local_var_at(&self, slot: u16, pc: u32) -> Option<&LocalVarInfo> {
        self.local_vars()?
            .iter()
            .find(|lv| lv.slot == slot && lv.in_scope(pc))
    }

    pub fn local_variable_names(&self) -> Vec<&str> {
        self.local_vars()
            .map(|vars| vars.iter().map(|lv| &*lv.name).collect())
            .unwrap_or_default()
    }

    /// Variables in scope at pc 0, ordered by slot. `None` when there is no
    /// local variable table.
    pub fn argument_local_vars(&self) -> Result<Option<Vec<&LocalVarInfo>>, VmError> {
        let Some(vars) = self.local_vars() else {
            return Ok(None);
        };
        let n_args = self.number_of_stack_arguments();
        if n_args == 0 {
            return Ok(Some(Vec::new()));
        }
        let mut args: Vec<&LocalVarInfo> = vars.iter().filter(|lv| lv.start_pc == 0).collect();
        if args.len() > n_args {
            return Err(VmError::InconsistentLocalVarTable(self.full_name()));
        }
        args.sort_by_key(|lv| lv.slot);
        Ok(Some(args))
    }

    pub fn has_parameter_annotations(&self) -> bool {
        self.parameter_annotations.is_some()
    }

    /// One list per declared argument, empty when nothing was recorded.
    pub fn parameter_annotations(&self) -> Cow<'_, [Vec<AnnotationInfo>]> {
        match &self.parameter_annotations {
            Some(table) => Cow::Borrowed(table.as_slice()),
            None => Cow::Owned(vec![Vec::new(); self.number_of_arguments()]),
        }
    }

    pub fn parameter_annotations_at(&self, index: usize) -> Option<&[AnnotationInfo]> {
        self.parameter_annotations
            .as_ref()?
            .get(index)
            .map(Vec::as_slice)
    }

    // =========================================================================
    // Call stubs
    // =========================================================================

    pub fn create_direct_call_stub(
        &self,
        originator: &str,
        factory: &dyn InstructionFactory,
    ) -> Result<MethodInfo, VmError> {
        self.create_call_stub(originator, MethodId::DIRECT_CALL, factory)
    }

    pub fn create_reflection_call_stub(
        &self,
        factory: &dyn InstructionFactory,
    ) -> Result<MethodInfo, VmError> {
        self.create_call_stub("[reflection]", MethodId::REFLECTION_CALL, factory)
    }

    fn create_call_stub(
        &self,
        originator: &str,
        id: MethodId,
        factory: &dyn InstructionFactory,
    ) -> Result<MethodInfo, VmError> {
        let class = self
            .class
            .as_ref()
            .ok_or_else(|| VmError::StubWithoutClass(self.unique_name.to_string()))?;

        let modifiers = if self.is_static() {
            Modifiers::STATIC
        } else {
            Modifiers::empty()
        };
        let mut mi = MethodInfo::new(
            None,
            originator,
            "()V",
            if self.is_static() { 0 } else { 1 },
            self.number_of_caller_stack_slots() as u16,
            modifiers,
        )?;
        mi.global_id = id;
        mi.local_vars = Some(Vec::new());
        mi.set_firewall(true);

        let mut cb = CodeBuilder::new(factory.new_instance());
        if self.is_static() {
            if self.is_clinit() {
                cb.invoke_clinit(&class.name);
            } else {
                cb.invoke(Opcode::InvokeStatic, &class.name, &self.name, &self.signature);
            }
        } else if self.is_ctor() || self.is_private() {
            cb.invoke(Opcode::InvokeSpecial, &class.name, &self.name, &self.signature);
        } else {
            cb.invoke(Opcode::InvokeVirtual, &class.name, &self.name, &self.signature);
        }
        cb.op(Opcode::DirectCallReturn);
        cb.install(&mut mi)?;
        Ok(mi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::DefaultInstructionFactory;
    use pretty_assertions::assert_eq;

    fn class_ref(name: &str) -> ClassRef {
        ClassRef {
            id: ClassId(7),
            name: name.into(),
            source_file: Some("Main.java".into()),
            is_interface: false,
        }
    }

    fn method(name: &str, sig: &str, modifiers: Modifiers) -> MethodInfo {
        MethodInfo::new(Some(class_ref("app/Main")), name, sig, 4, 4, modifiers).unwrap()
    }

    fn with_code(mut mi: MethodInfo, ops: &[Opcode]) -> MethodInfo {
        let mut cb = CodeBuilder::new(Box::new(DefaultInstructionFactory));
        for op in ops {
            cb.op(*op);
        }
        cb.install(&mut mi).unwrap();
        mi
    }

    #[test]
    fn test_names() {
        let mi = method("put", "(ILjava/lang/String;[J)Z", Modifiers::PUBLIC);
        assert_eq!(mi.unique_name(), "put(ILjava/lang/String;[J)Z");
        assert_eq!(mi.full_name(), "app/Main.put(ILjava/lang/String;[J)Z");
        assert_eq!(mi.base_name(), "app/Main.put");
        assert_eq!(mi.long_name(), "put(int,String,long[])");
        assert_eq!(mi.jni_name(), "put__ILjava_lang_String_2_3J");
        assert_eq!(mi.source_file_name(), "Main.java");
    }

    #[test]
    fn test_signature_derived_values() {
        let mi = method("f", "(IJD)J", Modifiers::empty());
        assert_eq!(mi.number_of_arguments(), 3);
        assert_eq!(mi.number_of_stack_arguments(), 4);
        assert_eq!(mi.arguments_size(), 6);
        assert_eq!(mi.return_size(), 2);
        assert_eq!(mi.return_type_code(), TypeCode::Long);
        assert_eq!(mi.number_of_caller_stack_slots(), 6);
        assert!(!mi.is_reference_return_type());

        let st = method("g", "()Ljava/lang/Object;", Modifiers::STATIC);
        assert_eq!(st.arguments_size(), 0);
        assert!(st.is_reference_return_type());
        assert_eq!(st.return_type_name(), "java.lang.Object");
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let err = MethodInfo::new(None, "f", "(I", 0, 0, Modifiers::empty()).unwrap_err();
        assert!(matches!(err, VmError::Signature(_)));
    }

    #[test]
    fn test_deduced_attributes() {
        let clinit = method("<clinit>", "()V", Modifiers::STATIC);
        assert!(clinit.is_synchronized());
        assert!(clinit.is_clinit());
        assert!(clinit.is_firewall());
        assert!(clinit.is_internal_method());
        assert!(!clinit.is_sync_relevant());

        let init = method("<init>", "()V", Modifiers::empty());
        assert!(init.is_init());
        assert!(init.is_ctor());

        let mut iface = class_ref("app/Shape");
        iface.is_interface = true;
        let m = MethodInfo::new(Some(iface), "area", "()D", 1, 2, Modifiers::ABSTRACT).unwrap();
        assert!(m.is_public());

        let vm = MethodInfo::new(None, "<clinit>", "()V", 0, 0, Modifiers::STATIC).unwrap();
        assert!(!vm.is_clinit());
        assert_eq!(vm.class_name(), "[VM]");
        assert_eq!(vm.source_file_name(), "[VM]");
    }

    #[test]
    fn test_line_table_fills_gaps() {
        let mut mi = with_code(
            method("f", "()V", Modifiers::STATIC),
            &[Opcode::Nop, Opcode::Nop, Opcode::Nop, Opcode::Return],
        );
        mi.start_line_number_table(2).unwrap();
        mi.set_line_number(0, 10, 0).unwrap();
        mi.set_line_number(1, 12, 2).unwrap();
        mi.finish_line_number_table();
        assert_eq!(mi.line_numbers(), Some(&[10, 10, 12, 12][..]));
        assert!(mi.includes_line(11));
        assert!(!mi.includes_line(13));
        assert!(mi.contains_line_number(12));
        assert!(!mi.contains_line_number(9));
        assert!(mi.intersects_line_numbers(1, 10));
        assert!(!mi.intersects_line_numbers(13, 20));
    }

    #[test]
    fn test_line_table_requires_code() {
        let mut mi = method("f", "()V", Modifiers::NATIVE);
        assert!(matches!(mi.start_line_number_table(1), Err(VmError::NoCode(_))));
    }

    #[test]
    fn test_instruction_lookup_by_position() {
        let mi = with_code(
            method("f", "()V", Modifiers::STATIC),
            &[Opcode::Nop, Opcode::Return],
        );
        assert_eq!(mi.instruction_at(1).unwrap().op, Opcode::Return);
        assert!(matches!(
            mi.instruction_at(5),
            Err(VmError::InstructionNotFound { position: 5, .. })
        ));
        assert_eq!(mi.last_instruction().map(|i| i.op), Some(Opcode::Return));
        assert!(!mi.has_empty_body());
    }

    #[test]
    fn test_empty_body() {
        let mi = with_code(method("f", "()V", Modifiers::STATIC), &[Opcode::Return]);
        assert!(mi.has_empty_body());
    }

    #[test]
    fn test_table_builder_errors() {
        let mut mi = method("f", "()V", Modifiers::STATIC);
        assert!(matches!(
            mi.set_exception_handler(0, 0, 1, 1, None),
            Err(VmError::TableNotStarted(_))
        ));
        mi.start_exception_handler_table(2);
        mi.set_exception_handler(0, 0, 1, 1, None).unwrap();
        assert!(matches!(
            mi.set_exception_handler(2, 0, 1, 1, None),
            Err(VmError::TableIndexOutOfRange { index: 2, .. })
        ));
        assert!(matches!(
            mi.finish_exception_handler_table(),
            Err(VmError::MissingTableEntry { index: 1, .. })
        ));
    }

    #[test]
    fn test_local_vars() {
        let mut mi = method("f", "(IJ)V", Modifiers::empty());
        mi.start_local_var_table(4);
        mi.set_local_var(0, "b", "J", None, 0, 10, 2).unwrap();
        mi.set_local_var(1, "this", "Lapp/Main;", None, 0, 10, 0).unwrap();
        mi.set_local_var(2, "a", "I", None, 0, 10, 1).unwrap();
        mi.set_local_var(3, "tmp", "I", None, 4, 3, 4).unwrap();
        mi.finish_local_var_table().unwrap();

        let args: Vec<&str> = mi
            .argument_local_vars()
            .unwrap()
            .unwrap()
            .iter()
            .map(|lv| &*lv.name)
            .collect();
        assert_eq!(args, vec!["this", "a", "b"]);
        assert_eq!(mi.local_var("tmp", 5).map(|lv| lv.slot), Some(4));
        assert!(mi.local_var("tmp", 7).is_none());
        assert_eq!(mi.local_var_at(1, 0).map(|lv| &*lv.name), Some("a"));
        assert_eq!(mi.local_variable_names(), vec!["b", "this", "a", "tmp"]);
    }

    #[test]
    fn test_inconsistent_local_var_table() {
        let mut mi = method("f", "(I)V", Modifiers::STATIC);
        mi.start_local_var_table(2);
        mi.set_local_var(0, "x", "I", None, 0, 4, 0).unwrap();
        mi.set_local_var(1, "y", "I", None, 0, 4, 1).unwrap();
        mi.finish_local_var_table().unwrap();
        assert!(matches!(
            mi.argument_local_vars(),
            Err(VmError::InconsistentLocalVarTable(_))
        ));
    }

    #[test]
    fn test_parameter_annotations_default_empty() {
        let mut mi = method("f", "(II)V", Modifiers::STATIC);
        assert_eq!(mi.parameter_annotations().len(), 2);
        assert!(mi.parameter_annotations().iter().all(Vec::is_empty));
        assert!(mi.parameter_annotations_at(0).is_none());

        mi.start_parameter_annotations(2);
        mi.set_parameter_annotations(0, vec![AnnotationInfo::new("app/NonNull")])
            .unwrap();
        mi.set_parameter_annotations(1, Vec::new()).unwrap();
        mi.finish_parameter_annotations().unwrap();
        assert!(mi.has_parameter_annotations());
        assert_eq!(
            mi.parameter_annotations_at(0).map(|a| &*a[0].type_name),
            Some("app/NonNull")
        );
    }

    #[test]
    fn test_thrown_exceptions_use_dotted_names() {
        let mut mi = method("f", "()V", Modifiers::STATIC);
        mi.start_thrown_exceptions(1);
        mi.set_thrown_exception(0, "Ljava/io/IOException;").unwrap();
        mi.finish_thrown_exceptions().unwrap();
        assert_eq!(&*mi.thrown_exceptions()[0], "java.io.IOException");
    }

    #[test]
    fn test_call_stub_dispatch_choice() {
        let factory = DefaultInstructionFactory;
        let cases = [
            ("<clinit>", "()V", Modifiers::STATIC, Opcode::InvokeClinit),
            ("run", "(I)V", Modifiers::STATIC, Opcode::InvokeStatic),
            ("<init>", "()V", Modifiers::empty(), Opcode::InvokeSpecial),
            ("hide", "()V", Modifiers::PRIVATE, Opcode::InvokeSpecial),
            ("go", "(J)J", Modifiers::PUBLIC, Opcode::InvokeVirtual),
        ];
        for (name, sig, mods, expected) in cases {
            let target = method(name, sig, mods);
            let stub = target.create_direct_call_stub("[main]", &factory).unwrap();
            assert!(stub.is_direct_call_stub());
            assert!(stub.is_firewall());
            assert!(stub.is_vm_internal());
            assert_eq!(stub.signature(), "()V");
            assert_eq!(stub.unique_name(), "[main]()V");
            assert_eq!(stub.max_locals(), if target.is_static() { 0 } else { 1 });
            assert_eq!(stub.max_stack() as usize, target.number_of_caller_stack_slots());
            let ops: Vec<Opcode> = stub.code().iter().map(|i| i.op).collect();
            assert_eq!(ops, vec![expected, Opcode::DirectCallReturn]);
            assert!(stub.code().iter().all(|i| i.method_id() == MethodId::DIRECT_CALL));
        }

        let reflective = method("go", "()V", Modifiers::PUBLIC)
            .create_reflection_call_stub(&factory)
            .unwrap();
        assert!(reflective.is_reflection_call_stub());
        assert_eq!(reflective.name(), "[reflection]");
    }

    #[test]
    fn test_stub_needs_a_class() {
        let vm = MethodInfo::new(None, "f", "()V", 0, 0, Modifiers::STATIC).unwrap();
        assert!(matches!(
            vm.create_direct_call_stub("x", &DefaultInstructionFactory),
            Err(VmError::StubWithoutClass(_))
        ));
    }
}
