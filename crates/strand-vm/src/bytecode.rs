//! Loaded program: classes, fields and the method table.
//!
//! Class-file parsing lives outside this crate. Embedders (and the tests)
//! declare classes with `ClassDecl` and add methods built through the
//! `MethodInfo` builder sequence or `Program::define_method`.

use std::sync::Arc;

use indexmap::IndexMap;
use strand_common_core::{types, Modifiers, SignatureError, TypeCode};
use thiserror::Error;

use crate::code::{CodeBuilder, DefaultInstructionFactory, InstructionFactory};
use crate::instruction::{Instruction, MethodRef, Opcode, Operand};
use crate::method::{ClassRef, MethodId, MethodInfo};
use crate::registry::MethodRegistry;
use crate::vm::VmError;

/// Names of the classes every program starts with.
pub mod builtin {
    pub const OBJECT: &str = "java/lang/Object";
    pub const CLASS: &str = "java/lang/Class";
    pub const THREAD: &str = "java/lang/Thread";
    pub const THROWABLE: &str = "java/lang/Throwable";
    pub const EXCEPTION: &str = "java/lang/Exception";
    pub const RUNTIME_EXCEPTION: &str = "java/lang/RuntimeException";
    pub const ERROR: &str = "java/lang/Error";
    pub const ASSERTION_ERROR: &str = "java/lang/AssertionError";
    pub const NULL_POINTER: &str = "java/lang/NullPointerException";
    pub const ARITHMETIC: &str = "java/lang/ArithmeticException";
    pub const ARRAY_INDEX: &str = "java/lang/ArrayIndexOutOfBoundsException";
    pub const NEGATIVE_ARRAY_SIZE: &str = "java/lang/NegativeArraySizeException";
    pub const ILLEGAL_MONITOR_STATE: &str = "java/lang/IllegalMonitorStateException";
    pub const ILLEGAL_THREAD_STATE: &str = "java/lang/IllegalThreadStateException";
    pub const UNSATISFIED_LINK: &str = "java/lang/UnsatisfiedLinkError";
    pub const ABSTRACT_METHOD: &str = "java/lang/AbstractMethodError";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassId(pub u32);

impl ClassId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("class {0} is already declared")]
    DuplicateClass(String),

    #[error("superclass {super_name} of {class} is not declared")]
    UnknownSuperClass { class: String, super_name: String },

    #[error("unknown class id {0:?}")]
    UnknownClass(ClassId),

    #[error("method {method} is already defined in {class}")]
    DuplicateMethod { class: String, method: String },

    #[error("method {0} has no declaring class")]
    MethodWithoutClass(String),

    #[error("field {class}.{field}: {source}")]
    InvalidField {
        class: String,
        field: String,
        #[source]
        source: SignatureError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
    pub type_code: TypeCode,
    pub modifiers: Modifiers,
    /// Index into the instance field vector or the class statics.
    pub slot: usize,
}

impl FieldInfo {
    pub fn is_volatile(&self) -> bool {
        self.modifiers.is_volatile()
    }
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub descriptor: String,
    pub modifiers: Modifiers,
}

/// Input for `Program::declare_class`.
#[derive(Debug, Clone, Default)]
pub struct ClassDecl {
    pub name: String,
    /// Defaults to `java/lang/Object`.
    pub super_name: Option<String>,
    pub modifiers: Modifiers,
    pub source_file: Option<String>,
    pub fields: Vec<FieldDecl>,
}

impl ClassDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            modifiers: Modifiers::PUBLIC,
            ..Default::default()
        }
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn source_file(mut self, file: &str) -> Self {
        self.source_file = Some(file.to_string());
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str, modifiers: Modifiers) -> Self {
        self.fields.push(FieldDecl {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            modifiers,
        });
        self
    }
}

#[derive(Debug)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: Arc<str>,
    pub super_class: Option<ClassId>,
    pub modifiers: Modifiers,
    pub source_file: Option<Arc<str>>,
    /// Inherited fields first, so a subclass keeps its superclass slots.
    instance_fields: Vec<FieldInfo>,
    static_fields: Vec<FieldInfo>,
    methods: IndexMap<Arc<str>, Arc<MethodInfo>>,
}

impl ClassInfo {
    pub fn is_interface(&self) -> bool {
        self.modifiers.contains(Modifiers::INTERFACE)
    }

    pub fn class_ref(&self) -> ClassRef {
        ClassRef {
            id: self.id,
            name: Arc::clone(&self.name),
            source_file: self.source_file.clone(),
            is_interface: self.is_interface(),
        }
    }

    pub fn instance_fields(&self) -> &[FieldInfo] {
        &self.instance_fields
    }

    pub fn static_fields(&self) -> &[FieldInfo] {
        &self.static_fields
    }

    /// Declared method by unique name; no superclass lookup.
    pub fn method(&self, unique_name: &str) -> Option<&Arc<MethodInfo>> {
        self.methods.get(unique_name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodInfo>> {
        self.methods.values()
    }

    pub fn clinit(&self) -> Option<&Arc<MethodInfo>> {
        self.methods.get("<clinit>()V")
    }
}

pub struct Program {
    classes: Vec<ClassInfo>,
    by_name: IndexMap<Arc<str>, ClassId>,
    methods: MethodRegistry,
    factory: Box<dyn InstructionFactory>,
}

impl Program {
    pub fn new() -> Self {
        Self::with_factory(Box::new(DefaultInstructionFactory))
    }

    /// Program whose code builders draw instructions from `factory`.
    pub fn with_factory(factory: Box<dyn InstructionFactory>) -> Self {
        let mut program = Self {
            classes: Vec::new(),
            by_name: IndexMap::new(),
            methods: MethodRegistry::new(),
            factory,
        };
        program.bootstrap();
        program
    }

    fn push_class(&mut self, name: &str, super_class: Option<ClassId>) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        let name: Arc<str> = name.into();
        let instance_fields = super_class
            .and_then(|s| self.classes.get(s.index()))
            .map(|s| s.instance_fields.clone())
            .unwrap_or_default();
        self.classes.push(ClassInfo {
            id,
            name: Arc::clone(&name),
            super_class,
            modifiers: Modifiers::PUBLIC,
            source_file: None,
            instance_fields,
            static_fields: Vec::new(),
            methods: IndexMap::new(),
        });
        self.by_name.insert(name, id);
        id
    }

    /// Install a method whose body is a bare `return`.
    fn push_empty_method(&mut self, class: ClassId, name: &str, modifiers: Modifiers) {
        let class_ref = self.classes[class.index()].class_ref();
        let mut mi = MethodInfo::new_unchecked(Some(class_ref), name, "()V", 1, 0, modifiers);
        mi.set_code(vec![Instruction::new(Opcode::Return, Operand::None)]);
        let mi = self.methods.register(mi);
        self.classes[class.index()]
            .methods
            .insert(Arc::from(mi.unique_name()), mi);
    }

    fn bootstrap(&mut self) {
        use builtin::*;

        let object = self.push_class(OBJECT, None);
        self.push_empty_method(object, "<init>", Modifiers::PUBLIC);
        self.push_class(CLASS, Some(object));

        let thread = self.push_class(THREAD, Some(object));
        self.push_empty_method(thread, "<init>", Modifiers::PUBLIC);
        self.push_empty_method(thread, "run", Modifiers::PUBLIC);

        let throwable = self.push_class(THROWABLE, Some(object));
        self.push_empty_method(throwable, "<init>", Modifiers::PUBLIC);
        let exception = self.push_class(EXCEPTION, Some(throwable));
        let error = self.push_class(ERROR, Some(throwable));
        let runtime = self.push_class(RUNTIME_EXCEPTION, Some(exception));

        for name in [
            NULL_POINTER,
            ARITHMETIC,
            ARRAY_INDEX,
            NEGATIVE_ARRAY_SIZE,
            ILLEGAL_MONITOR_STATE,
            ILLEGAL_THREAD_STATE,
        ] {
            self.push_class(name, Some(runtime));
        }
        for name in [ASSERTION_ERROR, UNSATISFIED_LINK, ABSTRACT_METHOD] {
            self.push_class(name, Some(error));
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    pub fn declare_class(&mut self, decl: ClassDecl) -> Result<ClassId, LoadError> {
        if self.by_name.contains_key(decl.name.as_str()) {
            return Err(LoadError::DuplicateClass(decl.name));
        }
        let super_name = decl.super_name.as_deref().unwrap_or(builtin::OBJECT);
        let super_class =
            self.class_id(super_name)
                .ok_or_else(|| LoadError::UnknownSuperClass {
                    class: decl.name.clone(),
                    super_name: super_name.to_string(),
                })?;

        let mut new_instance = Vec::new();
        let mut statics = Vec::new();
        for f in &decl.fields {
            let type_code = types::check_field_descriptor(&f.descriptor).map_err(|source| {
                LoadError::InvalidField {
                    class: decl.name.clone(),
                    field: f.name.clone(),
                    source,
                }
            })?;
            let info = FieldInfo {
                name: f.name.as_str().into(),
                descriptor: f.descriptor.as_str().into(),
                type_code,
                modifiers: f.modifiers,
                slot: 0,
            };
            if f.modifiers.is_static() {
                statics.push(info);
            } else {
                new_instance.push(info);
            }
        }

        let id = self.push_class(&decl.name, Some(super_class));
        let class = &mut self.classes[id.index()];
        class.modifiers = decl.modifiers;
        class.source_file = decl.source_file.as_deref().map(Into::into);
        for mut f in new_instance {
            f.slot = class.instance_fields.len();
            class.instance_fields.push(f);
        }
        for (slot, mut f) in statics.into_iter().enumerate() {
            f.slot = slot;
            class.static_fields.push(f);
        }
        tracing::debug!(class = %decl.name, "declared class");
        Ok(id)
    }

    /// A fresh method bound to `class`.
    pub fn new_method(
        &self,
        class: ClassId,
        name: &str,
        signature: &str,
        max_locals: u16,
        max_stack: u16,
        modifiers: Modifiers,
    ) -> Result<MethodInfo, VmError> {
        let class_ref = self.class(class).ok_or(LoadError::UnknownClass(class))?.class_ref();
        MethodInfo::new(Some(class_ref), name, signature, max_locals, max_stack, modifiers)
    }

    /// Register `mi` and attach it to its declaring class.
    pub fn add_method(&mut self, mi: MethodInfo) -> Result<Arc<MethodInfo>, LoadError> {
        let class = mi
            .class_id()
            .ok_or_else(|| LoadError::MethodWithoutClass(mi.unique_name().to_string()))?;
        let info = self
            .classes
            .get(class.index())
            .ok_or(LoadError::UnknownClass(class))?;
        if info.methods.contains_key(mi.unique_name()) {
            return Err(LoadError::DuplicateMethod {
                class: info.name.to_string(),
                method: mi.unique_name().to_string(),
            });
        }
        let mi = self.methods.register(mi);
        self.classes[class.index()]
            .methods
            .insert(Arc::from(mi.unique_name()), Arc::clone(&mi));
        Ok(mi)
    }

    /// Build, install and register a method in one go.
    #[allow(clippy::too_many_arguments)]
    pub fn define_method(
        &mut self,
        class: ClassId,
        name: &str,
        signature: &str,
        modifiers: Modifiers,
        max_locals: u16,
        max_stack: u16,
        body: impl FnOnce(&mut CodeBuilder),
    ) -> Result<Arc<MethodInfo>, VmError> {
        let mut mi = self.new_method(class, name, signature, max_locals, max_stack, modifiers)?;
        let mut cb = self.code_builder();
        body(&mut cb);
        cb.install(&mut mi)?;
        Ok(self.add_method(mi)?)
    }

    pub fn code_builder(&self) -> CodeBuilder {
        CodeBuilder::new(self.factory.new_instance())
    }

    pub fn factory(&self) -> &dyn InstructionFactory {
        self.factory.as_ref()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    #[inline]
    pub fn class(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(id.index())
    }

    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn class_by_name(&self, name: &str) -> Option<&ClassInfo> {
        self.class(self.class_id(name)?)
    }

    pub fn resolve_class(&self, name: &str) -> Result<&ClassInfo, VmError> {
        self.class_by_name(name)
            .ok_or_else(|| VmError::NoSuchClass(name.to_string()))
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.iter()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// `id` followed by its superclasses up to the root.
    pub fn class_chain(&self, id: ClassId) -> Vec<ClassId> {
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            chain.push(c);
            cur = self.class(c).and_then(|ci| ci.super_class);
        }
        chain
    }

    pub fn is_subclass_of(&self, sub: ClassId, sup: ClassId) -> bool {
        self.class_chain(sub).contains(&sup)
    }

    pub fn is_subclass_of_name(&self, sub: ClassId, sup: &str) -> bool {
        self.class_id(sup)
            .map_or(false, |sup| self.is_subclass_of(sub, sup))
    }

    /// Virtual lookup: first definition along the superclass chain.
    pub fn find_method(&self, class: ClassId, unique_name: &str) -> Option<&Arc<MethodInfo>> {
        self.class_chain(class)
            .into_iter()
            .find_map(|c| self.class(c)?.method(unique_name))
    }

    pub fn resolve_method(&self, mref: &MethodRef) -> Result<&Arc<MethodInfo>, VmError> {
        let class = self.resolve_class(&mref.class)?;
        self.find_method(class.id, &mref.unique_name())
            .ok_or_else(|| VmError::NoSuchMethod(format!("{}.{}", mref.class, mref.unique_name())))
    }

    pub fn find_instance_field(&self, class: ClassId, name: &str) -> Option<&FieldInfo> {
        self.class(class)?
            .instance_fields
            .iter()
            .rev()
            .find(|f| &*f.name == name)
    }

    /// Static field and the class that declares it.
    pub fn find_static_field(&self, class: ClassId, name: &str) -> Option<(ClassId, &FieldInfo)> {
        self.class_chain(class).into_iter().find_map(|c| {
            self.class(c)?
                .static_fields
                .iter()
                .find(|f| &*f.name == name)
                .map(|f| (c, f))
        })
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    pub fn method(&self, id: MethodId) -> Option<&Arc<MethodInfo>> {
        self.methods.get(id)
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}
