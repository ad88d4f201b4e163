//! Class, method and field definitions, as delivered by the disassembler.

use crate::descriptors::MethodDescr;
use crate::graph::InstrGraph;
use crate::registers::Reg;
use crate::types::Type;
use serde::{Deserialize, Serialize};

pub const SIGNATURE_ANNOTATION: &str = "dalvik/annotation/Signature";

/// A (build or system visible) annotation, reduced to its type and the
/// string values of its elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Annotation {
    /// Builds a `dalvik/annotation/Signature` annotation.
    #[must_use]
    pub fn signature(parts: &[&str]) -> Self {
        Self {
            type_: SIGNATURE_ANNOTATION.to_string(),
            values: parts.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

fn find_signature(annotations: &[Annotation]) -> Option<String> {
    annotations
        .iter()
        .find(|a| a.type_ == SIGNATURE_ANNOTATION)
        .map(|a| a.values.concat())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: Type,
    #[serde(default)]
    pub is_static: bool,
}

/// Slot of a parameter register, as seen from the method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSlot {
    /// Implicit receiver of an instance method.
    This,
    /// Declared parameter, by position in the prototype.
    Declared(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDef {
    pub descriptor: MethodDescr,
    #[serde(default)]
    pub is_static: bool,
    /// Total number of registers used by the method, parameters included.
    #[serde(default)]
    pub registers_size: u16,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub code: Option<InstrGraph>,
}

impl MethodDef {
    #[must_use]
    pub fn new(descriptor: MethodDescr) -> Self {
        Self {
            descriptor,
            is_static: false,
            registers_size: 0,
            annotations: Vec::new(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, registers_size: u16, code: InstrGraph) -> Self {
        self.registers_size = registers_size;
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    #[must_use]
    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    #[inline]
    pub fn code(&self) -> Option<&InstrGraph> {
        self.code.as_ref()
    }

    /// Number of parameter registers (receiver included).
    #[must_use]
    pub fn ins_size(&self) -> u16 {
        self.descriptor.arguments_width(self.is_static)
    }

    /// Number of local (non parameter) registers.
    #[must_use]
    pub fn locals_size(&self) -> u16 {
        self.registers_size.saturating_sub(self.ins_size())
    }

    /// Maps a register to the parameter it holds at method entry, if any.
    ///
    /// Parameters occupy the highest-numbered registers; wide parameters
    /// (`long`, `double`) occupy two of them.
    #[must_use]
    pub fn parameter_slot(&self, reg: Reg) -> Option<ParamSlot> {
        if self.registers_size < self.ins_size() {
            return None;
        }
        let mut current = self.locals_size();
        if !self.is_static {
            if reg.value() == current {
                return Some(ParamSlot::This);
            }
            current += 1;
        }
        for (i, t) in self.descriptor.parameters_types().iter().enumerate() {
            let width = t.width();
            if reg.value() >= current && reg.value() < current + width {
                return Some(ParamSlot::Declared(i));
            }
            current += width;
        }
        None
    }

    /// Generic signature stored in the `Signature` annotation.
    #[must_use]
    pub fn generic_signature(&self) -> Option<String> {
        find_signature(&self.annotations)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Member classes, as declared by the `InnerClass`/`MemberClasses`
    /// annotations.
    #[serde(default)]
    pub inner_classes: Vec<String>,
    /// System (framework, library) class, outside of the application.
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl ClassDef {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            superclass: None,
            interfaces: Vec::new(),
            inner_classes: Vec::new(),
            system: false,
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
        }
    }

    #[must_use]
    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    #[must_use]
    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    #[must_use]
    pub fn with_inner(mut self, inner: &str) -> Self {
        self.inner_classes.push(inner.to_string());
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, type_: Type) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            type_,
            is_static: false,
        });
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    /// Adds a method without code, declared by its prototype only
    /// (`name(params)ret`).
    ///
    /// # Panics
    ///
    /// Panics if the prototype is not a valid one, this builder is meant for
    /// hardcoded values.
    #[must_use]
    pub fn declaring(self, proto: &str) -> Self {
        let descr = format!("{}->{proto}", Type::class(&self.name))
            .parse()
            .expect("valid method prototype");
        self.with_method(MethodDef::new(descr))
    }

    #[must_use]
    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    pub fn iter_methods(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.iter()
    }

    /// Finds a method by name and parameters types.
    #[must_use]
    pub fn get_method(&self, name: &str, parameters_types: &[Type]) -> Option<&MethodDef> {
        self.methods.iter().find(|m| {
            m.descriptor.name() == name && m.descriptor.parameters_types() == parameters_types
        })
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDef> {
        self.methods.iter().filter(move |m| m.name() == name)
    }

    #[must_use]
    pub fn generic_signature(&self) -> Option<String> {
        find_signature(&self.annotations)
    }
}
