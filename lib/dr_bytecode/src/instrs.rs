//! Dalvik bytecode instructions, as delivered by the disassembler.
//!
//! Instructions are not kept opcode by opcode: the analyses only need to
//! know the opcode family and the register operands with their role, so
//! the disassembler folds every opcode into one of the [`Instr`] variants.

use crate::descriptors::{FieldDescr, MethodDescr};
use crate::registers::{Reg, RegList};
use crate::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Invocation kinds, matching the `invoke-*` opcodes families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
    Polymorphic,
    Custom,
}

impl fmt::Display for InvokeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Virtual => "virtual",
            Self::Super => "super",
            Self::Direct => "direct",
            Self::Static => "static",
            Self::Interface => "interface",
            Self::Polymorphic => "polymorphic",
            Self::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

impl InvokeKind {
    #[must_use]
    pub const fn is_static(self) -> bool {
        matches!(self, Self::Static | Self::Custom)
    }

    /// Invocations whose actual target depends on the receiver runtime type.
    #[must_use]
    pub const fn is_dynamic_dispatch(self) -> bool {
        matches!(self, Self::Virtual | Self::Interface)
    }
}

/// Opcode categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpCategory {
    Invoke,
    NewObject,
    ConstClass,
    ConstString,
    Const,
    FieldRead,
    FieldWrite,
    MoveResult,
    Move,
    ReturnThrow,
    Branch,
    Other,
}

/// A disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Instr {
    /// `invoke-*` and `invoke-*/range`; for non-static kinds, the receiver is
    /// the first argument.
    Invoke {
        kind: InvokeKind,
        args: RegList,
        method: MethodDescr,
    },
    /// `new-instance`.
    NewInstance { dst: Reg, class: String },
    /// `const-class`.
    ConstClass { dst: Reg, class: String },
    /// `const-string` and `const-string/jumbo`.
    ConstString { dst: Reg, value: String },
    /// Narrow and wide integer literals (`const/4`, `const/16`, `const`, ...).
    Const { dst: Reg, value: i64 },
    /// `iget-*` (with an object register) and `sget-*` (without).
    FieldRead {
        dst: Reg,
        #[serde(default)]
        object: Option<Reg>,
        field: FieldDescr,
    },
    /// `iput-*` (with an object register) and `sput-*` (without).
    FieldWrite {
        src: Reg,
        #[serde(default)]
        object: Option<Reg>,
        field: FieldDescr,
    },
    /// `move-result`, `move-result-wide` and `move-result-object`.
    MoveResult { dst: Reg },
    /// `move`, `move-object`, `move-wide` and their `/from16`, `/16` forms.
    Move { dst: Reg, src: Reg },
    /// `check-cast`.
    CheckCast { reg: Reg, class: String },
    /// `return-*`.
    Return {
        #[serde(default)]
        src: Option<Reg>,
    },
    /// `throw`.
    Throw { src: Reg },
    /// `if-*`, `goto*`, `packed-switch` and `sparse-switch`.
    Branch {
        #[serde(default)]
        srcs: Vec<Reg>,
    },
    /// Any other opcode (arithmetic, arrays, monitors, ...).
    Other {
        mnemonic: String,
        #[serde(default)]
        dst: Option<Reg>,
        #[serde(default)]
        srcs: Vec<Reg>,
    },
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Invoke { kind, args, method } => write!(f, "invoke-{kind} {args}, {method}"),
            Self::NewInstance { dst, class } => {
                write!(f, "new-instance {dst}, {}", Type::class(class))
            }
            Self::ConstClass { dst, class } => {
                write!(f, "const-class {dst}, {}", Type::class(class))
            }
            Self::ConstString { dst, value } => write!(f, "const-string {dst}, {value:?}"),
            Self::Const { dst, value } => write!(f, "const {dst}, {value:#x}"),
            Self::FieldRead { dst, object, field } => match object {
                Some(obj) => write!(f, "iget {dst}, {obj}, {field}"),
                None => write!(f, "sget {dst}, {field}"),
            },
            Self::FieldWrite { src, object, field } => match object {
                Some(obj) => write!(f, "iput {src}, {obj}, {field}"),
                None => write!(f, "sput {src}, {field}"),
            },
            Self::MoveResult { dst } => write!(f, "move-result {dst}"),
            Self::Move { dst, src } => write!(f, "move {dst}, {src}"),
            Self::CheckCast { reg, class } => {
                write!(f, "check-cast {reg}, {}", Type::class(class))
            }
            Self::Return { src: Some(src) } => write!(f, "return {src}"),
            Self::Return { src: None } => write!(f, "return-void"),
            Self::Throw { src } => write!(f, "throw {src}"),
            Self::Branch { srcs } => write!(f, "branch {}", RegList::from(srcs.clone())),
            Self::Other { mnemonic, .. } => write!(f, "{mnemonic}"),
        }
    }
}

impl Instr {
    #[must_use]
    pub const fn category(&self) -> OpCategory {
        match self {
            Self::Invoke { .. } => OpCategory::Invoke,
            Self::NewInstance { .. } => OpCategory::NewObject,
            Self::ConstClass { .. } => OpCategory::ConstClass,
            Self::ConstString { .. } => OpCategory::ConstString,
            Self::Const { .. } => OpCategory::Const,
            Self::FieldRead { .. } => OpCategory::FieldRead,
            Self::FieldWrite { .. } => OpCategory::FieldWrite,
            Self::MoveResult { .. } => OpCategory::MoveResult,
            Self::Move { .. } => OpCategory::Move,
            Self::Return { .. } | Self::Throw { .. } => OpCategory::ReturnThrow,
            Self::Branch { .. } => OpCategory::Branch,
            Self::CheckCast { .. } | Self::Other { .. } => OpCategory::Other,
        }
    }

    /// The register written by the instruction, if any.
    ///
    /// `check-cast` is not considered as a write: it refines the type of its
    /// register without changing its value.
    #[must_use]
    pub const fn destination(&self) -> Option<Reg> {
        match self {
            Self::NewInstance { dst, .. }
            | Self::ConstClass { dst, .. }
            | Self::ConstString { dst, .. }
            | Self::Const { dst, .. }
            | Self::FieldRead { dst, .. }
            | Self::MoveResult { dst }
            | Self::Move { dst, .. } => Some(*dst),
            Self::Other { dst, .. } => *dst,
            _ => None,
        }
    }

    #[must_use]
    pub fn writes(&self, reg: Reg) -> bool {
        self.destination() == Some(reg)
    }

    /// The invoked method and the arguments registers, for invocations.
    #[must_use]
    pub fn as_invoke(&self) -> Option<(InvokeKind, &RegList, &MethodDescr)> {
        if let Self::Invoke { kind, args, method } = self {
            Some((*kind, args, method))
        } else {
            None
        }
    }

    /// Receiver register of a non-static invocation.
    #[must_use]
    pub fn receiver(&self) -> Option<Reg> {
        match self {
            Self::Invoke { kind, args, .. } if !kind.is_static() => args.get(0),
            _ => None,
        }
    }

    /// Register holding the `i`-th declared argument of an invocation.
    ///
    /// The receiver is not counted, and wide arguments (`long`, `double`)
    /// occupy two registers.
    #[must_use]
    pub fn argument(&self, i: usize) -> Option<Reg> {
        let Self::Invoke { kind, args, method } = self else {
            return None;
        };
        let params = method.parameters_types();
        if i >= params.len() {
            return None;
        }
        let offset = usize::from(!kind.is_static())
            + params[..i]
                .iter()
                .map(|t| usize::from(t.width()))
                .sum::<usize>();
        args.get(offset)
    }

    /// Register holding the first declared argument of the given class type.
    #[must_use]
    pub fn argument_of_type(&self, class: &str) -> Option<Reg> {
        let (_, _, method) = self.as_invoke()?;
        let i = method
            .parameters_types()
            .iter()
            .position(|t| t.class_name() == Some(class))?;
        self.argument(i)
    }

    /// Class referenced by the instruction operands (new-instance,
    /// const-class, check-cast, invocation definer, accessed field class).
    #[must_use]
    pub fn referenced_class(&self) -> Option<&str> {
        match self {
            Self::Invoke { method, .. } => Some(method.definer()),
            Self::NewInstance { class, .. }
            | Self::ConstClass { class, .. }
            | Self::CheckCast { class, .. } => Some(class),
            Self::FieldRead { field, .. } | Self::FieldWrite { field, .. } => {
                Some(field.class_name())
            }
            _ => None,
        }
    }

    /// Shortcut builder for invocations, mostly useful for tests and adapters.
    pub fn invoke(kind: InvokeKind, args: impl Into<RegList>, method: MethodDescr) -> Self {
        Self::Invoke {
            kind,
            args: args.into(),
            method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destinations() {
        let i = Instr::NewInstance {
            dst: Reg::from(2u8),
            class: "app/Foo".to_string(),
        };
        assert!(i.writes(Reg::from(2u8)));
        assert_eq!(i.category(), OpCategory::NewObject);

        let cast = Instr::CheckCast {
            reg: Reg::from(2u8),
            class: "app/Foo".to_string(),
        };
        assert!(!cast.writes(Reg::from(2u8)));
    }

    #[test]
    fn display_invoke() {
        let i = Instr::invoke(
            InvokeKind::Virtual,
            vec![1u8, 2u8],
            "Landroid/app/Activity;->startActivity(Landroid/content/Intent;)V"
                .parse()
                .unwrap(),
        );
        assert_eq!(
            i.to_string(),
            "invoke-virtual {v1, v2}, Landroid/app/Activity;->startActivity(Landroid/content/Intent;)V"
        );
        assert_eq!(i.referenced_class(), Some("android/app/Activity"));
    }

    #[test]
    fn invoke_arguments() {
        let i = Instr::invoke(
            InvokeKind::Virtual,
            vec![0u8, 1, 2, 3, 4],
            "Landroid/os/Handler;->postAtTime(Ljava/lang/Runnable;JLjava/lang/Object;)Z"
                .parse()
                .unwrap(),
        );
        assert_eq!(i.receiver(), Some(Reg::from(0u8)));
        assert_eq!(i.argument(0), Some(Reg::from(1u8)));
        assert_eq!(i.argument(2), Some(Reg::from(4u8)));
        assert_eq!(i.argument(3), None);
        assert_eq!(i.argument_of_type("java/lang/Object"), Some(Reg::from(4u8)));

        let s = Instr::invoke(
            InvokeKind::Static,
            vec![5u8],
            "Ljava/lang/Class;->forName(Ljava/lang/String;)Ljava/lang/Class;"
                .parse()
                .unwrap(),
        );
        assert_eq!(s.receiver(), None);
        assert_eq!(s.argument(0), Some(Reg::from(5u8)));
    }

    #[test]
    fn deserialize_tagged() {
        let json = r#"{"op": "const-string", "dst": 3, "value": "app.ACTION"}"#;
        let i: Instr = serde_json::from_str(json).unwrap();
        assert_eq!(
            i,
            Instr::ConstString {
                dst: Reg::from(3u8),
                value: "app.ACTION".to_string()
            }
        );
        let json = r#"{"op": "invoke", "kind": "static", "args": [0], "method": "Lapp/A;->b(I)V"}"#;
        let i: Instr = serde_json::from_str(json).unwrap();
        assert!(matches!(i.as_invoke(), Some((InvokeKind::Static, _, _))));
    }
}
