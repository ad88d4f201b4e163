//! Method and field references, as they appear in invocation and field
//! access instructions.

use crate::errors::{BytecodeError, BytecodeResult};
use crate::types::Type;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const CONSTRUCTOR_NAME: &str = "<init>";
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";

/// A method prototype together with the class it is referenced from.
///
/// Descriptors are totally ordered so that they can be stored in ordered
/// collections, which keeps analysis outputs deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodDescr {
    definer: String,
    name: String,
    parameters_types: Vec<Type>,
    return_type: Type,
}

impl fmt::Display for MethodDescr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}->{}(", Type::Class(self.definer.clone()), self.name)?;
        for t in &self.parameters_types {
            write!(f, "{t}")?;
        }
        write!(f, "){}", self.return_type)
    }
}

impl FromStr for MethodDescr {
    type Err = BytecodeError;

    /// Parses a smali-like method reference: `Lapp/Foo;->bar(ILjava/lang/String;)V`.
    fn from_str(s: &str) -> BytecodeResult<Self> {
        let err = || BytecodeError::Conversion {
            from: format!("&str ({s:?})"),
            to: "MethodDescr".to_string(),
        };
        let (definer, rest) = s.split_once("->").ok_or_else(err)?;
        let (name, rest) = rest.split_once('(').ok_or_else(err)?;
        let (params, ret) = rest.split_once(')').ok_or_else(err)?;
        if name.is_empty() {
            return Err(err());
        }
        let definer = match Type::try_from(definer)? {
            Type::Class(cl) => cl,
            array @ Type::Array(_, _) => array.to_string(),
            _ => return Err(err()),
        };
        Ok(Self {
            definer,
            name: name.to_string(),
            parameters_types: Type::parse_list(params)?,
            return_type: Type::try_from(ret)?,
        })
    }
}

impl Serialize for MethodDescr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MethodDescr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl MethodDescr {
    #[must_use]
    pub fn new(definer: &str, name: &str, parameters_types: Vec<Type>, return_type: Type) -> Self {
        Self {
            definer: definer.to_string(),
            name: name.to_string(),
            parameters_types,
            return_type,
        }
    }

    /// The default (no argument) constructor of a class.
    #[must_use]
    pub fn default_constructor(class: &str) -> Self {
        Self::new(class, CONSTRUCTOR_NAME, Vec::new(), Type::Void)
    }

    /// Returns the same prototype, referenced from another class.
    #[must_use]
    pub fn with_definer(&self, class: &str) -> Self {
        Self {
            definer: class.to_string(),
            ..self.clone()
        }
    }

    /// Internal name of the class the method is referenced from.
    #[inline]
    pub fn definer(&self) -> &str {
        &self.definer
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parameters_types(&self) -> &[Type] {
        &self.parameters_types
    }

    #[inline]
    pub fn return_type(&self) -> &Type {
        &self.return_type
    }

    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME || self.name == STATIC_INITIALIZER_NAME
    }

    /// Checks that both descriptors share name and parameters (return type and
    /// definer may differ).
    #[must_use]
    pub fn same_signature(&self, other: &Self) -> bool {
        self.name == other.name && self.parameters_types == other.parameters_types
    }

    /// Number of registers needed to pass the arguments, including the
    /// receiver when `is_static` is false.
    #[must_use]
    pub fn arguments_width(&self, is_static: bool) -> u16 {
        let receiver = u16::from(!is_static);
        receiver + self.parameters_types.iter().map(Type::width).sum::<u16>()
    }
}

/// A field reference, as used in field access instructions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldDescr {
    class: String,
    name: String,
    #[serde(rename = "type")]
    type_: Type,
}

impl fmt::Display for FieldDescr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}->{}", self.type_, Type::Class(self.class.clone()), self.name)
    }
}

impl FieldDescr {
    #[must_use]
    pub fn new(class: &str, name: &str, type_: Type) -> Self {
        Self {
            class: class.to_string(),
            name: name.to_string(),
            type_,
        }
    }

    #[inline]
    pub fn class_name(&self) -> &str {
        &self.class
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn type_(&self) -> &Type {
        &self.type_
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_method() {
        let s = "Landroid/media/MediaPlayer;->setOnErrorListener(Landroid/media/MediaPlayer$OnErrorListener;)V";
        let m: MethodDescr = s.parse().unwrap();
        assert_eq!(m.definer(), "android/media/MediaPlayer");
        assert_eq!(m.name(), "setOnErrorListener");
        assert_eq!(
            m.parameters_types(),
            &[Type::class("android/media/MediaPlayer$OnErrorListener")]
        );
        assert_eq!(m.return_type(), &Type::Void);
        assert_eq!(m.to_string(), s);
    }

    #[test]
    fn parse_invalid_method() {
        assert!("Lapp/Foo;bar()V".parse::<MethodDescr>().is_err());
        assert!("Lapp/Foo;->bar(V".parse::<MethodDescr>().is_err());
        assert!("Lapp/Foo;->()V".parse::<MethodDescr>().is_err());
        assert!("I->bar()V".parse::<MethodDescr>().is_err());
    }

    #[test]
    fn constructors() {
        let ctor = MethodDescr::default_constructor("app/Foo");
        assert_eq!(ctor.to_string(), "Lapp/Foo;-><init>()V");
        assert!(ctor.is_constructor());
        let clinit: MethodDescr = "Lapp/Foo;-><clinit>()V".parse().unwrap();
        assert!(clinit.is_constructor());
    }

    #[test]
    fn arguments_width() {
        let m: MethodDescr = "Lapp/Foo;->bar(JILjava/lang/Object;)V".parse().unwrap();
        assert_eq!(m.arguments_width(true), 4);
        assert_eq!(m.arguments_width(false), 5);
    }

    #[test]
    fn serde_as_string() {
        let m: MethodDescr = "Lapp/Foo;->run()V".parse().unwrap();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "\"Lapp/Foo;->run()V\"");
        let back: MethodDescr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
