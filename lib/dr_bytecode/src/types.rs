//! Dalvik typing informations.

use crate::errors::{BytecodeError, BytecodeResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Dalvik concrete type descriptor type.
///
/// Class names are stored in their internal form (`android/app/Activity`),
/// the `Display` implementation produces the Dalvik descriptor form
/// (`Landroid/app/Activity;`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    /// `void` type, only valid for return types.
    Void,
    /// `boolean` type.
    Boolean,
    /// `byte` type.
    Byte,
    /// `short` type.
    Short,
    /// `char` type.
    Char,
    /// `int` type.
    Int,
    /// `long` type.
    Long,
    /// `float` type.
    Float,
    /// `double` type.
    Double,
    /// Array of the given type descriptor, usable recursively for arrays of arrays,
    /// though it is invalid to have more than 255 dimensions.
    Array(usize, Box<Self>),
    /// Type of a fully-qualified class
    Class(String),
}

impl Type {
    /// Shortcut to build a class type from its internal name.
    #[must_use]
    pub fn class(name: &str) -> Self {
        Self::Class(name.to_string())
    }

    /// Returns the class name if the type is a class type.
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        if let Self::Class(name) = self {
            Some(name)
        } else {
            None
        }
    }

    pub fn as_class_name(&self) -> BytecodeResult<&str> {
        self.class_name()
            .ok_or_else(|| BytecodeError::InvalidType(self.to_string()))
    }

    /// Returns the number of registers a value of this type occupies.
    #[must_use]
    pub const fn width(&self) -> u16 {
        match self {
            Self::Void => 0,
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    /// Returns a java-like representation of the type.
    #[must_use]
    pub fn to_java_string(&self) -> String {
        match self {
            Self::Void => "void".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Byte => "byte".to_string(),
            Self::Short => "short".to_string(),
            Self::Char => "char".to_string(),
            Self::Int => "int".to_string(),
            Self::Long => "long".to_string(),
            Self::Float => "float".to_string(),
            Self::Double => "double".to_string(),
            Self::Array(n, sub) => {
                let mut s = sub.to_java_string();
                for _ in 0..*n {
                    s.push_str("[]");
                }
                s
            }
            Self::Class(name) => name.replace('/', "."),
        }
    }

    /// Parses a concatenation of type descriptors, such as the parameters part
    /// of a method prototype (`Landroid/content/Context;IJ`).
    pub fn parse_list(s: &str) -> BytecodeResult<Vec<Self>> {
        let mut types = Vec::new();
        let mut rest = s;
        while !rest.is_empty() {
            let len = descriptor_len(rest).ok_or_else(|| conversion_error(s, "Vec<Type>"))?;
            types.push(Self::try_from(&rest[..len])?);
            rest = &rest[len..];
        }
        Ok(types)
    }
}

// Length of the first descriptor contained in `s`.
fn descriptor_len(s: &str) -> Option<usize> {
    let dims = s.bytes().take_while(|b| *b == b'[').count();
    let sub = &s[dims..];
    match sub.as_bytes().first()? {
        b'L' => sub.find(';').map(|end| dims + end + 1),
        b'V' | b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D' => Some(dims + 1),
        _ => None,
    }
}

fn conversion_error(s: &str, to: &str) -> BytecodeError {
    BytecodeError::Conversion {
        from: format!("&str ({s:?})"),
        to: to.to_string(),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Void => write!(f, "V"),
            Self::Boolean => write!(f, "Z"),
            Self::Byte => write!(f, "B"),
            Self::Short => write!(f, "S"),
            Self::Char => write!(f, "C"),
            Self::Int => write!(f, "I"),
            Self::Long => write!(f, "J"),
            Self::Float => write!(f, "F"),
            Self::Double => write!(f, "D"),
            Self::Array(n, inner) => {
                for _ in 0..*n {
                    write!(f, "[")?;
                }
                write!(f, "{inner}")
            }
            Self::Class(classname) => write!(f, "L{classname};"),
        }
    }
}

impl TryFrom<&str> for Type {
    type Error = BytecodeError;

    fn try_from(s: &str) -> BytecodeResult<Self> {
        if s.is_empty() {
            return Err(conversion_error(s, "Type"));
        }

        let dims = s.bytes().take_while(|b| *b == b'[').count();
        if dims >= s.len() || dims >= 255 {
            return Err(conversion_error(s, "Type"));
        }

        let t = match &s[dims..] {
            "V" if dims == 0 => Self::Void,
            "Z" => Self::Boolean,
            "B" => Self::Byte,
            "S" => Self::Short,
            "C" => Self::Char,
            "I" => Self::Int,
            "J" => Self::Long,
            "F" => Self::Float,
            "D" => Self::Double,
            sub => {
                let l = sub.len();
                if l > 2 && sub.starts_with('L') && sub.ends_with(';') {
                    Self::Class(sub[1..l - 1].to_string())
                } else {
                    return Err(conversion_error(s, "Type"));
                }
            }
        };
        if dims == 0 {
            Ok(t)
        } else {
            Ok(Self::Array(dims, Box::new(t)))
        }
    }
}

impl FromStr for Type {
    type Err = BytecodeError;

    fn from_str(s: &str) -> BytecodeResult<Self> {
        Self::try_from(s)
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}

/// Converts a dotted java class name (`com.example.Foo`) into its internal
/// form (`com/example/Foo`). Descriptors (`Lcom/example/Foo;`) are accepted too.
#[must_use]
pub fn internal_class_name(name: &str) -> String {
    let name = name.trim();
    let name = match name.strip_prefix('L').and_then(|n| n.strip_suffix(';')) {
        Some(inner) => inner,
        None => name,
    };
    name.replace('.', "/")
}
