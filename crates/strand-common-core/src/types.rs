//! Type descriptors and method signatures.
//!
//! Signatures use the JVM descriptor grammar: `(IJLjava/lang/Object;[I)V`.
//! Every helper here is a pure function of its input, which is what lets method
//! descriptors memoize the results without ever disagreeing with a recomputation.

use num_enum::TryFromPrimitive;
use thiserror::Error;

/// Builtin type classification.
///
/// The numeric values of the primitive codes match the `newarray` element codes,
/// so a `NewArray` operand can carry a `TypeCode` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TypeCode {
    Boolean = 4,
    Char = 5,
    Float = 6,
    Double = 7,
    Byte = 8,
    Short = 9,
    Int = 10,
    Long = 11,
    Void = 12,
    Array = 13,
    Reference = 14,
}

impl TypeCode {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Classify the first character of a field descriptor.
    pub fn from_descriptor_char(c: char) -> Option<Self> {
        Some(match c {
            'Z' => Self::Boolean,
            'C' => Self::Char,
            'F' => Self::Float,
            'D' => Self::Double,
            'B' => Self::Byte,
            'S' => Self::Short,
            'I' => Self::Int,
            'J' => Self::Long,
            'V' => Self::Void,
            '[' => Self::Array,
            'L' => Self::Reference,
            _ => return None,
        })
    }

    pub fn descriptor_char(self) -> char {
        match self {
            Self::Boolean => 'Z',
            Self::Char => 'C',
            Self::Float => 'F',
            Self::Double => 'D',
            Self::Byte => 'B',
            Self::Short => 'S',
            Self::Int => 'I',
            Self::Long => 'J',
            Self::Void => 'V',
            Self::Array => '[',
            Self::Reference => 'L',
        }
    }

    /// Number of operand-stack / local-variable slots a value of this type takes.
    #[inline]
    pub fn slot_size(self) -> usize {
        match self {
            Self::Void => 0,
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    #[inline]
    pub fn is_reference(self) -> bool {
        matches!(self, Self::Reference | Self::Array)
    }

    /// Is this one of the int-like types that live in a single int slot?
    pub fn is_int_like(self) -> bool {
        matches!(
            self,
            Self::Boolean | Self::Char | Self::Byte | Self::Short | Self::Int
        )
    }

    /// Java source name of a primitive type (`"int"`, `"boolean"`, ...).
    pub fn primitive_name(self) -> Option<&'static str> {
        Some(match self {
            Self::Boolean => "boolean",
            Self::Char => "char",
            Self::Float => "float",
            Self::Double => "double",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Void => "void",
            Self::Array | Self::Reference => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("method signature must start with '(': {0}")]
    MissingOpenParen(String),

    #[error("unterminated argument list in signature: {0}")]
    UnterminatedArgs(String),

    #[error("invalid type descriptor in '{sig}' at offset {pos}")]
    InvalidDescriptor { sig: String, pos: usize },

    #[error("trailing characters after return type in signature: {0}")]
    TrailingInput(String),

    #[error("void is only valid as a return type: {0}")]
    VoidArgument(String),
}

pub type SignatureResult<T> = Result<T, SignatureError>;

/// Parse one field descriptor starting at `pos`; returns its code and end offset.
fn parse_descriptor(sig: &str, pos: usize) -> SignatureResult<(TypeCode, usize)> {
    let bytes = sig.as_bytes();
    let invalid = || SignatureError::InvalidDescriptor {
        sig: sig.to_string(),
        pos,
    };
    let first = *bytes.get(pos).ok_or_else(invalid)? as char;
    let code = TypeCode::from_descriptor_char(first).ok_or_else(invalid)?;
    match code {
        TypeCode::Reference => {
            let rest = &sig[pos..];
            let semi = rest.find(';').ok_or_else(invalid)?;
            if semi == 1 {
                return Err(invalid());
            }
            Ok((code, pos + semi + 1))
        }
        TypeCode::Array => {
            let mut p = pos;
            while bytes.get(p) == Some(&b'[') {
                p += 1;
            }
            let (elem, end) = parse_descriptor(sig, p)?;
            if elem == TypeCode::Void {
                return Err(invalid());
            }
            Ok((code, end))
        }
        _ => Ok((code, pos + 1)),
    }
}

/// Split a method signature into its argument descriptors and its return descriptor.
pub fn split_signature(sig: &str) -> SignatureResult<(Vec<&str>, &str)> {
    if !sig.starts_with('(') {
        return Err(SignatureError::MissingOpenParen(sig.to_string()));
    }
    let close = sig
        .find(')')
        .ok_or_else(|| SignatureError::UnterminatedArgs(sig.to_string()))?;

    let mut args = Vec::new();
    let mut pos = 1;
    while pos < close {
        let (code, end) = parse_descriptor(sig, pos)?;
        if code == TypeCode::Void {
            return Err(SignatureError::VoidArgument(sig.to_string()));
        }
        if end > close {
            return Err(SignatureError::InvalidDescriptor {
                sig: sig.to_string(),
                pos,
            });
        }
        args.push(&sig[pos..end]);
        pos = end;
    }

    let (_, end) = parse_descriptor(sig, close + 1)?;
    if end != sig.len() {
        return Err(SignatureError::TrailingInput(sig.to_string()));
    }
    Ok((args, &sig[close + 1..]))
}

/// Validate a method signature without producing anything.
pub fn check_signature(sig: &str) -> SignatureResult<()> {
    split_signature(sig).map(|_| ())
}

/// Validate a single field descriptor (`I`, `Ljava/lang/Object;`, `[J`).
pub fn check_field_descriptor(desc: &str) -> SignatureResult<TypeCode> {
    let (code, end) = parse_descriptor(desc, 0)?;
    if end != desc.len() {
        return Err(SignatureError::TrailingInput(desc.to_string()));
    }
    if code == TypeCode::Void {
        return Err(SignatureError::VoidArgument(desc.to_string()));
    }
    Ok(code)
}

pub fn argument_types(sig: &str) -> SignatureResult<Vec<TypeCode>> {
    let (args, _) = split_signature(sig)?;
    Ok(args.iter().map(|a| descriptor_type_code(a)).collect())
}

pub fn number_of_arguments(sig: &str) -> SignatureResult<usize> {
    Ok(split_signature(sig)?.0.len())
}

/// Slots taken by the declared arguments (no receiver).
pub fn arguments_size(sig: &str) -> SignatureResult<usize> {
    Ok(argument_types(sig)?.iter().map(|t| t.slot_size()).sum())
}

pub fn argument_type_names(sig: &str) -> SignatureResult<Vec<String>> {
    let (args, _) = split_signature(sig)?;
    Ok(args.iter().map(|a| type_name(a)).collect())
}

pub fn return_type_signature(sig: &str) -> SignatureResult<&str> {
    Ok(split_signature(sig)?.1)
}

pub fn return_type_code(sig: &str) -> SignatureResult<TypeCode> {
    Ok(descriptor_type_code(return_type_signature(sig)?))
}

pub fn return_type_name(sig: &str) -> SignatureResult<String> {
    Ok(type_name(return_type_signature(sig)?))
}

/// Caller-side stack slots needed to set up and receive a call:
/// the larger of the argument slots (incl. receiver) and the return slots.
pub fn number_of_stack_slots(sig: &str, is_static: bool) -> SignatureResult<usize> {
    let mut n = arguments_size(sig)?;
    if !is_static {
        n += 1;
    }
    let r = return_type_code(sig)?.slot_size();
    Ok(n.max(r))
}

/// Type code of an already validated descriptor.
#[inline]
pub fn descriptor_type_code(desc: &str) -> TypeCode {
    desc.chars()
        .next()
        .and_then(TypeCode::from_descriptor_char)
        .unwrap_or(TypeCode::Reference)
}

/// Java source name of a descriptor: `I` -> `int`, `[Ljava/lang/String;` -> `java.lang.String[]`.
pub fn type_name(desc: &str) -> String {
    let dims = desc.chars().take_while(|c| *c == '[').count();
    let elem = &desc[dims..];
    let mut name = match elem.chars().next().and_then(TypeCode::from_descriptor_char) {
        Some(TypeCode::Reference) => class_name_from_type_name(elem),
        Some(code) => code
            .primitive_name()
            .map(str::to_string)
            .unwrap_or_else(|| elem.to_string()),
        None => elem.to_string(),
    };
    for _ in 0..dims {
        name.push_str("[]");
    }
    name
}

/// `Ljava/lang/Foo;` or `java/lang/Foo` -> `java.lang.Foo`.
pub fn class_name_from_type_name(name: &str) -> String {
    let inner = if name.starts_with('L') && name.ends_with(';') {
        &name[1..name.len() - 1]
    } else {
        name
    };
    inner.replace('/', ".")
}
