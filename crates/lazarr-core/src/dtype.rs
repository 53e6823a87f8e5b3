//! Element dtypes and the numeric promotion table.
//!
//! Structured (record) dtypes only support field extraction and, through
//! extracted fields, comparison. Applying arithmetic to a whole record is
//! a `DType` error raised when the expression is built.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// One named field inside a structured dtype. Field dtypes must be scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub dtype: DType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Struct(Vec<FieldDef>),
}

impl DType {
    pub fn is_struct(&self) -> bool {
        matches!(self, DType::Struct(_))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, DType::Bool)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DType::Int8 | DType::Int16 | DType::Int32 | DType::Int64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    /// Numeric here means "participates in arithmetic": ints and floats.
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Bytes per element (structs: sum of their fields).
    pub fn size_of(&self) -> usize {
        match self {
            DType::Bool | DType::Int8 => 1,
            DType::Int16 => 2,
            DType::Int32 | DType::Float32 => 4,
            DType::Int64 | DType::Float64 => 8,
            DType::Struct(fields) => fields.iter().map(|f| f.dtype.size_of()).sum(),
        }
    }

    pub fn fields(&self) -> Option<&[FieldDef]> {
        match self {
            DType::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Look up a field of a structured dtype by name.
    pub fn field(&self, name: &str) -> Result<&FieldDef> {
        let fields = self
            .fields()
            .ok_or_else(|| Error::DType(format!("'{self}' is not a structured dtype")))?;
        fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::Name(name.to_string()))
    }

    /// Stable on-disk tag for scalar dtypes (structs are described by the
    /// container metadata, never by a single tag).
    pub fn code(&self) -> Result<u8> {
        Ok(match self {
            DType::Bool => 0,
            DType::Int8 => 1,
            DType::Int16 => 2,
            DType::Int32 => 3,
            DType::Int64 => 4,
            DType::Float32 => 5,
            DType::Float64 => 6,
            DType::Struct(_) => {
                return Err(Error::Invariant(
                    "structured dtypes have no scalar tag".into(),
                ))
            }
        })
    }

    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => DType::Bool,
            1 => DType::Int8,
            2 => DType::Int16,
            3 => DType::Int32,
            4 => DType::Int64,
            5 => DType::Float32,
            6 => DType::Float64,
            other => return Err(Error::Codec(format!("unknown dtype tag {other}"))),
        })
    }

    fn int_bits(&self) -> usize {
        match self {
            DType::Int8 => 8,
            DType::Int16 => 16,
            DType::Int32 => 32,
            DType::Int64 => 64,
            _ => 0,
        }
    }
}

/// Numeric promotion for binary arithmetic. The table is fixed:
///
/// - equal dtypes stay put; bool promotes to the other operand
/// - int × int → the wider int
/// - i8/i16 × f32 → f32; i32/i64 × f32 → f64 (f32 cannot hold them)
/// - any int × f64 → f64; f32 × f64 → f64
///
/// Comparison and boolean operators ignore this and always yield `Bool`.
pub fn promote(a: &DType, b: &DType) -> Result<DType> {
    if a.is_struct() || b.is_struct() {
        return Err(Error::DType(
            "structured dtypes do not support arithmetic; select a field first".into(),
        ));
    }
    if a == b {
        return Ok(a.clone());
    }
    if a.is_bool() {
        return Ok(b.clone());
    }
    if b.is_bool() {
        return Ok(a.clone());
    }
    Ok(match (a, b) {
        (x, y) if x.is_integer() && y.is_integer() => {
            if x.int_bits() >= y.int_bits() {
                x.clone()
            } else {
                y.clone()
            }
        }
        (DType::Float64, _) | (_, DType::Float64) => DType::Float64,
        (DType::Float32, i) | (i, DType::Float32) => {
            if i.int_bits() <= 16 {
                DType::Float32
            } else {
                DType::Float64
            }
        }
        _ => {
            return Err(Error::Invariant(format!(
                "promotion table has no entry for {a} × {b}"
            )))
        }
    })
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Bool => write!(f, "bool"),
            DType::Int8 => write!(f, "int8"),
            DType::Int16 => write!(f, "int16"),
            DType::Int32 => write!(f, "int32"),
            DType::Int64 => write!(f, "int64"),
            DType::Float32 => write!(f, "float32"),
            DType::Float64 => write!(f, "float64"),
            DType::Struct(fields) => {
                write!(f, "struct{{")?;
                for (i, fd) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", fd.name, fd.dtype)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_widens_ints() {
        assert_eq!(promote(&DType::Int32, &DType::Int64).unwrap(), DType::Int64);
        assert_eq!(promote(&DType::Int8, &DType::Int16).unwrap(), DType::Int16);
    }

    #[test]
    fn promotion_int_float() {
        assert_eq!(
            promote(&DType::Int32, &DType::Float32).unwrap(),
            DType::Float64
        );
        assert_eq!(
            promote(&DType::Int16, &DType::Float32).unwrap(),
            DType::Float32
        );
        assert_eq!(
            promote(&DType::Int64, &DType::Float64).unwrap(),
            DType::Float64
        );
    }

    #[test]
    fn bool_defers_to_other_side() {
        assert_eq!(
            promote(&DType::Bool, &DType::Float32).unwrap(),
            DType::Float32
        );
        assert_eq!(promote(&DType::Bool, &DType::Bool).unwrap(), DType::Bool);
    }

    #[test]
    fn struct_arithmetic_rejected() {
        let s = DType::Struct(vec![FieldDef::new("a", DType::Int32)]);
        assert!(matches!(
            promote(&s, &DType::Int32),
            Err(Error::DType(_))
        ));
    }
}
