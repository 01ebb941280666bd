//! The closed, twelve-member scalar type system.

use crate::error::{SdsError, SdsResult};
use std::fmt;

/// A stored scalar type. Closed enumeration — never extend without a version bump
/// in [`crate::layout::Layout::version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    LongDouble,
    Double,
    Float,
    Int64,
    UInt64,
    Int32,
    UInt32,
    Int16,
    UInt16,
    String,
    Char,
}

/// Sentinel classes accepted only by check/validate routines, never as a stored type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    AnyNumeric,
    AnyInteger,
    AnyFloat,
    Exact(Type),
}

impl TypeClass {
    pub fn accepts(&self, ty: Type) -> bool {
        match self {
            TypeClass::AnyNumeric => ty.is_numeric(),
            TypeClass::AnyInteger => ty.is_integer(),
            TypeClass::AnyFloat => ty.is_float(),
            TypeClass::Exact(t) => *t == ty,
        }
    }
}

impl Type {
    /// Fixed on-disk size in bytes; `String` is variable and reports `0` here —
    /// callers must use the length-prefixed encoding instead.
    pub fn fixed_size(self) -> usize {
        match self {
            // Stored as `f64` (see `Value::LongDouble`) and encoded that way
            // by the binary codec, so its wire width is 8 bytes, not the
            // 16-byte C `long double` it stands in for.
            Type::LongDouble => 8,
            Type::Double => 8,
            Type::Float => 4,
            Type::Int64 | Type::UInt64 => 8,
            Type::Int32 | Type::UInt32 => 4,
            Type::Int16 | Type::UInt16 => 2,
            Type::String => 0,
            Type::Char => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::LongDouble => "longdouble",
            Type::Double => "double",
            Type::Float => "float",
            Type::Int64 => "long64",
            Type::UInt64 => "ulong64",
            Type::Int32 => "long",
            Type::UInt32 => "ulong",
            Type::Int16 => "short",
            Type::UInt16 => "ushort",
            Type::String => "string",
            Type::Char => "character",
        }
    }

    pub fn from_name(name: &str) -> Option<Type> {
        Some(match name {
            "longdouble" => Type::LongDouble,
            "double" => Type::Double,
            "float" => Type::Float,
            "long64" => Type::Int64,
            "ulong64" => Type::UInt64,
            "long" => Type::Int32,
            "ulong" => Type::UInt32,
            "short" => Type::Int16,
            "ushort" => Type::UInt16,
            "string" => Type::String,
            "character" => Type::Char,
            _ => return None,
        })
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Type::Int64 | Type::UInt64 | Type::Int32 | Type::UInt32 | Type::Int16 | Type::UInt16
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::LongDouble | Type::Double | Type::Float)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// `true` if this type's presence alone would bump the layout version.
    pub fn forces_version_2(self) -> bool {
        matches!(self, Type::UInt16 | Type::UInt32)
    }

    pub fn forces_version_4(self) -> bool {
        matches!(self, Type::LongDouble)
    }

    pub fn forces_version_5(self) -> bool {
        matches!(self, Type::Int64 | Type::UInt64)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single stored scalar value, tagged by its runtime type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    LongDouble(f64),
    Double(f64),
    Float(f32),
    Int64(i64),
    UInt64(u64),
    Int32(i32),
    UInt32(u32),
    Int16(i16),
    UInt16(u16),
    String(String),
    Char(u8),
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Value::LongDouble(_) => Type::LongDouble,
            Value::Double(_) => Type::Double,
            Value::Float(_) => Type::Float,
            Value::Int64(_) => Type::Int64,
            Value::UInt64(_) => Type::UInt64,
            Value::Int32(_) => Type::Int32,
            Value::UInt32(_) => Type::UInt32,
            Value::Int16(_) => Type::Int16,
            Value::UInt16(_) => Type::UInt16,
            Value::String(_) => Type::String,
            Value::Char(_) => Type::Char,
        }
    }

    /// Zero value for a given type, used to fill newly-allocated buffer slots.
    pub fn zero(ty: Type) -> Value {
        match ty {
            Type::LongDouble => Value::LongDouble(0.0),
            Type::Double => Value::Double(0.0),
            Type::Float => Value::Float(0.0),
            Type::Int64 => Value::Int64(0),
            Type::UInt64 => Value::UInt64(0),
            Type::Int32 => Value::Int32(0),
            Type::UInt32 => Value::UInt32(0),
            Type::Int16 => Value::Int16(0),
            Type::UInt16 => Value::UInt16(0),
            Type::String => Value::String(String::new()),
            Type::Char => Value::Char(0),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::LongDouble(v) | Value::Double(v) => Some(v),
            Value::Float(v) => Some(v as f64),
            Value::Int64(v) => Some(v as f64),
            Value::UInt64(v) => Some(v as f64),
            Value::Int32(v) => Some(v as f64),
            Value::UInt32(v) => Some(v as f64),
            Value::Int16(v) => Some(v as f64),
            Value::UInt16(v) => Some(v as f64),
            Value::String(_) | Value::Char(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int64(v) => Some(v),
            Value::UInt64(v) => Some(v as i64),
            Value::Int32(v) => Some(v as i64),
            Value::UInt32(v) => Some(v as i64),
            Value::Int16(v) => Some(v as i64),
            Value::UInt16(v) => Some(v as i64),
            Value::LongDouble(v) | Value::Double(v) => Some(v as i64),
            Value::Float(v) => Some(v as i64),
            Value::String(_) | Value::Char(_) => None,
        }
    }

    /// Formats a numeric value for assignment into a `String` column/parameter,
    /// using a fixed significant-digit count per source type. `Char` and
    /// `String` sources pass through.
    pub fn format_as_string(&self) -> String {
        match self {
            Value::Double(v) => format_g(*v, 15),
            Value::LongDouble(v) => format_g(*v, 18),
            Value::Float(v) => format_g(*v as f64, 8),
            Value::Int32(v) => v.to_string(),
            Value::UInt32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::UInt64(v) => v.to_string(),
            Value::Int16(v) => v.to_string(),
            Value::UInt16(v) => v.to_string(),
            Value::Char(v) => (*v as char).to_string(),
            Value::String(s) => s.clone(),
        }
    }

    /// Casts this value to the target type: numeric<->numeric widen/narrow by
    /// value with no overflow detection; String<->String deep copy; Char is a
    /// one-byte value copy; nonnumeric<->numeric is `TypeMismatch`.
    pub fn cast_to(&self, target: Type, site: &'static str) -> SdsResult<Value> {
        if self.ty() == target {
            return Ok(self.clone());
        }
        if self.ty().is_numeric() && target == Type::String {
            return Ok(Value::String(self.format_as_string()));
        }
        if self.ty().is_integer() && target.is_integer() {
            // Route through i64 with plain `as` casts at both ends: widening
            // from any integer type into i64 is value-preserving, and the
            // final `as` into the target width wraps instead of saturating,
            // matching C's static_cast truncation behavior.
            let v = self.as_i64().expect("integer value");
            return Ok(match target {
                Type::Int64 => Value::Int64(v),
                Type::UInt64 => Value::UInt64(v as u64),
                Type::Int32 => Value::Int32(v as i32),
                Type::UInt32 => Value::UInt32(v as u32),
                Type::Int16 => Value::Int16(v as i16),
                Type::UInt16 => Value::UInt16(v as u16),
                _ => unreachable!(),
            });
        }
        if self.ty().is_numeric() && target.is_numeric() {
            let v = self.as_f64().expect("numeric value");
            return Ok(match target {
                Type::LongDouble => Value::LongDouble(v),
                Type::Double => Value::Double(v),
                Type::Float => Value::Float(v as f32),
                Type::Int64 => Value::Int64(v as i64),
                Type::UInt64 => Value::UInt64(v as u64),
                Type::Int32 => Value::Int32(v as i32),
                Type::UInt32 => Value::UInt32(v as u32),
                Type::Int16 => Value::Int16(v as i16),
                Type::UInt16 => Value::UInt16(v as u16),
                Type::String | Type::Char => unreachable!(),
            });
        }
        Err(SdsError::type_mismatch(site, self.ty().name(), target.name()))
    }
}

/// Formats `v` approximating C's `%.<prec>g`: shortest decimal within `prec` significant
/// digits, trimming trailing zeros, matching the source's textual representation closely
/// enough to satisfy the round-trip invariants.
fn format_g(v: f64, prec: usize) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    let s = format!("{:.*e}", prec.saturating_sub(1), v);
    let (mantissa, exp) = s.split_once('e').expect("exponential form");
    let exp: i32 = exp.parse().expect("valid exponent");
    if (-4..prec as i32).contains(&exp) {
        let decimals = (prec as i32 - 1 - exp).max(0) as usize;
        let fixed = format!("{:.*}", decimals, v);
        trim_trailing_zeros(&fixed)
    } else {
        let mantissa = trim_trailing_zeros(mantissa);
        format!("{mantissa}e{}{:02}", if exp >= 0 { "+" } else { "-" }, exp.abs())
    }
}

fn trim_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('0');
    trimmed.trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cast_round_trip_preserves_in_range_values() {
        let v = Value::Int32(42);
        let as_double = v.cast_to(Type::Double, "test").unwrap();
        let back = as_double.cast_to(Type::Int32, "test").unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn string_to_numeric_is_type_mismatch() {
        let v = Value::String("abc".into());
        assert!(v.cast_to(Type::Int32, "test").is_err());
    }

    #[test]
    fn double_to_string_formats_with_precision() {
        let v = Value::Double(3.5);
        let s = v.cast_to(Type::String, "test").unwrap();
        assert_eq!(s, Value::String("3.5".into()));
    }

    #[test]
    fn integer_narrowing_wraps_like_c_static_cast() {
        let v = Value::Int64(5_000_000_000).cast_to(Type::Int32, "test").unwrap();
        assert_eq!(v, Value::Int32(705_032_704));
    }

    #[test]
    fn negative_to_unsigned_wraps_instead_of_saturating() {
        let v = Value::Int64(-1).cast_to(Type::UInt64, "test").unwrap();
        assert_eq!(v, Value::UInt64(u64::MAX));
    }

    #[test]
    fn type_forces_version_bumps() {
        assert!(Type::UInt32.forces_version_2());
        assert!(Type::LongDouble.forces_version_4());
        assert!(Type::Int64.forces_version_5());
        assert!(!Type::Double.forces_version_2());
    }
}
