//! Owned SQLite values and conversions.
//!
//! [`Value`] is the unit of data flowing between rows, bound arguments and prefetch grouping
//! keys. Equality and hashing are total so composite key tuples can index a `HashMap`:
//! reals compare by bit pattern, and a real holding an exact integer equals that integer
//! (SQLite happily stores `1.0` in an INTEGER-affinity column).

use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A SQLite value (owned)
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// NULL value
    #[default]
    Null,
    /// Integer value (i64)
    Integer(i64),
    /// Real value (f64)
    Real(f64),
    /// Text value
    Text(String),
    /// Blob value
    Blob(Vec<u8>),
}

impl Value {
    /// Whether this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the storage class, used in decode error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
        }
    }

    /// Reals that hold an exact i64 are treated as that integer for equality and hashing.
    fn as_exact_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) if r.fract() == 0.0 && *r >= i64::MIN as f64 && *r < i64::MAX as f64 => {
                Some(*r as i64)
            }
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.as_exact_integer(), other.as_exact_integer()) {
            return a == b;
        }
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if let Some(i) = self.as_exact_integer() {
            1u8.hash(state);
            i.hash(state);
            return;
        }
        match self {
            Value::Null => 0u8.hash(state),
            Value::Integer(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Value::Real(r) => {
                2u8.hash(state);
                r.to_bits().hash(state);
            }
            Value::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Value::Blob(b) => {
                4u8.hash(state);
                b.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Blob(b) => {
                write!(f, "X'")?;
                for byte in b {
                    write!(f, "{byte:02X}")?;
                }
                write!(f, "'")
            }
        }
    }
}

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(Value::from(value))
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}

impl From<rusqlite::types::Value> for Value {
    fn from(value: rusqlite::types::Value) -> Self {
        match value {
            rusqlite::types::Value::Null => Value::Null,
            rusqlite::types::Value::Integer(i) => Value::Integer(i),
            rusqlite::types::Value::Real(r) => Value::Real(r),
            rusqlite::types::Value::Text(s) => Value::Text(s),
            rusqlite::types::Value::Blob(b) => Value::Blob(b),
        }
    }
}

// ==================== Into<Value> for bindable types ====================

macro_rules! impl_from_integer {
    ($($ty:ty),*) => { $(
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::Integer(i64::from(value))
            }
        }
    )* }
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Real(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Text(value.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Blob(value.to_vec())
    }
}

impl From<&Value> for Value {
    fn from(value: &Value) -> Self {
        value.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(feature = "chrono")]
impl From<chrono::NaiveDate> for Value {
    fn from(value: chrono::NaiveDate) -> Self {
        Value::Text(value.format("%Y-%m-%d").to_string())
    }
}

#[cfg(feature = "chrono")]
impl From<chrono::NaiveDateTime> for Value {
    fn from(value: chrono::NaiveDateTime) -> Self {
        Value::Text(value.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
    }
}

#[cfg(feature = "chrono")]
impl From<chrono::DateTime<chrono::Utc>> for Value {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        Value::from(value.naive_utc())
    }
}

#[cfg(feature = "uuid")]
impl From<uuid::Uuid> for Value {
    fn from(value: uuid::Uuid) -> Self {
        Value::Text(value.hyphenated().to_string())
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Text(value.to_string())
    }
}

// ==================== FromValue ====================

/// Conversion from a fetched [`Value`] into a Rust type.
///
/// The error is a human readable message; [`Row`](crate::Row) attaches the column name.
pub trait FromValue: Sized {
    /// Convert a database value into `Self`.
    fn from_value(value: &Value) -> Result<Self, String>;
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {expected}, found {}", value.type_name())
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Integer(i) => Ok(*i),
            other => other
                .as_exact_integer()
                .ok_or_else(|| mismatch("INTEGER", other)),
        }
    }
}

macro_rules! impl_from_value_narrow_integer {
    ($($ty:ty),*) => { $(
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self, String> {
                let wide = i64::from_value(value)?;
                <$ty>::try_from(wide)
                    .map_err(|_| format!("integer {wide} out of range for {}", stringify!($ty)))
            }
        }
    )* }
}

impl_from_value_narrow_integer!(i8, i16, i32, u8, u16, u32, u64, usize, isize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Real(r) => Ok(*r),
            Value::Integer(i) => Ok(*i as f64),
            other => Err(mismatch("REAL", other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        f64::from_value(value).map(|r| r as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Integer(i) => Ok(*i != 0),
            Value::Real(r) => Ok(*r != 0.0),
            other => Err(mismatch("INTEGER", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(mismatch("TEXT", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Blob(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            other => Err(mismatch("BLOB", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(feature = "chrono")]
impl FromValue for chrono::NaiveDate {
    fn from_value(value: &Value) -> Result<Self, String> {
        let text = String::from_value(value)?;
        text.parse().map_err(|e: chrono::ParseError| e.to_string())
    }
}

#[cfg(feature = "chrono")]
impl FromValue for chrono::NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, String> {
        let text = String::from_value(value)?;
        // SQLite's own datetime() output uses a space separator; ISO-8601 uses `T`.
        chrono::NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f"))
            .map_err(|e| e.to_string())
    }
}

#[cfg(feature = "chrono")]
impl FromValue for chrono::DateTime<chrono::Utc> {
    fn from_value(value: &Value) -> Result<Self, String> {
        let naive = chrono::NaiveDateTime::from_value(value)?;
        Ok(chrono::DateTime::from_naive_utc_and_offset(naive, chrono::Utc))
    }
}

#[cfg(feature = "uuid")]
impl FromValue for uuid::Uuid {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => uuid::Uuid::parse_str(s).map_err(|e| e.to_string()),
            Value::Blob(b) => uuid::Uuid::from_slice(b).map_err(|e| e.to_string()),
            other => Err(mismatch("TEXT or BLOB", other)),
        }
    }
}

#[cfg(feature = "json")]
impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        let text = String::from_value(value)?;
        serde_json::from_str(&text).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn integral_real_equals_integer() {
        assert_eq!(Value::Real(1.0), Value::Integer(1));
        assert_ne!(Value::Real(1.5), Value::Integer(1));

        let mut set = HashSet::new();
        set.insert(vec![Value::Integer(1), Value::Text("a".into())]);
        assert!(set.contains(&vec![Value::Real(1.0), Value::Text("a".into())]));
    }

    #[test]
    fn signed_zeros_are_one_value() {
        let (zero, negative) = (Value::Real(0.0), Value::Real(-0.0));
        assert_eq!(zero, Value::Integer(0));
        assert_eq!(Value::Integer(0), negative);
        assert_eq!(zero, negative);
        assert_eq!(HashSet::from([zero, negative, Value::Integer(0)]).len(), 1);

        let nan = Value::Real(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert_ne!(Value::Real(0.5), Value::Real(-0.5));
    }

    #[test]
    fn text_and_blob_are_distinct() {
        assert_ne!(Value::Text("a".into()), Value::Blob(b"a".to_vec()));
    }

    #[test]
    fn narrow_integer_out_of_range() {
        let err = u8::from_value(&Value::Integer(300)).unwrap_err();
        assert!(err.contains("out of range"));
    }

    #[test]
    fn option_decodes_null() {
        assert_eq!(Option::<i64>::from_value(&Value::Null), Ok(None));
        assert_eq!(Option::<i64>::from_value(&Value::Integer(3)), Ok(Some(3)));
    }

    #[test]
    fn string_rejects_integer() {
        let err = String::from_value(&Value::Integer(3)).unwrap_err();
        assert_eq!(err, "expected TEXT, found INTEGER");
    }

    #[test]
    fn display_quotes_text() {
        assert_eq!(Value::Text("it's".into()).to_string(), "'it''s'");
        assert_eq!(Value::Blob(vec![0xAB, 0x01]).to_string(), "X'AB01'");
    }

    #[cfg(feature = "chrono")]
    #[test]
    fn chrono_reads_both_datetime_separators() {
        use chrono::{NaiveDate, NaiveDateTime, Timelike};

        let sqlite = NaiveDateTime::from_value(&Value::Text("2024-03-01 12:30:45".into())).unwrap();
        let iso = NaiveDateTime::from_value(&Value::Text("2024-03-01T12:30:45.250".into())).unwrap();
        assert_eq!(sqlite.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(iso.with_nanosecond(0), Some(sqlite));
        assert_eq!(iso.nanosecond(), 250_000_000);

        assert_eq!(Value::from(iso), Value::Text("2024-03-01 12:30:45.250".into()));
        let utc = chrono::DateTime::<chrono::Utc>::from_value(&Value::from(iso)).unwrap();
        assert_eq!(utc.naive_utc(), iso);

        assert_eq!(
            NaiveDate::from_value(&Value::Text("2024-03-01".into())),
            Ok(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert!(NaiveDateTime::from_value(&Value::Text("yesterday".into())).is_err());
        assert_eq!(
            NaiveDate::from_value(&Value::Integer(20240301)).unwrap_err(),
            "expected TEXT, found INTEGER"
        );
    }

    #[cfg(feature = "uuid")]
    #[test]
    fn uuid_reads_text_and_blob() {
        let id = uuid::Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        let text = Value::from(id);
        assert_eq!(text, Value::Text("01234567-89ab-cdef-0123-456789abcdef".into()));
        assert_eq!(uuid::Uuid::from_value(&text), Ok(id));
        assert_eq!(uuid::Uuid::from_value(&Value::Blob(id.as_bytes().to_vec())), Ok(id));

        assert!(uuid::Uuid::from_value(&Value::Blob(vec![1, 2, 3])).is_err());
        assert_eq!(
            uuid::Uuid::from_value(&Value::Integer(1)).unwrap_err(),
            "expected TEXT or BLOB, found INTEGER"
        );
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_reads_text() {
        let document = serde_json::json!({ "tags": ["a", "b"], "pages": 3 });
        let stored = Value::from(document.clone());
        assert!(matches!(&stored, Value::Text(text) if text.starts_with('{')));
        assert_eq!(serde_json::Value::from_value(&stored), Ok(document));

        assert!(serde_json::Value::from_value(&Value::Text("{\"tags\":".into())).is_err());
        assert!(serde_json::Value::from_value(&Value::Blob(b"{}".to_vec())).is_err());
    }
}
