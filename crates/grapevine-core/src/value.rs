//! Dynamically typed gossip values.
//!
//! A gossip value is one of a small set of variants, each of which carries a
//! total order. Values are only comparable within a variant; the type of a key
//! is fixed for the life of the cluster, so a cross-variant comparison is a
//! deployment bug and surfaces as [`ValueError::TypeMismatch`] rather than an
//! arbitrary ordering.
//!
//! User-defined types participate through [`Ordered`]: they render themselves
//! into an order-preserving byte key once, at publish time, and peers compare
//! those keys lexicographically. This keeps the wire format self-describing
//! without a process-wide decoder registry.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error comparing two gossip values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The two values are not of the same variant (or the same custom type).
    #[error("cannot order {left} against {right}")]
    TypeMismatch {
        /// Kind (and custom type name) of the left operand.
        left: String,
        /// Kind (and custom type name) of the right operand.
        right: String,
    },
}

/// A user-defined gossip value type.
///
/// Implementors produce an order-preserving byte key: for any two values
/// `a` and `b` of the same type, `a < b` iff `a.ordering_key() <
/// b.ordering_key()` lexicographically. The key travels on the wire in place
/// of the value itself.
pub trait Ordered {
    /// Stable name of the type; two values compare only if their names match.
    fn type_name(&self) -> &'static str;

    /// Order-preserving encoding of the value.
    fn ordering_key(&self) -> Vec<u8>;
}

/// Dynamically typed value carried by a gossip info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InfoValue {
    /// Signed 64-bit integer.
    I64(i64),
    /// 64-bit float, ordered by `f64::total_cmp`.
    F64(f64),
    /// UTF-8 string.
    Str(String),
    /// User-defined type reduced to an order-preserving key.
    Custom {
        /// Stable type name; comparisons require equal names.
        type_name: String,
        /// Order-preserving byte key.
        key: Vec<u8>,
    },
}

impl InfoValue {
    /// Build a custom value from an [`Ordered`] implementor.
    pub fn from_ordered<T: Ordered + ?Sized>(value: &T) -> Self {
        Self::Custom {
            type_name: value.type_name().to_string(),
            key: value.ordering_key(),
        }
    }

    /// Human-readable kind label, including the custom type name.
    #[must_use]
    pub fn kind(&self) -> String {
        match self {
            Self::I64(_) => "i64".to_string(),
            Self::F64(_) => "f64".to_string(),
            Self::Str(_) => "str".to_string(),
            Self::Custom { type_name, .. } => format!("custom({type_name})"),
        }
    }

    /// The integer payload, if this is an [`InfoValue::I64`].
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// The float payload, if this is an [`InfoValue::F64`].
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// The string payload, if this is an [`InfoValue::Str`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Total order against another value of the same variant.
    ///
    /// # Errors
    /// Returns [`ValueError::TypeMismatch`] if the variants (or custom type
    /// names) differ.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering, ValueError> {
        match (self, other) {
            (Self::I64(a), Self::I64(b)) => Ok(a.cmp(b)),
            (Self::F64(a), Self::F64(b)) => Ok(a.total_cmp(b)),
            (Self::Str(a), Self::Str(b)) => Ok(a.cmp(b)),
            (
                Self::Custom {
                    type_name: ta,
                    key: ka,
                },
                Self::Custom {
                    type_name: tb,
                    key: kb,
                },
            ) if ta == tb => Ok(ka.cmp(kb)),
            _ => Err(ValueError::TypeMismatch {
                left: self.kind(),
                right: other.kind(),
            }),
        }
    }

    /// `self < other` under [`InfoValue::try_cmp`].
    ///
    /// # Errors
    /// Returns [`ValueError::TypeMismatch`] if the values are not comparable.
    pub fn less_than(&self, other: &Self) -> Result<bool, ValueError> {
        Ok(self.try_cmp(other)? == Ordering::Less)
    }
}

impl From<i64> for InfoValue {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<i32> for InfoValue {
    fn from(v: i32) -> Self {
        Self::I64(i64::from(v))
    }
}

impl From<f64> for InfoValue {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<&str> for InfoValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for InfoValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Per-variant ordering
    // ========================================================================

    #[test]
    fn i64_orders_numerically() {
        let a = InfoValue::from(-3);
        let b = InfoValue::from(7);
        assert_eq!(a.try_cmp(&b).unwrap(), Ordering::Less);
        assert!(a.less_than(&b).unwrap());
        assert!(!b.less_than(&a).unwrap());
    }

    #[test]
    fn f64_uses_total_order() {
        let neg = InfoValue::from(-0.0_f64);
        let pos = InfoValue::from(0.0_f64);
        // total_cmp distinguishes -0.0 from 0.0.
        assert_eq!(neg.try_cmp(&pos).unwrap(), Ordering::Less);

        let nan = InfoValue::from(f64::NAN);
        // NaN is ordered, not poisonous.
        assert_eq!(nan.try_cmp(&nan).unwrap(), Ordering::Equal);
    }

    #[test]
    fn str_orders_lexicographically() {
        let a = InfoValue::from("alpha");
        let b = InfoValue::from("beta");
        assert!(a.less_than(&b).unwrap());
    }

    // ========================================================================
    // Custom values
    // ========================================================================

    struct Capacity(u64);

    impl Ordered for Capacity {
        fn type_name(&self) -> &'static str {
            "capacity"
        }

        fn ordering_key(&self) -> Vec<u8> {
            // Big-endian keeps numeric order under byte comparison.
            self.0.to_be_bytes().to_vec()
        }
    }

    #[test]
    fn custom_values_order_by_key_bytes() {
        let small = InfoValue::from_ordered(&Capacity(5));
        let large = InfoValue::from_ordered(&Capacity(1_000_000));
        assert!(small.less_than(&large).unwrap());
    }

    #[test]
    fn custom_values_require_matching_type_name() {
        struct Other;
        impl Ordered for Other {
            fn type_name(&self) -> &'static str {
                "other"
            }
            fn ordering_key(&self) -> Vec<u8> {
                vec![0]
            }
        }

        let a = InfoValue::from_ordered(&Capacity(1));
        let b = InfoValue::from_ordered(&Other);
        let err = a.try_cmp(&b).unwrap_err();
        assert!(matches!(err, ValueError::TypeMismatch { .. }));
    }

    // ========================================================================
    // Cross-variant comparison is an error
    // ========================================================================

    #[test]
    fn cross_variant_comparison_is_type_mismatch() {
        let int = InfoValue::from(1);
        let float = InfoValue::from(1.0);
        let err = int.try_cmp(&float).unwrap_err();
        assert_eq!(
            err,
            ValueError::TypeMismatch {
                left: "i64".to_string(),
                right: "f64".to_string(),
            }
        );
    }

    #[test]
    fn kind_labels_include_custom_type_name() {
        let v = InfoValue::from_ordered(&Capacity(1));
        assert_eq!(v.kind(), "custom(capacity)");
    }
}
