//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. A line
/// item priced at `2 x 50` is the same line item wherever it appears; an
/// invoice with number `AB12345678` is an aggregate, not a value.
///
/// To "modify" a value object, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
