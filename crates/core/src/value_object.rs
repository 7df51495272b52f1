//! Value object trait: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity**; they are defined entirely
//! by their attribute values. Two value objects with the same values are considered equal.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. In this crate they are
/// also the only way to obtain a field that passed its format check: the
/// constructors (`parse` / `new`) validate, and there is no other way in.
///
/// - `EmailAddress`, `PhoneNumber`, `Salary` are value objects
/// - `Employee { id: EmployeeId(..), .. }` is an entity
///
/// ```ignore
/// let a = EmailAddress::parse("a@b.com")?;
/// let b = EmailAddress::parse("a@b.com")?;
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
