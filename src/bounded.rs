//! Capacity-checked inline lists
//!
//! Cluster and group records carry small fixed-capacity arrays (128
//! clusters per group MIP, 128 recorded parents per cluster). `Bounded`
//! keeps those lists growable in memory while refusing to exceed the
//! capacity the serialized record can hold.
//!
//! Author: Moroya Sakamoto

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a push would exceed a [`Bounded`] list's capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("capacity {capacity} exceeded")]
pub struct CapacityError {
    /// Maximum number of elements the list accepts
    pub capacity: usize,
}

/// A `Vec` with a compile-time upper bound on its length
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<T>", into = "Vec<T>")]
#[serde(bound(
    serialize = "T: Clone + Serialize",
    deserialize = "T: Deserialize<'de>"
))]
pub struct Bounded<T, const N: usize> {
    items: Vec<T>,
}

impl<T, const N: usize> Bounded<T, N> {
    /// Maximum number of elements
    pub const CAPACITY: usize = N;

    /// Create an empty list
    #[inline]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append an element, failing when the list is full
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), CapacityError> {
        if self.items.len() >= N {
            return Err(CapacityError { capacity: N });
        }
        self.items.push(value);
        Ok(())
    }

    /// Number of stored elements
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the list is at capacity
    #[inline]
    pub fn is_full(&self) -> bool {
        self.items.len() >= N
    }

    /// Borrow the elements as a slice
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Iterate over the elements
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Remove all elements
    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: PartialEq, const N: usize> Bounded<T, N> {
    /// Append `value` unless it is already present
    pub fn push_unique(&mut self, value: T) -> Result<(), CapacityError> {
        if self.items.contains(&value) {
            return Ok(());
        }
        self.push(value)
    }

    /// Whether `value` is stored
    #[inline]
    pub fn contains(&self, value: &T) -> bool {
        self.items.contains(value)
    }
}

impl<T: Copy + Default, const N: usize> Bounded<T, N> {
    /// Copy into a fixed array padded with `T::default()`, plus the count
    pub fn to_padded(&self) -> ([T; N], u32) {
        let mut out = [T::default(); N];
        out[..self.items.len()].copy_from_slice(&self.items);
        (out, self.items.len() as u32)
    }

    /// Rebuild from a padded array and an explicit count
    pub fn from_padded(values: &[T; N], count: u32) -> Result<Self, CapacityError> {
        let count = count as usize;
        if count > N {
            return Err(CapacityError { capacity: N });
        }
        Ok(Self {
            items: values[..count].to_vec(),
        })
    }
}

impl<T, const N: usize> Default for Bounded<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> From<[Option<T>; N]> for Bounded<T, N> {
    /// Keep the present entries in order; `N` slots always hold them
    fn from(slots: [Option<T>; N]) -> Self {
        Self {
            items: slots.into_iter().flatten().collect(),
        }
    }
}

impl<T, const N: usize> TryFrom<Vec<T>> for Bounded<T, N> {
    type Error = CapacityError;

    fn try_from(items: Vec<T>) -> Result<Self, Self::Error> {
        if items.len() > N {
            return Err(CapacityError { capacity: N });
        }
        Ok(Self { items })
    }
}

impl<T, const N: usize> From<Bounded<T, N>> for Vec<T> {
    fn from(value: Bounded<T, N>) -> Self {
        value.items
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a Bounded<T, N> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T, const N: usize> std::ops::Deref for Bounded<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}
