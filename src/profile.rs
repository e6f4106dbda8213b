//! Ordered catalog of shape configurations to request.
//!
//! The catalog encodes a greedy best-first policy: the largest configuration
//! is always tried before settling for a smaller one.

use std::fmt;

use thiserror::Error;

/// A named CPU and memory configuration requested from the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceProfile {
    /// Number of OCPUs.
    pub cpu_count: u32,
    /// Memory size in gigabytes.
    pub memory_size_gb: u32,
    /// Human readable label used in logs and the persisted result.
    pub label: String,
}

impl ResourceProfile {
    /// Creates a profile.
    #[must_use]
    pub fn new(cpu_count: u32, memory_size_gb: u32, label: impl Into<String>) -> Self {
        Self {
            cpu_count,
            memory_size_gb,
            label: label.into(),
        }
    }
}

impl fmt::Display for ResourceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} OCPU / {} GB)",
            self.label, self.cpu_count, self.memory_size_gb
        )
    }
}

/// Errors raised when building a catalog.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CatalogError {
    /// A catalog needs at least one profile to make progress.
    #[error("profile catalog must contain at least one profile")]
    Empty,
}

/// Read-only, ordered list of profiles, most desirable first.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProfileCatalog {
    profiles: Vec<ResourceProfile>,
}

impl ProfileCatalog {
    /// Builds a catalog from profiles already sorted by desirability.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Empty`] when `profiles` is empty.
    pub fn new(profiles: Vec<ResourceProfile>) -> Result<Self, CatalogError> {
        if profiles.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { profiles })
    }

    /// The always-free ARM allowance, from the full 4 OCPU / 24 GB down to
    /// the smallest usable slice.
    #[must_use]
    pub fn free_tier() -> Self {
        Self {
            profiles: vec![
                ResourceProfile::new(4, 24, "Full Free Tier"),
                ResourceProfile::new(2, 12, "Medium"),
                ResourceProfile::new(1, 6, "Minimum"),
            ],
        }
    }

    /// Iterates profiles in priority order.
    pub fn iter(&self) -> std::slice::Iter<'_, ResourceProfile> {
        self.profiles.iter()
    }

    /// Returns the profile at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ResourceProfile> {
        self.profiles.get(index)
    }

    /// Number of profiles in one pass.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Always `false` for a constructed catalog.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl<'a> IntoIterator for &'a ProfileCatalog {
    type Item = &'a ResourceProfile;
    type IntoIter = std::slice::Iter<'a, ResourceProfile>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
