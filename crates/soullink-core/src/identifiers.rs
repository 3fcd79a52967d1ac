// crates/soullink-core/src/identifiers.rs
// ============================================================================
// Module: SoulLink Identifiers
// Description: Canonical opaque identifiers for runs, players, events, links,
//              and the reference catalog.
// Purpose: Provide strongly typed, serializable identifiers with stable
//          wire forms and no accidental cross-kind mixing.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Run-scoped entities (runs, players, events, soul links) are identified by
//! UUIDs; reference-catalog entities (species, routes) and family groupings
//! use small stable integers, matching the original game data's numeric IDs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: UUID-backed identifiers
// ============================================================================

/// Identifies a single SoulLink run.
///
/// # Invariants
/// - Immutable for the lifetime of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

/// Identifies a player within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

/// Identifies a single appended event, unique within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

/// Identifies a soul link (route-scoped grouping of linked players).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(Uuid);

macro_rules! uuid_identifier {
    ($name:ident) => {
        impl $name {
            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn new(id: Uuid) -> Self {
                Self(id)
            }

            /// Generates a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_identifier!(RunId);
uuid_identifier!(PlayerId);
uuid_identifier!(EventId);
uuid_identifier!(LinkId);

// ============================================================================
// SECTION: Numeric reference-catalog identifiers
// ============================================================================

/// Identifies a route in the reference catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(i64);

/// Identifies a species in the reference catalog (national dex number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesId(i64);

/// Identifies an evolutionary family. Distinct from `SpeciesId`: many
/// species (all stages of an evolution line) share one family ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FamilyId(i64);

macro_rules! numeric_identifier {
    ($name:ident) => {
        impl $name {
            /// Creates an identifier from a raw numeric value.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw numeric value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

numeric_identifier!(RouteId);
numeric_identifier!(SpeciesId);
numeric_identifier!(FamilyId);
