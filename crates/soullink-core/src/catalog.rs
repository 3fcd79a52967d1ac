// crates/soullink-core/src/catalog.rs
// ============================================================================
// Module: SoulLink Reference Catalog
// Description: Static species/route reference data shape.
// Purpose: Describe the immutable mapping from species to family and route
//          to region that the rest of the system is loaded against.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The reference catalog is authored data (national dex species grouped
//! into evolutionary families, and numbered routes grouped into regions).
//! Loading and distributing this data is out of scope for this repository;
//! these types describe the shape that a loader must produce and that the
//! rules/projection layers consume.

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::FamilyId;
use crate::identifiers::RouteId;
use crate::identifiers::SpeciesId;

/// A single species entry in the reference catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesEntry {
    /// National dex identifier.
    pub species_id: SpeciesId,
    /// Display name.
    pub name: String,
    /// Evolutionary family this species belongs to.
    pub family_id: FamilyId,
}

/// A single route entry in the reference catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Stable route identifier.
    pub route_id: RouteId,
    /// Display label (e.g. "Route 31").
    pub label: String,
    /// Region the route belongs to.
    pub region: String,
}
