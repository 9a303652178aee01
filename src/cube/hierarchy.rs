use std::fmt;

use crate::cube::schema::Dimension;
use crate::cube::{CubeError, CubeResult};

/// Registered groupings. Each carries its fixed, ordered level list, so no
/// caller-supplied column name ever reaches the aggregation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hierarchy {
    Anio,
    Producto,
    Proyecto,
    AnioProducto,
    ProyectoAnio,
}

impl Hierarchy {
    pub const ALL: [Hierarchy; 5] = [
        Hierarchy::Anio,
        Hierarchy::Producto,
        Hierarchy::Proyecto,
        Hierarchy::AnioProducto,
        Hierarchy::ProyectoAnio,
    ];

    /// Request key, e.g. `Anio_Producto`
    pub fn key(self) -> &'static str {
        match self {
            Hierarchy::Anio => "Anio",
            Hierarchy::Producto => "Producto",
            Hierarchy::Proyecto => "Proyecto",
            Hierarchy::AnioProducto => "Anio_Producto",
            Hierarchy::ProyectoAnio => "Proyecto_Anio",
        }
    }

    /// Group levels, outermost first. Order is significant.
    pub fn levels(self) -> &'static [Dimension] {
        match self {
            Hierarchy::Anio => &[Dimension::Anio],
            Hierarchy::Producto => &[Dimension::Producto],
            Hierarchy::Proyecto => &[Dimension::Proyecto],
            Hierarchy::AnioProducto => &[Dimension::Anio, Dimension::Producto],
            Hierarchy::ProyectoAnio => &[Dimension::Proyecto, Dimension::Anio],
        }
    }

    pub fn columns(self) -> Vec<&'static str> {
        self.levels().iter().map(|d| d.column()).collect()
    }
}

impl fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Strips surrounding whitespace plus BOM, zero-width and no-break spaces
/// picked up in transport.
pub fn clean_key(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '\u{feff}' | '\u{200b}' | '\u{00a0}'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Single source of truth for valid grouping keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyRegistry {
    entries: Vec<Hierarchy>,
}

impl HierarchyRegistry {
    pub fn new() -> Self {
        HierarchyRegistry {
            entries: Hierarchy::ALL.to_vec(),
        }
    }

    /// Resolves a request key to its hierarchy.
    ///
    /// # Errors
    /// [`CubeError::InvalidHierarchy`] when the cleaned key matches no entry;
    /// the error lists every valid key.
    pub fn resolve(&self, key: &str) -> CubeResult<Hierarchy> {
        let cleaned = clean_key(key);
        self.entries
            .iter()
            .copied()
            .find(|h| h.key() == cleaned)
            .ok_or_else(|| CubeError::InvalidHierarchy {
                key: cleaned,
                valid: self.keys().into_iter().map(str::to_string).collect(),
            })
    }

    /// Valid keys in registration order
    pub fn keys(&self) -> Vec<&'static str> {
        self.entries.iter().map(|h| h.key()).collect()
    }

    pub fn hierarchies(&self) -> &[Hierarchy] {
        &self.entries
    }
}

impl Default for HierarchyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
