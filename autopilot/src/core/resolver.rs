//! Symbolic target resolution against a perception snapshot.

use crate::core::decision::Target;
use crate::core::geometry::Coordinates;
use crate::core::snapshot::Snapshot;

/// Resolve `target` to screen coordinates.
///
/// Coordinates pass through untouched (no bounds check). A symbol matches,
/// case-insensitively as a substring, first against detected text and only
/// then against object names; the first hit in detector order wins.
pub fn resolve(target: &Target, snapshot: &Snapshot) -> Option<Coordinates> {
    match target {
        Target::Coordinates(coords) => Some(*coords),
        Target::Symbol(symbol) => resolve_symbol(symbol, snapshot),
    }
}

fn resolve_symbol(symbol: &str, snapshot: &Snapshot) -> Option<Coordinates> {
    let needle = symbol.to_lowercase();
    snapshot
        .texts
        .iter()
        .find(|text| text.text.to_lowercase().contains(&needle))
        .map(|text| text.quad.center())
        .or_else(|| {
            snapshot
                .objects
                .iter()
                .find(|object| object.name.to_lowercase().contains(&needle))
                .map(|object| object.bbox.center())
        })
}
