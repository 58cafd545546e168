use std::fmt;

use serde::{Deserialize, Serialize};

use super::{GarbageId, TileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GarbageKind {
    Plastic,
    Oil,
    Chemicals,
}

impl GarbageKind {
    /// Unloading priority, most urgent first.
    pub const BY_PRIORITY: [GarbageKind; 3] =
        [GarbageKind::Chemicals, GarbageKind::Oil, GarbageKind::Plastic];

    pub fn as_str(self) -> &'static str {
        match self {
            GarbageKind::Plastic => "plastic",
            GarbageKind::Oil => "oil",
            GarbageKind::Chemicals => "chemicals",
        }
    }
}

impl fmt::Display for GarbageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Garbage {
    pub id: GarbageId,
    pub kind: GarbageKind,
    pub amount: u32,
    pub(crate) tile: TileId,
}

impl Garbage {
    pub fn new(id: GarbageId, kind: GarbageKind, amount: u32, tile: TileId) -> Self {
        Self {
            id,
            kind,
            amount,
            tile,
        }
    }

    pub fn tile(&self) -> TileId {
        self.tile
    }
}
