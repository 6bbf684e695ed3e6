//! Hex coordinate system using axial coordinates (q, r).
//!
//! This module provides the foundational coordinate types for the board:
//! - `HexCoord`: Identifies individual hex tiles
//! - `VertexCoord`: Identifies corners where municipalities are placed
//! - `EdgeCoord`: Identifies sides where roads are placed
//!
//! Hexes are flat-topped. A physical edge can be written from either of the
//! two hexes that share it, and a physical vertex from any of the three hexes
//! that meet there; all such raw encodings reduce to one canonical form. The
//! canonical representative is always the encoding whose direction lies in
//! the upper half of the compass (`NorthWest`/`North`/`NorthEast` for edges,
//! `NorthWest`/`NorthEast` for vertices), so canonicalization is pure integer
//! arithmetic over the six axial direction vectors.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Direction of an edge relative to a flat-topped hex.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum EdgeDirection {
    /// Top-left edge
    NorthWest,
    /// Top edge
    North,
    /// Top-right edge
    NorthEast,
    /// Bottom-right edge
    SouthEast,
    /// Bottom edge
    South,
    /// Bottom-left edge
    SouthWest,
}

impl EdgeDirection {
    /// All edge directions in clockwise order starting from NorthWest.
    pub const ALL: [EdgeDirection; 6] = [
        EdgeDirection::NorthWest,
        EdgeDirection::North,
        EdgeDirection::NorthEast,
        EdgeDirection::SouthEast,
        EdgeDirection::South,
        EdgeDirection::SouthWest,
    ];

    /// The direction pointing the opposite way.
    pub fn opposite(self) -> EdgeDirection {
        match self {
            EdgeDirection::NorthWest => EdgeDirection::SouthEast,
            EdgeDirection::North => EdgeDirection::South,
            EdgeDirection::NorthEast => EdgeDirection::SouthWest,
            EdgeDirection::SouthEast => EdgeDirection::NorthWest,
            EdgeDirection::South => EdgeDirection::North,
            EdgeDirection::SouthWest => EdgeDirection::NorthEast,
        }
    }

    /// Whether this direction is in the canonical upper half.
    pub fn is_upper(self) -> bool {
        matches!(
            self,
            EdgeDirection::NorthWest | EdgeDirection::North | EdgeDirection::NorthEast
        )
    }
}

/// Direction of a vertex (corner) relative to a flat-topped hex.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum VertexDirection {
    /// Left corner
    West,
    /// Top-left corner
    NorthWest,
    /// Top-right corner
    NorthEast,
    /// Right corner
    East,
    /// Bottom-right corner
    SouthEast,
    /// Bottom-left corner
    SouthWest,
}

impl VertexDirection {
    /// All vertex directions.
    pub const ALL: [VertexDirection; 6] = [
        VertexDirection::West,
        VertexDirection::NorthWest,
        VertexDirection::NorthEast,
        VertexDirection::East,
        VertexDirection::SouthEast,
        VertexDirection::SouthWest,
    ];

    /// Whether this direction is in the canonical upper half.
    pub fn is_upper(self) -> bool {
        matches!(self, VertexDirection::NorthWest | VertexDirection::NorthEast)
    }
}

/// Axial coordinate for the hex grid.
///
/// - `q` increases going southeast (column)
/// - `r` increases going south (row)
/// - The implicit third coordinate satisfies q + r + s = 0
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct HexCoord {
    /// Column (increases going southeast)
    pub q: i32,
    /// Row (increases going south)
    pub r: i32,
}

impl HexCoord {
    /// The hex at the center of the board.
    pub const ORIGIN: HexCoord = HexCoord { q: 0, r: 0 };

    /// Create a new hex coordinate.
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// The implicit third coordinate (s = -q - r).
    pub const fn s(&self) -> i32 {
        -self.q - self.r
    }

    /// Get the neighbor across a specific edge.
    pub fn neighbor(&self, direction: EdgeDirection) -> HexCoord {
        match direction {
            EdgeDirection::NorthWest => HexCoord::new(self.q - 1, self.r),
            EdgeDirection::North => HexCoord::new(self.q, self.r - 1),
            EdgeDirection::NorthEast => HexCoord::new(self.q + 1, self.r - 1),
            EdgeDirection::SouthEast => HexCoord::new(self.q + 1, self.r),
            EdgeDirection::South => HexCoord::new(self.q, self.r + 1),
            EdgeDirection::SouthWest => HexCoord::new(self.q - 1, self.r + 1),
        }
    }

    /// The six neighboring hexes in clockwise order starting from NorthWest.
    pub fn neighbors(&self) -> [HexCoord; 6] {
        EdgeDirection::ALL.map(|dir| self.neighbor(dir))
    }

    /// Distance to another hex in hex steps.
    pub fn distance_to(&self, other: &HexCoord) -> u32 {
        let dq = (self.q - other.q).abs();
        let dr = (self.r - other.r).abs();
        let ds = (self.s() - other.s()).abs();
        ((dq + dr + ds) / 2) as u32
    }

    /// Distance from the center of the board.
    pub fn distance_from_center(&self) -> u32 {
        self.distance_to(&HexCoord::ORIGIN)
    }

    /// Get all six vertices of this hex, in canonical form.
    pub fn vertices(&self) -> [VertexCoord; 6] {
        VertexDirection::ALL.map(|dir| VertexCoord::new(*self, dir))
    }

    /// Get all six edges of this hex, in canonical form.
    pub fn edges(&self) -> [EdgeCoord; 6] {
        EdgeDirection::ALL.map(|dir| EdgeCoord::new(*self, dir))
    }

    /// Number of hexes within `radius` steps of the center: 1 + 3r(r+1).
    pub const fn count_within_radius(radius: u32) -> usize {
        (1 + 3 * radius * (radius + 1)) as usize
    }

    /// Enumerate every hex within `radius` steps of the center as a clockwise
    /// outward spiral: the origin first, then ring 1, ring 2, and so on. Each
    /// ring starts at its northernmost hex.
    pub fn hexes_within_radius(radius: u32) -> Vec<HexCoord> {
        let mut out = Vec::with_capacity(Self::count_within_radius(radius));
        out.push(HexCoord::ORIGIN);
        for ring in 1..=radius as i32 {
            // Walk the ring clockwise from (0, -ring).
            let mut cursor = HexCoord::new(0, -ring);
            let walk = [
                EdgeDirection::SouthEast,
                EdgeDirection::South,
                EdgeDirection::SouthWest,
                EdgeDirection::NorthWest,
                EdgeDirection::North,
                EdgeDirection::NorthEast,
            ];
            for dir in walk {
                for _ in 0..ring {
                    out.push(cursor);
                    cursor = cursor.neighbor(dir);
                }
            }
        }
        out
    }
}

/// Vertex coordinate - identifies a corner where up to 3 hexes meet.
///
/// Municipalities are built on vertices. Constructors canonicalize, so two
/// `VertexCoord`s compare equal exactly when they name the same physical
/// corner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VertexCoord {
    /// The hex this vertex is expressed from (canonical form)
    pub hex: HexCoord,
    /// Which corner of the hex
    pub direction: VertexDirection,
}

impl VertexCoord {
    /// Create a new vertex coordinate (automatically canonicalized).
    pub fn new(hex: HexCoord, direction: VertexDirection) -> Self {
        Self { hex, direction }.canonical()
    }

    /// Get the canonical form of this vertex coordinate.
    ///
    /// The upper-half corners (NorthWest, NorthEast) are already canonical;
    /// the other four are rewritten to the NW/NE corner of the neighbor that
    /// shares the same physical point.
    pub fn canonical(self) -> Self {
        match self.direction {
            VertexDirection::NorthWest | VertexDirection::NorthEast => self,
            VertexDirection::East => Self {
                hex: self.hex.neighbor(EdgeDirection::SouthEast),
                direction: VertexDirection::NorthWest,
            },
            VertexDirection::West => Self {
                hex: self.hex.neighbor(EdgeDirection::SouthWest),
                direction: VertexDirection::NorthEast,
            },
            VertexDirection::SouthEast => Self {
                hex: self.hex.neighbor(EdgeDirection::South),
                direction: VertexDirection::NorthEast,
            },
            VertexDirection::SouthWest => Self {
                hex: self.hex.neighbor(EdgeDirection::South),
                direction: VertexDirection::NorthWest,
            },
        }
    }

    /// Get the 3 hexes that touch this vertex.
    pub fn touching_hexes(&self) -> [HexCoord; 3] {
        let h = self.hex;
        match self.direction {
            VertexDirection::West => [
                h,
                h.neighbor(EdgeDirection::NorthWest),
                h.neighbor(EdgeDirection::SouthWest),
            ],
            VertexDirection::NorthWest => [
                h,
                h.neighbor(EdgeDirection::North),
                h.neighbor(EdgeDirection::NorthWest),
            ],
            VertexDirection::NorthEast => [
                h,
                h.neighbor(EdgeDirection::North),
                h.neighbor(EdgeDirection::NorthEast),
            ],
            VertexDirection::East => [
                h,
                h.neighbor(EdgeDirection::NorthEast),
                h.neighbor(EdgeDirection::SouthEast),
            ],
            VertexDirection::SouthEast => [
                h,
                h.neighbor(EdgeDirection::SouthEast),
                h.neighbor(EdgeDirection::South),
            ],
            VertexDirection::SouthWest => [
                h,
                h.neighbor(EdgeDirection::SouthWest),
                h.neighbor(EdgeDirection::South),
            ],
        }
    }

    /// Get the 3 edges that connect to this vertex, in canonical form.
    pub fn touching_edges(&self) -> [EdgeCoord; 3] {
        let h = self.hex;
        let raw = match self.direction {
            VertexDirection::West => [
                (h, EdgeDirection::NorthWest),
                (h, EdgeDirection::SouthWest),
                (h.neighbor(EdgeDirection::NorthWest), EdgeDirection::South),
            ],
            VertexDirection::NorthWest => [
                (h, EdgeDirection::North),
                (h, EdgeDirection::NorthWest),
                (h.neighbor(EdgeDirection::North), EdgeDirection::SouthWest),
            ],
            VertexDirection::NorthEast => [
                (h, EdgeDirection::North),
                (h, EdgeDirection::NorthEast),
                (h.neighbor(EdgeDirection::North), EdgeDirection::SouthEast),
            ],
            VertexDirection::East => [
                (h, EdgeDirection::NorthEast),
                (h, EdgeDirection::SouthEast),
                (h.neighbor(EdgeDirection::NorthEast), EdgeDirection::South),
            ],
            VertexDirection::SouthEast => [
                (h, EdgeDirection::SouthEast),
                (h, EdgeDirection::South),
                (h.neighbor(EdgeDirection::SouthEast), EdgeDirection::SouthWest),
            ],
            VertexDirection::SouthWest => [
                (h, EdgeDirection::South),
                (h, EdgeDirection::SouthWest),
                (h.neighbor(EdgeDirection::SouthWest), EdgeDirection::SouthEast),
            ],
        };
        raw.map(|(hex, dir)| EdgeCoord::new(hex, dir))
    }

    /// Get the 3 vertices connected to this one by exactly one edge.
    ///
    /// This is the adjacency the distance rule is checked against.
    pub fn adjacent_vertices(&self) -> [VertexCoord; 3] {
        self.touching_edges().map(|edge| {
            let [a, b] = edge.endpoints();
            if a == *self {
                b
            } else {
                a
            }
        })
    }
}

/// Edge coordinate - identifies a side of a hex where roads are built.
///
/// Each edge is shared by exactly 2 hexes. Constructors canonicalize.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EdgeCoord {
    /// The hex this edge is expressed from (canonical form)
    pub hex: HexCoord,
    /// Which side of the hex
    pub direction: EdgeDirection,
}

impl EdgeCoord {
    /// Create a new edge coordinate (automatically canonicalized).
    pub fn new(hex: HexCoord, direction: EdgeDirection) -> Self {
        Self { hex, direction }.canonical()
    }

    /// Get the canonical form of this edge coordinate.
    ///
    /// Upper-half directions (NorthWest, North, NorthEast) are canonical; a
    /// lower-half encoding is rewritten as the opposite side of the neighbor
    /// across the edge.
    pub fn canonical(self) -> Self {
        if self.direction.is_upper() {
            self
        } else {
            Self {
                hex: self.hex.neighbor(self.direction),
                direction: self.direction.opposite(),
            }
        }
    }

    /// Get the 2 hexes that share this edge.
    pub fn touching_hexes(&self) -> [HexCoord; 2] {
        [self.hex, self.hex.neighbor(self.direction)]
    }

    /// Get the 2 vertices at the endpoints of this edge, in canonical form.
    pub fn endpoints(&self) -> [VertexCoord; 2] {
        let flanks = match self.direction {
            EdgeDirection::NorthWest => (VertexDirection::West, VertexDirection::NorthWest),
            EdgeDirection::North => (VertexDirection::NorthWest, VertexDirection::NorthEast),
            EdgeDirection::NorthEast => (VertexDirection::NorthEast, VertexDirection::East),
            EdgeDirection::SouthEast => (VertexDirection::East, VertexDirection::SouthEast),
            EdgeDirection::South => (VertexDirection::SouthEast, VertexDirection::SouthWest),
            EdgeDirection::SouthWest => (VertexDirection::SouthWest, VertexDirection::West),
        };
        [
            VertexCoord::new(self.hex, flanks.0),
            VertexCoord::new(self.hex, flanks.1),
        ]
    }

    /// Get edges that share a vertex with this edge (for road connectivity).
    pub fn adjacent_edges(&self) -> Vec<EdgeCoord> {
        let mut adjacent = HashSet::new();
        for vertex in self.endpoints() {
            for edge in vertex.touching_edges() {
                if edge != *self {
                    adjacent.insert(edge);
                }
            }
        }
        adjacent.into_iter().collect()
    }
}
