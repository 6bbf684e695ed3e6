//! Game board: tiles, ports, roads, municipalities and the robber.
//!
//! The board owns every map from canonical address to occupant, the legality
//! predicates the rule engine consults before mutating, and the
//! longest-route search. Addresses are canonicalized by the coordinate
//! constructors, so each physical edge/vertex has exactly one key here.

use crate::hex::{EdgeCoord, HexCoord, VertexCoord};
use crate::ledger::ResourceKind;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Seat identifier (0..N-1 for an N-player game).
pub type PlayerId = u8;

/// Longest-route award requires a route of at least this many edges.
pub const MIN_LONGEST_ROUTE: u32 = 4;

/// Raised when an address lies outside the board radius. Callers treat it as
/// a definitive "not legal here".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("address lies outside the board radius {radius}")]
pub struct BoundsError {
    pub radius: u32,
}

/// Raised during board construction when the supplied layout is
/// contradictory or incomplete. Fatal: construction aborts.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ConstructionError {
    #[error("two tiles occupy hex ({0}, {1})")]
    DuplicateTile(i32, i32),

    #[error("no tile supplied for hex ({0}, {1})")]
    MissingTile(i32, i32),

    #[error("tile at ({0}, {1}) lies outside the board radius")]
    TileOutsideRadius(i32, i32),

    #[error("expected exactly one desert tile, found {0}")]
    DesertCount(usize),

    #[error("tile at ({0}, {1}) carries an invalid production number")]
    BadProductionNumber(i32, i32),

    #[error("two ports occupy the same edge")]
    DuplicatePort,

    #[error("port is not on a border edge of the board")]
    MisplacedPort,

    #[error("robber start hex ({0}, {1}) is not on the board")]
    UnknownRobberHex(i32, i32),

    #[error("a game needs 2-4 seats, got {0}")]
    BadSeatCount(u8),
}

/// What a hex tile produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    /// Produces a resource when its number is rolled
    Producing(ResourceKind),
    /// The single desert; produces nothing and repels the robber
    Desert,
}

/// A single hex tile on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Position on the hex grid
    pub coord: HexCoord,
    /// What the tile produces
    pub kind: TileKind,
    /// Dice number that triggers production (2-12 except 7, None for desert)
    pub number: Option<u8>,
}

impl Tile {
    /// Create a producing tile.
    pub fn producing(coord: HexCoord, resource: ResourceKind, number: u8) -> Self {
        Self {
            coord,
            kind: TileKind::Producing(resource),
            number: Some(number),
        }
    }

    /// Create the desert tile.
    pub fn desert(coord: HexCoord) -> Self {
        Self {
            coord,
            kind: TileKind::Desert,
            number: None,
        }
    }

    /// The resource this tile produces, if any.
    pub fn resource(&self) -> Option<ResourceKind> {
        match self.kind {
            TileKind::Producing(r) => Some(r),
            TileKind::Desert => None,
        }
    }
}

/// A maritime trade port on a border edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Port {
    /// 3:1 trade for any resource
    Any,
    /// 2:1 trade for one specific resource
    Only(ResourceKind),
}

impl Port {
    /// The exchange rate of this port.
    pub fn rate(&self) -> u32 {
        match self {
            Port::Any => 3,
            Port::Only(_) => 2,
        }
    }
}

/// A road segment on an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Road {
    pub owner: PlayerId,
}

/// A settlement or city on a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Municipality {
    Settlement(PlayerId),
    City(PlayerId),
}

impl Municipality {
    /// The owning seat.
    pub fn owner(&self) -> PlayerId {
        match self {
            Municipality::Settlement(p) | Municipality::City(p) => *p,
        }
    }

    /// Victory points this municipality is worth.
    pub fn points(&self) -> u32 {
        match self {
            Municipality::Settlement(_) => 1,
            Municipality::City(_) => 2,
        }
    }

    /// Resource cards granted per production hit.
    pub fn multiplier(&self) -> u32 {
        match self {
            Municipality::Settlement(_) => 1,
            Municipality::City(_) => 2,
        }
    }
}

/// A port placement within a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSite {
    pub edge: EdgeCoord,
    pub port: Port,
}

/// Everything needed to construct a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardLayout {
    pub radius: u32,
    pub tiles: Vec<Tile>,
    pub ports: Vec<PortSite>,
    pub robber: HexCoord,
}

impl BoardLayout {
    /// The standard layout: a radius-2 board of 19 tiles with shuffled
    /// terrain and production numbers, the robber on the desert, and nine
    /// ports spread over the border.
    pub fn standard_with_rng<R: Rng>(rng: &mut R) -> Self {
        const RADIUS: u32 = 2;

        // 18 producing tiles plus one desert.
        let mut terrain: Vec<Option<ResourceKind>> = Vec::new();
        for kind in [ResourceKind::Lumber, ResourceKind::Grain, ResourceKind::Wool] {
            terrain.extend(std::iter::repeat(Some(kind)).take(4));
        }
        for kind in [ResourceKind::Ore, ResourceKind::Brick] {
            terrain.extend(std::iter::repeat(Some(kind)).take(3));
        }
        terrain.push(None);
        terrain.shuffle(rng);

        let coords = HexCoord::hexes_within_radius(RADIUS);
        let numbers = Self::shuffled_numbers(&coords, &terrain, rng);

        let mut tiles = Vec::with_capacity(coords.len());
        let mut robber = HexCoord::ORIGIN;
        let mut next_number = numbers.into_iter();
        for (coord, kind) in coords.iter().zip(terrain.iter()) {
            match kind {
                Some(resource) => {
                    let number = next_number.next().expect("one number per producing tile");
                    tiles.push(Tile::producing(*coord, *resource, number));
                }
                None => {
                    robber = *coord;
                    tiles.push(Tile::desert(*coord));
                }
            }
        }

        let ports = Self::spread_ports(RADIUS, &tiles, rng);

        Self {
            radius: RADIUS,
            tiles,
            ports,
            robber,
        }
    }

    /// Shuffle the standard number set, retrying a bounded number of times to
    /// avoid placing 6 next to 8.
    fn shuffled_numbers<R: Rng>(
        coords: &[HexCoord],
        terrain: &[Option<ResourceKind>],
        rng: &mut R,
    ) -> Vec<u8> {
        const MAX_ATTEMPTS: usize = 100;
        let mut numbers: Vec<u8> = vec![2, 3, 3, 4, 4, 5, 5, 6, 6, 8, 8, 9, 9, 10, 10, 11, 11, 12];

        for _ in 0..MAX_ATTEMPTS {
            numbers.shuffle(rng);
            if Self::hot_numbers_separated(coords, terrain, &numbers) {
                return numbers.clone();
            }
        }
        // Rare: accept the last shuffle rather than loop forever.
        numbers
    }

    fn hot_numbers_separated(
        coords: &[HexCoord],
        terrain: &[Option<ResourceKind>],
        numbers: &[u8],
    ) -> bool {
        let mut by_coord: HashMap<HexCoord, u8> = HashMap::new();
        let mut next = numbers.iter();
        for (coord, kind) in coords.iter().zip(terrain.iter()) {
            if kind.is_some() {
                by_coord.insert(*coord, *next.next().expect("number per producing tile"));
            }
        }
        for (coord, &number) in &by_coord {
            if number == 6 || number == 8 {
                for neighbor in coord.neighbors() {
                    if matches!(by_coord.get(&neighbor), Some(&n) if n == 6 || n == 8) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Choose nine border edges spread around the coast and deal the
    /// standard port mix onto them.
    fn spread_ports<R: Rng>(radius: u32, tiles: &[Tile], rng: &mut R) -> Vec<PortSite> {
        let on_board: HashSet<HexCoord> = tiles.iter().map(|t| t.coord).collect();
        let mut border: Vec<EdgeCoord> = Vec::new();
        let mut seen = HashSet::new();
        for tile in tiles {
            if tile.coord.distance_from_center() < radius {
                continue;
            }
            for edge in tile.coord.edges() {
                let outside = edge
                    .touching_hexes()
                    .iter()
                    .filter(|h| !on_board.contains(h))
                    .count();
                if outside == 1 && seen.insert(edge) {
                    border.push(edge);
                }
            }
        }
        // Walk the coast in angular order so a fixed stride spreads the
        // ports instead of clustering them.
        border.sort_by(|a, b| edge_angle(a).total_cmp(&edge_angle(b)));

        let mut mix = vec![
            Port::Any,
            Port::Any,
            Port::Any,
            Port::Any,
            Port::Only(ResourceKind::Brick),
            Port::Only(ResourceKind::Lumber),
            Port::Only(ResourceKind::Ore),
            Port::Only(ResourceKind::Grain),
            Port::Only(ResourceKind::Wool),
        ];
        mix.shuffle(rng);

        let offset = rng.gen_range(0..border.len());
        mix.into_iter()
            .enumerate()
            .map(|(i, port)| PortSite {
                edge: border[(offset + i * border.len() / 9) % border.len()],
                port,
            })
            .collect()
    }
}

/// Screen-space angle of an edge midpoint around the board center, used only
/// to order the coast when spreading ports.
fn edge_angle(edge: &EdgeCoord) -> f64 {
    let [a, b] = edge.touching_hexes();
    let (ax, ay) = hex_center(a);
    let (bx, by) = hex_center(b);
    ((ay + by) / 2.0).atan2((ax + bx) / 2.0)
}

fn hex_center(hex: HexCoord) -> (f64, f64) {
    let x = 1.5 * hex.q as f64;
    let y = 3.0_f64.sqrt() * (hex.r as f64 + hex.q as f64 / 2.0);
    (x, y)
}

/// The complete game board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BoardSnapshot", into = "BoardSnapshot")]
pub struct Board {
    radius: u32,
    tiles: HashMap<HexCoord, Tile>,
    ports: HashMap<EdgeCoord, Port>,
    roads: HashMap<EdgeCoord, Road>,
    municipalities: HashMap<VertexCoord, Municipality>,
    robber: HexCoord,
}

impl Board {
    /// Build a board from a layout, validating it for contradictions.
    pub fn from_layout(layout: BoardLayout) -> Result<Self, ConstructionError> {
        let mut tiles: HashMap<HexCoord, Tile> = HashMap::new();
        for tile in &layout.tiles {
            if tile.coord.distance_from_center() > layout.radius {
                return Err(ConstructionError::TileOutsideRadius(
                    tile.coord.q,
                    tile.coord.r,
                ));
            }
            match tile.kind {
                TileKind::Producing(_) => {
                    if !matches!(tile.number, Some(n) if (2..=12).contains(&n) && n != 7) {
                        return Err(ConstructionError::BadProductionNumber(
                            tile.coord.q,
                            tile.coord.r,
                        ));
                    }
                }
                TileKind::Desert => {
                    if tile.number.is_some() {
                        return Err(ConstructionError::BadProductionNumber(
                            tile.coord.q,
                            tile.coord.r,
                        ));
                    }
                }
            }
            if tiles.insert(tile.coord, *tile).is_some() {
                return Err(ConstructionError::DuplicateTile(tile.coord.q, tile.coord.r));
            }
        }
        for coord in HexCoord::hexes_within_radius(layout.radius) {
            if !tiles.contains_key(&coord) {
                return Err(ConstructionError::MissingTile(coord.q, coord.r));
            }
        }

        let deserts = tiles
            .values()
            .filter(|t| matches!(t.kind, TileKind::Desert))
            .count();
        if deserts != 1 {
            return Err(ConstructionError::DesertCount(deserts));
        }

        let mut ports: HashMap<EdgeCoord, Port> = HashMap::new();
        for site in &layout.ports {
            let edge = site.edge.canonical();
            let inside = edge
                .touching_hexes()
                .iter()
                .filter(|h| tiles.contains_key(h))
                .count();
            if inside != 1 {
                return Err(ConstructionError::MisplacedPort);
            }
            if ports.insert(edge, site.port).is_some() {
                return Err(ConstructionError::DuplicatePort);
            }
        }

        if !tiles.contains_key(&layout.robber) {
            return Err(ConstructionError::UnknownRobberHex(
                layout.robber.q,
                layout.robber.r,
            ));
        }

        Ok(Self {
            radius: layout.radius,
            tiles,
            ports,
            roads: HashMap::new(),
            municipalities: HashMap::new(),
            robber: layout.robber,
        })
    }

    /// Build the standard randomized board.
    pub fn standard_with_rng<R: Rng>(rng: &mut R) -> Self {
        Board::from_layout(BoardLayout::standard_with_rng(rng))
            .expect("standard layout is always well-formed")
    }

    // ==================== Query Methods ====================

    /// The board radius.
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Get a tile by coordinate.
    pub fn tile(&self, coord: &HexCoord) -> Option<&Tile> {
        self.tiles.get(coord)
    }

    /// Iterate over all tiles.
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// The port on an edge, if any.
    pub fn port(&self, edge: &EdgeCoord) -> Option<Port> {
        self.ports.get(&edge.canonical()).copied()
    }

    /// The road on an edge, if any.
    pub fn road(&self, edge: &EdgeCoord) -> Option<Road> {
        self.roads.get(&edge.canonical()).copied()
    }

    /// The municipality on a vertex, if any.
    pub fn municipality(&self, vertex: &VertexCoord) -> Option<Municipality> {
        self.municipalities.get(&vertex.canonical()).copied()
    }

    /// Iterate over all placed municipalities.
    pub fn municipalities(&self) -> impl Iterator<Item = (&VertexCoord, &Municipality)> {
        self.municipalities.iter()
    }

    /// Iterate over all placed roads.
    pub fn roads(&self) -> impl Iterator<Item = (&EdgeCoord, &Road)> {
        self.roads.iter()
    }

    /// The robber's current hex.
    pub fn robber(&self) -> HexCoord {
        self.robber
    }

    /// The desert hex.
    pub fn desert(&self) -> HexCoord {
        self.tiles
            .values()
            .find(|t| matches!(t.kind, TileKind::Desert))
            .map(|t| t.coord)
            .expect("construction guarantees one desert")
    }

    /// Every vertex of the board, sorted.
    pub fn all_vertices(&self) -> Vec<VertexCoord> {
        let mut vertices: Vec<VertexCoord> = self
            .tiles
            .keys()
            .flat_map(|h| h.vertices())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        vertices.sort();
        vertices
    }

    /// Every edge of the board, sorted.
    pub fn all_edges(&self) -> Vec<EdgeCoord> {
        let mut edges: Vec<EdgeCoord> = self
            .tiles
            .keys()
            .flat_map(|h| h.edges())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        edges.sort();
        edges
    }

    fn ensure_hex(&self, hex: &HexCoord) -> Result<(), BoundsError> {
        if hex.distance_from_center() > self.radius {
            return Err(BoundsError {
                radius: self.radius,
            });
        }
        Ok(())
    }

    fn ensure_edge(&self, edge: &EdgeCoord) -> Result<(), BoundsError> {
        if edge.touching_hexes().iter().any(|h| self.tiles.contains_key(h)) {
            Ok(())
        } else {
            Err(BoundsError {
                radius: self.radius,
            })
        }
    }

    fn ensure_vertex(&self, vertex: &VertexCoord) -> Result<(), BoundsError> {
        if vertex
            .touching_hexes()
            .iter()
            .any(|h| self.tiles.contains_key(h))
        {
            Ok(())
        } else {
            Err(BoundsError {
                radius: self.radius,
            })
        }
    }

    // ==================== Legality Predicates ====================

    /// Whether `player` may place a road on `edge`: the edge is free and the
    /// road attaches to the player's network. An opposing municipality on the
    /// connecting vertex severs the attachment.
    pub fn road_allowed(&self, player: PlayerId, edge: &EdgeCoord) -> Result<bool, BoundsError> {
        let edge = edge.canonical();
        self.ensure_edge(&edge)?;
        if self.roads.contains_key(&edge) {
            return Ok(false);
        }
        for vertex in edge.endpoints() {
            match self.municipalities.get(&vertex) {
                Some(m) if m.owner() == player => return Ok(true),
                Some(_) => continue,
                None => {
                    let connected = vertex.touching_edges().iter().any(|adj| {
                        *adj != edge && matches!(self.roads.get(adj), Some(r) if r.owner == player)
                    });
                    if connected {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Whether `player` may place a settlement on `vertex`: the vertex is
    /// free, no municipality sits within one edge (the distance rule), and,
    /// when `needs_road`, one of the player's roads reaches the vertex.
    pub fn settlement_allowed(
        &self,
        player: PlayerId,
        vertex: &VertexCoord,
        needs_road: bool,
    ) -> Result<bool, BoundsError> {
        let vertex = vertex.canonical();
        self.ensure_vertex(&vertex)?;
        if self.municipalities.contains_key(&vertex) {
            return Ok(false);
        }
        for adjacent in vertex.adjacent_vertices() {
            if self.municipalities.contains_key(&adjacent) {
                return Ok(false);
            }
        }
        if needs_road {
            let reached = vertex
                .touching_edges()
                .iter()
                .any(|e| matches!(self.roads.get(e), Some(r) if r.owner == player));
            if !reached {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether `player` may upgrade the settlement on `vertex` to a city.
    pub fn city_allowed(&self, player: PlayerId, vertex: &VertexCoord) -> Result<bool, BoundsError> {
        let vertex = vertex.canonical();
        self.ensure_vertex(&vertex)?;
        Ok(self.municipalities.get(&vertex) == Some(&Municipality::Settlement(player)))
    }

    /// Whether the robber may be moved to `hex`: any board hex other than
    /// its current hex and other than the desert.
    pub fn robber_target_allowed(&self, hex: &HexCoord) -> Result<bool, BoundsError> {
        self.ensure_hex(hex)?;
        if *hex == self.robber {
            return Ok(false);
        }
        match self.tiles.get(hex) {
            Some(tile) => Ok(!matches!(tile.kind, TileKind::Desert)),
            None => Ok(false),
        }
    }

    /// All legal settlement spots for a player, sorted.
    pub fn settlement_spots(&self, player: PlayerId, needs_road: bool) -> Vec<VertexCoord> {
        self.all_vertices()
            .into_iter()
            .filter(|v| self.settlement_allowed(player, v, needs_road) == Ok(true))
            .collect()
    }

    /// All legal road spots for a player, sorted.
    pub fn road_spots(&self, player: PlayerId) -> Vec<EdgeCoord> {
        self.all_edges()
            .into_iter()
            .filter(|e| self.road_allowed(player, e) == Ok(true))
            .collect()
    }

    /// All of the player's settlements eligible for a city upgrade, sorted.
    pub fn city_spots(&self, player: PlayerId) -> Vec<VertexCoord> {
        let mut spots: Vec<VertexCoord> = self
            .municipalities
            .iter()
            .filter(|(_, m)| **m == Municipality::Settlement(player))
            .map(|(v, _)| *v)
            .collect();
        spots.sort();
        spots
    }

    // ==================== Mutation Methods ====================

    /// Place a road (assumes legality already checked).
    pub fn place_road(&mut self, edge: EdgeCoord, player: PlayerId) {
        self.roads.insert(edge.canonical(), Road { owner: player });
    }

    /// Place a settlement (assumes legality already checked).
    pub fn place_settlement(&mut self, vertex: VertexCoord, player: PlayerId) {
        self.municipalities
            .insert(vertex.canonical(), Municipality::Settlement(player));
    }

    /// Upgrade a settlement to a city (assumes legality already checked).
    pub fn upgrade_city(&mut self, vertex: VertexCoord, player: PlayerId) {
        self.municipalities
            .insert(vertex.canonical(), Municipality::City(player));
    }

    /// Move the robber (assumes legality already checked).
    pub fn move_robber(&mut self, hex: HexCoord) {
        self.robber = hex;
    }

    // ==================== Production ====================

    /// Resources produced by a roll, as (seat, kind, amount) sorted by seat
    /// then kind. Tiles under the robber produce nothing.
    pub fn yield_for_roll(&self, roll: u8) -> Vec<(PlayerId, ResourceKind, u32)> {
        let mut gains: HashMap<(PlayerId, ResourceKind), u32> = HashMap::new();
        for tile in self.tiles.values() {
            if tile.number != Some(roll) || tile.coord == self.robber {
                continue;
            }
            let resource = match tile.resource() {
                Some(r) => r,
                None => continue,
            };
            for vertex in tile.coord.vertices() {
                if let Some(m) = self.municipalities.get(&vertex) {
                    *gains.entry((m.owner(), resource)).or_insert(0) += m.multiplier();
                }
            }
        }
        let mut out: Vec<(PlayerId, ResourceKind, u32)> = gains
            .into_iter()
            .map(|((seat, kind), n)| (seat, kind, n))
            .collect();
        out.sort();
        out
    }

    /// Seats with a municipality on a corner of `hex`, sorted.
    pub fn players_adjacent_to(&self, hex: &HexCoord) -> Vec<PlayerId> {
        let mut seats: Vec<PlayerId> = hex
            .vertices()
            .iter()
            .filter_map(|v| self.municipalities.get(v).map(|m| m.owner()))
            .collect();
        seats.sort_unstable();
        seats.dedup();
        seats
    }

    /// The maritime rate for a player trading away `kind`: 2 with a matching
    /// port, 3 with any-goods port access, otherwise 4.
    pub fn port_rate(&self, player: PlayerId, kind: ResourceKind) -> u32 {
        let mut best = 4;
        for (edge, port) in &self.ports {
            let reached = edge.endpoints().iter().any(|v| {
                matches!(self.municipalities.get(v), Some(m) if m.owner() == player)
            });
            if !reached {
                continue;
            }
            match port {
                Port::Only(k) if *k == kind => return 2,
                Port::Any => best = best.min(3),
                Port::Only(_) => {}
            }
        }
        best
    }

    // ==================== Longest Route ====================

    /// Length of the player's longest simple route.
    ///
    /// Vertices touched by the player's roads are bucketed by owned degree;
    /// the search is seeded from degree-1 and degree-3 vertices first (the
    /// likely endpoints and branch points), then degree-2. A branch ends the
    /// moment it reaches a vertex holding an opposing municipality.
    pub fn longest_route(&self, player: PlayerId) -> u32 {
        let owned: HashSet<EdgeCoord> = self
            .roads
            .iter()
            .filter(|(_, r)| r.owner == player)
            .map(|(e, _)| *e)
            .collect();
        if owned.is_empty() {
            return 0;
        }

        let mut at_vertex: HashMap<VertexCoord, Vec<EdgeCoord>> = HashMap::new();
        for edge in &owned {
            for vertex in edge.endpoints() {
                at_vertex.entry(vertex).or_default().push(*edge);
            }
        }

        let mut seeds: Vec<VertexCoord> = Vec::with_capacity(at_vertex.len());
        for wanted in [1usize, 3, 2] {
            let mut bucket: Vec<VertexCoord> = at_vertex
                .iter()
                .filter(|(_, edges)| edges.len() == wanted)
                .map(|(v, _)| *v)
                .collect();
            bucket.sort();
            seeds.extend(bucket);
        }

        let mut best = 0;
        let mut visited: HashSet<EdgeCoord> = HashSet::new();
        for seed in seeds {
            best = best.max(self.walk_route(player, seed, &at_vertex, &mut visited));
        }
        best
    }

    fn walk_route(
        &self,
        player: PlayerId,
        from: VertexCoord,
        at_vertex: &HashMap<VertexCoord, Vec<EdgeCoord>>,
        visited: &mut HashSet<EdgeCoord>,
    ) -> u32 {
        let mut best = 0;
        let Some(edges) = at_vertex.get(&from) else {
            return 0;
        };
        for edge in edges {
            if visited.contains(edge) {
                continue;
            }
            visited.insert(*edge);
            let [a, b] = edge.endpoints();
            let next = if a == from { b } else { a };
            // An opposing municipality severs the route at this vertex.
            let hostile = matches!(self.municipalities.get(&next), Some(m) if m.owner() != player);
            let extension = if hostile {
                0
            } else {
                self.walk_route(player, next, at_vertex, visited)
            };
            best = best.max(1 + extension);
            visited.remove(edge);
        }
        best
    }
}

/// Serialization image of [`Board`]: JSON objects cannot key maps by
/// structured addresses, so the maps flatten to sorted placement lists. The
/// sort also makes snapshots byte-stable for identical states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSnapshot {
    radius: u32,
    tiles: Vec<Tile>,
    ports: Vec<PortSite>,
    roads: Vec<(EdgeCoord, Road)>,
    municipalities: Vec<(VertexCoord, Municipality)>,
    robber: HexCoord,
}

impl From<Board> for BoardSnapshot {
    fn from(board: Board) -> Self {
        let mut tiles: Vec<Tile> = board.tiles.into_values().collect();
        tiles.sort_by_key(|t| t.coord);
        let mut ports: Vec<PortSite> = board
            .ports
            .into_iter()
            .map(|(edge, port)| PortSite { edge, port })
            .collect();
        ports.sort_by_key(|p| p.edge);
        let mut roads: Vec<(EdgeCoord, Road)> = board.roads.into_iter().collect();
        roads.sort_by_key(|(e, _)| *e);
        let mut municipalities: Vec<(VertexCoord, Municipality)> =
            board.municipalities.into_iter().collect();
        municipalities.sort_by_key(|(v, _)| *v);
        Self {
            radius: board.radius,
            tiles,
            ports,
            roads,
            municipalities,
            robber: board.robber,
        }
    }
}

impl From<BoardSnapshot> for Board {
    fn from(snapshot: BoardSnapshot) -> Self {
        Self {
            radius: snapshot.radius,
            tiles: snapshot.tiles.into_iter().map(|t| (t.coord, t)).collect(),
            ports: snapshot
                .ports
                .into_iter()
                .map(|p| (p.edge, p.port))
                .collect(),
            roads: snapshot.roads.into_iter().collect(),
            municipalities: snapshot.municipalities.into_iter().collect(),
            robber: snapshot.robber,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hex::{EdgeDirection, VertexDirection};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    /// A radius-2 board of all-grain tiles with the desert in the center and
    /// no ports. Handy when a test needs full control over geometry.
    pub(crate) fn flat_board() -> Board {
        let tiles = HexCoord::hexes_within_radius(2)
            .into_iter()
            .map(|coord| {
                if coord == HexCoord::ORIGIN {
                    Tile::desert(coord)
                } else {
                    Tile::producing(coord, ResourceKind::Grain, 5)
                }
            })
            .collect();
        Board::from_layout(BoardLayout {
            radius: 2,
            tiles,
            ports: Vec::new(),
            robber: HexCoord::ORIGIN,
        })
        .unwrap()
    }

    #[test]
    fn standard_board_composition() {
        let board = Board::standard_with_rng(&mut rng());
        assert_eq!(board.tiles().count(), 19);

        let deserts = board
            .tiles()
            .filter(|t| matches!(t.kind, TileKind::Desert))
            .count();
        assert_eq!(deserts, 1);
        assert_eq!(board.robber(), board.desert());

        let mut number_counts: HashMap<u8, u32> = HashMap::new();
        for tile in board.tiles() {
            if let Some(n) = tile.number {
                *number_counts.entry(n).or_insert(0) += 1;
            }
        }
        assert_eq!(number_counts.get(&2), Some(&1));
        assert_eq!(number_counts.get(&7), None);
        assert_eq!(number_counts.get(&8), Some(&2));
        assert_eq!(number_counts.values().sum::<u32>(), 18);
    }

    #[test]
    fn standard_board_has_nine_spread_ports() {
        let board = Board::standard_with_rng(&mut rng());
        assert_eq!(board.ports.len(), 9);

        let generic = board.ports.values().filter(|p| matches!(p, Port::Any)).count();
        assert_eq!(generic, 4);
        for kind in ResourceKind::ALL {
            assert!(
                board.ports.values().any(|p| *p == Port::Only(kind)),
                "missing 2:1 port for {:?}",
                kind
            );
        }
        for edge in board.ports.keys() {
            let inside = edge
                .touching_hexes()
                .iter()
                .filter(|h| board.tile(h).is_some())
                .count();
            assert_eq!(inside, 1, "ports sit on border edges");
        }
    }

    #[test]
    fn layout_validation_rejects_contradictions() {
        let mut layout = BoardLayout::standard_with_rng(&mut rng());
        let dup = layout.tiles[0];
        layout.tiles.push(dup);
        assert!(matches!(
            Board::from_layout(layout),
            Err(ConstructionError::DuplicateTile(..))
        ));

        let mut layout = BoardLayout::standard_with_rng(&mut rng());
        layout.tiles.pop();
        assert!(matches!(
            Board::from_layout(layout),
            Err(ConstructionError::MissingTile(..))
        ));

        let mut layout = BoardLayout::standard_with_rng(&mut rng());
        layout.robber = HexCoord::new(9, 9);
        assert!(matches!(
            Board::from_layout(layout),
            Err(ConstructionError::UnknownRobberHex(..))
        ));

        let mut layout = BoardLayout::standard_with_rng(&mut rng());
        layout.ports.push(PortSite {
            edge: EdgeCoord::new(HexCoord::ORIGIN, EdgeDirection::North),
            port: Port::Any,
        });
        assert!(matches!(
            Board::from_layout(layout),
            Err(ConstructionError::MisplacedPort)
        ));
    }

    #[test]
    fn distance_rule_blocks_neighbors() {
        let mut board = flat_board();
        let vertex = VertexCoord::new(HexCoord::ORIGIN, VertexDirection::NorthEast);
        assert_eq!(board.settlement_allowed(0, &vertex, false), Ok(true));

        board.place_settlement(vertex, 0);

        for adjacent in vertex.adjacent_vertices() {
            assert_eq!(
                board.settlement_allowed(1, &adjacent, false),
                Ok(false),
                "vertex one edge away must fail the distance rule"
            );
        }
        // Two edges away is fine again.
        let two_away = vertex.adjacent_vertices()[0].adjacent_vertices();
        let far = two_away.iter().find(|v| **v != vertex).unwrap();
        assert_eq!(board.settlement_allowed(1, far, false), Ok(true));
    }

    #[test]
    fn road_needs_network_attachment() {
        let mut board = flat_board();
        let vertex = VertexCoord::new(HexCoord::ORIGIN, VertexDirection::NorthEast);
        let edge = vertex.touching_edges()[0];

        assert_eq!(board.road_allowed(0, &edge), Ok(false));
        board.place_settlement(vertex, 0);
        assert_eq!(board.road_allowed(0, &edge), Ok(true));
        assert_eq!(board.road_allowed(1, &edge), Ok(false));

        board.place_road(edge, 0);
        assert_eq!(board.road_allowed(0, &edge), Ok(false), "edge is occupied");

        // Extending from the far end of the placed road is allowed.
        let far = edge.endpoints().into_iter().find(|v| *v != vertex).unwrap();
        let extension = far
            .touching_edges()
            .into_iter()
            .find(|e| *e != edge)
            .unwrap();
        assert_eq!(board.road_allowed(0, &extension), Ok(true));
    }

    #[test]
    fn opposing_municipality_severs_attachment() {
        let mut board = flat_board();
        let vertex = VertexCoord::new(HexCoord::ORIGIN, VertexDirection::NorthEast);
        let edge = vertex.touching_edges()[0];
        board.place_settlement(vertex, 0);
        board.place_road(edge, 0);

        let far = edge.endpoints().into_iter().find(|v| *v != vertex).unwrap();
        let extension = far
            .touching_edges()
            .into_iter()
            .find(|e| *e != edge)
            .unwrap();
        assert_eq!(board.road_allowed(0, &extension), Ok(true));

        // An enemy settlement on the connecting vertex cuts the link.
        board.place_settlement(far, 1);
        assert_eq!(board.road_allowed(0, &extension), Ok(false));
    }

    #[test]
    fn out_of_bounds_addresses_are_rejected() {
        let board = flat_board();
        let outside = HexCoord::new(5, 0);
        assert!(board.robber_target_allowed(&outside).is_err());
        let far_edge = EdgeCoord::new(HexCoord::new(6, 0), EdgeDirection::North);
        assert!(board.road_allowed(0, &far_edge).is_err());
        let far_vertex = VertexCoord::new(HexCoord::new(6, 0), VertexDirection::NorthEast);
        assert!(board.settlement_allowed(0, &far_vertex, false).is_err());
    }

    #[test]
    fn robber_may_not_return_or_enter_desert() {
        let mut board = flat_board();
        assert_eq!(board.robber_target_allowed(&HexCoord::ORIGIN), Ok(false));

        let target = HexCoord::new(1, 0);
        assert_eq!(board.robber_target_allowed(&target), Ok(true));
        board.move_robber(target);
        assert_eq!(board.robber_target_allowed(&target), Ok(false));
        // Desert stays off limits even after the robber has left it.
        assert_eq!(board.robber_target_allowed(&HexCoord::ORIGIN), Ok(false));
    }

    #[test]
    fn production_counts_municipality_multipliers() {
        let mut board = flat_board();
        // The NE corner of the desert touches two producing tiles.
        let vertex = VertexCoord::new(HexCoord::ORIGIN, VertexDirection::NorthEast);
        board.place_settlement(vertex, 0);

        let gains = board.yield_for_roll(5);
        assert!(gains.contains(&(0, ResourceKind::Grain, 2)));

        board.upgrade_city(vertex, 0);
        let gains = board.yield_for_roll(5);
        assert!(gains.contains(&(0, ResourceKind::Grain, 4)));
    }

    #[test]
    fn robber_blocks_production() {
        let mut board = flat_board();
        let tile = HexCoord::new(1, -1);
        let vertex = tile.vertices()[0];
        board.place_settlement(vertex, 0);
        board.move_robber(tile);

        // The settled vertex touches other producing tiles, but the robbed
        // tile itself must not contribute.
        let total: u32 = board
            .yield_for_roll(5)
            .iter()
            .filter(|(seat, _, _)| *seat == 0)
            .map(|(_, _, n)| *n)
            .sum();
        let touching_producing = vertex
            .touching_hexes()
            .iter()
            .filter(|h| board.tile(h).is_some_and(|t| t.resource().is_some()))
            .count() as u32;
        assert_eq!(total, touching_producing - 1);
    }

    fn chain(board: &Board, start: VertexCoord, length: usize) -> Vec<EdgeCoord> {
        // Walk a non-branching chain of edges away from `start`.
        let mut edges = Vec::new();
        let mut vertex = start;
        let mut last: Option<EdgeCoord> = None;
        while edges.len() < length {
            let next_edge = vertex
                .touching_edges()
                .into_iter()
                .find(|e| {
                    Some(*e) != last
                        && board.ensure_edge(e).is_ok()
                        && !edges.contains(e)
                })
                .expect("board is large enough for the chain");
            let far = next_edge
                .endpoints()
                .into_iter()
                .find(|v| *v != vertex)
                .unwrap();
            edges.push(next_edge);
            last = Some(next_edge);
            vertex = far;
        }
        edges
    }

    #[test]
    fn longest_route_counts_chains() {
        let mut board = flat_board();
        assert_eq!(board.longest_route(0), 0);

        let start = VertexCoord::new(HexCoord::new(-2, 0), VertexDirection::NorthEast);
        let edges = chain(&board, start, 5);
        for (i, edge) in edges.iter().enumerate() {
            board.place_road(*edge, 0);
            assert_eq!(board.longest_route(0), i as u32 + 1);
        }
    }

    #[test]
    fn longest_route_split_by_enemy_municipality() {
        let mut board = flat_board();
        let start = VertexCoord::new(HexCoord::new(-2, 0), VertexDirection::NorthEast);
        let edges = chain(&board, start, 5);
        for edge in &edges {
            board.place_road(*edge, 0);
        }
        assert_eq!(board.longest_route(0), 5);

        // The vertex between edges[2] and edges[3]: 3 edges on one side,
        // 2 on the other.
        let [a, b] = edges[3].endpoints();
        let cut = if edges[2].endpoints().contains(&a) { a } else { b };
        board.place_settlement(cut, 1);
        assert_eq!(board.longest_route(0), 3);
    }

    #[test]
    fn longest_route_follows_branches() {
        let mut board = flat_board();
        // A three-edge path with a one-edge spur off its third vertex, which
        // therefore has owned degree 3.
        let path = [
            EdgeCoord::new(HexCoord::ORIGIN, EdgeDirection::North),
            EdgeCoord::new(HexCoord::ORIGIN, EdgeDirection::NorthEast),
            EdgeCoord::new(HexCoord::new(1, 0), EdgeDirection::North),
        ];
        let spur = EdgeCoord::new(HexCoord::new(1, 0), EdgeDirection::NorthWest);
        for edge in path.iter().chain([&spur]) {
            board.place_road(*edge, 0);
        }
        // Four edges total, but no simple path covers more than three.
        assert_eq!(board.longest_route(0), 3);
    }

    #[test]
    fn longest_route_handles_cycles() {
        let mut board = flat_board();
        // The six edges of one hex form a closed loop.
        for edge in HexCoord::ORIGIN.edges() {
            board.place_road(edge, 0);
        }
        assert_eq!(board.longest_route(0), 6);
    }

    #[test]
    fn port_rates() {
        let mut board = Board::standard_with_rng(&mut rng());
        assert_eq!(board.port_rate(0, ResourceKind::Brick), 4);

        let (edge, port) = board.ports.iter().next().map(|(e, p)| (*e, *p)).unwrap();
        let vertex = edge.endpoints()[0];
        board.municipalities.insert(vertex, Municipality::Settlement(0));

        match port {
            Port::Any => {
                assert_eq!(board.port_rate(0, ResourceKind::Brick), 3);
            }
            Port::Only(kind) => {
                assert_eq!(board.port_rate(0, kind), 2);
            }
        }
        assert_eq!(board.port_rate(1, ResourceKind::Brick), 4);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut board = Board::standard_with_rng(&mut rng());
        let vertex = VertexCoord::new(HexCoord::ORIGIN, VertexDirection::NorthWest);
        board.place_settlement(vertex, 2);
        board.place_road(vertex.touching_edges()[0], 2);

        let json = serde_json::to_string(&board).unwrap();
        let back: Board = serde_json::from_str(&json).unwrap();
        assert_eq!(board, back);
        // Identical states serialize identically.
        assert_eq!(json, serde_json::to_string(&back).unwrap());
    }
}
