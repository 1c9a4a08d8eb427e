// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Rule-based placement.

The strategy grows the placement outwards from the most connected compartment.
Each step picks a placed compartment with unplaced neighbours and extends the
grid by one of three moves: a single leaf, a whole chain, or a branch
(recursively). Heavily branching compartments are laid out as a bridge: posts
in both rows at the ends, a deck of own circuits across the top row, and the
leaf compartments tucked into the bottom row underneath, attached to a shared
segment fed from the left post.

Connections between separately placed compartments are closed after every
step: adjacent circuits first, and where no adjacency exists, a shared-line
segment spans the gap.
*/

use tracing::{debug, trace};

use neurocarto_model::{CompartmentOnNeuron, Neuron, NumberTopBottom, ResourceManager};

use crate::algorithm::PlacementAlgorithm;
use crate::error::{PlacementError, PlacementResult};
use crate::grid::{CoordinateSystem, GRID_COLUMNS, GRID_ROWS};
use crate::result::AlgorithmResult;

/// Inclusive run of columns a compartment occupies within one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateLimit {
    pub lower: usize,
    pub upper: usize,
}

/// Occupied runs of a compartment, per row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateLimits {
    pub top: Vec<CoordinateLimit>,
    pub bottom: Vec<CoordinateLimit>,
}

impl CoordinateLimits {
    fn rows(&self) -> [(usize, &[CoordinateLimit]); 2] {
        [(0, self.top.as_slice()), (1, self.bottom.as_slice())]
    }
}

/// A free stretch of circuits reachable from a placed compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementSpot {
    /// First free column of the stretch.
    pub x: usize,
    pub y: usize,
    /// Scan direction, +1 or -1.
    pub direction: isize,
    /// Columns between the stretch and the compartment it was scanned from.
    pub distance: usize,
    /// Free circuits in the scanned row.
    pub free_space: usize,
    /// Columns free in both rows, counted from `x`.
    pub free_block_space: usize,
}

/// Rule-based placement strategy.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    depth_first: bool,
    placed: Vec<CompartmentOnNeuron>,
    connections: Vec<(CompartmentOnNeuron, CompartmentOnNeuron)>,
    results: Vec<AlgorithmResult>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer extending the most recently placed compartment instead of the
    /// oldest one with open neighbours.
    pub fn with_depth_first(mut self, depth_first: bool) -> Self {
        self.depth_first = depth_first;
        self
    }

    /// Snapshots of every step taken so far.
    pub fn results(&self) -> &[AlgorithmResult] {
        &self.results
    }

    // --- queries on the grid ---

    pub fn find_limits(
        coordinate_system: &CoordinateSystem,
        compartment: CompartmentOnNeuron,
    ) -> PlacementResult<CoordinateLimits> {
        let mut limits = CoordinateLimits::default();
        for y in 0..GRID_ROWS {
            let runs = if y == 0 { &mut limits.top } else { &mut limits.bottom };
            let mut x = 0;
            while x < GRID_COLUMNS {
                if coordinate_system.compartment(x, y)? == Some(compartment) {
                    let lower = x;
                    while x + 1 < GRID_COLUMNS
                        && coordinate_system.compartment(x + 1, y)? == Some(compartment)
                    {
                        x += 1;
                    }
                    runs.push(CoordinateLimit { lower, upper: x });
                }
                x += 1;
            }
        }
        Ok(limits)
    }

    /// Scans row `y` from `x_start` in `direction`, collecting free stretches.
    /// The scan walks over occupied circuits but ends at a shared-line
    /// attachment or a closed shared switch, because no connection can be
    /// drawn across those.
    pub fn find_free_spots_from(
        coordinate_system: &CoordinateSystem,
        x_start: usize,
        y: usize,
        direction: isize,
    ) -> PlacementResult<Vec<PlacementSpot>> {
        let mut spots = Vec::new();
        let mut run: Option<(usize, usize)> = None;
        let mut x = x_start as isize;
        loop {
            if x < 0 || x >= GRID_COLUMNS as isize {
                break;
            }
            let xu = x as usize;
            let cell = coordinate_system.get(xu, y)?;
            if cell.attached_to_shared() {
                break;
            }
            if cell.compartment.is_some() {
                Self::close_run(coordinate_system, &mut run, x_start, y, direction, &mut spots);
            } else {
                run = match run {
                    Some((start, len)) => Some((start, len + 1)),
                    None => Some((xu, 1)),
                };
            }
            let crossing = if direction > 0 {
                cell.switch_shared_right
            } else {
                xu > 0 && coordinate_system.get(xu - 1, y)?.switch_shared_right
            };
            if crossing {
                break;
            }
            x += direction;
        }
        Self::close_run(coordinate_system, &mut run, x_start, y, direction, &mut spots);
        Ok(spots)
    }

    fn close_run(
        coordinate_system: &CoordinateSystem,
        run: &mut Option<(usize, usize)>,
        x_start: usize,
        y: usize,
        direction: isize,
        spots: &mut Vec<PlacementSpot>,
    ) {
        let Some((start, len)) = run.take() else { return };
        let mut block = 0;
        let mut x = start as isize;
        for _ in 0..len {
            let xu = x as usize;
            let free = |row: usize| {
                coordinate_system
                    .get(xu, row)
                    .map(|c| c.compartment.is_none())
                    .unwrap_or(false)
            };
            if free(0) && free(1) {
                block += 1;
                x += direction;
            } else {
                break;
            }
        }
        spots.push(PlacementSpot {
            x: start,
            y,
            direction,
            distance: start.abs_diff(x_start),
            free_space: len,
            free_block_space: block,
        });
    }

    /// All free stretches around the circuits of a placed compartment.
    pub fn find_free_spots(
        coordinate_system: &CoordinateSystem,
        compartment: CompartmentOnNeuron,
    ) -> PlacementResult<Vec<PlacementSpot>> {
        let limits = Self::find_limits(coordinate_system, compartment)?;
        let mut spots = Vec::new();
        for (y, runs) in limits.rows() {
            for limit in runs {
                if limit.upper + 1 < GRID_COLUMNS {
                    spots.extend(Self::find_free_spots_from(
                        coordinate_system,
                        limit.upper + 1,
                        y,
                        1,
                    )?);
                }
                if let Some(left) = limit.lower.checked_sub(1) {
                    spots.extend(Self::find_free_spots_from(coordinate_system, left, y, -1)?);
                }
            }
        }
        Ok(spots)
    }

    /// Picks a spot with at least `min_size` free circuits (`free_block_space`
    /// when `block` is set), preferring large stretches and then near ones
    /// according to the flags.
    pub fn select_free_spot(
        spots: &[PlacementSpot],
        min_size: usize,
        closest: bool,
        largest: bool,
        block: bool,
    ) -> PlacementResult<PlacementSpot> {
        let size_of =
            |spot: &PlacementSpot| if block { spot.free_block_space } else { spot.free_space };
        let mut candidates: Vec<PlacementSpot> =
            spots.iter().copied().filter(|s| size_of(s) >= min_size).collect();
        candidates.sort_by(|a, b| {
            let by_size = if largest {
                size_of(b).cmp(&size_of(a))
            } else {
                std::cmp::Ordering::Equal
            };
            let by_distance = if closest {
                a.distance.cmp(&b.distance)
            } else {
                std::cmp::Ordering::Equal
            };
            by_size.then(by_distance)
        });
        candidates.first().copied().ok_or(PlacementError::NoPlacementSpot)
    }

    // --- sizes ---

    /// Circuit demand of a compartment, inflated so every graph connection
    /// gets an attachment circuit of its own.
    fn inflated_size(
        neuron: &Neuron,
        resources: &ResourceManager,
        compartment: CompartmentOnNeuron,
    ) -> PlacementResult<NumberTopBottom> {
        let required = resources.get_config(compartment)?;
        let degree = neuron.degree(compartment)?;
        let mut total = required.total.max(1);
        let mut top = required.top;
        let mut bottom = required.bottom;
        if degree > 1 {
            total = total.max(2);
        }
        if degree > 2 {
            total = total.max(4);
            top = top.max(2);
            bottom = bottom.max(2);
        }
        total = total.max(top + bottom);
        Ok(NumberTopBottom::new(total, top, bottom)?)
    }

    // --- placement moves ---

    fn tag_cell(
        coordinate_system: &mut CoordinateSystem,
        x: isize,
        y: usize,
        compartment: CompartmentOnNeuron,
    ) -> PlacementResult<()> {
        if x < 0 || x >= GRID_COLUMNS as isize {
            return Err(PlacementError::NoPlacementSpot);
        }
        let xu = x as usize;
        let mut cell = coordinate_system.get(xu, y)?;
        if cell.compartment.is_some() {
            return Err(PlacementError::OverlapDuringPlacement { x: xu, y });
        }
        cell.compartment = Some(compartment);
        coordinate_system.set(xu, y, cell)
    }

    /// Lays the compartment out as straight runs from `x_start` in
    /// `direction`: row-pinned circuits in their rows, the remainder in row
    /// `y`. Returns the circuits placed per row.
    fn place_simple(
        coordinate_system: &mut CoordinateSystem,
        neuron: &Neuron,
        resources: &ResourceManager,
        compartment: CompartmentOnNeuron,
        x_start: usize,
        y: usize,
        direction: isize,
    ) -> PlacementResult<(usize, usize)> {
        let size = Self::inflated_size(neuron, resources, compartment)?;
        let rest = size.total - size.top - size.bottom;
        let (row0, row1) = if y == 0 {
            (size.top + rest, size.bottom)
        } else {
            (size.top, size.bottom + rest)
        };
        for i in 0..row0 {
            Self::tag_cell(
                coordinate_system,
                x_start as isize + direction * i as isize,
                0,
                compartment,
            )?;
        }
        for i in 0..row1 {
            Self::tag_cell(
                coordinate_system,
                x_start as isize + direction * i as isize,
                1,
                compartment,
            )?;
        }
        trace!(?compartment, x_start, y, direction, row0, row1, "placed simple");
        Ok((row0, row1))
    }

    /// Closes direct switches between all circuits of equal compartments.
    fn connect_self(coordinate_system: &mut CoordinateSystem) -> PlacementResult<()> {
        for y in 0..GRID_ROWS {
            for x in 0..GRID_COLUMNS - 1 {
                let a = coordinate_system.compartment(x, y)?;
                let b = coordinate_system.compartment(x + 1, y)?;
                if a.is_some() && a == b {
                    coordinate_system.set_switch_right(x, y, true)?;
                }
            }
        }
        for x in 0..GRID_COLUMNS {
            let top = coordinate_system.compartment(x, 0)?;
            let bottom = coordinate_system.compartment(x, 1)?;
            if top.is_some() && top == bottom {
                coordinate_system.set_switch_top_bottom(x, true)?;
            }
        }
        Ok(())
    }

    /// Places a whole chain one compartment after the other along a spot.
    fn place_chain(
        &mut self,
        coordinate_system: &mut CoordinateSystem,
        neuron: &Neuron,
        resources: &ResourceManager,
        chain: &[CompartmentOnNeuron],
        spot: &PlacementSpot,
    ) -> PlacementResult<()> {
        let mut x = spot.x as isize;
        for compartment in chain {
            let (row0, row1) = Self::place_simple(
                coordinate_system,
                neuron,
                resources,
                *compartment,
                x as usize,
                spot.y,
                spot.direction,
            )?;
            self.placed.push(*compartment);
            let advance = if spot.y == 0 { row0 } else { row1 };
            x += spot.direction * advance as isize;
            if x < 0 || x > GRID_COLUMNS as isize {
                return Err(PlacementError::NoPlacementSpot);
            }
        }
        Ok(())
    }

    // --- bridges ---

    fn bridge_plan(
        &self,
        neuron: &Neuron,
        resources: &ResourceManager,
        compartment: CompartmentOnNeuron,
    ) -> PlacementResult<BridgePlan> {
        let classified =
            neuron.classify_neighbours(compartment, |c| self.placed.contains(&c))?;
        if classified.branches.len() > 2 {
            return Err(PlacementError::TooManyBranches);
        }
        let mut outside_chains = classified.chains.clone();
        let mut inside_chain: Vec<CompartmentOnNeuron> = Vec::new();
        if outside_chains.len() + classified.branches.len() > 4 {
            // Tuck the shortest leaf-terminated chain under the deck. The
            // bottom shared segment only supports one chain inside.
            let mut walks: Vec<Vec<CompartmentOnNeuron>> = Vec::new();
            for start in &outside_chains {
                let walk = neuron.chain_from(*start, compartment)?;
                let terminal_degree = neuron.degree(*walk.last().unwrap_or(start))?;
                if terminal_degree <= 1 && !walk.iter().any(|c| self.placed.contains(c)) {
                    walks.push(walk);
                }
            }
            let Some(shortest) = walks.into_iter().min_by_key(|w| w.len()) else {
                return Err(PlacementError::TooManyBranches);
            };
            outside_chains.retain(|c| *c != shortest[0]);
            inside_chain = shortest;
            if outside_chains.len() + classified.branches.len() > 4 {
                return Err(PlacementError::TooManyBranches);
            }
        }

        let mut leaf_widths = Vec::with_capacity(classified.leafs.len());
        for leaf in &classified.leafs {
            leaf_widths.push(resources.get_config(*leaf)?.total.max(1));
        }
        let mut chain_widths = Vec::with_capacity(inside_chain.len());
        for link in &inside_chain {
            chain_widths.push(Self::inflated_size(neuron, resources, *link)?.total);
        }
        let interior: usize = leaf_widths.iter().sum::<usize>() + chain_widths.iter().sum::<usize>();

        let required = resources.get_config(compartment)?;
        let base = NumberTopBottom { total: 4 + interior, top: 2 + interior, bottom: 2 };
        let pairs = [
            required.total.saturating_sub(base.total).div_ceil(2),
            required.top.saturating_sub(base.top),
            required.bottom.saturating_sub(base.bottom),
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        Ok(BridgePlan {
            leafs: classified.leafs,
            leaf_widths,
            inside_chain,
            chain_widths,
            interior,
            extra_pairs: pairs,
        })
    }

    /// Total columns a bridge for `compartment` would span.
    fn bridge_width(
        &self,
        neuron: &Neuron,
        resources: &ResourceManager,
        compartment: CompartmentOnNeuron,
    ) -> PlacementResult<usize> {
        Ok(self.bridge_plan(neuron, resources, compartment)?.width())
    }

    /// Builds a bridge anchored at `x_anchor`, extending in `direction`.
    fn place_bridge(
        &mut self,
        coordinate_system: &mut CoordinateSystem,
        neuron: &Neuron,
        resources: &ResourceManager,
        compartment: CompartmentOnNeuron,
        x_anchor: usize,
        direction: isize,
    ) -> PlacementResult<()> {
        if coordinate_system.occupied(x_anchor, 0)? || coordinate_system.occupied(x_anchor, 1)? {
            return Err(PlacementError::BridgeStartOccupied { x: x_anchor });
        }
        let plan = self.bridge_plan(neuron, resources, compartment)?;
        let width = plan.width();
        let x0 = if direction > 0 {
            x_anchor
        } else {
            (x_anchor + 1)
                .checked_sub(width)
                .ok_or(PlacementError::NoPlacementSpot)?
        };
        let x_last = x0 + width - 1;
        if x_last >= GRID_COLUMNS {
            return Err(PlacementError::NoPlacementSpot);
        }
        debug!(?compartment, x0, x_last, interior = plan.interior, "placing bridge");

        // Posts in both rows, deck across the top, extra circuit pairs next
        // to the right post.
        Self::tag_cell(coordinate_system, x0 as isize, 0, compartment)?;
        Self::tag_cell(coordinate_system, x0 as isize, 1, compartment)?;
        Self::tag_cell(coordinate_system, x_last as isize, 0, compartment)?;
        Self::tag_cell(coordinate_system, x_last as isize, 1, compartment)?;
        for x in x0 + 1..x_last {
            Self::tag_cell(coordinate_system, x as isize, 0, compartment)?;
        }
        for i in 0..plan.extra_pairs {
            Self::tag_cell(
                coordinate_system,
                (x_last - 1 - i) as isize,
                1,
                compartment,
            )?;
        }
        self.placed.push(compartment);

        // Leafs underneath, each attached to the shared segment fed from the
        // left post.
        let mut attachments: Vec<(usize, CompartmentOnNeuron)> = Vec::new();
        let mut x = x0 + 1;
        for (leaf, leaf_width) in plan.leafs.iter().zip(&plan.leaf_widths) {
            for i in 0..*leaf_width {
                Self::tag_cell(coordinate_system, (x + i) as isize, 1, *leaf)?;
            }
            attachments.push((x, *leaf));
            self.placed.push(*leaf);
            x += leaf_width;
        }

        // At most one chain inside, laid out after the leafs.
        let mut chain_spans: Vec<(usize, usize, CompartmentOnNeuron)> = Vec::new();
        for (link, link_width) in plan.inside_chain.iter().zip(&plan.chain_widths) {
            for i in 0..*link_width {
                Self::tag_cell(coordinate_system, (x + i) as isize, 1, *link)?;
            }
            chain_spans.push((x, x + link_width - 1, *link));
            self.placed.push(*link);
            x += link_width;
        }
        if let Some((first, _, start)) = chain_spans.first() {
            attachments.push((*first, *start));
        }

        for (column, other) in &attachments {
            coordinate_system.connect_shared(x0, *column, 1)?;
            self.connections.push((compartment, *other));
        }
        for pair in chain_spans.windows(2) {
            let (_, end, from) = pair[0];
            let (begin, _, to) = pair[1];
            coordinate_system.connect_shared(end, begin, 1)?;
            self.connections.push((from, to));
        }
        Self::connect_self(coordinate_system)?;
        Ok(())
    }

    // --- branches ---

    fn place_branch(
        &mut self,
        coordinate_system: &mut CoordinateSystem,
        neuron: &Neuron,
        resources: &ResourceManager,
        from: CompartmentOnNeuron,
        branch: CompartmentOnNeuron,
    ) -> PlacementResult<()> {
        if self.placed.contains(&branch) {
            return Ok(());
        }
        let classified = neuron.classify_neighbours(branch, |c| self.placed.contains(&c))?;
        let spots = Self::find_free_spots(coordinate_system, from)?;
        if !classified.leafs.is_empty() && classified.len() > 1 {
            let width = self.bridge_width(neuron, resources, branch)?;
            let spot = Self::select_free_spot(&spots, width, true, false, true)?;
            self.place_bridge(coordinate_system, neuron, resources, branch, spot.x, spot.direction)?;
        } else {
            let size = Self::inflated_size(neuron, resources, branch)?;
            let block = size.top > 0 && size.bottom > 0;
            let spot = Self::select_free_spot(&spots, size.total, false, true, block)?;
            Self::place_simple(
                coordinate_system,
                neuron,
                resources,
                branch,
                spot.x,
                spot.y,
                spot.direction,
            )?;
            self.placed.push(branch);
            Self::connect_self(coordinate_system)?;
        }
        for sub in classified.branches {
            self.place_branch(coordinate_system, neuron, resources, branch, sub)?;
        }
        Ok(())
    }

    // --- connecting placed compartments ---

    fn connection_recorded(&self, a: CompartmentOnNeuron, b: CompartmentOnNeuron) -> bool {
        self.connections.iter().any(|(x, y)| (*x == a && *y == b) || (*x == b && *y == a))
    }

    /// Shared-line connection between circuits sitting right next to each
    /// other. Fails with [`PlacementError::NoAdjacentConnection`] when no
    /// usable adjacent pair exists; callers fall back to a distant
    /// connection.
    fn connect_adjacent(
        coordinate_system: &mut CoordinateSystem,
        neuron: &Neuron,
        a: CompartmentOnNeuron,
        b: CompartmentOnNeuron,
    ) -> PlacementResult<()> {
        let (source, target) =
            if neuron.degree(a)? >= neuron.degree(b)? { (a, b) } else { (b, a) };
        let limits = Self::find_limits(coordinate_system, source)?;
        let mut candidates: Vec<(usize, usize, usize)> = Vec::new();
        for (y, runs) in limits.rows() {
            for limit in runs {
                if limit.upper + 1 < GRID_COLUMNS
                    && coordinate_system.compartment(limit.upper + 1, y)? == Some(target)
                {
                    candidates.push((limit.upper, limit.upper + 1, y));
                }
                if let Some(left) = limit.lower.checked_sub(1) {
                    if coordinate_system.compartment(left, y)? == Some(target) {
                        candidates.push((limit.lower, left, y));
                    }
                }
            }
        }
        for (sx, tx, y) in candidates {
            let s = coordinate_system.get(sx, y)?;
            let t = coordinate_system.get(tx, y)?;
            if s.switch_circuit_shared_conductance
                || t.switch_circuit_shared_conductance
                || (s.switch_circuit_shared && t.switch_circuit_shared)
            {
                continue;
            }
            // A circuit already feeding a segment stays the source.
            let (from, to) = if t.switch_circuit_shared { (tx, sx) } else { (sx, tx) };
            match coordinate_system.connect_shared(from, to, y) {
                Ok(()) => return Ok(()),
                Err(PlacementError::ConnectionBlocked { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(PlacementError::NoAdjacentConnection)
    }

    /// Shared-line connection across a gap of foreign or free circuits. The
    /// gap must not contain attachments or closed shared switches.
    fn connect_distant(
        coordinate_system: &mut CoordinateSystem,
        neuron: &Neuron,
        a: CompartmentOnNeuron,
        b: CompartmentOnNeuron,
    ) -> PlacementResult<()> {
        let (source, target) =
            if neuron.degree(a)? >= neuron.degree(b)? { (a, b) } else { (b, a) };
        let source_limits = Self::find_limits(coordinate_system, source)?;
        let target_limits = Self::find_limits(coordinate_system, target)?;
        let mut candidates: Vec<(usize, usize, usize, usize)> = Vec::new();
        for ((y, source_runs), (_, target_runs)) in
            source_limits.rows().into_iter().zip(target_limits.rows())
        {
            for s in source_runs {
                for t in target_runs {
                    let (sx, tx) = if t.lower > s.upper {
                        (s.upper, t.lower)
                    } else if s.lower > t.upper {
                        (s.lower, t.upper)
                    } else {
                        continue;
                    };
                    let (lo, hi) = (sx.min(tx), sx.max(tx));
                    let mut blocked = false;
                    for x in lo..hi {
                        if coordinate_system.get(x, y)?.switch_shared_right {
                            blocked = true;
                            break;
                        }
                    }
                    for x in lo + 1..hi {
                        if coordinate_system.get(x, y)?.attached_to_shared() {
                            blocked = true;
                            break;
                        }
                    }
                    if !blocked {
                        candidates.push((hi - lo, sx, tx, y));
                    }
                }
            }
        }
        candidates.sort_by_key(|(gap, ..)| *gap);
        for (_, sx, tx, y) in candidates {
            let s = coordinate_system.get(sx, y)?;
            let t = coordinate_system.get(tx, y)?;
            if s.switch_circuit_shared_conductance
                || t.switch_circuit_shared_conductance
                || (s.switch_circuit_shared && t.switch_circuit_shared)
            {
                continue;
            }
            let (from, to) = if t.switch_circuit_shared { (tx, sx) } else { (sx, tx) };
            match coordinate_system.connect_shared(from, to, y) {
                Ok(()) => return Ok(()),
                Err(PlacementError::ConnectionBlocked { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(PlacementError::NoDistantConnection)
    }

    /// Connects every newly placed compartment to its already placed
    /// neighbours, preferring adjacency.
    fn connect_placed(
        &mut self,
        coordinate_system: &mut CoordinateSystem,
        neuron: &Neuron,
        newly: &[CompartmentOnNeuron],
    ) -> PlacementResult<()> {
        for new in newly {
            for neighbour in neuron.neighbours(*new)? {
                if !self.placed.contains(&neighbour) || self.connection_recorded(*new, neighbour)
                {
                    continue;
                }
                match Self::connect_adjacent(coordinate_system, neuron, *new, neighbour) {
                    Ok(()) => {}
                    Err(PlacementError::NoAdjacentConnection) => {
                        Self::connect_distant(coordinate_system, neuron, *new, neighbour)?;
                    }
                    Err(e) => return Err(e),
                }
                self.connections.push((*new, neighbour));
            }
        }
        Ok(())
    }

    // --- stepping ---

    /// Runs one placement step. Returns `true` once every compartment is
    /// placed.
    fn run_one_step(
        &mut self,
        coordinate_system: &mut CoordinateSystem,
        neuron: &Neuron,
        resources: &ResourceManager,
    ) -> PlacementResult<bool> {
        if self.placed.is_empty() {
            let mut start = neuron
                .compartments()
                .next()
                .ok_or(neurocarto_model::ModelError::EmptyNeuron)?;
            for candidate in neuron.compartments() {
                if neuron.degree(candidate)? > neuron.degree(start)? {
                    start = candidate;
                }
            }
            let classified = neuron.classify_neighbours(start, |_| false)?;
            let x_start = GRID_COLUMNS / 2;
            if classified.leafs.len() > 1 || classified.len() > 4 {
                self.place_bridge(coordinate_system, neuron, resources, start, x_start, 1)?;
            } else {
                Self::place_simple(coordinate_system, neuron, resources, start, x_start, 0, 1)?;
                self.placed.push(start);
                Self::connect_self(coordinate_system)?;
            }
            return Ok(self.placed.len() == neuron.num_compartments());
        }

        let order: Vec<CompartmentOnNeuron> = if self.depth_first {
            self.placed.iter().rev().copied().collect()
        } else {
            self.placed.clone()
        };
        let mut source = None;
        for candidate in order {
            let classified =
                neuron.classify_neighbours(candidate, |c| self.placed.contains(&c))?;
            if !classified.is_empty() {
                source = Some((candidate, classified));
                break;
            }
        }
        let Some((source, classified)) = source else {
            return Ok(true);
        };

        let before = self.placed.len();
        if classified.chains.is_empty() && classified.branches.is_empty() {
            if classified.leafs.len() != 1 {
                return Err(PlacementError::TooManyUnplacedLeafs);
            }
            let leaf = classified.leafs[0];
            let size = Self::inflated_size(neuron, resources, leaf)?;
            let block = size.top > 0 && size.bottom > 0;
            let spots = Self::find_free_spots(coordinate_system, source)?;
            let spot = Self::select_free_spot(&spots, size.total, false, false, block)?;
            Self::place_simple(
                coordinate_system,
                neuron,
                resources,
                leaf,
                spot.x,
                spot.y,
                spot.direction,
            )?;
            self.placed.push(leaf);
            Self::connect_self(coordinate_system)?;
        } else if classified.branches.is_empty() {
            let mut chain = neuron.chain_from(classified.chains[0], source)?;
            if let Some(position) = chain.iter().position(|c| self.placed.contains(c)) {
                chain.truncate(position);
            }
            let mut min_size = 0;
            for link in &chain {
                min_size += Self::inflated_size(neuron, resources, *link)?.total;
            }
            let spots = Self::find_free_spots(coordinate_system, source)?;
            let spot = Self::select_free_spot(&spots, min_size, true, true, false)?;
            self.place_chain(coordinate_system, neuron, resources, &chain, &spot)?;
            Self::connect_self(coordinate_system)?;
        } else {
            let mut branch = classified.branches[0];
            let mut smallest = usize::MAX;
            for candidate in &classified.branches {
                let size = neuron.branch_size(*candidate, source)?;
                if size < smallest {
                    smallest = size;
                    branch = *candidate;
                }
            }
            self.place_branch(coordinate_system, neuron, resources, source, branch)?;
        }

        let newly: Vec<CompartmentOnNeuron> = self.placed[before..].to_vec();
        self.connect_placed(coordinate_system, neuron, &newly)?;
        Ok(self.placed.len() == neuron.num_compartments())
    }
}

#[derive(Debug, Clone)]
struct BridgePlan {
    leafs: Vec<CompartmentOnNeuron>,
    leaf_widths: Vec<usize>,
    inside_chain: Vec<CompartmentOnNeuron>,
    chain_widths: Vec<usize>,
    interior: usize,
    extra_pairs: usize,
}

impl BridgePlan {
    fn width(&self) -> usize {
        2 + self.interior + self.extra_pairs
    }
}

impl PlacementAlgorithm for RuleSet {
    fn run(
        &mut self,
        initial: CoordinateSystem,
        neuron: &Neuron,
        resources: &ResourceManager,
    ) -> PlacementResult<AlgorithmResult> {
        self.reset();
        let mut coordinate_system = initial;
        loop {
            let finished = self.run_one_step(&mut coordinate_system, neuron, resources)?;
            self.results.push(AlgorithmResult {
                coordinate_system: coordinate_system.clone(),
                placed_compartments: self.placed.clone(),
                finished,
            });
            if finished {
                break;
            }
        }
        debug!(steps = self.results.len(), "rule set finished");
        Ok(self.results.last().cloned().unwrap_or_default())
    }

    fn reset(&mut self) {
        self.placed.clear();
        self.connections.clear();
        self.results.clear();
    }

    fn fresh(&self) -> Box<dyn PlacementAlgorithm> {
        Box::new(Self { depth_first: self.depth_first, ..Self::default() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{to_logical_compartments, valid};
    use neurocarto_model::{
        Compartment, CompartmentConnection, Environment, Mechanism, ParameterInterval,
    };

    fn circuit_compartment() -> Compartment {
        let mut c = Compartment::new();
        c.add(Mechanism::Capacitance {
            capacitance: ParameterInterval::new(1.0, 1.0).unwrap(),
        })
        .unwrap();
        c
    }

    fn chain_neuron(n: usize) -> (Neuron, ResourceManager, Vec<CompartmentOnNeuron>) {
        let mut neuron = Neuron::new();
        let cs: Vec<_> = (0..n).map(|_| neuron.add_compartment(circuit_compartment())).collect();
        for pair in cs.windows(2) {
            neuron
                .add_compartment_connection(pair[0], pair[1], CompartmentConnection::default())
                .unwrap();
        }
        let resources = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();
        (neuron, resources, cs)
    }

    fn star_neuron(leafs: usize) -> (Neuron, ResourceManager, CompartmentOnNeuron) {
        let mut neuron = Neuron::new();
        let center = neuron.add_compartment(circuit_compartment());
        for _ in 0..leafs {
            let leaf = neuron.add_compartment(circuit_compartment());
            neuron
                .add_compartment_connection(center, leaf, CompartmentConnection::default())
                .unwrap();
        }
        let resources = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();
        (neuron, resources, center)
    }

    #[test]
    fn places_a_pair_adjacently() {
        let (neuron, resources, cs) = chain_neuron(2);
        let mut algorithm = RuleSet::new();
        let result = algorithm.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        assert!(result.finished);
        assert!(valid(&result.coordinate_system, &neuron, &resources).unwrap());
        // Both compartments share a column boundary.
        let a = result.coordinate_system.find_neuron_circuits(cs[0]);
        let b = result.coordinate_system.find_neuron_circuits(cs[1]);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].0.abs_diff(b[0].0), 1);
    }

    #[test]
    fn places_chains() {
        for n in [3, 4, 7] {
            let (neuron, resources, _) = chain_neuron(n);
            let mut algorithm = RuleSet::new();
            let result = algorithm.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
            assert!(result.finished, "chain of {n} unfinished");
            assert!(
                valid(&result.coordinate_system, &neuron, &resources).unwrap(),
                "chain of {n} invalid"
            );
        }
    }

    #[test]
    fn branching_compartment_becomes_a_bridge() {
        let (neuron, resources, center) = star_neuron(3);
        let mut algorithm = RuleSet::new();
        let result = algorithm.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        assert!(result.finished);
        assert!(valid(&result.coordinate_system, &neuron, &resources).unwrap());
        // Bridge posts occupy both rows.
        let circuits = result.coordinate_system.find_neuron_circuits(center);
        assert!(circuits.iter().any(|(_, y)| *y == 0));
        assert!(circuits.iter().any(|(_, y)| *y == 1));
        // The leafs sit underneath the deck.
        let columns: Vec<usize> = circuits.iter().map(|(x, _)| *x).collect();
        let min = *columns.iter().min().unwrap();
        let max = *columns.iter().max().unwrap();
        for c in neuron.compartments() {
            if c == center {
                continue;
            }
            for (x, y) in result.coordinate_system.find_neuron_circuits(c) {
                assert_eq!(y, 1);
                assert!(x > min && x < max);
            }
        }
    }

    #[test]
    fn wide_star_is_handled() {
        let (neuron, resources, _) = star_neuron(5);
        let mut algorithm = RuleSet::new();
        let result = algorithm.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        assert!(result.finished);
        assert!(valid(&result.coordinate_system, &neuron, &resources).unwrap());
    }

    #[test]
    fn star_with_attached_chains() {
        // Center with two leafs and one chain of two hanging off it.
        let mut neuron = Neuron::new();
        let center = neuron.add_compartment(circuit_compartment());
        for _ in 0..2 {
            let leaf = neuron.add_compartment(circuit_compartment());
            neuron
                .add_compartment_connection(center, leaf, CompartmentConnection::default())
                .unwrap();
        }
        let c1 = neuron.add_compartment(circuit_compartment());
        let c2 = neuron.add_compartment(circuit_compartment());
        neuron
            .add_compartment_connection(center, c1, CompartmentConnection::default())
            .unwrap();
        neuron.add_compartment_connection(c1, c2, CompartmentConnection::default()).unwrap();
        let resources = ResourceManager::from_neuron(&neuron, &Environment::new()).unwrap();

        let mut algorithm = RuleSet::new();
        let result = algorithm.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        assert!(result.finished);
        assert!(valid(&result.coordinate_system, &neuron, &resources).unwrap());
    }

    #[test]
    fn depth_first_matches_breadth_first_on_chains() {
        let (neuron, resources, _) = chain_neuron(5);
        for depth_first in [false, true] {
            let mut algorithm = RuleSet::new().with_depth_first(depth_first);
            let result = algorithm.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
            assert!(result.finished);
            assert!(valid(&result.coordinate_system, &neuron, &resources).unwrap());
        }
    }

    #[test]
    fn snapshots_accumulate_per_step() {
        let (neuron, resources, _) = chain_neuron(4);
        let mut algorithm = RuleSet::new();
        let result = algorithm.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        assert!(algorithm.results().len() > 1);
        assert!(algorithm.results().iter().rev().skip(1).all(|r| !r.finished));
        assert_eq!(algorithm.results().last().unwrap(), &result);
    }

    #[test]
    fn fresh_instance_reruns_cleanly() {
        let (neuron, resources, _) = chain_neuron(3);
        let mut algorithm = RuleSet::new();
        let first = algorithm.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        let mut second_instance = algorithm.fresh();
        let second = second_instance.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn logical_compartments_cover_every_compartment() {
        let (neuron, resources, _) = chain_neuron(4);
        let mut algorithm = RuleSet::new();
        let result = algorithm.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        let logical = to_logical_compartments(&result.coordinate_system, &neuron);
        assert_eq!(logical.len(), 4);
        assert!(logical.values().all(|circuits| !circuits.is_empty()));
    }

    #[test]
    fn resources_drive_compartment_extent() {
        // One compartment demanding three circuits next to a single-circuit
        // neighbour.
        let mut neuron = Neuron::new();
        let mut big = circuit_compartment();
        big.add(Mechanism::SynapticInputCurrent {
            time_constant: ParameterInterval::new(1.0, 1.0).unwrap(),
        })
        .unwrap();
        let a = neuron.add_compartment(big);
        let b = neuron.add_compartment(circuit_compartment());
        neuron.add_compartment_connection(a, b, CompartmentConnection::default()).unwrap();
        let mut env = Environment::new();
        env.add(
            a,
            neurocarto_model::SynapticInputEnvironment {
                kind: neurocarto_model::SynapticInputKind::Current,
                excitatory: true,
                inputs: NumberTopBottom::new(700, 0, 0).unwrap(),
            },
        );
        let resources = ResourceManager::from_neuron(&neuron, &env).unwrap();
        assert_eq!(resources.get_config(a).unwrap().total, 3);

        let mut algorithm = RuleSet::new();
        let result = algorithm.run(CoordinateSystem::new(), &neuron, &resources).unwrap();
        assert!(result.finished);
        assert!(valid(&result.coordinate_system, &neuron, &resources).unwrap());
        assert_eq!(result.coordinate_system.find_neuron_circuits(a).len(), 3);
    }
}
