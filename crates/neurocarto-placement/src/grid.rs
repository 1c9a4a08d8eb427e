// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
The neuron-circuit grid and its connectivity predicates.

[`CoordinateSystem`] models the 2x256 grid of analog neuron circuits. Cells
connect directly through right and top-bottom switches, and through a shared
line per row: closed `shared_right` switches join adjacent columns into a
segment, and cells attach to the segment either shorted (`circuit_shared`) or
through a conductance (`circuit_shared_conductance`).

Compartment membership is a cell tag. A compartment is the flood-fill closure
over direct connections only; shared-line attachments express conductance
connections between different compartments. Two shorted attachments of
different compartments on one segment are a short circuit.
*/

use ahash::{AHashMap, AHashSet};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use neurocarto_model::{CompartmentOnNeuron, NumberTopBottom};

use crate::circuit::NeuronCircuit;
use crate::error::{PlacementError, PlacementResult};

/// Rows of the neuron-circuit grid.
pub const GRID_ROWS: usize = 2;
/// Columns of the neuron-circuit grid.
pub const GRID_COLUMNS: usize = 256;

/// 2x256 grid of neuron circuits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSystem {
    cells: Array2<NeuronCircuit>,
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        Self { cells: Array2::default((GRID_ROWS, GRID_COLUMNS)) }
    }
}

impl CoordinateSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, x: usize, y: usize) -> PlacementResult<NeuronCircuit> {
        self.check_bounds(x, y)?;
        Ok(self.cells[[y, x]])
    }

    pub fn set(&mut self, x: usize, y: usize, circuit: NeuronCircuit) -> PlacementResult<()> {
        self.check_bounds(x, y)?;
        self.cells[[y, x]] = circuit;
        Ok(())
    }

    /// Opens every switch and removes every compartment tag.
    pub fn clear(&mut self) {
        self.cells.fill(NeuronCircuit::default());
    }

    pub fn compartment(&self, x: usize, y: usize) -> PlacementResult<Option<CompartmentOnNeuron>> {
        Ok(self.get(x, y)?.compartment)
    }

    pub fn occupied(&self, x: usize, y: usize) -> PlacementResult<bool> {
        Ok(self.get(x, y)?.compartment.is_some())
    }

    fn check_bounds(&self, x: usize, y: usize) -> PlacementResult<()> {
        if x >= GRID_COLUMNS || y >= GRID_ROWS {
            return Err(PlacementError::CoordinateOutOfRange { x, y });
        }
        Ok(())
    }

    fn check_limit(x_max: usize) -> PlacementResult<()> {
        if x_max > GRID_COLUMNS {
            return Err(PlacementError::ColumnLimitOutOfRange { x_max });
        }
        Ok(())
    }

    // --- direct connectivity ---

    /// Membrane connection to the next column in the same row.
    pub fn connected_right(&self, x: usize, y: usize) -> bool {
        x + 1 < GRID_COLUMNS && self.cells[[y, x]].switch_right
    }

    pub fn connected_left(&self, x: usize, y: usize) -> bool {
        x > 0 && self.cells[[y, x - 1]].switch_right
    }

    /// Membrane connection between the rows of column `x`. Both switches must
    /// be closed for the connection to exist.
    pub fn connected_top_bottom(&self, x: usize) -> bool {
        self.cells[[0, x]].switch_top_bottom && self.cells[[1, x]].switch_top_bottom
    }

    pub fn set_switch_right(&mut self, x: usize, y: usize, closed: bool) -> PlacementResult<()> {
        self.check_bounds(x, y)?;
        self.cells[[y, x]].switch_right = closed;
        Ok(())
    }

    /// Closes or opens both top-bottom switches of column `x`.
    pub fn set_switch_top_bottom(&mut self, x: usize, closed: bool) -> PlacementResult<()> {
        self.check_bounds(x, 0)?;
        self.cells[[0, x]].switch_top_bottom = closed;
        self.cells[[1, x]].switch_top_bottom = closed;
        Ok(())
    }

    // --- shared-line segments ---

    /// Maximal run of columns joined by closed `shared_right` switches that
    /// covers column `x` in row `y`. `None` when the cell touches no closed
    /// shared switch.
    pub fn segment_span(&self, x: usize, y: usize) -> Option<(usize, usize)> {
        let left = x > 0 && self.cells[[y, x - 1]].switch_shared_right;
        let right = x + 1 < GRID_COLUMNS && self.cells[[y, x]].switch_shared_right;
        if !left && !right {
            return None;
        }
        let mut a = x;
        while a > 0 && self.cells[[y, a - 1]].switch_shared_right {
            a -= 1;
        }
        let mut b = x;
        while b + 1 < GRID_COLUMNS && self.cells[[y, b]].switch_shared_right {
            b += 1;
        }
        Some((a, b))
    }

    /// All segments of row `y` whose columns lie below `x_max`, as inclusive
    /// spans. A segment reaching across `x_max` is reported clipped.
    fn segments(&self, y: usize, x_max: usize) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        let mut x = 0;
        while x + 1 < x_max {
            if self.cells[[y, x]].switch_shared_right {
                let a = x;
                while x + 1 < x_max && self.cells[[y, x]].switch_shared_right {
                    x += 1;
                }
                out.push((a, x));
            } else {
                x += 1;
            }
        }
        out
    }

    /// Columns whose membranes are shorted together with `(x, y)` over the
    /// shared line. Empty unless the cell itself is shorted onto a segment.
    pub fn connected_shared_short(&self, x: usize, y: usize) -> Vec<usize> {
        if !self.cells[[y, x]].switch_circuit_shared {
            return Vec::new();
        }
        let Some((a, b)) = self.segment_span(x, y) else {
            return Vec::new();
        };
        (a..=b)
            .filter(|&other| other != x && self.cells[[y, other]].switch_circuit_shared)
            .collect()
    }

    /// Columns connected to `(x, y)` through the shared line with exactly one
    /// conductance in between: shorted cells see their conductance-attached
    /// partners and vice versa.
    pub fn connected_shared_conductance(&self, x: usize, y: usize) -> Vec<usize> {
        let cell = self.cells[[y, x]];
        if !cell.attached_to_shared() {
            return Vec::new();
        }
        let Some((a, b)) = self.segment_span(x, y) else {
            return Vec::new();
        };
        let want_short = cell.switch_circuit_shared_conductance;
        (a..=b)
            .filter(|&other| {
                if other == x {
                    return false;
                }
                let partner = self.cells[[y, other]];
                if want_short {
                    partner.switch_circuit_shared
                } else {
                    partner.switch_circuit_shared_conductance
                }
            })
            .collect()
    }

    /// A membrane pair connected both directly and over the shared line.
    pub fn has_double_connections(&self, x: usize, y: usize) -> bool {
        self.connected_right(x, y)
            && (self.connected_shared_short(x, y).contains(&(x + 1))
                || self.connected_shared_conductance(x, y).contains(&(x + 1)))
    }

    /// Any cell below `x_max` attaching to the shared line both shorted and
    /// through the conductance.
    pub fn double_switch(&self, x_max: usize) -> PlacementResult<bool> {
        Self::check_limit(x_max)?;
        for y in 0..GRID_ROWS {
            for x in 0..x_max {
                if !self.cells[[y, x]].is_valid() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Two shorted attachments of different compartments on one segment.
    /// Untagged attachments never short.
    pub fn short_circuit(&self, x_max: usize) -> PlacementResult<bool> {
        Self::check_limit(x_max)?;
        for y in 0..GRID_ROWS {
            for (a, b) in self.segments(y, x_max) {
                let mut first: Option<CompartmentOnNeuron> = None;
                for x in a..=b {
                    let cell = self.cells[[y, x]];
                    if !cell.switch_circuit_shared {
                        continue;
                    }
                    let Some(tag) = cell.compartment else { continue };
                    match first {
                        None => first = Some(tag),
                        Some(seen) if seen != tag => return Ok(true),
                        Some(_) => {}
                    }
                }
            }
        }
        Ok(false)
    }

    /// Detects switches that connect to nothing below `x_max`: one-sided
    /// top-bottom switches, attachments off any segment, unattached segment
    /// ends, segments missing a shorted or a conductance attachment, and
    /// switches leading across the scan boundary.
    pub fn has_empty_connections(&self, x_max: usize) -> PlacementResult<bool> {
        Self::check_limit(x_max)?;
        for x in 0..x_max {
            if self.cells[[0, x]].switch_top_bottom != self.cells[[1, x]].switch_top_bottom {
                return Ok(true);
            }
        }
        // Switches in the last scanned column that lead outside.
        if x_max > 0 {
            let edge = x_max - 1;
            for y in 0..GRID_ROWS {
                let cell = self.cells[[y, edge]];
                if cell.switch_right || cell.switch_shared_right {
                    return Ok(true);
                }
            }
        }
        for y in 0..GRID_ROWS {
            for x in 0..x_max {
                if self.cells[[y, x]].attached_to_shared() && self.segment_span(x, y).is_none() {
                    return Ok(true);
                }
            }
            for (a, b) in self.segments(y, x_max) {
                if !self.cells[[y, a]].attached_to_shared()
                    || !self.cells[[y, b]].attached_to_shared()
                {
                    return Ok(true);
                }
                let mut shorts = 0;
                let mut conductances = 0;
                for x in a..=b {
                    let cell = self.cells[[y, x]];
                    shorts += usize::from(cell.switch_circuit_shared);
                    conductances += usize::from(cell.switch_circuit_shared_conductance);
                }
                if shorts == 0 || conductances == 0 {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Removes switches that connect to nothing: dangling segment ends are
    /// trimmed, then attachments left off any segment are opened, as are
    /// one-sided top-bottom switches. Idempotent.
    pub fn clear_empty_connections(&mut self) {
        for x in 0..GRID_COLUMNS {
            if self.cells[[0, x]].switch_top_bottom != self.cells[[1, x]].switch_top_bottom {
                self.cells[[0, x]].switch_top_bottom = false;
                self.cells[[1, x]].switch_top_bottom = false;
            }
        }
        for y in 0..GRID_ROWS {
            // Trim segment ends without an attachment until stable.
            let mut changed = true;
            while changed {
                changed = false;
                for (a, b) in self.segments(y, GRID_COLUMNS) {
                    if !self.cells[[y, a]].attached_to_shared() {
                        self.cells[[y, a]].switch_shared_right = false;
                        changed = true;
                    }
                    if a != b && !self.cells[[y, b]].attached_to_shared() {
                        self.cells[[y, b - 1]].switch_shared_right = false;
                        changed = true;
                    }
                }
            }
            for x in 0..GRID_COLUMNS {
                if self.cells[[y, x]].attached_to_shared() && self.segment_span(x, y).is_none() {
                    self.cells[[y, x]].switch_circuit_shared = false;
                    self.cells[[y, x]].switch_circuit_shared_conductance = false;
                }
            }
        }
    }

    /// Clears empty connections and additionally double attachments: a cell
    /// reaching the shared line both shorted and through its conductance
    /// loses both attachments, and segments orphaned by that lose their
    /// switches in the empty-connection pass.
    pub fn clear_invalid_connections(&mut self) {
        for cell in self.cells.iter_mut() {
            if !cell.is_valid() {
                cell.switch_circuit_shared = false;
                cell.switch_circuit_shared_conductance = false;
            }
        }
        self.clear_empty_connections();
    }

    /// Connects the membrane at `x_source` to the membrane at `x_target`
    /// through the shared line of row `y`: the source is shorted on, the
    /// target attaches through its conductance, and the shared switches in
    /// between are closed.
    pub fn connect_shared(
        &mut self,
        x_source: usize,
        x_target: usize,
        y: usize,
    ) -> PlacementResult<()> {
        self.check_bounds(x_source, y)?;
        self.check_bounds(x_target, y)?;
        let blocked = || Err(PlacementError::ConnectionBlocked { x_source, x_target });
        if x_source == x_target {
            return blocked();
        }
        if self.cells[[y, x_source]].switch_circuit_shared_conductance
            || self.cells[[y, x_target]].switch_circuit_shared
        {
            return blocked();
        }
        let (lo, hi) = (x_source.min(x_target), x_source.max(x_target));
        // Extending onto an existing segment must not short two different
        // compartments together.
        let mut span_lo = lo;
        while span_lo > 0 && self.cells[[y, span_lo - 1]].switch_shared_right {
            span_lo -= 1;
        }
        let mut span_hi = hi;
        while span_hi + 1 < GRID_COLUMNS && self.cells[[y, span_hi]].switch_shared_right {
            span_hi += 1;
        }
        let mut short_tags: Vec<CompartmentOnNeuron> = Vec::new();
        for x in span_lo..=span_hi {
            let shorted = self.cells[[y, x]].switch_circuit_shared || x == x_source;
            if shorted {
                if let Some(tag) = self.cells[[y, x]].compartment {
                    if !short_tags.contains(&tag) {
                        short_tags.push(tag);
                    }
                }
            }
        }
        if short_tags.len() > 1 {
            return blocked();
        }
        for x in lo..hi {
            self.cells[[y, x]].switch_shared_right = true;
        }
        self.cells[[y, x_source]].switch_circuit_shared = true;
        self.cells[[y, x_target]].switch_circuit_shared_conductance = true;
        Ok(())
    }

    // --- compartment tagging ---

    /// Tags the flood-fill closure of `(x, y)` over direct connections with
    /// `compartment` and returns the circuits claimed, counted per row.
    /// Cells already carrying a tag are left alone.
    pub fn assign_compartment_adjacent(
        &mut self,
        x: usize,
        y: usize,
        compartment: CompartmentOnNeuron,
    ) -> PlacementResult<NumberTopBottom> {
        self.check_bounds(x, y)?;
        let mut count = NumberTopBottom::zero();
        let mut stack = vec![(x, y)];
        while let Some((cx, cy)) = stack.pop() {
            if self.cells[[cy, cx]].compartment.is_some() {
                continue;
            }
            self.cells[[cy, cx]].compartment = Some(compartment);
            count += NumberTopBottom::single(cy);
            if self.connected_right(cx, cy) {
                stack.push((cx + 1, cy));
            }
            if self.connected_left(cx, cy) {
                stack.push((cx - 1, cy));
            }
            if self.connected_top_bottom(cx) {
                stack.push((cx, 1 - cy));
            }
        }
        Ok(count)
    }

    /// Coordinates tagged with `compartment`, column-major.
    pub fn find_neuron_circuits(&self, compartment: CompartmentOnNeuron) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for x in 0..GRID_COLUMNS {
            for y in 0..GRID_ROWS {
                if self.cells[[y, x]].compartment == Some(compartment) {
                    out.push((x, y));
                }
            }
        }
        out
    }

    /// Circuits allocated per compartment below `x_max`.
    pub fn allocated_resources(
        &self,
        x_max: usize,
    ) -> PlacementResult<AHashMap<CompartmentOnNeuron, NumberTopBottom>> {
        Self::check_limit(x_max)?;
        let mut out: AHashMap<CompartmentOnNeuron, NumberTopBottom> = AHashMap::new();
        for y in 0..GRID_ROWS {
            for x in 0..x_max {
                if let Some(tag) = self.cells[[y, x]].compartment {
                    *out.entry(tag).or_default() += NumberTopBottom::single(y);
                }
            }
        }
        Ok(out)
    }

    /// Whether `compartment` owns a circuit in an even column and whether it
    /// owns one in an odd column. Synapse matrix rows serve even and odd
    /// columns separately, so recording sites care about both parities.
    pub fn parity(&self, compartment: CompartmentOnNeuron) -> (bool, bool) {
        let mut even = false;
        let mut odd = false;
        for x in 0..GRID_COLUMNS {
            for y in 0..GRID_ROWS {
                if self.cells[[y, x]].compartment == Some(compartment) {
                    even |= x % 2 == 0;
                    odd |= x % 2 == 1;
                }
            }
        }
        (even, odd)
    }

    /// Compartments with at least one circuit in an even column.
    pub fn even_parity(&self) -> AHashSet<CompartmentOnNeuron> {
        self.parity_set(0)
    }

    /// Compartments with at least one circuit in an odd column.
    pub fn odd_parity(&self) -> AHashSet<CompartmentOnNeuron> {
        self.parity_set(1)
    }

    fn parity_set(&self, remainder: usize) -> AHashSet<CompartmentOnNeuron> {
        let mut out = AHashSet::new();
        for x in (remainder..GRID_COLUMNS).step_by(2) {
            for y in 0..GRID_ROWS {
                if let Some(tag) = self.cells[[y, x]].compartment {
                    out.insert(tag);
                }
            }
        }
        out
    }

    /// Removes every compartment tag, keeping the switches.
    pub fn clear_compartments(&mut self) {
        for cell in self.cells.iter_mut() {
            cell.compartment = None;
        }
    }

    /// Rewrites compartment tags through `map`; tags without a map entry are
    /// cleared.
    pub fn retag_compartments(
        &mut self,
        map: &AHashMap<CompartmentOnNeuron, CompartmentOnNeuron>,
    ) {
        for cell in self.cells.iter_mut() {
            cell.compartment = cell.compartment.and_then(|tag| map.get(&tag).copied());
        }
    }

    pub fn cells(&self) -> &Array2<NeuronCircuit> {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut Array2<NeuronCircuit> {
        &mut self.cells
    }
}
