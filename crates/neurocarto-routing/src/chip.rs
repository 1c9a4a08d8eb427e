// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Fixed event-routing topology of the chip.

Spikes leave the neuron array through one event output per group of 32
columns, cross the crossbar, and reach synapse drivers over PADI buses. Each
hemisphere owns one PADI-bus block of four buses; event output `i` feeds bus
`i % 4` of either block (the diagonal correspondence). A bus serves 32
synapse drivers with two synapse rows each; a driver fires a row when the
6-bit event label passes its compare mask, and the 6 low label bits then
select one of 64 synapse labels within the row.

All coordinates are plain newtypes with total conversions; constructors
range-check once, everything after that is infallible.
*/

use serde::{Deserialize, Serialize};

use neurocarto_placement::{GRID_COLUMNS, GRID_ROWS};

use crate::error::{RoutingError, RoutingResult};

/// Neuron columns served by one event output.
pub const COLUMNS_PER_EVENT_OUTPUT: usize = 32;
/// Event outputs of the neuron array.
pub const NUM_EVENT_OUTPUTS: usize = GRID_COLUMNS / COLUMNS_PER_EVENT_OUTPUT;
/// PADI buses per block.
pub const PADI_BUSES_PER_BLOCK: usize = 4;
/// PADI buses on the whole chip.
pub const NUM_PADI_BUSES: usize = PADI_BUSES_PER_BLOCK * 2;
/// Synapse drivers reachable over one PADI bus.
pub const SYNAPSE_DRIVERS_PER_BUS: usize = 32;
/// Synapse rows per synapse driver.
pub const SYNAPSE_ROWS_PER_DRIVER: usize = 2;
/// Synapse rows reachable over one PADI bus.
pub const SYNAPSE_ROWS_PER_BUS: usize = SYNAPSE_DRIVERS_PER_BUS * SYNAPSE_ROWS_PER_DRIVER;
/// Distinct labels per bus, one 6-bit compare space.
pub const NUM_LABELS: usize = 64;

/// One of the two neuron rows; also the PADI-bus block serving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Hemisphere {
    Top,
    Bottom,
}

impl Hemisphere {
    pub const ALL: [Hemisphere; 2] = [Hemisphere::Top, Hemisphere::Bottom];

    pub fn index(self) -> usize {
        match self {
            Hemisphere::Top => 0,
            Hemisphere::Bottom => 1,
        }
    }

    pub fn from_row(y: usize) -> RoutingResult<Self> {
        match y {
            0 => Ok(Hemisphere::Top),
            1 => Ok(Hemisphere::Bottom),
            _ => Err(RoutingError::CoordinateOutOfRange(y)),
        }
    }
}

/// A physical neuron circuit as seen by the event path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NeuronCoordinate {
    x: usize,
    y: usize,
}

impl NeuronCoordinate {
    pub fn new(x: usize, y: usize) -> RoutingResult<Self> {
        if x >= GRID_COLUMNS {
            return Err(RoutingError::CoordinateOutOfRange(x));
        }
        if y >= GRID_ROWS {
            return Err(RoutingError::CoordinateOutOfRange(y));
        }
        Ok(Self { x, y })
    }

    pub fn column(self) -> usize {
        self.x
    }

    pub fn row(self) -> usize {
        self.y
    }

    pub fn hemisphere(self) -> Hemisphere {
        if self.y == 0 {
            Hemisphere::Top
        } else {
            Hemisphere::Bottom
        }
    }

    /// The event output collecting this column's spikes.
    pub fn event_output(self) -> EventOutput {
        EventOutput(self.x / COLUMNS_PER_EVENT_OUTPUT)
    }
}

/// One of the eight neuron event outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventOutput(usize);

impl EventOutput {
    pub fn new(index: usize) -> RoutingResult<Self> {
        if index >= NUM_EVENT_OUTPUTS {
            return Err(RoutingError::CoordinateOutOfRange(index));
        }
        Ok(Self(index))
    }

    pub fn all() -> impl Iterator<Item = EventOutput> {
        (0..NUM_EVENT_OUTPUTS).map(EventOutput)
    }

    pub fn index(self) -> usize {
        self.0
    }

    /// Diagonal correspondence: output `i` can only drive bus `i % 4`.
    pub fn padi_bus_on_block(self) -> usize {
        self.0 % PADI_BUSES_PER_BLOCK
    }

    /// Backend block the output belongs to.
    pub fn backend_block(self) -> usize {
        self.0 / PADI_BUSES_PER_BLOCK
    }
}

/// A PADI bus on the whole chip: bus index within a block plus the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PadiBus {
    pub block: Hemisphere,
    pub index: usize,
}

impl PadiBus {
    pub fn new(block: Hemisphere, index: usize) -> RoutingResult<Self> {
        if index >= PADI_BUSES_PER_BLOCK {
            return Err(RoutingError::CoordinateOutOfRange(index));
        }
        Ok(Self { block, index })
    }

    pub fn all() -> impl Iterator<Item = PadiBus> {
        Hemisphere::ALL.into_iter().flat_map(|block| {
            (0..PADI_BUSES_PER_BLOCK).map(move |index| PadiBus { block, index })
        })
    }

    /// Dense index over all buses, top block first.
    pub fn linear(self) -> usize {
        self.block.index() * PADI_BUSES_PER_BLOCK + self.index
    }
}

/// A synapse driver within its PADI bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SynapseDriver(pub usize);

impl SynapseDriver {
    pub fn all() -> impl Iterator<Item = SynapseDriver> {
        (0..SYNAPSE_DRIVERS_PER_BUS).map(SynapseDriver)
    }
}

/// 6-bit event label on a PADI bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label(pub u8);

impl Label {
    pub fn all() -> impl Iterator<Item = Label> {
        (0..NUM_LABELS as u8).map(Label)
    }
}

/// 6-bit compare mask of a synapse driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mask(pub u8);

impl Mask {
    pub fn all() -> impl Iterator<Item = Mask> {
        (0..NUM_LABELS as u8).map(Mask)
    }
}

/// True when an event with `label` fires `driver` under `mask`.
pub fn forwards(label: Label, mask: Mask, driver: SynapseDriver) -> bool {
    (label.0 & mask.0) == (driver.0 as u8 & mask.0)
}

/// A synapse row addressed by bus, driver and row within the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SynapseRow {
    pub bus: PadiBus,
    pub driver: SynapseDriver,
    pub index: usize,
}
