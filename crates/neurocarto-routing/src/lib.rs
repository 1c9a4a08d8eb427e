// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
# neurocarto-routing

Event routing for placed multicompartment networks.

Once neurons are placed on the grid, their spikes have to reach their
synaptic targets through the chip's fixed event fabric: event outputs per
column group, a crossbar, PADI buses and synapse drivers comparing 6-bit
labels under per-driver masks. This crate derives the feasibility
constraints of a logical network, partitions its sources onto buses,
allocates synapse drivers and labels and places every connection onto a
synapse row, producing a complete [`RoutingSolution`].

## Architecture

- `chip` — the fixed routing topology as coordinate newtypes.
- `network` — populations (internal, background, external) and projections.
- `constraints` — [`RoutingConstraints`], demand extraction and ceilings.
- `source_manager` — [`SourceOnPadiBusManager`], source-to-bus partitioning.
- `driver_manager` — per-bus and chip-wide synapse driver allocation.
- `builder` — [`RoutingBuilder`], the staged pipeline.
- `result` — the routed configuration.
- `error` — [`RoutingError`].
*/

pub mod builder;
pub mod chip;
pub mod constraints;
pub mod driver_manager;
pub mod error;
pub mod network;
pub mod result;
pub mod source_manager;

pub use builder::{RoutingBuilder, RoutingOptions};
pub use chip::{
    forwards, EventOutput, Hemisphere, Label, Mask, NeuronCoordinate, PadiBus,
    SynapseDriver, SynapseRow, NUM_EVENT_OUTPUTS, NUM_LABELS, NUM_PADI_BUSES,
    PADI_BUSES_PER_BLOCK, SYNAPSE_DRIVERS_PER_BUS, SYNAPSE_ROWS_PER_BUS,
    SYNAPSE_ROWS_PER_DRIVER,
};
pub use constraints::{
    CompartmentOnNetwork, PadiBusConstraints, RoutingConstraints, MAX_TOTAL_IN_DEGREE,
};
pub use driver_manager::{
    Allocation, AllocationPolicy, PadiBusAllocation, PadiBusAllocationRequest,
    SynapseDriverOnDlsManager, SynapseDriverOnPadiBusManager,
};
pub use error::{RoutingError, RoutingResult};
pub use network::{
    BackgroundPopulation, Connection, ExternalPopulation, InternalPopulation, Network,
    PlacedCompartment, PlacedNeuron, Population, PopulationDescriptor, Projection,
    ProjectionDescriptor, Receptor,
};
pub use result::{
    CrossbarConfiguration, PlacedConnection, RoutingSolution, SpikeLabel, SynapseRowMode,
};
pub use source_manager::{
    AllocationRequest, BackgroundSource, DependentLabelGroup, ExternalSource,
    InternalSource, Partition, Shape, SourceGroup, SourceOnPadiBusManager,
};
