// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Output of the routing pipeline: everything a hardware configuration needs
to realize the logical network's event traffic.
*/

use ahash::AHashMap;

use crate::chip::{EventOutput, Hemisphere, Label, Mask, PadiBus, SynapseDriver, SynapseRow};
use crate::constraints::CompartmentOnNetwork;
use crate::network::ProjectionDescriptor;

/// Receptor mode of a claimed synapse row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynapseRowMode {
    Disabled,
    Excitatory,
    Inhibitory,
}

/// Full spike label of a source: the driver-compare part travelling on the
/// bus and the 6-bit part matched within the synapse row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpikeLabel {
    pub bus_label: Label,
    pub synapse_label: u8,
}

/// One realized connection of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedConnection {
    /// Index into the projection's connection list.
    pub index: usize,
    pub row: SynapseRow,
    /// Target circuit column within the row.
    pub column: usize,
    /// Synapse label the placed synapse matches.
    pub synapse_label: u8,
    pub weight: u8,
}

/// Enabled crossbar routes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossbarConfiguration {
    /// Recurrent routes from an event output toward a block, unfiltered.
    pub internal_routes: Vec<(EventOutput, Hemisphere)>,
    /// Event outputs forwarded off-chip for spike recording.
    pub recording_outputs: Vec<EventOutput>,
    /// Buses driven by background generators.
    pub background_routes: Vec<PadiBus>,
    /// Off-chip input channels in use; channel `i` feeds bus `i` of both
    /// blocks through the static diagonal filter.
    pub external_channels: Vec<usize>,
}

/// The routed network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingSolution {
    pub connections: AHashMap<ProjectionDescriptor, Vec<PlacedConnection>>,
    pub crossbar: CrossbarConfiguration,
    pub synapse_row_modes: AHashMap<SynapseRow, SynapseRowMode>,
    pub synapse_driver_masks: AHashMap<(PadiBus, SynapseDriver), Mask>,
    /// Event labels of spiking internal compartments, sources and
    /// recorded-only alike.
    pub spike_labels: AHashMap<CompartmentOnNetwork, SpikeLabel>,
}
