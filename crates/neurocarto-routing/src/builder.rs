// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
The routing pipeline.

[`RoutingBuilder::route`] turns a logical network into a
[`RoutingSolution`] in stages: derive and check the constraints, disable
crossbar routes that only recording needs, gather the event sources,
partition them onto buses, solve the synapse driver allocation, synthesize
spike labels, place every connection onto a synapse row and column, and
finally collect the crossbar configuration. Each stage that proves the
network infeasible fails with [`RoutingError::UnsuccessfulRouting`] naming
itself.
*/

use std::time::Duration;

use ahash::{AHashMap, AHashSet};
use tracing::{debug, info};

use crate::chip::{
    forwards, EventOutput, Hemisphere, Label, PadiBus, SynapseRow,
    SYNAPSE_ROWS_PER_DRIVER,
};
use crate::constraints::{CompartmentOnNetwork, RoutingConstraints};
use crate::driver_manager::{Allocation, AllocationPolicy, SynapseDriverOnDlsManager};
use crate::error::{RoutingError, RoutingResult};
use crate::network::{Network, Receptor};
use crate::result::{
    CrossbarConfiguration, PlacedConnection, RoutingSolution, SpikeLabel, SynapseRowMode,
};
use crate::source_manager::{
    AllocationRequest, BackgroundSource, ExternalSource, InternalSource,
    SourceOnPadiBusManager,
};

/// Configuration surface of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingOptions {
    pub allocation_policy: AllocationPolicy,
    /// Wall-clock budget for the driver allocation search.
    pub timeout: Option<Duration>,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self { allocation_policy: AllocationPolicy::default(), timeout: None }
    }
}

/// Synapse rows of one request on one bus: rows already carrying a receptor
/// mode plus the still unclaimed remainder, in driver order.
struct RowPool {
    free: Vec<SynapseRow>,
    claimed: Vec<(SynapseRow, SynapseRowMode)>,
}

fn receptor_mode(receptor: Receptor) -> SynapseRowMode {
    match receptor {
        Receptor::Excitatory => SynapseRowMode::Excitatory,
        Receptor::Inhibitory => SynapseRowMode::Inhibitory,
    }
}

/// Dense placement: reuse a claimed row of the right mode with the target
/// column still free, claim a fresh row otherwise.
fn place_in_pool(
    pool: &mut RowPool,
    used: &mut AHashMap<SynapseRow, AHashSet<usize>>,
    mode: SynapseRowMode,
    column: usize,
) -> Option<SynapseRow> {
    for &(row, row_mode) in &pool.claimed {
        if row_mode == mode && !used.get(&row).is_some_and(|columns| columns.contains(&column))
        {
            used.entry(row).or_default().insert(column);
            return Some(row);
        }
    }
    if pool.free.is_empty() {
        return None;
    }
    let row = pool.free.remove(0);
    pool.claimed.push((row, mode));
    used.entry(row).or_default().insert(column);
    Some(row)
}

pub struct RoutingBuilder;

impl RoutingBuilder {
    pub fn route(
        network: &Network,
        options: &RoutingOptions,
    ) -> RoutingResult<RoutingSolution> {
        let constraints = RoutingConstraints::from_network(network)?;
        constraints.check()?;

        // Gather sources with their per-block out-degrees.
        let mut internal_sources: Vec<InternalSource> = Vec::new();
        let mut internal_index: AHashMap<CompartmentOnNetwork, usize> = AHashMap::new();
        for connection in constraints.internal_connections() {
            let i = *internal_index.entry(connection.source).or_insert_with(|| {
                internal_sources.push(InternalSource {
                    descriptor: connection.source,
                    spike: connection.spike,
                    out_degree: AHashMap::new(),
                });
                internal_sources.len() - 1
            });
            *internal_sources[i]
                .out_degree
                .entry((connection.bus.block, connection.receptor))
                .or_default() += 1;
        }

        // A background population drives one generator bank per block; its
        // traffic per bus is an independent source.
        let mut background_sources: Vec<BackgroundSource> = Vec::new();
        let mut background_index: AHashMap<(CompartmentOnNetwork, PadiBus), usize> =
            AHashMap::new();
        for connection in constraints.background_connections() {
            let i = *background_index
                .entry((connection.source, connection.bus))
                .or_insert_with(|| {
                    background_sources.push(BackgroundSource {
                        descriptor: connection.source,
                        bus: connection.bus,
                        out_degree: AHashMap::new(),
                    });
                    background_sources.len() - 1
                });
            *background_sources[i].out_degree.entry(connection.receptor).or_default() += 1;
        }

        let mut external_sources: Vec<ExternalSource> = Vec::new();
        let mut external_index: AHashMap<CompartmentOnNetwork, usize> = AHashMap::new();
        for connection in constraints.external_connections() {
            let i = *external_index.entry(connection.source).or_insert_with(|| {
                external_sources.push(ExternalSource {
                    descriptor: connection.source,
                    out_degree: AHashMap::new(),
                });
                external_sources.len() - 1
            });
            *external_sources[i]
                .out_degree
                .entry((connection.target_block, connection.receptor))
                .or_default() += 1;
        }

        // Event outputs hosting only recorded compartments need no crossbar
        // route toward the buses.
        let source_outputs: AHashSet<EventOutput> = internal_sources
            .iter()
            .map(|source| source.spike.event_output())
            .collect();
        let mut disabled: AHashMap<EventOutput, Vec<Hemisphere>> = AHashMap::new();
        for output in constraints.recorded_on_event_output().keys() {
            if !source_outputs.contains(output) {
                disabled.insert(*output, Hemisphere::ALL.to_vec());
            }
        }

        let manager = SourceOnPadiBusManager::new(disabled);
        let Some(partition) =
            manager.solve(&internal_sources, &background_sources, &external_sources)?
        else {
            return Err(RoutingError::UnsuccessfulRouting {
                stage: "source partitioning",
                reason: "event source demand exceeds the synapse driver capacity".into(),
            });
        };
        debug!(
            internal = partition.internal.len(),
            background = partition.background.len(),
            external = partition.external.len(),
            "partitioned source groups"
        );

        // Flatten the groups; request index == allocation index.
        let requests: Vec<AllocationRequest> = partition
            .internal
            .iter()
            .chain(&partition.background)
            .chain(&partition.external)
            .map(|group| group.request.clone())
            .collect();
        let background_offset = partition.internal.len();
        let external_offset = background_offset + partition.background.len();

        let Some(allocations) = SynapseDriverOnDlsManager::solve(
            &requests,
            options.allocation_policy,
            options.timeout,
        )?
        else {
            return Err(RoutingError::UnsuccessfulRouting {
                stage: "synapse driver allocation",
                reason: "label space exhausted without a feasible allocation".into(),
            });
        };

        // Source index -> (request index, position within group).
        let mut internal_member: AHashMap<usize, (usize, usize)> = AHashMap::new();
        for (g, group) in partition.internal.iter().enumerate() {
            for (pos, &s) in group.sources.iter().enumerate() {
                internal_member.insert(s, (g, pos));
            }
        }
        let mut background_member: AHashMap<usize, (usize, usize)> = AHashMap::new();
        for (g, group) in partition.background.iter().enumerate() {
            for (pos, &s) in group.sources.iter().enumerate() {
                background_member.insert(s, (background_offset + g, pos));
            }
        }
        let mut external_member: AHashMap<usize, (usize, usize)> = AHashMap::new();
        for (g, group) in partition.external.iter().enumerate() {
            for (pos, &s) in group.sources.iter().enumerate() {
                external_member.insert(s, (external_offset + g, pos));
            }
        }

        let mut synapse_driver_masks = AHashMap::new();
        let mut pools: AHashMap<(usize, PadiBus), RowPool> = AHashMap::new();
        for (g, allocation) in allocations.iter().enumerate() {
            for (bus, placed) in &allocation.synapse_drivers {
                let mut free = Vec::new();
                for drivers in &placed.synapse_drivers {
                    for &(driver, mask) in drivers {
                        synapse_driver_masks.insert((*bus, driver), mask);
                        for index in 0..SYNAPSE_ROWS_PER_DRIVER {
                            free.push(SynapseRow { bus: *bus, driver, index });
                        }
                    }
                }
                pools.insert((g, *bus), RowPool { free, claimed: Vec::new() });
            }
        }

        // Spike labels: the allocated bus label identifies the group, the
        // position within the group selects the synapse label.
        let mut spike_labels: AHashMap<CompartmentOnNetwork, SpikeLabel> = AHashMap::new();
        for (g, group) in partition.internal.iter().enumerate() {
            for (pos, &s) in group.sources.iter().enumerate() {
                spike_labels.insert(
                    internal_sources[s].descriptor,
                    SpikeLabel {
                        bus_label: allocations[g].label,
                        synapse_label: pos as u8,
                    },
                );
            }
        }
        for (descriptor, label) in Self::recorded_only_labels(
            &constraints,
            &source_outputs,
            &allocations,
        )? {
            spike_labels.insert(descriptor, SpikeLabel { bus_label: label, synapse_label: 0 });
        }

        // Place every connection onto a synapse row and column.
        let mut used_columns: AHashMap<SynapseRow, AHashSet<usize>> = AHashMap::new();
        let mut connections: AHashMap<_, Vec<PlacedConnection>> = AHashMap::new();

        let mut place = |g: usize,
                         pos: usize,
                         bus: PadiBus,
                         receptor: Receptor,
                         column: usize,
                         pools: &mut AHashMap<(usize, PadiBus), RowPool>,
                         used: &mut AHashMap<SynapseRow, AHashSet<usize>>|
         -> RoutingResult<(SynapseRow, u8)> {
            let pool = pools.get_mut(&(g, bus)).ok_or_else(|| {
                RoutingError::UnsuccessfulRouting {
                    stage: "synapse placement",
                    reason: format!("no drivers allocated on bus {}", bus.linear()),
                }
            })?;
            let row = place_in_pool(pool, used, receptor_mode(receptor), column)
                .ok_or_else(|| RoutingError::UnsuccessfulRouting {
                    stage: "synapse placement",
                    reason: format!("synapse rows on bus {} exhausted", bus.linear()),
                })?;
            Ok((row, pos as u8))
        };

        for connection in constraints.internal_connections() {
            let source = internal_index[&connection.source];
            let (g, pos) = internal_member[&source];
            let (row, synapse_label) = place(
                g,
                pos,
                connection.bus,
                connection.receptor,
                connection.target_circuit.column(),
                &mut pools,
                &mut used_columns,
            )?;
            let weight = connection_weight(network, connection.projection.0, connection.index)?;
            connections
                .entry(connection.projection)
                .or_default()
                .push(PlacedConnection {
                    index: connection.index,
                    row,
                    column: connection.target_circuit.column(),
                    synapse_label,
                    weight,
                });
        }
        for connection in constraints.background_connections() {
            let source = background_index[&(connection.source, connection.bus)];
            let (g, pos) = background_member[&source];
            let (row, synapse_label) = place(
                g,
                pos,
                connection.bus,
                connection.receptor,
                connection.target_circuit.column(),
                &mut pools,
                &mut used_columns,
            )?;
            let weight = connection_weight(network, connection.projection.0, connection.index)?;
            connections
                .entry(connection.projection)
                .or_default()
                .push(PlacedConnection {
                    index: connection.index,
                    row,
                    column: connection.target_circuit.column(),
                    synapse_label,
                    weight,
                });
        }
        for connection in constraints.external_connections() {
            let source = external_index[&connection.source];
            let (g, pos) = external_member[&source];
            let bus = requests[g]
                .shapes
                .keys()
                .find(|bus| bus.block == connection.target_block)
                .copied()
                .ok_or_else(|| RoutingError::UnsuccessfulRouting {
                    stage: "synapse placement",
                    reason: "external group carries no shape on the target block".into(),
                })?;
            let (row, synapse_label) = place(
                g,
                pos,
                bus,
                connection.receptor,
                connection.target_circuit.column(),
                &mut pools,
                &mut used_columns,
            )?;
            let weight = connection_weight(network, connection.projection.0, connection.index)?;
            connections
                .entry(connection.projection)
                .or_default()
                .push(PlacedConnection {
                    index: connection.index,
                    row,
                    column: connection.target_circuit.column(),
                    synapse_label,
                    weight,
                });
        }

        let mut synapse_row_modes = AHashMap::new();
        for pool in pools.values() {
            for &(row, mode) in &pool.claimed {
                synapse_row_modes.insert(row, mode);
            }
            for &row in &pool.free {
                synapse_row_modes.insert(row, SynapseRowMode::Disabled);
            }
        }

        // Crossbar: recurrent routes per used (output, block) pair,
        // recording forwards, background and off-chip channels.
        let mut crossbar = CrossbarConfiguration::default();
        for connection in constraints.internal_connections() {
            let route = (connection.spike.event_output(), connection.bus.block);
            if !crossbar.internal_routes.contains(&route) {
                crossbar.internal_routes.push(route);
            }
        }
        crossbar.internal_routes.sort_by_key(|(output, block)| (output.index(), block.index()));
        crossbar.recording_outputs = constraints
            .recorded_on_event_output()
            .keys()
            .copied()
            .collect();
        crossbar.recording_outputs.sort_by_key(|output| output.index());
        for source in &background_sources {
            if !crossbar.background_routes.contains(&source.bus) {
                crossbar.background_routes.push(source.bus);
            }
        }
        crossbar.background_routes.sort_by_key(|bus| bus.linear());
        for group in &partition.external {
            for bus in group.request.shapes.keys() {
                if !crossbar.external_channels.contains(&bus.index) {
                    crossbar.external_channels.push(bus.index);
                }
            }
        }
        crossbar.external_channels.sort_unstable();

        info!(
            connections = connections.values().map(Vec::len).sum::<usize>(),
            rows = synapse_row_modes.len(),
            sources = spike_labels.len(),
            "routing finished"
        );
        Ok(RoutingSolution {
            connections,
            crossbar,
            synapse_row_modes,
            synapse_driver_masks,
            spike_labels,
        })
    }

    /// Labels for recorded compartments without connections. On an event
    /// output shared with sources, the label must not pass any allocated
    /// driver mask; otherwise any label does.
    fn recorded_only_labels(
        constraints: &RoutingConstraints,
        source_outputs: &AHashSet<EventOutput>,
        allocations: &[Allocation],
    ) -> RoutingResult<Vec<(CompartmentOnNetwork, Label)>> {
        let mut labels = Vec::new();
        for (descriptor, spike) in constraints.only_recorded_neurons() {
            let output = spike.event_output();
            if !source_outputs.contains(&output) {
                labels.push((descriptor, Label(0)));
                continue;
            }
            let mut found = None;
            'candidates: for label in Label::all() {
                for block in Hemisphere::ALL {
                    let bus = PadiBus::new(block, output.padi_bus_on_block())?;
                    for allocation in allocations {
                        if let Some(placed) = allocation.synapse_drivers.get(&bus) {
                            for &(driver, mask) in placed.synapse_drivers.iter().flatten() {
                                if forwards(label, mask, driver) {
                                    continue 'candidates;
                                }
                            }
                        }
                    }
                }
                found = Some(label);
                break;
            }
            let label = found.ok_or_else(|| RoutingError::UnsuccessfulRouting {
                stage: "label synthesis",
                reason: format!(
                    "no silent label left on event output {}",
                    output.index()
                ),
            })?;
            labels.push((descriptor, label));
        }
        Ok(labels)
    }
}

fn connection_weight(
    network: &Network,
    projection: usize,
    index: usize,
) -> RoutingResult<u8> {
    network
        .projection(crate::network::ProjectionDescriptor(projection))
        .and_then(|p| p.connections.get(index))
        .map(|c| c.weight)
        .ok_or_else(|| RoutingError::UnsuccessfulRouting {
            stage: "synapse placement",
            reason: format!("projection {projection} lost connection {index}"),
        })
}
