// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Partitioning of event sources onto PADI buses.

Internal sources are tied to a bus index by the diagonal crossbar: every
source behind event output `i` can only ever reach bus `i % 4`, on either
block. Background generators sit on one fixed bus. External sources are
free: an FPGA input channel `i` feeds bus `i` of both blocks, so the
partitioning may pick any bus index with capacity to spare.

The manager buckets internal sources per event output, splits each bucket
into chunks of at most 64 sources (the label space of a bus), translates
chunk demand into synapse-driver shapes and hands back one allocation
request per chunk. Buckets that split carry a [`DependentLabelGroup`] so
the later label assignment keeps their chunks distinguishable. When the
fixed internal and background demand alone exceeds a bus, or the external
demand cannot be distributed into the remaining capacity, the partitioning
reports `None` rather than an error: the network is well-formed, the chip
is just too small for it.
*/

use ahash::AHashMap;
use tracing::debug;

use crate::chip::{
    EventOutput, Hemisphere, Label, NeuronCoordinate, PadiBus, NUM_LABELS,
    SYNAPSE_DRIVERS_PER_BUS, SYNAPSE_ROWS_PER_DRIVER,
};
use crate::constraints::CompartmentOnNetwork;
use crate::error::{RoutingError, RoutingResult};
use crate::network::Receptor;

/// Ties allocation requests whose labels must be assigned jointly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependentLabelGroup(pub usize);

/// A contiguous run of synapse drivers to allocate on one bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub size: usize,
    /// Exclusive shapes may not share drivers with other requests.
    pub exclusive: bool,
}

/// Driver demand of one source group, with its candidate labels.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRequest {
    pub shapes: AHashMap<PadiBus, Vec<Shape>>,
    pub labels: Vec<Label>,
    pub dependent_label_group: Option<DependentLabelGroup>,
}

impl AllocationRequest {
    pub fn size(&self) -> usize {
        self.shapes
            .values()
            .flatten()
            .map(|shape| shape.size)
            .sum()
    }
}

/// A placed source feeding the event network. The bus index is implied by
/// the spike master's event output; out-degree is kept per target block and
/// receptor.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalSource {
    pub descriptor: CompartmentOnNetwork,
    pub spike: NeuronCoordinate,
    pub out_degree: AHashMap<(Hemisphere, Receptor), usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundSource {
    pub descriptor: CompartmentOnNetwork,
    pub bus: PadiBus,
    pub out_degree: AHashMap<Receptor, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalSource {
    pub descriptor: CompartmentOnNetwork,
    pub out_degree: AHashMap<(Hemisphere, Receptor), usize>,
}

/// Sources sharing one allocation request; indices refer to the input
/// slices of [`SourceOnPadiBusManager::solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct SourceGroup {
    pub sources: Vec<usize>,
    pub request: AllocationRequest,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub internal: Vec<SourceGroup>,
    pub background: Vec<SourceGroup>,
    pub external: Vec<SourceGroup>,
}

impl Partition {
    /// Every source placed exactly once, every group within the label space
    /// of its request, every request non-empty.
    pub fn valid(
        &self,
        num_internal: usize,
        num_background: usize,
        num_external: usize,
    ) -> bool {
        for (groups, count) in [
            (&self.internal, num_internal),
            (&self.background, num_background),
            (&self.external, num_external),
        ] {
            let mut seen = vec![false; count];
            for group in groups {
                if group.sources.is_empty() || group.request.labels.is_empty() {
                    return false;
                }
                if group.sources.len() > group.request.labels.len() {
                    return false;
                }
                for &source in &group.sources {
                    match seen.get_mut(source) {
                        Some(flag) if !*flag => *flag = true,
                        _ => return false,
                    }
                }
                for shapes in group.request.shapes.values() {
                    if shapes.iter().any(|shape| shape.size > SYNAPSE_DRIVERS_PER_BUS) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

fn num_drivers(rows: usize) -> usize {
    rows.div_ceil(SYNAPSE_ROWS_PER_DRIVER)
}

fn all_labels() -> Vec<Label> {
    Label::all().collect()
}

/// Splits `indices` into chunks of at most the bus label capacity.
fn split_linear(indices: &[usize]) -> Vec<Vec<usize>> {
    indices.chunks(NUM_LABELS).map(|chunk| chunk.to_vec()).collect()
}

#[derive(Debug, Clone, Default)]
pub struct SourceOnPadiBusManager {
    /// Crossbar routes (event output to target block) that the builder
    /// disabled beforehand; no events may be scheduled across them.
    disabled_internal_routes: AHashMap<EventOutput, Vec<Hemisphere>>,
}

impl SourceOnPadiBusManager {
    pub fn new(disabled_internal_routes: AHashMap<EventOutput, Vec<Hemisphere>>) -> Self {
        Self { disabled_internal_routes }
    }

    fn route_disabled(&self, output: EventOutput, block: Hemisphere) -> bool {
        self.disabled_internal_routes
            .get(&output)
            .is_some_and(|blocks| blocks.contains(&block))
    }

    /// Driver demand of one internal chunk, per target block. A row serves
    /// one receptor, so the row count is the number of (source, receptor)
    /// pairs with events toward the block.
    fn internal_chunk_shapes(
        &self,
        output: EventOutput,
        sources: &[InternalSource],
        chunk: &[usize],
    ) -> RoutingResult<AHashMap<PadiBus, Vec<Shape>>> {
        let mut shapes = AHashMap::new();
        for block in Hemisphere::ALL {
            let mut rows = 0;
            for receptor in Receptor::ALL {
                rows += chunk
                    .iter()
                    .filter(|&&i| {
                        sources[i]
                            .out_degree
                            .get(&(block, receptor))
                            .is_some_and(|degree| *degree > 0)
                    })
                    .count();
            }
            if rows == 0 {
                continue;
            }
            if self.route_disabled(output, block) {
                return Err(RoutingError::DisabledRouteInUse);
            }
            let bus = PadiBus::new(block, output.padi_bus_on_block())?;
            shapes.insert(bus, vec![Shape { size: num_drivers(rows), exclusive: true }]);
        }
        Ok(shapes)
    }

    fn partition_internal(
        &self,
        sources: &[InternalSource],
        used: &mut AHashMap<PadiBus, usize>,
        next_group: &mut usize,
    ) -> RoutingResult<Vec<SourceGroup>> {
        let mut buckets: AHashMap<EventOutput, Vec<usize>> = AHashMap::new();
        for (i, source) in sources.iter().enumerate() {
            buckets.entry(source.spike.event_output()).or_default().push(i);
        }

        let mut groups = Vec::new();
        for output in EventOutput::all() {
            let Some(bucket) = buckets.get(&output) else { continue };
            let chunks = split_linear(bucket);
            let dependent = if chunks.len() > 1 {
                let group = DependentLabelGroup(*next_group);
                *next_group += 1;
                Some(group)
            } else {
                None
            };
            for chunk in chunks {
                let shapes = self.internal_chunk_shapes(output, sources, &chunk)?;
                for (bus, bus_shapes) in &shapes {
                    let demand: usize = bus_shapes.iter().map(|s| s.size).sum();
                    *used.entry(*bus).or_default() += demand;
                }
                groups.push(SourceGroup {
                    sources: chunk,
                    request: AllocationRequest {
                        shapes,
                        labels: all_labels(),
                        dependent_label_group: dependent,
                    },
                });
            }
        }
        Ok(groups)
    }

    fn partition_background(
        &self,
        sources: &[BackgroundSource],
        used: &mut AHashMap<PadiBus, usize>,
    ) -> RoutingResult<Vec<SourceGroup>> {
        let mut buckets: AHashMap<PadiBus, Vec<usize>> = AHashMap::new();
        for (i, source) in sources.iter().enumerate() {
            buckets.entry(source.bus).or_default().push(i);
        }

        let mut groups = Vec::new();
        for bus in PadiBus::all() {
            let Some(bucket) = buckets.get(&bus) else { continue };
            for chunk in split_linear(bucket) {
                let mut rows = 0;
                for receptor in Receptor::ALL {
                    rows += chunk
                        .iter()
                        .filter(|&&i| {
                            sources[i]
                                .out_degree
                                .get(&receptor)
                                .is_some_and(|degree| *degree > 0)
                        })
                        .count();
                }
                if rows == 0 {
                    continue;
                }
                let drivers = num_drivers(rows);
                *used.entry(bus).or_default() += drivers;
                let mut shapes = AHashMap::new();
                shapes.insert(bus, vec![Shape { size: drivers, exclusive: true }]);
                groups.push(SourceGroup {
                    sources: chunk,
                    request: AllocationRequest {
                        shapes,
                        labels: all_labels(),
                        dependent_label_group: None,
                    },
                });
            }
        }
        Ok(groups)
    }

    /// Greedy fill of external sources into the driver capacity left over
    /// after the fixed internal and background demand. An external source
    /// reaches bus `i` of both blocks through input channel `i`, so a group
    /// must fit on both blocks at once. Returns `None` when a source fits
    /// nowhere.
    fn partition_external(
        &self,
        sources: &[ExternalSource],
        used: &mut AHashMap<PadiBus, usize>,
    ) -> RoutingResult<Option<Vec<SourceGroup>>> {
        // Open group per bus index: member sources plus row count per
        // (block, receptor).
        struct Open {
            sources: Vec<usize>,
            rows: AHashMap<(Hemisphere, Receptor), usize>,
        }
        let mut open: Vec<Open> =
            (0..crate::chip::PADI_BUSES_PER_BLOCK)
                .map(|_| Open { sources: Vec::new(), rows: AHashMap::new() })
                .collect();

        'sources: for (i, source) in sources.iter().enumerate() {
            for (index, group) in open.iter_mut().enumerate() {
                if group.sources.len() >= NUM_LABELS {
                    continue;
                }
                let mut fits = true;
                for block in Hemisphere::ALL {
                    let mut rows: usize = Receptor::ALL
                        .iter()
                        .map(|receptor| {
                            group.rows.get(&(block, *receptor)).copied().unwrap_or(0)
                        })
                        .sum();
                    for receptor in Receptor::ALL {
                        if source
                            .out_degree
                            .get(&(block, receptor))
                            .is_some_and(|degree| *degree > 0)
                        {
                            rows += 1;
                        }
                    }
                    let bus = PadiBus::new(block, index)?;
                    let allocated = used.get(&bus).copied().unwrap_or(0);
                    if allocated + num_drivers(rows) > SYNAPSE_DRIVERS_PER_BUS {
                        fits = false;
                        break;
                    }
                }
                if fits {
                    group.sources.push(i);
                    for block in Hemisphere::ALL {
                        for receptor in Receptor::ALL {
                            if source
                                .out_degree
                                .get(&(block, receptor))
                                .is_some_and(|degree| *degree > 0)
                            {
                                *group.rows.entry((block, receptor)).or_default() += 1;
                            }
                        }
                    }
                    continue 'sources;
                }
            }
            debug!(source = i, "no remaining driver capacity for external source");
            return Ok(None);
        }

        let mut groups = Vec::new();
        for (index, group) in open.into_iter().enumerate() {
            if group.sources.is_empty() {
                continue;
            }
            let mut shapes = AHashMap::new();
            for block in Hemisphere::ALL {
                let rows: usize = Receptor::ALL
                    .iter()
                    .map(|receptor| {
                        group.rows.get(&(block, *receptor)).copied().unwrap_or(0)
                    })
                    .sum();
                if rows == 0 {
                    continue;
                }
                let bus = PadiBus::new(block, index)?;
                let drivers = num_drivers(rows);
                *used.entry(bus).or_default() += drivers;
                shapes.insert(bus, vec![Shape { size: drivers, exclusive: false }]);
            }
            groups.push(SourceGroup {
                sources: group.sources,
                request: AllocationRequest {
                    shapes,
                    labels: all_labels(),
                    dependent_label_group: None,
                },
            });
        }
        Ok(Some(groups))
    }

    /// Partitions all sources onto buses. `Ok(None)` means the demand does
    /// not fit the chip; errors mean the input or the construction is
    /// inconsistent.
    pub fn solve(
        &self,
        internal: &[InternalSource],
        background: &[BackgroundSource],
        external: &[ExternalSource],
    ) -> RoutingResult<Option<Partition>> {
        let mut used: AHashMap<PadiBus, usize> = AHashMap::new();
        let mut next_group = 0;

        let internal_groups =
            self.partition_internal(internal, &mut used, &mut next_group)?;
        let background_groups = self.partition_background(background, &mut used)?;

        if let Some((bus, demand)) = used
            .iter()
            .find(|(_, demand)| **demand > SYNAPSE_DRIVERS_PER_BUS)
        {
            debug!(
                bus = bus.linear(),
                demand, "fixed source demand exceeds driver capacity"
            );
            return Ok(None);
        }

        let Some(external_groups) = self.partition_external(external, &mut used)? else {
            return Ok(None);
        };

        let partition = Partition {
            internal: internal_groups,
            background: background_groups,
            external: external_groups,
        };
        if !partition.valid(internal.len(), background.len(), external.len()) {
            return Err(RoutingError::InvalidPartition);
        }
        Ok(Some(partition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(neuron: usize) -> CompartmentOnNetwork {
        CompartmentOnNetwork {
            population: crate::network::PopulationDescriptor(0),
            neuron,
            compartment: 0,
        }
    }

    fn internal_source(column: usize, neuron: usize) -> InternalSource {
        let mut out_degree = AHashMap::new();
        out_degree.insert((Hemisphere::Top, Receptor::Excitatory), 1);
        InternalSource {
            descriptor: descriptor(neuron),
            spike: NeuronCoordinate::new(column, 0).unwrap(),
            out_degree,
        }
    }

    #[test]
    fn small_bucket_yields_one_exclusive_request() {
        let sources: Vec<_> = (0..3).map(|n| internal_source(n, n)).collect();
        let manager = SourceOnPadiBusManager::default();
        let partition = manager.solve(&sources, &[], &[]).unwrap().unwrap();
        assert_eq!(partition.internal.len(), 1);
        let request = &partition.internal[0].request;
        assert_eq!(request.dependent_label_group, None);
        let bus = PadiBus::new(Hemisphere::Top, 0).unwrap();
        // Three sources, one receptor: three rows, two drivers.
        assert_eq!(request.shapes[&bus], vec![Shape { size: 2, exclusive: true }]);
    }

    #[test]
    fn oversized_source_population_does_not_fit() {
        // 65 sources behind one event output: a 64-chunk and a 1-chunk.
        let sources: Vec<_> = (0..65)
            .map(|n| internal_source(n % 32, n))
            .collect();
        let manager = SourceOnPadiBusManager::default();
        // 64 rows -> 32 drivers plus 1 row -> 1 driver: over capacity.
        assert_eq!(manager.solve(&sources, &[], &[]).unwrap(), None);
    }

    #[test]
    fn split_buckets_stay_solvable_with_less_demand() {
        // 65 sources, but half of them silent toward the top block.
        let mut sources: Vec<_> = (0..65).map(|n| internal_source(n % 32, n)).collect();
        for source in sources.iter_mut().skip(1).step_by(2) {
            source.out_degree.clear();
        }
        let manager = SourceOnPadiBusManager::default();
        let partition = manager.solve(&sources, &[], &[]).unwrap().unwrap();
        assert_eq!(partition.internal.len(), 2);
        assert_eq!(
            partition.internal[0].request.dependent_label_group,
            partition.internal[1].request.dependent_label_group
        );
        assert!(partition.internal[0].request.dependent_label_group.is_some());
    }

    #[test]
    fn disabled_route_with_events_is_an_error() {
        let sources = vec![internal_source(0, 0)];
        let mut disabled = AHashMap::new();
        disabled.insert(EventOutput::new(0).unwrap(), vec![Hemisphere::Top]);
        let manager = SourceOnPadiBusManager::new(disabled);
        assert_eq!(
            manager.solve(&sources, &[], &[]),
            Err(RoutingError::DisabledRouteInUse)
        );
    }

    #[test]
    fn disabled_route_without_events_is_erased() {
        let mut source = internal_source(0, 0);
        source.out_degree.clear();
        source
            .out_degree
            .insert((Hemisphere::Bottom, Receptor::Inhibitory), 2);
        let mut disabled = AHashMap::new();
        disabled.insert(EventOutput::new(0).unwrap(), vec![Hemisphere::Top]);
        let manager = SourceOnPadiBusManager::new(disabled);
        let partition = manager.solve(&[source], &[], &[]).unwrap().unwrap();
        let request = &partition.internal[0].request;
        assert_eq!(request.shapes.len(), 1);
        assert!(request
            .shapes
            .contains_key(&PadiBus::new(Hemisphere::Bottom, 0).unwrap()));
    }

    #[test]
    fn external_sources_fill_remaining_capacity() {
        let internal: Vec<_> = (0..3).map(|n| internal_source(n, n)).collect();
        let mut out_degree = AHashMap::new();
        out_degree.insert((Hemisphere::Top, Receptor::Excitatory), 4);
        let external = vec![ExternalSource { descriptor: descriptor(10), out_degree }];
        let manager = SourceOnPadiBusManager::default();
        let partition = manager.solve(&internal, &[], &external).unwrap().unwrap();
        assert_eq!(partition.external.len(), 1);
        assert!(!partition.external[0].request.shapes[&PadiBus::new(
            Hemisphere::Top,
            0
        )
        .unwrap()][0]
            .exclusive);
    }

    #[test]
    fn background_demand_occupies_its_fixed_bus() {
        let mut out_degree = AHashMap::new();
        out_degree.insert(Receptor::Excitatory, 7);
        let background = vec![BackgroundSource {
            descriptor: descriptor(0),
            bus: PadiBus::new(Hemisphere::Bottom, 3).unwrap(),
            out_degree,
        }];
        let manager = SourceOnPadiBusManager::default();
        let partition = manager.solve(&[], &background, &[]).unwrap().unwrap();
        assert_eq!(partition.background.len(), 1);
        assert_eq!(partition.background[0].request.size(), 1);
    }
}
