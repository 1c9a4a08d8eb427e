// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Synapse driver allocation.

Two layers. [`SynapseDriverOnPadiBusManager`] works on a single bus: given
requests with a concrete label each, it places their driver shapes onto the
32 drivers so that every driver's compare mask forwards exactly the events
it should. A mask isolates a request when no other request's label passes
it; exclusive shapes must use isolating masks, shapes of a request must sit
on contiguous drivers.

[`SynapseDriverOnDlsManager`] works on the whole chip: requests arrive with
candidate label lists instead of fixed labels, possibly spanning both
blocks, possibly tied into dependent label groups. It splits the requests
into collections that share no bus, sweeps each collection's joint label
space with an odometer and solves every touched bus locally until a
combination works, within an optional wall-clock budget.
*/

use std::time::{Duration, Instant};

use ahash::AHashMap;
use tracing::{debug, trace};

use crate::chip::{forwards, Label, Mask, PadiBus, SynapseDriver, SYNAPSE_DRIVERS_PER_BUS};
use crate::error::{RoutingError, RoutingResult};
use crate::source_manager::{AllocationRequest, Shape};

/// How the per-bus manager searches for a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPolicy {
    /// First-fit in request order; optionally places exclusive requests
    /// before shared ones.
    Greedy { enable_exclusive_first: bool },
    /// Exhaustive search over shape positions and masks.
    Backtracking,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        AllocationPolicy::Greedy { enable_exclusive_first: true }
    }
}

/// One request projected onto a single bus, label already chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct PadiBusAllocationRequest {
    pub shapes: Vec<Shape>,
    pub label: Label,
}

/// Placed drivers of one request on one bus, one entry per shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PadiBusAllocation {
    pub synapse_drivers: Vec<Vec<(SynapseDriver, Mask)>>,
}

/// Chip-wide allocation of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub synapse_drivers: AHashMap<PadiBus, PadiBusAllocation>,
    pub label: Label,
}

pub struct SynapseDriverOnPadiBusManager;

impl SynapseDriverOnPadiBusManager {
    pub fn has_unique_labels(requests: &[PadiBusAllocationRequest]) -> bool {
        for (i, request) in requests.iter().enumerate() {
            if requests[..i].iter().any(|other| other.label == request.label) {
                return false;
            }
        }
        true
    }

    pub fn allocations_fit_available_size(requests: &[PadiBusAllocationRequest]) -> bool {
        let total: usize = requests
            .iter()
            .flat_map(|request| &request.shapes)
            .map(|shape| shape.size)
            .sum();
        total <= SYNAPSE_DRIVERS_PER_BUS
    }

    /// Per request, the masks under which no other request's label is
    /// forwarded alongside its own.
    pub fn generate_isolating_masks(requests: &[PadiBusAllocationRequest]) -> Vec<Vec<Mask>> {
        requests
            .iter()
            .enumerate()
            .map(|(i, request)| {
                Mask::all()
                    .filter(|mask| {
                        requests.iter().enumerate().all(|(j, other)| {
                            i == j
                                || (request.label.0 & mask.0) != (other.label.0 & mask.0)
                        })
                    })
                    .collect()
            })
            .collect()
    }

    pub fn allocations_can_be_isolated(requests: &[PadiBusAllocationRequest]) -> bool {
        Self::generate_isolating_masks(requests)
            .iter()
            .all(|masks| !masks.is_empty())
    }

    /// Per driver, the (request, mask) pairs under which the driver
    /// forwards that request alone.
    pub fn generate_isolated_synapse_drivers(
        requests: &[PadiBusAllocationRequest],
    ) -> Vec<Vec<(usize, Mask)>> {
        let isolating = Self::generate_isolating_masks(requests);
        SynapseDriver::all()
            .map(|driver| {
                let mut entries = Vec::new();
                for (i, request) in requests.iter().enumerate() {
                    for &mask in &isolating[i] {
                        if forwards(request.label, mask, driver) {
                            entries.push((i, mask));
                        }
                    }
                }
                entries
            })
            .collect()
    }

    /// True when every request, considered alone, finds a contiguous run of
    /// drivers it can isolate. Necessary, not sufficient.
    pub fn allocations_can_be_placed_individually(
        requests: &[PadiBusAllocationRequest],
    ) -> bool {
        let isolated = Self::generate_isolated_synapse_drivers(requests);
        requests.iter().enumerate().all(|(i, request)| {
            request.shapes.iter().all(|shape| {
                Mask::all().any(|mask| {
                    Self::find_run(&[false; SYNAPSE_DRIVERS_PER_BUS], shape.size, |d| {
                        isolated[d].iter().any(|&(r, m)| r == i && m == mask)
                    })
                    .is_some()
                })
            })
        })
    }

    /// First start index of a `size`-long run of free drivers all passing
    /// `eligible`.
    fn find_run(
        used: &[bool; SYNAPSE_DRIVERS_PER_BUS],
        size: usize,
        eligible: impl Fn(usize) -> bool,
    ) -> Option<usize> {
        if size == 0 || size > SYNAPSE_DRIVERS_PER_BUS {
            return None;
        }
        (0..=SYNAPSE_DRIVERS_PER_BUS - size).find(|&start| {
            (start..start + size).all(|d| !used[d] && eligible(d))
        })
    }

    /// Masks a shape of `request` may use, isolation first. Non-exclusive
    /// shapes may fall back to any forwarding mask.
    fn candidate_masks(
        requests: &[PadiBusAllocationRequest],
        isolating: &[Vec<Mask>],
        request: usize,
        exclusive: bool,
    ) -> Vec<Mask> {
        let mut masks = isolating[request].clone();
        if !exclusive {
            for mask in Mask::all() {
                if !masks.contains(&mask) {
                    masks.push(mask);
                }
            }
        }
        let label = requests[request].label;
        masks
            .into_iter()
            .filter(|&mask| {
                SynapseDriver::all().any(|driver| forwards(label, mask, driver))
            })
            .collect()
    }

    fn place_greedy(
        requests: &[PadiBusAllocationRequest],
        order: &[usize],
    ) -> Option<Vec<PadiBusAllocation>> {
        let isolating = Self::generate_isolating_masks(requests);
        let mut used = [false; SYNAPSE_DRIVERS_PER_BUS];
        let mut allocations = vec![PadiBusAllocation::default(); requests.len()];
        for &i in order {
            for shape in &requests[i].shapes {
                let mut placed = false;
                for mask in Self::candidate_masks(requests, &isolating, i, shape.exclusive)
                {
                    if let Some(start) = Self::find_run(&used, shape.size, |d| {
                        forwards(requests[i].label, mask, SynapseDriver(d))
                    }) {
                        let drivers = (start..start + shape.size)
                            .map(|d| {
                                used[d] = true;
                                (SynapseDriver(d), mask)
                            })
                            .collect();
                        allocations[i].synapse_drivers.push(drivers);
                        placed = true;
                        break;
                    }
                }
                if !placed {
                    return None;
                }
            }
        }
        Some(allocations)
    }

    fn place_backtracking(
        requests: &[PadiBusAllocationRequest],
        deadline: Option<Instant>,
    ) -> Option<Vec<PadiBusAllocation>> {
        // Flatten to (request, shape) work items; search positions and
        // masks depth-first.
        let items: Vec<(usize, Shape)> = requests
            .iter()
            .enumerate()
            .flat_map(|(i, request)| request.shapes.iter().map(move |&shape| (i, shape)))
            .collect();
        let isolating = Self::generate_isolating_masks(requests);
        let mut used = [false; SYNAPSE_DRIVERS_PER_BUS];
        let mut allocations = vec![PadiBusAllocation::default(); requests.len()];

        fn descend(
            requests: &[PadiBusAllocationRequest],
            isolating: &[Vec<Mask>],
            items: &[(usize, Shape)],
            depth: usize,
            used: &mut [bool; SYNAPSE_DRIVERS_PER_BUS],
            allocations: &mut Vec<PadiBusAllocation>,
            deadline: Option<Instant>,
        ) -> bool {
            if depth == items.len() {
                return true;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }
            let (i, shape) = items[depth];
            let masks = SynapseDriverOnPadiBusManager::candidate_masks(
                requests, isolating, i, shape.exclusive,
            );
            for mask in masks {
                let limit = SYNAPSE_DRIVERS_PER_BUS.saturating_sub(shape.size);
                for start in 0..=limit {
                    let fits = (start..start + shape.size).all(|d| {
                        !used[d] && forwards(requests[i].label, mask, SynapseDriver(d))
                    });
                    if !fits {
                        continue;
                    }
                    for d in start..start + shape.size {
                        used[d] = true;
                    }
                    allocations[i]
                        .synapse_drivers
                        .push((start..start + shape.size).map(|d| (SynapseDriver(d), mask)).collect());
                    if descend(
                        requests, isolating, items, depth + 1, used, allocations, deadline,
                    ) {
                        return true;
                    }
                    allocations[i].synapse_drivers.pop();
                    for d in start..start + shape.size {
                        used[d] = false;
                    }
                }
            }
            false
        }

        if descend(requests, &isolating, &items, 0, &mut used, &mut allocations, deadline)
        {
            Some(allocations)
        } else {
            None
        }
    }

    /// Places all requests on the bus, or `None` when the label choice does
    /// not admit a placement.
    pub fn allocate(
        requests: &[PadiBusAllocationRequest],
        policy: AllocationPolicy,
        deadline: Option<Instant>,
    ) -> Option<Vec<PadiBusAllocation>> {
        if !Self::has_unique_labels(requests)
            || !Self::allocations_fit_available_size(requests)
            || !Self::allocations_can_be_isolated(requests)
        {
            return None;
        }
        match policy {
            AllocationPolicy::Greedy { enable_exclusive_first } => {
                let mut order: Vec<usize> = (0..requests.len()).collect();
                if enable_exclusive_first {
                    order.sort_by_key(|&i| {
                        !requests[i].shapes.iter().any(|shape| shape.exclusive)
                    });
                }
                Self::place_greedy(requests, &order)
            }
            AllocationPolicy::Backtracking => Self::place_backtracking(requests, deadline),
        }
    }

    /// Placement soundness: sizes, contiguity, no driver reuse, forwarding
    /// of the own label, isolation of exclusive shapes.
    pub fn valid(
        requests: &[PadiBusAllocationRequest],
        allocations: &[PadiBusAllocation],
    ) -> bool {
        if requests.len() != allocations.len() {
            return false;
        }
        let mut used = [false; SYNAPSE_DRIVERS_PER_BUS];
        for (request, allocation) in requests.iter().zip(allocations) {
            if request.shapes.len() != allocation.synapse_drivers.len() {
                return false;
            }
            for (shape, drivers) in request.shapes.iter().zip(&allocation.synapse_drivers)
            {
                if drivers.len() != shape.size {
                    return false;
                }
                for window in drivers.windows(2) {
                    if window[1].0 .0 != window[0].0 .0 + 1 {
                        return false;
                    }
                }
                for &(driver, mask) in drivers {
                    if used[driver.0] {
                        return false;
                    }
                    used[driver.0] = true;
                    if !forwards(request.label, mask, driver) {
                        return false;
                    }
                    if shape.exclusive
                        && requests
                            .iter()
                            .any(|other| {
                                other.label != request.label
                                    && forwards(other.label, mask, driver)
                            })
                    {
                        return false;
                    }
                }
            }
        }
        true
    }
}

/// Union of request indices transitively sharing a bus or a dependent
/// label group; their label choices interact and must be swept jointly.
fn interdependent_collections(requests: &[AllocationRequest]) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..requests.len()).collect();
    fn find(parent: &mut Vec<usize>, i: usize) -> usize {
        if parent[i] != i {
            let root = find(parent, parent[i]);
            parent[i] = root;
        }
        parent[i]
    }
    let union = |parent: &mut Vec<usize>, a: usize, b: usize| {
        let ra = find(parent, a);
        let rb = find(parent, b);
        if ra != rb {
            parent[ra] = rb;
        }
    };

    let mut by_bus: AHashMap<PadiBus, usize> = AHashMap::new();
    let mut by_group: AHashMap<usize, usize> = AHashMap::new();
    for (i, request) in requests.iter().enumerate() {
        for bus in request.shapes.keys() {
            match by_bus.get(bus) {
                Some(&first) => union(&mut parent, i, first),
                None => {
                    by_bus.insert(*bus, i);
                }
            }
        }
        if let Some(group) = request.dependent_label_group {
            match by_group.get(&group.0) {
                Some(&first) => union(&mut parent, i, first),
                None => {
                    by_group.insert(group.0, i);
                }
            }
        }
    }

    let mut collections: AHashMap<usize, Vec<usize>> = AHashMap::new();
    for i in 0..requests.len() {
        let root = find(&mut parent, i);
        collections.entry(root).or_default().push(i);
    }
    let mut result: Vec<Vec<usize>> = collections.into_values().collect();
    result.sort_by_key(|collection| collection[0]);
    result
}

pub struct SynapseDriverOnDlsManager;

impl SynapseDriverOnDlsManager {
    fn validate(requests: &[AllocationRequest]) -> RoutingResult<()> {
        for request in requests {
            let empty_shapes = request
                .shapes
                .values()
                .all(|shapes| shapes.iter().all(|shape| shape.size == 0));
            if request.labels.is_empty() || request.shapes.is_empty() || empty_shapes {
                return Err(RoutingError::InvalidAllocationRequest);
            }
        }
        let mut group_sizes: AHashMap<usize, usize> = AHashMap::new();
        for request in requests {
            if let Some(group) = request.dependent_label_group {
                let count = group_sizes.entry(group.0).or_insert(request.labels.len());
                if *count != request.labels.len() {
                    return Err(RoutingError::InhomogeneousLabelGroup(group.0));
                }
            }
        }
        Ok(())
    }

    /// Label choice for one odometer setting of a collection. Members of a
    /// dependent group take successive labels from the shared base index so
    /// they never collide.
    fn assign_labels(
        requests: &[AllocationRequest],
        collection: &[usize],
        setting: &[usize],
    ) -> Vec<(usize, Label)> {
        let mut group_base: AHashMap<usize, usize> = AHashMap::new();
        let mut group_offset: AHashMap<usize, usize> = AHashMap::new();
        let mut dimension = 0;
        let mut labels = Vec::with_capacity(collection.len());
        for &i in collection {
            let request = &requests[i];
            let index = match request.dependent_label_group {
                Some(group) => {
                    let base = *group_base.entry(group.0).or_insert_with(|| {
                        let base = setting[dimension];
                        dimension += 1;
                        base
                    });
                    let offset = group_offset.entry(group.0).or_insert(0);
                    let index = (base + *offset) % request.labels.len();
                    *offset += 1;
                    index
                }
                None => {
                    let index = setting[dimension];
                    dimension += 1;
                    index
                }
            };
            labels.push((i, request.labels[index]));
        }
        labels
    }

    fn dimensions(requests: &[AllocationRequest], collection: &[usize]) -> Vec<usize> {
        let mut seen_groups = Vec::new();
        let mut dims = Vec::new();
        for &i in collection {
            match requests[i].dependent_label_group {
                Some(group) => {
                    if !seen_groups.contains(&group.0) {
                        seen_groups.push(group.0);
                        dims.push(requests[i].labels.len());
                    }
                }
                None => dims.push(requests[i].labels.len()),
            }
        }
        dims
    }

    fn try_setting(
        requests: &[AllocationRequest],
        labels: &[(usize, Label)],
        policy: AllocationPolicy,
        deadline: Option<Instant>,
    ) -> Option<AHashMap<usize, Allocation>> {
        // Project onto each touched bus and solve locally.
        let mut buses: Vec<PadiBus> = Vec::new();
        for &(i, _) in labels {
            for bus in requests[i].shapes.keys() {
                if !buses.contains(bus) {
                    buses.push(*bus);
                }
            }
        }
        buses.sort_by_key(|bus| bus.linear());

        let mut result: AHashMap<usize, Allocation> = labels
            .iter()
            .map(|&(i, label)| {
                (i, Allocation { synapse_drivers: AHashMap::new(), label })
            })
            .collect();

        for bus in buses {
            let mut members = Vec::new();
            let mut bus_requests = Vec::new();
            for &(i, label) in labels {
                if let Some(shapes) = requests[i].shapes.get(&bus) {
                    members.push(i);
                    bus_requests.push(PadiBusAllocationRequest {
                        shapes: shapes.clone(),
                        label,
                    });
                }
            }
            let allocations =
                SynapseDriverOnPadiBusManager::allocate(&bus_requests, policy, deadline)?;
            if !SynapseDriverOnPadiBusManager::valid(&bus_requests, &allocations) {
                return None;
            }
            for (member, allocation) in members.into_iter().zip(allocations) {
                if let Some(entry) = result.get_mut(&member) {
                    entry.synapse_drivers.insert(bus, allocation);
                }
            }
        }
        Some(result)
    }

    /// Solves all requests chip-wide. `Ok(None)` when the joint label space
    /// is exhausted or the deadline trips first.
    pub fn solve(
        requests: &[AllocationRequest],
        policy: AllocationPolicy,
        timeout: Option<Duration>,
    ) -> RoutingResult<Option<Vec<Allocation>>> {
        Self::validate(requests)?;
        let deadline = timeout.map(|t| Instant::now() + t);

        let mut solved: AHashMap<usize, Allocation> = AHashMap::new();
        for collection in interdependent_collections(requests) {
            let dims = Self::dimensions(requests, &collection);
            let mut setting = vec![0usize; dims.len()];
            let found = loop {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    debug!("driver allocation timed out");
                    return Ok(None);
                }
                let labels = Self::assign_labels(requests, &collection, &setting);
                if let Some(result) = Self::try_setting(requests, &labels, policy, deadline)
                {
                    break Some(result);
                }
                trace!(?setting, "label combination rejected");
                // Odometer step.
                let mut carry = true;
                for (digit, &dim) in setting.iter_mut().zip(&dims) {
                    *digit += 1;
                    if *digit < dim {
                        carry = false;
                        break;
                    }
                    *digit = 0;
                }
                if carry {
                    break None;
                }
            };
            match found {
                Some(result) => solved.extend(result),
                None => return Ok(None),
            }
        }

        let mut allocations = Vec::with_capacity(requests.len());
        for i in 0..requests.len() {
            match solved.remove(&i) {
                Some(allocation) => allocations.push(allocation),
                None => return Err(RoutingError::InvalidAllocation),
            }
        }
        if !Self::valid_solution(requests, &allocations) {
            return Err(RoutingError::InvalidAllocation);
        }
        Ok(Some(allocations))
    }

    /// Chip-wide soundness of a solution against its requests.
    pub fn valid_solution(
        requests: &[AllocationRequest],
        allocations: &[Allocation],
    ) -> bool {
        if requests.len() != allocations.len() {
            return false;
        }
        for bus in PadiBus::all() {
            let mut bus_requests = Vec::new();
            let mut bus_allocations = Vec::new();
            for (request, allocation) in requests.iter().zip(allocations) {
                if let Some(shapes) = request.shapes.get(&bus) {
                    let Some(placed) = allocation.synapse_drivers.get(&bus) else {
                        return false;
                    };
                    bus_requests.push(PadiBusAllocationRequest {
                        shapes: shapes.clone(),
                        label: allocation.label,
                    });
                    bus_allocations.push(placed.clone());
                }
            }
            if !SynapseDriverOnPadiBusManager::valid(&bus_requests, &bus_allocations) {
                return false;
            }
        }
        true
    }
}
