// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

//! # neurocarto
//!
//! Multicompartment neuron placement and event routing for 2x256 analog
//! neuromorphic chips.
//!
//! Large neuron models are built from several electrical compartments. On
//! chip, a compartment is realized by one or more neuron circuits on a
//! 2x256 grid, joined by configurable switches onto shared signal lines.
//! This workspace maps abstract compartment graphs onto that grid and then
//! routes the resulting spike traffic through the chip's event fabric.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! neurocarto = "0.1"
//! ```
//!
//! ```rust
//! use neurocarto::prelude::*;
//!
//! // Synthesize a small compartment chain and its synaptic environment.
//! let parameters = GeneratorParameters {
//!     num_compartments: 3,
//!     p_synaptic_input: 0.0,
//!     max_inputs: 1,
//! };
//! let (neuron, environment) = NeuronGenerator::new(7).generate(&parameters)?;
//! let resources = ResourceManager::from_neuron(&neuron, &environment)?;
//!
//! // Place it on the grid with the rule-based strategy.
//! let mut algorithm = RuleSet::new();
//! if let Ok(result) = algorithm.run(CoordinateSystem::new(), &neuron, &resources) {
//!     assert!(result.finished);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Model: neurocarto-model                                │
//! │  (Compartment graphs, mechanisms, resource demands)     │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Placement: neurocarto-placement                        │
//! │  (Switch grid, validity rules, placement strategies)    │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Routing: neurocarto-routing                            │
//! │  (Bus constraints, driver allocation, routing builder)  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! - [`model`] — abstract neurons: compartments, mechanisms and the
//!   hardware resources they demand.
//! - [`placement`] — the 2x256 switch grid, the validity predicate and the
//!   rule-based, brute-force and evolutionary placement strategies.
//! - [`routing`] — logical networks over placed neurons, PADI-bus
//!   partitioning, synapse driver allocation and the routing pipeline.
//!
//! ## License
//!
//! Apache-2.0

pub use neurocarto_model as model;
pub use neurocarto_placement as placement;
pub use neurocarto_routing as routing;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::model::{
        Environment, GeneratorParameters, ModelError, Neuron, NeuronGenerator,
        NumberTopBottom, ResourceManager,
    };
    pub use crate::placement::{
        valid, BruteForce, CoordinateSystem, Dummy, Evolutionary, PlacementAlgorithm,
        PlacementError, RuleSet,
    };
    pub use crate::routing::{
        Network, Population, Projection, Receptor, RoutingBuilder, RoutingError,
        RoutingOptions, RoutingSolution,
    };
}
