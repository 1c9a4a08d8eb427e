// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Error types for the neuron model.

Configuration errors are raised immediately at the call site and are not
recoverable inside the model; callers decide whether to retry with different
inputs. Structural errors signal violated graph invariants.
*/

use crate::graph::{CompartmentConnectionOnNeuron, CompartmentOnNeuron};

/// Result alias used throughout the model crate.
pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid resource split: top ({top}) + bottom ({bottom}) exceeds total ({total})")]
    InvalidResourceSplit { total: usize, top: usize, bottom: usize },

    #[error("Invalid parameter interval: lower bound exceeds upper bound")]
    InvalidParameterInterval,

    #[error("Compartment descriptor not in graph")]
    UnknownCompartment(CompartmentOnNeuron),

    #[error("Compartment connection descriptor not in graph")]
    UnknownCompartmentConnection(CompartmentConnectionOnNeuron),

    #[error("Conflicting mechanism")]
    ConflictingMechanism,

    #[error("Mechanism not on compartment")]
    UnknownMechanism,

    #[error("Too many mechanisms: overflow of key counter")]
    MechanismKeyOverflow,

    #[error("No information about compartment in environment")]
    MissingEnvironmentEntry(CompartmentOnNeuron),

    #[error("Compartment has no configuration in resource manager")]
    MissingResourceConfig(CompartmentOnNeuron),

    #[error("Chain is looped")]
    LoopedChain,

    #[error("Neuron graph is empty")]
    EmptyNeuron,
}
