// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Seeded synthesis of random neurons.

Placement algorithms are exercised against randomly drawn tree-shaped neurons
with randomized synaptic environments. Generation is deterministic per seed.
*/

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::compartment::Compartment;
use crate::environment::{Environment, SynapticInputEnvironment, SynapticInputKind};
use crate::error::ModelResult;
use crate::graph::{CompartmentConnection, CompartmentOnNeuron, Neuron};
use crate::mechanism::{Mechanism, ParameterInterval};
use crate::number::NumberTopBottom;

/// Knobs of the random neuron generator.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorParameters {
    pub num_compartments: usize,
    /// Probability of a compartment receiving a synaptic input mechanism.
    pub p_synaptic_input: f64,
    /// Upper bound on synaptic inputs per input site.
    pub max_inputs: usize,
}

impl Default for GeneratorParameters {
    fn default() -> Self {
        Self { num_compartments: 8, p_synaptic_input: 0.5, max_inputs: 512 }
    }
}

/// Deterministic random neuron source.
#[derive(Debug)]
pub struct NeuronGenerator {
    rng: StdRng,
}

impl NeuronGenerator {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Draws a connected tree-shaped neuron and its synaptic environment.
    pub fn generate(
        &mut self,
        parameters: &GeneratorParameters,
    ) -> ModelResult<(Neuron, Environment)> {
        let mut neuron = Neuron::new();
        let mut environment = Environment::new();
        let mut placed: Vec<CompartmentOnNeuron> = Vec::new();
        for _ in 0..parameters.num_compartments.max(1) {
            let mut config = Compartment::new();
            config.add(Mechanism::Capacitance {
                capacitance: ParameterInterval::new(1.0, 2.0)?,
            })?;
            let synaptic = self.rng.gen_bool(parameters.p_synaptic_input.clamp(0.0, 1.0));
            if synaptic {
                config.add(Mechanism::SynapticInputCurrent {
                    time_constant: ParameterInterval::new(1.0, 4.0)?,
                })?;
            }
            let compartment = neuron.add_compartment(config);
            if synaptic {
                environment.add(
                    compartment,
                    SynapticInputEnvironment {
                        kind: SynapticInputKind::Current,
                        excitatory: self.rng.gen_bool(0.5),
                        inputs: NumberTopBottom::new(
                            self.rng.gen_range(1..=parameters.max_inputs.max(1)),
                            0,
                            0,
                        )?,
                    },
                );
            }
            if let Some(parent) = placed.as_slice().first() {
                let parent = if placed.len() == 1 {
                    *parent
                } else {
                    placed[self.rng.gen_range(0..placed.len())]
                };
                neuron.add_compartment_connection(
                    parent,
                    compartment,
                    CompartmentConnection::default(),
                )?;
            }
            placed.push(compartment);
        }
        Ok((neuron, environment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_neuron_is_connected_tree() {
        let mut generator = NeuronGenerator::new(42);
        let parameters = GeneratorParameters { num_compartments: 12, ..Default::default() };
        let (neuron, _) = generator.generate(&parameters).unwrap();
        assert_eq!(neuron.num_compartments(), 12);
        assert_eq!(neuron.num_compartment_connections(), 11);
        // Every compartment is reachable from the first.
        let first = neuron.compartments().next().unwrap();
        assert_eq!(neuron.branch_size(first, first).unwrap(), 12);
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let parameters = GeneratorParameters::default();
        let (a, _) = NeuronGenerator::new(7).generate(&parameters).unwrap();
        let (b, _) = NeuronGenerator::new(7).generate(&parameters).unwrap();
        assert_eq!(a, b);
    }
}
