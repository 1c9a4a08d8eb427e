// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
A single analog neuron circuit and its connectivity switches.

Each circuit carries five switches. Four connect membranes directly:
`right` to the next circuit in the row, `top_bottom` to the circuit in the
other row, `shared_right` extends the shared line towards the next column,
`circuit_shared` shorts the membrane onto the shared line. The fifth,
`circuit_shared_conductance`, attaches the membrane to the shared line through
a resistor. A circuit never attaches to the shared line both ways at once,
which leaves 24 valid switch states.
*/

use serde::{Deserialize, Serialize};

/// Valid switch states per circuit, used to size exhaustive searches.
pub const NUM_SWITCH_STATES: usize = 24;

/// Switch state and compartment tag of one grid cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NeuronCircuit {
    /// Direct membrane connection to the circuit in the next column.
    pub switch_right: bool,
    /// Direct membrane connection to the circuit in the other row.
    pub switch_top_bottom: bool,
    /// Shared line continues towards the next column.
    pub switch_shared_right: bool,
    /// Membrane shorted onto the shared line.
    pub switch_circuit_shared: bool,
    /// Membrane attached to the shared line through a conductance.
    pub switch_circuit_shared_conductance: bool,
    /// Compartment this circuit is allocated to, if any.
    pub compartment: Option<neurocarto_model::CompartmentOnNeuron>,
}

impl NeuronCircuit {
    /// A circuit must not attach to the shared line directly and through the
    /// conductance at the same time.
    pub fn is_valid(&self) -> bool {
        !(self.switch_circuit_shared && self.switch_circuit_shared_conductance)
    }

    /// True when the membrane is attached to the shared line either way.
    pub fn attached_to_shared(&self) -> bool {
        self.switch_circuit_shared || self.switch_circuit_shared_conductance
    }

    fn to_bits(self) -> u8 {
        u8::from(self.switch_right)
            | u8::from(self.switch_top_bottom) << 1
            | u8::from(self.switch_shared_right) << 2
            | u8::from(self.switch_circuit_shared) << 3
            | u8::from(self.switch_circuit_shared_conductance) << 4
    }

    fn set_bits(&mut self, bits: u8) {
        self.switch_right = bits & 1 != 0;
        self.switch_top_bottom = bits & 2 != 0;
        self.switch_shared_right = bits & 4 != 0;
        self.switch_circuit_shared = bits & 8 != 0;
        self.switch_circuit_shared_conductance = bits & 16 != 0;
    }

    /// Steps the switches to the next valid state, skipping states where the
    /// membrane would attach to the shared line both ways. Returns `true`
    /// when the counter wraps back to the all-open state.
    pub fn advance(&mut self) -> bool {
        let mut bits = self.to_bits();
        loop {
            bits += 1;
            if bits >= 32 {
                self.set_bits(0);
                return true;
            }
            self.set_bits(bits);
            if self.is_valid() {
                return false;
            }
        }
    }

    /// Resets all switches; the compartment tag is kept.
    pub fn open_all(&mut self) {
        self.set_bits(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_visits_exactly_the_valid_states() {
        let mut circuit = NeuronCircuit::default();
        let mut visited = 1;
        while !circuit.advance() {
            assert!(circuit.is_valid());
            visited += 1;
        }
        assert_eq!(visited, NUM_SWITCH_STATES);
        // Wrapped back to all-open.
        assert_eq!(circuit, NeuronCircuit::default());
    }

    #[test]
    fn invalid_shared_attachment_detected() {
        let circuit = NeuronCircuit {
            switch_circuit_shared: true,
            switch_circuit_shared_conductance: true,
            ..Default::default()
        };
        assert!(!circuit.is_valid());
    }

    #[test]
    fn advance_preserves_compartment_tag() {
        let mut neuron = neurocarto_model::Neuron::new();
        let c = neuron.add_compartment(Default::default());
        let mut circuit = NeuronCircuit { compartment: Some(c), ..Default::default() };
        circuit.advance();
        assert_eq!(circuit.compartment, Some(c));
    }
}
