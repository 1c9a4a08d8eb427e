// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Per-compartment mechanism container.

Mechanisms are addressed through [`MechanismOnCompartment`] keys handed out by
[`Compartment::add`]. Keys stay valid across removal of other mechanisms.
*/

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::mechanism::Mechanism;

/// Key of a mechanism within one compartment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct MechanismOnCompartment(pub u64);

/// Collection of non-conflicting mechanisms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Compartment {
    mechanisms: BTreeMap<MechanismOnCompartment, Mechanism>,
    next_key: u64,
}

impl Compartment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mechanism, rejecting kinds already present.
    pub fn add(&mut self, mechanism: Mechanism) -> ModelResult<MechanismOnCompartment> {
        if self.mechanisms.values().any(|m| m.conflicts(&mechanism)) {
            return Err(ModelError::ConflictingMechanism);
        }
        let key = MechanismOnCompartment(self.next_key);
        self.next_key = self.next_key.checked_add(1).ok_or(ModelError::MechanismKeyOverflow)?;
        self.mechanisms.insert(key, mechanism);
        Ok(key)
    }

    pub fn remove(&mut self, key: MechanismOnCompartment) -> ModelResult<Mechanism> {
        self.mechanisms.remove(&key).ok_or(ModelError::UnknownMechanism)
    }

    pub fn get(&self, key: MechanismOnCompartment) -> ModelResult<&Mechanism> {
        self.mechanisms.get(&key).ok_or(ModelError::UnknownMechanism)
    }

    /// Replaces the stored mechanism behind `key`. The replacement must not
    /// conflict with any other mechanism on the compartment.
    pub fn set(&mut self, key: MechanismOnCompartment, mechanism: Mechanism) -> ModelResult<()> {
        if !self.mechanisms.contains_key(&key) {
            return Err(ModelError::UnknownMechanism);
        }
        if self
            .mechanisms
            .iter()
            .any(|(other, m)| *other != key && m.conflicts(&mechanism))
        {
            return Err(ModelError::ConflictingMechanism);
        }
        self.mechanisms.insert(key, mechanism);
        Ok(())
    }

    pub fn mechanisms(
        &self,
    ) -> impl Iterator<Item = (MechanismOnCompartment, &Mechanism)> + '_ {
        self.mechanisms.iter().map(|(k, m)| (*k, m))
    }

    pub fn is_empty(&self) -> bool {
        self.mechanisms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mechanisms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanism::ParameterInterval;

    fn capacitance() -> Mechanism {
        Mechanism::Capacitance { capacitance: ParameterInterval::new(1.0, 2.0).unwrap() }
    }

    fn synaptic_current() -> Mechanism {
        Mechanism::SynapticInputCurrent {
            time_constant: ParameterInterval::new(2.0, 2.0).unwrap(),
        }
    }

    #[test]
    fn add_get_remove_roundtrip() {
        let mut c = Compartment::new();
        let key = c.add(capacitance()).unwrap();
        assert_eq!(c.get(key).unwrap(), &capacitance());
        assert_eq!(c.remove(key).unwrap(), capacitance());
        assert_eq!(c.get(key).unwrap_err(), ModelError::UnknownMechanism);
    }

    #[test]
    fn duplicate_kind_rejected() {
        let mut c = Compartment::new();
        c.add(capacitance()).unwrap();
        assert_eq!(c.add(capacitance()).unwrap_err(), ModelError::ConflictingMechanism);
        // A different kind is fine.
        c.add(synaptic_current()).unwrap();
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut c = Compartment::new();
        let key = c.add(capacitance()).unwrap();
        let replacement =
            Mechanism::Capacitance { capacitance: ParameterInterval::new(3.0, 4.0).unwrap() };
        c.set(key, replacement.clone()).unwrap();
        assert_eq!(c.get(key).unwrap(), &replacement);
    }

    #[test]
    fn set_rejects_conflict_with_other_key() {
        let mut c = Compartment::new();
        let cap = c.add(capacitance()).unwrap();
        c.add(synaptic_current()).unwrap();
        assert_eq!(
            c.set(cap, synaptic_current()).unwrap_err(),
            ModelError::ConflictingMechanism
        );
    }

    #[test]
    fn keys_survive_removal_of_others() {
        let mut c = Compartment::new();
        let cap = c.add(capacitance()).unwrap();
        let syn = c.add(synaptic_current()).unwrap();
        c.remove(cap).unwrap();
        assert!(c.get(syn).is_ok());
    }
}
