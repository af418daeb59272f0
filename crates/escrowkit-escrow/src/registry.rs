//! In-memory registry of the escrows created in this session.

use std::collections::HashMap;

use escrowkit_types::{Address, Escrow, EscrowError, Result};

/// Ordered collection of escrows, keyed by contract address
#[derive(Debug, Default, Clone)]
pub struct EscrowRegistry {
    escrows: Vec<Escrow>,
    index: HashMap<Address, usize>,
}

impl EscrowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly deployed escrow
    pub fn add(&mut self, escrow: Escrow) -> Result<()> {
        if self.index.contains_key(&escrow.contract_address) {
            return Err(EscrowError::invalid_parameter(
                "contract_address",
                format!("{} is already registered", escrow.contract_address),
            ));
        }
        self.index.insert(escrow.contract_address, self.escrows.len());
        self.escrows.push(escrow);
        Ok(())
    }

    /// Move an escrow to Approved.
    ///
    /// Returns `false` when it was already approved. Unknown addresses fail
    /// with `NotFound`.
    pub fn mark_approved(&mut self, contract: &Address) -> Result<bool> {
        let slot = *self
            .index
            .get(contract)
            .ok_or_else(|| EscrowError::not_found(contract))?;
        Ok(self.escrows[slot].mark_approved())
    }

    pub fn get(&self, contract: &Address) -> Option<&Escrow> {
        self.index.get(contract).map(|&slot| &self.escrows[slot])
    }

    pub fn contains(&self, contract: &Address) -> bool {
        self.index.contains_key(contract)
    }

    /// All escrows in insertion order
    pub fn list(&self) -> &[Escrow] {
        &self.escrows
    }

    pub fn pending(&self) -> impl Iterator<Item = &Escrow> {
        self.escrows.iter().filter(|e| !e.is_approved())
    }

    pub fn approved(&self) -> impl Iterator<Item = &Escrow> {
        self.escrows.iter().filter(|e| e.is_approved())
    }

    pub fn len(&self) -> usize {
        self.escrows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.escrows.is_empty()
    }
}
