//! Register memory
//!
//! Four independent spaces, each covering the full 16-bit address range.
//! The backing slices are allocated once and never resized; every address in
//! `0..=65535` is valid and starts at zero.

use std::fmt;

/// Number of addressable entries in each space
pub const ADDRESS_SPACE: usize = 65536;

/// The slave's register memory
///
/// Owned by the request serializer. Handlers receive it as `&mut` for the
/// duration of one request; the application reaches it through
/// [`Engine::with_store`](crate::Engine::with_store).
#[derive(Clone, PartialEq, Eq)]
pub struct RegisterStore {
    discrete_inputs: Box<[u8]>,
    coils: Box<[u8]>,
    holding_registers: Box<[u16]>,
    input_registers: Box<[u16]>,
}

impl RegisterStore {
    pub fn new() -> Self {
        Self {
            discrete_inputs: vec![0u8; ADDRESS_SPACE].into_boxed_slice(),
            coils: vec![0u8; ADDRESS_SPACE].into_boxed_slice(),
            holding_registers: vec![0u16; ADDRESS_SPACE].into_boxed_slice(),
            input_registers: vec![0u16; ADDRESS_SPACE].into_boxed_slice(),
        }
    }

    pub fn discrete_inputs(&self) -> &[u8] {
        &self.discrete_inputs
    }

    pub fn discrete_inputs_mut(&mut self) -> &mut [u8] {
        &mut self.discrete_inputs
    }

    pub fn coils(&self) -> &[u8] {
        &self.coils
    }

    pub fn coils_mut(&mut self) -> &mut [u8] {
        &mut self.coils
    }

    pub fn holding_registers(&self) -> &[u16] {
        &self.holding_registers
    }

    pub fn holding_registers_mut(&mut self) -> &mut [u16] {
        &mut self.holding_registers
    }

    pub fn input_registers(&self) -> &[u16] {
        &self.input_registers
    }

    pub fn input_registers_mut(&mut self) -> &mut [u16] {
        &mut self.input_registers
    }
}

impl Default for RegisterStore {
    fn default() -> Self {
        Self::new()
    }
}

// 256K entries; print occupancy instead of contents
impl fmt::Debug for RegisterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn non_zero<T: Default + PartialEq>(values: &[T]) -> usize {
            values.iter().filter(|v| **v != T::default()).count()
        }
        f.debug_struct("RegisterStore")
            .field("discrete_inputs_set", &non_zero(&self.discrete_inputs))
            .field("coils_set", &non_zero(&self.coils))
            .field("holding_registers_set", &non_zero(&self.holding_registers))
            .field("input_registers_set", &non_zero(&self.input_registers))
            .finish()
    }
}
