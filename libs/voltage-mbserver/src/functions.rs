//! Function handlers
//!
//! A handler receives the store and the request frame and returns the
//! response payload plus an exception. Any exception other than
//! [`Exception::Success`] replaces the payload on the wire.
//!
//! The defaults cover the eight standard data-access codes. Address and
//! quantity fields are big-endian; bit spaces are packed LSB first.

use std::sync::Arc;

use crate::exception::Exception;
use crate::frame::Frame;
use crate::store::{RegisterStore, ADDRESS_SPACE};

/// Shared, overridable function handler
pub type Handler = Arc<dyn Fn(&mut RegisterStore, &dyn Frame) -> (Vec<u8>, Exception) + Send + Sync>;

pub const READ_COILS: u8 = 1;
pub const READ_DISCRETE_INPUTS: u8 = 2;
pub const READ_HOLDING_REGISTERS: u8 = 3;
pub const READ_INPUT_REGISTERS: u8 = 4;
pub const WRITE_SINGLE_COIL: u8 = 5;
pub const WRITE_HOLDING_REGISTER: u8 = 6;
pub const WRITE_MULTIPLE_COILS: u8 = 15;
pub const WRITE_HOLDING_REGISTERS: u8 = 16;

// Per-request quantity limits (Modbus application protocol v1.1b3)
const MAX_READ_BITS: usize = 2000;
const MAX_READ_REGISTERS: usize = 125;
const MAX_WRITE_BITS: usize = 1968;
const MAX_WRITE_REGISTERS: usize = 123;

/// Wrap a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut RegisterStore, &dyn Frame) -> (Vec<u8>, Exception) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handlers installed on every new engine
pub fn default_handlers() -> Vec<(u8, Handler)> {
    vec![
        (READ_COILS, handler(read_coils)),
        (READ_DISCRETE_INPUTS, handler(read_discrete_inputs)),
        (READ_HOLDING_REGISTERS, handler(read_holding_registers)),
        (READ_INPUT_REGISTERS, handler(read_input_registers)),
        (WRITE_SINGLE_COIL, handler(write_single_coil)),
        (WRITE_HOLDING_REGISTER, handler(write_holding_register)),
        (WRITE_MULTIPLE_COILS, handler(write_multiple_coils)),
        (WRITE_HOLDING_REGISTERS, handler(write_holding_registers)),
    ]
}

/// Start address, quantity and exclusive end of a request range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Range {
    start: usize,
    quantity: usize,
    end: usize,
}

fn word(data: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*data.get(offset)?, *data.get(offset + 1)?]))
}

/// Parse `[addr][qty]` and check it against the quantity limit and the store
fn range(data: &[u8], max_quantity: usize) -> Result<Range, Exception> {
    let (start, quantity) = match (word(data, 0), word(data, 2)) {
        (Some(start), Some(quantity)) => (usize::from(start), usize::from(quantity)),
        _ => return Err(Exception::IllegalDataValue),
    };
    if quantity == 0 || quantity > max_quantity {
        return Err(Exception::IllegalDataValue);
    }
    let end = start + quantity;
    if end > ADDRESS_SPACE {
        return Err(Exception::IllegalDataAddress);
    }
    Ok(Range {
        start,
        quantity,
        end,
    })
}

fn failed(exception: Exception) -> (Vec<u8>, Exception) {
    (Vec::new(), exception)
}

fn pack_bits(bits: &[u8]) -> Vec<u8> {
    let byte_count = bits.len().div_ceil(8);
    let mut packed = vec![0u8; 1 + byte_count];
    packed[0] = byte_count as u8;
    for (i, bit) in bits.iter().enumerate() {
        if *bit != 0 {
            packed[1 + i / 8] |= 1 << (i % 8);
        }
    }
    packed
}

fn pack_registers(registers: &[u16]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(1 + registers.len() * 2);
    packed.push((registers.len() * 2) as u8);
    for register in registers {
        packed.extend_from_slice(&register.to_be_bytes());
    }
    packed
}

// ============================================================================
// Read functions
// ============================================================================

/// Function 1
pub fn read_coils(store: &mut RegisterStore, frame: &dyn Frame) -> (Vec<u8>, Exception) {
    match range(frame.data(), MAX_READ_BITS) {
        Ok(r) => (pack_bits(&store.coils()[r.start..r.end]), Exception::Success),
        Err(exception) => failed(exception),
    }
}

/// Function 2
pub fn read_discrete_inputs(store: &mut RegisterStore, frame: &dyn Frame) -> (Vec<u8>, Exception) {
    match range(frame.data(), MAX_READ_BITS) {
        Ok(r) => (
            pack_bits(&store.discrete_inputs()[r.start..r.end]),
            Exception::Success,
        ),
        Err(exception) => failed(exception),
    }
}

/// Function 3
pub fn read_holding_registers(store: &mut RegisterStore, frame: &dyn Frame) -> (Vec<u8>, Exception) {
    match range(frame.data(), MAX_READ_REGISTERS) {
        Ok(r) => (
            pack_registers(&store.holding_registers()[r.start..r.end]),
            Exception::Success,
        ),
        Err(exception) => failed(exception),
    }
}

/// Function 4
pub fn read_input_registers(store: &mut RegisterStore, frame: &dyn Frame) -> (Vec<u8>, Exception) {
    match range(frame.data(), MAX_READ_REGISTERS) {
        Ok(r) => (
            pack_registers(&store.input_registers()[r.start..r.end]),
            Exception::Success,
        ),
        Err(exception) => failed(exception),
    }
}

// ============================================================================
// Write functions
// ============================================================================

/// Function 5: any non-zero value sets the coil
pub fn write_single_coil(store: &mut RegisterStore, frame: &dyn Frame) -> (Vec<u8>, Exception) {
    let data = frame.data();
    match (word(data, 0), word(data, 2)) {
        (Some(address), Some(value)) => {
            store.coils_mut()[usize::from(address)] = u8::from(value != 0);
            (data[..4].to_vec(), Exception::Success)
        },
        _ => failed(Exception::IllegalDataValue),
    }
}

/// Function 6
pub fn write_holding_register(store: &mut RegisterStore, frame: &dyn Frame) -> (Vec<u8>, Exception) {
    let data = frame.data();
    match (word(data, 0), word(data, 2)) {
        (Some(address), Some(value)) => {
            store.holding_registers_mut()[usize::from(address)] = value;
            (data[..4].to_vec(), Exception::Success)
        },
        _ => failed(Exception::IllegalDataValue),
    }
}

/// Function 15: `[addr][qty][byte count][packed bits...]`
pub fn write_multiple_coils(store: &mut RegisterStore, frame: &dyn Frame) -> (Vec<u8>, Exception) {
    let data = frame.data();
    let r = match range(data, MAX_WRITE_BITS) {
        Ok(r) => r,
        Err(exception) => return failed(exception),
    };
    let values = data.get(5..).unwrap_or_default();
    if values.len() < r.quantity.div_ceil(8) {
        return failed(Exception::IllegalDataValue);
    }

    let coils = &mut store.coils_mut()[r.start..r.end];
    for (i, coil) in coils.iter_mut().enumerate() {
        *coil = (values[i / 8] >> (i % 8)) & 1;
    }
    (data[..4].to_vec(), Exception::Success)
}

/// Function 16: `[addr][qty][byte count][values...]`
pub fn write_holding_registers(store: &mut RegisterStore, frame: &dyn Frame) -> (Vec<u8>, Exception) {
    let data = frame.data();
    let r = match range(data, MAX_WRITE_REGISTERS) {
        Ok(r) => r,
        Err(exception) => return failed(exception),
    };
    let values = data.get(5..).unwrap_or_default();
    if values.len() != r.quantity * 2 {
        return failed(Exception::IllegalDataAddress);
    }

    let registers = &mut store.holding_registers_mut()[r.start..r.end];
    for (register, bytes) in registers.iter_mut().zip(values.chunks_exact(2)) {
        *register = u16::from_be_bytes([bytes[0], bytes[1]]);
    }
    (data[..4].to_vec(), Exception::Success)
}
