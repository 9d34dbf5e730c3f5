use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bytecode::op::Instruction;
use crate::token::Location;

/// Absolute position of an instruction; also the value jumps consume.
pub type Address = i64;

/// A resolved program: no labels left, only instructions.
///
/// `locations[i]` is where `instructions[i]` came from. Label tokens are gone
/// after resolution, so this table is the only way back to the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Address of `instructions[0]`.
    pub start: Address,
    pub instructions: Vec<Instruction>,
    pub locations: Vec<Location>,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid program image: {0}")]
    Decode(#[from] postcard::Error),

    #[error("invalid program image: {instructions} instructions but {locations} locations")]
    Mismatch {
        instructions: usize,
        locations: usize,
    },

    #[error("invalid program image: {len} instructions starting at {start} overflow the address space")]
    AddressOverflow { start: Address, len: usize },
}

impl Program {
    pub fn new(start: Address) -> Self {
        Self {
            start,
            instructions: Vec::new(),
            locations: Vec::new(),
        }
    }

    pub fn push(&mut self, instruction: Instruction, location: Location) {
        self.instructions.push(instruction);
        self.locations.push(location);
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// One past the last address, or `None` if that is not representable.
    ///
    /// `resolve` and `from_bytes` never produce a program for which this is
    /// `None`.
    pub fn end(&self) -> Option<Address> {
        Address::try_from(self.instructions.len())
            .ok()
            .and_then(|len| self.start.checked_add(len))
    }

    /// Iterates `(address, instruction, location)`.
    pub fn iter(&self) -> impl Iterator<Item = (Address, &Instruction, &Location)> {
        self.instructions
            .iter()
            .zip(&self.locations)
            .enumerate()
            .map(|(i, (inst, loc))| (self.start.wrapping_add(i as Address), inst, loc))
    }

    /// Encodes the program as a binary image.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        let program: Program = postcard::from_bytes(bytes)?;
        if program.instructions.len() != program.locations.len() {
            return Err(ImageError::Mismatch {
                instructions: program.instructions.len(),
                locations: program.locations.len(),
            });
        }
        if program.end().is_none() {
            return Err(ImageError::AddressOverflow {
                start: program.start,
                len: program.len(),
            });
        }
        Ok(program)
    }
}
