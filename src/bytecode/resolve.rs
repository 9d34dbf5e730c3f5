use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::debug;

use crate::bytecode::ir::{Address, Program};
use crate::bytecode::op::Instruction;
use crate::bytecode::resolve_error::ResolveError;
use crate::token::{Location, Spanned, Token};

/// Maps every label defined in `tokens` to the address of the instruction
/// that follows it.
///
/// Instructions and label references each take one address, counting up from
/// `start`. A label with nothing after it points one past the end.
pub fn label_addresses(
    tokens: &[Spanned],
    start: Address,
) -> Result<HashMap<String, Address>, ResolveError> {
    let mut labels: HashMap<String, Address> = HashMap::new();
    // Only needed to report where a duplicate was first seen.
    let mut defined_at: HashMap<&str, &Location> = HashMap::new();
    let mut addr = start;

    for spanned in tokens {
        match &spanned.token {
            Token::LabelDef(name) => match labels.entry(name.clone()) {
                Entry::Occupied(_) => {
                    let first = defined_at[name.as_str()].clone();
                    return Err(ResolveError::DuplicateLabel {
                        name: name.clone(),
                        location: spanned.location.clone(),
                        first,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(addr);
                    defined_at.insert(name, &spanned.location);
                }
            },
            Token::LabelRef(_) | Token::Instr(_) => {
                addr = addr
                    .checked_add(1)
                    .ok_or_else(|| ResolveError::AddressOverflow {
                        location: spanned.location.clone(),
                    })?;
            }
        }
    }

    Ok(labels)
}

/// Replaces every label reference with a push of its address and drops the
/// label definitions.
///
/// The whole label table is built before any reference is looked up, so
/// forward and backward references behave the same.
pub fn resolve(tokens: &[Spanned], start: Address) -> Result<Program, ResolveError> {
    let labels = label_addresses(tokens, start)?;
    let mut program = Program::new(start);

    for spanned in tokens {
        let instruction = match &spanned.token {
            Token::LabelDef(_) => continue,
            Token::LabelRef(name) => match labels.get(name) {
                Some(addr) => Instruction::PushInt(*addr),
                None => {
                    return Err(ResolveError::UnknownLabel {
                        name: name.clone(),
                        location: spanned.location.clone(),
                    });
                }
            },
            Token::Instr(inst) => *inst,
        };

        program.push(instruction, spanned.location.clone());
    }

    debug!(
        start,
        labels = labels.len(),
        instructions = program.len(),
        "resolved program"
    );

    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::Opcode;

    // ============================================================
    // Test Helpers
    // ============================================================

    fn at(column: usize) -> Location {
        Location::new("test", 1, column)
    }

    fn def(name: &str) -> Spanned {
        Spanned::new(Token::LabelDef(name.to_string()), at(1))
    }

    fn refer(name: &str) -> Spanned {
        Spanned::new(Token::LabelRef(name.to_string()), at(1))
    }

    fn push(n: i64) -> Spanned {
        Spanned::new(Token::Instr(Instruction::PushInt(n)), at(1))
    }

    fn op(op: Opcode) -> Spanned {
        Spanned::new(Token::Instr(Instruction::Op(op)), at(1))
    }

    #[test]
    fn test_no_labels_is_identity() {
        let tokens = vec![push(2), push(3), op(Opcode::Add), op(Opcode::Print)];
        let program = resolve(&tokens, 0).unwrap();
        assert_eq!(
            program.instructions,
            vec![
                Instruction::PushInt(2),
                Instruction::PushInt(3),
                Instruction::Op(Opcode::Add),
                Instruction::Op(Opcode::Print),
            ]
        );
        assert_eq!(program.start, 0);
    }

    #[test]
    fn test_label_points_at_next_instruction() {
        let tokens = vec![push(1), def("here"), op(Opcode::Dup)];
        let labels = label_addresses(&tokens, 0).unwrap();
        assert_eq!(labels["here"], 1);
    }

    #[test]
    fn test_label_at_end_points_past_end() {
        let tokens = vec![push(1), op(Opcode::Pop), def("end")];
        let labels = label_addresses(&tokens, 0).unwrap();
        assert_eq!(labels["end"], 2);
    }

    #[test]
    fn test_references_take_an_address() {
        // @a becomes a push, so it shifts everything after it
        let tokens = vec![refer("a"), op(Opcode::Jmp), def("a"), op(Opcode::Dbg)];
        let program = resolve(&tokens, 0).unwrap();
        assert_eq!(
            program.instructions,
            vec![
                Instruction::PushInt(2),
                Instruction::Op(Opcode::Jmp),
                Instruction::Op(Opcode::Dbg),
            ]
        );
    }

    #[test]
    fn test_forward_and_backward_references_agree() {
        let tokens = vec![
            refer("x"),
            op(Opcode::Pop),
            def("x"),
            push(0),
            refer("x"),
            op(Opcode::Pop),
        ];
        let program = resolve(&tokens, 0).unwrap();
        assert_eq!(program.instructions[0], Instruction::PushInt(2));
        assert_eq!(program.instructions[3], Instruction::PushInt(2));
    }

    #[test]
    fn test_start_address_offsets_everything() {
        let tokens = vec![def("top"), push(5), refer("top"), op(Opcode::Jmp)];
        let program = resolve(&tokens, 10).unwrap();
        assert_eq!(program.start, 10);
        assert_eq!(program.instructions[1], Instruction::PushInt(10));
        assert_eq!(program.end(), Some(13));
    }

    #[test]
    fn test_unknown_label() {
        let err = resolve(&[refer("undefined")], 0).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownLabel {
                name: "undefined".to_string(),
                location: at(1),
            }
        );
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let first = Spanned::new(Token::LabelDef("a".to_string()), at(1));
        let second = Spanned::new(Token::LabelDef("a".to_string()), at(9));
        let tokens = vec![first, push(1), second, op(Opcode::Pop)];

        let err = resolve(&tokens, 0).unwrap_err();
        assert_eq!(
            err,
            ResolveError::DuplicateLabel {
                name: "a".to_string(),
                location: at(9),
                first: at(1),
            }
        );
    }

    #[test]
    fn test_duplicate_rejected_even_without_references() {
        let tokens = vec![def("a"), def("a")];
        assert!(matches!(
            label_addresses(&tokens, 0),
            Err(ResolveError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn test_labels_are_case_sensitive() {
        let tokens = vec![def("Loop"), push(1), refer("loop")];
        assert!(matches!(
            resolve(&tokens, 0),
            Err(ResolveError::UnknownLabel { .. })
        ));
    }

    #[test]
    fn test_locations_follow_instructions() {
        let tokens = vec![
            Spanned::new(Token::LabelDef("a".to_string()), at(1)),
            Spanned::new(Token::Instr(Instruction::PushInt(1)), at(5)),
            Spanned::new(Token::LabelRef("a".to_string()), at(7)),
        ];
        let program = resolve(&tokens, 0).unwrap();
        assert_eq!(program.locations, vec![at(5), at(7)]);
    }

    #[test]
    fn test_addresses_must_fit() {
        let program = resolve(&[push(1)], i64::MAX - 1).unwrap();
        assert_eq!(program.end(), Some(i64::MAX));

        assert!(matches!(
            resolve(&[push(1), push(2)], i64::MAX - 1),
            Err(ResolveError::AddressOverflow { .. })
        ));
    }
}
