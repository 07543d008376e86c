//! Instruction decoding.
//!
//! Decoding one instruction is a small state machine: any number of prefixes (`constrained.`,
//! `no.`, `readonly.`, `tail.`, `unaligned.`, `volatile.`) accumulate on the instruction record,
//! then exactly one opcode is read, possibly behind the `0xFE` or `0xFD` escape, then exactly one
//! operand of the shape its table entry declares.
//!
//! ```rust
//! use cilfront::{assembly::decode_instruction, file::parser::Parser};
//!
//! // br.s +5
//! let mut parser = Parser::new(&[0x2B, 0x05]);
//! let instruction = decode_instruction(&mut parser, false)?;
//! assert_eq!(instruction.mnemonic, "br.s");
//! assert_eq!(instruction.branch_targets, [0x07]);
//! # Ok::<(), cilfront::Error>(())
//! ```

use crate::{
    assembly::{
        instruction::{
            FlowType, Immediate, Instruction, InstructionCategory, Operand, OperandType, Prefixes,
            StackBehavior,
        },
        instructions::{CilInstruction, INSTRUCTIONS, INSTRUCTIONS_FD, INSTRUCTIONS_FE},
        opcodes,
    },
    file::parser::Parser,
    metadata::token::Token,
    Error, Result,
};

/// Decode the instruction at the parser's position and advance past it.
///
/// `allow_internal` permits the `0xFD` compiler-internal opcodes.
///
/// # Errors
/// Returns [`Error::UnknownOpcode`] for unassigned opcodes, [`Error::RestrictedOpcode`] for an
/// internal opcode when `allow_internal` is false, [`Error::OutOfBounds`] if the instruction runs
/// past the end of the code and [`Error::Malformed`] for a branch target outside `u32`.
pub fn decode_instruction(parser: &mut Parser, allow_internal: bool) -> Result<Instruction> {
    let offset = parser.pos();
    let mut prefixes = Prefixes::empty();
    let mut constrained = None;
    let mut alignment = None;

    let (entry, prefix, opcode) = loop {
        let first_byte = parser.read_le::<u8>()?;
        let (entry, prefix, opcode) = match first_byte {
            opcodes::FE_PREFIX => {
                let second_byte = parser.read_le::<u8>()?;
                (&INSTRUCTIONS_FE[second_byte as usize], first_byte, second_byte)
            }
            opcodes::FD_PREFIX => {
                let second_byte = parser.read_le::<u8>()?;
                if !allow_internal {
                    return Err(Error::RestrictedOpcode(
                        u16::from_be_bytes([first_byte, second_byte]),
                    ));
                }
                (&INSTRUCTIONS_FD[second_byte as usize], first_byte, second_byte)
            }
            _ => (&INSTRUCTIONS[first_byte as usize], 0, first_byte),
        };

        if !entry.is_defined() {
            return Err(Error::UnknownOpcode(u16::from_be_bytes([prefix, opcode])));
        }
        if entry.category != InstructionCategory::Prefix {
            break (entry, prefix, opcode);
        }

        match opcode {
            opcodes::FE_CONSTRAINED => {
                prefixes |= Prefixes::CONSTRAINED;
                constrained = Some(Token::new(parser.read_le::<u32>()?));
            }
            opcodes::FE_NO => {
                let checks = parser.read_le::<u8>()?;
                if checks & 0x1 != 0 {
                    prefixes |= Prefixes::NO_TYPECHECK;
                }
                if checks & 0x2 != 0 {
                    prefixes |= Prefixes::NO_RANGECHECK;
                }
                if checks & 0x4 != 0 {
                    prefixes |= Prefixes::NO_NULLCHECK;
                }
            }
            opcodes::FE_READONLY => prefixes |= Prefixes::READONLY,
            opcodes::FE_TAIL => prefixes |= Prefixes::TAIL,
            opcodes::FE_UNALIGNED => {
                prefixes |= Prefixes::UNALIGNED;
                alignment = Some(parser.read_le::<u8>()?);
            }
            opcodes::FE_VOLATILE => prefixes |= Prefixes::VOLATILE,
            _ => {
                return Err(Error::UnknownOpcode(u16::from_be_bytes([prefix, opcode])));
            }
        }
    };

    let operand = read_operand(parser, entry)?;
    let size = parser.pos() - offset;

    let mut instruction = Instruction {
        offset: to_offset(offset)?,
        size: to_offset(size)?,
        prefix,
        opcode,
        mnemonic: entry.instr,
        category: entry.category,
        flow_type: entry.flow,
        operand,
        stack_behavior: StackBehavior {
            pops: entry.stack_pops,
            pushes: entry.stack_pushes,
            #[allow(clippy::cast_possible_wrap)]
            net_effect: entry.stack_pushes as i8 - entry.stack_pops as i8,
        },
        prefixes,
        constrained,
        alignment,
        branch_targets: Vec::new(),
    };

    let next = i64::from(instruction.next_offset());
    match (&instruction.flow_type, &instruction.operand) {
        (
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave,
            Operand::Immediate(value),
        ) => {
            let delta = value.as_i64().unwrap_or_default();
            instruction.branch_targets.push(branch_target(next, delta)?);
        }
        (FlowType::Switch, Operand::Switch(deltas)) => {
            instruction.branch_targets = deltas
                .iter()
                .map(|delta| branch_target(next, i64::from(*delta)))
                .collect::<Result<_>>()?;
        }
        _ => {}
    }

    Ok(instruction)
}

/// Decode every instruction of `code` in order.
///
/// # Errors
/// See [`decode_instruction`].
pub fn decode_stream(code: &[u8], allow_internal: bool) -> Result<Vec<Instruction>> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();

    while parser.has_more_data() {
        instructions.push(decode_instruction(&mut parser, allow_internal)?);
    }

    Ok(instructions)
}

fn read_operand(parser: &mut Parser, entry: &CilInstruction) -> Result<Operand> {
    Ok(match entry.op_type {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)),
        OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)),
        OperandType::UInt16 => Operand::Immediate(Immediate::UInt16(parser.read_le::<u16>()?)),
        OperandType::Int32 => Operand::Immediate(Immediate::Int32(parser.read_le::<i32>()?)),
        OperandType::Int64 => Operand::Immediate(Immediate::Int64(parser.read_le::<i64>()?)),
        OperandType::Float32 => Operand::Immediate(Immediate::Float32(parser.read_le::<f32>()?)),
        OperandType::Float64 => Operand::Immediate(Immediate::Float64(parser.read_le::<f64>()?)),
        OperandType::Token => Operand::Token(Token::new(parser.read_le::<u32>()?)),
        OperandType::Switch => {
            let count = parser.read_le::<u32>()? as usize;
            if count > parser.remaining() / 4 {
                return Err(out_of_bounds_error!());
            }

            let mut deltas = Vec::with_capacity(count);
            for _ in 0..count {
                deltas.push(parser.read_le::<i32>()?);
            }
            Operand::Switch(deltas)
        }
    })
}

fn branch_target(next: i64, delta: i64) -> Result<u32> {
    u32::try_from(next + delta)
        .map_err(|_| malformed_error!("Branch target {} + {} is out of range", next, delta))
}

fn to_offset(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| malformed_error!("Code offset {} exceeds 32 bits", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_local() {
        let mut parser = Parser::new(&[0x11, 0x10]);
        let result = decode_instruction(&mut parser, false).unwrap();

        assert_eq!(result.offset, 0);
        assert_eq!(result.size, 2);
        assert_eq!(result.code(), 0x11);
        assert_eq!(result.mnemonic, "ldloc.s");
        assert_eq!(result.category, InstructionCategory::LoadStore);
        assert_eq!(result.flow_type, FlowType::Sequential);
        assert_eq!(result.integer(), Some(0x10));
    }

    #[test]
    fn two_byte_opcode() {
        let mut parser = Parser::new(&[0xFE, 0x01]);
        let result = decode_instruction(&mut parser, false).unwrap();

        assert_eq!(result.prefix, 0xFE);
        assert_eq!(result.opcode, 0x01);
        assert_eq!(result.code(), 0xFE01);
        assert_eq!(result.mnemonic, "ceq");
        assert_eq!(result.category, InstructionCategory::Comparison);
        assert_eq!(result.stack_behavior.net_effect, -1);
    }

    #[test]
    fn short_branch_target() {
        let mut parser = Parser::new(&[0x2B, 0x05]);
        let result = decode_instruction(&mut parser, false).unwrap();

        assert_eq!(result.flow_type, FlowType::UnconditionalBranch);
        assert_eq!(result.branch_targets, [0x07]);
        assert_eq!(result.successors(), [0x07]);
    }

    #[test]
    fn backward_branch() {
        // nop; nop; br.s -4
        let code = [0x00, 0x00, 0x2B, 0xFC];
        let instructions = decode_stream(&code, false).unwrap();
        assert_eq!(instructions[2].branch_targets, [0x00]);

        // br.s -3 at offset 0 lands before the method
        assert!(decode_stream(&[0x2B, 0xFD], false).is_err());
    }

    #[test]
    fn conditional_successor_order() {
        // brtrue 0x10
        let mut parser = Parser::new(&[0x3A, 0x10, 0x00, 0x00, 0x00]);
        let result = decode_instruction(&mut parser, false).unwrap();

        assert_eq!(result.flow_type, FlowType::ConditionalBranch);
        assert_eq!(result.successors(), [0x05, 0x15]);
    }

    #[test]
    fn switch_targets() {
        #[rustfmt::skip]
        let code = [
            0x45, 0x02, 0x00, 0x00, 0x00,
            0x0A, 0x00, 0x00, 0x00,
            0x14, 0x00, 0x00, 0x00,
        ];
        let mut parser = Parser::new(&code);
        let result = decode_instruction(&mut parser, false).unwrap();

        assert_eq!(result.mnemonic, "switch");
        assert_eq!(result.size, 13);
        assert_eq!(result.branch_targets, [0x17, 0x21]);
        assert_eq!(result.successors(), [0x0D, 0x17, 0x21]);
    }

    #[test]
    fn switch_count_past_end() {
        let mut parser = Parser::new(&[0x45, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert!(matches!(
            decode_instruction(&mut parser, false),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn prefixes_fold_into_instruction() {
        #[rustfmt::skip]
        let code = [
            0xFE, 0x12, 0x02,             // unaligned. 2
            0xFE, 0x13,                   // volatile.
            0xFE, 0x19, 0x05,             // no. typecheck nullcheck
            0x4A,                         // ldind.i4
            0xFE, 0x16, 0x01, 0x00, 0x00, 0x02, // constrained. 0x02000001
            0xFE, 0x14,                   // tail.
            0x6F, 0x01, 0x00, 0x00, 0x0A, // callvirt 0x0A000001
        ];
        let instructions = decode_stream(&code, false).unwrap();
        assert_eq!(instructions.len(), 2);

        let load = &instructions[0];
        assert_eq!(load.mnemonic, "ldind.i4");
        assert_eq!(load.offset, 0);
        assert_eq!(load.size, 9);
        assert_eq!(load.alignment, Some(2));
        assert_eq!(
            load.prefixes,
            Prefixes::UNALIGNED | Prefixes::VOLATILE | Prefixes::NO_TYPECHECK | Prefixes::NO_NULLCHECK
        );

        let call = &instructions[1];
        assert_eq!(call.mnemonic, "callvirt");
        assert_eq!(call.offset, 9);
        assert_eq!(call.prefixes, Prefixes::CONSTRAINED | Prefixes::TAIL);
        assert_eq!(call.constrained, Some(Token::new(0x0200_0001)));
        assert_eq!(call.token(), Some(Token::new(0x0A00_0001)));
    }

    #[test]
    fn unknown_opcodes() {
        let mut parser = Parser::new(&[0x24]);
        assert!(matches!(
            decode_instruction(&mut parser, false),
            Err(Error::UnknownOpcode(0x24))
        ));

        let mut parser = Parser::new(&[0xFE, 0x08]);
        assert!(matches!(
            decode_instruction(&mut parser, false),
            Err(Error::UnknownOpcode(0xFE08))
        ));
    }

    #[test]
    fn internal_opcodes_are_gated() {
        let code = [0xFD, 0x2F, 0x02, 0x00, 0x00, 0x00];

        let mut parser = Parser::new(&code);
        assert!(matches!(
            decode_instruction(&mut parser, false),
            Err(Error::RestrictedOpcode(0xFD2F))
        ));

        let mut parser = Parser::new(&code);
        let result = decode_instruction(&mut parser, true).unwrap();
        assert_eq!(result.mnemonic, "pushback");
        assert_eq!(result.category, InstructionCategory::Internal);
        assert_eq!(result.integer(), Some(2));
    }

    #[test]
    fn token_and_float_operands() {
        let mut parser = Parser::new(&[0xD0, 0x01, 0x00, 0x00, 0x02]);
        let result = decode_instruction(&mut parser, false).unwrap();
        assert_eq!(result.mnemonic, "ldtoken");
        assert_eq!(result.token(), Some(Token::new(0x0200_0001)));

        let mut bytes = vec![0x23];
        bytes.extend_from_slice(&1.5f64.to_le_bytes());
        let mut parser = Parser::new(&bytes);
        let result = decode_instruction(&mut parser, false).unwrap();
        assert_eq!(result.float(), Some(1.5));
        assert_eq!(result.integer(), None);
    }

    #[test]
    fn truncated_operand() {
        let mut parser = Parser::new(&[0x20, 0x01, 0x00]);
        assert!(matches!(
            decode_instruction(&mut parser, false),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
