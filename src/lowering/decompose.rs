//! Rewriting of compound opcodes into simpler steps before encoding.
//!
//! `newobj` becomes an allocation followed by a plain constructor call, with the internal
//! stack shuffles putting the new object below the constructor arguments. `isinst` becomes the
//! non-throwing internal cast. Everything else passes through as a single step.

use crate::{
    assembly::{
        instructions::{CilInstruction, INSTRUCTIONS, INSTRUCTIONS_FD},
        opcodes, Immediate, Instruction, Operand, Prefixes, StackBehavior,
    },
    lowering::encoder::Encoder,
    metadata::signatures::TypeSig,
    Error, Result,
};

/// One unit of encoding work.
#[derive(Debug, Clone)]
pub(crate) struct Step {
    /// The instruction to encode, possibly synthetic
    pub instruction: Instruction,
    /// Type operand that replaces resolving the instruction's token
    pub ty: Option<TypeSig>,
}

impl Step {
    fn plain(instruction: Instruction) -> Step {
        Step {
            instruction,
            ty: None,
        }
    }
}

/// Split `instruction` into the steps that encode it.
pub(crate) fn decompose(encoder: &Encoder<'_>, instruction: &Instruction) -> Result<Vec<Step>> {
    if instruction.prefix != 0 {
        return Ok(vec![Step::plain(instruction.clone())]);
    }

    match instruction.opcode {
        opcodes::NEWOBJ => decompose_newobj(encoder, instruction),
        opcodes::ISINST => Ok(vec![Step::plain(synthetic(
            instruction,
            opcodes::FD_PREFIX,
            opcodes::FD_CASTCLASSEX,
            instruction.operand.clone(),
        ))]),
        _ => Ok(vec![Step::plain(instruction.clone())]),
    }
}

fn decompose_newobj(encoder: &Encoder<'_>, instruction: &Instruction) -> Result<Vec<Step>> {
    let token = instruction
        .token()
        .ok_or_else(|| malformed_error!("newobj at IL_{:04X} has no token", instruction.offset))?;
    let callee = encoder.resolve_callee(token)?;
    let owner = callee.method.owner.clone();
    if matches!(owner, TypeSig::Array(_)) {
        return Err(Error::NoEncoding(format!(
            "newobj of the multi-dimensional array {owner}"
        )));
    }

    let params = encoder.call_site_params(token, &callee)?;
    let depth = |count: usize| -> Result<Operand> {
        let count = i32::try_from(count)
            .map_err(|_| malformed_error!("Constructor with {} parameters", count))?;
        Ok(Operand::Immediate(Immediate::Int32(count)))
    };
    let value_type = encoder.session.sig_is_value_type(&owner)?;

    let allocate = if value_type {
        opcodes::FD_LDOBJ_ADDR
    } else {
        opcodes::FD_GCMALLOC
    };
    let mut steps = vec![
        Step {
            instruction: synthetic(instruction, opcodes::FD_PREFIX, allocate, Operand::Token(token)),
            ty: Some(owner.clone()),
        },
        Step::plain(synthetic(instruction, 0, opcodes::DUP, Operand::None)),
        Step::plain(synthetic(
            instruction,
            opcodes::FD_PREFIX,
            opcodes::FD_PUSHBACK,
            depth(params + 1)?,
        )),
        Step::plain(synthetic(
            instruction,
            opcodes::FD_PREFIX,
            opcodes::FD_PUSHBACK,
            depth(params)?,
        )),
        Step::plain(synthetic(instruction, 0, opcodes::CALL, Operand::Token(token))),
    ];
    if value_type {
        steps.push(Step {
            instruction: synthetic(instruction, 0, opcodes::LDOBJ, Operand::Token(token)),
            ty: Some(owner),
        });
    }

    Ok(steps)
}

/// An instruction standing in for part of `original`, at its offset.
fn synthetic(original: &Instruction, prefix: u8, opcode: u8, operand: Operand) -> Instruction {
    let entry: &CilInstruction = if prefix == opcodes::FD_PREFIX {
        &INSTRUCTIONS_FD[opcode as usize]
    } else {
        &INSTRUCTIONS[opcode as usize]
    };

    Instruction {
        offset: original.offset,
        size: original.size,
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
        prefixes: Prefixes::empty(),
        constrained: None,
        alignment: None,
        branch_targets: Vec::new(),
    }
}
