//! Encoding rules, one per opcode.
//!
//! Each rule pops its operands from the [`EvalStack`], pushes its results and appends the
//! [`Tac`] it lowers to. Branch targets are left [`Label::PENDING`] for the label pass.

use crate::{
    assembly::{opcodes::*, Instruction, Prefixes},
    lowering::{
        decompose::Step,
        encoder::{slot_index, Encoder},
        stack::EvalStack,
        tac::{
            BinaryOp, CompareOp, ConstValue, Label, RuntimeHandle, StackType, Tac, UnaryOp, Var,
        },
    },
    metadata::{
        signatures::{ElementType, TypeSig},
        tables::TableId,
        token::Token,
    },
    Error, Result,
};

/// Signature blob tag of a field reference
const FIELD_SIG: u8 = 0x06;

impl Encoder<'_> {
    /// Encode one step, prefixing stack errors with its location.
    pub(crate) fn encode_step(
        &mut self,
        step: &Step,
        stack: &mut EvalStack,
        out: &mut Vec<Tac>,
    ) -> Result<()> {
        let instruction = &step.instruction;
        let result = match instruction.prefix {
            0 => self.encode_single(step, stack, out),
            FE_PREFIX => self.encode_extended(step, stack, out),
            FD_PREFIX => self.encode_internal(step, stack, out),
            _ => Err(Error::UnknownOpcode(instruction.code())),
        };

        result.map_err(|error| match error {
            Error::StackMismatch(message) => Error::StackMismatch(format!(
                "{} at IL_{:04X} in {}: {}",
                instruction.mnemonic, instruction.offset, self.method.name, message
            )),
            other => other,
        })
    }

    fn encode_single(
        &mut self,
        step: &Step,
        stack: &mut EvalStack,
        out: &mut Vec<Tac>,
    ) -> Result<()> {
        let instruction = &step.instruction;

        match instruction.opcode {
            NOP => out.push(Tac::Nop),
            BREAK => out.push(Tac::Break),

            LDARG_0..=LDARG_3 => self.load_arg(usize::from(instruction.opcode - LDARG_0), stack, out)?,
            LDARG_S => self.load_arg(index_operand(instruction)?, stack, out)?,
            LDARGA_S => self.address_of_arg(index_operand(instruction)?, stack, out)?,
            STARG_S => self.store_arg(index_operand(instruction)?, stack, out)?,
            LDLOC_0..=LDLOC_3 => {
                self.load_local(usize::from(instruction.opcode - LDLOC_0), stack, out)?;
            }
            LDLOC_S => self.load_local(index_operand(instruction)?, stack, out)?,
            LDLOCA_S => self.address_of_local(index_operand(instruction)?, stack, out)?,
            STLOC_0..=STLOC_3 => {
                self.store_local(usize::from(instruction.opcode - STLOC_0), stack, out)?;
            }
            STLOC_S => self.store_local(index_operand(instruction)?, stack, out)?,

            LDNULL => push_const(stack, out, ConstValue::Null, StackType::O)?,
            LDC_I4_M1..=LDC_I4_8 => {
                let value = i32::from(instruction.opcode) - i32::from(LDC_I4_0);
                push_const(stack, out, ConstValue::I32(value), StackType::Int32)?;
            }
            LDC_I4_S | LDC_I4 => {
                let value = i32::try_from(integer_operand(instruction)?)
                    .map_err(|_| malformed_error!("ldc.i4 operand out of range"))?;
                push_const(stack, out, ConstValue::I32(value), StackType::Int32)?;
            }
            LDC_I8 => {
                let value = integer_operand(instruction)?;
                push_const(stack, out, ConstValue::I64(value), StackType::Int64)?;
            }
            LDC_R4 | LDC_R8 => {
                let value = instruction
                    .float()
                    .ok_or_else(|| malformed_error!("{} without a float operand", instruction.mnemonic))?;
                push_const(stack, out, ConstValue::F64(value), StackType::F)?;
            }
            LDSTR => {
                let literal = self
                    .session
                    .module(self.module)?
                    .user_string(token_operand(instruction)?)?;
                push_const(stack, out, ConstValue::String(literal), StackType::O)?;
            }

            DUP => {
                let (src, ty) = stack.peek()?;
                let ty = ty.clone();
                let dest = stack.push(ty.clone())?;
                out.push(Tac::Move { dest, src, ty });
            }
            POP => {
                let (value, _) = stack.pop()?;
                out.push(Tac::Pop { value });
            }

            CALL | CALLVIRT => self.call(instruction, stack, out)?,
            RET => self.ret(stack, out)?,

            BR_S | BR => out.push(Tac::Branch {
                target: Label::PENDING,
            }),
            BRFALSE_S | BRFALSE | BRTRUE_S | BRTRUE => {
                let (left, ty) = stack.pop()?;
                if matches!(ty, StackType::F | StackType::ValueType(_)) {
                    return Err(Error::StackMismatch(format!("cannot test {ty} against zero")));
                }
                let op = if matches!(instruction.opcode, BRFALSE_S | BRFALSE) {
                    CompareOp::Eq
                } else {
                    CompareOp::Ne
                };
                out.push(Tac::BranchIf {
                    op,
                    left,
                    right: None,
                    ty,
                    unsigned: false,
                    true_target: Label::PENDING,
                    false_target: Label::PENDING,
                });
            }
            BEQ_S..=BLT_UN_S | BEQ..=BLT_UN => {
                let (op, unsigned) = branch_comparison(instruction.opcode)?;
                let (right, right_ty) = stack.pop()?;
                let (left, left_ty) = stack.pop()?;
                let ty = comparison_type(&left_ty, &right_ty)?;
                out.push(Tac::BranchIf {
                    op,
                    left,
                    right: Some(right),
                    ty,
                    unsigned,
                    true_target: Label::PENDING,
                    false_target: Label::PENDING,
                });
            }
            SWITCH => {
                let (value, ty) = stack.pop()?;
                if !matches!(ty, StackType::Int32 | StackType::NativeInt) {
                    return Err(Error::StackMismatch(format!("switch on {ty}")));
                }
                out.push(Tac::Switch {
                    value,
                    targets: vec![Label::PENDING; instruction.branch_targets.len()],
                    default: Label::PENDING,
                });
            }

            LDIND_I1..=LDIND_REF => {
                let kind = indirect_kind(instruction.opcode)?;
                self.load_indirect(TypeSig::Primitive(kind), stack, out)?;
            }
            STIND_REF | STIND_I1..=STIND_R8 | STIND_I => {
                let kind = indirect_kind(instruction.opcode)?;
                self.store_indirect(TypeSig::Primitive(kind), stack, out)?;
            }
            LDOBJ => {
                let ty = self.type_operand(step)?;
                self.load_indirect(ty, stack, out)?;
            }
            STOBJ => {
                let ty = self.type_operand(step)?;
                self.store_indirect(ty, stack, out)?;
            }

            ADD..=XOR | ADD_OVF..=SUB_OVF_UN => {
                let (op, unsigned, overflow_check) = binary_operation(instruction.opcode)?;
                let (right, right_ty) = stack.pop()?;
                let (left, left_ty) = stack.pop()?;
                let ty = arithmetic_type(op, &left_ty, &right_ty)?;
                let dest = stack.push(ty.clone())?;
                out.push(Tac::Binary {
                    dest,
                    op,
                    left,
                    right,
                    ty,
                    unsigned,
                    overflow_check,
                });
            }
            SHL | SHR | SHR_UN => {
                let (right, amount) = stack.pop()?;
                let (left, ty) = stack.pop()?;
                if !ty.is_integer() || !matches!(amount, StackType::Int32 | StackType::NativeInt) {
                    return Err(Error::StackMismatch(format!("cannot shift {ty} by {amount}")));
                }
                let dest = stack.push(ty.clone())?;
                out.push(Tac::Binary {
                    dest,
                    op: if instruction.opcode == SHL {
                        BinaryOp::Shl
                    } else {
                        BinaryOp::Shr
                    },
                    left,
                    right,
                    ty,
                    unsigned: instruction.opcode == SHR_UN,
                    overflow_check: false,
                });
            }
            NEG | NOT => {
                let (operand, ty) = stack.pop()?;
                let op = if instruction.opcode == NEG {
                    UnaryOp::Neg
                } else {
                    UnaryOp::Not
                };
                let valid = match op {
                    UnaryOp::Neg => ty.is_integer() || ty == StackType::F,
                    UnaryOp::Not => ty.is_integer(),
                };
                if !valid {
                    return Err(Error::StackMismatch(format!("{op:?} of {ty}")));
                }
                let dest = stack.push(ty.clone())?;
                out.push(Tac::Unary {
                    dest,
                    op,
                    operand,
                    ty,
                });
            }

            CONV_I1..=CONV_U8
            | CONV_R_UN
            | CONV_OVF_I1_UN..=CONV_OVF_U_UN
            | CONV_OVF_I1..=CONV_OVF_U8
            | CONV_U2..=CONV_OVF_U
            | CONV_U => self.convert(instruction.opcode, stack, out)?,

            LDFLD | LDFLDA => {
                let field = self.resolve_field_token(token_operand(instruction)?)?;
                let (object, ty) = stack.pop()?;
                if matches!(ty, StackType::Int32 | StackType::Int64 | StackType::F) {
                    return Err(Error::StackMismatch(format!("field access through {ty}")));
                }
                if instruction.opcode == LDFLD {
                    let dest = stack.push(self.stack_type(&field.ty)?)?;
                    out.push(Tac::LoadField {
                        dest,
                        object,
                        field,
                    });
                } else {
                    let dest = stack.push(StackType::Ref)?;
                    out.push(Tac::LoadFieldAddr {
                        dest,
                        object,
                        field,
                    });
                }
            }
            STFLD => {
                let field = self.resolve_field_token(token_operand(instruction)?)?;
                let (value, _) = stack.pop()?;
                let (object, _) = stack.pop()?;
                out.push(Tac::StoreField {
                    object,
                    field,
                    value,
                });
            }
            LDSFLD => {
                let field = self.resolve_field_token(token_operand(instruction)?)?;
                let dest = stack.push(self.stack_type(&field.ty)?)?;
                out.push(Tac::LoadStaticField { dest, field });
            }
            LDSFLDA => {
                let field = self.resolve_field_token(token_operand(instruction)?)?;
                let dest = stack.push(StackType::Ref)?;
                out.push(Tac::LoadStaticFieldAddr { dest, field });
            }
            STSFLD => {
                let field = self.resolve_field_token(token_operand(instruction)?)?;
                let (value, _) = stack.pop()?;
                out.push(Tac::StoreStaticField { field, value });
            }

            BOX => {
                let ty = self.type_operand(step)?;
                let (value, _) = stack.pop()?;
                let dest = stack.push(StackType::O)?;
                out.push(Tac::Box { dest, value, ty });
            }
            UNBOX_ANY => {
                let ty = self.type_operand(step)?;
                let (object, _) = stack.pop()?;
                let dest = stack.push(self.stack_type(&ty)?)?;
                out.push(Tac::UnboxAny { dest, object, ty });
            }
            CASTCLASS => self.cast(step, true, stack, out)?,
            THROW => {
                let (value, ty) = stack.pop()?;
                if ty != StackType::O {
                    return Err(Error::StackMismatch(format!("throw of {ty}")));
                }
                stack.clear();
                out.push(Tac::Throw { value });
            }

            NEWARR => {
                let elem = self.type_operand(step)?;
                let (length, ty) = stack.pop()?;
                if !matches!(ty, StackType::Int32 | StackType::NativeInt) {
                    return Err(Error::StackMismatch(format!("array length of type {ty}")));
                }
                let dest = stack.push(StackType::O)?;
                out.push(Tac::NewArray { dest, elem, length });
            }
            LDLEN => {
                let (array, _) = stack.pop()?;
                let dest = stack.push(StackType::NativeInt)?;
                out.push(Tac::ArrayLength { dest, array });
            }
            LDELEMA => {
                let elem = self.type_operand(step)?;
                let (index, array) = pop_element_access(stack)?;
                let dest = stack.push(StackType::Ref)?;
                out.push(Tac::LoadElementAddr {
                    dest,
                    array,
                    index,
                    elem,
                });
            }
            LDELEM_I1..=LDELEM_REF => {
                let elem = TypeSig::Primitive(element_kind(instruction.opcode)?);
                self.load_element(elem, stack, out)?;
            }
            LDELEM => {
                let elem = self.type_operand(step)?;
                self.load_element(elem, stack, out)?;
            }
            STELEM_I..=STELEM_REF => {
                let elem = TypeSig::Primitive(element_kind(instruction.opcode)?);
                self.store_element(elem, stack, out)?;
            }
            STELEM => {
                let elem = self.type_operand(step)?;
                self.store_element(elem, stack, out)?;
            }

            LDTOKEN => self.load_token(token_operand(instruction)?, stack, out)?,

            LEAVE | LEAVE_S => {
                stack.clear();
                out.push(Tac::Leave {
                    target: Label::PENDING,
                });
            }
            ENDFINALLY => {
                stack.clear();
                out.push(Tac::EndFinally);
            }

            _ => return Err(no_encoding(instruction)),
        }

        Ok(())
    }

    fn encode_extended(
        &mut self,
        step: &Step,
        stack: &mut EvalStack,
        out: &mut Vec<Tac>,
    ) -> Result<()> {
        let instruction = &step.instruction;

        match instruction.opcode {
            FE_CEQ | FE_CGT | FE_CGT_UN | FE_CLT | FE_CLT_UN => {
                let (op, unsigned) = match instruction.opcode {
                    FE_CEQ => (CompareOp::Eq, false),
                    FE_CGT => (CompareOp::Gt, false),
                    FE_CGT_UN => (CompareOp::Gt, true),
                    FE_CLT => (CompareOp::Lt, false),
                    _ => (CompareOp::Lt, true),
                };
                let (right, right_ty) = stack.pop()?;
                let (left, left_ty) = stack.pop()?;
                let ty = comparison_type(&left_ty, &right_ty)?;
                let dest = stack.push(StackType::Int32)?;
                out.push(Tac::Compare {
                    dest,
                    op,
                    left,
                    right,
                    ty,
                    unsigned,
                });
            }

            FE_LDFTN => {
                let callee = self.resolve_callee(token_operand(instruction)?)?;
                let dest = stack.push(StackType::NativeInt)?;
                out.push(Tac::LoadFunction {
                    dest,
                    callee,
                    object: None,
                });
            }
            FE_LDVIRTFTN => {
                let callee = self.resolve_callee(token_operand(instruction)?)?;
                let (object, _) = stack.pop()?;
                let dest = stack.push(StackType::NativeInt)?;
                out.push(Tac::LoadFunction {
                    dest,
                    callee,
                    object: Some(object),
                });
            }

            FE_LDARG => self.load_arg(index_operand(instruction)?, stack, out)?,
            FE_LDARGA => self.address_of_arg(index_operand(instruction)?, stack, out)?,
            FE_STARG => self.store_arg(index_operand(instruction)?, stack, out)?,
            FE_LDLOC => self.load_local(index_operand(instruction)?, stack, out)?,
            FE_LDLOCA => self.address_of_local(index_operand(instruction)?, stack, out)?,
            FE_STLOC => self.store_local(index_operand(instruction)?, stack, out)?,

            FE_LOCALLOC => {
                let (size, ty) = stack.pop()?;
                if !matches!(ty, StackType::Int32 | StackType::NativeInt) {
                    return Err(Error::StackMismatch(format!("localloc of {ty} bytes")));
                }
                let dest = stack.push(StackType::NativeInt)?;
                out.push(Tac::LocalAlloc { dest, size });
            }
            FE_ENDFILTER => {
                let (value, ty) = stack.pop()?;
                if ty != StackType::Int32 {
                    return Err(Error::StackMismatch(format!("endfilter on {ty}")));
                }
                stack.clear();
                out.push(Tac::EndFilter { value });
            }
            FE_INITOBJ => {
                let ty = self.type_operand(step)?;
                let (addr, _) = stack.pop()?;
                out.push(Tac::InitObj { addr, ty });
            }
            FE_RETHROW => {
                stack.clear();
                out.push(Tac::Rethrow);
            }
            FE_SIZEOF => {
                let ty = self.type_operand(step)?;
                let dest = stack.push(StackType::Int32)?;
                out.push(Tac::SizeOf { dest, ty });
            }

            _ => return Err(no_encoding(instruction)),
        }

        Ok(())
    }

    fn encode_internal(
        &mut self,
        step: &Step,
        stack: &mut EvalStack,
        out: &mut Vec<Tac>,
    ) -> Result<()> {
        let instruction = &step.instruction;

        match instruction.opcode {
            FD_GCMALLOC => {
                let ty = self.type_operand(step)?;
                let dest = stack.push(StackType::O)?;
                out.push(Tac::Alloc { dest, ty });
            }
            FD_LDOBJ_ADDR => {
                let ty = self.type_operand(step)?;
                let temp = self.new_temp(ty.clone())?;
                out.push(Tac::Zero { dest: temp, ty });
                let dest = stack.push(StackType::Ref)?;
                out.push(Tac::AddressOf { dest, source: temp });
            }
            FD_PUSHBACK => {
                let count = index_operand(instruction)?;
                push_back(count, stack, out)?;
            }
            FD_BRINGFORWARD => {
                let count = index_operand(instruction)?;
                bring_forward(count, stack, out)?;
            }
            FD_FLIP => bring_forward(1, stack, out)?,
            FD_CASTCLASSEX => self.cast(step, false, stack, out)?,
            FD_LDELEM_VT => {
                let elem = self.type_operand(step)?;
                self.load_element(elem, stack, out)?;
            }
            FD_STELEM_VT => {
                let elem = self.type_operand(step)?;
                self.store_element(elem, stack, out)?;
            }
            FD_LOADCATCHOBJ => {
                let dest = stack.push(StackType::O)?;
                out.push(Tac::ExceptionIn {
                    dest,
                    ty: TypeSig::Primitive(ElementType::Object),
                });
            }
            FD_INSTRUCTION_LABEL => out.push(Tac::Nop),

            _ => return Err(no_encoding(instruction)),
        }

        Ok(())
    }

    // ========================================================================
    // Arguments and locals
    // ========================================================================

    fn load_arg(&self, index: usize, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        let ty = self.stack_type(self.arg(index)?)?;
        let dest = stack.push(ty.clone())?;
        out.push(Tac::Move {
            dest,
            src: Var::Arg(slot_index(index)?),
            ty,
        });
        Ok(())
    }

    fn address_of_arg(&self, index: usize, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        self.arg(index)?;
        let dest = stack.push(StackType::Ref)?;
        out.push(Tac::AddressOf {
            dest,
            source: Var::Arg(slot_index(index)?),
        });
        Ok(())
    }

    fn store_arg(&self, index: usize, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        self.arg(index)?;
        let (src, ty) = stack.pop()?;
        out.push(Tac::Move {
            dest: Var::Arg(slot_index(index)?),
            src,
            ty,
        });
        Ok(())
    }

    fn load_local(&self, index: usize, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        let ty = self.stack_type(self.local(index)?)?;
        let dest = stack.push(ty.clone())?;
        out.push(Tac::Move {
            dest,
            src: Var::Local(slot_index(index)?),
            ty,
        });
        Ok(())
    }

    fn address_of_local(
        &self,
        index: usize,
        stack: &mut EvalStack,
        out: &mut Vec<Tac>,
    ) -> Result<()> {
        self.local(index)?;
        let dest = stack.push(StackType::Ref)?;
        out.push(Tac::AddressOf {
            dest,
            source: Var::Local(slot_index(index)?),
        });
        Ok(())
    }

    fn store_local(&self, index: usize, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        self.local(index)?;
        let (src, ty) = stack.pop()?;
        out.push(Tac::Move {
            dest: Var::Local(slot_index(index)?),
            src,
            ty,
        });
        Ok(())
    }

    // ========================================================================
    // Calls and returns
    // ========================================================================

    fn call(&self, instruction: &Instruction, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        let token = token_operand(instruction)?;
        let callee = self.resolve_callee(token)?;
        let signature = callee.method.signature.method();

        let receiver = usize::from(signature.has_implicit_this());
        let args = stack
            .pop_n(self.call_site_params(token, &callee)? + receiver)?
            .into_iter()
            .map(|(var, _)| var)
            .collect();

        let dest = match &signature.ret.ty {
            TypeSig::Primitive(ElementType::Void) => None,
            ret => Some(stack.push(self.stack_type(ret)?)?),
        };
        let constrained = instruction
            .constrained
            .map(|token| self.resolve_type_token(token))
            .transpose()?;

        out.push(Tac::Call {
            dest,
            virtual_call: instruction.opcode == CALLVIRT,
            constrained,
            tail: instruction.prefixes.contains(Prefixes::TAIL),
            callee,
            args,
        });
        Ok(())
    }

    fn ret(&self, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        let value = match &self.method.signature.method().ret.ty {
            TypeSig::Primitive(ElementType::Void) => None,
            _ => Some(stack.pop()?.0),
        };
        if !stack.is_empty() {
            return Err(Error::StackMismatch(format!(
                "{} entries left on the stack at return",
                stack.depth()
            )));
        }

        out.push(Tac::Return { value });
        Ok(())
    }

    // ========================================================================
    // Memory, objects and arrays
    // ========================================================================

    fn load_indirect(&self, ty: TypeSig, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        let (addr, addr_ty) = stack.pop()?;
        check_address(&addr_ty)?;
        let dest = stack.push(self.stack_type(&ty)?)?;
        out.push(Tac::LoadIndirect { dest, addr, ty });
        Ok(())
    }

    fn store_indirect(&self, ty: TypeSig, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        let (value, _) = stack.pop()?;
        let (addr, addr_ty) = stack.pop()?;
        check_address(&addr_ty)?;
        out.push(Tac::StoreIndirect { addr, value, ty });
        Ok(())
    }

    fn load_element(&self, elem: TypeSig, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        let (index, array) = pop_element_access(stack)?;
        let dest = stack.push(self.stack_type(&elem)?)?;
        out.push(Tac::LoadElement {
            dest,
            array,
            index,
            elem,
        });
        Ok(())
    }

    fn store_element(&self, elem: TypeSig, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        let (value, _) = stack.pop()?;
        let (index, array) = pop_element_access(stack)?;
        out.push(Tac::StoreElement {
            array,
            index,
            value,
            elem,
        });
        Ok(())
    }

    /// `castclass` and `isinst`; value types are tested in their boxed form
    fn cast(&self, step: &Step, throws: bool, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        let target = self.type_operand(step)?;
        let ty = if self.session.sig_is_value_type(&target)? {
            TypeSig::Boxed(Box::new(target))
        } else {
            target
        };

        let (object, object_ty) = stack.pop()?;
        if object_ty != StackType::O {
            return Err(Error::StackMismatch(format!("cast of {object_ty}")));
        }
        let dest = stack.push(StackType::O)?;
        out.push(Tac::Cast {
            dest,
            object,
            ty,
            throws,
        });
        Ok(())
    }

    fn load_token(&self, token: Token, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        let handle = match token.table_id() {
            Some(TableId::TypeDef | TableId::TypeRef | TableId::TypeSpec) => {
                RuntimeHandle::Type(self.resolve_type_token(token)?)
            }
            Some(TableId::MethodDef | TableId::MethodSpec) => {
                RuntimeHandle::Method(self.resolve_callee(token)?.method)
            }
            Some(TableId::Field) => RuntimeHandle::Field(self.resolve_field_token(token)?),
            Some(TableId::MemberRef) => {
                if self.member_ref_is_field(token)? {
                    RuntimeHandle::Field(self.resolve_field_token(token)?)
                } else {
                    RuntimeHandle::Method(self.resolve_callee(token)?.method)
                }
            }
            _ => return Err(Error::UnexpectedToken(token)),
        };

        let handle_type = match handle {
            RuntimeHandle::Type(_) => "RuntimeTypeHandle",
            RuntimeHandle::Method(_) => "RuntimeMethodHandle",
            RuntimeHandle::Field(_) => "RuntimeFieldHandle",
        };
        let handle_type = self.session.type_sig(self.session.corlib_type(handle_type)?);

        let dest = stack.push(StackType::ValueType(handle_type))?;
        out.push(Tac::LoadToken { dest, handle });
        Ok(())
    }

    fn member_ref_is_field(&self, token: Token) -> Result<bool> {
        let module = self.session.module(self.module)?;
        let member = module
            .tables()
            .member_ref
            .get(token.row())
            .ok_or_else(|| malformed_error!("MemberRef {} does not exist", token.row()))?;
        let blob = module.blobs().get(member.signature as usize)?;
        Ok(blob.first() == Some(&FIELD_SIG))
    }

    fn convert(&self, opcode: u8, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
        let (target, unsigned, overflow_check) = conversion(opcode)?;
        let (operand, from) = stack.pop()?;

        let native = matches!(target, ElementType::I | ElementType::U | ElementType::I8 | ElementType::U8);
        let valid = from.is_integer() || from == StackType::F || (native && from == StackType::Ref);
        if !valid {
            return Err(Error::StackMismatch(format!("cannot convert {from} to {target:?}")));
        }

        let dest = stack.push(self.stack_type(&TypeSig::Primitive(target))?)?;
        out.push(Tac::Conv {
            dest,
            operand,
            from,
            target,
            unsigned,
            overflow_check,
        });
        Ok(())
    }

    /// Type operand of the step, resolved from its token unless supplied
    fn type_operand(&self, step: &Step) -> Result<TypeSig> {
        match &step.ty {
            Some(ty) => Ok(ty.clone()),
            None => self.resolve_type_token(token_operand(&step.instruction)?),
        }
    }
}

// ============================================================================
// Stack shuffles
// ============================================================================

/// Move the top entry below the `count` entries under it, through the slot above the top.
fn push_back(count: usize, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
    let entries = stack.entries().to_vec();
    let depth = entries.len();
    let position = stack.push_back(count)?;
    if count == 0 {
        return Ok(());
    }

    let scratch = Var::Stack(slot_index(depth)?);
    out.push(Tac::Move {
        dest: scratch,
        src: Var::Stack(slot_index(depth - 1)?),
        ty: entries[depth - 1].clone(),
    });
    for index in (position..depth - 1).rev() {
        out.push(Tac::Move {
            dest: Var::Stack(slot_index(index + 1)?),
            src: Var::Stack(slot_index(index)?),
            ty: entries[index].clone(),
        });
    }
    out.push(Tac::Move {
        dest: Var::Stack(slot_index(position)?),
        src: scratch,
        ty: entries[depth - 1].clone(),
    });

    Ok(())
}

/// Move the entry with `count` entries above it to the top.
fn bring_forward(count: usize, stack: &mut EvalStack, out: &mut Vec<Tac>) -> Result<()> {
    let entries = stack.entries().to_vec();
    let depth = entries.len();
    let position = stack.bring_forward(count)?;
    if count == 0 {
        return Ok(());
    }

    let scratch = Var::Stack(slot_index(depth)?);
    out.push(Tac::Move {
        dest: scratch,
        src: Var::Stack(slot_index(position)?),
        ty: entries[position].clone(),
    });
    for index in position..depth - 1 {
        out.push(Tac::Move {
            dest: Var::Stack(slot_index(index)?),
            src: Var::Stack(slot_index(index + 1)?),
            ty: entries[index + 1].clone(),
        });
    }
    out.push(Tac::Move {
        dest: Var::Stack(slot_index(depth - 1)?),
        src: scratch,
        ty: entries[position].clone(),
    });

    Ok(())
}

// ============================================================================
// Operand helpers
// ============================================================================

fn push_const(stack: &mut EvalStack, out: &mut Vec<Tac>, value: ConstValue, ty: StackType) -> Result<()> {
    let dest = stack.push(ty)?;
    out.push(Tac::Const { dest, value });
    Ok(())
}

fn pop_element_access(stack: &mut EvalStack) -> Result<(Var, Var)> {
    let (index, index_ty) = stack.pop()?;
    let (array, array_ty) = stack.pop()?;
    if !matches!(index_ty, StackType::Int32 | StackType::NativeInt) || array_ty != StackType::O {
        return Err(Error::StackMismatch(format!(
            "element access of {array_ty} with index {index_ty}"
        )));
    }
    Ok((index, array))
}

fn check_address(ty: &StackType) -> Result<()> {
    match ty {
        StackType::Ref | StackType::NativeInt => Ok(()),
        other => Err(Error::StackMismatch(format!("{other} is not an address"))),
    }
}

fn token_operand(instruction: &Instruction) -> Result<Token> {
    instruction.token().ok_or_else(|| {
        malformed_error!("{} at IL_{:04X} has no token", instruction.mnemonic, instruction.offset)
    })
}

fn integer_operand(instruction: &Instruction) -> Result<i64> {
    instruction.integer().ok_or_else(|| {
        malformed_error!("{} at IL_{:04X} has no integer operand", instruction.mnemonic, instruction.offset)
    })
}

fn index_operand(instruction: &Instruction) -> Result<usize> {
    let value = integer_operand(instruction)?;
    usize::try_from(value).map_err(|_| {
        malformed_error!("{} at IL_{:04X} has index {}", instruction.mnemonic, instruction.offset, value)
    })
}

fn no_encoding(instruction: &Instruction) -> Error {
    Error::NoEncoding(format!(
        "{} (0x{:04X}) at IL_{:04X}",
        instruction.mnemonic,
        instruction.code(),
        instruction.offset
    ))
}

// ============================================================================
// Opcode classification
// ============================================================================

fn branch_comparison(opcode: u8) -> Result<(CompareOp, bool)> {
    let long = if opcode >= BEQ { opcode - (BEQ - BEQ_S) } else { opcode };
    Ok(match long {
        BEQ_S => (CompareOp::Eq, false),
        BGE_S => (CompareOp::Ge, false),
        BGT_S => (CompareOp::Gt, false),
        BLE_S => (CompareOp::Le, false),
        BLT_S => (CompareOp::Lt, false),
        BNE_UN_S => (CompareOp::Ne, true),
        BGE_UN_S => (CompareOp::Ge, true),
        BGT_UN_S => (CompareOp::Gt, true),
        BLE_UN_S => (CompareOp::Le, true),
        BLT_UN_S => (CompareOp::Lt, true),
        _ => return Err(Error::UnknownOpcode(u16::from(opcode))),
    })
}

/// Operator, unsigned and overflow-checked flags of a binary opcode
fn binary_operation(opcode: u8) -> Result<(BinaryOp, bool, bool)> {
    Ok(match opcode {
        ADD => (BinaryOp::Add, false, false),
        SUB => (BinaryOp::Sub, false, false),
        MUL => (BinaryOp::Mul, false, false),
        DIV => (BinaryOp::Div, false, false),
        DIV_UN => (BinaryOp::Div, true, false),
        REM => (BinaryOp::Rem, false, false),
        REM_UN => (BinaryOp::Rem, true, false),
        AND => (BinaryOp::And, false, false),
        OR => (BinaryOp::Or, false, false),
        XOR => (BinaryOp::Xor, false, false),
        ADD_OVF => (BinaryOp::Add, false, true),
        ADD_OVF_UN => (BinaryOp::Add, true, true),
        MUL_OVF => (BinaryOp::Mul, false, true),
        MUL_OVF_UN => (BinaryOp::Mul, true, true),
        SUB_OVF => (BinaryOp::Sub, false, true),
        SUB_OVF_UN => (BinaryOp::Sub, true, true),
        _ => return Err(Error::UnknownOpcode(u16::from(opcode))),
    })
}

/// Target, unsigned-source and overflow-checked flags of a conversion opcode
fn conversion(opcode: u8) -> Result<(ElementType, bool, bool)> {
    use ElementType as E;

    Ok(match opcode {
        CONV_I1 => (E::I1, false, false),
        CONV_I2 => (E::I2, false, false),
        CONV_I4 => (E::I4, false, false),
        CONV_I8 => (E::I8, false, false),
        CONV_R4 => (E::R4, false, false),
        CONV_R8 => (E::R8, false, false),
        CONV_U4 => (E::U4, false, false),
        CONV_U8 => (E::U8, false, false),
        CONV_U2 => (E::U2, false, false),
        CONV_U1 => (E::U1, false, false),
        CONV_I => (E::I, false, false),
        CONV_U => (E::U, false, false),
        CONV_R_UN => (E::R8, true, false),
        CONV_OVF_I1_UN => (E::I1, true, true),
        CONV_OVF_I2_UN => (E::I2, true, true),
        CONV_OVF_I4_UN => (E::I4, true, true),
        CONV_OVF_I8_UN => (E::I8, true, true),
        CONV_OVF_U1_UN => (E::U1, true, true),
        CONV_OVF_U2_UN => (E::U2, true, true),
        CONV_OVF_U4_UN => (E::U4, true, true),
        CONV_OVF_U8_UN => (E::U8, true, true),
        CONV_OVF_I_UN => (E::I, true, true),
        CONV_OVF_U_UN => (E::U, true, true),
        CONV_OVF_I1 => (E::I1, false, true),
        CONV_OVF_U1 => (E::U1, false, true),
        CONV_OVF_I2 => (E::I2, false, true),
        CONV_OVF_U2 => (E::U2, false, true),
        CONV_OVF_I4 => (E::I4, false, true),
        CONV_OVF_U4 => (E::U4, false, true),
        CONV_OVF_I8 => (E::I8, false, true),
        CONV_OVF_U8 => (E::U8, false, true),
        CONV_OVF_I => (E::I, false, true),
        CONV_OVF_U => (E::U, false, true),
        _ => return Err(Error::UnknownOpcode(u16::from(opcode))),
    })
}

/// Value type of `ldind.*` and `stind.*`
fn indirect_kind(opcode: u8) -> Result<ElementType> {
    use ElementType as E;

    Ok(match opcode {
        LDIND_I1 | STIND_I1 => E::I1,
        LDIND_U1 => E::U1,
        LDIND_I2 | STIND_I2 => E::I2,
        LDIND_U2 => E::U2,
        LDIND_I4 | STIND_I4 => E::I4,
        LDIND_U4 => E::U4,
        LDIND_I8 | STIND_I8 => E::I8,
        LDIND_I | STIND_I => E::I,
        LDIND_R4 | STIND_R4 => E::R4,
        LDIND_R8 | STIND_R8 => E::R8,
        LDIND_REF | STIND_REF => E::Object,
        _ => return Err(Error::UnknownOpcode(u16::from(opcode))),
    })
}

/// Element type of `ldelem.*` and `stelem.*`
fn element_kind(opcode: u8) -> Result<ElementType> {
    use ElementType as E;

    Ok(match opcode {
        LDELEM_I1 | STELEM_I1 => E::I1,
        LDELEM_U1 => E::U1,
        LDELEM_I2 | STELEM_I2 => E::I2,
        LDELEM_U2 => E::U2,
        LDELEM_I4 | STELEM_I4 => E::I4,
        LDELEM_U4 => E::U4,
        LDELEM_I8 | STELEM_I8 => E::I8,
        LDELEM_I | STELEM_I => E::I,
        LDELEM_R4 | STELEM_R4 => E::R4,
        LDELEM_R8 | STELEM_R8 => E::R8,
        LDELEM_REF | STELEM_REF => E::Object,
        _ => return Err(Error::UnknownOpcode(u16::from(opcode))),
    })
}

// ============================================================================
// Stack typing
// ============================================================================

/// Result type of a binary numeric operation (ECMA-335 III.1.5, tables 2 and 5)
fn arithmetic_type(op: BinaryOp, left: &StackType, right: &StackType) -> Result<StackType> {
    use StackType as S;

    let bitwise = matches!(op, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor);
    let result = match (left, right) {
        (S::Int32, S::Int32) => Some(S::Int32),
        (S::Int64, S::Int64) => Some(S::Int64),
        (S::NativeInt, S::NativeInt) | (S::Int32, S::NativeInt) | (S::NativeInt, S::Int32) => {
            Some(S::NativeInt)
        }
        (S::F, S::F) if !bitwise => Some(S::F),
        (S::Ref, S::Int32 | S::NativeInt) if matches!(op, BinaryOp::Add | BinaryOp::Sub) => {
            Some(S::Ref)
        }
        (S::Int32 | S::NativeInt, S::Ref) if op == BinaryOp::Add => Some(S::Ref),
        (S::Ref, S::Ref) if op == BinaryOp::Sub => Some(S::NativeInt),
        _ => None,
    };

    result.ok_or_else(|| Error::StackMismatch(format!("{op:?} of {left} and {right}")))
}

/// Type two operands are compared at (ECMA-335 III.1.5, table 4)
fn comparison_type(left: &StackType, right: &StackType) -> Result<StackType> {
    use StackType as S;

    let result = match (left, right) {
        (S::Int32, S::Int32) => Some(S::Int32),
        (S::Int64, S::Int64) => Some(S::Int64),
        (S::NativeInt, S::NativeInt) | (S::Int32, S::NativeInt) | (S::NativeInt, S::Int32) => {
            Some(S::NativeInt)
        }
        (S::F, S::F) => Some(S::F),
        (S::O, S::O) => Some(S::O),
        (S::Ref, S::Ref) => Some(S::Ref),
        (S::Ref, S::NativeInt) | (S::NativeInt, S::Ref) => Some(S::NativeInt),
        _ => None,
    };

    result.ok_or_else(|| Error::StackMismatch(format!("cannot compare {left} with {right}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_typing() {
        assert_eq!(
            arithmetic_type(BinaryOp::Add, &StackType::Int32, &StackType::NativeInt).unwrap(),
            StackType::NativeInt
        );
        assert_eq!(
            arithmetic_type(BinaryOp::Sub, &StackType::Ref, &StackType::Ref).unwrap(),
            StackType::NativeInt
        );
        assert_eq!(
            arithmetic_type(BinaryOp::Add, &StackType::Ref, &StackType::Int32).unwrap(),
            StackType::Ref
        );
        assert!(arithmetic_type(BinaryOp::Xor, &StackType::F, &StackType::F).is_err());
        assert!(arithmetic_type(BinaryOp::Add, &StackType::Int32, &StackType::Int64).is_err());
        assert!(arithmetic_type(BinaryOp::Mul, &StackType::O, &StackType::O).is_err());
    }

    #[test]
    fn comparison_typing() {
        assert_eq!(
            comparison_type(&StackType::O, &StackType::O).unwrap(),
            StackType::O
        );
        assert!(comparison_type(&StackType::O, &StackType::Int32).is_err());
        assert!(comparison_type(&StackType::F, &StackType::Int64).is_err());
    }

    #[test]
    fn branch_forms_agree() {
        for (short, long) in [(BEQ_S, BEQ), (BGE_UN_S, BGE_UN), (BLT_UN_S, BLT_UN)] {
            assert_eq!(
                branch_comparison(short).unwrap(),
                branch_comparison(long).unwrap()
            );
        }
        assert_eq!(branch_comparison(BNE_UN).unwrap(), (CompareOp::Ne, true));
    }

    #[test]
    fn shuffles() {
        // [a, b, c, obj] -> [a, obj, b, c]
        let mut stack = EvalStack::from_entries(vec![
            StackType::Int32,
            StackType::Int64,
            StackType::F,
            StackType::O,
        ]);
        let mut out = Vec::new();
        push_back(2, &mut stack, &mut out).unwrap();

        assert_eq!(
            stack.entries(),
            [StackType::Int32, StackType::O, StackType::Int64, StackType::F]
        );
        let moves: Vec<(Var, Var)> = out
            .iter()
            .map(|tac| match tac {
                Tac::Move { dest, src, .. } => (*dest, *src),
                other => panic!("unexpected {other}"),
            })
            .collect();
        assert_eq!(
            moves,
            [
                (Var::Stack(4), Var::Stack(3)),
                (Var::Stack(3), Var::Stack(2)),
                (Var::Stack(2), Var::Stack(1)),
                (Var::Stack(1), Var::Stack(4)),
            ]
        );

        out.clear();
        bring_forward(2, &mut stack, &mut out).unwrap();
        assert_eq!(
            stack.entries(),
            [StackType::Int32, StackType::Int64, StackType::F, StackType::O]
        );
        assert_eq!(out.len(), 4);

        out.clear();
        push_back(0, &mut stack, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn conversions_cover_every_form() {
        for opcode in [CONV_I1, CONV_R_UN, CONV_OVF_U_UN, CONV_OVF_I8, CONV_U] {
            assert!(conversion(opcode).is_ok());
        }
        assert_eq!(conversion(CONV_OVF_U2_UN).unwrap(), (ElementType::U2, true, true));
    }
}
