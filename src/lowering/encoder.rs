//! The lowering driver.
//!
//! Lowering one method runs in three passes over its [`CilGraph`]:
//!
//! 1. **Encode**: a depth-first walk from every root, visiting each node once. The node's
//!    incoming [`EvalStack`] is threaded through the encoding rules of its instruction (after
//!    decomposition), and the outgoing state is handed to every successor. A successor that
//!    already has an incoming state must agree with the new one, see [`EvalStack::join`].
//! 2. **Patch**: a second walk visits every node ending in a branch, gives each successor a
//!    label (reusing one assigned earlier) and writes the labels into the branch. The label
//!    goes after the argument, local and exception setup of a root, so a branch back to the
//!    method entry or to a handler start does not run that setup again.
//! 3. **Assemble**: the per-node code is concatenated in offset order.

use crate::{
    assembly::{CilGraph, NodeIndex},
    lowering::{
        decompose::decompose,
        stack::EvalStack,
        tac::{Callee, Label, LoweredInstruction, LoweredMethod, StackType, Tac, Var},
    },
    metadata::{
        method::ClauseKind,
        signatures::{CallConv, ElementType, TypeSig},
        tables::TableId,
        token::Token,
        typesystem::{FieldToCompile, MethodToCompile, ModuleId},
    },
    session::Session,
    Error, Result,
};

/// Lower the body of `method` to three-address code.
///
/// # Errors
/// Returns [`Error::Malformed`] for a method without a body, decoding and graph errors,
/// [`Error::NoEncoding`] for an opcode without an encoding rule, [`Error::StackMismatch`] for
/// inconsistent stack states, and resolution failures of the tokens the body references.
pub fn lower_method(session: &Session, method: &MethodToCompile) -> Result<LoweredMethod> {
    let definition = session.method_def(method.method)?;
    let body = definition.body.as_ref().ok_or_else(|| {
        malformed_error!("{} has no body to lower", method.name)
    })?;
    let graph = CilGraph::from_body(body, session.options().allow_internal_opcodes)?;

    let mut encoder = Encoder::new(session, method, &graph, body.init_locals);
    encoder.args = encoder.arg_types()?;
    encoder.locals = encoder.local_types(body.local_var_sig_token)?;

    encoder.encode()?;
    encoder.patch_labels()?;

    let name = session.mangle(&method.to_mangle())?;
    let lowered = encoder.assemble(name);
    log::debug!(
        "lowered {}: {} nodes, {} instructions, {} labels",
        lowered.name,
        graph.len(),
        lowered.code.len(),
        lowered.label_count()
    );

    Ok(lowered)
}

/// Encoder state for one method.
pub(crate) struct Encoder<'a> {
    pub(crate) session: &'a Session,
    pub(crate) method: &'a MethodToCompile,
    pub(crate) module: ModuleId,
    graph: &'a CilGraph,
    init_locals: bool,
    pub(crate) args: Vec<TypeSig>,
    pub(crate) locals: Vec<TypeSig>,
    pub(crate) temps: Vec<TypeSig>,
    incoming: Vec<Option<EvalStack>>,
    visited: Vec<bool>,
    code: Vec<Vec<Tac>>,
    labels: Vec<Option<Label>>,
    body_start: Vec<usize>,
    next_label: u32,
}

impl<'a> Encoder<'a> {
    fn new(
        session: &'a Session,
        method: &'a MethodToCompile,
        graph: &'a CilGraph,
        init_locals: bool,
    ) -> Encoder<'a> {
        let count = graph.nodes().len();
        Encoder {
            session,
            method,
            module: method.method.module,
            graph,
            init_locals,
            args: Vec::new(),
            locals: Vec::new(),
            temps: Vec::new(),
            incoming: vec![None; count],
            visited: vec![false; count],
            code: vec![Vec::new(); count],
            labels: vec![None; count],
            body_start: vec![0; count],
            next_label: 0,
        }
    }

    /// Argument slot types; the receiver of a value type method is a managed reference.
    fn arg_types(&self) -> Result<Vec<TypeSig>> {
        let sig = self.method.signature.method();
        let mut args = Vec::with_capacity(sig.arg_count());

        if sig.has_implicit_this() {
            let owner = self.method.owner.clone();
            if self.session.sig_is_value_type(&owner)? {
                args.push(TypeSig::ByRef(Box::new(owner)));
            } else {
                args.push(owner);
            }
        }
        args.extend(sig.params.iter().map(|param| param.ty.clone()));

        Ok(args)
    }

    fn local_types(&self, token: Token) -> Result<Vec<TypeSig>> {
        let context = self
            .method
            .generic_context()
            .with_max_depth(self.session.options().max_signature_depth);

        self.session
            .module(self.module)?
            .local_var_signature(token)?
            .locals
            .iter()
            .map(|local| context.substitute_type(&local.ty))
            .collect()
    }

    // ========================================================================
    // Encode pass
    // ========================================================================

    fn encode(&mut self) -> Result<()> {
        let graph = self.graph;
        for &root in graph.roots() {
            let state = self.root_state(root)?;
            self.enter(root, state)?;

            let mut pending = vec![root];
            while let Some(index) = pending.pop() {
                if self.visited[index] {
                    continue;
                }
                self.visited[index] = true;

                let state = self.encode_node(index)?;

                let next = &graph.node(index).next;
                for &successor in next {
                    self.enter(successor, state.clone())?;
                }
                pending.extend(next.iter().rev().filter(|&&successor| !self.visited[successor]));
            }
        }

        Ok(())
    }

    /// Record `state` as the incoming state of `index`, or check it against the one recorded.
    fn enter(&mut self, index: NodeIndex, state: EvalStack) -> Result<()> {
        if let Some(existing) = &self.incoming[index] {
            return existing.join(&state, self.session).map_err(|error| match error {
                Error::StackMismatch(message) => Error::StackMismatch(format!(
                    "IL_{:04X} in {}: {}",
                    self.graph.node(index).offset(),
                    self.method.name,
                    message
                )),
                other => other,
            });
        }

        self.incoming[index] = Some(state);
        Ok(())
    }

    fn root_state(&self, root: NodeIndex) -> Result<EvalStack> {
        match self.exception_root(root)? {
            Some(_) => Ok(EvalStack::from_entries(vec![StackType::O])),
            None => Ok(EvalStack::new()),
        }
    }

    /// Type of the exception object a handler or filter root starts with.
    fn exception_root(&self, root: NodeIndex) -> Result<Option<TypeSig>> {
        let node = self.graph.node(root);
        let Some(clause_index) = node.ehclause_start else {
            return Ok(None);
        };
        let clause = self.graph.clauses().get(clause_index).ok_or_else(|| {
            malformed_error!("Exception clause {} does not exist", clause_index)
        })?;

        match clause.kind() {
            ClauseKind::Catch(token) => Ok(Some(self.resolve_type_token(token)?)),
            ClauseKind::Filter(_) => Ok(Some(TypeSig::Primitive(ElementType::Object))),
            ClauseKind::Finally | ClauseKind::Fault => Ok(None),
        }
    }

    fn encode_node(&mut self, index: NodeIndex) -> Result<EvalStack> {
        let graph = self.graph;
        let node = graph.node(index);
        let mut stack = self.incoming[index]
            .clone()
            .ok_or_else(|| malformed_error!("IL_{:04X} has no incoming stack", node.offset()))?;
        let mut out = Vec::new();

        let leading = if node.prev.is_empty() || graph.roots().contains(&index) {
            let label = self.fresh_label();
            out.push(Tac::Label(label));
            Some(label)
        } else {
            None
        };
        if graph.roots().first() == Some(&index) {
            self.materialise_entry(&mut out)?;
        }
        if let Some(ty) = self.exception_root(index)? {
            out.push(Tac::ExceptionIn {
                dest: Var::Stack(0),
                ty,
            });
        }

        // Branches land after the setup; the leading label only serves them when there is none
        self.body_start[index] = out.len();
        if out.len() == 1 {
            self.labels[index] = leading;
        }

        for step in decompose(self, &node.instruction)? {
            self.encode_step(&step, &mut stack, &mut out)?;
        }

        self.code[index] = out;
        Ok(stack)
    }

    fn materialise_entry(&self, out: &mut Vec<Tac>) -> Result<()> {
        for (index, ty) in self.args.iter().enumerate() {
            out.push(Tac::ArgIn {
                index: slot_index(index)?,
                ty: ty.clone(),
            });
        }
        for (index, ty) in self.locals.iter().enumerate() {
            out.push(Tac::LocalIn {
                index: slot_index(index)?,
                ty: ty.clone(),
            });
        }
        if self.init_locals {
            for (index, ty) in self.locals.iter().enumerate() {
                out.push(Tac::Zero {
                    dest: Var::Local(slot_index(index)?),
                    ty: ty.clone(),
                });
            }
        }

        Ok(())
    }

    // ========================================================================
    // Patch pass
    // ========================================================================

    fn patch_labels(&mut self) -> Result<()> {
        let graph = self.graph;
        let mut seen = vec![false; self.code.len()];

        for &root in graph.roots() {
            let mut pending = vec![root];
            while let Some(index) = pending.pop() {
                if seen[index] {
                    continue;
                }
                seen[index] = true;

                let next = &graph.node(index).next;
                if self.code[index].last().is_some_and(Tac::is_branch) {
                    let targets = next
                        .iter()
                        .map(|&successor| self.label_of(successor))
                        .collect::<Vec<_>>();
                    self.patch_branch(index, &targets)?;
                }

                pending.extend(next.iter().rev().filter(|&&successor| !seen[successor]));
            }
        }

        Ok(())
    }

    /// The branch label of `index`, inserting one in front of its body if it has none yet
    fn label_of(&mut self, index: NodeIndex) -> Label {
        if let Some(label) = self.labels[index] {
            return label;
        }

        let label = self.fresh_label();
        self.labels[index] = Some(label);
        self.code[index].insert(self.body_start[index], Tac::Label(label));
        label
    }

    /// Write successor labels into the branch ending node `index`.
    ///
    /// The last successor is the taken target; a second successor, at index 0, is the
    /// fallthrough of a conditional branch and the default of a switch.
    fn patch_branch(&mut self, index: NodeIndex, targets: &[Label]) -> Result<()> {
        let offset = self.graph.node(index).offset();
        let missing = || malformed_error!("Branch at IL_{:04X} has no successor", offset);

        let Some(branch) = self.code[index].last_mut() else {
            return Ok(());
        };
        match branch {
            Tac::Branch { target } | Tac::Leave { target } => {
                *target = *targets.last().ok_or_else(missing)?;
            }
            Tac::BranchIf {
                true_target,
                false_target,
                ..
            } => {
                if targets.len() != 2 {
                    return Err(missing());
                }
                *true_target = targets[1];
                *false_target = targets[0];
            }
            Tac::Switch {
                targets: table,
                default,
                ..
            } => {
                if targets.len() != table.len() + 1 {
                    return Err(missing());
                }
                *default = targets[0];
                table.copy_from_slice(&targets[1..]);
            }
            _ => {}
        }

        Ok(())
    }

    fn fresh_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    // ========================================================================
    // Assembly
    // ========================================================================

    fn assemble(self, name: String) -> LoweredMethod {
        let mut code = Vec::new();
        let mut per_node = self.code;

        for (index, node) in self.graph.linear() {
            for tac in std::mem::take(&mut per_node[index]) {
                code.push(LoweredInstruction {
                    offset: node.offset(),
                    node: index,
                    tac,
                });
            }
        }

        LoweredMethod {
            name,
            method: self.method.clone(),
            args: self.args,
            locals: self.locals,
            temps: self.temps,
            code,
        }
    }

    // ========================================================================
    // Helpers for the encoding rules
    // ========================================================================

    /// The stack type a value of type `ty` has once loaded.
    pub(crate) fn stack_type(&self, ty: &TypeSig) -> Result<StackType> {
        Ok(match ty {
            TypeSig::Primitive(kind) => match kind {
                ElementType::Boolean
                | ElementType::Char
                | ElementType::I1
                | ElementType::U1
                | ElementType::I2
                | ElementType::U2
                | ElementType::I4
                | ElementType::U4 => StackType::Int32,
                ElementType::I8 | ElementType::U8 => StackType::Int64,
                ElementType::R4 | ElementType::R8 => StackType::F,
                ElementType::I | ElementType::U | ElementType::VirtFtnPtr => StackType::NativeInt,
                ElementType::String
                | ElementType::Object
                | ElementType::RefGenericParam
                | ElementType::UninstantiatedGenericParam => StackType::O,
                ElementType::TypedByRef => StackType::ValueType(ty.clone()),
                ElementType::Void | ElementType::End => {
                    return Err(Error::StackMismatch(format!("{ty} cannot be on the stack")))
                }
            },
            TypeSig::Class(_) | TypeSig::GenericInst { .. } => {
                if !self.session.sig_is_value_type(ty)? {
                    StackType::O
                } else {
                    let id = self.session.type_def_of_sig(ty)?;
                    if self.session.is_enum(id)? {
                        self.stack_type(&self.enum_underlying(id)?)?
                    } else {
                        StackType::ValueType(ty.clone())
                    }
                }
            }
            TypeSig::Boxed(_) | TypeSig::SzArray(_) | TypeSig::Array(_) => StackType::O,
            TypeSig::ByRef(_) => StackType::Ref,
            TypeSig::Ptr(_) => StackType::NativeInt,
            TypeSig::Var(_) | TypeSig::MVar(_) | TypeSig::Uninstantiated { .. } => StackType::O,
        })
    }

    fn enum_underlying(&self, id: crate::metadata::typesystem::TypeDefId) -> Result<TypeSig> {
        let module = self.session.module(id.module)?;
        let definition = module.type_def(id.row)?;
        module
            .fields_of(definition)
            .find(|field| !field.is_static())
            .map(|field| field.signature.ty.ty.clone())
            .ok_or_else(|| malformed_error!("Enum {} has no value field", definition.name))
    }

    /// Allocate a compiler temporary of type `ty`
    pub(crate) fn new_temp(&mut self, ty: TypeSig) -> Result<Var> {
        let index = u32::try_from(self.temps.len())
            .map_err(|_| malformed_error!("Too many temporaries in {}", self.method.name))?;
        self.temps.push(ty);
        Ok(Var::Temp(index))
    }

    /// The type a type token of the body names, in the method's generic context
    pub(crate) fn resolve_type_token(&self, token: Token) -> Result<TypeSig> {
        Ok(self
            .session
            .resolve_type(
                self.module,
                token,
                Some(&self.method.owner),
                Some(&self.method.signature),
            )?
            .ty)
    }

    /// The method a method token of the body names, with its symbol
    pub(crate) fn resolve_callee(&self, token: Token) -> Result<Callee> {
        let method = self.session.resolve_method(
            self.module,
            token,
            Some(&self.method.owner),
            Some(&self.method.signature),
        )?;
        let symbol = self.session.mangle(&method.to_mangle())?;
        Ok(Callee { method, symbol })
    }

    /// The field a field token of the body names
    pub(crate) fn resolve_field_token(&self, token: Token) -> Result<FieldToCompile> {
        self.session.resolve_field(
            self.module,
            token,
            Some(&self.method.owner),
            Some(&self.method.signature),
        )
    }

    /// Parameters a call site passes, the vararg tail of a `MemberRef` included. The receiver
    /// is not counted.
    pub(crate) fn call_site_params(&self, token: Token, callee: &Callee) -> Result<usize> {
        if token.table_id() == Some(TableId::MemberRef) {
            let module = self.session.module(self.module)?;
            if let Some(member) = module.tables().member_ref.get(token.row()) {
                let site = module
                    .signature_parser(member.signature)?
                    .parse_method_signature()?;
                if site.call_conv == CallConv::VarArg {
                    return Ok(site.params.len());
                }
            }
        }

        Ok(callee.method.signature.method().params.len())
    }

    /// Type of argument slot `index`
    pub(crate) fn arg(&self, index: usize) -> Result<&TypeSig> {
        self.args.get(index).ok_or_else(|| {
            malformed_error!("{} has no argument {}", self.method.name, index)
        })
    }

    /// Type of local slot `index`
    pub(crate) fn local(&self, index: usize) -> Result<&TypeSig> {
        self.locals.get(index).ok_or_else(|| {
            malformed_error!("{} has no local {}", self.method.name, index)
        })
    }
}

pub(crate) fn slot_index(index: usize) -> Result<u16> {
    u16::try_from(index).map_err(|_| malformed_error!("Slot index {} out of range", index))
}
