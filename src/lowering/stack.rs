//! The abstract evaluation stack tracked while lowering.
//!
//! Each entry records only its [`StackType`]; the value itself always lives in the
//! [`Var::Stack`] variable of its depth. Pushing therefore names the variable the producing
//! instruction must write, and popping names the variable to read.
//!
//! When two control flow edges reach the same instruction, the states they carry must agree
//! entry by entry, see [`EvalStack::join`].

use crate::{
    lowering::tac::{StackType, Var},
    metadata::signatures::{compare_types, TypeResolver},
    Error, Result,
};

/// The evaluation stack state at one program point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalStack {
    entries: Vec<StackType>,
}

impl EvalStack {
    /// An empty stack
    #[must_use]
    pub fn new() -> Self {
        EvalStack::default()
    }

    /// A stack holding `entries`, bottom first
    #[must_use]
    pub fn from_entries(entries: Vec<StackType>) -> Self {
        EvalStack { entries }
    }

    /// Number of entries
    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// True if the stack holds nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, bottom first
    #[must_use]
    pub fn entries(&self) -> &[StackType] {
        &self.entries
    }

    /// Push an entry of type `ty` and return the variable holding it.
    ///
    /// # Errors
    /// Returns [`Error::StackMismatch`] if the stack outgrows the variable numbering.
    pub fn push(&mut self, ty: StackType) -> Result<Var> {
        let var = slot(self.entries.len())?;
        self.entries.push(ty);
        Ok(var)
    }

    /// Pop the top entry.
    ///
    /// # Errors
    /// Returns [`Error::StackMismatch`] on an empty stack.
    pub fn pop(&mut self) -> Result<(Var, StackType)> {
        let ty = self
            .entries
            .pop()
            .ok_or_else(|| Error::StackMismatch("evaluation stack underflow".to_string()))?;
        Ok((slot(self.entries.len())?, ty))
    }

    /// Pop `count` entries, returned bottom first.
    ///
    /// # Errors
    /// Returns [`Error::StackMismatch`] if fewer than `count` entries are present.
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<(Var, StackType)>> {
        if count > self.entries.len() {
            return Err(Error::StackMismatch(format!(
                "evaluation stack underflow, {} of {} entries present",
                self.entries.len(),
                count
            )));
        }

        let base = self.entries.len() - count;
        let popped = self
            .entries
            .drain(base..)
            .enumerate()
            .map(|(i, ty)| Ok((slot(base + i)?, ty)))
            .collect::<Result<Vec<_>>>()?;
        Ok(popped)
    }

    /// The top entry without popping it.
    ///
    /// # Errors
    /// Returns [`Error::StackMismatch`] on an empty stack.
    pub fn peek(&self) -> Result<(Var, &StackType)> {
        let ty = self
            .entries
            .last()
            .ok_or_else(|| Error::StackMismatch("evaluation stack is empty".to_string()))?;
        Ok((slot(self.entries.len() - 1)?, ty))
    }

    /// Move the top entry down so that `count` entries end up above it. Returns the depth it
    /// lands at.
    ///
    /// # Errors
    /// Returns [`Error::StackMismatch`] if the stack is too shallow.
    pub fn push_back(&mut self, count: usize) -> Result<usize> {
        if count >= self.entries.len() {
            return Err(Error::StackMismatch(format!(
                "cannot push back {} entries below a stack of {}",
                count,
                self.entries.len()
            )));
        }

        let top = self.entries.len() - 1;
        let entry = self.entries.remove(top);
        let position = top - count;
        self.entries.insert(position, entry);
        Ok(position)
    }

    /// Move the entry with `count` entries above it to the top. Returns its former depth.
    ///
    /// # Errors
    /// Returns [`Error::StackMismatch`] if the stack is too shallow.
    pub fn bring_forward(&mut self, count: usize) -> Result<usize> {
        if count >= self.entries.len() {
            return Err(Error::StackMismatch(format!(
                "cannot bring forward past {} entries of a stack of {}",
                count,
                self.entries.len()
            )));
        }

        let position = self.entries.len() - 1 - count;
        let entry = self.entries.remove(position);
        self.entries.push(entry);
        Ok(position)
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Check that `other`, arriving over a second edge, matches this state.
    ///
    /// Depths must be equal and entries of the same kind; value types are compared
    /// structurally.
    ///
    /// # Errors
    /// Returns [`Error::StackMismatch`] if the states disagree, and resolution failures.
    pub fn join(&self, other: &EvalStack, resolver: &dyn TypeResolver) -> Result<()> {
        if self.entries.len() != other.entries.len() {
            return Err(Error::StackMismatch(format!(
                "stack depth {} joins stack depth {}",
                self.entries.len(),
                other.entries.len()
            )));
        }

        for (depth, (mine, theirs)) in self.entries.iter().zip(&other.entries).enumerate() {
            let compatible = match (mine, theirs) {
                (StackType::ValueType(left), StackType::ValueType(right)) => {
                    compare_types(left, right, resolver)?
                }
                _ => mine == theirs,
            };
            if !compatible {
                return Err(Error::StackMismatch(format!(
                    "stack slot {depth} holds {mine} on one edge and {theirs} on another"
                )));
            }
        }

        Ok(())
    }
}

fn slot(depth: usize) -> Result<Var> {
    u16::try_from(depth)
        .map(Var::Stack)
        .map_err(|_| Error::StackMismatch(format!("evaluation stack depth {depth} too large")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::{ElementType, TestResolver, TypeSig};

    #[test]
    fn push_pop() {
        let mut stack = EvalStack::new();
        assert_eq!(stack.push(StackType::Int32).unwrap(), Var::Stack(0));
        assert_eq!(stack.push(StackType::O).unwrap(), Var::Stack(1));
        assert_eq!(stack.peek().unwrap(), (Var::Stack(1), &StackType::O));

        assert_eq!(stack.pop().unwrap(), (Var::Stack(1), StackType::O));
        assert_eq!(stack.pop().unwrap(), (Var::Stack(0), StackType::Int32));
        assert!(matches!(stack.pop(), Err(Error::StackMismatch(_))));
    }

    #[test]
    fn pop_n_bottom_first() {
        let mut stack = EvalStack::from_entries(vec![StackType::O, StackType::Int32, StackType::F]);
        let popped = stack.pop_n(2).unwrap();
        assert_eq!(
            popped,
            [(Var::Stack(1), StackType::Int32), (Var::Stack(2), StackType::F)]
        );
        assert_eq!(stack.depth(), 1);
        assert!(stack.pop_n(2).is_err());
    }

    #[test]
    fn push_back_and_bring_forward() {
        let mut stack = EvalStack::from_entries(vec![
            StackType::Int32,
            StackType::Int64,
            StackType::O,
        ]);
        assert_eq!(stack.push_back(2).unwrap(), 0);
        assert_eq!(
            stack.entries(),
            [StackType::O, StackType::Int32, StackType::Int64]
        );

        assert_eq!(stack.bring_forward(2).unwrap(), 0);
        assert_eq!(
            stack.entries(),
            [StackType::Int32, StackType::Int64, StackType::O]
        );
        assert!(stack.push_back(3).is_err());
    }

    #[test]
    fn joins() {
        let resolver = TestResolver::default();
        let ints = EvalStack::from_entries(vec![StackType::Int32]);
        let refs = EvalStack::from_entries(vec![StackType::O]);

        assert!(ints.join(&ints.clone(), &resolver).is_ok());
        assert!(matches!(ints.join(&refs, &resolver), Err(Error::StackMismatch(_))));
        assert!(matches!(
            ints.join(&EvalStack::new(), &resolver),
            Err(Error::StackMismatch(_))
        ));

        let value = |kind| {
            EvalStack::from_entries(vec![StackType::ValueType(TypeSig::Primitive(kind))])
        };
        assert!(value(ElementType::I8).join(&value(ElementType::I8), &resolver).is_ok());
        assert!(value(ElementType::I8).join(&value(ElementType::R8), &resolver).is_err());
    }
}
