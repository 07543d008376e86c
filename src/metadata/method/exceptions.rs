use bitflags::bitflags;

use crate::metadata::token::Token;

bitflags! {
    /// Clause kind flags of an exception handling clause
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// Typed catch (no bit set)
        const EXCEPTION = 0x0000;
        /// Filtered catch
        const FILTER = 0x0001;
        /// Finally block
        const FINALLY = 0x0002;
        /// Fault block
        const FAULT = 0x0004;
    }
}

/// What a clause's handler does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    /// Catches exceptions assignable to the type
    Catch(Token),
    /// Runs the filter block at this offset to decide
    Filter(u32),
    /// Always runs on exit from the protected block
    Finally,
    /// Runs on exceptional exit only
    Fault,
}

/// One exception handling clause of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionClause {
    /// Raw clause flags
    pub flags: ExceptionHandlerFlags,
    /// Start of the protected block
    pub try_offset: u32,
    /// Length of the protected block
    pub try_length: u32,
    /// Start of the handler block
    pub handler_offset: u32,
    /// Length of the handler block
    pub handler_length: u32,
    /// Catch type token, or filter offset for filter clauses
    pub class_token_or_filter: u32,
}

impl ExceptionClause {
    /// Classify the clause.
    ///
    /// Finally and fault take precedence over filter when several bits are set.
    #[must_use]
    pub fn kind(&self) -> ClauseKind {
        if self.flags.contains(ExceptionHandlerFlags::FINALLY) {
            ClauseKind::Finally
        } else if self.flags.contains(ExceptionHandlerFlags::FAULT) {
            ClauseKind::Fault
        } else if self.flags.contains(ExceptionHandlerFlags::FILTER) {
            ClauseKind::Filter(self.class_token_or_filter)
        } else {
            ClauseKind::Catch(Token::new(self.class_token_or_filter))
        }
    }

    /// True if `offset` lies in the protected block
    #[must_use]
    pub fn protects(&self, offset: u32) -> bool {
        offset >= self.try_offset && offset < self.try_offset + self.try_length
    }
}
