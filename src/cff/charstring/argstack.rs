// This file is derived from ttf-parser, licenced under Apache-2.0.
// https://github.com/RazrFalcon/ttf-parser/blob/439aaaebd50eb8aed66302e3c1b51fae047f85b2/src/tables/cff/argstack.rs

use std::fmt::Debug;

use crate::cff::CFFError;

/// Storage for the CFF operand stack when processing CharStrings.
///
/// Popping more values than are present is an error rather than a panic since the
/// charstrings being processed are untrusted.
pub struct ArgumentsStack<'a, T>
where
    T: Debug,
{
    pub data: &'a mut [T],
    pub len: usize,
    pub max_len: usize,
}

impl<'a, T> ArgumentsStack<'a, T>
where
    T: Copy + Debug,
{
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, n: T) -> Result<(), CFFError> {
        if self.len == self.max_len {
            Err(CFFError::ArgumentsStackLimitReached)
        } else {
            self.data[self.len] = n;
            self.len += 1;
            Ok(())
        }
    }

    pub fn pop(&mut self) -> Result<T, CFFError> {
        if self.is_empty() {
            return Err(CFFError::InvalidArgumentsStackLength);
        }
        self.len -= 1;
        Ok(self.data[self.len])
    }

    /// pop n values from the stack
    pub fn pop_n(&mut self, n: usize) -> Result<&[T], CFFError> {
        let start = self
            .len
            .checked_sub(n)
            .ok_or(CFFError::InvalidArgumentsStackLength)?;
        let end = self.len;
        self.len = start;
        Ok(&self.data[start..end])
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl<T: Debug> Debug for ArgumentsStack<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(&self.data[..self.len]).finish()
    }
}
