//! Type 2 charstring validation.
//!
//! Refer to Adobe Technical Note #5177, The Type 2 Charstring Format. Charstrings are
//! interpreted without producing an outline: only the shape of the operand stack, the number of
//! stem hints, the width and subroutine calls are tracked. Values computed by arithmetic
//! operators are never evaluated.

use std::convert::TryFrom;
use std::fmt;

use crate::binary::read::{ReadCtxt, ReadScope};
use crate::binary::{I16Be, U8};
use crate::error::ParseError;

use super::{CFFError, Index};

mod argstack;

pub use argstack::ArgumentsStack;

// Limits according to the Adobe Technical Note #5177 Appendix B.
pub(crate) const STACK_LIMIT: u8 = 10;
pub(crate) const MAX_ARGUMENTS_STACK_LEN: usize = 48;
pub(crate) const MAX_STEM_HINTS: usize = 96;
pub(crate) const MAX_CHAR_STRING_LEN: usize = 65535;

pub(crate) const TWO_BYTE_OPERATOR_MARK: u8 = 12;

pub(crate) trait IsEven {
    fn is_even(&self) -> bool;
    fn is_odd(&self) -> bool;
}

/// A value on the operand stack.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum StackValue {
    /// A number that appeared in the charstring.
    Literal(i32),
    /// The result of an arithmetic operator, or a 16.16 fixed number.
    #[default]
    Unknown,
}

struct CharStringVisitorContext<'a, 'data> {
    global_subr_index: &'a Index<'data>,
    local_subr_index: Option<&'a Index<'data>>,
    width_parsed: bool,
    stems_len: usize,
    has_endchar: bool,
}

/// Check that `char_string` is a well formed Type 2 charstring that ends with `endchar`.
///
/// `local_subr_index` are the Local Subrs that apply to the glyph, if any.
pub fn validate_char_string(
    char_string: &[u8],
    global_subr_index: &Index<'_>,
    local_subr_index: Option<&Index<'_>>,
) -> Result<(), CFFError> {
    let mut ctx = CharStringVisitorContext {
        global_subr_index,
        local_subr_index,
        width_parsed: false,
        stems_len: 0,
        has_endchar: false,
    };

    let mut stack = ArgumentsStack {
        data: &mut [StackValue::Unknown; MAX_ARGUMENTS_STACK_LEN],
        len: 0,
        max_len: MAX_ARGUMENTS_STACK_LEN,
    };
    ctx.visit(char_string, 0, &mut stack)?;

    if !ctx.has_endchar {
        return Err(CFFError::MissingEndChar);
    }

    Ok(())
}

impl<'a, 'data> CharStringVisitorContext<'a, 'data> {
    /// Interpret `char_string`, returning once `endchar` or `return` is reached.
    ///
    /// The stack, width and stem count carry over into and out of subroutines.
    fn visit(
        &mut self,
        char_string: &[u8],
        depth: u8,
        stack: &mut ArgumentsStack<'_, StackValue>,
    ) -> Result<(), CFFError> {
        if char_string.len() > MAX_CHAR_STRING_LEN {
            return Err(ParseError::LimitExceeded.into());
        }

        let mut s = ReadScope::new(char_string).ctxt();
        while s.bytes_available() {
            let op = s.read::<U8>()?;
            match op {
                0 | 2 | 9 | 13 | 15 | 16 | 17 => {
                    // Reserved, or vsindex and blend which are CFF2 only.
                    return Err(CFFError::InvalidOperator);
                }
                operator::HORIZONTAL_STEM
                | operator::VERTICAL_STEM
                | operator::HORIZONTAL_STEM_HINT_MASK
                | operator::VERTICAL_STEM_HINT_MASK => {
                    if stack.len() < 2 {
                        return Err(CFFError::InvalidArgumentsStackLength);
                    }
                    self.add_stems(stack.len())?;
                    stack.clear();
                }
                operator::HINT_MASK | operator::COUNTER_MASK => {
                    // Any values on the stack are implicit vstem hints
                    self.add_stems(stack.len())?;
                    stack.clear();

                    if self.stems_len == 0 {
                        return Err(CFFError::MissingStemHints);
                    }
                    // One bit per stem hint
                    s.read_slice((self.stems_len + 7) / 8)
                        .map_err(ParseError::from)?;
                }
                operator::MOVE_TO => self.move_to(stack, 2)?,
                operator::HORIZONTAL_MOVE_TO | operator::VERTICAL_MOVE_TO => {
                    self.move_to(stack, 1)?
                }
                operator::LINE_TO => self.draw(stack, |n| n >= 2 && n.is_even())?,
                operator::HORIZONTAL_LINE_TO | operator::VERTICAL_LINE_TO => {
                    self.draw(stack, |n| n >= 1)?
                }
                operator::CURVE_TO => self.draw(stack, |n| n >= 6 && n % 6 == 0)?,
                operator::CURVE_LINE => self.draw(stack, |n| n >= 8 && (n - 2) % 6 == 0)?,
                operator::LINE_CURVE => self.draw(stack, |n| n >= 8 && n.is_even())?,
                operator::VV_CURVE_TO | operator::HH_CURVE_TO => {
                    self.draw(stack, |n| n >= 4 && matches!(n % 4, 0 | 1))?
                }
                operator::VH_CURVE_TO | operator::HV_CURVE_TO => {
                    self.draw(stack, |n| n >= 4 && matches!(n % 8, 0 | 1 | 4 | 5))?
                }
                operator::CALL_LOCAL_SUBROUTINE => {
                    self.call_subroutine(self.local_subr_index, depth, stack)?;
                    if self.has_endchar {
                        return Ok(());
                    }
                }
                operator::CALL_GLOBAL_SUBROUTINE => {
                    self.call_subroutine(Some(self.global_subr_index), depth, stack)?;
                    if self.has_endchar {
                        return Ok(());
                    }
                }
                operator::RETURN => {
                    if depth == 0 {
                        return Err(CFFError::UnexpectedReturn);
                    }
                    return Ok(());
                }
                operator::ENDCHAR => {
                    // Anything following endchar is ignored
                    self.width_parsed = true;
                    self.has_endchar = true;
                    return Ok(());
                }
                TWO_BYTE_OPERATOR_MARK => {
                    let op2 = s.read::<U8>()?;
                    self.visit_escape(op2, stack)?;
                }
                operator::SHORT_INT => {
                    let n = s.read::<I16Be>()?;
                    stack.push(StackValue::Literal(i32::from(n)))?;
                }
                32..=246 => {
                    stack.push(parse_int1(op))?;
                }
                247..=250 => {
                    stack.push(parse_int2(op, &mut s)?)?;
                }
                251..=254 => {
                    stack.push(parse_int3(op, &mut s)?)?;
                }
                operator::FIXED_16_16 => {
                    s.skip(4).map_err(ParseError::from)?;
                    stack.push(StackValue::Unknown)?;
                }
            }
        }

        // Ran out of data without reaching endchar or return
        Err(CFFError::MissingEndChar)
    }

    fn visit_escape(
        &mut self,
        op2: u8,
        stack: &mut ArgumentsStack<'_, StackValue>,
    ) -> Result<(), CFFError> {
        match op2 {
            operator::DOTSECTION => {
                if !stack.is_empty() {
                    return Err(CFFError::InvalidArgumentsStackLength);
                }
            }
            operator::AND
            | operator::OR
            | operator::EQ
            | operator::ADD
            | operator::SUB
            | operator::DIV
            | operator::MUL
            | operator::EXCH => {
                stack.pop_n(2)?;
                stack.push(StackValue::Unknown)?;
            }
            operator::NOT | operator::ABS | operator::NEG | operator::SQRT | operator::DROP => {
                stack.pop()?;
                stack.push(StackValue::Unknown)?;
            }
            operator::DUP => {
                stack.pop()?;
                stack.push(StackValue::Unknown)?;
                stack.push(StackValue::Unknown)?;
            }
            operator::IF_ELSE => {
                stack.pop_n(4)?;
                stack.push(StackValue::Unknown)?;
            }
            // These depend on the values of their operands
            operator::PUT | operator::GET | operator::INDEX | operator::ROLL | operator::RANDOM => {
                return Err(CFFError::UnsupportedOperator);
            }
            operator::HFLEX => self.draw(stack, |n| n == 7)?,
            operator::FLEX => self.draw(stack, |n| n == 13)?,
            operator::HFLEX1 => self.draw(stack, |n| n == 9)?,
            operator::FLEX1 => self.draw(stack, |n| n == 11)?,
            _ => return Err(CFFError::InvalidOperator),
        }

        Ok(())
    }

    /// Count the stem hints in `len` operands, the first of which may be the width.
    fn add_stems(&mut self, len: usize) -> Result<(), CFFError> {
        // If the stack length is uneven, then the first value is a `width`.
        let len = if len.is_odd() && !self.width_parsed {
            len - 1
        } else {
            len
        };
        if len.is_odd() {
            return Err(CFFError::InvalidArgumentsStackLength);
        }

        self.stems_len += len >> 1;
        if self.stems_len > MAX_STEM_HINTS {
            return Err(CFFError::StemHintLimitReached);
        }
        self.width_parsed = true;
        Ok(())
    }

    /// rmoveto, hmoveto and vmoveto take `args` operands, plus the width on first use.
    fn move_to(
        &mut self,
        stack: &mut ArgumentsStack<'_, StackValue>,
        args: usize,
    ) -> Result<(), CFFError> {
        let has_width = !self.width_parsed && stack.len() == args + 1;
        if stack.len() != args && !has_width {
            return Err(CFFError::InvalidArgumentsStackLength);
        }

        self.width_parsed = true;
        stack.clear();
        Ok(())
    }

    /// Path construction operators, which must follow a moveto.
    fn draw(
        &mut self,
        stack: &mut ArgumentsStack<'_, StackValue>,
        valid_len: impl Fn(usize) -> bool,
    ) -> Result<(), CFFError> {
        if !self.width_parsed {
            return Err(CFFError::MissingMoveTo);
        }
        if !valid_len(stack.len()) {
            return Err(CFFError::InvalidArgumentsStackLength);
        }

        stack.clear();
        Ok(())
    }

    fn call_subroutine(
        &mut self,
        subrs: Option<&'a Index<'data>>,
        depth: u8,
        stack: &mut ArgumentsStack<'_, StackValue>,
    ) -> Result<(), CFFError> {
        // Subroutine numbers must be literals so the target is known without evaluation
        let index = match stack.pop()? {
            StackValue::Literal(index) => index,
            StackValue::Unknown => return Err(CFFError::InvalidSubroutineIndex),
        };
        let subrs = subrs.ok_or(CFFError::NoLocalSubroutines)?;

        let subroutine_bias = calc_subroutine_bias(subrs.len());
        let index = conv_subroutine_index_impl(index, subroutine_bias)
            .ok_or(CFFError::InvalidSubroutineIndex)?;
        let char_string = subrs
            .read_object(index)
            .ok_or(CFFError::InvalidSubroutineIndex)?;

        if depth == STACK_LIMIT {
            return Err(CFFError::NestingLimitReached);
        }

        self.visit(char_string, depth + 1, stack)
    }
}

// CharString number parsing functions
fn parse_int1(op: u8) -> StackValue {
    let n = i32::from(op) - 139;
    StackValue::Literal(n)
}

fn parse_int2(op: u8, s: &mut ReadCtxt<'_>) -> Result<StackValue, CFFError> {
    let b1 = s.read::<U8>()?;
    let n = (i32::from(op) - 247) * 256 + i32::from(b1) + 108;
    debug_assert!((108..=1131).contains(&n));
    Ok(StackValue::Literal(n))
}

fn parse_int3(op: u8, s: &mut ReadCtxt<'_>) -> Result<StackValue, CFFError> {
    let b1 = s.read::<U8>()?;
    let n = -(i32::from(op) - 251) * 256 - i32::from(b1) - 108;
    debug_assert!((-1131..=-108).contains(&n));
    Ok(StackValue::Literal(n))
}

// Conversions from biased subr index operands to unbiased value
pub(crate) fn conv_subroutine_index_impl(index: i32, bias: u16) -> Option<usize> {
    let bias = i32::from(bias);

    let index = index.checked_add(bias)?;
    usize::try_from(index).ok()
}

// Adobe Technical Note #5176, Chapter 16 "Local / Global Subrs INDEXes"
pub(crate) fn calc_subroutine_bias(len: usize) -> u16 {
    if len < 1240 {
        107
    } else if len < 33900 {
        1131
    } else {
        32768
    }
}

impl IsEven for usize {
    fn is_even(&self) -> bool {
        (*self) & 1 == 0
    }

    fn is_odd(&self) -> bool {
        !self.is_even()
    }
}

impl From<ParseError> for CFFError {
    fn from(error: ParseError) -> CFFError {
        CFFError::ParseError(error)
    }
}

impl fmt::Display for CFFError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CFFError::ParseError(parse_error) => {
                write!(f, "parse error: ")?;
                parse_error.fmt(f)
            }
            CFFError::InvalidOperator => write!(f, "an invalid operator occurred"),
            CFFError::UnsupportedOperator => write!(f, "an unsupported operator occurred"),
            CFFError::MissingEndChar => write!(f, "the 'endchar' operator is missing"),
            CFFError::UnexpectedReturn => write!(f, "'return' operator outside a subroutine"),
            CFFError::NestingLimitReached => write!(f, "subroutines nesting limit reached"),
            CFFError::ArgumentsStackLimitReached => write!(f, "arguments stack limit reached"),
            CFFError::InvalidArgumentsStackLength => {
                write!(f, "an invalid amount of items are in an arguments stack")
            }
            CFFError::StemHintLimitReached => write!(f, "stem hint limit reached"),
            CFFError::MissingStemHints => write!(f, "hint mask without stem hints"),
            CFFError::MissingMoveTo => write!(f, "missing moveto operator"),
            CFFError::InvalidSubroutineIndex => write!(f, "an invalid subroutine index"),
            CFFError::NoLocalSubroutines => write!(f, "no local subroutines"),
        }
    }
}

impl std::error::Error for CFFError {}

/// Operators defined in Adobe Technical Note #5177, The Type  2 Charstring Format.
pub(crate) mod operator {
    pub const HORIZONTAL_STEM: u8 = 1;
    pub const VERTICAL_STEM: u8 = 3;
    pub const VERTICAL_MOVE_TO: u8 = 4;
    pub const LINE_TO: u8 = 5;
    pub const HORIZONTAL_LINE_TO: u8 = 6;
    pub const VERTICAL_LINE_TO: u8 = 7;
    pub const CURVE_TO: u8 = 8;
    pub const CALL_LOCAL_SUBROUTINE: u8 = 10;
    pub const RETURN: u8 = 11;
    pub const ENDCHAR: u8 = 14;
    pub const HORIZONTAL_STEM_HINT_MASK: u8 = 18;
    pub const HINT_MASK: u8 = 19;
    pub const COUNTER_MASK: u8 = 20;
    pub const MOVE_TO: u8 = 21;
    pub const HORIZONTAL_MOVE_TO: u8 = 22;
    pub const VERTICAL_STEM_HINT_MASK: u8 = 23;
    pub const CURVE_LINE: u8 = 24;
    pub const LINE_CURVE: u8 = 25;
    pub const VV_CURVE_TO: u8 = 26;
    pub const HH_CURVE_TO: u8 = 27;
    pub const SHORT_INT: u8 = 28;
    pub const CALL_GLOBAL_SUBROUTINE: u8 = 29;
    pub const VH_CURVE_TO: u8 = 30;
    pub const HV_CURVE_TO: u8 = 31;
    pub const FIXED_16_16: u8 = 255;

    // Two-byte operators, following TWO_BYTE_OPERATOR_MARK
    pub const DOTSECTION: u8 = 0;
    pub const AND: u8 = 3;
    pub const OR: u8 = 4;
    pub const NOT: u8 = 5;
    pub const ABS: u8 = 9;
    pub const ADD: u8 = 10;
    pub const SUB: u8 = 11;
    pub const DIV: u8 = 12;
    pub const NEG: u8 = 14;
    pub const EQ: u8 = 15;
    pub const DROP: u8 = 18;
    pub const PUT: u8 = 20;
    pub const GET: u8 = 21;
    pub const IF_ELSE: u8 = 22;
    pub const RANDOM: u8 = 23;
    pub const MUL: u8 = 24;
    pub const SQRT: u8 = 26;
    pub const DUP: u8 = 27;
    pub const EXCH: u8 = 28;
    pub const INDEX: u8 = 29;
    pub const ROLL: u8 = 30;
    pub const HFLEX: u8 = 34;
    pub const FLEX: u8 = 35;
    pub const HFLEX1: u8 = 36;
    pub const FLEX1: u8 = 37;
}
