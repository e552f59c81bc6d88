//! Charsets, encodings and FDSelect.
//!
//! Refer to sections 12, 13 and 19 of Technical Note #5176.

use std::iter;

use itertools::Itertools;
use num_traits as num;

use crate::binary::read::{ReadArray, ReadBinary, ReadBinaryDep, ReadCtxt, ReadFrom};
use crate::binary::{U16Be, U8};
use crate::error::ParseError;

/// String identifier
pub type SID = u16;

#[derive(Debug, Clone, Default)]
pub enum Charset<'a> {
    #[default]
    ISOAdobe,
    Expert,
    ExpertSubset,
    Custom(CustomCharset<'a>),
}

/// Glyph names (SIDs) or CIDs of every glyph after `.notdef`.
#[derive(Debug, Clone)]
pub enum CustomCharset<'a> {
    Format0 { glyphs: ReadArray<'a, U16Be> },
    Format1 { ranges: ReadArray<'a, Range<SID, u8>> },
    Format2 { ranges: ReadArray<'a, Range<SID, u16>> },
}

#[derive(Debug, Clone, Default)]
pub enum Encoding<'a> {
    #[default]
    Standard,
    Expert,
    Custom(CustomEncoding<'a>),
}

#[derive(Debug, Clone)]
pub enum CustomEncoding<'a> {
    Format0 { codes: ReadArray<'a, U8> },
    Format1 { ranges: ReadArray<'a, Range<u8, u8>> },
}

/// A run of `n_left + 1` consecutive values starting at `first`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Range<F, N> {
    pub first: F,
    pub n_left: N,
}

/// Maps each glyph to the Font DICT that applies to it in a CID-keyed font.
///
/// Format 3 ranges are expanded so that lookups are a plain index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FDSelect {
    font_dict_indices: Vec<u8>,
}

impl<'b> ReadBinaryDep for CustomCharset<'b> {
    /// The glyph count and, for name-keyed fonts, the largest valid SID.
    type Args<'a> = (usize, Option<usize>);
    type HostType<'a> = CustomCharset<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        (n_glyphs, sid_max): (usize, Option<usize>),
    ) -> Result<Self::HostType<'a>, ParseError> {
        // .notdef is not part of the charset
        let n_glyphs = n_glyphs.checked_sub(1).ok_or(ParseError::BadValue)?;
        match ctxt.read::<U8>()? {
            0 => {
                let glyphs = ctxt.read_array::<U16Be>(n_glyphs)?;
                if let Some(sid_max) = sid_max {
                    ctxt.check(glyphs.iter().all(|sid| usize::from(sid) <= sid_max))?;
                }
                Ok(CustomCharset::Format0 { glyphs })
            }
            1 => {
                let ranges = read_range_array(ctxt, n_glyphs, sid_max)?;
                Ok(CustomCharset::Format1 { ranges })
            }
            2 => {
                let ranges = read_range_array(ctxt, n_glyphs, sid_max)?;
                Ok(CustomCharset::Format2 { ranges })
            }
            _ => Err(ParseError::BadValue),
        }
    }
}

/// Read ranges until they cover `n_glyphs`. The last range may extend past the final glyph.
fn read_range_array<'a, N>(
    ctxt: &mut ReadCtxt<'a>,
    n_glyphs: usize,
    sid_max: Option<usize>,
) -> Result<ReadArray<'a, Range<SID, N>>, ParseError>
where
    Range<SID, N>: ReadFrom,
    usize: From<N>,
    N: num::Unsigned + Copy,
{
    let mut peek = ctxt.scope().ctxt();
    let mut range_count = 0;
    let mut glyphs_covered = 0;
    while glyphs_covered < n_glyphs {
        let range = peek.read::<Range<SID, N>>()?;
        if let Some(sid_max) = sid_max {
            peek.check(range.last_value() <= sid_max)?;
        }
        range_count += 1;
        glyphs_covered += range.len();
    }

    ctxt.read_array::<Range<SID, N>>(range_count)
}

impl<'b> ReadBinary for CustomEncoding<'b> {
    type HostType<'a> = CustomEncoding<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        // First byte indicates the format of the encoding data
        match ctxt.read::<U8>()? {
            0 => {
                let ncodes = ctxt.read::<U8>()?;
                let codes = ctxt.read_array::<U8>(usize::from(ncodes))?;
                Ok(CustomEncoding::Format0 { codes })
            }
            1 => {
                let nranges = ctxt.read::<U8>()?;
                let ranges = ctxt.read_array::<Range<u8, u8>>(usize::from(nranges))?;
                Ok(CustomEncoding::Format1 { ranges })
            }
            // Multiply-encoded glyphs are indicated by setting the high-order bit in the format
            // byte and supplementing the encoding. They are not expected in OpenType CFF.
            format if format & 0x80 == 0x80 => Err(ParseError::NotImplemented),
            _ => Err(ParseError::BadValue),
        }
    }
}

impl ReadBinaryDep for FDSelect {
    /// The glyph count.
    type Args<'a> = usize;
    type HostType<'a> = FDSelect;

    fn read_dep<'a>(ctxt: &mut ReadCtxt<'a>, n_glyphs: usize) -> Result<FDSelect, ParseError> {
        match ctxt.read::<U8>()? {
            0 => {
                let font_dict_indices = ctxt.read_array::<U8>(n_glyphs)?;
                Ok(FDSelect {
                    font_dict_indices: font_dict_indices.iter().collect(),
                })
            }
            3 => {
                let n_ranges = usize::from(ctxt.read::<U16Be>()?);
                ctxt.check(n_ranges > 0)?;
                let ranges = ctxt.read_array::<(U16Be, U8)>(n_ranges)?;
                let sentinel = ctxt.read::<U16Be>()?;
                // Every glyph is covered, and no more
                ctxt.check(usize::from(sentinel) == n_glyphs)?;

                // The first range starts at glyph 0 and each subsequent start, including the
                // sentinel, is greater than the last.
                ctxt.check(ranges.get_item(0).map_or(false, |(first, _)| first == 0))?;
                let starts = ranges
                    .iter()
                    .map(|(first, _)| first)
                    .chain(iter::once(sentinel));
                let mut font_dict_indices = Vec::with_capacity(usize::from(sentinel));
                for ((first, next), (_, font_dict_index)) in
                    starts.tuple_windows().zip(ranges.iter())
                {
                    ctxt.check(first < next)?;
                    font_dict_indices
                        .extend(iter::repeat(font_dict_index).take(usize::from(next - first)));
                }

                Ok(FDSelect { font_dict_indices })
            }
            _ => Err(ParseError::BadValue),
        }
    }
}

impl ReadFrom for Range<u8, u8> {
    type ReadType = (U8, U8);
    fn read_from((first, n_left): (u8, u8)) -> Self {
        Range { first, n_left }
    }
}

impl ReadFrom for Range<SID, u8> {
    type ReadType = (U16Be, U8);
    fn read_from((first, n_left): (SID, u8)) -> Self {
        Range { first, n_left }
    }
}

impl ReadFrom for Range<SID, u16> {
    type ReadType = (U16Be, U16Be);
    fn read_from((first, n_left): (SID, u16)) -> Self {
        Range { first, n_left }
    }
}

impl<F, N> Range<F, N>
where
    N: num::Unsigned + Copy,
    usize: From<N>,
{
    pub fn len(&self) -> usize {
        usize::from(self.n_left) + 1
    }
}

impl<N> Range<SID, N>
where
    N: Copy,
    usize: From<N>,
{
    /// The last value covered by the range.
    pub fn last_value(&self) -> usize {
        self.first as usize + usize::from(self.n_left)
    }
}

impl FDSelect {
    /// Returns the Font DICT index of `glyph_id`, if it's covered.
    pub fn font_dict_index(&self, glyph_id: u16) -> Option<u8> {
        self.font_dict_indices.get(usize::from(glyph_id)).copied()
    }

    /// The number of glyphs covered.
    pub fn len(&self) -> usize {
        self.font_dict_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.font_dict_indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.font_dict_indices.iter().copied()
    }
}
