//! CFF font validation.
//!
//! Refer to [Technical Note #5176](http://wwwimages.adobe.com/content/dam/Adobe/en/devnet/font/pdfs/5176.CFF.pdf)
//! for more information.

use std::ops::Range;

use itertools::Itertools;
use log::{debug, warn};

use crate::binary::read::{ReadBinary, ReadBinaryDep, ReadCtxt, ReadScope};
use crate::error::ParseError;

mod charset;
pub mod charstring;
mod dict;

pub use charset::{Charset, CustomCharset, CustomEncoding, Encoding, FDSelect, SID};
pub use charstring::validate_char_string;
pub use dict::{DictArgs, DictKind, Operand, Operator, PrivateDict, TopDict};

/// Names in the Name INDEX are limited to 127 bytes.
const MAX_NAME_LEN: usize = 127;
/// The SID of the last standard string.
///
/// Custom strings start at SID 391, so `390 + count` is the largest valid SID and `391 + count`
/// is the first invalid one.
const STANDARD_STRINGS_MAX_SID: usize = 390;
// String ids are limited to 65000, which includes the standard strings
const MAX_STRING_INDEX_COUNT: usize = 65000 - STANDARD_STRINGS_MAX_SID;
// Characters that delimit PostScript tokens and so can't appear in a font name
const NAME_DELIMITERS: &[u8] = b"[](){}<>/%";

/// Top level representation of a CFF font file, typically read from a CFF OpenType table.
///
/// Reading a `CFF` checks the structure of the table: header, INDEXes, DICTs, charsets and
/// FDSelect. The glyph programs are checked separately by
/// [validate_char_strings](CFF::validate_char_strings).
///
/// Refer to Technical Note #5176
#[derive(Clone, Debug)]
pub struct CFF<'a> {
    pub header: Header,
    pub name_index: Index<'a>,
    pub string_index: Index<'a>,
    pub global_subr_index: Index<'a>,
    pub fonts: Vec<Font<'a>>,
}

/// CFF Font Header described in Section 6 of Technical Note #5176
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub major: u8,
    pub minor: u8,
    pub hdr_size: u8,
    pub off_size: u8,
}

/// A CFF INDEX described in Section 5 of Technical Note #5176
///
/// Every offset is checked when the INDEX is read so looking up an object afterwards can't fail
/// for an index below `count`.
#[derive(Clone, Debug)]
pub struct Index<'a> {
    pub count: usize,
    off_size: u8,
    /// The start of the INDEX through to the end of the table.
    scope: ReadScope<'a>,
    /// Object boundaries relative to the start of the INDEX, `count + 1` entries.
    offsets: Vec<usize>,
    /// Absolute position of the first byte after the INDEX.
    offset_to_next: usize,
}

/// A single font within a CFF file
#[derive(Clone, Debug)]
pub struct Font<'a> {
    pub top_dict: TopDict<'a>,
    pub char_strings_index: Index<'a>,
}

/// A CFF table that passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizedCFF<'a> {
    /// The PostScript name of the first font. Empty if that font has been deleted.
    pub name: String,
    /// The table, unchanged.
    pub data: &'a [u8],
}

/// A list of errors that can occur when validating CFF data.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum CFFError {
    ParseError(ParseError),
    InvalidOperator,
    UnsupportedOperator,
    MissingEndChar,
    UnexpectedReturn,
    NestingLimitReached,
    ArgumentsStackLimitReached,
    InvalidArgumentsStackLength,
    StemHintLimitReached,
    MissingStemHints,
    MissingMoveTo,
    InvalidSubroutineIndex,
    NoLocalSubroutines,
}

/// Validate a CFF table.
///
/// `num_glyphs` is the glyph count from the `maxp` table. On success the table is returned
/// untouched along with the PostScript name of its first font.
pub fn sanitize(data: &[u8], num_glyphs: u16) -> Result<SanitizedCFF<'_>, CFFError> {
    let result = ReadScope::new(data)
        .read_dep::<CFF<'_>>(num_glyphs)
        .map_err(CFFError::from)
        .and_then(|cff| {
            cff.validate_char_strings()?;
            let name = cff.font_name().ok_or(ParseError::MissingValue)?;
            Ok(SanitizedCFF { name, data })
        });

    if let Err(err) = &result {
        warn!("rejecting CFF table: {}", err);
    }

    result
}

impl<'b> ReadBinaryDep for CFF<'b> {
    /// The number of glyphs in the font.
    type Args<'a> = u16;
    type HostType<'a> = CFF<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        num_glyphs: u16,
    ) -> Result<Self::HostType<'a>, ParseError> {
        // Get a scope that starts at the beginning of the CFF data. This is needed for reading
        // data that is specified as an offset from the start of the data later.
        let scope = ctxt.scope();

        let header = ctxt.read::<Header>()?;
        let name_index = ctxt.read::<Index<'_>>()?;
        ctxt.check(!name_index.is_empty())?;
        for name in name_index.iter() {
            validate_font_name(name)?;
        }

        let top_dict_index = ctxt.read::<Index<'_>>()?;
        ctxt.check(top_dict_index.count == name_index.count)?;

        let string_index = ctxt.read::<Index<'_>>()?;
        if string_index.count >= MAX_STRING_INDEX_COUNT {
            return Err(ParseError::LimitExceeded);
        }

        let args = DictArgs {
            table: scope,
            num_glyphs: usize::from(num_glyphs),
            sid_max: STANDARD_STRINGS_MAX_SID + string_index.count,
        };

        let mut fonts = Vec::with_capacity(top_dict_index.count);
        for font_index in 0..top_dict_index.count {
            let mut top_dict = top_dict_index
                .object_scope(font_index)
                .ok_or(ParseError::BadIndex)?
                .read_dep::<TopDict<'_>>((args, DictKind::Top))?;
            let char_strings_index = top_dict.char_strings_index.take().ok_or_else(|| {
                debug!("font {} has no CharStrings", font_index);
                ParseError::MissingValue
            })?;

            fonts.push(Font {
                top_dict,
                char_strings_index,
            });
        }

        let global_subr_index = ctxt.read::<Index<'_>>()?;

        for font in &fonts {
            font.check_fd_select()?;
        }

        Ok(CFF {
            header,
            name_index,
            string_index,
            global_subr_index,
            fonts,
        })
    }
}

impl ReadBinary for Header {
    type HostType<'b> = Self;

    fn read(ctxt: &mut ReadCtxt<'_>) -> Result<Self, ParseError> {
        // Only major version 1 is understood. Minor versions add extensions that can be
        // ignored.
        let major = ctxt.read_u8()?;
        ctxt.check_version(major == 1)?;
        let minor = ctxt.read_u8()?;
        let hdr_size = ctxt.read_u8()?;
        let off_size = ctxt.read_u8()?;

        if hdr_size < 4 {
            return Err(ParseError::BadValue);
        }

        if !(1..=4).contains(&off_size) {
            return Err(ParseError::BadValue);
        }

        ctxt.skip(usize::from(hdr_size - 4))?;

        Ok(Header {
            major,
            minor,
            hdr_size,
            off_size,
        })
    }
}

impl<'b> ReadBinary for Index<'b> {
    type HostType<'a> = Index<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let count = usize::from(ctxt.read_u16be()?);

        if count == 0 {
            return Ok(Index {
                scope,
                offset_to_next: scope.base() + 2,
                ..Index::empty()
            });
        }

        let off_size = ctxt.read_u8()?;
        if !(1..=4).contains(&off_size) {
            return Err(ParseError::BadValue);
        }

        // Offsets are relative to the byte preceding the object data
        let data_offset = 3 + (count + 1) * usize::from(off_size);
        let offsets = (0..=count)
            .map(|_| -> Result<usize, ParseError> {
                let offset = usize::try_from(ctxt.read_uint(off_size)?)?;
                (data_offset - 1)
                    .checked_add(offset)
                    .ok_or(ParseError::BadOffset)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if offsets[0] != data_offset {
            debug!("INDEX first offset is not 1");
            return Err(ParseError::BadValue);
        }
        if !offsets.iter().tuple_windows().all(|(start, end)| start <= end) {
            debug!("INDEX offsets are not in order");
            return Err(ParseError::BadOffset);
        }
        let end = offsets[count];
        if end > scope.len() {
            debug!("INDEX data extends past the end of the table");
            return Err(ParseError::BadOffset);
        }
        ctxt.skip(end - data_offset)?;

        Ok(Index {
            count,
            off_size,
            scope,
            offsets,
            offset_to_next: scope.base() + end,
        })
    }
}

impl<'a> Index<'a> {
    /// An INDEX with no objects.
    pub fn empty() -> Self {
        Index {
            count: 0,
            off_size: 1,
            scope: ReadScope::new(&[]),
            offsets: Vec::new(),
            offset_to_next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn off_size(&self) -> u8 {
        self.off_size
    }

    /// Absolute position of the first byte following the INDEX.
    pub fn offset_to_next(&self) -> usize {
        self.offset_to_next
    }

    /// The data of object `index`.
    pub fn read_object(&self, index: usize) -> Option<&'a [u8]> {
        self.object_scope(index).map(|scope| scope.data())
    }

    /// The absolute byte range of object `index`.
    pub fn object_range(&self, index: usize) -> Option<Range<usize>> {
        let (start, end) = self.bounds(index)?;
        let base = self.scope.base();
        Some(base + start..base + end)
    }

    /// A scope holding object `index`, positioned where it lies in the table.
    pub fn object_scope(&self, index: usize) -> Option<ReadScope<'a>> {
        let (start, end) = self.bounds(index)?;
        self.scope.offset_length(start, end - start).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        (0..self.count).filter_map(move |i| self.read_object(i))
    }

    fn bounds(&self, index: usize) -> Option<(usize, usize)> {
        let start = *self.offsets.get(index)?;
        let end = *self.offsets.get(index.checked_add(1)?)?;
        Some((start, end))
    }
}

impl<'a> CFF<'a> {
    /// Check the CharString of every glyph in every font.
    pub fn validate_char_strings(&self) -> Result<(), CFFError> {
        for (font_index, font) in self.fonts.iter().enumerate() {
            for (glyph_id, char_string) in (0..=u16::MAX).zip(font.char_strings_index.iter()) {
                let local_subr_index = font.local_subr_index(glyph_id)?;
                validate_char_string(char_string, &self.global_subr_index, local_subr_index)
                    .map_err(|err| {
                        debug!("font {} glyph {}: {}", font_index, glyph_id, err);
                        err
                    })?;
            }
        }

        Ok(())
    }

    /// The PostScript name of the first font, empty if it has been deleted.
    pub fn font_name(&self) -> Option<String> {
        let name = self.name_index.read_object(0)?;
        match name.first() {
            Some(0) => Some(String::new()),
            _ => Some(String::from_utf8_lossy(name).into_owned()),
        }
    }
}

impl<'a> Font<'a> {
    pub fn is_cid_keyed(&self) -> bool {
        self.top_dict.is_cid_keyed
    }

    /// The Local Subrs INDEX that applies to `glyph_id`, if there is one.
    ///
    /// In a CID-keyed font the FDSelect picks the Font DICT that supplies it.
    pub fn local_subr_index(&self, glyph_id: u16) -> Result<Option<&Index<'a>>, ParseError> {
        match &self.top_dict.fd_select {
            Some(fd_select) => {
                let font_dict_index = fd_select
                    .font_dict_index(glyph_id)
                    .ok_or(ParseError::BadIndex)?;
                self.top_dict
                    .local_subr_indices
                    .get(usize::from(font_dict_index))
                    .map(Option::as_ref)
                    .ok_or(ParseError::BadIndex)
            }
            None => Ok(self.top_dict.local_subr_index.as_ref()),
        }
    }

    /// Every FDSelect entry must name a Font DICT from the FDArray.
    fn check_fd_select(&self) -> Result<(), ParseError> {
        match &self.top_dict.fd_select {
            Some(fd_select) => {
                let font_dict_count = self.top_dict.local_subr_indices.len();
                match fd_select.iter().find(|&fd| usize::from(fd) >= font_dict_count) {
                    Some(fd) => {
                        debug!("FDSelect refers to Font DICT {} of {}", fd, font_dict_count);
                        Err(ParseError::BadIndex)
                    }
                    None => Ok(()),
                }
            }
            None => Ok(()),
        }
    }
}

/// Check a name from the Name INDEX.
///
/// A name that starts with a NUL byte belongs to a deleted font and isn't checked further.
fn validate_font_name(name: &[u8]) -> Result<(), ParseError> {
    if name.len() > MAX_NAME_LEN {
        return Err(ParseError::LimitExceeded);
    }

    match name.first() {
        None => Err(ParseError::BadValue),
        Some(0) => Ok(()),
        Some(_) => {
            let valid = name
                .iter()
                .all(|b| (33..=126).contains(b) && !NAME_DELIMITERS.contains(b));
            if valid {
                Ok(())
            } else {
                debug!("invalid font name {:?}", String::from_utf8_lossy(name));
                Err(ParseError::BadValue)
            }
        }
    }
}
