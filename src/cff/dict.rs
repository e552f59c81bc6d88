//! CFF DICT parsing and validation.
//!
//! Refer to section 4 and 9 to 15 of Technical Note #5176. A DICT is read once, top to bottom;
//! each operator is checked against the operands that precede it and any structure it points at
//! (CharStrings, Private DICT, FDArray, ...) is read straight away.

use std::convert::TryFrom;

use bitflags::bitflags;
use log::debug;
use tinyvec::ArrayVec;

use super::charset::{Charset, CustomCharset, CustomEncoding, Encoding, FDSelect};
use super::Index;
use crate::binary::read::{ReadBinary, ReadBinaryDep, ReadCtxt, ReadScope};
use crate::error::ParseError;

// CFF Spec: An operator may be preceded by up to a maximum of 48 operands.
pub(crate) const MAX_OPERANDS: usize = 48;
const END_OF_FLOAT_FLAG: u8 = 0xf;
// Local Subrs offsets are relative to the Private DICT and must be below this.
const MAX_SUBRS_OFFSET: i32 = 1 << 30;

/// CFF DICT operator
#[derive(Debug, PartialEq)]
pub(crate) enum Op {
    Operator(Operator),
    Operand(Operand),
}

/// CFF operand to an operator
///
/// The value of a real number is never needed, only that it is well formed.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Operand {
    Integer(i32),
    Real,
}

#[repr(u16)]
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Operator {
    Version = 0,
    Notice = 1,
    FullName = 2,
    FamilyName = 3,
    Weight = 4,
    FontBBox = 5,
    BlueValues = 6,
    OtherBlues = 7,
    FamilyBlues = 8,
    FamilyOtherBlues = 9,
    StdHW = 10,
    StdVW = 11,
    UniqueID = 13,
    XUID = 14,
    Charset = 15,
    Encoding = 16,
    CharStrings = 17,
    Private = 18,
    Subrs = 19,
    DefaultWidthX = 20,
    NominalWidthX = 21,
    Copyright = op2(0),
    IsFixedPitch = op2(1),
    ItalicAngle = op2(2),
    UnderlinePosition = op2(3),
    UnderlineThickness = op2(4),
    PaintType = op2(5),
    CharstringType = op2(6),
    FontMatrix = op2(7),
    StrokeWidth = op2(8),
    BlueScale = op2(9),
    BlueShift = op2(10),
    BlueFuzz = op2(11),
    StemSnapH = op2(12),
    StemSnapV = op2(13),
    ForceBold = op2(14),
    LanguageGroup = op2(17),
    ExpansionFactor = op2(18),
    InitialRandomSeed = op2(19),
    SyntheticBase = op2(20),
    PostScript = op2(21),
    BaseFontName = op2(22),
    BaseFontBlend = op2(23),
    ROS = op2(30),
    CIDFontVersion = op2(31),
    CIDFontRevision = op2(32),
    CIDFontType = op2(33),
    CIDCount = op2(34),
    UIDBase = op2(35),
    FDArray = op2(36),
    FDSelect = op2(37),
    FontName = op2(38),
}

const fn op2(value: u8) -> u16 {
    (12 << 8) | (value as u16)
}

/// Values shared by every DICT read from one CFF table.
#[derive(Debug, Copy, Clone)]
pub struct DictArgs<'a> {
    /// The whole CFF table, which offsets in a DICT are relative to.
    pub table: ReadScope<'a>,
    /// Glyph count from the `maxp` table.
    pub num_glyphs: usize,
    /// The largest valid string id: the last standard string plus the String INDEX count.
    pub sid_max: usize,
}

/// Whether a DICT is a font's Top DICT or a Font DICT from a CID-keyed font's FDArray.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DictKind {
    Top,
    Font,
}

bitflags! {
    /// Operators that may appear at most once in a DICT.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    struct SeenOperators: u8 {
        const CHARSET = 1 << 0;
        const ENCODING = 1 << 1;
        const CHAR_STRINGS = 1 << 2;
        const PRIVATE = 1 << 3;
        const FD_ARRAY = 1 << 4;
        const FD_SELECT = 1 << 5;
        const ROS = 1 << 6;
        const SUBRS = 1 << 7;
    }
}

/// The structural fields of a Top DICT, or of a Font DICT in an FDArray.
#[derive(Debug, Clone, Default)]
pub struct TopDict<'a> {
    pub char_strings_index: Option<Index<'a>>,
    pub charset: Charset<'a>,
    pub encoding: Encoding<'a>,
    /// Local Subrs of the DICT's own Private DICT.
    pub local_subr_index: Option<Index<'a>>,
    /// Local Subrs of each Font DICT in the FDArray, one entry per Font DICT.
    pub local_subr_indices: Vec<Option<Index<'a>>>,
    pub fd_select: Option<FDSelect>,
    pub is_cid_keyed: bool,
}

/// The structural fields of a Private DICT.
#[derive(Debug, Clone, Default)]
pub struct PrivateDict<'a> {
    pub local_subr_index: Option<Index<'a>>,
}

struct TopDictReader<'a> {
    args: DictArgs<'a>,
    kind: DictKind,
    dict: TopDict<'a>,
    seen: SeenOperators,
    custom_charset_offset: Option<usize>,
}

impl ReadBinary for Op {
    type HostType<'b> = Self;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let b0 = ctxt.read_u8()?;

        match b0 {
            0..=11 | 13..=21 => Operator::try_from(u16::from(b0)).map(Op::Operator),
            12 => Operator::try_from(op2(ctxt.read_u8()?)).map(Op::Operator),
            28 => ok_int(i32::from(ctxt.read_i16be()?)),
            29 => ok_int(ctxt.read_i32be()?),
            30 => {
                validate_real(ctxt.read_until_nibble(END_OF_FLOAT_FLAG)?)?;
                Ok(Op::Operand(Operand::Real))
            }
            32..=246 => ok_int(i32::from(b0) - 139),
            247..=250 => {
                let b1 = ctxt.read_u8()?;
                ok_int((i32::from(b0) - 247) * 256 + i32::from(b1) + 108)
            }
            251..=254 => {
                let b1 = ctxt.read_u8()?;
                ok_int(-(i32::from(b0) - 251) * 256 - i32::from(b1) - 108)
            }
            22..=27 | 31 | 255 => Err(ParseError::BadValue), // reserved
        }
    }
}

fn ok_int(num: i32) -> Result<Op, ParseError> {
    Ok(Op::Operand(Operand::Integer(num)))
}

// Adobe Technical Note #5176, Table 5 Nibble Definitions
fn validate_real(bytes: &[u8]) -> Result<(), ParseError> {
    let mut seen_point = false;
    let mut seen_exponent = false;

    let nibbles = bytes.iter().flat_map(|&b| [b >> 4, b & 0xF]);
    for (i, nibble) in nibbles.enumerate() {
        match nibble {
            0..=9 => {}
            0xa if !seen_point => seen_point = true,
            0xb | 0xc if !seen_exponent => seen_exponent = true,
            0xe if i == 0 => {}
            END_OF_FLOAT_FLAG => return Ok(()),
            // 0xd is reserved
            _ => return Err(ParseError::BadValue),
        }
    }

    Err(ParseError::BadEof)
}

impl Default for Operand {
    fn default() -> Self {
        Operand::Integer(0)
    }
}

impl TryFrom<u16> for Operator {
    type Error = ParseError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if (value & 0xFF00) == (12 << 8) {
            match value as u8 {
                0 => Ok(Operator::Copyright),
                1 => Ok(Operator::IsFixedPitch),
                2 => Ok(Operator::ItalicAngle),
                3 => Ok(Operator::UnderlinePosition),
                4 => Ok(Operator::UnderlineThickness),
                5 => Ok(Operator::PaintType),
                6 => Ok(Operator::CharstringType),
                7 => Ok(Operator::FontMatrix),
                8 => Ok(Operator::StrokeWidth),
                9 => Ok(Operator::BlueScale),
                10 => Ok(Operator::BlueShift),
                11 => Ok(Operator::BlueFuzz),
                12 => Ok(Operator::StemSnapH),
                13 => Ok(Operator::StemSnapV),
                14 => Ok(Operator::ForceBold),
                17 => Ok(Operator::LanguageGroup),
                18 => Ok(Operator::ExpansionFactor),
                19 => Ok(Operator::InitialRandomSeed),
                20 => Ok(Operator::SyntheticBase),
                21 => Ok(Operator::PostScript),
                22 => Ok(Operator::BaseFontName),
                23 => Ok(Operator::BaseFontBlend),
                30 => Ok(Operator::ROS),
                31 => Ok(Operator::CIDFontVersion),
                32 => Ok(Operator::CIDFontRevision),
                33 => Ok(Operator::CIDFontType),
                34 => Ok(Operator::CIDCount),
                35 => Ok(Operator::UIDBase),
                36 => Ok(Operator::FDArray),
                37 => Ok(Operator::FDSelect),
                38 => Ok(Operator::FontName),
                _ => Err(ParseError::BadValue),
            }
        } else {
            match value {
                0 => Ok(Operator::Version),
                1 => Ok(Operator::Notice),
                2 => Ok(Operator::FullName),
                3 => Ok(Operator::FamilyName),
                4 => Ok(Operator::Weight),
                5 => Ok(Operator::FontBBox),
                6 => Ok(Operator::BlueValues),
                7 => Ok(Operator::OtherBlues),
                8 => Ok(Operator::FamilyBlues),
                9 => Ok(Operator::FamilyOtherBlues),
                10 => Ok(Operator::StdHW),
                11 => Ok(Operator::StdVW),
                13 => Ok(Operator::UniqueID),
                14 => Ok(Operator::XUID),
                15 => Ok(Operator::Charset),
                16 => Ok(Operator::Encoding),
                17 => Ok(Operator::CharStrings),
                18 => Ok(Operator::Private),
                19 => Ok(Operator::Subrs),
                20 => Ok(Operator::DefaultWidthX),
                21 => Ok(Operator::NominalWidthX),
                _ => Err(ParseError::BadValue),
            }
        }
    }
}

/// Tokenise a DICT, passing each operator and the operands preceding it to `visit`.
fn read_dict<'a>(
    ctxt: &mut ReadCtxt<'a>,
    mut visit: impl FnMut(Operator, &[Operand]) -> Result<(), ParseError>,
) -> Result<(), ParseError> {
    let mut operands = ArrayVec::<[Operand; MAX_OPERANDS]>::new();

    while ctxt.bytes_available() {
        match Op::read(ctxt)? {
            Op::Operator(operator) => {
                visit(operator, &operands).map_err(|err| {
                    debug!("invalid {:?} in DICT: {}", operator, err);
                    err
                })?;
                operands.clear();
            }
            Op::Operand(operand) => {
                if operands.try_push(operand).is_some() {
                    return Err(ParseError::LimitExceeded);
                }
            }
        }
    }

    // Operands must be followed by an operator
    ctxt.check(operands.is_empty())
}

impl<'b> ReadBinaryDep for TopDict<'b> {
    type Args<'a> = (DictArgs<'a>, DictKind);
    type HostType<'a> = TopDict<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        (args, kind): (DictArgs<'a>, DictKind),
    ) -> Result<Self::HostType<'a>, ParseError> {
        let mut reader = TopDictReader {
            args,
            kind,
            dict: TopDict::default(),
            seen: SeenOperators::empty(),
            custom_charset_offset: None,
        };
        read_dict(ctxt, |operator, operands| reader.visit(operator, operands))?;
        reader.finish()
    }
}

impl<'a> TopDictReader<'a> {
    fn visit(&mut self, operator: Operator, operands: &[Operand]) -> Result<(), ParseError> {
        match operator {
            Operator::Version
            | Operator::Notice
            | Operator::FullName
            | Operator::FamilyName
            | Operator::Weight
            | Operator::Copyright
            | Operator::PostScript
            | Operator::BaseFontName
            | Operator::FontName => sid(operands, self.args.sid_max),
            Operator::FontBBox
            | Operator::XUID
            | Operator::FontMatrix
            | Operator::BaseFontBlend => non_empty(operands),
            Operator::UniqueID
            | Operator::ItalicAngle
            | Operator::UnderlinePosition
            | Operator::UnderlineThickness
            | Operator::PaintType
            | Operator::StrokeWidth
            | Operator::SyntheticBase => single(operands).map(drop),
            Operator::CIDFontVersion
            | Operator::CIDFontRevision
            | Operator::CIDFontType
            | Operator::CIDCount
            | Operator::UIDBase => {
                if !self.dict.is_cid_keyed {
                    return Err(ParseError::BadValue);
                }
                single(operands).map(drop)
            }
            // Type 1 charstrings (1) are not supported
            Operator::CharstringType => match integer(operands)? {
                2 => Ok(()),
                _ => Err(ParseError::BadValue),
            },
            Operator::IsFixedPitch => boolean(operands),
            Operator::Charset => {
                self.seen.mark(SeenOperators::CHARSET)?;
                self.dict.charset = match integer(operands)? {
                    0 => Charset::ISOAdobe,
                    1 => Charset::Expert,
                    2 => Charset::ExpertSubset,
                    offset => {
                        // Read once the whole DICT is known, as the format depends on ROS
                        self.custom_charset_offset = Some(table_offset(self.args.table, offset)?);
                        Charset::ISOAdobe
                    }
                };
                Ok(())
            }
            Operator::Encoding => {
                self.seen.mark(SeenOperators::ENCODING)?;
                self.dict.encoding = match integer(operands)? {
                    0 => Encoding::Standard,
                    1 => Encoding::Expert,
                    offset => {
                        let offset = table_offset(self.args.table, offset)?;
                        let encoding = self.args.table.offset(offset).read::<CustomEncoding<'_>>()?;
                        Encoding::Custom(encoding)
                    }
                };
                Ok(())
            }
            Operator::CharStrings => {
                self.top_dict_only()?;
                self.seen.mark(SeenOperators::CHAR_STRINGS)?;
                let offset = table_offset(self.args.table, integer(operands)?)?;
                let char_strings_index = self.args.table.offset(offset).read::<Index<'_>>()?;
                if char_strings_index.count != self.args.num_glyphs || char_strings_index.count < 2
                {
                    return Err(ParseError::BadValue);
                }
                self.dict.char_strings_index = Some(char_strings_index);
                Ok(())
            }
            Operator::Private => {
                self.seen.mark(SeenOperators::PRIVATE)?;
                let private_dict = read_private_dict(self.args, operands)?;
                self.dict.local_subr_index = private_dict.local_subr_index;
                Ok(())
            }
            Operator::FDArray => {
                self.top_dict_only()?;
                self.seen.mark(SeenOperators::FD_ARRAY)?;
                let offset = table_offset(self.args.table, integer(operands)?)?;
                let font_dict_index = self.args.table.offset(offset).read::<Index<'_>>()?;
                let mut local_subr_indices = Vec::with_capacity(font_dict_index.count);
                for i in 0..font_dict_index.count {
                    let font_dict_scope =
                        font_dict_index.object_scope(i).ok_or(ParseError::BadIndex)?;
                    let font_dict =
                        font_dict_scope.read_dep::<TopDict<'_>>((self.args, DictKind::Font))?;
                    // An entry is pushed even without Local Subrs so FDSelect can index directly
                    local_subr_indices.push(font_dict.local_subr_index);
                }
                self.dict.local_subr_indices = local_subr_indices;
                Ok(())
            }
            Operator::FDSelect => {
                self.top_dict_only()?;
                self.seen.mark(SeenOperators::FD_SELECT)?;
                let offset = table_offset(self.args.table, integer(operands)?)?;
                let fd_select = self
                    .args
                    .table
                    .offset(offset)
                    .read_dep::<FDSelect>(self.args.num_glyphs)?;
                self.dict.fd_select = Some(fd_select);
                Ok(())
            }
            Operator::ROS => {
                self.top_dict_only()?;
                self.seen.mark(SeenOperators::ROS)?;
                let [registry, ordering, _supplement] = operands else {
                    return Err(ParseError::BadValue);
                };
                check_sid(registry, self.args.sid_max)?;
                check_sid(ordering, self.args.sid_max)?;
                self.dict.is_cid_keyed = true;
                Ok(())
            }
            // Private DICT operators
            Operator::BlueValues
            | Operator::OtherBlues
            | Operator::FamilyBlues
            | Operator::FamilyOtherBlues
            | Operator::StdHW
            | Operator::StdVW
            | Operator::Subrs
            | Operator::DefaultWidthX
            | Operator::NominalWidthX
            | Operator::BlueScale
            | Operator::BlueShift
            | Operator::BlueFuzz
            | Operator::StemSnapH
            | Operator::StemSnapV
            | Operator::ForceBold
            | Operator::LanguageGroup
            | Operator::ExpansionFactor
            | Operator::InitialRandomSeed => Err(ParseError::BadValue),
        }
    }

    fn top_dict_only(&self) -> Result<(), ParseError> {
        match self.kind {
            DictKind::Top => Ok(()),
            DictKind::Font => Err(ParseError::BadValue),
        }
    }

    fn finish(mut self) -> Result<TopDict<'a>, ParseError> {
        if let Some(offset) = self.custom_charset_offset {
            // TODO: check CIDs against CIDCount once CIDCount is recorded
            let sid_max = (!self.dict.is_cid_keyed).then_some(self.args.sid_max);
            let charset = self
                .args
                .table
                .offset(offset)
                .read_dep::<CustomCharset<'_>>((self.args.num_glyphs, sid_max))?;
            self.dict.charset = Charset::Custom(charset);
        }

        Ok(self.dict)
    }
}

/// Read the Private DICT referenced by the `size offset` operands of a Private operator.
fn read_private_dict<'a>(
    args: DictArgs<'a>,
    operands: &[Operand],
) -> Result<PrivateDict<'a>, ParseError> {
    let [Operand::Integer(size), Operand::Integer(offset)] = operands else {
        return Err(ParseError::BadValue);
    };
    let size = usize::try_from(*size)?;
    let offset = usize::try_from(*offset)?;

    let table_len = args.table.len();
    match offset.checked_add(size) {
        Some(end) if offset <= table_len && size < table_len && end <= table_len => {}
        _ => return Err(ParseError::BadOffset),
    }

    args.table
        .offset_length(offset, size)?
        .read_dep::<PrivateDict<'_>>((args, offset))
}

impl<'b> ReadBinaryDep for PrivateDict<'b> {
    /// The DICT arguments and the offset of the Private DICT within the table.
    type Args<'a> = (DictArgs<'a>, usize);
    type HostType<'a> = PrivateDict<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        (args, private_dict_offset): (DictArgs<'a>, usize),
    ) -> Result<Self::HostType<'a>, ParseError> {
        let mut seen = SeenOperators::empty();
        let mut local_subr_index = None;

        read_dict(ctxt, |operator, operands| match operator {
            Operator::BlueValues
            | Operator::OtherBlues
            | Operator::FamilyBlues
            | Operator::FamilyOtherBlues => {
                non_empty(operands)?;
                // Pairs of zones
                match operands.len() % 2 {
                    0 => Ok(()),
                    _ => Err(ParseError::BadValue),
                }
            }
            Operator::StemSnapH | Operator::StemSnapV => non_empty(operands),
            Operator::StdHW
            | Operator::StdVW
            | Operator::DefaultWidthX
            | Operator::NominalWidthX
            | Operator::BlueScale
            | Operator::BlueShift
            | Operator::BlueFuzz
            | Operator::LanguageGroup
            | Operator::ExpansionFactor
            | Operator::InitialRandomSeed => single(operands).map(drop),
            Operator::ForceBold => boolean(operands),
            Operator::Subrs => {
                seen.mark(SeenOperators::SUBRS)?;
                // The local subrs offset is relative to the beginning of the Private DICT
                let offset = integer(operands)?;
                if !(0..MAX_SUBRS_OFFSET).contains(&offset) {
                    return Err(ParseError::BadOffset);
                }
                let offset = private_dict_offset
                    .checked_add(usize::try_from(offset)?)
                    .filter(|&offset| offset < args.table.len())
                    .ok_or(ParseError::BadOffset)?;
                local_subr_index = Some(args.table.offset(offset).read::<Index<'_>>()?);
                Ok(())
            }
            _ => Err(ParseError::BadValue),
        })?;

        Ok(PrivateDict { local_subr_index })
    }
}

impl SeenOperators {
    /// Record `operator`, failing if it has already been seen.
    fn mark(&mut self, operator: SeenOperators) -> Result<(), ParseError> {
        if self.contains(operator) {
            return Err(ParseError::BadValue);
        }
        self.insert(operator);
        Ok(())
    }
}

fn single(operands: &[Operand]) -> Result<Operand, ParseError> {
    match operands {
        [operand] => Ok(*operand),
        _ => Err(ParseError::BadValue),
    }
}

fn integer(operands: &[Operand]) -> Result<i32, ParseError> {
    match single(operands)? {
        Operand::Integer(value) => Ok(value),
        Operand::Real => Err(ParseError::BadValue),
    }
}

fn boolean(operands: &[Operand]) -> Result<(), ParseError> {
    match integer(operands)? {
        0 | 1 => Ok(()),
        _ => Err(ParseError::BadValue),
    }
}

fn non_empty(operands: &[Operand]) -> Result<(), ParseError> {
    if operands.is_empty() {
        Err(ParseError::BadValue)
    } else {
        Ok(())
    }
}

fn sid(operands: &[Operand], sid_max: usize) -> Result<(), ParseError> {
    check_sid(&single(operands)?, sid_max)
}

fn check_sid(operand: &Operand, sid_max: usize) -> Result<(), ParseError> {
    match *operand {
        Operand::Integer(sid) if usize::try_from(sid).map_or(false, |sid| sid <= sid_max) => Ok(()),
        _ => Err(ParseError::BadValue),
    }
}

/// Convert a DICT operand into an offset that lies within the table.
fn table_offset(table: ReadScope<'_>, offset: i32) -> Result<usize, ParseError> {
    match usize::try_from(offset) {
        Ok(offset) if offset < table.len() => Ok(offset),
        _ => Err(ParseError::BadOffset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::writer::{convert, index, CffType};

    fn args(table: &[u8]) -> DictArgs<'_> {
        DictArgs {
            table: ReadScope::new(table),
            num_glyphs: 2,
            sid_max: 390,
        }
    }

    /// Read a Top DICT occupying the first `dict_len` bytes of `table`.
    fn read_dict_prefix(
        table: &[u8],
        dict_len: usize,
        kind: DictKind,
    ) -> Result<TopDict<'_>, ParseError> {
        ReadScope::new(&table[..dict_len]).read_dep::<TopDict<'_>>((args(table), kind))
    }

    fn read_top_dict(data: &[u8]) -> Result<TopDict<'_>, ParseError> {
        read_dict_prefix(data, data.len(), DictKind::Top)
    }

    fn read_font_dict(data: &[u8]) -> Result<TopDict<'_>, ParseError> {
        read_dict_prefix(data, data.len(), DictKind::Font)
    }

    fn read_private_prefix(table: &[u8], dict_len: usize) -> Result<PrivateDict<'_>, ParseError> {
        ReadScope::new(&table[..dict_len]).read_dep::<PrivateDict<'_>>((args(table), 0))
    }

    fn read_private(data: &[u8]) -> Result<PrivateDict<'_>, ParseError> {
        read_private_prefix(data, data.len())
    }

    #[test]
    fn test_read_op1() {
        let mut ctxt = ReadScope::new(&[0, 0]).ctxt();
        assert_eq!(
            Op::read(&mut ctxt).unwrap(),
            Op::Operator(Operator::Version)
        );
    }

    #[test]
    fn test_fail_op1() {
        let mut ctxt = ReadScope::new(&[]).ctxt();
        assert!(Op::read(&mut ctxt).is_err());
    }

    #[test]
    fn test_read_op2() {
        let mut ctxt = ReadScope::new(&[12, 1]).ctxt();
        assert_eq!(
            Op::read(&mut ctxt).unwrap(),
            Op::Operator(Operator::IsFixedPitch)
        );
    }

    #[test]
    fn test_fail_op2() {
        let mut ctxt = ReadScope::new(&[12]).ctxt();
        assert!(Op::read(&mut ctxt).is_err());
    }

    #[test]
    fn test_reserved_op2() {
        for b1 in [15, 16, 24, 29, 39, 255] {
            let data = [12, b1];
            let mut ctxt = ReadScope::new(&data).ctxt();
            assert_eq!(Op::read(&mut ctxt), Err(ParseError::BadValue), "12 {}", b1);
        }
    }

    #[test]
    fn test_reserved_op1() {
        for b0 in [22, 27, 31, 255] {
            let data = [b0, 0, 0, 0, 0];
            let mut ctxt = ReadScope::new(&data).ctxt();
            assert_eq!(Op::read(&mut ctxt), Err(ParseError::BadValue), "{}", b0);
        }
    }

    #[test]
    fn test_read_i16() {
        //                             _____-10000______  ______10000_____  100   -100
        let mut ctxt = ReadScope::new(&[0x1c, 0xd8, 0xf0, 0x1c, 0x27, 0x10, 0xef, 0x27]).ctxt();
        assert_eq!(
            Op::read(&mut ctxt).unwrap(),
            Op::Operand(Operand::Integer(-10000))
        );
        assert_eq!(
            Op::read(&mut ctxt).unwrap(),
            Op::Operand(Operand::Integer(10000))
        );
        assert_eq!(
            Op::read(&mut ctxt).unwrap(),
            Op::Operand(Operand::Integer(100))
        );
        assert_eq!(
            Op::read(&mut ctxt).unwrap(),
            Op::Operand(Operand::Integer(-100))
        );
    }

    #[test]
    fn test_read_i32() {
        //                   __________-100000___________  ____________100000__________
        let mut ctxt =
            ReadScope::new(&[0x1d, 0xff, 0xfe, 0x79, 0x60, 0x1d, 0x00, 0x01, 0x86, 0xa0]).ctxt();
        assert_eq!(
            Op::read(&mut ctxt).unwrap(),
            Op::Operand(Operand::Integer(-100000))
        );
        assert_eq!(
            Op::read(&mut ctxt).unwrap(),
            Op::Operand(Operand::Integer(100000))
        );
    }

    #[test]
    fn test_read_real() {
        // The value –2.25 is encoded by the byte sequence (1e e2 a2 5f) and the value
        // 0.140541E–3 by the sequence (1e 0a 14 05 41 c3 ff).
        let mut ctxt = ReadScope::new(&[
            // ______-2.25________  _______________0.140541E–3______________
            0x1e, 0xe2, 0xa2, 0x5f, 0x1e, 0x0a, 0x14, 0x05, 0x41, 0xc3, 0xff,
        ])
        .ctxt();
        assert_eq!(Op::read(&mut ctxt).unwrap(), Op::Operand(Operand::Real));
        assert_eq!(Op::read(&mut ctxt).unwrap(), Op::Operand(Operand::Real));
        assert!(!ctxt.bytes_available());
    }

    #[test]
    fn test_invalid_real() {
        let invalid: &[&[u8]] = &[
            &[0x1e, 0x1d, 0xff],       // reserved nibble
            &[0x1e, 0x1e, 0xff],       // minus after a digit
            &[0x1e, 0x1a, 0x2a, 0xff], // two decimal points
            &[0x1e, 0xb1, 0xc1, 0xff], // two exponents
            &[0x1e, 0x12, 0x34],       // unterminated
        ];
        for data in invalid {
            let mut ctxt = ReadScope::new(data).ctxt();
            assert!(Op::read(&mut ctxt).is_err(), "{:02x?}", data);
        }
    }

    #[test]
    fn test_read_top_dict() {
        // IsFixedPitch (12 1) is true (1)
        // Notice (1) SID is 123
        //                 _1__         __123__
        let data = [0x8c, 12, 1, 247, 15, 1];
        let dict = read_top_dict(&data).unwrap();
        assert!(!dict.is_cid_keyed);
        assert!(dict.char_strings_index.is_none());
        assert!(matches!(dict.charset, Charset::ISOAdobe));
        assert!(matches!(dict.encoding, Encoding::Standard));
    }

    #[test]
    fn test_operand_limit() {
        let mut data = vec![0x8b; MAX_OPERANDS];
        data.push(5); // FontBBox
        assert!(read_top_dict(&data).is_ok());

        let mut data = vec![0x8b; MAX_OPERANDS + 1];
        data.push(5);
        assert_eq!(read_top_dict(&data).unwrap_err(), ParseError::LimitExceeded);
    }

    #[test]
    fn test_trailing_operands() {
        assert_eq!(
            read_top_dict(&[0x8c, 12, 1, 0x8b]).unwrap_err(),
            ParseError::BadValue
        );
    }

    #[test]
    fn test_sid_range() {
        let dict = |sid| convert(&[CffType::Int(sid), CffType::Operator2(38)]);
        assert!(read_top_dict(&dict(0)).is_ok());
        assert!(read_top_dict(&dict(390)).is_ok());
        assert!(read_top_dict(&dict(391)).is_err());
        assert!(read_top_dict(&dict(-1)).is_err());
        // Real numbers aren't SIDs
        assert!(read_top_dict(&[0x1e, 0x1f, 0]).is_err());
        // Exactly one operand
        assert!(read_top_dict(&[0x8b, 0x8b, 0]).is_err());
    }

    #[test]
    fn test_scalar_and_array_operators() {
        // ItalicAngle with a real operand
        assert!(read_top_dict(&[0x1e, 0xe2, 0xa2, 0x5f, 12, 2]).is_ok());
        // UniqueID without an operand
        assert!(read_top_dict(&[13]).is_err());
        // FontMatrix needs at least one operand
        assert!(read_top_dict(&[12, 7]).is_err());
        assert!(read_top_dict(&[0x8b, 0x8b, 0x8b, 0x8b, 0x8b, 0x8b, 12, 7]).is_ok());
    }

    #[test]
    fn test_charstring_type() {
        assert!(read_top_dict(&[0x8d, 12, 6]).is_ok());
        assert_eq!(
            read_top_dict(&[0x8c, 12, 6]).unwrap_err(),
            ParseError::BadValue
        );
    }

    #[test]
    fn test_is_fixed_pitch() {
        assert!(read_top_dict(&[0x8b, 12, 1]).is_ok());
        assert!(read_top_dict(&[0x8d, 12, 1]).is_err());
    }

    #[test]
    fn test_predefined_charset_and_encoding() {
        let dict = read_top_dict(&[0x8d, 15, 0x8c, 16]).unwrap();
        assert!(matches!(dict.charset, Charset::ExpertSubset));
        assert!(matches!(dict.encoding, Encoding::Expert));
    }

    #[test]
    fn test_duplicate_charset() {
        assert_eq!(
            read_top_dict(&[0x8b, 15, 0x8c, 15]).unwrap_err(),
            ParseError::BadValue
        );
    }

    #[test]
    fn test_charset_offset_out_of_bounds() {
        let data = convert(&[CffType::Int(1000), CffType::Operator(15)]);
        assert_eq!(read_top_dict(&data).unwrap_err(), ParseError::BadOffset);
        let data = convert(&[CffType::Int(-5), CffType::Operator(15)]);
        assert_eq!(read_top_dict(&data).unwrap_err(), ParseError::BadOffset);
    }

    #[test]
    fn test_custom_charset() {
        // charset at offset 6: format 0, glyph 1 is SID 100
        let data = convert(&[
            CffType::Offset(6),
            CffType::Operator(15),
            CffType::UInt8(0),
            CffType::UInt16(100),
        ]);
        let dict = read_dict_prefix(&data, 6, DictKind::Top).unwrap();
        assert!(matches!(dict.charset, Charset::Custom(_)));

        let data = convert(&[
            CffType::Offset(6),
            CffType::Operator(15),
            CffType::UInt8(0),
            CffType::UInt16(1000),
        ]);
        assert!(read_dict_prefix(&data, 6, DictKind::Top).is_err());
    }

    #[test]
    fn test_cid_charset_not_range_checked() {
        let ros = [CffType::Int(0), CffType::Int(1), CffType::Int(0), CffType::Operator2(30)];
        let mut data = convert(&ros);
        let charset_offset = data.len() + 6;
        data.extend(convert(&[
            CffType::Offset(charset_offset as i32),
            CffType::Operator(15),
            CffType::UInt8(0),
            CffType::UInt16(1000),
        ]));
        let dict = read_dict_prefix(&data, charset_offset, DictKind::Top).unwrap();
        assert!(dict.is_cid_keyed);
        assert!(matches!(dict.charset, Charset::Custom(_)));
    }

    #[test]
    fn test_ros() {
        let ros = convert(&[
            CffType::Int(0),
            CffType::Int(1),
            CffType::Int(0),
            CffType::Operator2(30),
        ]);
        let dict = read_top_dict(&ros).unwrap();
        assert!(dict.is_cid_keyed);

        // ROS may follow other operators
        let mut data = convert(&[CffType::Int(0), CffType::Operator2(38)]);
        data.extend_from_slice(&ros);
        assert!(read_top_dict(&data).unwrap().is_cid_keyed);

        // ... and only once
        let mut data = ros.clone();
        data.extend_from_slice(&ros);
        assert!(read_top_dict(&data).is_err());

        // Registry must be a valid SID
        let data = convert(&[
            CffType::Int(391),
            CffType::Int(1),
            CffType::Int(0),
            CffType::Operator2(30),
        ]);
        assert!(read_top_dict(&data).is_err());

        // Not allowed in a Font DICT
        assert!(read_font_dict(&ros).is_err());
    }

    #[test]
    fn test_cid_operators_require_ros() {
        // CIDCount
        let cid_count = convert(&[CffType::Int(100), CffType::Operator2(34)]);
        assert!(read_top_dict(&cid_count).is_err());

        let mut data = convert(&[
            CffType::Int(0),
            CffType::Int(1),
            CffType::Int(0),
            CffType::Operator2(30),
        ]);
        data.extend_from_slice(&cid_count);
        assert!(read_top_dict(&data).is_ok());
    }

    #[test]
    fn test_char_strings() {
        let glyphs = index(&[[14u8], [14u8]]);
        let mut data = convert(&[CffType::Offset(6), CffType::Operator(17)]);
        data.extend_from_slice(&glyphs);
        let dict = read_dict_prefix(&data, 6, DictKind::Top).unwrap();
        assert_eq!(dict.char_strings_index.map(|index| index.count), Some(2));

        // Count must match the glyph count
        let glyphs = index(&[[14u8], [14u8], [14u8]]);
        let mut data = convert(&[CffType::Offset(6), CffType::Operator(17)]);
        data.extend_from_slice(&glyphs);
        assert_eq!(read_dict_prefix(&data, 6, DictKind::Top).unwrap_err(), ParseError::BadValue);
    }

    #[test]
    fn test_char_strings_in_font_dict() {
        let glyphs = index(&[[14u8], [14u8]]);
        let mut data = convert(&[CffType::Offset(6), CffType::Operator(17)]);
        data.extend_from_slice(&glyphs);
        assert_eq!(read_dict_prefix(&data, 6, DictKind::Font).unwrap_err(), ParseError::BadValue);
    }

    #[test]
    fn test_private_dict() {
        // Private DICT of 2 bytes at offset 11: StdHW 0
        let data = convert(&[
            CffType::Offset(2),
            CffType::Offset(11),
            CffType::Operator(18),
            CffType::Int(0),
            CffType::Operator(10),
        ]);
        let dict = read_dict_prefix(&data, 11, DictKind::Top).unwrap();
        assert!(dict.local_subr_index.is_none());

        // Runs off the end of the table
        let data = convert(&[
            CffType::Offset(3),
            CffType::Offset(11),
            CffType::Operator(18),
            CffType::Int(0),
            CffType::Operator(10),
        ]);
        assert_eq!(
            read_dict_prefix(&data, 11, DictKind::Top).unwrap_err(),
            ParseError::BadOffset
        );

        // Negative size
        let data = convert(&[CffType::Int(-1), CffType::Int(0), CffType::Operator(18)]);
        assert!(read_top_dict(&data).is_err());

        // Only one operand
        let data = convert(&[CffType::Int(0), CffType::Operator(18)]);
        assert!(read_top_dict(&data).is_err());
    }

    #[test]
    fn test_private_dict_with_subrs() {
        // Private DICT of 6 bytes at offset 11: Subrs 6, followed by the subrs INDEX
        let mut data = convert(&[
            CffType::Offset(6),
            CffType::Offset(11),
            CffType::Operator(18),
            CffType::Offset(6),
            CffType::Operator(19),
        ]);
        data.extend_from_slice(&index(&[[11u8], [11u8], [11u8]]));
        let dict = read_dict_prefix(&data, 11, DictKind::Top).unwrap();
        assert_eq!(dict.local_subr_index.map(|index| index.count), Some(3));
    }

    #[test]
    fn test_private_dict_operators() {
        // BlueValues needs pairs
        assert!(read_private(&[0x8b, 0x8c, 6]).is_ok());
        assert!(read_private(&[0x8b, 0x8c, 0x8d, 6]).is_err());
        assert!(read_private(&[6]).is_err());
        // StemSnapH
        assert!(read_private(&[0x8b, 0x8c, 0x8d, 12, 12]).is_ok());
        assert!(read_private(&[12, 12]).is_err());
        // ForceBold
        assert!(read_private(&[0x8c, 12, 14]).is_ok());
        assert!(read_private(&[0x8d, 12, 14]).is_err());
        // defaultWidthX, nominalWidthX
        assert!(read_private(&[0x8b, 20, 0x8b, 21]).is_ok());
        assert!(read_private(&[0x8b, 0x8b, 20]).is_err());
        // Top DICT operators are not allowed
        assert!(read_private(&[0x8b, 0]).is_err());
    }

    #[test]
    fn test_subrs_offset() {
        // Negative
        assert_eq!(
            read_private(&[0x8a, 19]).unwrap_err(),
            ParseError::BadOffset
        );
        // Out of the table
        assert_eq!(
            read_private(&[0x8b + 10, 19]).unwrap_err(),
            ParseError::BadOffset
        );
        let data = convert(&[CffType::Int(1 << 30), CffType::Operator(19)]);
        assert_eq!(read_private(&data).unwrap_err(), ParseError::BadOffset);
    }

    #[test]
    fn test_duplicate_subrs() {
        let mut data = convert(&[
            CffType::Offset(12),
            CffType::Operator(19),
            CffType::Offset(12),
            CffType::Operator(19),
        ]);
        data.extend_from_slice(&index::<[u8; 1]>(&[]));
        assert_eq!(read_private_prefix(&data, 12).unwrap_err(), ParseError::BadValue);
    }

    #[test]
    fn test_fd_array() {
        // FDArray INDEX at 7 holding a Font DICT with a Private DICT at 24 and an empty Font
        // DICT. The Private DICT's Subrs INDEX follows it at 30.
        let mut data = convert(&[CffType::Offset(7), CffType::Operator2(36)]);
        let font_dict = convert(&[
            CffType::Offset(6),
            CffType::Offset(24),
            CffType::Operator(18),
        ]);
        data.extend(index(&[font_dict, Vec::new()]));
        assert_eq!(data.len(), 24);
        data.extend(convert(&[CffType::Offset(6), CffType::Operator(19)]));
        data.extend(index(&[[11u8]]));

        let dict = read_dict_prefix(&data, 7, DictKind::Top).unwrap();
        assert_eq!(dict.local_subr_indices.len(), 2);
        assert_eq!(
            dict.local_subr_indices[0].as_ref().map(|index| index.count),
            Some(1)
        );
        assert!(dict.local_subr_indices[1].is_none());
    }

    #[test]
    fn test_fd_array_nested() {
        // A Font DICT can't hold another FDArray
        let mut data = convert(&[CffType::Offset(7), CffType::Operator2(36)]);
        let font_dict = convert(&[CffType::Offset(7), CffType::Operator2(36)]);
        data.extend(index(&[font_dict]));
        assert_eq!(read_dict_prefix(&data, 7, DictKind::Top).unwrap_err(), ParseError::BadValue);
    }
}
