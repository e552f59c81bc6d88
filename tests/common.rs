pub mod writer {
    //! Byte level builders for CFF data.
    #![allow(dead_code)]

    // The writer module is derived from ttf-parser, licenced under Apache-2.0.
    // https://github.com/RazrFalcon/ttf-parser/blob/439aaaebd50eb8aed66302e3c1b51fae047f85b2/src/writer.rs

    #[derive(Clone, Copy, Debug)]
    pub enum CffType<'a> {
        Raw(&'a [u8]),
        UInt8(u8),
        UInt16(u16),
        /// A number in the shortest DICT/charstring form. Values outside the 16-bit range use
        /// the DICT only 5 byte form.
        Int(i32),
        /// A DICT number always written in the 5 byte form so its size doesn't depend on the
        /// value.
        Offset(i32),
        Operator(u8),
        /// An escaped (12 x) operator.
        Operator2(u8),
    }

    pub fn convert(values: &[CffType<'_>]) -> Vec<u8> {
        let mut data = Vec::with_capacity(256);
        for v in values {
            convert_type(*v, &mut data);
        }

        data
    }

    pub fn convert_type(value: CffType<'_>, data: &mut Vec<u8>) {
        match value {
            CffType::Raw(bytes) => {
                data.extend_from_slice(bytes);
            }
            CffType::UInt8(n) => {
                data.push(n);
            }
            CffType::UInt16(n) => {
                data.extend_from_slice(&u16::to_be_bytes(n));
            }
            CffType::Int(n) => match n {
                -107..=107 => {
                    data.push((n as i16 + 139) as u8);
                }
                108..=1131 => {
                    let n = n - 108;
                    data.push(((n >> 8) + 247) as u8);
                    data.push((n & 0xFF) as u8);
                }
                -1131..=-108 => {
                    let n = -n - 108;
                    data.push(((n >> 8) + 251) as u8);
                    data.push((n & 0xFF) as u8);
                }
                -32768..=32767 => {
                    data.push(28);
                    data.extend_from_slice(&i16::to_be_bytes(n as i16));
                }
                _ => {
                    data.push(29);
                    data.extend_from_slice(&i32::to_be_bytes(n));
                }
            },
            CffType::Offset(n) => {
                data.push(29);
                data.extend_from_slice(&i32::to_be_bytes(n));
            }
            CffType::Operator(op) => {
                data.push(op);
            }
            CffType::Operator2(op) => {
                data.push(12);
                data.push(op);
            }
        }
    }

    /// Encode `objects` as a CFF INDEX using the smallest offset size that fits.
    pub fn index<T: AsRef<[u8]>>(objects: &[T]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(objects.len() as u16).to_be_bytes());
        if objects.is_empty() {
            return data;
        }

        let last_offset = objects.iter().map(|o| o.as_ref().len()).sum::<usize>() + 1;
        let off_size = match last_offset {
            0..=0xFF => 1,
            0x100..=0xFFFF => 2,
            0x1_0000..=0xFF_FFFF => 3,
            _ => 4,
        };
        data.push(off_size as u8);

        let mut offset = 1usize;
        data.extend_from_slice(&(offset as u32).to_be_bytes()[4 - off_size..]);
        for object in objects {
            offset += object.as_ref().len();
            data.extend_from_slice(&(offset as u32).to_be_bytes()[4 - off_size..]);
        }
        for object in objects {
            data.extend_from_slice(object.as_ref());
        }

        data
    }
}

pub mod builder {
    //! Assembles complete CFF tables.
    #![allow(dead_code)]

    use super::writer::{convert, index, CffType};

    /// `endchar` on its own; the smallest valid glyph.
    pub const EMPTY_GLYPH: &[u8] = &[14];

    #[derive(Clone, Debug, Default)]
    pub struct FontDictBuilder {
        /// Private DICT operators, not including Subrs.
        pub private_dict: Vec<u8>,
        pub local_subrs: Option<Vec<Vec<u8>>>,
    }

    /// Builds a CFF table with one Top DICT per name.
    ///
    /// All offsets are written in the 5 byte DICT form so the table layout can be computed up
    /// front.
    #[derive(Clone, Debug)]
    pub struct CffBuilder {
        pub names: Vec<Vec<u8>>,
        pub strings: Vec<Vec<u8>>,
        /// Raw DICT data placed at the start of each Top DICT, ROS goes here.
        pub top_dict_prefix: Vec<u8>,
        /// Raw DICT data placed at the end of each Top DICT.
        pub top_dict_suffix: Vec<u8>,
        pub global_subrs: Vec<Vec<u8>>,
        pub char_strings: Vec<Vec<u8>>,
        /// Raw charset data, referenced by the charset operator.
        pub charset: Option<Vec<u8>>,
        /// Private DICT operators, not including Subrs.
        pub private_dict: Option<Vec<u8>>,
        pub local_subrs: Option<Vec<Vec<u8>>>,
        pub font_dicts: Option<Vec<FontDictBuilder>>,
        /// Raw FDSelect data, referenced by the FDSelect operator.
        pub fd_select: Option<Vec<u8>>,
    }

    impl CffBuilder {
        /// A font with `num_glyphs` glyphs that each consist of `endchar`.
        pub fn new(num_glyphs: usize) -> Self {
            CffBuilder {
                names: vec![b"TestFont".to_vec()],
                strings: Vec::new(),
                top_dict_prefix: Vec::new(),
                top_dict_suffix: Vec::new(),
                global_subrs: Vec::new(),
                char_strings: vec![EMPTY_GLYPH.to_vec(); num_glyphs],
                charset: None,
                private_dict: None,
                local_subrs: None,
                font_dicts: None,
                fd_select: None,
            }
        }

        /// A CID-keyed font where each font DICT has an (empty) Private DICT.
        pub fn new_cid(
            num_glyphs: usize,
            font_dicts: Vec<FontDictBuilder>,
            fd_select: Vec<u8>,
        ) -> Self {
            let mut builder = CffBuilder::new(num_glyphs);
            // ROS: Adobe Identity 0
            builder.top_dict_prefix = convert(&[
                CffType::Int(391),
                CffType::Int(392),
                CffType::Int(0),
                CffType::Operator2(30),
            ]);
            builder.strings = vec![b"Adobe".to_vec(), b"Identity".to_vec()];
            builder.font_dicts = Some(font_dicts);
            builder.fd_select = Some(fd_select);
            builder
        }

        pub fn build(&self) -> Vec<u8> {
            let header = [1, 0, 4, 4];
            let name_index = index(&self.names);
            let string_index = index(&self.strings);
            let global_subr_index = index(&self.global_subrs);
            let char_strings_index = index(&self.char_strings);

            // The Top DICT size doesn't depend on the offsets it holds
            let placeholder = self.top_dict(&Layout::default());
            let top_dict_index_len = index(&vec![placeholder; self.names.len()]).len();

            let mut layout = Layout::default();
            let mut offset = header.len()
                + name_index.len()
                + top_dict_index_len
                + string_index.len()
                + global_subr_index.len();
            let mut tail = Vec::new();

            layout.char_strings = offset;
            offset += char_strings_index.len();
            tail.extend_from_slice(&char_strings_index);

            if let Some(charset) = &self.charset {
                layout.charset = Some(offset);
                offset += charset.len();
                tail.extend_from_slice(charset);
            }

            if let Some(private_dict) = &self.private_dict {
                let private = private_dict_with_subrs(private_dict, self.local_subrs.is_some());
                layout.private = Some((private.len(), offset));
                offset += private.len();
                tail.extend_from_slice(&private);
                if let Some(local_subrs) = &self.local_subrs {
                    let subrs = index(local_subrs);
                    offset += subrs.len();
                    tail.extend_from_slice(&subrs);
                }
            }

            if let Some(fd_select) = &self.fd_select {
                layout.fd_select = Some(offset);
                offset += fd_select.len();
                tail.extend_from_slice(fd_select);
            }

            if let Some(font_dicts) = &self.font_dicts {
                // Each Font DICT is `size offset Private`, 11 bytes
                let fd_array_len = index(&vec![[0u8; 11]; font_dicts.len()]).len();
                layout.fd_array = Some(offset);
                let mut private_offset = offset + fd_array_len;
                let mut dicts = Vec::new();
                let mut privates = Vec::new();
                for font_dict in font_dicts {
                    let private = private_dict_with_subrs(
                        &font_dict.private_dict,
                        font_dict.local_subrs.is_some(),
                    );
                    dicts.push(convert(&[
                        CffType::Offset(private.len() as i32),
                        CffType::Offset(private_offset as i32),
                        CffType::Operator(18),
                    ]));
                    private_offset += private.len();
                    privates.extend_from_slice(&private);
                    if let Some(local_subrs) = &font_dict.local_subrs {
                        let subrs = index(local_subrs);
                        private_offset += subrs.len();
                        privates.extend_from_slice(&subrs);
                    }
                }
                tail.extend_from_slice(&index(&dicts));
                tail.extend_from_slice(&privates);
            }

            let top_dict = self.top_dict(&layout);
            let mut data = header.to_vec();
            data.extend_from_slice(&name_index);
            data.extend_from_slice(&index(&vec![top_dict; self.names.len()]));
            data.extend_from_slice(&string_index);
            data.extend_from_slice(&global_subr_index);
            data.extend_from_slice(&tail);
            data
        }

        fn top_dict(&self, layout: &Layout) -> Vec<u8> {
            let mut dict = self.top_dict_prefix.clone();
            dict.extend(convert(&[
                CffType::Offset(layout.char_strings as i32),
                CffType::Operator(17),
            ]));
            if self.charset.is_some() {
                dict.extend(convert(&[
                    CffType::Offset(layout.charset.unwrap_or(0) as i32),
                    CffType::Operator(15),
                ]));
            }
            if self.private_dict.is_some() {
                let (size, offset) = layout.private.unwrap_or((0, 0));
                dict.extend(convert(&[
                    CffType::Offset(size as i32),
                    CffType::Offset(offset as i32),
                    CffType::Operator(18),
                ]));
            }
            if self.fd_select.is_some() {
                dict.extend(convert(&[
                    CffType::Offset(layout.fd_select.unwrap_or(0) as i32),
                    CffType::Operator2(37),
                ]));
            }
            if self.font_dicts.is_some() {
                dict.extend(convert(&[
                    CffType::Offset(layout.fd_array.unwrap_or(0) as i32),
                    CffType::Operator2(36),
                ]));
            }
            dict.extend_from_slice(&self.top_dict_suffix);
            dict
        }
    }

    #[derive(Default)]
    struct Layout {
        char_strings: usize,
        charset: Option<usize>,
        private: Option<(usize, usize)>,
        fd_select: Option<usize>,
        fd_array: Option<usize>,
    }

    /// Appends a Subrs operator pointing just past the end of the DICT, if required.
    fn private_dict_with_subrs(private_dict: &[u8], has_subrs: bool) -> Vec<u8> {
        let mut dict = private_dict.to_vec();
        if has_subrs {
            // Subrs is 6 bytes: the 5 byte offset plus the operator
            let len = dict.len() + 6;
            dict.extend(convert(&[CffType::Offset(len as i32), CffType::Operator(19)]));
        }
        dict
    }
}
