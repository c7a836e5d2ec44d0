use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::decode::CodecError;

/// Characters addressable by the 5-bit code stream.
pub const CHAR_TABLE_LEN: usize = 60;

const DIRECT_CODES: u8 = 30;
const SHIFT_CODE: u8 = 30;
const END_CODE: u8 = 31;

/// The compressed text area of a map block, as stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StringsArea {
    pub char_table: Vec<u8>,
    /// Start of each string, relative to the start of the area.
    pub string_offsets: Vec<u16>,
    /// The whole area, header included.
    pub data: Vec<u8>,
}

struct CodeReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> CodeReader<'a> {
    fn new(data: &'a [u8], byte_offset: usize) -> Self {
        Self {
            data,
            bit_pos: byte_offset * 8,
        }
    }

    fn next_code(&mut self) -> Option<u8> {
        if self.bit_pos + 5 > self.data.len() * 8 {
            return None;
        }
        let mut code = 0u8;
        for _ in 0..5 {
            let byte = self.data[self.bit_pos / 8];
            let bit = (byte >> (7 - (self.bit_pos % 8))) & 1;
            code = (code << 1) | bit;
            self.bit_pos += 1;
        }
        Some(code)
    }
}

impl StringsArea {
    pub fn parse(raw: &[u8]) -> Result<StringsArea, CodecError> {
        let header_len = CHAR_TABLE_LEN + 2;
        if raw.len() < header_len {
            return Err(CodecError::OutOfRange {
                what: "strings area header",
                start: 0,
                end: header_len,
                len: raw.len(),
            });
        }

        let count = LittleEndian::read_u16(&raw[CHAR_TABLE_LEN..header_len]) as usize;
        let table_end = header_len + count * 2;
        if table_end > raw.len() {
            return Err(CodecError::OutOfRange {
                what: "strings offset table",
                start: header_len,
                end: table_end,
                len: raw.len(),
            });
        }

        let mut string_offsets = Vec::with_capacity(count);
        for i in 0..count {
            let at = header_len + i * 2;
            let off = LittleEndian::read_u16(&raw[at..at + 2]);
            if (off as usize) < table_end || off as usize >= raw.len() {
                return Err(CodecError::OutOfRange {
                    what: "string",
                    start: off as usize,
                    end: off as usize + 1,
                    len: raw.len(),
                });
            }
            string_offsets.push(off);
        }

        Ok(StringsArea {
            char_table: raw[..CHAR_TABLE_LEN].to_vec(),
            string_offsets,
            data: raw.to_vec(),
        })
    }

    /// Expand every string of the area into raw character bytes.
    pub fn decompress(&self) -> Result<Vec<Vec<u8>>, CodecError> {
        let mut out = Vec::with_capacity(self.string_offsets.len());

        for (index, &offset) in self.string_offsets.iter().enumerate() {
            let mut reader = CodeReader::new(&self.data, offset as usize);
            let mut s = Vec::new();
            let unterminated = CodecError::UnterminatedString {
                index,
                offset: offset as usize,
            };

            loop {
                let code = reader.next_code().ok_or_else(|| unterminated.clone())?;
                match code {
                    END_CODE => break,
                    SHIFT_CODE => {
                        let shifted = reader.next_code().ok_or_else(|| unterminated.clone())?;
                        if shifted >= DIRECT_CODES {
                            return Err(CodecError::BadShiftCode {
                                index,
                                code: shifted,
                            });
                        }
                        s.push(self.char_table[(DIRECT_CODES + shifted) as usize]);
                    }
                    c => s.push(self.char_table[c as usize]),
                }
            }

            out.push(s);
        }

        Ok(out)
    }

    /// Decompressed strings as text, one entry per string.
    pub fn to_strings(&self) -> Result<Vec<String>, CodecError> {
        Ok(self
            .decompress()?
            .into_iter()
            .map(|s| String::from_utf8_lossy(&s).into_owned())
            .collect())
    }
}

struct CodeWriter {
    out: Vec<u8>,
    bit_pos: usize,
}

impl CodeWriter {
    fn push(&mut self, code: u8) {
        for i in (0..5).rev() {
            if self.bit_pos % 8 == 0 {
                self.out.push(0);
            }
            let bit = (code >> i) & 1;
            let last = self.out.len() - 1;
            self.out[last] |= bit << (7 - (self.bit_pos % 8));
            self.bit_pos += 1;
        }
    }
}

/// Build a strings area holding `strings`, encoded against `char_table`.
pub fn compress_strings_area(
    char_table: &[u8; CHAR_TABLE_LEN],
    strings: &[&str],
) -> Result<Vec<u8>, CodecError> {
    let header_len = CHAR_TABLE_LEN + 2 + strings.len() * 2;
    let mut streams: Vec<Vec<u8>> = Vec::with_capacity(strings.len());

    for s in strings {
        let mut writer = CodeWriter {
            out: Vec::new(),
            bit_pos: 0,
        };
        for ch in s.bytes() {
            let idx = char_table
                .iter()
                .position(|&c| c == ch)
                .ok_or(CodecError::UnencodableChar { ch: ch as char })? as u8;
            if idx < DIRECT_CODES {
                writer.push(idx);
            } else {
                writer.push(SHIFT_CODE);
                writer.push(idx - DIRECT_CODES);
            }
        }
        writer.push(END_CODE);
        streams.push(writer.out);
    }

    let mut area = Vec::with_capacity(header_len + streams.iter().map(Vec::len).sum::<usize>());
    area.extend_from_slice(char_table);
    area.extend_from_slice(&(strings.len() as u16).to_le_bytes());

    let mut next = header_len;
    for stream in &streams {
        area.extend_from_slice(&(next as u16).to_le_bytes());
        next += stream.len();
    }
    for stream in &streams {
        area.extend_from_slice(stream);
    }

    Ok(area)
}
