//! services/bot/src/adapters/extract/doc.rs
//!
//! Text from legacy compound-file word-processing documents.
//!
//! The main text lives in the `WordDocument` stream. Its file information
//! block (FIB) points at the piece table inside the `0Table`/`1Table` stream;
//! each piece is a run of characters stored either as 8-bit cp1252
//! ("compressed") or as UTF-16LE.

use std::io::{Cursor, Read, Seek};

const WORD_IDENT: u16 = 0xA5EC;
const FLAG_ENCRYPTED: u16 = 0x0100;
const FLAG_TABLE_ONE: u16 = 0x0200;
const FC_COMPRESSED: u32 = 0x4000_0000;
const FC_MASK: u32 = 0x3FFF_FFFF;
/// Position of the fcClx/lcbClx pair within FibRgFcLcb97.
const CLX_PAIR_INDEX: usize = 33;

#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("not a compound document: {0}")]
    Container(std::io::Error),
    #[error("missing stream {0}")]
    MissingStream(&'static str),
    #[error("not a word document (identifier {0:#06x})")]
    NotWord(u16),
    #[error("document is encrypted")]
    Encrypted,
    #[error("corrupt document: {0}")]
    Corrupt(&'static str),
    #[error("unable to extract text")]
    Empty,
}

fn u16_at(buf: &[u8], offset: usize) -> Result<u16, DocError> {
    buf.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(DocError::Corrupt("truncated structure"))
}

fn u32_at(buf: &[u8], offset: usize) -> Result<u32, DocError> {
    buf.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(DocError::Corrupt("truncated structure"))
}

fn read_stream<F: Read + Seek>(
    file: &mut cfb::CompoundFile<F>,
    name: &'static str,
) -> Result<Option<Vec<u8>>, DocError> {
    let path = format!("/{}", name);
    if !file.is_stream(&path) {
        return Ok(None);
    }
    let mut stream = file.open_stream(&path).map_err(DocError::Container)?;
    let mut data = Vec::new();
    stream.read_to_end(&mut data).map_err(DocError::Container)?;
    Ok(Some(data))
}

/// The parts of the FIB the text reader needs.
#[derive(Debug)]
struct Fib {
    table_stream: &'static str,
    ccp_text: u32,
    fc_min: u32,
    fc_mac: u32,
    fc_clx: u32,
    lcb_clx: u32,
}

impl Fib {
    fn parse(word: &[u8]) -> Result<Self, DocError> {
        let ident = u16_at(word, 0x00)?;
        if ident != WORD_IDENT {
            return Err(DocError::NotWord(ident));
        }
        let flags = u16_at(word, 0x0A)?;
        if flags & FLAG_ENCRYPTED != 0 {
            return Err(DocError::Encrypted);
        }
        let table_stream = if flags & FLAG_TABLE_ONE != 0 {
            "1Table"
        } else {
            "0Table"
        };

        // FibBase is followed by csw, fibRgW, cslw, fibRgLw, cbRgFcLcb, fibRgFcLcb.
        let csw = u16_at(word, 0x20)? as usize;
        let cslw_offset = 0x22 + csw * 2;
        let cslw = u16_at(word, cslw_offset)? as usize;
        let rg_lw = cslw_offset + 2;
        let ccp_text = u32_at(word, rg_lw + 12)?;

        let cb_rg_fc_lcb_offset = rg_lw + cslw * 4;
        let cb_rg_fc_lcb = u16_at(word, cb_rg_fc_lcb_offset)? as usize;
        let rg_fc_lcb = cb_rg_fc_lcb_offset + 2;
        let (fc_clx, lcb_clx) = if cb_rg_fc_lcb > CLX_PAIR_INDEX {
            let pair = rg_fc_lcb + CLX_PAIR_INDEX * 8;
            (u32_at(word, pair)?, u32_at(word, pair + 4)?)
        } else {
            (0, 0)
        };

        Ok(Self {
            table_stream,
            ccp_text,
            fc_min: u32_at(word, 0x18)?,
            fc_mac: u32_at(word, 0x1C)?,
            fc_clx,
            lcb_clx,
        })
    }
}

/// One run of characters from the piece table.
#[derive(Debug, PartialEq)]
struct Piece {
    cp_start: u32,
    cp_end: u32,
    fc: u32,
}

impl Piece {
    fn is_compressed(&self) -> bool {
        self.fc & FC_COMPRESSED != 0
    }
}

/// Walks the CLX: skips property modifiers (`Prc`) up to the piece table (`Pcdt`).
fn parse_clx(clx: &[u8]) -> Result<Vec<Piece>, DocError> {
    let mut pos = 0;
    while pos < clx.len() {
        match clx[pos] {
            0x01 => {
                let cb = u16_at(clx, pos + 1)? as i16;
                if cb < 0 {
                    return Err(DocError::Corrupt("negative property modifier size"));
                }
                pos += 3 + cb as usize;
            }
            0x02 => {
                let lcb = u32_at(clx, pos + 1)? as usize;
                let start = pos + 5;
                let plc = clx
                    .get(start..start + lcb)
                    .ok_or(DocError::Corrupt("truncated piece table"))?;
                return parse_plc_pcd(plc);
            }
            _ => return Err(DocError::Corrupt("unknown CLX entry")),
        }
    }
    Err(DocError::Corrupt("piece table not found"))
}

fn parse_plc_pcd(plc: &[u8]) -> Result<Vec<Piece>, DocError> {
    if plc.len() < 4 || (plc.len() - 4) % 12 != 0 {
        return Err(DocError::Corrupt("piece table has an invalid size"));
    }
    let count = (plc.len() - 4) / 12;
    let pcd_base = (count + 1) * 4;
    (0..count)
        .map(|i| {
            Ok(Piece {
                cp_start: u32_at(plc, i * 4)?,
                cp_end: u32_at(plc, (i + 1) * 4)?,
                fc: u32_at(plc, pcd_base + i * 8 + 2)?,
            })
        })
        .collect()
}

const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{FFFD}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{FFFD}', '\u{017D}', '\u{FFFD}',
    '\u{FFFD}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{FFFD}', '\u{017E}', '\u{0178}',
];

fn decode_cp1252(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize],
            _ => b as char,
        })
        .collect()
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn read_pieces(word: &[u8], pieces: &[Piece], ccp_text: u32) -> Result<String, DocError> {
    let mut text = String::new();
    for piece in pieces {
        if piece.cp_start >= ccp_text || piece.cp_end <= piece.cp_start {
            continue;
        }
        let chars = (piece.cp_end.min(ccp_text) - piece.cp_start) as usize;
        if piece.is_compressed() {
            let offset = ((piece.fc & FC_MASK) / 2) as usize;
            let bytes = word
                .get(offset..offset + chars)
                .ok_or(DocError::Corrupt("piece outside the document stream"))?;
            text.push_str(&decode_cp1252(bytes));
        } else {
            let offset = (piece.fc & FC_MASK) as usize;
            let bytes = word
                .get(offset..offset + chars * 2)
                .ok_or(DocError::Corrupt("piece outside the document stream"))?;
            text.push_str(&decode_utf16le(bytes));
        }
    }
    Ok(text)
}

/// Maps paragraph, cell and page marks, keeps field results and drops
/// field instructions and any other control characters.
fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    // One entry per open field: `true` while still inside its instructions.
    let mut fields: Vec<bool> = Vec::new();

    for ch in raw.chars() {
        match ch {
            '\u{13}' => {
                fields.push(true);
                continue;
            }
            '\u{14}' => {
                if let Some(in_instructions) = fields.last_mut() {
                    *in_instructions = false;
                }
                continue;
            }
            '\u{15}' => {
                fields.pop();
                continue;
            }
            _ => {}
        }
        if fields.iter().any(|in_instructions| *in_instructions) {
            continue;
        }
        match ch {
            '\r' | '\u{0B}' | '\u{0C}' | '\n' => out.push('\n'),
            '\u{07}' | '\t' => out.push('\t'),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

pub fn extract_doc(bytes: &[u8]) -> Result<String, DocError> {
    let mut file = cfb::CompoundFile::open(Cursor::new(bytes)).map_err(DocError::Container)?;
    let word =
        read_stream(&mut file, "WordDocument")?.ok_or(DocError::MissingStream("WordDocument"))?;
    let fib = Fib::parse(&word)?;

    let raw = if fib.lcb_clx > 0 {
        let table = read_stream(&mut file, fib.table_stream)?
            .ok_or(DocError::MissingStream(fib.table_stream))?;
        let start = fib.fc_clx as usize;
        let clx = table
            .get(start..start + fib.lcb_clx as usize)
            .ok_or(DocError::Corrupt("CLX outside the table stream"))?;
        read_pieces(&word, &parse_clx(clx)?, fib.ccp_text)?
    } else {
        // Files without a piece table store the text contiguously as 8-bit.
        let start = fib.fc_min as usize;
        let end = (fib.fc_mac as usize).min(start + fib.ccp_text as usize);
        let bytes = word
            .get(start..end)
            .ok_or(DocError::Corrupt("text range outside the document stream"))?;
        decode_cp1252(bytes)
    };

    let text = clean_text(&raw);
    if text.is_empty() {
        return Err(DocError::Empty);
    }
    Ok(text)
}
