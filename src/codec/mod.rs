//! The shared instruction codec: the bit-accurate mapping between the
//! 68000's machine-code word format and its symbolic form.  The assembler
//! uses the encoding half ([`encode_ea`] and the size-field tables); the
//! disassembler and emulator consume the decoding half
//! ([`decode_instruction`] and [`decode_ea`]).

use crate::isa::{
    MODE_ADDR, MODE_ADDR_DISP, MODE_ADDR_IND, MODE_ADDR_INDEX,
    MODE_ADDR_POST_INC, MODE_ADDR_PRE_DEC, MODE_DATA, MODE_OTHER,
    REG_ABS_LONG, REG_ABS_SHORT, REG_IMMEDIATE, REG_PC_DISP, REG_PC_INDEX,
    Size,
};
use byteorder::{BigEndian, ByteOrder};
use std::fmt;

mod decode;

pub use decode::{Class, Decoded, decode_instruction};

//===========================================================================//

/// The extension words of a single effective address: zero, one, or two
/// 16-bit words, stored inline (no instruction needs more than two per
/// operand, so the heap is never touched on this path).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ExtWords {
    words: [u16; 2],
    len: u8,
}

impl ExtWords {
    /// Returns an empty extension-word list.
    pub fn new() -> ExtWords {
        ExtWords::default()
    }

    /// Returns a list holding a single extension word.
    pub fn one(word: u16) -> ExtWords {
        ExtWords { words: [word, 0], len: 1 }
    }

    /// Returns a list holding two extension words, high word first.
    pub fn two(hi: u16, lo: u16) -> ExtWords {
        ExtWords { words: [hi, lo], len: 2 }
    }

    /// Splits a 32-bit value into two extension words, high word first.
    pub fn long(value: u32) -> ExtWords {
        ExtWords::two((value >> 16) as u16, value as u16)
    }

    /// Appends an extension word.  No EA carries more than two.
    pub fn push(&mut self, word: u16) {
        debug_assert!(self.len < 2);
        self.words[usize::from(self.len)] = word;
        self.len += 1;
    }

    /// Returns the number of extension words.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Returns true if there are no extension words.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the extension words as a slice.
    pub fn as_slice(&self) -> &[u16] {
        &self.words[..usize::from(self.len)]
    }
}

impl<'a> IntoIterator for &'a ExtWords {
    type Item = &'a u16;
    type IntoIter = std::slice::Iter<'a, u16>;

    fn into_iter(self) -> std::slice::Iter<'a, u16> {
        self.as_slice().iter()
    }
}

//===========================================================================//

/// Which encodings a pending label operand may collapse to once the label's
/// address is known.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LabelForm {
    /// A bare label: PC-relative when the displacement fits in 16 bits,
    /// absolute long otherwise.
    Auto,
    /// An explicit `label(pc)` or `(label,pc)` operand; the displacement
    /// must fit.
    PcRelative,
    /// A label in a position that requires the absolute long form
    /// (`jmp`/`jsr` targets, explicit `(xxx).l` syntax).
    AbsoluteLong,
}

/// A label reference inside an operand that has not been resolved to an
/// address yet.  An operand carrying one of these must be rewritten before
/// encoding; it is a codec error for it to reach [`encode_ea`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingLabel {
    /// The label name, canonically lowercased.
    pub name: String,
    /// The encodings the resolver may choose between.
    pub form: LabelForm,
}

//===========================================================================//

/// A parsed instruction operand: an addressing mode, a register number, and
/// the extension words the mode contributes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Operand {
    /// The 3-bit addressing mode.
    pub mode: u16,
    /// The 3-bit register field (a submode selector when `mode` is 7).
    pub reg: u16,
    /// The extension words this operand contributes to the instruction tail.
    pub ext: ExtWords,
    /// The source text this operand was parsed from.
    pub raw: String,
    /// A still-unresolved label reference, if any.
    pub label: Option<PendingLabel>,
}

impl Operand {
    /// Returns true if this operand is an immediate constant.
    pub fn is_immediate(&self) -> bool {
        self.mode == MODE_OTHER && self.reg == REG_IMMEDIATE
    }

    /// Returns true if this operand addresses memory (anything other than a
    /// register-direct or immediate form).
    pub fn is_memory(&self) -> bool {
        match self.mode {
            MODE_DATA | MODE_ADDR => false,
            MODE_OTHER => self.reg != REG_IMMEDIATE,
            _ => true,
        }
    }
}

//===========================================================================//
// Size-field tables

/// Returns the size bits for dual-operand instructions (ADD, SUB, AND, OR,
/// CMP, TST) and the single-operand group (CLR, NEG, NEGX, NOT): byte=00,
/// word=01, long=10 in bits 6-7.
pub fn size_bits(size: Size) -> u16 {
    match size {
        Size::Byte => 0x0000,
        Size::Word => 0x0040,
        Size::Long => 0x0080,
    }
}

/// Returns the size bits for address arithmetic (ADDA, SUBA, CMPA):
/// word=011, long=111 in bits 6-8.  Byte is not a legal size here.
pub fn size_bits_addr(size: Size) -> Option<u16> {
    match size {
        Size::Byte => None,
        Size::Word => Some(0x00C0),
        Size::Long => Some(0x01C0),
    }
}

/// Returns the size bits for the general MOVE: byte=01, word=11, long=10 in
/// bits 12-13.  The non-monotonic order is the hardware's, not a mistake.
pub fn move_size_bits(size: Size) -> u16 {
    match size {
        Size::Byte => 0x1000,
        Size::Word => 0x3000,
        Size::Long => 0x2000,
    }
}

/// Returns the count bits for an immediate shift/rotate: 1..7 encoded
/// as-is in bits 9-11, 8 encoded as 0.
pub fn shift_count_bits(count: i64) -> u16 {
    debug_assert!((1..=8).contains(&count));
    (((count % 8) as u16) & 7) << 9
}

//===========================================================================//

/// Encodes an operand into its 6-bit EA field plus extension words.
///
/// Fails if the operand still carries an unresolved label, or if its mode
/// is one of the assembler-internal sentinels that must never reach
/// encoding.
pub fn encode_ea(op: &Operand) -> Result<(u16, ExtWords), String> {
    if let Some(pending) = &op.label {
        return Err(format!(
            "unresolved label '{}' reached encoding",
            pending.name
        ));
    }
    match op.mode {
        MODE_DATA | MODE_ADDR | MODE_ADDR_IND | MODE_ADDR_POST_INC
        | MODE_ADDR_PRE_DEC => {
            Ok(((op.mode << 3) | op.reg, ExtWords::new()))
        }
        MODE_ADDR_DISP | MODE_ADDR_INDEX => {
            Ok(((op.mode << 3) | op.reg, op.ext))
        }
        MODE_OTHER => match op.reg {
            REG_ABS_SHORT | REG_ABS_LONG | REG_PC_INDEX | REG_IMMEDIATE => {
                Ok(((MODE_OTHER << 3) | op.reg, op.ext))
            }
            REG_PC_DISP => {
                // PC-relative always carries exactly one displacement word;
                // a label placeholder leaves it to be patched.
                let ext = if op.ext.is_empty() {
                    ExtWords::one(0)
                } else {
                    ExtWords::one(op.ext.as_slice()[0])
                };
                Ok(((MODE_OTHER << 3) | REG_PC_DISP, ext))
            }
            _ => Err(format!("invalid mode-7 submode: {}", op.reg)),
        },
        _ => Err(format!("unsupported addressing mode: {}", op.mode)),
    }
}

//===========================================================================//

/// Decodes a 6-bit EA field into operand text, reading extension words from
/// `tail` starting at `pos`.  `size` is the 2-bit size field of the
/// instruction (0=byte, 1=word, 2=long), which governs how many words an
/// immediate consumes.  Returns the text and the number of tail bytes
/// consumed.  Truncated tails yield `?` placeholders and consume nothing.
pub fn decode_ea(
    ea: u16,
    tail: &[u8],
    pos: usize,
    size: u16,
) -> (String, usize) {
    let mode = (ea >> 3) & 7;
    let reg = ea & 7;
    match mode {
        0 => (format!("d{reg}"), 0),
        1 => (format!("a{reg}"), 0),
        2 => (format!("(a{reg})"), 0),
        3 => (format!("(a{reg})+"), 0),
        4 => (format!("-(a{reg})"), 0),
        5 => {
            if pos + 2 > tail.len() {
                return (format!("(?,a{reg})"), 0);
            }
            let disp = BigEndian::read_u16(&tail[pos..]) as i16;
            (format!("({},a{reg})", format_disp16(disp)), 2)
        }
        6 => {
            if pos + 2 > tail.len() {
                return (format!("(?,a{reg},x?)"), 0);
            }
            let ext = BigEndian::read_u16(&tail[pos..]);
            let (disp, index) = brief_extension(ext);
            (format!("({disp},a{reg},{index})"), 2)
        }
        _ => match reg {
            0 => {
                if pos + 2 > tail.len() {
                    return ("(?.w)".to_string(), 0);
                }
                let addr = BigEndian::read_u16(&tail[pos..]);
                (format!("${addr:x}.w"), 2)
            }
            1 => {
                if pos + 4 > tail.len() {
                    return ("(?.l)".to_string(), 0);
                }
                let addr = BigEndian::read_u32(&tail[pos..]);
                (format!("${addr:x}.l"), 4)
            }
            2 => {
                if pos + 2 > tail.len() {
                    return ("(?,pc)".to_string(), 0);
                }
                let disp = BigEndian::read_u16(&tail[pos..]) as i16;
                (format!("({},pc)", format_disp16(disp)), 2)
            }
            3 => {
                if pos + 2 > tail.len() {
                    return ("(?,pc,xn)".to_string(), 0);
                }
                let ext = BigEndian::read_u16(&tail[pos..]);
                let (disp, index) = brief_extension(ext);
                (format!("({disp},pc,{index})"), 2)
            }
            4 => read_immediate(tail, pos, size),
            _ => (format!("(ea mode={mode} reg={reg})"), 0),
        },
    }
}

/// Splits a brief extension word into its displacement text and index
/// register text.  The top nibble selects data-vs-address register and the
/// `.w`/`.l` size flag.
fn brief_extension(ext: u16) -> (String, String) {
    let disp = (ext & 0xFF) as i8;
    let index = (ext >> 12) & 7;
    let size_char = if (ext & 0x0800) != 0 { 'l' } else { 'w' };
    let reg_type = if (ext & 0x8000) != 0 { 'a' } else { 'd' };
    (format_disp8(disp), format!("{reg_type}{index}.{size_char}"))
}

/// Reads immediate data from the tail based on the 2-bit size field.  Byte
/// immediates occupy the low half of a single word.
pub fn read_immediate(tail: &[u8], pos: usize, size: u16) -> (String, usize) {
    match size {
        0 => {
            if pos + 2 > tail.len() {
                return ("#<trunc>".to_string(), 0);
            }
            let value = tail[pos + 1] as i8;
            (format!("#{value}"), 2)
        }
        1 => {
            if pos + 2 > tail.len() {
                return ("#<trunc>".to_string(), 0);
            }
            let value = BigEndian::read_u16(&tail[pos..]) as i16;
            if (0..=255).contains(&value) {
                (format!("#{value}"), 2)
            } else {
                (format!("#${:x}", value as u16), 2)
            }
        }
        2 => {
            if pos + 4 > tail.len() {
                return ("#<trunc>".to_string(), 0);
            }
            let value = BigEndian::read_u32(&tail[pos..]);
            (format!("#${value:x}"), 4)
        }
        _ => ("#?".to_string(), 0),
    }
}

fn format_disp8(value: i8) -> String {
    if (-9..=9).contains(&value) {
        format!("{value}")
    } else {
        format!("${:x}", value as u8)
    }
}

fn format_disp16(value: i16) -> String {
    if (-9..=9).contains(&value) {
        format!("{value}")
    } else {
        format!("${:x}", value as u16)
    }
}

/// Formats a branch displacement with an explicit sign.
pub(crate) fn format_branch_disp(value: i64) -> String {
    if value >= 0 {
        format!("+{value}")
    } else {
        format!("{value}")
    }
}

/// Converts a register mask into its canonical list form, e.g.
/// `d0-d3/a0/a6`.  Bits 0-7 are D0-D7 and bits 8-15 are A0-A7.
pub(crate) fn movem_mask_to_list(mask: u16) -> String {
    let mut parts = Vec::new();
    for (prefix, base) in [('d', 0u16), ('a', 8)] {
        let regs: Vec<u16> =
            (0..8).filter(|i| mask & (1 << (base + i)) != 0).collect();
        let mut i = 0;
        while i < regs.len() {
            let start = regs[i];
            let mut end = start;
            while i + 1 < regs.len() && regs[i + 1] == end + 1 {
                end = regs[i + 1];
                i += 1;
            }
            if start == end {
                parts.push(format!("{prefix}{start}"));
            } else {
                parts.push(format!("{prefix}{start}-{prefix}{end}"));
            }
            i += 1;
        }
    }
    parts.join("/")
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(&self.raw)
    }
}

//===========================================================================//

#[cfg(test)]
mod tests {
    use super::{
        ExtWords, Operand, decode_ea, encode_ea, movem_mask_to_list,
        move_size_bits, shift_count_bits, size_bits, size_bits_addr,
    };
    use crate::isa::{MODE_OTHER, REG_PC_DISP, Size};

    fn ea_text(ea: u16, tail: &[u8], size: u16) -> (String, usize) {
        decode_ea(ea, tail, 0, size)
    }

    #[test]
    fn decode_register_modes() {
        assert_eq!(ea_text(0o03, &[], 1), ("d3".to_string(), 0));
        assert_eq!(ea_text(0o12, &[], 1), ("a2".to_string(), 0));
        assert_eq!(ea_text(0o20, &[], 1), ("(a0)".to_string(), 0));
        assert_eq!(ea_text(0o31, &[], 1), ("(a1)+".to_string(), 0));
        assert_eq!(ea_text(0o46, &[], 1), ("-(a6)".to_string(), 0));
    }

    #[test]
    fn decode_displacement_modes() {
        assert_eq!(
            ea_text(0o56, &[0xFF, 0xFC], 1),
            ("(-4,a6)".to_string(), 2)
        );
        assert_eq!(
            ea_text(0o60, &[0x20, 0x08], 1),
            ("(8,a0,d2.w)".to_string(), 2)
        );
        assert_eq!(
            ea_text(0o60, &[0xA8, 0x10], 1),
            ("($10,a0,a2.l)".to_string(), 2)
        );
    }

    #[test]
    fn decode_mode_seven() {
        assert_eq!(
            ea_text(0o70, &[0x12, 0x34], 1),
            ("$1234.w".to_string(), 2)
        );
        assert_eq!(
            ea_text(0o71, &[0x00, 0x12, 0x34, 0x56], 1),
            ("$123456.l".to_string(), 4)
        );
        assert_eq!(
            ea_text(0o72, &[0x00, 0x10], 1),
            ("($10,pc)".to_string(), 2)
        );
        assert_eq!(
            ea_text(0o74, &[0x00, 0x2A], 1),
            ("#42".to_string(), 2)
        );
        assert_eq!(
            ea_text(0o74, &[0xDE, 0xAD, 0xBE, 0xEF], 2),
            ("#$deadbeef".to_string(), 4)
        );
    }

    #[test]
    fn decode_truncated_tails() {
        assert_eq!(ea_text(0o56, &[], 1), ("(?,a6)".to_string(), 0));
        assert_eq!(ea_text(0o71, &[0x00], 1), ("(?.l)".to_string(), 0));
        assert_eq!(ea_text(0o74, &[0x12], 2), ("#<trunc>".to_string(), 0));
    }

    #[test]
    fn encode_round_trips_through_decode() {
        let op = Operand {
            mode: MODE_OTHER,
            reg: REG_PC_DISP,
            ext: ExtWords::one(0x0010),
            raw: "($10,pc)".to_string(),
            label: None,
        };
        let (bits, ext) = encode_ea(&op).unwrap();
        assert_eq!(bits, 0o72);
        assert_eq!(ext.as_slice(), &[0x0010]);
        let (text, used) = decode_ea(bits, &[0x00, 0x10], 0, 1);
        assert_eq!(text, "($10,pc)");
        assert_eq!(used, 2);
    }

    #[test]
    fn size_field_layouts() {
        assert_eq!(size_bits(Size::Byte), 0x0000);
        assert_eq!(size_bits(Size::Word), 0x0040);
        assert_eq!(size_bits(Size::Long), 0x0080);
        assert_eq!(size_bits_addr(Size::Byte), None);
        assert_eq!(size_bits_addr(Size::Word), Some(0x00C0));
        assert_eq!(size_bits_addr(Size::Long), Some(0x01C0));
        assert_eq!(move_size_bits(Size::Byte), 0x1000);
        assert_eq!(move_size_bits(Size::Word), 0x3000);
        assert_eq!(move_size_bits(Size::Long), 0x2000);
        assert_eq!(shift_count_bits(1), 1 << 9);
        assert_eq!(shift_count_bits(7), 7 << 9);
        assert_eq!(shift_count_bits(8), 0);
    }

    #[test]
    fn movem_list_formatting() {
        assert_eq!(movem_mask_to_list(0x003F), "d0-d5");
        assert_eq!(movem_mask_to_list(0x4109), "d0/d3/a0/a6");
        assert_eq!(movem_mask_to_list(0xFFFF), "d0-d7/a0-a7");
    }
}
