//! Operand and constant parsing.  The operand grammar is line-oriented
//! with no nesting, so a handwritten scanner over the lowercased text is
//! enough; patterns are tried from most specific to most general to avoid
//! ambiguity.

use super::Assembler;
use crate::codec::{ExtWords, LabelForm, Operand, PendingLabel};
use crate::isa::{
    MODE_ADDR, MODE_ADDR_DISP, MODE_ADDR_IND, MODE_ADDR_INDEX,
    MODE_ADDR_POST_INC, MODE_ADDR_PRE_DEC, MODE_DATA, MODE_OTHER,
    REG_ABS_LONG, REG_ABS_SHORT, REG_IMMEDIATE, REG_PC_DISP, REG_PC_INDEX,
};

//===========================================================================//

/// Sentinel register value for the `sr`/`ccr`/`usp` operands.  Instructions
/// carrying one take the dedicated status-register path; the sentinel must
/// never reach EA encoding.
pub(crate) const REG_STATUS: u16 = 5;

//===========================================================================//

/// Splits operand text on top-level commas, ignoring commas inside
/// parentheses.
pub(crate) fn split_operands(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut depth = 0i32;
    let mut last = 0;
    for (index, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                result.push(text[last..index].trim().to_string());
                last = index + 1;
            }
            _ => {}
        }
    }
    result.push(text[last..].trim().to_string());
    result
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses `d0`..`d7`, `a0`..`a7`, or `sp` into a (mode, register) pair.
fn parse_register(s: &str) -> Option<(u16, u16)> {
    if s == "sp" {
        return Some((MODE_ADDR, 7));
    }
    let mut chars = s.chars();
    let kind = chars.next()?;
    let digit = chars.next()?;
    if chars.next().is_some() || !('0'..='7').contains(&digit) {
        return None;
    }
    let reg = digit as u16 - '0' as u16;
    match kind {
        'd' => Some((MODE_DATA, reg)),
        'a' => Some((MODE_ADDR, reg)),
        _ => None,
    }
}

/// Parses an index specifier like `d2.w` or `a3.l` into a brief-extension
/// top nibble.
fn parse_index_spec(s: &str) -> Option<u16> {
    let (reg_text, size_text) = s.split_once('.')?;
    let (mode, reg) = parse_register(reg_text)?;
    let mut ext = reg << 12;
    if mode == MODE_ADDR {
        ext |= 0x8000;
    }
    match size_text {
        "w" => {}
        "l" => ext |= 0x0800,
        _ => return None,
    }
    Some(ext)
}

fn pending(raw: &str, name: &str, form: LabelForm, reg: u16) -> Operand {
    Operand {
        mode: MODE_OTHER,
        reg,
        ext: ExtWords::new(),
        raw: raw.to_string(),
        label: Some(PendingLabel { name: name.to_string(), form }),
    }
}

//===========================================================================//

impl Assembler {
    /// Parses a single operand.  The scanner tries the status registers,
    /// then register and indirect forms, then the PC-relative, absolute,
    /// and immediate forms, and finally falls back to a bare label.
    pub(crate) fn parse_operand(&self, text: &str) -> Result<Operand, String> {
        let raw = text.trim();
        let s = raw.to_ascii_lowercase();

        if matches!(s.as_str(), "sr" | "ccr" | "usp") {
            return Ok(Operand {
                mode: MODE_OTHER,
                reg: REG_STATUS,
                ext: ExtWords::new(),
                raw: s,
                label: None,
            });
        }

        // #<data> — parsed from the original text so that character
        // literals keep their case.
        if s.starts_with('#') {
            let value = self.parse_constant(&raw[1..])?;
            let ext = if !(-32768..=0xFFFF).contains(&value) {
                ExtWords::long(value as u32)
            } else {
                ExtWords::one(value as u16)
            };
            return Ok(Operand {
                mode: MODE_OTHER,
                reg: REG_IMMEDIATE,
                ext,
                raw: raw.to_string(),
                label: None,
            });
        }

        // Dn / An / sp
        if let Some((mode, reg)) = parse_register(&s) {
            return Ok(Operand {
                mode,
                reg,
                ext: ExtWords::new(),
                raw: s,
                label: None,
            });
        }

        // -(An)
        if let Some(body) = s.strip_prefix("-(") {
            if let Some(inner) = body.strip_suffix(')') {
                if let Some((MODE_ADDR, reg)) = parse_register(inner) {
                    return Ok(Operand {
                        mode: MODE_ADDR_PRE_DEC,
                        reg,
                        ext: ExtWords::new(),
                        raw: s,
                        label: None,
                    });
                }
            }
            return Err(format!("unknown operand format: {raw}"));
        }

        // (An)+
        if let Some(body) = s.strip_suffix(")+") {
            if let Some(inner) = body.strip_prefix('(') {
                if let Some((MODE_ADDR, reg)) = parse_register(inner) {
                    return Ok(Operand {
                        mode: MODE_ADDR_POST_INC,
                        reg,
                        ext: ExtWords::new(),
                        raw: s,
                        label: None,
                    });
                }
            }
            return Err(format!("unknown operand format: {raw}"));
        }

        // Absolute with explicit size: (xxx).w, (xxx).l, $xxxx.w, $xxxx.l,
        // or a label forced long: label.l / (label).l.
        for (suffix, long) in [(".w", false), (".l", true)] {
            let Some(body) = s.strip_suffix(suffix) else {
                continue;
            };
            let inner = body
                .strip_prefix('(')
                .and_then(|b| b.strip_suffix(')'))
                .unwrap_or(body);
            if let Ok(value) = self.constant_value(inner) {
                return Ok(absolute_operand(&s, value, Some(long)));
            }
            if is_identifier(inner) {
                if long {
                    return Ok(pending(
                        &s,
                        inner,
                        LabelForm::AbsoluteLong,
                        REG_ABS_LONG,
                    ));
                }
                return Err(format!(
                    "label operand cannot be absolute short: {raw}"
                ));
            }
            return Err(format!("unknown operand format: {raw}"));
        }

        // Fully parenthesized forms.
        if let Some(body) =
            s.strip_prefix('(').and_then(|b| b.strip_suffix(')'))
        {
            return self.parse_paren_operand(&s, body);
        }

        // Prefix-displacement forms: d(An), d(An,Xn.s), d(pc), d(pc,Xn.s).
        if s.ends_with(')') {
            if let Some(open) = s.find('(') {
                let head = &s[..open];
                let body = &s[open + 1..s.len() - 1];
                return self.parse_displacement_operand(&s, head, body);
            }
        }

        // A bare numeric address or symbol: short when it fits, long
        // otherwise.
        if let Ok(value) = self.constant_value(&s) {
            return Ok(absolute_operand(&s, value, None));
        }

        // A bare label, resolved to PC-relative or absolute long later.
        if is_identifier(&s) {
            return Ok(pending(&s, &s, LabelForm::Auto, REG_ABS_LONG));
        }

        Err(format!("unknown operand format: {raw}"))
    }

    /// Parses `(...)` operands: `(An)`, `(d,pc)`, `(d,An,Xn.s)`,
    /// `(d,pc,Xn.s)`, `(An,Xn.s)`, and `(pc,Xn.s)`.
    fn parse_paren_operand(
        &self,
        raw: &str,
        body: &str,
    ) -> Result<Operand, String> {
        let parts: Vec<&str> =
            body.split(',').map(|p| p.trim()).collect();
        match parts.as_slice() {
            [single] => {
                if let Some((MODE_ADDR, reg)) = parse_register(single) {
                    return Ok(Operand {
                        mode: MODE_ADDR_IND,
                        reg,
                        ext: ExtWords::new(),
                        raw: raw.to_string(),
                        label: None,
                    });
                }
                Err(format!("unknown operand format: {raw}"))
            }
            [disp, base] => {
                self.parse_based_operand(raw, disp, base, None)
            }
            [disp, base, index] => {
                self.parse_based_operand(raw, disp, base, Some(index))
            }
            _ => Err(format!("unknown operand format: {raw}")),
        }
    }

    fn parse_displacement_operand(
        &self,
        raw: &str,
        head: &str,
        body: &str,
    ) -> Result<Operand, String> {
        let parts: Vec<&str> =
            body.split(',').map(|p| p.trim()).collect();
        match parts.as_slice() {
            [base] => self.parse_based_operand(raw, head, base, None),
            [base, index] => {
                self.parse_based_operand(raw, head, base, Some(index))
            }
            _ => Err(format!("unknown operand format: {raw}")),
        }
    }

    /// The common tail of the displacement forms: a displacement (or index
    /// specifier) against an address register or the PC.
    fn parse_based_operand(
        &self,
        raw: &str,
        disp_text: &str,
        base: &str,
        index: Option<&str>,
    ) -> Result<Operand, String> {
        // `(An,Xn.s)` and `(pc,Xn.s)` have no written displacement, so the
        // base arrives in the displacement slot and the index specifier in the
        // base slot.
        let (disp_text, base, index) = if index.is_none()
            && (disp_text == "pc"
                || matches!(parse_register(disp_text), Some((MODE_ADDR, _))))
            && parse_index_spec(base).is_some()
        {
            ("", disp_text, Some(base))
        } else {
            (disp_text, base, index)
        };

        match index {
            None => {
                if base == "pc" {
                    // (d,pc) or d(pc): a constant displacement or a label.
                    if disp_text.is_empty() {
                        return Err(format!(
                            "missing displacement in {raw}"
                        ));
                    }
                    if let Ok(value) = self.constant_value(disp_text) {
                        return Ok(Operand {
                            mode: MODE_OTHER,
                            reg: REG_PC_DISP,
                            ext: ExtWords::one(value as i16 as u16),
                            raw: raw.to_string(),
                            label: None,
                        });
                    }
                    if is_identifier(disp_text) {
                        return Ok(pending(
                            raw,
                            disp_text,
                            LabelForm::PcRelative,
                            REG_PC_DISP,
                        ));
                    }
                    return Err(format!("bad displacement in {raw}"));
                }
                let Some((MODE_ADDR, reg)) = parse_register(base) else {
                    return Err(format!("unknown operand format: {raw}"));
                };
                let disp = self.constant_value(disp_text)?;
                Ok(Operand {
                    mode: MODE_ADDR_DISP,
                    reg,
                    ext: ExtWords::one(disp as i16 as u16),
                    raw: raw.to_string(),
                    label: None,
                })
            }
            Some(index_text) => {
                let Some(index_bits) = parse_index_spec(index_text) else {
                    return Err(format!("bad index register in {raw}"));
                };
                let disp = if disp_text.is_empty() {
                    0
                } else {
                    self.constant_value(disp_text)?
                };
                let ext = index_bits | u16::from(disp as i8 as u8);
                if base == "pc" {
                    return Ok(Operand {
                        mode: MODE_OTHER,
                        reg: REG_PC_INDEX,
                        ext: ExtWords::one(ext),
                        raw: raw.to_string(),
                        label: None,
                    });
                }
                let Some((MODE_ADDR, reg)) = parse_register(base) else {
                    return Err(format!("unknown operand format: {raw}"));
                };
                Ok(Operand {
                    mode: MODE_ADDR_INDEX,
                    reg,
                    ext: ExtWords::one(ext),
                    raw: raw.to_string(),
                    label: None,
                })
            }
        }
    }

    /// Converts numeric or symbolic text to a value: `$`/`0x` hex, `%`
    /// binary, `'c'` character, bare decimal; otherwise a symbol, then a
    /// label.  A leading `#` is tolerated and stripped.
    pub(crate) fn parse_constant(&self, text: &str) -> Result<i64, String> {
        match self.constant_value(text) {
            Ok(value) => Ok(value),
            Err(error) => {
                let key = text.trim().to_ascii_lowercase();
                match self.labels.get(&key) {
                    Some(&addr) => Ok(i64::from(addr)),
                    None => Err(error),
                }
            }
        }
    }

    /// Like [`Assembler::parse_constant`] but without the label fallback.
    /// Operand positions use this so that label references go through the
    /// pending-label rewrite instead of encoding a raw address.
    pub(crate) fn constant_value(&self, text: &str) -> Result<i64, String> {
        let s = text.trim();
        let s = s.strip_prefix('#').unwrap_or(s).trim();
        if s.len() >= 3 && s.starts_with('\'') && s.ends_with('\'') {
            return Ok(s.as_bytes()[1] as i64);
        }
        if let Ok(value) = self.parse_number(s) {
            return Ok(value);
        }
        let key = s.to_ascii_lowercase();
        if let Some(&value) = self.symbols.get(&key) {
            return Ok(value);
        }
        Err(format!("invalid number format: {s}"))
    }

    /// Parses a plain number with its radix prefix.
    fn parse_number(&self, s: &str) -> Result<i64, String> {
        let lowered = s.to_ascii_lowercase();
        let (digits, radix) = if let Some(rest) = lowered.strip_prefix('$') {
            (rest.to_string(), 16)
        } else if let Some(rest) = lowered.strip_prefix("0x") {
            (rest.to_string(), 16)
        } else if let Some(rest) = lowered.strip_prefix("-0x") {
            (format!("-{rest}"), 16)
        } else if let Some(rest) = lowered.strip_prefix('%') {
            (rest.to_string(), 2)
        } else {
            (lowered.clone(), 10)
        };
        i64::from_str_radix(&digits, radix)
            .map_err(|_| format!("invalid number format: {s}"))
    }
}

/// Builds an absolute operand.  With no explicit size, values that fit in
/// 16 bits take the short form.
fn absolute_operand(raw: &str, value: i64, long: Option<bool>) -> Operand {
    let long = long.unwrap_or(!(0..=0xFFFF).contains(&value));
    if long {
        Operand {
            mode: MODE_OTHER,
            reg: REG_ABS_LONG,
            ext: ExtWords::long(value as u32),
            raw: raw.to_string(),
            label: None,
        }
    } else {
        Operand {
            mode: MODE_OTHER,
            reg: REG_ABS_SHORT,
            ext: ExtWords::one(value as u16),
            raw: raw.to_string(),
            label: None,
        }
    }
}

//===========================================================================//

/// Parses a MOVEM register list (`d0-d3/a1/a6`) into a 16-bit mask with
/// D0-D7 in bits 0-7 and A0-A7 in bits 8-15.  Ranges cannot cross the
/// D/A boundary.
pub(crate) fn parse_movem_list(list: &str) -> Result<u16, String> {
    let mut mask: u16 = 0;
    for part in list.split('/') {
        let part = part.trim().to_ascii_lowercase();
        if part.is_empty() {
            continue;
        }
        if let Some((start_text, end_text)) = part.split_once('-') {
            let start_text = start_text.trim();
            let end_text = end_text.trim();
            let crosses = start_text.chars().next() != end_text.chars().next();
            if crosses {
                return Err(format!(
                    "register range cannot cross the d/a groups: {part}"
                ));
            }
            let mut start = movem_reg_index(start_text)?;
            let mut end = movem_reg_index(end_text)?;
            if start > end {
                std::mem::swap(&mut start, &mut end);
            }
            for bit in start..=end {
                mask |= 1 << bit;
            }
        } else {
            mask |= 1 << movem_reg_index(&part)?;
        }
    }
    Ok(mask)
}

/// Returns true if the text looks like a register list rather than an EA.
pub(crate) fn is_reg_list(text: &str) -> bool {
    let s = text.trim().to_ascii_lowercase();
    if s.contains('/') {
        return true;
    }
    if let Some((a, b)) = s.split_once('-') {
        return movem_reg_index(a.trim()).is_ok()
            && movem_reg_index(b.trim()).is_ok();
    }
    movem_reg_index(&s).is_ok()
}

fn movem_reg_index(reg: &str) -> Result<u16, String> {
    let err = || format!("invalid register name: {reg}");
    if reg.len() != 2 {
        return Err(err());
    }
    let number = reg[1..].parse::<u16>().map_err(|_| err())?;
    if number > 7 {
        return Err(err());
    }
    match reg.as_bytes()[0] {
        b'd' => Ok(number),
        b'a' => Ok(number + 8),
        _ => Err(err()),
    }
}

//===========================================================================//
