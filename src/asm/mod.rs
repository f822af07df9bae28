//! The two-pass assembler: source text is parsed into a node list, a
//! fixed-point sizing pass resolves label addresses, and a final walk
//! emits big-endian machine code through the shared codec.

mod encode;
mod node;
mod parse;

pub use node::{Mnemonic, Node, NodeKind};

use crate::codec::{ExtWords, LabelForm, Operand};
use crate::isa::{self, MODE_OTHER, REG_ABS_LONG, REG_PC_DISP, Size};
use byteorder::{BigEndian, ByteOrder};
use parse::split_operands;
use std::collections::HashMap;
use std::fmt;

//===========================================================================//

/// The sizing pass is guaranteed to converge by monotone shrinkage; the
/// cap is a safety valve, not a contract.
const MAX_SIZING_PASSES: u32 = 10;

/// An assembly error with the 1-based source line it occurred on (0 when
/// no single line is at fault).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AsmError {
    /// The 1-based source line, or 0.
    pub line: u32,
    /// What went wrong.
    pub message: String,
}

impl AsmError {
    fn new(line: u32, message: impl Into<String>) -> AsmError {
        AsmError { line, message: message.into() }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        if self.line == 0 {
            f.write_str(&self.message)
        } else {
            write!(f, "line {}: {}", self.line, self.message)
        }
    }
}

impl std::error::Error for AsmError {}

//===========================================================================//

/// Holds the state for one assembly: the `equ` symbol table and the label
/// table.  Symbols are created during parsing and never change; labels are
/// recomputed every sizing pass until a fixed point is reached.
pub struct Assembler {
    pub(crate) symbols: HashMap<String, i64>,
    pub(crate) labels: HashMap<String, u32>,
}

impl Assembler {
    /// Returns a fresh assembler with empty tables.
    pub fn new() -> Assembler {
        Assembler { symbols: HashMap::new(), labels: HashMap::new() }
    }

    /// Assembles 68000 source into big-endian machine code starting at
    /// `base_address`.  Errors are fatal: no partial output is returned.
    pub fn assemble(
        &mut self,
        source: &str,
        base_address: u32,
    ) -> Result<Vec<u8>, AsmError> {
        self.symbols.clear();
        self.labels.clear();
        let mut nodes = self.parse_lines(source)?;
        self.resolve_sizes(&mut nodes, base_address)?;
        self.emit(&nodes, base_address)
    }

    //-----------------------------------------------------------------------//
    // Parse

    /// Converts raw source lines into nodes.  Comments are stripped,
    /// `label:` prefixes split off, `equ` symbols recorded immediately, and
    /// remaining lines classified as directive or instruction.
    fn parse_lines(&mut self, source: &str) -> Result<Vec<Node>, AsmError> {
        let mut nodes = Vec::new();
        for (index, raw_line) in source.lines().enumerate() {
            let line_no = (index + 1) as u32;
            let mut line = raw_line;
            if let Some(comment) = line.find(';') {
                line = &line[..comment];
            }
            let mut rest = line.trim();
            if rest.is_empty() || rest.starts_with('*') {
                continue;
            }

            if let Some(colon) = rest.find(':') {
                let label = rest[..colon].trim();
                if !label.is_empty()
                    && !label.contains(char::is_whitespace)
                {
                    nodes.push(Node::new(
                        NodeKind::Label(label.to_ascii_lowercase()),
                        line_no,
                    ));
                    rest = rest[colon + 1..].trim();
                }
            }
            if rest.is_empty() {
                continue;
            }

            let (word, tail) = match rest.find(char::is_whitespace) {
                None => (rest, ""),
                Some(space) => (&rest[..space], rest[space..].trim()),
            };

            // `name equ <expr>` binds a symbol during the parse pass.
            let mut tail_words = tail.splitn(2, char::is_whitespace);
            if let Some(first) = tail_words.next() {
                if first.eq_ignore_ascii_case("equ") {
                    let value_text = tail_words.next().unwrap_or("").trim();
                    if value_text.is_empty() {
                        return Err(AsmError::new(
                            line_no,
                            "equ requires a value",
                        ));
                    }
                    let value = self
                        .parse_constant(value_text)
                        .map_err(|m| AsmError::new(line_no, m))?;
                    self.symbols
                        .insert(word.to_ascii_lowercase(), value);
                    nodes.push(Node::new(
                        NodeKind::Directive {
                            name: "equ".to_string(),
                            args: tail.to_string(),
                        },
                        line_no,
                    ));
                    continue;
                }
            }

            let normalized = word.to_ascii_lowercase();
            let directive = normalized.strip_prefix('.').unwrap_or(
                normalized.as_str(),
            );
            if matches!(
                directive,
                "dc.b" | "dc.w" | "dc.l" | "ds.b" | "ds.w" | "ds.l"
                    | "org" | "even" | "equ"
            ) {
                nodes.push(Node::new(
                    NodeKind::Directive {
                        name: directive.to_string(),
                        args: tail.to_string(),
                    },
                    line_no,
                ));
                continue;
            }

            let mnemonic = Mnemonic::parse(word)
                .map_err(|m| AsmError::new(line_no, m))?;
            let operands = if tail.is_empty() {
                Vec::new()
            } else {
                split_operands(tail)
            };
            nodes.push(Node::new(
                NodeKind::Instruction { mnemonic, operands },
                line_no,
            ));
        }
        Ok(nodes)
    }

    //-----------------------------------------------------------------------//
    // Sizing fixed point

    /// Walks the node list assigning sizes and label addresses until a
    /// pass produces no change.  Sizes only shrink after the worst-case
    /// seed, so the loop terminates; the pass cap guards against bugs.
    fn resolve_sizes(
        &mut self,
        nodes: &mut [Node],
        base: u32,
    ) -> Result<(), AsmError> {
        for _ in 0..MAX_SIZING_PASSES {
            let mut pc = base;
            let mut changed = false;
            for node in nodes.iter_mut() {
                let line = node.line;
                let size = match &node.kind {
                    NodeKind::Label(name) => {
                        if self.labels.get(name.as_str()) != Some(&pc) {
                            let name = name.clone();
                            self.labels.insert(name, pc);
                            changed = true;
                        }
                        None
                    }
                    NodeKind::Directive { name, args } if name == "org" => {
                        pc = self
                            .parse_constant(args)
                            .map_err(|m| AsmError::new(line, m))?
                            as u32;
                        None
                    }
                    NodeKind::Directive { name, args } => Some(
                        self.directive_size(name, args, pc)
                            .map_err(|m| AsmError::new(line, m))?,
                    ),
                    NodeKind::Instruction { mnemonic, operands } => Some(
                        self.instruction_size(mnemonic, operands, pc)
                            .map_err(|m| AsmError::new(line, m))?,
                    ),
                };
                if let Some(size) = size {
                    if node.size != size {
                        node.size = size;
                        changed = true;
                    }
                    pc += size;
                }
            }
            if !changed {
                return Ok(());
            }
        }
        Err(AsmError::new(
            0,
            format!(
                "sizing did not converge after {MAX_SIZING_PASSES} passes"
            ),
        ))
    }

    fn instruction_size(
        &self,
        mnemonic: &Mnemonic,
        operands: &[String],
        pc: u32,
    ) -> Result<u32, String> {
        if isa::branch_opcode(&mnemonic.name).is_some() {
            return Ok(self.branch_size(mnemonic, operands, pc));
        }
        if encode::dbcc_condition(&mnemonic.name).is_some() {
            return Ok(4);
        }
        let ops = self.build_operands(mnemonic, operands, pc, true)?;
        let words = encode::instruction(self, mnemonic, &ops, pc, 0)?;
        Ok(2 * words.len() as u32)
    }

    /// A branch is 2 bytes when the target is known and the displacement
    /// fits in a signed byte, 4 otherwise.  Forward references assume the
    /// long form so later passes can only shrink.
    fn branch_size(
        &self,
        mnemonic: &Mnemonic,
        operands: &[String],
        pc: u32,
    ) -> u32 {
        match mnemonic.size {
            Some(Size::Byte) => return 2,
            Some(_) => return 4,
            None => {}
        }
        let Some(first) = operands.first() else {
            return 2;
        };
        match self.branch_target_text(first) {
            None => 4,
            Some(target) => {
                let offset = i64::from(target) - (i64::from(pc) + 2);
                if (-128..=127).contains(&offset) { 2 } else { 4 }
            }
        }
    }

    fn branch_target_text(&self, text: &str) -> Option<u32> {
        let key = text.trim().to_ascii_lowercase();
        if let Some(&addr) = self.labels.get(&key) {
            return Some(addr);
        }
        self.parse_constant(&key).ok().map(|value| value as u32)
    }

    /// Looks up a branch operand's target address.
    pub(crate) fn branch_target(&self, op: &Operand) -> Option<u32> {
        self.branch_target_text(&op.raw)
    }

    //-----------------------------------------------------------------------//
    // Operand resolution

    /// Parses and resolves an instruction's operands at the given address.
    /// During sizing, unparseable operands and unresolved labels get
    /// worst-case placeholders; at emit they are errors.
    fn build_operands(
        &self,
        mnemonic: &Mnemonic,
        operands: &[String],
        pc: u32,
        sizing: bool,
    ) -> Result<Vec<Operand>, String> {
        // MOVEM register lists are not effective addresses; the encoder
        // reads them from the raw text.
        let lenient = sizing || mnemonic.name == "movem";
        let mut ops = Vec::with_capacity(operands.len());
        for text in operands {
            match self.parse_operand(text) {
                Ok(op) => ops.push(op),
                Err(_) if lenient => ops.push(placeholder(text)),
                Err(message) => return Err(message),
            }
        }
        // Branch targets stay symbolic; their encoders resolve them.
        if isa::branch_opcode(&mnemonic.name).is_some()
            || encode::dbcc_condition(&mnemonic.name).is_some()
        {
            return Ok(ops);
        }
        let force_abs = matches!(mnemonic.name.as_str(), "jmp" | "jsr");
        let count = ops.len();
        for (index, op) in ops.iter_mut().enumerate() {
            let pcrel_ok =
                !force_abs && pcrel_allowed(&mnemonic.name, index, count);
            self.resolve_pending(op, pc, force_abs, pcrel_ok, sizing)?;
        }
        Ok(ops)
    }

    /// Rewrites a pending-label operand into PC-relative or absolute long
    /// form.  A label sentinel must never survive into emission.
    fn resolve_pending(
        &self,
        op: &mut Operand,
        pc: u32,
        force_abs: bool,
        pcrel_ok: bool,
        sizing: bool,
    ) -> Result<(), String> {
        let Some(pending) = op.label.clone() else {
            return Ok(());
        };
        let target = self
            .labels
            .get(&pending.name)
            .copied()
            .or_else(|| {
                self.symbols.get(&pending.name).map(|&v| v as u32)
            });
        let abs_only = force_abs
            || pending.form == LabelForm::AbsoluteLong
            || (pending.form == LabelForm::Auto && !pcrel_ok);
        match target {
            None if sizing => {
                // Worst case: assume absolute long so later passes can
                // only shrink.
                if pending.form == LabelForm::PcRelative {
                    op.reg = REG_PC_DISP;
                    op.ext = ExtWords::one(0);
                } else {
                    op.reg = REG_ABS_LONG;
                    op.ext = ExtWords::two(0, 0);
                }
                op.label = None;
                Ok(())
            }
            None => Err(format!("undefined label: {}", pending.name)),
            Some(target) => {
                let offset = i64::from(target) - (i64::from(pc) + 2);
                let fits = (-32768..=32767).contains(&offset);
                if pending.form == LabelForm::PcRelative {
                    // Labels can still move while sizing; only emission
                    // enforces the range.
                    if !fits && !sizing {
                        return Err(format!(
                            "pc-relative displacement to '{}' out of \
                             range ({offset})",
                            pending.name
                        ));
                    }
                    op.reg = REG_PC_DISP;
                    op.ext = ExtWords::one(offset as i16 as u16);
                } else if !abs_only && fits {
                    op.reg = REG_PC_DISP;
                    op.ext = ExtWords::one(offset as i16 as u16);
                } else {
                    op.reg = REG_ABS_LONG;
                    op.ext = ExtWords::long(target);
                }
                op.label = None;
                Ok(())
            }
        }
    }

    //-----------------------------------------------------------------------//
    // Emission

    fn emit(
        &self,
        nodes: &[Node],
        base: u32,
    ) -> Result<Vec<u8>, AsmError> {
        let mut out = Vec::new();
        let mut pc = base;
        for node in nodes {
            let line = node.line;
            match &node.kind {
                NodeKind::Label(_) => {}
                NodeKind::Directive { name, args } => match name.as_str() {
                    "equ" => {}
                    "org" => {
                        pc = self
                            .parse_constant(args)
                            .map_err(|m| AsmError::new(line, m))?
                            as u32;
                    }
                    "even" => {
                        if pc % 2 != 0 {
                            out.push(0);
                            pc += 1;
                        }
                    }
                    "dc.b" | "dc.w" | "dc.l" => {
                        let bytes = self
                            .dc_bytes(args, element_size(name))
                            .map_err(|m| AsmError::new(line, m))?;
                        pc += bytes.len() as u32;
                        out.extend_from_slice(&bytes);
                    }
                    "ds.b" | "ds.w" | "ds.l" => {
                        let size = self
                            .ds_size(args, element_size(name))
                            .map_err(|m| AsmError::new(line, m))?;
                        out.resize(out.len() + size as usize, 0);
                        pc += size;
                    }
                    _ => {
                        return Err(AsmError::new(
                            line,
                            format!("unknown directive: {name}"),
                        ));
                    }
                },
                NodeKind::Instruction { mnemonic, operands } => {
                    let ops = self
                        .build_operands(mnemonic, operands, pc, false)
                        .map_err(|m| AsmError::new(line, m))?;
                    let words = encode::instruction(
                        self, mnemonic, &ops, pc, node.size,
                    )
                    .map_err(|m| AsmError::new(line, m))?;
                    debug_assert_eq!(2 * words.len() as u32, node.size);
                    for word in &words {
                        let mut buf = [0u8; 2];
                        BigEndian::write_u16(&mut buf, *word);
                        out.extend_from_slice(&buf);
                    }
                    pc += 2 * words.len() as u32;
                }
            }
        }
        Ok(out)
    }

    //-----------------------------------------------------------------------//
    // Directives

    fn directive_size(
        &self,
        name: &str,
        args: &str,
        pc: u32,
    ) -> Result<u32, String> {
        match name {
            "equ" => Ok(0),
            "even" => Ok(pc % 2),
            "dc.b" | "dc.w" | "dc.l" => {
                if args.trim().is_empty() {
                    return Err(format!(
                        "{name} requires at least one value"
                    ));
                }
                dc_size(args, element_size(name))
            }
            "ds.b" | "ds.w" | "ds.l" => {
                self.ds_size(args, element_size(name))
            }
            _ => Err(format!("unknown directive: {name}")),
        }
    }

    fn ds_size(&self, args: &str, element: u32) -> Result<u32, String> {
        let count = self.parse_constant(args)?;
        if count < 0 {
            return Err(format!("invalid reserve count: {count}"));
        }
        let size = count as u32 * element;
        Ok(size + size % 2)
    }

    /// Emits the data for a `dc` directive: strings in source order,
    /// numeric values big-endian, the whole run padded to an even length.
    fn dc_bytes(&self, args: &str, element: u32) -> Result<Vec<u8>, String> {
        let mut bytes = Vec::new();
        for item in scan_dc_items(args)? {
            match item {
                DcItem::Text(text) => {
                    if element != 1 {
                        return Err(
                            "string literals require dc.b".to_string()
                        );
                    }
                    bytes.extend_from_slice(text.as_bytes());
                }
                DcItem::Value(text) => {
                    let value = self.parse_constant(&text)?;
                    match element {
                        1 => bytes.push(value as u8),
                        2 => {
                            bytes.push((value >> 8) as u8);
                            bytes.push(value as u8);
                        }
                        _ => {
                            bytes.push((value >> 24) as u8);
                            bytes.push((value >> 16) as u8);
                            bytes.push((value >> 8) as u8);
                            bytes.push(value as u8);
                        }
                    }
                }
            }
        }
        if bytes.len() % 2 != 0 {
            bytes.push(0);
        }
        Ok(bytes)
    }
}

impl Default for Assembler {
    fn default() -> Assembler {
        Assembler::new()
    }
}

/// Assembles source text at a base address with a fresh assembler.
pub fn assemble(
    source: &str,
    base_address: u32,
) -> Result<Vec<u8>, AsmError> {
    Assembler::new().assemble(source, base_address)
}

//===========================================================================//

/// Positions where the PC-relative rewrite is legal: source operands only.
/// Writes, and `jmp`/`jsr` targets, must stay absolute.
fn pcrel_allowed(name: &str, index: usize, count: usize) -> bool {
    match name {
        "pea" | "tst" => index == 0,
        "jmp" | "jsr" => false,
        _ => count == 2 && index == 0,
    }
}

/// A worst-case stand-in for an operand that cannot be parsed yet during
/// sizing: an immediate too large for any quick form, or an absolute long
/// address.  Later passes can only shrink from here.
fn placeholder(text: &str) -> Operand {
    if text.trim().starts_with('#') {
        Operand {
            mode: MODE_OTHER,
            reg: crate::isa::REG_IMMEDIATE,
            ext: ExtWords::two(0x7FFF, 0xFFFF),
            raw: "#$7fffffff".to_string(),
            label: None,
        }
    } else {
        Operand {
            mode: MODE_OTHER,
            reg: REG_ABS_LONG,
            ext: ExtWords::two(0, 0),
            raw: text.trim().to_string(),
            label: None,
        }
    }
}

fn element_size(directive: &str) -> u32 {
    match directive {
        "dc.b" | "ds.b" => 1,
        "dc.w" | "ds.w" => 2,
        _ => 4,
    }
}

//===========================================================================//

enum DcItem {
    Text(String),
    Value(String),
}

/// Splits a `dc` argument list into string literals and value tokens.
/// Quotes may be single or double; a doubled quote inside a string is a
/// literal quote character.
fn scan_dc_items(args: &str) -> Result<Vec<DcItem>, String> {
    let mut items = Vec::new();
    let mut token = String::new();
    let mut text = String::new();
    let mut quote: Option<char> = None;
    let mut chars = args.chars().peekable();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    if chars.peek() == Some(&q) {
                        text.push(q);
                        chars.next();
                    } else {
                        items.push(DcItem::Text(std::mem::take(&mut text)));
                        quote = None;
                    }
                } else {
                    text.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    flush_value(&mut token, &mut items);
                    quote = Some(c);
                }
                ',' => flush_value(&mut token, &mut items),
                _ => token.push(c),
            },
        }
    }
    if quote.is_some() {
        return Err("unterminated string literal".to_string());
    }
    flush_value(&mut token, &mut items);
    Ok(items)
}

fn flush_value(token: &mut String, items: &mut Vec<DcItem>) {
    let trimmed = token.trim();
    if !trimmed.is_empty() {
        items.push(DcItem::Value(trimmed.to_string()));
    }
    token.clear();
}

/// Byte size of a `dc` directive without evaluating its values, so that
/// forward references do not disturb the sizing pass.
fn dc_size(args: &str, element: u32) -> Result<u32, String> {
    let mut size = 0;
    for item in scan_dc_items(args)? {
        size += match item {
            DcItem::Text(text) => text.len() as u32,
            DcItem::Value(_) => element,
        };
    }
    Ok(size + size % 2)
}

//===========================================================================//

#[cfg(test)]
mod tests {
    use super::{Assembler, assemble};

    #[test]
    fn labels_settle_at_fixed_point() {
        let mut asm = Assembler::new();
        let source = "start: nop\nmiddle: nop\nend: rts\n";
        asm.assemble(source, 0x1000).unwrap();
        assert_eq!(asm.labels.get("start"), Some(&0x1000));
        assert_eq!(asm.labels.get("middle"), Some(&0x1002));
        assert_eq!(asm.labels.get("end"), Some(&0x1004));
    }

    #[test]
    fn undefined_label_is_an_error() {
        let err = assemble("bra nowhere", 0).unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("undefined label"));
    }

    #[test]
    fn moveq_rejects_word_size() {
        let err = assemble("moveq.w #1,d0", 0).unwrap_err();
        assert!(err.message.contains("MOVEQ"));
    }

    #[test]
    fn unknown_instruction_is_an_error() {
        let err = assemble("frobnicate d0", 0).unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("unknown instruction"));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let bytes =
            assemble("* full line comment\n  nop ; trailing\n\n", 0)
                .unwrap();
        assert_eq!(bytes, vec![0x4E, 0x71]);
    }

    #[test]
    fn case_insensitive_labels() {
        let bytes = assemble("Start: NOP\n bra.s START\n", 0).unwrap();
        assert_eq!(bytes, vec![0x4E, 0x71, 0x60, 0xFC]);
    }

    #[test]
    fn forward_equ_reference() {
        let bytes = assemble("dc.w value\nvalue equ $1234\n", 0).unwrap();
        assert_eq!(bytes, vec![0x12, 0x34]);
    }
}
