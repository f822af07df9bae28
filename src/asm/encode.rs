//! Per-family instruction encoders.  Each takes resolved operands and
//! produces the opword plus extension words; the driver in `mod.rs` turns
//! words into big-endian bytes.

use super::Assembler;
use super::node::Mnemonic;
use super::parse::{REG_STATUS, is_reg_list, parse_movem_list};
use crate::codec::{ExtWords, Operand, encode_ea, move_size_bits,
    shift_count_bits, size_bits, size_bits_addr};
use crate::isa::{
    self, MODE_ADDR, MODE_ADDR_DISP, MODE_ADDR_POST_INC, MODE_ADDR_PRE_DEC,
    MODE_DATA, MODE_OTHER, REG_IMMEDIATE, Size,
};

//===========================================================================//

/// Encodes one instruction into 16-bit words.  `pc` is the instruction's
/// address and `node_size` its settled byte size (branches need it to pick
/// the short or word form).
pub(crate) fn instruction(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
    pc: u32,
    node_size: u32,
) -> Result<Vec<u16>, String> {
    // Operations naming SR, CCR, or USP take a dedicated path with fixed
    // base opcodes.
    if ops.iter().any(|op| op.mode == MODE_OTHER && op.reg == REG_STATUS) {
        return status(asm, mn, ops);
    }
    match mn.name.as_str() {
        "movem" => movem(mn, ops),
        "movep" => movep(mn, ops),
        "move" | "movea" | "moveq" => move_family(asm, mn, ops),
        "add" | "adda" | "addq" | "addi" | "addx" | "sub" | "suba"
        | "subq" | "subi" | "subx" | "muls" | "mulu" | "divs" | "divu" => {
            math(asm, mn, ops)
        }
        "and" | "andi" | "or" | "ori" | "eor" | "eori" | "not" => {
            logical(asm, mn, ops)
        }
        "lea" | "pea" => address(mn, ops),
        "link" | "unlk" => stack(asm, mn, ops),
        "cmp" | "cmpa" | "cmpi" | "cmpm" | "tst" | "chk" => {
            compare(asm, mn, ops)
        }
        "abcd" | "sbcd" | "nbcd" => bcd(mn, ops),
        "clr" | "neg" | "negx" | "swap" | "ext" | "tas" | "exg" | "reset"
        | "stop" | "nop" | "illegal" => misc(asm, mn, ops),
        "btst" | "bset" | "bclr" | "bchg" => bit_manipulation(asm, mn, ops),
        "asl" | "asr" | "lsl" | "lsr" | "rol" | "ror" | "roxl" | "roxr" => {
            shift_rotate(asm, mn, ops)
        }
        "trap" | "trapv" => trap(asm, mn, ops),
        "rts" | "rtr" | "rte" | "jmp" | "jsr" => flow(mn, ops),
        name => {
            if isa::branch_opcode(name).is_some() {
                return branch(asm, mn, ops, pc, node_size);
            }
            if let Some(cond) = dbcc_condition(name) {
                return dbcc(asm, cond, ops, pc);
            }
            if let Some(rest) = name.strip_prefix('s') {
                if let Some(cond) = isa::condition_code(rest) {
                    return scc(cond, ops);
                }
            }
            Err(format!("unknown instruction: {name}"))
        }
    }
}

/// Returns the condition code for a `db<cond>` mnemonic; `dbra` is an
/// alias for `dbf`.
pub(crate) fn dbcc_condition(name: &str) -> Option<u16> {
    let rest = name.strip_prefix("db")?;
    if rest == "ra" {
        return isa::condition_code("f");
    }
    isa::condition_code(rest)
}

//===========================================================================//
// Helpers

fn opword_with_size(
    base: u16,
    size: Option<Size>,
) -> u16 {
    base | size_bits(size.unwrap_or(Size::Word))
}

fn opword_with_addr_size(
    base: u16,
    size: Option<Size>,
) -> Result<u16, String> {
    match size_bits_addr(size.unwrap_or(Size::Word)) {
        Some(bits) => Ok(base | bits),
        None => Err("unsupported size for this instruction".to_string()),
    }
}

/// The immediate operand's value, re-parsed from its text so that quick
/// forms can range-check it.
fn immediate_value(asm: &Assembler, op: &Operand) -> Result<i64, String> {
    asm.parse_constant(&op.raw)
}

/// Builds the extension words for an immediate sized by the instruction,
/// not by the value: byte and word immediates occupy one word, longs two.
fn immediate_ext(value: i64, size: Size) -> ExtWords {
    match size {
        Size::Long => ExtWords::long(value as u32),
        _ => ExtWords::one(value as u16),
    }
}

/// Encodes an EA, sizing immediate extension words by the instruction.
fn encode_ea_sized(
    asm: &Assembler,
    op: &Operand,
    size: Size,
) -> Result<(u16, ExtWords), String> {
    if op.is_immediate() {
        let value = immediate_value(asm, op)?;
        return Ok((
            (MODE_OTHER << 3) | REG_IMMEDIATE,
            immediate_ext(value, size),
        ));
    }
    encode_ea(op)
}

fn words(opword: u16, ext: &ExtWords) -> Vec<u16> {
    let mut out = vec![opword];
    out.extend_from_slice(ext.as_slice());
    out
}

fn two_operands<'a>(
    name: &str,
    ops: &'a [Operand],
) -> Result<(&'a Operand, &'a Operand), String> {
    match ops {
        [src, dst] => Ok((src, dst)),
        _ => Err(format!("{} requires 2 operands", name.to_uppercase())),
    }
}

fn one_operand<'a>(
    name: &str,
    ops: &'a [Operand],
) -> Result<&'a Operand, String> {
    match ops {
        [op] => Ok(op),
        _ => Err(format!("{} requires 1 operand", name.to_uppercase())),
    }
}

//===========================================================================//
// MOVE family

fn move_family(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    let (src, dst) = two_operands(&mn.name, ops)?;

    // MOVEQ: a signed 8-bit immediate into a data register, one word.  The
    // assembler silently picks it for a plain `move` too, unless an
    // explicit .b or .w forbids the long-only form.
    if dst.mode == MODE_DATA && src.is_immediate() {
        let value = immediate_value(asm, src)?;
        let fits = (-128..=127).contains(&value);
        if mn.name == "moveq" {
            if matches!(mn.size, Some(Size::Byte) | Some(Size::Word)) {
                return Err("MOVEQ only supports .l size".to_string());
            }
            if !fits {
                return Err(format!(
                    "MOVEQ immediate out of range: {value}"
                ));
            }
        }
        let allowed = mn.name == "moveq"
            || !matches!(mn.size, Some(Size::Byte) | Some(Size::Word));
        if fits && allowed {
            let opword =
                isa::OP_MOVEQ | (dst.reg << 9) | (value as u8 as u16);
            return Ok(vec![opword]);
        }
    }
    if mn.name == "moveq" {
        return Err("MOVEQ requires #<data>,Dn".to_string());
    }

    // MOVEA: any move whose destination is an address register.
    if dst.mode == MODE_ADDR {
        let (opword, size) = match mn.size.unwrap_or(Size::Word) {
            Size::Word => (0x3040, Size::Word),
            Size::Long => (0x2040, Size::Long),
            Size::Byte => {
                return Err("MOVEA only supports .w or .l sizes".to_string());
            }
        };
        let (src_bits, src_ext) = encode_ea_sized(asm, src, size)?;
        return Ok(words(opword | (dst.reg << 9) | src_bits, &src_ext));
    }

    // General MOVE: destination register and mode get their own bitfields.
    let size = mn.size.unwrap_or(Size::Word);
    let mut opword = isa::OP_MOVE | move_size_bits(size);
    let (src_bits, src_ext) = encode_ea_sized(asm, src, size)?;
    let (_, dst_ext) = encode_ea(dst)?;
    opword |= (dst.reg << 9) | (dst.mode << 6) | src_bits;
    let mut out = words(opword, &src_ext);
    out.extend_from_slice(dst_ext.as_slice());
    Ok(out)
}

fn movem(mn: &Mnemonic, ops: &[Operand]) -> Result<Vec<u16>, String> {
    let (src, dst) = two_operands("movem", ops)?;
    let size = mn.size.unwrap_or(Size::Word);
    if size == Size::Byte {
        return Err("MOVEM only supports .w or .l sizes".to_string());
    }
    let mut opword = isa::OP_MOVEM;
    if size == Size::Long {
        opword |= 0x0040;
    }

    // The register-list side is whichever operand is not a memory EA.
    if is_reg_list(&src.raw) && dst.is_memory() {
        let mut mask = parse_movem_list(&src.raw)?;
        let (ea_bits, ext) = encode_ea(dst)?;
        opword |= ea_bits;
        if dst.mode == MODE_ADDR_PRE_DEC {
            // The hardware stores registers from high to low through the
            // predecrement mode, so the bits reverse within each group.
            mask = reverse_movem_mask(mask);
        }
        let mut out = vec![opword, mask];
        out.extend_from_slice(ext.as_slice());
        return Ok(out);
    }
    if is_reg_list(&dst.raw) && src.is_memory() {
        let mask = parse_movem_list(&dst.raw)?;
        let (ea_bits, ext) = encode_ea(src)?;
        opword |= 0x0400 | ea_bits;
        let mut out = vec![opword, mask];
        out.extend_from_slice(ext.as_slice());
        return Ok(out);
    }
    Err("invalid MOVEM syntax: must include a register list".to_string())
}

/// Reverses MOVEM bit ordering for the predecrement form.  Each 8-bit
/// register group reverses independently.
fn reverse_movem_mask(mask: u16) -> u16 {
    let d = (mask & 0xFF) as u8;
    let a = (mask >> 8) as u8;
    (u16::from(a.reverse_bits()) << 8) | u16::from(d.reverse_bits())
}

fn movep(mn: &Mnemonic, ops: &[Operand]) -> Result<Vec<u16>, String> {
    let (src, dst) = two_operands("movep", ops)?;
    let mut opword = isa::OP_MOVEP;
    let (data_reg, addr_reg, disp) = match (src.mode, dst.mode) {
        (MODE_DATA, MODE_ADDR_DISP) => {
            opword |= 0x0180;
            if dst.ext.is_empty() {
                return Err("missing displacement for MOVEP".to_string());
            }
            (src.reg, dst.reg, dst.ext.as_slice()[0])
        }
        (MODE_ADDR_DISP, MODE_DATA) => {
            opword |= 0x0100;
            if src.ext.is_empty() {
                return Err("missing displacement for MOVEP".to_string());
            }
            (dst.reg, src.reg, src.ext.as_slice()[0])
        }
        _ => {
            return Err(
                "MOVEP must be Dx,d(An) or d(An),Dx".to_string()
            );
        }
    };
    match mn.size.unwrap_or(Size::Word) {
        Size::Word => {}
        Size::Long => opword |= 0x0040,
        Size::Byte => {
            return Err("MOVEP only supports .w or .l sizes".to_string());
        }
    }
    opword |= (data_reg << 9) | addr_reg;
    Ok(vec![opword, disp])
}

//===========================================================================//
// Arithmetic

fn math(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    match mn.name.as_str() {
        "add" | "adda" | "addq" | "addi" => {
            add_sub(asm, mn, ops, true)
        }
        "sub" | "suba" | "subq" | "subi" => {
            add_sub(asm, mn, ops, false)
        }
        "addx" | "subx" => addx_subx(mn, ops),
        "muls" | "mulu" | "divs" | "divu" => mul_div(asm, mn, ops),
        _ => Err(format!("unknown math instruction: {}", mn.name)),
    }
}

fn add_sub(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
    add: bool,
) -> Result<Vec<u16>, String> {
    let (src, dst) = two_operands(&mn.name, ops)?;
    let quick_base = if add { isa::OP_ADDQ } else { isa::OP_SUBQ };
    let immediate_base = if add { isa::OP_ADDI } else { isa::OP_SUBI };
    let addr_base = if add { isa::OP_ADDA } else { isa::OP_SUBA };
    let plain_base = if add { isa::OP_ADD } else { isa::OP_SUB };
    let explicit_quick = mn.name == "addq" || mn.name == "subq";
    let explicit_immediate = mn.name == "addi" || mn.name == "subi";

    // ADDQ/SUBQ: an immediate 1..8 rides in the opword.  Chosen silently
    // for plain add/sub too.
    if src.is_immediate() && !explicit_immediate {
        let value = immediate_value(asm, src)?;
        let quick = (1..=8).contains(&value);
        if explicit_quick && !quick {
            return Err(format!(
                "{} immediate must be between 1 and 8",
                mn.name.to_uppercase()
            ));
        }
        if quick {
            let mut opword = quick_base | shift_count_bits(value);
            opword = opword_with_size(opword, mn.size);
            let (ea_bits, ext) = encode_ea(dst)?;
            return Ok(words(opword | ea_bits, &ext));
        }
    }
    if explicit_quick {
        return Err(format!(
            "{} requires an immediate source",
            mn.name.to_uppercase()
        ));
    }

    // ADDA/SUBA: an address-register destination, any source EA.
    if dst.mode == MODE_ADDR && !explicit_immediate {
        let opword = opword_with_addr_size(addr_base, mn.size)?;
        let size = mn.size.unwrap_or(Size::Word);
        let (ea_bits, ext) = encode_ea_sized(asm, src, size)?;
        return Ok(words(opword | (dst.reg << 9) | ea_bits, &ext));
    }

    // ADDI/SUBI: a full-width immediate source.
    if src.is_immediate() {
        let size = mn.size.unwrap_or(Size::Word);
        let opword = opword_with_size(immediate_base, mn.size);
        let (ea_bits, ea_ext) = encode_ea(dst)?;
        let value = immediate_value(asm, src)?;
        let mut out = words(opword | ea_bits, &immediate_ext(value, size));
        out.extend_from_slice(ea_ext.as_slice());
        return Ok(out);
    }
    if explicit_immediate {
        return Err(format!(
            "{} requires an immediate source",
            mn.name.to_uppercase()
        ));
    }

    // Standard form: direction depends on which side is the data register.
    let opword = opword_with_size(plain_base, mn.size);
    let size = mn.size.unwrap_or(Size::Word);
    if dst.mode == MODE_DATA {
        let (ea_bits, ext) = encode_ea_sized(asm, src, size)?;
        return Ok(words(opword | (dst.reg << 9) | ea_bits, &ext));
    }
    if src.mode != MODE_DATA {
        return Err(format!(
            "{} requires a data register on one side",
            mn.name.to_uppercase()
        ));
    }
    let (ea_bits, ext) = encode_ea(dst)?;
    Ok(words(opword | 0x0100 | (src.reg << 9) | ea_bits, &ext))
}

fn addx_subx(mn: &Mnemonic, ops: &[Operand]) -> Result<Vec<u16>, String> {
    let (src, dst) = two_operands(&mn.name, ops)?;
    let base = if mn.name == "addx" { isa::OP_ADDX } else { isa::OP_SUBX };
    let mut opword = opword_with_size(base, mn.size);
    if src.mode == MODE_DATA && dst.mode == MODE_DATA {
        opword |= (dst.reg << 9) | src.reg;
    } else if src.mode == MODE_ADDR_PRE_DEC && dst.mode == MODE_ADDR_PRE_DEC
    {
        opword |= 0x0008 | (dst.reg << 9) | src.reg;
    } else {
        return Err(format!(
            "invalid operand combination for {}",
            mn.name.to_uppercase()
        ));
    }
    Ok(vec![opword])
}

fn mul_div(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    let (src, dst) = two_operands(&mn.name, ops)?;
    if dst.mode != MODE_DATA {
        return Err(format!(
            "destination of {} must be a data register",
            mn.name.to_uppercase()
        ));
    }
    if !matches!(mn.size, None | Some(Size::Word)) {
        return Err(format!(
            "{} only supports word size (.w)",
            mn.name.to_uppercase()
        ));
    }
    let opword = match mn.name.as_str() {
        "muls" => isa::OP_MULS,
        "mulu" => isa::OP_MULU,
        "divs" => isa::OP_DIVS,
        _ => isa::OP_DIVU,
    };
    let (ea_bits, ext) = encode_ea_sized(asm, src, Size::Word)?;
    Ok(words(opword | (dst.reg << 9) | ea_bits, &ext))
}

//===========================================================================//
// Logical

fn logical(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    if mn.name == "not" {
        let dst = one_operand("not", ops)?;
        let opword = opword_with_size(isa::OP_NOT, mn.size);
        let (ea_bits, ext) = encode_ea(dst)?;
        return Ok(words(opword | ea_bits, &ext));
    }
    if mn.name == "eor" || mn.name == "eori" {
        return eor(asm, mn, ops);
    }
    let (src, dst) = two_operands(&mn.name, ops)?;
    let immediate_base = if mn.name.starts_with("and") {
        isa::OP_ANDI
    } else {
        isa::OP_ORI
    };
    let plain_base =
        if mn.name.starts_with("and") { isa::OP_AND } else { isa::OP_OR };

    if src.is_immediate() {
        return logical_immediate(asm, immediate_base, mn, src, dst);
    }
    if mn.name == "andi" || mn.name == "ori" {
        return Err(format!(
            "{} requires an immediate source",
            mn.name.to_uppercase()
        ));
    }

    let opword = opword_with_size(plain_base, mn.size);
    let size = mn.size.unwrap_or(Size::Word);
    if dst.mode == MODE_DATA {
        let (ea_bits, ext) = encode_ea_sized(asm, src, size)?;
        return Ok(words(opword | (dst.reg << 9) | ea_bits, &ext));
    }
    if src.mode != MODE_DATA {
        return Err(format!(
            "{} requires a data register on one side",
            mn.name.to_uppercase()
        ));
    }
    let (ea_bits, ext) = encode_ea(dst)?;
    Ok(words(opword | 0x0100 | (src.reg << 9) | ea_bits, &ext))
}

fn logical_immediate(
    asm: &Assembler,
    base: u16,
    mn: &Mnemonic,
    src: &Operand,
    dst: &Operand,
) -> Result<Vec<u16>, String> {
    let opword = opword_with_size(base, mn.size);
    let size = mn.size.unwrap_or(Size::Word);
    let (ea_bits, ea_ext) = encode_ea(dst)?;
    let value = immediate_value(asm, src)?;
    let mut out = words(opword | ea_bits, &immediate_ext(value, size));
    out.extend_from_slice(ea_ext.as_slice());
    Ok(out)
}

fn eor(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    let (src, dst) = two_operands(&mn.name, ops)?;
    if src.is_immediate() {
        return logical_immediate(asm, isa::OP_EORI, mn, src, dst);
    }
    if mn.name == "eori" {
        return Err("EORI requires an immediate source".to_string());
    }
    // Non-immediate EOR only goes register-to-EA.
    if src.mode != MODE_DATA {
        return Err("source of EOR must be a data register".to_string());
    }
    let opword = opword_with_size(isa::OP_EOR, mn.size);
    let (ea_bits, ext) = encode_ea(dst)?;
    Ok(words(opword | (src.reg << 9) | ea_bits, &ext))
}

//===========================================================================//
// Address calculation and stack

fn address(mn: &Mnemonic, ops: &[Operand]) -> Result<Vec<u16>, String> {
    if mn.name == "lea" {
        let (src, dst) = two_operands("lea", ops)?;
        if dst.mode != MODE_ADDR {
            return Err(
                "destination of LEA must be an address register".to_string()
            );
        }
        let (ea_bits, ext) = encode_ea(src)?;
        return Ok(words(isa::OP_LEA | (dst.reg << 9) | ea_bits, &ext));
    }
    let src = one_operand("pea", ops)?;
    let (ea_bits, ext) = encode_ea(src)?;
    Ok(words(isa::OP_PEA | ea_bits, &ext))
}

fn stack(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    if mn.name == "link" {
        let (reg_op, imm_op) = two_operands("link", ops)?;
        if reg_op.mode != MODE_ADDR {
            return Err(
                "first operand of LINK must be an address register"
                    .to_string(),
            );
        }
        if !imm_op.is_immediate() {
            return Err(
                "second operand of LINK must be an immediate displacement"
                    .to_string(),
            );
        }
        let value = immediate_value(asm, imm_op)?;
        return Ok(vec![isa::OP_LINK | reg_op.reg, value as i16 as u16]);
    }
    let reg_op = one_operand("unlk", ops)?;
    if reg_op.mode != MODE_ADDR {
        return Err(
            "operand of UNLK must be an address register".to_string()
        );
    }
    Ok(vec![isa::OP_UNLK | reg_op.reg])
}

//===========================================================================//
// Comparison

fn compare(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    match mn.name.as_str() {
        "tst" => {
            let op = one_operand("tst", ops)?;
            if op.mode == MODE_ADDR {
                return Err(
                    "TST cannot test an address register directly"
                        .to_string(),
                );
            }
            let opword = opword_with_size(isa::OP_TST, mn.size);
            let (ea_bits, ext) = encode_ea(op)?;
            Ok(words(opword | ea_bits, &ext))
        }
        "chk" => {
            let (src, dst) = two_operands("chk", ops)?;
            if dst.mode != MODE_DATA {
                return Err(
                    "CHK destination must be a data register".to_string()
                );
            }
            let (ea_bits, ext) = encode_ea_sized(asm, src, Size::Word)?;
            Ok(words(isa::OP_CHK | (dst.reg << 9) | ea_bits, &ext))
        }
        "cmpm" => cmpm(mn, ops),
        _ => {
            let (src, dst) = two_operands(&mn.name, ops)?;
            if mn.name == "cmp"
                && src.mode == MODE_ADDR_POST_INC
                && dst.mode == MODE_ADDR_POST_INC
            {
                // CMP (Ay)+,(Ax)+ only exists as CMPM.
                return cmpm(mn, ops);
            }
            // CMPA claims address-register destinations, any source EA.
            if mn.name == "cmpa" || dst.mode == MODE_ADDR {
                if dst.mode != MODE_ADDR {
                    return Err(
                        "CMPA destination must be an address register"
                            .to_string(),
                    );
                }
                let opword = opword_with_addr_size(isa::OP_CMPA, mn.size)?;
                let size = mn.size.unwrap_or(Size::Word);
                let (ea_bits, ext) = encode_ea_sized(asm, src, size)?;
                return Ok(words(
                    opword | (dst.reg << 9) | ea_bits,
                    &ext,
                ));
            }
            if mn.name == "cmpi" || (mn.name == "cmp" && src.is_immediate())
            {
                if !src.is_immediate() {
                    return Err(
                        "CMPI source must be immediate".to_string()
                    );
                }
                let size = mn.size.unwrap_or(Size::Word);
                let opword = opword_with_size(isa::OP_CMPI, mn.size);
                let (ea_bits, ea_ext) = encode_ea(dst)?;
                let value = immediate_value(asm, src)?;
                let mut out =
                    words(opword | ea_bits, &immediate_ext(value, size));
                out.extend_from_slice(ea_ext.as_slice());
                return Ok(out);
            }
            if dst.mode != MODE_DATA {
                return Err(
                    "CMP destination must be a data register".to_string()
                );
            }
            let opword = opword_with_size(isa::OP_CMP, mn.size);
            let size = mn.size.unwrap_or(Size::Word);
            let (ea_bits, ext) = encode_ea_sized(asm, src, size)?;
            Ok(words(opword | (dst.reg << 9) | ea_bits, &ext))
        }
    }
}

fn cmpm(mn: &Mnemonic, ops: &[Operand]) -> Result<Vec<u16>, String> {
    let (src, dst) = two_operands("cmpm", ops)?;
    if src.mode != MODE_ADDR_POST_INC || dst.mode != MODE_ADDR_POST_INC {
        return Err("CMPM operands must both be (An)+".to_string());
    }
    let opword = opword_with_size(0xB108, mn.size);
    Ok(vec![opword | (dst.reg << 9) | src.reg])
}

//===========================================================================//
// BCD

fn bcd(mn: &Mnemonic, ops: &[Operand]) -> Result<Vec<u16>, String> {
    if mn.name == "nbcd" {
        let dst = one_operand("nbcd", ops)?;
        let (ea_bits, ext) = encode_ea(dst)?;
        return Ok(words(isa::OP_NBCD | ea_bits, &ext));
    }
    let (src, dst) = two_operands(&mn.name, ops)?;
    let mut opword = if mn.name == "abcd" { 0xC100 } else { 0x8100 };
    match (src.mode, dst.mode) {
        (MODE_DATA, MODE_DATA) => {
            opword |= (dst.reg << 9) | src.reg;
        }
        (MODE_ADDR_PRE_DEC, MODE_ADDR_PRE_DEC) => {
            opword |= (dst.reg << 9) | 0x0008 | src.reg;
        }
        _ => {
            return Err(format!(
                "invalid operand combination for {}: {}, {}",
                mn.name.to_uppercase(),
                src.raw,
                dst.raw
            ));
        }
    }
    Ok(vec![opword])
}

//===========================================================================//
// Miscellaneous

fn misc(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    match mn.name.as_str() {
        "exg" => exg(ops),
        "stop" => {
            let src = one_operand("stop", ops)?;
            if !src.is_immediate() {
                return Err("STOP operand must be immediate".to_string());
            }
            let value = immediate_value(asm, src)?;
            Ok(vec![isa::OP_STOP, value as u16])
        }
        "reset" | "nop" | "illegal" => {
            if !ops.is_empty() {
                return Err(format!(
                    "{} requires no operands",
                    mn.name.to_uppercase()
                ));
            }
            Ok(vec![match mn.name.as_str() {
                "reset" => isa::OP_RESET,
                "nop" => isa::OP_NOP,
                _ => isa::OP_ILLEGAL,
            }])
        }
        _ => misc_one_operand(mn, ops),
    }
}

fn misc_one_operand(
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    let dst = one_operand(&mn.name, ops)?;
    let opword = match mn.name.as_str() {
        "clr" => opword_with_size(isa::OP_CLR, mn.size),
        "neg" => opword_with_size(isa::OP_NEG, mn.size),
        "negx" => opword_with_size(isa::OP_NEGX, mn.size),
        "swap" => {
            if dst.mode != MODE_DATA {
                return Err("SWAP requires a data register".to_string());
            }
            return Ok(vec![isa::OP_SWAP | dst.reg]);
        }
        "ext" => {
            if dst.mode != MODE_DATA {
                return Err("EXT requires a data register".to_string());
            }
            let bits = match mn.size {
                None | Some(Size::Word) => 0x0080,
                Some(Size::Long) => 0x00C0,
                Some(Size::Byte) => {
                    return Err(
                        "EXT only supports .w and .l sizes".to_string()
                    );
                }
            };
            return Ok(vec![isa::OP_EXT | bits | dst.reg]);
        }
        "tas" => isa::OP_TAS,
        _ => {
            return Err(format!("unknown misc instruction: {}", mn.name));
        }
    };
    let (ea_bits, ext) = encode_ea(dst)?;
    Ok(words(opword | ea_bits, &ext))
}

fn exg(ops: &[Operand]) -> Result<Vec<u16>, String> {
    let (first, second) = two_operands("exg", ops)?;
    let mut opword = isa::OP_EXG;
    let (x, y) = match (first.mode, second.mode) {
        (MODE_DATA, MODE_DATA) => {
            opword |= 0x0040;
            (first, second)
        }
        (MODE_ADDR, MODE_ADDR) => {
            opword |= 0x0048;
            (first, second)
        }
        (MODE_DATA, MODE_ADDR) => {
            opword |= 0x0088;
            (first, second)
        }
        (MODE_ADDR, MODE_DATA) => {
            opword |= 0x0088;
            (second, first)
        }
        _ => {
            return Err("invalid operand combination for EXG".to_string());
        }
    };
    Ok(vec![opword | (x.reg << 9) | y.reg])
}

//===========================================================================//
// Bit manipulation and shifts

fn bit_manipulation(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    let (src, dst) = two_operands(&mn.name, ops)?;
    // Data registers operate on longs, memory on bytes.
    let bit_modulo: i64 = if dst.mode == MODE_DATA { 32 } else { 8 };

    if src.is_immediate() {
        let value = immediate_value(asm, src)?;
        let opword = match mn.name.as_str() {
            "btst" => isa::OP_BTST,
            "bchg" => isa::OP_BCHG,
            "bclr" => isa::OP_BCLR,
            _ => isa::OP_BSET,
        };
        let (ea_bits, ea_ext) = encode_ea(dst)?;
        let bit = (value.rem_euclid(bit_modulo)) as u16;
        let mut out = vec![opword | ea_bits, bit & 0x00FF];
        out.extend_from_slice(ea_ext.as_slice());
        return Ok(out);
    }

    if src.mode != MODE_DATA {
        return Err(format!(
            "source of {} must be a data register or immediate",
            mn.name
        ));
    }
    let mut opword = isa::OP_BIT_DYNAMIC | (src.reg << 9);
    opword |= match mn.name.as_str() {
        "btst" => 0x0000,
        "bchg" => 0x0040,
        "bclr" => 0x0080,
        _ => 0x00C0,
    };
    let (ea_bits, ext) = encode_ea(dst)?;
    Ok(words(opword | ea_bits, &ext))
}

fn shift_rotate(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    match ops.len() {
        // Memory form: one word-sized shift through an EA.
        1 => {
            if !matches!(mn.size, None | Some(Size::Word)) {
                return Err(format!(
                    "{} on memory must be word-sized",
                    mn.name
                ));
            }
            let dst = &ops[0];
            if !dst.is_memory() {
                return Err(format!(
                    "single-operand {} requires a memory destination",
                    mn.name
                ));
            }
            let (kind, left): (u16, bool) = match mn.name.as_str() {
                "asr" => (0, false),
                "asl" => (0, true),
                "lsr" => (1, false),
                "lsl" => (1, true),
                "roxr" => (2, false),
                "roxl" => (2, true),
                "ror" => (3, false),
                _ => (3, true),
            };
            let mut opword = 0xE0C0 | (kind << 9);
            if left {
                opword |= 0x0100;
            }
            let (ea_bits, ext) = encode_ea(dst)?;
            Ok(words(opword | ea_bits, &ext))
        }
        // Register form: an immediate or register shift count.
        2 => {
            let (src, dst) = (&ops[0], &ops[1]);
            if dst.mode != MODE_DATA {
                return Err(format!(
                    "destination of {} must be a data register",
                    mn.name
                ));
            }
            let type_bits: u16 = match mn.name.as_str() {
                "asr" => 0x0000,
                "asl" => 0x0100,
                "lsr" => 0x0008,
                "lsl" => 0x0108,
                "roxr" => 0x0010,
                "roxl" => 0x0110,
                "ror" => 0x0018,
                _ => 0x0118,
            };
            let mut opword = isa::OP_SHIFT_ROTATE | type_bits | dst.reg;
            opword = opword_with_size(opword, mn.size);
            if src.is_immediate() {
                let count = immediate_value(asm, src)?;
                if !(1..=8).contains(&count) {
                    return Err(
                        "immediate shift/rotate count must be between 1 \
                         and 8"
                            .to_string(),
                    );
                }
                opword |= shift_count_bits(count);
            } else if src.mode == MODE_DATA {
                opword |= 0x0020 | (src.reg << 9);
            } else {
                return Err(format!(
                    "source of {} must be a data register or immediate",
                    mn.name
                ));
            }
            Ok(vec![opword])
        }
        _ => Err(format!("{} requires 1 or 2 operands", mn.name)),
    }
}

//===========================================================================//
// Traps and flow control

fn trap(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    if mn.name == "trapv" {
        if !ops.is_empty() {
            return Err("TRAPV takes no operands".to_string());
        }
        return Ok(vec![isa::OP_TRAPV]);
    }
    let src = one_operand("trap", ops)?;
    if !src.is_immediate() {
        return Err("TRAP vector must be immediate".to_string());
    }
    let value = immediate_value(asm, src)?;
    if !(0..=15).contains(&value) {
        return Err(format!(
            "TRAP vector must be between 0 and 15 (got {value})"
        ));
    }
    Ok(vec![isa::OP_TRAP | value as u16])
}

fn flow(mn: &Mnemonic, ops: &[Operand]) -> Result<Vec<u16>, String> {
    match mn.name.as_str() {
        "rts" => Ok(vec![isa::OP_RTS]),
        "rtr" => Ok(vec![isa::OP_RTR]),
        "rte" => Ok(vec![isa::OP_RTE]),
        _ => {
            let src = one_operand(&mn.name, ops)?;
            let base =
                if mn.name == "jmp" { isa::OP_JMP } else { isa::OP_JSR };
            let (ea_bits, ext) = encode_ea(src)?;
            Ok(words(base | ea_bits, &ext))
        }
    }
}

fn branch(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
    pc: u32,
    node_size: u32,
) -> Result<Vec<u16>, String> {
    let target_op = one_operand(&mn.name, ops)?;
    let base = isa::branch_opcode(&mn.name)
        .ok_or_else(|| format!("unknown branch type: {}", mn.name))?;
    let target = asm
        .branch_target(target_op)
        .ok_or_else(|| format!("undefined label: {}", target_op.raw))?;
    let offset = i64::from(target) - (i64::from(pc) + 2);
    if node_size == 2 {
        if !(-128..=127).contains(&offset) {
            return Err(format!(
                "short branch to '{}' out of range ({offset})",
                target_op.raw
            ));
        }
        return Ok(vec![base | (offset as u8 as u16)]);
    }
    if !(-32768..=32767).contains(&offset) {
        return Err(format!(
            "branch to '{}' out of range ({offset})",
            target_op.raw
        ));
    }
    Ok(vec![base, offset as i16 as u16])
}

fn dbcc(
    asm: &Assembler,
    cond: u16,
    ops: &[Operand],
    pc: u32,
) -> Result<Vec<u16>, String> {
    let (src, dst) = two_operands("dbcc", ops)?;
    if src.mode != MODE_DATA {
        return Err(
            "first operand of DBcc must be a data register".to_string()
        );
    }
    let target = asm
        .branch_target(dst)
        .ok_or_else(|| format!("undefined label: {}", dst.raw))?;
    let offset = i64::from(target) - (i64::from(pc) + 2);
    if !(-32768..=32767).contains(&offset) {
        return Err("branch target out of range for DBcc".to_string());
    }
    Ok(vec![
        isa::OP_DBCC | (cond << 8) | src.reg,
        offset as i16 as u16,
    ])
}

fn scc(cond: u16, ops: &[Operand]) -> Result<Vec<u16>, String> {
    let dst = one_operand("scc", ops)?;
    if dst.mode == MODE_ADDR {
        return Err(
            "Scc destination cannot be an address register".to_string()
        );
    }
    let (ea_bits, ext) = encode_ea(dst)?;
    Ok(words(isa::OP_SCC | (cond << 8) | ea_bits, &ext))
}

//===========================================================================//
// Status-register forms

fn status(
    asm: &Assembler,
    mn: &Mnemonic,
    ops: &[Operand],
) -> Result<Vec<u16>, String> {
    let first = ops
        .first()
        .ok_or_else(|| format!("{} requires operands", mn.name))?;
    let second = ops.get(1);
    fn raw_of(op: Option<&Operand>) -> &str {
        op.map(|o| o.raw.as_str()).unwrap_or("")
    }

    match mn.name.as_str() {
        "move" => {
            let second =
                second.ok_or("MOVE requires 2 operands".to_string())?;
            match (first.raw.as_str(), second.raw.as_str()) {
                (_, "sr") => status_move(asm, isa::OP_MOVE_TO_SR, first),
                (_, "ccr") => status_move(asm, isa::OP_MOVE_TO_CCR, first),
                ("sr", _) | ("ccr", _) => {
                    status_move(asm, isa::OP_MOVE_FROM_SR, second)
                }
                (_, "usp") => {
                    if first.mode != MODE_ADDR {
                        return Err("source for MOVE to USP must be an \
                                    address register"
                            .to_string());
                    }
                    Ok(vec![isa::OP_MOVE_TO_USP | first.reg])
                }
                ("usp", _) => {
                    if second.mode != MODE_ADDR {
                        return Err("destination for MOVE from USP must \
                                    be an address register"
                            .to_string());
                    }
                    Ok(vec![isa::OP_MOVE_FROM_USP | second.reg])
                }
                _ => Err(
                    "invalid MOVE combination for status registers"
                        .to_string(),
                ),
            }
        }
        "andi" | "ori" | "eori" => {
            if !first.is_immediate() {
                return Err(format!(
                    "{} requires an immediate source",
                    mn.name.to_uppercase()
                ));
            }
            let to_sr = raw_of(second) == "sr";
            let base = match (mn.name.as_str(), to_sr) {
                ("andi", true) => isa::OP_ANDI_TO_SR,
                ("andi", false) => isa::OP_ANDI_TO_CCR,
                ("ori", true) => isa::OP_ORI_TO_SR,
                ("ori", false) => isa::OP_ORI_TO_CCR,
                ("eori", true) => isa::OP_EORI_TO_SR,
                _ => isa::OP_EORI_TO_CCR,
            };
            let value = immediate_value(asm, first)?;
            Ok(vec![base, value as u16])
        }
        _ => Err(format!(
            "unknown status register instruction: {}",
            mn.name
        )),
    }
}

/// MOVE to/from SR or CCR: a fixed base opcode plus one word-sized EA.
fn status_move(
    asm: &Assembler,
    base: u16,
    ea_op: &Operand,
) -> Result<Vec<u16>, String> {
    let (ea_bits, ext) = encode_ea_sized(asm, ea_op, Size::Word)?;
    Ok(words(base | ea_bits, &ext))
}
