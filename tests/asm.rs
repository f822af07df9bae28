use m68kit::asm::{Assembler, assemble};

//===========================================================================//

/// Assembles source and checks the output against an expected byte
/// sequence written in hex.
fn assemble_and_match_hex(source: &str, expected_hex: &str) {
    assemble_at_and_match_hex(source, 0x1000, expected_hex);
}

fn assemble_at_and_match_hex(source: &str, base: u32, expected_hex: &str) {
    let expected: Vec<u8> = expected_hex
        .split_whitespace()
        .map(|byte| {
            u8::from_str_radix(byte, 16)
                .unwrap_or_else(|_| panic!("bad hex byte: {byte}"))
        })
        .collect();
    let code = match assemble(source, base) {
        Ok(code) => code,
        Err(error) => {
            panic!("failed to assemble:\n{source}\nerror: {error}")
        }
    };
    assert_eq!(
        code, expected,
        "wrong encoding for:\n{source}\nexpected: {expected:02X?}\ngot:      {code:02X?}"
    );
}

//===========================================================================//

#[test]
fn basic_encodings() {
    assemble_and_match_hex("move.b d0,d1", "12 00");
    assemble_and_match_hex("move.l #$12345678,d3", "26 3C 12 34 56 78");
    assemble_and_match_hex("moveq #1,d7", "7E 01");
    assemble_and_match_hex("lea ($10,pc),a0", "41 FA 00 10");
    assemble_and_match_hex("rts", "4E 75");
    assemble_and_match_hex("nop", "4E 71");
    assemble_and_match_hex("stop #$2700", "4E 72 27 00");
    assemble_and_match_hex("trap #1", "4E 41");
}

#[test]
fn directive_encodings() {
    // dc.b pads to an even length.
    assemble_and_match_hex("dc.b $11,$22,$33", "11 22 33 00");
    assemble_and_match_hex("dc.w $1122,$3344", "11 22 33 44");
    assemble_and_match_hex(
        "dc.l $11223344,$55667788",
        "11 22 33 44 55 66 77 88",
    );
    // Strings are written in natural order.
    assemble_and_match_hex("dc.b 'ABCD',$00", "41 42 43 44 00 00");
    assemble_and_match_hex("dc.b $11\n.even\ndc.b $22", "11 00 22 00");
    assemble_and_match_hex(
        "dc.b 'A',$42,'B','C',$00",
        "41 42 42 43 00 00",
    );
    assemble_and_match_hex("dc.w $0001,$0203,$0405", "00 01 02 03 04 05");
    assemble_and_match_hex("dc.l $01020304", "01 02 03 04");
    assemble_and_match_hex("ds.b 4", "00 00 00 00");
    assemble_and_match_hex("ds.w 2", "00 00 00 00");
    assemble_and_match_hex("ds.l 1", "00 00 00 00");
}

#[test]
fn org_and_equ() {
    // org relocates; only the instruction bytes are emitted.
    assemble_and_match_hex("org $2000\nnop", "4E 71");
    assemble_and_match_hex("value equ $1234\ndc.w value", "12 34");
    assemble_and_match_hex("count equ 3\nds.b count", "00 00 00 00");
}

#[test]
fn addressing_mode_encodings() {
    assemble_and_match_hex("move.w (a0),d0", "30 10");
    assemble_and_match_hex("move.w (a0)+,d1", "32 18");
    assemble_and_match_hex("move.w -(a0),d2", "34 20");
    assemble_and_match_hex("move.w 4(a0),d3", "36 28 00 04");
    assemble_and_match_hex("move.w 8(a0,d1.w),d4", "38 30 10 08");
    assemble_and_match_hex(
        "move.w label(pc),d5\nlabel: dc.w $1234",
        "3A 3A 00 02 12 34",
    );
    assemble_and_match_hex("move.w #$ABCD,d6", "3C 3C AB CD");
    assemble_and_match_hex("move.w ($1234).w,d7", "3E 38 12 34");
    assemble_and_match_hex("move.l ($123456).l,d0", "20 39 00 12 34 56");
}

#[test]
fn label_fixed_point() {
    let source = "
start:
    bra.s forward
back:
    dc.w $BEEF
forward:
    dc.w $CAFE
    lea back(pc),a0
";
    assemble_at_and_match_hex(source, 0, "60 02 BE EF CA FE 41 FA FF FA");
}

#[test]
fn flow_control_encodings() {
    assemble_and_match_hex("bra.s label\nlabel: nop", "60 00 4E 71");
    assemble_and_match_hex("bne.s label\nlabel: nop", "66 00 4E 71");
    assemble_and_match_hex("beq.s label\nlabel: nop", "67 00 4E 71");
    assemble_and_match_hex("bsr.s label\nlabel: nop", "61 00 4E 71");
    assemble_and_match_hex("jsr $E.l", "4E B9 00 00 00 0E");
    assemble_and_match_hex("jmp (a0)", "4E D0");
    assemble_and_match_hex("rte", "4E 73");
    assemble_and_match_hex("rtr", "4E 77");
}

#[test]
fn branch_word_form() {
    // A backward word-form branch over a data block.
    let mut source = String::from("loop: nop\n");
    source.push_str("ds.b 200\n");
    source.push_str("bra loop\n");
    let code = assemble(&source, 0).unwrap();
    // 2 bytes of nop, 200 of data, then the 4-byte branch.
    assert_eq!(code.len(), 206);
    assert_eq!(&code[202..], &[0x60, 0x00, 0xFF, 0x34]);
}

#[test]
fn quick_form_selection() {
    // add/sub with a small immediate silently selects addq/subq.
    assemble_and_match_hex("addq.l #8,d0", "50 80");
    assemble_and_match_hex("subq.l #8,d3", "51 83");
    assemble_and_match_hex("add.w #1,d0", "52 40");
    assemble_and_match_hex("sub.w #2,d1", "55 41");
    // Out-of-range immediates fall back to addi/subi.
    assemble_and_match_hex("add.w #100,d0", "06 40 00 64");
    assemble_and_match_hex("addi.w #1,d0", "06 40 00 01");
    // move of a small immediate to a data register selects moveq, unless
    // an explicit width forbids it.
    assemble_and_match_hex("move.l #9,d1", "72 09");
    assemble_and_match_hex("move #9,d1", "72 09");
    assemble_and_match_hex("move.w #9,d1", "32 3C 00 09");
    assemble_and_match_hex("moveq #-1,d0", "70 FF");
}

#[test]
fn movem_encodings() {
    // The predecrement form reverses the mask within each register group.
    assemble_and_match_hex("movem.l d0-d5,-(a7)", "48 E7 00 FC");
    assemble_and_match_hex("movem.l (a7)+,d0-d5", "4C DF 00 3F");
    assemble_and_match_hex("movem.w d0/a0,(a1)", "48 91 01 01");
}

#[test]
fn status_register_encodings() {
    assemble_and_match_hex("move sr,d0", "40 C0");
    assemble_and_match_hex("move d1,ccr", "44 C1");
    assemble_and_match_hex("move d2,sr", "46 C2");
    assemble_and_match_hex("move.l usp,a3", "4E 6B");
    assemble_and_match_hex("move.l a4,usp", "4E 64");
    assemble_and_match_hex("andi #$700,sr", "02 7C 07 00");
    assemble_and_match_hex("ori #4,ccr", "00 3C 00 04");
    assemble_and_match_hex("eori #$8000,sr", "0A 7C 80 00");
}

#[test]
fn arithmetic_encodings() {
    assemble_and_match_hex("add.w d0,d0", "D0 40");
    assemble_and_match_hex("add.l d1,d0", "D0 81");
    assemble_and_match_hex("sub.w d1,d2", "94 41");
    assemble_and_match_hex("adda.w d1,a0", "D0 C1");
    assemble_and_match_hex("adda.l d1,a0", "D1 C1");
    assemble_and_match_hex("addx.b d1,d0", "D1 01");
    assemble_and_match_hex("subx.w -(a1),-(a2)", "95 49");
    assemble_and_match_hex("mulu d1,d0", "C0 C1");
    assemble_and_match_hex("muls.w d1,d0", "C1 C1");
    assemble_and_match_hex("divu d1,d0", "80 C1");
    assemble_and_match_hex("divs.w d1,d0", "81 C1");
    assemble_and_match_hex("cmp.w d2,d0", "B0 42");
    assemble_and_match_hex("cmpa.w d1,a0", "B0 C1");
    assemble_and_match_hex("cmpi.w #5,d0", "0C 40 00 05");
    assemble_and_match_hex("cmpm.b (a0)+,(a1)+", "B3 08");
    assemble_and_match_hex("tst.w d6", "4A 46");
    assemble_and_match_hex("chk d1,d0", "41 81");
}

#[test]
fn logical_encodings() {
    assemble_and_match_hex("and.w d1,d0", "C0 41");
    assemble_and_match_hex("and.w d0,(a0)", "C1 50");
    assemble_and_match_hex("or.w (a0),d2", "84 50");
    assemble_and_match_hex("eor.w d4,d5", "B9 45");
    assemble_and_match_hex("not.b d3", "46 03");
    assemble_and_match_hex("not.w (a1)+", "46 59");
    assemble_and_match_hex("andi.w #$ff,d0", "02 40 00 FF");
    assemble_and_match_hex("ori.l #1,d0", "00 80 00 00 00 01");
    assemble_and_match_hex("eori.w #$f,d2", "0A 42 00 0F");
}

#[test]
fn misc_encodings() {
    assemble_and_match_hex("clr.b d0", "42 00");
    assemble_and_match_hex("clr.w d1", "42 41");
    assemble_and_match_hex("clr.l d2", "42 82");
    assemble_and_match_hex("neg.w d1", "44 41");
    assemble_and_match_hex("negx.b (a0)", "40 10");
    assemble_and_match_hex("swap d0", "48 40");
    assemble_and_match_hex("ext.w d1", "48 81");
    assemble_and_match_hex("ext.l d2", "48 C2");
    assemble_and_match_hex("exg d0,d1", "C1 41");
    assemble_and_match_hex("exg a0,a1", "C1 49");
    assemble_and_match_hex("exg d3,a1", "C7 89");
    assemble_and_match_hex("tas d0", "4A C0");
    assemble_and_match_hex("tas (a1)", "4A D1");
    assemble_and_match_hex("link a6,#-8", "4E 56 FF F8");
    assemble_and_match_hex("unlk a6", "4E 5E");
    assemble_and_match_hex("pea (a0)", "48 50");
    assemble_and_match_hex("abcd d1,d0", "C1 01");
    assemble_and_match_hex("sbcd -(a1),-(a2)", "85 09");
    assemble_and_match_hex("nbcd d4", "48 04");
    assemble_and_match_hex("trapv", "4E 76");
    assemble_and_match_hex("reset", "4E 70");
    assemble_and_match_hex("illegal", "4A FC");
    assemble_and_match_hex("movep.w d0,4(a1)", "01 89 00 04");
    assemble_and_match_hex("movep.l 0(a3),d0", "01 4B 00 00")
}

#[test]
fn shift_and_bit_encodings() {
    assemble_and_match_hex("lsr.w #8,d0", "E0 48");
    assemble_and_match_hex("asl.w #1,d2", "E3 42");
    assemble_and_match_hex("rol.w #8,d0", "E1 58");
    assemble_and_match_hex("roxl.w #8,d0", "E1 50");
    assemble_and_match_hex("asr.w d0,d2", "E0 62");
    assemble_and_match_hex("btst #15,d1", "08 01 00 0F");
    assemble_and_match_hex("bset.l d4,d4", "09 C4");
    assemble_and_match_hex("bclr #1,(a7)+", "08 9F 00 01");
    assemble_and_match_hex("bchg.b d7,(a7)+", "0F 5F");
}

#[test]
fn conditional_encodings() {
    assemble_and_match_hex("st d0", "50 C0");
    assemble_and_match_hex("sf d1", "51 C1");
    assemble_and_match_hex("scc -(a0)", "54 E0");
    assemble_and_match_hex(
        "loop: nop\ndbf d0,loop",
        "4E 71 51 C8 FF FC",
    );
    assemble_and_match_hex(
        "loop: nop\ndbra d0,loop",
        "4E 71 51 C8 FF FC",
    );
    assemble_and_match_hex(
        "loop: nop\ndbcc d1,loop",
        "4E 71 54 C9 FF FC",
    );
}

#[test]
fn bare_labels_collapse_to_shortest_form() {
    // A bare label source operand becomes PC-relative when it fits.
    assemble_at_and_match_hex(
        "lea table,a0\ntable: dc.w $1234",
        0,
        "41 FA 00 02 12 34",
    );
    // jmp and jsr targets always take the absolute long form.
    assemble_at_and_match_hex(
        "jsr target\nrts\ntarget: rts",
        0,
        "4E B9 00 00 00 08 4E 75 4E 75",
    );
}

#[test]
fn combined_code_and_data() {
    let source = "
start:
    lea string,a0
    moveq #13,d0
    jsr somewhere
    rts
somewhere:
    nop
    rts
string:
    dc.b 'This is a test string.',$00
    dc.b $00,$de,$ad,$be,$ef
string2:
    dc.b 'VER1',$00
    dc.b $00
    dc.b $41,$42,$43
    dc.b $00
string3:
    dc.b 'Copyright (C) 2025',$00
    dc.b $00
";
    let expected = "
41 FA 00 10 70 0D 4E B9 00 00 10 0E 4E 75 4E 71
4E 75 54 68 69 73 20 69 73 20 61 20 74 65 73 74
20 73 74 72 69 6E 67 2E 00 00 00 DE AD BE EF 00
56 45 52 31 00 00 00 00 41 42 43 00 00 00 43
6F 70 79 72 69 67 68 74 20 28 43 29 20 32 30 32
35 00 00 00 00
";
    assemble_and_match_hex(source, expected);
}

#[test]
fn errors_carry_line_numbers() {
    let error = assemble("nop\nbogus d0\n", 0).unwrap_err();
    assert_eq!(error.line, 2);
    let error = assemble("nop\n\nmove.w %zzz,d0\n", 0).unwrap_err();
    assert_eq!(error.line, 3);
}

#[test]
fn branch_out_of_range_is_an_error() {
    let mut source = String::from("start: nop\nds.b 300\n");
    source.push_str("bra.s start\n");
    let error = assemble(&source, 0).unwrap_err();
    assert!(error.message.contains("out of range"));
}

#[test]
fn assembler_state_is_per_call() {
    let mut asm = Assembler::new();
    asm.assemble("label: nop", 0).unwrap();
    // Labels from one call must not leak into the next.
    let error = asm.assemble("bra label", 0).unwrap_err();
    assert!(error.message.contains("undefined label"));
}
