//! The disassembler: a linear sweep over every even offset, a control-flow
//! trace from address 0, and a rendering pass that hands unreached byte
//! ranges to the data analyser.

mod data;

use crate::codec::{Class, Decoded, decode_instruction};
use byteorder::{BigEndian, ByteOrder};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

//===========================================================================//

/// An error from the disassembler.  Decode anomalies are not errors (they
/// render as placeholders); only inputs the address space cannot represent
/// are rejected.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DisError {
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for DisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DisError {}

//===========================================================================//

/// How an address was reached, which picks its label prefix.  A subroutine
/// entry is never demoted back to a plain jump target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LabelTag {
    JumpTarget,
    SubroutineEntry,
}

fn label_name(addr: u32, tag: LabelTag) -> String {
    match tag {
        LabelTag::JumpTarget => format!("loc_{addr:04X}"),
        LabelTag::SubroutineEntry => format!("sub_{addr:04X}"),
    }
}

//===========================================================================//

/// Disassembles machine code into source text.  Output is deterministic
/// for a given input; every byte of the input lands in exactly one output
/// region, either code or data.
pub fn disassemble(code: &[u8]) -> Result<String, DisError> {
    if code.is_empty() {
        return Ok(String::new());
    }
    if u32::try_from(code.len()).is_err() {
        return Err(DisError {
            message: "input exceeds the 68000 address space".to_string(),
        });
    }
    let total = code.len() as u32;

    // Linear sweep: decode the word at every even offset.  Later stages
    // only decide reachability; the records themselves never change.
    let mut instructions: HashMap<u32, Decoded> = HashMap::new();
    let mut pc = 0usize;
    while pc + 1 < code.len() {
        let opword = BigEndian::read_u16(&code[pc..]);
        let inst = decode_instruction(opword, &code[pc + 2..]);
        instructions.insert(pc as u32, inst);
        pc += 2;
    }

    // Control-flow trace from address 0.
    let mut queue = Worklist::new();
    queue.push(0);
    let mut code_addrs: HashSet<u32> = HashSet::new();
    let mut tags: HashMap<u32, LabelTag> = HashMap::new();
    while let Some(addr) = queue.pop() {
        let Some(inst) = instructions.get(&addr) else {
            continue;
        };
        if !code_addrs.insert(addr) {
            continue;
        }
        if !inst.class.is_terminal() {
            queue.push(addr + inst.length);
        }
        match inst.class {
            Class::Branch { disp, subroutine, .. } => {
                let target = i64::from(addr) + 2 + i64::from(disp);
                if (0..i64::from(total)).contains(&target) {
                    let target = target as u32;
                    queue.push(target);
                    tag_target(&mut tags, target & !1, subroutine);
                }
            }
            Class::Jump { target: Some(target), subroutine } => {
                if target < total {
                    queue.push(target);
                    tag_target(&mut tags, target & !1, subroutine);
                }
            }
            _ => {}
        }
    }

    // Render: code instructions with their labels, data ranges through the
    // analyser.
    let mut out = String::new();
    let mut string_counter = 1usize;
    let mut pc = 0u32;
    while pc < total {
        if !code_addrs.contains(&pc) {
            let start = pc;
            while pc < total && !code_addrs.contains(&pc) {
                pc += 1;
            }
            let range = &code[start as usize..pc as usize];
            out.push_str(&data::analyze(range, start, &mut string_counter));
            continue;
        }
        let inst = &instructions[&pc];
        if let Some(&tag) = tags.get(&pc) {
            out.push_str(&label_name(pc, tag));
            out.push_str(":\n");
        }
        let operands = render_operands(inst, pc, &tags);
        if operands.is_empty() {
            out.push_str(&format!("    {}\n", inst.mnemonic));
        } else {
            out.push_str(&format!(
                "    {:<8} {}\n",
                inst.mnemonic, operands
            ));
        }
        pc += inst.length;
    }
    Ok(out)
}

/// Tags a branch target.  Subroutine entries always win; a plain jump
/// label never replaces one.
fn tag_target(
    tags: &mut HashMap<u32, LabelTag>,
    target: u32,
    subroutine: bool,
) {
    if subroutine {
        tags.insert(target, LabelTag::SubroutineEntry);
    } else {
        tags.entry(target).or_insert(LabelTag::JumpTarget);
    }
}

/// Rewrites a control-flow operand to its canonical label name when the
/// target is known.
fn render_operands(
    inst: &Decoded,
    pc: u32,
    tags: &HashMap<u32, LabelTag>,
) -> String {
    let target = match inst.class {
        Class::Branch { disp, .. } => {
            let target = i64::from(pc) + 2 + i64::from(disp);
            u32::try_from(target).ok()
        }
        Class::Jump { target, .. } => target,
        _ => None,
    };
    if let Some(target) = target {
        if let Some(&tag) = tags.get(&target) {
            return with_label_target(
                &inst.operands,
                &label_name(target, tag),
            );
        }
    }
    inst.operands.clone()
}

/// Replaces the final operand (the target) with a label name, keeping any
/// leading operands such as the DBcc counter register.
fn with_label_target(operands: &str, label: &str) -> String {
    match operands.rfind(',') {
        Some(comma) => format!("{},{label}", &operands[..comma]),
        None => label.to_string(),
    }
}

//===========================================================================//

/// A worklist of addresses still to visit.  Odd addresses round down to
/// the word boundary; addresses are enqueued at most once.
struct Worklist {
    items: VecDeque<u32>,
    seen: HashSet<u32>,
}

impl Worklist {
    fn new() -> Worklist {
        Worklist { items: VecDeque::new(), seen: HashSet::new() }
    }

    fn push(&mut self, addr: u32) {
        let addr = addr & !1;
        if self.seen.insert(addr) {
            self.items.push_back(addr);
        }
    }

    fn pop(&mut self) -> Option<u32> {
        self.items.pop_front()
    }
}

//===========================================================================//

#[cfg(test)]
mod tests {
    use super::disassemble;

    #[test]
    fn empty_input() {
        assert_eq!(disassemble(&[]).unwrap(), "");
    }

    #[test]
    fn single_instruction() {
        assert_eq!(disassemble(&[0x4E, 0x75]).unwrap(), "    rts\n");
    }

    #[test]
    fn branch_targets_get_labels() {
        // bra +2 ; dc.w $beef ; rts
        let code = [0x60, 0x02, 0xBE, 0xEF, 0x4E, 0x75];
        let text = disassemble(&code).unwrap();
        assert!(text.contains("bra"));
        assert!(text.contains("loc_0004"));
        assert!(text.contains("loc_0004:\n    rts\n"));
    }

    #[test]
    fn subroutine_entries_outrank_jump_labels() {
        // bsr +4 ; bra +2 ; dc.w $beef ; rts -- the bra must not demote
        // the subroutine label.
        let code =
            [0x61, 0x04, 0x60, 0x02, 0xBE, 0xEF, 0x4E, 0x75];
        let text = disassemble(&code).unwrap();
        assert!(text.contains("sub_0006:"));
        assert!(!text.contains("loc_0006"));
        assert!(text.contains("bsr      sub_0006"));
        assert!(text.contains("bra      sub_0006"));
    }

    #[test]
    fn jump_labels_upgrade_to_subroutine_entries() {
        // bne +4 ; bsr +2 ; rts ; rts -- the later bsr upgrades the label.
        let code =
            [0x66, 0x04, 0x61, 0x02, 0x4E, 0x75, 0x4E, 0x75];
        let text = disassemble(&code).unwrap();
        assert!(text.contains("sub_0006:"));
        assert!(!text.contains("loc_0006"));
        assert!(text.contains("bne      sub_0006"));
    }

    #[test]
    fn unreachable_words_become_data() {
        // rts ; $beef
        let code = [0x4E, 0x75, 0xBE, 0xEF];
        let text = disassemble(&code).unwrap();
        assert_eq!(text, "    rts\n    dc.b    $be,$ef\n");
    }

    #[test]
    fn odd_trailing_byte_is_data() {
        let code = [0x4E, 0x75, 0x41];
        let text = disassemble(&code).unwrap();
        assert_eq!(text, "    rts\n    dc.b    $41\n");
    }
}
