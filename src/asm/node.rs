//! The parsed-source model: one node per label, directive, or instruction.

use crate::isa::Size;

//===========================================================================//

/// A parsed instruction mnemonic, e.g. `move.w` or `bra.s`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mnemonic {
    /// The mnemonic proper, lowercased, without its size suffix.
    pub name: String,
    /// The explicit size suffix, if one was written.  `.s` (short branch)
    /// parses as `Byte`.
    pub size: Option<Size>,
}

impl Mnemonic {
    /// Splits an instruction word like `MOVE.W` into `("move", Word)`.
    pub fn parse(text: &str) -> Result<Mnemonic, String> {
        let lowered = text.to_ascii_lowercase();
        match lowered.split_once('.') {
            None => Ok(Mnemonic { name: lowered, size: None }),
            Some((name, suffix)) => {
                let size = match suffix {
                    "b" | "s" => Size::Byte,
                    "w" => Size::Word,
                    "l" => Size::Long,
                    _ => {
                        return Err(format!("invalid size suffix: {suffix}"));
                    }
                };
                Ok(Mnemonic { name: name.to_string(), size: Some(size) })
            }
        }
    }

    /// The explicit size, or the word default.
    pub fn size_or_word(&self) -> Size {
        self.size.unwrap_or(Size::Word)
    }
}

//===========================================================================//

/// What a source line parsed into.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// A label definition; the name is stored lowercased.
    Label(String),
    /// A directive with its (unparsed) argument text.  The name is
    /// normalized: lowercased, without a leading dot.
    Directive {
        /// The normalized directive name, e.g. `dc.b` or `org`.
        name: String,
        /// Everything after the directive name, untrimmed of quotes.
        args: String,
    },
    /// An instruction with its operand texts.  Operands are re-parsed each
    /// sizing pass so that symbols and labels defined later in the file
    /// resolve once the tables are complete.
    Instruction {
        /// The parsed mnemonic.
        mnemonic: Mnemonic,
        /// The raw operand texts, split on top-level commas.
        operands: Vec<String>,
    },
}

/// One parsed element of the source, with its current size estimate.  The
/// size converges monotonically across sizing passes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    /// What this node is.
    pub kind: NodeKind,
    /// The 1-based source line this node came from.
    pub line: u32,
    /// The current byte-size estimate.
    pub size: u32,
}

impl Node {
    /// Makes a node with no size estimate yet.
    pub fn new(kind: NodeKind, line: u32) -> Node {
        Node { kind, line, size: 0 }
    }
}

//===========================================================================//
