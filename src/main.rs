use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use m68kit::asm::Assembler;
use m68kit::dis::disassemble;
use m68kit::proc::M68000;
use std::fs;
use std::path::PathBuf;

//===========================================================================//

#[derive(Parser)]
#[clap(author, about, long_about = None, version)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assembles a source file into machine code.
    Asm {
        /// The source file to assemble.
        source: PathBuf,
        /// Where to write the machine code (default: the source path with
        /// a .bin extension).
        #[clap(short, long)]
        output: Option<PathBuf>,
        /// The base address to assemble at.
        #[clap(long, default_value_t = 0)]
        base: u32,
    },
    /// Disassembles a binary back into source text.
    Dis {
        /// The binary file to disassemble.
        binary: PathBuf,
    },
    /// Runs a binary until it halts with trap #15.
    Run {
        /// The binary file to load at address 0 and execute.
        binary: PathBuf,
        /// The memory size in bytes.
        #[clap(long, default_value_t = 0x10000)]
        memory: usize,
    },
}

//===========================================================================//

fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Asm { source, output, base } => {
            let text = fs::read_to_string(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            let code = Assembler::new()
                .assemble(&text, base)
                .with_context(|| format!("assembling {}", source.display()))?;
            let output =
                output.unwrap_or_else(|| source.with_extension("bin"));
            fs::write(&output, &code)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("{} bytes -> {}", code.len(), output.display());
        }
        Command::Dis { binary } => {
            let code = fs::read(&binary)
                .with_context(|| format!("reading {}", binary.display()))?;
            print!("{}", disassemble(&code)?);
        }
        Command::Run { binary, memory } => {
            let code = fs::read(&binary)
                .with_context(|| format!("reading {}", binary.display()))?;
            if code.len() > memory {
                bail!("binary does not fit in {memory} bytes of memory");
            }
            let mut proc = M68000::new(memory, 256);
            proc.load_code(0, &code);
            proc.running = true;
            while proc.running {
                proc.execute()?;
            }
            for (index, value) in proc.d.iter().enumerate() {
                println!("d{index} = {value:08x}");
            }
            for (index, value) in proc.a.iter().enumerate() {
                println!("a{index} = {value:08x}");
            }
            println!("pc = {:08x}  sr = {:04x}", proc.pc, proc.sr);
        }
    }
    Ok(())
}
