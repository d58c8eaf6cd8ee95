//! Minimal line-oriented REPL driving the engine from the CLI.
//!
//! Each line is either `<CELL>=<formula or literal>` to set a cell, or a
//! bare `<CELL>` to print its current value. A blank line exits.
//!
//! ```text
//! $ cargo run -p fermi --example repl
//! A1=10
//! B1==A1*2
//! B1
//! 20
//! ```

use std::io::{self, BufRead, Write};

use fermi::common::{address::CellAddress, SimpleCellAddress};
use fermi::{Engine, EngineConfig};

fn main() -> anyhow::Result<()> {
    let mut engine = Engine::new(EngineConfig::new());
    let sheet = engine.get_or_insert_sheet("Sheet1");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    print!("fermi> ");
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            break;
        }

        if let Some((cell, rest)) = line.split_once('=') {
            if let Some(addr) = resolve(cell, sheet) {
                engine.set_cell_contents(addr, rest.trim())?;
                engine.recompute();
            } else {
                eprintln!("unrecognised cell reference: {cell}");
            }
        } else if let Some(addr) = resolve(&line, sheet) {
            println!("{}", engine.get_scalar_value(addr));
        } else {
            eprintln!("unrecognised cell reference: {line}");
        }

        print!("fermi> ");
        stdout.flush()?;
    }

    Ok(())
}

fn resolve(text: &str, default_sheet: fermi::common::SheetId) -> Option<SimpleCellAddress> {
    let addr = CellAddress::parse_a1(text.trim())?;
    Some(SimpleCellAddress::new(default_sheet, addr.col, addr.row))
}
