//! zdb CLI - コマンドラインインターフェース
//!
//! Z80 電卓エミュレータ向けデバッガ zdb のREPLインターフェース

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zdb_core::errors::ERR_BREAKPOINT_NOT_FOUND;
use zdb_core::{
    BreakpointCodec, BreakpointId, Command, Debugger, DebuggerConfig, Emulator, ParseContext, Toggle, Worker,
};
use zdb_target::{AddressView, Hardware, Registers, SimCore};

/// zdb - Z80 calculator debugger
#[derive(Parser)]
#[command(name = "zdb")]
#[command(version = "0.1.0")]
#[command(about = "Execution-control debugger for Z80 calculator programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: DebugCommand,
}

#[derive(Subcommand)]
enum DebugCommand {
    /// Load a raw program image into the simulated core and debug it
    Run {
        /// Path to the program image
        image: String,

        /// Logical load address (also the initial PC)
        #[arg(long, default_value = "9D95", value_parser = parse_hex_u16)]
        org: u16,

        /// Symbol file to load
        #[arg(short, long)]
        symbols: Option<String>,

        /// ROM size in bytes
        #[arg(long, default_value = "80000", value_parser = parse_memory_size)]
        rom_size: u32,

        /// RAM size in bytes
        #[arg(long, default_value = "8000", value_parser = parse_memory_size)]
        ram_size: u32,

        /// First page number treated as RAM
        #[arg(long, default_value = "40", value_parser = parse_hex_u32)]
        ram_page_base: u32,

        /// Number of disassembly lines to show
        #[arg(short, long, default_value_t = 16)]
        lines: usize,

        /// Start in physical address view
        #[arg(long)]
        physical: bool,

        /// Breakpoint type used when a definition omits it (logical, physical, io, opcode)
        #[arg(long, default_value = "logical")]
        default_type: String,

        /// Breakpoint mode used when a definition omits it (r, w, x or a combination)
        #[arg(long, default_value = "x")]
        default_mode: String,

        /// Seconds to wait for a stop before pausing a running program
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

fn parse_hex_u32(s: &str) -> std::result::Result<u32, String> {
    let digits = s.trim_start_matches('$').trim_start_matches("0x");
    u32::from_str_radix(digits, 16).map_err(|_| format!("invalid hex number '{}'", s))
}

/// ROM・RAMそれぞれのサイズ上限
const MAX_MEMORY_SIZE: u32 = 0x0400_0000;

fn parse_memory_size(s: &str) -> std::result::Result<u32, String> {
    let value = parse_hex_u32(s)?;
    if value == 0 || value > MAX_MEMORY_SIZE {
        return Err(format!("memory size '{}' must be between 1 and {:X}", s, MAX_MEMORY_SIZE));
    }
    Ok(value)
}

fn parse_hex_u16(s: &str) -> std::result::Result<u16, String> {
    let value = parse_hex_u32(s)?;
    u16::try_from(value).map_err(|_| format!("address '{}' is out of range", s))
}

/// REPLのセッション
struct Session {
    debugger: Debugger,
    /// 実行を待つ時間の上限
    timeout: Duration,
    _worker: Worker,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("zdb - Z80 Calculator Debugger");
    println!("Version 0.1.0");
    println!();

    let cli = Cli::parse();
    let mut session = init_session(cli.command)?;
    run_repl(&mut session)?;

    Ok(())
}

/// 既定のブレークポイント種類とモードを解釈する
fn parse_defaults(default_type: &str, default_mode: &str) -> Result<BreakpointCodec> {
    let text = format!("{} {} 0", default_type, default_mode);
    let bp = BreakpointCodec::default()
        .parse(&text, &ParseContext::default())
        .with_context(|| format!("invalid breakpoint defaults '{} {}'", default_type, default_mode))?;
    Ok(BreakpointCodec::new(bp.space, bp.access))
}

/// イメージを読み込んでデバッガを初期化する
fn init_session(command: DebugCommand) -> Result<Session> {
    match command {
        DebugCommand::Run {
            image,
            org,
            symbols,
            rom_size,
            ram_size,
            ram_page_base,
            lines,
            physical,
            default_type,
            default_mode,
            timeout,
        } => {
            println!("Loading image: {}", image);

            let bytes = std::fs::read(&image).with_context(|| format!("failed to read image {}", image))?;
            if org as usize + bytes.len() > 0x10000 {
                bail!("image of {} bytes does not fit at ${:04X}", bytes.len(), org);
            }

            let hw = Hardware::checked(rom_size, ram_size, ram_page_base)
                .with_context(|| format!("memory layout {:X}+{:X} is too large", rom_size, ram_size))?;
            let mut core = SimCore::new(hw);
            core.load_logical(org, &bytes);
            core.regs_mut().pc = org;
            tracing::debug!(bytes = bytes.len(), org, "image loaded");
            println!("Loaded {} bytes at ${:04X}", bytes.len(), org);

            let defaults = parse_defaults(&default_type, &default_mode)?;
            let config = DebuggerConfig {
                disasm_lines: lines,
                view: if physical { AddressView::Physical } else { AddressView::Logical },
                default_space: defaults.last_space(),
                default_access: defaults.last_access(),
            };

            let emulator = Emulator::new(Some(Box::new(core)));
            let worker = emulator.spawn_worker();
            let mut debugger = Debugger::new(emulator, config);

            if let Some(path) = symbols {
                let count = debugger.load_symbols(&path)?;
                println!("Loaded {} symbols from {}", count, path);
            }

            println!("Program stopped at ${:04X}", org);
            println!("Set breakpoints and use 'continue' to start execution");
            println!();

            Ok(Session {
                debugger,
                timeout: Duration::from_secs(timeout),
                _worker: worker,
            })
        }
    }
}

/// REPLループを実行する
fn run_repl(session: &mut Session) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(zdb) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match handle_command(session, &mut rl, line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

/// コマンドを処理する。終了する場合は false
fn handle_command(session: &mut Session, rl: &mut DefaultEditor, line: &str) -> Result<bool> {
    let Some(command) = Command::parse(line) else {
        println!("Unknown command: {}", line);
        println!("Type 'help' for available commands.");
        return Ok(true);
    };

    let debugger = &mut session.debugger;
    match command {
        Command::Help => print_help(),
        Command::Quit => return Ok(false),
        Command::Break(text) => handle_break(debugger, rl, &text, None)?,
        Command::Edit(id, text) => handle_break(debugger, rl, &text, Some(id))?,
        Command::Delete(id) => {
            debugger.remove_breakpoint(id)?;
            println!("Breakpoint {} deleted", id);
        }
        Command::Enable(id) => handle_enable(debugger, id, true)?,
        Command::Disable(id) => handle_enable(debugger, id, false)?,
        Command::Toggle(addr) => handle_toggle(debugger, addr.as_deref())?,
        Command::Breakpoints => print_breakpoints(debugger),
        Command::Continue => {
            println!("Continuing execution...");
            debugger.run();
            wait_for_stop(session);
        }
        Command::Step => handle_step(session, Debugger::step_into),
        Command::Next => handle_step(session, Debugger::step_over),
        Command::Finish => handle_step(session, Debugger::finish),
        Command::Disasm => print_disassembly(debugger),
        Command::GoTo(text) => {
            debugger.go_to(&text)?;
            print_disassembly(debugger);
        }
        Command::Pc => {
            debugger.go_to_pc();
            print_disassembly(debugger);
        }
        Command::Stack(pos) => {
            debugger.go_to_stack(pos);
            print_disassembly(debugger);
        }
        Command::Scroll(delta) => {
            debugger.scroll(delta);
            print_disassembly(debugger);
        }
        Command::Move(dir) => {
            debugger.move_cursor(dir);
            print_disassembly(debugger);
        }
        Command::View(view) => {
            debugger.set_view(view);
            print_disassembly(debugger);
        }
        Command::Registers => print_registers(debugger),
        Command::Symbols(path) => {
            let count = debugger.load_symbols(&path)?;
            println!("Loaded {} symbols from {}", count, path);
        }
    }

    Ok(true)
}

/// 定義を省略したBreak/Editで入力欄に表示する初期テキスト
fn initial_definition(debugger: &Debugger, existing: Option<BreakpointId>) -> Result<String> {
    match existing {
        None => Ok(debugger.breakpoint_template()),
        Some(id) => debugger
            .format_breakpoint(id)
            .with_context(|| format!("{} ({})", ERR_BREAKPOINT_NOT_FOUND, id)),
    }
}

/// Break/Editコマンドを処理する
///
/// 定義が省略された場合は初期テキストを編集させてから登録します。
fn handle_break(
    debugger: &mut Debugger,
    rl: &mut DefaultEditor,
    text: &str,
    existing: Option<BreakpointId>,
) -> Result<()> {
    let edited;
    let text = if text.is_empty() {
        let initial = initial_definition(debugger, existing)?;
        edited = rl.readline_with_initial("breakpoint> ", (&initial, ""))?;
        edited.trim()
    } else {
        text
    };

    match debugger.add_or_edit_breakpoint(text, existing)? {
        Some(id) => {
            let formatted = debugger.format_breakpoint(id).unwrap_or_default();
            match existing {
                Some(old) if old == id => println!("Breakpoint {} changed: {}", id, formatted),
                _ => println!("Breakpoint {} set: {}", id, formatted),
            }
        }
        None => println!("No program loaded"),
    }
    Ok(())
}

fn handle_enable(debugger: &mut Debugger, id: BreakpointId, enabled: bool) -> Result<()> {
    debugger.set_enabled(id, enabled)?;
    let state = if enabled { "enabled" } else { "disabled" };
    println!("Breakpoint {} {}", id, state);
    Ok(())
}

/// Toggleコマンドを処理する（アドレス省略時は選択行）
fn handle_toggle(debugger: &mut Debugger, addr: Option<&str>) -> Result<()> {
    if let Some(text) = addr {
        debugger.go_to(text)?;
    }
    match debugger.toggle_at_cursor() {
        Some(Toggle::Added(id)) => {
            let formatted = debugger.format_breakpoint(id).unwrap_or_default();
            println!("Breakpoint {} set: {}", id, formatted);
        }
        Some(Toggle::Removed(id)) => println!("Breakpoint {} deleted", id),
        None => println!("No program loaded"),
    }
    Ok(())
}

/// ステップ系コマンドを処理する
fn handle_step(session: &mut Session, start: fn(&Debugger) -> bool) {
    if !start(&session.debugger) {
        println!("Cannot step: program is running or not loaded");
        return;
    }
    wait_for_stop(session);
}

/// 停止を待ち、停止位置を表示する
fn wait_for_stop(session: &mut Session) {
    let debugger = &mut session.debugger;
    if !debugger.emulator().wait_paused(session.timeout) {
        debugger.pause();
        println!("Still running after {}s, paused", session.timeout.as_secs());
    }

    if let Some(regs) = debugger.registers() {
        match debugger.disassembler().symbols().name_at(regs.pc as u32) {
            Some(name) => println!("Stopped at ${:04X} <{}>", regs.pc, name),
            None => println!("Stopped at ${:04X}", regs.pc),
        }
    }
    debugger.go_to_pc();
    print_disassembly(debugger);
}

fn print_breakpoints(debugger: &Debugger) {
    let entries = debugger.breakpoints();
    if entries.is_empty() {
        println!("No breakpoints");
        return;
    }

    println!("Breakpoints ({} found):", entries.len());
    for (id, bp) in entries {
        println!("  {}. {}", id, BreakpointCodec::format(&bp));
    }
}

fn print_disassembly(debugger: &mut Debugger) {
    let width = match (debugger.cursor().view(), debugger.hardware()) {
        (AddressView::Physical, Some(hw)) => hw.address_width(),
        _ => 4,
    };

    let rows = debugger.disassembly();
    if rows.is_empty() {
        println!("No program loaded");
        return;
    }

    let symbols = debugger.disassembler().symbols();
    for row in rows {
        if let Some(name) = symbols.name_at(row.addr) {
            println!("{}:", name);
        }
        let marker = match (row.is_pc, row.selected) {
            (true, _) => "=>",
            (false, true) => " >",
            (false, false) => "  ",
        };
        let bp = if row.has_breakpoint { '*' } else { ' ' };
        println!("{}{} {:0w$X}  {}", marker, bp, row.addr, row.text, w = width);
    }
}

fn print_registers(debugger: &Debugger) {
    let Some(regs) = debugger.registers() else {
        println!("No program loaded");
        return;
    };
    print_register_dump(&regs);
}

fn print_register_dump(regs: &Registers) {
    println!(
        "AF={:04X} BC={:04X} DE={:04X} HL={:04X} IX={:04X} IY={:04X}",
        regs.af, regs.bc, regs.de, regs.hl, regs.ix, regs.iy
    );
    println!(
        "SP={:04X} PC={:04X} IFF1={} IFF2={}{}",
        regs.sp,
        regs.pc,
        regs.iff1 as u8,
        regs.iff2 as u8,
        if regs.halted { " (halted)" } else { "" }
    );
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help (h, ?)           - Show this help message");
    println!("  quit/exit/q           - Exit the debugger");
    println!();
    println!("Execution:");
    println!("  continue (c)          - Continue execution");
    println!("  step (s)              - Execute one instruction");
    println!("  next (n)              - Execute one instruction, stepping over calls");
    println!("  finish (f)            - Run until the current routine returns");
    println!();
    println!("Breakpoints:");
    println!("  break (b) [def]       - Add a breakpoint, e.g. 'b io w 10-1f' (prompts when omitted)");
    println!("  edit (e) <id> [def]   - Replace a breakpoint (prompts with its definition when omitted)");
    println!("  delete (d) <id>       - Delete a breakpoint");
    println!("  enable/disable <id>   - Enable or disable a breakpoint");
    println!("  toggle (t) [addr]     - Toggle an execution breakpoint at addr or the cursor");
    println!("  breakpoints (bl)      - List breakpoints");
    println!();
    println!("Disassembly:");
    println!("  list (l)              - Show disassembly");
    println!("  goto (g) <addr|label> - Show disassembly at an address");
    println!("  pc                    - Show disassembly at PC");
    println!("  stack [n]             - Show disassembly at the n-th stack entry");
    println!("  up/down               - Move the cursor");
    println!("  scroll <n>            - Scroll the view by n lines");
    println!("  view logical|physical - Switch the address view");
    println!("  registers (r)         - Show registers");
    println!("  symbols <file>        - Load a symbol file");
    println!();
    println!("Breakpoint definitions:");
    println!("  [type] [mode] START[-END] [mask=MASK]");
    println!("  type: logical (l), physical (p), io, opcode (op)");
    println!("  mode: r, w, x or a combination such as rw");
    println!();
    println!("Examples:");
    println!("  break l x 9d95");
    println!("  break p w 1f:0100");
    println!("  break op x ed44");
}
