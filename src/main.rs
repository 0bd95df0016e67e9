use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use lc3_vm::sim::io::{BiChannelIO, Stop};
use lc3_vm::sim::{RunState, SimFlags, Simulator};

const CTRL_C: u8 = 0x03;

/// LC-3 virtual machine
#[derive(Parser)]
struct Args {
    /// Object images to load, in order (later images overwrite earlier ones)
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Address at which to start executing (hex, e.g. x3000)
    #[arg(long, value_parser = parse_addr, default_value = "x3000")]
    start: u16,

    /// Stop after executing this many instructions
    #[arg(long)]
    max_steps: Option<u64>,

    /// Leave the terminal in line-buffered mode
    #[arg(long)]
    no_raw: bool,
}

fn parse_addr(s: &str) -> Result<u16, String> {
    let lower = s.to_ascii_lowercase();
    let digits = lower.strip_prefix("0x")
        .or_else(|| lower.strip_prefix('x'))
        .unwrap_or(&lower);

    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid address {s:?}: {e}"))
}

/// Keeps the terminal in raw mode while alive.
struct RawModeGuard;
impl RawModeGuard {
    fn acquire() -> io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(RawModeGuard)
    }
}
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = crossterm::terminal::disable_raw_mode() {
            log::error!("failed to restore terminal: {e}");
        }
    }
}

/// Translates a key typed in raw mode.
///
/// Ctrl-C sets `interrupted` and closes the input.
fn raw_key(byte: u8, interrupted: &AtomicBool) -> Result<u8, Stop> {
    match byte {
        CTRL_C => {
            interrupted.store(true, Ordering::Relaxed);
            Err(Stop)
        },
        b'\r' => Ok(b'\n'),
        b => Ok(b),
    }
}

/// Console over stdin/stdout for a terminal in raw mode.
fn raw_console(interrupted: Arc<AtomicBool>) -> BiChannelIO {
    BiChannelIO::new(
        move || {
            let mut stdin = io::stdin().lock();
            let &[byte, ..] = stdin.fill_buf().map_err(|_| Stop)? else {
                return Err(Stop);
            };
            stdin.consume(1);

            raw_key(byte, &interrupted)
        },
        |byte| {
            let mut stdout = io::stdout().lock();
            let result = match byte {
                b'\n' => stdout.write_all(b"\r\n"),
                b => stdout.write_all(&[b]),
            };
            result.and_then(|_| stdout.flush()).map_err(|_| Stop)
        }
    )
}

fn main() -> ExitCode {
    env_logger::init();

    let opt = Args::parse();

    let mut sim = Simulator::new(SimFlags { pc_start: opt.start, ..Default::default() });
    for path in &opt.images {
        if let Err(e) = sim.load_image_file(path) {
            eprintln!("failed to load image: {e}");
            return ExitCode::FAILURE;
        }
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let guard = match opt.no_raw {
        true  => None,
        false => match RawModeGuard::acquire() {
            Ok(g) => Some(g),
            Err(e) => {
                log::warn!("cannot switch terminal to raw mode: {e}");
                None
            },
        },
    };
    match guard.is_some() {
        true  => sim.open_io(raw_console(Arc::clone(&interrupted))),
        false => sim.open_io(BiChannelIO::stdio()),
    }

    let limit = opt.max_steps.unwrap_or(u64::MAX);
    let result = sim.run_while(|sim| sim.instructions_run < limit && !interrupted.load(Ordering::Relaxed));

    // flush pending output before the terminal leaves raw mode
    sim.close_io();
    drop(guard);

    if interrupted.load(Ordering::Relaxed) {
        eprintln!("interrupted at {:#06X}", sim.reg_file.pc);
        return ExitCode::from(130);
    }
    match result {
        Ok(()) if sim.state() == RunState::Running => {
            eprintln!("stopped after {} instructions at {:#06X}", sim.instructions_run, sim.reg_file.pc);
            ExitCode::SUCCESS
        },
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("execution stopped at {:#06X}: {e}", sim.prefetch_pc());
            eprintln!("error: {e}");
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lc3_vm::sim::io::IODevice;

    use super::*;

    #[test]
    fn test_parse_addr() {
        assert_eq!(parse_addr("x3000"), Ok(0x3000));
        assert_eq!(parse_addr("X3000"), Ok(0x3000));
        assert_eq!(parse_addr("0x4000"), Ok(0x4000));
        assert_eq!(parse_addr("0X4000"), Ok(0x4000));
        assert_eq!(parse_addr("fe00"), Ok(0xFE00));
        assert!(parse_addr("x10000").is_err());
        assert!(parse_addr("0xg").is_err());
    }

    #[test]
    fn test_raw_key() {
        let interrupted = AtomicBool::new(false);
        assert_eq!(raw_key(b'\r', &interrupted), Ok(b'\n'));
        assert_eq!(raw_key(b'a', &interrupted), Ok(b'a'));
        assert!(!interrupted.load(Ordering::Relaxed));

        assert_eq!(raw_key(CTRL_C, &interrupted), Err(Stop));
        assert!(interrupted.load(Ordering::Relaxed));
    }

    #[test]
    fn test_ctrl_c_after_unread_keys() {
        // the program never reads the keys typed before Ctrl-C
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupted);
        let mut keys = b"ab\x03".iter().copied();
        let io = BiChannelIO::new(
            move || raw_key(keys.next().ok_or(Stop)?, &flag),
            |_| Ok(())
        );

        for _ in 0..100 {
            if interrupted.load(Ordering::Relaxed) { break; }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(interrupted.load(Ordering::Relaxed));

        // keys typed before the interrupt are still delivered, then the input is closed
        assert_eq!(io.read_input(), Some(b'a'));
        assert_eq!(io.read_input(), Some(b'b'));
        assert_eq!(io.read_input(), None);
        io.close();
    }
}
