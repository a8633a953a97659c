mod chip;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use bridge_core::lanes::ClockMode;

use chip::CableProfile;
use session::{Session, SessionOptions};

const USAGE: &str = "Usage: bridge-emulator [--cable <false|true|both|none>] [--manual] \
                     [--continuous-clock] [--eq <auto|on|off>] [--poll-ms <n>] \
                     [--transcript <path>]";

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options)?;
    let mut line = String::new();

    writeln!(
        writer,
        "HDMI-CSI bridge emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options(args: impl IntoIterator<Item = String>) -> Result<SessionOptions, String> {
    let mut options = SessionOptions::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--cable=") {
            options.cable = CableProfile::from_tag(value)?;
        } else if arg == "--cable" {
            let value = args
                .next()
                .ok_or_else(|| "Expected value after --cable".to_string())?;
            options.cable = CableProfile::from_tag(&value)?;
        } else if let Some(value) = arg.strip_prefix("--transcript=") {
            options.transcript = Some(PathBuf::from(value));
        } else if arg == "--transcript" {
            let value = args
                .next()
                .ok_or_else(|| "Expected path after --transcript".to_string())?;
            options.transcript = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--eq=") {
            options.eq_override = parse_eq(value)?;
        } else if arg == "--eq" {
            let value = args
                .next()
                .ok_or_else(|| "Expected value after --eq".to_string())?;
            options.eq_override = parse_eq(&value)?;
        } else if let Some(value) = arg.strip_prefix("--poll-ms=") {
            options.poll_period = parse_poll_period(value)?;
        } else if arg == "--poll-ms" {
            let value = args
                .next()
                .ok_or_else(|| "Expected milliseconds after --poll-ms".to_string())?;
            options.poll_period = parse_poll_period(&value)?;
        } else if arg == "--manual" {
            options.background_poll = false;
        } else if arg == "--continuous-clock" {
            options.clock_mode = ClockMode::Continuous;
        } else {
            return Err(format!("Unknown argument `{arg}`"));
        }
    }

    Ok(options)
}

fn parse_eq(value: &str) -> Result<Option<bool>, String> {
    match value {
        "auto" => Ok(None),
        "on" | "1" => Ok(Some(true)),
        "off" | "0" => Ok(Some(false)),
        other => Err(format!("Unknown equalizer mode `{other}`")),
    }
}

fn parse_poll_period(value: &str) -> Result<Duration, String> {
    match value.parse::<u64>() {
        Ok(millis) if millis > 0 => Ok(Duration::from_millis(millis)),
        _ => Err(format!("Invalid poll period `{value}`")),
    }
}
