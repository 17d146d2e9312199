use crate::message::{Direction, PtzCommand};
use crate::payload::Payload;
use crate::sender::Sender;
use anyhow::anyhow;
use std::io::{self, BufRead, Write};

const PAN_TILT_SPEED: u32 = 50;
const ZOOM_STEP: u32 = 1;

#[derive(Debug, PartialEq)]
pub enum Command {
    Send(Payload),
    Ptz(PtzCommand),
    Quit,
}

impl Command {
    /// Parses one interactive line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> anyhow::Result<Option<Command>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let mut parts = line.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next().map(str::trim).filter(|arg| !arg.is_empty());

        let parsed = match (command.as_str(), arg) {
            ("quit", _) => Command::Quit,
            ("text", Some(message)) => Command::Send(Payload::Text(message.to_string())),
            ("json", Some(json)) => Command::Send(Payload::from_json_str(json)?),
            ("pan", Some(direction)) => Command::Ptz(PtzCommand::Pan {
                direction: parse_direction(direction, [Direction::Left, Direction::Right])?,
                speed: PAN_TILT_SPEED,
            }),
            ("tilt", Some(direction)) => Command::Ptz(PtzCommand::Tilt {
                direction: parse_direction(direction, [Direction::Up, Direction::Down])?,
                speed: PAN_TILT_SPEED,
            }),
            ("zoom", Some(direction)) => Command::Ptz(PtzCommand::Zoom {
                direction: parse_direction(direction, [Direction::In, Direction::Out])?,
                value: ZOOM_STEP,
            }),
            _ => return Err(anyhow!("Unknown command: {}", command)),
        };
        Ok(Some(parsed))
    }
}

fn parse_direction(s: &str, allowed: [Direction; 2]) -> anyhow::Result<Direction> {
    let s = s.to_lowercase();
    allowed
        .iter()
        .copied()
        .find(|direction| direction.to_string() == s)
        .ok_or_else(|| anyhow!("Invalid direction. Use: {} or {}", allowed[0], allowed[1]))
}

/// Sends a payload and prints the outcome; a failure is printed, not returned.
pub fn send_and_report(sender: &Sender, payload: &Payload) -> bool {
    match sender.send_payload(payload) {
        Ok(_) => {
            println!("✓ Sent {}", payload.describe());
            true
        }
        Err(e) => {
            eprintln!("✗ Error sending message: {:#}", e);
            false
        }
    }
}

/// Executes one command. Returns false when the session should end.
pub fn execute(sender: &Sender, command: &Command) -> bool {
    match command {
        Command::Quit => return false,
        Command::Send(payload) => {
            send_and_report(sender, payload);
        }
        Command::Ptz(ptz) => {
            send_and_report(sender, &Payload::Json(ptz.to_json()));
        }
    }
    true
}

pub fn print_help(sender: &Sender) {
    println!();
    println!("=== UDP Control Interactive Mode ===");
    println!("Target: {}", sender.target());
    println!("Commands:");
    println!("  text <message>     - Send text message");
    println!("  json <json_string> - Send JSON message");
    println!("  pan <left|right>   - Pan camera");
    println!("  tilt <up|down>     - Tilt camera");
    println!("  zoom <in|out>      - Zoom camera");
    println!("  quit               - Exit");
    println!();
}

/// Reads lines after printing `prompt` until `handle` returns false or input ends.
pub fn prompt_loop<R, F>(prompt: &str, input: R, mut handle: F) -> anyhow::Result<()>
where
    R: BufRead,
    F: FnMut(&str) -> bool,
{
    let mut lines = input.lines();
    loop {
        print!("{}", prompt);
        io::stdout().flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => {
                println!();
                return Ok(());
            }
        };
        if !handle(&line) {
            return Ok(());
        }
    }
}

pub fn interactive<R: BufRead>(sender: &Sender, input: R) -> anyhow::Result<()> {
    print_help(sender);
    prompt_loop("udp> ", input, |line| match Command::parse(line) {
        Ok(Some(command)) => execute(sender, &command),
        Ok(None) => true,
        Err(e) => {
            println!("✗ {:#}", e);
            true
        }
    })
}
