use clap::{Parser, ValueEnum};
use log::error;
use std::io;
use std::thread;
use std::time::Duration;
use udp_tools::control;
use udp_tools::listener::Listener;
use udp_tools::message::{self, PtzCommand};
use udp_tools::payload::Payload;
use udp_tools::sender::Sender;

/// Exercises the liveion UDP bridge: listen for forwarded datagrams, send messages, or both.
#[derive(Parser, Debug)]
#[clap(version)]
struct Opts {
    #[clap(value_enum, ignore_case = true)]
    mode: Mode,
    /// Host the bridge and the listener live on
    #[clap(long, default_value = "localhost")]
    host: String,
    /// UDP port of the bridge
    #[clap(long, default_value = "8888")]
    bridge_port: u16,
    /// UDP port for the listener, kept apart from the bridge's
    #[clap(long, default_value = "8889")]
    listen_port: u16,
    /// Pause between commands in test mode
    #[clap(long, default_value = "1000")]
    delay_ms: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Mode {
    /// Start UDP listener
    Listen,
    /// Start UDP sender
    Send,
    /// Send test commands
    Test,
    /// Start both listener and sender
    Both,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    match opts.mode {
        Mode::Listen => listen(&opts),
        Mode::Send => send(&opts),
        Mode::Test => send_test_commands(&opts),
        Mode::Both => {
            let listener = start_listener(&opts)?;
            thread::spawn(move || {
                listener
                    .run()
                    .unwrap_or_else(|err| error!("{:?}", err));
            });
            thread::sleep(Duration::from_secs(1));
            send(&opts)
        }
    }
}

fn start_listener(opts: &Opts) -> anyhow::Result<Listener> {
    let listener = Listener::bind((opts.host.as_str(), opts.listen_port))?;
    println!("UDP listener started on port: {}", opts.listen_port);

    let bridge = udp_tools::resolve((opts.host.as_str(), opts.bridge_port))?;
    match listener.register(bridge) {
        Ok(registration) => println!(
            "Sent registration message to bridge: {}",
            message::to_wire_string(&registration)?
        ),
        Err(e) => println!("Registration failed: {:#}", e),
    }
    Ok(listener)
}

fn listen(opts: &Opts) -> anyhow::Result<()> {
    start_listener(opts)?.run()
}

fn send(opts: &Opts) -> anyhow::Result<()> {
    let sender = Sender::new((opts.host.as_str(), opts.bridge_port))?;
    println!("UDP sender started, enter messages to send to bridge (enter 'quit' to exit):");

    let stdin = io::stdin();
    control::prompt_loop("Send message> ", stdin.lock(), |line| {
        if line.to_lowercase() == "quit" {
            return false;
        }
        if !line.trim().is_empty() {
            match sender.send_payload(&Payload::from_prompt(line)) {
                Ok(nbytes) => println!("[Sent] {} bytes", nbytes),
                Err(e) => error!("{:#}", e),
            }
        }
        true
    })
}

fn send_test_commands(opts: &Opts) -> anyhow::Result<()> {
    let sender = Sender::new((opts.host.as_str(), opts.bridge_port))?;
    let commands = PtzCommand::test_sequence();

    println!("Sending test command sequence...");
    for (i, command) in commands.iter().enumerate() {
        match sender.send_ptz(command) {
            Ok(_) => println!(
                "[{}/{}] Sent: {}",
                i + 1,
                commands.len(),
                message::to_wire_string(command)?
            ),
            Err(e) => error!("{:#}", e),
        }
        thread::sleep(Duration::from_millis(opts.delay_ms));
    }
    println!("Test command sending completed");
    Ok(())
}
