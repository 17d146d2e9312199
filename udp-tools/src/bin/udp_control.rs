use anyhow::anyhow;
use clap::Parser;
use std::io;
use std::process;
use std::time::Duration;
use udp_tools::control;
use udp_tools::payload::Payload;
use udp_tools::sender::Sender;
use udp_tools::stress;

/// UDP control test tool for the live777 DataChannel bridge.
#[derive(Parser, Debug)]
#[clap(version)]
struct Opts {
    /// Target host
    #[clap(long, default_value = "127.0.0.1")]
    host: String,
    /// Target port
    #[clap(long, default_value = "5005")]
    port: u16,
    /// Send a single text message and exit
    #[clap(long)]
    message: Option<String>,
    /// Send a single JSON message and exit
    #[clap(long)]
    json: Option<String>,
    /// Send binary data (hex string) and exit
    #[clap(long)]
    binary: Option<String>,
    /// Enter interactive mode
    #[clap(long)]
    interactive: bool,
    /// Stress test: send COUNT messages
    #[clap(long, value_name = "COUNT")]
    stress: Option<usize>,
    /// Interval between messages in stress test, in seconds
    #[clap(long, default_value = "0.01")]
    interval: f64,
}

/// What the command line asks for, decided before any socket is opened.
#[derive(Debug, PartialEq)]
enum Action {
    Send(Payload),
    Stress { count: usize, interval: Duration },
    Interactive,
    Examples,
}

fn plan(opts: &Opts) -> anyhow::Result<Action> {
    if let Some(message) = &opts.message {
        Ok(Action::Send(Payload::Text(message.clone())))
    } else if let Some(json) = &opts.json {
        Ok(Action::Send(Payload::from_json_str(json)?))
    } else if let Some(hex) = &opts.binary {
        Ok(Action::Send(Payload::from_hex(hex)?))
    } else if let Some(count) = opts.stress.filter(|count| *count > 0) {
        Ok(Action::Stress {
            count,
            interval: parse_interval(opts.interval)?,
        })
    } else if opts.interactive {
        Ok(Action::Interactive)
    } else {
        Ok(Action::Examples)
    }
}

/// Negative intervals mean no pause at all.
fn parse_interval(secs: f64) -> anyhow::Result<Duration> {
    if secs <= 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(secs).map_err(|_| anyhow!("Invalid interval: {}", secs))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    let action = plan(&opts).unwrap_or_else(|e| exit_with(e));
    if action == Action::Examples {
        print_examples();
        return Ok(());
    }

    let sender = Sender::new((opts.host.as_str(), opts.port)).unwrap_or_else(|e| exit_with(e));
    match action {
        Action::Send(payload) => {
            control::send_and_report(&sender, &payload);
        }
        Action::Stress { count, interval } => {
            stress::run(&sender, count, interval, &mut io::stdout())?;
        }
        Action::Interactive => {
            let stdin = io::stdin();
            control::interactive(&sender, stdin.lock())?;
        }
        Action::Examples => {}
    }
    Ok(())
}

fn exit_with(err: anyhow::Error) -> ! {
    eprintln!("✗ {:#}", err);
    process::exit(1)
}

fn print_examples() {
    let program = "udp-control";
    println!("UDP Control Test Tool");
    println!("\nExamples:");
    println!("  {} --message 'Hello'", program);
    println!(
        "  {} --json '{{\"action\":\"pan\",\"direction\":\"left\"}}'",
        program
    );
    println!("  {} --binary '010032'", program);
    println!("  {} --interactive", program);
    println!("  {} --stress 1000 --interval 0.01", program);
    println!("\nUse --help for more options");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_for(args: &[&str]) -> anyhow::Result<Action> {
        let opts = Opts::try_parse_from(std::iter::once("udp-control").chain(args.iter().copied()))
            .unwrap();
        plan(&opts)
    }

    #[test]
    fn no_flags_shows_examples_without_resolving() {
        let action = plan_for(&["--host", "no-such-host.invalid"]).unwrap();
        assert_eq!(action, Action::Examples);
    }

    #[test]
    fn bad_json_is_reported_before_connecting() {
        let err = plan_for(&["--host", "no-such-host.invalid", "--json", "{bad"]).unwrap_err();
        assert!(format!("{:#}", err).starts_with("Invalid JSON"));
    }

    #[test]
    fn flags_follow_precedence() {
        assert_eq!(
            plan_for(&["--message", "hi", "--json", "{}"]).unwrap(),
            Action::Send(Payload::Text("hi".to_string()))
        );
        assert_eq!(
            plan_for(&["--binary", "0100", "--interactive"]).unwrap(),
            Action::Send(Payload::Binary(vec![0x01, 0x00]))
        );
        assert_eq!(plan_for(&["--stress", "0", "--interactive"]).unwrap(), Action::Interactive);
    }

    #[test]
    fn stress_interval_is_validated() {
        assert_eq!(
            plan_for(&["--stress", "5", "--interval", "0.25"]).unwrap(),
            Action::Stress {
                count: 5,
                interval: Duration::from_millis(250)
            }
        );
        assert_eq!(
            plan_for(&["--stress", "5", "--interval=-1"]).unwrap(),
            Action::Stress {
                count: 5,
                interval: Duration::ZERO
            }
        );
        assert!(plan_for(&["--stress", "5", "--interval", "1e30"]).is_err());
        assert!(plan_for(&["--stress", "5", "--interval", "inf"]).is_err());
        assert!(plan_for(&["--stress", "5", "--interval", "NaN"]).is_err());
    }
}
