//! farsight-ctl - operator client for a running farsight server
//!
//! Connects to the server's admin port, sends a single command and prints
//! the JSON response. Exits non-zero when the server reports an error.

use clap::{Parser, Subcommand};
use farsight_admin::{AdminCommand, DEFAULT_PORT};
use serde_json::Value;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "farsight-ctl", about = "Administer a running farsight server")]
struct Cli {
    /// Admin address of the server
    #[arg(long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Health check
    Ping,
    /// Show server state
    Status,
    /// Reload the configuration file
    Reload,
    /// Halt new LOD generation
    Pause,
    /// Resume LOD generation
    Unpause,
    /// Start pre-generation around a section
    PregenStart {
        world: String,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        center_x: i32,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        center_z: i32,
        #[arg(long)]
        radius: u32,
        /// Regenerate sections that are already cached
        #[arg(long)]
        force: bool,
    },
    /// Stop pre-generation for a world
    PregenStop { world: String },
    /// Show pre-generation progress for a world
    PregenStatus { world: String },
    /// Delete cached LODs outside the given section box
    Trim {
        world: String,
        #[arg(long, allow_negative_numbers = true)]
        min_x: i32,
        #[arg(long, allow_negative_numbers = true)]
        min_z: i32,
        #[arg(long, allow_negative_numbers = true)]
        max_x: i32,
        #[arg(long, allow_negative_numbers = true)]
        max_z: i32,
    },
}

impl From<Command> for AdminCommand {
    fn from(command: Command) -> Self {
        match command {
            Command::Ping => AdminCommand::Ping,
            Command::Status => AdminCommand::Status,
            Command::Reload => AdminCommand::Reload,
            Command::Pause => AdminCommand::Pause,
            Command::Unpause => AdminCommand::Unpause,
            Command::PregenStart { world, center_x, center_z, radius, force } => {
                AdminCommand::PreGenStart { world, center_x, center_z, radius, force }
            }
            Command::PregenStop { world } => AdminCommand::PreGenStop { world },
            Command::PregenStatus { world } => AdminCommand::PreGenStatus { world },
            Command::Trim { world, min_x, min_z, max_x, max_z } => {
                AdminCommand::Trim { world, min_x, min_z, max_x, max_z }
            }
        }
    }
}

fn send_command(addr: &str, cmd: &AdminCommand) -> Result<Value, String> {
    let mut stream = TcpStream::connect(addr).map_err(|e| {
        format!("Cannot connect to farsight admin port at {}. Is the server running? Error: {}", addr, e)
    })?;
    stream
        .set_read_timeout(Some(Duration::from_secs(30)))
        .map_err(|e| e.to_string())?;

    let mut json_str = serde_json::to_string(cmd).map_err(|e| e.to_string())?;
    json_str.push('\n');
    stream
        .write_all(json_str.as_bytes())
        .map_err(|e| format!("Write error: {}", e))?;
    stream.flush().map_err(|e| format!("Flush error: {}", e))?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| format!("Read error: {}", e))?;

    serde_json::from_str(&response_line).map_err(|e| format!("Parse error: {}", e))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let cmd = AdminCommand::from(cli.command);
    log::debug!("Sending {:?} to {}", cmd, cli.addr);

    match send_command(&cli.addr, &cmd) {
        Ok(response) => {
            let pretty = serde_json::to_string_pretty(&response).unwrap_or_else(|_| response.to_string());
            let _ = writeln!(io::stdout(), "{}", pretty);
            if response["status"] == "ok" {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            let _ = writeln!(io::stderr(), "{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_parses_negative_box() {
        let cli = Cli::try_parse_from([
            "farsight-ctl", "trim", "overworld", "--min-x", "-2", "--min-z", "-2", "--max-x", "2", "--max-z", "2",
        ])
        .unwrap();
        assert_eq!(
            AdminCommand::from(cli.command),
            AdminCommand::Trim { world: "overworld".into(), min_x: -2, min_z: -2, max_x: 2, max_z: 2 }
        );
    }

    #[test]
    fn test_pregen_start_flags() {
        let cli = Cli::try_parse_from(["farsight-ctl", "pregen-start", "nether", "--radius", "8", "--force"]).unwrap();
        assert_eq!(
            AdminCommand::from(cli.command),
            AdminCommand::PreGenStart { world: "nether".into(), center_x: 0, center_z: 0, radius: 8, force: true }
        );
        assert_eq!(cli.addr, format!("127.0.0.1:{}", DEFAULT_PORT));
    }
}
