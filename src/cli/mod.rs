use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = r###"loadcast: stream per-CPU utilization over UDP"###)]
pub struct CmdArgs {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output verbosity (repeat for more).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sample /proc/stat and stream utilization datagrams to a receiver.
    Send {
        /// CPU load query frequency in Hz.
        #[arg(short, long)]
        freq: Option<f64>,

        /// Receiver host.
        #[arg(short = 's', long)]
        host: Option<IpAddr>,

        /// Receiver port.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Listen for utilization datagrams and display the series.
    Recv {
        /// Listen port.
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_flags() {
        let args =
            CmdArgs::try_parse_from(["loadcast", "send", "-f", "2.5", "-s", "10.0.0.2", "-p", "9000"])
                .unwrap();
        match args.command {
            Command::Send { freq, host, port } => {
                assert_eq!(freq, Some(2.5));
                assert_eq!(host, Some("10.0.0.2".parse().unwrap()));
                assert_eq!(port, Some(9000));
            }
            _ => panic!("expected send subcommand"),
        }
    }

    #[test]
    fn test_verbosity_counts() {
        let args = CmdArgs::try_parse_from(["loadcast", "recv", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(matches!(args.command, Command::Recv { port: None }));
    }
}
