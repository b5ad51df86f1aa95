mod cli;
mod config;
mod init;
mod net;
mod sample;
mod sink;
mod wire;

use clap::Parser;

use crate::cli::{CmdArgs, Command};
use crate::config::Config;
use crate::init::init_tracing;
use crate::sink::SeriesSink;

fn main() -> anyhow::Result<()> {
    let args = CmdArgs::parse();
    init_tracing(args.verbose)?;

    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Send { freq, host, port } => {
            let mut config = config.sender;
            if let Some(freq) = freq {
                config.freq = freq;
            }
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            config.validate()?;
            net::sender::run(&config)
        }
        Command::Recv { port } => {
            let mut config = config.receiver;
            if let Some(port) = port {
                config.port = port;
            }
            config.validate()?;
            let mut sink = SeriesSink::new(config.max_history_samples);
            net::receiver::run(&config, &mut sink)
        }
    }
}
