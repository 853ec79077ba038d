use clap::Parser;

/// Voice receptionist telephony server.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(version, about)]
pub struct Cli {
    /// Local port to expose through the tunnel when no base URL is configured.
    #[arg(long)]
    pub port: Option<u16>,
}
