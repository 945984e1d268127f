use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use forti_cert::{CertRef, CertReport, CertType};

use crate::client::ApplianceClient;

mod client;

/// Decode a certificate stored on a firewall appliance.
///
/// Logs in to the appliance's JSON-RPC management endpoint, fetches the
/// named certificate from the chosen store, and prints a decoded report.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Appliance host name or IP address
    host: String,

    /// Name of the stored certificate to decode
    cert_name: String,

    /// User to log in as
    #[arg(short, long, default_value = "jsonadmin")]
    username: String,

    /// Password for the user
    #[arg(short, long)]
    password: String,

    /// Certificate store to query: "ca" or "local"
    #[arg(short = 't', long = "type", default_value = "ca")]
    kind: CertType,

    /// Accept whatever TLS certificate the appliance presents.
    ///
    /// Needed for appliances still running their factory self-signed
    /// certificate; disables all transport authentication for this run.
    #[arg(long)]
    insecure: bool,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10, value_name = "SECONDS")]
    timeout: u64,
}

fn main() {
    let args = Cli::parse();

    if let Err(err) = run(&args) {
        eprintln!("{} {err:#}", "error:".red().bold());
        process::exit(1);
    }
}

fn run(args: &Cli) -> Result<()> {
    if args.insecure {
        eprintln!(
            "{}",
            "warning: TLS certificate verification is disabled for this run"
                .yellow()
                .bold()
        );
    }

    let client = ApplianceClient::new(
        &args.host,
        Duration::from_secs(args.timeout),
        args.insecure,
    )
    .context("failed to set up HTTP client")?;

    let session = client.login(&args.username, &args.password)?;
    eprintln!("{}", "✓ Logged in successfully".green());

    let cert = CertRef {
        kind: args.kind,
        name: args.cert_name.clone(),
    };
    let pem = client.fetch_certificate(&session, &cert)?;

    let report = CertReport::parse(&pem)
        .with_context(|| format!("could not decode certificate {:?}", cert.name))?;
    print!("{}", report.render(&cert, Utc::now()));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_appliance_conventions() {
        let cli = Cli::try_parse_from([
            "fortitool",
            "fw1.example.com",
            "root-ca",
            "--password",
            "pw",
        ])
        .unwrap();
        assert_eq!(cli.username, "jsonadmin");
        assert_eq!(cli.kind, CertType::Ca);
        assert!(!cli.insecure);
        assert_eq!(cli.timeout, 10);
    }

    #[test]
    fn password_is_required() {
        assert!(Cli::try_parse_from(["fortitool", "fw1.example.com", "root-ca"]).is_err());
    }

    #[test]
    fn store_type_is_validated() {
        let cli = Cli::try_parse_from([
            "fortitool",
            "fw1.example.com",
            "gui-cert",
            "--password",
            "pw",
            "--type",
            "local",
        ])
        .unwrap();
        assert_eq!(cli.kind, CertType::Local);

        assert!(Cli::try_parse_from([
            "fortitool",
            "fw1.example.com",
            "gui-cert",
            "--password",
            "pw",
            "--type",
            "remote",
        ])
        .is_err());
    }
}
