//! Code Verify - operator command line

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codeverify")]
#[command(about = "Check page manifests and CSP headers offline or against the attestation endpoint", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild a manifest's Merkle root and verify it
    Manifest(commands::ManifestArgs),

    /// Run the document CSP checks over raw header values
    Csp(commands::CspArgs),
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Manifest(args) => commands::manifest(args),
        Commands::Csp(args) => commands::csp(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_manifest_flags() {
        let cli = Cli::try_parse_from(["codeverify", "manifest", "m.json", "--trusted-root", "ab", "--company"]).unwrap();
        let Commands::Manifest(args) = cli.command else {
            panic!("expected manifest command");
        };
        assert_eq!(args.path.to_str(), Some("m.json"));
        assert_eq!(args.trusted_root.as_deref(), Some("ab"));
        assert!(args.company);
        assert!(!args.online);

        assert!(Cli::try_parse_from(["codeverify", "manifest", "--trusted-root"]).is_err());
        assert!(Cli::try_parse_from(["codeverify", "manifest", "a.json", "b.json"]).is_err());
        assert!(Cli::try_parse_from(["codeverify", "manifest", "a.json", "--verbose"]).is_err());
        assert!(Cli::try_parse_from(["codeverify", "manifest", "a.json", "--online", "--trusted-root", "ab"]).is_err());
    }

    #[test]
    fn test_csp_repeated_headers() {
        let cli = Cli::try_parse_from([
            "codeverify",
            "csp",
            "example.com",
            "--enforce",
            "script-src 'self'",
            "--enforce",
            "worker-src https://example.com/w/",
            "--report",
            "default-src 'self'",
        ])
        .unwrap();
        let Commands::Csp(args) = cli.command else {
            panic!("expected csp command");
        };
        assert_eq!(args.host, "example.com");
        assert_eq!(args.enforce.len(), 2);
        assert_eq!(args.report_only, vec!["default-src 'self'".to_string()]);

        assert!(Cli::try_parse_from(["codeverify", "csp", "--enforce", "script-src 'self'"]).is_err());
    }
}
