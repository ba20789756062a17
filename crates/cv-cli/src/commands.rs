//! Subcommands

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use cv_engine::Config;
use cv_manifest::{
    merkle_root, normalize_hash, validate_company_manifest, validate_manifest, BackupHashPolicy,
    ManifestFailure, ManifestPayload,
};
use cv_net::{AttestationError, HttpAttestation, RootHashSource};
use cv_security::{check_document_csp_headers, CspHeaders};

/// Root hash supplied on the command line
struct TrustedRoot(String);

impl RootHashSource for TrustedRoot {
    async fn fetch_root_hash(&self, _host: &str, _version: &str) -> Result<String, AttestationError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Args)]
pub struct ManifestArgs {
    /// Manifest JSON file
    pub path: PathBuf,

    /// Root hash to verify against instead of the attestation endpoint
    #[arg(long)]
    pub trusted_root: Option<String>,

    /// Engine configuration used with --online
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verify as a company-wide combined-hash manifest
    #[arg(long)]
    pub company: bool,

    /// Fetch the trusted root from the attestation endpoint
    #[arg(long, conflicts_with = "trusted_root")]
    pub online: bool,

    /// Refuse the backup hash fallback
    #[arg(long)]
    pub no_backup: bool,
}

#[derive(Debug, Args)]
pub struct CspArgs {
    /// Host the document was served from
    pub host: String,

    /// Enforced Content-Security-Policy header value (repeatable)
    #[arg(long)]
    pub enforce: Vec<String>,

    /// Content-Security-Policy-Report-Only header value (repeatable)
    #[arg(long = "report")]
    pub report_only: Vec<String>,
}

/// `codeverify manifest`: rebuild a manifest's root and optionally verify it
/// against a trusted root.
pub fn manifest(args: ManifestArgs) -> Result<()> {
    let path = args.path.display();
    let text = std::fs::read_to_string(&args.path).with_context(|| format!("reading {path}"))?;
    let payload: ManifestPayload =
        serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
    tracing::debug!("loaded manifest {} v{} from {}", payload.host, payload.version, path);

    let rebuilt = merkle_root(&payload.leaves).context("rebuilding Merkle root")?;
    let claimed = normalize_hash(&payload.root_hash);
    println!("leaves:       {}", payload.leaves.len());
    println!("claimed root: {claimed}");
    println!("rebuilt root: {rebuilt}");

    let backup = if args.no_backup {
        BackupHashPolicy::Deny
    } else {
        BackupHashPolicy::Allow
    };

    let result: Result<(), ManifestFailure> = if let Some(root) = args.trusted_root {
        let source = TrustedRoot(root);
        smol::block_on(verify(&payload, &source, args.company, backup))
    } else if args.online {
        let config = match &args.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        let source = HttpAttestation::new(
            &config.attestation_endpoint,
            config.request_timeout(),
            config.retry,
        )?;
        smol::block_on(verify(&payload, &source, args.company, config.backup_policy()))
    } else if rebuilt == claimed {
        Ok(())
    } else {
        Err(ManifestFailure::RootHashVerifyFailInPage)
    };

    match result {
        Ok(()) => {
            println!("verdict:      valid");
            Ok(())
        }
        Err(failure) => bail!("verdict: invalid ({})", failure.code()),
    }
}

async fn verify<S: RootHashSource>(
    payload: &ManifestPayload,
    source: &S,
    company: bool,
    backup: BackupHashPolicy,
) -> Result<(), ManifestFailure> {
    if company {
        validate_company_manifest(payload, source).await
    } else {
        validate_manifest(payload, source, backup).await
    }
}

/// `codeverify csp`: run the document CSP checks over raw header values.
pub fn csp(args: CspArgs) -> Result<()> {
    let CspArgs { host, enforce, report_only } = args;

    let headers = CspHeaders::parse(&enforce, &report_only);
    tracing::debug!("{} enforced and {} report-only policies", headers.enforce.len(), headers.report_only.len());
    let mut relies_on_reports = false;
    let result = check_document_csp_headers(&headers, &host, &mut || relies_on_reports = true);

    match result {
        Ok(scopes) => {
            println!("verdict: valid");
            if relies_on_reports {
                println!("note:    eval is only reported, violation reports must be watched");
            }
            for (i, scope) in scopes.iter().enumerate() {
                let mut tokens: Vec<&str> = scope.iter().map(String::as_str).collect();
                tokens.sort_unstable();
                println!("worker scope {}: {}", i + 1, tokens.join(" "));
            }
            Ok(())
        }
        Err(failure) => bail!("verdict: invalid ({failure})"),
    }
}
