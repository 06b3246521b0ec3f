use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use provenance_governor::client::{fetch_id_token, ApiClient, Credentials};
use provenance_governor::error::Error;
use provenance_governor::policy::{self, PolicyInputs, PolicyReporter, PolicySubject};
use provenance_governor::publish::{self, BuildScanCriteria, PublishInputs, PublishReporter, PublishSubject};
use provenance_governor::report::{ReportContext, Reporter, Verdict};
use provenance_governor::step::StepStatus;
use provenance_governor::subject::{Digest, PackageUrl};
use provenance_governor::summary::Summary;

/// Publish attestations and evaluate policy scans from CI
#[derive(Parser)]
#[command(name = "provenance-governor", version, about)]
struct Cli {
    /// Log filter, e.g. `info` or `provenance_governor=debug`
    #[arg(long, global = true, env = "PROVENANCE_GOVERNOR_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish attestations for a subject from build scans
    Publish(PublishArgs),

    /// Evaluate a policy scan against a subject
    Evaluate(EvaluateArgs),

    /// Render a stored API response without calling any service
    Render(RenderArgs),
}

#[derive(Args)]
struct SubjectArgs {
    #[arg(long, env = "INPUT_TENANT")]
    tenant: Option<String>,

    #[arg(long, env = "INPUT_SUBJECT-TYPE")]
    subject_type: Option<String>,

    #[arg(long, env = "INPUT_SUBJECT-NAMESPACE")]
    subject_namespace: Option<String>,

    #[arg(long, env = "INPUT_SUBJECT-NAME")]
    subject_name: Option<String>,

    #[arg(long, env = "INPUT_SUBJECT-VERSION")]
    subject_version: Option<String>,

    /// sha256 hex digest, optionally prefixed with `sha256:`
    #[arg(long, env = "INPUT_SUBJECT-DIGEST")]
    subject_digest: Option<String>,

    #[arg(long, env = "INPUT_SUBJECT-REPOSITORY-URL")]
    subject_repository_url: Option<String>,
}

#[derive(Args)]
struct AuthArgs {
    #[arg(long, env = "INPUT_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "INPUT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args)]
struct SummaryArgs {
    /// File the step summary is appended to; printed to stdout when unset
    #[arg(long, env = "GITHUB_STEP_SUMMARY")]
    summary_file: Option<PathBuf>,
}

#[derive(Args)]
struct PublishArgs {
    #[arg(long, env = "INPUT_ATTESTATION-PUBLISHER-URL")]
    attestation_publisher_url: Option<String>,

    /// Newline separated build scan ids
    #[arg(long, env = "INPUT_BUILD-SCAN-IDS")]
    build_scan_ids: Option<String>,

    /// Newline separated build scan queries
    #[arg(long, env = "INPUT_BUILD-SCAN-QUERIES")]
    build_scan_queries: Option<String>,

    #[command(flatten)]
    subject: SubjectArgs,

    #[command(flatten)]
    auth: AuthArgs,

    #[command(flatten)]
    output: SummaryArgs,
}

#[derive(Args)]
struct EvaluateArgs {
    #[arg(long, env = "INPUT_POLICY-EVALUATOR-URL")]
    policy_evaluator_url: Option<String>,

    #[arg(long, env = "INPUT_POLICY-SCAN")]
    policy_scan: Option<String>,

    #[arg(long, env = "INPUT_ENFORCEMENT-POINT")]
    enforcement_point: Option<String>,

    /// Label matchers; blank lines separate alternative sets
    #[arg(long, env = "INPUT_IGNORE-POLICIES-WITH-LABELS")]
    ignore_policies_with_labels: Option<String>,

    #[command(flatten)]
    subject: SubjectArgs,

    #[command(flatten)]
    auth: AuthArgs,

    #[command(flatten)]
    output: SummaryArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportKind {
    Publish,
    Policy,
}

#[derive(Args)]
struct RenderArgs {
    /// Which report the response belongs to
    #[arg(long, value_enum)]
    kind: ReportKind,

    /// HTTP status the response was received with
    #[arg(long, default_value_t = 200)]
    status: u16,

    /// JSON response body
    input: PathBuf,

    /// Output file; stdout when unset
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, default_value = "pkg:maven/com.example/app@1.0.0")]
    subject: String,

    #[arg(
        long,
        default_value = "c8d8f52ac5cd63188e705ac55dd01ee3a22f419a6b311175f84d965573af563b"
    )]
    digest: String,

    #[arg(long, default_value = "policy-scan")]
    policy_scan: String,

    #[arg(long)]
    enforcement_point: Option<String>,

    #[arg(long)]
    ignore_policies_with_labels: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let failed = match cli.command {
        Command::Publish(args) => {
            let summary_file = args.output.summary_file.clone();
            let mut step = Step::new();
            let outcome = run_publish(args, &mut step.context()).await;
            step.finish(outcome, summary_file.as_deref())?
        }
        Command::Evaluate(args) => {
            let summary_file = args.output.summary_file.clone();
            let mut step = Step::new();
            let outcome = run_evaluate(args, &mut step.context()).await;
            step.finish(outcome, summary_file.as_deref())?
        }
        Command::Render(args) => {
            render(args)?;
            false
        }
    };

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Summary and status of one CI step invocation
struct Step {
    summary: Summary,
    status: StepStatus,
}

impl Step {
    fn new() -> Self {
        Self {
            summary: Summary::new(),
            status: StepStatus::github(),
        }
    }

    fn context(&mut self) -> ReportContext<'_> {
        ReportContext::new(&mut self.summary, &mut self.status, true)
    }

    /// Any error fails the step; the summary is written either way.
    /// Returns whether the step failed.
    fn finish(mut self, outcome: Result<Verdict>, summary_file: Option<&Path>) -> Result<bool> {
        match outcome {
            Ok(verdict) => debug!("Step finished with verdict {:?}", verdict),
            Err(e) => self
                .status
                .set_failed(format!("Action failed with error: {}", e)),
        }

        write_summary(&mut self.summary, summary_file)?;
        Ok(self.status.is_failed())
    }
}

fn write_summary(summary: &mut Summary, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => summary
            .write(path)
            .with_context(|| format!("writing step summary to {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(summary.stringify().as_bytes())?;
            summary.clear();
            Ok(())
        }
    }
}

async fn run_publish(args: PublishArgs, ctx: &mut ReportContext<'_>) -> Result<Verdict> {
    let publisher_url = required("attestation-publisher-url", args.attestation_publisher_url)?;
    let inputs = PublishInputs {
        tenant: required("tenant", args.subject.tenant.clone())?,
        purl: package_url(&args.subject)?,
        digest: digest(&args.subject)?,
        repository_url: required("subject-repository-url", args.subject.subject_repository_url.clone())?,
        build_scan: BuildScanCriteria {
            ids: multiline(args.build_scan_ids.as_deref()),
            queries: multiline(args.build_scan_queries.as_deref()),
        },
    };

    // no identity token is requested for a step that cannot run
    if !publish::ensure_build_scans(&inputs, ctx.step) {
        return Ok(Verdict::Failed);
    }

    let client = ApiClient::new(publisher_url.as_str(), credentials(&args.auth).await?);
    Ok(publish::run(&client, &publisher_url, &inputs, ctx).await?)
}

async fn run_evaluate(args: EvaluateArgs, ctx: &mut ReportContext<'_>) -> Result<Verdict> {
    let evaluator_url = required("policy-evaluator-url", args.policy_evaluator_url)?;
    let inputs = PolicyInputs {
        tenant: required("tenant", args.subject.tenant.clone())?,
        policy_scan: required("policy-scan", args.policy_scan)?,
        enforcement_point: present(args.enforcement_point),
        purl: package_url(&args.subject)?,
        digest: digest(&args.subject)?,
        repository_url: required("subject-repository-url", args.subject.subject_repository_url.clone())?,
        // malformed matchers fail the step before any token or evaluator request
        ignore_labels: policy::parse_ignore_labels(
            args.ignore_policies_with_labels.as_deref().unwrap_or_default(),
        )?,
    };

    let client = ApiClient::new(evaluator_url.as_str(), credentials(&args.auth).await?);
    Ok(policy::run(&client, &evaluator_url, &inputs, ctx).await?)
}

/// Render a stored response offline, never failing on the report's verdict
fn render(args: RenderArgs) -> Result<()> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.input.display()))?;
    let digest = Digest::parse(&args.digest)?;
    let ignore = policy::parse_ignore_labels(
        args.ignore_policies_with_labels.as_deref().unwrap_or_default(),
    )?;

    let mut summary = Summary::new();
    let mut step = StepStatus::recording();
    let outcome = {
        let mut ctx = ReportContext::new(&mut summary, &mut step, false);
        match args.kind {
            ReportKind::Publish => {
                let subject = PublishSubject::new(args.subject.clone(), digest);
                PublishReporter.report(args.status, &subject, Some(payload), &mut ctx)
            }
            ReportKind::Policy => {
                let subject = PolicySubject::new(
                    args.policy_scan.clone(),
                    args.enforcement_point.clone(),
                    args.subject.clone(),
                    digest,
                );
                PolicyReporter::with_ignored_labels(ignore).report(
                    args.status,
                    &subject,
                    Some(payload),
                    &mut ctx,
                )
            }
        }
    };

    // whatever was rendered is written out, even when the report errored
    match &args.output {
        Some(path) => fs::write(path, summary.stringify())
            .with_context(|| format!("writing {}", path.display()))?,
        None => write_summary(&mut summary, None)?,
    }

    let verdict = outcome?;
    info!("Rendered report with verdict {:?}", verdict);
    Ok(())
}

/// Explicit username and password win; otherwise the CI identity token is
/// used as a bearer token.
async fn credentials(auth: &AuthArgs) -> Result<Credentials> {
    let username = present(auth.username.clone());
    let password = present(auth.password.clone());

    if let (Some(username), Some(password)) = (username, password) {
        return Ok(Credentials::Basic { username, password });
    }

    let request_url = std::env::var("ACTIONS_ID_TOKEN_REQUEST_URL").ok();
    let request_token = std::env::var("ACTIONS_ID_TOKEN_REQUEST_TOKEN").ok();
    let token = fetch_id_token(request_url.as_deref(), request_token.as_deref()).await?;
    Ok(Credentials::Token(token))
}

fn package_url(subject: &SubjectArgs) -> Result<PackageUrl> {
    Ok(PackageUrl::new(
        required("subject-type", subject.subject_type.clone())?,
        present(subject.subject_namespace.clone()),
        required("subject-name", subject.subject_name.clone())?,
        required("subject-version", subject.subject_version.clone())?,
    ))
}

fn digest(subject: &SubjectArgs) -> Result<Digest> {
    let value = required("subject-digest", subject.subject_digest.clone())?;
    Ok(Digest::parse(&value)?)
}

/// Trimmed value, with empty strings treated as absent
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &str, value: Option<String>) -> Result<String> {
    present(value).ok_or_else(|| Error::MissingInput(name.to_string()).into())
}

/// Split a multiline input into its non-empty trimmed lines
fn multiline(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
