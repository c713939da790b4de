use crate::infra::{InMemoryDirectory, InMemoryMatchRunRepository};
use crate::seed::{sample_application, seed_directory, SAMPLE_LOAN};
use clap::Args;
use lender_match::config::UnderwritingConfig;
use lender_match::error::AppError;
use lender_match::workflows::underwriting::{MatchResult, MatchRun, RunStatus, UnderwritingService};
use std::sync::Arc;

const DEFAULT_AMOUNT: f64 = 50_000.0;
const DEFAULT_TERM_MONTHS: u32 = 36;
const DEFAULT_FICO: u16 = 690;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Requested loan amount. Defaults to 50000.
    #[arg(long)]
    pub(crate) amount: Option<f64>,
    /// Requested term in months. Defaults to 36.
    #[arg(long)]
    pub(crate) term_months: Option<u32>,
    /// Primary guarantor FICO score. Defaults to 690.
    #[arg(long)]
    pub(crate) fico: Option<u16>,
    /// Print the match run as JSON instead of a ranked table.
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let as_json = args.json;
    let (run, directory) = underwrite_sample(args).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!("{}", render_run(&run, &directory));
    }
    Ok(())
}

pub(crate) async fn underwrite_sample(
    args: DemoArgs,
) -> Result<(MatchRun, Arc<InMemoryDirectory>), AppError> {
    let application = sample_application(
        args.amount.unwrap_or(DEFAULT_AMOUNT),
        args.term_months.unwrap_or(DEFAULT_TERM_MONTHS),
        args.fico.unwrap_or(DEFAULT_FICO),
    );

    let directory = Arc::new(seed_directory());
    directory.file_application(SAMPLE_LOAN, application);
    let service = UnderwritingService::new(
        directory.clone(),
        Arc::new(InMemoryMatchRunRepository::default()),
        UnderwritingConfig::default(),
    );

    let run = service.run_match(SAMPLE_LOAN).await?;
    Ok((run, directory))
}

fn label(result: &MatchResult, directory: &InMemoryDirectory) -> String {
    let lender = directory
        .lender_name(result.lender_id)
        .unwrap_or_else(|| format!("Lender {}", result.lender_id));
    let program = directory
        .program_name(result.lender_program_id)
        .unwrap_or_else(|| format!("Program {}", result.lender_program_id));
    format!("{lender} / {program}")
}

pub(crate) fn render_run(run: &MatchRun, directory: &InMemoryDirectory) -> String {
    let mut lines = vec![format!(
        "Match run {} for loan request {} ({})",
        run.id,
        run.loan_request_id,
        run.status.label()
    )];

    if run.status == RunStatus::Failed {
        let message = run
            .failure
            .as_ref()
            .map(|failure| failure.message.as_str())
            .unwrap_or("no failure recorded");
        lines.push(format!("Run failed: {message}"));
        return lines.join("\n");
    }

    let ranked = run.ranked();
    lines.push(format!("Eligible programs ({}):", ranked.len()));
    for (position, result) in ranked.iter().enumerate() {
        lines.push(format!(
            "  {}. {:<48} fit {:>5.1}",
            position + 1,
            label(result, directory),
            result.fit_score
        ));
        for reason in &result.reasons {
            lines.push(format!("       - {reason}"));
        }
    }

    let declined: Vec<&MatchResult> = run
        .results
        .iter()
        .filter(|result| !result.eligible && result.fault.is_none())
        .collect();
    if !declined.is_empty() {
        lines.push(format!("Declined programs ({}):", declined.len()));
        for result in declined {
            lines.push(format!(
                "  - {}: {}",
                label(result, directory),
                result.reasons.join("; ")
            ));
        }
    }

    let faulted: Vec<&MatchResult> = run
        .results
        .iter()
        .filter(|result| result.fault.is_some())
        .collect();
    if !faulted.is_empty() {
        lines.push(format!("Programs with faults ({}):", faulted.len()));
        for result in faulted {
            if let Some(fault) = &result.fault {
                lines.push(format!(
                    "  - {}: {}",
                    label(result, directory),
                    fault.message
                ));
            }
        }
    }

    lines.join("\n")
}
