//! Step summary for attestation publishing

use tracing::info;

use super::types::{
    EchoedRequest, PublishErrorResponse, PublishFailedItem, PublishSubject, PublishSuccessItem,
    PublishSuccessResponse,
};
use crate::error::Result;
use crate::report::{self, ReportContext, Reporter, Verdict};
use crate::summary::{Cell, Row, Summary};

const HEADER_IMAGE: &str = "https://raw.githubusercontent.com/gradle/develocity-provenance-governor-actions/cf78bf3e54d43cf9806a3ee3bbc7e2a4683ff786/src/publish/publish-header.svg";

/// Code blocks shorter than this (in UTF-16 units) are expanded by default
const AUTO_EXPAND_LIMIT: usize = 1000;

/// Renders publish responses into the step summary
#[derive(Debug, Default, Clone, Copy)]
pub struct PublishReporter;

impl Reporter for PublishReporter {
    type Subject = PublishSubject;
    type Success = PublishSuccessResponse;

    fn report_success(
        &self,
        subject: &PublishSubject,
        result: &PublishSuccessResponse,
        ctx: &mut ReportContext<'_>,
    ) -> Result<Verdict> {
        info!(
            "Attestation publishing for subject: {} completed successfully!",
            subject.name
        );

        header(ctx.summary, "Attestations Published");
        subject_info(
            ctx.summary,
            subject,
            result.request.as_ref(),
            first_store_uri(Some(&result.successes), None),
        );

        let mut rows: Vec<Row> = vec![header_row()];
        rows.extend(sorted_by_resource(&result.successes).into_iter().map(success_row));
        ctx.summary.add_table(&rows);

        Ok(Verdict::Passed)
    }

    fn report_error(
        &self,
        subject: &PublishSubject,
        payload: &serde_json::Value,
        ctx: &mut ReportContext<'_>,
    ) -> Result<Verdict> {
        let result: PublishErrorResponse = report::decode_error(payload);

        header(ctx.summary, "Attestations Publishing Failed");

        if ctx.strict {
            ctx.step.set_failed(format!(
                "Attestation publishing for subject {} errored",
                subject.name
            ));
            ctx.step.error(format!(
                "Error response: {}",
                serde_json::to_string_pretty(payload)?
            ));
        }

        report::report_problem_details(ctx.summary, &result.problem);

        if result.has_items() {
            subject_info(
                ctx.summary,
                subject,
                result.request.as_ref(),
                first_store_uri(result.successes.as_deref(), result.errors.as_deref()),
            );

            let mut rows: Vec<Row> = vec![error_header_row()];
            if let Some(errors) = &result.errors {
                rows.extend(errors.iter().map(error_row));
            }
            if let Some(successes) = &result.successes {
                rows.extend(sorted_by_resource(successes).into_iter().map(success_row));
            }
            ctx.summary.add_table(&rows);
            ctx.summary.add_eol();
        }

        Ok(Verdict::Failed)
    }
}

fn header(summary: &mut Summary, heading: &str) {
    report::header(summary, HEADER_IMAGE, "Attestation Publisher", heading);
}

fn first_store_uri<'a>(
    successes: Option<&'a [PublishSuccessItem]>,
    errors: Option<&'a [PublishFailedItem]>,
) -> Option<&'a str> {
    successes
        .and_then(|s| s.first())
        .map(|s| s.store_uri.as_str())
        .or_else(|| errors.and_then(|e| e.first()).map(|e| e.store_uri.as_str()))
        .map(|uri| uri.trim_end_matches('/'))
}

/// Browse link for the published artifact in the store UI
fn artifact_ui_uri(request: &EchoedRequest, store_uri: &str) -> Option<String> {
    let repository = request
        .criteria
        .repository_url
        .split('/')
        .nth(1)
        .filter(|s| !s.is_empty())?;

    Some(format!(
        "{}/ui/repos/tree/General/{}/{}/{}",
        store_uri, repository, request.pkg.name, request.pkg.version
    ))
}

fn subject_info(
    summary: &mut Summary,
    subject: &PublishSubject,
    request: Option<&EchoedRequest>,
    store_uri: Option<&str>,
) {
    let ui_uri = match (request, store_uri) {
        (Some(request), Some(store_uri)) => artifact_ui_uri(request, store_uri),
        _ => None,
    };

    summary.add_raw("**Subject:** ");
    match ui_uri {
        Some(uri) => {
            summary.add_link(&subject.name, &uri);
        }
        None => {
            summary.add_raw("`").add_raw(&subject.name).add_raw("`");
        }
    }
    summary
        .add_eol()
        .add_raw("**Digest:** `")
        .add_raw(&subject.digest.sha256)
        .add_raw("`")
        .add_eol()
        .add_eol();
}

fn header_row() -> Row {
    vec![
        Cell::header("Type"),
        Cell::header("Published"),
        Cell::header("Attestation"),
    ]
}

fn error_header_row() -> Row {
    vec![
        Cell::header("Type"),
        Cell::header("Published"),
        Cell::header("Details"),
    ]
}

/// Order items by store type, then predicate type
fn sorted_by_resource(items: &[PublishSuccessItem]) -> Vec<&PublishSuccessItem> {
    let mut sorted: Vec<&PublishSuccessItem> = items.iter().collect();
    sorted.sort_by(|a, b| {
        a.store_type
            .cmp(&b.store_type)
            .then_with(|| a.store_response.predicate_type.cmp(&b.store_response.predicate_type))
    });
    sorted
}

fn success_row(item: &PublishSuccessItem) -> Row {
    let predicate_type = &item.store_response.predicate_type;
    let download = format!("[Download]({})", item.download_uri());

    let attestation = match item
        .store_request
        .statement()
        .and_then(|statement| statement.predicate_json())
    {
        Some(predicate) => {
            let code_block = format!("\n```json\n{}\n```\n", predicate);
            let open = if code_block.encode_utf16().count() < AUTO_EXPAND_LIMIT {
                "open"
            } else {
                ""
            };
            let details = format!(
                "\n<details {}>\n\n<summary>Attestation</summary>\n{}\n\n</details>",
                open, code_block
            );
            format!("\n\n{}\n\n{}\n", details, download)
        }
        None => format!("\n\n{}\n", download),
    };

    vec![
        Cell::new(format!("\n\n`{}`", predicate_type)),
        Cell::new("✅"),
        Cell::new(attestation),
    ]
}

fn error_row(item: &PublishFailedItem) -> Row {
    let predicate_type = item
        .store_request
        .statement()
        .map(|statement| statement.predicate_type)
        .unwrap_or_else(|| "Unknown".to_string());

    vec![
        Cell::new(format!("\n\n`{}`", predicate_type)),
        Cell::new("❌"),
        Cell::new(item.store_response.message.clone()),
    ]
}
