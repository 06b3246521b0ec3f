use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn render(kind: &str, status: &str, name: &str) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("provenance-governor");
    cmd.env_clear()
        .args(["render", "--kind", kind, "--status", status])
        .arg(fixture(name));
    cmd
}

#[test]
fn publish_success_lists_every_attestation() {
    render("publish", "200", "publish-success.json")
        .assert()
        .success()
        .stdout(contains("# Attestations Published\n\n"))
        .stdout(contains(
            "**Subject:** <a href=\"https://artifactory.example.com/ui/repos/tree/General/libs-release/app/1.0.0\">pkg:maven/com.example/app@1.0.0</a>\n",
        ))
        .stdout(contains("<th>Type</th><th>Published</th><th>Attestation</th>"))
        .stdout(contains("\"testsExecuted\": 120"))
        .stdout(contains("ui/api/v1/download/libs-release/com/example/app/1.0.0/provenance.json"))
        .stdout(contains("::error::").not());
}

#[test]
fn publish_partial_failure_shows_both_outcomes() {
    render("publish", "500", "publish-partial.json")
        .assert()
        .success()
        .stdout(contains("# Attestations Publishing Failed\n\n"))
        .stdout(contains("**Error:** Partial failure\n\n> 1 of 2 attestations could not be stored\n\n"))
        .stdout(contains("<th>Type</th><th>Published</th><th>Details</th>"))
        .stdout(contains("<td>\n\n`https://gradle.com/tests/v1`</td><td>❌</td><td>Evidence signing key is not trusted</td>"))
        .stdout(contains("`https://slsa.dev/provenance/v1`</td><td>✅</td>"));
}

#[test]
fn policy_report_written_to_file() {
    let dir = TempDir::new().expect("temp dir");
    let out = dir.path().join("summary.md");

    render("policy", "200", "policy-unsatisfied.json")
        .arg("-o")
        .arg(&out)
        .args(["--policy-scan", "release", "--enforcement-point", "deploy"])
        .assert()
        .success();

    let summary = std::fs::read_to_string(&out).expect("summary written");
    assert!(summary.contains("# Policy Scan Evaluated - ❌ UNSATISFIED\n\n"));
    assert!(summary.contains("**Policy Scan:** `release`\n\n**Enforcement Point:** `deploy`\n\n"));
    assert!(summary.contains("## <a name=\"policy-detail-0\"></a> Policy `reproducible`"));
    assert!(summary.contains("## <a name=\"policy-detail-1\"></a> Policy `no-failing-tests`"));
    assert!(summary.contains("**Remediation:** Fix the failing tests and rebuild\n\n"));
    assert!(summary.contains("[Build Scan](https://ge.example.com/s/abc123)"));
    assert!(summary.contains("<td>\n\n`hermetic`\n</td><td>\n\n`slsa`\n</td><td>N/A</td><td>0 / 0</td>"));
    assert!(summary.contains("<details><summary>All Results</summary>"));
}

#[test]
fn ignored_policy_keeps_its_row_but_not_its_details() {
    render("policy", "200", "policy-unsatisfied.json")
        .args(["--ignore-policies-with-labels", "tier=experimental"])
        .assert()
        .success()
        .stdout(contains("❌ UNSATISFIED"))
        .stdout(contains("<td>❌ (ignored)</td>"))
        .stdout(contains("[Link](#user-content-policy-detail-1)"))
        .stdout(contains("policy-detail-0").not());
}

#[test]
fn every_failure_ignored_is_satisfied() {
    render("policy", "200", "policy-unsatisfied.json")
        .args(["--ignore-policies-with-labels", "tier=experimental\n\nteam=platform"])
        .assert()
        .success()
        .stdout(contains("# Policy Scan Evaluated - ✅ SATISFIED"))
        .stdout(contains("# Failed Policies").not());
}

#[test]
fn policy_error_response() {
    render("policy", "404", "policy-error.json")
        .assert()
        .success()
        .stdout(contains("# Policy Scan Evaluation - ⛔ Error\n\n"))
        .stdout(contains("**Error:** Policy scan not found\n\n"))
        .stdout(contains("**Type:** urn:governor:unknown-scan\n\n"));
}

#[test]
fn invalid_label_matcher_is_rejected() {
    render("policy", "200", "policy-unsatisfied.json")
        .args(["--ignore-policies-with-labels", "tier"])
        .assert()
        .failure()
        .stderr(contains("Invalid label matcher format. Expected '{key}={value}'."));
}

#[test]
fn rendering_is_repeatable() {
    let first = render("policy", "200", "policy-unsatisfied.json").output().expect("first run");
    let second = render("policy", "200", "policy-unsatisfied.json").output().expect("second run");
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
}
