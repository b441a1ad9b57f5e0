//! Read-only review artifacts derived from a finalized ledger: a Mermaid
//! sequence diagram, Markdown and plain-text transcripts, and a workflow
//! outline. None of these mutate the ledger; all reject one that is
//! still being appended to.

use review_audit_core::{
    format_rfc3339, humanize_tag, is_parse_failure, phase_banner, phase_display_name, summarize,
    Agent, AuditError, Interaction, Ledger, Summary, REVISION_ACTION,
};
use review_audit_workflow::{reconstruct, GroupKind};
use serde_json::{Map, Value};

const PARSE_FAILURE_LABEL: &str = "[parse failure]";

/// Emits a Mermaid sequence diagram with two participants. Provider
/// interactions are forward messages, payor interactions reply messages;
/// environment and unrecognized agents become annotations so no
/// interaction is ever dropped. A phase-boundary note precedes every
/// phase change.
///
/// # Errors
/// Returns [`AuditError::UnfinalizedLedger`] for an in-progress ledger.
pub fn mermaid_diagram(ledger: &Ledger) -> Result<String, AuditError> {
    if !ledger.is_finalized() {
        return Err(AuditError::UnfinalizedLedger(ledger.case_id().to_string()));
    }

    let mut lines = vec![
        "sequenceDiagram".to_string(),
        "    participant Provider as Provider Agent".to_string(),
        "    participant Payor as Payor Agent".to_string(),
        String::new(),
    ];

    let mut current_phase: Option<&str> = None;
    for interaction in ledger.interactions() {
        if current_phase != Some(interaction.phase.as_str()) {
            current_phase = Some(interaction.phase.as_str());
            lines.push(format!(
                "    Note over Provider,Payor: {}",
                phase_banner(&interaction.phase)
            ));
            lines.push(String::new());
        }

        let label = action_label(interaction);
        match &interaction.agent {
            Agent::Provider => lines.push(format!("    Provider->>Payor: {label}")),
            Agent::Payor => lines.push(format!("    Payor-->>Provider: {label}")),
            Agent::Environment | Agent::Other(_) => {
                lines.push(format!(
                    "    Note over Provider,Payor: {}: {label}",
                    humanize_tag(interaction.agent.as_str())
                ));
            }
        }

        if let Some(note) = metadata_note(&interaction.metadata) {
            let anchor = match &interaction.agent {
                Agent::Provider => "Provider".to_string(),
                Agent::Payor => "Payor".to_string(),
                Agent::Environment | Agent::Other(_) => "Provider,Payor".to_string(),
            };
            lines.push(format!("    Note over {anchor}: {note}"));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

/// Maps `(action, parsed_output)` to a diagram label. Recognized review
/// actions carry their decision details; everything else degrades to a
/// title-cased tag. Parse failures are flagged, never omitted.
fn action_label(interaction: &Interaction) -> String {
    let parsed = &interaction.parsed_output;
    let base = match interaction.action.as_str() {
        "pa_request" | "medication_pa_request" => format!(
            "PA Request: {}",
            str_field(parsed, "medication_name").unwrap_or("medication")
        ),
        "pa_decision" => pa_decision_label(parsed),
        "pa_appeal_submission" => appeal_submission_label(parsed),
        "pa_appeal_decision" => appeal_decision_label(parsed),
        "claim_submission" => claim_submission_label(parsed),
        "claim_adjudication" => claim_adjudication_label(parsed),
        other => humanize_tag(other),
    };

    if is_parse_failure(interaction) {
        format!("{base} {PARSE_FAILURE_LABEL}")
    } else {
        base
    }
}

fn pa_decision_label(parsed: &Map<String, Value>) -> String {
    let status = str_field(parsed, "authorization_status").unwrap_or("unknown");
    let denial_reason = str_field(parsed, "denial_reason").unwrap_or("");

    if status == "denied" && !denial_reason.is_empty() {
        format!("PA DENIED: {}", truncate(denial_reason, 40))
    } else if status == "approved" {
        match str_field(parsed, "criteria_used") {
            Some(criteria) if !criteria.is_empty() => {
                format!("PA APPROVED ({})", truncate(criteria, 30))
            }
            _ => "PA APPROVED".to_string(),
        }
    } else {
        format!("PA {}", status.to_uppercase())
    }
}

fn appeal_submission_label(parsed: &Map<String, Value>) -> String {
    let appeal_type = str_field(parsed, "appeal_type").unwrap_or("appeal");
    match str_field(parsed, "additional_evidence") {
        Some(evidence) if !evidence.is_empty() => {
            format!("Appeal ({appeal_type}): {}", truncate(evidence, 35))
        }
        _ => format!("Submit Appeal ({appeal_type})"),
    }
}

fn appeal_decision_label(parsed: &Map<String, Value>) -> String {
    let outcome = str_field(parsed, "appeal_outcome").unwrap_or("unknown");
    let rationale = str_field(parsed, "decision_rationale").unwrap_or("");

    if outcome == "approved" && !rationale.is_empty() {
        format!("Appeal APPROVED: {}", truncate(rationale, 35))
    } else if outcome == "upheld_denial" && !rationale.is_empty() {
        format!("Appeal DENIED: {}", truncate(rationale, 35))
    } else {
        format!("Appeal {}", outcome.to_uppercase())
    }
}

fn claim_submission_label(parsed: &Map<String, Value>) -> String {
    match parsed.get("amount_billed").and_then(Value::as_f64) {
        Some(amount) if amount > 0.0 => format!("Submit Claim (${})", format_amount(amount)),
        _ => "Submit Claim (post-treatment)".to_string(),
    }
}

fn claim_adjudication_label(parsed: &Map<String, Value>) -> String {
    let status = str_field(parsed, "claim_status").unwrap_or("unknown");
    let denial_reason = str_field(parsed, "denial_reason").unwrap_or("");
    let approved_amount = parsed.get("approved_amount").and_then(Value::as_f64);

    if status == "approved" {
        if let Some(amount) = approved_amount {
            return format!("Claim APPROVED (${})", format_amount(amount));
        }
    }
    if status == "denied" && !denial_reason.is_empty() {
        return format!("Claim DENIED: {}", truncate(denial_reason, 40));
    }
    format!("Claim {}", status.to_uppercase())
}

/// Display hints pulled from metadata for annotation notes. Only a fixed
/// set of keys is surfaced; everything else stays passthrough.
fn metadata_note(metadata: &Map<String, Value>) -> Option<String> {
    const HINT_KEYS: [&str; 8] = [
        "medication",
        "denial_reason",
        "appeal_type",
        "pa_approved",
        "iteration",
        "confidence",
        "tests_ordered",
        "tests_denied",
    ];

    let mut parts = Vec::new();
    for key in HINT_KEYS {
        let Some(value) = metadata.get(key) else {
            continue;
        };
        match key {
            "confidence" => {
                if let Some(number) = value.as_f64() {
                    parts.push(format!("Confidence: {number:.2}"));
                }
            }
            "tests_denied" => {
                if let Some(items) = value.as_array() {
                    if !items.is_empty() {
                        parts.push(format!("Denied: {} tests", items.len()));
                    }
                }
            }
            "tests_ordered" => {
                if let Some(items) = value.as_array() {
                    if !items.is_empty() {
                        parts.push(format!("Ordered: {} tests", items.len()));
                    }
                }
            }
            "medication" => {
                if let Some(name) = non_empty_str(value) {
                    parts.push(format!("Medication: {name}"));
                }
            }
            "denial_reason" => {
                if let Some(reason) = non_empty_str(value) {
                    parts.push(format!("Reason: {}", truncate(reason, 30)));
                }
            }
            "appeal_type" => {
                if let Some(kind) = non_empty_str(value) {
                    parts.push(format!("Appeal Type: {kind}"));
                }
            }
            "pa_approved" => {
                if value.as_bool() == Some(true) {
                    parts.push("PA Previously Approved".to_string());
                }
            }
            _ => parts.push(format!("{key}: {}", value_display(value))),
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Renders the full Markdown transcript: header, summary, then one
/// section per interaction with prompts, raw response, and parsed
/// output, in ledger order.
///
/// # Errors
/// Returns [`AuditError::UnfinalizedLedger`] for an in-progress ledger
/// and [`AuditError::Validation`] when a timestamp cannot be formatted.
pub fn markdown_transcript(ledger: &Ledger) -> Result<String, AuditError> {
    let Some(simulation_end) = ledger.simulation_end() else {
        return Err(AuditError::UnfinalizedLedger(ledger.case_id().to_string()));
    };
    let summary = match ledger.summary() {
        Some(summary) => summary.clone(),
        None => summarize(
            ledger.interactions(),
            ledger.simulation_start(),
            simulation_end,
        ),
    };

    let mut lines = vec![
        format!("# Audit Log: {}", ledger.case_id()),
        String::new(),
        format!(
            "**Simulation Start:** {}",
            format_rfc3339(ledger.simulation_start())?
        ),
        format!("**Simulation End:** {}", format_rfc3339(simulation_end)?),
        String::new(),
    ];

    push_summary_section(&mut lines, &summary);
    lines.push("---".to_string());
    lines.push(String::new());

    for (index, interaction) in ledger.interactions().iter().enumerate() {
        lines.push(format!(
            "## Interaction {}: {}",
            index + 1,
            phase_display_name(&interaction.phase)
        ));
        lines.push(String::new());
        lines.push(format!(
            "**Timestamp:** {}",
            format_rfc3339(interaction.timestamp)?
        ));
        lines.push(format!(
            "**Agent:** {}",
            humanize_tag(interaction.agent.as_str())
        ));
        lines.push(format!("**Action:** {}", humanize_tag(&interaction.action)));
        lines.push(String::new());

        if is_parse_failure(interaction) {
            lines.push(
                "> **Warning:** structured output could not be parsed from the raw response."
                    .to_string(),
            );
            lines.push(String::new());
        }

        if !interaction.metadata.is_empty() {
            lines.push("**Metadata:**".to_string());
            for (key, value) in &interaction.metadata {
                match value {
                    Value::Array(_) | Value::Object(_) => {
                        lines.push(format!("- {key}: `{}`", compact_json(value)));
                    }
                    _ => lines.push(format!("- {key}: {}", value_display(value))),
                }
            }
            lines.push(String::new());
        }

        push_fenced_section(&mut lines, "System Prompt", &interaction.system_prompt, "");
        push_fenced_section(&mut lines, "User Prompt", &interaction.user_prompt, "");
        push_fenced_section(&mut lines, "LLM Response", &interaction.llm_response, "");
        push_fenced_section(
            &mut lines,
            "Parsed Output",
            &pretty_json(&Value::Object(interaction.parsed_output.clone())),
            "json",
        );
        lines.push("---".to_string());
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

/// Renders the banner-framed plain-text interaction sequence with
/// truncated prompt/response previews.
///
/// # Errors
/// Returns [`AuditError::UnfinalizedLedger`] for an in-progress ledger
/// and [`AuditError::Validation`] when a timestamp cannot be formatted.
pub fn text_transcript(ledger: &Ledger) -> Result<String, AuditError> {
    let Some(simulation_end) = ledger.simulation_end() else {
        return Err(AuditError::UnfinalizedLedger(ledger.case_id().to_string()));
    };

    let rule = "=".repeat(80);
    let divider = "-".repeat(80);
    let mut lines = vec![
        rule.clone(),
        "LLM INTERACTION AUDIT LOG".to_string(),
        rule.clone(),
        format!("Case ID: {}", ledger.case_id()),
        format!("Start: {}", format_rfc3339(ledger.simulation_start())?),
        format!("End: {}", format_rfc3339(simulation_end)?),
        String::new(),
    ];

    for (index, interaction) in ledger.interactions().iter().enumerate() {
        lines.push(String::new());
        lines.push(format!(
            "[{}] {}",
            index + 1,
            format_rfc3339(interaction.timestamp)?
        ));
        lines.push(format!("Phase: {}", interaction.phase));
        lines.push(format!(
            "Agent: {}",
            interaction.agent.as_str().to_uppercase()
        ));
        lines.push(format!("Action: {}", interaction.action));
        if is_parse_failure(interaction) {
            lines.push("!! PARSE FAILURE: raw response was not extracted".to_string());
        }
        lines.push(String::new());

        for (title, body) in [
            ("SYSTEM PROMPT:", interaction.system_prompt.as_str()),
            ("USER PROMPT:", interaction.user_prompt.as_str()),
            ("LLM RESPONSE:", interaction.llm_response.as_str()),
        ] {
            lines.push(title.to_string());
            lines.push(divider.clone());
            lines.push(truncate(body, 500));
            lines.push(String::new());
        }

        lines.push("PARSED OUTPUT:".to_string());
        lines.push(truncate(
            &pretty_json(&Value::Object(interaction.parsed_output.clone())),
            300,
        ));
        lines.push(String::new());
        lines.push(rule.clone());
    }

    Ok(lines.join("\n"))
}

/// Renders the reconstructed workflow as a Markdown outline: one section
/// per phase bucket, one bullet per group.
///
/// # Errors
/// Returns [`AuditError::UnfinalizedLedger`] for an in-progress ledger.
pub fn workflow_outline(ledger: &Ledger) -> Result<String, AuditError> {
    let sections = reconstruct(ledger)?;

    let mut lines = vec![format!("# Workflow: {}", ledger.case_id()), String::new()];
    for section in sections {
        lines.push(format!("## {}", phase_display_name(&section.phase)));
        lines.push(String::new());
        for group in &section.groups {
            match group.kind {
                GroupKind::Oversight => {
                    let revisions = group
                        .items
                        .iter()
                        .filter(|item| item.action == REVISION_ACTION)
                        .count();
                    let agent = group
                        .items
                        .first()
                        .map_or("unknown", |item| item.agent.as_str());
                    let outcome = group
                        .items
                        .last()
                        .map_or_else(String::new, |item| humanize_tag(&item.action));
                    lines.push(format!(
                        "- {} draft, {revisions} revision(s), then {outcome}",
                        humanize_tag(agent)
                    ));
                }
                GroupKind::Single => {
                    if let Some(item) = group.items.first() {
                        let mut bullet = format!(
                            "- {}: {}",
                            humanize_tag(item.agent.as_str()),
                            humanize_tag(&item.action)
                        );
                        if is_parse_failure(item) {
                            bullet.push_str(&format!(" {PARSE_FAILURE_LABEL}"));
                        }
                        lines.push(bullet);
                    }
                }
            }
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

fn push_summary_section(lines: &mut Vec<String>, summary: &Summary) {
    lines.push("## Summary".to_string());
    lines.push(String::new());
    lines.push(format!(
        "- **Total Interactions:** {}",
        summary.total_interactions
    ));
    lines.push(format!(
        "- **Duration:** {:.2} seconds",
        summary.simulation_duration_seconds
    ));
    lines.push(String::new());

    if !summary.interactions_by_phase.is_empty() {
        lines.push("**Interactions by Phase:**".to_string());
        for (phase, count) in &summary.interactions_by_phase {
            lines.push(format!("- {phase}: {count}"));
        }
        lines.push(String::new());
    }

    if !summary.interactions_by_agent.is_empty() {
        lines.push("**Interactions by Agent:**".to_string());
        for (agent, count) in &summary.interactions_by_agent {
            lines.push(format!("- {agent}: {count}"));
        }
        lines.push(String::new());
    }
}

fn push_fenced_section(lines: &mut Vec<String>, title: &str, body: &str, language: &str) {
    lines.push(format!("### {title}"));
    lines.push(String::new());
    lines.push(format!("```{language}"));
    lines.push(body.to_string());
    lines.push("```".to_string());
    lines.push(String::new());
}

fn str_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|text| !text.is_empty())
}

fn value_display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => compact_json(other),
    }
}

fn compact_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

/// Character-boundary-safe truncation with a trailing ellipsis.
fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{cut}...")
}

/// `$12,345.50`-style money formatting for claim labels.
#[allow(clippy::cast_possible_truncation)]
fn format_amount(value: f64) -> String {
    let cents = (value * 100.0).round() as i64;
    let whole = (cents / 100).abs();
    let fraction = (cents % 100).abs();

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (offset, digit) in digits.chars().enumerate() {
        if offset > 0 && (digits.len() - offset) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}{grouped}.{fraction:02}")
}
