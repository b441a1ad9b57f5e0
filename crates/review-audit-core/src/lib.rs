//! Append-only interaction ledger for provider/payor review simulations.
//!
//! One [`Ledger`] captures every agent/LLM exchange of a single simulated
//! case, verbatim and in call order. [`Ledger::finalize`] is a one-shot
//! transition that stamps the end time and derives the [`Summary`]; all
//! downstream consumers (workflow reconstruction, diagram emission,
//! transcripts) are read-only and run against a finalized ledger.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{OffsetDateTime, UtcOffset};
use ulid::Ulid;

/// Action tag marking an AI copilot's initial draft.
pub const DRAFT_ACTION: &str = "copilot_draft";

/// Action tag marking a same-agent oversight revision of a draft.
pub const REVISION_ACTION: &str = "oversight_edit";

/// Marker value carried in a `parsed_output.error` field when structured
/// extraction from the raw response failed.
pub const PARSE_FAILURE_MARKER: &str = "parse_error";

pub const PHASE_PA: &str = "phase_2_pa";
pub const PHASE_PA_APPEAL: &str = "phase_2_pa_appeal";
pub const PHASE_CLAIMS: &str = "phase_3_claims";
pub const PHASE_FINANCIAL: &str = "phase_4_financial";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum AuditError {
    #[error("cannot append to finalized ledger for case {0}")]
    FinalizedLedger(String),
    #[error("ledger for case {0} was already finalized")]
    AlreadyFinalized(String),
    #[error("duplicate interaction id: {0}")]
    DuplicateId(String),
    #[error("malformed ledger document: {0}")]
    MalformedLedger(String),
    #[error("ledger for case {0} is not finalized")]
    UnfinalizedLedger(String),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Acting party behind one interaction. Open tag: unrecognized values are
/// preserved through serialization, never rejected.
#[derive(Debug, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Agent {
    Provider,
    Payor,
    #[default]
    Environment,
    Other(String),
}

impl Agent {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "provider" => Self::Provider,
            "payor" => Self::Payor,
            "environment" => Self::Environment,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Provider => "provider",
            Self::Payor => "payor",
            Self::Environment => "environment",
            Self::Other(name) => name,
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for Agent {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Agent> for String {
    fn from(value: Agent) -> Self {
        value.as_str().to_string()
    }
}

impl Display for Agent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded agent/LLM exchange. Prompts and the raw response are
/// stored verbatim and never re-derived. Unknown document keys land in
/// `extra` and survive round trips untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    #[serde(default)]
    pub interaction_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub phase: String,
    pub agent: Agent,
    pub action: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt: String,
    #[serde(default)]
    pub llm_response: String,
    #[serde(default)]
    pub parsed_output: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Append payload for [`Ledger::append`]. The id and timestamp are
/// assigned at append time when absent.
#[derive(Debug, Clone, Default)]
pub struct InteractionInput {
    pub interaction_id: Option<String>,
    pub timestamp: Option<OffsetDateTime>,
    pub phase: String,
    pub agent: Agent,
    pub action: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub llm_response: String,
    pub parsed_output: Map<String, Value>,
    pub metadata: Map<String, Value>,
}

impl InteractionInput {
    /// Validates the append payload before insertion.
    ///
    /// # Errors
    /// Returns [`AuditError::Validation`] when `phase`, `agent`, or
    /// `action` is empty.
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.phase.trim().is_empty() {
            return Err(AuditError::Validation(
                "phase MUST be a non-empty string".to_string(),
            ));
        }
        if self.agent.as_str().trim().is_empty() {
            return Err(AuditError::Validation(
                "agent MUST be a non-empty string".to_string(),
            ));
        }
        if self.action.trim().is_empty() {
            return Err(AuditError::Validation(
                "action MUST be a non-empty string".to_string(),
            ));
        }
        Ok(())
    }

    fn into_interaction(self) -> Interaction {
        let interaction_id = self.interaction_id.unwrap_or_else(|| {
            format!(
                "{}_{}_{}_{}",
                self.phase,
                self.agent.as_str(),
                self.action,
                Ulid::new().to_string().to_lowercase()
            )
        });
        Interaction {
            interaction_id,
            timestamp: self.timestamp.unwrap_or_else(now_utc),
            phase: self.phase,
            agent: self.agent,
            action: self.action,
            system_prompt: self.system_prompt,
            user_prompt: self.user_prompt,
            llm_response: self.llm_response,
            parsed_output: self.parsed_output,
            metadata: self.metadata,
            extra: Map::new(),
        }
    }
}

/// Counts and duration derived from a finalized interaction sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub total_interactions: usize,
    pub interactions_by_phase: BTreeMap<String, usize>,
    pub interactions_by_agent: BTreeMap<String, usize>,
    pub simulation_duration_seconds: f64,
}

/// Full record of one simulated case: append-only while the case runs,
/// immutable after [`Ledger::finalize`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ledger {
    case_id: String,
    #[serde(with = "time::serde::rfc3339")]
    simulation_start: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    simulation_end: Option<OffsetDateTime>,
    interactions: Vec<Interaction>,
    #[serde(default)]
    environment_actions: Vec<Value>,
    #[serde(default)]
    agent_configurations: Vec<Value>,
    summary: Option<Summary>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Ledger {
    #[must_use]
    pub fn new(case_id: &str) -> Self {
        Self::new_at(case_id, now_utc())
    }

    #[must_use]
    pub fn new_at(case_id: &str, simulation_start: OffsetDateTime) -> Self {
        Self {
            case_id: case_id.to_string(),
            simulation_start,
            simulation_end: None,
            interactions: Vec::new(),
            environment_actions: Vec::new(),
            agent_configurations: Vec::new(),
            summary: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    #[must_use]
    pub fn simulation_start(&self) -> OffsetDateTime {
        self.simulation_start
    }

    #[must_use]
    pub fn simulation_end(&self) -> Option<OffsetDateTime> {
        self.simulation_end
    }

    #[must_use]
    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    #[must_use]
    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.simulation_end.is_some()
    }

    /// Appends one interaction in call order and returns its id.
    ///
    /// # Errors
    /// Returns [`AuditError::FinalizedLedger`] after finalize,
    /// [`AuditError::DuplicateId`] on an id collision, and
    /// [`AuditError::Validation`] for empty tags or an explicitly
    /// supplied timestamp that moves backwards.
    pub fn append(&mut self, input: InteractionInput) -> Result<String, AuditError> {
        if self.is_finalized() {
            return Err(AuditError::FinalizedLedger(self.case_id.clone()));
        }
        input.validate()?;

        // Single-writer invariant: append order and timestamp order agree.
        if let (Some(supplied), Some(last)) = (input.timestamp, self.interactions.last()) {
            if supplied < last.timestamp {
                return Err(AuditError::Validation(format!(
                    "timestamp moves backwards: {} precedes the last appended interaction",
                    format_rfc3339(supplied)?
                )));
            }
        }

        let interaction = input.into_interaction();
        if self
            .interactions
            .iter()
            .any(|existing| existing.interaction_id == interaction.interaction_id)
        {
            return Err(AuditError::DuplicateId(interaction.interaction_id));
        }

        let id = interaction.interaction_id.clone();
        self.interactions.push(interaction);
        Ok(id)
    }

    /// Finalizes the ledger at the current time.
    ///
    /// # Errors
    /// Returns [`AuditError::AlreadyFinalized`] on a second call.
    pub fn finalize(&mut self) -> Result<&Summary, AuditError> {
        self.finalize_at(now_utc())
    }

    /// Finalizes the ledger with an explicitly supplied end time, stamps
    /// `simulation_end`, and derives the summary.
    ///
    /// # Errors
    /// Returns [`AuditError::AlreadyFinalized`] on a second call.
    pub fn finalize_at(&mut self, simulation_end: OffsetDateTime) -> Result<&Summary, AuditError> {
        if self.is_finalized() {
            return Err(AuditError::AlreadyFinalized(self.case_id.clone()));
        }
        self.simulation_end = Some(simulation_end);
        self.summary = Some(summarize(
            &self.interactions,
            self.simulation_start,
            simulation_end,
        ));
        match self.summary.as_ref() {
            Some(summary) => Ok(summary),
            None => Err(AuditError::Validation(
                "summary missing immediately after finalize".to_string(),
            )),
        }
    }

    /// Encodes the ledger as a JSON value.
    ///
    /// # Errors
    /// Returns [`AuditError::Validation`] if serialization fails.
    pub fn to_json_value(&self) -> Result<Value, AuditError> {
        serde_json::to_value(self).map_err(|err| AuditError::Validation(err.to_string()))
    }

    /// Encodes the ledger as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns [`AuditError::Validation`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String, AuditError> {
        serde_json::to_string_pretty(self).map_err(|err| AuditError::Validation(err.to_string()))
    }

    /// Decodes and structurally validates an externally produced ledger
    /// document. Unknown keys at every level are preserved verbatim.
    ///
    /// # Errors
    /// Returns [`AuditError::MalformedLedger`] when `case_id`,
    /// `simulation_start`, or `interactions` is missing, when any
    /// interaction lacks `agent`, `phase`, or `action`, or when decoding
    /// fails; [`AuditError::DuplicateId`] on colliding interaction ids.
    pub fn from_json_value(value: Value) -> Result<Self, AuditError> {
        let Some(doc) = value.as_object() else {
            return Err(AuditError::MalformedLedger(
                "ledger document MUST be a JSON object".to_string(),
            ));
        };
        for field in ["case_id", "simulation_start", "interactions"] {
            if !doc.contains_key(field) {
                return Err(AuditError::MalformedLedger(format!(
                    "missing required field {field}"
                )));
            }
        }
        let Some(items) = doc.get("interactions").and_then(Value::as_array) else {
            return Err(AuditError::MalformedLedger(
                "interactions MUST be an array".to_string(),
            ));
        };
        for (index, item) in items.iter().enumerate() {
            let Some(object) = item.as_object() else {
                return Err(AuditError::MalformedLedger(format!(
                    "interaction {index} MUST be a JSON object"
                )));
            };
            for field in ["agent", "phase", "action"] {
                if !object.contains_key(field) {
                    return Err(AuditError::MalformedLedger(format!(
                        "interaction {index} is missing required field {field}"
                    )));
                }
            }
        }

        let ledger: Self = serde_json::from_value(value)
            .map_err(|err| AuditError::MalformedLedger(err.to_string()))?;

        let mut seen_ids = std::collections::BTreeSet::new();
        for (index, interaction) in ledger.interactions.iter().enumerate() {
            if interaction.phase.trim().is_empty()
                || interaction.action.trim().is_empty()
                || interaction.agent.as_str().trim().is_empty()
            {
                return Err(AuditError::MalformedLedger(format!(
                    "interaction {index} has an empty agent, phase, or action"
                )));
            }
            if !interaction.interaction_id.is_empty()
                && !seen_ids.insert(interaction.interaction_id.as_str())
            {
                return Err(AuditError::DuplicateId(interaction.interaction_id.clone()));
            }
        }

        Ok(ledger)
    }

    /// Decodes a ledger from a JSON string. See [`Ledger::from_json_value`].
    ///
    /// # Errors
    /// Returns [`AuditError::MalformedLedger`] when the body is not valid
    /// JSON or fails structural validation.
    pub fn from_json_str(body: &str) -> Result<Self, AuditError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|err| AuditError::MalformedLedger(err.to_string()))?;
        Self::from_json_value(value)
    }
}

/// Derives summary counts and duration from an interaction sequence.
/// Pure: counts are order-independent, duration depends only on the two
/// boundary timestamps and is clamped at zero.
#[must_use]
pub fn summarize(
    interactions: &[Interaction],
    simulation_start: OffsetDateTime,
    simulation_end: OffsetDateTime,
) -> Summary {
    let mut interactions_by_phase: BTreeMap<String, usize> = BTreeMap::new();
    let mut interactions_by_agent: BTreeMap<String, usize> = BTreeMap::new();

    for interaction in interactions {
        *interactions_by_phase
            .entry(interaction.phase.clone())
            .or_insert(0) += 1;
        *interactions_by_agent
            .entry(interaction.agent.as_str().to_string())
            .or_insert(0) += 1;
    }

    let duration = (simulation_end - simulation_start).as_seconds_f64();
    Summary {
        total_interactions: interactions.len(),
        interactions_by_phase,
        interactions_by_agent,
        simulation_duration_seconds: duration.max(0.0),
    }
}

/// Structured-output view of one interaction: either a usable domain
/// result or the parse-failure sentinel left behind when extraction from
/// the raw response failed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ParsedPayload<'a> {
    Result(&'a Map<String, Value>),
    ParseFailure(&'a Map<String, Value>),
}

/// Central parse-failure predicate. Every consumer calls this instead of
/// re-deriving the heuristic.
#[must_use]
pub fn is_parse_failure(interaction: &Interaction) -> bool {
    let parsed = &interaction.parsed_output;

    if parsed.get("error").and_then(Value::as_str) == Some(PARSE_FAILURE_MARKER) {
        return true;
    }
    if parsed.get("parse_error").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    if interaction
        .metadata
        .get("error_type")
        .and_then(Value::as_str)
        .is_some_and(|category| category.contains(PARSE_FAILURE_MARKER))
    {
        return true;
    }
    if parsed.len() == 1 && parsed.contains_key("error") {
        return true;
    }
    !interaction.llm_response.is_empty() && parsed.is_empty()
}

#[must_use]
pub fn classify_parsed_output(interaction: &Interaction) -> ParsedPayload<'_> {
    if is_parse_failure(interaction) {
        ParsedPayload::ParseFailure(&interaction.parsed_output)
    } else {
        ParsedPayload::Result(&interaction.parsed_output)
    }
}

/// Title-cases an open tag for display: `pa_appeal_decision` becomes
/// `Pa Appeal Decision`.
#[must_use]
pub fn humanize_tag(tag: &str) -> String {
    tag.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn known_phase_name(phase: &str) -> Option<&'static str> {
    match phase {
        PHASE_PA => Some("Phase 2: Prior Authorization"),
        PHASE_PA_APPEAL => Some("Phase 2: PA Appeal Process"),
        PHASE_CLAIMS => Some("Phase 3: Claims Adjudication"),
        PHASE_FINANCIAL => Some("Phase 4: Financial Settlement"),
        _ => None,
    }
}

/// Readable phase name for transcripts; unknown phases are title-cased.
#[must_use]
pub fn phase_display_name(phase: &str) -> String {
    known_phase_name(phase).map_or_else(|| humanize_tag(phase), ToString::to_string)
}

/// Uppercase banner form used for diagram section separators.
#[must_use]
pub fn phase_banner(phase: &str) -> String {
    known_phase_name(phase).map_or_else(
        || phase.to_uppercase(),
        |name| name.replacen("Phase", "PHASE", 1),
    )
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`AuditError::Validation`] when parsing fails or the input
/// timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, AuditError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| AuditError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(AuditError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`AuditError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, AuditError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| AuditError::Validation(format!("failed to format RFC3339 timestamp: {err}")))
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn must_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
        match result {
            Ok(value) => panic!("expected Err(..), got Ok({value:?})"),
            Err(err) => err,
        }
    }

    fn must_utc(value: &str) -> OffsetDateTime {
        must_ok(parse_rfc3339_utc(value))
    }

    fn input(phase: &str, agent: Agent, action: &str) -> InteractionInput {
        InteractionInput {
            phase: phase.to_string(),
            agent,
            action: action.to_string(),
            ..InteractionInput::default()
        }
    }

    fn fixture_ledger() -> Ledger {
        Ledger::new_at("case-001", must_utc("2026-03-01T09:00:00Z"))
    }

    #[test]
    fn append_assigns_id_embedding_phase_agent_action() {
        let mut ledger = fixture_ledger();
        let id = must_ok(ledger.append(input(PHASE_PA, Agent::Payor, "pa_decision")));
        assert!(id.starts_with("phase_2_pa_payor_pa_decision_"));
        assert_eq!(ledger.interactions().len(), 1);
    }

    #[test]
    fn append_after_finalize_fails() {
        let mut ledger = fixture_ledger();
        must_ok(ledger.append(input(PHASE_PA, Agent::Provider, "pa_request")));
        must_ok(ledger.finalize_at(must_utc("2026-03-01T09:05:00Z")));

        let err = must_err(ledger.append(input(PHASE_PA, Agent::Payor, "pa_decision")));
        assert_eq!(err, AuditError::FinalizedLedger("case-001".to_string()));
    }

    #[test]
    fn finalize_twice_fails() {
        let mut ledger = fixture_ledger();
        must_ok(ledger.finalize_at(must_utc("2026-03-01T09:05:00Z")));
        let err = must_err(ledger.finalize_at(must_utc("2026-03-01T09:06:00Z")));
        assert_eq!(err, AuditError::AlreadyFinalized("case-001".to_string()));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut ledger = fixture_ledger();
        let mut first = input(PHASE_PA, Agent::Provider, "pa_request");
        first.interaction_id = Some("fixed-id".to_string());
        must_ok(ledger.append(first));

        let mut second = input(PHASE_PA, Agent::Payor, "pa_decision");
        second.interaction_id = Some("fixed-id".to_string());
        let err = must_err(ledger.append(second));
        assert_eq!(err, AuditError::DuplicateId("fixed-id".to_string()));
    }

    #[test]
    fn duplicate_content_is_allowed() {
        let mut ledger = fixture_ledger();
        must_ok(ledger.append(input(PHASE_PA, Agent::Provider, "pa_request")));
        must_ok(ledger.append(input(PHASE_PA, Agent::Provider, "pa_request")));
        assert_eq!(ledger.interactions().len(), 2);
    }

    #[test]
    fn empty_tags_are_rejected() {
        let mut ledger = fixture_ledger();
        let err = must_err(ledger.append(input("", Agent::Provider, "pa_request")));
        assert!(matches!(err, AuditError::Validation(_)));

        let err = must_err(ledger.append(input(PHASE_PA, Agent::Other(String::new()), "x")));
        assert!(matches!(err, AuditError::Validation(_)));
    }

    #[test]
    fn explicit_backwards_timestamp_is_rejected() {
        let mut ledger = fixture_ledger();
        let mut first = input(PHASE_PA, Agent::Provider, "pa_request");
        first.timestamp = Some(must_utc("2026-03-01T09:01:00Z"));
        must_ok(ledger.append(first));

        let mut second = input(PHASE_PA, Agent::Payor, "pa_decision");
        second.timestamp = Some(must_utc("2026-03-01T09:00:30Z"));
        let err = must_err(ledger.append(second));
        assert!(matches!(err, AuditError::Validation(_)));
    }

    #[test]
    fn summary_counts_cover_every_interaction() {
        let mut ledger = fixture_ledger();
        must_ok(ledger.append(input(PHASE_PA, Agent::Payor, "pa_decision")));
        must_ok(ledger.append(input(PHASE_PA_APPEAL, Agent::Provider, "pa_appeal_submission")));
        must_ok(ledger.append(input(PHASE_PA_APPEAL, Agent::Payor, "pa_appeal_decision")));
        must_ok(ledger.append(input(PHASE_CLAIMS, Agent::Payor, "claim_adjudication")));

        let summary = must_ok(ledger.finalize_at(must_utc("2026-03-01T09:10:00Z"))).clone();
        assert_eq!(summary.total_interactions, 4);
        assert_eq!(summary.interactions_by_phase.get(PHASE_PA), Some(&1));
        assert_eq!(summary.interactions_by_phase.get(PHASE_PA_APPEAL), Some(&2));
        assert_eq!(summary.interactions_by_phase.get(PHASE_CLAIMS), Some(&1));
        assert_eq!(summary.interactions_by_agent.get("provider"), Some(&1));
        assert_eq!(summary.interactions_by_agent.get("payor"), Some(&3));

        let by_phase: usize = summary.interactions_by_phase.values().sum();
        let by_agent: usize = summary.interactions_by_agent.values().sum();
        assert_eq!(by_phase, summary.total_interactions);
        assert_eq!(by_agent, summary.total_interactions);
        assert!((summary.simulation_duration_seconds - 600.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_ledger_summarizes_to_zeroes() {
        let mut ledger = fixture_ledger();
        let summary = must_ok(ledger.finalize_at(must_utc("2026-03-01T09:00:00Z"))).clone();
        assert_eq!(summary.total_interactions, 0);
        assert!(summary.interactions_by_phase.is_empty());
        assert!(summary.interactions_by_agent.is_empty());
        assert!(summary.simulation_duration_seconds.abs() < f64::EPSILON);
    }

    #[test]
    fn skewed_end_time_clamps_duration_at_zero() {
        let summary = summarize(
            &[],
            must_utc("2026-03-01T10:00:00Z"),
            must_utc("2026-03-01T09:00:00Z"),
        );
        assert!(summary.simulation_duration_seconds.abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_agent_values_are_preserved() {
        let agent = Agent::parse("auditor");
        assert_eq!(agent, Agent::Other("auditor".to_string()));
        assert!(!agent.is_known());
        assert_eq!(agent.as_str(), "auditor");

        let encoded = must_ok(serde_json::to_string(&agent));
        assert_eq!(encoded, "\"auditor\"");
        let decoded: Agent = must_ok(serde_json::from_str(&encoded));
        assert_eq!(decoded, agent);
    }

    #[test]
    fn round_trip_preserves_unknown_keys() {
        let doc = json!({
            "case_id": "case-rt",
            "simulation_start": "2026-03-01T09:00:00Z",
            "simulation_end": "2026-03-01T09:10:00Z",
            "experiment_arm": "control",
            "interactions": [{
                "interaction_id": "i-1",
                "timestamp": "2026-03-01T09:01:00Z",
                "phase": PHASE_PA,
                "agent": "payor",
                "action": "pa_decision",
                "system_prompt": "",
                "user_prompt": "",
                "llm_response": "{\"authorization_status\": \"approved\"}",
                "parsed_output": {"authorization_status": "approved", "vendor_trace": {"hop": 3}},
                "metadata": {"iteration": 2, "custom_note": "kept"},
                "shadow_field": true
            }],
            "summary": null
        });

        let ledger = must_ok(Ledger::from_json_value(doc));
        assert_eq!(ledger.extra.get("experiment_arm"), Some(&json!("control")));
        assert_eq!(
            ledger.interactions()[0].extra.get("shadow_field"),
            Some(&json!(true))
        );

        let encoded = must_ok(ledger.to_json_value());
        let reloaded = must_ok(Ledger::from_json_value(encoded));
        assert_eq!(reloaded, ledger);
        assert_eq!(
            reloaded.interactions()[0].metadata.get("custom_note"),
            Some(&json!("kept"))
        );
        assert_eq!(
            reloaded.interactions()[0].parsed_output.get("vendor_trace"),
            Some(&json!({"hop": 3}))
        );
    }

    #[test]
    fn load_rejects_missing_required_fields() {
        let err = must_err(Ledger::from_json_value(json!({"interactions": []})));
        assert_eq!(
            err,
            AuditError::MalformedLedger("missing required field case_id".to_string())
        );

        let err = must_err(Ledger::from_json_value(json!({
            "case_id": "c",
            "simulation_start": "2026-03-01T09:00:00Z"
        })));
        assert_eq!(
            err,
            AuditError::MalformedLedger("missing required field interactions".to_string())
        );

        let err = must_err(Ledger::from_json_value(json!({
            "case_id": "c",
            "simulation_start": "2026-03-01T09:00:00Z",
            "interactions": [{
                "timestamp": "2026-03-01T09:01:00Z",
                "phase": PHASE_PA,
                "action": "pa_decision"
            }]
        })));
        assert_eq!(
            err,
            AuditError::MalformedLedger("interaction 0 is missing required field agent".to_string())
        );
    }

    #[test]
    fn load_rejects_duplicate_interaction_ids() {
        let item = json!({
            "interaction_id": "same",
            "timestamp": "2026-03-01T09:01:00Z",
            "phase": PHASE_PA,
            "agent": "payor",
            "action": "pa_decision"
        });
        let err = must_err(Ledger::from_json_value(json!({
            "case_id": "c",
            "simulation_start": "2026-03-01T09:00:00Z",
            "interactions": [item.clone(), item]
        })));
        assert_eq!(err, AuditError::DuplicateId("same".to_string()));
    }

    #[test]
    fn load_rejects_non_json_body() {
        let err = must_err(Ledger::from_json_str("not a ledger"));
        assert!(matches!(err, AuditError::MalformedLedger(_)));
    }

    fn parse_fixture(llm_response: &str, parsed_output: Value, metadata: Value) -> Interaction {
        Interaction {
            interaction_id: "p-1".to_string(),
            timestamp: must_utc("2026-03-01T09:01:00Z"),
            phase: PHASE_PA.to_string(),
            agent: Agent::Payor,
            action: "pa_decision".to_string(),
            system_prompt: String::new(),
            user_prompt: String::new(),
            llm_response: llm_response.to_string(),
            parsed_output: match parsed_output {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            metadata: match metadata {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            extra: Map::new(),
        }
    }

    #[test]
    fn parse_failure_predicate_matches_sentinels() {
        // non-empty raw with nothing extracted
        let flagged = parse_fixture("{\"status\": ...", json!({}), json!({}));
        assert!(is_parse_failure(&flagged));

        // clean structured result
        let clean = parse_fixture("ok", json!({"status": "denied"}), json!({}));
        assert!(!is_parse_failure(&clean));

        // single error key
        let sentinel = parse_fixture("", json!({"error": "x"}), json!({}));
        assert!(is_parse_failure(&sentinel));

        // explicit boolean flag alongside other keys
        let flag = parse_fixture(
            "ok",
            json!({"revised_text": "...", "parse_error": true}),
            json!({}),
        );
        assert!(is_parse_failure(&flag));

        // metadata category
        let category = parse_fixture(
            "ok",
            json!({"status": "denied"}),
            json!({"error_type": "provider_response_parse_error"}),
        );
        assert!(is_parse_failure(&category));

        // explicit marker value
        let marker = parse_fixture(
            "ok",
            json!({"error": PARSE_FAILURE_MARKER, "attempts": 2}),
            json!({}),
        );
        assert!(is_parse_failure(&marker));

        // empty raw and empty parse is fine (nothing was expected)
        let empty = parse_fixture("", json!({}), json!({}));
        assert!(!is_parse_failure(&empty));
    }

    #[test]
    fn classify_matches_predicate() {
        let flagged = parse_fixture("raw", json!({}), json!({}));
        assert!(matches!(
            classify_parsed_output(&flagged),
            ParsedPayload::ParseFailure(_)
        ));

        let clean = parse_fixture("raw", json!({"status": "approved"}), json!({}));
        assert!(matches!(
            classify_parsed_output(&clean),
            ParsedPayload::Result(_)
        ));
    }

    #[test]
    fn phase_names_cover_known_and_unknown_tags() {
        assert_eq!(phase_display_name(PHASE_PA), "Phase 2: Prior Authorization");
        assert_eq!(phase_banner(PHASE_PA_APPEAL), "PHASE 2: PA Appeal Process");
        assert_eq!(phase_display_name("phase_9_custom"), "Phase 9 Custom");
        assert_eq!(phase_banner("phase_9_custom"), "PHASE_9_CUSTOM");
    }

    #[test]
    fn humanize_tag_title_cases_words() {
        assert_eq!(humanize_tag("pa_appeal_decision"), "Pa Appeal Decision");
        assert_eq!(humanize_tag("concurrent_review"), "Concurrent Review");
    }
}
