//! Prompt construction and ranking of candidates from the model's answer.
//!
//! The model sees the candidates numbered from 1 and answers with
//! `{"ranking":[{"index":n,"rationale":"..."}]}`.

use availability_engine::{CandidateSlot, Preferences, SchedulingRequest, Violation};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RankingAnswer {
    ranking: Vec<RankedEntry>,
}

#[derive(Debug, Deserialize)]
struct RankedEntry {
    index: usize,
    #[serde(default)]
    rationale: Option<String>,
}

/// Build the ranking prompt for `candidates` (already in score order).
pub fn build_prompt(
    request: &SchedulingRequest,
    preferences: &Preferences,
    candidates: &[CandidateSlot],
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a scheduling assistant. Rank the candidate meeting slots below from best to worst \
         for the requester and give a one-sentence rationale for each.\n\n",
    );
    prompt.push_str(&format!("Requester: {}\n", request.requester_id));
    prompt.push_str(&format!("Requester timezone: {}\n", preferences.timezone));
    if let Some(meeting_type) = &request.meeting_type {
        prompt.push_str(&format!("Meeting type: {}\n", meeting_type));
    }
    if !request.participants.is_empty() {
        let names: Vec<&str> = request.participants.iter().map(String::as_str).collect();
        prompt.push_str(&format!("Participants: {}\n", names.join(", ")));
    }
    if preferences.has_vip(&request.participants) {
        prompt.push_str("At least one participant is a VIP contact.\n");
    }

    prompt.push_str("\nCandidates (engine score, higher is better):\n");
    for (i, slot) in candidates.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} to {} (local {}), score {:.3}",
            i + 1,
            slot.start.to_rfc3339(),
            slot.end.to_rfc3339(),
            local_label(slot.start, preferences),
            slot.score
        ));
        if !slot.violations.is_empty() {
            let notes: Vec<String> = slot.violations.iter().map(describe).collect();
            prompt.push_str(&format!(" [{}]", notes.join("; ")));
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "\nAnswer with JSON only, in exactly this shape:\n\
         {\"ranking\":[{\"index\":1,\"rationale\":\"...\"}]}\n\
         Use the candidate numbers above. Do not invent new times.\n",
    );
    prompt
}

fn describe(violation: &Violation) -> String {
    match violation {
        Violation::OutsideWorkingHours => "outside working hours".to_string(),
        Violation::VipOverride => "outside working hours, allowed for a VIP".to_string(),
        Violation::BackToBack => "back-to-back with another meeting".to_string(),
        Violation::DisallowedDay { weekday } => format!("meeting type not usually held on {}", weekday),
    }
}

/// Reorder `candidates` by the model's ranking and attach rationales.
///
/// Indices are 1-based. Unknown and repeated indices are ignored.
/// Candidates the model did not rank follow the ranked ones in their
/// original order. Fails only when no ranking object can be read from
/// `answer`.
pub fn apply_ranking(
    candidates: Vec<CandidateSlot>,
    answer: &str,
) -> Result<Vec<CandidateSlot>, serde_json::Error> {
    let parsed: RankingAnswer = serde_json::from_str(extract_json(answer))?;

    let mut remaining: Vec<Option<CandidateSlot>> = candidates.into_iter().map(Some).collect();
    let mut ranked = Vec::with_capacity(remaining.len());

    for entry in parsed.ranking {
        let Some(slot) = entry
            .index
            .checked_sub(1)
            .and_then(|i| remaining.get_mut(i))
            .and_then(Option::take)
        else {
            tracing::debug!(index = entry.index, "ignoring unknown or repeated ranking index");
            continue;
        };
        ranked.push(CandidateSlot {
            rationale: entry.rationale.filter(|r| !r.trim().is_empty()),
            ..slot
        });
    }
    ranked.extend(remaining.into_iter().flatten());
    Ok(ranked)
}

/// The outermost `{...}` in `text`, so fenced or chatty answers still parse.
fn extract_json(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// `Mon 10:00` in the requester's zone, or UTC if it does not parse.
fn local_label(at: DateTime<Utc>, preferences: &Preferences) -> String {
    match preferences.tz() {
        Ok(tz) => at.with_timezone(&tz).format("%a %H:%M").to_string(),
        Err(_) => at.format("%a %H:%M UTC").to_string(),
    }
}
