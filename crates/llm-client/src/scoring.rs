use analysis_core::{CriterionScore, Rubric, MAX_CRITERION_SCORE, MIN_CRITERION_SCORE};
use serde_json::{json, Map, Value};

use crate::error::{LlmError, LlmResult};

/// System prompt demanding a bare JSON object keyed by criterion name.
pub fn system_prompt(rubric: &Rubric) -> String {
    let example: Map<String, Value> = rubric
        .criteria
        .iter()
        .map(|c| {
            (
                c.name.clone(),
                json!({ "score": MAX_CRITERION_SCORE, "explanation": "One or two sentences citing the news." }),
            )
        })
        .collect();
    let example = serde_json::to_string_pretty(&Value::Object(example)).unwrap_or_default();

    format!(
        "You are a professional {} analyst. Reply with a JSON object exactly in this format and nothing else:\n\n{}\n\n\
         Requirements:\n\
         1. The output must be valid JSON\n\
         2. No commentary outside the JSON\n\
         3. Every score is an integer from {} to {}\n\
         4. Explanations are in English",
        rubric.category, example, MIN_CRITERION_SCORE, MAX_CRITERION_SCORE
    )
}

pub fn user_prompt(text: &str, rubric: &Rubric) -> String {
    format!(
        "Evaluate the following news against each criterion.\n\nNews:\n{}\n\nCriteria:\n{}",
        text,
        rubric.render()
    )
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the language tag line
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn score_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse model output into scores in rubric order, clamped to the rubric scale.
///
/// Criteria missing from the reply are left out; an empty result is an error.
pub fn parse_scores(content: &str, rubric: &Rubric) -> LlmResult<Vec<CriterionScore>> {
    let value: Value = serde_json::from_str(strip_code_fence(content))?;
    let object = value
        .as_object()
        .ok_or_else(|| LlmError::InvalidResponse("expected a JSON object".to_string()))?;

    let mut scores = Vec::with_capacity(rubric.criteria.len());
    for criterion in &rubric.criteria {
        let Some(entry) = object.get(&criterion.name) else {
            tracing::debug!("Model reply missing criterion '{}'", criterion.name);
            continue;
        };
        // either {"score": n, "explanation": ".."} or a bare number
        let (raw, explanation) = match entry {
            Value::Object(fields) => (
                fields.get("score").and_then(score_value),
                fields
                    .get("explanation")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ),
            other => (score_value(other), String::new()),
        };
        let Some(raw) = raw.filter(|s| s.is_finite()) else {
            continue;
        };

        let score = raw
            .round()
            .clamp(f64::from(MIN_CRITERION_SCORE), f64::from(MAX_CRITERION_SCORE)) as u8;
        scores.push(CriterionScore {
            criterion: criterion.name.clone(),
            score,
            explanation,
        });
    }

    if scores.is_empty() {
        return Err(LlmError::InvalidResponse("no rubric criteria in model reply".to_string()));
    }
    Ok(scores)
}
