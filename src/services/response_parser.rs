use serde_json::{Map, Value};

use crate::core::config::ScorePolicy;

pub(crate) const FALLBACK_SCORE: f64 = 9.0;
pub(crate) const FALLBACK_FEEDBACK: &str = "Good Marks";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedGrade {
    pub(crate) score: f64,
    pub(crate) feedback: String,
    /// Set when the raw text could not be used and the fixed pair was substituted.
    pub(crate) fell_back: bool,
}

impl ParsedGrade {
    pub(crate) fn fallback(max_score: u32) -> Self {
        Self {
            score: fallback_score(max_score),
            feedback: FALLBACK_FEEDBACK.to_string(),
            fell_back: true,
        }
    }
}

/// [`FALLBACK_SCORE`], capped so it never exceeds the configured total.
pub(crate) fn fallback_score(max_score: u32) -> f64 {
    FALLBACK_SCORE.min(f64::from(max_score))
}

/// Turns raw model output into a grade. Never fails: unusable output degrades to
/// [`ParsedGrade::fallback`].
pub(crate) trait ResponseParser: Send + Sync {
    fn parse(&self, raw_text: &str, max_score: u32) -> ParsedGrade;
}

/// First-`{` / last-`}` extraction of a JSON object embedded in free text.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BraceJsonParser {
    policy: ScorePolicy,
}

impl BraceJsonParser {
    pub(crate) fn new(policy: ScorePolicy) -> Self {
        Self { policy }
    }
}

impl ResponseParser for BraceJsonParser {
    fn parse(&self, raw_text: &str, max_score: u32) -> ParsedGrade {
        let Some(candidate) = embedded_object(raw_text) else {
            tracing::warn!("Grading response has no JSON object; using fallback grade");
            return ParsedGrade::fallback(max_score);
        };

        let object = match serde_json::from_str::<Map<String, Value>>(candidate) {
            Ok(object) => object,
            Err(err) => {
                tracing::warn!(error = %err, "Grading response JSON is malformed; using fallback grade");
                return ParsedGrade::fallback(max_score);
            }
        };

        let score = object
            .get("score")
            .and_then(numeric_score)
            .unwrap_or_else(|| fallback_score(max_score));
        let feedback = object
            .get("feedback")
            .and_then(feedback_text)
            .unwrap_or_else(|| FALLBACK_FEEDBACK.to_string());

        let max = f64::from(max_score);
        let score = match self.policy {
            ScorePolicy::PassThrough => score,
            ScorePolicy::Clamp => score.clamp(0.0, max),
            ScorePolicy::Reject if !(0.0..=max).contains(&score) => {
                tracing::warn!(score, max_score, "Grading score out of range; rejecting grade");
                return ParsedGrade::fallback(max_score);
            }
            ScorePolicy::Reject => score,
        };

        ParsedGrade { score, feedback, fell_back: false }
    }
}

/// The slice from the first `{` to the last `}` inclusive, if they are in that order.
pub(crate) fn embedded_object(raw_text: &str) -> Option<&str> {
    let start = raw_text.find('{')?;
    let end = raw_text.rfind('}')?;
    (start < end).then(|| &raw_text[start..=end])
}

fn numeric_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    score.is_finite().then_some(score)
}

fn feedback_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Renders `N/total`, dropping the fraction for whole scores.
pub(crate) fn format_score(score: f64, max_score: u32) -> String {
    if score.fract() == 0.0 && score.abs() < 1e15 {
        format!("{}/{max_score}", score as i64)
    } else {
        format!("{score}/{max_score}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ParsedGrade {
        BraceJsonParser::default().parse(raw, 10)
    }

    #[test]
    fn returns_score_and_feedback_from_embedded_object() {
        let grade = parse(
            "Here is my assessment:\n```json\n{\"score\": 7, \"feedback\": \"Correct core idea, missing detail\"}\n```",
        );
        assert_eq!(grade.score, 7.0);
        assert_eq!(grade.feedback, "Correct core idea, missing detail");
        assert!(!grade.fell_back);
    }

    #[test]
    fn prose_without_braces_falls_back() {
        assert_eq!(parse("The student did reasonably well overall."), ParsedGrade::fallback(10));
        assert_eq!(parse(""), ParsedGrade::fallback(10));
        assert_eq!(parse("only an opening {"), ParsedGrade::fallback(10));
    }

    #[test]
    fn reversed_or_malformed_braces_fall_back() {
        assert_eq!(parse("} backwards {"), ParsedGrade::fallback(10));
        assert_eq!(parse("{score: seven}"), ParsedGrade::fallback(10));
        assert_eq!(parse("{\"score\": 7} trailing {\"extra\": 1}"), ParsedGrade::fallback(10));
    }

    #[test]
    fn missing_keys_use_defaults() {
        let grade = parse("{\"feedback\": \"Solid\"}");
        assert_eq!(grade.score, FALLBACK_SCORE);
        assert_eq!(grade.feedback, "Solid");
        assert!(!grade.fell_back);

        let grade = parse("{\"score\": 4}");
        assert_eq!(grade.score, 4.0);
        assert_eq!(grade.feedback, FALLBACK_FEEDBACK);
    }

    #[test]
    fn accepts_numeric_strings_and_non_string_feedback() {
        let grade = parse("{\"score\": \" 6.5 \", \"feedback\": [\"a\", \"b\"]}");
        assert_eq!(grade.score, 6.5);
        assert_eq!(grade.feedback, "[\"a\",\"b\"]");

        let grade = parse("{\"score\": \"six\", \"feedback\": null}");
        assert_eq!(grade.score, FALLBACK_SCORE);
        assert_eq!(grade.feedback, FALLBACK_FEEDBACK);
    }

    #[test]
    fn passthrough_trusts_out_of_range_scores() {
        let grade = parse("{\"score\": 14, \"feedback\": \"Generous\"}");
        assert_eq!(grade.score, 14.0);
    }

    #[test]
    fn clamp_policy_bounds_score() {
        let parser = BraceJsonParser::new(ScorePolicy::Clamp);
        assert_eq!(parser.parse("{\"score\": 14, \"feedback\": \"x\"}", 10).score, 10.0);
        assert_eq!(parser.parse("{\"score\": -2, \"feedback\": \"x\"}", 10).score, 0.0);
        assert_eq!(parser.parse("{\"score\": 3, \"feedback\": \"x\"}", 10).score, 3.0);
    }

    #[test]
    fn reject_policy_falls_back_on_out_of_range() {
        let parser = BraceJsonParser::new(ScorePolicy::Reject);
        assert_eq!(
            parser.parse("{\"score\": 11, \"feedback\": \"x\"}", 10),
            ParsedGrade::fallback(10)
        );
        let grade = parser.parse("{\"score\": 10, \"feedback\": \"x\"}", 10);
        assert_eq!(grade.score, 10.0);
        assert!(!grade.fell_back);
    }

    #[test]
    fn fallback_score_never_exceeds_small_totals() {
        let parser = BraceJsonParser::new(ScorePolicy::Reject);
        let grade = parser.parse("{\"score\": 7, \"feedback\": \"x\"}", 5);
        assert!(grade.fell_back);
        assert_eq!(grade.score, 5.0);
        assert_eq!(format_score(grade.score, 5), "5/5");

        let grade = BraceJsonParser::new(ScorePolicy::Clamp).parse("no json here", 5);
        assert_eq!(grade, ParsedGrade::fallback(5));
        assert_eq!(grade.score, 5.0);

        let grade = BraceJsonParser::default().parse("{\"feedback\": \"Solid\"}", 3);
        assert_eq!(grade.score, 3.0);
        assert_eq!(grade.feedback, "Solid");

        assert_eq!(fallback_score(10), FALLBACK_SCORE);
    }

    #[test]
    fn embedded_object_spans_first_to_last_brace() {
        assert_eq!(embedded_object("a {\"x\": {\"y\": 1}} b"), Some("{\"x\": {\"y\": 1}}"));
        assert_eq!(embedded_object("{}"), Some("{}"));
        assert_eq!(embedded_object("}{"), None);
    }

    #[test]
    fn format_score_drops_fraction_for_whole_numbers() {
        assert_eq!(format_score(7.0, 10), "7/10");
        assert_eq!(format_score(7.5, 10), "7.5/10");
        assert_eq!(format_score(9.0, 10), "9/10");
        assert_eq!(format_score(-1.0, 10), "-1/10");
    }
}
