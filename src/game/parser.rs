// src/game/parser.rs — Marker extraction from free-form collaborator replies
//
// Replies are unstructured text carrying a handful of in-band markers. Every
// function here is total: malformed input yields None or an empty Vec.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

/// Where a score may appear: a bracketed tag, a legacy label, and for the
/// total score a bare "N点" / "N points" form.
#[derive(Debug, Clone, Copy)]
pub struct ScoreMarker {
    pub tag: &'static str,
    pub label: &'static str,
    pub bare_points: bool,
}

impl ScoreMarker {
    pub const TOTAL: ScoreMarker = ScoreMarker {
        tag: "TOTAL_SCORE",
        label: "到達度",
        bare_points: true,
    };
    pub const STRUCTURE: ScoreMarker = ScoreMarker {
        tag: "STRUCTURE_SCORE",
        label: "構造化力",
        bare_points: false,
    };
    pub const EMPATHY: ScoreMarker = ScoreMarker {
        tag: "EMPATHY_SCORE",
        label: "共感・傾聴力",
        bare_points: false,
    };
    pub const HYPOTHESIS: ScoreMarker = ScoreMarker {
        tag: "HYPOTHESIS_SCORE",
        label: "仮説検証力",
        bare_points: false,
    };
}

pub const GOOD_QUESTIONS_TAG: &str = "[GOOD_QUESTIONS]";
pub const HABITS_TAG: &str = "[HABITS]";
pub const STRENGTHS_TAG: &str = "[STRENGTHS]";
pub const IMPROVEMENTS_TAG: &str = "[IMPROVEMENTS]";

/// Every section-opening or score tag. A delimited section ends at whichever comes first.
pub const SECTION_BOUNDARIES: &[&str] = &[
    GOOD_QUESTIONS_TAG,
    HABITS_TAG,
    STRENGTHS_TAG,
    IMPROVEMENTS_TAG,
    "[TOTAL_SCORE",
    "[STRUCTURE_SCORE",
    "[EMPATHY_SCORE",
    "[HYPOTHESIS_SCORE",
];

/// `[HABITS]` also ends at a trailing heading the reviewer may append.
pub const HABITS_BOUNDARIES: &[&str] = &[
    GOOD_QUESTIONS_TAG,
    HABITS_TAG,
    STRENGTHS_TAG,
    IMPROVEMENTS_TAG,
    "[TOTAL_SCORE",
    "[STRUCTURE_SCORE",
    "[EMPATHY_SCORE",
    "[HYPOTHESIS_SCORE",
    "\n次のステップ",
    "\n模範解答例",
    "\n#",
];

fn reachability_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"真因到達度：(\d+)%").expect("valid regex"))
}

fn bare_points_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*(?:点|points)").expect("valid regex"))
}

fn fenced_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"))
}

fn first_number(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// `真因到達度：N%` → N. The raw value is returned; callers clamp.
pub fn extract_reachability(text: &str) -> Option<u32> {
    first_number(reachability_re(), text)
}

/// Compiled tag and label patterns of one marker.
struct MarkerPatterns {
    tag: Regex,
    label: Regex,
}

impl MarkerPatterns {
    fn compile(marker: &ScoreMarker) -> Option<Self> {
        let tag = Regex::new(&format!(r"\[{}:\s*(\d+)\]", regex::escape(marker.tag))).ok()?;
        let label = Regex::new(&format!(r"{}[:：]\s*(\d+)", regex::escape(marker.label))).ok()?;
        Some(Self { tag, label })
    }

    fn find(&self, text: &str, bare_points: bool) -> Option<u32> {
        first_number(&self.tag, text)
            .or_else(|| first_number(&self.label, text))
            .or_else(|| bare_points.then(|| first_number(bare_points_re(), text)).flatten())
    }
}

/// Patterns for the built-in markers, compiled once.
fn builtin_patterns(marker: &ScoreMarker) -> Option<&'static MarkerPatterns> {
    static CACHE: OnceLock<Vec<(&'static str, &'static str, MarkerPatterns)>> = OnceLock::new();
    CACHE
        .get_or_init(|| {
            [
                ScoreMarker::TOTAL,
                ScoreMarker::STRUCTURE,
                ScoreMarker::EMPATHY,
                ScoreMarker::HYPOTHESIS,
            ]
            .iter()
            .filter_map(|m| Some((m.tag, m.label, MarkerPatterns::compile(m)?)))
            .collect()
        })
        .iter()
        .find(|(tag, label, _)| *tag == marker.tag && *label == marker.label)
        .map(|(_, _, patterns)| patterns)
}

/// Try the tag, then the label, then (if allowed) bare points.
pub fn extract_score(text: &str, marker: &ScoreMarker) -> Option<u32> {
    match builtin_patterns(marker) {
        Some(patterns) => patterns.find(text, marker.bare_points),
        None => MarkerPatterns::compile(marker)?.find(text, marker.bare_points),
    }
}

/// Text between `start` and the earliest of `ends` (or end of input), trimmed.
pub fn extract_delimited_section<'a>(text: &'a str, start: &str, ends: &[&str]) -> Option<&'a str> {
    let begin = text.find(start)? + start.len();
    let rest = &text[begin..];
    let stop = ends
        .iter()
        .filter_map(|end| rest.find(end))
        .min()
        .unwrap_or(rest.len());
    Some(rest[..stop].trim())
}

/// Lines that start with `-`, `*` or `・`, marker stripped. Other lines are ignored.
pub fn extract_bullets(section: &str) -> Vec<String> {
    section
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix('-')
                .or_else(|| line.strip_prefix('*'))
                .or_else(|| line.strip_prefix('・'))
        })
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// First JSON object in the text: a fenced block wins, else the first balanced `{...}`.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    if let Some(caps) = fenced_json_re().captures(text) {
        if let Ok(value) = serde_json::from_str(&caps[1]) {
            return Some(value);
        }
    }

    balanced_objects(text)
        .into_iter()
        .find_map(|(start, end)| serde_json::from_str(&text[start..end]).ok())
}

pub fn extract_json_as<T: DeserializeOwned>(text: &str) -> Option<T> {
    extract_json(text).and_then(|v| serde_json::from_value(v).ok())
}

/// Byte ranges of every balanced `{...}`, found in one pass and ordered by start.
/// Quotes delimit strings only inside an open brace.
fn balanced_objects(text: &str) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut found = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    found.push((start, i + 1));
                }
            }
            _ => {}
        }
    }
    found.sort_unstable_by_key(|&(start, _)| start);
    found
}
