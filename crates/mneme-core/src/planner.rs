//! The reasoning seam. A [`Planner`] turns a prompt into free text; [`Decision`]
//! reads the agent's one-line decision formats out of that text.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::engine::MemoryEngine;
use crate::types::{char_slice, SearchQuery, SearchResponse, SearchResult};

/// Opaque reasoning call: prompt in, raw decision text out.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, prompt: &str) -> Result<String, PlanError>;
}

const FUNCTION_CALL: &str = "FUNCTION_CALL:";
const NO_TOOL_NEEDED: &str = "NO_TOOL_NEEDED:";
const RELEVANT_CONTEXT_FOUND: &str = "RELEVANT_CONTEXT_FOUND:";
const FINAL_ANSWER: &str = "FINAL_ANSWER:";

/// One planning step's outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// `FUNCTION_CALL: tool|a=1|input.b=[1,2]`
    FunctionCall { name: String, arguments: Value },
    /// `NO_TOOL_NEEDED: final answer`
    FinalAnswer(String),
    /// `RELEVANT_CONTEXT_FOUND: [..]`
    RelevantContext(String),
    /// Text without a recognised prefix.
    Unstructured(String),
}

impl Decision {
    /// The first line carrying a decision prefix wins; otherwise the whole text is unstructured.
    pub fn parse(raw: &str) -> Result<Self, PlanError> {
        for line in raw.lines().map(str::trim) {
            if let Some(rest) = line.strip_prefix(FUNCTION_CALL) {
                let (name, arguments) = parse_function_call(rest)?;
                return Ok(Self::FunctionCall { name, arguments });
            }
            if let Some(rest) = line.strip_prefix(NO_TOOL_NEEDED) {
                return Ok(Self::FinalAnswer(rest.trim().to_string()));
            }
            if let Some(rest) = line.strip_prefix(RELEVANT_CONTEXT_FOUND) {
                return Ok(Self::RelevantContext(rest.trim().to_string()));
            }
        }
        Ok(Self::Unstructured(raw.trim().to_string()))
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::FinalAnswer(_))
    }
}

/// `tool|k=v|a.b=v` into the tool name and a nested JSON object of arguments.
/// Values are parsed as JSON literals when they can be, else kept as strings.
fn parse_function_call(body: &str) -> Result<(String, Value), PlanError> {
    let mut parts = body.split('|').map(str::trim);
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        return Err(PlanError::Malformed("function call without a tool name".into()));
    }
    let mut args = Map::new();
    for part in parts {
        let Some((key, value)) = part.split_once('=') else {
            return Err(PlanError::Malformed(format!("invalid param: {part}")));
        };
        let value = parse_value(value.trim());
        insert_nested(&mut args, key.trim(), value)?;
    }
    Ok((name.to_string(), Value::Object(args)))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn insert_nested(root: &mut Map<String, Value>, key: &str, value: Value) -> Result<(), PlanError> {
    let mut segments: Vec<&str> = key.split('.').collect();
    let last = segments.pop().unwrap_or_default();
    let mut current = root;
    for seg in segments {
        let entry = current
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = entry
            .as_object_mut()
            .ok_or_else(|| PlanError::Malformed(format!("key {seg} is both a value and a group")))?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Renders retrieved snippets for inclusion in a planning prompt.
pub fn memory_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "None".into();
    }
    results
        .iter()
        .map(|r| format!("- {} [{}]", r.highlighted(), r.url))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The decision prompt: the loop's rules, the retrieved memory and the user input.
pub fn planning_prompt(user_input: &str, memory: &str) -> String {
    format!(
        "You are a reasoning-driven agent with access to tools. Solve the request step by step.\n\
         Respond with EXACTLY ONE line in one of these formats:\n\
         {FUNCTION_CALL} tool_name|param1=value1|param2=value2\n\
         {NO_TOOL_NEEDED} [final answer]\n\
         {RELEVANT_CONTEXT_FOUND} [Context 1, Context 2, ...]\n\
         Use nested keys (e.g. input.string) and square brackets for lists.\n\
         Do not repeat function calls with the same parameters.\n\n\
         Relevant memories:\n{memory}\n\n\
         User input: \"{user_input}\"\n"
    )
}

/// One planning step grounded in memory: search, prompt, plan, parse.
pub async fn decide(
    planner: &dyn Planner,
    engine: &MemoryEngine,
    user_input: &str,
    top_k: usize,
) -> Result<Decision, PlanError> {
    let mut found = engine.search(&SearchQuery::new(user_input).top_k(top_k)).await;
    found.results.truncate(top_k);
    let prompt = planning_prompt(user_input, &memory_context(&found.results));
    let raw = planner.plan(&prompt).await?;
    tracing::debug!(raw = %raw, "planner output");
    Decision::parse(&raw)
}

/// Characters of each result shown to the planner when ranking.
const RANKING_SNIPPET_CHARS: usize = 200;

pub const NO_RESULTS_ANSWER: &str =
    "No relevant results found. Please try a different search query or ensure content has been indexed.";
pub const NO_CLEAR_ANSWER: &str = "No clear answer could be generated from the results.";
pub const UNRANKED_ANSWER: &str =
    "Found results but couldn't improve ranking. Here are the original results.";
pub const RANKING_FAILED_ANSWER: &str = "Error processing search results. Showing original results.";

/// The ranking prompt: the query, the plan so far and a numbered snippet per result.
pub fn ranking_prompt(query: &str, plan: Option<&str>, results: &[SearchResult]) -> String {
    let listed = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let snippet = char_slice(&r.content, 0, RANKING_SNIPPET_CHARS);
            format!("{i}. {} ({}): {snippet}...", r.title, r.url)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You rank search results and answer the query from them.\n\n\
         Query: \"{query}\"\n\
         Initial plan: {plan}\n\n\
         Results:\n{listed}\n\n\
         For each relevant result write one line:\n\
         result_number|relevance (0-1)|highlight_start|highlight_end|text_segment\n\
         Then one line:\n\
         {FINAL_ANSWER} [a concise answer synthesized from the most relevant results; \
         say so if they are irrelevant or conflicting]\n\
         Output only these lines.\n",
        plan = plan.unwrap_or("None"),
    )
}

/// Reads `number|relevance|start|end|text` lines and the `FINAL_ANSWER:` line.
///
/// Ranked results keep their distance `score`; they are ordered by the
/// planner's relevance, highest first. Lines naming an unknown result, a
/// result already listed, or carrying unparseable numbers are ignored.
/// Highlight offsets are clamped to the result's content.
pub fn parse_ranking(raw: &str, results: &[SearchResult]) -> (Vec<SearchResult>, Option<String>) {
    let mut ranked: Vec<(f32, usize, SearchResult)> = Vec::new();
    let mut answer = None;
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix(FINAL_ANSWER) {
            answer = Some(rest.trim().to_string());
            continue;
        }
        match parse_ranked_line(line, results) {
            Some((relevance, index, result)) if !ranked.iter().any(|(_, i, _)| *i == index) => {
                ranked.push((relevance, index, result));
            }
            Some(_) => tracing::debug!(line, "result ranked twice; keeping the first"),
            None => tracing::debug!(line, "ignoring unparseable ranking line"),
        }
    }
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    (ranked.into_iter().map(|(_, _, r)| r).collect(), answer)
}

fn parse_ranked_line(line: &str, results: &[SearchResult]) -> Option<(f32, usize, SearchResult)> {
    let parts: Vec<&str> = line.split('|').map(str::trim).collect();
    let [index, relevance, start, end, _segment] = parts.as_slice() else {
        return None;
    };
    let index: usize = index.parse().ok()?;
    let original = results.get(index)?;
    let relevance: f32 = relevance.parse().ok()?;
    let len = original.content.chars().count();
    let start = start.parse::<usize>().ok()?.min(len);
    let end = end.parse::<usize>().ok()?.clamp(start, len);
    let result = SearchResult {
        highlight_start: start,
        highlight_end: end,
        ..original.clone()
    };
    Some((relevance, index, result))
}

/// Searches memory, then has the planner re-rank the top `top_k` hits and
/// write a final answer. Never fails: when the planner errors or nothing it
/// says parses, the original results come back with an explanatory answer.
pub async fn answer_query(
    planner: &dyn Planner,
    engine: &MemoryEngine,
    query: &SearchQuery,
    plan: Option<&str>,
) -> SearchResponse {
    let mut found = engine.search(query).await;
    found.results.truncate(query.top_k);
    found.total_matches = found.results.len();
    if found.results.is_empty() {
        found.final_answer = Some(NO_RESULTS_ANSWER.into());
        return found;
    }

    let prompt = ranking_prompt(&query.text, plan, &found.results);
    let raw = match planner.plan(&prompt).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(query = %query.text, error = %e, "result ranking failed");
            found.final_answer = Some(RANKING_FAILED_ANSWER.into());
            return found;
        }
    };
    let (ranked, answer) = parse_ranking(&raw, &found.results);
    if ranked.is_empty() {
        tracing::debug!(query = %query.text, "planner ranked nothing; keeping search order");
        found.final_answer = Some(UNRANKED_ANSWER.into());
        return found;
    }
    SearchResponse {
        total_matches: ranked.len(),
        results: ranked,
        message: None,
        final_answer: Some(answer.unwrap_or_else(|| NO_CLEAR_ANSWER.into())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("planner request failed: {0}")]
    Request(String),
    #[error("malformed decision: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn result(url: &str, content: &str, score: f32) -> SearchResult {
        SearchResult {
            url: url.into(),
            title: url.into(),
            content: content.into(),
            score,
            highlight_start: 0,
            highlight_end: 0,
            chunk_id: format!("{url}_0"),
            kind: crate::types::RecordKind::Fact,
            session_id: None,
            tags: Default::default(),
        }
    }

    #[test]
    fn ranking_reorders_by_relevance_and_keeps_distance() {
        let results = vec![result("a", "alpha text", 0.5), result("b", "beta text", 0.9)];
        let raw = "0|0.2|0|5|alpha\n1|0.8|0|4|beta\nFINAL_ANSWER: beta wins";
        let (ranked, answer) = parse_ranking(raw, &results);
        assert_eq!(ranked.iter().map(|r| r.url.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(ranked[0].score, 0.9);
        assert_eq!((ranked[0].highlight_start, ranked[0].highlight_end), (0, 4));
        assert_eq!(answer.as_deref(), Some("beta wins"));
    }

    #[test]
    fn ranking_skips_bad_lines_and_clamps_offsets() {
        let results = vec![result("a", "short", 1.0)];
        let raw = "RESULT|0.9|0|3|x\n7|0.9|0|1|x\n0|high|0|1|x\n0|1|0\n0|0.5|3|999|x\n0|0.9|0|1|dup";
        let (ranked, answer) = parse_ranking(raw, &results);
        assert_eq!(ranked.len(), 1);
        assert_eq!((ranked[0].highlight_start, ranked[0].highlight_end), (3, 5));
        assert!(answer.is_none());
    }

    #[test]
    fn ranking_prompt_numbers_results_and_truncates_snippets() {
        let long = "x".repeat(500);
        let prompt = ranking_prompt("q", Some("look it up"), &[result("u", &long, 0.0)]);
        assert!(prompt.contains("0. u (u): "));
        assert!(prompt.contains("Initial plan: look it up"));
        assert!(!prompt.contains(&"x".repeat(201)));
        assert!(ranking_prompt("q", None, &[]).contains("Initial plan: None"));
    }

    #[test]
    fn parses_nested_function_call() {
        let d = Decision::parse("FUNCTION_CALL: add|input.a=5|input.b=3").unwrap();
        assert_eq!(
            d,
            Decision::FunctionCall {
                name: "add".into(),
                arguments: json!({"input": {"a": 5, "b": 3}}),
            }
        );
    }

    #[test]
    fn string_and_list_values() {
        let d = Decision::parse(
            r#"FUNCTION_CALL: search_pages|query="rust memory"|input.int_list=[73,78]|input.string=INDIA"#,
        )
        .unwrap();
        let Decision::FunctionCall { name, arguments } = d else {
            panic!("expected function call");
        };
        assert_eq!(name, "search_pages");
        assert_eq!(arguments["query"], json!("rust memory"));
        assert_eq!(arguments["input"]["int_list"], json!([73, 78]));
        assert_eq!(arguments["input"]["string"], json!("INDIA"));
    }

    #[test]
    fn first_decision_line_wins() {
        let raw = "Let me think.\nNO_TOOL_NEEDED: The sum is 4\nFUNCTION_CALL: add|a=1";
        assert_eq!(
            Decision::parse(raw).unwrap(),
            Decision::FinalAnswer("The sum is 4".into())
        );
        assert!(Decision::parse(raw).unwrap().is_final());
    }

    #[test]
    fn relevant_context_and_unstructured() {
        assert_eq!(
            Decision::parse("RELEVANT_CONTEXT_FOUND: [a, b]").unwrap(),
            Decision::RelevantContext("[a, b]".into())
        );
        assert_eq!(
            Decision::parse("  just prose  ").unwrap(),
            Decision::Unstructured("just prose".into())
        );
    }

    #[test]
    fn malformed_params_are_rejected() {
        assert!(Decision::parse("FUNCTION_CALL: add|nonsense").is_err());
        assert!(Decision::parse("FUNCTION_CALL: |a=1").is_err());
        assert!(Decision::parse("FUNCTION_CALL: f|a=1|a.b=2").is_err());
    }

    #[test]
    fn prompt_names_every_format() {
        let p = planning_prompt("what is rust?", "None");
        assert!(p.contains(FUNCTION_CALL));
        assert!(p.contains(NO_TOOL_NEEDED));
        assert!(p.contains(RELEVANT_CONTEXT_FOUND));
        assert!(p.contains("\"what is rust?\""));
        assert_eq!(memory_context(&[]), "None");
    }
}
