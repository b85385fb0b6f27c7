use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tools::{http_client, parse_arguments, Tool, ToolError};

const CONTEXT: &str = "Error searching the web";

/// DuckDuckGo instant-answer search.
pub struct WebSearchTool {
    endpoint: String,
    max_results: usize,
    http: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(
        endpoint: impl Into<String>,
        max_results: usize,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        Ok(Self { endpoint: endpoint.into(), max_results, http: http_client(timeout)? })
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, String> {
        let mut url = Url::parse(&self.endpoint).map_err(|error| error.to_string())?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "json")
            .append_pair("no_html", "1")
            .append_pair("skip_disambig", "1");

        let response = self.http.get(url).send().await.map_err(|error| error.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("search returned status {}", status.as_u16()));
        }

        let answer: InstantAnswer = response.json().await.map_err(|error| error.to_string())?;
        Ok(collect_results(answer, self.max_results))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct InstantAnswer {
    heading: String,
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct RelatedTopic {
    text: String,
    #[serde(rename = "FirstURL")]
    first_url: String,
    topics: Vec<RelatedTopic>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

fn collect_results(answer: InstantAnswer, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if !answer.abstract_text.is_empty() {
        results.push(SearchResult {
            title: answer.heading,
            snippet: answer.abstract_text,
            link: answer.abstract_url,
        });
    }

    let mut pending = answer.related_topics;
    pending.reverse();
    while let Some(topic) = pending.pop() {
        if results.len() >= max_results {
            break;
        }
        if !topic.topics.is_empty() {
            pending.extend(topic.topics.into_iter().rev());
            continue;
        }
        if topic.text.is_empty() {
            continue;
        }

        let title = topic.text.split(" - ").next().unwrap_or_default().to_string();
        results.push(SearchResult { title, snippet: topic.text, link: topic.first_url });
    }

    results.truncate(max_results);
    results
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "WebSearch"
    }

    fn description(&self) -> &'static str {
        "A wrapper around web search. Useful for when you need to answer questions about current \
         events or local information. Input should be a search query. Output is a JSON array of \
         results with title, snippet and link."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "search query to look up" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: SearchArgs = parse_arguments(self.name(), arguments)?;
        let results =
            self.search(&args.query).await.map_err(|error| ToolError::request(CONTEXT, error))?;
        serde_json::to_value(results)
            .map_err(|error| ToolError::UnexpectedResponse(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{collect_results, InstantAnswer};

    fn answer() -> InstantAnswer {
        serde_json::from_value(json!({
            "Heading": "Lisbon",
            "AbstractText": "Lisbon is the capital of Portugal.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Lisbon",
            "RelatedTopics": [
                {"Text": "Alfama - oldest district of Lisbon", "FirstURL": "https://duckduckgo.com/Alfama"},
                {"Name": "Transport", "Topics": [
                    {"Text": "Lisbon Metro - rapid transit", "FirstURL": "https://duckduckgo.com/Metro"},
                    {"Text": "Tram 28 - heritage tram line", "FirstURL": "https://duckduckgo.com/Tram_28"}
                ]},
                {"Text": "Belém - riverside parish", "FirstURL": "https://duckduckgo.com/Belem"}
            ]
        }))
        .expect("answer")
    }

    #[test]
    fn abstract_comes_first_and_nested_groups_are_flattened_in_order() {
        let results = collect_results(answer(), 10);
        let titles = results.iter().map(|result| result.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["Lisbon", "Alfama", "Lisbon Metro", "Tram 28", "Belém"]);
        assert_eq!(results[1].snippet, "Alfama - oldest district of Lisbon");
        assert_eq!(results[1].link, "https://duckduckgo.com/Alfama");
    }

    #[test]
    fn results_are_capped() {
        assert_eq!(collect_results(answer(), 4).len(), 4);
        assert_eq!(collect_results(answer(), 1)[0].title, "Lisbon");
    }

    #[test]
    fn empty_answer_has_no_results() {
        assert!(collect_results(InstantAnswer::default(), 4).is_empty());
    }
}
