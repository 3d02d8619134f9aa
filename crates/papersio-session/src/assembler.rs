use crate::model::{ResearchResponse, Source};

/// Describes how live sessions are researched; attached to every response.
pub const LIVE_STRATEGY_LABEL: &str =
    "Live research: Memory > Plan > Search > Analyze > Write > Critique";

/// Builds the final response from a `result` frame. Sources are taken as-is:
/// no deduplication, reordering or filtering.
pub fn assemble_response(query: &str, answer: String, sources: Vec<Source>) -> ResearchResponse {
    ResearchResponse::new(
        query.trim().to_string(),
        answer,
        sources,
        LIVE_STRATEGY_LABEL.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceKind;

    #[test]
    fn copies_single_arxiv_source_exactly() {
        let sources = vec![Source {
            title: "A".to_string(),
            url: "http://x".to_string(),
            kind: SourceKind::Academic,
            authors: Vec::new(),
        }];
        let response = assemble_response("q", "answer".to_string(), sources.clone());
        assert_eq!(response.sources(), sources.as_slice());
    }

    #[test]
    fn keeps_duplicates_and_order() {
        let make = |title: &str, kind| Source {
            title: title.to_string(),
            url: format!("http://{title}"),
            kind,
            authors: vec!["Someone".to_string()],
        };
        let sources = vec![
            make("b", SourceKind::Web),
            make("a", SourceKind::Academic),
            make("b", SourceKind::Web),
        ];
        let response = assemble_response("q", String::new(), sources.clone());
        assert_eq!(response.sources(), sources.as_slice());
    }

    #[test]
    fn answer_is_verbatim_and_query_trimmed() {
        let answer = "## Findings\n\n  indented [1]\n".to_string();
        let response = assemble_response("  dark matter  ", answer.clone(), Vec::new());
        assert_eq!(response.answer(), answer);
        assert_eq!(response.query(), "dark matter");
        assert_eq!(response.strategy_label(), LIVE_STRATEGY_LABEL);
    }
}
