use serde::{Deserialize, Serialize};

/// Body of `POST /query`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub deep_search: bool,
    /// Conversation to continue; omitted requests share the default session
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Result of running a query through the assistant pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryOutcome {
    pub answer: String,
    pub deep_research_log: String,
}

impl QueryOutcome {
    pub fn direct(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            deep_research_log: String::new(),
        }
    }
}

/// Envelope returned by `POST /query`.
///
/// Web and mobile clients read `answer.answer.answer`, so the outcome is
/// nested one level below the top-level `answer` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: QueryEnvelope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEnvelope {
    pub answer: QueryOutcome,
    pub deep_research_log: String,
}

impl From<QueryOutcome> for QueryResponse {
    fn from(outcome: QueryOutcome) -> Self {
        Self {
            answer: QueryEnvelope {
                answer: outcome,
                deep_research_log: String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRole::System => write!(f, "system"),
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_request_defaults() {
        let req: QueryRequest = serde_json::from_str(r#"{"query": "price of apple"}"#).unwrap();
        assert!(!req.deep_search);
        assert!(req.session_id.is_none());
    }

    #[test]
    fn response_nests_outcome_under_answer() {
        let response = QueryResponse::from(QueryOutcome {
            answer: "Hello".into(),
            deep_research_log: "log".into(),
        });
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["answer"]["answer"]["answer"], "Hello");
        assert_eq!(json["answer"]["answer"]["deep_research_log"], "log");
        assert_eq!(json["answer"]["deep_research_log"], "");
    }
}
