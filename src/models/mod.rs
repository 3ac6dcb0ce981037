mod chat;
mod opportunity;
mod quote;
mod research;

pub use chat::{ChatMessage, ChatRole, QueryEnvelope, QueryOutcome, QueryRequest, QueryResponse};
pub use opportunity::{LiveStock, MarketMovers};
pub use quote::{IndexQuote, QuoteFailure, StockSnapshot};
pub use research::{ResearchResult, RetrievedDocument, SearchOutcome, SearchResult};
