pub mod judgment_parser;
pub mod llm_service;
pub mod prediction_cache;
pub mod result_writer;

pub use judgment_parser::{parse_max_level, JudgmentParser, JudgmentStrategy};
pub use llm_service::{LlmBackend, LlmService};
pub use prediction_cache::PredictionCache;
pub use result_writer::ResultWriter;
