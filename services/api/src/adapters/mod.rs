pub mod db;
pub mod extract;
pub mod llm;

pub use db::PgStore;
pub use extract::OpenAiExtractorAdapter;
pub use llm::OpenAiModelAdapter;
