pub mod analyzer;
pub mod api;
pub mod backend;
pub mod config;
pub mod export;
pub mod models;
pub mod session;
pub mod tutor;

pub const APP_TITLE: &str = "语言学习聊天助手";

pub use config::Config;
pub use models::*;
pub use session::ChatSession;
pub use tutor::LanguageTutor;
