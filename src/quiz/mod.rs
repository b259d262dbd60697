//! Quiz sessions for the main backend.

pub mod fallback;
pub mod remote;
pub mod routes;
pub mod service;
pub mod session;

pub use fallback::QuestionSource;
pub use remote::McpClient;
pub use service::QuizService;
pub use session::{QuizError, QuizState};
