pub mod attempts;
pub mod complexity;
pub mod evaluation;
pub mod final_selector;
pub mod stats;

pub use attempts::AttemptService;
pub use complexity::ComplexityClassifier;
pub use evaluation::{EvaluationRequest, Evaluator};
