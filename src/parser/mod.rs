pub mod markup;
pub mod response;
pub mod text;

pub use markup::extract;
pub use response::{parse_response, ClassificationResult, DEFAULT_CONFIDENCE};
