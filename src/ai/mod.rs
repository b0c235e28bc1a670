pub mod completion;

pub use completion::{CompletionMessage, CompletionProvider, OpenAICompletion};
