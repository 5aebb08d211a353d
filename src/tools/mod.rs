pub mod executor;
pub mod registry;

pub use executor::{
    truncate_output, CodeExecutor, Language, OutputSink, ProcessExecutor, MAX_OUTPUT_CHARS,
};
pub use registry::{ExecutorFactory, ExecutorRegistry, ProcessExecutorFactory};
