//! pysense: lazy value-set inference for Python source
//!
//! A [`Session`] loads files, resolves imports through search roots, bundled
//! stubs and an optional native bridge, and answers editor queries (infer,
//! goto, references, completions, signatures) by evaluating expressions into
//! sets of possible values on demand.

// Core modules
pub mod analysis;
pub mod ast;
pub mod compiled;
pub mod core;
pub mod errors;
pub mod frontend;
pub mod imports;
pub mod logging;
pub mod performance;

// Re-export commonly used items
pub use analysis::{
    CancelToken, Completion, DeclarationSite, ParamInfo, Reference, Session, SharedSession, Signature,
    ValueDescriptor, ValueKind,
};
pub use ast::{FileId, NodeId, NodeKind, NodeRef, SyntaxTree};
pub use compiled::{BridgeError, NativeBridge, StaticBridge, SubprocessBridge};
pub use core::{Value, ValueId, ValueSet};
pub use errors::{InferError, Result, SourceLocation};
pub use frontend::{parse_module, Config, PythonVersion, UnknownPolicy};
pub use logging::{init_dev_logging, init_from_config, init_logging, init_prod_logging, LogConfig};
pub use performance::{AnalysisJob, AnalysisResult, ParallelAnalyzer, PerformanceMetrics};
