//! Error types for the modeljit crate.
//!
//! Three layers of failure are kept apart, mirroring the stages a model goes
//! through:
//!
//! - `ConvertError`: converting a parsed evalexpr tree into our expression type
//! - `BuilderError`: JIT compilation with Cranelift
//! - `ModelError`: model construction, argument binding and evaluation
//!
//! All construction errors are fatal for the model being built; all call
//! errors are fatal for that call only. Nothing is retried here — retry
//! policy, if any, belongs to the optimizer driving the model.

use cranelift_codegen::CodegenError;
use cranelift_module::ModuleError;
use evalexpr::{DefaultNumericTypes, EvalexprError};
use thiserror::Error;

/// Errors that can occur while converting an evalexpr AST into our internal
/// expression representation.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Operator present in the parsed tree that we cannot express
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// Function call with a name we do not recognise
    #[error("unsupported function: {0}")]
    UnsupportedFunction(String),
    /// Root node with more than one child
    #[error("expected single child for root node: {0}")]
    RootNode(String),
    /// Constant that is not numeric
    #[error("expected numeric constant: {0}")]
    ConstOperator(String),
}

/// Errors that can occur during JIT compilation of expressions.
#[derive(Error, Debug)]
pub enum BuilderError {
    /// The target machine architecture is not supported
    #[error("host machine is not supported: {0}")]
    HostMachineNotSupported(String),
    /// Cranelift code generation failed
    #[error("codegen error: {0}")]
    CodegenError(CodegenError),
    /// Cranelift JIT module error
    #[error("module error: {0}")]
    ModuleError(ModuleError),
    /// Defining the JIT function failed
    #[error("function error: {0}")]
    FunctionError(String),
    /// Declaring the JIT function failed
    #[error("declaration error: {0}")]
    DeclarationError(String),
    /// An expression referenced a symbol with no slot in the input layout
    #[error("no input slot for symbol: {0}")]
    UnknownSymbol(String),
}

/// Errors raised when constructing, calling or differentiating a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A parameter was used as an output key of the model mapping
    #[error("parameter '{0}' may not be used as a model output")]
    ParameterAsOutput(String),
    /// The same output symbol appeared twice in the model mapping
    #[error("duplicate model output: {0}")]
    DuplicateOutput(String),
    /// An output's expression depends on the output itself
    #[error("output '{0}' depends on itself")]
    SelfReference(String),
    /// The interdependent outputs form a cycle and cannot be ordered
    #[error("cyclic dependency between outputs: {0}")]
    CyclicDependency(String),
    /// A call did not supply one or more required arguments
    #[error("missing required argument(s): {0}")]
    MissingArguments(String),
    /// A call supplied one or more argument names outside the signature
    #[error("unexpected argument(s): {0}")]
    UnexpectedArguments(String),
    /// A call supplied the same argument name more than once
    #[error("duplicate argument(s): {0}")]
    DuplicateArguments(String),
    /// Array-valued inputs or outputs disagree on length
    #[error("shape mismatch for '{name}': expected length {expected}, got {got}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    /// Matrix operands with incompatible dimensions
    #[error("matrix dimension mismatch: {0}")]
    MatrixShape(String),
    /// A matrix inverse was requested for a singular operand
    #[error("matrix for output '{0}' is singular")]
    SingularMatrix(String),
    /// Jacobian/Hessian requested for an output with no symbolic expression
    #[error("output '{0}' has no symbolic expression and cannot be differentiated")]
    NotDifferentiable(String),
    /// Requested evaluation points lie outside the integrable range
    #[error("integration range error: {0}")]
    IntegrationRange(String),
    /// The ODE integrator failed
    #[error("integration failed: {0}")]
    IntegrationFailed(String),
    /// Parsing an expression string with evalexpr failed
    #[error("failed to parse expression")]
    Parse(#[from] EvalexprError<DefaultNumericTypes>),
    /// Converting the parsed tree into our expression type failed
    #[error("failed to convert expression")]
    Convert(#[from] ConvertError),
    /// JIT compiling an expression failed
    #[error("failed to compile expression")]
    Build(#[from] BuilderError),
}
