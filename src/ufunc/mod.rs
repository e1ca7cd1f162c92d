//! Universal functions: specialization, type resolution, broadcasting
//! and execution

pub mod broadcast;
pub mod compiler;
pub mod function;
pub mod gufunc;
mod loops;
pub mod runtime;
pub mod signature;
pub mod table;
pub mod vectorizer;

pub use broadcast::{broadcast_shapes, ExecutionPlan};
pub use compiler::{HostCompiler, Kernel, KernelCompiler};
pub use function::{CoreFn, ElementwiseFn, FunctionBody, ScalarFunction};
pub use gufunc::{CoreDim, GufuncLayout};
pub use runtime::{ExecutionReport, Ufunc};
pub use signature::Signature;
pub use table::{Specialization, SpecializationTable};
pub use vectorizer::Vectorizer;
