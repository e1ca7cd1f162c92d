use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::error::UfuncResult;
use crate::tensor::{NdArray, Scalar};

/// Scalar body applied once per output element
pub type ElementwiseFn = Arc<dyn Fn(&[Scalar]) -> Scalar + Send + Sync>;

/// Body applied once per loop index to views of the declared core shapes
pub type CoreFn = Arc<dyn Fn(&[NdArray]) -> UfuncResult<NdArray> + Send + Sync>;

#[derive(Clone)]
pub enum FunctionBody {
    Elementwise(ElementwiseFn),
    Core(CoreFn),
}

/// The function a vectorizer specializes: a name, a declared parameter
/// count and a type-generic body.
#[derive(Clone)]
pub struct ScalarFunction {
    name: String,
    arity: usize,
    body: FunctionBody,
}

impl ScalarFunction {
    pub fn elementwise<F>(name: &str, arity: usize, body: F) -> Self
    where
        F: Fn(&[Scalar]) -> Scalar + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            arity,
            body: FunctionBody::Elementwise(Arc::new(body)),
        }
    }

    /// Body for generalized-signature ufuncs
    pub fn core<F>(name: &str, arity: usize, body: F) -> Self
    where
        F: Fn(&[NdArray]) -> UfuncResult<NdArray> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            arity,
            body: FunctionBody::Core(Arc::new(body)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn body(&self) -> &FunctionBody {
        &self.body
    }

    pub fn is_core(&self) -> bool {
        matches!(self.body, FunctionBody::Core(_))
    }
}

impl Debug for ScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("core", &self.is_core())
            .finish()
    }
}
