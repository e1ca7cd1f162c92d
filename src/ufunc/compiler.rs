//! Seam to the kernel compiler: one opaque kernel per signature

use std::sync::Arc;

use crate::error::{UfuncError, UfuncResult};
use crate::tensor::{NdArray, Scalar};
use super::function::{CoreFn, ElementwiseFn, FunctionBody, ScalarFunction};
use super::signature::Signature;

/// A function specialized to one signature
pub trait Kernel: Send + Sync {
    fn signature(&self) -> &Signature;

    /// Evaluate one element. Arguments are cast to the signature's
    /// argtypes and the result to its restype.
    fn invoke(&self, args: &[Scalar]) -> UfuncResult<Scalar>;

    /// Evaluate one loop index of a generalized-signature ufunc
    fn invoke_core(&self, _args: &[NdArray]) -> UfuncResult<NdArray> {
        Err(UfuncError::UnsupportedOperation(format!(
            "kernel {} has no core-dimension entry point",
            self.signature()
        )))
    }
}

/// Turns a function plus a signature into a kernel
pub trait KernelCompiler: Send + Sync {
    fn compile(&self, signature: &Signature, function: &ScalarFunction) -> UfuncResult<Arc<dyn Kernel>>;
}

/// Specializes bodies in-process by wrapping them with the signature's casts
#[derive(Debug, Default, Clone, Copy)]
pub struct HostCompiler;

impl KernelCompiler for HostCompiler {
    fn compile(&self, signature: &Signature, function: &ScalarFunction) -> UfuncResult<Arc<dyn Kernel>> {
        if signature.arity() != function.arity() {
            return Err(UfuncError::arity(
                &format!("compile of '{}'", function.name()),
                function.arity(),
                signature.arity(),
            ));
        }
        match function.body() {
            FunctionBody::Elementwise(body) => {
                // probe with ones so division-style bodies stay finite
                let probe: Vec<Scalar> = signature.argtypes().iter().map(|t| Scalar::one(*t)).collect();
                let produced = body(&probe).dtype();
                if !produced.can_cast_to(signature.restype()) {
                    return Err(UfuncError::compilation(
                        signature,
                        format!(
                            "'{}' produces {} values, which do not fit {} without loss",
                            function.name(),
                            produced,
                            signature.restype()
                        ),
                    ));
                }
                Ok(Arc::new(HostKernel {
                    signature: signature.clone(),
                    body: body.clone(),
                }))
            }
            FunctionBody::Core(body) => Ok(Arc::new(HostCoreKernel {
                signature: signature.clone(),
                body: body.clone(),
            })),
        }
    }
}

struct HostKernel {
    signature: Signature,
    body: ElementwiseFn,
}

impl Kernel for HostKernel {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn invoke(&self, args: &[Scalar]) -> UfuncResult<Scalar> {
        let argtypes = self.signature.argtypes();
        if args.len() != argtypes.len() {
            return Err(UfuncError::arity("kernel invoke", argtypes.len(), args.len()));
        }
        let exact = args.iter().zip(argtypes.iter()).all(|(a, t)| a.dtype() == *t);
        let result = if exact {
            (self.body)(args)
        } else {
            let cast: Vec<Scalar> = args.iter().zip(argtypes.iter()).map(|(a, t)| a.cast(*t)).collect();
            (self.body)(&cast)
        };
        Ok(result.cast(self.signature.restype()))
    }
}

struct HostCoreKernel {
    signature: Signature,
    body: CoreFn,
}

impl Kernel for HostCoreKernel {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn invoke(&self, _args: &[Scalar]) -> UfuncResult<Scalar> {
        Err(UfuncError::UnsupportedOperation(format!(
            "kernel {} operates on core-dimension views, not scalars",
            self.signature
        )))
    }

    fn invoke_core(&self, args: &[NdArray]) -> UfuncResult<NdArray> {
        let argtypes = self.signature.argtypes();
        if args.len() != argtypes.len() {
            return Err(UfuncError::arity("kernel invoke", argtypes.len(), args.len()));
        }
        let views: Vec<NdArray> = args
            .iter()
            .zip(argtypes.iter())
            .map(|(view, t)| if view.dtype() == *t { view.clone() } else { view.cast(*t) })
            .collect();
        let result = (self.body)(&views)?;
        if result.dtype() == self.signature.restype() {
            Ok(result)
        } else {
            Ok(result.cast(self.signature.restype()))
        }
    }
}
