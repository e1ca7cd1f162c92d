use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::{UfuncError, UfuncResult};
use crate::tensor::DType;

/// Ordered argument types plus one return type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    restype: DType,
    argtypes: Vec<DType>,
}

impl Signature {
    pub fn new(restype: DType, argtypes: &[DType]) -> Self {
        Self {
            restype,
            argtypes: argtypes.to_vec(),
        }
    }

    pub fn restype(&self) -> DType {
        self.restype
    }

    pub fn argtypes(&self) -> &[DType] {
        &self.argtypes
    }

    pub fn arity(&self) -> usize {
        self.argtypes.len()
    }

    pub fn matches_exactly(&self, dtypes: &[DType]) -> bool {
        self.argtypes == dtypes
    }

    /// Every requested dtype widens losslessly into the matching argtype
    pub fn accepts_by_safe_cast(&self, dtypes: &[DType]) -> bool {
        self.argtypes.len() == dtypes.len()
            && dtypes
                .iter()
                .zip(self.argtypes.iter())
                .all(|(from, to)| from.can_cast_to(*to))
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self
            .argtypes
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}({})", self.restype, args)
    }
}

impl FromStr for Signature {
    type Err = UfuncError;

    /// Parses `restype(arg, ...)`, e.g. `f4(f4, f4)` or `f64(i32)`.
    fn from_str(s: &str) -> UfuncResult<Self> {
        let s = s.trim();
        let malformed = || UfuncError::InvalidInput(format!("malformed signature '{}'", s));
        let open = s.find('(').ok_or_else(malformed)?;
        if !s.ends_with(')') {
            return Err(malformed());
        }
        let restype: DType = s[..open].parse()?;
        let inner = s[open + 1..s.len() - 1].trim();
        let argtypes = if inner.is_empty() {
            Vec::new()
        } else {
            inner
                .split(',')
                .map(str::parse)
                .collect::<UfuncResult<Vec<DType>>>()?
        };
        Ok(Self { restype, argtypes })
    }
}
