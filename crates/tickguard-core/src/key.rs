use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Deterministic identifier for a cacheable unit of work.
///
/// Two keys are equal when the operation name and the ordered argument list are
/// equal. The key doubles as the log correlation id for every attempt made on
/// its behalf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationKey {
    operation: String,
    args: Vec<String>,
}

impl OperationKey {
    pub fn new<I, S>(operation: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation: operation.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Key for an operation that takes a single symbol argument.
    pub fn symbol(operation: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            args: vec![symbol.into()],
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl Display for OperationKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.operation)?;
        for (index, arg) in self.args.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            f.write_str(arg)?;
        }
        f.write_str(")")
    }
}
