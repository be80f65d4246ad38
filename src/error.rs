// Error kinds, not class names: every variant carries an Origin and a
// human-readable detail naming the offending symbol.

use crate::origin::Origin;
use thiserror::Error;

pub type JexlResult<T> = Result<T, JexlError>;

#[derive(Error, Debug, Clone)]
pub enum JexlError {
    #[error("{origin}: parse error: {detail}")]
    Parsing { origin: Origin, detail: String },

    #[error("{origin}: ambiguous statement: {detail}")]
    Ambiguous { origin: Origin, detail: String },

    #[error("{origin}: feature disabled: {feature}")]
    Feature { origin: Origin, feature: String },

    #[error("{origin}: variable '{name}': {detail}")]
    Variable {
        origin: Origin,
        name: String,
        undefined: bool,
        detail: String,
    },

    #[error("{origin}: property '{name}': {detail}")]
    Property {
        origin: Origin,
        name: String,
        detail: String,
    },

    #[error("{origin}: method '{name}': {detail}")]
    Method {
        origin: Origin,
        name: String,
        detail: String,
    },

    #[error("{origin}: operator '{symbol}': {detail}")]
    Operator {
        origin: Origin,
        symbol: String,
        detail: String,
    },

    #[error("{origin}: annotation '{name}': {detail}")]
    Annotation {
        origin: Origin,
        name: String,
        detail: String,
    },

    #[error("{origin}: cancelled")]
    Cancel { origin: Origin },

    #[error("{origin}: assignment to '{name}': {detail}")]
    Assignment {
        origin: Origin,
        name: String,
        detail: String,
    },

    #[error("{origin}: internal error: {detail}")]
    InternalBug { origin: Origin, detail: String },
}

impl JexlError {
    pub fn parsing(origin: Origin, detail: impl Into<String>) -> Self {
        JexlError::Parsing {
            origin,
            detail: detail.into(),
        }
    }

    pub fn ambiguous(origin: Origin, detail: impl Into<String>) -> Self {
        JexlError::Ambiguous {
            origin,
            detail: detail.into(),
        }
    }

    pub fn feature(origin: Origin, feature: impl Into<String>) -> Self {
        JexlError::Feature {
            origin,
            feature: feature.into(),
        }
    }

    pub fn variable_undefined(origin: Origin, name: impl Into<String>) -> Self {
        let name = name.into();
        JexlError::Variable {
            origin,
            detail: format!("undefined variable '{name}'"),
            name,
            undefined: true,
        }
    }

    pub fn variable(origin: Origin, name: impl Into<String>, detail: impl Into<String>) -> Self {
        JexlError::Variable {
            origin,
            name: name.into(),
            undefined: false,
            detail: detail.into(),
        }
    }

    pub fn property(origin: Origin, name: impl Into<String>, detail: impl Into<String>) -> Self {
        JexlError::Property {
            origin,
            name: name.into(),
            detail: detail.into(),
        }
    }

    pub fn method(origin: Origin, name: impl Into<String>, detail: impl Into<String>) -> Self {
        JexlError::Method {
            origin,
            name: name.into(),
            detail: detail.into(),
        }
    }

    pub fn operator(origin: Origin, symbol: impl Into<String>, detail: impl Into<String>) -> Self {
        JexlError::Operator {
            origin,
            symbol: symbol.into(),
            detail: detail.into(),
        }
    }

    pub fn annotation(origin: Origin, name: impl Into<String>, detail: impl Into<String>) -> Self {
        JexlError::Annotation {
            origin,
            name: name.into(),
            detail: detail.into(),
        }
    }

    pub fn cancel(origin: Origin) -> Self {
        JexlError::Cancel { origin }
    }

    pub fn assignment(origin: Origin, name: impl Into<String>, detail: impl Into<String>) -> Self {
        JexlError::Assignment {
            origin,
            name: name.into(),
            detail: detail.into(),
        }
    }

    pub fn internal_bug(origin: Origin, detail: impl Into<String>) -> Self {
        JexlError::InternalBug {
            origin,
            detail: detail.into(),
        }
    }

    pub fn origin(&self) -> &Origin {
        match self {
            JexlError::Parsing { origin, .. }
            | JexlError::Ambiguous { origin, .. }
            | JexlError::Feature { origin, .. }
            | JexlError::Variable { origin, .. }
            | JexlError::Property { origin, .. }
            | JexlError::Method { origin, .. }
            | JexlError::Operator { origin, .. }
            | JexlError::Annotation { origin, .. }
            | JexlError::Cancel { origin }
            | JexlError::Assignment { origin, .. }
            | JexlError::InternalBug { origin, .. } => origin,
        }
    }

    /// True for `Variable` errors raised by reading a name that was never
    /// bound, as opposed to e.g. a `const` rebind detected under
    /// `lexicalShade`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, JexlError::Variable { undefined: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_mentions_offending_name() {
        let origin = Origin::new("test", 1, 1);
        let err = JexlError::variable_undefined(origin, "y");
        assert!(err.to_string().contains('y'));
        assert!(err.is_undefined());
    }

    #[test]
    fn parsing_detail_is_inspectable() {
        let origin = Origin::new("test", 3, 5);
        let err = JexlError::parsing(origin, "'remove' outside a loop");
        assert!(err.to_string().contains("remove"));
    }
}
