pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No element matched the mount selector. Nothing can be rendered.
    #[error("mount target not found: no element matches {selector:?}; check the selector and that the document is loaded")]
    MountTargetNotFound { selector: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[source] serde_json::Error),

    #[error("expression error in `{expr}`: {reason}")]
    Expression { expr: String, reason: String },
}

impl Error {
    pub fn mount_target_not_found(selector: impl Into<String>) -> Self {
        Self::MountTargetNotFound {
            selector: selector.into(),
        }
    }

    pub fn expression(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Expression {
            expr: expr.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(Error::mount_target_not_found("#app")
            .to_string()
            .contains("mount target not found"));
        assert!(Error::expression("a +", "unexpected end")
            .to_string()
            .contains("expression error in `a +`"));
    }

    #[test]
    fn invalid_config_preserves_source() {
        use std::error::Error as _;

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::InvalidConfig(source);
        assert!(err.source().is_some());
    }
}
