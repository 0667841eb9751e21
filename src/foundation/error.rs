/// Convenience result type used across holopath.
pub type HolopathResult<T> = Result<T, HolopathError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum HolopathError {
    /// Missing or malformed input data (depth field, points, parameters).
    #[error("input error: {0}")]
    InvalidInput(String),

    /// Failures while rendering or assembling output documents.
    #[error("render error: {0}")]
    Render(String),

    /// The operation was cancelled by a superseding request.
    #[error("operation cancelled")]
    Cancelled,

    /// Wrapped lower-level error from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HolopathError {
    /// Build a [`HolopathError::InvalidInput`] value.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Build a [`HolopathError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_their_taxonomy_prefix() {
        assert_eq!(
            HolopathError::invalid_input("no depth field loaded").to_string(),
            "input error: no depth field loaded"
        );
        assert_eq!(
            HolopathError::render("bad marker").to_string(),
            "render error: bad marker"
        );
        assert_eq!(HolopathError::Cancelled.to_string(), "operation cancelled");
    }
}
