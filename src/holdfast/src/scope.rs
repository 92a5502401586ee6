use std::fmt::{Display, Formatter, Result as FmtResult};

/// How long an instance produced for a token is retained and shared.
///
/// `Singleton` instances are created once per container and shared by every
/// resolver. `Transient` instances are created anew on each resolution and
/// only tracked for teardown. `Request` instances are created once per
/// active request context and never leak across contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Singleton,
    Transient,
    Request,
}

impl Scope {
    /// Returns the name of the scope in a string literal.
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Singleton => "Singleton",
            Self::Transient => "Transient",
            Self::Request => "Request",
        }
    }

}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_display_matches_variant_names() {
        assert_eq!(Scope::Singleton.to_string(), "Singleton");
        assert_eq!(Scope::Transient.to_string(), "Transient");
        assert_eq!(Scope::Request.to_string(), "Request");
    }
}
