//! Macros for defining typed identifier types.

/// Macro to define a typed identifier.
///
/// This generates a newtype wrapper around an opaque string with:
/// - `parse()` with strict validation
/// - `as_str()` for borrowing the raw value
/// - `Display` and `FromStr` implementations
/// - `Serialize` and `Deserialize` implementations
/// - `Ord`, `Hash`, and other standard traits
///
/// Identifiers are assigned by a remote peer, so there is no local
/// generation; parsing an externally supplied string is the only way to
/// construct one.
///
/// # Example
///
/// ```ignore
/// define_id!(FrameworkId);
///
/// let id = FrameworkId::parse("fw-201104")?;
/// assert_eq!(id.as_str(), "fw-201104");
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        /// A typed identifier for this resource kind.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Parses an identifier from a string.
            ///
            /// The string must be non-empty and free of whitespace and
            /// control characters.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }

                if let Some(c) = s.chars().find(|c| c.is_whitespace() || c.is_control()) {
                    return Err($crate::IdError::ForbiddenCharacter(c));
                }

                Ok(Self(s.to_string()))
            }

            /// Returns the raw identifier value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning the raw value.
            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}
