//! Macros for defining typed ID types.

/// Macro to define a typed UUID-backed ID.
///
/// This generates a newtype wrapper around [`uuid::Uuid`] with:
/// - A `KIND` constant used in error messages
/// - `new()` to generate a fresh random (v4) ID
/// - `parse()` to parse from the hyphenated string form
/// - `Display` and `FromStr` implementations
/// - `Serialize` and `Deserialize` implementations (as strings)
/// - `Ord`, `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_id!(PoolId, "pool id");
///
/// let pool_id = PoolId::new();
/// let parsed: PoolId = pool_id.to_string().parse()?;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $kind:literal) => {
        /// A typed ID for this record type.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::Uuid);

        impl $name {
            /// Human readable name of this ID type.
            pub const KIND: &'static str = $kind;

            /// Creates a new random ID.
            #[must_use]
            pub fn new() -> Self {
                Self($crate::Uuid::new_v4())
            }

            /// Wraps a raw UUID.
            #[must_use]
            pub const fn from_uuid(uuid: $crate::Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn uuid(&self) -> $crate::Uuid {
                self.0
            }

            /// Parses an ID from its hyphenated string form.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty { kind: Self::KIND });
                }

                let uuid = s
                    .parse::<$crate::Uuid>()
                    .map_err(|e| $crate::IdError::InvalidUuid {
                        kind: Self::KIND,
                        message: e.to_string(),
                    })?;

                Ok(Self(uuid))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<$crate::Uuid> for $name {
            fn from(uuid: $crate::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.to_string())
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

        impl AsRef<$crate::Uuid> for $name {
            fn as_ref(&self) -> &$crate::Uuid {
                &self.0
            }
        }
    };
}
