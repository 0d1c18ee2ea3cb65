//! A collection of newtypes defining type-strong IDs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discord sends snowflake ids as strings over the wire, but accepts either form; numbers are
/// compared and stored as `u64`.
pub(crate) mod snowflake {
    use std::fmt;

    use serde::de::{Error, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        deserializer.deserialize_any(SnowflakeVisitor)
    }

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    struct SnowflakeVisitor;

    impl Visitor<'_> for SnowflakeVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a string or integer snowflake")
        }

        fn visit_u64<E: Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(value)
        }

        fn visit_str<E: Error>(self, value: &str) -> Result<Self::Value, E> {
            value.parse().map_err(Error::custom)
        }
    }
}

macro_rules! id_u64 {
    ($($(#[$attr:meta])* $name:ident;)*) => {
        $(
            $(#[$attr])*
            #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
            pub struct $name(#[serde(with = "snowflake")] u64);

            impl $name {
                /// Creates a new id from a `u64`.
                #[must_use]
                pub const fn new(id: u64) -> Self {
                    Self(id)
                }

                /// Retrieves the inner id as a `u64`.
                #[must_use]
                pub const fn get(self) -> u64 {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.0, f)
                }
            }

            impl From<u64> for $name {
                fn from(id: u64) -> Self {
                    Self(id)
                }
            }

            impl From<$name> for u64 {
                fn from(id: $name) -> Self {
                    id.0
                }
            }
        )*
    };
}

id_u64! {
    /// An identifier for an Application.
    ApplicationId;
    /// An identifier for a Channel.
    ChannelId;
    /// An identifier for an Emoji.
    EmojiId;
    /// An identifier for a Guild.
    GuildId;
    /// An identifier for a Message.
    MessageId;
    /// An identifier for a Role.
    RoleId;
    /// An identifier for a User.
    UserId;
}

/// An identifier for a [`Shard`].
///
/// This identifier is special, it simply models internal IDs for type safety, and therefore cannot
/// be [`Serialize`]d or [`Deserialize`]d.
///
/// [`Shard`]: crate::gateway::Shard
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ShardId(pub u16);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::GuildId;

    #[test]
    fn snowflake_deser_accepts_both_forms() {
        let from_str: GuildId = serde_json::from_str("\"81384788765712384\"").unwrap();
        let from_num: GuildId = serde_json::from_str("81384788765712384").unwrap();

        assert_eq!(from_str, from_num);
        assert_eq!(from_str.get(), 81_384_788_765_712_384);
    }

    #[test]
    fn snowflake_ser_is_a_string() {
        let id = GuildId::new(81384788765712384);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"81384788765712384\"");
    }
}
