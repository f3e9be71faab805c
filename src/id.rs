//! Newtypes around the platform's snowflake identifiers.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    num::NonZeroU64,
};

/// ID of a voice channel.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ChannelId(pub NonZeroU64);

/// ID of a guild (colloquially, "server").
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct GuildId(pub NonZeroU64);

/// ID of a user.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct UserId(pub NonZeroU64);

macro_rules! impl_id {
    ($t:ty) => {
        impl Display for $t {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                Display::fmt(&self.0, f)
            }
        }

        impl From<NonZeroU64> for $t {
            fn from(id: NonZeroU64) -> Self {
                Self(id)
            }
        }

        impl From<$t> for NonZeroU64 {
            fn from(id: $t) -> Self {
                id.0
            }
        }
    };
}

impl_id!(ChannelId);
impl_id!(GuildId);
impl_id!(UserId);
