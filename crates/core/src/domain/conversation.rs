use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifetime of a stored checkout state. Expiry is equivalent to "no active checkout".
pub const CHECKOUT_STATE_TTL_SECS: u64 = 1_800;

/// One customer on one chat channel. At most one checkout exists per key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub user_id: String,
    pub channel_id: String,
}

impl ConversationKey {
    pub fn new(user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), channel_id: channel_id.into() }
    }

    pub fn checkout_key(&self) -> String {
        format!("checkout:{}:{}", self.user_id, self.channel_id)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::ConversationKey;

    #[test]
    fn checkout_key_is_scoped_by_user_and_channel() {
        let key = ConversationKey::new("U123", "line-main");
        assert_eq!(key.checkout_key(), "checkout:U123:line-main");
        assert_ne!(key.checkout_key(), ConversationKey::new("U123", "fb-page").checkout_key());
    }
}
