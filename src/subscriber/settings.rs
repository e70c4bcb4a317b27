/// Token rewritten to the signed-in user's identifier inside filter values.
pub const USER_ID_PLACEHOLDER: &str = "{userId}";

/// Tunables for a [`SubscriptionCoordinator`](super::SubscriptionCoordinator).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriberSettings {
    /// Placeholder searched for in string filter values.
    pub placeholder: String,
    /// When `false` only the first occurrence of the placeholder is rewritten.
    pub replace_all_placeholders: bool,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            placeholder: USER_ID_PLACEHOLDER.to_string(),
            replace_all_placeholders: false,
        }
    }
}

impl SubscriberSettings {
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn with_replace_all_placeholders(mut self, replace_all: bool) -> Self {
        self.replace_all_placeholders = replace_all;
        self
    }
}
