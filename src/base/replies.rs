//! Default reply texts and topic keywords.
//!
//! Every reply can be overridden through the configuration; these are the values used when
//! nothing else is set.

/// Reply to the greet command.
pub const GREET_REPLY: &str = "Hello";

/// Reply after a successful join.
pub const JOINED_REPLY: &str = "Hello! Now you will receive notifications as soon as a message with a hashtag appears.";

/// Reply when the sender had already joined.
pub const ALREADY_JOINED_REPLY: &str = "You are already in the party!";

/// Reply when another member already uses the sender's display name.
pub const NAME_TAKEN_REPLY: &str = "Someone here already uses your display name. Change it and try again.";

/// Reply after leaving.
pub const LEFT_REPLY: &str = "Bye. Notifications won't bother you anymore.";

/// Topics seeded into an empty store.
pub const DEFAULT_KEYWORDS: &[&str] = &["#го", "#знакомство", "#рекомендую"];

/// Header placed above a forwarded message.
pub fn forward_header(origin_chat_id: &str, sender_identity: &str) -> String {
    format!("<@{sender_identity}> posted in <#{origin_chat_id}>:")
}
