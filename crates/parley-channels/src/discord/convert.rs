use std::sync::LazyLock;

use regex::Regex;

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?\d+>").expect("mention regex should compile"));

/// What a mention-addressed message asks of the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPrompt {
    /// The bot was mentioned with nothing else to say.
    Empty,
    Text(String),
}

/// Remove every user mention token and trim the result.
pub fn strip_mentions(content: &str) -> String {
    MENTION.replace_all(content, "").trim().to_string()
}

/// Decide whether a message should be answered and with which prompt.
///
/// Bot authors are ignored to prevent reply loops; messages that do not
/// mention the bot are not addressed to it.
pub fn inbound_prompt(content: &str, author_is_bot: bool, mentions_bot: bool) -> Option<InboundPrompt> {
    if author_is_bot || !mentions_bot {
        return None;
    }
    let prompt = strip_mentions(content);
    if prompt.is_empty() {
        Some(InboundPrompt::Empty)
    } else {
        Some(InboundPrompt::Text(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_both_mention_forms() {
        assert_eq!(
            strip_mentions("<@123> hello <@!456>  there "),
            "hello   there"
        );
        assert_eq!(strip_mentions("<#789> keeps channel links"), "<#789> keeps channel links");
    }

    #[test]
    fn ignores_bots_and_unaddressed_messages() {
        assert_eq!(inbound_prompt("<@1> hi", true, true), None);
        assert_eq!(inbound_prompt("hi", false, false), None);
    }

    #[test]
    fn bare_mention_is_an_empty_prompt() {
        assert_eq!(inbound_prompt("  <@1>  ", false, true), Some(InboundPrompt::Empty));
        assert_eq!(
            inbound_prompt("<@!1> what is rust?", false, true),
            Some(InboundPrompt::Text("what is rust?".into()))
        );
    }
}
