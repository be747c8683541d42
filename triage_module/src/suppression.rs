//! Filter chains that decide whether an item gets an automated draft.
//!
//! Both pipelines evaluate one ordered chain per item; the first matching
//! filter wins and its reason string is persisted verbatim. Conversation
//! chains suppress the draft but still classify; email chains skip the
//! item entirely.

use crate::rule_store::{AgentRule, RuleType};

/// What a filter sees: one conversation or one email, flattened.
#[derive(Debug, Clone, Default)]
pub struct FilterItem {
    /// Phone number (SMS) or from address (email).
    pub sender: String,
    pub conversation_id: String,
    pub subject: String,
    /// Transcript (SMS) or body text (email).
    pub text: String,
}

/// A single suppression check. Returns the reason to persist when it matches.
pub trait SuppressionFilter: Send + Sync {
    fn check(&self, item: &FilterItem) -> Option<String>;
}

/// Ordered chain of filters; first match wins.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn SuppressionFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: impl SuppressionFilter + 'static) {
        self.filters.push(Box::new(filter));
    }

    pub fn evaluate(&self, item: &FilterItem) -> Option<String> {
        self.filters.iter().find_map(|f| f.check(item))
    }
}

/// DB blocklist entry for a phone number. Exact match, case-insensitive.
struct BlockedPhone {
    value: String,
}

impl SuppressionFilter for BlockedPhone {
    fn check(&self, item: &FilterItem) -> Option<String> {
        if item.sender.eq_ignore_ascii_case(&self.value) {
            Some(format!("Suppressed (blocklist): phone \"{}\"", self.value))
        } else {
            None
        }
    }
}

/// DB blocklist entry for a conversation id. Exact match.
struct BlockedConversation {
    value: String,
}

impl SuppressionFilter for BlockedConversation {
    fn check(&self, item: &FilterItem) -> Option<String> {
        if item.conversation_id.eq_ignore_ascii_case(&self.value) {
            Some(format!(
                "Suppressed (blocklist): conversation \"{}\"",
                self.value
            ))
        } else {
            None
        }
    }
}

/// Environment-configured phone, exact match against the sender.
struct StaticPhone {
    value: String,
}

impl SuppressionFilter for StaticPhone {
    fn check(&self, item: &FilterItem) -> Option<String> {
        if item.sender.eq_ignore_ascii_case(&self.value) {
            Some(format!("Suppressed (static): phone \"{}\"", self.value))
        } else {
            None
        }
    }
}

/// Environment-configured phrase, case-insensitive substring of the text.
struct StaticPhrase {
    value: String,
}

impl SuppressionFilter for StaticPhrase {
    fn check(&self, item: &FilterItem) -> Option<String> {
        if item.text.to_lowercase().contains(&self.value.to_lowercase()) {
            Some(format!("Suppressed (static): phrase \"{}\"", self.value))
        } else {
            None
        }
    }
}

/// DB-configured phrase, case-insensitive substring of the text.
struct BlockedPhrase {
    value: String,
}

impl SuppressionFilter for BlockedPhrase {
    fn check(&self, item: &FilterItem) -> Option<String> {
        if item.text.to_lowercase().contains(&self.value.to_lowercase()) {
            Some(format!("Suppressed (phrase): \"{}\"", self.value))
        } else {
            None
        }
    }
}

/// Agent rule: skip mail from an exact sender address.
struct SkipSender {
    pattern: String,
}

impl SuppressionFilter for SkipSender {
    fn check(&self, item: &FilterItem) -> Option<String> {
        if item.sender.eq_ignore_ascii_case(&self.pattern) {
            Some(format!("Skipped (rule): sender \"{}\"", self.pattern))
        } else {
            None
        }
    }
}

/// Agent rule: skip mail whose subject contains a substring.
struct SkipSubject {
    pattern: String,
}

impl SuppressionFilter for SkipSubject {
    fn check(&self, item: &FilterItem) -> Option<String> {
        if item
            .subject
            .to_lowercase()
            .contains(&self.pattern.to_lowercase())
        {
            Some(format!(
                "Skipped (rule): subject matches \"{}\"",
                self.pattern
            ))
        } else {
            None
        }
    }
}

/// Build the chain an OpenPhone conversation is checked against.
///
/// Order: DB blocklist (phones, then conversations), static env lists
/// (phones, then phrases), DB phrases last.
pub fn conversation_chain(
    blocked_phones: &[String],
    blocked_conversations: &[String],
    static_phones: &[String],
    static_phrases: &[String],
    blocked_phrases: &[String],
) -> FilterChain {
    let mut chain = FilterChain::new();
    for value in blocked_phones {
        chain.push(BlockedPhone {
            value: value.clone(),
        });
    }
    for value in blocked_conversations {
        chain.push(BlockedConversation {
            value: value.clone(),
        });
    }
    for value in static_phones {
        chain.push(StaticPhone {
            value: value.clone(),
        });
    }
    for value in static_phrases {
        chain.push(StaticPhrase {
            value: value.clone(),
        });
    }
    for value in blocked_phrases {
        chain.push(BlockedPhrase {
            value: value.clone(),
        });
    }
    chain
}

/// Build the chain a Gmail message is checked against, from the account's
/// enabled rules in insertion order.
pub fn email_chain(rules: &[AgentRule]) -> FilterChain {
    let mut chain = FilterChain::new();
    for rule in rules {
        match rule.rule_type {
            RuleType::SkipSender => chain.push(SkipSender {
                pattern: rule.pattern.clone(),
            }),
            RuleType::SkipSubject => chain.push(SkipSubject {
                pattern: rule.pattern.clone(),
            }),
        }
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sms_item(sender: &str, text: &str) -> FilterItem {
        FilterItem {
            sender: sender.to_string(),
            conversation_id: "CN1".to_string(),
            subject: String::new(),
            text: text.to_string(),
        }
    }

    #[test]
    fn first_match_wins_in_order() {
        let chain = conversation_chain(
            &["+15550001111".to_string()],
            &[],
            &["+15550001111".to_string()],
            &[],
            &[],
        );
        let reason = chain
            .evaluate(&sms_item("+15550001111", "hello"))
            .expect("match");
        // Blocklist entries come before static env entries.
        assert_eq!(reason, "Suppressed (blocklist): phone \"+15550001111\"");
    }

    #[test]
    fn phrase_match_is_case_insensitive_substring() {
        let chain = conversation_chain(&[], &[], &[], &["STOP".to_string()], &[]);
        let reason = chain
            .evaluate(&sms_item("+1", "please stop texting me"))
            .expect("match");
        assert_eq!(reason, "Suppressed (static): phrase \"STOP\"");
    }

    #[test]
    fn conversation_blocklist_matches_id() {
        let chain = conversation_chain(&[], &["CN1".to_string()], &[], &[], &[]);
        let reason = chain.evaluate(&sms_item("+1", "hi")).expect("match");
        assert_eq!(reason, "Suppressed (blocklist): conversation \"CN1\"");
    }

    #[test]
    fn db_phrase_uses_its_own_reason_prefix() {
        let chain = conversation_chain(&[], &[], &[], &[], &["unsubscribe".to_string()]);
        let reason = chain
            .evaluate(&sms_item("+1", "Reply UNSUBSCRIBE to opt out"))
            .expect("match");
        assert_eq!(reason, "Suppressed (phrase): \"unsubscribe\"");
    }

    #[test]
    fn no_match_returns_none() {
        let chain = conversation_chain(
            &["+15550001111".to_string()],
            &[],
            &[],
            &["stop".to_string()],
            &[],
        );
        assert!(chain.evaluate(&sms_item("+15559999999", "hello")).is_none());
    }

    #[test]
    fn email_rules_match_sender_exactly_and_subject_by_substring() {
        use crate::rule_store::{AgentRule, RuleType};
        let rules = vec![
            AgentRule {
                id: 1,
                gmail_account_id: "acct-1".to_string(),
                rule_type: RuleType::SkipSender,
                pattern: "noreply@acme.test".to_string(),
                is_enabled: true,
                created_at: String::new(),
            },
            AgentRule {
                id: 2,
                gmail_account_id: "acct-1".to_string(),
                rule_type: RuleType::SkipSubject,
                pattern: "newsletter".to_string(),
                is_enabled: true,
                created_at: String::new(),
            },
        ];
        let chain = email_chain(&rules);

        let by_sender = FilterItem {
            sender: "NoReply@Acme.Test".to_string(),
            subject: "Your receipt".to_string(),
            ..Default::default()
        };
        assert_eq!(
            chain.evaluate(&by_sender).as_deref(),
            Some("Skipped (rule): sender \"noreply@acme.test\"")
        );

        let by_subject = FilterItem {
            sender: "friend@example.test".to_string(),
            subject: "Weekly Newsletter #42".to_string(),
            ..Default::default()
        };
        assert_eq!(
            chain.evaluate(&by_subject).as_deref(),
            Some("Skipped (rule): subject matches \"newsletter\"")
        );

        let clean = FilterItem {
            sender: "friend@example.test".to_string(),
            subject: "Lunch?".to_string(),
            ..Default::default()
        };
        assert!(chain.evaluate(&clean).is_none());
    }
}
