//! Topic registry
//!
//! Maps topic URIs to the sessions subscribed to them. Topics are exact-match,
//! case-sensitive strings; CURIE expansion happens before they get here.

use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;
use wamp_core::SessionId;

/// Per-publish visibility filter built from a PUBLISH's exclude/eligible lists.
///
/// An empty eligible list admits every subscriber. Exclusion always wins,
/// so the result is `subscribers ∩ eligible ∖ exclude` regardless of the
/// order the two restrictions are applied.
#[derive(Debug, Clone, Default)]
pub struct PublishFilter {
    exclude: HashSet<SessionId>,
    eligible: Option<HashSet<SessionId>>,
}

impl PublishFilter {
    /// Filter admitting every subscriber
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new<E, L>(exclude: E, eligible: L) -> Self
    where
        E: IntoIterator<Item = SessionId>,
        L: IntoIterator<Item = SessionId>,
    {
        let eligible: HashSet<SessionId> = eligible.into_iter().collect();
        Self {
            exclude: exclude.into_iter().collect(),
            eligible: if eligible.is_empty() {
                None
            } else {
                Some(eligible)
            },
        }
    }

    /// Add a session to the exclude set
    pub fn exclude(mut self, session: impl Into<SessionId>) -> Self {
        self.exclude.insert(session.into());
        self
    }

    /// Check whether a subscriber may receive the event
    pub fn admits(&self, session: &str) -> bool {
        if self.exclude.contains(session) {
            return false;
        }
        match &self.eligible {
            Some(eligible) => eligible.contains(session),
            None => true,
        }
    }
}

/// Manages all topic subscriptions
pub struct TopicRegistry {
    /// Subscribers by topic URI
    topics: DashMap<String, HashSet<SessionId>>,
    /// Topics by session, for disconnect cleanup
    by_session: DashMap<SessionId, HashSet<String>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            by_session: DashMap::new(),
        }
    }

    /// Add a subscription. Returns false if it already existed.
    pub fn subscribe(&self, topic: &str, session: &SessionId) -> bool {
        let added = self
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(session.clone());

        self.by_session
            .entry(session.clone())
            .or_default()
            .insert(topic.to_string());

        if added {
            debug!("Session {} subscribed to {}", session, topic);
        }
        added
    }

    /// Remove a subscription. Removing an absent subscription is a no-op.
    pub fn unsubscribe(&self, topic: &str, session: &SessionId) -> bool {
        let removed = self
            .topics
            .get_mut(topic)
            .map(|mut subscribers| subscribers.remove(session))
            .unwrap_or(false);

        // Empty topics are dropped; publishing to them stays a no-op
        self.topics.remove_if(topic, |_, subscribers| subscribers.is_empty());

        if let Some(mut topics) = self.by_session.get_mut(session) {
            topics.remove(topic);
        }
        self.by_session
            .remove_if(session, |_, topics| topics.is_empty());

        if removed {
            debug!("Session {} unsubscribed from {}", session, topic);
        }
        removed
    }

    /// Resolve the recipients of a publish.
    ///
    /// The subscriber set is read under the topic's shard lock, so a
    /// concurrent subscribe or unsubscribe is seen entirely or not at all.
    /// Delivery is left to the caller.
    pub fn publish(&self, topic: &str, filter: &PublishFilter) -> Vec<SessionId> {
        self.topics
            .get(topic)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .filter(|session| filter.admits(session))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove every subscription held by a session.
    /// Returns the number of topics it was removed from.
    pub fn remove_connection(&self, session: &SessionId) -> usize {
        let Some((_, topics)) = self.by_session.remove(session) else {
            return 0;
        };

        let mut removed = 0;
        for topic in &topics {
            if let Some(mut subscribers) = self.topics.get_mut(topic) {
                if subscribers.remove(session) {
                    removed += 1;
                }
            }
            self.topics.remove_if(topic, |_, subscribers| subscribers.is_empty());
        }
        removed
    }

    /// Current subscribers of a topic
    pub fn subscribers(&self, topic: &str) -> Vec<SessionId> {
        self.publish(topic, &PublishFilter::all())
    }

    /// Topics a session is subscribed to
    pub fn topics_for(&self, session: &SessionId) -> Vec<String> {
        self.by_session
            .get(session)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, topic: &str, session: &SessionId) -> bool {
        self.topics
            .get(topic)
            .map(|subscribers| subscribers.contains(session))
            .unwrap_or(false)
    }

    /// Number of topics with at least one subscriber
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Total (session, topic) pairs
    pub fn subscription_count(&self) -> usize {
        self.topics.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        s.to_string()
    }

    fn sorted(mut v: Vec<SessionId>) -> Vec<SessionId> {
        v.sort();
        v
    }

    #[test]
    fn test_subscribe_idempotent() {
        let registry = TopicRegistry::new();
        assert!(registry.subscribe("t", &sid("c1")));
        assert!(!registry.subscribe("t", &sid("c1")));
        assert_eq!(registry.subscribers("t"), vec![sid("c1")]);
        assert_eq!(registry.subscription_count(), 1);
    }

    #[test]
    fn test_topics_are_case_sensitive() {
        let registry = TopicRegistry::new();
        registry.subscribe("http://example.com/Topic", &sid("c1"));
        assert!(registry.subscribers("http://example.com/topic").is_empty());
    }

    #[test]
    fn test_unsubscribe_absent_is_noop() {
        let registry = TopicRegistry::new();
        assert!(!registry.unsubscribe("nothing", &sid("c1")));
        registry.subscribe("t", &sid("c1"));
        assert!(!registry.unsubscribe("t", &sid("c2")));
        assert_eq!(registry.subscribers("t"), vec![sid("c1")]);
    }

    #[test]
    fn test_empty_topic_dropped() {
        let registry = TopicRegistry::new();
        registry.subscribe("t", &sid("c1"));
        assert!(registry.unsubscribe("t", &sid("c1")));
        assert_eq!(registry.topic_count(), 0);
        assert!(registry.publish("t", &PublishFilter::all()).is_empty());
    }

    #[test]
    fn test_filter_combinations() {
        let registry = TopicRegistry::new();
        registry.subscribe("t", &sid("c1"));
        registry.subscribe("t", &sid("c2"));

        let all = registry.publish("t", &PublishFilter::all());
        assert_eq!(sorted(all), vec![sid("c1"), sid("c2")]);

        let excluded = registry.publish("t", &PublishFilter::new(vec![sid("c1")], vec![]));
        assert_eq!(excluded, vec![sid("c2")]);

        let eligible = registry.publish("t", &PublishFilter::new(vec![], vec![sid("c2")]));
        assert_eq!(eligible, vec![sid("c2")]);

        let both = registry.publish(
            "t",
            &PublishFilter::new(vec![sid("c1")], vec![sid("c1"), sid("c2")]),
        );
        assert_eq!(both, vec![sid("c2")]);

        let nobody = registry.publish("t", &PublishFilter::new(vec![sid("c2")], vec![sid("c2")]));
        assert!(nobody.is_empty());
    }

    #[test]
    fn test_unknown_session_in_filter_matches_nothing() {
        let registry = TopicRegistry::new();
        registry.subscribe("t", &sid("c1"));
        let recipients = registry.publish("t", &PublishFilter::new(vec![], vec![sid("ghost")]));
        assert!(recipients.is_empty());
    }

    #[test]
    fn test_remove_connection() {
        let registry = TopicRegistry::new();
        registry.subscribe("a", &sid("c1"));
        registry.subscribe("b", &sid("c1"));
        registry.subscribe("b", &sid("c2"));

        assert_eq!(registry.remove_connection(&sid("c1")), 2);
        assert_eq!(registry.remove_connection(&sid("c1")), 0);
        assert!(registry.subscribers("a").is_empty());
        assert_eq!(registry.subscribers("b"), vec![sid("c2")]);
        assert!(registry.topics_for(&sid("c1")).is_empty());
        assert_eq!(registry.topic_count(), 1);
    }
}
