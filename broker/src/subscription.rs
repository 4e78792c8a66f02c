// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::collections::HashMap;
use std::collections::HashSet;

use mqtt_codec::SubTopic;

use crate::client::ClientId;

/// One node of the subscription trie. The root matches the empty
/// topic prefix; each edge is one "/"-delimited topic level,
/// including the literal strings "+" and "#" for wildcard levels.
/// Each subscriber is paired with the filter it subscribed with, so
/// `matching` can hand the final match decision to
/// `SubTopic::is_match` instead of trusting its own descent.
#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, Node>,
    subscribers: Vec<(ClientId, SubTopic)>,
}

/// Trie-based subscription index. Non-owning: it only ever stores
/// `ClientId`, resolved back through the broker's client table under
/// its own lock.
///
/// A node with empty children and empty subscribers may remain after
/// the last subscriber leaves it -- pruning is not required for
/// correctness (I4 only demands O(subscribers) removal).
#[derive(Debug, Default)]
pub struct SubscriptionTree {
    root: Node,
}

impl SubscriptionTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `client` as a subscriber of `filter`. Duplicate
    /// subscriptions of the same client to the same filter are not
    /// deduplicated, matching the tree's documented behavior --
    /// `unsubscribe` removes the first match.
    pub fn subscribe(&mut self, filter: SubTopic, client: ClientId) {
        let mut node = &mut self.root;
        for level in filter.as_str().split('/') {
            node = node.children.entry(level.to_string()).or_default();
        }
        node.subscribers.push((client, filter));
    }

    /// Removes the first subscription of `client` to exactly `filter`.
    /// Returns whether a subscription was found and removed.
    pub fn unsubscribe(&mut self, filter: &str, client: ClientId) -> bool {
        let Some(node) = Self::find_mut(&mut self.root, filter) else {
            return false;
        };
        if let Some(index) = node.subscribers.iter().position(|(c, _)| *c == client) {
            node.subscribers.remove(index);
            true
        } else {
            false
        }
    }

    fn find_mut<'a>(mut node: &'a mut Node, filter: &str) -> Option<&'a mut Node> {
        for level in filter.split('/') {
            node = node.children.get_mut(level)?;
        }
        Some(node)
    }

    /// Removes every subscription belonging to `client`, wherever it
    /// appears in the tree. Called from connection teardown so no
    /// dangling references survive a closed connection.
    pub fn remove_client(&mut self, client: ClientId) {
        Self::remove_client_from(&mut self.root, client);
    }

    fn remove_client_from(node: &mut Node, client: ClientId) {
        node.subscribers.retain(|(c, _)| *c != client);
        for child in node.children.values_mut() {
            Self::remove_client_from(child, client);
        }
    }

    /// Returns every client whose filter matches `topic`. The trie
    /// descent (literal / "+" / "#" children) narrows down which
    /// leaves are even candidates; `SubTopic::is_match` is the sole
    /// authority on whether a candidate found there actually matches,
    /// so the tree and the codec crate never carry two independent
    /// notions of wildcard semantics.
    pub fn matching(&self, topic: &str) -> HashSet<ClientId> {
        let levels: Vec<&str> = topic.split('/').collect();
        let mut matched = HashSet::new();
        Self::collect(&self.root, &levels, topic, &mut matched);
        matched
    }

    fn collect(node: &Node, levels: &[&str], topic: &str, matched: &mut HashSet<ClientId>) {
        if let Some(hash_node) = node.children.get("#") {
            Self::extend_matching(hash_node, topic, matched);
        }
        match levels.split_first() {
            None => Self::extend_matching(node, topic, matched),
            Some((head, rest)) => {
                if let Some(child) = node.children.get(*head) {
                    Self::collect(child, rest, topic, matched);
                }
                if let Some(plus_node) = node.children.get("+") {
                    Self::collect(plus_node, rest, topic, matched);
                }
            }
        }
    }

    fn extend_matching(node: &Node, topic: &str, matched: &mut HashSet<ClientId>) {
        matched.extend(
            node.subscribers
                .iter()
                .filter(|(_, filter)| filter.is_match(topic))
                .map(|(client, _)| *client),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(s: &str) -> SubTopic {
        SubTopic::new(s).unwrap()
    }

    #[test]
    fn literal_subscription_matches_only_its_own_topic() {
        let mut tree = SubscriptionTree::new();
        let c = ClientId::new(1);
        tree.subscribe(topic("a/b"), c);
        assert!(tree.matching("a/b").contains(&c));
        assert!(!tree.matching("a/c").contains(&c));
    }

    #[test]
    fn single_level_wildcard_matches_any_one_level() {
        let mut tree = SubscriptionTree::new();
        let c = ClientId::new(1);
        tree.subscribe(topic("a/+/c"), c);
        assert!(tree.matching("a/b/c").contains(&c));
        assert!(!tree.matching("a/b/d").contains(&c));
        assert!(!tree.matching("a/b/c/d").contains(&c));
    }

    #[test]
    fn multi_level_wildcard_matches_everything_below() {
        let mut tree = SubscriptionTree::new();
        let c = ClientId::new(1);
        tree.subscribe(topic("sport/tennis/player/#"), c);
        assert!(tree.matching("sport/tennis/player/ranking").contains(&c));
        assert!(tree.matching("sport/tennis/player/ranking/europe").contains(&c));
        assert!(!tree.matching("sport/tennis").contains(&c));
    }

    #[test]
    fn unsubscribe_removes_only_the_matching_client() {
        let mut tree = SubscriptionTree::new();
        let c1 = ClientId::new(1);
        let c2 = ClientId::new(2);
        tree.subscribe(topic("a/b"), c1);
        tree.subscribe(topic("a/b"), c2);
        assert!(tree.unsubscribe("a/b", c1));
        assert!(!tree.matching("a/b").contains(&c1));
        assert!(tree.matching("a/b").contains(&c2));
    }

    #[test]
    fn client_teardown_removes_every_subscription() {
        let mut tree = SubscriptionTree::new();
        let c = ClientId::new(1);
        tree.subscribe(topic("a/b"), c);
        tree.subscribe(topic("x/y/#"), c);
        tree.remove_client(c);
        assert!(!tree.matching("a/b").contains(&c));
        assert!(!tree.matching("x/y/z").contains(&c));
    }
}
