//! Topic List
//!
//! The ordered, read-only list of debate topics and the policy applied when
//! rotation runs past the last entry.

use serde::{Deserialize, Serialize};

/// What happens when rotation advances past the last topic
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicExhaustion {
    /// Start again from the first topic
    #[default]
    Wrap,
    /// Keep the last topic and end the debate
    EndDebate,
}

/// Where a rotation lands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    /// Move to this index
    To(usize),
    /// No topic left; the debate must end
    Exhausted,
}

/// Non-empty ordered list of topics
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicList {
    topics: Vec<String>,
}

impl TopicList {
    /// Build a list; `None` when `topics` is empty
    #[must_use]
    pub fn new(topics: Vec<String>) -> Option<Self> {
        if topics.is_empty() {
            None
        } else {
            Some(Self { topics })
        }
    }

    /// Topic at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.topics.get(index).map(String::as_str)
    }

    /// Number of topics
    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether the list is empty; never true once constructed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Index following `index` under `policy`
    #[must_use]
    pub fn rotate(&self, index: usize, policy: TopicExhaustion) -> Rotation {
        let next = index + 1;
        if next < self.topics.len() {
            return Rotation::To(next);
        }
        match policy {
            TopicExhaustion::Wrap => Rotation::To(0),
            TopicExhaustion::EndDebate => Rotation::Exhausted,
        }
    }
}

impl Default for TopicList {
    fn default() -> Self {
        Self {
            topics: default_topics(),
        }
    }
}

/// Built-in topics used when none are configured
#[must_use]
pub fn default_topics() -> Vec<String> {
    [
        "Should a universal basic income replace existing welfare programs?",
        "Is nuclear power necessary to reach net-zero emissions?",
        "Should social media platforms be liable for the content they host?",
        "Should cities ban private cars from their centres?",
        "Is remote work better for society than office work?",
        "Should artificial intelligence be allowed to make hiring decisions?",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three() -> TopicList {
        TopicList::new(vec!["a".into(), "b".into(), "c".into()]).unwrap()
    }

    #[test]
    fn test_empty_list_rejected() {
        assert!(TopicList::new(Vec::new()).is_none());
    }

    #[test]
    fn test_rotate_within_bounds() {
        assert_eq!(three().rotate(0, TopicExhaustion::EndDebate), Rotation::To(1));
        assert_eq!(three().rotate(1, TopicExhaustion::Wrap), Rotation::To(2));
    }

    #[test]
    fn test_rotate_past_end() {
        assert_eq!(three().rotate(2, TopicExhaustion::Wrap), Rotation::To(0));
        assert_eq!(
            three().rotate(2, TopicExhaustion::EndDebate),
            Rotation::Exhausted
        );
    }

    #[test]
    fn test_policy_serde() {
        let policy: TopicExhaustion = serde_json::from_str(r#""end_debate""#).unwrap();
        assert_eq!(policy, TopicExhaustion::EndDebate);
        assert_eq!(TopicExhaustion::default(), TopicExhaustion::Wrap);
    }
}
