//! Core data model: items, stored vectors and their metadata, filters and
//! per-request results.

use crate::error::InvalidInput;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Problem,
    Solution,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Problem => "problem",
            ItemType::Solution => "solution",
        }
    }

    /// Compact tag used by the on-disk log.
    pub(crate) fn to_tag(self) -> u8 {
        match self {
            ItemType::Problem => 1,
            ItemType::Solution => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ItemType::Problem),
            2 => Some(ItemType::Solution),
            _ => None,
        }
    }
}

impl FromStr for ItemType {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "problem" => Ok(ItemType::Problem),
            "solution" => Ok(ItemType::Solution),
            _ => Err(InvalidInput::UnknownItemType(s.to_string())),
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text item submitted for embedding. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub text: String,
    pub topic_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    pub item_type: ItemType,
}

impl Item {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        topic_id: impl Into<String>,
        item_type: ItemType,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            topic_id: topic_id.into(),
            question_id: None,
            item_type,
        }
    }

    pub fn with_question(mut self, question_id: impl Into<String>) -> Self {
        self.question_id = Some(question_id.into());
        self
    }

    /// Metadata as it will be stored next to the embedding.
    pub fn metadata(&self) -> ItemMetadata {
        ItemMetadata::new(
            self.topic_id.clone(),
            self.question_id.clone(),
            self.item_type,
        )
    }

    /// Validates identity fields. `index` is the item's position in the request.
    pub fn validate(&self, index: usize) -> Result<(), InvalidInput> {
        if self.id.trim().is_empty() {
            return Err(InvalidInput::EmptyItemId { index });
        }
        if self.topic_id.trim().is_empty() {
            return Err(InvalidInput::EmptyTopicId {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

/// Metadata stored with every vector.
///
/// An absent question id is normalised to the empty string so filters can
/// treat "unset" uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub topic_id: String,
    pub question_id: String,
    pub item_type: ItemType,
}

impl ItemMetadata {
    pub fn new(topic_id: String, question_id: Option<String>, item_type: ItemType) -> Self {
        Self {
            topic_id,
            question_id: question_id.unwrap_or_default(),
            item_type,
        }
    }

    pub fn has_question(&self) -> bool {
        !self.question_id.is_empty()
    }
}

/// Conjunctive equality filter: `topicId == x AND [questionId == y] AND itemType == z`.
///
/// This is the only filter shape callers see; it is translated to the store's
/// own predicate form at the store boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataFilter {
    topic_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    question_id: Option<String>,
    item_type: ItemType,
}

impl MetadataFilter {
    pub fn new(topic_id: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            topic_id: topic_id.into(),
            question_id: None,
            item_type,
        }
    }

    /// Restricts the filter to one question. An empty id leaves it unrestricted.
    pub fn with_question(mut self, question_id: impl Into<String>) -> Self {
        let question_id = question_id.into();
        self.question_id = (!question_id.is_empty()).then_some(question_id);
        self
    }

    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    pub fn question_id(&self) -> Option<&str> {
        self.question_id.as_deref().filter(|q| !q.is_empty())
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    pub fn validate(&self) -> Result<(), InvalidInput> {
        if self.topic_id.trim().is_empty() {
            return Err(InvalidInput::MissingFilterTopic);
        }
        Ok(())
    }

    pub fn matches(&self, metadata: &ItemMetadata) -> bool {
        metadata.topic_id == self.topic_id
            && metadata.item_type == self.item_type
            && self
                .question_id()
                .is_none_or(|question| metadata.question_id == question)
    }
}

/// A vector as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVector {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: ItemMetadata,
}

/// One ranked hit. Lower distance means more similar under the cosine metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub distance: f32,
}

/// Flat clustering label for one item. Labels are arbitrary group identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub id: String,
    pub cluster: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_type_parse() {
        assert_eq!("problem".parse::<ItemType>().unwrap(), ItemType::Problem);
        assert_eq!(" Solution ".parse::<ItemType>().unwrap(), ItemType::Solution);
        assert!(matches!(
            "idea".parse::<ItemType>(),
            Err(InvalidInput::UnknownItemType(_))
        ));
    }

    #[test]
    fn test_item_json_shape() {
        let json = r#"{"id":"p1","text":"Bus lines are slow","topicId":"t1","itemType":"problem"}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.question_id, None);
        assert_eq!(item.item_type, ItemType::Problem);
        assert_eq!(item.metadata().question_id, "");

        let with_question = item.clone().with_question("q9");
        let value = serde_json::to_value(&with_question).unwrap();
        assert_eq!(value["questionId"], "q9");
        assert_eq!(value["itemType"], "problem");
    }

    #[test]
    fn test_item_validation() {
        let item = Item::new("", "text", "t1", ItemType::Problem);
        assert_eq!(item.validate(3), Err(InvalidInput::EmptyItemId { index: 3 }));

        let item = Item::new("x", "text", " ", ItemType::Problem);
        assert!(matches!(
            item.validate(0),
            Err(InvalidInput::EmptyTopicId { .. })
        ));
    }

    #[test]
    fn test_filter_matching() {
        let in_question = ItemMetadata::new("t1".into(), Some("q1".into()), ItemType::Problem);
        let no_question = ItemMetadata::new("t1".into(), None, ItemType::Problem);
        let other_type = ItemMetadata::new("t1".into(), None, ItemType::Solution);
        let other_topic = ItemMetadata::new("t2".into(), None, ItemType::Problem);

        let topic_filter = MetadataFilter::new("t1", ItemType::Problem);
        assert!(topic_filter.matches(&in_question));
        assert!(topic_filter.matches(&no_question));
        assert!(!topic_filter.matches(&other_type));
        assert!(!topic_filter.matches(&other_topic));

        let question_filter = MetadataFilter::new("t1", ItemType::Problem).with_question("q1");
        assert!(question_filter.matches(&in_question));
        assert!(!question_filter.matches(&no_question));
    }

    #[test]
    fn test_filter_empty_question_is_unset() {
        let filter = MetadataFilter::new("t1", ItemType::Solution).with_question("");
        assert_eq!(filter.question_id(), None);

        let filter: MetadataFilter =
            serde_json::from_str(r#"{"topicId":"t1","questionId":"","itemType":"solution"}"#)
                .unwrap();
        assert_eq!(filter.question_id(), None);
    }

    #[test]
    fn test_filter_requires_topic() {
        let filter = MetadataFilter::new("", ItemType::Problem);
        assert_eq!(filter.validate(), Err(InvalidInput::MissingFilterTopic));
    }
}
