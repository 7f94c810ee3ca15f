//! Native predicate form used inside the store.
//!
//! Callers only ever hand the store a `MetadataFilter`; it is lowered here
//! into a flat conjunction of field equalities.

use crate::types::{ItemMetadata, MetadataFilter};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    TopicId,
    QuestionId,
    ItemType,
}

impl Field {
    pub fn key(&self) -> &'static str {
        match self {
            Field::TopicId => "topicId",
            Field::QuestionId => "questionId",
            Field::ItemType => "itemType",
        }
    }

    fn value_of<'a>(&self, metadata: &'a ItemMetadata) -> &'a str {
        match self {
            Field::TopicId => &metadata.topic_id,
            Field::QuestionId => &metadata.question_id,
            Field::ItemType => metadata.item_type.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub field: Field,
    pub value: String,
}

/// Conjunction of equality clauses. An empty predicate matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn matches(&self, metadata: &ItemMetadata) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause.field.value_of(metadata) == clause.value)
    }

    fn push(&mut self, field: Field, value: impl Into<String>) {
        self.clauses.push(Clause {
            field,
            value: value.into(),
        });
    }
}

impl From<&MetadataFilter> for Predicate {
    fn from(filter: &MetadataFilter) -> Self {
        let mut predicate = Predicate::default();
        predicate.push(Field::TopicId, filter.topic_id());
        if let Some(question) = filter.question_id() {
            predicate.push(Field::QuestionId, question);
        }
        predicate.push(Field::ItemType, filter.item_type().as_str());
        predicate
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{} = {:?}", clause.field.key(), clause.value)?;
        }
        Ok(())
    }
}
