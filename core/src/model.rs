use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub type DocId = i64;

/// Membership oracle for "is this document wanted".
pub type IdSet = HashSet<DocId>;

/// Net vote score per post. Missing entries mean zero.
pub type VoteTotals = HashMap<DocId, i64>;

/// Entity kinds present in a dump. Each maps to one dump file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Post,
    Comment,
    User,
    PostLink,
    Vote,
}

impl Kind {
    pub const INDEXED: [Kind; 4] = [Kind::Post, Kind::Comment, Kind::PostLink, Kind::User];

    pub fn name(self) -> &'static str {
        match self {
            Kind::Post => "post",
            Kind::Comment => "comment",
            Kind::User => "user",
            Kind::PostLink => "postlink",
            Kind::Vote => "vote",
        }
    }

    /// File stem of the dump file, e.g. `Posts` for `Posts.xml`.
    pub fn dump_stem(self) -> &'static str {
        match self {
            Kind::Post => "Posts",
            Kind::Comment => "Comments",
            Kind::User => "Users",
            Kind::PostLink => "PostLinks",
            Kind::Vote => "Votes",
        }
    }

    /// `<prefix><kind>`. Votes are aggregated onto posts and never get an index.
    pub fn index_name(self, prefix: &str) -> Result<String> {
        match self {
            Kind::Vote => Err(Error::UnsupportedKind(self.name().to_string())),
            _ => Ok(format!("{prefix}{}", self.name())),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "post" => Ok(Kind::Post),
            "comment" => Ok(Kind::Comment),
            "user" => Ok(Kind::User),
            "postlink" => Ok(Kind::PostLink),
            "vote" => Ok(Kind::Vote),
            _ => Err(Error::UnsupportedKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostType {
    Question,
    Answer,
    Other(i64),
}

impl From<i64> for PostType {
    fn from(v: i64) -> Self {
        match v {
            1 => PostType::Question,
            2 => PostType::Answer,
            other => PostType::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteType {
    UpMod,
    DownMod,
    Other(i64),
}

impl From<i64> for VoteType {
    fn from(v: i64) -> Self {
        match v {
            2 => VoteType::UpMod,
            3 => VoteType::DownMod,
            other => VoteType::Other(other),
        }
    }
}

impl VoteType {
    /// Contribution of a single vote to the net score.
    pub fn delta(self) -> i64 {
        match self {
            VoteType::UpMod => 1,
            VoteType::DownMod => -1,
            VoteType::Other(_) => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Post {
    #[serde(deserialize_with = "lenient::id")]
    pub id: DocId,
    #[serde(default, deserialize_with = "lenient::opt_id", skip_serializing_if = "Option::is_none")]
    pub post_type_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<DocId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_id", skip_serializing_if = "Option::is_none")]
    pub view_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_id", skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<DocId>,
    /// Remaining dump columns, carried through to the sink untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Post {
    pub fn post_type(&self) -> PostType {
        PostType::from(self.post_type_id.unwrap_or_default())
    }

    pub fn is_question(&self) -> bool {
        self.post_type() == PostType::Question
    }

    pub fn is_answer(&self) -> bool {
        self.post_type() == PostType::Answer
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Comment {
    #[serde(default, deserialize_with = "lenient::opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<DocId>,
    #[serde(deserialize_with = "lenient::id")]
    pub post_id: DocId,
    #[serde(default, deserialize_with = "lenient::opt_id", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<DocId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    #[serde(deserialize_with = "lenient::id")]
    pub id: DocId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PostLink {
    #[serde(default, deserialize_with = "lenient::opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<DocId>,
    #[serde(deserialize_with = "lenient::id")]
    pub post_id: DocId,
    #[serde(deserialize_with = "lenient::id")]
    pub related_post_id: DocId,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vote {
    #[serde(default, deserialize_with = "lenient::opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<DocId>,
    #[serde(deserialize_with = "lenient::id")]
    pub post_id: DocId,
    #[serde(default, deserialize_with = "lenient::opt_id", skip_serializing_if = "Option::is_none")]
    pub vote_type_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Vote {
    pub fn vote_type(&self) -> VoteType {
        VoteType::from(self.vote_type_id.unwrap_or_default())
    }
}

/// A single parsed dump row.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Post(Post),
    Comment(Comment),
    User(User),
    PostLink(PostLink),
    Vote(Vote),
}

impl Record {
    /// Build a typed record from the columns of one dump row.
    pub fn from_fields(kind: Kind, fields: Map<String, Value>) -> Result<Self> {
        let value = Value::Object(fields);
        let record = match kind {
            Kind::Post => Record::Post(serde_json::from_value(value)?),
            Kind::Comment => Record::Comment(serde_json::from_value(value)?),
            Kind::User => Record::User(serde_json::from_value(value)?),
            Kind::PostLink => Record::PostLink(serde_json::from_value(value)?),
            Kind::Vote => Record::Vote(serde_json::from_value(value)?),
        };
        Ok(record)
    }

    pub fn kind(&self) -> Kind {
        match self {
            Record::Post(_) => Kind::Post,
            Record::Comment(_) => Kind::Comment,
            Record::User(_) => Kind::User,
            Record::PostLink(_) => Kind::PostLink,
            Record::Vote(_) => Kind::Vote,
        }
    }

    /// The document id used as the sink key, when the record has one.
    pub fn doc_id(&self) -> Option<DocId> {
        match self {
            Record::Post(p) => Some(p.id),
            Record::Comment(c) => c.id,
            Record::User(u) => Some(u.id),
            Record::PostLink(l) => l.id,
            Record::Vote(v) => v.id,
        }
    }

    pub fn to_document(&self) -> Result<Value> {
        let doc = match self {
            Record::Post(p) => serde_json::to_value(p)?,
            Record::Comment(c) => serde_json::to_value(c)?,
            Record::User(u) => serde_json::to_value(u)?,
            Record::PostLink(l) => serde_json::to_value(l)?,
            Record::Vote(v) => serde_json::to_value(v)?,
        };
        Ok(doc)
    }
}

/// Integer columns arrive as numbers from JSON dumps and as strings from XML attributes.
mod lenient {
    use serde::de::{self, Deserializer, Visitor};
    use std::fmt;

    struct IntVisitor;

    impl<'de> Visitor<'de> for IntVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an integer or a numeric string")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::custom(format!("integer {v} out of range")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            v.trim()
                .parse()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    struct OptIntVisitor;

    impl<'de> Visitor<'de> for OptIntVisitor {
        type Value = Option<i64>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an optional integer or numeric string")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(IntVisitor).map(Some)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            IntVisitor.visit_i64(v).map(Some)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            IntVisitor.visit_u64(v).map(Some)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            if v.trim().is_empty() {
                return Ok(None);
            }
            IntVisitor.visit_str(v).map(Some)
        }
    }

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        d.deserialize_any(IntVisitor)
    }

    pub fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        d.deserialize_any(OptIntVisitor)
    }
}
