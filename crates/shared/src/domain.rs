use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(GroupId);
id_newtype!(SiteId);

/// Who the client is acting as. Guests see public content only and have no
/// mutation rights; an editor sees everything and may reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    ReadOnly,
    Edit,
}

impl ViewMode {
    pub fn is_editor(self) -> bool {
        matches!(self, ViewMode::Edit)
    }
}

/// A named, orderable collection of sites. `order_num` is the dense 0-based
/// rank among sibling groups as last persisted by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub order_num: i64,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single bookmark. `group_id` is a non-owning back-reference; reordering
/// never moves a site across groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub group_id: GroupId,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notes: String,
    pub order_num: i64,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical fetch unit: one group with its sites in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupWithSites {
    #[serde(flatten)]
    pub group: Group,
    pub sites: Vec<Site>,
}
