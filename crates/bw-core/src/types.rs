use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use bw_durable::Identity;
use bw_events::{ChatHook, RepoHook, Subject};

/// Chat destination for a repository's notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Messaging {
    pub id: Uuid,
    pub hook: ChatHook,
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Org {
    pub id: Uuid,
    pub name: String,
}

/// A repository as the engine sees it. Immutable for one incarnation of the
/// processes that carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullRepo {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub hook: RepoHook,
    /// Provider-side id of the repository.
    pub hook_id: i64,
    pub default_branch: String,
    #[serde(default)]
    pub is_monorepo: bool,
    /// Changed lines above which a push is flagged.
    pub threshold: i32,
    #[serde(default)]
    pub stale_duration: Duration,
    pub url: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub messaging: Option<Messaging>,
    #[serde(default)]
    pub org: Option<Org>,
}

fn default_active() -> bool {
    true
}

impl FullRepo {
    /// Org segment of the identity: the org name when known, its id otherwise.
    pub fn org_name(&self) -> String {
        self.org
            .as_ref()
            .map_or_else(|| self.org_id.to_string(), |org| org.name.clone())
    }

    pub fn identity(&self, prefix: &str) -> Identity {
        Identity::repo(prefix, &self.org_name(), &self.name, self.id)
    }

    pub fn subject(&self) -> Subject {
        Subject::repo(self.id, self.org_id)
    }

    /// Chat provider notifications for this repository go to.
    pub fn chat_hook(&self) -> ChatHook {
        self.messaging
            .as_ref()
            .map_or(ChatHook::Unspecified, |messaging| messaging.hook)
    }
}
