use crate::ids::EventId;
use crate::payloads::{AnyPayload, Payload, PayloadKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const EVENT_VERSION: &str = "0.1.0";

/// Subject name used for events that concern a repository.
pub const SUBJECT_NAME_REPOS: &str = "repos";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoHook {
    #[default]
    Unspecified,
    Github,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatHook {
    #[default]
    Unspecified,
    Slack,
}

/// Provider an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "provider", rename_all = "snake_case")]
pub enum Hook {
    Repo(RepoHook),
    Chat(ChatHook),
}

impl From<RepoHook> for Hook {
    fn from(value: RepoHook) -> Self {
        Self::Repo(value)
    }
}

impl From<ChatHook> for Hook {
    fn from(value: ChatHook) -> Self {
        Self::Chat(value)
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repo(RepoHook::Unspecified) => f.write_str("repo:unspecified"),
            Self::Repo(RepoHook::Github) => f.write_str("repo:github"),
            Self::Chat(ChatHook::Unspecified) => f.write_str("chat:unspecified"),
            Self::Chat(ChatHook::Slack) => f.write_str("chat:slack"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! str_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant { kind: $kind, value: s.to_string() }),
                }
            }
        }
    };
}

str_enum!(Scope, "scope", {
    Branch => "branch",
    Tag => "tag",
    Push => "push",
    Rebase => "rebase",
    Diff => "diff",
    Pr => "pr",
    PrLabel => "pr_label",
    LinesExceed => "lines_exceed",
    MergeConflict => "merge_conflict",
});

str_enum!(Action, "action", {
    Created => "created",
    Updated => "updated",
    Deleted => "deleted",
    Forced => "forced",
    Reopened => "reopened",
    Closed => "closed",
    Started => "started",
    Completed => "completed",
    Dismissed => "dismissed",
    Failure => "failure",
    Added => "added",
    Removed => "removed",
    Requested => "requested",
    Merged => "merged",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub id: Uuid,
    pub org_id: Uuid,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

impl Subject {
    pub fn repo(id: Uuid, org_id: Uuid) -> Self {
        Self {
            name: SUBJECT_NAME_REPOS.to_string(),
            id,
            org_id,
            team_id: None,
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    #[serde(default)]
    pub parent_id: Option<EventId>,
    pub hook: Hook,
    pub scope: Scope,
    pub action: Action,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// Versioned envelope around one payload of the closed payload set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Payload"))]
pub struct Event<P: Payload> {
    pub version: String,
    pub id: EventId,
    pub context: EventContext,
    pub subject: Subject,
    pub payload: P,
}

impl<P: Payload> Event<P> {
    pub fn new(
        hook: impl Into<Hook>,
        subject: Subject,
        scope: Scope,
        action: Action,
        payload: P,
    ) -> Self {
        Self {
            version: EVENT_VERSION.to_string(),
            id: EventId::generate(),
            context: EventContext {
                parent_id: None,
                hook: hook.into(),
                scope,
                action,
                source: String::new(),
                timestamp: Utc::now(),
            },
            subject,
            payload,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.context.source = source.into();
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: &EventId) -> Self {
        self.set_parent(parent);
        self
    }

    pub fn set_parent(&mut self, parent: &EventId) {
        self.context.parent_id = Some(parent.clone());
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.subject.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_team(mut self, team_id: Uuid) -> Self {
        self.subject.team_id = Some(team_id);
        self
    }

    /// Derives a child event sharing this event's subject and source. The
    /// child is minted after `self`, so its id sorts strictly later.
    pub fn next<Q: Payload>(&self, scope: Scope, action: Action, payload: Q) -> Event<Q> {
        Event {
            version: EVENT_VERSION.to_string(),
            id: EventId::generate(),
            context: EventContext {
                parent_id: Some(self.id.clone()),
                hook: self.context.hook,
                scope,
                action,
                source: self.context.source.clone(),
                timestamp: Utc::now(),
            },
            subject: self.subject.clone(),
            payload,
        }
    }

    /// Same as [`Event::next`] but re-targets the hook, e.g. a repo push
    /// producing a chat notification.
    pub fn next_on<Q: Payload>(
        &self,
        hook: impl Into<Hook>,
        scope: Scope,
        action: Action,
        payload: Q,
    ) -> Event<Q> {
        let mut child = self.next(scope, action, payload);
        child.context.hook = hook.into();
        child
    }

    pub fn payload_kind(&self) -> PayloadKind {
        self.payload.kind()
    }

    pub fn flatten(&self) -> Flat {
        Flat {
            version: self.version.clone(),
            id: self.id.clone(),
            parent_id: self.context.parent_id.clone(),
            hook: self.context.hook,
            scope: self.context.scope,
            action: self.context.action,
            source: self.context.source.clone(),
            timestamp: self.context.timestamp,
            subject_name: self.subject.name.clone(),
            subject_id: self.subject.id,
            org_id: self.subject.org_id,
            team_id: self.subject.team_id,
            user_id: self.subject.user_id,
            payload_kind: self.payload.kind(),
        }
    }

    pub fn erase(self) -> Event<AnyPayload> {
        Event {
            version: self.version,
            id: self.id,
            context: self.context,
            subject: self.subject,
            payload: self.payload.into_any(),
        }
    }
}

impl Event<AnyPayload> {
    /// Recovers the typed event when the payload is of kind `Q`.
    pub fn downcast<Q: Payload>(self) -> Option<Event<Q>> {
        let payload = Q::from_any(self.payload)?;
        Some(Event {
            version: self.version,
            id: self.id,
            context: self.context,
            subject: self.subject,
            payload,
        })
    }
}

/// Payload-free projection of an event; the form handed to metrics stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flat {
    pub version: String,
    pub id: EventId,
    pub parent_id: Option<EventId>,
    pub hook: Hook,
    pub scope: Scope,
    pub action: Action,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub subject_name: String,
    pub subject_id: Uuid,
    pub org_id: Uuid,
    pub team_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub payload_kind: PayloadKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::{LinesExceed, Push, Rebase};

    fn push() -> Push {
        Push {
            git_ref: "refs/heads/feature".to_string(),
            before: "0000".to_string(),
            after: "abcd".to_string(),
            repository: "acme/widgets".to_string(),
            sender_id: None,
            commits: vec![],
            timestamp: Utc::now(),
        }
    }

    fn subject() -> Subject {
        Subject::repo(Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn new_event_has_no_parent_and_current_version() {
        let event = Event::new(RepoHook::Github, subject(), Scope::Push, Action::Created, push());
        assert_eq!(event.version, EVENT_VERSION);
        assert!(event.context.parent_id.is_none());
        assert_eq!(event.context.hook, Hook::Repo(RepoHook::Github));
        assert_eq!(event.subject.name, SUBJECT_NAME_REPOS);
    }

    #[test]
    fn next_links_parent_and_sorts_after_it() {
        let parent = Event::new(RepoHook::Github, subject(), Scope::Push, Action::Created, push());
        let child = parent.next(
            Scope::Rebase,
            Action::Requested,
            Rebase {
                base: "main".to_string(),
                head: "abcd".to_string(),
                repository: "acme/widgets".to_string(),
            },
        );
        assert_eq!(child.context.parent_id.as_ref(), Some(&parent.id));
        assert!(child.id > parent.id);
        assert_eq!(child.subject, parent.subject);
        assert_eq!(child.context.hook, parent.context.hook);
    }

    #[test]
    fn next_on_switches_hook() {
        let parent = Event::new(RepoHook::Github, subject(), Scope::Push, Action::Created, push());
        let child = parent.next_on(
            ChatHook::Slack,
            Scope::LinesExceed,
            Action::Created,
            LinesExceed {
                branch: "feature".to_string(),
                lines: crate::payloads::DiffLines {
                    added: 10,
                    removed: 2,
                },
                threshold: 5,
            },
        );
        assert_eq!(child.context.hook, Hook::Chat(ChatHook::Slack));
        assert_eq!(child.context.parent_id, Some(parent.id));
    }

    #[test]
    fn flatten_drops_payload_and_keeps_identity() {
        let parent = Event::new(RepoHook::Github, subject(), Scope::Push, Action::Created, push());
        let event = parent.next(Scope::Push, Action::Updated, push()).with_source("webhook");
        let flat = event.flatten();
        assert_eq!(flat.id, event.id);
        assert_eq!(flat.parent_id, Some(parent.id));
        assert_eq!(flat.scope, Scope::Push);
        assert_eq!(flat.action, Action::Updated);
        assert_eq!(flat.source, "webhook");
        assert_eq!(flat.payload_kind, PayloadKind::Push);
        let json = serde_json::to_value(&flat).unwrap();
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn erase_and_downcast() {
        let event = Event::new(RepoHook::Github, subject(), Scope::Push, Action::Created, push());
        let id = event.id.clone();
        let erased = event.erase();
        assert_eq!(erased.payload_kind(), PayloadKind::Push);
        assert!(erased.clone().downcast::<Rebase>().is_none());
        let typed = erased.downcast::<Push>().unwrap();
        assert_eq!(typed.id, id);
    }

    #[test]
    fn scope_and_action_parse() {
        assert_eq!("pr_label".parse::<Scope>().unwrap(), Scope::PrLabel);
        assert_eq!(Action::Requested.as_str(), "requested");
        assert!("bogus".parse::<Action>().is_err());
        assert_eq!(
            serde_json::to_string(&Scope::MergeConflict).unwrap(),
            "\"merge_conflict\""
        );
    }

    #[test]
    fn unknown_variant_names_kind_and_value() {
        let err = "bogus".parse::<Scope>().unwrap_err();
        assert_eq!(err.kind, "scope");
        assert_eq!(err.to_string(), "unknown scope: bogus");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }
}
