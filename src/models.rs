// Licensed under the MIT License.

//! The persistent data model shared by every reconciliation stage.
//!
//! Identifiers are newtype-wrapped `i64` row ids rather than raw
//! integers, so that passing a `LocaleId` where an `EntityId` is expected
//! is a type error instead of a silent bug. None of these types carry
//! behavior of their own; they exist to be looked up in `crate::db` and
//! handed between reconciler stages as plain values, never as object
//! graphs (see the "cyclic project/resource/entity navigation" redesign
//! note).

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub i64);

        impl $name {
            pub fn raw(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                $name(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifies a `Project` row.
    ProjectId
);
id_type!(
    /// Identifies a `Repository` row.
    RepositoryId
);
id_type!(
    /// Identifies a `Locale` row.
    LocaleId
);
id_type!(
    /// Identifies a `Resource` row.
    ResourceId
);
id_type!(
    /// Identifies an `Entity` row.
    EntityId
);
id_type!(
    /// Identifies a `Translation` row.
    TranslationId
);
id_type!(
    /// Identifies a `User` row.
    UserId
);

/// The well-known account that sync-driven translation changes are
/// attributed to, a la `pontoon-sync`.
pub const SYNC_USERNAME: &str = "tmsync";

/// A project whose localization resources are kept in sync with the
/// database.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: ProjectId,
    pub slug: String,
    /// Relative path (inside the reference checkout) to an explicit
    /// path-mapping configuration file. `None` means path discovery must
    /// fall back to directory-structure inspection (§4.2).
    pub configuration_file: Option<String>,
    /// The repository-wide root used by `DiscoverPathResolver` when no
    /// `configuration_file` is present.
    pub checkout_path: String,
}

/// The kind of version control backing a `Repository`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsKind {
    Git,
}

/// A VCS-backed source of localization resources.
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: RepositoryId,
    pub project_id: ProjectId,
    pub kind: VcsKind,
    /// May contain the literal token `{locale_code}`.
    pub url: String,
    pub branch: String,
    pub checkout_path: String,
    /// Flags this as the repository holding source-language files.
    pub source_repo: bool,
    /// Mapping from locale code (or the sentinel `"single_locale"`) to
    /// the revision last synced for that checkout.
    pub last_synced_revisions: Option<HashMap<String, String>>,
}

pub const SINGLE_LOCALE_SENTINEL: &str = "single_locale";

/// An enabled target language for a project.
#[derive(Debug, Clone)]
pub struct Locale {
    pub id: LocaleId,
    pub project_id: ProjectId,
    pub code: String,
}

/// The resource format, derived from a path's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceFormat {
    Po,
    Xliff,
    AndroidXml,
    Ftl,
    Properties,
    Other,
}

impl ResourceFormat {
    /// Derive a format from a (already `.pot`-normalized) resource path.
    pub fn from_path(path: &str) -> Self {
        match path.rsplit('.').next().unwrap_or("") {
            "po" => ResourceFormat::Po,
            "xliff" | "xlf" => ResourceFormat::Xliff,
            "xml" => ResourceFormat::AndroidXml,
            "ftl" => ResourceFormat::Ftl,
            "properties" => ResourceFormat::Properties,
            _ => ResourceFormat::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceFormat::Po => "po",
            ResourceFormat::Xliff => "xliff",
            ResourceFormat::AndroidXml => "xml",
            ResourceFormat::Ftl => "ftl",
            ResourceFormat::Properties => "properties",
            ResourceFormat::Other => "other",
        }
    }

    /// The bilingual format set of §6: formats whose target file carries
    /// both the source string and the translation.
    pub fn is_bilingual(self) -> bool {
        matches!(self, ResourceFormat::Po | ResourceFormat::Xliff)
    }
}

/// A single localization resource file, tracked relative to the
/// reference checkout root, `.pot` suffixes always rewritten to `.po`.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: ResourceId,
    pub project_id: ProjectId,
    pub path: String,
    pub format: ResourceFormat,
    pub total_strings: i64,
    /// Project-wide lexicographic rank by `path`.
    pub order: i64,
}

/// A source string (and its metadata) belonging to a `Resource`.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub resource_id: ResourceId,
    pub string: String,
    pub string_plural: Option<String>,
    pub key: String,
    pub comment: String,
    pub source: String,
    pub group_comment: String,
    pub resource_comment: String,
    pub context: String,
    /// Position within the resource.
    pub order: i64,
    pub obsolete: bool,
    pub date_obsoleted: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
}

impl Entity {
    /// Logical identity within a resource: the explicit key, or the
    /// source string when no key exists.
    pub fn identity_key(&self) -> &str {
        if self.key.is_empty() {
            &self.string
        } else {
            &self.key
        }
    }

    /// Whether two entities carry the same translatable content, per the
    /// field list in §4.3.
    pub fn same_content(&self, other: &Entity) -> bool {
        self.string == other.string
            && self.string_plural == other.string_plural
            && self.comment == other.comment
            && self.source == other.source
            && self.group_comment == other.group_comment
            && self.resource_comment == other.resource_comment
            && self.context == other.context
    }
}

/// A translation of one `Entity` into one `Locale`, for one plural form.
#[derive(Debug, Clone)]
pub struct Translation {
    pub id: TranslationId,
    pub entity_id: EntityId,
    pub locale_id: LocaleId,
    pub string: String,
    pub plural_form: Option<i64>,
    pub active: bool,
    pub approved: bool,
    pub approved_user: Option<UserId>,
    pub approved_date: Option<DateTime<Utc>>,
    pub unapproved_user: Option<UserId>,
    pub unapproved_date: Option<DateTime<Utc>>,
    pub pretranslated: bool,
    pub fuzzy: bool,
    pub rejected: bool,
    pub rejected_user: Option<UserId>,
    pub rejected_date: Option<DateTime<Utc>>,
    pub unrejected_user: Option<UserId>,
    pub unrejected_date: Option<DateTime<Utc>>,
    pub date: DateTime<Utc>,
}

/// Marks `(resource, locale)` as a pairing that the locale is expected to
/// translate.
#[derive(Debug, Clone)]
pub struct TranslatedResource {
    pub id: i64,
    pub resource_id: ResourceId,
    pub locale_id: LocaleId,
    pub total_strings: i64,
}

/// An audit row: a recent user-side change to `(entity, locale)` not yet
/// reflected in the repository. Used as a conflict signal by the
/// translation reconciler's database-wins rule.
#[derive(Debug, Clone)]
pub struct ChangedEntityLocale {
    pub id: i64,
    pub entity_id: EntityId,
    pub locale_id: LocaleId,
}

/// The kind of action recorded in the append-only `ActionLog`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    TranslationCreated,
    TranslationApproved,
    TranslationUnrejected,
    TranslationRejected,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::TranslationCreated => "translation_created",
            ActionType::TranslationApproved => "translation_approved",
            ActionType::TranslationUnrejected => "translation_unrejected",
            ActionType::TranslationRejected => "translation_rejected",
        }
    }
}

/// An append-only audit row describing a change made to a `Translation`.
#[derive(Debug, Clone)]
pub struct ActionLogEntry {
    pub action_type: ActionType,
    pub performed_by: UserId,
    pub translation_id: TranslationId,
    pub created_at: DateTime<Utc>,
}

/// A user account. Sync-driven changes are attributed to the well-known
/// [`SYNC_USERNAME`] account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
}
