//! Wire types for the bingo HTTP API and push channel.
//!
//! Every type in this module produces JSON identical to what the server
//! emits and accepts. Timestamps stay `String` (RFC 3339) since the client
//! never does date arithmetic on them.

use serde::{Deserialize, Serialize};

/// Side length of a bingo card grid.
pub const GRID_SIZE: usize = 5;

/// Minimum number of items a theme needs to fill a card.
pub const MIN_THEME_ITEMS: usize = GRID_SIZE * GRID_SIZE;

// ── Entities ────────────────────────────────────────────────────────

/// The authenticated player, as returned by `GET /api/user`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub discord_id: String,
    pub username: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub created_at: String,
}

/// A 5x5 bingo card with its per-player mark grid.
///
/// `items` and `marked_items` are row-major; the center cell is the
/// server-chosen free space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub theme_id: String,
    pub items: Vec<Vec<String>>,
    pub marked_items: Vec<Vec<bool>>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub is_winner: bool,
}

impl Card {
    /// Returns the item text at `(row, col)`, or `None` when the coordinates
    /// fall outside the grid the server sent.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.items.get(row).and_then(|r| r.get(col)).map(String::as_str)
    }

    /// Returns whether the cell at `(row, col)` is marked. Out-of-grid
    /// coordinates read as unmarked.
    pub fn is_marked(&self, row: usize, col: usize) -> bool {
        self.marked_items
            .get(row)
            .and_then(|r| r.get(col))
            .copied()
            .unwrap_or(false)
    }
}

/// A theme: the pool of items cards are generated from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Theme {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub created_at: String,
}

/// Catalog response from `GET /api/themes`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ThemeCatalog {
    #[serde(default)]
    pub themes: Vec<Theme>,
    /// Empty string means no active theme.
    #[serde(default)]
    pub active_theme_id: String,
}

impl ThemeCatalog {
    /// The active theme id, with the server's empty-string sentinel mapped
    /// to `None`.
    pub fn active_theme_id(&self) -> Option<&str> {
        if self.active_theme_id.is_empty() {
            None
        } else {
            Some(&self.active_theme_id)
        }
    }
}

/// Response from `GET /api/admin/check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCheck {
    pub is_admin: bool,
}

// ── Request bodies ──────────────────────────────────────────────────

/// Body for `POST /api/bingo/mark`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkCellRequest {
    pub card_id: String,
    pub row: usize,
    pub col: usize,
}

/// Body for theme create (`POST /api/admin/themes`) and update
/// (`PUT /api/admin/themes/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub items: Vec<String>,
}

/// Body for `POST /api/admin/themes/active`. An empty `theme_id` clears the
/// active theme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetActiveThemeRequest {
    pub theme_id: String,
}

/// Body for `POST /api/admin/themes/{id}/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetThemeCompleteRequest {
    pub is_complete: bool,
}

// ── Push channel ────────────────────────────────────────────────────

/// The event kinds the push channel understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEventKind {
    /// Full snapshot of the global mark set, sent on every (re)connect.
    InitialState,
    /// Some player marked an item.
    ItemMarked,
    /// Some player unmarked an item.
    ItemUnmarked,
    /// The active theme changed.
    ThemeChanged,
    /// An admin created a theme.
    ThemeCreated,
    /// An admin updated a theme.
    ThemeUpdated,
    /// An admin deleted a theme.
    ThemeDeleted,
}

impl PushEventKind {
    /// All known kinds, for handler registration loops.
    pub const ALL: [PushEventKind; 7] = [
        Self::InitialState,
        Self::ItemMarked,
        Self::ItemUnmarked,
        Self::ThemeChanged,
        Self::ThemeCreated,
        Self::ThemeUpdated,
        Self::ThemeDeleted,
    ];

    /// Parses the wire `type` field. Unknown kinds return `None` and are
    /// dropped by the dispatcher.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "initial_state" => Some(Self::InitialState),
            "item_marked" => Some(Self::ItemMarked),
            "item_unmarked" => Some(Self::ItemUnmarked),
            "theme_changed" => Some(Self::ThemeChanged),
            "theme_created" => Some(Self::ThemeCreated),
            "theme_updated" => Some(Self::ThemeUpdated),
            "theme_deleted" => Some(Self::ThemeDeleted),
            _ => None,
        }
    }

    /// The wire name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::InitialState => "initial_state",
            Self::ItemMarked => "item_marked",
            Self::ItemUnmarked => "item_unmarked",
            Self::ThemeChanged => "theme_changed",
            Self::ThemeCreated => "theme_created",
            Self::ThemeUpdated => "theme_updated",
            Self::ThemeDeleted => "theme_deleted",
        }
    }
}

/// An envelope received on the push channel.
///
/// The `item` payload is kind-dependent: an item name for mark events, a
/// theme id or full theme object for theme events. [`PushMessage::item_id`]
/// and [`PushMessage::item_theme`] decode the common shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<Card>>,
}

impl PushMessage {
    /// The parsed event kind, or `None` for kinds this client does not know.
    pub fn event_kind(&self) -> Option<PushEventKind> {
        PushEventKind::from_name(&self.kind)
    }

    /// Extracts an identifier from `item`: either a bare string, or the
    /// `id` field of an object payload.
    pub fn item_id(&self) -> Option<String> {
        match self.item.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => {
                map.get("id").and_then(|v| v.as_str()).map(str::to_owned)
            }
            _ => None,
        }
    }

    /// Decodes `item` as a full [`Theme`] object.
    pub fn item_theme(&self) -> Option<Theme> {
        serde_json::from_value(self.item.clone()?).ok()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn card_cell_access_is_bounds_checked() {
        let card: Card = serde_json::from_value(serde_json::json!({
            "id": "card-1",
            "items": [["a", "b"], ["c", "d"]],
            "marked_items": [[true, false], [false, false]],
        }))
        .unwrap();
        assert_eq!(card.cell(0, 1), Some("b"));
        assert_eq!(card.cell(9, 9), None);
        assert!(card.is_marked(0, 0));
        assert!(!card.is_marked(9, 9));
    }

    #[test]
    fn catalog_empty_active_id_means_none() {
        let catalog: ThemeCatalog =
            serde_json::from_str(r#"{"themes": [], "active_theme_id": ""}"#).unwrap();
        assert_eq!(catalog.active_theme_id(), None);

        let catalog: ThemeCatalog =
            serde_json::from_str(r#"{"themes": [], "active_theme_id": "t1"}"#).unwrap();
        assert_eq!(catalog.active_theme_id(), Some("t1"));
    }

    #[test]
    fn push_message_unknown_kind() {
        let msg: PushMessage =
            serde_json::from_str(r#"{"type": "server_gossip", "item": "x"}"#).unwrap();
        assert_eq!(msg.event_kind(), None);
    }

    #[test]
    fn push_message_item_id_from_string_and_object() {
        let msg: PushMessage =
            serde_json::from_str(r#"{"type": "item_marked", "item": "Lag spike"}"#).unwrap();
        assert_eq!(msg.item_id().as_deref(), Some("Lag spike"));

        let msg: PushMessage = serde_json::from_str(
            r#"{"type": "theme_deleted", "item": {"id": "t9", "name": "Old"}}"#,
        )
        .unwrap();
        assert_eq!(msg.item_id().as_deref(), Some("t9"));
    }

    #[test]
    fn push_message_theme_payload() {
        let msg: PushMessage = serde_json::from_str(
            r#"{"type": "theme_created", "item": {"id": "t1", "name": "Streams", "items": []}}"#,
        )
        .unwrap();
        let theme = msg.item_theme().unwrap();
        assert_eq!(theme.id, "t1");
        assert_eq!(theme.name, "Streams");
    }

    #[test]
    fn user_tolerates_missing_optional_fields() {
        let user: User = serde_json::from_str(
            r#"{"id": "u1", "discord_id": "123", "username": "player"}"#,
        )
        .unwrap();
        assert_eq!(user.avatar, "");
    }
}
