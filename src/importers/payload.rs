//! Typed entity payloads.
//!
//! One struct per entity kind. Optional fields are true `Option`s and are
//! left out of the serialized map when absent, so a merge keeps whatever
//! the stored record already has for them.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::backend::{Actor, UserPointer};
use crate::engine::LocalizedField;
use crate::error::{AppError, RowError};

// ─────────────────────────────────────────────────────────────────────────────
// Ownership
// ─────────────────────────────────────────────────────────────────────────────

/// Catalog ownership: the owning actor, who also maintains the record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Owned {
    pub owned_by_user: UserPointer,
    pub maintained_by_users: Vec<UserPointer>,
}

impl Owned {
    pub fn by(actor: &Actor) -> Self {
        Self {
            owned_by_user: actor.pointer(),
            maintained_by_users: vec![actor.pointer()],
        }
    }
}

/// Price ownership: the actor that added this price entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Added {
    pub added_by_user: UserPointer,
    pub maintained_by_users: Vec<UserPointer>,
}

impl Added {
    pub fn by(actor: &Actor) -> Self {
        Self {
            added_by_user: actor.pointer(),
            maintained_by_users: vec![actor.pointer()],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagPayload {
    #[serde(flatten)]
    pub owner: Owned,
    pub name: LocalizedField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedField>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizePayload {
    #[serde(flatten)]
    pub owner: Owned,
    pub name: LocalizedField,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DishTypePayload {
    #[serde(flatten)]
    pub owner: Owned,
    pub tag_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemPayload {
    #[serde(flatten)]
    pub owner: Owned,
    pub name: LocalizedField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu_item_page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub tag_ids: Vec<String>,
    pub tag_sort_order_indices: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceItemPayload {
    #[serde(flatten)]
    pub owner: Owned,
    pub name: LocalizedField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice_item_page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub tag_ids: Vec<String>,
    pub tag_sort_order_indices: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuPayload {
    #[serde(flatten)]
    pub owner: Owned,
    pub name: LocalizedField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu_page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub tag_ids: Vec<String>,
    pub tag_sort_order_indices: BTreeMap<String, usize>,
    pub menu_item_price_ids: Vec<String>,
    pub menu_item_price_sort_order_indices: BTreeMap<String, usize>,
}

/// Landing page and banner images; only supplied urls are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantImages {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_landing_page_background_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_landing_page_background_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_top_banner_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_top_banner_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Printer {
    pub hostname: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub printer_type: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentTemplate {
    pub name: String,
    pub template: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantConfigurations {
    pub images: RestaurantImages,
    pub printers: Vec<Printer>,
    pub document_templates: Vec<DocumentTemplate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantPayload {
    #[serde(flatten)]
    pub owner: Owned,
    pub name: LocalizedField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    pub menu_ids: Vec<String>,
    pub menu_sort_order_indices: BTreeMap<String, usize>,
    pub configurations: RestaurantConfigurations,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePayload {
    #[serde(flatten)]
    pub owner: Owned,
    pub restaurant_id: String,
    pub name: LocalizedField,
}

// ─────────────────────────────────────────────────────────────────────────────
// Price payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemPricePayload {
    #[serde(flatten)]
    pub owner: Added,
    pub menu_item_id: String,
    pub choice_item_price_ids: Vec<String>,
    pub choice_item_price_sort_order_indices: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_id: Option<String>,
    pub current_price: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceItemPricePayload {
    #[serde(flatten)]
    pub owner: Added,
    pub choice_item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_id: Option<String>,
    pub current_price: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Global payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguagePayload {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Table and order states share one shape.
#[derive(Debug, Clone, Serialize)]
pub struct StatePayload {
    pub key: String,
    pub name: LocalizedField,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPayload {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
}

impl std::fmt::Debug for AccountPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountPayload")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("email_address", &self.email_address)
            .field("user_type", &self.user_type)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EntityPayload
// ─────────────────────────────────────────────────────────────────────────────

/// Fully assembled fields for one row.
#[derive(Debug, Clone)]
pub enum EntityPayload {
    Tag(TagPayload),
    Size(SizePayload),
    DishType(DishTypePayload),
    MenuItem(MenuItemPayload),
    ChoiceItem(ChoiceItemPayload),
    Menu(MenuPayload),
    Restaurant(RestaurantPayload),
    Table(TablePayload),
    MenuItemPrice(MenuItemPricePayload),
    ChoiceItemPrice(ChoiceItemPricePayload),
    Language(LanguagePayload),
    State(StatePayload),
    Account(AccountPayload),
}

/// Localized keys merge per language onto stored values.
const LOCALIZED_KEYS: &[&str] = &["name", "description"];
/// Restaurants also replace each configuration section independently.
const RESTAURANT_KEYS: &[&str] = &["name", "configurations"];

const MENU_ITEM_PRICE_VALUES: &[&str] = &[
    "currentPrice",
    "sizeId",
    "choiceItemPriceIds",
    "choiceItemPriceSortOrderIndices",
];

const CHOICE_ITEM_PRICE_VALUES: &[&str] = &["currentPrice", "sizeId"];

impl EntityPayload {
    /// Object-valued keys that merge one level deep on update.
    pub fn merge_keys(&self) -> &'static [&'static str] {
        match self {
            EntityPayload::Restaurant(_) => RESTAURANT_KEYS,
            EntityPayload::Tag(_)
            | EntityPayload::Size(_)
            | EntityPayload::MenuItem(_)
            | EntityPayload::ChoiceItem(_)
            | EntityPayload::Menu(_)
            | EntityPayload::Table(_)
            | EntityPayload::State(_) => LOCALIZED_KEYS,
            EntityPayload::DishType(_)
            | EntityPayload::MenuItemPrice(_)
            | EntityPayload::ChoiceItemPrice(_)
            | EntityPayload::Language(_)
            | EntityPayload::Account(_) => &[],
        }
    }

    /// Keys whose values decide whether a price actually changed. Ownership
    /// pointers are left out.
    pub fn compare_keys(&self) -> &'static [&'static str] {
        match self {
            EntityPayload::MenuItemPrice(_) => MENU_ITEM_PRICE_VALUES,
            EntityPayload::ChoiceItemPrice(_) => CHOICE_ITEM_PRICE_VALUES,
            _ => &[],
        }
    }

    /// Serializes the payload into backend fields.
    pub fn into_fields(self) -> Result<Map<String, Value>, RowError> {
        let value = match self {
            EntityPayload::Tag(p) => serde_json::to_value(p),
            EntityPayload::Size(p) => serde_json::to_value(p),
            EntityPayload::DishType(p) => serde_json::to_value(p),
            EntityPayload::MenuItem(p) => serde_json::to_value(p),
            EntityPayload::ChoiceItem(p) => serde_json::to_value(p),
            EntityPayload::Menu(p) => serde_json::to_value(p),
            EntityPayload::Restaurant(p) => serde_json::to_value(p),
            EntityPayload::Table(p) => serde_json::to_value(p),
            EntityPayload::MenuItemPrice(p) => serde_json::to_value(p),
            EntityPayload::ChoiceItemPrice(p) => serde_json::to_value(p),
            EntityPayload::Language(p) => serde_json::to_value(p),
            EntityPayload::State(p) => serde_json::to_value(p),
            EntityPayload::Account(p) => serde_json::to_value(p),
        }
        .map_err(|e| AppError::Internal(format!("payload serialization failed: {}", e)))?;

        match value {
            Value::Object(fields) => Ok(fields),
            other => Err(AppError::Internal(format!("payload is not an object: {}", other)).into()),
        }
    }
}
