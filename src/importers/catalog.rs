//! Actor-owned catalog importers: tags, sizes, dish types, menu items,
//! choice items, menus, restaurants and tables.

use crate::backend::{ActorField, EntityKind, Record, SearchQuery, VisibilityPolicy};
use crate::engine::resolve::{resolve_cached, resolve_names, resolve_refs, split_names};
use crate::engine::{CollectionLoader, Lookup, Resolution, ResolvedRefs, UpsertPolicy, UpsertRequest};
use crate::error::RowError;

use super::payload::{
    ChoiceItemPayload, DishTypePayload, DocumentTemplate, MenuItemPayload, MenuPayload, Owned,
    Printer, RestaurantConfigurations, RestaurantImages, RestaurantPayload, SizePayload,
    TablePayload, TagPayload,
};
use super::{owned_by_name, request, Columns, EntityPayload, Importer, RowInput, USERNAME_COLUMN};

/// Resolves the `tags` cell against the actor's cached tags.
fn tag_refs(input: &RowInput<'_>) -> Result<ResolvedRefs, RowError> {
    let bundle = input.bundle()?;
    resolve_refs(
        bundle.collection(EntityKind::Tag),
        EntityKind::Tag,
        Some(&bundle.actor),
        &input.name_path(),
        input.list("tags"),
    )
}

/// Resolves one cached record by primary-language name.
fn cached_by_name<'a>(
    input: &RowInput<'a>,
    kind: EntityKind,
    name: &str,
) -> Result<&'a Record, RowError> {
    let bundle = input.bundle()?;
    let path = input.name_path();
    let lookup = Lookup::new(kind, Some(&bundle.actor), path.as_str(), name);
    resolve_cached(bundle.collection(kind), &path, name).require(&lookup)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tags / sizes / dish types
// ─────────────────────────────────────────────────────────────────────────────

pub struct TagImporter;

impl Importer for TagImporter {
    fn command(&self) -> &'static str {
        "tags"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Tag
    }

    fn columns(&self, languages: &[String]) -> Vec<String> {
        Columns::new()
            .plain(USERNAME_COLUMN)
            .localized("name", languages)
            .localized("description", languages)
            .build()
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let payload = EntityPayload::Tag(TagPayload {
            owner: Owned::by(&input.bundle()?.actor),
            name: input.localized("name"),
            description: input.localized("description").into_option(),
        });
        owned_by_name(input, self.kind(), payload, VisibilityPolicy::public_read_admin_write())
    }
}

pub struct SizeImporter;

impl Importer for SizeImporter {
    fn command(&self) -> &'static str {
        "sizes"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Size
    }

    fn columns(&self, languages: &[String]) -> Vec<String> {
        Columns::new()
            .plain(USERNAME_COLUMN)
            .localized("name", languages)
            .build()
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let payload = EntityPayload::Size(SizePayload {
            owner: Owned::by(&input.bundle()?.actor),
            name: input.localized("name"),
        });
        owned_by_name(input, self.kind(), payload, VisibilityPolicy::public_read_admin_write())
    }
}

/// Dish types wrap a tag. One per tag: an existing dish type is left as is.
pub struct DishTypeImporter;

impl Importer for DishTypeImporter {
    fn command(&self) -> &'static str {
        "dish-types"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::DishType
    }

    fn columns(&self, _languages: &[String]) -> Vec<String> {
        Columns::new().plain(USERNAME_COLUMN).plain("tagName").build()
    }

    fn shared_collections(&self) -> Vec<CollectionLoader> {
        vec![CollectionLoader::owned(EntityKind::Tag)]
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let actor = &input.bundle()?.actor;
        let tag = cached_by_name(input, EntityKind::Tag, input.require("tagName")?)?;

        let existing = SearchQuery::new(self.kind())
            .scoped(ActorField::OwnedBy, actor)
            .matching("tagId", tag.id.as_str());
        let lookup = Lookup::new(self.kind(), Some(actor), "tagId", tag.id.as_str());
        let payload = EntityPayload::DishType(DishTypePayload {
            owner: Owned::by(actor),
            tag_id: tag.id.clone(),
        });

        request(
            self.kind(),
            existing,
            lookup,
            payload,
            UpsertPolicy::CreateIfAbsent,
            Some(VisibilityPolicy::public_read_admin_read_write()),
            Some(actor),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Menu items / choice items
// ─────────────────────────────────────────────────────────────────────────────

pub struct MenuItemImporter;

impl Importer for MenuItemImporter {
    fn command(&self) -> &'static str {
        "menu-items"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::MenuItem
    }

    fn columns(&self, languages: &[String]) -> Vec<String> {
        Columns::new()
            .plain(USERNAME_COLUMN)
            .localized("name", languages)
            .localized("description", languages)
            .plain("menuItemPageUrl")
            .plain("imageUrl")
            .plain("tags")
            .build()
    }

    fn shared_collections(&self) -> Vec<CollectionLoader> {
        vec![CollectionLoader::owned(EntityKind::Tag)]
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let tags = tag_refs(input)?;
        let payload = EntityPayload::MenuItem(MenuItemPayload {
            owner: Owned::by(&input.bundle()?.actor),
            name: input.localized("name"),
            description: input.localized("description").into_option(),
            menu_item_page_url: input.optional("menuItemPageUrl"),
            image_url: input.optional("imageUrl"),
            tag_ids: tags.ids,
            tag_sort_order_indices: tags.sort_order,
        });
        owned_by_name(
            input,
            self.kind(),
            payload,
            VisibilityPolicy::public_read_admin_read_write(),
        )
    }
}

pub struct ChoiceItemImporter;

impl Importer for ChoiceItemImporter {
    fn command(&self) -> &'static str {
        "choice-items"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::ChoiceItem
    }

    fn columns(&self, languages: &[String]) -> Vec<String> {
        Columns::new()
            .plain(USERNAME_COLUMN)
            .localized("name", languages)
            .localized("description", languages)
            .plain("choiceItemPageUrl")
            .plain("imageUrl")
            .plain("tags")
            .build()
    }

    fn shared_collections(&self) -> Vec<CollectionLoader> {
        vec![CollectionLoader::owned(EntityKind::Tag)]
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let tags = tag_refs(input)?;
        let payload = EntityPayload::ChoiceItem(ChoiceItemPayload {
            owner: Owned::by(&input.bundle()?.actor),
            name: input.localized("name"),
            description: input.localized("description").into_option(),
            choice_item_page_url: input.optional("choiceItemPageUrl"),
            image_url: input.optional("imageUrl"),
            tag_ids: tags.ids,
            tag_sort_order_indices: tags.sort_order,
        });
        owned_by_name(input, self.kind(), payload, VisibilityPolicy::public_read_admin_write())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Menus
// ─────────────────────────────────────────────────────────────────────────────

/// Menus list their items by name; the menu stores the items' active
/// prices, ordered by where each item appears in the list.
pub struct MenuImporter;

impl MenuImporter {
    fn menu_item_prices(&self, input: &RowInput<'_>) -> Result<ResolvedRefs, RowError> {
        let bundle = input.bundle()?;
        let actor = Some(&bundle.actor);
        let names = split_names(input.list("menuItemNames"));
        let items = resolve_names(
            bundle.collection(EntityKind::MenuItem),
            EntityKind::MenuItem,
            actor,
            &input.name_path(),
            &names,
        )?;

        let prices = bundle.collection(EntityKind::MenuItemPrice);
        let pairs = items
            .into_iter()
            .map(|(item, name)| -> Result<(String, String), RowError> {
                let lookup = Lookup::new(EntityKind::MenuItemPrice, actor, "menuItemId", item.id.as_str());
                let price = Resolution::classify(
                    prices
                        .iter()
                        .filter(|p| p.str_at("menuItemId") == Some(item.id.as_str()))
                        .collect(),
                )
                .require(&lookup)?;
                Ok((price.id.clone(), name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ResolvedRefs::from_pairs(&names, &pairs))
    }
}

impl Importer for MenuImporter {
    fn command(&self) -> &'static str {
        "menus"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Menu
    }

    fn columns(&self, languages: &[String]) -> Vec<String> {
        Columns::new()
            .plain(USERNAME_COLUMN)
            .localized("name", languages)
            .localized("description", languages)
            .plain("menuPageUrl")
            .plain("imageUrl")
            .plain("tags")
            .plain("menuItemNames")
            .build()
    }

    fn shared_collections(&self) -> Vec<CollectionLoader> {
        vec![
            CollectionLoader::owned(EntityKind::Tag),
            CollectionLoader::owned(EntityKind::MenuItem),
            CollectionLoader::added_active(EntityKind::MenuItemPrice),
        ]
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let tags = tag_refs(input)?;
        let prices = self.menu_item_prices(input)?;
        let payload = EntityPayload::Menu(MenuPayload {
            owner: Owned::by(&input.bundle()?.actor),
            name: input.localized("name"),
            description: input.localized("description").into_option(),
            menu_page_url: input.optional("menuPageUrl"),
            image_url: input.optional("imageUrl"),
            tag_ids: tags.ids,
            tag_sort_order_indices: tags.sort_order,
            menu_item_price_ids: prices.ids,
            menu_item_price_sort_order_indices: prices.sort_order,
        });
        owned_by_name(input, self.kind(), payload, VisibilityPolicy::public_read())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Restaurants
// ─────────────────────────────────────────────────────────────────────────────

const RECEIPT_PRINTER_TYPE: &str = "Receipt";
const RECEIPT_PRINTER_NAME: &str = "Receipt Printer";
const KITCHEN_ORDER_TEMPLATE: &str = "KitchenOrder";

/// Parses a `host:port` printer address.
pub(crate) fn parse_printer(address: &str) -> Result<Printer, RowError> {
    let invalid = |reason: &str| RowError::InvalidValue {
        column: "printerAddress".to_string(),
        value: address.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = address
        .split_once(':')
        .ok_or_else(|| invalid("expected host:port"))?;
    let host = host.trim();
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    let port = port
        .trim()
        .parse::<u16>()
        .map_err(|_| invalid("port must be a number between 0 and 65535"))?;

    Ok(Printer {
        hostname: host.to_string(),
        port,
        printer_type: RECEIPT_PRINTER_TYPE.to_string(),
        name: RECEIPT_PRINTER_NAME.to_string(),
    })
}

pub struct RestaurantImporter;

impl Importer for RestaurantImporter {
    fn command(&self) -> &'static str {
        "restaurants"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Restaurant
    }

    fn columns(&self, languages: &[String]) -> Vec<String> {
        Columns::new()
            .plain(USERNAME_COLUMN)
            .localized("name", languages)
            .plain("websiteUrl")
            .plain("pin")
            .plain("menuNames")
            .plain("primaryLandingPageBackgroundImageUrl")
            .plain("secondaryLandingPageBackgroundImageUrl")
            .plain("primaryTopBannerImageUrl")
            .plain("secondaryTopBannerImageUrl")
            .plain("printerAddress")
            .plain("kitchenOrderTemplate")
            .build()
    }

    fn shared_collections(&self) -> Vec<CollectionLoader> {
        vec![CollectionLoader::owned(EntityKind::Menu)]
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let bundle = input.bundle()?;
        let menus = resolve_refs(
            bundle.collection(EntityKind::Menu),
            EntityKind::Menu,
            Some(&bundle.actor),
            &input.name_path(),
            input.list("menuNames"),
        )?;

        let printers = input
            .optional("printerAddress")
            .map(|address| parse_printer(&address))
            .transpose()?
            .into_iter()
            .collect();
        let document_templates = input
            .optional("kitchenOrderTemplate")
            .map(|template| DocumentTemplate {
                name: KITCHEN_ORDER_TEMPLATE.to_string(),
                template,
            })
            .into_iter()
            .collect();

        let payload = EntityPayload::Restaurant(RestaurantPayload {
            owner: Owned::by(&bundle.actor),
            name: input.localized("name"),
            website_url: input.optional("websiteUrl"),
            pin: input.optional("pin"),
            menu_ids: menus.ids,
            menu_sort_order_indices: menus.sort_order,
            configurations: RestaurantConfigurations {
                images: RestaurantImages {
                    primary_landing_page_background_image_url: input
                        .optional("primaryLandingPageBackgroundImageUrl"),
                    secondary_landing_page_background_image_url: input
                        .optional("secondaryLandingPageBackgroundImageUrl"),
                    primary_top_banner_image_url: input.optional("primaryTopBannerImageUrl"),
                    secondary_top_banner_image_url: input.optional("secondaryTopBannerImageUrl"),
                },
                printers,
                document_templates,
            },
        });
        owned_by_name(input, self.kind(), payload, VisibilityPolicy::public_read_admin_write())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tables
// ─────────────────────────────────────────────────────────────────────────────

/// Tables are matched by name within their restaurant.
pub struct TableImporter;

impl Importer for TableImporter {
    fn command(&self) -> &'static str {
        "tables"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Table
    }

    fn columns(&self, languages: &[String]) -> Vec<String> {
        Columns::new()
            .plain(USERNAME_COLUMN)
            .plain("restaurantName")
            .localized("name", languages)
            .build()
    }

    fn shared_collections(&self) -> Vec<CollectionLoader> {
        vec![CollectionLoader::owned(EntityKind::Restaurant)]
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let actor = &input.bundle()?.actor;
        let restaurant =
            cached_by_name(input, EntityKind::Restaurant, input.require("restaurantName")?)?;
        let name = input.primary_name()?;
        let path = input.name_path();

        let existing = SearchQuery::new(self.kind())
            .scoped(ActorField::OwnedBy, actor)
            .matching("restaurantId", restaurant.id.as_str())
            .matching(path.as_str(), name);
        let lookup = Lookup::new(self.kind(), Some(actor), path, name);
        let payload = EntityPayload::Table(TablePayload {
            owner: Owned::by(actor),
            restaurant_id: restaurant.id.clone(),
            name: input.localized("name"),
        });

        request(
            self.kind(),
            existing,
            lookup,
            payload,
            UpsertPolicy::Merge,
            Some(VisibilityPolicy::public_read()),
            Some(actor),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Actor;
    use crate::engine::localize::DEFAULT_LANGUAGES;
    use crate::engine::ActorBundle;
    use crate::tabular::{ColumnSchema, ExtractedValues, Row};
    use serde_json::{json, Value};

    fn languages() -> Vec<String> {
        DEFAULT_LANGUAGES.iter().map(|s| s.to_string()).collect()
    }

    fn record(id: &str, fields: Value) -> Record {
        Record::new(id, fields.as_object().cloned().unwrap())
    }

    fn named(id: &str, name: &str) -> Record {
        record(id, json!({ "name": { "en_NZ": name } }))
    }

    fn extract(importer: &dyn Importer, cells: &[&str]) -> ExtractedValues {
        let schema = ColumnSchema::new(importer.columns(&languages())).unwrap();
        schema.extract(&cells.iter().copied().collect::<Row>())
    }

    fn plan(importer: &dyn Importer, bundle: &ActorBundle, cells: &[&str]) -> Result<UpsertRequest, RowError> {
        let values = extract(importer, cells);
        let languages = languages();
        importer.plan(&RowInput {
            values: &values,
            bundle: Some(bundle),
            languages: &languages,
        })
    }

    fn owner() -> Actor {
        Actor::new("u1", "owner")
    }

    #[test]
    fn tag_payload_is_sparse_and_matched_by_name() {
        let bundle = ActorBundle::new(owner());
        let request = plan(&TagImporter, &bundle, &["owner", "Spicy", "", "", "", "", ""]).unwrap();

        assert_eq!(request.payload["name"], json!({ "en_NZ": "Spicy" }));
        assert!(!request.payload.contains_key("description"));
        assert_eq!(request.existing.conditions, vec![("name.en_NZ".to_string(), json!("Spicy"))]);
        assert_eq!(request.lookup.actor.as_deref(), Some("owner"));
        assert_eq!(request.policy, UpsertPolicy::Merge);
        assert_eq!(request.merge_keys, &["name", "description"]);
    }

    #[test]
    fn missing_primary_name_is_a_data_error() {
        let bundle = ActorBundle::new(owner());
        let err = plan(&SizeImporter, &bundle, &["owner", "", "中"]).unwrap_err();
        assert!(matches!(err, RowError::MissingValue { ref column } if column == "en_NZ_name"));
    }

    #[test]
    fn menu_item_resolves_tags_in_listed_order() {
        let bundle = ActorBundle::new(owner())
            .with_collection(EntityKind::Tag, vec![named("tA", "A"), named("tB", "B")]);
        let request = plan(
            &MenuItemImporter,
            &bundle,
            &["owner", "Fish", "", "", "", "", "", "", "fish.png", "B|A"],
        )
        .unwrap();

        assert_eq!(request.payload["tagIds"], json!(["tB", "tA"]));
        assert_eq!(request.payload["tagSortOrderIndices"], json!({ "tA": 1, "tB": 0 }));
        assert_eq!(request.payload["imageUrl"], "fish.png");
        assert!(request.visibility.unwrap().role_read.contains(&"administrators".to_string()));
    }

    #[test]
    fn unknown_tag_fails_the_row() {
        let bundle = ActorBundle::new(owner()).with_collection(EntityKind::Tag, vec![named("tA", "A")]);
        let err = plan(
            &ChoiceItemImporter,
            &bundle,
            &["owner", "Sauce", "", "", "", "", "", "", "", "A|Nope"],
        )
        .unwrap_err();
        assert!(matches!(err, RowError::NotFound { kind: EntityKind::Tag, .. }));
    }

    #[test]
    fn dish_type_matches_on_resolved_tag() {
        let bundle = ActorBundle::new(owner()).with_collection(EntityKind::Tag, vec![named("t9", "Vegan")]);
        let request = plan(&DishTypeImporter, &bundle, &["owner", "Vegan"]).unwrap();

        assert_eq!(request.policy, UpsertPolicy::CreateIfAbsent);
        assert_eq!(request.payload["tagId"], "t9");
        assert_eq!(request.existing.conditions, vec![("tagId".to_string(), json!("t9"))]);
    }

    #[test]
    fn menu_orders_prices_by_menu_item_names() {
        let bundle = ActorBundle::new(owner())
            .with_collection(EntityKind::MenuItem, vec![named("mA", "A"), named("mB", "B")])
            .with_collection(
                EntityKind::MenuItemPrice,
                vec![
                    record("pA", json!({ "menuItemId": "mA" })),
                    record("pB", json!({ "menuItemId": "mB" })),
                ],
            );
        let request = plan(
            &MenuImporter,
            &bundle,
            &["owner", "Lunch", "", "", "", "", "", "", "", "", "B|A"],
        )
        .unwrap();

        assert_eq!(request.payload["menuItemPriceIds"], json!(["pB", "pA"]));
        assert_eq!(
            request.payload["menuItemPriceSortOrderIndices"],
            json!({ "pB": 0, "pA": 1 })
        );
        assert_eq!(request.payload["tagIds"], json!([]));
    }

    #[test]
    fn menu_item_without_price_fails_the_row() {
        let bundle = ActorBundle::new(owner())
            .with_collection(EntityKind::MenuItem, vec![named("mA", "A")]);
        let err = plan(
            &MenuImporter,
            &bundle,
            &["owner", "Lunch", "", "", "", "", "", "", "", "", "A"],
        )
        .unwrap_err();
        assert!(matches!(err, RowError::NotFound { kind: EntityKind::MenuItemPrice, .. }));
    }

    #[test]
    fn restaurant_builds_configurations() {
        let bundle = ActorBundle::new(owner())
            .with_collection(EntityKind::Menu, vec![named("m1", "Lunch"), named("m2", "Dinner")]);
        let request = plan(
            &RestaurantImporter,
            &bundle,
            &[
                "owner", "Cafe", "", "", "https://cafe.example", "1234", "Dinner|Lunch",
                "landing.png", "", "", "", "10.0.0.5:9100", "{{order}}",
            ],
        )
        .unwrap();

        let fields = &request.payload;
        assert_eq!(fields["menuIds"], json!(["m2", "m1"]));
        assert_eq!(fields["menuSortOrderIndices"], json!({ "m2": 0, "m1": 1 }));
        assert_eq!(
            fields["configurations"]["images"],
            json!({ "primaryLandingPageBackgroundImageUrl": "landing.png" })
        );
        assert_eq!(fields["configurations"]["printers"][0]["hostname"], "10.0.0.5");
        assert_eq!(fields["configurations"]["printers"][0]["port"], 9100);
        assert_eq!(
            fields["configurations"]["documentTemplates"],
            json!([{ "name": "KitchenOrder", "template": "{{order}}" }])
        );
    }

    #[test]
    fn printer_address_must_be_host_and_port() {
        assert_eq!(parse_printer(" printer.local : 9100 ").unwrap().hostname, "printer.local");
        assert!(matches!(parse_printer("printer.local"), Err(RowError::InvalidValue { .. })));
        assert!(matches!(parse_printer(":9100"), Err(RowError::InvalidValue { .. })));
        assert!(matches!(parse_printer("host:http"), Err(RowError::InvalidValue { .. })));
    }

    #[test]
    fn table_is_scoped_to_its_restaurant() {
        let bundle = ActorBundle::new(owner())
            .with_collection(EntityKind::Restaurant, vec![named("r1", "Cafe")]);
        let request = plan(&TableImporter, &bundle, &["owner", "Cafe", "T1", "", ""]).unwrap();

        assert_eq!(request.payload["restaurantId"], "r1");
        assert_eq!(
            request.existing.conditions,
            vec![
                ("restaurantId".to_string(), json!("r1")),
                ("name.en_NZ".to_string(), json!("T1")),
            ]
        );
        assert_eq!(request.visibility, Some(VisibilityPolicy::public_read()));
    }
}
