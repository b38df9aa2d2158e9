//! Price importers.
//!
//! Prices keep their history: an existing active price is marked removed
//! and a new one is created, rather than being edited in place.

use crate::backend::{ActorField, EntityKind, Record, SearchQuery};
use crate::engine::resolve::{resolve_cached, resolve_names, split_names};
use crate::engine::{CollectionLoader, Lookup, Resolution, ResolvedRefs, UpsertPolicy, UpsertRequest};
use crate::error::RowError;

use super::payload::{Added, ChoiceItemPricePayload, MenuItemPricePayload};
use super::{request, Columns, EntityPayload, Importer, RowInput, USERNAME_COLUMN};

const CURRENT_PRICE_COLUMN: &str = "currentPrice";
const SIZE_COLUMN: &str = "size";

/// Parses a non-negative decimal price.
pub(crate) fn parse_price(input: &RowInput<'_>) -> Result<f64, RowError> {
    let raw = input.require(CURRENT_PRICE_COLUMN)?;
    let invalid = |reason: &str| RowError::InvalidValue {
        column: CURRENT_PRICE_COLUMN.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let price: f64 = raw.parse().map_err(|_| invalid("not a decimal number"))?;
    if !price.is_finite() || price < 0.0 {
        return Err(invalid("price must be a non-negative number"));
    }
    Ok(price)
}

/// Resolves the optional `size` cell against the actor's cached sizes.
fn size_id(input: &RowInput<'_>) -> Result<Option<String>, RowError> {
    let Some(size) = input.optional(SIZE_COLUMN) else {
        return Ok(None);
    };
    let bundle = input.bundle()?;
    let path = input.name_path();
    let lookup = Lookup::new(EntityKind::Size, Some(&bundle.actor), path.as_str(), size.as_str());
    let record = resolve_cached(bundle.collection(EntityKind::Size), &path, &size).require(&lookup)?;
    Ok(Some(record.id.clone()))
}

/// Resolves one cached item by primary-language name.
fn item_by_name<'a>(
    input: &RowInput<'a>,
    kind: EntityKind,
    column: &str,
) -> Result<&'a Record, RowError> {
    let bundle = input.bundle()?;
    let name = input.require(column)?;
    let path = input.name_path();
    let lookup = Lookup::new(kind, Some(&bundle.actor), path.as_str(), name);
    resolve_cached(bundle.collection(kind), &path, name).require(&lookup)
}

/// Active-price lookup for `item_field == item_id`, scoped to the adding actor.
fn active_price_query(
    input: &RowInput<'_>,
    kind: EntityKind,
    item_field: &str,
    item_id: &str,
) -> Result<(SearchQuery, Lookup), RowError> {
    let actor = &input.bundle()?.actor;
    let query = SearchQuery::new(kind)
        .scoped(ActorField::AddedBy, actor)
        .matching(item_field, item_id)
        .active_only();
    let lookup = Lookup::new(kind, Some(actor), item_field, item_id);
    Ok((query, lookup))
}

// ─────────────────────────────────────────────────────────────────────────────
// Choice item prices
// ─────────────────────────────────────────────────────────────────────────────

pub struct ChoiceItemPriceImporter;

impl Importer for ChoiceItemPriceImporter {
    fn command(&self) -> &'static str {
        "choice-item-prices"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::ChoiceItemPrice
    }

    fn columns(&self, _languages: &[String]) -> Vec<String> {
        Columns::new()
            .plain(USERNAME_COLUMN)
            .plain("choiceItemName")
            .plain(SIZE_COLUMN)
            .plain(CURRENT_PRICE_COLUMN)
            .build()
    }

    fn shared_collections(&self) -> Vec<CollectionLoader> {
        vec![
            CollectionLoader::owned(EntityKind::ChoiceItem),
            CollectionLoader::owned(EntityKind::Size),
        ]
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let actor = &input.bundle()?.actor;
        let choice_item = item_by_name(input, EntityKind::ChoiceItem, "choiceItemName")?;
        let (existing, lookup) =
            active_price_query(input, self.kind(), "choiceItemId", &choice_item.id)?;

        let payload = EntityPayload::ChoiceItemPrice(ChoiceItemPricePayload {
            owner: Added::by(actor),
            choice_item_id: choice_item.id.clone(),
            size_id: size_id(input)?,
            current_price: parse_price(input)?,
        });

        request(self.kind(), existing, lookup, payload, UpsertPolicy::Supersede, None, Some(actor))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Menu item prices
// ─────────────────────────────────────────────────────────────────────────────

/// A menu item price also lists the active prices of its choice items.
pub struct MenuItemPriceImporter;

impl MenuItemPriceImporter {
    fn choice_item_prices(&self, input: &RowInput<'_>) -> Result<ResolvedRefs, RowError> {
        let bundle = input.bundle()?;
        let actor = Some(&bundle.actor);
        let names = split_names(input.list("choiceItemNames"));
        let items = resolve_names(
            bundle.collection(EntityKind::ChoiceItem),
            EntityKind::ChoiceItem,
            actor,
            &input.name_path(),
            &names,
        )?;

        let prices = bundle.collection(EntityKind::ChoiceItemPrice);
        let pairs = items
            .into_iter()
            .map(|(item, name)| -> Result<(String, String), RowError> {
                let lookup =
                    Lookup::new(EntityKind::ChoiceItemPrice, actor, "choiceItemId", item.id.as_str());
                let price = Resolution::classify(
                    prices
                        .iter()
                        .filter(|p| p.str_at("choiceItemId") == Some(item.id.as_str()))
                        .collect(),
                )
                .require(&lookup)?;
                Ok((price.id.clone(), name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ResolvedRefs::from_pairs(&names, &pairs))
    }
}

impl Importer for MenuItemPriceImporter {
    fn command(&self) -> &'static str {
        "menu-item-prices"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::MenuItemPrice
    }

    fn columns(&self, _languages: &[String]) -> Vec<String> {
        Columns::new()
            .plain(USERNAME_COLUMN)
            .plain("menuItemName")
            .plain("choiceItemNames")
            .plain(SIZE_COLUMN)
            .plain(CURRENT_PRICE_COLUMN)
            .build()
    }

    fn shared_collections(&self) -> Vec<CollectionLoader> {
        vec![
            CollectionLoader::owned(EntityKind::MenuItem),
            CollectionLoader::owned(EntityKind::Size),
            CollectionLoader::owned(EntityKind::ChoiceItem),
            CollectionLoader::added_active(EntityKind::ChoiceItemPrice),
        ]
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let actor = &input.bundle()?.actor;
        let menu_item = item_by_name(input, EntityKind::MenuItem, "menuItemName")?;
        let (existing, lookup) = active_price_query(input, self.kind(), "menuItemId", &menu_item.id)?;
        let choices = self.choice_item_prices(input)?;

        let payload = EntityPayload::MenuItemPrice(MenuItemPricePayload {
            owner: Added::by(actor),
            menu_item_id: menu_item.id.clone(),
            choice_item_price_ids: choices.ids,
            choice_item_price_sort_order_indices: choices.sort_order,
            size_id: size_id(input)?,
            current_price: parse_price(input)?,
        });

        request(self.kind(), existing, lookup, payload, UpsertPolicy::Supersede, None, Some(actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Actor, REMOVED_BY_FIELD};
    use crate::engine::ActorBundle;
    use crate::tabular::{ColumnSchema, ExtractedValues, Row};
    use serde_json::{json, Value};

    fn record(id: &str, fields: Value) -> Record {
        Record::new(id, fields.as_object().cloned().unwrap())
    }

    fn named(id: &str, name: &str) -> Record {
        record(id, json!({ "name": { "en_NZ": name } }))
    }

    fn plan(importer: &dyn Importer, bundle: &ActorBundle, cells: &[&str]) -> Result<UpsertRequest, RowError> {
        let languages = vec!["en_NZ".to_string()];
        let schema = ColumnSchema::new(importer.columns(&languages)).unwrap();
        let values: ExtractedValues = schema.extract(&cells.iter().copied().collect::<Row>());
        importer.plan(&RowInput {
            values: &values,
            bundle: Some(bundle),
            languages: &languages,
        })
    }

    fn bundle() -> ActorBundle {
        ActorBundle::new(Actor::new("u1", "owner"))
            .with_collection(EntityKind::MenuItem, vec![named("m1", "Pizza")])
            .with_collection(EntityKind::Size, vec![named("s1", "Large")])
            .with_collection(
                EntityKind::ChoiceItem,
                vec![named("c1", "Olives"), named("c2", "Cheese")],
            )
            .with_collection(
                EntityKind::ChoiceItemPrice,
                vec![
                    record("cp1", json!({ "choiceItemId": "c1" })),
                    record("cp2", json!({ "choiceItemId": "c2" })),
                ],
            )
    }

    #[test]
    fn menu_item_price_supersedes_active_price() {
        let request = plan(
            &MenuItemPriceImporter,
            &bundle(),
            &["owner", "Pizza", "Cheese|Olives", "Large", "18.50"],
        )
        .unwrap();

        assert_eq!(request.policy, UpsertPolicy::Supersede);
        assert!(request.existing.exclude_removed);
        assert_eq!(request.existing.scope.as_ref().unwrap().field, ActorField::AddedBy);
        assert!(request.visibility.is_none());

        let fields = &request.payload;
        assert_eq!(fields["addedByUser"]["objectId"], "u1");
        assert!(!fields.contains_key("ownedByUser"));
        assert!(!fields.contains_key(REMOVED_BY_FIELD));
        assert_eq!(fields["menuItemId"], "m1");
        assert_eq!(fields["sizeId"], "s1");
        assert_eq!(fields["currentPrice"], json!(18.5));
        assert_eq!(fields["choiceItemPriceIds"], json!(["cp2", "cp1"]));
        assert_eq!(fields["choiceItemPriceSortOrderIndices"], json!({ "cp2": 0, "cp1": 1 }));
    }

    #[test]
    fn size_is_optional() {
        let request = plan(&ChoiceItemPriceImporter, &bundle(), &["owner", "Olives", "", "2"]).unwrap();
        assert!(!request.payload.contains_key("sizeId"));
        assert_eq!(request.payload["choiceItemId"], "c1");
    }

    #[test]
    fn unknown_size_fails_the_row() {
        let err = plan(&ChoiceItemPriceImporter, &bundle(), &["owner", "Olives", "Huge", "2"]).unwrap_err();
        assert!(matches!(err, RowError::NotFound { kind: EntityKind::Size, .. }));
    }

    #[test]
    fn invalid_prices_are_rejected() {
        for bad in ["abc", "-1", "NaN", "inf"] {
            let err = plan(&ChoiceItemPriceImporter, &bundle(), &["owner", "Olives", "", bad]).unwrap_err();
            assert!(matches!(err, RowError::InvalidValue { .. }), "{}", bad);
        }
        let err = plan(&ChoiceItemPriceImporter, &bundle(), &["owner", "Olives", "", ""]).unwrap_err();
        assert!(matches!(err, RowError::MissingValue { .. }));
    }
}
