//! Global reference data shared by every actor: languages, table states and
//! order states. Matched on `key`.

use crate::backend::{EntityKind, SearchQuery};
use crate::engine::{Lookup, UpsertPolicy, UpsertRequest};
use crate::error::RowError;

use super::payload::{LanguagePayload, StatePayload};
use super::{request, Columns, EntityPayload, Importer, RowInput};

const KEY_COLUMN: &str = "key";

fn by_key(kind: EntityKind, key: &str) -> (SearchQuery, Lookup) {
    (
        SearchQuery::new(kind).matching(KEY_COLUMN, key),
        Lookup::new(kind, None, KEY_COLUMN, key),
    )
}

pub struct LanguageImporter;

impl Importer for LanguageImporter {
    fn command(&self) -> &'static str {
        "languages"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Language
    }

    fn columns(&self, _languages: &[String]) -> Vec<String> {
        Columns::new()
            .plain(KEY_COLUMN)
            .plain("name")
            .plain("imageUrl")
            .build()
    }

    fn actor_column(&self) -> Option<&'static str> {
        None
    }

    fn default_chunk_size(&self) -> usize {
        100
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let key = input.require(KEY_COLUMN)?;
        let (existing, lookup) = by_key(self.kind(), key);
        let payload = EntityPayload::Language(LanguagePayload {
            key: key.to_string(),
            name: input.optional("name"),
            image_url: input.optional("imageUrl"),
        });
        request(self.kind(), existing, lookup, payload, UpsertPolicy::Merge, None, None)
    }
}

/// Table states and order states: a key plus a localized name.
pub struct StateImporter {
    command: &'static str,
    kind: EntityKind,
}

impl StateImporter {
    pub fn table_states() -> Self {
        Self {
            command: "table-states",
            kind: EntityKind::TableState,
        }
    }

    pub fn order_states() -> Self {
        Self {
            command: "order-states",
            kind: EntityKind::OrderState,
        }
    }
}

impl Importer for StateImporter {
    fn command(&self) -> &'static str {
        self.command
    }

    fn kind(&self) -> EntityKind {
        self.kind
    }

    fn columns(&self, languages: &[String]) -> Vec<String> {
        Columns::new()
            .plain(KEY_COLUMN)
            .localized("name", languages)
            .build()
    }

    fn actor_column(&self) -> Option<&'static str> {
        None
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let key = input.require(KEY_COLUMN)?;
        let (existing, lookup) = by_key(self.kind, key);
        let payload = EntityPayload::State(StatePayload {
            key: key.to_string(),
            name: input.localized("name"),
        });
        request(self.kind, existing, lookup, payload, UpsertPolicy::Merge, None, None)
    }
}
