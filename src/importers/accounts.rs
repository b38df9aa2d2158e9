//! Account importer. Accounts are users, matched on username; they are not
//! scoped to another actor.

use tracing::info;

use crate::backend::{EntityKind, SearchQuery};
use crate::engine::{Lookup, UpsertPolicy, UpsertRequest};
use crate::error::RowError;

use super::payload::AccountPayload;
use super::{request, Columns, EntityPayload, Importer, RowInput, USERNAME_COLUMN};

pub struct AccountImporter;

impl Importer for AccountImporter {
    fn command(&self) -> &'static str {
        "accounts"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::User
    }

    fn columns(&self, _languages: &[String]) -> Vec<String> {
        Columns::new()
            .plain(USERNAME_COLUMN)
            .plain("password")
            .plain("email")
            .plain("type")
            .build()
    }

    fn actor_column(&self) -> Option<&'static str> {
        None
    }

    // Sign-ups go one at a time.
    fn default_chunk_size(&self) -> usize {
        1
    }

    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError> {
        let username = input.require(USERNAME_COLUMN)?;
        info!("[IMPORT] Upserting account {}", username);

        let existing = SearchQuery::new(EntityKind::User).matching(USERNAME_COLUMN, username);
        let lookup = Lookup::new(EntityKind::User, None, USERNAME_COLUMN, username);
        let payload = EntityPayload::Account(AccountPayload {
            username: username.to_string(),
            password: input.optional("password"),
            email_address: input.optional("email"),
            user_type: input.optional("type"),
        });

        request(self.kind(), existing, lookup, payload, UpsertPolicy::Merge, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::{ColumnSchema, Row};

    #[test]
    fn account_payload_uses_user_field_names() {
        let languages = vec!["en_NZ".to_string()];
        let schema = ColumnSchema::new(AccountImporter.columns(&languages)).unwrap();
        let values = schema.extract(&["owner", "pw", "owner@example.com", "restaurant"].into_iter().collect::<Row>());

        let request = AccountImporter
            .plan(&RowInput {
                values: &values,
                bundle: None,
                languages: &languages,
            })
            .unwrap();

        assert_eq!(request.kind, EntityKind::User);
        assert_eq!(request.payload["username"], "owner");
        assert_eq!(request.payload["password"], "pw");
        assert_eq!(request.payload["emailAddress"], "owner@example.com");
        assert_eq!(request.payload["userType"], "restaurant");
        assert_eq!(request.policy, UpsertPolicy::Merge);
    }
}
