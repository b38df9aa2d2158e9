//! Command-line configuration.
//!
//! Every connection option can also come from the environment, so scripted
//! runs need not put keys on the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, ValueEnum};
use secrecy::SecretString;
use tracing::info;

use crate::backend::session::{
    DEFAULT_APPLICATION_ID, DEFAULT_JAVASCRIPT_KEY, DEFAULT_MASTER_KEY, DEFAULT_SERVER_URL,
};
use crate::backend::{DryRunService, EntityService, LoggingMode, ParseClient, Session};
use crate::error::AppError;
use crate::importers::{
    accounts::AccountImporter,
    catalog::{
        ChoiceItemImporter, DishTypeImporter, MenuImporter, MenuItemImporter, RestaurantImporter,
        SizeImporter, TableImporter, TagImporter,
    },
    prices::{ChoiceItemPriceImporter, MenuItemPriceImporter},
    reference_data::{LanguageImporter, StateImporter},
    Importer,
};
use crate::tabular::{parse_delimiter, RowDelimiter, TabularOptions};

/// Bulk-load restaurant data from CSV into a Parse backend.
#[derive(Parser)]
#[command(name = "menu-loader", version)]
pub struct Cli {
    /// Entity kind the file holds.
    #[arg(value_enum)]
    pub entity: Entity,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Entity kinds that can be imported, one per CSV layout, listed with
/// referenced kinds first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Entity {
    Accounts,
    Languages,
    TableStates,
    OrderStates,
    Tags,
    Sizes,
    DishTypes,
    ChoiceItems,
    ChoiceItemPrices,
    MenuItems,
    MenuItemPrices,
    Menus,
    Restaurants,
    Tables,
}

impl Entity {
    pub fn importer(self) -> Arc<dyn Importer> {
        match self {
            Entity::Accounts => Arc::new(AccountImporter),
            Entity::Languages => Arc::new(LanguageImporter),
            Entity::TableStates => Arc::new(StateImporter::table_states()),
            Entity::OrderStates => Arc::new(StateImporter::order_states()),
            Entity::Tags => Arc::new(TagImporter),
            Entity::Sizes => Arc::new(SizeImporter),
            Entity::DishTypes => Arc::new(DishTypeImporter),
            Entity::ChoiceItems => Arc::new(ChoiceItemImporter),
            Entity::ChoiceItemPrices => Arc::new(ChoiceItemPriceImporter),
            Entity::MenuItems => Arc::new(MenuItemImporter),
            Entity::MenuItemPrices => Arc::new(MenuItemPriceImporter),
            Entity::Menus => Arc::new(MenuImporter),
            Entity::Restaurants => Arc::new(RestaurantImporter),
            Entity::Tables => Arc::new(TableImporter),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Input options
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct InputArgs {
    /// CSV file to import. The first row is a header and is skipped.
    #[arg(long)]
    pub csv_file_path: PathBuf,

    /// Field delimiter (a single byte; `\t` or `tab` for tabs).
    #[arg(long, default_value = ",", value_parser = parse_delimiter)]
    pub delimiter: u8,

    /// Row delimiter: `auto`, `\n`, `\r\n` or `\r`.
    #[arg(long, default_value = "auto")]
    pub row_delimiter: RowDelimiter,

    /// Rows processed concurrently per chunk. Defaults per entity kind.
    #[arg(long, value_parser = parse_chunk_size)]
    pub chunk_size: Option<usize>,

    /// Localized column languages, primary first.
    #[arg(long, value_delimiter = ',', default_value = "en_NZ,zh,jp")]
    pub languages: Vec<String>,

    /// Resolve against the server but write nothing.
    #[arg(long)]
    pub dry_run: bool,
}

impl InputArgs {
    pub fn tabular_options(&self) -> TabularOptions {
        TabularOptions {
            delimiter: self.delimiter,
            row_delimiter: self.row_delimiter,
        }
    }
}

fn parse_chunk_size(raw: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err("chunk size must be at least 1".to_string()),
        Ok(size) => Ok(size),
        Err(e) => Err(format!("invalid chunk size '{}': {}", raw, e)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection options
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args)]
pub struct ConnectionArgs {
    #[arg(long, env = "PARSE_APPLICATION_ID", default_value = DEFAULT_APPLICATION_ID)]
    pub application_id: String,

    #[arg(
        long,
        env = "PARSE_JAVASCRIPT_KEY",
        default_value = DEFAULT_JAVASCRIPT_KEY,
        hide_env_values = true
    )]
    pub javascript_key: String,

    #[arg(
        long,
        env = "PARSE_MASTER_KEY",
        default_value = DEFAULT_MASTER_KEY,
        hide_env_values = true,
        hide_default_value = true
    )]
    pub master_key: String,

    #[arg(long, env = "PARSE_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    pub parse_server_url: String,

    /// Log in as this user before importing.
    #[arg(long, env = "PARSE_USERNAME", requires = "password")]
    pub username: Option<String>,

    #[arg(long, env = "PARSE_PASSWORD", hide_env_values = true, requires = "username")]
    pub password: Option<String>,

    /// Include query parameters (sensitive values redacted) in request logs.
    #[arg(long)]
    pub log_query_params: bool,
}

impl ConnectionArgs {
    pub fn session(&self) -> Session {
        Session::new(self.application_id.as_str())
            .with_javascript_key(self.javascript_key.as_str())
            .with_master_key(self.master_key.as_str())
    }

    /// Builds the service and session for a run, logging in when a username
    /// and password were given.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidServerUrl` - the server URL does not parse
    /// - `AppError::LoginFailed` - the credentials were rejected
    pub async fn connect(
        &self,
        dry_run: bool,
    ) -> Result<(Arc<dyn EntityService>, Session), AppError> {
        let logging_mode = if self.log_query_params {
            LoggingMode::PathAndQueryRedacted
        } else {
            LoggingMode::PathOnly
        };
        let client = ParseClient::new(&self.parse_server_url)?.with_logging_mode(logging_mode);
        let mut session = self.session();

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            let password = SecretString::from(password.clone());
            session = client.log_in(&session, username, &password).await?;
        }

        info!(
            "[BACKEND] Using {}{}",
            self.parse_server_url,
            if dry_run { " (dry run)" } else { "" }
        );

        let service: Arc<dyn EntityService> = if dry_run {
            Arc::new(DryRunService::new(client))
        } else {
            Arc::new(client)
        };
        Ok((service, session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::ColumnSchema;

    #[test]
    fn defaults_target_a_local_server() {
        let cli = Cli::try_parse_from(["menu-loader", "tags", "--csv-file-path", "tags.csv"]).unwrap();

        assert_eq!(cli.entity, Entity::Tags);
        assert_eq!(cli.input.delimiter, b',');
        assert_eq!(cli.input.row_delimiter, RowDelimiter::Auto);
        assert_eq!(cli.input.chunk_size, None);
        assert_eq!(cli.input.languages, vec!["en_NZ", "zh", "jp"]);
        assert!(!cli.input.dry_run);
        assert_eq!(cli.connection.parse_server_url, DEFAULT_SERVER_URL);
        assert!(!cli.connection.log_query_params);
        assert_eq!(cli.connection.session().application_id, DEFAULT_APPLICATION_ID);
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "menu-loader",
            "menu-item-prices",
            "--csv-file-path",
            "prices.tsv",
            "--delimiter",
            "\\t",
            "--row-delimiter",
            "\\r\\n",
            "--chunk-size",
            "4",
            "--languages",
            "en_NZ,zh",
            "--application-id",
            "prod",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.entity.importer().command(), "menu-item-prices");
        assert_eq!(cli.input.tabular_options().delimiter, b'\t');
        assert_eq!(cli.input.row_delimiter, RowDelimiter::CrLf);
        assert_eq!(cli.input.chunk_size, Some(4));
        assert_eq!(cli.input.languages, vec!["en_NZ", "zh"]);
        assert!(cli.input.dry_run);
        assert_eq!(cli.connection.application_id, "prod");
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let result = Cli::try_parse_from([
            "menu-loader",
            "tags",
            "--csv-file-path",
            "tags.csv",
            "--chunk-size",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn password_requires_username() {
        let result = Cli::try_parse_from([
            "menu-loader",
            "tags",
            "--csv-file-path",
            "tags.csv",
            "--password",
            "secret",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn every_entity_maps_to_its_importer() {
        for entity in Entity::value_variants() {
            let name = entity
                .to_possible_value()
                .map(|v| v.get_name().to_string())
                .unwrap();
            assert_eq!(entity.importer().command(), name);
        }
    }

    #[test]
    fn every_importer_has_a_valid_schema() {
        let languages: Vec<String> = ["en_NZ", "zh", "jp"].iter().map(|s| s.to_string()).collect();
        for entity in Entity::value_variants() {
            let importer = entity.importer();
            let columns = importer.columns(&languages);
            ColumnSchema::new(columns.clone()).unwrap();
            if let Some(actor_column) = importer.actor_column() {
                assert_eq!(columns[0], actor_column, "{}", importer.command());
            }
            assert!(importer.default_chunk_size() > 0);
        }
        assert_eq!(Entity::value_variants().len(), 14);
    }

    #[test]
    fn chunk_size_defaults_match_layouts() {
        assert_eq!(Entity::Tags.importer().default_chunk_size(), 10);
        assert_eq!(Entity::Accounts.importer().default_chunk_size(), 1);
        assert_eq!(Entity::Languages.importer().default_chunk_size(), 100);
    }

    #[test]
    fn global_kinds_have_no_actor() {
        for entity in [
            Entity::Languages,
            Entity::TableStates,
            Entity::OrderStates,
            Entity::Accounts,
        ] {
            assert!(entity.importer().actor_column().is_none(), "{:?}", entity);
        }
    }
}
