//! Connection repository for database operations
//!
//! Encapsulates SeaORM operations for the connections table. Credential blobs are encrypted
//! on the way in and decrypted on the way out; callers never see ciphertext.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use crate::crypto::{CryptoKey, credentials_aad, decrypt_credentials, encrypt_credentials};
use crate::models::connection::{self, Entity as Connection};
use crate::providers::Provider;

/// Connection status values stored in `connections.status`
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_ERROR: &str = "error";

/// Input for [`ConnectionRepository::create`]
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub team_id: Uuid,
    pub provider: Provider,
    pub name: String,
    pub credentials: JsonValue,
    pub config: Option<JsonValue>,
    pub expires_at: Option<DateTimeWithTimeZone>,
}

/// Repository for connection database operations
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    db: DatabaseConnection,
    crypto_key: CryptoKey,
}

impl ConnectionRepository {
    pub fn new(db: DatabaseConnection, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Insert a connection with its credentials encrypted
    pub async fn create(&self, new: NewConnection) -> Result<connection::Model> {
        let id = Uuid::new_v4();
        let slug = new.provider.slug();
        let aad = credentials_aad(new.team_id, slug, id);
        let ciphertext = encrypt_credentials(&self.crypto_key, &aad, &new.credentials)
            .map_err(|e| anyhow!("Credential encryption failed: {}", e))?;
        let now = Utc::now().fixed_offset();

        let model = connection::ActiveModel {
            id: Set(id),
            team_id: Set(new.team_id),
            connector_slug: Set(slug.to_string()),
            name: Set(new.name),
            status: Set(STATUS_ACTIVE.to_string()),
            credentials_ciphertext: Set(Some(ciphertext)),
            config: Set(new.config),
            expires_at: Set(new.expires_at),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        tracing::info!(
            connection_id = %model.id,
            team_id = %model.team_id,
            provider = %slug,
            "Connection created"
        );
        Ok(model)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<connection::Model>> {
        Ok(Connection::find_by_id(id).one(&self.db).await?)
    }

    /// Ids of every connection of one provider
    pub async fn ids_for_provider(&self, provider: Provider) -> Result<Vec<Uuid>> {
        Ok(Connection::find()
            .filter(connection::Column::ConnectorSlug.eq(provider.slug()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|connection| connection.id)
            .collect())
    }

    /// Provider of a stored connection
    pub fn provider(connection: &connection::Model) -> Result<Provider> {
        connection
            .connector_slug
            .parse()
            .map_err(|e| anyhow!("Connection {}: {}", connection.id, e))
    }

    /// Decrypted credential blob; `{}` when none is stored
    pub fn credentials(&self, connection: &connection::Model) -> Result<JsonValue> {
        let Some(ciphertext) = connection.credentials_ciphertext.as_deref() else {
            return Ok(json!({}));
        };
        let aad = credentials_aad(connection.team_id, &connection.connector_slug, connection.id);
        decrypt_credentials(&self.crypto_key, &aad, ciphertext)
            .map_err(|e| anyhow!("Credential decryption failed for {}: {}", connection.id, e))
    }

    /// Replace the stored credentials and access token expiry
    pub async fn update_credentials(
        &self,
        connection: &connection::Model,
        credentials: &JsonValue,
        expires_at: Option<DateTimeWithTimeZone>,
    ) -> Result<connection::Model> {
        let aad = credentials_aad(connection.team_id, &connection.connector_slug, connection.id);
        let ciphertext = encrypt_credentials(&self.crypto_key, &aad, credentials)
            .map_err(|e| anyhow!("Credential encryption failed: {}", e))?;

        let mut active: connection::ActiveModel = connection.clone().into();
        active.credentials_ciphertext = Set(Some(ciphertext));
        active.expires_at = Set(expires_at);
        active.status = Set(STATUS_ACTIVE.to_string());
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(&self.db).await?)
    }

    pub async fn set_status(&self, id: Uuid, status: &str) -> Result<()> {
        let connection = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Connection with ID '{}' not found", id))?;

        let mut active: connection::ActiveModel = connection.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await?;
        Ok(())
    }
}
