//! Connector repository
//!
//! The `connectors` table is a catalog of provider types, kept in step with [`Provider::ALL`].

use anyhow::Result;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};

use crate::models::connector::{self, Entity as Connector};
use crate::providers::Provider;

#[derive(Debug, Clone)]
pub struct ConnectorRepository {
    db: DatabaseConnection,
}

impl ConnectorRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert the provider's catalog row, or refresh its display fields
    pub async fn upsert(&self, provider: Provider) -> Result<connector::Model> {
        let now = Utc::now().fixed_offset();

        let model = match Connector::find_by_id(provider.slug()).one(&self.db).await? {
            Some(existing) => {
                let mut active: connector::ActiveModel = existing.into();
                active.display_name = Set(provider.display_name().to_string());
                active.auth_type = Set(provider.auth_type().as_str().to_string());
                active.updated_at = Set(now);
                active.update(&self.db).await?
            }
            None => {
                connector::ActiveModel {
                    slug: Set(provider.slug().to_string()),
                    display_name: Set(provider.display_name().to_string()),
                    auth_type: Set(provider.auth_type().as_str().to_string()),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&self.db)
                .await?
            }
        };

        Ok(model)
    }

    pub async fn list(&self) -> Result<Vec<connector::Model>> {
        Ok(Connector::find()
            .order_by_asc(connector::Column::Slug)
            .all(&self.db)
            .await?)
    }
}
