//! Connector catalog seeding
//!
//! Every [`Provider`] gets a row in `connectors` so connections can reference it by slug.

use anyhow::Result;
use sea_orm::DatabaseConnection;

use crate::providers::Provider;
use crate::repositories::ConnectorRepository;

/// Upserts one `connectors` row per supported provider.
///
/// Safe to run on every start-up; existing rows only get their display fields refreshed.
pub async fn seed_connectors(db: &DatabaseConnection) -> Result<()> {
    let repo = ConnectorRepository::new(db.clone());

    for provider in Provider::ALL {
        if let Err(e) = repo.upsert(provider).await {
            log::error!("Failed to seed connector '{}': {}", provider.slug(), e);
            return Err(e);
        }
        log::debug!("Seeded connector: {}", provider.slug());
    }

    log::info!("Connector seeding completed ({} providers)", Provider::ALL.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        seed_connectors(&db).await.unwrap();
        seed_connectors(&db).await.unwrap();

        let connectors = ConnectorRepository::new(db).list().await.unwrap();
        assert_eq!(connectors.len(), Provider::ALL.len());
        let airtable = connectors.iter().find(|c| c.slug == "airtable").unwrap();
        assert_eq!(airtable.auth_type, "oauth2");
    }
}
