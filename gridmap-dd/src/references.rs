//! Reference entities deduplicated by natural key
//!
//! Users, organizations and geographies are value-like rows shared by many
//! connection requests. Each kind has a typed natural key; a row is looked up
//! by that key and inserted only when absent. Optional key fields compare
//! with SQL `IS`, so NULL matches NULL.

use crate::schemas::{AdminGeoDoc, EmployeeDoc, InternalGeoDoc, OrganizationDoc};
use crate::single_flight::SingleFlight;
use gridmap_common::db::models::parse_guid;
use gridmap_common::Result;
use sqlx::SqliteConnection;
use std::future::Future;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserKey {
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrganizationKey {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdminGeoKey {
    pub code: Option<i64>,
    pub level0_code: Option<String>,
    pub level0_name: Option<String>,
    pub level1_code: Option<i64>,
    pub level2_code: Option<i64>,
    pub level2_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternalGeoKey {
    pub level1_code: Option<String>,
}

/// Natural key of any reference entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceKey {
    User(UserKey),
    Organization(OrganizationKey),
    AdminGeo(AdminGeoKey),
    InternalGeo(InternalGeoKey),
}

impl ReferenceKey {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Organization(_) => "organization",
            Self::AdminGeo(_) => "admin_geo",
            Self::InternalGeo(_) => "internal_geo",
        }
    }
}

impl From<&EmployeeDoc> for ReferenceKey {
    fn from(doc: &EmployeeDoc) -> Self {
        Self::User(UserKey {
            full_name: doc.full_name.clone(),
        })
    }
}

impl From<&OrganizationDoc> for ReferenceKey {
    fn from(doc: &OrganizationDoc) -> Self {
        Self::Organization(OrganizationKey {
            name: doc.name.clone(),
        })
    }
}

impl From<&AdminGeoDoc> for ReferenceKey {
    fn from(doc: &AdminGeoDoc) -> Self {
        Self::AdminGeo(AdminGeoKey {
            code: doc.code,
            level0_code: doc.level0_code.clone(),
            level0_name: doc.level0_name.clone(),
            level1_code: doc.level1_code,
            level2_code: doc.level2_code,
            level2_name: doc.level2_name.clone(),
        })
    }
}

impl From<&InternalGeoDoc> for ReferenceKey {
    fn from(doc: &InternalGeoDoc) -> Self {
        Self::InternalGeo(InternalGeoKey {
            level1_code: doc.level1_code.clone(),
        })
    }
}

/// Id of the row matching `key`, if one exists
pub async fn find(conn: &mut SqliteConnection, key: &ReferenceKey) -> Result<Option<Uuid>> {
    let id: Option<String> = match key {
        ReferenceKey::User(k) => {
            sqlx::query_scalar("SELECT id FROM users WHERE full_name IS ? LIMIT 1")
                .bind(k.full_name.as_deref())
                .fetch_optional(&mut *conn)
                .await?
        }
        ReferenceKey::Organization(k) => {
            sqlx::query_scalar("SELECT id FROM organizations WHERE name = ? LIMIT 1")
                .bind(&k.name)
                .fetch_optional(&mut *conn)
                .await?
        }
        ReferenceKey::AdminGeo(k) => {
            sqlx::query_scalar(
                r#"
                SELECT id FROM admin_geo
                WHERE code IS ? AND level0_code IS ? AND level0_name IS ?
                  AND level1_code IS ? AND level2_code IS ? AND level2_name IS ?
                LIMIT 1
                "#,
            )
            .bind(k.code)
            .bind(k.level0_code.as_deref())
            .bind(k.level0_name.as_deref())
            .bind(k.level1_code)
            .bind(k.level2_code)
            .bind(k.level2_name.as_deref())
            .fetch_optional(&mut *conn)
            .await?
        }
        ReferenceKey::InternalGeo(k) => {
            sqlx::query_scalar("SELECT id FROM internal_geo WHERE level1_code IS ? LIMIT 1")
                .bind(k.level1_code.as_deref())
                .fetch_optional(&mut *conn)
                .await?
        }
    };

    id.as_deref().map(parse_guid).transpose()
}

async fn insert(conn: &mut SqliteConnection, key: &ReferenceKey) -> Result<Uuid> {
    let id = Uuid::new_v4();

    match key {
        ReferenceKey::User(k) => {
            sqlx::query("INSERT INTO users (id, full_name) VALUES (?, ?)")
                .bind(id.to_string())
                .bind(k.full_name.as_deref())
                .execute(&mut *conn)
                .await?;
        }
        ReferenceKey::Organization(k) => {
            sqlx::query("INSERT INTO organizations (id, name) VALUES (?, ?)")
                .bind(id.to_string())
                .bind(&k.name)
                .execute(&mut *conn)
                .await?;
        }
        ReferenceKey::AdminGeo(k) => {
            sqlx::query(
                r#"
                INSERT INTO admin_geo (
                    id, code, level0_code, level0_name, level1_code, level2_code, level2_name
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.to_string())
            .bind(k.code)
            .bind(k.level0_code.as_deref())
            .bind(k.level0_name.as_deref())
            .bind(k.level1_code)
            .bind(k.level2_code)
            .bind(k.level2_name.as_deref())
            .execute(&mut *conn)
            .await?;
        }
        ReferenceKey::InternalGeo(k) => {
            sqlx::query("INSERT INTO internal_geo (id, level1_code) VALUES (?, ?)")
                .bind(id.to_string())
                .bind(k.level1_code.as_deref())
                .execute(&mut *conn)
                .await?;
        }
    }

    tracing::debug!(kind = key.kind(), id = %id, "Created reference entity");
    Ok(id)
}

/// Query by natural key; insert if absent
pub async fn find_or_create(conn: &mut SqliteConnection, key: &ReferenceKey) -> Result<Uuid> {
    match find(conn, key).await? {
        Some(id) => Ok(id),
        None => insert(conn, key).await,
    }
}

/// Per-run memo of resolved reference ids.
///
/// Create one per import run and clear it when the run ends.
#[derive(Default)]
pub struct ReferenceResolver {
    flight: SingleFlight<ReferenceKey, Uuid>,
}

impl ReferenceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find-or-create `key` on `conn`, at most once per run
    pub async fn resolve(&self, conn: &mut SqliteConnection, key: ReferenceKey) -> Result<Uuid> {
        let lookup = key.clone();
        self.flight
            .resolve(key, move || async move { find_or_create(conn, &lookup).await })
            .await
    }

    /// Resolve `key` with a caller-supplied find-or-create
    pub async fn resolve_with<F, Fut>(&self, key: ReferenceKey, init: F) -> Result<Uuid>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Uuid>>,
    {
        self.flight.resolve(key, init).await
    }

    /// Number of memoized keys
    pub async fn len(&self) -> usize {
        self.flight.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.flight.is_empty().await
    }

    pub async fn clear(&self) {
        self.flight.clear().await;
    }
}
