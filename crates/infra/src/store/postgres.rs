//! Postgres-backed store.
//!
//! Every compound operation runs in one transaction; the invariant-bearing
//! guards (license held by a different user, last remaining owner) are
//! re-checked under `FOR UPDATE` row locks inside that transaction, so
//! concurrent mutations of the same rows serialize at the database.

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use orglicense_auth::{OrgRole, PlatformRole};
use orglicense_core::{InvitationId, LicenseId, OrgId, Page, PageRequest, UserId};
use orglicense_directory::{normalize_email, Invitation, Membership, Organization, User};
use orglicense_licensing::License;

use super::{
    InvitationStore, LicenseRecord, LicenseStore, MemberRecord, MembershipStore, OrgStore,
    SettingStore, StoreError, StoreResult, UserOrgRecord, UserStore,
};

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and apply the schema idempotently.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("failed to connect to postgres")?;
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to apply schema")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.into())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn parse_org_role(value: &str) -> StoreResult<OrgRole> {
    value
        .parse()
        .map_err(|_| StoreError::Backend(anyhow::anyhow!("invalid role in store: {value}")))
}

fn user_from_row(row: &PgRow, prefix: &str) -> StoreResult<User> {
    let col = |name: &str| format!("{prefix}{name}");
    Ok(User {
        id: UserId::from_uuid(row.try_get(col("id").as_str())?),
        external_id: row.try_get(col("external_id").as_str())?,
        email: row.try_get(col("email").as_str())?,
        platform_role: PlatformRole::from_claim(
            &row.try_get::<String, _>(col("platform_role").as_str())?,
        ),
        created_at: row.try_get(col("created_at").as_str())?,
        updated_at: row.try_get(col("updated_at").as_str())?,
    })
}

fn org_from_row(row: &PgRow, prefix: &str) -> StoreResult<Organization> {
    let col = |name: &str| format!("{prefix}{name}");
    Ok(Organization {
        id: OrgId::from_uuid(row.try_get(col("id").as_str())?),
        name: row.try_get(col("name").as_str())?,
        description: row.try_get(col("description").as_str())?,
        created_at: row.try_get(col("created_at").as_str())?,
        updated_at: row.try_get(col("updated_at").as_str())?,
    })
}

fn membership_from_row(row: &PgRow, prefix: &str) -> StoreResult<Membership> {
    let col = |name: &str| format!("{prefix}{name}");
    Ok(Membership {
        id: row
            .try_get::<Uuid, _>(col("id").as_str())?
            .into(),
        org_id: OrgId::from_uuid(row.try_get(col("org_id").as_str())?),
        user_id: UserId::from_uuid(row.try_get(col("user_id").as_str())?),
        role: parse_org_role(&row.try_get::<String, _>(col("role").as_str())?)?,
        joined_at: row.try_get(col("joined_at").as_str())?,
        assigned_license_id: row
            .try_get::<Option<Uuid>, _>(col("assigned_license_id").as_str())?
            .map(LicenseId::from_uuid),
    })
}

fn license_from_row(row: &PgRow, prefix: &str) -> StoreResult<License> {
    let col = |name: &str| format!("{prefix}{name}");
    Ok(License {
        id: LicenseId::from_uuid(row.try_get(col("id").as_str())?),
        org_id: OrgId::from_uuid(row.try_get(col("org_id").as_str())?),
        assigned_to: row
            .try_get::<Option<Uuid>, _>(col("assigned_to").as_str())?
            .map(UserId::from_uuid),
        expires_at: row.try_get(col("expires_at").as_str())?,
        auto_renewal: row.try_get(col("auto_renewal").as_str())?,
        is_active: row.try_get(col("is_active").as_str())?,
        created_at: row.try_get(col("created_at").as_str())?,
        updated_at: row.try_get(col("updated_at").as_str())?,
    })
}

fn invitation_from_row(row: &PgRow) -> StoreResult<Invitation> {
    Ok(Invitation {
        id: InvitationId::from_uuid(row.try_get("id")?),
        org_id: OrgId::from_uuid(row.try_get("org_id")?),
        email: row.try_get("email")?,
        token: row.try_get("token")?,
        role: parse_org_role(&row.try_get::<String, _>("role")?)?,
        expires_at: row.try_get("expires_at")?,
        invited_by: row
            .try_get::<Option<Uuid>, _>("invited_by")?
            .map(UserId::from_uuid),
        created_at: row.try_get("created_at")?,
    })
}

fn like_pattern(term: &str) -> String {
    format!("%{}%", term.replace('%', "\\%").replace('_', "\\_"))
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn find_user_by_external_id(&self, external_id: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| user_from_row(&r, "")).transpose()
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| user_from_row(&r, "")).transpose()
    }

    async fn upsert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, external_id, email, platform_role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                platform_role = EXCLUDED.platform_role,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::from(user.id))
        .bind(&user.external_id)
        .bind(&user.email)
        .bind(user.platform_role.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OrgStore for PostgresStore {
    async fn insert_org_with_owner(
        &self,
        org: &Organization,
        owner: &Membership,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO organizations (id, name, description, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::from(org.id))
        .bind(&org.name)
        .bind(&org.description)
        .bind(org.created_at)
        .bind(org.updated_at)
        .execute(&mut *tx)
        .await?;
        insert_membership(&mut tx, owner).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_org(&self, id: OrgId) -> StoreResult<Option<Organization>> {
        let row = sqlx::query("SELECT * FROM organizations WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| org_from_row(&r, "")).transpose()
    }

    async fn update_org(&self, org: &Organization) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE organizations SET name = $2, description = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(Uuid::from(org.id))
        .bind(&org.name)
        .bind(&org.description)
        .bind(org.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_org(&self, id: OrgId) -> StoreResult<()> {
        // Children go via ON DELETE CASCADE in the same statement.
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn member_count(&self, org_id: OrgId) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memberships WHERE org_id = $1")
            .bind(Uuid::from(org_id))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

async fn insert_membership(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    membership: &Membership,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO memberships (id, org_id, user_id, role, joined_at, assigned_license_id) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::from(membership.id))
    .bind(Uuid::from(membership.org_id))
    .bind(Uuid::from(membership.user_id))
    .bind(membership.role.as_str())
    .bind(membership.joined_at)
    .bind(membership.assigned_license_id.map(Uuid::from))
    .execute(&mut **tx)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            StoreError::DuplicateMembership
        } else {
            err.into()
        }
    })?;
    Ok(())
}

/// Lock the membership row and return (membership id, role, held license).
async fn lock_membership(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    org_id: OrgId,
    user_id: UserId,
) -> StoreResult<(Uuid, OrgRole, Option<Uuid>)> {
    let row = sqlx::query(
        "SELECT id, role, assigned_license_id FROM memberships \
         WHERE org_id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(Uuid::from(org_id))
    .bind(Uuid::from(user_id))
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(StoreError::NotFound)?;

    Ok((
        row.try_get("id")?,
        parse_org_role(&row.try_get::<String, _>("role")?)?,
        row.try_get("assigned_license_id")?,
    ))
}

/// Lock all Owner rows of the org and return how many there are.
async fn locked_owner_count(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    org_id: OrgId,
) -> StoreResult<usize> {
    let rows = sqlx::query("SELECT id FROM memberships WHERE org_id = $1 AND role = $2 FOR UPDATE")
        .bind(Uuid::from(org_id))
        .bind(OrgRole::Owner.as_str())
        .fetch_all(&mut **tx)
        .await?;
    Ok(rows.len())
}

async fn clear_license_link(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    membership_id: Uuid,
    license_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    if let Some(license_id) = license_id {
        sqlx::query("UPDATE licenses SET assigned_to = NULL, updated_at = $2 WHERE id = $1")
            .bind(license_id)
            .bind(now)
            .execute(&mut **tx)
            .await?;
    }
    sqlx::query("UPDATE memberships SET assigned_license_id = NULL WHERE id = $1")
        .bind(membership_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl MembershipStore for PostgresStore {
    async fn find_membership(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> StoreResult<Option<Membership>> {
        let row = sqlx::query("SELECT * FROM memberships WHERE org_id = $1 AND user_id = $2")
            .bind(Uuid::from(org_id))
            .bind(Uuid::from(user_id))
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| membership_from_row(&r, "")).transpose()
    }

    async fn orgs_for_user(&self, user_id: UserId) -> StoreResult<Vec<UserOrgRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id AS m_id, m.org_id AS m_org_id, m.user_id AS m_user_id,
                   m.role AS m_role, m.joined_at AS m_joined_at,
                   m.assigned_license_id AS m_assigned_license_id,
                   o.id AS o_id, o.name AS o_name, o.description AS o_description,
                   o.created_at AS o_created_at, o.updated_at AS o_updated_at,
                   (SELECT COUNT(*) FROM memberships c WHERE c.org_id = o.id) AS member_count
            FROM memberships m
            JOIN organizations o ON o.id = m.org_id
            WHERE m.user_id = $1
            ORDER BY m.joined_at DESC
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(UserOrgRecord {
                    membership: membership_from_row(row, "m_")?,
                    organization: org_from_row(row, "o_")?,
                    member_count: row.try_get::<i64, _>("member_count")? as u64,
                })
            })
            .collect()
    }

    async fn update_member_role(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role: OrgRole,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let (membership_id, current, _) = lock_membership(&mut tx, org_id, user_id).await?;

        if current == OrgRole::Owner
            && role != OrgRole::Owner
            && locked_owner_count(&mut tx, org_id).await? <= 1
        {
            return Err(StoreError::LastOwner);
        }

        sqlx::query("UPDATE memberships SET role = $2 WHERE id = $1")
            .bind(membership_id)
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_membership(&self, org_id: OrgId, user_id: UserId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let (membership_id, role, held) = lock_membership(&mut tx, org_id, user_id).await?;

        if role == OrgRole::Owner && locked_owner_count(&mut tx, org_id).await? <= 1 {
            return Err(StoreError::LastOwner);
        }

        clear_license_link(&mut tx, membership_id, held, Utc::now()).await?;
        sqlx::query("DELETE FROM memberships WHERE id = $1")
            .bind(membership_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_members(
        &self,
        org_id: OrgId,
        request: &PageRequest,
    ) -> StoreResult<Page<MemberRecord>> {
        let order = match request.sort_key().as_deref() {
            Some("email") => "u.email",
            Some("role") => "m.role",
            _ => "m.joined_at",
        };
        let direction = if request.sort_descending { "DESC" } else { "ASC" };
        let search = request.search_term().map(|t| like_pattern(&t));
        let filter = if search.is_some() {
            "AND u.email ILIKE $2"
        } else {
            ""
        };

        let count_sql = format!(
            "SELECT COUNT(*) FROM memberships m JOIN users u ON u.id = m.user_id \
             WHERE m.org_id = $1 {filter}"
        );
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(Uuid::from(org_id));
        if let Some(pattern) = &search {
            count_query = count_query.bind(pattern);
        }
        let total = count_query.fetch_one(&self.pool).await? as u64;

        let limit_params = if search.is_some() { (3, 4) } else { (2, 3) };
        let list_sql = format!(
            r#"
            SELECT m.id AS m_id, m.org_id AS m_org_id, m.user_id AS m_user_id,
                   m.role AS m_role, m.joined_at AS m_joined_at,
                   m.assigned_license_id AS m_assigned_license_id,
                   u.id AS u_id, u.external_id AS u_external_id, u.email AS u_email,
                   u.platform_role AS u_platform_role, u.created_at AS u_created_at,
                   u.updated_at AS u_updated_at,
                   l.id AS l_id, l.org_id AS l_org_id, l.assigned_to AS l_assigned_to,
                   l.expires_at AS l_expires_at, l.auto_renewal AS l_auto_renewal,
                   l.is_active AS l_is_active, l.created_at AS l_created_at,
                   l.updated_at AS l_updated_at
            FROM memberships m
            JOIN users u ON u.id = m.user_id
            LEFT JOIN licenses l ON l.id = m.assigned_license_id
            WHERE m.org_id = $1 {filter}
            ORDER BY {order} {direction}
            LIMIT ${} OFFSET ${}
            "#,
            limit_params.0, limit_params.1,
        );
        let mut list_query = sqlx::query(&list_sql).bind(Uuid::from(org_id));
        if let Some(pattern) = &search {
            list_query = list_query.bind(pattern);
        }
        let rows = list_query
            .bind(request.page_size as i64)
            .bind(request.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(|row| {
                let license = match row.try_get::<Option<Uuid>, _>("l_id")? {
                    Some(_) => Some(license_from_row(row, "l_")?),
                    None => None,
                };
                Ok(MemberRecord {
                    membership: membership_from_row(row, "m_")?,
                    user: user_from_row(row, "u_")?,
                    license,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Page::new(items, request, total))
    }

    async fn find_member(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> StoreResult<Option<MemberRecord>> {
        let Some(membership) = self.find_membership(org_id, user_id).await? else {
            return Ok(None);
        };
        let Some(user) = self.find_user(user_id).await? else {
            return Ok(None);
        };
        let license = match membership.assigned_license_id {
            Some(id) => self.find_license(id).await?,
            None => None,
        };
        Ok(Some(MemberRecord {
            membership,
            user,
            license,
        }))
    }
}

#[async_trait]
impl InvitationStore for PostgresStore {
    async fn insert_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO invitations (id, org_id, email, token, role, expires_at, invited_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::from(invitation.id))
        .bind(Uuid::from(invitation.org_id))
        .bind(&invitation.email)
        .bind(&invitation.token)
        .bind(invitation.role.as_str())
        .bind(invitation.expires_at)
        .bind(invitation.invited_by.map(Uuid::from))
        .bind(invitation.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::DuplicateInvitation
            } else {
                err.into()
            }
        })?;
        Ok(())
    }

    async fn find_invitation(
        &self,
        org_id: OrgId,
        id: InvitationId,
    ) -> StoreResult<Option<Invitation>> {
        let row = sqlx::query("SELECT * FROM invitations WHERE id = $1 AND org_id = $2")
            .bind(Uuid::from(id))
            .bind(Uuid::from(org_id))
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| invitation_from_row(&r)).transpose()
    }

    async fn find_invitation_by_token(&self, token: &str) -> StoreResult<Option<Invitation>> {
        let row = sqlx::query("SELECT * FROM invitations WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| invitation_from_row(&r)).transpose()
    }

    async fn delete_invitation(&self, id: InvitationId) -> StoreResult<()> {
        sqlx::query("DELETE FROM invitations WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pending_exists_for_email(&self, org_id: OrgId, email: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM invitations WHERE org_id = $1 AND email = $2)",
        )
        .bind(Uuid::from(org_id))
        .bind(normalize_email(email))
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn member_email_exists(&self, org_id: OrgId, email: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(\
                 SELECT 1 FROM memberships m JOIN users u ON u.id = m.user_id \
                 WHERE m.org_id = $1 AND LOWER(u.email) = $2)",
        )
        .bind(Uuid::from(org_id))
        .bind(normalize_email(email))
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_invitations(
        &self,
        org_id: OrgId,
        request: &PageRequest,
    ) -> StoreResult<Page<Invitation>> {
        let order = match request.sort_key().as_deref() {
            Some("email") => "email",
            Some("role") => "role",
            Some("expiresat") => "expires_at",
            _ => "created_at",
        };
        let direction = if request.sort_descending { "DESC" } else { "ASC" };
        let search = request.search_term().map(|t| like_pattern(&t));
        let filter = if search.is_some() {
            "AND email ILIKE $2"
        } else {
            ""
        };

        let count_sql = format!("SELECT COUNT(*) FROM invitations WHERE org_id = $1 {filter}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(Uuid::from(org_id));
        if let Some(pattern) = &search {
            count_query = count_query.bind(pattern);
        }
        let total = count_query.fetch_one(&self.pool).await? as u64;

        let limit_params = if search.is_some() { (3, 4) } else { (2, 3) };
        let list_sql = format!(
            "SELECT * FROM invitations WHERE org_id = $1 {filter} \
             ORDER BY {order} {direction} LIMIT ${} OFFSET ${}",
            limit_params.0, limit_params.1,
        );
        let mut list_query = sqlx::query(&list_sql).bind(Uuid::from(org_id));
        if let Some(pattern) = &search {
            list_query = list_query.bind(pattern);
        }
        let rows = list_query
            .bind(request.page_size as i64)
            .bind(request.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(invitation_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(items, request, total))
    }

    async fn accept_invitation(
        &self,
        invitation_id: InvitationId,
        membership: &Membership,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let locked = sqlx::query("SELECT id FROM invitations WHERE id = $1 FOR UPDATE")
            .bind(Uuid::from(invitation_id))
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound);
        }
        insert_membership(&mut tx, membership).await?;
        sqlx::query("DELETE FROM invitations WHERE id = $1")
            .bind(Uuid::from(invitation_id))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl LicenseStore for PostgresStore {
    async fn insert_license(&self, license: &License) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO licenses (id, org_id, assigned_to, expires_at, auto_renewal, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::from(license.id))
        .bind(Uuid::from(license.org_id))
        .bind(license.assigned_to.map(Uuid::from))
        .bind(license.expires_at)
        .bind(license.auto_renewal)
        .bind(license.is_active)
        .bind(license.created_at)
        .bind(license.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_license(&self, id: LicenseId) -> StoreResult<Option<License>> {
        let row = sqlx::query("SELECT * FROM licenses WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| license_from_row(&r, "")).transpose()
    }

    async fn update_license(&self, license: &License) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE licenses SET assigned_to = $2, expires_at = $3, auto_renewal = $4, \
             is_active = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(Uuid::from(license.id))
        .bind(license.assigned_to.map(Uuid::from))
        .bind(license.expires_at)
        .bind(license.auto_renewal)
        .bind(license.is_active)
        .bind(license.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn assign_license(
        &self,
        org_id: OrgId,
        user_id: UserId,
        license_id: LicenseId,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let (membership_id, _, held) = lock_membership(&mut tx, org_id, user_id).await?;

        let row = sqlx::query(
            "SELECT assigned_to FROM licenses WHERE id = $1 AND org_id = $2 FOR UPDATE",
        )
        .bind(Uuid::from(license_id))
        .bind(Uuid::from(org_id))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        let assigned_to: Option<Uuid> = row.try_get("assigned_to")?;
        if assigned_to.is_some_and(|held_by| held_by != Uuid::from(user_id)) {
            return Err(StoreError::AlreadyAssigned);
        }
        if held.is_some_and(|held_id| held_id != Uuid::from(license_id)) {
            return Err(StoreError::AlreadyHeld);
        }

        sqlx::query("UPDATE licenses SET assigned_to = $2, updated_at = $3 WHERE id = $1")
            .bind(Uuid::from(license_id))
            .bind(Uuid::from(user_id))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE memberships SET assigned_license_id = $2 WHERE id = $1")
            .bind(membership_id)
            .bind(Uuid::from(license_id))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn unassign_member_license(
        &self,
        org_id: OrgId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let (membership_id, _, held) = lock_membership(&mut tx, org_id, user_id).await?;
        clear_license_link(&mut tx, membership_id, held, now).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_licenses_for_org(
        &self,
        org_id: OrgId,
        request: &PageRequest,
    ) -> StoreResult<Page<LicenseRecord>> {
        self.list_licenses(Some(org_id), request).await
    }

    async fn list_all_licenses(&self, request: &PageRequest) -> StoreResult<Page<LicenseRecord>> {
        self.list_licenses(None, request).await
    }

    async fn renew_expired_licenses(
        &self,
        expiration_minutes: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<License>> {
        let new_expiry = now + chrono::Duration::minutes(i64::from(expiration_minutes));
        let rows = sqlx::query(
            "UPDATE licenses SET expires_at = $1, updated_at = $2 \
             WHERE is_active AND auto_renewal AND expires_at <= $2 \
             RETURNING *",
        )
        .bind(new_expiry)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| license_from_row(r, "")).collect()
    }
}

impl PostgresStore {
    async fn list_licenses(
        &self,
        org_id: Option<OrgId>,
        request: &PageRequest,
    ) -> StoreResult<Page<LicenseRecord>> {
        let admin_scope = org_id.is_none();
        let order = match request.sort_key().as_deref() {
            Some("expiresat") => "l.expires_at",
            Some("isactive") => "l.is_active",
            Some("autorenewal") => "l.auto_renewal",
            Some("organizationid") if admin_scope => "l.org_id",
            _ => "l.created_at",
        };
        let direction = if request.sort_descending { "DESC" } else { "ASC" };
        let search = request.search_term().map(|t| like_pattern(&t));

        // Build WHERE with positional binds in a fixed order:
        // [org_id], [search], limit, offset.
        let mut conditions: Vec<String> = Vec::new();
        let mut next_param = 1;
        if org_id.is_some() {
            conditions.push(format!("l.org_id = ${next_param}"));
            next_param += 1;
        }
        if search.is_some() {
            let matcher = if admin_scope {
                format!("(u.email ILIKE ${next_param} OR o.name ILIKE ${next_param})")
            } else {
                format!("u.email ILIKE ${next_param}")
            };
            conditions.push(matcher);
            next_param += 1;
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let from_clause = "FROM licenses l \
                           LEFT JOIN users u ON u.id = l.assigned_to \
                           JOIN organizations o ON o.id = l.org_id";

        let count_sql = format!("SELECT COUNT(*) {from_clause} {where_clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(org) = org_id {
            count_query = count_query.bind(Uuid::from(org));
        }
        if let Some(pattern) = &search {
            count_query = count_query.bind(pattern);
        }
        let total = count_query.fetch_one(&self.pool).await? as u64;

        let list_sql = format!(
            "SELECT l.*, u.email AS assignee_email {from_clause} {where_clause} \
             ORDER BY {order} {direction} LIMIT ${} OFFSET ${}",
            next_param,
            next_param + 1,
        );
        let mut list_query = sqlx::query(&list_sql);
        if let Some(org) = org_id {
            list_query = list_query.bind(Uuid::from(org));
        }
        if let Some(pattern) = &search {
            list_query = list_query.bind(pattern);
        }
        let rows = list_query
            .bind(request.page_size as i64)
            .bind(request.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(|row| {
                Ok(LicenseRecord {
                    license: license_from_row(row, "")?,
                    assignee_email: row.try_get("assignee_email")?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(items, request, total))
    }
}

#[async_trait]
impl SettingStore for PostgresStore {
    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM app_settings WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn put_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO app_settings (key, value, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
