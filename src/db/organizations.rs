use rusqlite::{params, OptionalExtension};

use super::{DbError, DbOrganization, DbUsagePeriod, DbUser, Store, UserSummary};
use crate::types::{Plan, Role};
use crate::util::{new_id, now_ms};

fn map_organization(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbOrganization> {
    Ok(DbOrganization {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        plan: row.get(3)?,
        billing_customer_id: row.get(4)?,
        billing_subscription_id: row.get(5)?,
        billing_subscription_status: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const ORG_COLUMNS: &str = "id, name, slug, plan, billing_customer_id, \
     billing_subscription_id, billing_subscription_status, created_at, updated_at";

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbUser> {
    Ok(DbUser {
        id: row.get(0)?,
        external_id: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        role: row.get(5)?,
        organization_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const USER_COLUMNS: &str =
    "id, external_id, email, first_name, last_name, role, organization_id, \
     created_at, updated_at";

impl Store {
    // =========================================================================
    // Organizations
    // =========================================================================

    /// Create an organization and seed its first usage period.
    pub fn create_organization(
        &self,
        name: &str,
        slug: &str,
        plan: Option<Plan>,
        billing_customer_id: Option<&str>,
    ) -> Result<DbOrganization, DbError> {
        let now = now_ms();
        let org = DbOrganization {
            id: new_id(),
            name: name.to_string(),
            slug: slug.to_string(),
            plan: plan.unwrap_or(Plan::Starter),
            billing_customer_id: billing_customer_id.map(|s| s.to_string()),
            billing_subscription_id: None,
            billing_subscription_status: None,
            created_at: now,
            updated_at: now,
        };

        self.with_transaction(|tx| {
            tx.conn.execute(
                "INSERT INTO organizations (
                    id, name, slug, plan, billing_customer_id, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    org.id,
                    org.name,
                    org.slug,
                    org.plan,
                    org.billing_customer_id,
                    org.created_at,
                    org.updated_at,
                ],
            )?;
            tx.insert_usage_period(&org.id, now)?;
            Ok(())
        })?;

        Ok(org)
    }

    pub fn get_organization(&self, id: &str) -> Result<Option<DbOrganization>, DbError> {
        let org = self
            .conn
            .query_row(
                &format!("SELECT {ORG_COLUMNS} FROM organizations WHERE id = ?1"),
                params![id],
                map_organization,
            )
            .optional()?;
        Ok(org)
    }

    pub fn get_organization_by_slug(&self, slug: &str) -> Result<Option<DbOrganization>, DbError> {
        let org = self
            .conn
            .query_row(
                &format!("SELECT {ORG_COLUMNS} FROM organizations WHERE slug = ?1"),
                params![slug],
                map_organization,
            )
            .optional()?;
        Ok(org)
    }

    /// Patch name / plan / billing references. Absent fields keep their value.
    pub fn update_organization(
        &self,
        id: &str,
        name: Option<&str>,
        plan: Option<Plan>,
        billing_customer_id: Option<&str>,
        billing_subscription_id: Option<&str>,
        billing_subscription_status: Option<&str>,
    ) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE organizations SET
                name = COALESCE(?1, name),
                plan = COALESCE(?2, plan),
                billing_customer_id = COALESCE(?3, billing_customer_id),
                billing_subscription_id = COALESCE(?4, billing_subscription_id),
                billing_subscription_status = COALESCE(?5, billing_subscription_status),
                updated_at = ?6
             WHERE id = ?7",
            params![
                name,
                plan,
                billing_customer_id,
                billing_subscription_id,
                billing_subscription_status,
                now_ms(),
                id,
            ],
        )?;
        if updated == 0 {
            return Err(DbError::not_found("organization", id));
        }
        Ok(())
    }

    /// Organization plus the usage counters of the period containing `now`.
    /// Counters read as zero when no period row covers the current instant.
    pub fn organization_with_usage(
        &self,
        id: &str,
    ) -> Result<Option<(DbOrganization, Option<DbUsagePeriod>)>, DbError> {
        let Some(org) = self.get_organization(id)? else {
            return Ok(None);
        };
        let usage = self.current_usage_period(id, now_ms())?;
        Ok(Some((org, usage)))
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn create_user(
        &self,
        external_id: &str,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        role: Option<Role>,
        organization_id: &str,
    ) -> Result<DbUser, DbError> {
        let now = now_ms();
        let user = DbUser {
            id: new_id(),
            external_id: external_id.to_string(),
            email: email.to_string(),
            first_name: first_name.map(|s| s.to_string()),
            last_name: last_name.map(|s| s.to_string()),
            role: role.unwrap_or(Role::Editor),
            organization_id: organization_id.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO users (
                id, external_id, email, first_name, last_name, role,
                organization_id, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                user.id,
                user.external_id,
                user.email,
                user.first_name,
                user.last_name,
                user.role,
                user.organization_id,
                user.created_at,
                user.updated_at,
            ],
        )?;

        Ok(user)
    }

    pub fn get_user(&self, id: &str) -> Result<Option<DbUser>, DbError> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Look up a user by identity-provider subject, joined with their
    /// organization.
    pub fn get_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<(DbUser, DbOrganization)>, DbError> {
        let Some(user) = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = ?1"),
                params![external_id],
                map_user,
            )
            .optional()?
        else {
            return Ok(None);
        };

        let org = self
            .get_organization(&user.organization_id)?
            .ok_or_else(|| DbError::not_found("organization", &user.organization_id))?;
        Ok(Some((user, org)))
    }

    pub fn list_users(&self, organization_id: &str) -> Result<Vec<DbUser>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE organization_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![organization_id], map_user)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn update_user(
        &self,
        id: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        role: Option<Role>,
    ) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE users SET
                first_name = COALESCE(?1, first_name),
                last_name = COALESCE(?2, last_name),
                role = COALESCE(?3, role),
                updated_at = ?4
             WHERE id = ?5",
            params![first_name, last_name, role, now_ms(), id],
        )?;
        if updated == 0 {
            return Err(DbError::not_found("user", id));
        }
        Ok(())
    }

    /// Author projection for detail reads; `None` when the user is gone.
    pub(crate) fn user_summary(&self, user_id: &str) -> Result<Option<UserSummary>, DbError> {
        let summary = self
            .conn
            .query_row(
                "SELECT first_name, last_name, email FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(UserSummary {
                        first_name: row.get(0)?,
                        last_name: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_organization_defaults_and_seeds_usage() {
        let store = Store::open_in_memory().unwrap();
        let org = store
            .create_organization("Acme", "acme", None, None)
            .unwrap();
        assert_eq!(org.plan, Plan::Starter);

        let usage = store.current_usage_period(&org.id, now_ms()).unwrap();
        let usage = usage.expect("usage period seeded at signup");
        assert_eq!(usage.generations_count, 0);
        assert_eq!(usage.scheduled_posts_count, 0);
        assert_eq!(usage.files_uploaded_count, 0);
    }

    #[test]
    fn test_slug_unique() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_organization("Acme", "acme", None, None)
            .unwrap();
        assert!(store
            .create_organization("Acme Two", "acme", None, None)
            .is_err());
    }

    #[test]
    fn test_user_lookup_by_external_id() {
        let store = Store::open_in_memory().unwrap();
        let org = store
            .create_organization("Acme", "acme", Some(Plan::Pro), None)
            .unwrap();
        let user = store
            .create_user("idp|123", "sam@acme.com", Some("Sam"), None, None, &org.id)
            .unwrap();
        assert_eq!(user.role, Role::Editor);

        let (found, found_org) = store
            .get_user_by_external_id("idp|123")
            .unwrap()
            .expect("user exists");
        assert_eq!(found.id, user.id);
        assert_eq!(found_org.id, org.id);

        assert!(store.get_user_by_external_id("idp|999").unwrap().is_none());
    }

    #[test]
    fn test_update_missing_user_fails_fast() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .update_user("nope", Some("X"), None, None)
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
