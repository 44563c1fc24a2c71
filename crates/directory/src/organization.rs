use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orglicense_core::{AppError, AppResult, OrgId};

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 1000;

/// Tenant boundary grouping members, licenses, and invitations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn create(name: &str, description: Option<&str>, now: DateTime<Utc>) -> AppResult<Self> {
        let (name, description) = validate(name, description)?;
        Ok(Self {
            id: OrgId::new(),
            name,
            description,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update(&mut self, name: &str, description: Option<&str>, now: DateTime<Utc>) -> AppResult<()> {
        let (name, description) = validate(name, description)?;
        self.name = name;
        self.description = description;
        self.updated_at = now;
        Ok(())
    }
}

fn validate(name: &str, description: Option<&str>) -> AppResult<(String, Option<String>)> {
    let name = name.trim();
    if name.len() < NAME_MIN || name.len() > NAME_MAX {
        return Err(AppError::bad_request(
            "Invalid name",
            "Organization name must be between 2 and 200 characters",
        ));
    }
    let description = description.map(str::trim).filter(|d| !d.is_empty());
    if description.is_some_and(|d| d.len() > DESCRIPTION_MAX) {
        return Err(AppError::bad_request(
            "Invalid description",
            "Description cannot exceed 1000 characters",
        ));
    }
    Ok((name.to_string(), description.map(str::to_string)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_trims_name_and_description() {
        let org = Organization::create("  Acme  ", Some("  widgets  "), Utc::now()).unwrap();
        assert_eq!(org.name, "Acme");
        assert_eq!(org.description.as_deref(), Some("widgets"));
    }

    #[test]
    fn create_rejects_blank_or_short_names() {
        assert!(Organization::create("   ", None, Utc::now()).is_err());
        assert!(Organization::create("a", None, Utc::now()).is_err());
    }

    #[test]
    fn blank_description_becomes_none() {
        let org = Organization::create("Acme", Some("   "), Utc::now()).unwrap();
        assert_eq!(org.description, None);
    }

    #[test]
    fn update_bumps_updated_at() {
        let now = Utc::now();
        let mut org = Organization::create("Acme", None, now).unwrap();
        let later = now + chrono::Duration::minutes(5);
        org.update("Acme Corp", None, later).unwrap();
        assert_eq!(org.name, "Acme Corp");
        assert_eq!(org.updated_at, later);
        assert_eq!(org.created_at, now);
    }
}
