//! User identities.
//!
//! Authentication lives outside this crate; these rows are the identities the
//! auth layer hands in as trusted actor ids.

use forgehub_db::Store;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::instrument;

use crate::config::AccountsConfig;
use crate::error::CoreError;
use crate::model::ordering::{from_micros, now_micros};
use crate::model::{User, UserId, Username};

const USER_COLUMNS: &str = "id, username, email, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        created_at: from_micros(row.get(3)?),
    })
}

fn validate_email(email: &str) -> Result<(), CoreError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid("email", "must not be empty"));
    }
    if trimmed.len() != email.len() {
        return Err(CoreError::invalid("email", "must not have surrounding whitespace"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(CoreError::invalid("email", format!("'{email}' is not an address"))),
    }
}

/// Register a new user.
///
/// The username is unique. With `accounts.unique_email` the email is too,
/// compared case-insensitively.
#[instrument(skip_all, fields(username = %username))]
pub fn create_user(
    store: &mut Store,
    accounts: &AccountsConfig,
    username: &Username,
    email: &str,
) -> Result<User, CoreError> {
    validate_email(email)?;
    let user = store.write(|tx| {
        let name_taken: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = ?1)",
            [username],
            |row| row.get(0),
        )?;
        if name_taken {
            return Err(CoreError::DuplicateUser {
                field: "username",
                value: username.to_string(),
            });
        }
        if accounts.unique_email {
            let email_taken: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM users WHERE email = ?1 COLLATE NOCASE)",
                [email],
                |row| row.get(0),
            )?;
            if email_taken {
                return Err(CoreError::DuplicateUser {
                    field: "email",
                    value: email.to_owned(),
                });
            }
        }
        tx.execute(
            "INSERT INTO users (username, email, created_at) VALUES (?1, ?2, ?3)",
            params![username, email, now_micros()],
        )?;
        user_by_id_tx(tx, UserId(tx.last_insert_rowid()))
    })?;
    tracing::info!(user_id = %user.id, "user created");
    Ok(user)
}

/// Look up a user by username.
pub fn find_user(store: &mut Store, username: &Username) -> Result<User, CoreError> {
    store.read(|tx| user_by_name_tx(tx, username))
}

/// Look up a user by id.
pub fn get_user(store: &mut Store, id: UserId) -> Result<User, CoreError> {
    store.read(|tx| user_by_id_tx(tx, id))
}

pub(crate) fn user_by_name_tx(conn: &Connection, username: &Username) -> Result<User, CoreError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
        [username],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::UserNotFound {
        user: username.to_string(),
    })
}

pub(crate) fn user_by_id_tx(conn: &Connection, id: UserId) -> Result<User, CoreError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::UserNotFound {
        user: format!("#{id}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    fn name(s: &str) -> Username {
        Username::new(s).unwrap()
    }

    #[test]
    fn create_then_find() {
        let mut store = Store::open_in_memory().unwrap();
        let created =
            create_user(&mut store, &AccountsConfig::default(), &name("alice"), "alice@example.com")
                .unwrap();
        let found = find_user(&mut store, &name("alice")).unwrap();
        assert_eq!(created, found);
        assert_eq!(get_user(&mut store, created.id).unwrap().email, "alice@example.com");
    }

    #[test]
    fn duplicate_username_is_conflict() {
        let mut store = Store::open_in_memory().unwrap();
        let accounts = AccountsConfig::default();
        create_user(&mut store, &accounts, &name("alice"), "a@example.com").unwrap();
        let err = create_user(&mut store, &accounts, &name("alice"), "b@example.com").unwrap_err();
        assert!(matches!(err, CoreError::DuplicateUser { field: "username", .. }));
        assert_eq!(err.class(), ErrorClass::Conflict);
    }

    #[test]
    fn duplicate_email_respects_config() {
        let mut store = Store::open_in_memory().unwrap();
        let strict = AccountsConfig { unique_email: true };
        create_user(&mut store, &strict, &name("alice"), "shared@example.com").unwrap();
        let err = create_user(&mut store, &strict, &name("bob"), "SHARED@example.com").unwrap_err();
        assert!(matches!(err, CoreError::DuplicateUser { field: "email", .. }));

        let relaxed = AccountsConfig { unique_email: false };
        create_user(&mut store, &relaxed, &name("bob"), "shared@example.com").unwrap();
    }

    #[test]
    fn malformed_email_is_invalid_input() {
        let mut store = Store::open_in_memory().unwrap();
        for bad in ["", "no-at-sign", "@example.com", "a@", " a@b.c"] {
            let err =
                create_user(&mut store, &AccountsConfig::default(), &name("carol"), bad).unwrap_err();
            assert_eq!(err.class(), ErrorClass::InvalidInput, "{bad:?}");
        }
    }

    #[test]
    fn unknown_user_is_not_found() {
        let mut store = Store::open_in_memory().unwrap();
        let err = find_user(&mut store, &name("ghost")).unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
        assert!(err.to_string().contains("ghost"));
        assert!(matches!(get_user(&mut store, UserId(7)), Err(CoreError::UserNotFound { .. })));
    }
}
