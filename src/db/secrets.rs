//! Named secret storage. Values are opaque strings here; in-memory
//! handling wraps them in `secrecy::SecretString` so they never hit logs.

use chrono::Utc;
use diesel::prelude::*;
use secrecy::SecretString;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::schema::secrets::dsl::*;

/// Looks up a secret by kind.
pub fn find(conn: &mut DbConn, secret_kind: &str) -> Result<Option<SecretString>> {
	let found: Option<String> = secrets
		.filter(kind.eq(secret_kind))
		.select(value)
		.first(conn)
		.optional()?;
	Ok(found.map(SecretString::from))
}

/// Reports whether a secret is configured and the last 4 characters of
/// its value for operator display.
pub fn status(conn: &mut DbConn, secret_kind: &str) -> Result<Option<String>> {
	let found: Option<String> = secrets
		.filter(kind.eq(secret_kind))
		.select(value)
		.first(conn)
		.optional()?;
	Ok(found.map(|v| last4(&v)))
}

/// Inserts or replaces a secret value.
pub fn upsert(conn: &mut DbConn, secret_kind: &str, secret_value: &str) -> Result<()> {
	let now = Utc::now();
	diesel::insert_into(secrets)
		.values((
			kind.eq(secret_kind),
			value.eq(secret_value),
			created_at.eq(now),
			updated_at.eq(now),
		))
		.on_conflict(kind)
		.do_update()
		.set((value.eq(secret_value), updated_at.eq(now)))
		.execute(conn)?;
	Ok(())
}

/// Removes a secret. Missing rows are not an error.
pub fn delete(conn: &mut DbConn, secret_kind: &str) -> Result<usize> {
	let removed = diesel::delete(secrets.filter(kind.eq(secret_kind))).execute(conn)?;
	Ok(removed)
}

pub fn last4(v: &str) -> String {
	let chars: Vec<char> = v.chars().collect();
	let tail: String = chars.iter().rev().take(4).rev().collect();
	format!("…{tail}")
}

#[cfg(test)]
mod tests {
	use super::last4;

	#[test]
	fn last4_shows_only_the_tail() {
		assert_eq!(last4("supersecret"), "…cret");
		assert_eq!(last4("ab"), "…ab");
	}
}
