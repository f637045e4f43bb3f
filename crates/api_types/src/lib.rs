//! Wire types shared by the sync layer and the HTTP client.
//!
//! Everything here mirrors what the hosted backend sends and accepts: the
//! `expenses` table rows, the insert/update payloads, and the auth payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod money;

pub use money::{Amount, AmountError};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

/// ISO-8601 date handling for the `date` column.
///
/// Serializes like `Date.toISOString()` (`2024-01-01T00:00:00.000Z`).
/// Accepts any RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS[.fff]`
/// (read as UTC) and a bare `YYYY-MM-DD` (midnight UTC).
pub mod date {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid date: {raw}")))
    }
}

pub mod auth {
    use super::*;

    string_id!(
        /// Identity of the authenticated owner, as issued by the auth service.
        UserId
    );

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct User {
        pub id: UserId,
        #[serde(default)]
        pub email: Option<String>,
    }

    /// Body of the password grant request.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct PasswordGrant {
        pub email: String,
        pub password: String,
    }

    /// Token response of the auth service.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct TokenResponse {
        pub access_token: String,
        #[serde(default)]
        pub refresh_token: Option<String>,
        /// Lifetime in seconds.
        #[serde(default)]
        pub expires_in: Option<i64>,
        /// Unix timestamp (seconds), preferred over `expires_in` when present.
        #[serde(default)]
        pub expires_at: Option<i64>,
        pub user: User,
    }

    /// What the client keeps after a successful sign in.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AuthSession {
        pub access_token: String,
        pub refresh_token: Option<String>,
        pub expires_at: Option<DateTime<Utc>>,
        pub user: User,
    }

    impl AuthSession {
        pub fn from_token(token: TokenResponse, now: DateTime<Utc>) -> Self {
            let expires_at = token
                .expires_at
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .or_else(|| {
                    token
                        .expires_in
                        .map(|secs| now + chrono::Duration::seconds(secs))
                });
            Self {
                access_token: token.access_token,
                refresh_token: token.refresh_token,
                expires_at,
                user: token.user,
            }
        }

        pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
            self.expires_at.is_some_and(|at| at <= now)
        }
    }
}

pub mod expense {
    use super::*;
    use crate::auth::UserId;

    string_id!(
        /// Row id, assigned by the store on insert.
        ExpenseId
    );

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Category {
        pub id: String,
        pub name: String,
    }

    /// A row of the `expenses` table.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Expense {
        pub id: ExpenseId,
        pub description: String,
        pub amount: Amount,
        #[serde(with = "crate::date")]
        pub date: DateTime<Utc>,
        pub user_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub category_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub category: Option<Category>,
    }

    impl Expense {
        /// Overwrites the mutable fields; id, owner and category are kept.
        pub fn apply(&mut self, changes: &ExpenseChanges) {
            self.description = changes.description.clone();
            self.amount = changes.amount;
            self.date = changes.date;
        }
    }

    /// Insert body. `user_id` comes from the session, never from the form.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct NewExpense {
        pub description: String,
        pub amount: Amount,
        #[serde(with = "crate::date")]
        pub date: DateTime<Utc>,
        pub user_id: UserId,
    }

    /// Update body: the only mutable columns.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ExpenseChanges {
        pub description: String,
        pub amount: Amount,
        #[serde(with = "crate::date")]
        pub date: DateTime<Utc>,
    }
}

pub mod error {
    use super::*;

    /// Error body returned by the REST and auth endpoints.
    ///
    /// The REST side uses `message`, the auth side uses one of `msg`,
    /// `error_description` or `error` depending on the endpoint.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct ErrorBody {
        #[serde(default)]
        pub message: Option<String>,
        #[serde(default)]
        pub msg: Option<String>,
        #[serde(default)]
        pub error_description: Option<String>,
        #[serde(default)]
        pub error: Option<String>,
    }

    impl ErrorBody {
        pub fn into_message(self) -> Option<String> {
            self.message
                .or(self.msg)
                .or(self.error_description)
                .or(self.error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::UserId, expense::Expense};

    #[test]
    fn expense_row_accepts_timestamp_and_bare_date() {
        let row: Expense = serde_json::from_str(
            r#"{"id":"1","description":"Mercado","amount":10,"date":"2024-01-01","user_id":"u1"}"#,
        )
        .unwrap();
        assert_eq!(row.amount.cents(), 1000);
        assert_eq!(date::format(&row.date), "2024-01-01T00:00:00.000Z");
        assert_eq!(row.user_id, UserId::from("u1"));
        assert!(row.category.is_none());

        let row: Expense = serde_json::from_str(
            r#"{"id":"2","description":"Cinema","amount":32.5,"date":"2024-02-10T18:30:00+00:00","user_id":"u1","category_id":null}"#,
        )
        .unwrap();
        assert_eq!(row.amount.cents(), 3250);
        assert_eq!(date::format(&row.date), "2024-02-10T18:30:00.000Z");
    }

    #[test]
    fn session_expiry_prefers_absolute_timestamp() {
        let now = date::parse("2024-01-01T00:00:00Z").unwrap();
        let token = auth::TokenResponse {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
            expires_at: None,
            user: auth::User {
                id: UserId::from("u1"),
                email: None,
            },
        };
        let session = auth::AuthSession::from_token(token, now);
        assert_eq!(
            session.expires_at,
            Some(now + chrono::Duration::seconds(3600))
        );
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + chrono::Duration::seconds(3600)));
    }

    #[test]
    fn error_body_picks_first_message() {
        let body: error::ErrorBody =
            serde_json::from_str(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#)
                .unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Invalid login credentials"));
        assert_eq!(error::ErrorBody::default().into_message(), None);
    }
}
