use api_types::{
    auth::{AuthSession, PasswordGrant, TokenResponse, User, UserId},
    error::ErrorBody,
    expense::{Expense, ExpenseChanges, ExpenseId, NewExpense},
};
use async_trait::async_trait;
use engine::{RemoteStore, Session, StoreError};
use reqwest::{Method, RequestBuilder, Response, Url};

use crate::error::{AppError, Result};

type StoreResult<T> = std::result::Result<T, StoreError>;

const EXPENSES: &str = "rest/v1/expenses";

/// The hosted backend over its REST and auth endpoints.
#[derive(Debug, Clone)]
pub struct RestStore {
    base_url: Url,
    anon_key: String,
    http: reqwest::Client,
}

impl RestStore {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)
            .map_err(|err| AppError::Input(format!("invalid base_url: {err}")))?;
        Ok(Self {
            base_url,
            anon_key: anon_key.to_string(),
            http: reqwest::Client::new(),
        })
    }

    fn request(&self, method: Method, url: Url, session: &Session) -> RequestBuilder {
        let req = self
            .http
            .request(method, url)
            .header("apikey", &self.anon_key);
        match session.access_token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> StoreResult<AuthSession> {
        let mut url = endpoint(&self.base_url, "auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let payload = PasswordGrant {
            email: email.to_string(),
            password: password.to_string(),
        };
        let res = send(
            self.request(Method::POST, url, &Session::Anonymous)
                .json(&payload),
        )
        .await?;
        let token = res.json::<TokenResponse>().await.map_err(transport)?;
        Ok(AuthSession::from_token(token, chrono::Utc::now()))
    }

    pub async fn sign_out(&self, session: &Session) -> StoreResult<()> {
        if !session.is_authenticated() {
            return Ok(());
        }
        let url = endpoint(&self.base_url, "auth/v1/logout")?;
        send(self.request(Method::POST, url, session)).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn current_user(&self, session: &Session) -> StoreResult<Option<User>> {
        if !session.is_authenticated() {
            return Ok(None);
        }
        let url = endpoint(&self.base_url, "auth/v1/user")?;
        match send(self.request(Method::GET, url, session)).await {
            Ok(res) => Ok(Some(res.json::<User>().await.map_err(transport)?)),
            Err(StoreError::Unauthorized | StoreError::Forbidden(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn select_expenses(
        &self,
        session: &Session,
        user_id: &UserId,
    ) -> StoreResult<Vec<Expense>> {
        let url = select_url(&self.base_url, user_id)?;
        let res = send(self.request(Method::GET, url, session)).await?;
        res.json::<Vec<Expense>>().await.map_err(transport)
    }

    async fn insert_expense(&self, session: &Session, row: &NewExpense) -> StoreResult<()> {
        let url = endpoint(&self.base_url, EXPENSES)?;
        send(
            self.request(Method::POST, url, session)
                .header("Prefer", "return=minimal")
                .json(row),
        )
        .await?;
        Ok(())
    }

    async fn update_expense(
        &self,
        session: &Session,
        id: &ExpenseId,
        user_id: &UserId,
        changes: &ExpenseChanges,
    ) -> StoreResult<()> {
        let url = row_url(&self.base_url, id, user_id)?;
        send(
            self.request(Method::PATCH, url, session)
                .header("Prefer", "return=minimal")
                .json(changes),
        )
        .await?;
        Ok(())
    }

    async fn delete_expense(
        &self,
        session: &Session,
        id: &ExpenseId,
        user_id: &UserId,
    ) -> StoreResult<()> {
        let url = row_url(&self.base_url, id, user_id)?;
        send(self.request(Method::DELETE, url, session)).await?;
        Ok(())
    }
}

fn endpoint(base_url: &Url, path: &str) -> StoreResult<Url> {
    base_url
        .join(path)
        .map_err(|err| StoreError::Server(format!("invalid base_url: {err}")))
}

fn select_url(base_url: &Url, user_id: &UserId) -> StoreResult<Url> {
    let mut url = endpoint(base_url, EXPENSES)?;
    url.query_pairs_mut()
        .append_pair("select", "*")
        .append_pair("user_id", &format!("eq.{user_id}"))
        .append_pair("order", "date.desc");
    Ok(url)
}

/// A single row, filtered by owner as well.
fn row_url(base_url: &Url, id: &ExpenseId, user_id: &UserId) -> StoreResult<Url> {
    let mut url = endpoint(base_url, EXPENSES)?;
    url.query_pairs_mut()
        .append_pair("id", &format!("eq.{id}"))
        .append_pair("user_id", &format!("eq.{user_id}"));
    Ok(url)
}

async fn send(req: RequestBuilder) -> StoreResult<Response> {
    let res = req.send().await.map_err(transport)?;
    if res.status().is_success() {
        return Ok(res);
    }

    let status = res.status();
    let body = res
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| "unknown error".to_string());
    tracing::debug!(status = status.as_u16(), "request failed: {body}");
    Err(status_error(status.as_u16(), body))
}

fn status_error(status: u16, body: String) -> StoreError {
    match status {
        401 => StoreError::Unauthorized,
        403 => StoreError::Forbidden(body),
        404 => StoreError::NotFound,
        409 => StoreError::Conflict(body),
        400 | 422 => StoreError::Validation(body),
        _ => StoreError::Server(body),
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        RestStore::new("https://project.example.co", "anon")
            .unwrap()
            .base_url
    }

    #[test]
    fn base_url_keeps_its_path() {
        let store = RestStore::new("http://127.0.0.1:54321/proxy", "anon").unwrap();
        assert_eq!(
            endpoint(&store.base_url, "auth/v1/user").unwrap().as_str(),
            "http://127.0.0.1:54321/proxy/auth/v1/user"
        );
        assert!(RestStore::new("not a url", "anon").is_err());
    }

    #[test]
    fn select_filters_by_owner_and_orders_by_date() {
        let url = select_url(&base(), &UserId::from("u1")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/rest/v1/expenses?select=*&user_id=eq.u1&order=date.desc"
        );
    }

    #[test]
    fn row_operations_filter_by_id_and_owner() {
        let url = row_url(&base(), &ExpenseId::from("e1"), &UserId::from("u1")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/rest/v1/expenses?id=eq.e1&user_id=eq.u1"
        );
    }

    #[test]
    fn status_mapping() {
        let msg = || "boom".to_string();
        assert_eq!(status_error(401, msg()), StoreError::Unauthorized);
        assert_eq!(status_error(403, msg()), StoreError::Forbidden(msg()));
        assert_eq!(status_error(404, msg()), StoreError::NotFound);
        assert_eq!(status_error(409, msg()), StoreError::Conflict(msg()));
        assert_eq!(status_error(400, msg()), StoreError::Validation(msg()));
        assert_eq!(status_error(422, msg()), StoreError::Validation(msg()));
        assert_eq!(status_error(500, msg()), StoreError::Server(msg()));
    }
}
