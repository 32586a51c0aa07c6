use super::{read_json, write_json_atomic};
use crate::core::error::StoreError;
use crate::core::portfolio::Portfolio;
use crate::core::user::{Session, User};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Users, portfolios and the persisted session, each in its own JSON file.
#[derive(Debug, Clone)]
pub struct AccountStore {
    users_path: PathBuf,
    portfolios_path: PathBuf,
    session_path: PathBuf,
}

impl AccountStore {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            users_path: data_dir.join("users.json"),
            portfolios_path: data_dir.join("portfolios.json"),
            session_path: data_dir.join("session.json"),
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(read_json(&self.users_path)?.unwrap_or_default())
    }

    pub fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let username = username.trim();
        Ok(self
            .list_users()?
            .into_iter()
            .find(|u| u.username == username))
    }

    pub fn next_user_id(&self) -> Result<u64, StoreError> {
        Ok(self
            .list_users()?
            .iter()
            .map(|u| u.user_id)
            .max()
            .map_or(1, |id| id + 1))
    }

    pub fn append_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.list_users()?;
        users.push(user.clone());
        write_json_atomic(&self.users_path, &users)
    }

    fn list_portfolios(&self) -> Result<Vec<Portfolio>, StoreError> {
        let portfolios: Vec<Portfolio> = read_json(&self.portfolios_path)?.unwrap_or_default();
        Ok(portfolios
            .into_iter()
            .map(Portfolio::restore_codes)
            .collect())
    }

    pub fn get_portfolio(&self, user_id: u64) -> Result<Option<Portfolio>, StoreError> {
        Ok(self
            .list_portfolios()?
            .into_iter()
            .find(|p| p.user_id == user_id))
    }

    pub fn upsert_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        let mut portfolios = self.list_portfolios()?;
        match portfolios
            .iter_mut()
            .find(|p| p.user_id == portfolio.user_id)
        {
            Some(existing) => *existing = portfolio.clone(),
            None => portfolios.push(portfolio.clone()),
        }
        debug!("Saving portfolio of user {}", portfolio.user_id);
        write_json_atomic(&self.portfolios_path, &portfolios)
    }

    pub fn load_session(&self) -> Result<Option<Session>, StoreError> {
        read_json(&self.session_path)
    }

    pub fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        write_json_atomic(&self.session_path, session)
    }

    pub fn clear_session(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.session_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::WriteFailed {
                path: self.session_path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn test_users() {
        let dir = tempdir().unwrap();
        let store = AccountStore::in_dir(dir.path());
        assert_eq!(store.next_user_id().unwrap(), 1);

        store
            .append_user(&User::new(1, "alice", "pass1", Utc::now()).unwrap())
            .unwrap();
        store
            .append_user(&User::new(2, "bob", "pass2", Utc::now()).unwrap())
            .unwrap();

        assert_eq!(store.next_user_id().unwrap(), 3);
        let bob = store.find_user(" bob ").unwrap().unwrap();
        assert!(bob.verify_password("pass2"));
        assert!(store.find_user("carol").unwrap().is_none());
    }

    #[test]
    fn test_portfolio_upsert() {
        let dir = tempdir().unwrap();
        let store = AccountStore::in_dir(dir.path());

        let mut portfolio = Portfolio::new(7);
        store.upsert_portfolio(&portfolio).unwrap();
        portfolio.add_currency("EUR").unwrap().deposit(5.0).unwrap();
        store.upsert_portfolio(&portfolio).unwrap();
        store.upsert_portfolio(&Portfolio::new(8)).unwrap();

        let loaded = store.get_portfolio(7).unwrap().unwrap();
        assert_eq!(loaded, portfolio);
        assert_eq!(loaded.get_wallet("EUR").unwrap().currency_code, "EUR");
        assert!(store.get_portfolio(9).unwrap().is_none());
    }

    #[test]
    fn test_session_lifecycle() {
        let dir = tempdir().unwrap();
        let store = AccountStore::in_dir(dir.path());
        assert!(store.load_session().unwrap().is_none());

        let session = Session {
            user_id: 1,
            username: "alice".to_string(),
        };
        store.save_session(&session).unwrap();
        assert_eq!(store.load_session().unwrap(), Some(session));

        store.clear_session().unwrap();
        store.clear_session().unwrap();
        assert!(store.load_session().unwrap().is_none());
    }
}
