//! Login credential check against configured accounts.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::schema::AuthConfig;

#[derive(Debug, Default)]
pub struct CredentialStore {
    users: HashMap<String, [u8; 32]>,
}

impl CredentialStore {
    /// Accounts with an unparsable hash are skipped; validation rejects
    /// them before this point.
    pub fn from_config(config: &AuthConfig) -> Self {
        let users = config
            .users
            .iter()
            .filter_map(|user| {
                let bytes = hex::decode(&user.password_sha256).ok()?;
                let hash: [u8; 32] = bytes.try_into().ok()?;
                Some((user.username.clone(), hash))
            })
            .collect();
        Self { users }
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(password.as_bytes()).into();
        match self.users.get(username) {
            Some(stored) => bool::from(stored.ct_eq(&presented)),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}
