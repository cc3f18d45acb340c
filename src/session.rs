//! Session lifecycle (C9): login (v1/v2 KDF), logout/disconnect, and the
//! pluggable session-storage trait external callers implement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::commands::{Request, Response};
use crate::crypto;
use crate::error::{Error, ErrorCode, Result};
use crate::http::UserSession;
use crate::pipeline::{HashcashChallenge, Pipeline, Priority};

/// Derives the v1 login key: AES-ECB-encrypts a fixed constant 65536 times,
/// keyed by successive 16-byte chunks of the password (MEGA's original,
/// pre-PBKDF2 key-stretching scheme).
pub fn derive_key_v1(password: &[u8]) -> [u8; 16] {
    use aes::Aes128;
    use aes::cipher::{BlockEncrypt, KeyInit};

    let mut data: [u8; 16] = [
        0x93, 0xC4, 0x67, 0xE3, 0x7D, 0xB0, 0xC7, 0xA4, 0xD1, 0xBE, 0x3F, 0x81, 0x01, 0x52, 0xCB,
        0x56,
    ];

    for _ in 0..65536 {
        for chunk in password.chunks(16) {
            let mut key = [0u8; 16];
            key[..chunk.len()].copy_from_slice(chunk);
            let aes = Aes128::new((&key).into());
            aes.encrypt_block((&mut data).into());
        }
    }

    data
}

/// Derives the v1 user handle from an email and v1 login key: 16384 rounds
/// of AES-ECB over the email bytes XORed into a zeroed block.
pub fn derive_user_handle_v1(email: &str, login_key: &[u8; 16]) -> String {
    use aes::Aes128;
    use aes::cipher::{BlockEncrypt, KeyInit};

    let mut hash = [0u8; 16];
    for (i, byte) in email.bytes().enumerate() {
        hash[i % 16] ^= byte;
    }

    let aes = Aes128::new(login_key.into());
    for _ in 0..16384 {
        aes.encrypt_block((&mut hash).into());
    }

    let mut handle = [0u8; 8];
    handle[..4].copy_from_slice(&hash[0..4]);
    handle[4..].copy_from_slice(&hash[8..12]);
    crypto::base64url_encode(handle)
}

/// Derives the v2 login key via PBKDF2-HMAC-SHA512 (100,000 rounds); the
/// first 16 bytes are the master key, the next 16 are the user handle.
pub fn derive_key_v2(password: &[u8], salt: &str) -> Result<([u8; 16], String)> {
    use pbkdf2::password_hash::{PasswordHasher, Salt};
    use pbkdf2::{Algorithm, Params, Pbkdf2};

    let salt = Salt::new(salt)?;
    let params = Params {
        rounds: 100_000,
        output_length: 32,
    };

    let output =
        Pbkdf2.hash_password_customized(password, Some(Algorithm::Pbkdf2Sha512.ident()), None, params, salt)?;
    let output = output.hash.ok_or(Error::InvalidResponseFormat)?;
    let bytes = output.as_bytes();

    let key: [u8; 16] = bytes[..16].try_into().map_err(|_| Error::InvalidResponseFormat)?;
    let handle = crypto::base64url_encode(&bytes[16..32]);
    Ok((key, handle))
}

/// A snapshot of an authenticated session, as persisted by a
/// [`SessionStore`] between process runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub email: String,
    pub user_id: String,
    pub user_name: String,
    pub session_id: String,
    pub master_key: [u8; 16],
    pub private_key: Vec<u8>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Pluggable session persistence, external to this crate by design: the
/// library only needs four operations and leaves the actual storage medium
/// (an embedded key-value store, a file, whatever the host application
/// already uses) to the caller.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;
    async fn load(&self) -> Result<Option<SessionSnapshot>>;
    async fn delete(&self) -> Result<()>;
    async fn exists(&self) -> Result<bool>;
}

/// An in-memory [`SessionStore`], useful for tests and for processes that
/// don't need the session to outlive them. A production, durably-backed
/// implementation is left to the embedding application.
#[derive(Default)]
pub struct InMemorySessionStore {
    slot: tokio::sync::Mutex<Option<SessionSnapshot>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        *self.slot.lock().await = Some(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<SessionSnapshot>> {
        Ok(self.slot.lock().await.clone())
    }

    async fn delete(&self) -> Result<()> {
        *self.slot.lock().await = None;
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.slot.lock().await.is_some())
    }
}

/// Runs the full login ceremony against `pipeline`, resolving any hashcash
/// challenge the server interjects at either step, and returns the
/// resulting session (its `user_id` field is needed by the key resolver to
/// tell "own" pairs from "share" pairs in `raw_k`).
pub async fn login(
    pipeline: &Pipeline,
    email: &str,
    password: &str,
    mfa: Option<&str>,
) -> Result<UserSession> {
    let email = email.to_lowercase();

    let prelogin_response = submit_with_hashcash(
        pipeline,
        Request::PreLogin { user: email.clone() },
    )
    .await?;

    let prelogin = match prelogin_response {
        Response::PreLogin(response) => response,
        Response::Error(code) => return Err(Error::from(code)),
        _ => return Err(Error::InvalidResponseType),
    };

    let (login_key, user_handle) = match (prelogin.version, prelogin.salt.as_deref()) {
        (1, _) => {
            let key = derive_key_v1(password.as_bytes());
            let handle = derive_user_handle_v1(&email, &key);
            (key, handle)
        }
        (2, Some(salt_b64url)) => {
            use base64::prelude::{BASE64_STANDARD_NO_PAD, Engine};
            let salt_bytes = crypto::base64url_decode(salt_b64url)?;
            let salt = BASE64_STANDARD_NO_PAD.encode(salt_bytes);
            derive_key_v2(password.as_bytes(), &salt)?
        }
        (2, None) => return Err(Error::InvalidResponseFormat),
        (version, _) => return Err(Error::UnknownUserLoginVersion(version)),
    };

    let login_response = submit_with_hashcash(
        pipeline,
        Request::Login {
            user: email.clone(),
            hash: user_handle,
            session_key: None,
            si: None,
            mfa: mfa.map(str::to_string),
        },
    )
    .await?;

    let login = match login_response {
        Response::Login(response) => response,
        Response::Error(code) => return Err(Error::from(code)),
        _ => return Err(Error::InvalidResponseType),
    };

    let mut master_key = crypto::base64url_decode(&login.k)?;
    crypto::aes_ecb_decrypt_in_place(&login_key, &mut master_key);

    let challenge_mpi = crypto::base64url_decode(&login.csid)?;
    let (challenge, _) = crate::crypto::rsa::get_mpi(&challenge_mpi);

    let mut privk = crypto::base64url_decode(&login.privk)?;
    crypto::aes_ecb_decrypt_in_place(&master_key, &mut privk);
    let (p, q, d) = crate::crypto::rsa::get_rsa_private_key(&privk);

    let decrypted = crate::crypto::rsa::decrypt(challenge, p, q, d);
    let sid = crypto::base64url_encode(&decrypted.to_bytes_be()[..43]);

    let master_key: [u8; 16] = master_key[..16]
        .try_into()
        .map_err(|_| Error::InvalidResponseFormat)?;

    // The session isn't installed on the pipeline yet, so thread `sid`
    // through as a query param manually rather than going through
    // `pipeline.submit`, which would look for it on `ClientState`.
    let user_info_response = pipeline
        .send_immediate_with_params(std::slice::from_ref(&Request::UserInfo {}), &[("sid", sid.as_str())])
        .await?
        .into_iter()
        .next()
        .ok_or(Error::InvalidResponseType)?;

    let user_name = match user_info_response {
        Response::UserInfo(info) => info.name,
        Response::Error(code) => return Err(Error::from(code)),
        _ => return Err(Error::InvalidResponseType),
    };

    Ok(UserSession {
        sid,
        key: master_key,
        user_id: login.u,
        user_name,
        private_key: privk,
    })
}

/// Submits one login-family request, transparently solving and
/// resubmitting a hashcash challenge if the server returns one in place of
/// the expected response.
async fn submit_with_hashcash(pipeline: &Pipeline, request: Request) -> Result<Response> {
    let responses = pipeline.send_immediate(std::slice::from_ref(&request)).await?;
    let response = responses.into_iter().next().ok_or(Error::InvalidResponseType)?;

    let Response::Hashcash(raw) = response else {
        return Ok(response);
    };

    log::debug!("received hashcash challenge, solving");
    let challenge = HashcashChallenge::parse(&raw).ok_or(Error::InvalidResponseFormat)?;
    let prefix = challenge.solve();
    let solution = challenge.solution_string(prefix);

    let responses = pipeline
        .send_immediate_with_params(std::slice::from_ref(&request), &[("hsh", solution.as_str())])
        .await?;
    responses.into_iter().next().ok_or(Error::InvalidResponseType)
}

/// Terminates the current session with MEGA and, on success, erases any
/// persisted snapshot in `store`.
pub async fn logout(pipeline: &Pipeline, store: &dyn SessionStore) -> Result<()> {
    let responses = pipeline
        .submit(Request::Logout {}, Priority::Immediate)
        .await?;

    match responses {
        Response::Error(ErrorCode::OK) => {
            store.delete().await?;
            Ok(())
        }
        Response::Error(code) => Err(Error::from(code)),
        _ => Err(Error::InvalidResponseType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_key_derivation_matches_reference_vector() {
        let password: Vec<u8> = (0u8..8).collect();
        let key = derive_key_v1(&password);
        assert_eq!(hex::encode(key), "c4589a459956887caf0b408635c3c03b");
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemorySessionStore::new();
        assert!(!store.exists().await.unwrap());

        let snapshot = SessionSnapshot {
            email: "user@example.com".to_string(),
            user_id: "U1".to_string(),
            user_name: "Test User".to_string(),
            session_id: "sid".to_string(),
            master_key: [0u8; 16],
            private_key: vec![1, 2, 3],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        store.save(&snapshot).await.unwrap();
        assert!(store.exists().await.unwrap());

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.email, snapshot.email);

        store.delete().await.unwrap();
        assert!(!store.exists().await.unwrap());
    }
}
